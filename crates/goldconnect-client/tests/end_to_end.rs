use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use goldconnect_client::{
    ClientError, Destination, GeoLocator, GoldConnect, OutgoingFile, UnreadCounts, UploadInput,
};
use goldconnect_shared::constants::{PRIVATE_MESSAGES_COLLECTION, PURGED_COLLECTIONS};
use goldconnect_shared::{GeoInfo, MediaKind, Message, MessageBody, User};
use goldconnect_store::{CdnBlobStore, CdnConfig, MemoryBlobStore, MemoryDocumentStore, StoreError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

fn engine() -> (MemoryDocumentStore, MemoryBlobStore, GoldConnect) {
    let store = MemoryDocumentStore::new();
    let blobs = MemoryBlobStore::new();
    let app = GoldConnect::new(
        Arc::new(store.clone()),
        Arc::new(blobs.clone()),
        GeoLocator::new(Vec::new()),
    );
    (store, blobs, app)
}

async fn unread_feed(
    app: &GoldConnect,
    name: &str,
) -> (
    goldconnect_client::SubscriptionHandle,
    mpsc::UnboundedReceiver<UnreadCounts>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = app
        .conversations()
        .subscribe_unread(name, move |counts| {
            let _ = tx.send(counts);
        })
        .await
        .unwrap();
    (handle, rx)
}

async fn next_quiet<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Option<T> {
    tokio::time::timeout(Duration::from_millis(100), rx.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn alice_writes_to_bob() {
    let (_store, _blobs, app) = engine();
    let france = GeoInfo::new("France", "FR").unwrap();

    // first login records the country; a later one cannot change it
    let alice = app.login_with("Alice", &france).await.unwrap();
    assert_eq!(alice.country_code, "FR");
    let alice = app
        .login_with("Alice", &GeoInfo::new("Peru", "PE").unwrap())
        .await
        .unwrap();
    assert_eq!(alice.country_code, "FR");
    app.login_with("Bob", &GeoInfo::unknown()).await.unwrap();

    let (_bob_handle, mut bob) = unread_feed(&app, "Bob").await;
    let (_alice_handle, mut alice_rx) = unread_feed(&app, "Alice").await;
    assert!(bob.recv().await.unwrap().is_empty());
    assert!(alice_rx.recv().await.unwrap().is_empty());

    let to_bob = Destination::Private { to: "Bob".into() };
    app.send("Alice", &to_bob, MessageBody::text("hi").unwrap())
        .await
        .unwrap();

    let counts = bob.recv().await.unwrap();
    assert_eq!(counts.get("Alice"), Some(&1));
    // Alice's own counters see the push but stay empty
    assert!(alice_rx.recv().await.unwrap().is_empty());

    // Bob opens the conversation
    let (tx, mut convo) = mpsc::unbounded_channel::<Vec<Message>>();
    let _convo = app
        .conversations()
        .subscribe_private("Bob", Some("Alice"), move |msgs| {
            let _ = tx.send(msgs);
        })
        .await
        .unwrap();
    let msgs = convo.recv().await.unwrap();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].body.text_content(), "hi");
    assert!(msgs[0].body.media_descriptor().is_none());

    assert_eq!(app.conversations().mark_read("Bob", "Alice").await.unwrap(), 1);
    assert!(bob.recv().await.unwrap().is_empty());
    assert!(alice_rx.recv().await.unwrap().is_empty());

    // second mark is a no-op
    assert_eq!(app.conversations().mark_read("Bob", "Alice").await.unwrap(), 0);
    assert!(next_quiet(&mut bob).await.is_none());
}

#[tokio::test]
async fn purge_empties_live_views() {
    let (store, blobs, app) = engine();
    app.login_with("Alice", &GeoInfo::unknown()).await.unwrap();
    app.send(
        "Alice",
        &Destination::Group {
            country: "France".into(),
        },
        MessageBody::text("bonjour").unwrap(),
    )
    .await
    .unwrap();
    blobs.insert("uploads/images/1_a.png", "png");

    let (tx, mut users) = mpsc::unbounded_channel::<Vec<User>>();
    let _users = app
        .presence()
        .subscribe_users(move |list| {
            let _ = tx.send(list);
        })
        .await
        .unwrap();
    let (tx, mut group) = mpsc::unbounded_channel::<Vec<Message>>();
    let _group = app
        .conversations()
        .subscribe_group(move |msgs| {
            let _ = tx.send(msgs);
        })
        .await
        .unwrap();
    assert_eq!(users.recv().await.unwrap().len(), 1);
    assert_eq!(group.recv().await.unwrap().len(), 1);

    let report = app.purger().purge_all().await.unwrap();
    assert_eq!(report.documents_deleted, 2);
    assert_eq!(report.blobs_deleted, 1);

    for collection in PURGED_COLLECTIONS {
        assert_eq!(store.len(collection), 0);
    }
    assert!(users.recv().await.unwrap().is_empty());
    assert!(group.recv().await.unwrap().is_empty());
    assert!(blobs.paths().is_empty());
}

/// A CDN that answers every request with a 500 once the request is read.
async fn broken_cdn() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = match sock.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_ascii_lowercase();
                let Some(end) = text.find("\r\n\r\n") else {
                    continue;
                };
                let len = text[..end]
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    break;
                }
            }
            let _ = sock
                .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
            let _ = sock.shutdown().await;
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn failed_cdn_upload_sends_nothing() {
    let store = MemoryDocumentStore::new();
    let cdn = CdnBlobStore::new(CdnConfig {
        base_url: broken_cdn().await,
        cloud_name: "demo".into(),
        upload_preset: "chat_media".into(),
    });
    let app = GoldConnect::new(
        Arc::new(store.clone()),
        Arc::new(cdn),
        GeoLocator::new(Vec::new()),
    );

    let file = OutgoingFile {
        input: UploadInput::File {
            name: "beach.png".into(),
            bytes: Bytes::from_static(b"png"),
            content_type: "image/png".into(),
        },
        kind: MediaKind::Image,
        caption: "sun".into(),
        video_duration_secs: None,
    };
    let progress = Arc::new(Mutex::new(Vec::new()));
    let seen = progress.clone();
    let err = app
        .send_file(
            "alice",
            &Destination::Private { to: "bob".into() },
            &file,
            move |p| seen.lock().unwrap().push(p),
        )
        .await
        .unwrap_err();

    match err {
        ClientError::Upload { backend, source } => {
            assert_eq!(backend, "cdn");
            assert!(matches!(source, StoreError::Status { status: 500, .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let progress = progress.lock().unwrap().clone();
    assert_eq!(progress, vec![25]);
    assert_eq!(store.len(PRIVATE_MESSAGES_COLLECTION), 0);
}
