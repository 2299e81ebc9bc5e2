//! Best-effort geolocation.
//!
//! Providers are tried in order until one answers with a usable country
//! name and two-letter code. A network error, a non-2xx status or an
//! unexpected body all count as that provider failing. When every provider
//! fails the result is the unknown sentinel; locating never errors.
//! Each lookup gets [`LOOKUP_TIMEOUT`]; a provider that does not answer in
//! time is treated as failed.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use goldconnect_shared::GeoInfo;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Deadline for a single provider lookup.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// `ipapi.co`: `{country_name, country_code}`
    IpApiCo,
    /// `ip-api.com`: `{country, countryCode}`
    IpApiCom,
}

#[derive(Deserialize)]
struct IpApiCoBody {
    country_name: Option<String>,
    country_code: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiComBody {
    country: Option<String>,
    country_code: Option<String>,
}

impl ProviderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ipapi.co" => Some(Self::IpApiCo),
            "ip-api.com" => Some(Self::IpApiCom),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::IpApiCo => "ipapi.co",
            Self::IpApiCom => "ip-api.com",
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::IpApiCo => "https://ipapi.co/json/",
            Self::IpApiCom => "https://ip-api.com/json",
        }
    }

    /// Extract country data from a provider response body.
    pub fn parse_body(&self, body: &str) -> anyhow::Result<GeoInfo> {
        let (country, code) = match self {
            Self::IpApiCo => {
                let b: IpApiCoBody = serde_json::from_str(body).context("malformed body")?;
                (b.country_name, b.country_code)
            }
            Self::IpApiCom => {
                let b: IpApiComBody = serde_json::from_str(body).context("malformed body")?;
                (b.country, b.country_code)
            }
        };
        match (country, code) {
            (Some(country), Some(code)) => Ok(GeoInfo::new(&country, &code)?),
            _ => bail!("response lacks country data"),
        }
    }
}

#[async_trait]
pub trait GeoProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(&self) -> anyhow::Result<GeoInfo>;
}

pub struct HttpGeoProvider {
    client: reqwest::Client,
    kind: ProviderKind,
}

impl HttpGeoProvider {
    pub fn new(client: reqwest::Client, kind: ProviderKind) -> Self {
        Self { client, kind }
    }
}

#[async_trait]
impl GeoProvider for HttpGeoProvider {
    fn name(&self) -> &str {
        self.kind.name()
    }

    async fn lookup(&self) -> anyhow::Result<GeoInfo> {
        let resp = self
            .client
            .get(self.kind.endpoint())
            .send()
            .await
            .context("request failed")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("status {}", status.as_u16());
        }
        let body = resp.text().await.context("reading body")?;
        self.kind.parse_body(&body)
    }
}

/// Ordered chain of providers.
pub struct GeoLocator {
    providers: Vec<Box<dyn GeoProvider>>,
    timeout: Duration,
}

impl GeoLocator {
    pub fn new(providers: Vec<Box<dyn GeoProvider>>) -> Self {
        Self {
            providers,
            timeout: LOOKUP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// HTTP client for the provider chain, bounded by [`LOOKUP_TIMEOUT`].
    pub fn http_client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "geolocation client builder failed, using defaults");
                reqwest::Client::new()
            })
    }

    pub fn from_kinds(client: reqwest::Client, kinds: &[ProviderKind]) -> Self {
        Self::new(
            kinds
                .iter()
                .map(|kind| Box::new(HttpGeoProvider::new(client.clone(), *kind)) as Box<dyn GeoProvider>)
                .collect(),
        )
    }

    pub async fn locate(&self) -> GeoInfo {
        for provider in &self.providers {
            debug!(provider = provider.name(), "trying geolocation provider");
            match tokio::time::timeout(self.timeout, provider.lookup()).await {
                Ok(Ok(geo)) => {
                    info!(provider = provider.name(), country = %geo.country_code, "located");
                    return geo;
                }
                Ok(Err(e)) => warn!(provider = provider.name(), error = %format!("{e:#}"), "geolocation failed"),
                Err(_) => warn!(provider = provider.name(), timeout = ?self.timeout, "geolocation timed out"),
            }
        }
        warn!("every geolocation provider failed, country unknown");
        GeoInfo::unknown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed {
        answer: Option<GeoInfo>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl GeoProvider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn lookup(&self) -> anyhow::Result<GeoInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.answer {
                Some(geo) => Ok(geo.clone()),
                None => bail!("offline"),
            }
        }
    }

    fn fixed(answer: Option<GeoInfo>, calls: &Arc<AtomicUsize>) -> Box<dyn GeoProvider> {
        Box::new(Fixed {
            answer,
            calls: calls.clone(),
        })
    }

    #[test]
    fn parses_provider_bodies() {
        let geo = ProviderKind::IpApiCo
            .parse_body(r#"{"ip":"1.2.3.4","country_name":"France","country_code":"FR"}"#)
            .unwrap();
        assert_eq!(geo, GeoInfo::new("France", "FR").unwrap());

        let geo = ProviderKind::IpApiCom
            .parse_body(r#"{"status":"success","country":"Peru","countryCode":"PE"}"#)
            .unwrap();
        assert_eq!(geo.country_code, "PE");

        // shape mismatch counts as failure
        assert!(ProviderKind::IpApiCom
            .parse_body(r#"{"country_name":"France","country_code":"FR"}"#)
            .is_err());
        assert!(ProviderKind::IpApiCo.parse_body(r#"{"error":true,"reason":"RateLimited"}"#).is_err());
        assert!(ProviderKind::IpApiCo
            .parse_body(r#"{"country_name":"France","country_code":"FRA"}"#)
            .is_err());
        assert!(ProviderKind::IpApiCo.parse_body("<html>").is_err());
    }

    #[tokio::test]
    async fn falls_through_to_next_provider() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let third = Arc::new(AtomicUsize::new(0));
        let locator = GeoLocator::new(vec![
            fixed(None, &first),
            fixed(Some(GeoInfo::new("Peru", "PE").unwrap()), &second),
            fixed(Some(GeoInfo::new("France", "FR").unwrap()), &third),
        ]);
        assert_eq!(locator.locate().await.country_code, "PE");
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(third.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_chain_yields_sentinel() {
        let calls = Arc::new(AtomicUsize::new(0));
        let locator = GeoLocator::new(vec![fixed(None, &calls), fixed(None, &calls)]);
        assert!(locator.locate().await.is_unknown());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(GeoLocator::new(Vec::new()).locate().await.is_unknown());
    }

    struct Stalled;

    #[async_trait]
    impl GeoProvider for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn lookup(&self) -> anyhow::Result<GeoInfo> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_provider_times_out() {
        let calls = Arc::new(AtomicUsize::new(0));
        let locator = GeoLocator::new(vec![
            Box::new(Stalled),
            fixed(Some(GeoInfo::new("Peru", "PE").unwrap()), &calls),
        ]);
        let started = tokio::time::Instant::now();
        assert_eq!(locator.locate().await.country_code, "PE");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() >= LOOKUP_TIMEOUT);

        let locator = GeoLocator::new(vec![Box::new(Stalled)]).with_timeout(Duration::from_millis(50));
        assert!(locator.locate().await.is_unknown());
    }

    #[test]
    fn provider_names() {
        assert_eq!(ProviderKind::parse("IPAPI.co"), Some(ProviderKind::IpApiCo));
        assert_eq!(ProviderKind::parse("ip-api.com"), Some(ProviderKind::IpApiCom));
        assert_eq!(ProviderKind::parse("geo.example"), None);
    }
}
