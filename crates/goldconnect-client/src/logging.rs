//! Tracing bootstrap for shells embedding the engine.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "goldconnect_client=debug,goldconnect_store=info,warn";

/// Install a fmt subscriber honouring `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_twice() {
        super::init();
        super::init();
    }
}
