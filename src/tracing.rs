use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins; otherwise `default_filter` (e.g. `"info"`).
fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Installs the global subscriber for the binaries.
///
/// Plain `fmt` output by default; JSON lines with the `tracing_json`
/// feature, and no colours with `tracing_noansi`. Records emitted through
/// the `log` crate are forwarded as well.
pub fn setup_tracing(default_filter: &str) -> Result<(), SetGlobalDefaultError> {
    // Only fails if a logger is already installed, in which case keep it
    let _ = tracing_log::LogTracer::init();

    if cfg!(feature = "tracing_json") {
        let json_subs = tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter(default_filter))
            .finish();
        tracing::subscriber::set_global_default(json_subs)
    } else {
        let mut fmt_subs = tracing_subscriber::fmt().with_env_filter(env_filter(default_filter));

        if cfg!(feature = "tracing_noansi") {
            fmt_subs = fmt_subs.with_ansi(false)
        }

        tracing::subscriber::set_global_default(fmt_subs.finish())
    }
}
