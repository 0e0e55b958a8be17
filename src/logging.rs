use tracing_subscriber::{fmt, EnvFilter};

/// Installs the stderr subscriber. stdout carries the IPC stream, so log
/// lines must never reach it.
///
/// `RUST_LOG` overrides the default `info` filter, e.g.
/// `RUST_LOG=curriculumd=debug`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // try_init: a second call (or a host-installed subscriber) is not an error.
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .try_init();
}
