use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. Logs go to stderr so rendered output on
/// stdout stays clean.
pub fn init(verbose: u8) {
    let default = match verbose {
        0 => "horizon_cookbook=info",
        1 => "horizon_cookbook=debug",
        _ => "horizon_cookbook=trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}
