use tracing_subscriber::{
    fmt::format::Format, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Initialize tracing with a compact console format. Honors `RUST_LOG`;
/// falls back to a debug filter for our crates. Safe to call more than once
/// (subsequent calls are no-ops), which matters for tests.
pub fn init_telemetry() {
    let console_fmt = tracing_subscriber::fmt::layer().event_format(
        Format::default()
            .compact()
            .with_target(false)
            .without_time(),
    );
    let _ = tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "documind=debug,tower_http=debug".into()),
        )
        .with(console_fmt)
        .try_init();
}
