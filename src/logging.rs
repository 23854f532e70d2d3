use tracing::Level;
use tracing_subscriber::{
    EnvFilter, FmtSubscriber,
    filter::LevelFilter,
    fmt::{format::FmtSpan, time::LocalTime},
};

/// Initialize logging at `level`.
///
/// `RUST_LOG`, when set, takes precedence over `level` so individual targets
/// can be tuned without touching the command line.
pub fn init_logging(level: Level) -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_timer(LocalTime::rfc_3339())
        .with_ansi(true)
        .with_level(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    tracing::info!("Logging system initialized with level: {}", level);
    Ok(())
}
