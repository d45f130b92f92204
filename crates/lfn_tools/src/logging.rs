use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Install the stdout subscriber shared by the workspace binaries. `RUST_LOG`
/// overrides the default `info` level. A second call (tests, embedding) is a
/// no-op.
pub fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(env_filter);
    let _ = tracing_subscriber::registry().with(stdout_layer).try_init();
}
