use tracing_subscriber::{
    fmt,
    prelude::*,
    EnvFilter,
};

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// configured filter.
pub fn init(filter: &str) -> eyre::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::try_new(filter)?,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(filter))
        .with(tracing_error::ErrorLayer::default())
        .try_init()?;
    Ok(())
}
