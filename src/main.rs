//! src/main.rs
//!
//! The entrypoint for the drag relay binary.

use drag_relay::{App, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `RUST_LOG=debug` or `RUST_LOG=drag_relay=trace` for more detail.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load()?;
    App::new(config).run().await?;
    Ok(())
}
