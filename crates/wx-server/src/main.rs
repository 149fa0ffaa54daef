//! Binary entry point for the WeChat publish facade.

#![forbid(unsafe_code)]
#![deny(warnings)]

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = wx_core::Config::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log.level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        service = %config.log.service,
        version = env!("CARGO_PKG_VERSION"),
        "wechat publish facade starting"
    );

    let server = wx_server::Server::new(config).await?;
    server.run().await
}
