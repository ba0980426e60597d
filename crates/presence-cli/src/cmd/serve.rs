use anyhow::Context;
use presence_server::AppState;
use std::path::Path;

pub fn run(root: &Path, port: u16) -> anyhow::Result<()> {
    let state = AppState::open(root).context("failed to load presence state")?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        tokio::select! {
            result = presence_server::serve_on(state, listener) => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                Ok(())
            }
        }
    })
}
