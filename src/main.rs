use rmcp::{ServiceExt, transport::stdio};

use codeforge::config::Config;
use codeforge::runner::tempdir;
use codeforge::server::CodeforgeServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    // Load .env file if present (silently ignored if missing)
    dotenvy::dotenv().ok();

    tracing::info!("codeforge starting");

    tempdir::purge_stale().await;

    let config = Config::from_env();
    let server = CodeforgeServer::new(config);

    let service = server
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("serving error: {e:?}"))?;

    service.waiting().await?;

    tracing::info!("codeforge shutting down");
    Ok(())
}
