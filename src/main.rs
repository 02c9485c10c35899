use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use cellar_images::{
    ImagePipeline, ServerConfig, UploadConfig,
    http::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let upload_config = UploadConfig::from_env().context("invalid upload configuration")?;
    let server_config = ServerConfig::from_env().context("invalid server configuration")?;
    tracing::info!(
        upload_dir = %upload_config.upload_dir.display(),
        max_file_size = upload_config.max_file_size,
        max_width = upload_config.max_width,
        quality = upload_config.quality,
        "loaded upload configuration"
    );

    let pipeline = ImagePipeline::from_config(upload_config)
        .await
        .context("failed to initialize image storage")?;
    let router = http::router(AppState {
        pipeline,
        public_base_url: server_config.public_base_url.clone(),
    });

    let tcp_listener = tokio::net::TcpListener::bind(&server_config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", server_config.bind_address))?;
    tracing::info!(
        address = %server_config.bind_address,
        public_url = %server_config.public_base_url,
        "cellar image service started"
    );

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
