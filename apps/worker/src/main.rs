use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tunedock_worker::jobs::download::DownloadParams;
use tunedock_worker::registry::LogMessage;
use tunedock_worker::{Config, Manager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tunedock_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    tracing::info!("Starting Tunedock worker");

    let config = Config::from_env()?;
    let manager = Manager::new(config)?;

    // With a URL argument, run one download job and print its log stream.
    if let Some(url) = std::env::args().nth(1) {
        let state = manager.state();
        let job_id = manager.start_download(DownloadParams {
            url,
            quality: state.config.quality.clone(),
            codec: state.config.codec.clone(),
            overwrite: false,
            resume: false,
        });

        if let Some(mut stream) = manager.stream_logs(&job_id) {
            while let Some(message) = stream.next().await {
                println!("{}", message.render());
                if matches!(message, LogMessage::End) {
                    break;
                }
            }
        }
    }

    Ok(())
}
