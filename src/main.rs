//! Overmind entry point.

use anyhow::Context as _;
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = overmind::config::Config::load()
        .context("failed to load configuration from environment")?;

    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!(
            "failed to create data directory {}",
            config.data_dir.display()
        )
    })?;
    let _log_guard = init_logging(&config.log_file)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.data_dir.display(),
        history = %config.history.path.display(),
        "starting Overmind"
    );

    let app = Arc::new(overmind::App::new(config).context("failed to initialize application")?);
    let router = Arc::new(overmind::router::Router::new(app));

    let result = overmind::messaging::discord::run(router.clone()).await;

    tracing::info!("flushing threads before exit");
    router.persist().await;

    if let Err(error) = &result {
        tracing::error!(error = %format!("{error:#}"), "Overmind stopped with an error");
    } else {
        tracing::info!("Overmind stopped");
    }
    result
}

/// Log to stdout and to `log_file`. The returned guard flushes the file writer on drop.
fn init_logging(log_file: &Path) -> anyhow::Result<WorkerGuard> {
    let directory = log_file
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = log_file
        .file_name()
        .with_context(|| format!("LOG_FILE has no file name: {}", log_file.display()))?;
    std::fs::create_dir_all(directory)
        .with_context(|| format!("failed to create log directory {}", directory.display()))?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("overmind=info,serenity=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}
