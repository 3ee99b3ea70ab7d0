use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use file_gallery_client::config::ClientConfig;
use file_gallery_client::create_app;
use file_gallery_client::models::{FileKind, UploadFile, UploadStrategy};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend API root, overrides GALLERY_API_BASE_URL
    #[arg(long)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List uploaded files in display order
    List,
    /// Upload a file and refresh the gallery
    Upload {
        path: PathBuf,

        /// Upload strategy, defaults to GALLERY_UPLOAD_STRATEGY or multipart
        #[arg(short, long, value_enum)]
        strategy: Option<UploadStrategy>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_gallery_client=info,gallery=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ClientConfig::from_env();
    if let Some(api_url) = args.api_url {
        config = config.with_base_url(api_url);
    }

    let app = create_app(config)?;

    match args.command {
        Command::List => {
            let files = app.gallery.load().await?;
            if files.is_empty() {
                println!("No files yet. Upload your first file to get started.");
            }
            for file in &files {
                let kind = match file.kind() {
                    FileKind::Image => "image",
                    FileKind::Video => "video",
                    FileKind::Other => "file",
                };
                println!("{:<6} {:<40} {}", kind, file.display_name(), file.url);
            }
        }
        Command::Upload { path, strategy } => {
            let strategy = strategy.unwrap_or(app.config.default_strategy);
            let file = UploadFile::from_path(&path).await?;

            app.uploads.observe(|state| {
                if state.is_uploading() && state.progress > 0 {
                    info!("⏳ Uploading... {}%", state.progress);
                }
            });

            let cancel = CancellationToken::new();
            let watcher = cancel.clone();
            tokio::spawn(async move {
                if signal::ctrl_c().await.is_ok() {
                    warn!("⌨️  Ctrl+C received, cancelling upload...");
                    watcher.cancel();
                }
            });

            let receipt = app
                .uploads
                .submit_with_cancel(file, strategy, cancel)
                .await?;
            info!("📦 Stored as {} via {}", receipt.key, receipt.strategy);

            let view = app.gallery.view();
            if let Some(error) = view.error {
                warn!("{}", error);
            } else {
                info!("🖼️  Gallery now holds {} files", view.files.len());
            }
        }
    }

    Ok(())
}
