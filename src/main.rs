use clap::{Parser, Subcommand};
use resize_worker::config::{self, WorkerConfig};
use resize_worker::imaging::RustBackend;
use resize_worker::logging::setup_logging;
use resize_worker::output;
use resize_worker::queue::{DirectoryQueue, MessageQueue};
use resize_worker::request::ResizeRequest;
use resize_worker::storage::StorageClient;
use resize_worker::worker::{BlobContainers, Worker};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "resize-worker")]
#[command(about = "Queue-triggered image resize worker")]
#[command(long_about = "\
Queue-triggered image resize worker

Each message names a source image and a target box:

  {\"FileName\": \"cat.png\", \"Width\": 300, \"Height\": 300}

The worker fetches images/cat.png, fits it inside the box without changing
its aspect ratio, re-encodes it in the same format (PNG, GIF or JPEG) and
stores it as resize-images/resize_cat.png. The message is acknowledged only
after the store succeeds; failed messages are redelivered.

Storage is selected with STORAGE_CONNECTION_STRING (a .env file is read):

  Backend=local;Root=/var/lib/resize-worker/blobs

Run 'resize-worker gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Config file (missing file = defaults)
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process messages until interrupted
    Run,
    /// Process at most one message and exit
    Once,
    /// Put a resize request on the queue
    Enqueue {
        /// Source blob name in the source container
        #[arg(long)]
        file_name: String,
        /// Target box width in pixels
        #[arg(long)]
        width: i64,
        /// Target box height in pixels
        #[arg(long)]
        height: i64,
    },
    /// Print a stock config file with all options documented
    GenConfig,
}

async fn open_queue(
    config: &WorkerConfig,
) -> Result<Arc<DirectoryQueue>, Box<dyn std::error::Error>> {
    let queue =
        DirectoryQueue::open(&config.queue.spool_dir, config.queue.max_delivery_count).await?;
    Ok(Arc::new(queue))
}

async fn build_worker(config: &WorkerConfig) -> Result<Worker, Box<dyn std::error::Error>> {
    let client = StorageClient::global(config.connection_string()?)?;
    let storage = BlobContainers::with_containers(
        client,
        &config.storage.source_container,
        &config.storage.destination_container,
    );
    let queue = open_queue(config).await?;
    let backend = RustBackend::with_filter(config.imaging.filter);

    Ok(Worker::new(queue, Arc::new(storage), Arc::new(backend))
        .with_quality(config.quality())
        .with_max_pixels(config.imaging.max_pixels)
        .with_poll_interval(config.poll_interval()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let command = match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            return Ok(());
        }
        command => command,
    };

    // A missing .env is normal; the environment may already be set.
    dotenvy::dotenv().ok();
    let config = config::load_config(&cli.config)?;
    setup_logging(&config.logging)?;

    match command {
        Command::Run => {
            let worker = build_worker(&config).await?;
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Could not listen for ctrl-c");
                    // Keep the sender alive; dropping it stops the worker.
                    std::future::pending::<()>().await;
                }
                info!("Shutdown requested, finishing current job");
                let _ = shutdown_tx.send(true);
            });

            let stats = worker.run(shutdown_rx).await;
            println!("{stats}");
        }
        Command::Once => {
            let worker = build_worker(&config).await?;
            match worker.process_next().await? {
                Some(outcome) => output::print_outcome(&outcome),
                None => println!("queue is empty"),
            }
        }
        Command::Enqueue {
            file_name,
            width,
            height,
        } => {
            let request = ResizeRequest::new(file_name, width, height)?;
            let queue = open_queue(&config).await?;
            let id = queue
                .send(&request.to_message_body(), Some("application/json"))
                .await?;
            println!("{id}");
        }
        Command::GenConfig => {}
    }

    Ok(())
}
