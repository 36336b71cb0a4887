use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use blockup::config::{DEFAULT_CHUNK_SIZE, DEFAULT_PARALLELISM};
use blockup::{
    FileSource, HttpBackend, LogSinkObserver, ObjectRef, RetryPolicy, UploadOptions, Uploader,
    server,
};

#[derive(Parser)]
#[command(name = "blockup")]
#[command(about = "Resumable chunked uploads to block-blob stores")]
#[command(version)]
struct Cli {
    #[arg(long, global = true, default_value = "info", help = "log level when RUST_LOG is unset")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Upload {
        #[arg(short, long, help = "file to upload")]
        file: PathBuf,
        #[arg(short, long, env = "BLOCKUP_ENDPOINT", help = "block store endpoint")]
        endpoint: String,
        #[arg(short, long, help = "target container")]
        container: String,
        #[arg(short, long, help = "blob name, defaults to the file name")]
        blob: Option<String>,
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, help = "chunk size in bytes")]
        chunk_size: u64,
        #[arg(short, long, default_value_t = DEFAULT_PARALLELISM, help = "chunks in flight")]
        parallelism: usize,
        #[arg(long, help = "attempts per request, unlimited when unset")]
        max_attempts: Option<u32>,
        #[arg(long, default_value_t = 200, help = "first retry delay")]
        retry_delay_ms: u64,
        #[arg(long, default_value_t = 30_000, help = "retry delay cap")]
        retry_max_delay_ms: u64,
        #[arg(long, default_value_t = 300, help = "per-request timeout")]
        timeout_secs: u64,
    },
    Serve {
        #[arg(long, default_value = "127.0.0.1", help = "Address to bind to")]
        address: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

fn init_console(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    init_console(&cli.log_level);

    match cli.command {
        Some(Commands::Upload {
            file,
            endpoint,
            container,
            blob,
            chunk_size,
            parallelism,
            max_attempts,
            retry_delay_ms,
            retry_max_delay_ms,
            timeout_secs,
        }) => {
            let blob = match blob {
                Some(blob) => blob,
                None => file
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| format!("cannot derive a blob name from {}", file.display()))?,
            };

            let mut retry = RetryPolicy::default().with_backoff(
                Duration::from_millis(retry_delay_ms),
                Duration::from_millis(retry_max_delay_ms),
            );
            if let Some(max_attempts) = max_attempts {
                retry = retry.with_max_attempts(max_attempts);
            }
            let options = UploadOptions::default()
                .with_chunk_size(chunk_size)
                .with_parallelism(parallelism)
                .with_retry(retry);

            let source = FileSource::new(file);
            let total_length = source.len().await?;
            let backend = HttpBackend::new(&endpoint, Duration::from_secs(timeout_secs))?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupted, cancelling upload");
                    on_interrupt.cancel();
                }
            });

            let uploader = Uploader::new(Arc::new(backend))
                .with_options(options)
                .with_observer(Arc::new(LogSinkObserver::new(Arc::new(|line: &str| {
                    println!("{}", line)
                }))))
                .with_cancellation(cancel);

            let object = ObjectRef::new(container, blob);
            let uri = uploader.upload(Arc::new(source), total_length, &object).await?;
            println!("{}", uri);
        }

        Some(Commands::Serve { address, port }) => {
            server::startup(address, port).await?;
        }

        None => {
            println!("Use --help for available commands");
        }
    }

    Ok(())
}
