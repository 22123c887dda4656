//! ETL worker - queue-driven extract/transform/load

use anyhow::Result;
use clap::{Parser, Subcommand};
use etl_common::logging::{init_logging, LogConfig, LogLevel};
use etl_worker::aws;
use etl_worker::config::WorkerConfig;
use etl_worker::delivery::DeliveryLoop;
use etl_worker::extract::{self, ExtractOptions, DEFAULT_BUCKET};
use etl_worker::fetcher::ObjectFetcher;
use etl_worker::loader::PgLoader;
use etl_worker::queue::SqsQueue;
use etl_worker::storage::S3Storage;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "etl-worker")]
#[command(author, version, about = "Queue-driven ETL worker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process notifications until interrupted (default)
    Run,

    /// Upload records to the bucket and send a notification for them
    Extract {
        /// JSON array of records; two sample products when omitted
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Target bucket
        #[arg(short, long, env = "S3_BUCKET", default_value = DEFAULT_BUCKET)]
        bucket: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("etl-worker")
        .filter_directives("sqlx=warn,aws_smithy_runtime=warn,aws_config=warn,hyper=warn")
        .build()
        .merge_env();

    let _guard = match log_config.and_then(|config| init_logging(&config)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        },
    };

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_worker().await,
        Command::Extract { file, bucket } => run_extract(ExtractOptions { file, bucket }).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        },
    }
}

async fn run_worker() -> Result<()> {
    let config = WorkerConfig::load()?;
    let gate = config.readiness_gate();

    info!(
        queue = %config.queue.name,
        dead_letter_queue = config.queue.dead_letter_name.as_deref().unwrap_or("-"),
        endpoint = config.aws.endpoint.as_deref().unwrap_or("aws"),
        "Starting ETL worker"
    );

    let sdk = aws::load_sdk_config(&config.aws).await;
    let sqs = aws::sqs_client(&sdk);
    let storage = S3Storage::new(aws::s3_client(&sdk, &config.aws));

    let queue_name = config.queue.name.as_str();
    let queue_url = gate
        .wait_until_ready("queue", || SqsQueue::resolve_url(&sqs, queue_name))
        .await?;
    let mut queue = SqsQueue::new(sqs.clone(), queue_url);

    if let Some(dlq_name) = config.queue.dead_letter_name.as_deref() {
        let dlq_url = gate
            .wait_until_ready("dead-letter queue", || SqsQueue::resolve_url(&sqs, dlq_name))
            .await?;
        queue = queue.with_dead_letter_url(dlq_url);
    }

    let loader = gate
        .wait_until_ready("database", || PgLoader::connect(&config.database))
        .await?;

    let delivery = DeliveryLoop::new(
        queue,
        ObjectFetcher::new(storage),
        loader,
        config.retry_policy(),
        config.queue.wait(),
        config.queue.visibility(),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    delivery.run(shutdown).await;
    delivery.loader().close().await;

    info!("Worker shut down gracefully");
    Ok(())
}

async fn run_extract(options: ExtractOptions) -> Result<()> {
    let config = WorkerConfig::load()?;
    let notification = extract::run(&config, &options).await?;

    println!("Uploaded s3://{}/{}", notification.container, notification.key);
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, finishing current message");
        },
        _ = terminate => {
            info!("Received terminate signal, finishing current message");
        },
    }

    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_is_default_command() {
        let cli = Cli::parse_from(["etl-worker"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_extract_arguments() {
        let cli = Cli::parse_from(["etl-worker", "extract", "--file", "records.json", "--bucket", "raw"]);
        match cli.command {
            Some(Command::Extract { file, bucket }) => {
                assert_eq!(file, Some(PathBuf::from("records.json")));
                assert_eq!(bucket, "raw");
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
