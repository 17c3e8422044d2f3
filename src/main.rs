use cdc_publisher::checkpoint::{Checkpoint, CheckpointManager, InflightPositions};
use cdc_publisher::kafka::KafkaBrokerClient;
use cdc_publisher::lifecycle::ShutdownTerminator;
use cdc_publisher::source::JsonLinesSource;
use cdc_publisher::{Config, Publisher, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Extra time the worker gets beyond the producer's own flush timeout.
const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "cdc-publisher")]
#[command(about = "Publishes captured change events to Kafka", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long, value_name = "FILE", help = "Change events as JSON lines (default: stdin)")]
    input: Option<PathBuf>,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting cdc-publisher");
    info!("Loading configuration from {:?}", args.config);

    let config = match Config::from_file(&args.config) {
        Ok(cfg) => {
            info!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    info!(
        kafka_brokers = ?config.kafka.brokers,
        topic = %config.producer.topic,
        schema_topic = %config.producer.schema_topic(),
        dead_letter_topic = ?config.producer.dead_letter_topic,
        partition_by = ?config.producer.partition_by,
        queue_capacity = config.producer.queue_capacity,
        "Configuration summary"
    );

    let input = match open_input(args.input.as_deref()).await {
        Ok(input) => input,
        Err(e) => {
            error!("Failed to open input: {}", e);
            return Err(e);
        }
    };

    let checkpoints = CheckpointManager::new(&config.checkpoint.file);
    let resume = checkpoints.load().await?.map(|checkpoint| checkpoint.position);
    let inflight = Arc::new(match resume.clone() {
        Some(position) => {
            info!("Resuming after {}", position);
            InflightPositions::resume_from(position)
        }
        None => InflightPositions::new(),
    });

    let terminator = Arc::new(ShutdownTerminator::new());
    let client = Arc::new(KafkaBrokerClient::new(&config.kafka)?);
    let publisher = Publisher::new(
        &config.producer,
        client,
        inflight.clone(),
        terminator.clone(),
    )?;

    let checkpoint_task = {
        let manager = CheckpointManager::new(&config.checkpoint.file);
        let inflight = inflight.clone();
        let period = Duration::from_secs(config.checkpoint.interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = save_checkpoint(&manager, &inflight).await {
                    warn!("Failed to save checkpoint: {}", e);
                }
            }
        })
    };

    let mut source = JsonLinesSource::new(input).resume_after(resume);

    let outcome = tokio::select! {
        result = publish_all(&mut source, &publisher) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            Ok(())
        }
        _ = terminator.terminated() => Ok(()),
    };

    publisher.request_stop();
    if let Err(e) = publisher
        .await_stop(config.kafka.close_timeout() + STOP_GRACE)
        .await
    {
        warn!("{}; closing the producer now", e);
        publisher.close();
    }

    checkpoint_task.abort();
    if let Err(e) = save_checkpoint(&checkpoints, &inflight).await {
        error!("Failed to save final checkpoint: {}", e);
    }

    match serde_json::to_string(&publisher.diagnostic()) {
        Ok(diagnostic) => info!(
            inflight = inflight.inflight(),
            skipped = source.skipped(),
            "cdc-publisher stopped: {}",
            diagnostic
        ),
        Err(e) => warn!("Failed to serialize diagnostic: {}", e),
    }

    if let Some(cause) = terminator.take_cause() {
        error!("Terminated: {}", cause);
        return Err(cause);
    }
    outcome
}

async fn open_input(path: Option<&Path>) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    Ok(match path {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    })
}

async fn publish_all<R>(source: &mut JsonLinesSource<R>, publisher: &Publisher) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(event) = source.next_event().await? {
        publisher.push(event).await?;
    }
    info!("Input exhausted");
    Ok(())
}

async fn save_checkpoint(manager: &CheckpointManager, inflight: &InflightPositions) -> Result<()> {
    let Some(position) = inflight.safe_position() else {
        return Ok(());
    };
    debug!("Checkpointing at {}", position);
    manager
        .save(&Checkpoint::new(position, inflight.completed_count()))
        .await
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("cdc_publisher=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("cdc_publisher=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
