use clap::Parser;
use station_stream::kafka::{KafkaTopicAdmin, ProvisionerState, Publisher, TopicProvisioner, TopicSpec};
use station_stream::stream::{create_consumer, transformed_station_schemas, StationPipeline, StationTable};
use station_stream::{Config, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "station-stream")]
#[command(about = "Transforms transit station records into per-line station events", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting station-stream");
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
        kafka_brokers = %config.kafka.brokers,
        schema_registry_url = %config.kafka.schema_registry_url,
        input_topic = %config.stream.input_topic,
        output_topic = %config.stream.output_topic,
        group_id = %config.stream.group_id,
        "Configuration summary"
    );

    let admin = Arc::new(KafkaTopicAdmin::new(&config.kafka, &config.provisioning)?);
    let provisioner = TopicProvisioner::new(admin, Arc::new(ProvisionerState::new()), &config.provisioning);

    let output = TopicSpec::new(
        config.stream.output_topic.as_str(),
        config.stream.output_partitions,
        config.stream.output_replication_factor,
    )?;
    let publisher = Arc::new(
        Publisher::open(output, transformed_station_schemas()?, &config.kafka, &provisioner).await?,
    );

    let consumer = create_consumer(&config.kafka, &config.stream)?;
    let pipeline = StationPipeline::new(StationTable::new("transformed_stations", Arc::clone(&publisher)));

    let result = pipeline
        .run(&consumer, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
        })
        .await;

    publisher.close().await?;
    info!(stations = pipeline.sink().len(), "station-stream stopped");

    result
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("station_stream=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("station_stream=info,warn"))
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
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
