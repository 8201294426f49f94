//! Command-line interface for kafka-console-avro-tools
//!
//! # Usage Examples
//!
//! ```bash
//! # Publish a JSON payload encoded against schema 7
//! kafka-console-avro-tools producer \
//!   --broker-list localhost:9092 \
//!   --schema-registry-url http://localhost:8081 \
//!   --schema-id 7 \
//!   --msg '{"beat":3}'
//!
//! # Publish the contents of a file
//! kafka-console-avro-tools producer --schema-id 7 --file payload.json
//!
//! # Consume and print decoded records until interrupted
//! kafka-console-avro-tools consumer \
//!   --group kafka-console-avro-tools \
//!   --topic output
//!
//! # Mutual TLS
//! kafka-console-avro-tools consumer -a tls \
//!   --cert-file ./client.cer.pem \
//!   --key-file ./client.key.pem \
//!   --ca-cert-file ./server.cer.pem
//! ```
//!
//! Every flag can also be supplied through its environment variable, e.g.
//! `TOPIC`, `BROKER_LIST`, `SCHEMA_REGISTRY_URL`, `SCHEMA_ID`, `GROUP`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kafka_console_avro_tools::{
    BrokerOpts, ConsumerGroupSession, DecodeErrorPolicy, PayloadSource, ProducerPipeline,
    SchemaRegistryClient, SchemaResolver, WireCodec,
};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "kafka-console-avro-tools")]
#[command(about = "Console producer and consumer for schema-registry framed Avro records")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Clone)]
struct CommonOpts {
    /// Name of the topic
    #[arg(short = 't', long, default_value = "output", env = "TOPIC")]
    topic: String,

    /// Schema Registry URL
    #[arg(
        long,
        default_value = "http://localhost:8081",
        env = "SCHEMA_REGISTRY_URL"
    )]
    schema_registry_url: String,

    #[command(flatten)]
    broker: BrokerOpts,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a JSON payload against a registered schema and publish it
    Producer {
        #[command(flatten)]
        common: CommonOpts,

        /// Schema ID
        #[arg(long, env = "SCHEMA_ID")]
        schema_id: u32,

        /// Message payload
        #[arg(short = 'm', long = "msg", env = "MSG")]
        message: Option<String>,

        /// Read the message payload from a file instead
        #[arg(short = 'f', long = "file", env = "FILE")]
        file: Option<PathBuf>,
    },

    /// Join a consumer group and print each delivered record as JSON
    Consumer {
        #[command(flatten)]
        common: CommonOpts,

        /// Consumer group
        #[arg(
            short = 'g',
            long,
            default_value = "kafka-console-avro-tools",
            env = "GROUP"
        )]
        group: String,

        /// What to do with records that fail to decode
        #[arg(long, value_enum, default_value = "fail", env = "ON_DECODE_ERROR")]
        on_decode_error: DecodeErrorPolicy,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Producer {
            common,
            schema_id,
            message,
            file,
        } => run_producer(common, schema_id, message, file).await,
        Commands::Consumer {
            common,
            group,
            on_decode_error,
        } => run_consumer(common, group, on_decode_error).await,
    }
}

fn build_codec(registry_url: &str) -> anyhow::Result<WireCodec> {
    let client = SchemaRegistryClient::new(registry_url)?;
    Ok(WireCodec::new(SchemaResolver::new(client)))
}

async fn run_producer(
    common: CommonOpts,
    schema_id: u32,
    message: Option<String>,
    file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let codec = build_codec(&common.schema_registry_url)?;
    let pipeline = ProducerPipeline::new(&common.broker, codec)?;

    let source = match file {
        Some(path) => PayloadSource::File(path),
        None => PayloadSource::Literal(message.unwrap_or_default().into_bytes()),
    };

    let (partition, offset) = pipeline.publish(&common.topic, schema_id, source).await?;
    info!(partition, offset, "producer finished");
    Ok(())
}

async fn run_consumer(
    common: CommonOpts,
    group: String,
    on_decode_error: DecodeErrorPolicy,
) -> anyhow::Result<()> {
    let codec = build_codec(&common.schema_registry_url)?;
    let session = Arc::new(ConsumerGroupSession::new(
        &common.broker,
        &group,
        &common.topic,
        codec,
        on_decode_error,
    )?);

    let token = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate())?;

    let consume = {
        let session = Arc::clone(&session);
        let token = token.clone();
        tokio::spawn(async move {
            let result = session.run(token.clone()).await;
            if let Err(err) = &result {
                error!(error = %err, "consumer session failed");
                token.cancel();
            }
            result
        })
    };

    // Wait until the group coordinator has granted an assignment, unless
    // the session dies first.
    tokio::select! {
        _ = session.wait_ready() => info!("consumer up and running"),
        _ = token.cancelled() => {}
    }

    if !token.is_cancelled() {
        tokio::select! {
            _ = token.cancelled() => info!("terminating: cancellation requested"),
            _ = tokio::signal::ctrl_c() => info!("terminating: via signal"),
            _ = sigterm.recv() => info!("terminating: via signal"),
        }
    } else {
        info!("terminating: cancellation requested");
    }

    token.cancel();
    consume.await??;
    Ok(())
}
