use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("schema registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("schema {id} not found in registry")]
    SchemaNotFound { id: u32 },

    #[error("failed to parse schema {id}: {reason}")]
    SchemaParse { id: u32, reason: String },

    #[error("payload does not conform to schema {id}: {reason}")]
    TextualDecode { id: u32, reason: String },

    #[error("failed to serialize value against schema {id}: {reason}")]
    BinaryEncode { id: u32, reason: String },

    #[error("record too short for wire format: {len} bytes")]
    TruncatedRecord { len: usize },

    #[error("failed to deserialize record against schema {id}: {reason}")]
    BinaryDecode { id: u32, reason: String },

    #[error("failed to read payload from {path}: {source}")]
    PayloadRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to publish record to {topic}: {source}")]
    Publish {
        topic: String,
        source: rdkafka::error::KafkaError,
    },

    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
