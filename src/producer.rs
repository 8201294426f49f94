//! One-shot publishing of an encoded record.

use std::path::PathBuf;
use std::time::Duration;

use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tracing::info;

use crate::codec::WireCodec;
use crate::config::BrokerOpts;
use crate::error::{Error, Result};

/// Where the textual payload comes from.
pub enum PayloadSource {
    Literal(Vec<u8>),
    File(PathBuf),
}

impl PayloadSource {
    fn read(&self) -> Result<Vec<u8>> {
        match self {
            Self::Literal(bytes) => Ok(bytes.clone()),
            Self::File(path) => {
                info!(path = %path.display(), "reading message payload from a file");
                std::fs::read(path).map_err(|source| Error::PayloadRead {
                    path: path.clone(),
                    source,
                })
            }
        }
    }
}

/// Resolves a schema, encodes one payload against it, and publishes the
/// framed record, waiting for acknowledgment from all in-sync replicas.
pub struct ProducerPipeline {
    producer: FutureProducer,
    codec: WireCodec,
}

impl ProducerPipeline {
    pub fn new(opts: &BrokerOpts, codec: WireCodec) -> Result<Self> {
        let producer: FutureProducer = opts.producer_config()?.create()?;
        Ok(Self { producer, codec })
    }

    /// Publish one record. Returns the broker-assigned partition and offset.
    ///
    /// Any failure aborts the whole operation; a record is either fully
    /// published with a placement or not published at all.
    pub async fn publish(
        &self,
        topic: &str,
        schema_id: u32,
        source: PayloadSource,
    ) -> Result<(i32, i64)> {
        let schema = self.codec.resolver().resolve(schema_id).await?;
        let payload = source.read()?;
        let record = self.codec.encode(&schema, &payload)?;

        let (partition, offset) = self
            .producer
            .send(
                FutureRecord::<(), _>::to(topic).payload(record.as_ref()),
                Timeout::After(Duration::from_secs(5)),
            )
            .await
            .map_err(|(err, _)| Error::Publish {
                topic: topic.to_string(),
                source: err,
            })?;

        info!(topic, partition, offset, "wrote message");
        Ok((partition, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn literal_payload_reads_back() {
        let source = PayloadSource::Literal(br#"{"beat":3}"#.to_vec());
        assert_eq!(source.read().unwrap(), br#"{"beat":3}"#);
    }

    #[test]
    fn file_payload_reads_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"beat":3}"#).unwrap();

        let source = PayloadSource::File(file.path().to_path_buf());
        assert_eq!(source.read().unwrap(), br#"{"beat":3}"#);
    }

    #[test]
    fn missing_file_is_a_payload_read_error() {
        let source = PayloadSource::File(PathBuf::from("/nonexistent/payload.json"));
        assert!(matches!(
            source.read(),
            Err(Error::PayloadRead { .. })
        ));
    }
}
