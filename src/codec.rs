//! The broker wire codec.
//!
//! Records on the broker carry a fixed header ahead of the Avro binary body:
//!
//! ```text
//! [magic byte 0x00][schema id, 4 bytes big-endian][avro binary datum]
//! ```
//!
//! The layout is dictated by the schema-registry ecosystem convention and
//! must be reproduced bit-exactly so that records interoperate with any
//! conforming producer or consumer, whatever stack it is built on. The magic
//! byte is reserved for future framing revisions; it is written as zero and
//! not interpreted on read.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::registry::{RegisteredSchema, SchemaResolver};

/// First byte of every framed record.
pub const MAGIC_BYTE: u8 = 0x00;

/// Magic byte plus the big-endian schema id.
pub const WIRE_HEADER_LEN: usize = 5;

/// Encodes textual payloads into framed records and decodes framed records
/// back to text, resolving schemas by the id embedded in each record.
pub struct WireCodec {
    resolver: SchemaResolver,
}

impl WireCodec {
    pub fn new(resolver: SchemaResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &SchemaResolver {
        &self.resolver
    }

    /// Encode a JSON payload against `schema` and frame it for the broker.
    ///
    /// The payload is parsed as JSON, coerced to the schema's native value,
    /// and serialized as a single Avro datum behind the wire header.
    pub fn encode(&self, schema: &RegisteredSchema, payload: &[u8]) -> Result<Bytes> {
        let json: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| Error::TextualDecode {
                id: schema.id,
                reason: e.to_string(),
            })?;

        let native = apache_avro::types::Value::from(json)
            .resolve(&schema.schema)
            .map_err(|e| Error::TextualDecode {
                id: schema.id,
                reason: e.to_string(),
            })?;

        let body =
            apache_avro::to_avro_datum(&schema.schema, native).map_err(|e| Error::BinaryEncode {
                id: schema.id,
                reason: e.to_string(),
            })?;

        let mut frame = BytesMut::with_capacity(WIRE_HEADER_LEN + body.len());
        frame.put_u8(MAGIC_BYTE);
        frame.put_u32(schema.id);
        frame.put_slice(&body);
        Ok(frame.freeze())
    }

    /// Decode a framed record back to its JSON text.
    ///
    /// The length check happens before anything else; a record shorter than
    /// the wire header never reaches the resolver.
    pub async fn decode(&self, record: &[u8]) -> Result<String> {
        if record.len() < WIRE_HEADER_LEN {
            return Err(Error::TruncatedRecord { len: record.len() });
        }

        let id = u32::from_be_bytes([record[1], record[2], record[3], record[4]]);
        let schema = self.resolver.resolve(id).await?;

        let mut body = &record[WIRE_HEADER_LEN..];
        let native = apache_avro::from_avro_datum(&schema.schema, &mut body, None).map_err(|e| {
            Error::BinaryDecode {
                id,
                reason: e.to_string(),
            }
        })?;

        let json = serde_json::Value::try_from(native).map_err(|e| Error::BinaryDecode {
            id,
            reason: e.to_string(),
        })?;

        Ok(json.to_string())
    }
}
