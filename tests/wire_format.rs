//! Wire-format tests against a stubbed schema registry.
//!
//! These run without a broker: every property here is about the codec and
//! resolver contract, exercised through the crate's public API.

use kafka_console_avro_tools::{
    Error, RegisteredSchema, SchemaRegistryClient, SchemaResolver, WireCodec, WIRE_HEADER_LEN,
};

const USER_SCHEMA: &str = r#"{
    "type": "record",
    "name": "User",
    "fields": [
        {"name": "name", "type": "string"},
        {"name": "age", "type": "long"}
    ]
}"#;

fn registry_body() -> String {
    serde_json::json!({ "schema": USER_SCHEMA }).to_string()
}

fn parsed_schema(id: u32) -> RegisteredSchema {
    RegisteredSchema {
        id,
        schema: apache_avro::Schema::parse_str(USER_SCHEMA).unwrap(),
    }
}

fn codec_for(url: String) -> WireCodec {
    WireCodec::new(SchemaResolver::new(SchemaRegistryClient::new(url).unwrap()))
}

#[tokio::test]
async fn round_trip_preserves_the_textual_value() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/schemas/ids/12")
        .with_status(200)
        .with_body(registry_body())
        .create_async()
        .await;

    let codec = codec_for(server.url());
    let payload = br#"{"name":"ada","age":36}"#;

    let frame = codec.encode(&parsed_schema(12), payload).unwrap();
    assert_eq!(frame[0], 0x00);
    assert_eq!(u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]), 12);

    let text = codec.decode(&frame).await.unwrap();
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&text).unwrap(),
        serde_json::json!({"name": "ada", "age": 36})
    );
}

#[tokio::test]
async fn decode_of_unknown_schema_id_names_the_id() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/schemas/ids/99")
        .with_status(404)
        .with_body(r#"{"error_code":40403,"message":"Schema not found"}"#)
        .create_async()
        .await;

    let codec = codec_for(server.url());
    let record = [0x00, 0x00, 0x00, 0x00, 99, 0x02];

    match codec.decode(&record).await {
        Err(Error::SchemaNotFound { id }) => assert_eq!(id, 99),
        other => panic!("expected SchemaNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn repeated_decodes_fetch_the_schema_once() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/schemas/ids/12")
        .with_status(200)
        .with_body(registry_body())
        .expect(1)
        .create_async()
        .await;

    let codec = codec_for(server.url());
    let frame = codec
        .encode(&parsed_schema(12), br#"{"name":"ada","age":36}"#)
        .unwrap();

    for _ in 0..3 {
        codec.decode(&frame).await.unwrap();
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn header_length_is_constant_regardless_of_payload() {
    let codec = codec_for("http://127.0.0.1:1".to_string());

    let small = codec
        .encode(&parsed_schema(7), br#"{"name":"a","age":1}"#)
        .unwrap();
    let large_name = "x".repeat(4096);
    let large = codec
        .encode(
            &parsed_schema(7),
            format!(r#"{{"name":"{large_name}","age":1}}"#).as_bytes(),
        )
        .unwrap();

    assert_eq!(&small[..WIRE_HEADER_LEN], &[0x00, 0x00, 0x00, 0x00, 0x07]);
    assert_eq!(&large[..WIRE_HEADER_LEN], &[0x00, 0x00, 0x00, 0x00, 0x07]);
}
