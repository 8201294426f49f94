//! Broker connection options and their mapping to librdkafka configuration.

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use rdkafka::config::ClientConfig;

use crate::error::{Error, Result};

/// Client id reported to the brokers by both modes.
pub const CLIENT_ID: &str = "kafka-console-avro-tools";

/// How to authenticate against the brokers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AuthMode {
    /// Plaintext connection without authentication
    #[value(name = "wo")]
    Without,
    /// Mutual TLS using PEM certificate files
    #[value(name = "tls", alias = "TLS")]
    Tls,
}

/// Broker connection flags shared by the producer and consumer subcommands.
#[derive(Parser, Clone, Debug)]
pub struct BrokerOpts {
    /// Kafka broker list
    #[arg(
        short = 'b',
        long = "broker-list",
        default_value = "localhost:9092",
        env = "BROKER_LIST"
    )]
    pub broker_list: String,

    /// Auth type
    #[arg(short = 'a', long, value_enum, default_value = "wo", env = "AUTH")]
    pub auth: AuthMode,

    /// TLS client certificate file (in pem format)
    #[arg(long, default_value = "./client.cer.pem", env = "TLS_CERT_FILE")]
    pub cert_file: PathBuf,

    /// TLS client key file (in pem format)
    #[arg(long, default_value = "./client.key.pem", env = "TLS_KEY_FILE")]
    pub key_file: PathBuf,

    /// TLS CA certificate file (in pem format)
    #[arg(long, default_value = "./server.cer.pem", env = "TLS_CA_CERT_FILE")]
    pub ca_cert_file: PathBuf,
}

impl BrokerOpts {
    fn base_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.broker_list)
            .set("client.id", CLIENT_ID);

        if self.auth == AuthMode::Tls {
            // librdkafka reads the files itself; a bad path there surfaces
            // as an opaque client error, so check up front.
            for path in [&self.cert_file, &self.key_file, &self.ca_cert_file] {
                ensure_readable(path)?;
            }
            config
                .set("security.protocol", "ssl")
                .set("ssl.certificate.location", display(&self.cert_file))
                .set("ssl.key.location", display(&self.key_file))
                .set("ssl.ca.location", display(&self.ca_cert_file));
        }

        Ok(config)
    }

    /// Producer configuration: full in-sync-replica acknowledgment and a
    /// bounded retry budget for transient publish failures.
    pub fn producer_config(&self) -> Result<ClientConfig> {
        let mut config = self.base_config()?;
        config
            .set("acks", "all")
            .set("retries", "5")
            .set("message.timeout.ms", "5000");
        Ok(config)
    }

    /// Consumer configuration: offsets are committed manually, only after a
    /// record has been decoded.
    pub fn consumer_config(&self, group: &str) -> Result<ClientConfig> {
        let mut config = self.base_config()?;
        config
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false");
        Ok(config)
    }
}

fn ensure_readable(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "TLS certificate file not found: {}",
            path.display()
        )))
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plaintext_opts() -> BrokerOpts {
        BrokerOpts {
            broker_list: "localhost:9092".to_string(),
            auth: AuthMode::Without,
            cert_file: PathBuf::from("./client.cer.pem"),
            key_file: PathBuf::from("./client.key.pem"),
            ca_cert_file: PathBuf::from("./server.cer.pem"),
        }
    }

    #[test]
    fn producer_config_requires_full_acks() {
        let config = plaintext_opts().producer_config().unwrap();
        assert_eq!(config.get("acks"), Some("all"));
        assert_eq!(config.get("retries"), Some("5"));
        assert_eq!(config.get("client.id"), Some(CLIENT_ID));
    }

    #[test]
    fn consumer_config_disables_auto_commit() {
        let config = plaintext_opts().consumer_config("my-group").unwrap();
        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert_eq!(config.get("group.id"), Some("my-group"));
    }

    #[test]
    fn tls_without_certificates_is_rejected() {
        let opts = BrokerOpts {
            auth: AuthMode::Tls,
            cert_file: PathBuf::from("/nonexistent/client.cer.pem"),
            ..plaintext_opts()
        };
        assert!(matches!(
            opts.producer_config(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn tls_maps_certificate_locations() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("client.cer.pem");
        let key = dir.path().join("client.key.pem");
        let ca = dir.path().join("server.cer.pem");
        for path in [&cert, &key, &ca] {
            std::fs::write(path, "---").unwrap();
        }

        let opts = BrokerOpts {
            auth: AuthMode::Tls,
            cert_file: cert.clone(),
            key_file: key,
            ca_cert_file: ca,
            ..plaintext_opts()
        };
        let config = opts.producer_config().unwrap();
        assert_eq!(config.get("security.protocol"), Some("ssl"));
        assert_eq!(
            config.get("ssl.certificate.location"),
            Some(cert.display().to_string().as_str())
        );
    }
}
