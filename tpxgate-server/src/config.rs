//! Gateway configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! {
//!   "host": "0.0.0.0",
//!   "udp_port": 8192,
//!   "cluster": { "xy_separation": 3 },
//!   "cluster_file": "/data/run42.clusters"
//! }
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tpxgate_algorithms::ClusterSettings;

/// Runtime settings for one gateway instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Interface for the UDP socket and all bus endpoints.
    pub host: String,
    /// UDP port for detector datagrams (0 = OS-assigned).
    pub udp_port: u16,
    /// Port of the front-facing control endpoint (0 = OS-assigned).
    pub client_port: u16,
    /// Extend hit times across 34-bit clock wraps.
    pub correct_rollover: bool,
    /// Initial clustering windows.
    pub cluster: ClusterSettings,
    /// Histogram publish period in milliseconds.
    pub histogram_period_ms: u64,
    /// Cluster sink file opened at startup.
    pub cluster_file: Option<PathBuf>,
    /// Raw TPX3 capture file opened at startup.
    pub raw_file: Option<PathBuf>,
    /// Upper bound on a forwarded control exchange, in milliseconds.
    pub forward_timeout_ms: u64,
    /// Capacity of the log event channel.
    pub log_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            udp_port: 0,
            client_port: 48288,
            correct_rollover: true,
            cluster: ClusterSettings::default(),
            histogram_period_ms: 1000,
            cluster_file: None,
            raw_file: None,
            forward_timeout_ms: 5000,
            log_capacity: 1024,
        }
    }
}

impl GatewayConfig {
    /// Loads and validates a JSON config file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// holds out-of-range values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON string.
    ///
    /// # Errors
    /// Returns an error on invalid JSON or out-of-range values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig("host must not be empty".into()));
        }
        if self.histogram_period_ms == 0 {
            return Err(Error::InvalidConfig(
                "histogram_period_ms must be positive".into(),
            ));
        }
        if self.forward_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "forward_timeout_ms must be positive".into(),
            ));
        }
        if self.log_capacity == 0 {
            return Err(Error::InvalidConfig("log_capacity must be positive".into()));
        }
        Ok(())
    }

    /// Histogram publish period.
    #[must_use]
    pub fn histogram_period(&self) -> Duration {
        Duration::from_millis(self.histogram_period_ms)
    }

    /// Forwarding timeout.
    #[must_use]
    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.client_port, 48288);
        assert_eq!(config.cluster, ClusterSettings::new(5, 20, 50_000));
        assert_eq!(config.histogram_period(), Duration::from_secs(1));
        assert_eq!(config.forward_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{ "udp_port": 8192, "cluster": { "xy_separation": 3 } }"#;
        let config = GatewayConfig::from_json(json).unwrap();
        assert_eq!(config.udp_port, 8192);
        assert_eq!(config.cluster.xy_separation, 3);
        assert_eq!(config.cluster.t_separation, 20);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_rejects_zero_period() {
        let result = GatewayConfig::from_json(r#"{ "histogram_period_ms": 0 }"#);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_accepts_zero_cluster_gap() {
        let config = GatewayConfig::from_json(r#"{ "cluster": { "max_t_gap": 0 } }"#).unwrap();
        assert_eq!(config.cluster.max_t_gap, 0);
        assert_eq!(config.cluster.xy_separation, 5);
    }

    #[test]
    fn test_rejects_bad_json() {
        let result = GatewayConfig::from_json("{ udp_port: }");
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "cluster_file": "/tmp/run.clusters" }}"#).unwrap();
        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config.cluster_file.as_deref(),
            Some(Path::new("/tmp/run.clusters"))
        );
    }
}
