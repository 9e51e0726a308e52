use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{Error, RegistryResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub liveness: LivenessConfig,

    #[serde(default)]
    pub sampler: SamplerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// Timeout applied by `LivenessRegistry::register_default`.
    #[serde(default = "default_liveness_timeout", with = "duration_ms")]
    pub default_timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_liveness_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Base period between counter resets.
    #[serde(default = "default_window_interval", with = "duration_ms")]
    pub window_interval: Duration,

    /// Each window is drawn uniformly from `window_interval * (1 ± jitter_ratio)`.
    #[serde(default)]
    pub jitter_ratio: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            window_interval: default_window_interval(),
            jitter_ratio: 0.0,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> RegistryResult<()> {
        if self.window_interval.is_zero() {
            return Err(Error::config("window_interval must be greater than 0"));
        }
        if !(0.0..1.0).contains(&self.jitter_ratio) {
            return Err(Error::config(format!(
                "jitter_ratio must be in [0, 1), got {}",
                self.jitter_ratio
            )));
        }
        Ok(())
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> RegistryResult<()> {
        if self.liveness.default_timeout.is_zero() {
            return Err(Error::config("default_timeout must be greater than 0"));
        }
        self.sampler.validate()
    }

    // JSONファイルから設定を読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> RegistryResult<Self> {
        let config: Self = from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(s: &str) -> RegistryResult<Self> {
        let config: Self = from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> RegistryResult<T> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> RegistryResult<T> {
    let config = serde_json::from_str(s)?;
    Ok(config)
}

fn default_liveness_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_window_interval() -> Duration {
    Duration::from_secs(60)
}

// Duration型のシリアライズ/デシリアライズヘルパー
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_registry_config_serde() {
        let config = RegistryConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        tracing::debug!("{}", json);
        let deserialized: RegistryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = RegistryConfig::from_str(r#"{"sampler": {"window_interval": 250}}"#).unwrap();
        assert_eq!(config.sampler.window_interval, Duration::from_millis(250));
        assert_eq!(config.sampler.jitter_ratio, 0.0);
        assert_eq!(config.liveness.default_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_jitter_is_rejected() {
        let result = RegistryConfig::from_str(r#"{"sampler": {"jitter_ratio": 1.5}}"#);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let config = SamplerConfig {
            window_interval: Duration::ZERO,
            jitter_ratio: 0.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"liveness": {{"default_timeout": 1500}}}}"#).unwrap();

        let config = RegistryConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config.liveness.default_timeout,
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = RegistryConfig::from_file("/nonexistent/pulsekit.json");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
