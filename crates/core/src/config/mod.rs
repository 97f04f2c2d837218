use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::limiter::MAX_UPDATES_PER_SECOND;
use crate::{ColorHsb, Result, SeeingSoundError};

/// Configuration file read when none is given on the command line.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Live tunables of the pipeline. Every key is optional in the persisted
/// document; absent keys take the values from [`Default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub min_frequency: f64,
    pub max_frequency: f64,
    /// RMS at or above which input counts as clipped.
    pub clip_threshold: f64,
    pub max_brightness: u16,
    /// Requested light-write rate. Clamped to 30 on load.
    pub max_updates_per_second: u32,
    /// RMS below which a frame counts as silence.
    pub min_amplitude: f64,
    pub idle_timeout_seconds: f64,
    pub idle_color: ColorHsb,
    #[serde(alias = "active_profile_name")]
    pub profile: String,
    pub log_level: String,
    /// Exponential smoothing factor in `(0, 1]`. Absent disables smoothing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoothing_factor: Option<f64>,
    /// Kelvin sent alongside every color.
    pub color_temperature: u16,
    /// LIFX addresses, `host` or `host:port`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lights: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            min_frequency: 100.0,
            max_frequency: 4_000.0,
            clip_threshold: 32_000.0,
            max_brightness: 60_000,
            max_updates_per_second: MAX_UPDATES_PER_SECOND,
            min_amplitude: 100.0,
            idle_timeout_seconds: 10.0,
            idle_color: ColorHsb::new(6_553, 52_428, 6_000),
            profile: "default".to_string(),
            log_level: "INFO".to_string(),
            smoothing_factor: None,
            color_temperature: 3_500,
            lights: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Reads and validates the document at `path`. A missing file yields the
    /// defaults, unless `required_keys` is non-empty.
    pub fn load(path: &Path, required_keys: &[&str]) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };
        Self::parse(&text, ConfigFormat::from_path(path), required_keys)
    }

    /// Parses a document, checks `required_keys`, clamps and validates.
    pub fn parse(text: &str, format: ConfigFormat, required_keys: &[&str]) -> Result<Self> {
        let mut config = match format {
            ConfigFormat::Yaml => {
                let value: serde_yaml::Value = if text.trim().is_empty() {
                    serde_yaml::Value::Null
                } else {
                    serde_yaml::from_str(text)?
                };
                let value = match value {
                    serde_yaml::Value::Null => serde_yaml::Value::Mapping(Default::default()),
                    serde_yaml::Value::Mapping(_) => value,
                    _ => return Err(SeeingSoundError::invalid_config("document is not a mapping")),
                };
                for key in required_keys {
                    if value.get(*key).map_or(true, serde_yaml::Value::is_null) {
                        return Err(SeeingSoundError::MissingKey((*key).to_string()));
                    }
                }
                serde_yaml::from_value::<RuntimeConfig>(value)?
            }
            ConfigFormat::Json => {
                let value: serde_json::Value = if text.trim().is_empty() {
                    serde_json::Value::Object(Default::default())
                } else {
                    serde_json::from_str(text)?
                };
                if !value.is_object() {
                    return Err(SeeingSoundError::invalid_config("document is not an object"));
                }
                for key in required_keys {
                    if value.get(*key).map_or(true, serde_json::Value::is_null) {
                        return Err(SeeingSoundError::MissingKey((*key).to_string()));
                    }
                }
                serde_json::from_value::<RuntimeConfig>(value)?
            }
        };

        config.clamp_update_rate();
        config.validate()?;
        Ok(config)
    }

    /// Writes the document in the format implied by the file extension.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = match ConfigFormat::from_path(path) {
            ConfigFormat::Yaml => serde_yaml::to_string(self)?,
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
        };
        fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let finite_non_negative = [
            ("min_frequency", self.min_frequency),
            ("max_frequency", self.max_frequency),
            ("min_amplitude", self.min_amplitude),
            ("idle_timeout_seconds", self.idle_timeout_seconds),
        ];
        for (key, value) in finite_non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SeeingSoundError::invalid_config(format!(
                    "`{key}` must be a non-negative number, got {value}"
                )));
            }
        }
        if self.min_frequency >= self.max_frequency {
            return Err(SeeingSoundError::invalid_config(format!(
                "`min_frequency` ({}) must be below `max_frequency` ({})",
                self.min_frequency, self.max_frequency
            )));
        }
        if !(self.clip_threshold > 0.0) {
            return Err(SeeingSoundError::invalid_config(format!(
                "`clip_threshold` must be positive, got {}",
                self.clip_threshold
            )));
        }
        if self.max_updates_per_second == 0 {
            return Err(SeeingSoundError::invalid_config(
                "`max_updates_per_second` must be at least 1",
            ));
        }
        if let Some(alpha) = self.smoothing_factor {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(SeeingSoundError::invalid_config(format!(
                    "`smoothing_factor` must be in (0, 1], got {alpha}"
                )));
            }
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.idle_timeout_seconds).unwrap_or(Duration::MAX)
    }

    /// `tracing` filter directive for `log_level`. Accepts the level names the
    /// external controller writes (`WARNING`, `CRITICAL` included).
    pub fn log_filter(&self) -> &'static str {
        match self.log_level.trim().to_ascii_uppercase().as_str() {
            "TRACE" => "trace",
            "DEBUG" => "debug",
            "INFO" => "info",
            "WARN" | "WARNING" => "warn",
            "ERROR" | "CRITICAL" => "error",
            other => {
                tracing::warn!(level = other, "unknown log level, using INFO");
                "info"
            }
        }
    }

    fn clamp_update_rate(&mut self) {
        if self.max_updates_per_second > MAX_UPDATES_PER_SECOND {
            tracing::warn!(
                requested = self.max_updates_per_second,
                limit = MAX_UPDATES_PER_SECOND,
                "clamping max_updates_per_second"
            );
            self.max_updates_per_second = MAX_UPDATES_PER_SECOND;
        }
    }
}

/// Serialization of the persisted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// `.json` selects JSON; anything else is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Polls the configuration file's modification time and reloads the whole
/// document when it changes.
#[derive(Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    required_keys: Vec<&'static str>,
    last_modified: Option<SystemTime>,
}

impl ConfigWatcher {
    /// Loads the initial configuration. Errors here are fatal to startup.
    pub fn open(
        path: impl Into<PathBuf>,
        required_keys: Vec<&'static str>,
    ) -> Result<(Self, RuntimeConfig)> {
        let path = path.into();
        let last_modified = modified_time(&path);
        let config = RuntimeConfig::load(&path, &required_keys)?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok((
            Self {
                path,
                required_keys,
                last_modified,
            },
            config,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cheap check: one `stat`. Returns a freshly loaded configuration when the
    /// file changed and the new document is valid. An invalid document is
    /// logged and skipped until the file changes again; the caller keeps its
    /// current configuration.
    pub fn poll(&mut self) -> Option<RuntimeConfig> {
        let modified = modified_time(&self.path)?;
        if self.last_modified == Some(modified) {
            return None;
        }
        self.last_modified = Some(modified);

        match RuntimeConfig::load(&self.path, &self.required_keys) {
            Ok(config) => {
                tracing::info!(path = %self.path.display(), "reloaded config");
                Some(config)
            }
            Err(err) => {
                tracing::warn!(%err, path = %self.path.display(), "ignoring invalid config reload");
                None
            }
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn write_with_mtime(path: &Path, contents: &str, secs: u64) {
        let mut file = File::create(path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = RuntimeConfig::parse("", ConfigFormat::Yaml, &[]).unwrap();
        assert_eq!(config, RuntimeConfig::default());

        let config = RuntimeConfig::parse("{}", ConfigFormat::Json, &[]).unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let yaml = "max_frequency: 8000\nlog_level: DEBUG\nactive_profile_name: warm\n";
        let config = RuntimeConfig::parse(yaml, ConfigFormat::Yaml, &[]).unwrap();

        assert_eq!(config.max_frequency, 8_000.0);
        assert_eq!(config.profile, "warm");
        assert_eq!(config.log_filter(), "debug");
        assert_eq!(config.min_frequency, 100.0);
        assert_eq!(config.clip_threshold, 32_000.0);
    }

    #[test]
    fn update_rate_is_clamped_to_thirty() {
        let config =
            RuntimeConfig::parse("max_updates_per_second: 60", ConfigFormat::Yaml, &[]).unwrap();
        assert_eq!(config.max_updates_per_second, 30);
    }

    #[test]
    fn rejects_inverted_band() {
        let err = RuntimeConfig::parse(
            "min_frequency: 5000\nmax_frequency: 4000",
            ConfigFormat::Yaml,
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, SeeingSoundError::InvalidConfig(_)));
    }

    #[test]
    fn reports_missing_required_key() {
        let err = RuntimeConfig::parse("min_frequency: 50", ConfigFormat::Yaml, &["lights"])
            .unwrap_err();
        assert!(matches!(err, SeeingSoundError::MissingKey(key) if key == "lights"));

        let config = RuntimeConfig::parse(
            r#"{"lights": ["192.168.1.20"]}"#,
            ConfigFormat::Json,
            &["lights"],
        )
        .unwrap();
        assert_eq!(config.lights, vec!["192.168.1.20".to_string()]);
    }

    #[test]
    fn log_levels_from_controller_are_understood() {
        let mut config = RuntimeConfig::default();
        for (level, filter) in [("WARNING", "warn"), ("critical", "error"), ("bogus", "info")] {
            config.log_level = level.to_string();
            assert_eq!(config.log_filter(), filter);
        }
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["config.yaml", "config.json"] {
            let path = dir.path().join(name);
            let config = RuntimeConfig {
                max_frequency: 6_000.0,
                smoothing_factor: Some(0.2),
                lights: vec!["10.0.0.7:56700".to_string()],
                ..RuntimeConfig::default()
            };

            config.save(&path).unwrap();
            assert_eq!(RuntimeConfig::load(&path, &[]).unwrap(), config);
        }
    }

    #[test]
    fn watcher_reloads_on_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        write_with_mtime(&path, "max_frequency: 4000\n", 1_000);

        let (mut watcher, config) = ConfigWatcher::open(&path, Vec::new()).unwrap();
        assert_eq!(config.max_frequency, 4_000.0);
        assert!(watcher.poll().is_none());

        write_with_mtime(&path, "max_frequency: 2000\n", 2_000);
        let reloaded = watcher.poll().expect("changed file should reload");
        assert_eq!(reloaded.max_frequency, 2_000.0);
        assert!(watcher.poll().is_none());
    }

    #[test]
    fn watcher_skips_invalid_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        write_with_mtime(&path, "lights: [\"10.0.0.2\"]\n", 1_000);

        let (mut watcher, _) = ConfigWatcher::open(&path, vec!["lights"]).unwrap();

        write_with_mtime(&path, "max_frequency: 2000\n", 2_000);
        assert!(watcher.poll().is_none());

        write_with_mtime(&path, "max_frequency: [not, a, number]\n", 3_000);
        assert!(watcher.poll().is_none());

        write_with_mtime(&path, "lights: [\"10.0.0.2\"]\nmax_frequency: 2000\n", 4_000);
        assert_eq!(watcher.poll().unwrap().max_frequency, 2_000.0);
    }

    #[test]
    fn missing_file_means_defaults_and_no_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");

        let (mut watcher, config) = ConfigWatcher::open(&path, Vec::new()).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert!(watcher.poll().is_none());
        assert!(ConfigWatcher::open(&path, vec!["lights"]).is_err());
    }
}
