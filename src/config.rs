//! Configuration for the proctoring monitor.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Label substrings that mark an object as suspicious by default.
pub const DEFAULT_SUSPICIOUS_LABELS: &[&str] = &[
    "phone", "cell", "book", "notebook", "paper", "laptop", "tablet",
];

/// Main configuration for the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Thresholds driving the event-detection trackers
    pub thresholds: Thresholds,

    /// Label substrings treated as prohibited objects
    pub suspicious_labels: SuspiciousLabels,

    /// How to treat a frame whose timestamp is earlier than the previous one
    pub clock_policy: ClockPolicy,

    /// Sessions without frames for this long are closed by `close_idle`
    #[serde(with = "duration_serde")]
    pub session_idle_timeout: Duration,

    /// Capacity of the queue in front of the event sink
    pub sink_queue_capacity: usize,

    /// Path for stored events and transparency stats
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("proctor-watch");

        Self {
            thresholds: Thresholds::default(),
            suspicious_labels: SuspiciousLabels::default(),
            clock_policy: ClockPolicy::default(),
            session_idle_timeout: Duration::from_secs(300), // 5 minutes
            sink_queue_capacity: 1_024,
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit file, falling back to defaults
    /// when the file does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("proctor-watch")
            .join("config.json")
    }

    /// Directory holding one JSON-lines event file per candidate.
    pub fn events_path(&self) -> PathBuf {
        self.data_path.join("events")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(self.events_path())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Reject settings the trackers cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        if self.suspicious_labels.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one suspicious label is required".to_string(),
            ));
        }
        if self.sink_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "sink_queue_capacity must be positive".to_string(),
            ));
        }
        if self.session_idle_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "session_idle_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Named thresholds for the trackers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Sustained absence before NO_FACE is raised (and its repeat interval)
    #[serde(with = "duration_serde")]
    pub no_face: Duration,
    /// Minimum spacing between MULTIPLE_FACES events
    #[serde(with = "duration_serde")]
    pub multi_face_cooldown: Duration,
    /// Sustained deviation before FOCUS_LOST is raised
    #[serde(with = "duration_serde")]
    pub focus_away: Duration,
    /// Largest |head offset| still considered looking at the screen
    pub center: f64,
    /// Minimum spacing between OBJECT_DETECTED events for one label
    #[serde(with = "duration_serde")]
    pub object_cooldown: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            no_face: Duration::from_secs(10),
            multi_face_cooldown: Duration::from_secs(10),
            focus_away: Duration::from_secs(5),
            center: 0.15,
            object_cooldown: Duration::from_secs(5),
        }
    }
}

impl Thresholds {
    fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("no_face", self.no_face),
            ("multi_face_cooldown", self.multi_face_cooldown),
            ("focus_away", self.focus_away),
            ("object_cooldown", self.object_cooldown),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if !(self.center > 0.0 && self.center <= 0.5) {
            return Err(ConfigError::Invalid(format!(
                "center threshold {} outside (0, 0.5]",
                self.center
            )));
        }
        Ok(())
    }
}

/// Set of normalized label substrings that flag an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct SuspiciousLabels {
    keywords: Vec<String>,
}

impl Default for SuspiciousLabels {
    fn default() -> Self {
        Self::new(DEFAULT_SUSPICIOUS_LABELS.iter().copied())
    }
}

impl SuspiciousLabels {
    /// Build a label set, normalizing and de-duplicating the keywords.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = keywords
            .into_iter()
            .map(|k| normalize_label(k.as_ref()))
            .filter(|k| !k.is_empty())
            .collect();
        normalized.sort();
        normalized.dedup();
        Self {
            keywords: normalized,
        }
    }

    /// Parse a label set from a comma-separated string.
    pub fn from_csv(s: &str) -> Self {
        Self::new(s.split(','))
    }

    /// Whether a (raw) detector label contains any suspicious keyword.
    pub fn matches(&self, label: &str) -> bool {
        let label = normalize_label(label);
        self.keywords.iter().any(|k| label.contains(k.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl From<Vec<String>> for SuspiciousLabels {
    fn from(keywords: Vec<String>) -> Self {
        Self::new(keywords)
    }
}

impl From<SuspiciousLabels> for Vec<String> {
    fn from(labels: SuspiciousLabels) -> Self {
        labels.keywords
    }
}

/// Case-fold and trim a label so "Cell Phone " and "cell phone" share a key.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Policy for frames arriving with a timestamp earlier than the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockPolicy {
    /// Refuse the frame with a dedicated error
    #[default]
    Reject,
    /// Treat the frame as if it arrived at the last observed instant
    Clamp,
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as fractional seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.thresholds.no_face, Duration::from_secs(10));
        assert_eq!(config.thresholds.multi_face_cooldown, Duration::from_secs(10));
        assert_eq!(config.thresholds.focus_away, Duration::from_secs(5));
        assert_eq!(config.thresholds.object_cooldown, Duration::from_secs(5));
        assert!((config.thresholds.center - 0.15).abs() < f64::EPSILON);
        assert_eq!(config.clock_policy, ClockPolicy::Reject);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_suspicious_label_parsing() {
        let labels = SuspiciousLabels::from_csv(" Phone, book ,,BOOK");
        assert_eq!(labels.keywords(), &["book".to_string(), "phone".to_string()]);

        assert!(labels.matches("cell phone"));
        assert!(labels.matches("  Notebook"));
        assert!(!labels.matches("cup"));
    }

    #[test]
    fn test_default_labels_match_detector_names() {
        let labels = SuspiciousLabels::default();
        assert!(labels.matches("cell phone"));
        assert!(labels.matches("Laptop"));
        assert!(labels.matches("book"));
        assert!(!labels.matches("person"));
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let mut config = Config::default();
        config.thresholds.center = 0.7;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.thresholds.focus_away = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.suspicious_labels = SuspiciousLabels::from_csv(" , ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_json_uses_seconds() {
        let config = Config::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["thresholds"]["no_face"], 10.0);
        assert_eq!(json["clock_policy"], "reject");
        assert!(json["suspicious_labels"].as_array().unwrap().len() >= 7);

        let back: Config = serde_json::from_value(json).unwrap();
        assert_eq!(back.thresholds, config.thresholds);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join(format!("proctor-missing-{}.json", uuid::Uuid::new_v4()));
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.thresholds, Thresholds::default());
    }
}
