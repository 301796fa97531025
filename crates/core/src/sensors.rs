//! Sensor profiles: which queue each worker reads and how it judges trends.
//!
//! Parsed from `pitwatch.toml`:
//!
//! ```toml
//! reading_interval_secs = 30
//!
//! [sensors.smoker]
//! label = "Smoker"
//! queue = "01-smoker"
//! column = 1
//! window = 5
//! policy = { kind = "rate_of_change", tolerance = 15.0 }
//!
//! [sensors.food-a]
//! label = "Food A"
//! queue = "02-food-A"
//! column = 2
//! window = 20
//! policy = { kind = "stall", min_span = 1.0 }
//! dead_letter_queue = "02-food-A.dead"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Largest window a profile may ask for, in readings.
pub const MAX_WINDOW: usize = 10_000;

// ── Top-level config ────────────────────────────────────────────────

/// All sensor profiles plus the producer cadence they are tuned for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    /// Seconds between ticks of the producer; used to express a window as a duration.
    #[serde(default = "default_reading_interval")]
    pub reading_interval_secs: u64,

    /// Sensor profiles keyed by sensor name.
    #[serde(default)]
    pub sensors: BTreeMap<String, SensorConfig>,
}

fn default_reading_interval() -> u64 {
    30
}

/// One sensor stream: its queue, dataset column, window and trend policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SensorConfig {
    /// Human-readable name used in alert text. Defaults to the sensor key.
    #[serde(default)]
    pub label: Option<String>,

    /// Durable queue this sensor's readings are published to.
    pub queue: String,

    /// Column of the source dataset holding this sensor's values (0 is the timestamp).
    pub column: usize,

    /// Sliding window capacity, in readings.
    pub window: usize,

    /// Trend policy applied to the window.
    pub policy: PolicySpec,

    /// Queue receiving bodies that could not be decoded.
    #[serde(default)]
    pub dead_letter_queue: Option<String>,

    /// Minijinja template for the alert subject.
    #[serde(default)]
    pub subject: Option<String>,

    /// Minijinja template for the alert body.
    #[serde(default)]
    pub body: Option<String>,
}

/// Serializable description of a trend policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicySpec {
    /// Alert when any earlier sample in the window differs from the latest by more than `tolerance`.
    RateOfChange { tolerance: f64 },
    /// Alert when a full window spans less than `min_span` from first to last.
    Stall { min_span: f64 },
}

impl PolicySpec {
    /// The configured threshold, whichever kind this is.
    pub fn threshold(&self) -> f64 {
        match self {
            PolicySpec::RateOfChange { tolerance } => *tolerance,
            PolicySpec::Stall { min_span } => *min_span,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PolicySpec::RateOfChange { .. } => "rate_of_change",
            PolicySpec::Stall { .. } => "stall",
        }
    }
}

impl SensorConfig {
    /// Label for alert text, falling back to the sensor key.
    pub fn display_label<'a>(&'a self, name: &'a str) -> &'a str {
        self.label.as_deref().unwrap_or(name)
    }

    /// Wall-clock time covered by a full window at the given cadence.
    pub fn window_secs(&self, reading_interval_secs: u64) -> u64 {
        (self.window as u64).saturating_mul(reading_interval_secs)
    }
}

// ── Loading & Validation ────────────────────────────────────────────

impl MonitorConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, CoreError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// The reference cooking session: one smoker and two food probes.
    pub fn reference() -> Self {
        let mut sensors = BTreeMap::new();
        sensors.insert(
            "smoker".to_string(),
            SensorConfig {
                label: Some("Smoker".into()),
                queue: "01-smoker".into(),
                column: 1,
                window: 5,
                policy: PolicySpec::RateOfChange { tolerance: 15.0 },
                dead_letter_queue: None,
                subject: None,
                body: None,
            },
        );
        sensors.insert(
            "food-a".to_string(),
            SensorConfig {
                label: Some("Food A".into()),
                queue: "02-food-A".into(),
                column: 2,
                window: 20,
                policy: PolicySpec::Stall { min_span: 1.0 },
                dead_letter_queue: None,
                subject: None,
                body: None,
            },
        );
        sensors.insert(
            "food-b".to_string(),
            SensorConfig {
                label: Some("Food B".into()),
                queue: "03-food-B".into(),
                column: 3,
                window: 20,
                policy: PolicySpec::Stall { min_span: 1.0 },
                dead_letter_queue: None,
                subject: None,
                body: None,
            },
        );
        Self {
            reading_interval_secs: default_reading_interval(),
            sensors,
        }
    }

    /// Look up a sensor profile by name.
    pub fn sensor(&self, name: &str) -> Result<&SensorConfig, CoreError> {
        self.sensors
            .get(name)
            .ok_or_else(|| CoreError::UnknownSensor(name.to_string()))
    }

    /// Sensors ordered by dataset column.
    pub fn sensors_by_column(&self) -> Vec<(&str, &SensorConfig)> {
        let mut sensors: Vec<_> = self.sensors.iter().map(|(k, v)| (k.as_str(), v)).collect();
        sensors.sort_by_key(|(_, s)| s.column);
        sensors
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// Convention: `PITWATCH_SENSOR_<NAME>_<KEY>` with the sensor name
    /// upper-cased and dashes replaced by underscores:
    /// - `PITWATCH_READING_INTERVAL_SECS` → `reading_interval_secs`
    /// - `PITWATCH_SENSOR_FOOD_A_QUEUE` → `sensors.food-a.queue`
    /// - `PITWATCH_SENSOR_SMOKER_WINDOW` → `sensors.smoker.window`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PITWATCH_READING_INTERVAL_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                self.reading_interval_secs = secs;
            }
        }
        for (name, sensor) in self.sensors.iter_mut() {
            let prefix = format!("PITWATCH_SENSOR_{}", name.to_uppercase().replace('-', "_"));
            if let Ok(v) = std::env::var(format!("{prefix}_QUEUE")) {
                sensor.queue = v;
            }
            if let Ok(v) = std::env::var(format!("{prefix}_WINDOW")) {
                if let Ok(window) = v.parse::<usize>() {
                    sensor.window = window;
                }
            }
        }
    }

    // ── Validation ──────────────────────────────────────────────────

    /// Validate the config: window sizes, thresholds, queue names.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.reading_interval_secs == 0 {
            return Err(CoreError::Config(
                "reading_interval_secs must be greater than zero".into(),
            ));
        }
        if self.sensors.is_empty() {
            return Err(CoreError::Config("at least one sensor is required".into()));
        }

        let mut queues = HashSet::new();
        for (name, sensor) in &self.sensors {
            Self::validate_sensor(name, sensor)?;
            if !queues.insert(sensor.queue.as_str()) {
                return Err(CoreError::Config(format!(
                    "sensor '{name}': queue '{}' is used by another sensor",
                    sensor.queue
                )));
            }
        }
        Ok(())
    }

    fn validate_sensor(name: &str, sensor: &SensorConfig) -> Result<(), CoreError> {
        let fail = |msg: String| Err(CoreError::Config(format!("sensor '{name}': {msg}")));

        if sensor.queue.trim().is_empty() {
            return fail("queue name is empty".into());
        }
        if sensor.column == 0 {
            return fail("column 0 holds the timestamp".into());
        }
        if sensor.window == 0 {
            return fail("window must hold at least one reading".into());
        }
        if sensor.window > MAX_WINDOW {
            return fail(format!(
                "window of {} readings exceeds the maximum of {MAX_WINDOW}",
                sensor.window
            ));
        }
        if sensor.dead_letter_queue.as_deref() == Some(sensor.queue.as_str()) {
            return fail("dead_letter_queue must differ from queue".into());
        }

        match sensor.policy {
            PolicySpec::RateOfChange { tolerance } => {
                if !tolerance.is_finite() || tolerance < 0.0 {
                    return fail(format!("tolerance must be a non-negative number, got {tolerance}"));
                }
            }
            PolicySpec::Stall { min_span } => {
                if !min_span.is_finite() || min_span <= 0.0 {
                    return fail(format!("min_span must be a positive number, got {min_span}"));
                }
                if sensor.window < 2 {
                    return fail("stall detection needs a window of at least 2".into());
                }
            }
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::reference()
    }
}
