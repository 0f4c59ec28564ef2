use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `ENGAGE__` and optional TOML config files.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub abtest: AbTestConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub followup: FollowUpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    /// Granularity used when a caller does not name one: week, month or year.
    #[serde(default = "default_granularity")]
    pub default_granularity: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbTestConfig {
    /// Per-variant enrollment below which a report is flagged inconclusive.
    /// Zero disables the gate; the raw winner comparison is never affected.
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: u64,
    #[serde(default = "default_split_percentage")]
    pub default_split_percentage: u8,
    /// Sticky assignment hashes the contact id so re-entries land on the
    /// same variant; otherwise each entry rolls fresh.
    #[serde(default = "default_sticky_assignment")]
    pub sticky_assignment: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Upper bound on due items drained per runner pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowUpConfig {
    #[serde(default = "default_followup_delay_days")]
    pub default_delay_days: u32,
}

// Default functions
fn default_instance_id() -> String {
    "engage-01".to_string()
}
fn default_granularity() -> String {
    "month".to_string()
}
fn default_min_sample_size() -> u64 {
    0
}
fn default_split_percentage() -> u8 {
    50
}
fn default_sticky_assignment() -> bool {
    true
}
fn default_batch_size() -> usize {
    500
}
fn default_followup_delay_days() -> u32 {
    3
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            default_granularity: default_granularity(),
        }
    }
}

impl Default for AbTestConfig {
    fn default() -> Self {
        Self {
            min_sample_size: default_min_sample_size(),
            default_split_percentage: default_split_percentage(),
            sticky_assignment: default_sticky_assignment(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

impl Default for FollowUpConfig {
    fn default() -> Self {
        Self {
            default_delay_days: default_followup_delay_days(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            instance_id: default_instance_id(),
            calendar: CalendarConfig::default(),
            abtest: AbTestConfig::default(),
            delivery: DeliveryConfig::default(),
            followup: FollowUpConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and optional config file.
    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("ENGAGE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            )
            .build()?;
        config.try_deserialize()
    }
}
