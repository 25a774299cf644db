//! Process configuration, resolved once at startup from the environment.
//!
//! The autonomous-mode flag and approval threshold are intentionally *not*
//! read from ambient globals at decision time: they are loaded here, carried
//! in `AutonomySettings`, and threaded into the decision policy explicitly.

use std::time::Duration;

/// Runtime settings for the ingestion scheduler.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Cron-like cadence expression. Only the `*/N * * * *` minute form is
    /// interpreted; anything else falls back to a 15 minute interval.
    pub cadence: String,
    pub enabled: bool,
    /// Delay before the first cycle after startup.
    pub grace_delay: Duration,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            cadence: "*/15 * * * *".to_string(),
            enabled: true,
            grace_delay: Duration::from_secs(5),
        }
    }
}

impl IngestionConfig {
    /// Interval between cycles derived from the cadence expression.
    pub fn interval(&self) -> Duration {
        parse_cadence(&self.cadence).unwrap_or(Duration::from_secs(15 * 60))
    }
}

/// Parse the `*/N * * * *` (every N minutes) cadence form.
fn parse_cadence(expr: &str) -> Option<Duration> {
    let mut fields = expr.split_whitespace();
    let minute = fields.next()?;
    if fields.count() != 4 {
        return None;
    }
    if minute == "*" {
        return Some(Duration::from_secs(60));
    }
    let n: u64 = minute.strip_prefix("*/")?.parse().ok()?;
    if n == 0 {
        return None;
    }
    Some(Duration::from_secs(n * 60))
}

/// Top-level settings for the platform core.
#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub openweather_api_key: Option<String>,
    pub autonomous_mode: bool,
    pub auto_approve_threshold: f64,
    pub ingestion: IngestionConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: "vigil.db".to_string(),
            gemini_api_key: None,
            gemini_model: "gemini-1.5-pro".to_string(),
            openweather_api_key: None,
            autonomous_mode: false,
            auto_approve_threshold: 0.95,
            ingestion: IngestionConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut ingestion = IngestionConfig::default();
        if let Ok(cadence) = std::env::var("INGESTION_SCHEDULE") {
            ingestion.cadence = cadence;
        }
        if let Ok(enabled) = std::env::var("INGESTION_ENABLED") {
            ingestion.enabled = enabled != "false";
        }

        Self {
            db_path: std::env::var("VIGIL_DB_PATH").unwrap_or(defaults.db_path),
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            gemini_model: std::env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            openweather_api_key: std::env::var("OPENWEATHERMAP_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            autonomous_mode: std::env::var("AUTONOMOUS_MODE")
                .map(|v| v == "true")
                .unwrap_or(defaults.autonomous_mode),
            auto_approve_threshold: std::env::var("AUTO_APPROVE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.auto_approve_threshold),
            ingestion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_every_n_minutes() {
        assert_eq!(
            parse_cadence("*/15 * * * *"),
            Some(Duration::from_secs(900))
        );
        assert_eq!(parse_cadence("*/1 * * * *"), Some(Duration::from_secs(60)));
        assert_eq!(parse_cadence("* * * * *"), Some(Duration::from_secs(60)));
    }

    #[test]
    fn unparsable_cadence_falls_back_to_default() {
        assert_eq!(parse_cadence("0 3 * * 1"), None);
        assert_eq!(parse_cadence("*/0 * * * *"), None);
        assert_eq!(parse_cadence("garbage"), None);

        let config = IngestionConfig {
            cadence: "garbage".to_string(),
            ..Default::default()
        };
        assert_eq!(config.interval(), Duration::from_secs(900));
    }
}
