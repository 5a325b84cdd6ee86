use serde::{Deserialize, Serialize};

/// Output encoding for console and file layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Level for this crate's targets when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for the daily rolling `app.log` and `error.log`.
    pub directory: String,
    pub format: LogFormat,
}

impl LogConfig {
    pub fn default_filter(&self) -> String {
        format!("quillpress={},tower_http=debug,axum=debug", self.level)
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: "logs".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
