//! @acp:module "Poll Settings"
//! @acp:summary "Engine settings loaded from .poll.config.json"
//! @acp:domain poll
//! @acp:layer model

use serde::{Deserialize, Serialize};

/// Labels used for synthesized answers and buckets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Labels {
    #[serde(default = "default_yes")]
    pub yes: String,
    #[serde(default = "default_no")]
    pub no: String,
    /// Bucket for free-text answers of enum-or-string lines
    #[serde(default = "default_other")]
    pub other: String,
}

fn default_yes() -> String {
    "Yes".to_string()
}

fn default_no() -> String {
    "No".to_string()
}

fn default_other() -> String {
    "Other".to_string()
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            yes: default_yes(),
            no: default_no(),
            other: default_other(),
        }
    }
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default)]
    pub labels: Labels,
    /// Decimal places kept in stats percentages
    #[serde(default = "default_precision")]
    pub stats_precision: u32,
    /// chrono formats accepted for DATE answers, tried in order
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
    /// Upper bound on replies created by one request
    #[serde(default = "default_max_replies")]
    pub max_replies_per_request: usize,
}

fn default_precision() -> u32 {
    3
}

fn default_date_formats() -> Vec<String> {
    vec!["%Y-%m-%d".to_string()]
}

fn default_max_replies() -> usize {
    500
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            labels: Labels::default(),
            stats_precision: default_precision(),
            date_formats: default_date_formats(),
            max_replies_per_request: default_max_replies(),
        }
    }
}
