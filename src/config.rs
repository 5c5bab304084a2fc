use std::env;
use serde::{Deserialize, Serialize};

/// Tunables for the analysis engine. Defaults match what the web front end expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// How many extremes top/bottom/comparison routines return
    pub top_n: usize,
    /// How many categories a breakdown reports
    pub breakdown_top_k: usize,
    /// How many non-missing values are sampled when sniffing date columns
    pub type_sample_rows: usize,
    /// How many recent history entries feed related suggestions
    pub history_window: usize,
    pub max_distribution_columns: usize,
    pub focused_correlation_columns: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            breakdown_top_k: 10,
            type_sample_rows: 10,
            history_window: 5,
            max_distribution_columns: 3,
            focused_correlation_columns: 3,
        }
    }
}

/// Settings for the process around the engine: HTTP port, chart directory and the
/// optional text generation service. Read from the environment after `.env` is loaded.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub static_dir: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let static_dir = env::var("TABQUERY_STATIC_DIR").unwrap_or_else(|_| "static".to_string());
        let gemini_api_key = env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty());
        let gemini_model = env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string());

        crate::debug_note!("Service config: port={} static_dir={} model={} key_len={}",
            port, static_dir, gemini_model, gemini_api_key.as_ref().map(|k| k.len()).unwrap_or(0));

        Self { port, static_dir, gemini_api_key, gemini_model }
    }
}
