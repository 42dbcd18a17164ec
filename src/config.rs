use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub host: String,
    pub port: u16,

    // Upstream inference server
    pub upstream_base_url: String,
    pub model_name: String,

    // Generation defaults
    pub temperature_default: f32,
    pub max_tokens: i32,
    pub history_limit: usize,

    // Timeouts and retry. The probe timeout is deliberately short: it only
    // decides whether to fall back, while the stream timeout accommodates
    // slow local inference.
    pub probe_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub stream_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,

    // Fallback streaming
    pub fallback_word_delay_ms: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,

            upstream_base_url: env::var("UPSTREAM_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:1234".to_string()),
            model_name: env::var("MODEL_NAME")
                .unwrap_or_else(|_| "deepseek/deepseek-r1-0528-qwen3-8b".to_string()),

            temperature_default: 0.7,
            // -1 lets the inference server generate until its own limit
            max_tokens: -1,
            history_limit: 10,

            probe_timeout_secs: env::var("PROBE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            stream_timeout_secs: env::var("STREAM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
            retry_attempts: 2,
            retry_backoff_ms: 500,

            fallback_word_delay_ms: 150,
        })
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn fallback_word_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_word_delay_ms)
    }
}
