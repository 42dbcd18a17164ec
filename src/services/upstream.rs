//! HTTP client for the OpenAI-compatible inference server.

use crate::config::Config;
use crate::types::message::CompletionRequest;
use bytes::Bytes;
use futures::Stream;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("inference server unreachable: {0}")]
    Unreachable(String),
    #[error("inference server timed out")]
    Timeout,
    #[error("inference server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Unreachable(err.to_string())
        }
    }

    /// Transient failures are worth retrying in buffered mode.
    fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Timeout => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Malformed(_) => false,
        }
    }
}

/// Parsed buffered completion: the assistant's text plus the upstream
/// token-usage object when the server reports one.
#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub content: String,
    pub usage: Option<Value>,
}

pub struct UpstreamClient {
    http: reqwest::Client,
    config: Arc<Config>,
}

impl UpstreamClient {
    pub fn new(config: Arc<Config>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.probe_timeout())
            .build()?;
        Ok(Self { http, config })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.upstream_base_url.trim_end_matches('/')
        )
    }

    fn models_url(&self) -> String {
        format!(
            "{}/v1/models",
            self.config.upstream_base_url.trim_end_matches('/')
        )
    }

    /// Single buffered completion, retrying transient failures a fixed
    /// number of times with a fixed backoff.
    pub async fn send_buffered(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResult, UpstreamError> {
        let mut attempt = 0;
        loop {
            match self.post_completion(request).await {
                Ok(result) => return Ok(result),
                Err(err) if err.is_transient() && attempt < self.config.retry_attempts => {
                    attempt += 1;
                    tracing::warn!(
                        "upstream request failed ({}), retry {}/{}",
                        err,
                        attempt,
                        self.config.retry_attempts
                    );
                    tokio::time::sleep(self.config.retry_backoff()).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn post_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResult, UpstreamError> {
        let response = self
            .http
            .post(self.completions_url())
            .timeout(self.config.request_timeout())
            .json(request)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::Malformed(e.to_string()))?;
        parse_completion(&payload)
    }

    /// Open a long-lived streaming completion and yield raw response bytes
    /// as they arrive. Dropping the returned stream closes the connection.
    pub async fn send_streaming(
        &self,
        request: &CompletionRequest,
    ) -> Result<impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static, UpstreamError>
    {
        let response = self
            .http
            .post(self.completions_url())
            .timeout(self.config.stream_timeout())
            .json(request)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes_stream())
    }

    /// Quick reachability check against `/v1/models`, bounded by the short
    /// probe timeout. Drives both `/api/chat/model-status` and the
    /// fallback decision for the streaming path.
    pub async fn probe(&self) -> Result<Value, UpstreamError> {
        let response = self
            .http
            .get(self.models_url())
            .timeout(self.config.probe_timeout())
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamError::Malformed(e.to_string()))
    }
}

fn parse_completion(payload: &Value) -> Result<CompletionResult, UpstreamError> {
    let content = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            UpstreamError::Malformed("missing choices[0].message.content".to_string())
        })?;

    Ok(CompletionResult {
        content: content.to_string(),
        usage: payload.get("usage").cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_completion() {
        let payload = json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello!"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        });
        let result = parse_completion(&payload).unwrap();
        assert_eq!(result.content, "Hello!");
        assert_eq!(result.usage.unwrap()["completion_tokens"], 3);
    }

    #[test]
    fn test_parse_completion_without_usage() {
        let payload = json!({
            "choices": [{"message": {"content": "ok"}}]
        });
        let result = parse_completion(&payload).unwrap();
        assert_eq!(result.content, "ok");
        assert!(result.usage.is_none());
    }

    #[test]
    fn test_parse_completion_missing_content_is_malformed() {
        let payload = json!({"choices": []});
        assert!(matches!(
            parse_completion(&payload),
            Err(UpstreamError::Malformed(_))
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(UpstreamError::Timeout.is_transient());
        assert!(UpstreamError::Unreachable("refused".into()).is_transient());
        assert!(UpstreamError::Http {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!UpstreamError::Http {
            status: 404,
            body: String::new()
        }
        .is_transient());
        assert!(!UpstreamError::Malformed("bad json".into()).is_transient());
    }
}
