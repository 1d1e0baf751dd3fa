use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::config::HttpCfg;
use crate::error::{CoreResult, TutorChatError};

/// Thin wrapper around reqwest::Client with defaults and helpers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new_default() -> CoreResult<Self> {
        Self::new_with(&HttpCfg::default())
    }

    pub fn new_with(cfg: &HttpCfg) -> CoreResult<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .timeout(Duration::from_millis(cfg.request_timeout_ms));
        if let Some(cap) = cfg.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(cap);
        }
        let inner = builder
            .build()
            .map_err(|e| TutorChatError::Other(anyhow::anyhow!("http client build failed: {e}")))?;
        Ok(Self {
            inner,
            user_agent: "tutorchat/0.1".to_string(),
        })
    }

    /// POST a chat request and hand the 2xx response back for the caller to
    /// stream or decode by content type. Non-2xx statuses are mapped here:
    /// 429 and 402 carry a structured `{error}` body surfaced verbatim,
    /// everything else collapses to the generic start failure.
    pub async fn post_chat(
        &self,
        url: &str,
        body: &serde_json::Value,
        headers: &[(&str, &str)],
    ) -> CoreResult<reqwest::Response> {
        let mut req = self
            .inner
            .post(url)
            .json(body)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "text/event-stream");
        for (k, v) in headers {
            req = req.header(*k, *v);
        }

        let resp = req.send().await.map_err(|e| {
            tracing::warn!(error = %e, "chat request could not be sent");
            TutorChatError::send_failed()
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_error(status, &text));
        }
        Ok(resp)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

fn map_http_error(status: StatusCode, body: &str) -> TutorChatError {
    let structured = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.error)
        .filter(|m| !m.is_empty());
    match (status, structured) {
        (StatusCode::TOO_MANY_REQUESTS, Some(message)) => TutorChatError::RateLimited { message },
        (StatusCode::PAYMENT_REQUIRED, Some(message)) => TutorChatError::QuotaExceeded { message },
        (status, _) => {
            tracing::warn!(status = %status, body = %truncate(body, 300), "chat request rejected");
            TutorChatError::stream_start_failed()
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut t = s[..max].to_string();
        t.push_str("...");
        t
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;

    #[tokio::test]
    async fn post_chat_2xx_passes_response_through() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST).path("/api/chat");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body("data: [DONE]\n");
        });

        let client = HttpClient::new_default().unwrap();
        let resp = client
            .post_chat(
                &format!("{}/api/chat", server.base_url()),
                &json!({"messages": []}),
                &[("x-api-key", "test-key")],
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body = resp.text().await.unwrap();
        assert_eq!(body, "data: [DONE]\n");
        m.assert();
    }

    #[tokio::test]
    async fn structured_429_surfaces_message_verbatim() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/api/chat");
            then.status(429)
                .json_body(json!({"error": "Rate limit exceeded. Try again in 30 seconds."}));
        });

        let client = HttpClient::new_default().unwrap();
        let err = client
            .post_chat(
                &format!("{}/api/chat", server.base_url()),
                &json!({"messages": []}),
                &[],
            )
            .await
            .unwrap_err();
        match err {
            TutorChatError::RateLimited { message } => {
                assert_eq!(message, "Rate limit exceeded. Try again in 30 seconds.");
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn structured_402_surfaces_message_verbatim() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/api/chat");
            then.status(402)
                .json_body(json!({"error": "Monthly quota exhausted."}));
        });

        let client = HttpClient::new_default().unwrap();
        let err = client
            .post_chat(
                &format!("{}/api/chat", server.base_url()),
                &json!({"messages": []}),
                &[],
            )
            .await
            .unwrap_err();
        match err {
            TutorChatError::QuotaExceeded { message } => {
                assert_eq!(message, "Monthly quota exhausted.");
            }
            other => panic!("expected QuotaExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unstructured_429_falls_back_to_generic_failure() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/api/chat");
            then.status(429).body("slow down");
        });

        let client = HttpClient::new_default().unwrap();
        let err = client
            .post_chat(
                &format!("{}/api/chat", server.base_url()),
                &json!({"messages": []}),
                &[],
            )
            .await
            .unwrap_err();
        match err {
            TutorChatError::Transport { message } => {
                assert_eq!(message, "failed to start stream");
            }
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_is_generic_failure() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/api/chat");
            then.status(500).body("oops");
        });

        let client = HttpClient::new_default().unwrap();
        let err = client
            .post_chat(
                &format!("{}/api/chat", server.base_url()),
                &json!({"messages": []}),
                &[],
            )
            .await
            .unwrap_err();
        match err {
            TutorChatError::Transport { message } => {
                assert_eq!(message, "failed to start stream");
            }
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn network_error_is_send_failure() {
        // Port 9 (discard) is typically closed.
        let client = HttpClient::new_default().unwrap();
        let err = client
            .post_chat("http://127.0.0.1:9/api/chat", &json!({}), &[])
            .await
            .unwrap_err();
        match err {
            TutorChatError::Transport { message } => {
                assert_eq!(message, "failed to send message");
            }
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[test]
    fn truncate_caps_long_bodies() {
        let big = "x".repeat(1000);
        let t = truncate(&big, 300);
        assert_eq!(t.len(), 303);
        assert!(t.ends_with("..."));
        assert_eq!(truncate("short", 300), "short");
    }
}
