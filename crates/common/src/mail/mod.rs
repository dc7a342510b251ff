//! Outgoing mail abstraction
//!
//! Provides a unified interface for mail transports:
//! - Log (writes the message to the log, for development)
//! - HTTP mail APIs (JSON POST with bearer key)

mod template;

pub use template::{escape_html, render_notification_email, RenderedEmail};

use crate::config::{MailConfig, MailProvider};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoffBuilder};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// A message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

/// Trait for mail delivery
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a single message
    async fn send(&self, message: &EmailMessage) -> Result<()>;

    /// Transport name, used in logs
    fn provider(&self) -> &str;
}

/// Logs messages instead of sending them
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        tracing::info!(
            from = %self.from,
            to = %message.to,
            subject = %message.subject,
            html_bytes = message.html.len(),
            "Email delivered to log"
        );
        Ok(())
    }

    fn provider(&self) -> &str {
        "log"
    }
}

/// HTTP mail API client
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
    retry_window: Duration,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

impl HttpMailer {
    pub fn new(
        api_url: String,
        api_key: Option<String>,
        from: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_url,
            api_key,
            from,
            retry_window: Duration::from_secs(30),
        })
    }

    /// Total time spent retrying transient failures
    pub fn with_retry_window(mut self, window: Duration) -> Self {
        self.retry_window = window;
        self
    }

    /// One POST. Server errors, throttling and network failures are
    /// transient; any other non-success status is permanent.
    async fn send_once(
        &self,
        message: &EmailMessage,
    ) -> std::result::Result<(), backoff::Error<AppError>> {
        let body = SendRequest {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
            text: message.text.as_deref(),
        };

        let mut request = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            backoff::Error::transient(AppError::Mail {
                message: format!("Request failed: {}", e),
            })
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let err = AppError::Mail {
            message: format!("Mail API error {}: {}", status, body),
        };

        if status.is_server_error() || status.as_u16() == 429 {
            Err(backoff::Error::transient(err))
        } else {
            Err(backoff::Error::permanent(err))
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(100))
            .with_max_elapsed_time(Some(self.retry_window))
            .build();

        retry(policy, || async {
            self.send_once(message).await.map_err(|e| {
                if let backoff::Error::Transient { err, .. } = &e {
                    tracing::warn!(to = %message.to, error = %err, "Mail request failed, retrying");
                }
                e
            })
        })
        .await
    }

    fn provider(&self) -> &str {
        "http"
    }
}

/// Create a mailer based on configuration
pub fn create_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    match config.provider {
        MailProvider::Log => Ok(Arc::new(LogMailer::new(config.from_address.clone()))),
        MailProvider::Http => {
            let api_url = config.api_url.clone().ok_or_else(|| AppError::Configuration {
                message: "mail.api_url is required for the http provider".to_string(),
            })?;

            Ok(Arc::new(HttpMailer::new(
                api_url,
                config.api_key.clone(),
                config.from_address.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Records deliveries; fails for addresses in `failing`
    #[derive(Default)]
    pub struct MockMailer {
        pub sent: Mutex<Vec<EmailMessage>>,
        pub failing: Vec<String>,
    }

    impl MockMailer {
        pub fn failing_for(addresses: &[&str]) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failing: addresses.iter().map(|a| a.to_string()).collect(),
            }
        }

        pub fn sent_to(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|m| m.to.clone()).collect()
        }
    }

    #[async_trait]
    impl Mailer for MockMailer {
        async fn send(&self, message: &EmailMessage) -> Result<()> {
            if self.failing.contains(&message.to) {
                return Err(AppError::Mail {
                    message: "mailbox unavailable".to_string(),
                });
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }

        fn provider(&self) -> &str {
            "mock"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Captured {
        bodies: Arc<Mutex<Vec<serde_json::Value>>>,
        auth: Arc<Mutex<Vec<String>>>,
        calls: Arc<AtomicUsize>,
    }

    async fn spawn_api(status: StatusCode) -> (String, Captured) {
        let captured = Captured::default();

        let handler = move |State(c): State<Captured>,
                            headers: HeaderMap,
                            Json(body): Json<serde_json::Value>| async move {
            c.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(v) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
                c.auth.lock().unwrap().push(v.to_string());
            }
            c.bodies.lock().unwrap().push(body);
            status
        };

        let app = Router::new()
            .route("/send", post(handler))
            .with_state(captured.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/send", addr), captured)
    }

    fn message() -> EmailMessage {
        EmailMessage {
            to: "reader@example.org".to_string(),
            subject: "Casefile: Water tender".to_string(),
            html: "<p>update</p>".to_string(),
            text: Some("update".to_string()),
        }
    }

    #[test]
    fn test_log_mailer_always_succeeds() {
        let mailer = LogMailer::new("noreply@casefile.local");
        tokio_test::assert_ok!(tokio_test::block_on(mailer.send(&message())));
        assert_eq!(mailer.provider(), "log");
    }

    #[tokio::test]
    async fn test_http_mailer_posts_json_with_bearer_key() {
        let (url, captured) = spawn_api(StatusCode::ACCEPTED).await;
        let mailer = HttpMailer::new(
            url,
            Some("key-123".to_string()),
            "desk@casefile.local".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();

        mailer.send(&message()).await.unwrap();

        let bodies = captured.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["from"], "desk@casefile.local");
        assert_eq!(bodies[0]["to"], "reader@example.org");
        assert_eq!(bodies[0]["text"], "update");
        assert_eq!(captured.auth.lock().unwrap()[0], "Bearer key-123");
    }

    #[tokio::test]
    async fn test_http_mailer_client_error_is_not_retried() {
        let (url, captured) = spawn_api(StatusCode::UNPROCESSABLE_ENTITY).await;
        let mailer = HttpMailer::new(url, None, "a@b.c".into(), Duration::from_secs(5))
            .unwrap()
            .with_retry_window(Duration::from_secs(5));

        let err = mailer.send(&message()).await.unwrap_err();
        assert!(matches!(err, AppError::Mail { .. }));
        assert_eq!(captured.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_http_mailer_server_error_retries_then_fails() {
        let (url, captured) = spawn_api(StatusCode::SERVICE_UNAVAILABLE).await;
        let mailer = HttpMailer::new(url, None, "a@b.c".into(), Duration::from_secs(5))
            .unwrap()
            .with_retry_window(Duration::from_millis(300));

        assert!(mailer.send(&message()).await.is_err());
        assert!(captured.calls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_create_mailer_requires_api_url_for_http() {
        let config = MailConfig {
            provider: MailProvider::Http,
            ..MailConfig::default()
        };
        assert!(matches!(
            create_mailer(&config),
            Err(AppError::Configuration { .. })
        ));

        let mailer = create_mailer(&MailConfig::default()).unwrap();
        assert_eq!(mailer.provider(), "log");
    }
}
