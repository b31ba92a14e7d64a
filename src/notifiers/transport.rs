//! HTTP transport seam for the webhook-style notifiers.
//!
//! A thin async trait stands between the notifier logic and the real HTTP
//! client so tests can swap in a recording double instead of making network
//! calls.

use async_trait::async_trait;
use isahc::{AsyncReadResponseExt, Request, RequestExt};

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST `body` to `url` with `content_type` and extra `headers`,
    /// returning the response status code or a transport-level error
    /// message.
    async fn post(
        &self,
        url: &str,
        content_type: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> Result<u16, String>;
}

/// Real transport backed by `isahc`.
pub struct IsahcTransport;

#[async_trait]
impl HttpTransport for IsahcTransport {
    async fn post(
        &self,
        url: &str,
        content_type: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> Result<u16, String> {
        let mut builder = Request::post(url).header("content-type", content_type);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(body).map_err(|e| e.to_string())?;
        let mut response = request.send_async().await.map_err(|e| e.to_string())?;
        // Drain the body so the connection can be reused; notifiers don't
        // need the payload.
        let _ = response.text().await;
        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub url: String,
        pub content_type: String,
        pub body: String,
    }

    #[derive(Default)]
    pub struct RecordingTransport {
        pub requests: Mutex<Vec<RecordedRequest>>,
        pub respond_with: u16,
    }

    impl RecordingTransport {
        pub fn new(respond_with: u16) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                respond_with,
            }
        }
    }

    #[async_trait]
    impl HttpTransport for RecordingTransport {
        async fn post(
            &self,
            url: &str,
            content_type: &str,
            _headers: &[(&str, &str)],
            body: Vec<u8>,
        ) -> Result<u16, String> {
            self.requests.lock().await.push(RecordedRequest {
                url: url.to_string(),
                content_type: content_type.to_string(),
                body: String::from_utf8_lossy(&body).to_string(),
            });
            Ok(self.respond_with)
        }
    }
}
