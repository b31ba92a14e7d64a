//! `httpredir` probe — verify an HTTP redirect lands on the expected URL (§6).

use crate::core::model::{AttributeMap, MeasurementRow, ProbeOutcome};
use crate::probes::{Probe, ProbeError};
use async_trait::async_trait;
use isahc::config::{Configurable, RedirectPolicy};
use isahc::{HttpClient, Request, RequestExt};
use std::time::{Duration, Instant};
use url::Url;

pub struct HttpRedirProbe {
    description: String,
    from_url: Url,
    to_url: Url,
}

impl HttpRedirProbe {
    pub fn new(from_url: &str, to_url: &str) -> Result<Self, ProbeError> {
        let from = Url::parse(from_url).map_err(|e| ProbeError::invalid("fromUrl", e.to_string()))?;
        let to = Url::parse(to_url).map_err(|e| ProbeError::invalid("toUrl", e.to_string()))?;
        Ok(Self {
            description: format!("redirect {from_url} -> {to_url}"),
            from_url: from,
            to_url: to,
        })
    }
}

#[async_trait]
impl Probe for HttpRedirProbe {
    fn kind(&self) -> &'static str {
        "httpredir"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn attributes(&self) -> AttributeMap {
        AttributeMap::from_iter([
            ("fromUrl".to_string(), self.from_url.to_string().into()),
            ("toUrl".to_string(), self.to_url.to_string().into()),
        ])
    }

    async fn run(&self) -> ProbeOutcome {
        let mut outcome = ProbeOutcome::new();

        let client = match HttpClient::builder().redirect_policy(RedirectPolicy::None).timeout(Duration::from_secs(10)).build() {
            Ok(c) => c,
            Err(err) => {
                outcome.add_reason("", format!("failed to build HTTP client: {err}"));
                return outcome;
            }
        };

        let request = match Request::get(self.from_url.as_str()).body(()) {
            Ok(r) => r,
            Err(err) => {
                outcome.add_reason("", format!("failed to build request: {err}"));
                return outcome;
            }
        };

        let start = Instant::now();
        match client.send_async(request).await {
            Ok(response) => {
                let msec = start.elapsed().as_millis() as i64;
                let mut row = MeasurementRow::new();
                row.insert("http-code".to_string(), (response.status().as_u16() as i64).into());
                row.insert("msec".to_string(), msec.into());

                if !response.status().is_redirection() {
                    outcome.add_reason("", format!("expected a redirect, got HTTP {}", response.status()));
                } else {
                    match response.headers().get("location").and_then(|v| v.to_str().ok()) {
                        Some(location) if location == self.to_url.as_str() => {}
                        Some(location) => {
                            outcome.add_reason("", format!("redirected to '{location}', expected '{}'", self.to_url));
                        }
                        None => outcome.add_reason("", "redirect response had no Location header".to_string()),
                    }
                }

                outcome.add_measurement("", row);
            }
            Err(err) => outcome.add_reason("", format!("request failed: {err}")),
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_urls() {
        assert!(HttpRedirProbe::new("not a url", "https://example.com").is_err());
        assert!(HttpRedirProbe::new("https://example.com", "not a url").is_err());
    }
}
