//! `prometheus` probe — scrape a metrics endpoint and evaluate named
//! threshold checks (§6).

use crate::core::model::{AttributeMap, MeasurementRow, ProbeOutcome};
use crate::probes::{Probe, ProbeError};
use async_trait::async_trait;
use isahc::{config::Configurable, AsyncReadResponseExt, Request, RequestExt};
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;

/// A single threshold check against one scraped metric. `DiskFree` alerts
/// when the sampled value drops below the threshold; `AptPending` and
/// `Bandwidth` alert when it rises above.
#[derive(Debug, Clone)]
pub enum CheckKind {
    DiskFree,
    AptPending,
    Bandwidth,
}

#[derive(Debug, Clone)]
pub struct PrometheusCheck {
    pub kind: CheckKind,
    pub metric: String,
    pub threshold: f64,
}

pub struct PrometheusProbe {
    description: String,
    url: String,
    checks: Vec<PrometheusCheck>,
    line_re: Regex,
}

impl PrometheusProbe {
    pub fn new(url: &str, checks: Vec<PrometheusCheck>) -> Result<Self, ProbeError> {
        if checks.is_empty() {
            return Err(ProbeError::invalid("checks", "at least one check is required"));
        }
        Ok(Self {
            description: format!("prometheus thresholds for {url}"),
            url: url.to_string(),
            checks,
            line_re: Regex::new(r"^(?P<name>[a-zA-Z_:][a-zA-Z0-9_:]*)(\{[^}]*\})?\s+(?P<value>[-+0-9.eE]+)\s*$")
                .expect("static regex is valid"),
        })
    }

    fn parse(&self, body: &str) -> HashMap<String, f64> {
        let mut values = HashMap::new();
        for line in body.lines() {
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            if let Some(caps) = self.line_re.captures(line) {
                if let Ok(value) = caps["value"].parse::<f64>() {
                    values.insert(caps["name"].to_string(), value);
                }
            }
        }
        values
    }
}

#[async_trait]
impl Probe for PrometheusProbe {
    fn kind(&self) -> &'static str {
        "prometheus"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn attributes(&self) -> AttributeMap {
        AttributeMap::from_iter([("url".to_string(), self.url.clone().into())])
    }

    async fn run(&self) -> ProbeOutcome {
        let mut outcome = ProbeOutcome::new();

        let request = match Request::get(&self.url).timeout(Duration::from_secs(10)).body(()) {
            Ok(r) => r,
            Err(err) => {
                outcome.add_reason("", format!("failed to build request: {err}"));
                return outcome;
            }
        };

        let body = match request.send_async().await {
            Ok(mut response) => match response.text().await {
                Ok(b) => b,
                Err(err) => {
                    outcome.add_reason("", format!("failed to read response body: {err}"));
                    return outcome;
                }
            },
            Err(err) => {
                outcome.add_reason("", format!("scrape failed: {err}"));
                return outcome;
            }
        };

        let values = self.parse(&body);

        for check in &self.checks {
            let Some(&value) = values.get(&check.metric) else {
                outcome.add_reason(&check.metric, "metric not present in scrape".to_string());
                continue;
            };

            let mut row = MeasurementRow::new();
            row.insert("value".to_string(), value.into());
            outcome.add_measurement(&check.metric, row);

            let breached = match check.kind {
                CheckKind::DiskFree => value < check.threshold,
                CheckKind::AptPending | CheckKind::Bandwidth => value > check.threshold,
            };
            if breached {
                outcome.add_reason(
                    &check.metric,
                    format!("{} = {value} breaches threshold {}", check.metric, check.threshold),
                );
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_exposition_lines() {
        let probe = PrometheusProbe::new(
            "http://localhost:9100/metrics",
            vec![PrometheusCheck { kind: CheckKind::DiskFree, metric: "node_filesystem_free_bytes".to_string(), threshold: 1e9 }],
        )
        .unwrap();
        let values = probe.parse("node_filesystem_free_bytes{mountpoint=\"/\"} 5000000000\n# HELP ignored\n");
        assert_eq!(values.get("node_filesystem_free_bytes"), Some(&5e9));
    }

    #[test]
    fn requires_at_least_one_check() {
        assert!(PrometheusProbe::new("http://localhost/metrics", vec![]).is_err());
    }
}
