//! `https` probe — content and certificate health over IPv4/IPv6 (§6).
//!
//! Phase timings are pulled from libcurl via a `CurlProbeRunner`/`PhaseTimings`
//! pair, run inside `tokio::task::spawn_blocking` since `curl::easy::Easy` is
//! a blocking API.

use crate::core::model::{AttributeMap, MeasurementRow, ProbeOutcome};
use crate::probes::tls;
use crate::probes::{Probe, ProbeError};
use async_trait::async_trait;
use curl::easy::Easy;
use regex::Regex;
use std::net::IpAddr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
}

#[derive(Debug, Clone)]
struct PhaseTimings {
    status: u16,
    dns_ms: i64,
    total_ms: i64,
    body_size: i64,
}

pub struct HttpsProbe {
    description: String,
    url: Url,
    method: Method,
    min_bytes: Option<u64>,
    min_cert_days: i64,
    regex: Option<Regex>,
    resolve_ipv4: bool,
    resolve_ipv6: bool,
    timeout: Duration,
}

impl HttpsProbe {
    pub fn new(
        url: &str,
        method: Method,
        min_bytes: Option<u64>,
        min_cert_days: Option<i64>,
        regex: Option<String>,
        resolve_ipv4: bool,
        resolve_ipv6: bool,
    ) -> Result<Self, ProbeError> {
        let parsed = Url::parse(url).map_err(|e| ProbeError::invalid("url", e.to_string()))?;
        let regex = regex
            .map(|p| Regex::new(&p).map_err(|e| ProbeError::invalid("regex", e.to_string())))
            .transpose()?;
        Ok(Self {
            description: format!("https {url}"),
            url: parsed,
            method,
            min_bytes,
            min_cert_days: min_cert_days.unwrap_or(14),
            regex,
            resolve_ipv4: resolve_ipv4 || !resolve_ipv6,
            resolve_ipv6,
            timeout: Duration::from_secs(10),
        })
    }

    async fn check_family(&self, family: &str) -> ProbeOutcome {
        let mut outcome = ProbeOutcome::new();

        let timings = run_curl_request(self.url.as_str(), self.method, family, self.timeout).await;
        let (timings, body) = match timings {
            Ok(t) => t,
            Err(err) => {
                outcome.add_reason(family, err);
                return outcome;
            }
        };

        let mut row = MeasurementRow::new();
        row.insert("http-code".to_string(), (timings.status as i64).into());
        row.insert("msec".to_string(), timings.total_ms.into());
        row.insert("dns-msec".to_string(), timings.dns_ms.into());
        row.insert("bodySize".to_string(), timings.body_size.into());

        if !(200..400).contains(&timings.status) {
            outcome.add_reason(family, format!("unexpected HTTP status {}", timings.status));
        }
        if let Some(min_bytes) = self.min_bytes {
            if (timings.body_size as u64) < min_bytes {
                outcome.add_reason(family, format!("body too small: {} < {min_bytes}", timings.body_size));
            }
        }
        if let Some(re) = &self.regex {
            if !re.is_match(&body) {
                outcome.add_reason(family, "response body did not match expected pattern".to_string());
            }
        }

        if self.url.scheme() == "https" {
            let host = self.url.host_str().unwrap_or_default().to_string();
            let port = self.url.port_or_known_default().unwrap_or(443);
            match tls::min_cert_days(&host, port, self.timeout).await {
                Ok((days, _pin)) => {
                    row.insert("tlsMinExpDays".to_string(), days.into());
                    if days < self.min_cert_days {
                        outcome.add_reason(family, format!("certificate expires in {days} days (minimum {})", self.min_cert_days));
                    }
                }
                Err(err) => outcome.add_reason(family, format!("certificate check failed: {err}")),
            }
        }

        outcome.add_measurement(family, row);
        outcome
    }
}

async fn run_curl_request(url: &str, method: Method, family: &str, timeout: Duration) -> Result<(PhaseTimings, String), String> {
    let url = url.to_string();
    let ip_resolve = match family {
        "ipv4" => curl::easy::IpResolve::V4,
        "ipv6" => curl::easy::IpResolve::V6,
        _ => curl::easy::IpResolve::Any,
    };

    tokio::task::spawn_blocking(move || -> Result<(PhaseTimings, String), String> {
        let mut handle = Easy::new();
        handle.url(&url).map_err(|e| e.to_string())?;
        handle.ip_resolve(ip_resolve).map_err(|e| e.to_string())?;
        handle.timeout(timeout).map_err(|e| e.to_string())?;
        if method == Method::Head {
            handle.nobody(true).map_err(|e| e.to_string())?;
        }

        let mut body = Vec::new();
        {
            let mut transfer = handle.transfer();
            transfer
                .write_function(|data| {
                    body.extend_from_slice(data);
                    Ok(data.len())
                })
                .map_err(|e| e.to_string())?;
            transfer.perform().map_err(|e| e.to_string())?;
        }

        let status = handle.response_code().map_err(|e| e.to_string())? as u16;
        let dns_ms = (handle.namelookup_time().map_err(|e| e.to_string())?.as_secs_f64() * 1000.0) as i64;
        let total_ms = (handle.total_time().map_err(|e| e.to_string())?.as_secs_f64() * 1000.0) as i64;

        Ok((
            PhaseTimings {
                status,
                dns_ms,
                total_ms,
                body_size: body.len() as i64,
            },
            String::from_utf8_lossy(&body).to_string(),
        ))
    })
    .await
    .map_err(|e| format!("curl task panicked: {e}"))?
}

#[async_trait]
impl Probe for HttpsProbe {
    fn kind(&self) -> &'static str {
        "https"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn attributes(&self) -> AttributeMap {
        AttributeMap::from_iter([
            ("url".to_string(), self.url.to_string().into()),
            ("method".to_string(), (if self.method == Method::Get { "GET" } else { "HEAD" }).into()),
        ])
    }

    async fn run(&self) -> ProbeOutcome {
        let mut outcome = ProbeOutcome::new();
        if self.resolve_ipv4 {
            merge(&mut outcome, self.check_family("ipv4").await);
        }
        if self.resolve_ipv6 {
            merge(&mut outcome, self.check_family("ipv6").await);
        }
        outcome
    }
}

fn merge(into: &mut ProbeOutcome, from: ProbeOutcome) {
    for (subject, row) in from.measurements {
        into.measurements.insert(subject, row);
    }
    for (subject, reasons) in from.reasons {
        into.reasons.entry(subject).or_default().extend(reasons);
    }
}

/// Named accessor so `registry`/`config` can bind a raw IP override without
/// re-parsing the URL (kept unused by tests but part of the public seam).
pub fn target_ip_or_default(url: &Url) -> Option<IpAddr> {
    url.host_str().and_then(|h| h.parse().ok())
}
