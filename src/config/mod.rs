//! Declarative TOML configuration: the legitimate substitute for the
//! original's embedded scripting layer (§9).
//!
//! Loaded, in order: `$SIMPLOMON_CONFIG_URL` (fetched over HTTP(S) if it
//! parses as a URL, else treated as a local path), the first positional CLI
//! argument, or `./simplomon.toml` in the working directory. A document that
//! fails to deserialize or fails `validate()` is a config-fatal error: the
//! caller is expected to print it and exit with status 1 before any probe
//! runs.

use crate::core::model::ProbeConfig;
use crate::core::registry::WorldBuilder;
use crate::core::sink::MeasurementSink;
use crate::core::status::StatusSnapshot;
use crate::diagnostics::Diagnostics;
use crate::error::{Result, SimplomonError};
use crate::notifiers::email::{EmailNotifier, LettreMailSender};
use crate::notifiers::ntfy::NtfyNotifier;
use crate::notifiers::pushover::PushoverNotifier;
use crate::notifiers::sink::SinkNotifier;
use crate::notifiers::telegram::TelegramNotifier;
use crate::notifiers::transport::IsahcTransport;
use crate::notifiers::webstatus::WebStatusNotifier;
use crate::notifiers::Notifier;
use crate::probes::dailychime::DailyChimeProbe;
use crate::probes::dns::DnsProbe;
use crate::probes::dnssoa::DnsSoaProbe;
use crate::probes::external::ExternalProbe;
use crate::probes::httpredir::HttpRedirProbe;
use crate::probes::https::{HttpsProbe, Method};
use crate::probes::imap::ImapProbe;
use crate::probes::ping::PingProbe;
use crate::probes::prometheus::{CheckKind, PrometheusCheck, PrometheusProbe};
use crate::probes::rrsig::RrsigProbe;
use crate::probes::smtp::SmtpProbe;
use crate::probes::tcpport::{Expectation, TcpPortProbe};
use crate::probes::Probe;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn default_interval_secs() -> u64 {
    60
}
fn default_workers() -> u32 {
    2
}
fn default_max_workers() -> u32 {
    8
}
fn default_data_dir() -> String {
    "./simplomon-data".to_string()
}
fn default_retention_secs() -> i64 {
    86_400
}
fn default_probe_timeout_secs() -> u64 {
    30
}
fn default_min_failures() -> u32 {
    1
}
fn default_failure_window() -> i64 {
    60
}
fn default_qtype() -> String {
    "A".to_string()
}
fn default_http_bind() -> String {
    "127.0.0.1:8980".to_string()
}

#[derive(Debug, Deserialize)]
struct RawDaemon {
    #[serde(default = "default_interval_secs")]
    interval_secs: u64,
    #[serde(default = "default_workers")]
    workers: u32,
    #[serde(default = "default_max_workers")]
    max_workers: u32,
    #[serde(default = "default_data_dir")]
    data_dir: String,
    #[serde(default = "default_retention_secs")]
    retention_secs: i64,
    #[serde(default = "default_probe_timeout_secs")]
    probe_timeout_secs: u64,
    #[serde(default)]
    log_path: Option<String>,
}

impl Default for RawDaemon {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            workers: default_workers(),
            max_workers: default_max_workers(),
            data_dir: default_data_dir(),
            retention_secs: default_retention_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            log_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawHttp {
    #[serde(default = "default_http_bind")]
    bind: String,
    #[serde(default)]
    static_dir: Option<String>,
    #[serde(default)]
    basic_auth_user: Option<String>,
    #[serde(default)]
    basic_auth_pass: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    daemon: RawDaemon,
    #[serde(default)]
    http: Option<RawHttp>,
    #[serde(default)]
    notifiers: Vec<RawNotifier>,
    #[serde(default)]
    probes: Vec<RawProbe>,
}

#[derive(Debug, Deserialize)]
struct NotifierMeta {
    name: String,
    #[serde(rename = "minMinutes", default)]
    min_minutes: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum RawNotifier {
    Pushover {
        #[serde(flatten)]
        meta: NotifierMeta,
        token: String,
        #[serde(rename = "userKey")]
        user_key: String,
    },
    Ntfy {
        #[serde(flatten)]
        meta: NotifierMeta,
        url: String,
        #[serde(default)]
        auth_token: Option<String>,
    },
    Telegram {
        #[serde(flatten)]
        meta: NotifierMeta,
        #[serde(rename = "botToken")]
        bot_token: String,
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    Email {
        #[serde(flatten)]
        meta: NotifierMeta,
        server: String,
        from: String,
        to: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct ProbeMeta {
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "minFailures", default = "default_min_failures")]
    min_failures: u32,
    #[serde(rename = "failureWindow", default = "default_failure_window")]
    failure_window_secs: i64,
    #[serde(default)]
    mute: bool,
    #[serde(default)]
    notifiers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawPrometheusCheck {
    kind: String,
    metric: String,
    threshold: f64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum RawProbe {
    Dns {
        #[serde(flatten)]
        meta: ProbeMeta,
        server: String,
        qname: String,
        #[serde(default = "default_qtype")]
        qtype: String,
        #[serde(default)]
        acceptable: Vec<String>,
        #[serde(default)]
        recursion_desired: bool,
    },
    Dnssoa {
        #[serde(flatten)]
        meta: ProbeMeta,
        domain: String,
        servers: Vec<String>,
    },
    Rrsig {
        #[serde(flatten)]
        meta: ProbeMeta,
        server: String,
        qname: String,
        #[serde(default)]
        qtype: Option<String>,
        #[serde(rename = "minDays", default)]
        min_days: Option<i64>,
    },
    #[serde(rename = "tcpportopen")]
    TcpPortOpen {
        #[serde(flatten)]
        meta: ProbeMeta,
        servers: Vec<String>,
        ports: Vec<u16>,
    },
    #[serde(rename = "tcpportclosed")]
    TcpPortClosed {
        #[serde(flatten)]
        meta: ProbeMeta,
        servers: Vec<String>,
        ports: Vec<u16>,
    },
    Ping {
        #[serde(flatten)]
        meta: ProbeMeta,
        servers: Vec<String>,
        #[serde(rename = "timeoutSecs", default)]
        timeout_secs: Option<u64>,
        #[serde(default)]
        size: Option<usize>,
    },
    Https {
        #[serde(flatten)]
        meta: ProbeMeta,
        url: String,
        #[serde(default)]
        method: Option<String>,
        #[serde(rename = "minBytes", default)]
        min_bytes: Option<u64>,
        #[serde(rename = "minCertDays", default)]
        min_cert_days: Option<i64>,
        #[serde(default)]
        regex: Option<String>,
        #[serde(rename = "resolveIpv4", default)]
        resolve_ipv4: bool,
        #[serde(rename = "resolveIpv6", default)]
        resolve_ipv6: bool,
    },
    Httpredir {
        #[serde(flatten)]
        meta: ProbeMeta,
        #[serde(rename = "fromUrl")]
        from_url: String,
        #[serde(rename = "toUrl")]
        to_url: String,
    },
    Smtp {
        #[serde(flatten)]
        meta: ProbeMeta,
        server: String,
        #[serde(rename = "serverName", default)]
        server_name: Option<String>,
        #[serde(rename = "minCertDays", default)]
        min_cert_days: Option<i64>,
    },
    Imap {
        #[serde(flatten)]
        meta: ProbeMeta,
        server: String,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(rename = "serverName", default)]
        server_name: Option<String>,
        #[serde(rename = "minCertDays", default)]
        min_cert_days: Option<i64>,
    },
    Prometheus {
        #[serde(flatten)]
        meta: ProbeMeta,
        url: String,
        checks: Vec<RawPrometheusCheck>,
    },
    External {
        #[serde(flatten)]
        meta: ProbeMeta,
        cmd: Vec<String>,
        #[serde(default)]
        regex: Option<String>,
        #[serde(rename = "expectedRc", default)]
        expected_rc: Option<i32>,
    },
    Dailychime {
        #[serde(flatten)]
        meta: ProbeMeta,
        instance: String,
        #[serde(rename = "utcHour")]
        utc_hour: u32,
    },
}

pub struct DaemonSettings {
    pub cycle_interval: Duration,
    pub initial_workers: u32,
    pub max_workers: u32,
    pub data_dir: PathBuf,
    pub retention_secs: i64,
    pub probe_timeout: Duration,
    pub log_path: PathBuf,
}

pub struct HttpSettings {
    pub bind: SocketAddr,
    pub static_dir: Option<PathBuf>,
    pub basic_auth: Option<(String, String)>,
}

/// Resolve the config source (env var, CLI arg, default path) and fetch or
/// read its contents.
pub async fn resolve_source(cli_arg: Option<&str>) -> Result<String> {
    let candidate = std::env::var("SIMPLOMON_CONFIG_URL")
        .ok()
        .or_else(|| cli_arg.map(str::to_string))
        .unwrap_or_else(|| "./simplomon.toml".to_string());

    if candidate.starts_with("http://") || candidate.starts_with("https://") {
        fetch_remote(&candidate).await
    } else {
        std::fs::read_to_string(&candidate).map_err(|e| SimplomonError::Config(format!("failed to read '{candidate}': {e}")))
    }
}

async fn fetch_remote(url: &str) -> Result<String> {
    use isahc::{config::Configurable, AsyncReadResponseExt, RequestExt};
    let mut response = isahc::Request::get(url)
        .timeout(Duration::from_secs(15))
        .body(())
        .map_err(|e| SimplomonError::Config(format!("invalid config URL '{url}': {e}")))?
        .send_async()
        .await
        .map_err(|e| SimplomonError::ConfigFetch { url: url.to_string(), source: Box::new(e) })?;
    response
        .text()
        .await
        .map_err(|e| SimplomonError::ConfigFetch { url: url.to_string(), source: Box::new(e) })
}

/// Extract just the operational log path a document would resolve to,
/// without building the rest of the world. Lets the caller stand up the
/// real `Diagnostics` logger before `build()` needs one.
pub fn peek_log_path(toml_text: &str) -> Result<PathBuf> {
    let raw: RawConfig = toml::from_str(toml_text).map_err(|e| SimplomonError::Config(e.to_string()))?;
    Ok(PathBuf::from(
        raw.daemon.log_path.unwrap_or_else(|| format!("{}/diagnostics.jsonl", raw.daemon.data_dir)),
    ))
}

/// Parse and validate a TOML document, building the runtime `World` plus the
/// daemon/http settings it implies.
pub fn build(
    toml_text: &str,
    diagnostics: Arc<Diagnostics>,
) -> Result<(crate::core::registry::World, DaemonSettings, Option<HttpSettings>)> {
    let raw: RawConfig = toml::from_str(toml_text).map_err(|e| SimplomonError::Config(e.to_string()))?;

    let daemon = DaemonSettings {
        cycle_interval: Duration::from_secs(raw.daemon.interval_secs.max(1)),
        initial_workers: raw.daemon.workers.max(1),
        max_workers: raw.daemon.max_workers.max(raw.daemon.workers.max(1)),
        data_dir: PathBuf::from(&raw.daemon.data_dir),
        retention_secs: raw.daemon.retention_secs.max(raw.daemon.interval_secs as i64),
        probe_timeout: Duration::from_secs(raw.daemon.probe_timeout_secs.max(1)),
        log_path: PathBuf::from(raw.daemon.log_path.unwrap_or_else(|| format!("{}/diagnostics.jsonl", raw.daemon.data_dir))),
    };

    let http = raw
        .http
        .map(|h| -> Result<HttpSettings> {
            let bind = h
                .bind
                .parse::<SocketAddr>()
                .map_err(|e| SimplomonError::Config(format!("invalid http.bind '{}': {e}", h.bind)))?;
            let basic_auth = match (h.basic_auth_user, h.basic_auth_pass) {
                (Some(u), Some(p)) => Some((u, p)),
                (None, None) => None,
                _ => return Err(SimplomonError::Config("http basic auth needs both user and pass".to_string())),
            };
            Ok(HttpSettings { bind, static_dir: h.static_dir.map(PathBuf::from), basic_auth })
        })
        .transpose()?;

    let sink = MeasurementSink::spawn(daemon.data_dir.clone());
    let status = StatusSnapshot::new();
    let transport = Arc::new(IsahcTransport) as Arc<dyn crate::notifiers::transport::HttpTransport>;
    let clock: Arc<dyn Fn() -> i64 + Send + Sync> = Arc::new(now_unix);

    let mut builder = WorldBuilder::new();
    builder.register_notifier("sink", Arc::new(SinkNotifier::new(sink.clone(), Arc::clone(&clock))));
    builder.register_notifier("webstatus", Arc::new(WebStatusNotifier::new(status.clone(), Arc::clone(&clock))));

    for raw_notifier in raw.notifiers {
        let (name, notifier) = build_notifier(raw_notifier, Arc::clone(&transport), Arc::clone(&clock), Arc::clone(&diagnostics))?;
        builder.register_notifier(name, notifier);
    }

    for raw_probe in raw.probes {
        let (probe, config) = build_probe(raw_probe)?;
        builder.register_probe(probe, config);
    }

    let world = builder.build(daemon.retention_secs, status, sink, diagnostics);
    validate(&world)?;

    Ok((world, daemon, http))
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Every configured notifier reference must resolve to a registered
/// notifier (§4.6 Invariants).
fn validate(world: &crate::core::registry::World) -> Result<()> {
    for registered in &world.probes {
        for name in &registered.config.notifiers {
            if !world.notifiers.contains_key(name) {
                return Err(SimplomonError::InvalidProbe {
                    kind: registered.config.kind.clone(),
                    reason: format!("unknown notifier '{name}'"),
                });
            }
        }
    }
    Ok(())
}

fn build_notifier(
    raw: RawNotifier,
    transport: Arc<dyn crate::notifiers::transport::HttpTransport>,
    clock: Arc<dyn Fn() -> i64 + Send + Sync>,
    diagnostics: Arc<Diagnostics>,
) -> Result<(String, Arc<dyn Notifier>)> {
    match raw {
        RawNotifier::Pushover { meta, token, user_key } => {
            let name = meta.name.clone();
            Ok((
                name.clone(),
                Arc::new(PushoverNotifier::new(name, token, user_key, meta.min_minutes, transport, clock, diagnostics)),
            ))
        }
        RawNotifier::Ntfy { meta, url, auth_token } => {
            let name = meta.name.clone();
            Ok((
                name.clone(),
                Arc::new(NtfyNotifier::new(name, url, auth_token, meta.min_minutes, transport, clock, diagnostics)),
            ))
        }
        RawNotifier::Telegram { meta, bot_token, chat_id } => {
            let name = meta.name.clone();
            Ok((
                name.clone(),
                Arc::new(TelegramNotifier::new(name, bot_token, chat_id, meta.min_minutes, transport, clock, diagnostics)),
            ))
        }
        RawNotifier::Email { meta, server, from, to, username, password } => {
            let name = meta.name.clone();
            let credentials = match (username, password) {
                (Some(u), Some(p)) => Some((u, p)),
                _ => None,
            };
            let sender = LettreMailSender::new(&server, credentials)
                .map_err(|e| SimplomonError::InvalidNotifier { kind: "email".to_string(), reason: e })?;
            Ok((
                name.clone(),
                Arc::new(EmailNotifier::new(name, from, to, meta.min_minutes, Arc::new(sender), clock, diagnostics)),
            ))
        }
    }
}

fn build_probe(raw: RawProbe) -> Result<(Arc<dyn Probe>, ProbeConfig)> {
    let invalid = |kind: &str, reason: String| SimplomonError::InvalidProbe { kind: kind.to_string(), reason };

    macro_rules! finish {
        ($meta:expr, $kind:expr, $probe:expr) => {{
            let probe: Arc<dyn Probe> = Arc::new($probe.map_err(|e: crate::probes::ProbeError| invalid($kind, e.to_string()))?);
            let mut config = ProbeConfig::new($kind, $meta.description.clone().unwrap_or_else(|| probe.description().to_string()));
            config.min_failures = $meta.min_failures;
            config.failure_window_secs = $meta.failure_window_secs;
            config.mute = $meta.mute;
            config.notifiers = $meta.notifiers.clone();
            Ok((probe, config))
        }};
    }

    match raw {
        RawProbe::Dns { meta, server, qname, qtype, acceptable, recursion_desired } => {
            finish!(meta, "dns", DnsProbe::new(&server, &qname, &qtype, acceptable, recursion_desired))
        }
        RawProbe::Dnssoa { meta, domain, servers } => {
            finish!(meta, "dnssoa", DnsSoaProbe::new(&domain, servers))
        }
        RawProbe::Rrsig { meta, server, qname, qtype, min_days } => {
            finish!(meta, "rrsig", RrsigProbe::new(&server, &qname, qtype.as_deref(), min_days))
        }
        RawProbe::TcpPortOpen { meta, servers, ports } => {
            finish!(meta, "tcpportopen", TcpPortProbe::new(servers, ports, Expectation::Open))
        }
        RawProbe::TcpPortClosed { meta, servers, ports } => {
            finish!(meta, "tcpportclosed", TcpPortProbe::new(servers, ports, Expectation::Closed))
        }
        RawProbe::Ping { meta, servers, timeout_secs, size } => {
            finish!(meta, "ping", PingProbe::new(servers, timeout_secs, size))
        }
        RawProbe::Https { meta, url, method, min_bytes, min_cert_days, regex, resolve_ipv4, resolve_ipv6 } => {
            let method = match method.as_deref() {
                Some("head") | Some("HEAD") => Method::Head,
                _ => Method::Get,
            };
            finish!(
                meta,
                "https",
                HttpsProbe::new(&url, method, min_bytes, min_cert_days, regex, resolve_ipv4, resolve_ipv6)
            )
        }
        RawProbe::Httpredir { meta, from_url, to_url } => {
            finish!(meta, "httpredir", HttpRedirProbe::new(&from_url, &to_url))
        }
        RawProbe::Smtp { meta, server, server_name, min_cert_days } => {
            finish!(meta, "smtp", SmtpProbe::new(&server, server_name, min_cert_days))
        }
        RawProbe::Imap { meta, server, user, password, server_name, min_cert_days } => {
            finish!(meta, "imap", ImapProbe::new(&server, user, password, server_name, min_cert_days))
        }
        RawProbe::Prometheus { meta, url, checks } => {
            let checks = checks
                .into_iter()
                .map(|c| {
                    let kind = match c.kind.to_ascii_lowercase().as_str() {
                        "diskfree" => Ok(CheckKind::DiskFree),
                        "aptpending" => Ok(CheckKind::AptPending),
                        "bandwidth" => Ok(CheckKind::Bandwidth),
                        other => Err(invalid("prometheus", format!("unknown check kind '{other}'"))),
                    }?;
                    Ok(PrometheusCheck { kind, metric: c.metric, threshold: c.threshold })
                })
                .collect::<Result<Vec<_>>>()?;
            finish!(meta, "prometheus", PrometheusProbe::new(&url, checks))
        }
        RawProbe::External { meta, cmd, regex, expected_rc } => {
            finish!(meta, "external", ExternalProbe::new(cmd, regex, expected_rc))
        }
        RawProbe::Dailychime { meta, instance, utc_hour } => {
            finish!(meta, "dailychime", DailyChimeProbe::new(instance, utc_hour))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnostics() -> Arc<Diagnostics> {
        Arc::new(Diagnostics::new(PathBuf::from(format!(
            "/tmp/simplomon-test-config-{}.jsonl",
            std::process::id()
        ))))
    }

    #[tokio::test]
    async fn parses_minimal_document() {
        let toml_text = r#"
            [daemon]
            interval_secs = 30

            [[probes]]
            kind = "external"
            cmd = ["true"]
            notifiers = ["sink"]
        "#;
        let (world, daemon, http) = build(toml_text, diagnostics()).unwrap();
        assert_eq!(daemon.cycle_interval, Duration::from_secs(30));
        assert!(http.is_none());
        assert_eq!(world.probes.len(), 1);
        assert!(world.notifiers.contains_key("sink"));
    }

    #[tokio::test]
    async fn rejects_unknown_notifier_reference() {
        let toml_text = r#"
            [[probes]]
            kind = "external"
            cmd = ["true"]
            notifiers = ["does-not-exist"]
        "#;
        assert!(build(toml_text, diagnostics()).is_err());
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(build("not valid toml [[[", diagnostics()).is_err());
    }

    #[tokio::test]
    async fn builds_every_probe_kind_with_defaults() {
        let toml_text = r#"
            [[probes]]
            kind = "dns"
            server = "8.8.8.8"
            qname = "example.com"

            [[probes]]
            kind = "dnssoa"
            domain = "example.com"
            servers = ["8.8.8.8"]

            [[probes]]
            kind = "rrsig"
            server = "8.8.8.8"
            qname = "example.com"

            [[probes]]
            kind = "tcpportopen"
            servers = ["example.com"]
            ports = [443]

            [[probes]]
            kind = "tcpportclosed"
            servers = ["example.com"]
            ports = [31337]

            [[probes]]
            kind = "ping"
            servers = ["example.com"]

            [[probes]]
            kind = "https"
            url = "https://example.com"

            [[probes]]
            kind = "httpredir"
            fromUrl = "https://example.com/old"
            toUrl = "https://example.com/new"

            [[probes]]
            kind = "smtp"
            server = "mail.example.com:25"

            [[probes]]
            kind = "imap"
            server = "mail.example.com:993"

            [[probes]]
            kind = "prometheus"
            url = "http://localhost:9100/metrics"
            [[probes.checks]]
            kind = "diskfree"
            metric = "node_filesystem_free_bytes"
            threshold = 1000000000.0

            [[probes]]
            kind = "external"
            cmd = ["true"]

            [[probes]]
            kind = "dailychime"
            instance = "host1"
            utcHour = 6
        "#;
        let (world, _, _) = build(toml_text, diagnostics()).unwrap();
        assert_eq!(world.probes.len(), 12);
    }
}
