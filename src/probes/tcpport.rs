//! `tcpportopen`/`tcpportclosed` probes — TCP reachability per `host:port` (§6).

use crate::core::model::{AttributeMap, MeasurementRow, ProbeOutcome};
use crate::probes::{Probe, ProbeError};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    Open,
    Closed,
}

pub struct TcpPortProbe {
    description: String,
    servers: Vec<String>,
    ports: Vec<u16>,
    expectation: Expectation,
    timeout: Duration,
}

impl TcpPortProbe {
    pub fn new(servers: Vec<String>, ports: Vec<u16>, expectation: Expectation) -> Result<Self, ProbeError> {
        if servers.is_empty() {
            return Err(ProbeError::invalid("servers", "at least one server is required"));
        }
        if ports.is_empty() {
            return Err(ProbeError::invalid("ports", "at least one port is required"));
        }
        let verb = match expectation {
            Expectation::Open => "open",
            Expectation::Closed => "closed",
        };
        Ok(Self {
            description: format!("tcp port {verb} check over {} server(s)", servers.len()),
            servers,
            ports,
            expectation,
            timeout: Duration::from_secs(5),
        })
    }
}

#[async_trait]
impl Probe for TcpPortProbe {
    fn kind(&self) -> &'static str {
        match self.expectation {
            Expectation::Open => "tcpportopen",
            Expectation::Closed => "tcpportclosed",
        }
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn attributes(&self) -> AttributeMap {
        AttributeMap::from_iter([("servers".to_string(), self.servers.join(",").into())])
    }

    async fn run(&self) -> ProbeOutcome {
        let mut outcome = ProbeOutcome::new();

        for server in &self.servers {
            for &port in &self.ports {
                let subject = format!("{server}:{port}");
                let start = Instant::now();
                let result = tokio::time::timeout(self.timeout, TcpStream::connect((server.as_str(), port))).await;
                let msec = start.elapsed().as_millis() as i64;

                let mut row = MeasurementRow::new();
                row.insert("msec".to_string(), msec.into());

                match (result, self.expectation) {
                    (Ok(Ok(_)), Expectation::Open) => {}
                    (Ok(Ok(_)), Expectation::Closed) => {
                        outcome.add_reason(&subject, "port is open, expected closed".to_string());
                    }
                    (Ok(Err(_)), Expectation::Closed) => {}
                    (Ok(Err(err)), Expectation::Open) => {
                        outcome.add_reason(&subject, format!("connect failed: {err}"));
                    }
                    (Err(_), Expectation::Closed) => {
                        outcome.add_reason(&subject, "connect timed out, expected a prompt refusal".to_string());
                    }
                    (Err(_), Expectation::Open) => {
                        outcome.add_reason(&subject, "connect timed out".to_string());
                    }
                }

                outcome.add_measurement(&subject, row);
            }
        }

        outcome
    }
}
