//! `ping` probe — ICMP reachability per host (§6).

use crate::core::model::{AttributeMap, MeasurementRow, ProbeOutcome};
use crate::probes::{Probe, ProbeError};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use surge_ping::{Client, Config, PingIdentifier, PingSequence};

pub struct PingProbe {
    description: String,
    servers: Vec<String>,
    timeout: Duration,
    size: usize,
}

impl PingProbe {
    pub fn new(servers: Vec<String>, timeout_secs: Option<u64>, size: Option<usize>) -> Result<Self, ProbeError> {
        if servers.is_empty() {
            return Err(ProbeError::invalid("servers", "at least one server is required"));
        }
        let timeout_secs = timeout_secs.unwrap_or(5);
        if timeout_secs == 0 || timeout_secs > 10 {
            return Err(ProbeError::invalid("timeout", "must be in (0, 10] seconds"));
        }
        let size = size.unwrap_or(56);
        if size > 65_500 {
            return Err(ProbeError::invalid("size", "must be <= 65500"));
        }
        Ok(Self {
            description: format!("icmp ping over {} host(s)", servers.len()),
            servers,
            timeout: Duration::from_secs(timeout_secs),
            size,
        })
    }
}

#[async_trait]
impl Probe for PingProbe {
    fn kind(&self) -> &'static str {
        "ping"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn attributes(&self) -> AttributeMap {
        AttributeMap::from_iter([("servers".to_string(), self.servers.join(",").into())])
    }

    async fn run(&self) -> ProbeOutcome {
        let mut outcome = ProbeOutcome::new();

        let client = match Client::new(&Config::default()) {
            Ok(c) => c,
            Err(err) => {
                outcome.add_reason("", format!("failed to open ICMP socket: {err}"));
                return outcome;
            }
        };

        for (idx, server) in self.servers.iter().enumerate() {
            let Ok(addr): Result<IpAddr, _> = server.parse() else {
                outcome.add_reason(server, "not a valid IP address".to_string());
                continue;
            };

            let mut pinger = client.pinger(addr, PingIdentifier(idx as u16)).await;
            pinger.timeout(self.timeout);
            let payload = vec![0u8; self.size];

            match pinger.ping(PingSequence(0), &payload).await {
                Ok((packet, rtt)) => {
                    let mut row = MeasurementRow::new();
                    row.insert("msec".to_string(), (rtt.as_millis() as i64).into());
                    let ttl = match &packet {
                        surge_ping::IcmpPacket::V4(p) => p.get_ttl().map(i64::from),
                        surge_ping::IcmpPacket::V6(p) => Some(i64::from(p.get_max_hop_limit())),
                    };
                    row.insert("ttl".to_string(), ttl.into());
                    outcome.add_measurement(server, row);
                }
                Err(err) => {
                    outcome.add_reason(server, format!("no reply: {err}"));
                }
            }
        }

        outcome
    }
}
