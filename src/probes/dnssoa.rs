//! `dnssoa` probe — SOA serial consistency across a domain's servers (§6).

use crate::core::model::{AttributeMap, MeasurementRow, ProbeOutcome};
use crate::probes::{Probe, ProbeError};
use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::rdata::SOA;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use std::time::Duration;

pub struct DnsSoaProbe {
    description: String,
    domain: String,
    servers: Vec<IpAddr>,
}

impl DnsSoaProbe {
    pub fn new(domain: &str, servers: Vec<String>) -> Result<Self, ProbeError> {
        if servers.is_empty() {
            return Err(ProbeError::invalid("servers", "at least one server is required"));
        }
        let servers = servers
            .into_iter()
            .map(|s| s.parse::<IpAddr>().map_err(|_| ProbeError::invalid("servers", format!("'{s}' is not an IP"))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            description: format!("dnssoa consistency for {domain}"),
            domain: domain.to_string(),
            servers,
        })
    }

    async fn soa_serial(&self, server: IpAddr) -> Result<u32, String> {
        let group = NameServerConfigGroup::from_ips_clear(&[server], 53, true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        let resolver = TokioAsyncResolver::tokio(config, opts);
        let answer = resolver.lookup(self.domain.clone(), RecordType::SOA).await.map_err(|e| e.to_string())?;
        for record in answer.record_iter() {
            if let Some(RData::SOA(soa)) = record.data() {
                return Ok(soa_serial(soa));
            }
        }
        Err("no SOA record in answer".to_string())
    }
}

fn soa_serial(soa: &SOA) -> u32 {
    soa.serial()
}

#[async_trait]
impl Probe for DnsSoaProbe {
    fn kind(&self) -> &'static str {
        "dnssoa"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn attributes(&self) -> AttributeMap {
        AttributeMap::from_iter([("domain".to_string(), self.domain.clone().into())])
    }

    async fn run(&self) -> ProbeOutcome {
        let mut outcome = ProbeOutcome::new();
        let mut serials = Vec::new();

        for server in &self.servers {
            let subject = server.to_string();
            match self.soa_serial(*server).await {
                Ok(serial) => {
                    let mut row = MeasurementRow::new();
                    row.insert("serial".to_string(), (serial as i64).into());
                    outcome.add_measurement(&subject, row);
                    serials.push((subject, serial));
                }
                Err(err) => {
                    outcome.add_reason(&subject, format!("SOA lookup failed: {err}"));
                }
            }
        }

        if let Some((_, first)) = serials.first() {
            for (subject, serial) in &serials {
                if serial != first {
                    outcome.add_reason(subject, format!("serial {serial} disagrees with {first}"));
                }
            }
        }

        outcome
    }
}
