//! `rrsig` probe — DNSSEC signature freshness for a name (§6).

use crate::core::model::{AttributeMap, MeasurementRow, ProbeOutcome};
use crate::probes::{Probe, ProbeError};
use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::dnssec::rdata::DNSSECRData;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

pub struct RrsigProbe {
    description: String,
    server: IpAddr,
    qname: String,
    qtype: RecordType,
    min_days: i64,
}

impl RrsigProbe {
    pub fn new(server: &str, qname: &str, qtype: Option<&str>, min_days: Option<i64>) -> Result<Self, ProbeError> {
        let server: IpAddr = server
            .parse()
            .map_err(|_| ProbeError::invalid("server", format!("'{server}' is not an IP address")))?;
        let qtype_str = qtype.unwrap_or("SOA");
        let qtype = RecordType::from_str(&qtype_str.to_ascii_uppercase())
            .map_err(|_| ProbeError::invalid("qtype", format!("unknown record type '{qtype_str}'")))?;
        Ok(Self {
            description: format!("rrsig freshness for {qtype} {qname}"),
            server,
            qname: qname.to_string(),
            qtype,
            min_days: min_days.unwrap_or(7),
        })
    }
}

#[async_trait]
impl Probe for RrsigProbe {
    fn kind(&self) -> &'static str {
        "rrsig"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn attributes(&self) -> AttributeMap {
        AttributeMap::from_iter([
            ("server".to_string(), self.server.to_string().into()),
            ("qname".to_string(), self.qname.clone().into()),
        ])
    }

    async fn run(&self) -> ProbeOutcome {
        let mut outcome = ProbeOutcome::new();

        let group = NameServerConfigGroup::from_ips_clear(&[self.server], 53, true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        opts.validate = true;
        let resolver = TokioAsyncResolver::tokio(config, opts);

        match resolver.lookup(self.qname.clone(), RecordType::RRSIG).await {
            Ok(answer) => {
                let mut min_remaining: Option<i64> = None;
                for record in answer.record_iter() {
                    if let Some(RData::DNSSEC(DNSSECRData::SIG(sig))) = record.data() {
                        if sig.type_covered() != self.qtype {
                            continue;
                        }
                        let now = chrono::Utc::now().timestamp() as u32;
                        let remaining_days = (sig.sig_expiration().saturating_sub(now)) as i64 / 86_400;
                        min_remaining = Some(min_remaining.map_or(remaining_days, |m: i64| m.min(remaining_days)));
                    }
                }
                match min_remaining {
                    Some(days) => {
                        let mut row = MeasurementRow::new();
                        row.insert("daysRemaining".to_string(), days.into());
                        outcome.add_measurement("", row);
                        if days < self.min_days {
                            outcome.add_reason("", format!("signature expires in {days} days (minimum {})", self.min_days));
                        }
                    }
                    None => outcome.add_reason("", format!("no RRSIG covering {} found", self.qtype)),
                }
            }
            Err(err) => outcome.add_reason("", format!("RRSIG lookup failed: {err}")),
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_qtype_to_soa_and_min_days_to_seven() {
        let probe = RrsigProbe::new("8.8.8.8", "example.com", None, None).unwrap();
        assert_eq!(probe.min_days, 7);
        assert_eq!(probe.qtype, RecordType::SOA);
    }
}
