//! `dns` probe — resolve a name against a specific server and verify the
//! answer set (§6).

use crate::core::model::{AttributeMap, MeasurementRow, ProbeOutcome};
use crate::probes::{Probe, ProbeError};
use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::{Duration, Instant};

pub struct DnsProbe {
    description: String,
    server: IpAddr,
    qname: String,
    qtype: RecordType,
    acceptable: Vec<String>,
    recursion_desired: bool,
}

impl DnsProbe {
    pub fn new(
        server: &str,
        qname: &str,
        qtype: &str,
        acceptable: Vec<String>,
        recursion_desired: bool,
    ) -> Result<Self, ProbeError> {
        let server: IpAddr = server
            .parse()
            .map_err(|_| ProbeError::invalid("server", format!("'{server}' is not an IP address")))?;
        let qtype = RecordType::from_str(&qtype.to_ascii_uppercase())
            .map_err(|_| ProbeError::invalid("qtype", format!("unknown record type '{qtype}'")))?;
        Ok(Self {
            description: format!("dns {qtype} {qname} @ {server}"),
            server,
            qname: qname.to_string(),
            qtype,
            acceptable,
            recursion_desired,
        })
    }

    fn resolver(&self) -> TokioAsyncResolver {
        let group = NameServerConfigGroup::from_ips_clear(&[self.server], 53, true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        let mut opts = ResolverOpts::default();
        opts.recursion_desired = self.recursion_desired;
        opts.timeout = Duration::from_secs(5);
        TokioAsyncResolver::tokio(config, opts)
    }
}

#[async_trait]
impl Probe for DnsProbe {
    fn kind(&self) -> &'static str {
        "dns"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn attributes(&self) -> AttributeMap {
        AttributeMap::from_iter([
            ("server".to_string(), self.server.to_string().into()),
            ("qname".to_string(), self.qname.clone().into()),
            ("qtype".to_string(), self.qtype.to_string().into()),
        ])
    }

    async fn run(&self) -> ProbeOutcome {
        let mut outcome = ProbeOutcome::new();
        let resolver = self.resolver();
        let start = Instant::now();
        let lookup = resolver.lookup(self.qname.clone(), self.qtype).await;
        let msec = start.elapsed().as_millis() as i64;

        match lookup {
            Ok(answer) => {
                let finals: Vec<String> = answer.iter().map(|r| r.to_string()).collect();
                let mut row = MeasurementRow::new();
                row.insert("msec".to_string(), msec.into());
                row.insert("finals".to_string(), finals.join(",").into());
                outcome.add_measurement("", row);

                if !self.acceptable.is_empty() {
                    let unacceptable: Vec<&String> =
                        finals.iter().filter(|f| !self.acceptable.contains(f)).collect();
                    if !unacceptable.is_empty() {
                        outcome.add_reason(
                            "",
                            format!(
                                "unacceptable answer(s): {}",
                                unacceptable.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                            ),
                        );
                    }
                }
            }
            Err(err) => {
                outcome.add_reason("", format!("lookup failed: {err}"));
            }
        }

        outcome
    }
}
