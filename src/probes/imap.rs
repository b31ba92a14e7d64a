//! `imap` probe — mail-loop sentinel login check (§6).

use crate::core::model::{AttributeMap, MeasurementRow, ProbeOutcome};
use crate::probes::tls;
use crate::probes::{Probe, ProbeError};
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

pub struct ImapProbe {
    description: String,
    server: String,
    port: u16,
    server_name: String,
    user: Option<String>,
    password: Option<String>,
    min_cert_days: i64,
    timeout: Duration,
}

impl ImapProbe {
    pub fn new(
        server: &str,
        user: Option<String>,
        password: Option<String>,
        servername: Option<String>,
        min_cert_days: Option<i64>,
    ) -> Result<Self, ProbeError> {
        let (host, port) = match server.rsplit_once(':') {
            Some((h, p)) => (h.to_string(), p.parse().unwrap_or(993)),
            None => (server.to_string(), 993),
        };
        Ok(Self {
            description: format!("imap sentinel probe for {server}"),
            server: host.clone(),
            port,
            server_name: servername.unwrap_or(host),
            user,
            password,
            min_cert_days: min_cert_days.unwrap_or(14),
            timeout: Duration::from_secs(10),
        })
    }
}

#[async_trait]
impl Probe for ImapProbe {
    fn kind(&self) -> &'static str {
        "imap"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn attributes(&self) -> AttributeMap {
        AttributeMap::from_iter([("server".to_string(), format!("{}:{}", self.server, self.port).into())])
    }

    async fn run(&self) -> ProbeOutcome {
        let mut outcome = ProbeOutcome::new();

        let attempt = async {
            let stream = TcpStream::connect((self.server.as_str(), self.port)).await.map_err(|e| e.to_string())?;
            let tls_stream = tls::handshake(&self.server_name, stream).await?;
            let (days, _pin) = tls::cert_days_and_pin(&tls_stream)?;

            let client = async_imap::Client::new(tls_stream);
            let mut session = if let (Some(user), Some(password)) = (&self.user, &self.password) {
                client
                    .login(user, password)
                    .await
                    .map_err(|(e, _)| format!("login failed: {e}"))?
            } else {
                return Ok::<i64, String>(days);
            };

            session.select("INBOX").await.map_err(|e| format!("SELECT INBOX failed: {e}"))?;
            let _ = session.logout().await;
            Ok(days)
        };

        match timeout(self.timeout, attempt).await {
            Ok(Ok(days)) => {
                let mut row = MeasurementRow::new();
                row.insert("tlsMinExpDays".to_string(), days.into());
                if days < self.min_cert_days {
                    outcome.add_reason("", format!("certificate expires in {days} days (minimum {})", self.min_cert_days));
                }
                outcome.add_measurement("", row);
            }
            Ok(Err(err)) => outcome.add_reason("", err),
            Err(_) => outcome.add_reason("", "imap probe timed out".to_string()),
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_port_to_993() {
        let probe = ImapProbe::new("mail.example.com", None, None, None, None).unwrap();
        assert_eq!(probe.port, 993);
    }
}
