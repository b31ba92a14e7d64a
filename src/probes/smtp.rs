//! `smtp` probe — mail-loop reachability and STARTTLS certificate health (§6).

use crate::core::model::{AttributeMap, MeasurementRow, ProbeOutcome};
use crate::probes::tls;
use crate::probes::{Probe, ProbeError};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

pub struct SmtpProbe {
    description: String,
    server: String,
    port: u16,
    server_name: String,
    min_cert_days: i64,
    timeout: Duration,
}

impl SmtpProbe {
    pub fn new(server: &str, servername: Option<String>, min_cert_days: Option<i64>) -> Result<Self, ProbeError> {
        let (host, port) = split_host_port(server, 25);
        Ok(Self {
            description: format!("smtp starttls probe for {server}"),
            server: host.clone(),
            port,
            server_name: servername.unwrap_or(host),
            min_cert_days: min_cert_days.unwrap_or(14),
            timeout: Duration::from_secs(10),
        })
    }
}

fn split_host_port(server: &str, default_port: u16) -> (String, u16) {
    match server.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(default_port)),
        None => (server.to_string(), default_port),
    }
}

async fn read_line(reader: &mut (impl AsyncBufReadExt + Unpin)) -> Result<String, String> {
    let mut line = String::new();
    reader.read_line(&mut line).await.map_err(|e| e.to_string())?;
    Ok(line)
}

#[async_trait]
impl Probe for SmtpProbe {
    fn kind(&self) -> &'static str {
        "smtp"
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
            let mut reader = BufReader::new(stream);

            let banner = read_line(&mut reader).await?;
            if !banner.starts_with("220") {
                return Err(format!("unexpected banner: {}", banner.trim()));
            }

            let mut stream = reader.into_inner();
            stream.write_all(format!("EHLO {}\r\n", self.server_name).as_bytes()).await.map_err(|e| e.to_string())?;
            let mut reader = BufReader::new(stream);
            loop {
                let line = read_line(&mut reader).await?;
                if line.len() < 4 || &line[3..4] == " " {
                    break;
                }
            }

            let mut stream = reader.into_inner();
            stream.write_all(b"STARTTLS\r\n").await.map_err(|e| e.to_string())?;
            let mut reader = BufReader::new(stream);
            let resp = read_line(&mut reader).await?;
            if !resp.starts_with("220") {
                return Err(format!("STARTTLS rejected: {}", resp.trim()));
            }

            let stream = reader.into_inner();
            let tls_stream = tls::handshake(&self.server_name, stream).await?;
            tls::cert_days_and_pin(&tls_stream)
        };

        match timeout(self.timeout, attempt).await {
            Ok(Ok((days, _pin))) => {
                let mut row = MeasurementRow::new();
                row.insert("tlsMinExpDays".to_string(), days.into());
                if days < self.min_cert_days {
                    outcome.add_reason("", format!("certificate expires in {days} days (minimum {})", self.min_cert_days));
                }
                outcome.add_measurement("", row);
            }
            Ok(Err(err)) => outcome.add_reason("", err),
            Err(_) => outcome.add_reason("", "smtp probe timed out".to_string()),
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_host_and_port() {
        assert_eq!(split_host_port("mail.example.com:587", 25), ("mail.example.com".to_string(), 587));
        assert_eq!(split_host_port("mail.example.com", 25), ("mail.example.com".to_string(), 25));
    }
}
