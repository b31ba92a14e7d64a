//! `external` probe — run a command and check its exit code/output (§6).

use crate::core::model::{AttributeMap, MeasurementRow, ProbeOutcome};
use crate::probes::{Probe, ProbeError};
use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

pub struct ExternalProbe {
    description: String,
    cmd: Vec<String>,
    expected_rc: i32,
    regex: Option<Regex>,
    timeout: Duration,
}

impl ExternalProbe {
    pub fn new(cmd: Vec<String>, regex: Option<String>, expected_rc: Option<i32>) -> Result<Self, ProbeError> {
        if cmd.is_empty() {
            return Err(ProbeError::invalid("cmd", "must not be empty"));
        }
        let regex = regex
            .map(|p| Regex::new(&p).map_err(|e| ProbeError::invalid("regex", e.to_string())))
            .transpose()?;
        Ok(Self {
            description: format!("external command `{}`", cmd.join(" ")),
            cmd,
            expected_rc: expected_rc.unwrap_or(0),
            regex,
            timeout: Duration::from_secs(30),
        })
    }
}

#[async_trait]
impl Probe for ExternalProbe {
    fn kind(&self) -> &'static str {
        "external"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn attributes(&self) -> AttributeMap {
        AttributeMap::from_iter([("cmd".to_string(), self.cmd.join(" ").into())])
    }

    async fn run(&self) -> ProbeOutcome {
        let mut outcome = ProbeOutcome::new();

        let mut command = Command::new(&self.cmd[0]);
        command.args(&self.cmd[1..]);
        command.kill_on_drop(true);

        let output = match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                outcome.add_reason("", format!("failed to spawn command: {err}"));
                return outcome;
            }
            Err(_) => {
                outcome.add_reason("", "external command timed out".to_string());
                return outcome;
            }
        };

        let rc = output.status.code().unwrap_or(-1);
        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        let mut row = MeasurementRow::new();
        row.insert("rc".to_string(), (rc as i64).into());
        row.insert("output".to_string(), combined.clone().into());
        outcome.add_measurement("", row);

        if rc != self.expected_rc {
            outcome.add_reason("", format!("exit code {rc}, expected {}", self.expected_rc));
        }
        if let Some(re) = &self.regex {
            if !re.is_match(&combined) {
                outcome.add_reason("", "output did not match expected pattern".to_string());
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_command() {
        assert!(ExternalProbe::new(vec![], None, None).is_err());
    }

    #[tokio::test]
    async fn succeeds_on_expected_exit_code() {
        let probe = ExternalProbe::new(vec!["true".to_string()], None, None).unwrap();
        let outcome = probe.run().await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn reports_unexpected_exit_code() {
        let probe = ExternalProbe::new(vec!["false".to_string()], None, None).unwrap();
        let outcome = probe.run().await;
        assert!(!outcome.is_success());
    }
}
