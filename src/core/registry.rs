//! Probe registry and binding — the startup-built `World` (§4.6).

use crate::core::filter::FailureFilter;
use crate::core::model::{ProbeConfig, ProbeId};
use crate::core::sink::MeasurementSink;
use crate::core::status::StatusSnapshot;
use crate::diagnostics::Diagnostics;
use crate::notifiers::Notifier;
use crate::probes::Probe;
use std::collections::HashMap;
use std::sync::Arc;

const IMPLICIT_NOTIFIERS: [&str; 2] = ["sink", "webstatus"];

pub struct RegisteredProbe {
    pub id: ProbeId,
    pub config: ProbeConfig,
    pub probe: Arc<dyn Probe>,
}

/// Read-mostly container of probes and notifiers, built once at startup and
/// shared between the runner and the status surface.
pub struct World {
    pub probes: Vec<RegisteredProbe>,
    pub notifiers: HashMap<String, Arc<dyn Notifier>>,
    pub filter: FailureFilter,
    pub status: StatusSnapshot,
    pub sink: MeasurementSink,
    pub diagnostics: Arc<Diagnostics>,
}

pub struct WorldBuilder {
    next_id: u64,
    probes: Vec<RegisteredProbe>,
    notifiers: HashMap<String, Arc<dyn Notifier>>,
}

impl WorldBuilder {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            probes: Vec::new(),
            notifiers: HashMap::new(),
        }
    }

    pub fn register_notifier(&mut self, name: impl Into<String>, notifier: Arc<dyn Notifier>) {
        self.notifiers.insert(name.into(), notifier);
    }

    /// Register a probe, implicitly binding the always-on sink and
    /// web-status notifiers (§4.6 Invariants).
    pub fn register_probe(&mut self, probe: Arc<dyn Probe>, mut config: ProbeConfig) -> ProbeId {
        config.attributes = probe.attributes();
        for implicit in IMPLICIT_NOTIFIERS {
            if !config.notifiers.iter().any(|n| n == implicit) {
                config.notifiers.push(implicit.to_string());
            }
        }
        let id = ProbeId(self.next_id);
        self.next_id += 1;
        self.probes.push(RegisteredProbe { id, config, probe });
        id
    }

    pub fn build(
        self,
        filter_retention_secs: i64,
        status: StatusSnapshot,
        sink: MeasurementSink,
        diagnostics: Arc<Diagnostics>,
    ) -> World {
        for registered in &self.probes {
            if registered.config.notifiers.len() == IMPLICIT_NOTIFIERS.len() {
                diagnostics.log(
                    crate::diagnostics::Level::Warn,
                    "registry",
                    &format!(
                        "probe '{}' ({}) has no explicit notifiers bound",
                        registered.config.kind, registered.config.description
                    ),
                );
            }
        }

        World {
            probes: self.probes,
            notifiers: self.notifiers,
            filter: FailureFilter::new(filter_retention_secs),
            status,
            sink,
            diagnostics,
        }
    }
}

impl Default for WorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::external::ExternalProbe;

    #[test]
    fn registering_a_probe_adds_implicit_notifiers() {
        let mut builder = WorldBuilder::new();
        let probe = Arc::new(ExternalProbe::new(vec!["true".to_string()], None, None).unwrap());
        let config = ProbeConfig::new("external", "smoke test");
        let id = builder.register_probe(probe, config);
        assert_eq!(id, ProbeId(1));
        assert_eq!(builder.probes[0].config.notifiers, vec!["sink", "webstatus"]);
    }

    #[test]
    fn ids_are_monotonic() {
        let mut builder = WorldBuilder::new();
        for _ in 0..3 {
            let probe = Arc::new(ExternalProbe::new(vec!["true".to_string()], None, None).unwrap());
            builder.register_probe(probe, ProbeConfig::new("external", "x"));
        }
        let ids: Vec<u64> = builder.probes.iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
