//! `dailychime` probe — an informational "I am alive" message, once per day
//! at a configured UTC hour (§4.7).

use crate::core::model::{AttributeMap, ProbeOutcome};
use crate::probes::{Probe, ProbeError};
use async_trait::async_trait;
use chrono::{NaiveDate, Timelike, Utc};
use tokio::sync::Mutex;

pub struct DailyChimeProbe {
    description: String,
    instance: String,
    utc_hour: u32,
    last_fired: Mutex<Option<NaiveDate>>,
}

impl DailyChimeProbe {
    pub fn new(instance: impl Into<String>, utc_hour: u32) -> Result<Self, ProbeError> {
        if utc_hour > 23 {
            return Err(ProbeError::invalid("utcHour", "must be 0..=23"));
        }
        let instance = instance.into();
        Ok(Self {
            description: format!("daily chime for {instance} at {utc_hour:02}:00 UTC"),
            instance,
            utc_hour,
            last_fired: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Probe for DailyChimeProbe {
    fn kind(&self) -> &'static str {
        "dailychime"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn attributes(&self) -> AttributeMap {
        AttributeMap::from_iter([("instance".to_string(), self.instance.clone().into())])
    }

    async fn run(&self) -> ProbeOutcome {
        let mut outcome = ProbeOutcome::new();
        let now = Utc::now();

        if now.hour() == self.utc_hour {
            let mut last_fired = self.last_fired.lock().await;
            let today = now.date_naive();
            if *last_fired != Some(today) {
                *last_fired = Some(today);
                outcome.add_reason(
                    "",
                    format!(
                        "Your daily chime from {} for {}. This is not an alert.",
                        self.instance,
                        today.format("%Y-%m-%d")
                    ),
                );
            }
        }

        outcome
    }
}
