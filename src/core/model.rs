//! Core data model shared by probes, the failure filter, the correlator and
//! the notifier dispatcher.
//!
//! Plain structs and enums with `serde` derives for the parts that cross the
//! measurement sink / status HTTP boundary, `Display` impls for the parts
//! that render to humans.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque, stable probe identity assigned at registration time.
///
/// Stands in for the pointer-identity uniqueness a native registry would get
/// for free from comparing checker pointers directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProbeId(pub u64);

/// A scalar measurement or attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}
impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Str(v)
    }
}
impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}
impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Scalar::Int(v as i64)
    }
}
impl From<u64> for Scalar {
    fn from(v: u64) -> Self {
        Scalar::Int(v as i64)
    }
}
impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}
impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}
impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

pub type AttributeMap = BTreeMap<String, Scalar>;
pub type MeasurementRow = BTreeMap<String, Scalar>;

/// Result of one probe invocation.
///
/// `reasons`/`measurements` are keyed by subject; an empty subject (`""`) is
/// used when the probe has a single target. Absence of a key, or an empty
/// reason list for a present key, both mean "no failure for that subject".
#[derive(Debug, Clone, Default)]
pub struct ProbeOutcome {
    pub attributes: AttributeMap,
    pub measurements: BTreeMap<String, MeasurementRow>,
    pub reasons: BTreeMap<String, Vec<String>>,
}

impl ProbeOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome representing an uncaught probe panic/exception (§3, §7).
    pub fn from_exception(message: impl Into<String>) -> Self {
        let mut outcome = ProbeOutcome::new();
        outcome
            .reasons
            .insert(String::new(), vec![format!("Exception caught: {}", message.into())]);
        outcome
    }

    pub fn add_measurement(&mut self, subject: impl Into<String>, row: MeasurementRow) {
        self.measurements.insert(subject.into(), row);
    }

    pub fn add_reason(&mut self, subject: impl Into<String>, reason: impl Into<String>) {
        self.reasons
            .entry(subject.into())
            .or_default()
            .push(reason.into());
    }

    /// True if no subject carries a non-empty reason list.
    pub fn is_success(&self) -> bool {
        self.reasons.values().all(|v| v.is_empty())
    }

    /// Iterate over `(subject, reason)` pairs with a non-empty reason text.
    pub fn failing_reasons(&self) -> impl Iterator<Item = (&str, &str)> {
        self.reasons.iter().flat_map(|(subject, reasons)| {
            reasons
                .iter()
                .filter(|r| !r.is_empty())
                .map(move |r| (subject.as_str(), r.as_str()))
        })
    }
}

/// `(probe, subject, reason-text)` — the failure filter's key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlertKey {
    pub probe: ProbeId,
    pub subject: String,
    pub reason: String,
}

impl AlertKey {
    pub fn new(probe: ProbeId, subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            probe,
            subject: subject.into(),
            reason: reason.into(),
        }
    }
}

/// One alert surfaced by the failure filter for a given cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActiveAlert {
    pub probe: ProbeId,
    pub display: String,
}

/// Render the canonical `"<kind>: [<subject>] <reason>"` display string.
pub fn render_display_string(kind: &str, subject: &str, reason: &str) -> String {
    format!("{}: [{}] {}", kind, subject, reason)
}

/// Render the resolution message that mirrors an original alert (§4.4).
pub fn render_resolution(display: &str) -> String {
    format!("\u{1F389} the following alert is over: {}", display)
}

/// Render a resolution message annotated with how long the alert persisted
/// past the notifier's minimum-age gate (§4.4 step f).
pub fn render_aged_resolution(display: &str, age: &str) -> String {
    format!(
        "\u{1F389} after {}, the following alert is over: {}",
        age, display
    )
}

/// Render the age-qualified prefix used when `minMinutes > 0` (§4.4 step e).
pub fn render_aged_prefix(age: &str) -> String {
    format!("({} already) ", age)
}

/// Render a human-readable duration for gate age phrases ("10 minutes",
/// "1 hour 5 minutes"). Granularity matches what the original notifier
/// messages need: minutes below an hour, hours+minutes above.
pub fn render_age_phrase(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let minutes = seconds / 60;
    if minutes < 60 {
        pluralize(minutes, "minute")
    } else {
        let hours = minutes / 60;
        let rem_minutes = minutes % 60;
        if rem_minutes == 0 {
            pluralize(hours, "hour")
        } else {
            format!("{} {}", pluralize(hours, "hour"), pluralize(rem_minutes, "minute"))
        }
    }
}

fn pluralize(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

impl fmt::Display for ActiveAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display)
    }
}

/// Per-probe sensitivity and binding, immutable after construction (§3).
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub kind: String,
    pub description: String,
    pub min_failures: u32,
    pub failure_window_secs: i64,
    pub mute: bool,
    pub notifiers: Vec<String>,
    pub attributes: AttributeMap,
}

impl ProbeConfig {
    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
            min_failures: 1,
            failure_window_secs: 60,
            mute: false,
            notifiers: Vec::new(),
            attributes: AttributeMap::new(),
        }
    }
}
