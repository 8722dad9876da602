//! Condition store: the configured definition of "unhealthy".
//!
//! The policies live in a config resource named
//! [`UNHEALTHY_CONDITIONS_CONFIG`] under the key [`CONDITIONS_KEY`], as YAML:
//!
//! ```yaml
//! items:
//! - name: Ready
//!   status: Unknown
//!   timeout: 300s
//! - name: Ready
//!   status: "False"
//!   timeout: 300s
//! ```
//!
//! Nothing is cached: every `load` reads the resource again, so edits take
//! effect on the next reconcile.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use fleetmend_state::{ConditionStatus, FleetClient, StateError};

/// Name of the config resource holding unhealthy condition policies.
pub const UNHEALTHY_CONDITIONS_CONFIG: &str = "node-unhealthy-conditions";

/// Key inside the config resource's data holding the YAML document.
pub const CONDITIONS_KEY: &str = "conditions";

/// Timeout of the built-in default policy.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Result type alias for condition store operations.
pub type ConditionsResult<T> = Result<T, ConditionsError>;

/// Errors produced while loading unhealthy condition policies.
#[derive(Debug, Error)]
pub enum ConditionsError {
    /// The config resource exists but its content is unusable.
    #[error("malformed unhealthy conditions in {resource}: {reason}")]
    Parse { resource: String, reason: String },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

/// One `(condition type, status, timeout)` policy entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnhealthyCondition {
    pub condition_type: String,
    pub status: ConditionStatus,
    pub timeout: Duration,
}

impl UnhealthyCondition {
    pub fn new(condition_type: &str, status: ConditionStatus, timeout: Duration) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            status,
            timeout,
        }
    }
}

/// The policy used when no config resource exists.
pub fn default_conditions() -> Vec<UnhealthyCondition> {
    vec![UnhealthyCondition::new(
        "Ready",
        ConditionStatus::Unknown,
        DEFAULT_TIMEOUT,
    )]
}

/// Reads unhealthy condition policies from a namespace's config resource.
pub struct ConditionStore {
    client: Arc<dyn FleetClient>,
    namespace: String,
}

impl ConditionStore {
    /// Create a condition store reading from `namespace`.
    pub fn new(client: Arc<dyn FleetClient>, namespace: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
        }
    }

    /// Load the configured policies, in document order.
    ///
    /// A missing resource yields [`default_conditions`]. A present but
    /// malformed one fails with [`ConditionsError::Parse`].
    pub fn load(&self) -> ConditionsResult<Vec<UnhealthyCondition>> {
        let resource = format!("{}/{}", self.namespace, UNHEALTHY_CONDITIONS_CONFIG);
        let config = self
            .client
            .get_config(&self.namespace, UNHEALTHY_CONDITIONS_CONFIG)?;

        let Some(config) = config else {
            let defaults = default_conditions();
            info!(
                %resource,
                defaults = %describe(&defaults),
                "unhealthy conditions config not found, using defaults"
            );
            return Ok(defaults);
        };

        let data = config
            .data
            .get(CONDITIONS_KEY)
            .ok_or_else(|| ConditionsError::Parse {
                resource: resource.clone(),
                reason: format!("missing {CONDITIONS_KEY:?} key"),
            })?;

        let conditions = parse_conditions(data).map_err(|reason| ConditionsError::Parse {
            resource: resource.clone(),
            reason,
        })?;
        debug!(%resource, count = conditions.len(), "unhealthy conditions loaded");
        Ok(conditions)
    }
}

#[derive(Deserialize)]
struct RawConditions {
    items: Vec<RawCondition>,
}

#[derive(Deserialize)]
struct RawCondition {
    name: String,
    status: String,
    timeout: String,
}

/// Parse the YAML policy document.
pub fn parse_conditions(data: &str) -> Result<Vec<UnhealthyCondition>, String> {
    let raw: RawConditions = serde_yaml::from_str(data).map_err(|e| e.to_string())?;

    raw.items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let condition_type = item.name.trim();
            if condition_type.is_empty() {
                return Err(format!("item {i}: empty condition name"));
            }
            let status = item
                .status
                .parse::<ConditionStatus>()
                .map_err(|e| format!("item {i}: {e}"))?;
            let timeout = parse_duration(&item.timeout)
                .ok_or_else(|| format!("item {i}: invalid timeout {:?}", item.timeout))?;
            Ok(UnhealthyCondition::new(condition_type, status, timeout))
        })
        .collect()
}

/// Parse a duration string the way Go's `time.ParseDuration` does:
/// "60s", "1.5m", "1h30m", "2m0.5s", "300us".
///
/// Each component is a decimal number with an optional fraction and a unit
/// (`ns`, `us`/`µs`, `ms`, `s`, `m`, `h`). A bare integer is taken as
/// seconds. Negative durations are rejected.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total_nanos: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let (whole, after) = split_digits(rest);
        let (fraction, after) = match after.strip_prefix('.') {
            Some(after) => split_digits(after),
            None => ("", after),
        };
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let per_unit = unit_nanos(&after[..unit_len])?;
        rest = &after[unit_len..];

        let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let mut part = whole.checked_mul(per_unit)?;
        // Digits past the unit's resolution are truncated.
        let mut scale = per_unit;
        for digit in fraction.bytes() {
            scale /= 10;
            if scale == 0 {
                break;
            }
            part += u128::from(digit - b'0') * scale;
        }
        total_nanos = total_nanos.checked_add(part)?;
    }

    let secs = u64::try_from(total_nanos / NANOS_PER_SEC).ok()?;
    let nanos = u32::try_from(total_nanos % NANOS_PER_SEC).ok()?;
    Some(Duration::new(secs, nanos))
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

fn split_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "\u{b5}s" | "\u{3bc}s" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3_600 * NANOS_PER_SEC),
        _ => None,
    }
}

fn describe(conditions: &[UnhealthyCondition]) -> String {
    conditions
        .iter()
        .map(|c| format!("{}={} after {:?}", c.condition_type, c.status, c.timeout))
        .collect::<Vec<_>>()
        .join(", ")
}
