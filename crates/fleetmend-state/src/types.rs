//! Domain types for the fleetmend state store.
//!
//! These types mirror the objects a machine health-check controller works
//! with: runtime nodes and their conditions, the machines backing them,
//! health-check policies, per-group disruption budgets and free-form config
//! resources. All types serialize to/from JSON for storage in redb tables.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of a node in the fleet (cluster-scoped, unique).
pub type NodeName = String;

/// Label or annotation map.
pub type Labels = BTreeMap<String, String>;

/// Annotation on a node naming the machine that backs it, as `namespace/name`.
pub const MACHINE_ANNOTATION: &str = "machine.openshift.io/machine";

/// Annotation on a node requesting a reboot. Only its presence matters.
pub const REBOOT_ANNOTATION: &str = "healthchecking.openshift.io/machine-remediation-reboot";

/// Owner kind that marks a machine as managed by a replacing group.
pub const MACHINE_SET_KIND: &str = "MachineSet";

/// Node labels that mark a control-plane node.
pub const CONTROL_PLANE_LABELS: &[&str] = &[
    "node-role.kubernetes.io/master",
    "node-role.kubernetes.io/control-plane",
];

// ── Node ──────────────────────────────────────────────────────────

/// A runtime node reporting health conditions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Node {
    #[serde(default)]
    pub name: NodeName,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: Labels,
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
    /// Bumped by the store on every write.
    #[serde(default)]
    pub resource_version: u64,
}

/// A single observed condition on a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    pub last_transition_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Tri-state condition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConditionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "True" => Ok(ConditionStatus::True),
            "False" => Ok(ConditionStatus::False),
            "Unknown" => Ok(ConditionStatus::Unknown),
            other => Err(format!("unknown condition status {other:?}")),
        }
    }
}

impl Node {
    /// Look up a condition by type.
    pub fn condition(&self, condition_type: &str) -> Option<&NodeCondition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    /// The raw `namespace/name` machine reference, if annotated.
    pub fn machine_ref(&self) -> Option<&str> {
        self.annotations.get(MACHINE_ANNOTATION).map(String::as_str)
    }

    /// Whether a reboot has already been requested for this node.
    pub fn reboot_requested(&self) -> bool {
        self.annotations.contains_key(REBOOT_ANNOTATION)
    }

    /// Whether the node carries a control-plane role label.
    pub fn is_control_plane(&self) -> bool {
        CONTROL_PLANE_LABELS
            .iter()
            .any(|label| self.labels.contains_key(*label))
    }
}

// ── Machine ───────────────────────────────────────────────────────

/// The managed compute unit backing a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Machine {
    /// Filled from the request path when registered through the API.
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
    /// Set once the backing node has joined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<NodeReference>,
    #[serde(default)]
    pub resource_version: u64,
}

/// Reference from an object to the object that owns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub controller: bool,
}

/// Reference from a machine to its node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeReference {
    pub name: NodeName,
}

/// Identity of a machine group (the `MachineSet` owning a machine).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupRef {
    pub namespace: String,
    pub name: String,
}

impl std::fmt::Display for GroupRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl Machine {
    /// The group that manages this machine, if any.
    pub fn owning_group(&self) -> Option<GroupRef> {
        self.owner_references
            .iter()
            .find(|owner| owner.kind == MACHINE_SET_KIND)
            .map(|owner| GroupRef {
                namespace: self.namespace.clone(),
                name: owner.name.clone(),
            })
    }

    /// Name of the backing node, once it has joined.
    pub fn node_name(&self) -> Option<&str> {
        self.node_ref.as_ref().map(|r| r.name.as_str())
    }
}

// ── Health checks ─────────────────────────────────────────────────

/// A machine health-check policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MachineHealthCheck {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub selector: LabelSelector,
    /// Absent means delete-based remediation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_strategy: Option<RemediationStrategy>,
    /// Set while the policy is being torn down.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resource_version: u64,
}

/// How an unhealthy machine is remediated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RemediationStrategy {
    /// Annotate the node and let an external agent reboot it.
    Reboot,
    /// Delete the machine so its group replaces it.
    #[default]
    Delete,
}

impl MachineHealthCheck {
    /// The effective remediation strategy.
    pub fn strategy(&self) -> RemediationStrategy {
        self.remediation_strategy.unwrap_or_default()
    }

    pub fn is_being_deleted(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

/// Label selector over machine labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: Labels,
    #[serde(default)]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

/// A single set-based selector requirement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: SelectorOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

// ── Disruption budget ─────────────────────────────────────────────

/// Remaining concurrent remediations permitted for one machine group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisruptionBudget {
    #[serde(default)]
    pub namespace: String,
    /// Name of the `MachineSet` this budget covers.
    #[serde(default)]
    pub group: String,
    pub disruptions_allowed: u32,
    #[serde(default)]
    pub resource_version: u64,
}

// ── Config resources ──────────────────────────────────────────────

/// Free-form key/value configuration resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConfigResource {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(default)]
    pub resource_version: u64,
}

/// Build the `{namespace}/{name}` key used by namespaced tables.
pub fn namespaced_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

impl Machine {
    /// Build the composite key for the machines table.
    pub fn table_key(&self) -> String {
        namespaced_key(&self.namespace, &self.name)
    }
}

impl MachineHealthCheck {
    /// Build the composite key for the health checks table.
    pub fn table_key(&self) -> String {
        namespaced_key(&self.namespace, &self.name)
    }
}

impl DisruptionBudget {
    /// Build the composite key for the budgets table.
    pub fn table_key(&self) -> String {
        namespaced_key(&self.namespace, &self.group)
    }
}

impl ConfigResource {
    /// Build the composite key for the configs table.
    pub fn table_key(&self) -> String {
        namespaced_key(&self.namespace, &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owning_group_requires_machine_set_kind() {
        let mut machine = Machine {
            namespace: "fleet".to_string(),
            name: "m1".to_string(),
            owner_references: vec![OwnerReference {
                kind: "Cluster".to_string(),
                name: "c1".to_string(),
                controller: false,
            }],
            ..Default::default()
        };
        assert_eq!(machine.owning_group(), None);

        machine.owner_references.push(OwnerReference {
            kind: MACHINE_SET_KIND.to_string(),
            name: "workers".to_string(),
            controller: true,
        });
        assert_eq!(
            machine.owning_group(),
            Some(GroupRef {
                namespace: "fleet".to_string(),
                name: "workers".to_string(),
            })
        );
    }

    #[test]
    fn control_plane_detection_covers_both_labels() {
        let mut node = Node {
            name: "n1".to_string(),
            ..Default::default()
        };
        assert!(!node.is_control_plane());

        node.labels
            .insert("node-role.kubernetes.io/control-plane".to_string(), String::new());
        assert!(node.is_control_plane());

        node.labels.clear();
        node.labels
            .insert("node-role.kubernetes.io/master".to_string(), String::new());
        assert!(node.is_control_plane());
    }

    #[test]
    fn condition_type_serializes_as_type() {
        let cond = NodeCondition {
            condition_type: "Ready".to_string(),
            status: ConditionStatus::Unknown,
            last_transition_time: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            reason: None,
            message: None,
        };
        let json = serde_json::to_value(&cond).unwrap();
        assert_eq!(json["type"], "Ready");
        assert_eq!(json["status"], "Unknown");
    }

    #[test]
    fn strategy_defaults_to_delete() {
        let mhc = MachineHealthCheck::default();
        assert_eq!(mhc.strategy(), RemediationStrategy::Delete);

        let json = r#"{"namespace":"a","name":"b","remediation_strategy":"reboot"}"#;
        let mhc: MachineHealthCheck = serde_json::from_str(json).unwrap();
        assert_eq!(mhc.strategy(), RemediationStrategy::Reboot);
    }

    #[test]
    fn condition_status_parses_trimmed() {
        assert_eq!(" Unknown ".parse::<ConditionStatus>(), Ok(ConditionStatus::Unknown));
        assert!("maybe".parse::<ConditionStatus>().is_err());
    }
}
