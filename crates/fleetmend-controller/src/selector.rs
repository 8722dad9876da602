//! Selector engine: which machines a health-check policy covers.
//!
//! A policy's [`LabelSelector`] compiles into a [`LabelMatcher`], a flat list
//! of requirements that must all hold. An empty selector matches nothing,
//! so a policy with no selector cannot sweep the whole fleet.

use std::collections::{BTreeSet, HashSet};

use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use fleetmend_state::{
    FleetClient, LabelSelector, Labels, Machine, MachineHealthCheck, NodeName, SelectorOperator,
    StateResult,
};

const NAME_MAX_LEN: usize = 63;
const PREFIX_MAX_LEN: usize = 253;

/// Why a selector could not be compiled.
#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("invalid label key {0:?}")]
    InvalidKey(String),

    #[error("invalid value {value:?} for label key {key:?}")]
    InvalidValue { key: String, value: String },

    #[error("operator {operator:?} on {key:?} requires values")]
    MissingValues {
        key: String,
        operator: SelectorOperator,
    },

    #[error("operator {operator:?} on {key:?} takes no values")]
    UnexpectedValues {
        key: String,
        operator: SelectorOperator,
    },

    #[error("label syntax pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    Equals { key: String, value: String },
    In { key: String, values: HashSet<String> },
    NotIn { key: String, values: HashSet<String> },
    Exists { key: String },
    DoesNotExist { key: String },
}

impl Requirement {
    fn matches(&self, labels: &Labels) -> bool {
        match self {
            Requirement::Equals { key, value } => labels.get(key) == Some(value),
            Requirement::In { key, values } => labels.get(key).is_some_and(|v| values.contains(v)),
            // Absent keys satisfy NotIn.
            Requirement::NotIn { key, values } => {
                labels.get(key).is_none_or(|v| !values.contains(v))
            }
            Requirement::Exists { key } => labels.contains_key(key),
            Requirement::DoesNotExist { key } => !labels.contains_key(key),
        }
    }
}

/// A compiled label selector.
#[derive(Debug, Clone, Default)]
pub struct LabelMatcher {
    requirements: Vec<Requirement>,
}

impl LabelMatcher {
    /// Validate and compile a selector.
    pub fn from_selector(selector: &LabelSelector) -> Result<Self, SelectorError> {
        let syntax = LabelSyntax::new()?;
        let mut requirements = Vec::new();

        for (key, value) in &selector.match_labels {
            syntax.check_key(key)?;
            syntax.check_value(key, value)?;
            requirements.push(Requirement::Equals {
                key: key.clone(),
                value: value.clone(),
            });
        }

        for expr in &selector.match_expressions {
            syntax.check_key(&expr.key)?;
            let key = expr.key.clone();
            let requirement = match expr.operator {
                SelectorOperator::In | SelectorOperator::NotIn => {
                    if expr.values.is_empty() {
                        return Err(SelectorError::MissingValues {
                            key,
                            operator: expr.operator,
                        });
                    }
                    for value in &expr.values {
                        syntax.check_value(&key, value)?;
                    }
                    let values = expr.values.iter().cloned().collect();
                    if expr.operator == SelectorOperator::In {
                        Requirement::In { key, values }
                    } else {
                        Requirement::NotIn { key, values }
                    }
                }
                SelectorOperator::Exists | SelectorOperator::DoesNotExist => {
                    if !expr.values.is_empty() {
                        return Err(SelectorError::UnexpectedValues {
                            key,
                            operator: expr.operator,
                        });
                    }
                    if expr.operator == SelectorOperator::Exists {
                        Requirement::Exists { key }
                    } else {
                        Requirement::DoesNotExist { key }
                    }
                }
            };
            requirements.push(requirement);
        }

        Ok(Self { requirements })
    }

    /// True if the selector had no requirements at all.
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Whether `labels` satisfy every requirement. Empty matchers match nothing.
    pub fn matches(&self, labels: &Labels) -> bool {
        !self.is_empty() && self.requirements.iter().all(|r| r.matches(labels))
    }
}

/// Label key and value syntax: `[prefix/]name` keys, names and values of
/// at most 63 alphanumerics plus `-_.`, starting and ending alphanumeric.
struct LabelSyntax {
    name: Regex,
    prefix: Regex,
}

impl LabelSyntax {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            name: Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$")?,
            prefix: Regex::new(
                r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$",
            )?,
        })
    }

    fn check_key(&self, key: &str) -> Result<(), SelectorError> {
        let (prefix, name) = match key.split_once('/') {
            Some((prefix, name)) => (Some(prefix), name),
            None => (None, key),
        };
        let prefix_ok = prefix.is_none_or(|p| p.len() <= PREFIX_MAX_LEN && self.prefix.is_match(p));
        let name_ok = name.len() <= NAME_MAX_LEN && self.name.is_match(name);
        if prefix_ok && name_ok {
            Ok(())
        } else {
            Err(SelectorError::InvalidKey(key.to_string()))
        }
    }

    fn check_value(&self, key: &str, value: &str) -> Result<(), SelectorError> {
        if value.is_empty() || (value.len() <= NAME_MAX_LEN && self.name.is_match(value)) {
            Ok(())
        } else {
            Err(SelectorError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            })
        }
    }
}

/// Compile `policy`'s selector, or `None` if it can match nothing.
///
/// A selector that fails to compile is logged and treated as matching
/// nothing, as is an empty one.
pub fn policy_matcher(policy: &MachineHealthCheck) -> Option<LabelMatcher> {
    let matcher = match LabelMatcher::from_selector(&policy.selector) {
        Ok(matcher) => matcher,
        Err(e) => {
            warn!(policy = %policy.table_key(), error = %e, "unusable health check selector");
            return None;
        }
    };
    if matcher.is_empty() {
        debug!(policy = %policy.table_key(), "health check has empty selector");
        return None;
    }
    Some(matcher)
}

/// Whether `policy` covers `machine`.
pub fn matches(policy: &MachineHealthCheck, machine: &Machine) -> bool {
    policy_matcher(policy).is_some_and(|matcher| matcher.matches(&machine.labels))
}

/// Nodes backing every machine `policy` covers.
///
/// The selector is compiled once for the whole listing. Machines without a
/// node reference yet are skipped.
pub fn nodes_for_policy(
    client: &dyn FleetClient,
    policy: &MachineHealthCheck,
) -> StateResult<BTreeSet<NodeName>> {
    let Some(matcher) = policy_matcher(policy) else {
        return Ok(BTreeSet::new());
    };
    let nodes = client
        .list_machines(&policy.namespace)?
        .iter()
        .filter(|machine| matcher.matches(&machine.labels))
        .filter_map(|machine| machine.node_name().map(str::to_string))
        .collect();
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetmend_state::{LabelSelectorRequirement, NodeReference, StateStore};

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn expr(key: &str, operator: SelectorOperator, values: &[&str]) -> LabelSelectorRequirement {
        LabelSelectorRequirement {
            key: key.to_string(),
            operator,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn policy(selector: LabelSelector) -> MachineHealthCheck {
        MachineHealthCheck {
            namespace: "fleet".to_string(),
            name: "workers".to_string(),
            selector,
            ..Default::default()
        }
    }

    fn machine(name: &str, machine_labels: Labels, node: Option<&str>) -> Machine {
        Machine {
            namespace: "fleet".to_string(),
            name: name.to_string(),
            labels: machine_labels,
            node_ref: node.map(|n| NodeReference { name: n.to_string() }),
            ..Default::default()
        }
    }

    #[test]
    fn empty_selector_matches_nothing() {
        let mhc = policy(LabelSelector::default());
        assert!(!matches(&mhc, &machine("m1", Labels::new(), None)));
        assert!(!matches(&mhc, &machine("m2", labels(&[("role", "worker")]), None)));
    }

    #[test]
    fn match_labels_require_equality() {
        let mhc = policy(LabelSelector {
            match_labels: labels(&[("role", "worker")]),
            ..Default::default()
        });
        assert!(matches(&mhc, &machine("m1", labels(&[("role", "worker"), ("zone", "a")]), None)));
        assert!(!matches(&mhc, &machine("m2", labels(&[("role", "infra")]), None)));
        assert!(!matches(&mhc, &machine("m3", Labels::new(), None)));
    }

    #[test]
    fn set_operators() {
        let matcher = LabelMatcher::from_selector(&LabelSelector {
            match_expressions: vec![
                expr("zone", SelectorOperator::In, &["a", "b"]),
                expr("tier", SelectorOperator::NotIn, &["gpu"]),
                expr("managed", SelectorOperator::Exists, &[]),
                expr("frozen", SelectorOperator::DoesNotExist, &[]),
            ],
            ..Default::default()
        })
        .unwrap();

        assert!(matcher.matches(&labels(&[("zone", "a"), ("managed", "")])));
        assert!(matcher.matches(&labels(&[("zone", "b"), ("tier", "cpu"), ("managed", "y")])));
        assert!(!matcher.matches(&labels(&[("zone", "c"), ("managed", "")])));
        assert!(!matcher.matches(&labels(&[("zone", "a"), ("tier", "gpu"), ("managed", "")])));
        assert!(!matcher.matches(&labels(&[("zone", "a")])));
        assert!(!matcher.matches(&labels(&[("zone", "a"), ("managed", ""), ("frozen", "1")])));
    }

    #[test]
    fn prefixed_keys_are_accepted() {
        let matcher = LabelMatcher::from_selector(&LabelSelector {
            match_labels: labels(&[("machine.openshift.io/cluster-api-machine-role", "worker")]),
            ..Default::default()
        })
        .unwrap();
        assert!(matcher.matches(&labels(&[(
            "machine.openshift.io/cluster-api-machine-role",
            "worker"
        )])));
    }

    #[test]
    fn malformed_selectors_are_rejected() {
        let bad_key = LabelSelector {
            match_labels: labels(&[("-bad", "x")]),
            ..Default::default()
        };
        assert!(matches!(
            LabelMatcher::from_selector(&bad_key),
            Err(SelectorError::InvalidKey(_))
        ));

        let bad_value = LabelSelector {
            match_labels: labels(&[("role", "not valid")]),
            ..Default::default()
        };
        assert!(matches!(
            LabelMatcher::from_selector(&bad_value),
            Err(SelectorError::InvalidValue { .. })
        ));

        let in_without_values = LabelSelector {
            match_expressions: vec![expr("zone", SelectorOperator::In, &[])],
            ..Default::default()
        };
        assert!(matches!(
            LabelMatcher::from_selector(&in_without_values),
            Err(SelectorError::MissingValues { .. })
        ));

        let exists_with_values = LabelSelector {
            match_expressions: vec![expr("zone", SelectorOperator::Exists, &["a"])],
            ..Default::default()
        };
        assert!(matches!(
            LabelMatcher::from_selector(&exists_with_values),
            Err(SelectorError::UnexpectedValues { .. })
        ));
    }

    #[test]
    fn malformed_selector_matches_nothing() {
        let mhc = policy(LabelSelector {
            match_labels: labels(&[("role", "not valid")]),
            ..Default::default()
        });
        assert!(!matches(&mhc, &machine("m1", labels(&[("role", "not valid")]), None)));
    }

    #[test]
    fn nodes_for_policy_skips_unmatched_and_unjoined() {
        let store = StateStore::open_in_memory().unwrap();
        let worker = labels(&[("role", "worker")]);
        store.put_machine(&machine("m1", worker.clone(), Some("n1"))).unwrap();
        store.put_machine(&machine("m2", worker.clone(), None)).unwrap();
        store.put_machine(&machine("m3", labels(&[("role", "infra")]), Some("n3"))).unwrap();
        store.put_machine(&machine("m4", worker.clone(), Some("n4"))).unwrap();
        let mut elsewhere = machine("m5", worker.clone(), Some("n5"));
        elsewhere.namespace = "other".to_string();
        store.put_machine(&elsewhere).unwrap();

        let mhc = policy(LabelSelector {
            match_labels: worker,
            ..Default::default()
        });
        let nodes = nodes_for_policy(&store, &mhc).unwrap();
        assert_eq!(
            nodes.into_iter().collect::<Vec<_>>(),
            vec!["n1".to_string(), "n4".to_string()]
        );
    }

    #[test]
    fn unusable_selectors_cover_no_nodes() {
        let store = StateStore::open_in_memory().unwrap();
        let worker = labels(&[("role", "worker")]);
        store.put_machine(&machine("m1", worker.clone(), Some("n1"))).unwrap();
        store.put_machine(&machine("m2", Labels::new(), Some("n2"))).unwrap();

        let empty = policy(LabelSelector::default());
        assert!(policy_matcher(&empty).is_none());
        assert!(nodes_for_policy(&store, &empty).unwrap().is_empty());

        let broken = policy(LabelSelector {
            match_expressions: vec![expr("role", SelectorOperator::In, &[])],
            ..Default::default()
        });
        assert!(policy_matcher(&broken).is_none());
        assert!(nodes_for_policy(&store, &broken).unwrap().is_empty());

        let workers = policy(LabelSelector {
            match_labels: worker,
            ..Default::default()
        });
        let matcher = policy_matcher(&workers).unwrap();
        assert!(matcher.matches(&labels(&[("role", "worker")])));
        assert!(!matcher.matches(&Labels::new()));
    }
}
