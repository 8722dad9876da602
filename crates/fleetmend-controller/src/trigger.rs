//! Reconcile triggers emitted by the provisioning side.

use fleetmend_state::NodeName;

/// An event asking for one or more nodes to be reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// A node changed (or is due for a re-check).
    Node(NodeName),
    /// A health-check policy was created, updated or deleted. Fans out to
    /// every node it covers.
    HealthCheck { namespace: String, name: String },
}

impl Trigger {
    pub fn node(name: &str) -> Self {
        Trigger::Node(name.to_string())
    }

    pub fn health_check(namespace: &str, name: &str) -> Self {
        Trigger::HealthCheck {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Node(name) => write!(f, "node/{name}"),
            Trigger::HealthCheck { namespace, name } => {
                write!(f, "healthcheck/{namespace}/{name}")
            }
        }
    }
}
