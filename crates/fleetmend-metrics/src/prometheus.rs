//! Prometheus text exposition format.
//!
//! Renders a metrics snapshot for scraping by a Prometheus server or
//! compatible agent.

use crate::counters::{Counter, MetricsSnapshot};

/// Render a snapshot into Prometheus text format.
///
/// Every outcome counter is emitted unlabelled; per-group remediations are
/// emitted as `fleetmend_remediations_total{group, action}`.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    for counter in Counter::ALL {
        let name = counter.metric_name();
        out.push_str(&format!("# HELP {name} {}\n", counter.help()));
        out.push_str(&format!("# TYPE {name} counter\n"));
        out.push_str(&format!("{name} {}\n", snapshot.get(counter)));
    }

    out.push_str("# HELP fleetmend_remediations_total Remediations per machine group.\n");
    out.push_str("# TYPE fleetmend_remediations_total counter\n");
    for ((group, action), count) in &snapshot.remediations {
        out.push_str(&format!(
            "fleetmend_remediations_total{{group=\"{}\",action=\"{}\"}} {}\n",
            escape_label(group),
            action.as_str(),
            count
        ));
    }

    out
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
