//! Prometheus text exposition of cluster gauges.

use std::fmt::Write;

use dockyard_cluster::ClusterView;

/// Render the gauges derived from a cluster snapshot.
pub fn render_prometheus(view: &ClusterView) -> String {
    let mut out = String::new();

    gauge(&mut out, "dockyard_nodes", "Registered nodes.", view.nodes.len());
    gauge(&mut out, "dockyard_services", "Registered services.", view.services.len());
    gauge(
        &mut out,
        "dockyard_containers",
        "Containers owned by a service.",
        view.container_count(),
    );
    gauge(
        &mut out,
        "dockyard_pending_tasks",
        "Durable tasks not yet drained into the dispatch queue.",
        view.pending_tasks,
    );
    gauge(
        &mut out,
        "dockyard_dispatch_queue_depth",
        "Tasks waiting in the dispatch queue.",
        view.queue_depth,
    );

    out.push_str("# HELP dockyard_service_replicas Recorded replicas per service.\n");
    out.push_str("# TYPE dockyard_service_replicas gauge\n");
    for s in &view.services {
        let _ = writeln!(
            out,
            "dockyard_service_replicas{{service=\"{}\"}} {}",
            escape_label(&s.name),
            s.rs
        );
    }

    out
}

/// Escape a label value for the text exposition format.
fn escape_label(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn gauge(out: &mut String, name: &str, help: &str, value: usize) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
    let _ = writeln!(out, "{name} {value}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_cluster::{ContainerView, NodeView, ServiceView};

    #[test]
    fn renders_all_gauges() {
        let view = ClusterView {
            nodes: vec![NodeView {
                name: "n1".into(),
                ip: None,
                uptime: None,
            }],
            services: vec![ServiceView {
                name: "web".into(),
                rs: 2,
                containers: vec![
                    ContainerView {
                        name: "web-a".into(),
                        image: Some("nginx".into()),
                        node: Some("n1".into()),
                    },
                    ContainerView {
                        name: "web-b".into(),
                        image: None,
                        node: None,
                    },
                ],
            }],
            pending_tasks: 3,
            queue_depth: 1,
        };

        let text = render_prometheus(&view);
        assert!(text.contains("# TYPE dockyard_nodes gauge\ndockyard_nodes 1\n"));
        assert!(text.contains("dockyard_services 1\n"));
        assert!(text.contains("dockyard_containers 2\n"));
        assert!(text.contains("dockyard_pending_tasks 3\n"));
        assert!(text.contains("dockyard_dispatch_queue_depth 1\n"));
        assert!(text.contains("dockyard_service_replicas{service=\"web\"} 2\n"));
    }

    #[test]
    fn label_values_are_escaped() {
        assert_eq!(escape_label("web"), "web");
        assert_eq!(escape_label(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(escape_label("a\nb"), "a\\nb");
    }
}
