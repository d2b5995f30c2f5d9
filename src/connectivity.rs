//! The declarative, mutable description of all known connections, plus a
//! derived per-port index for point lookups.
//!
//! One [`Connectivity`] belongs to one local bootstrap context. Edges name
//! both sides as `(application, port)` pairs; the index only covers ports
//! of the local application. The graph never stores a dangling edge: a
//! disconnect removes every edge touching the removed identifier and the
//! index entries derived from them.

use std::collections::BTreeMap;
use std::fmt::Display;

use itertools::Itertools;

pub use simbus_config::{CommunicationType, ConnectionEntry as Connection, PortRef, ProcessingMethod};

use crate::Error;

/// Number of logical channels on a connection. `None` is the "infer from
/// the remote side during negotiation" sentinel.
pub type Width = Option<u32>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// One remote endpoint a local port is wired to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectorInfo {
    pub remote: PortRef,
    pub width: Width,
    pub comm: CommunicationType,
    pub method: ProcessingMethod,
}

/// Aggregated connectivity of one local port: its direction, the width
/// agreed across its edges, and every remote endpoint it fans to or from.
#[derive(Clone, Debug)]
pub struct ConnectivityInfo {
    direction: PortDirection,
    width: Width,
    connections: Vec<ConnectorInfo>,
}

impl ConnectivityInfo {
    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// The finite width agreed across all edges of this port, or `None`
    /// while every edge leaves it unspecified.
    pub fn width(&self) -> Width {
        self.width
    }

    pub fn connections(&self) -> &[ConnectorInfo] {
        &self.connections
    }
}

/// The full set of connection edges known to one bootstrap context.
#[derive(Debug, Default)]
pub struct Connectivity {
    local_app: String,
    edges: Vec<Connection>,
    index: BTreeMap<String, ConnectivityInfo>,
}

impl Connectivity {
    pub fn new(local_app: impl Into<String>) -> Self {
        Self {
            local_app: local_app.into(),
            edges: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    pub fn local_app(&self) -> &str {
        &self.local_app
    }

    /// Append a new edge. Width must be positive or the unspecified
    /// sentinel. A duplicate `(sender, receiver)` 4-tuple is allowed only
    /// when it differs in communication type or processing method;
    /// otherwise the call is a declaration conflict.
    #[allow(clippy::too_many_arguments)]
    pub fn connect(
        &mut self,
        sender_app: &str,
        sender_port: &str,
        receiver_app: &str,
        receiver_port: &str,
        width: Width,
        comm: CommunicationType,
        method: ProcessingMethod,
    ) -> Result<(), Error> {
        let edge = Connection {
            from: PortRef::new(sender_app, sender_port),
            to: PortRef::new(receiver_app, receiver_port),
            width,
            comm,
            method,
        };
        self.add_edge(edge)
    }

    /// Replay one parsed declarative entry as a connect call.
    pub fn add_edge(&mut self, edge: Connection) -> Result<(), Error> {
        if edge.width == Some(0) {
            return Err(Error::DeclarationConflict(format!(
                "connection `{}` -> `{}` declares zero width",
                edge.from, edge.to
            )));
        }
        if self
            .edges
            .iter()
            .any(|e| e.from == edge.from && e.to == edge.to && e.comm == edge.comm && e.method == edge.method)
        {
            return Err(Error::DeclarationConflict(format!(
                "edge `{}` -> `{}` ({}, {}) declared twice",
                edge.from, edge.to, edge.comm, edge.method
            )));
        }

        // Validate the prospective index updates before mutating anything.
        for (port, direction) in self.local_sides(&edge) {
            if let Some(info) = self.index.get(port) {
                if info.direction != direction {
                    return Err(Error::DeclarationConflict(format!(
                        "port `{port}` used as both {} and {}",
                        info.direction, direction
                    )));
                }
                if let (Some(a), Some(b)) = (info.width, edge.width) {
                    if a != b {
                        return Err(Error::DeclarationConflict(format!(
                            "port `{port}` declared with conflicting widths {a} and {b}"
                        )));
                    }
                }
            }
        }

        self.index_edge(&edge);
        log::trace!(
            "edge `{}` -> `{}` ({}, {}) added",
            edge.from,
            edge.to,
            edge.comm,
            edge.method
        );
        self.edges.push(edge);
        Ok(())
    }

    /// Remove every edge touching `(app, port)`. Idempotent: removal of
    /// an unknown port is a no-op and reports no change.
    pub fn disconnect_port(&mut self, app: &str, port: &str) -> bool {
        let before = self.edges.len();
        self.edges.retain(|e| {
            !(e.from.app == app && e.from.port == port) && !(e.to.app == app && e.to.port == port)
        });
        let changed = self.edges.len() != before;
        if changed {
            log::trace!("all edges touching `{app}.{port}` removed");
            self.rebuild_index();
        }
        changed
    }

    /// Remove the edges matching the given 4-tuple (all communication
    /// kinds). Idempotent: a missing edge is a no-op.
    pub fn disconnect_edge(
        &mut self,
        sender_app: &str,
        sender_port: &str,
        receiver_app: &str,
        receiver_port: &str,
    ) -> bool {
        let before = self.edges.len();
        self.edges.retain(|e| {
            !(e.from.app == sender_app
                && e.from.port == sender_port
                && e.to.app == receiver_app
                && e.to.port == receiver_port)
        });
        let changed = self.edges.len() != before;
        if changed {
            self.rebuild_index();
        }
        changed
    }

    /// Aggregated connectivity for a local port name. `None` means the
    /// name is unknown to the graph, which callers must treat as distinct
    /// from "known but unconnected".
    pub fn info(&self, local_name: &str) -> Option<&ConnectivityInfo> {
        self.index.get(local_name)
    }

    pub fn is_connected(&self, local_name: &str) -> bool {
        self.index
            .get(local_name)
            .is_some_and(|info| !info.connections.is_empty())
    }

    pub fn edges(&self) -> &[Connection] {
        &self.edges
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Local port names present in the index, for diagnostics.
    pub fn local_ports(&self) -> String {
        self.index.keys().join(", ")
    }

    /// Which sides of `edge` belong to the local application. A self
    /// coupling contributes both an output and an input entry.
    fn local_sides<'a>(&self, edge: &'a Connection) -> Vec<(&'a str, PortDirection)> {
        let mut sides = Vec::new();
        if edge.from.app == self.local_app {
            sides.push((edge.from.port.as_str(), PortDirection::Output));
        }
        if edge.to.app == self.local_app {
            sides.push((edge.to.port.as_str(), PortDirection::Input));
        }
        sides
    }

    // Precondition: the edge has passed the checks in `add_edge`.
    fn index_edge(&mut self, edge: &Connection) {
        for (port, direction) in self.local_sides(edge) {
            let remote = match direction {
                PortDirection::Output => edge.to.clone(),
                PortDirection::Input => edge.from.clone(),
            };
            let info = self
                .index
                .entry(port.to_string())
                .or_insert_with(|| ConnectivityInfo {
                    direction,
                    width: None,
                    connections: Vec::new(),
                });
            if info.width.is_none() {
                info.width = edge.width;
            }
            info.connections.push(ConnectorInfo {
                remote,
                width: edge.width,
                comm: edge.comm,
                method: edge.method,
            });
        }
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        let edges = std::mem::take(&mut self.edges);
        for edge in &edges {
            self.index_edge(edge);
        }
        self.edges = edges;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> Connectivity {
        Connectivity::new("local")
    }

    #[test]
    fn connect_indexes_local_sides() {
        let mut g = graph();
        g.connect(
            "local",
            "out",
            "peer",
            "in",
            Some(8),
            CommunicationType::Event,
            ProcessingMethod::Collective,
        )
        .unwrap();

        let info = g.info("out").unwrap();
        assert_eq!(info.direction(), PortDirection::Output);
        assert_eq!(info.width(), Some(8));
        assert_eq!(info.connections().len(), 1);
        assert_eq!(info.connections()[0].remote, PortRef::new("peer", "in"));

        // The remote side is not indexed locally.
        assert!(g.info("in").is_none());
    }

    #[test]
    fn duplicate_edge_needs_different_kind() {
        let mut g = graph();
        g.connect(
            "local",
            "out",
            "peer",
            "in",
            None,
            CommunicationType::Event,
            ProcessingMethod::Collective,
        )
        .unwrap();

        // Same 4-tuple, same kind: conflict.
        assert!(matches!(
            g.connect(
                "local",
                "out",
                "peer",
                "in",
                None,
                CommunicationType::Event,
                ProcessingMethod::Collective,
            ),
            Err(Error::DeclarationConflict(_))
        ));

        // Same 4-tuple, different processing method: allowed.
        g.connect(
            "local",
            "out",
            "peer",
            "in",
            None,
            CommunicationType::Event,
            ProcessingMethod::PointToPoint,
        )
        .unwrap();
        assert_eq!(g.num_edges(), 2);
    }

    #[test]
    fn zero_width_rejected() {
        let mut g = graph();
        assert!(matches!(
            g.connect(
                "local",
                "out",
                "peer",
                "in",
                Some(0),
                CommunicationType::Continuous,
                ProcessingMethod::PointToPoint,
            ),
            Err(Error::DeclarationConflict(_))
        ));
        assert_eq!(g.num_edges(), 0);
    }

    #[test]
    fn conflicting_widths_rejected() {
        let mut g = graph();
        g.connect(
            "local",
            "out",
            "a",
            "in",
            Some(8),
            CommunicationType::Event,
            ProcessingMethod::Collective,
        )
        .unwrap();
        assert!(matches!(
            g.connect(
                "local",
                "out",
                "b",
                "in",
                Some(16),
                CommunicationType::Event,
                ProcessingMethod::Collective,
            ),
            Err(Error::DeclarationConflict(_))
        ));
    }

    #[test]
    fn fan_out_resolves_width_from_any_edge() {
        let mut g = graph();
        g.connect(
            "local",
            "out",
            "a",
            "in",
            None,
            CommunicationType::Event,
            ProcessingMethod::Collective,
        )
        .unwrap();
        g.connect(
            "local",
            "out",
            "b",
            "in",
            Some(32),
            CommunicationType::Event,
            ProcessingMethod::Collective,
        )
        .unwrap();

        assert_eq!(g.info("out").unwrap().width(), Some(32));
        assert_eq!(g.info("out").unwrap().connections().len(), 2);
    }

    #[test]
    fn direction_conflict_rejected() {
        let mut g = graph();
        g.connect(
            "local",
            "p",
            "peer",
            "in",
            None,
            CommunicationType::Message,
            ProcessingMethod::PointToPoint,
        )
        .unwrap();
        assert!(matches!(
            g.connect(
                "peer",
                "out",
                "local",
                "p",
                None,
                CommunicationType::Message,
                ProcessingMethod::PointToPoint,
            ),
            Err(Error::DeclarationConflict(_))
        ));
    }

    #[test]
    fn self_coupling_indexes_both_sides() {
        let mut g = graph();
        g.connect(
            "local",
            "out",
            "local",
            "in",
            Some(4),
            CommunicationType::Continuous,
            ProcessingMethod::PointToPoint,
        )
        .unwrap();

        assert_eq!(g.info("out").unwrap().direction(), PortDirection::Output);
        assert_eq!(g.info("in").unwrap().direction(), PortDirection::Input);
    }

    #[test]
    fn disconnect_port_removes_all_touching_edges() {
        let mut g = graph();
        g.connect(
            "local",
            "out",
            "a",
            "in",
            None,
            CommunicationType::Event,
            ProcessingMethod::Collective,
        )
        .unwrap();
        g.connect(
            "local",
            "out",
            "b",
            "in",
            None,
            CommunicationType::Event,
            ProcessingMethod::Collective,
        )
        .unwrap();
        g.connect(
            "a",
            "other",
            "local",
            "in2",
            None,
            CommunicationType::Event,
            ProcessingMethod::Collective,
        )
        .unwrap();

        assert!(g.disconnect_port("local", "out"));
        assert_eq!(g.num_edges(), 1);
        assert!(g.info("out").is_none());
        assert!(g.info("in2").is_some());
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut g = graph();
        g.connect(
            "local",
            "out",
            "peer",
            "in",
            None,
            CommunicationType::Event,
            ProcessingMethod::Collective,
        )
        .unwrap();

        assert!(g.disconnect_edge("local", "out", "peer", "in"));
        assert!(!g.disconnect_edge("local", "out", "peer", "in"));
        assert!(!g.disconnect_port("local", "out"));
        assert_eq!(g.num_edges(), 0);
    }

    #[test]
    fn disconnect_remote_edge_updates_local_index() {
        let mut g = graph();
        g.connect(
            "peer",
            "out",
            "local",
            "in",
            Some(2),
            CommunicationType::Continuous,
            ProcessingMethod::PointToPoint,
        )
        .unwrap();

        assert!(g.disconnect_port("peer", "out"));
        assert!(g.info("in").is_none());
        assert!(!g.is_connected("in"));
    }
}
