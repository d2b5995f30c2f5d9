//! Port bookkeeping for one bootstrap context: the connectivity graph,
//! the table of weakly observed ports, and the dirty flag whoever derives
//! cached port metadata is expected to observe and clear.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::connectivity::{
    CommunicationType, Connection, Connectivity, ConnectivityInfo, PortDirection,
    ProcessingMethod, Width,
};
use crate::port::{Port, PortKind};
use crate::Error;

pub struct PortConnectivityManager {
    connectivity: Connectivity,
    /// Weak observations only: the manager never extends a port's
    /// lifetime, and a lookup against a destroyed port reports "not
    /// instantiated" instead of dereferencing stale state.
    ports: BTreeMap<String, Weak<Port>>,
    application: String,
    modified: Cell<bool>,
}

impl PortConnectivityManager {
    pub fn new(application: impl Into<String>) -> Self {
        let application = application.into();
        Self {
            connectivity: Connectivity::new(application.clone()),
            ports: BTreeMap::new(),
            application,
            modified: Cell::new(false),
        }
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    /// Whether a live port object currently backs this name.
    pub fn is_instantiated(&self, identifier: &str) -> bool {
        self.ports
            .get(identifier)
            .is_some_and(|weak| weak.upgrade().is_some())
    }

    /// Build a strongly owned port and register a weak observation of it.
    /// A repeat call for a live name fails: creation carries side effects
    /// (buffer sizing from width) that must happen exactly once. An entry
    /// whose port has been dropped is replaceable.
    pub fn create_port(&mut self, kind: PortKind, identifier: &str) -> Result<Rc<Port>, Error> {
        if self.is_instantiated(identifier) {
            return Err(Error::PortAlreadyInstantiated(identifier.to_string()));
        }
        let port = Rc::new(Port::new(&self.application, identifier, kind));
        self.ports
            .insert(identifier.to_string(), Rc::downgrade(&port));
        log::debug!("port `{port}` instantiated");
        Ok(port)
    }

    /// Drop the weak observation of a port. Idempotent.
    pub fn remove_port(&mut self, identifier: &str) {
        if self.ports.remove(identifier).is_some() {
            log::debug!("port `{}.{identifier}` removed", self.application);
            self.modified.set(true);
        }
    }

    /// The current set of live ports; expired entries are skipped.
    pub fn ports(&self) -> Vec<Rc<Port>> {
        self.ports.values().filter_map(Weak::upgrade).collect()
    }

    /// Re-derive cached per-port metadata from the connectivity graph for
    /// every live port. Must run after the graph is finalized and before
    /// any width-dependent object is constructed: a width left unspecified
    /// at declaration time resolves only once the remote side is known.
    pub fn update_ports(&mut self) -> Result<(), Error> {
        for port in self.ports() {
            if let Some(info) = self.connectivity.info(port.name()) {
                if info.direction() != port.direction() {
                    return Err(Error::DeclarationConflict(format!(
                        "port `{port}` is wired as an {} (wired local ports: {})",
                        info.direction(),
                        self.connectivity.local_ports()
                    )));
                }
                port.set_width(info.width());
            }
        }
        self.modified.set(false);
        Ok(())
    }

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
        self.connectivity.connect(
            sender_app,
            sender_port,
            receiver_app,
            receiver_port,
            width,
            comm,
            method,
        )?;
        self.modified.set(true);
        Ok(())
    }

    /// Replay a parsed declarative entry.
    pub fn add_edge(&mut self, edge: Connection) -> Result<(), Error> {
        self.connectivity.add_edge(edge)?;
        self.modified.set(true);
        Ok(())
    }

    pub fn disconnect_port(&mut self, app: &str, port: &str) {
        if self.connectivity.disconnect_port(app, port) {
            self.modified.set(true);
        }
    }

    pub fn disconnect_edge(
        &mut self,
        sender_app: &str,
        sender_port: &str,
        receiver_app: &str,
        receiver_port: &str,
    ) {
        if self
            .connectivity
            .disconnect_edge(sender_app, sender_port, receiver_app, receiver_port)
        {
            self.modified.set(true);
        }
    }

    pub fn is_connected(&self, identifier: &str) -> bool {
        self.connectivity.is_connected(identifier)
    }

    pub fn port_connectivity(&self, local_name: &str) -> Option<&ConnectivityInfo> {
        self.connectivity.info(local_name)
    }

    /// `None` when the name is unknown to the graph; `Some(None)` when it
    /// is known but its width is still unresolved.
    pub fn port_width(&self, local_name: &str) -> Option<Width> {
        self.connectivity.info(local_name).map(|info| info.width())
    }

    pub fn port_direction(&self, local_name: &str) -> Option<PortDirection> {
        self.connectivity
            .info(local_name)
            .map(|info| info.direction())
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Whether any structural change happened since the last
    /// [`update_ports`](Self::update_ports) or [`take_modified`](Self::take_modified).
    pub fn is_modified(&self) -> bool {
        self.modified.get()
    }

    /// Observe and clear the dirty flag.
    pub fn take_modified(&self) -> bool {
        self.modified.replace(false)
    }
}

impl std::fmt::Debug for PortConnectivityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortConnectivityManager")
            .field("application", &self.application)
            .field("ports", &self.ports.keys().collect::<Vec<_>>())
            .field("edges", &self.connectivity.num_edges())
            .field("modified", &self.modified.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> PortConnectivityManager {
        PortConnectivityManager::new("local")
    }

    #[test]
    fn create_twice_fails_and_keeps_first() {
        let mut m = manager();
        let first = m.create_port(PortKind::EventOutput, "out").unwrap();

        assert!(matches!(
            m.create_port(PortKind::EventOutput, "out"),
            Err(Error::PortAlreadyInstantiated(_))
        ));
        assert_eq!(first.name(), "out");
        assert!(m.is_instantiated("out"));
        assert_eq!(m.ports().len(), 1);
    }

    #[test]
    fn dropped_port_reports_not_instantiated() {
        let mut m = manager();
        let port = m.create_port(PortKind::ContInput, "in").unwrap();
        assert!(m.is_instantiated("in"));

        drop(port);
        assert!(!m.is_instantiated("in"));
        assert!(m.ports().is_empty());

        // The expired entry is replaceable.
        let again = m.create_port(PortKind::ContInput, "in").unwrap();
        assert!(m.is_instantiated("in"));
        drop(again);
    }

    #[test]
    fn remove_port_is_idempotent() {
        let mut m = manager();
        let _port = m.create_port(PortKind::MessageOutput, "msg").unwrap();

        m.remove_port("msg");
        assert!(!m.is_instantiated("msg"));
        m.remove_port("msg");
        m.remove_port("never_existed");
    }

    #[test]
    fn dirty_flag_tracks_structural_changes() {
        let mut m = manager();
        assert!(!m.is_modified());

        m.connect(
            "local",
            "out",
            "peer",
            "in",
            Some(8),
            CommunicationType::Event,
            ProcessingMethod::Collective,
        )
        .unwrap();
        assert!(m.take_modified());
        assert!(!m.is_modified());

        // No-op disconnects leave the flag untouched.
        m.disconnect_edge("local", "out", "ghost", "in");
        m.disconnect_port("ghost", "out");
        assert!(!m.is_modified());

        m.disconnect_port("local", "out");
        assert!(m.is_modified());
    }

    #[test]
    fn update_ports_resolves_width() {
        let mut m = manager();
        let out = m.create_port(PortKind::EventOutput, "out").unwrap();
        assert_eq!(out.width(), None);

        m.connect(
            "local",
            "out",
            "peer",
            "in",
            Some(64),
            CommunicationType::Event,
            ProcessingMethod::Collective,
        )
        .unwrap();
        m.update_ports().unwrap();

        assert_eq!(out.width(), Some(64));
        assert!(!m.is_modified());
    }

    #[test]
    fn update_ports_rejects_direction_mismatch() {
        let mut m = manager();
        let _port = m.create_port(PortKind::EventInput, "p").unwrap();

        // Wired as a sender although published as an input.
        m.connect(
            "local",
            "p",
            "peer",
            "in",
            None,
            CommunicationType::Event,
            ProcessingMethod::Collective,
        )
        .unwrap();
        match m.update_ports() {
            Err(Error::DeclarationConflict(msg)) => {
                // The diagnostic names the offending port and the wired set.
                assert!(msg.contains("local.p"));
                assert!(msg.contains("wired local ports: p"));
            }
            other => panic!("expected a declaration conflict, got {other:?}"),
        }
    }

    #[test]
    fn unknown_and_unconnected_are_distinct() {
        let mut m = manager();
        let _port = m.create_port(PortKind::EventInput, "declared").unwrap();

        // Declared but never wired: instantiated, not connected, unknown
        // to the graph.
        assert!(m.is_instantiated("declared"));
        assert!(!m.is_connected("declared"));
        assert!(m.port_connectivity("declared").is_none());

        // Never declared at all.
        assert!(!m.is_instantiated("ghost"));
        assert!(m.port_width("ghost").is_none());
    }
}
