//! Application bootstrap.
//!
//! A process may construct more than one local [`Setup`] context; all of
//! them share one [`ProcessContext`], the process-wide aggregate holding
//! the resolved launch metadata, the single configuration, the single
//! temporal negotiator and the union of every context's port and
//! connection declarations. The aggregate is an explicitly
//! lifetime-scoped object shared by `Rc`, never ambient global state.
//!
//! The bootstrap advances through one state machine per process:
//! `Uninitialized → LaunchResolved → ConfigResolved → Declaring →
//! Finalizing → Negotiated`. Declarations are accepted while in
//! `Declaring`; the transition to `Finalizing` fires exactly once, on the
//! last live context, and from `Negotiated` the bootstrap never re-enters
//! `Declaring`.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use simbus_config::{Config, ConfigSources, CouplingDescription, CONFIG_ENV_VAR};

use crate::application::{Application, ApplicationMap};
use crate::comm::Communicator;
use crate::connectivity::{
    CommunicationType, Connection, ConnectivityInfo, PortDirection, PortRef, ProcessingMethod,
    Width,
};
use crate::connector::{self, Connector, ConnectorRegistry};
use crate::launch::{EnvArgvProbe, Launch, LaunchMode, LaunchProbe};
use crate::manager::PortConnectivityManager;
use crate::negotiate::{RateNegotiator, Schedule, TemporalNegotiator};
use crate::port::{Port, PortKind};
use crate::{Error, DEFAULT_TIMEBASE};

/// Bootstrap state machine, one per process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    LaunchResolved,
    ConfigResolved,
    /// Ports and connections are accepted.
    Declaring,
    /// The last local context is known; the graph is frozen.
    Finalizing,
    /// Terminal: negotiation ran and the process groups are partitioned.
    Negotiated,
}

/// Options for [`ProcessContext::init`].
pub struct ProcessOptions {
    /// Argument vector to scan for embedded launch markers. Defaults to
    /// the process arguments.
    pub argv: Vec<String>,

    /// Configuration file consulted when neither the command line nor the
    /// environment provides a description.
    pub config_file: Option<PathBuf>,

    /// Which application of the description this process belongs to.
    /// Falls back to the argument-vector label, then to the description's
    /// single application when it declares only one.
    pub app_name: Option<String>,

    /// Timebase in seconds; schedule intervals are multiples of it.
    pub timebase: f64,

    /// Launch-mode detection strategy. Defaults to [`EnvArgvProbe`].
    pub probe: Option<Box<dyn LaunchProbe>>,

    /// Temporal negotiator. Defaults to [`RateNegotiator`].
    pub negotiator: Option<Box<dyn TemporalNegotiator>>,

    /// Connector creation strategies. Defaults to the stock kinds.
    pub connectors: Option<ConnectorRegistry>,

    /// Environment variable consulted for the description (tests point
    /// this at a scratch name to avoid cross-talk).
    pub config_env_var: Option<String>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            argv: std::env::args().collect(),
            config_file: None,
            app_name: None,
            timebase: DEFAULT_TIMEBASE,
            probe: None,
            negotiator: None,
            connectors: None,
            config_env_var: None,
        }
    }
}

impl std::fmt::Debug for ProcessOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessOptions")
            .field("argv", &self.argv)
            .field("config_file", &self.config_file)
            .field("app_name", &self.app_name)
            .field("timebase", &self.timebase)
            .finish_non_exhaustive()
    }
}

/// Per-context slot in the aggregate. The slot outlives its `Setup` so
/// that the global lists stay the ordered concatenation of every
/// context's declarations, alive or not; ports are observed weakly.
#[derive(Default)]
struct ContextRecord {
    ports: Vec<Weak<Port>>,
    connections: Vec<Connection>,
    alive: bool,
}

/// Process-wide shared bootstrap state. Exactly one configuration and one
/// temporal negotiator exist per process regardless of how many local
/// contexts are constructed.
pub struct ProcessContext {
    launch: Launch,
    config: Config,
    application: Application,
    application_map: ApplicationMap,
    timebase: f64,
    negotiator: RefCell<Box<dyn TemporalNegotiator>>,
    connectors: ConnectorRegistry,
    phase: Cell<Phase>,
    /// Connections taken from the declarative description, recorded once
    /// per process. They prefix the global connection list.
    description_connections: RefCell<Vec<Connection>>,
    records: RefCell<Vec<ContextRecord>>,
    live: Cell<usize>,
}

impl ProcessContext {
    /// Resolve launch mode and configuration, then open the declaration
    /// phase. Fails with [`Error::RelaunchRequired`] for a standalone
    /// launch: such a process must re-invoke itself through the framework
    /// launcher (see [`crate::launch::relaunch_command`]) and never
    /// proceeds past launch-mode resolution in its original invocation.
    pub fn init(options: ProcessOptions) -> Result<Rc<Self>, Error> {
        log::trace!("bootstrap phase: {:?}", Phase::Uninitialized);

        let probe: Box<dyn LaunchProbe> = match options.probe {
            Some(probe) => probe,
            None => match &options.config_env_var {
                Some(var) => Box::new(EnvArgvProbe::with_env_var(var.clone())),
                None => Box::new(EnvArgvProbe::new()),
            },
        };
        let launch = probe.resolve(&options.argv)?;
        log::trace!("bootstrap phase: {:?}", Phase::LaunchResolved);
        if launch.mode == LaunchMode::Standalone {
            return Err(Error::RelaunchRequired);
        }

        let sources = ConfigSources {
            cli_override: launch.config_override.clone(),
            env_var: options
                .config_env_var
                .unwrap_or_else(|| CONFIG_ENV_VAR.to_string()),
            file: options.config_file,
        };
        let raw = sources.resolve_raw()?.ok_or_else(|| Error::NoDescription {
            sources: sources.describe(),
        })?;
        let description = CouplingDescription::from_yaml(&raw)?;

        let app_name = options
            .app_name
            .or_else(|| launch.app_label.clone())
            .or_else(|| match description.applications.as_slice() {
                [only] => Some(only.name.clone()),
                _ => None,
            })
            .ok_or(Error::AmbiguousApplication)?;

        let application_map = ApplicationMap::from_description(&description);
        let description_connections = description.connections.clone();
        let config = Config::for_application(description, &app_name, sources.describe())?;
        log::trace!("bootstrap phase: {:?}", Phase::ConfigResolved);

        // Presence checked by `Config::for_application`.
        let application = application_map
            .lookup(&app_name)
            .cloned()
            .ok_or_else(|| simbus_config::Error::UnknownApplication(app_name.clone()))?;

        log::debug!(
            "bootstrap ready: application `{}` (color {}, leader {}, {} procs)",
            application.name(),
            application.color(),
            application.leader(),
            application.nprocs()
        );

        Ok(Rc::new(Self {
            launch,
            config,
            application,
            application_map,
            timebase: options.timebase,
            negotiator: RefCell::new(
                options
                    .negotiator
                    .unwrap_or_else(|| Box::new(RateNegotiator::default())),
            ),
            connectors: options.connectors.unwrap_or_else(connector::default_registry),
            phase: Cell::new(Phase::Declaring),
            description_connections: RefCell::new(description_connections),
            records: RefCell::new(Vec::new()),
            live: Cell::new(0),
        }))
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    pub fn launch(&self) -> &Launch {
        &self.launch
    }

    /// Whether this process was started by the framework launcher. Safe
    /// to ask repeatedly; launch resolution happened once, at init.
    pub fn launched_by_framework(&self) -> bool {
        self.launch.launched_by_framework()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn application(&self) -> &Application {
        &self.application
    }

    pub fn application_map(&self) -> &ApplicationMap {
        &self.application_map
    }

    pub fn timebase(&self) -> f64 {
        self.timebase
    }

    /// Number of live local setup contexts.
    pub fn live_contexts(&self) -> usize {
        self.live.get()
    }

    fn ensure_declaring(&self) -> Result<(), Error> {
        match self.phase.get() {
            Phase::Declaring => Ok(()),
            _ => Err(Error::DeclarationAfterFreeze),
        }
    }

    fn register_context(&self) -> usize {
        let mut records = self.records.borrow_mut();
        records.push(ContextRecord {
            alive: true,
            ..Default::default()
        });
        self.live.set(self.live.get() + 1);
        records.len() - 1
    }

    fn deregister_context(&self, id: usize) {
        let mut records = self.records.borrow_mut();
        if records[id].alive {
            records[id].alive = false;
            self.live.set(self.live.get() - 1);
        }
    }

    fn add_port(&self, id: usize, port: &Rc<Port>) {
        self.records.borrow_mut()[id].ports.push(Rc::downgrade(port));
    }

    fn add_connection(&self, id: usize, connection: Connection) {
        self.records.borrow_mut()[id].connections.push(connection);
    }

    fn remove_connections<F: Fn(&Connection) -> bool>(&self, keep: F) {
        self.description_connections.borrow_mut().retain(&keep);
        for record in self.records.borrow_mut().iter_mut() {
            record.connections.retain(&keep);
        }
    }

    /// Union of every context's live ports, in creation order per context
    /// and context-creation order overall. Before finalization this is an
    /// explicitly non-final view.
    pub fn global_ports(&self) -> Vec<Rc<Port>> {
        self.records
            .borrow()
            .iter()
            .flat_map(|r| r.ports.iter().filter_map(Weak::upgrade))
            .collect()
    }

    /// The declarative description's connections followed by every
    /// context's programmatic ones, same per-context ordering guarantee
    /// as [`global_ports`](Self::global_ports).
    pub fn global_connections(&self) -> Vec<Connection> {
        self.description_connections
            .borrow()
            .iter()
            .cloned()
            .chain(
                self.records
                    .borrow()
                    .iter()
                    .flat_map(|r| r.connections.iter().cloned()),
            )
            .collect()
    }
}

impl std::fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessContext")
            .field("application", &self.application)
            .field("phase", &self.phase.get())
            .field("live_contexts", &self.live.get())
            .finish_non_exhaustive()
    }
}

/// Result of the finalization barrier.
pub struct Negotiated {
    /// Per-port exchange schedule computed by the temporal negotiator.
    pub schedule: Schedule,
    /// This application's process group, partitioned by color.
    pub group: Box<dyn Communicator>,
    /// One transport connector per connection touching this application.
    pub connectors: Vec<Box<dyn Connector>>,
}

/// One local bootstrap context. An application may construct several;
/// every declaration registers with this context's connectivity manager
/// and with the process-wide aggregate.
pub struct Setup {
    ctx: Rc<ProcessContext>,
    id: usize,
    manager: RefCell<PortConnectivityManager>,
}

impl Setup {
    /// Register a new local context with the aggregate and replay the
    /// declarative description's connections touching this application
    /// into the local connectivity graph.
    pub fn new(ctx: Rc<ProcessContext>) -> Result<Self, Error> {
        ctx.ensure_declaring()?;

        let app_name = ctx.application().name().to_string();
        let mut manager = PortConnectivityManager::new(&app_name);
        for entry in &ctx.config().description().connections {
            if entry.from.app == app_name || entry.to.app == app_name {
                manager.add_edge(entry.clone())?;
            }
        }

        let id = ctx.register_context();
        log::debug!("setup context {id} registered for `{app_name}`");
        Ok(Self {
            ctx,
            id,
            manager: RefCell::new(manager),
        })
    }

    pub fn context(&self) -> &Rc<ProcessContext> {
        &self.ctx
    }

    pub fn application(&self) -> &Application {
        self.ctx.application()
    }

    pub fn application_name(&self) -> &str {
        self.ctx.application().name()
    }

    pub fn application_color(&self) -> u32 {
        self.ctx.application().color()
    }

    pub fn leader(&self) -> u32 {
        self.ctx.application().leader()
    }

    pub fn nprocs(&self) -> u32 {
        self.ctx.application().nprocs()
    }

    pub fn timebase(&self) -> f64 {
        self.ctx.timebase()
    }

    // ---- configuration ----------------------------------------------------

    /// Look up a per-application configuration variable. Absence is not
    /// an error.
    pub fn config(&self, var: &str) -> Option<String> {
        self.ctx.config().get(var).map(str::to_string)
    }

    /// Look up and parse a configuration variable.
    pub fn config_parsed<T: std::str::FromStr>(&self, var: &str) -> Result<Option<T>, Error> {
        Ok(self.ctx.config().get_parsed(var)?)
    }

    /// Look up a variable that must be present; the error names the
    /// variable and the sources that were checked.
    pub fn config_required(&self, var: &str) -> Result<String, Error> {
        Ok(self.ctx.config().require(var)?.to_string())
    }

    // ---- port declaration -------------------------------------------------

    /// Create-or-fail a named port of the given kind. The returned handle
    /// is the owning one; bookkeeping observes the port weakly.
    pub fn publish(&self, kind: PortKind, identifier: &str) -> Result<Rc<Port>, Error> {
        self.ctx.ensure_declaring()?;
        let port = self.manager.borrow_mut().create_port(kind, identifier)?;
        self.ctx.add_port(self.id, &port);
        Ok(port)
    }

    pub fn publish_cont_input(&self, identifier: &str) -> Result<Rc<Port>, Error> {
        self.publish(PortKind::ContInput, identifier)
    }

    pub fn publish_cont_output(&self, identifier: &str) -> Result<Rc<Port>, Error> {
        self.publish(PortKind::ContOutput, identifier)
    }

    pub fn publish_event_input(&self, identifier: &str) -> Result<Rc<Port>, Error> {
        self.publish(PortKind::EventInput, identifier)
    }

    pub fn publish_event_output(&self, identifier: &str) -> Result<Rc<Port>, Error> {
        self.publish(PortKind::EventOutput, identifier)
    }

    pub fn publish_message_input(&self, identifier: &str) -> Result<Rc<Port>, Error> {
        self.publish(PortKind::MessageInput, identifier)
    }

    pub fn publish_message_output(&self, identifier: &str) -> Result<Rc<Port>, Error> {
        self.publish(PortKind::MessageOutput, identifier)
    }

    // ---- connectivity -----------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn connect(
        &self,
        sender_app: &str,
        sender_port: &str,
        receiver_app: &str,
        receiver_port: &str,
        width: Width,
        comm: CommunicationType,
        method: ProcessingMethod,
    ) -> Result<(), Error> {
        self.ctx.ensure_declaring()?;
        self.manager.borrow_mut().connect(
            sender_app,
            sender_port,
            receiver_app,
            receiver_port,
            width,
            comm,
            method,
        )?;
        self.ctx.add_connection(
            self.id,
            Connection {
                from: PortRef::new(sender_app, sender_port),
                to: PortRef::new(receiver_app, receiver_port),
                width,
                comm,
                method,
            },
        );
        Ok(())
    }

    /// Remove every connection touching `(app, port)`. Idempotent.
    pub fn disconnect_port(&self, app: &str, port: &str) -> Result<(), Error> {
        self.ctx.ensure_declaring()?;
        self.manager.borrow_mut().disconnect_port(app, port);
        self.ctx.remove_connections(|c| {
            !(c.from.app == app && c.from.port == port) && !(c.to.app == app && c.to.port == port)
        });
        Ok(())
    }

    /// Remove exactly the matching connection. Idempotent.
    pub fn disconnect(
        &self,
        sender_app: &str,
        sender_port: &str,
        receiver_app: &str,
        receiver_port: &str,
    ) -> Result<(), Error> {
        self.ctx.ensure_declaring()?;
        self.manager
            .borrow_mut()
            .disconnect_edge(sender_app, sender_port, receiver_app, receiver_port);
        self.ctx.remove_connections(|c| {
            !(c.from.app == sender_app
                && c.from.port == sender_port
                && c.to.app == receiver_app
                && c.to.port == receiver_port)
        });
        Ok(())
    }

    pub fn is_instantiated(&self, identifier: &str) -> bool {
        self.manager.borrow().is_instantiated(identifier)
    }

    pub fn is_connected(&self, identifier: &str) -> bool {
        self.manager.borrow().is_connected(identifier)
    }

    /// Aggregated connectivity of a local port, or `None` for a name
    /// unknown to the graph.
    pub fn port_connectivity(&self, local_name: &str) -> Option<ConnectivityInfo> {
        self.manager.borrow().port_connectivity(local_name).cloned()
    }

    pub fn port_width(&self, local_name: &str) -> Option<Width> {
        self.manager.borrow().port_width(local_name)
    }

    pub fn port_direction(&self, local_name: &str) -> Option<PortDirection> {
        self.manager.borrow().port_direction(local_name)
    }

    /// Live ports of this context.
    pub fn ports(&self) -> Vec<Rc<Port>> {
        self.manager.borrow().ports()
    }

    /// Whether this is the only live setup context in the process. The
    /// finalization barrier is gated on this purely local signal, which
    /// guarantees all local declarations are visible to the aggregate
    /// before the barrier is reached.
    pub fn is_last_setup_instance(&self) -> bool {
        self.ctx.live_contexts() == 1
    }

    /// Union of all contexts' live ports, in declaration order.
    pub fn global_ports(&self) -> Vec<Rc<Port>> {
        self.ctx.global_ports()
    }

    /// Union of all contexts' connections, in declaration order.
    pub fn global_connections(&self) -> Vec<Connection> {
        self.ctx.global_connections()
    }

    // ---- finalization -----------------------------------------------------

    /// Freeze the graph, resolve port widths, run temporal negotiation and
    /// partition the process groups by application color. Callable only on
    /// the last live context, exactly once per process; this transition is
    /// terminal and the bootstrap never re-enters the declaration phase.
    ///
    /// This is the one collective call of the subsystem: every process of
    /// the coupled run must reach it.
    pub fn finalize(&self, comm: &dyn Communicator) -> Result<Negotiated, Error> {
        match self.ctx.phase() {
            Phase::Declaring => {}
            Phase::Finalizing | Phase::Negotiated => return Err(Error::AlreadyNegotiated),
            _ => return Err(Error::DeclarationAfterFreeze),
        }
        if !self.is_last_setup_instance() {
            return Err(Error::NotLastInstance);
        }

        self.ctx.phase.set(Phase::Finalizing);
        log::debug!("bootstrap phase: {:?}", Phase::Finalizing);

        self.manager.borrow_mut().update_ports()?;

        let ports = self.ctx.global_ports();
        let connections = self.ctx.global_connections();
        resolve_global_widths(&ports, &connections)?;

        // The one synchronization point of the bootstrap: a peer that
        // declared inconsistently (or not at all) is detected here, not
        // earlier.
        comm.barrier()?;
        let schedule = self
            .ctx
            .negotiator
            .borrow_mut()
            .negotiate(&ports, &connections)?;
        let group = comm.split(self.ctx.application().color())?;

        let app_name = self.ctx.application().name();
        let mut connectors = Vec::new();
        for conn in connections
            .iter()
            .filter(|c| c.from.app == app_name || c.to.app == app_name)
        {
            connectors.push(self.ctx.connectors.create(&connector::transport_id(conn.comm))?);
        }

        self.ctx.phase.set(Phase::Negotiated);
        log::debug!(
            "bootstrap phase: {:?} ({} ports, {} connections, {} connectors)",
            Phase::Negotiated,
            ports.len(),
            connections.len(),
            connectors.len()
        );

        Ok(Negotiated {
            schedule,
            group,
            connectors,
        })
    }
}

impl Drop for Setup {
    fn drop(&mut self) {
        self.ctx.deregister_context(self.id);
    }
}

impl std::fmt::Debug for Setup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Setup")
            .field("id", &self.id)
            .field("application", &self.application_name())
            .finish_non_exhaustive()
    }
}

/// Resolve the cached width of every live port from the frozen global
/// connection list. A width left unspecified on one side takes the finite
/// width declared on the other; two different finite widths for the same
/// port are a declaration conflict.
fn resolve_global_widths(ports: &[Rc<Port>], connections: &[Connection]) -> Result<(), Error> {
    for port in ports {
        let mut resolved: Width = port.width();
        for conn in connections {
            let touches = (conn.from.app == port.application() && conn.from.port == port.name())
                || (conn.to.app == port.application() && conn.to.port == port.name());
            if !touches {
                continue;
            }
            match (resolved, conn.width) {
                (Some(a), Some(b)) if a != b => {
                    return Err(Error::DeclarationConflict(format!(
                        "port `{port}` resolves to conflicting widths {a} and {b}"
                    )));
                }
                (None, Some(b)) => resolved = Some(b),
                _ => {}
            }
        }
        port.set_width(resolved);
    }
    Ok(())
}
