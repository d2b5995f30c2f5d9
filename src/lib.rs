//! The `simbus` crate is a runtime coupling bus for independently launched
//! parallel simulation applications. Each application declares named
//! communication endpoints (ports); a declarative description states how
//! ports in different applications are wired together. At startup the
//! bootstrap layer reconciles all local declarations into one global
//! connectivity graph and gates the hand-off to schedule negotiation.
//!
//! ## Examples
//!
//! ### Declaring ports and wiring them up
//!
//! ```rust,no_run
//! use simbus::{CommunicationType, ProcessingMethod, ProcessContext, ProcessOptions, Setup};
//! use simbus::comm::LocalComm;
//!
//! let ctx = ProcessContext::init(ProcessOptions::default()).unwrap();
//! let setup = Setup::new(ctx).unwrap();
//!
//! let spikes = setup.publish_event_output("spikes_out").unwrap();
//! setup
//!     .connect(
//!         "sender", "spikes_out",
//!         "receiver", "spikes_in",
//!         Some(64),
//!         CommunicationType::Event,
//!         ProcessingMethod::Collective,
//!     )
//!     .unwrap();
//!
//! let negotiated = setup.finalize(&LocalComm::new()).unwrap();
//! assert_eq!(spikes.width(), Some(64));
//! assert!(negotiated.schedule.interval("spikes_out").is_some());
//! ```
#![deny(clippy::all)]

// Re-export the simbus-config crate
pub use simbus_config as config;

pub mod application;
pub mod comm;
pub mod connectivity;
pub mod connector;
pub mod launch;
pub mod manager;
pub mod negotiate;
pub mod port;
pub mod registry;
pub mod setup;

pub use connectivity::{
    CommunicationType, Connection, Connectivity, ConnectivityInfo, PortDirection,
    ProcessingMethod, Width,
};
pub use port::{Port, PortKind};
pub use setup::{Negotiated, Phase, ProcessContext, ProcessOptions, Setup};

/// Numeric timebase all schedule intervals are expressed in, in seconds.
pub const DEFAULT_TIMEBASE: f64 = 1e-9;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Contradictory declarations: duplicate edges, conflicting widths or
    /// directions. Never silently merged.
    #[error("Declaration conflict: {0}")]
    DeclarationConflict(String),

    /// A second `create_port` for a name whose port is still alive. Port
    /// creation carries side effects that must happen exactly once.
    #[error("Port `{0}` has already been instantiated")]
    PortAlreadyInstantiated(String),

    /// The registry holds no creation strategy for this identifier. This
    /// is a configuration defect; the object graph cannot be completed.
    #[error("No creation strategy registered for identifier `{0}`")]
    UnregisteredId(String),

    /// A port or connection was declared after finalization began.
    #[error("Declaration attempted after the connectivity graph was frozen")]
    DeclarationAfterFreeze,

    /// The negotiation barrier fires exactly once per process.
    #[error("Negotiation has already run in this process")]
    AlreadyNegotiated,

    /// `finalize` was called on a context while peer contexts are alive.
    #[error("Cannot finalize: other setup contexts are still alive in this process")]
    NotLastInstance,

    /// Launched standalone: the process must re-invoke itself through the
    /// framework launcher and must not proceed in this invocation.
    #[error("Process was not launched by the framework; relaunch required")]
    RelaunchRequired,

    /// The description names several applications and none was selected.
    #[error("Cannot determine which application this process belongs to")]
    AmbiguousApplication,

    /// No coupling description was found in any source.
    #[error("No coupling description found (sources checked: {sources})")]
    NoDescription { sources: String },

    #[error(transparent)]
    Config(#[from] simbus_config::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
