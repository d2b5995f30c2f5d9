//! Named communication endpoints.
//!
//! The set of port kinds is fixed by the domain (continuous, event and
//! message data, each as input or output), so it is modeled as a closed
//! set of tagged variants sharing one capability surface rather than
//! open-ended polymorphism; negotiation-time handling stays exhaustive.

use std::cell::Cell;
use std::fmt::Display;

use crate::connectivity::{CommunicationType, PortDirection, Width};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PortKind {
    ContInput,
    ContOutput,
    EventInput,
    EventOutput,
    MessageInput,
    MessageOutput,
}

impl PortKind {
    pub fn direction(&self) -> PortDirection {
        match self {
            PortKind::ContInput | PortKind::EventInput | PortKind::MessageInput => {
                PortDirection::Input
            }
            PortKind::ContOutput | PortKind::EventOutput | PortKind::MessageOutput => {
                PortDirection::Output
            }
        }
    }

    pub fn communication_type(&self) -> CommunicationType {
        match self {
            PortKind::ContInput | PortKind::ContOutput => CommunicationType::Continuous,
            PortKind::EventInput | PortKind::EventOutput => CommunicationType::Event,
            PortKind::MessageInput | PortKind::MessageOutput => CommunicationType::Message,
        }
    }
}

impl Display for PortKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.communication_type(), self.direction())
    }
}

/// A named endpoint belonging to one application. Identity is the
/// `(application, local name)` pair. User code owns the port strongly;
/// bookkeeping structures observe it through `Weak` handles only, so a
/// port's destruction is never blocked by bookkeeping.
#[derive(Debug)]
pub struct Port {
    application: String,
    name: String,
    kind: PortKind,
    /// Cached width, re-derived from the connectivity graph once it is
    /// finalized. May stay unresolved until the remote side's declaration
    /// is known.
    width: Cell<Width>,
}

impl Port {
    pub(crate) fn new(application: impl Into<String>, name: impl Into<String>, kind: PortKind) -> Self {
        Self {
            application: application.into(),
            name: name.into(),
            kind,
            width: Cell::new(None),
        }
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PortKind {
        self.kind
    }

    pub fn direction(&self) -> PortDirection {
        self.kind.direction()
    }

    pub fn width(&self) -> Width {
        self.width.get()
    }

    pub(crate) fn set_width(&self, width: Width) {
        self.width.set(width);
    }
}

impl PartialEq for Port {
    fn eq(&self, other: &Self) -> bool {
        self.application == other.application && self.name == other.name
    }
}

impl Eq for Port {}

impl Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} ({})", self.application, self.name, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_capabilities() {
        assert_eq!(PortKind::EventOutput.direction(), PortDirection::Output);
        assert_eq!(PortKind::MessageInput.direction(), PortDirection::Input);
        assert_eq!(
            PortKind::ContInput.communication_type(),
            CommunicationType::Continuous
        );
    }

    #[test]
    fn identity_ignores_width() {
        let a = Port::new("app", "p", PortKind::EventInput);
        let b = Port::new("app", "p", PortKind::EventInput);
        b.set_width(Some(7));
        assert_eq!(a, b);
    }
}
