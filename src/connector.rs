//! Data-transport seam.
//!
//! The low-level transport of samples is owned by connector collaborators;
//! the core constructs them only through the [`ConnectorRegistry`] and
//! never inspects them beyond their transport identifier. An identifier
//! with no registered strategy is a build-time configuration defect and
//! surfaces as the fatal registry miss.

use crate::connectivity::CommunicationType;
use crate::registry::Registry;

pub trait Connector {
    /// Stable identifier of the transport this connector implements.
    fn transport(&self) -> &'static str;
}

pub type ConnectorRegistry = Registry<String, dyn Connector>;

/// Registry identifier for a communication type.
pub fn transport_id(comm: CommunicationType) -> String {
    comm.to_string()
}

#[derive(Debug, Default)]
pub struct EventConnector;

impl Connector for EventConnector {
    fn transport(&self) -> &'static str {
        "event"
    }
}

#[derive(Debug, Default)]
pub struct ContConnector;

impl Connector for ContConnector {
    fn transport(&self) -> &'static str {
        "continuous"
    }
}

#[derive(Debug, Default)]
pub struct MessageConnector;

impl Connector for MessageConnector {
    fn transport(&self) -> &'static str {
        "message"
    }
}

/// Registry with the stock connector kinds registered.
pub fn default_registry() -> ConnectorRegistry {
    let mut registry = ConnectorRegistry::new();
    registry.register(transport_id(CommunicationType::Event), || {
        Box::new(EventConnector)
    });
    registry.register(transport_id(CommunicationType::Continuous), || {
        Box::new(ContConnector)
    });
    registry.register(transport_id(CommunicationType::Message), || {
        Box::new(MessageConnector)
    });
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_kinds_are_registered() {
        let registry = default_registry();
        for comm in [
            CommunicationType::Event,
            CommunicationType::Continuous,
            CommunicationType::Message,
        ] {
            let connector = registry.create(&transport_id(comm)).unwrap();
            assert_eq!(connector.transport(), transport_id(comm));
        }
    }
}
