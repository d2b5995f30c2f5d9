//! Temporal-negotiation seam.
//!
//! Computing a consistent cross-rate exchange schedule is owned by an
//! external collaborator; the bootstrap only promises to invoke it
//! exactly once per process, with the finalized global port and
//! connection lists. [`RateNegotiator`] is the stock implementation used
//! for single-process runs and tests.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::connectivity::{CommunicationType, Connection};
use crate::port::Port;
use crate::Error;

/// Per-port exchange schedule, in timebase ticks.
#[derive(Clone, Debug, Default)]
pub struct Schedule {
    intervals: BTreeMap<String, u64>,
}

impl Schedule {
    pub fn insert(&mut self, port: impl Into<String>, ticks: u64) {
        self.intervals.insert(port.into(), ticks);
    }

    pub fn interval(&self, port: &str) -> Option<u64> {
        self.intervals.get(port).copied()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

pub trait TemporalNegotiator {
    /// Compute the schedule from the frozen global graph. Invoked exactly
    /// once per process, at the finalization barrier.
    fn negotiate(
        &mut self,
        ports: &[Rc<Port>],
        connections: &[Connection],
    ) -> Result<Schedule, Error>;
}

/// Simplest consistent schedule: every port exchanges at a fixed default
/// interval, except event ports which exchange every tick.
#[derive(Debug)]
pub struct RateNegotiator {
    default_interval: u64,
    runs: usize,
}

impl RateNegotiator {
    pub fn new(default_interval: u64) -> Self {
        Self {
            default_interval,
            runs: 0,
        }
    }

    /// How many times `negotiate` has run; the bootstrap contract is
    /// exactly one.
    pub fn runs(&self) -> usize {
        self.runs
    }
}

impl Default for RateNegotiator {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl TemporalNegotiator for RateNegotiator {
    fn negotiate(
        &mut self,
        ports: &[Rc<Port>],
        connections: &[Connection],
    ) -> Result<Schedule, Error> {
        self.runs += 1;
        log::debug!(
            "negotiating schedule for {} ports, {} connections",
            ports.len(),
            connections.len()
        );

        let mut schedule = Schedule::default();
        for port in ports {
            let ticks = match port.kind().communication_type() {
                CommunicationType::Event => 1,
                CommunicationType::Continuous | CommunicationType::Message => {
                    self.default_interval
                }
            };
            schedule.insert(port.name(), ticks);
        }
        Ok(schedule)
    }
}
