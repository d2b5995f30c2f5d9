//! Message-passing substrate seam.
//!
//! The bootstrap needs exactly two things from the substrate: one call
//! that partitions the processes of the run into per-application groups
//! by color, and barrier semantics at the negotiation point. A real MPI
//! binding arrives through this trait; [`LocalComm`] serves single
//! process runs and tests.

use crate::Error;

pub trait Communicator {
    /// Rank of this process within the group.
    fn rank(&self) -> u32;

    /// Number of processes in the group.
    fn size(&self) -> u32;

    /// Partition the group; processes passing the same color end up in
    /// the same subgroup.
    fn split(&self, color: u32) -> Result<Box<dyn Communicator>, Error>;

    /// Collective synchronization point. Every process of the group must
    /// reach it; a peer that never does manifests as a hang here, to be
    /// handled (or not) by the substrate itself.
    fn barrier(&self) -> Result<(), Error>;
}

/// Trivial single-process group.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalComm;

impl LocalComm {
    pub fn new() -> Self {
        Self
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> u32 {
        0
    }

    fn size(&self) -> u32 {
        1
    }

    fn split(&self, color: u32) -> Result<Box<dyn Communicator>, Error> {
        log::trace!("local communicator split with color {color}");
        Ok(Box::new(LocalComm))
    }

    fn barrier(&self) -> Result<(), Error> {
        Ok(())
    }
}
