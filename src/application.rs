//! Application identity: one cooperating process group of the coupled run.

use simbus_config::CouplingDescription;

/// Identity of one application, immutable once resolved from the coupling
/// description. The color is the group partition key handed to the
/// message-passing substrate; the leader is the lowest global rank of the
/// group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Application {
    name: String,
    color: u32,
    leader: u32,
    nprocs: u32,
}

impl Application {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> u32 {
        self.color
    }

    pub fn leader(&self) -> u32 {
        self.leader
    }

    pub fn nprocs(&self) -> u32 {
        self.nprocs
    }
}

/// All applications of the run, in declaration order. Colors are assigned
/// in that order and leader ranks follow from the cumulative process
/// counts, so every process derives the same map from the same
/// description.
#[derive(Clone, Debug, Default)]
pub struct ApplicationMap {
    applications: Vec<Application>,
}

impl ApplicationMap {
    pub fn from_description(description: &CouplingDescription) -> Self {
        let mut applications = Vec::with_capacity(description.applications.len());
        let mut next_leader = 0;
        for (color, entry) in description.applications.iter().enumerate() {
            applications.push(Application {
                name: entry.name.clone(),
                color: color as u32,
                leader: next_leader,
                nprocs: entry.np,
            });
            next_leader += entry.np;
        }
        Self { applications }
    }

    pub fn lookup(&self, name: &str) -> Option<&Application> {
        self.applications.iter().find(|a| a.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Application> {
        self.applications.iter()
    }

    pub fn len(&self) -> usize {
        self.applications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }

    /// Total number of processes across the coupled run.
    pub fn total_procs(&self) -> u32 {
        self.applications.iter().map(|a| a.nprocs).sum()
    }
}
