//! Keyed registry of creation strategies.
//!
//! Maps a stable identifier to a constructor capability so that the
//! connectivity layer can build concrete instances without knowing their
//! types. Populated once at process start and rarely mutated afterwards;
//! the registry imposes no ordering or threading behavior of its own.

use std::collections::BTreeMap;
use std::fmt::Display;

use crate::Error;

type Creator<P> = Box<dyn Fn() -> Box<P>>;

pub struct Registry<I, P: ?Sized> {
    creators: BTreeMap<I, Creator<P>>,
}

impl<I, P> Registry<I, P>
where
    I: Ord + Display,
    P: ?Sized,
{
    pub fn new() -> Self {
        Self {
            creators: BTreeMap::new(),
        }
    }

    /// Insert a creation strategy under a unique identifier. Returns
    /// `false` without overwriting if the identifier is already taken.
    pub fn register<F>(&mut self, id: I, creator: F) -> bool
    where
        F: Fn() -> Box<P> + 'static,
    {
        match self.creators.entry(id) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(e) => {
                e.insert(Box::new(creator));
                true
            }
        }
    }

    /// Remove a strategy. Returns `false` if the identifier was absent.
    pub fn unregister(&mut self, id: &I) -> bool {
        self.creators.remove(id).is_some()
    }

    pub fn contains(&self, id: &I) -> bool {
        self.creators.contains_key(id)
    }

    /// Invoke the strategy registered under `id`, yielding an exclusively
    /// owned instance. An unregistered identifier is a fatal configuration
    /// error ([`Error::UnregisteredId`]); there is no recovery path
    /// because the object graph cannot be completed without it.
    pub fn create(&self, id: &I) -> Result<Box<P>, Error> {
        match self.creators.get(id) {
            Some(creator) => Ok(creator()),
            None => Err(Error::UnregisteredId(id.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.creators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creators.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &I> {
        self.creators.keys()
    }
}

impl<I: Ord + Display, P: ?Sized> Default for Registry<I, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Ord + Display, P: ?Sized> std::fmt::Debug for Registry<I, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field(
                "ids",
                &self.creators.keys().map(ToString::to_string).collect::<Vec<_>>(),
            )
            .finish()
    }
}
