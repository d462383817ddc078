//! The ordered expectation arena.

use crate::expectation::Expectation;
use crate::request::Request;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Stable reference to a registered expectation.
///
/// Handles are only valid for the registry that issued them and until that
/// registry is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpectationHandle {
    generation: u64,
    index: usize,
}

impl ExpectationHandle {
    /// Registration position (0-based).
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for ExpectationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

#[derive(Default)]
struct Entries {
    generation: u64,
    items: Vec<Arc<Expectation>>,
}

impl Entries {
    fn handle(&self, index: usize) -> ExpectationHandle {
        ExpectationHandle {
            generation: self.generation,
            index,
        }
    }
}

/// All expectations registered on one mock server, in registration order.
///
/// Registration order is match precedence: the first expectation that
/// matches a request wins. Expectations are fully built before they are
/// inserted, so concurrent lookups never see a partial entry.
#[derive(Default)]
pub struct ExpectationRegistry {
    entries: RwLock<Entries>,
}

impl ExpectationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an expectation. Structurally identical expectations are kept
    /// as separate entries.
    pub fn register(&self, expectation: Expectation) -> ExpectationHandle {
        let expectation = Arc::new(expectation);
        let mut entries = self.entries.write();
        entries.items.push(expectation);
        entries.handle(entries.items.len() - 1)
    }

    /// First expectation, in registration order, that matches the request.
    pub fn find_best_match(&self, request: &Request) -> Option<(ExpectationHandle, Arc<Expectation>)> {
        let entries = self.entries.read();
        entries
            .items
            .iter()
            .position(|e| e.matches(request))
            .map(|index| (entries.handle(index), Arc::clone(&entries.items[index])))
    }

    pub fn get(&self, handle: ExpectationHandle) -> Option<Arc<Expectation>> {
        let entries = self.entries.read();
        if handle.generation != entries.generation {
            return None;
        }
        entries.items.get(handle.index).cloned()
    }

    /// Handles of all registered expectations, in registration order.
    pub fn handles(&self) -> Vec<ExpectationHandle> {
        let entries = self.entries.read();
        (0..entries.items.len()).map(|i| entries.handle(i)).collect()
    }

    /// Snapshot of all entries with their handles.
    pub fn entries(&self) -> Vec<(ExpectationHandle, Arc<Expectation>)> {
        let entries = self.entries.read();
        entries
            .items
            .iter()
            .enumerate()
            .map(|(i, e)| (entries.handle(i), Arc::clone(e)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expectation. Previously issued handles stop resolving.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.items.clear();
        entries.generation += 1;
    }
}

impl fmt::Debug for ExpectationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        f.debug_struct("ExpectationRegistry")
            .field("generation", &entries.generation)
            .field("expectations", &entries.items)
            .finish()
    }
}
