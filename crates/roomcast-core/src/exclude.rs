//! Broadcast exclusion set.

use crate::ids::ConnectionId;

/// Connections a broadcast must skip.
///
/// Usually empty or holding just the sender, so membership is a linear
/// scan over a short vector.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExcludeSet {
    ids: Vec<ConnectionId>,
}

impl ExcludeSet {
    /// Exclude nobody.
    pub fn none() -> Self {
        Self::default()
    }

    /// Exclude a single connection (canonically the sender).
    pub fn only(id: ConnectionId) -> Self {
        Self { ids: vec![id] }
    }

    /// Add another connection to the set.
    #[must_use]
    pub fn with(mut self, id: ConnectionId) -> Self {
        self.insert(id);
        self
    }

    /// Insert a connection; duplicates are ignored.
    pub fn insert(&mut self, id: ConnectionId) {
        if !self.contains(&id) {
            self.ids.push(id);
        }
    }

    /// Whether `id` is excluded.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.ids.contains(id)
    }

    /// Number of excluded connections.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nobody is excluded.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<ConnectionId> for ExcludeSet {
    fn from_iter<I: IntoIterator<Item = ConnectionId>>(iter: I) -> Self {
        let mut set = Self::none();
        for id in iter {
            set.insert(id);
        }
        set
    }
}
