//! Entity id allocation.

use std::fmt;

use tracing::debug;

/// Unique identifier of a game object within one [`EntityRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u32);

impl EntityId {
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out monotonically increasing [`EntityId`]s.
///
/// Owned by whoever owns the scene; ids from different registries are
/// unrelated.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    next: u32,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn create(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next += 1;
        id
    }

    /// Restart numbering from zero.
    ///
    /// Ids handed out before the reset will be handed out again.
    pub fn reset(&mut self) {
        debug!("Entity registry reset after {} ids", self.next);
        self.next = 0;
    }

    /// Number of ids allocated since creation or the last reset.
    #[inline]
    pub fn len(&self) -> usize {
        self.next as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.next == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic() {
        let mut registry = EntityRegistry::new();
        let a = registry.create();
        let b = registry.create();
        let c = registry.create();
        assert!(a < b && b < c);
        assert_eq!(a.raw(), 0);
        assert_eq!(c.raw(), 2);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_reset_restarts_numbering() {
        let mut registry = EntityRegistry::new();
        registry.create();
        registry.create();
        registry.reset();
        assert!(registry.is_empty());
        assert_eq!(registry.create().raw(), 0);
    }

    #[test]
    fn test_registries_are_independent() {
        let mut first = EntityRegistry::new();
        let mut second = EntityRegistry::new();
        first.create();
        first.create();
        assert_eq!(second.create().raw(), 0);
    }
}
