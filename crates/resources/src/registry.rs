//! Keyed asset registry with generational handles.
//!
//! The registry owns every asset. Game objects hold [`AssetHandle`]s, which
//! are plain indices tagged with a generation so a handle to an unloaded
//! asset can never alias a newer one stored in the same slot. Assets are
//! only evicted by an explicit [`AssetRegistry::unload`].
//!
//! # Example
//!
//! ```
//! use engine_resources::{AssetRegistry, MeshData};
//!
//! let mut meshes = AssetRegistry::new();
//! let quad = meshes.load("builtin:quad", MeshData::unit_quad());
//! assert_eq!(meshes.load("builtin:quad", MeshData::unit_quad()), quad);
//! assert_eq!(meshes.get(quad).unwrap().index_count(), 6);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Lightweight reference to an asset in an [`AssetRegistry<T>`].
pub struct AssetHandle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AssetHandle<T> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

// Manual impls: derives would require `T: Clone` etc.
impl<T> Clone for AssetHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AssetHandle<T> {}

impl<T> PartialEq for AssetHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for AssetHandle<T> {}

impl<T> Hash for AssetHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for AssetHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetHandle({}v{})", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    entry: Option<(String, T)>,
}

/// Owns assets of type `T`, keyed by path or name.
pub struct AssetRegistry<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    by_key: HashMap<String, AssetHandle<T>>,
}

impl<T> Default for AssetRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AssetRegistry<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_key: HashMap::new(),
        }
    }

    /// Stores `asset` under `key` and returns its handle.
    ///
    /// If `key` is already loaded, the existing handle is returned and
    /// `asset` is dropped.
    pub fn load(&mut self, key: impl Into<String>, asset: T) -> AssetHandle<T> {
        let key = key.into();
        if let Some(&handle) = self.by_key.get(&key) {
            debug!("Asset '{}' already loaded as {:?}", key, handle);
            return handle;
        }

        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some((key.clone(), asset));
                AssetHandle::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some((key.clone(), asset)),
                });
                AssetHandle::new(index, 0)
            }
        };

        debug!("Loaded asset '{}' as {:?}", key, handle);
        self.by_key.insert(key, handle);
        handle
    }

    /// Returns the asset behind `handle`.
    pub fn get(&self, handle: AssetHandle<T>) -> ResourceResult<&T> {
        let slot = self.live_slot(handle)?;
        match &slot.entry {
            Some((_, asset)) => Ok(asset),
            None => Err(Self::unloaded(handle)),
        }
    }

    /// Handle of the asset loaded under `key`, if any.
    pub fn handle_for(&self, key: &str) -> Option<AssetHandle<T>> {
        self.by_key.get(key).copied()
    }

    /// Removes the asset and returns it. The handle (and every copy of it)
    /// becomes stale.
    pub fn unload(&mut self, handle: AssetHandle<T>) -> ResourceResult<T> {
        self.live_slot(handle)?;
        let slot = &mut self.slots[handle.index as usize];
        let (key, asset) = slot.entry.take().ok_or(Self::unloaded(handle))?;
        slot.generation = slot.generation.wrapping_add(1);

        self.by_key.remove(&key);
        self.free.push(handle.index);
        debug!("Unloaded asset '{}' ({:?})", key, handle);
        Ok(asset)
    }

    /// Number of loaded assets.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    fn live_slot(&self, handle: AssetHandle<T>) -> ResourceResult<&Slot<T>> {
        let slot = self
            .slots
            .get(handle.index as usize)
            .ok_or(ResourceError::UnknownHandle {
                index: handle.index,
            })?;
        if slot.generation != handle.generation {
            return Err(Self::unloaded(handle));
        }
        Ok(slot)
    }

    fn unloaded(handle: AssetHandle<T>) -> ResourceError {
        ResourceError::AlreadyUnloaded {
            index: handle.index,
            generation: handle.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_and_get() {
        let mut registry = AssetRegistry::new();
        let handle = registry.load("a", 10);
        assert_eq!(registry.get(handle), Ok(&10));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.handle_for("a"), Some(handle));
        assert_eq!(registry.handle_for("b"), None);
    }

    #[test]
    fn test_load_same_key_shares_handle() {
        let mut registry = AssetRegistry::new();
        let first = registry.load("mesh", 1);
        let second = registry.load("mesh", 2);
        assert_eq!(first, second);
        assert_eq!(registry.get(first), Ok(&1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unload_invalidates_handle() {
        let mut registry = AssetRegistry::new();
        let handle = registry.load("a", 'x');
        assert_eq!(registry.unload(handle), Ok('x'));
        assert!(registry.is_empty());
        assert_eq!(registry.handle_for("a"), None);
        assert_eq!(
            registry.get(handle),
            Err(ResourceError::AlreadyUnloaded {
                index: 0,
                generation: 0
            })
        );
        assert!(registry.unload(handle).is_err());
    }

    #[test]
    fn test_reused_slot_does_not_alias_stale_handle() {
        let mut registry = AssetRegistry::new();
        let old = registry.load("a", 1);
        registry.unload(old).unwrap();

        let new = registry.load("b", 2);
        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());
        assert_eq!(registry.get(new), Ok(&2));
        assert!(registry.get(old).is_err());
    }

    #[test]
    fn test_unknown_handle() {
        let mut other = AssetRegistry::new();
        let foreign = other.load("a", 0u8);
        other.load("b", 1u8);
        let foreign_b = other.handle_for("b").unwrap();

        let registry: AssetRegistry<u8> = AssetRegistry::new();
        assert_eq!(
            registry.get(foreign),
            Err(ResourceError::UnknownHandle { index: 0 })
        );
        assert_eq!(
            registry.get(foreign_b),
            Err(ResourceError::UnknownHandle { index: 1 })
        );
    }
}
