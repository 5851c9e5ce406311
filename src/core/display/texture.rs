//=========================================================================
// Texture Cache
//=========================================================================
//
// Keyed cache of texture handles with explicit eviction.
//
// Mirrors the global texture cache of the rendering engine: loaders
// register produced textures by key; a scene's release pass evicts its
// keys and destroys the evicted entries so GPU-side memory is returned.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

//=== Texture =============================================================

struct TexInner {
    key: String,
    destroyed: Cell<bool>,
}

/// Handle to a cached texture. Clones share the underlying entry.
#[derive(Clone)]
pub struct Texture {
    inner: Rc<TexInner>,
}

impl Texture {
    /// Creates a texture known under `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(TexInner {
                key: key.into(),
                destroyed: Cell::new(false),
            }),
        }
    }

    /// Cache key this texture was produced under.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Releases the texture (and, when `recursive`, its base storage).
    pub fn destroy(&self, recursive: bool) {
        let _ = recursive;
        self.inner.destroyed.set(true);
    }

    /// True once destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("key", &self.inner.key)
            .field("destroyed", &self.inner.destroyed.get())
            .finish()
    }
}

//=== TextureCache ========================================================

/// Shared keyed texture cache. Clones share one table.
#[derive(Clone)]
pub struct TextureCache {
    inner: Rc<RefCell<HashMap<String, Texture>>>,
}

impl TextureCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Registers a texture under its key, replacing any previous entry.
    pub fn insert(&self, texture: Texture) {
        self.inner
            .borrow_mut()
            .insert(texture.key().to_string(), texture);
    }

    /// Evicts and returns the entry for `key`, if cached.
    pub fn remove_from_cache(&self, key: &str) -> Option<Texture> {
        let removed = self.inner.borrow_mut().remove(key);
        if removed.is_some() {
            debug!("Evicted texture '{}' from cache", key);
        }
        removed
    }

    /// True if `key` is cached.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.borrow().contains_key(key)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }
}

impl Default for TextureCache {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_evict() {
        let cache = TextureCache::new();
        cache.insert(Texture::new("hero"));
        assert!(cache.contains("hero"));

        let evicted = cache.remove_from_cache("hero").unwrap();
        assert_eq!(evicted.key(), "hero");
        assert!(!cache.contains("hero"));
        assert!(cache.remove_from_cache("hero").is_none());
    }

    #[test]
    fn destroy_marks_every_handle() {
        let texture = Texture::new("hero");
        let clone = texture.clone();
        texture.destroy(true);
        assert!(clone.is_destroyed());
    }
}
