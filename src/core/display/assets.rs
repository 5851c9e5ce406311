//=========================================================================
// Asset Loading
//=========================================================================
//
// Loader seam between scenes and the asset pipeline.
//
// A scene declares its requirements against an AssetLoader during setup,
// the loader fetches asynchronously, and the scene's load sequence polls
// `loading()` once per tick until the resource table is ready. Manifests
// and image payloads are opaque to the core: a renderer binding maps
// descriptors onto its own fetch machinery.
//
// MemoryAssetLoader is the bundled implementation: fully in-memory,
// completing after a configurable number of polls, so lifecycle flows
// are deterministic without a network or a GPU.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::Cell;
use std::collections::HashMap;

use log::debug;

//=== Internal Dependencies ===============================================

use super::texture::{Texture, TextureCache};

//=== Resource Table ======================================================

/// One loaded asset: either a single texture or an atlas of named frames.
#[derive(Debug, Clone, Default)]
pub struct ResourceRecord {
    /// Single texture, for plain image assets.
    pub texture: Option<Texture>,

    /// Frame-name to texture mapping, for atlas assets.
    pub textures: Option<HashMap<String, Texture>>,
}

impl ResourceRecord {
    /// Record holding one texture.
    pub fn single(texture: Texture) -> Self {
        Self {
            texture: Some(texture),
            textures: None,
        }
    }

    /// Record holding an atlas.
    pub fn atlas(frames: HashMap<String, Texture>) -> Self {
        Self {
            texture: None,
            textures: Some(frames),
        }
    }
}

/// Loaded resources keyed by the name they were declared under.
pub type ResourceTable = HashMap<String, ResourceRecord>;

//=== AssetLoader =========================================================

/// Asynchronous asset fetcher driven by per-tick polling.
///
/// Usage order: `add` during scene setup (chainable), one `load`, then
/// poll `loading` until false, `take_resources`, and finally `destroy`.
pub trait AssetLoader {
    /// Declares an asset under `key`. Chainable.
    fn add(&mut self, key: &str, descriptor: &str) -> &mut dyn AssetLoader;

    /// Begins the asynchronous fetch of everything declared so far.
    fn load(&mut self);

    /// True while the fetch is still in flight.
    fn loading(&self) -> bool;

    /// Takes the completed resource table. Meaningful once `loading()`
    /// reports false; the table is yielded at most once.
    fn take_resources(&mut self) -> ResourceTable;

    /// Releases loader-internal state.
    fn destroy(&mut self);
}

//=== MemoryAssetLoader ===================================================

/// In-memory [`AssetLoader`] with deterministic latency.
///
/// Completes after a configurable number of `loading()` polls (default:
/// immediately on the first poll after `load()`). Produced textures are
/// registered in the given [`TextureCache`] under their keys, so a
/// scene's release pass has real entries to evict.
///
/// Descriptor convention: `"atlas:a,b,c"` produces an atlas record with
/// frames `a`, `b`, `c`; any other descriptor produces a single texture
/// under the declared key.
pub struct MemoryAssetLoader {
    cache: TextureCache,
    latency: u32,
    remaining: Cell<u32>,
    pending: Vec<(String, String)>,
    resources: ResourceTable,
    started: bool,
}

impl MemoryAssetLoader {
    /// Creates a loader registering textures into `cache`.
    pub fn new(cache: TextureCache) -> Self {
        Self {
            cache,
            latency: 0,
            remaining: Cell::new(0),
            pending: Vec::new(),
            resources: ResourceTable::new(),
            started: false,
        }
    }

    /// Number of `loading()` polls before the fetch completes.
    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency = polls;
        self
    }

    fn materialize(&mut self) {
        for (key, descriptor) in self.pending.drain(..) {
            let record = match descriptor.strip_prefix("atlas:") {
                Some(frames) => {
                    let mut map = HashMap::new();
                    for frame in frames.split(',').filter(|f| !f.is_empty()) {
                        let texture = Texture::new(frame);
                        self.cache.insert(texture.clone());
                        map.insert(frame.to_string(), texture);
                    }
                    ResourceRecord::atlas(map)
                }
                None => {
                    let texture = Texture::new(key.as_str());
                    self.cache.insert(texture.clone());
                    ResourceRecord::single(texture)
                }
            };
            self.resources.insert(key, record);
        }
    }
}

impl AssetLoader for MemoryAssetLoader {
    fn add(&mut self, key: &str, descriptor: &str) -> &mut dyn AssetLoader {
        self.pending.push((key.to_string(), descriptor.to_string()));
        self
    }

    fn load(&mut self) {
        debug!("Loading {} asset(s)", self.pending.len());
        self.started = true;
        self.remaining.set(self.latency);
        self.materialize();
    }

    fn loading(&self) -> bool {
        if !self.started {
            return false;
        }
        let remaining = self.remaining.get();
        if remaining > 0 {
            self.remaining.set(remaining - 1);
            true
        } else {
            false
        }
    }

    fn take_resources(&mut self) -> ResourceTable {
        std::mem::take(&mut self.resources)
    }

    fn destroy(&mut self) {
        self.pending.clear();
        self.resources.clear();
        self.started = false;
    }
}

//=========================================================================
// Tests
//=========================================================================
