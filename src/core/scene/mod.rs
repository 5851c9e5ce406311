//=========================================================================
// Scene System
//=========================================================================
//
// Scene lifecycle state machine and orchestration.
//
// Architecture:
//   SceneManager
//     ├─ registry: Vec<SceneEntry> (insertion order = index order)
//     ├─ active set: derived (state >= Loaded)
//     └─ transitions: orchestration coroutines on the shared Scheduler
//
// Lifecycle (strictly sequential, no skipping):
//   None ─setup/load─> Loaded ─init─> Initialized ─enter─> Ready
//        <──release──        <─destroy─           <─exit──
//
// Every state change is a checkpoint reached by a driving load or
// unload sequence; nothing outside those sequences sets state, and a
// failed transition never rolls a checkpoint back.
//
//=========================================================================

//=== Module Declarations =================================================

mod loader;
mod manager;
mod scene;
mod sequence;

//=== Public API ==========================================================

pub use loader::SceneLoader;
pub use manager::{LoadMode, LoadOptions, SceneManager, SceneRef, WeakSceneManager};
pub use scene::{Scene, SceneDelegate, SceneView};

//=== External Dependencies ===============================================

use std::rc::Rc;

//=== Internal Dependencies ===============================================

use crate::core::display::{
    AssetLoader, Container, MemoryAssetLoader, RendererInfo, TextureCache, Ticker,
};

//=== Scene State =========================================================

/// Lifecycle position of a scene. Ordered: a scene at `Ready` has passed
/// through every earlier state, and unloading walks back down one
/// checkpoint at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SceneState {
    /// Nothing held: no resources, no display root.
    None,

    /// Assets fetched; the resource table is populated.
    Loaded,

    /// Display root materialized from loaded resources.
    Initialized,

    /// Attached to the stage and subscribed to the tick clock.
    Ready,
}

//=== Scene Context =======================================================

type LoaderFactory = Rc<dyn Fn() -> Box<dyn AssetLoader>>;

/// Collaborators a scene composes against during its lifecycle: the
/// stage to attach to, the clock to subscribe updates to, the texture
/// cache to release into, and the loader factory serving setup
/// declarations.
///
/// Cheap to clone; clones share the same collaborators.
#[derive(Clone)]
pub struct SceneContext {
    /// Render surface dimensions, used to center scene roots on enter.
    pub renderer: RendererInfo,

    /// Stage container scene roots attach to while active.
    pub stage: Container,

    /// Per-frame clock driving `update` while Ready.
    pub ticker: Ticker,

    /// Keyed texture cache scenes release into on unload.
    pub textures: TextureCache,

    loader_factory: LoaderFactory,
}

impl SceneContext {
    /// Creates a context backed by the in-memory asset loader.
    pub fn new(
        renderer: RendererInfo,
        stage: Container,
        ticker: Ticker,
        textures: TextureCache,
    ) -> Self {
        let cache = textures.clone();
        Self {
            renderer,
            stage,
            ticker,
            textures,
            loader_factory: Rc::new(move || Box::new(MemoryAssetLoader::new(cache.clone()))),
        }
    }

    /// Replaces the asset loader factory, e.g. with a renderer binding's
    /// real loader.
    pub fn with_loader_factory(
        mut self,
        factory: impl Fn() -> Box<dyn AssetLoader> + 'static,
    ) -> Self {
        self.loader_factory = Rc::new(factory);
        self
    }

    /// Creates a fresh loader for one scene's setup pass.
    pub fn create_loader(&self) -> Box<dyn AssetLoader> {
        (self.loader_factory)()
    }
}
