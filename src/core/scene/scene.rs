//=========================================================================
// Scene
//=========================================================================
//
// One unit of presentable content: a named state machine owning a
// resource table and a display root, with behavior supplied by a
// SceneDelegate.
//
// The struct holds the lifecycle bookkeeping; the delegate holds the
// content. Lifecycle steps (`run_*`) are crate-internal and only ever
// invoked by the load/unload sequences, which guarantees the state
// ordering invariants.
//
//=========================================================================

//=== External Dependencies ===============================================

use log::debug;

//=== Internal Dependencies ===============================================

use super::manager::{SceneManager, WeakSceneManager};
use super::{SceneContext, SceneState};
use crate::core::display::{AssetLoader, Container, ResourceTable, TickerSub};
use crate::error::{Error, Result};

//=== Scene View ==========================================================

/// What a delegate hook sees: the scene's loaded resources, its display
/// root, and the shared context. Borrowed for the duration of one hook
/// call.
pub struct SceneView<'a> {
    /// Resources loaded during setup, keyed by declared name.
    pub resources: &'a ResourceTable,

    /// The scene's display root.
    pub root: &'a Container,

    /// Shared collaborators (stage, ticker, textures, renderer info).
    pub context: &'a SceneContext,
}

//=== Scene Delegate ======================================================

/// Content hooks a scene calls at each lifecycle step. All hooks have
/// empty defaults; a scene with no delegate logic still walks the full
/// lifecycle.
///
/// Fallible hooks (`setup`, `init`, `enter`) abort the load in progress
/// when they return an error; checkpoints already reached are kept.
pub trait SceneDelegate {
    /// Declares the scene's assets against `loader`. Runs before any
    /// resources exist.
    fn setup(&mut self, loader: &mut dyn AssetLoader) -> Result<()> {
        let _ = loader;
        Ok(())
    }

    /// Builds the display hierarchy under `view.root` from
    /// `view.resources`.
    fn init(&mut self, view: &SceneView<'_>) -> Result<()> {
        let _ = view;
        Ok(())
    }

    /// Runs as the scene is attached to the stage, just before updates
    /// begin.
    fn enter(&mut self, view: &SceneView<'_>) -> Result<()> {
        let _ = view;
        Ok(())
    }

    /// Per-frame update while the scene is Ready. `dt` is the elapsed
    /// time in seconds.
    fn update(&mut self, dt: f32, view: &SceneView<'_>) {
        let _ = (dt, view);
    }

    /// Runs as the scene is detached from the stage.
    fn exit(&mut self, view: &SceneView<'_>) {
        let _ = view;
    }

    /// Runs just before the display root is torn down.
    fn destroy(&mut self, view: &SceneView<'_>) {
        let _ = view;
    }
}

/// A scene with no content logic.
impl SceneDelegate for () {}

//=== Scene ===============================================================

/// Named lifecycle state machine owning a resource table and a display
/// root.
pub struct Scene {
    name: String,
    state: SceneState,
    resources: Option<ResourceTable>,
    root: Option<Container>,
    ticker_sub: Option<TickerSub>,
    manager: Option<WeakSceneManager>,
    delegate: Box<dyn SceneDelegate>,
}

impl Scene {
    /// Creates a scene in the `None` state.
    pub fn new(name: impl Into<String>, delegate: impl SceneDelegate + 'static) -> Self {
        Self {
            name: name.into(),
            state: SceneState::None,
            resources: None,
            root: None,
            ticker_sub: None,
            manager: None,
            delegate: Box::new(delegate),
        }
    }

    //--- Accessors --------------------------------------------------------

    /// Registration name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SceneState {
        self.state
    }

    /// Loaded resources. Populated while state >= Loaded.
    pub fn resources(&self) -> Option<&ResourceTable> {
        self.resources.as_ref()
    }

    /// Display root. Populated while state >= Initialized.
    pub fn root(&self) -> Option<&Container> {
        self.root.as_ref()
    }

    /// The manager this scene is registered with, if any. Non-owning:
    /// set on registration, cleared on deregistration.
    pub fn manager(&self) -> Option<SceneManager> {
        self.manager.as_ref()?.upgrade()
    }

    pub(crate) fn set_manager(&mut self, manager: Option<WeakSceneManager>) {
        self.manager = manager;
    }

    //--- Lifecycle Steps --------------------------------------------------
    //
    // Invoked only by the load/unload sequences, one checkpoint each.

    /// Runs the delegate's asset declarations against `loader`.
    pub(crate) fn run_setup(&mut self, loader: &mut dyn AssetLoader) -> Result<()> {
        debug!("Scene '{}' setup", self.name);
        self.delegate.setup(loader)
    }

    /// Stores the fetched resources and checkpoints at Loaded.
    pub(crate) fn complete_load(&mut self, resources: ResourceTable) {
        debug!(
            "Scene '{}' loaded ({} resource(s))",
            self.name,
            resources.len()
        );
        self.resources = Some(resources);
        self.state = SceneState::Loaded;
    }

    /// Materializes the display root, lets the delegate populate it, and
    /// checkpoints at Initialized. On delegate failure the fresh root is
    /// destroyed and the scene stays Loaded.
    pub(crate) fn run_init(&mut self, ctx: &SceneContext) -> Result<()> {
        debug!("Scene '{}' init", self.name);
        let root = Container::new();
        let result = match self.resources.as_ref() {
            Some(resources) => self.delegate.init(&SceneView {
                resources,
                root: &root,
                context: ctx,
            }),
            None => Err(Error::NotLoaded(self.name.clone())),
        };
        match result {
            Ok(()) => {
                self.root = Some(root);
                self.state = SceneState::Initialized;
                Ok(())
            }
            Err(err) => {
                root.destroy(true);
                Err(err)
            }
        }
    }

    /// Runs the delegate's enter hook against the current view.
    pub(crate) fn run_enter(&mut self, ctx: &SceneContext) -> Result<()> {
        debug!("Scene '{}' enter", self.name);
        let Scene {
            delegate,
            resources,
            root,
            name,
            ..
        } = self;
        match (resources.as_ref(), root.as_ref()) {
            (Some(resources), Some(root)) => delegate.enter(&SceneView {
                resources,
                root,
                context: ctx,
            }),
            _ => Err(Error::NotLoaded(name.clone())),
        }
    }

    /// Records the tick subscription and checkpoints at Ready.
    pub(crate) fn complete_enter(&mut self, sub: TickerSub) {
        self.ticker_sub = Some(sub);
        self.state = SceneState::Ready;
    }

    /// Forwards a frame to the delegate. Ignored unless Ready.
    pub(crate) fn dispatch_update(&mut self, dt: f32, ctx: &SceneContext) {
        if self.state != SceneState::Ready {
            return;
        }
        let Scene {
            delegate,
            resources,
            root,
            ..
        } = self;
        if let (Some(resources), Some(root)) = (resources.as_ref(), root.as_ref()) {
            delegate.update(
                dt,
                &SceneView {
                    resources,
                    root,
                    context: ctx,
                },
            );
        }
    }

    /// Detaches from stage and clock and checkpoints back at
    /// Initialized.
    pub(crate) fn run_exit(&mut self, ctx: &SceneContext) {
        debug!("Scene '{}' exit", self.name);
        {
            let Scene {
                delegate,
                resources,
                root,
                ..
            } = self;
            if let (Some(resources), Some(root)) = (resources.as_ref(), root.as_ref()) {
                delegate.exit(&SceneView {
                    resources,
                    root,
                    context: ctx,
                });
            }
        }
        if let Some(sub) = self.ticker_sub.take() {
            ctx.ticker.remove(sub);
        }
        if let Some(root) = self.root.as_ref() {
            ctx.stage.remove_child(root);
        }
        self.state = SceneState::Initialized;
    }

    /// Tears down the display root and checkpoints back at Loaded.
    pub(crate) fn run_destroy(&mut self, ctx: &SceneContext) {
        debug!("Scene '{}' destroy", self.name);
        {
            let Scene {
                delegate,
                resources,
                root,
                ..
            } = self;
            if let (Some(resources), Some(root)) = (resources.as_ref(), root.as_ref()) {
                delegate.destroy(&SceneView {
                    resources,
                    root,
                    context: ctx,
                });
            }
        }
        if let Some(root) = self.root.take() {
            root.destroy(true);
        }
        self.state = SceneState::Loaded;
    }

    /// Evicts the scene's textures from the shared cache, drops the
    /// resource table, and checkpoints back at None.
    pub(crate) fn run_release(&mut self, ctx: &SceneContext) {
        debug!("Scene '{}' release", self.name);
        if let Some(resources) = self.resources.take() {
            for (key, record) in resources {
                if let Some(frames) = record.textures {
                    for frame_key in frames.keys() {
                        if let Some(evicted) = ctx.textures.remove_from_cache(frame_key) {
                            evicted.destroy(true);
                        }
                    }
                }
                if record.texture.is_some() {
                    if let Some(evicted) = ctx.textures.remove_from_cache(&key) {
                        evicted.destroy(true);
                    }
                }
            }
        }
        self.state = SceneState::None;
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}

//=========================================================================
// Tests
//=========================================================================
