//=========================================================================
// Stagecraft Runtime
//
// Main entry point and coordinator for the scene runtime.
//
// Architecture:
// ```text
//     RuntimeBuilder  ──build()──>  Runtime  ──frame(dt)──>  [advance]
//         │                           │
//         ├─ with_renderer_size()     ├─ timer.advance(dt)
//         └─ with_loader_factory()    ├─ scheduler.tick()
//                                     └─ ticker.tick(dt)
// ```
//
// The runtime owns one logical clock. The host calls `frame` once per
// rendered frame; everything else — scene transitions, waits, per-frame
// updates — advances as a consequence, in that fixed order.
//
//=========================================================================

//=== External Dependencies ===============================================

use log::info;

//=== Internal Dependencies ===============================================

use crate::core::coroutine::{Scheduler, Timer};
use crate::core::display::{AssetLoader, Container, RendererInfo, TextureCache, Ticker};
use crate::core::scene::{SceneContext, SceneManager};

//=== RuntimeBuilder ======================================================

/// Builder for configuring and constructing a [`Runtime`].
///
/// # Default Values
///
/// - **Renderer size**: 800 × 600 logical pixels
/// - **Asset loader**: the bundled in-memory loader
///
/// # Examples
///
/// ```
/// use stagecraft::RuntimeBuilder;
///
/// let runtime = RuntimeBuilder::new()
///     .with_renderer_size(1280.0, 720.0)
///     .build();
///
/// runtime.frame(0.016);
/// ```
pub struct RuntimeBuilder {
    renderer: RendererInfo,
    loader_factory: Option<Box<dyn Fn() -> Box<dyn AssetLoader>>>,
}

impl RuntimeBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            renderer: RendererInfo::new(800.0, 600.0),
            loader_factory: None,
        }
    }

    /// Sets the logical render surface size used to position scene roots.
    ///
    /// # Panics
    ///
    /// Panics if either dimension is not positive.
    pub fn with_renderer_size(mut self, width: f32, height: f32) -> Self {
        assert!(
            width > 0.0 && height > 0.0,
            "Renderer size must be positive, got {}x{}",
            width,
            height
        );
        self.renderer = RendererInfo::new(width, height);
        self
    }

    /// Replaces the asset loader factory, e.g. with a renderer binding's
    /// real pipeline.
    pub fn with_loader_factory(
        mut self,
        factory: impl Fn() -> Box<dyn AssetLoader> + 'static,
    ) -> Self {
        self.loader_factory = Some(Box::new(factory));
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> Runtime {
        info!(
            "Building runtime ({}x{})",
            self.renderer.width, self.renderer.height
        );

        let scheduler = Scheduler::new();
        let ticker = Ticker::new();
        let timer = Timer::new();
        let stage = Container::new();
        let textures = TextureCache::new();

        let mut context =
            SceneContext::new(self.renderer, stage.clone(), ticker.clone(), textures.clone());
        if let Some(factory) = self.loader_factory {
            context = context.with_loader_factory(factory);
        }

        let scenes = SceneManager::new(context.clone(), scheduler.clone());

        Runtime {
            scheduler,
            ticker,
            timer,
            stage,
            textures,
            context,
            scenes,
        }
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//=== Runtime =============================================================

/// Scene runtime: one logical clock driving scene lifecycles, coroutine
/// tasks, and per-frame updates.
///
/// # Examples
///
/// ```
/// use stagecraft::prelude::*;
///
/// let runtime = RuntimeBuilder::new().build();
/// runtime.scenes().add(Scene::new("menu", ()));
///
/// let promise = runtime.scenes().load("menu", LoadOptions::default());
/// while promise.try_take().is_none() {
///     runtime.frame(0.016);
/// }
/// ```
pub struct Runtime {
    scheduler: Scheduler,
    ticker: Ticker,
    timer: Timer,
    stage: Container,
    textures: TextureCache,
    context: SceneContext,
    scenes: SceneManager,
}

impl Runtime {
    //--- Accessors --------------------------------------------------------

    /// Scene registry and transition orchestrator.
    pub fn scenes(&self) -> &SceneManager {
        &self.scenes
    }

    /// Coroutine scheduler, for spawning tasks outside scene lifecycles.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Per-frame clock scene updates subscribe to.
    pub fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    /// Virtual timer backing timed waits.
    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    /// Root display container scenes attach to.
    pub fn stage(&self) -> &Container {
        &self.stage
    }

    /// Shared texture cache.
    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    /// The scene context handed to lifecycle hooks.
    pub fn context(&self) -> &SceneContext {
        &self.context
    }

    //--- Execution --------------------------------------------------------

    /// Advances the runtime by one frame: virtual time first, then one
    /// scheduler step for every in-flight task, then the per-frame
    /// subscribers. `dt` is the elapsed time in seconds.
    pub fn frame(&self, dt: f32) {
        self.timer.advance(dt);
        self.scheduler.tick();
        self.ticker.tick(dt);
    }

    /// Cancels every in-flight task, running cleanup hooks. Scene states
    /// are left as they are; unload scenes first for an orderly
    /// teardown.
    pub fn shutdown(&self) {
        info!("Runtime shutdown");
        self.scheduler.shutdown();
    }
}

//=========================================================================
// Tests
//=========================================================================
