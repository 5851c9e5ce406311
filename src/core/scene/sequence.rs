//=========================================================================
// Scene Lifecycle Sequences
//=========================================================================
//
// Load and unload expressed as step sequences for the cooperative
// scheduler, one checkpoint per step:
//
//   load:   setup ► [poll assets…] ► Loaded ► init ► Initialized
//           ► enter ► Ready ► return
//   unload: exit ► Initialized ► destroy ► Loaded ► release ► None
//           ► return
//
// Each phase is skipped when the scene's current state shows it already
// completed, so a half-loaded scene resumes exactly where it left off
// and a redundant request degrades to a near no-op. Phase checks and
// skips happen within a single resume call; only completed work yields.
//
// Failures surface as Err from resume, which tears the coroutine down
// through its catch/finally hooks. Checkpoints already reached are
// kept.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::RefCell;
use std::rc::Rc;

use log::warn;

//=== Internal Dependencies ===============================================

use super::scene::Scene;
use super::{SceneContext, SceneState};
use crate::core::coroutine::{Coroutine, Step, StepSequence};
use crate::core::display::AssetLoader;
use crate::error::Result;

//=== Constructors ========================================================

/// Coroutine walking `scene` up to Initialized, and on to Ready when
/// `enable` is set.
pub(crate) fn scene_load(scene: Rc<RefCell<Scene>>, ctx: SceneContext, enable: bool) -> Coroutine {
    Coroutine::new(SceneLoadSequence {
        scene,
        ctx,
        enable,
        loader: None,
        phase: LoadPhase::Setup,
    })
}

/// Coroutine walking `scene` back down to None.
pub(crate) fn scene_unload(scene: Rc<RefCell<Scene>>, ctx: SceneContext) -> Coroutine {
    Coroutine::new(SceneUnloadSequence {
        scene,
        ctx,
        phase: UnloadPhase::Exit,
    })
}

//=== Load Sequence =======================================================

enum LoadPhase {
    Setup,
    AwaitAssets,
    Init,
    Enter,
    Finished,
}

struct SceneLoadSequence {
    scene: Rc<RefCell<Scene>>,
    ctx: SceneContext,
    enable: bool,
    loader: Option<Box<dyn AssetLoader>>,
    phase: LoadPhase,
}

impl SceneLoadSequence {
    fn scene_name(&self) -> String {
        self.scene.borrow().name().to_string()
    }

    /// Positions and attaches the root, runs the enter hook, and
    /// subscribes the scene to the clock. On hook failure the root is
    /// detached again and no subscription is left behind.
    fn attach_and_enter(&self) -> Result<()> {
        let root = {
            let scene = self.scene.borrow();
            match scene.root() {
                Some(root) => root.clone(),
                None => return Ok(()),
            }
        };

        let (x, y) = self.ctx.renderer.center();
        root.set_position(x, y);
        self.ctx.stage.add_child(&root);

        if let Err(err) = self.scene.borrow_mut().run_enter(&self.ctx) {
            self.ctx.stage.remove_child(&root);
            return Err(err);
        }

        let driven = self.scene.clone();
        let ctx = self.ctx.clone();
        let sub = self.ctx.ticker.add(move |dt| {
            // A scene mid-transition is borrowed by its sequence; the
            // sequence runs from the scheduler, never from the ticker,
            // so a failed borrow here means a re-entrant frame. Skip it.
            match driven.try_borrow_mut() {
                Ok(mut scene) => scene.dispatch_update(dt, &ctx),
                Err(_) => warn!("Skipping re-entrant scene update"),
            }
        });
        self.scene.borrow_mut().complete_enter(sub);
        Ok(())
    }
}

impl StepSequence for SceneLoadSequence {
    fn resume(&mut self) -> Result<Step> {
        loop {
            match self.phase {
                LoadPhase::Setup => {
                    if self.scene.borrow().state() == SceneState::None {
                        let mut loader = self.ctx.create_loader();
                        let name = self.scene_name();
                        self.scene
                            .borrow_mut()
                            .run_setup(loader.as_mut())
                            .map_err(|err| err.into_load(&name))?;
                        loader.load();
                        self.loader = Some(loader);
                        self.phase = LoadPhase::AwaitAssets;
                        return Ok(Step::Yield);
                    }
                    self.phase = LoadPhase::Init;
                }
                LoadPhase::AwaitAssets => {
                    let Some(loader) = self.loader.as_mut() else {
                        self.phase = LoadPhase::Init;
                        continue;
                    };
                    if loader.loading() {
                        return Ok(Step::Yield);
                    }
                    let resources = loader.take_resources();
                    loader.destroy();
                    self.loader = None;
                    self.scene.borrow_mut().complete_load(resources);
                    self.phase = LoadPhase::Init;
                }
                LoadPhase::Init => {
                    if self.scene.borrow().state() == SceneState::Loaded {
                        let name = self.scene_name();
                        self.scene
                            .borrow_mut()
                            .run_init(&self.ctx)
                            .map_err(|err| err.into_load(&name))?;
                        self.phase = LoadPhase::Enter;
                        return Ok(Step::Yield);
                    }
                    self.phase = LoadPhase::Enter;
                }
                LoadPhase::Enter => {
                    self.phase = LoadPhase::Finished;
                    if self.enable && self.scene.borrow().state() == SceneState::Initialized {
                        let name = self.scene_name();
                        self.attach_and_enter()
                            .map_err(|err| err.into_load(&name))?;
                        return Ok(Step::Yield);
                    }
                }
                LoadPhase::Finished => return Ok(Step::Return),
            }
        }
    }
}

//=== Unload Sequence =====================================================

enum UnloadPhase {
    Exit,
    Destroy,
    Release,
}

struct SceneUnloadSequence {
    scene: Rc<RefCell<Scene>>,
    ctx: SceneContext,
    phase: UnloadPhase,
}

impl StepSequence for SceneUnloadSequence {
    fn resume(&mut self) -> Result<Step> {
        loop {
            match self.phase {
                UnloadPhase::Exit => {
                    self.phase = UnloadPhase::Destroy;
                    if self.scene.borrow().state() == SceneState::Ready {
                        self.scene.borrow_mut().run_exit(&self.ctx);
                        return Ok(Step::Yield);
                    }
                }
                UnloadPhase::Destroy => {
                    self.phase = UnloadPhase::Release;
                    if self.scene.borrow().state() == SceneState::Initialized {
                        self.scene.borrow_mut().run_destroy(&self.ctx);
                        return Ok(Step::Yield);
                    }
                }
                UnloadPhase::Release => {
                    if self.scene.borrow().state() == SceneState::Loaded {
                        self.scene.borrow_mut().run_release(&self.ctx);
                    }
                    return Ok(Step::Return);
                }
            }
        }
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coroutine::Scheduler;
    use crate::core::display::{Container, RendererInfo, TextureCache, Ticker};
    use crate::core::scene::{SceneDelegate, SceneView};
    use crate::error::Error;
    use std::cell::Cell;

    fn test_context() -> SceneContext {
        SceneContext::new(
            RendererInfo::new(800.0, 600.0),
            Container::new(),
            Ticker::new(),
            TextureCache::new(),
        )
    }

    fn cell(scene: Scene) -> Rc<RefCell<Scene>> {
        Rc::new(RefCell::new(scene))
    }

    struct Declaring;
    impl SceneDelegate for Declaring {
        fn setup(&mut self, loader: &mut dyn AssetLoader) -> Result<()> {
            loader.add("bg", "res/bg.png");
            Ok(())
        }
    }

    #[test]
    fn fresh_load_walks_every_checkpoint() {
        let ctx = test_context();
        let scheduler = Scheduler::new();
        let scene = cell(Scene::new("menu", Declaring));

        scheduler
            .spawn(scene_load(scene.clone(), ctx.clone(), true))
            .unwrap();

        let mut states = Vec::new();
        while !scheduler.is_empty() {
            scheduler.tick();
            states.push(scene.borrow().state());
        }

        // The in-memory loader completes on its first poll, so the
        // Loaded and Initialized checkpoints land within one tick.
        assert_eq!(
            states,
            vec![
                SceneState::None,        // setup ran, assets in flight
                SceneState::Initialized, // resources captured, root built
                SceneState::Ready,       // attached + subscribed
                SceneState::Ready,       // final return
            ]
        );
        assert_eq!(ctx.stage.child_count(), 1);
        assert_eq!(ctx.ticker.len(), 1);
    }

    #[test]
    fn load_polls_assets_once_per_tick() {
        let ctx = test_context().with_loader_factory({
            let cache = TextureCache::new();
            move || Box::new(crate::core::display::MemoryAssetLoader::new(cache.clone()).with_latency(3))
        });
        let scheduler = Scheduler::new();
        let scene = cell(Scene::new("menu", Declaring));

        scheduler
            .spawn(scene_load(scene.clone(), ctx, true))
            .unwrap();

        scheduler.tick(); // setup
        for _ in 0..3 {
            scheduler.tick();
            assert_eq!(scene.borrow().state(), SceneState::None);
        }
        scheduler.tick();
        assert_eq!(scene.borrow().state(), SceneState::Initialized);
    }

    #[test]
    fn load_without_enable_stops_at_initialized() {
        let ctx = test_context();
        let scheduler = Scheduler::new();
        let scene = cell(Scene::new("menu", Declaring));

        scheduler
            .spawn(scene_load(scene.clone(), ctx.clone(), false))
            .unwrap();
        while !scheduler.is_empty() {
            scheduler.tick();
        }

        assert_eq!(scene.borrow().state(), SceneState::Initialized);
        assert_eq!(ctx.stage.child_count(), 0);
        assert!(ctx.ticker.is_empty());
    }

    #[test]
    fn reload_of_initialized_scene_only_runs_enter() {
        let ctx = test_context();
        let scheduler = Scheduler::new();
        let scene = cell(Scene::new("menu", Declaring));

        scheduler
            .spawn(scene_load(scene.clone(), ctx.clone(), false))
            .unwrap();
        while !scheduler.is_empty() {
            scheduler.tick();
        }

        // Resume from Initialized: one enter step plus the return.
        scheduler
            .spawn(scene_load(scene.clone(), ctx.clone(), true))
            .unwrap();
        scheduler.tick();
        assert_eq!(scene.borrow().state(), SceneState::Ready);
        scheduler.tick();
        assert!(scheduler.is_empty());
    }

    #[test]
    fn ready_scene_updates_from_the_ticker() {
        struct Counting(Rc<Cell<u32>>);
        impl SceneDelegate for Counting {
            fn update(&mut self, _dt: f32, _view: &SceneView<'_>) {
                self.0.set(self.0.get() + 1);
            }
        }

        let ctx = test_context();
        let scheduler = Scheduler::new();
        let count = Rc::new(Cell::new(0));
        let scene = cell(Scene::new("menu", Counting(count.clone())));

        scheduler
            .spawn(scene_load(scene, ctx.clone(), true))
            .unwrap();
        while !scheduler.is_empty() {
            scheduler.tick();
        }

        ctx.ticker.tick(0.016);
        ctx.ticker.tick(0.016);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn unload_walks_back_to_none_and_stops_updates() {
        let ctx = test_context();
        let scheduler = Scheduler::new();
        let scene = cell(Scene::new("menu", Declaring));

        scheduler
            .spawn(scene_load(scene.clone(), ctx.clone(), true))
            .unwrap();
        while !scheduler.is_empty() {
            scheduler.tick();
        }
        assert!(ctx.textures.contains("bg"));

        scheduler
            .spawn(scene_unload(scene.clone(), ctx.clone()))
            .unwrap();
        let mut states = Vec::new();
        while !scheduler.is_empty() {
            scheduler.tick();
            states.push(scene.borrow().state());
        }

        assert_eq!(
            states,
            vec![
                SceneState::Initialized, // exited
                SceneState::Loaded,      // root torn down
                SceneState::None,        // resources released
            ]
        );
        assert_eq!(ctx.stage.child_count(), 0);
        assert!(ctx.ticker.is_empty());
        assert!(!ctx.textures.contains("bg"));
    }

    #[test]
    fn unload_of_unloaded_scene_is_a_near_no_op() {
        let ctx = test_context();
        let scheduler = Scheduler::new();
        let scene = cell(Scene::new("menu", ()));

        scheduler.spawn(scene_unload(scene.clone(), ctx)).unwrap();
        scheduler.tick();

        assert!(scheduler.is_empty());
        assert_eq!(scene.borrow().state(), SceneState::None);
    }

    #[test]
    fn setup_failure_wraps_scene_name_and_keeps_state_none() {
        struct FailingSetup;
        impl SceneDelegate for FailingSetup {
            fn setup(&mut self, _loader: &mut dyn AssetLoader) -> Result<()> {
                Err(Error::NotFound("manifest".into()))
            }
        }

        let ctx = test_context();
        let scheduler = Scheduler::new();
        let scene = cell(Scene::new("broken", FailingSetup));
        let observed: Rc<RefCell<Option<Error>>> = Rc::new(RefCell::new(None));

        let sink = observed.clone();
        let task = scene_load(scene.clone(), ctx, true)
            .catch(move |err| *sink.borrow_mut() = Some(err.clone()));
        scheduler.spawn(task).unwrap();
        scheduler.tick();

        assert!(scheduler.is_empty());
        assert_eq!(scene.borrow().state(), SceneState::None);
        match observed.borrow().as_ref() {
            Some(Error::Load { scene, .. }) => assert_eq!(scene, "broken"),
            other => panic!("expected load error, got {:?}", other),
        };
    }

    #[test]
    fn enter_failure_leaves_scene_initialized_and_detached() {
        struct FailingEnter;
        impl SceneDelegate for FailingEnter {
            fn enter(&mut self, _view: &SceneView<'_>) -> Result<()> {
                Err(Error::Cancelled)
            }
        }

        let ctx = test_context();
        let scheduler = Scheduler::new();
        let scene = cell(Scene::new("broken", FailingEnter));

        scheduler
            .spawn(scene_load(scene.clone(), ctx.clone(), true))
            .unwrap();
        while !scheduler.is_empty() {
            scheduler.tick();
        }

        assert_eq!(scene.borrow().state(), SceneState::Initialized);
        assert_eq!(ctx.stage.child_count(), 0);
        assert!(ctx.ticker.is_empty());
    }
}
