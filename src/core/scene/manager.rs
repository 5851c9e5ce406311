//=========================================================================
// Scene Manager
//=========================================================================
//
// Scene registry and transition orchestrator.
//
// Scenes are registered in insertion order and addressed by name, index,
// or handle. The active set is derived, never stored: a scene is active
// exactly when its state has passed the Loaded checkpoint. Transitions
// run as coroutines on the shared scheduler, so a load that must first
// unload its predecessors is a single flattened task walking both
// lifecycles one checkpoint per tick.
//
// Concurrency discipline: at most one transition per scene. A scene with
// a transition in flight is marked pending; load/unload requests against
// it are rejected up front with the same errors a completed transition
// would produce. Pending marks are held by drop guards owned by the
// orchestration, so they release on completion, failure, and
// cancellation alike.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::{Rc, Weak};

use log::{debug, info, warn};

//=== Internal Dependencies ===============================================

use super::loader::SceneLoader;
use super::scene::Scene;
use super::{sequence, SceneContext, SceneState};
use crate::core::coroutine::{Coroutine, Promise, PromiseSender, Scheduler, Step, StepSequence};
use crate::error::{Error, Result};

//=== Load Options ========================================================

/// How a load treats the scenes that are already active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// The loaded scene replaces the active set: once it has entered,
    /// every other active scene is unloaded.
    Single,

    /// The loaded scene joins the active set; nothing else is touched.
    Additive,
}

impl LoadMode {
    /// Resolves a numeric mode (0 = single, 1 = additive), as carried by
    /// external configuration.
    pub fn from_index(index: u8) -> Result<Self> {
        match index {
            0 => Ok(LoadMode::Single),
            1 => Ok(LoadMode::Additive),
            other => Err(Error::InvalidMode(other)),
        }
    }
}

/// Options for [`SceneManager::load`].
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Replacement policy once the scene activates.
    pub mode: LoadMode,

    /// When set, the load carries straight through enter; when cleared,
    /// the load stops at Initialized and resolves a pending
    /// [`SceneLoader`] whose `enable()` finishes the job later.
    pub enable: bool,

    /// For additive loads: whether the scene becomes the current scene
    /// on activation. Single-mode loads always do.
    pub active: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            mode: LoadMode::Single,
            enable: true,
            active: true,
        }
    }
}

impl LoadOptions {
    /// Single-mode load (the default).
    pub fn single() -> Self {
        Self::default()
    }

    /// Additive load.
    pub fn additive() -> Self {
        Self {
            mode: LoadMode::Additive,
            ..Self::default()
        }
    }

    /// Sets whether the load carries through enter.
    pub fn with_enable(mut self, enable: bool) -> Self {
        self.enable = enable;
        self
    }

    /// Sets whether the scene becomes current on activation.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

//=== Scene Ref ===========================================================

/// Ways of addressing a registered scene.
pub enum SceneRef {
    /// Position in registration order.
    Index(usize),

    /// Registration name.
    Name(String),

    /// The shared handle returned by [`SceneManager::add`].
    Handle(Rc<RefCell<Scene>>),
}

impl SceneRef {
    fn describe(&self) -> String {
        match self {
            SceneRef::Index(index) => format!("#{}", index),
            SceneRef::Name(name) => name.clone(),
            SceneRef::Handle(_) => "<unregistered scene>".to_string(),
        }
    }
}

impl From<usize> for SceneRef {
    fn from(index: usize) -> Self {
        SceneRef::Index(index)
    }
}

impl From<&str> for SceneRef {
    fn from(name: &str) -> Self {
        SceneRef::Name(name.to_string())
    }
}

impl From<String> for SceneRef {
    fn from(name: String) -> Self {
        SceneRef::Name(name)
    }
}

impl From<Rc<RefCell<Scene>>> for SceneRef {
    fn from(handle: Rc<RefCell<Scene>>) -> Self {
        SceneRef::Handle(handle)
    }
}

impl From<&Rc<RefCell<Scene>>> for SceneRef {
    fn from(handle: &Rc<RefCell<Scene>>) -> Self {
        SceneRef::Handle(handle.clone())
    }
}

//=== Scene Manager =======================================================

// Registration name is cached outside the scene's cell so lookups never
// borrow a scene that is mid-update.
struct SceneEntry {
    name: String,
    cell: Rc<RefCell<Scene>>,
}

struct Inner {
    entries: Vec<SceneEntry>,
    current: Option<String>,
    pending: HashSet<String>,
    context: SceneContext,
    scheduler: Scheduler,
}

/// Shared scene registry and transition orchestrator. Clones share one
/// registry.
#[derive(Clone)]
pub struct SceneManager {
    inner: Rc<RefCell<Inner>>,
}

/// Non-owning manager handle, for delegates and deferred activations
/// that must not keep the manager alive.
#[derive(Clone)]
pub struct WeakSceneManager {
    inner: Weak<RefCell<Inner>>,
}

impl WeakSceneManager {
    /// Recovers the manager if it still exists.
    pub fn upgrade(&self) -> Option<SceneManager> {
        self.inner.upgrade().map(|inner| SceneManager { inner })
    }
}

impl SceneManager {
    /// Creates an empty manager running transitions on `scheduler`.
    pub fn new(context: SceneContext, scheduler: Scheduler) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                entries: Vec::new(),
                current: None,
                pending: HashSet::new(),
                context,
                scheduler,
            })),
        }
    }

    /// Non-owning handle to this manager.
    pub fn downgrade(&self) -> WeakSceneManager {
        WeakSceneManager {
            inner: Rc::downgrade(&self.inner),
        }
    }

    //--- Registry ---------------------------------------------------------

    /// Registers a scene at the end of the registry and returns its
    /// shared handle. Re-registering a name is a no-op that returns the
    /// existing handle.
    pub fn add(&self, scene: Scene) -> Rc<RefCell<Scene>> {
        self.add_at(scene, usize::MAX)
    }

    /// Registers a scene at `index` (clamped to the registry length).
    pub fn add_at(&self, mut scene: Scene, index: usize) -> Rc<RefCell<Scene>> {
        let name = scene.name().to_string();
        let mut inner = self.inner.borrow_mut();
        if let Some(entry) = inner.entries.iter().find(|entry| entry.name == name) {
            debug!("Scene '{}' already registered", name);
            return entry.cell.clone();
        }
        debug!("Registered scene '{}'", name);
        scene.set_manager(Some(self.downgrade()));
        let cell = Rc::new(RefCell::new(scene));
        let index = index.min(inner.entries.len());
        inner.entries.insert(
            index,
            SceneEntry {
                name,
                cell: cell.clone(),
            },
        );
        cell
    }

    /// Deregisters a scene and returns its handle. The scene itself is
    /// not unloaded; unload it first if it holds resources.
    pub fn remove(&self, scene: impl Into<SceneRef>) -> Result<Rc<RefCell<Scene>>> {
        let scene = scene.into();
        let Some((name, _)) = self.resolve(&scene) else {
            return Err(Error::NotFound(scene.describe()));
        };
        let mut inner = self.inner.borrow_mut();
        let Some(index) = inner.entries.iter().position(|entry| entry.name == name) else {
            return Err(Error::NotFound(name));
        };
        let entry = inner.entries.remove(index);
        if inner.current.as_deref() == Some(name.as_str()) {
            inner.current = None;
        }
        if let Ok(mut scene) = entry.cell.try_borrow_mut() {
            scene.set_manager(None);
        }
        debug!("Deregistered scene '{}'", name);
        Ok(entry.cell)
    }

    /// Number of registered scenes.
    pub fn count(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Looks up a registered scene by name, index, or handle.
    pub fn get(&self, scene: impl Into<SceneRef>) -> Option<Rc<RefCell<Scene>>> {
        self.resolve(&scene.into()).map(|(_, cell)| cell)
    }

    /// Handles of every active scene (state past the Loaded checkpoint),
    /// in registration order.
    pub fn loaded(&self) -> Vec<Rc<RefCell<Scene>>> {
        self.inner
            .borrow()
            .entries
            .iter()
            .filter(|entry| entry_is_loaded(entry))
            .map(|entry| entry.cell.clone())
            .collect()
    }

    /// True if the named scene is registered and active.
    pub fn is_active(&self, name: &str) -> bool {
        self.inner
            .borrow()
            .entries
            .iter()
            .any(|entry| entry.name == name && entry_is_loaded(entry))
    }

    //--- Current Scene ----------------------------------------------------

    /// Handle of the current scene, if one is set.
    pub fn current(&self) -> Option<Rc<RefCell<Scene>>> {
        let name = self.inner.borrow().current.clone()?;
        self.get(name.as_str())
    }

    /// Name of the current scene, if one is set.
    pub fn current_name(&self) -> Option<String> {
        self.inner.borrow().current.clone()
    }

    /// Points the current-scene marker at a registered scene. Ignored
    /// (with a log) unless the scene is active.
    pub fn set_current(&self, scene: impl Into<SceneRef>) -> Result<()> {
        let scene = scene.into();
        let Some((name, _)) = self.resolve(&scene) else {
            return Err(Error::NotFound(scene.describe()));
        };
        if !self.is_active(&name) {
            warn!("Ignoring current-scene assignment: '{}' is not active", name);
            return Ok(());
        }
        self.inner.borrow_mut().current = Some(name);
        Ok(())
    }

    //--- Transitions ------------------------------------------------------

    /// Loads a registered scene.
    ///
    /// The returned promise resolves with a [`SceneLoader`] once the load
    /// finishes: a spent token for enabled loads, a pending one for
    /// deferred loads (`enable: false`). In single mode the other active
    /// scenes are unloaded after the new scene has entered; the set to
    /// unload is decided at activation time.
    ///
    /// Rejects with [`Error::NotFound`] for unregistered scenes and
    /// [`Error::AlreadyLoaded`] for scenes that are active or already
    /// have a transition in flight.
    pub fn load(&self, scene: impl Into<SceneRef>, options: LoadOptions) -> Promise<SceneLoader> {
        let scene = scene.into();
        let Some((name, cell)) = self.resolve(&scene) else {
            return Promise::rejected(Error::NotFound(scene.describe()));
        };
        if self.is_pending(&name) {
            return Promise::rejected(Error::AlreadyLoaded(name));
        }
        // An unborrowable scene is mid-update, hence Ready.
        let state = match cell.try_borrow() {
            Ok(scene) => scene.state(),
            Err(_) => SceneState::Ready,
        };
        if state >= SceneState::Loaded {
            return Promise::rejected(Error::AlreadyLoaded(name));
        }

        info!("Loading scene '{}' ({:?})", name, options.mode);
        let (tx, promise) = Promise::channel();
        self.spawn_load(cell, name, options, Some(tx));
        promise
    }

    /// Unloads an active scene, walking it back to the None checkpoint.
    ///
    /// Rejects with [`Error::NotFound`] for unregistered scenes and
    /// [`Error::NotLoaded`] for scenes that are not active or already
    /// have a transition in flight.
    pub fn unload(&self, scene: impl Into<SceneRef>) -> Promise<()> {
        let scene = scene.into();
        let Some((name, cell)) = self.resolve(&scene) else {
            return Promise::rejected(Error::NotFound(scene.describe()));
        };
        if self.is_pending(&name) {
            return Promise::rejected(Error::NotLoaded(name));
        }
        let state = match cell.try_borrow() {
            Ok(scene) => scene.state(),
            Err(_) => SceneState::Ready,
        };
        if state < SceneState::Loaded {
            return Promise::rejected(Error::NotLoaded(name));
        }

        info!("Unloading scene '{}'", name);
        let claim = self.claim(&name);
        let (ctx, scheduler) = self.collaborators();
        let (tx, promise) = Promise::channel();
        let reject = tx.clone();
        let weak = self.downgrade();
        let task = sequence::scene_unload(cell, ctx)
            .done(move || {
                if let Some(manager) = weak.upgrade() {
                    manager.clear_current_if(&name);
                }
                let _ = tx.send(Ok(()));
            })
            .catch(move |err| {
                let _ = reject.send(Err(err.clone()));
            })
            .finally(move || drop(claim));
        let _ = scheduler.spawn(task);
        promise
    }

    /// Unloads every active scene, one at a time in registration order,
    /// and clears the current-scene marker. Resolves immediately when
    /// nothing is active.
    pub fn unload_all(&self) -> Promise<()> {
        let (ctx, scheduler) = self.collaborators();
        // Snapshot before claiming: claims mutate the registry state, so
        // no registry borrow may be held across them.
        let active: Vec<(String, Rc<RefCell<Scene>>)> = self
            .inner
            .borrow()
            .entries
            .iter()
            .filter(|entry| entry_is_loaded(entry))
            .map(|entry| (entry.name.clone(), entry.cell.clone()))
            .collect();
        let mut queue = VecDeque::new();
        let mut claims = Vec::new();
        for (name, cell) in active {
            if self.is_pending(&name) {
                continue;
            }
            claims.push(self.claim(&name));
            queue.push_back(cell);
        }
        if queue.is_empty() {
            return Promise::resolved(());
        }

        info!("Unloading all scenes ({})", queue.len());
        let (tx, promise) = Promise::channel();
        let reject = tx.clone();
        let task = Coroutine::new(UnloadAllOrchestration {
            manager: self.downgrade(),
            ctx,
            queue,
            resolve: Some(tx),
            _claims: claims,
        })
        .catch(move |err| {
            let _ = reject.send(Err(err.clone()));
        });
        let _ = scheduler.spawn(task);
        promise
    }

    /// Moves every child of `source`'s display root under `dest`'s root
    /// and returns `dest`'s handle. Both scenes must have passed the
    /// Initialized checkpoint. Merging a scene into itself is a no-op.
    pub fn merge(
        &self,
        source: impl Into<SceneRef>,
        dest: impl Into<SceneRef>,
    ) -> Result<Rc<RefCell<Scene>>> {
        let source = source.into();
        let Some((source_name, source_cell)) = self.resolve(&source) else {
            return Err(Error::NotFound(source.describe()));
        };
        let dest = dest.into();
        let Some((dest_name, dest_cell)) = self.resolve(&dest) else {
            return Err(Error::NotFound(dest.describe()));
        };
        if Rc::ptr_eq(&source_cell, &dest_cell) {
            return Ok(dest_cell);
        }

        let source_root = root_of(&source_cell).ok_or(Error::NotLoaded(source_name.clone()))?;
        let dest_root = root_of(&dest_cell).ok_or(Error::NotLoaded(dest_name.clone()))?;
        let children = source_root.take_children();
        debug!(
            "Merging {} node(s) from '{}' into '{}'",
            children.len(),
            source_name,
            dest_name
        );
        for child in &children {
            dest_root.add_child(child);
        }
        Ok(dest_cell)
    }

    //--- Internals --------------------------------------------------------

    fn spawn_load(
        &self,
        cell: Rc<RefCell<Scene>>,
        name: String,
        options: LoadOptions,
        resolve: Option<PromiseSender<SceneLoader>>,
    ) {
        let claim = self.claim(&name);
        let (ctx, scheduler) = self.collaborators();
        let reject = resolve.clone();
        let orchestration = LoadOrchestration {
            manager: self.downgrade(),
            scene: cell,
            name,
            options,
            ctx,
            resolve,
            queue: VecDeque::new(),
            claims: vec![claim],
            phase: LoadOrchPhase::Load,
        };
        let mut task = Coroutine::new(orchestration);
        if let Some(reject) = reject {
            task = task.catch(move |err| {
                let _ = reject.send(Err(err.clone()));
            });
        }
        let _ = scheduler.spawn(task);
    }

    // Activation continuation for a deferred load: re-enter the load with
    // enable set, keeping the original mode and active flag.
    fn spawn_activation(&self, cell: Rc<RefCell<Scene>>, name: String, options: LoadOptions) {
        if self.is_pending(&name) {
            warn!("Ignoring activation of '{}': transition in flight", name);
            return;
        }
        info!("Activating deferred scene '{}'", name);
        self.spawn_load(cell, name, options.with_enable(true), None);
    }

    fn resolve(&self, scene: &SceneRef) -> Option<(String, Rc<RefCell<Scene>>)> {
        let inner = self.inner.borrow();
        let entry = match scene {
            SceneRef::Name(name) => inner.entries.iter().find(|entry| &entry.name == name),
            SceneRef::Index(index) => inner.entries.get(*index),
            SceneRef::Handle(cell) => inner
                .entries
                .iter()
                .find(|entry| Rc::ptr_eq(&entry.cell, cell)),
        }?;
        Some((entry.name.clone(), entry.cell.clone()))
    }

    fn collaborators(&self) -> (SceneContext, Scheduler) {
        let inner = self.inner.borrow();
        (inner.context.clone(), inner.scheduler.clone())
    }

    // Active scenes other than `except`, in registration order. Skips
    // scenes that already have a transition in flight.
    fn loaded_except(&self, except: &str) -> Vec<(String, Rc<RefCell<Scene>>)> {
        self.inner
            .borrow()
            .entries
            .iter()
            .filter(|entry| entry.name != except && entry_is_loaded(entry))
            .filter(|entry| !self.inner.borrow().pending.contains(&entry.name))
            .map(|entry| (entry.name.clone(), entry.cell.clone()))
            .collect()
    }

    fn is_pending(&self, name: &str) -> bool {
        self.inner.borrow().pending.contains(name)
    }

    fn claim(&self, name: &str) -> TransitionClaim {
        self.inner.borrow_mut().pending.insert(name.to_string());
        TransitionClaim {
            manager: self.downgrade(),
            name: name.to_string(),
        }
    }

    fn release_claim(&self, name: &str) {
        self.inner.borrow_mut().pending.remove(name);
    }

    fn finish_activation(&self, name: &str, options: LoadOptions) {
        let make_current = match options.mode {
            LoadMode::Single => true,
            LoadMode::Additive => options.active,
        };
        if make_current {
            self.inner.borrow_mut().current = Some(name.to_string());
        }
        info!("Scene '{}' active", name);
    }

    fn clear_current_if(&self, name: &str) {
        let mut inner = self.inner.borrow_mut();
        if inner.current.as_deref() == Some(name) {
            inner.current = None;
        }
    }

    fn clear_current(&self) {
        self.inner.borrow_mut().current = None;
    }
}

fn entry_is_loaded(entry: &SceneEntry) -> bool {
    // An unborrowable scene is mid-update, hence Ready.
    match entry.cell.try_borrow() {
        Ok(scene) => scene.state() >= SceneState::Loaded,
        Err(_) => true,
    }
}

fn root_of(cell: &Rc<RefCell<Scene>>) -> Option<crate::core::display::Container> {
    cell.try_borrow().ok()?.root().cloned()
}

//=== Transition Claim ====================================================

// Pending mark held for the lifetime of a transition. Dropping the claim
// releases the mark, so completion, failure, and cancellation all clear
// it without separate bookkeeping.
struct TransitionClaim {
    manager: WeakSceneManager,
    name: String,
}

impl Drop for TransitionClaim {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.release_claim(&self.name);
        }
    }
}

//=== Load Orchestration ==================================================

enum LoadOrchPhase {
    Load,
    Activate,
    UnloadOthers,
    Finish,
}

// Drives one load request end to end: the scene's own load sequence,
// then (single mode) the unloading of every other active scene, then the
// bookkeeping that makes the scene current. Nested sequences are entered
// via Step::Await, so the whole request is one scheduler task.
struct LoadOrchestration {
    manager: WeakSceneManager,
    scene: Rc<RefCell<Scene>>,
    name: String,
    options: LoadOptions,
    ctx: SceneContext,
    resolve: Option<PromiseSender<SceneLoader>>,
    queue: VecDeque<Rc<RefCell<Scene>>>,
    claims: Vec<TransitionClaim>,
    phase: LoadOrchPhase,
}

impl LoadOrchestration {
    fn settle(&mut self, token: SceneLoader) {
        if let Some(tx) = self.resolve.take() {
            let _ = tx.send(Ok(token));
        }
    }
}

impl StepSequence for LoadOrchestration {
    fn resume(&mut self) -> Result<Step> {
        loop {
            match self.phase {
                LoadOrchPhase::Load => {
                    self.phase = LoadOrchPhase::Activate;
                    return Ok(Step::Await(sequence::scene_load(
                        self.scene.clone(),
                        self.ctx.clone(),
                        self.options.enable,
                    )));
                }
                LoadOrchPhase::Activate => {
                    if !self.options.enable {
                        // Deferred load: hand the caller an activation
                        // token and stop here.
                        let weak = self.manager.clone();
                        let scene = self.scene.clone();
                        let name = self.name.clone();
                        let options = self.options;
                        self.settle(SceneLoader::pending(move || {
                            if let Some(manager) = weak.upgrade() {
                                manager.spawn_activation(scene, name, options);
                            }
                        }));
                        return Ok(Step::Return);
                    }
                    if self.options.mode == LoadMode::Single {
                        if let Some(manager) = self.manager.upgrade() {
                            for (other, cell) in manager.loaded_except(&self.name) {
                                self.claims.push(manager.claim(&other));
                                self.queue.push_back(cell);
                            }
                        }
                    }
                    self.phase = LoadOrchPhase::UnloadOthers;
                }
                LoadOrchPhase::UnloadOthers => {
                    let Some(other) = self.queue.pop_front() else {
                        self.phase = LoadOrchPhase::Finish;
                        continue;
                    };
                    return Ok(Step::Await(sequence::scene_unload(
                        other,
                        self.ctx.clone(),
                    )));
                }
                LoadOrchPhase::Finish => {
                    if let Some(manager) = self.manager.upgrade() {
                        manager.finish_activation(&self.name, self.options);
                    }
                    self.settle(SceneLoader::spent());
                    return Ok(Step::Return);
                }
            }
        }
    }
}

//=== Unload-All Orchestration ============================================

struct UnloadAllOrchestration {
    manager: WeakSceneManager,
    ctx: SceneContext,
    queue: VecDeque<Rc<RefCell<Scene>>>,
    resolve: Option<PromiseSender<()>>,
    _claims: Vec<TransitionClaim>,
}

impl StepSequence for UnloadAllOrchestration {
    fn resume(&mut self) -> Result<Step> {
        if let Some(scene) = self.queue.pop_front() {
            return Ok(Step::Await(sequence::scene_unload(
                scene,
                self.ctx.clone(),
            )));
        }
        if let Some(manager) = self.manager.upgrade() {
            manager.clear_current();
        }
        if let Some(tx) = self.resolve.take() {
            let _ = tx.send(Ok(()));
        }
        Ok(Step::Return)
    }
}

//=========================================================================
// Tests
//=========================================================================
