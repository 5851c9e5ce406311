//=========================================================================
// Prelude
//=========================================================================
//
// Convenience module that re-exports commonly used types and traits.
//
// Usage:
//   use stagecraft::prelude::*;
//
//=========================================================================

//=== Public API ==========================================================

// Runtime facade
pub use crate::runtime::{Runtime, RuntimeBuilder};

// Errors
pub use crate::error::{Error, Result};

// Coroutine system
pub use crate::core::coroutine::{
    wait_frame, wait_frames, wait_seconds, wait_until, wait_while, Coroutine, Promise, Scheduler,
    Step, StepSequence, TaskId, Timer,
};

// Scene system
pub use crate::core::scene::{
    LoadMode, LoadOptions, Scene, SceneContext, SceneDelegate, SceneLoader, SceneManager, SceneRef,
    SceneState, SceneView, WeakSceneManager,
};

// Display seams
pub use crate::core::display::{
    AssetLoader, Container, MemoryAssetLoader, RendererInfo, ResourceRecord, ResourceTable,
    Texture, TextureCache, Ticker, TickerSub,
};
