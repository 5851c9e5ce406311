//=========================================================================
// Stagecraft — Library Root
//
// This crate defines the public API surface of the Stagecraft runtime:
// cooperative coroutine scheduling and scene lifecycle orchestration
// for frame-driven 2D applications.
//
// Responsibilities:
// - Expose the high-level runtime facade (`Runtime`)
// - Expose the core subsystems (coroutines, scenes, display seams) for
//   applications that compose them directly
// - Keep one logical clock: the host drives `Runtime::frame` and every
//   transition, wait, and update advances as a consequence
//
// Typical usage:
// ```
// use stagecraft::prelude::*;
//
// let runtime = RuntimeBuilder::new().build();
// runtime.scenes().add(Scene::new("menu", ()));
// let promise = runtime.scenes().load("menu", LoadOptions::default());
//
// while promise.try_take().is_none() {
//     runtime.frame(0.016);
// }
// ```
//
//=========================================================================

//--- Public Modules ------------------------------------------------------
//
// `core` contains the runtime subsystems (coroutine scheduler, scene
// system, display seams). It is exposed publicly for composition, but
// normal application code will mostly use the top-level `Runtime`
// facade.
//
pub mod core;
pub mod prelude;

//--- Internal Modules ----------------------------------------------------

mod error;
mod runtime;

//--- Public Exports ------------------------------------------------------

pub use error::{Error, Result};
pub use runtime::{Runtime, RuntimeBuilder};
