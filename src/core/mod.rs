//=========================================================================
// Core Subsystems
//
// The runtime subsystems behind the `Runtime` facade.
//
// Responsibilities:
// - `coroutine`: cooperative scheduler, tasks, promises, wait helpers
// - `scene`: scene lifecycle state machine, registry, and transitions
// - `display`: narrow seams to the rendering engine (stage, ticker,
//   textures, asset loading) with in-memory implementations
//
// Notes:
// Everything here shares one logical clock. Subsystems are handles over
// Rc-shared state and are single-threaded by design: there is no
// parallel execution, only one external frame pulse fanned out in a
// fixed order.
//
//=========================================================================

pub mod coroutine;
pub mod display;
pub mod scene;
