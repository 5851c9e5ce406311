//=========================================================================
// Scene Loader Token
//=========================================================================
//
// Handle resolved by SceneManager::load. For a deferred load (enable:
// false) it carries the activation continuation; calling `enable()`
// later finishes what load() started: enter the scene and, in single
// mode, unload whatever else is active at that moment.
//
//=========================================================================

//=== External Dependencies ===============================================

use log::debug;

//=== Scene Loader ========================================================

type ActivationFn = Box<dyn FnOnce()>;

/// Activation token for a loaded scene.
///
/// Loads with `enable: true` resolve an already-spent token; deferred
/// loads resolve a pending one. `enable()` consumes the continuation,
/// so calling it again is a no-op.
pub struct SceneLoader {
    activation: Option<ActivationFn>,
}

impl SceneLoader {
    /// Token for a scene activated during the load itself.
    pub(crate) fn spent() -> Self {
        Self { activation: None }
    }

    /// Token carrying a deferred activation.
    pub(crate) fn pending(activation: impl FnOnce() + 'static) -> Self {
        Self {
            activation: Some(Box::new(activation)),
        }
    }

    /// True while a deferred activation has not been triggered yet.
    pub fn is_pending(&self) -> bool {
        self.activation.is_some()
    }

    /// Triggers the deferred activation. Does nothing for a spent token
    /// or on repeated calls.
    pub fn enable(&mut self) {
        match self.activation.take() {
            Some(activation) => activation(),
            None => debug!("SceneLoader enable ignored, activation already spent"),
        }
    }
}

impl std::fmt::Debug for SceneLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneLoader")
            .field("pending", &self.is_pending())
            .finish()
    }
}

//=========================================================================
// Tests
//=========================================================================
