//=========================================================================
// Errors
//=========================================================================
//
// Crate-wide error taxonomy and Result alias.
//
// Coroutine failures are local to their task: the scheduler delivers them
// through the task's hooks and never lets them escape the tick loop.
// Scene-manager failures reject the returned promise and leave manager
// and scene state untouched.
//
// `Cancelled` marks work abandoned mid-flight. The scheduler never
// constructs it: a stopped task's sequence is simply dropped and only
// `finally` cleanup runs. Step sequences return it to bail out of a
// transition, and load-error wrapping passes it through untouched.
//
//=========================================================================

//=== External Dependencies ===============================================

use thiserror::Error;

//=== Result Alias ========================================================

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

//=== Error ===============================================================

/// Errors raised by the coroutine scheduler and the scene system.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The given value does not produce a step sequence (its sequence was
    /// already consumed or released).
    #[error("not a valid step sequence")]
    InvalidSequence,

    /// Operation on a coroutine that already completed or was cancelled.
    #[error("coroutine already disposed")]
    Disposed,

    /// Work was abandoned before completion.
    ///
    /// Returned by step sequences that bail out of a transition. A stopped
    /// task never observes this value: its sequence is dropped and only
    /// `finally` cleanup runs.
    #[error("coroutine cancelled")]
    Cancelled,

    /// Scene reference could not be resolved or the scene is not registered.
    #[error("scene not found: {0}")]
    NotFound(String),

    /// Operation requires the scene to be at state LOADED or above.
    #[error("scene not loaded: {0}")]
    NotLoaded(String),

    /// Scene is already at state LOADED or above (or a transition for it
    /// is still pending).
    #[error("scene already loaded: {0}")]
    AlreadyLoaded(String),

    /// Load mode discriminant outside the recognized set.
    #[error("invalid scene load mode: {0}")]
    InvalidMode(u8),

    /// Failure inside a scene's setup/init/enter lifecycle step.
    #[error("scene '{scene}' failed to load: {message}")]
    Load { scene: String, message: String },
}

impl Error {
    /// Wraps a lifecycle-step failure as a `Load` error for the named
    /// scene. `Cancelled` passes through untouched so cancellation is
    /// never misreported as a load failure.
    pub(crate) fn into_load(self, scene: &str) -> Error {
        match self {
            Error::Cancelled => Error::Cancelled,
            Error::Load { .. } => self,
            other => Error::Load {
                scene: scene.to_string(),
                message: other.to_string(),
            },
        }
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_wrap_preserves_cancellation() {
        let err = Error::Cancelled.into_load("title");
        assert_eq!(err, Error::Cancelled);
    }

    #[test]
    fn load_wrap_does_not_double_wrap() {
        let err = Error::Load {
            scene: "title".into(),
            message: "missing atlas".into(),
        };
        let wrapped = err.clone().into_load("other");
        assert_eq!(wrapped, err);
    }

    #[test]
    fn load_wrap_captures_scene_name() {
        let err = Error::NotFound("x".into()).into_load("title");
        match err {
            Error::Load { scene, .. } => assert_eq!(scene, "title"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
