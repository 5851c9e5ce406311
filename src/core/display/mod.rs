//=========================================================================
// Display Collaborators
//=========================================================================
//
// Narrow interfaces to the rendering engine the scene system composes
// against, plus in-memory implementations.
//
// The renderer itself is an external collaborator: nothing here rasters
// a pixel. Scenes only need a display node to own (Container), a
// per-frame clock to subscribe updates to (Ticker), a keyed texture
// cache to release into (TextureCache), and an asset loader to declare
// requirements against (AssetLoader). A renderer binding implements the
// same seams against its own primitives.
//
//=========================================================================

//=== Module Declarations =================================================

mod assets;
mod container;
mod texture;
mod ticker;

//=== Public API ==========================================================

pub use assets::{AssetLoader, MemoryAssetLoader, ResourceRecord, ResourceTable};
pub use container::Container;
pub use texture::{Texture, TextureCache};
pub use ticker::{Ticker, TickerSub};

//=== Renderer Info =======================================================

/// Logical dimensions of the render surface, used to position scene
/// roots on enter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererInfo {
    pub width: f32,
    pub height: f32,
}

impl RendererInfo {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Center of the surface.
    pub fn center(&self) -> (f32, f32) {
        (self.width / 2.0, self.height / 2.0)
    }
}
