//! GPU pipeline state a batch is drawn with.

use canopy_core::{Rect, TextureId};

/// Fragment path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Samples the bound texture and multiplies by vertex colour.
    Textured,
    /// Vertex colour only.
    Colour,
}

/// Scissor rectangle in whole target pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScissorRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl ScissorRect {
    /// Smallest pixel rectangle covering `clip`, clamped at the origin.
    #[must_use]
    pub fn covering(clip: Rect) -> Self {
        let x = clip.x.max(0.0).floor();
        let y = clip.y.max(0.0).floor();
        let right = clip.right().max(0.0).ceil();
        let bottom = clip.bottom().max(0.0).ceil();
        Self {
            x: x as u32,
            y: y as u32,
            width: (right - x).max(0.0) as u32,
            height: (bottom - y).max(0.0) as u32,
        }
    }

    /// True when nothing passes the scissor.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Everything that forces a new draw call when it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineState {
    /// Fragment path.
    pub shader: ShaderKind,
    /// Bound texture.
    pub texture: TextureId,
    /// Scissor, if clipped.
    pub scissor: Option<ScissorRect>,
}

impl PipelineState {
    /// State for drawing `texture` under an optional world-space clip.
    #[must_use]
    pub fn for_texture(texture: TextureId, clip: Option<Rect>) -> Self {
        let shader = if texture == TextureId::WHITE {
            ShaderKind::Colour
        } else {
            ShaderKind::Textured
        };
        Self {
            shader,
            texture,
            scissor: clip.map(ScissorRect::covering),
        }
    }
}
