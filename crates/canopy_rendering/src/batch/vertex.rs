//! Vertex format uploaded by the batcher.

use bytemuck::{Pod, Zeroable};
use canopy_core::Rgba;
use glam::Vec2;

/// Position, texture coordinate and colour, all in world space.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TexturedVertex {
    /// World position [x, y]
    pub position: [f32; 2],
    /// Texture coordinate [u, v]
    pub uv: [f32; 2],
    /// Linear RGBA, alpha not premultiplied
    pub colour: [f32; 4],
}

impl TexturedVertex {
    /// Size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Vertex buffer layout for WGPU
    pub const ATTRIBS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x2,  // position
        1 => Float32x2,  // uv
        2 => Float32x4,  // colour
    ];

    /// Builds a vertex.
    #[inline]
    #[must_use]
    pub fn new(position: Vec2, uv: Vec2, colour: Rgba) -> Self {
        Self {
            position: position.to_array(),
            uv: uv.to_array(),
            colour: colour.to_array(),
        }
    }

    /// Vertex buffer layout descriptor
    #[must_use]
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: Self::SIZE as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_tightly_packed() {
        assert_eq!(TexturedVertex::SIZE, 32);
        assert_eq!(TexturedVertex::desc().array_stride, 32);
        assert_eq!(TexturedVertex::ATTRIBS[2].offset, 16);
    }
}
