use std::sync::Arc;

use bitflags::bitflags;
use glam::{Affine2, Vec2};

use super::id::NodeId;
use crate::geometry::{Axes, Rect, Rgba};
use crate::invalidation::{Invalidation, InvalidationSource};
use crate::layout::{CellContext, CellKey, LayoutCell};

use super::compute;

bitflags! {
    /// What a node can do. Replaces a hierarchy of node kinds.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u8 {
        /// May own children.
        const HAS_CHILDREN = 1 << 0;
        /// Emits a primitive when drawn.
        const EMITS_PRIMITIVE = 1 << 1;
        /// Clips its children to its own bounds.
        const REQUIRES_MASKING = 1 << 2;
    }
}

/// Opaque texture handle resolved by the render device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureId(pub u32);

impl TextureId {
    /// The 1x1 white texture every device provides.
    pub const WHITE: Self = Self(0);
}

/// Primitive-specific draw payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Primitive {
    /// Draws nothing.
    #[default]
    None,
    /// A textured quad covering the node's draw size.
    Quad {
        /// Texture to sample.
        texture: TextureId,
        /// Texture coordinates of the quad.
        uv: Rect,
    },
    /// A triangle list in local space; UVs are derived from the draw size.
    Mesh {
        /// Texture to sample.
        texture: TextureId,
        /// Triangle vertices, three per triangle.
        triangles: Arc<[Vec2]>,
    },
}

impl Primitive {
    /// Untextured quad.
    #[must_use]
    pub const fn solid_quad() -> Self {
        Self::Quad {
            texture: TextureId::WHITE,
            uv: Rect::UNIT,
        }
    }

    /// Texture sampled by this primitive.
    #[must_use]
    pub fn texture(&self) -> Option<TextureId> {
        match self {
            Self::None => None,
            Self::Quad { texture, .. } | Self::Mesh { texture, .. } => Some(*texture),
        }
    }
}

/// The cells every node carries.
#[derive(Debug, Clone)]
pub(crate) struct NodeLayout {
    pub draw_size: LayoutCell<Vec2>,
    pub auto_size: LayoutCell<Vec2>,
    pub draw_info: LayoutCell<Affine2>,
    pub draw_colour: LayoutCell<Rgba>,
    pub presence: LayoutCell<bool>,
    pub required_size: LayoutCell<Vec2>,
    pub clip: LayoutCell<Option<Rect>>,
    pub custom: Vec<LayoutCell<f32>>,
}

impl NodeLayout {
    fn new() -> Self {
        let inherited = InvalidationSource::SELF | InvalidationSource::PARENT;
        Self {
            draw_size: LayoutCell::new(Invalidation::DRAW_SIZE, inherited)
                .with_updater(compute::draw_size),
            auto_size: LayoutCell::new(
                Invalidation::REQUIRED_PARENT_SIZE_TO_FIT,
                InvalidationSource::CHILD | InvalidationSource::SELF,
            )
            .with_predicate(compute::auto_size_applies)
            .with_updater(compute::auto_size),
            draw_info: LayoutCell::new(Invalidation::TRANSFORM, inherited)
                .with_updater(compute::draw_info),
            draw_colour: LayoutCell::new(Invalidation::COLOUR, inherited)
                .with_updater(compute::draw_colour),
            presence: LayoutCell::new(Invalidation::PRESENCE, inherited)
                .with_updater(compute::presence),
            required_size: LayoutCell::new(
                Invalidation::AFFECTS_PARENT_SIZE,
                InvalidationSource::SELF,
            )
            .notifying_parent(Invalidation::REQUIRED_PARENT_SIZE_TO_FIT)
            .with_updater(compute::required_parent_size_to_fit),
            clip: LayoutCell::new(
                Invalidation::TRANSFORM | Invalidation::CLIP,
                InvalidationSource::PARENT,
            )
            .with_updater(compute::screen_space_clip),
            custom: Vec::new(),
        }
    }

    /// Bit `i` set when built-in cell `i` accepts the event.
    pub fn accepting_builtins(&self, ctx: &CellContext<'_>) -> u8 {
        let flags = [
            self.draw_size.accepts(ctx),
            self.auto_size.accepts(ctx),
            self.draw_info.accepts(ctx),
            self.draw_colour.accepts(ctx),
            self.presence.accepts(ctx),
            self.required_size.accepts(ctx),
            self.clip.accepts(ctx),
        ];
        flags
            .iter()
            .enumerate()
            .fold(0, |bits, (i, &on)| if on { bits | (1 << i) } else { bits })
    }

    /// Bit `i` set when custom cell `i` accepts the event.
    pub fn accepting_custom(&self, ctx: &CellContext<'_>) -> u64 {
        self.custom
            .iter()
            .enumerate()
            .fold(0, |bits, (i, cell)| if cell.accepts(ctx) { bits | (1 << i) } else { bits })
    }

    /// Invalidates the selected built-ins, returning those that were valid.
    pub fn invalidate_builtins(&mut self, bits: u8) -> u8 {
        let mut fresh = 0;
        for (i, key) in CellKey::BUILTIN.iter().enumerate() {
            if bits & (1 << i) != 0 && self.invalidate_key(*key) {
                fresh |= 1 << i;
            }
        }
        fresh
    }

    /// Invalidates the selected custom cells, returning those that were valid.
    pub fn invalidate_custom(&mut self, bits: u64) -> u64 {
        let mut fresh = 0;
        for (i, cell) in self.custom.iter_mut().enumerate() {
            if bits & (1 << i) != 0 && cell.invalidate() {
                fresh |= 1 << i;
            }
        }
        fresh
    }

    fn invalidate_key(&mut self, key: CellKey) -> bool {
        match key {
            CellKey::DrawSize => self.draw_size.invalidate(),
            CellKey::AutoSize => self.auto_size.invalidate(),
            CellKey::DrawInfo => self.draw_info.invalidate(),
            CellKey::DrawColour => self.draw_colour.invalidate(),
            CellKey::Presence => self.presence.invalidate(),
            CellKey::RequiredParentSizeToFit => self.required_size.invalidate(),
            CellKey::ScreenSpaceClip => self.clip.invalidate(),
            CellKey::Custom(i) => self.custom.get_mut(i).is_some_and(LayoutCell::invalidate),
        }
    }

    /// Validity of one cell; `None` for an unknown custom cell.
    pub fn is_valid(&self, key: CellKey) -> Option<bool> {
        Some(match key {
            CellKey::DrawSize => self.draw_size.is_valid(),
            CellKey::AutoSize => self.auto_size.is_valid(),
            CellKey::DrawInfo => self.draw_info.is_valid(),
            CellKey::DrawColour => self.draw_colour.is_valid(),
            CellKey::Presence => self.presence.is_valid(),
            CellKey::RequiredParentSizeToFit => self.required_size.is_valid(),
            CellKey::ScreenSpaceClip => self.clip.is_valid(),
            CellKey::Custom(i) => return self.custom.get(i).map(LayoutCell::is_valid),
        })
    }
}

/// Maps a value type to the cells that hold it.
pub(crate) trait CellSlot: Copy + Default {
    fn slot(layout: &mut NodeLayout, key: CellKey) -> Option<&mut LayoutCell<Self>>;
}

impl CellSlot for Vec2 {
    fn slot(layout: &mut NodeLayout, key: CellKey) -> Option<&mut LayoutCell<Self>> {
        match key {
            CellKey::DrawSize => Some(&mut layout.draw_size),
            CellKey::AutoSize => Some(&mut layout.auto_size),
            CellKey::RequiredParentSizeToFit => Some(&mut layout.required_size),
            _ => None,
        }
    }
}

impl CellSlot for Affine2 {
    fn slot(layout: &mut NodeLayout, key: CellKey) -> Option<&mut LayoutCell<Self>> {
        matches!(key, CellKey::DrawInfo).then_some(&mut layout.draw_info)
    }
}

impl CellSlot for Rgba {
    fn slot(layout: &mut NodeLayout, key: CellKey) -> Option<&mut LayoutCell<Self>> {
        matches!(key, CellKey::DrawColour).then_some(&mut layout.draw_colour)
    }
}

impl CellSlot for bool {
    fn slot(layout: &mut NodeLayout, key: CellKey) -> Option<&mut LayoutCell<Self>> {
        matches!(key, CellKey::Presence).then_some(&mut layout.presence)
    }
}

impl CellSlot for Option<Rect> {
    fn slot(layout: &mut NodeLayout, key: CellKey) -> Option<&mut LayoutCell<Self>> {
        matches!(key, CellKey::ScreenSpaceClip).then_some(&mut layout.clip)
    }
}

impl CellSlot for f32 {
    fn slot(layout: &mut NodeLayout, key: CellKey) -> Option<&mut LayoutCell<Self>> {
        match key {
            CellKey::Custom(i) => layout.custom.get_mut(i),
            _ => None,
        }
    }
}

/// A scene node.
///
/// Mutated only through [`super::SceneTree`] setters so every change
/// invalidates with the right mask.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) capabilities: Capabilities,

    pub(crate) position: Vec2,
    pub(crate) size: Vec2,
    pub(crate) scale: Vec2,
    pub(crate) rotation: f32,
    pub(crate) origin: Vec2,
    pub(crate) colour: Rgba,
    pub(crate) alpha: f32,
    pub(crate) hidden: bool,

    pub(crate) relative_size_axes: Axes,
    pub(crate) relative_position_axes: Axes,
    pub(crate) auto_size_axes: Axes,
    pub(crate) bypass_auto_size_axes: Axes,

    pub(crate) masking: bool,
    pub(crate) primitive: Primitive,

    pub(crate) layout: NodeLayout,
    /// Bits received from children and not yet revalidated.
    pub(crate) child_invalidation: Invalidation,
    pub(crate) draw_node_valid: bool,
    pub(crate) invalidation_id: u64,
}

impl Node {
    /// A detached node with default properties and all cells invalid.
    #[must_use]
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            capabilities,
            position: Vec2::ZERO,
            size: Vec2::ZERO,
            scale: Vec2::ONE,
            rotation: 0.0,
            origin: Vec2::ZERO,
            colour: Rgba::WHITE,
            alpha: 1.0,
            hidden: false,
            relative_size_axes: Axes::empty(),
            relative_position_axes: Axes::empty(),
            auto_size_axes: Axes::empty(),
            bypass_auto_size_axes: Axes::empty(),
            masking: capabilities.contains(Capabilities::REQUIRES_MASKING),
            primitive: Primitive::None,
            layout: NodeLayout::new(),
            child_invalidation: Invalidation::empty(),
            draw_node_valid: false,
            invalidation_id: 0,
        }
    }

    /// Parent, if attached.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in draw order.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Capability flags.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Position in parent space; fractions of the parent size on relative axes.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Explicit size; fractions of the parent size on relative axes.
    #[must_use]
    pub fn size(&self) -> Vec2 {
        self.size
    }

    /// Scale.
    #[must_use]
    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    /// Rotation in radians.
    #[must_use]
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Pivot in local pixels.
    #[must_use]
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    /// Own colour, before alpha and ancestors.
    #[must_use]
    pub fn colour(&self) -> Rgba {
        self.colour
    }

    /// Own alpha.
    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Explicitly hidden.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Axes sized as a fraction of the parent.
    #[must_use]
    pub fn relative_size_axes(&self) -> Axes {
        self.relative_size_axes
    }

    /// Axes positioned as a fraction of the parent.
    #[must_use]
    pub fn relative_position_axes(&self) -> Axes {
        self.relative_position_axes
    }

    /// Axes sized to fit the children.
    #[must_use]
    pub fn auto_size_axes(&self) -> Axes {
        self.auto_size_axes
    }

    /// Axes on which an auto-sizing parent ignores this node.
    #[must_use]
    pub fn bypass_auto_size_axes(&self) -> Axes {
        self.bypass_auto_size_axes
    }

    /// Clips children to own bounds.
    #[must_use]
    pub fn is_masking(&self) -> bool {
        self.masking
    }

    /// Draw payload.
    #[must_use]
    pub fn primitive(&self) -> &Primitive {
        &self.primitive
    }

    /// Present on its own, ignoring ancestors.
    #[must_use]
    pub fn is_locally_present(&self) -> bool {
        !self.hidden && self.alpha > 0.0
    }

    /// Transform from local space into parent space.
    #[must_use]
    pub fn local_transform(&self, position: Vec2) -> Affine2 {
        Affine2::from_scale_angle_translation(self.scale, self.rotation, position)
            * Affine2::from_translation(-self.origin)
    }
}
