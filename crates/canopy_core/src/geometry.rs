//! Geometry and colour primitives shared by the tree and the draw pass.

use bitflags::bitflags;
use glam::{Affine2, Vec2};

bitflags! {
    /// A set of 2D axes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Axes: u8 {
        /// Horizontal.
        const X = 1 << 0;
        /// Vertical.
        const Y = 1 << 1;
        /// Both axes.
        const BOTH = Self::X.bits() | Self::Y.bits();
    }
}

impl Axes {
    /// Picks `on` for axes in the set and `off` elsewhere.
    #[inline]
    #[must_use]
    pub fn select(self, on: Vec2, off: Vec2) -> Vec2 {
        Vec2::new(
            if self.contains(Self::X) { on.x } else { off.x },
            if self.contains(Self::Y) { on.y } else { off.y },
        )
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

impl Rect {
    /// A zero-sized rect at the origin.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// The unit square, used as the full texture range.
    pub const UNIT: Self = Self::new(0.0, 0.0, 1.0, 1.0);

    /// Creates a new rectangle.
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle spanning `size` from the origin.
    #[must_use]
    pub fn from_size(size: Vec2) -> Self {
        Self::new(0.0, 0.0, size.x, size.y)
    }

    /// Returns the right edge.
    #[must_use]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Returns the bottom edge.
    #[must_use]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Top-left corner.
    #[must_use]
    pub fn min(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Bottom-right corner.
    #[must_use]
    pub fn max(&self) -> Vec2 {
        Vec2::new(self.right(), self.bottom())
    }

    /// True when the rectangle covers no area.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Returns true if the point is inside the rectangle.
    #[must_use]
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    /// Returns true if two rectangles intersect.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Overlap of two rectangles. Disjoint inputs give an empty rect at the
    /// nearer corner, so clips stay well-defined.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Self::new(x, y, (right - x).max(0.0), (bottom - y).max(0.0))
    }

    /// Axis-aligned bounds of this rectangle under `transform`.
    #[must_use]
    pub fn transformed_bounds(&self, transform: &Affine2) -> Self {
        let corners = [
            transform.transform_point2(self.min()),
            transform.transform_point2(Vec2::new(self.right(), self.y)),
            transform.transform_point2(Vec2::new(self.x, self.bottom())),
            transform.transform_point2(self.max()),
        ];
        let min = corners.iter().copied().fold(Vec2::splat(f32::INFINITY), Vec2::min);
        let max = corners
            .iter()
            .copied()
            .fold(Vec2::splat(f32::NEG_INFINITY), Vec2::max);
        Self::new(min.x, min.y, max.x - min.x, max.y - min.y)
    }
}

/// Linear RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    /// Red component (0-1).
    pub r: f32,
    /// Green component (0-1).
    pub g: f32,
    /// Blue component (0-1).
    pub b: f32,
    /// Alpha component (0-1).
    pub a: f32,
}

impl Rgba {
    /// Transparent black.
    pub const TRANSPARENT: Self = Self::rgba(0.0, 0.0, 0.0, 0.0);
    /// Solid black.
    pub const BLACK: Self = Self::rgba(0.0, 0.0, 0.0, 1.0);
    /// Solid white.
    pub const WHITE: Self = Self::rgba(1.0, 1.0, 1.0, 1.0);

    /// Creates a colour from RGBA values (0-1).
    #[must_use]
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Creates a colour from RGB values (0-1) with full alpha.
    #[must_use]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    /// Creates a colour from 0xRRGGBBAA.
    #[must_use]
    pub fn hex(hex: u32) -> Self {
        let channel = |shift: u32| f32::from(((hex >> shift) & 0xFF) as u8) / 255.0;
        Self::rgba(channel(24), channel(16), channel(8), channel(0))
    }

    /// Returns a new colour with different alpha.
    #[must_use]
    pub const fn with_alpha(self, a: f32) -> Self {
        Self::rgba(self.r, self.g, self.b, a)
    }

    /// Component-wise product; how colours combine down the tree.
    #[must_use]
    pub fn multiply(self, other: Self) -> Self {
        Self::rgba(
            self.r * other.r,
            self.g * other.g,
            self.b * other.b,
            self.a * other.a,
        )
    }

    /// Converts to array format.
    #[must_use]
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::WHITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disjoint_intersection_is_empty() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 5.0, 5.0);
        assert!(!a.intersects(&b));
        assert!(a.intersection(&b).is_empty());
    }

    #[test]
    fn test_overlapping_intersection() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 2.0, 10.0, 4.0);
        assert_eq!(a.intersection(&b), Rect::new(5.0, 2.0, 5.0, 4.0));
    }

    #[test]
    fn test_transformed_bounds_under_rotation() {
        let rect = Rect::from_size(Vec2::new(2.0, 2.0));
        let t = Affine2::from_angle(std::f32::consts::FRAC_PI_2);
        let bounds = rect.transformed_bounds(&t);
        assert!((bounds.x + 2.0).abs() < 1e-5);
        assert!((bounds.width - 2.0).abs() < 1e-5);
        assert!((bounds.height - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_axes_select() {
        let on = Vec2::new(1.0, 2.0);
        let off = Vec2::new(-1.0, -2.0);
        assert_eq!(Axes::X.select(on, off), Vec2::new(1.0, -2.0));
        assert_eq!(Axes::BOTH.select(on, off), on);
        assert_eq!(Axes::empty().select(on, off), off);
    }

    #[test]
    fn test_colour_multiply_and_hex() {
        let half = Rgba::rgba(0.5, 0.5, 0.5, 0.5);
        assert_eq!(Rgba::WHITE.multiply(half), half);
        assert_eq!(Rgba::hex(0xFF00_00FF), Rgba::rgb(1.0, 0.0, 0.0));
    }
}
