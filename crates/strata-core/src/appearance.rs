//! Per-object visual overrides.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::handle::ObjectId;
use crate::index_set::IndexSet;

/// Outline colors selectable per object.
///
/// The discriminant is stored in three bits of the packed style record and
/// indexes the outline palette bound by the composite pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum OutlineColor {
    #[default]
    NoOutline = 0,
    White = 1,
    Black = 2,
    Cyan = 3,
    Blue = 4,
    Green = 5,
    Red = 6,
    Orange = 7,
}

impl OutlineColor {
    /// All outline colors in palette order.
    pub const ALL: [OutlineColor; 8] = [
        OutlineColor::NoOutline,
        OutlineColor::White,
        OutlineColor::Black,
        OutlineColor::Cyan,
        OutlineColor::Blue,
        OutlineColor::Green,
        OutlineColor::Red,
        OutlineColor::Orange,
    ];

    /// RGB value used when drawing the outline.
    pub fn rgb(self) -> Vec3 {
        match self {
            OutlineColor::NoOutline | OutlineColor::Black => Vec3::ZERO,
            OutlineColor::White => Vec3::ONE,
            OutlineColor::Cyan => Vec3::new(0.0, 1.0, 1.0),
            OutlineColor::Blue => Vec3::new(0.0, 0.0, 1.0),
            OutlineColor::Green => Vec3::new(0.0, 1.0, 0.0),
            OutlineColor::Red => Vec3::new(1.0, 0.0, 0.0),
            OutlineColor::Orange => Vec3::new(1.0, 0.647, 0.0),
        }
    }

    /// Builds the palette as RGBA8 texels, one per outline color.
    pub fn palette_rgba8() -> [[u8; 4]; 8] {
        let mut palette = [[0u8; 4]; 8];
        for (texel, color) in palette.iter_mut().zip(Self::ALL) {
            let rgb = color.rgb();
            // Truncated, not rounded.
            *texel = [
                (rgb.x * 255.0).floor() as u8,
                (rgb.y * 255.0).floor() as u8,
                (rgb.z * 255.0).floor() as u8,
                255,
            ];
        }
        palette
    }
}

/// A sparse style: only the fields that are `Some` override the style below.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeAppearance {
    /// Color override in `[0, 1]` per channel.
    pub color: Option<Vec3>,
    /// Whether the object is drawn at all.
    pub visible: Option<bool>,
    /// Draw the object on top of all other geometry.
    pub render_in_front: Option<bool>,
    /// Draw the object translucent and de-emphasized.
    pub render_ghosted: Option<bool>,
    /// Outline drawn around the object.
    pub outline_color: Option<OutlineColor>,
}

impl NodeAppearance {
    /// Fully specified default: visible, regular, no color or outline.
    pub const DEFAULT: NodeAppearance = NodeAppearance {
        color: None,
        visible: Some(true),
        render_in_front: Some(false),
        render_ghosted: Some(false),
        outline_color: Some(OutlineColor::NoOutline),
    };

    /// Hidden objects.
    pub const HIDDEN: NodeAppearance = NodeAppearance {
        color: None,
        visible: Some(false),
        render_in_front: None,
        render_ghosted: None,
        outline_color: None,
    };

    /// Outlined in white.
    pub const OUTLINED: NodeAppearance = NodeAppearance {
        color: None,
        visible: None,
        render_in_front: None,
        render_ghosted: None,
        outline_color: Some(OutlineColor::White),
    };

    /// Drawn on top of other geometry.
    pub const IN_FRONT: NodeAppearance = NodeAppearance {
        color: None,
        visible: None,
        render_in_front: Some(true),
        render_ghosted: Some(false),
        outline_color: None,
    };

    /// Drawn ghosted.
    pub const GHOSTED: NodeAppearance = NodeAppearance {
        color: None,
        visible: None,
        render_in_front: Some(false),
        render_ghosted: Some(true),
        outline_color: None,
    };

    /// Highlighted: cyan, outlined and in front.
    pub const HIGHLIGHTED: NodeAppearance = NodeAppearance {
        color: Some(Vec3::new(0.0, 1.0, 1.0)),
        visible: None,
        render_in_front: Some(true),
        render_ghosted: None,
        outline_color: Some(OutlineColor::White),
    };

    /// Returns `base` with every field specified by `overlay` replaced.
    #[must_use]
    pub fn merge(base: &NodeAppearance, overlay: &NodeAppearance) -> NodeAppearance {
        NodeAppearance {
            color: overlay.color.or(base.color),
            visible: overlay.visible.or(base.visible),
            render_in_front: overlay.render_in_front.or(base.render_in_front),
            render_ghosted: overlay.render_ghosted.or(base.render_ghosted),
            outline_color: overlay.outline_color.or(base.outline_color),
        }
    }

    /// Sets the color override.
    #[must_use]
    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = Some(color);
        self
    }

    /// Sets the visibility.
    #[must_use]
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }

    /// Sets the in-front flag.
    #[must_use]
    pub fn with_in_front(mut self, in_front: bool) -> Self {
        self.render_in_front = Some(in_front);
        self
    }

    /// Sets the ghosted flag.
    #[must_use]
    pub fn with_ghosted(mut self, ghosted: bool) -> Self {
        self.render_ghosted = Some(ghosted);
        self
    }

    /// Sets the outline color.
    #[must_use]
    pub fn with_outline(mut self, outline: OutlineColor) -> Self {
        self.outline_color = Some(outline);
        self
    }
}

/// Identity of an [`ObjectSet`]; assignments are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectSetId(u64);

static NEXT_OBJECT_SET_ID: AtomicU64 = AtomicU64::new(1);

/// A collection of objects that a style is assigned to.
///
/// Cloning keeps the identity, so a clone with edited contents can be
/// re-assigned to replace the previous assignment in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSet {
    id: ObjectSetId,
    objects: IndexSet,
}

impl ObjectSet {
    /// Creates a set with a fresh identity.
    pub fn new(objects: IndexSet) -> Self {
        Self {
            id: ObjectSetId(NEXT_OBJECT_SET_ID.fetch_add(1, Ordering::Relaxed)),
            objects,
        }
    }

    /// Creates a set covering `range`.
    pub fn from_range(range: std::ops::Range<ObjectId>) -> Self {
        Self::new(IndexSet::from_range(range))
    }

    /// Identity used to key assignments.
    pub fn id(&self) -> ObjectSetId {
        self.id
    }

    /// The objects in the set.
    pub fn objects(&self) -> &IndexSet {
        &self.objects
    }

    /// Mutable access to the objects; identity is unchanged.
    pub fn objects_mut(&mut self) -> &mut IndexSet {
        &mut self.objects
    }
}
