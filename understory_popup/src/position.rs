// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Anchored placement: the boundary to the position engine and a default engine.
//!
//! A [`PositionEngine`] binds a content element to an anchor element. The
//! returned [`PositionBinding`] is refreshed with [`PositionBinding::update`]
//! whenever either element may have moved or resized, and released with
//! [`PositionBinding::destroy`] when the popup closes.
//!
//! [`AnchoredPositioner`] is the default engine. It puts the content on the
//! requested [`Side`] of the anchor with the requested [`Align`]ment, flips to
//! the opposite side if the preferred side overflows the [`Boundary`] while the
//! opposite one fits, and finally shifts the content back inside the boundary.
//!
//! ```
//! use kurbo::{Rect, Size};
//! use understory_popup::position::{compute_position, Placement};
//!
//! let anchor = Rect::new(10.0, 10.0, 50.0, 30.0);
//! let viewport = Rect::new(0.0, 0.0, 200.0, 200.0);
//!
//! let (rect, placement) =
//!     compute_position(anchor, Size::new(60.0, 40.0), Placement::BottomStart, Some(viewport), 0.0);
//! assert_eq!(placement, Placement::BottomStart);
//! assert_eq!(rect, Rect::new(10.0, 30.0, 70.0, 70.0));
//! ```

use alloc::boxed::Box;
use core::fmt;

use kurbo::{Rect, Size};

use crate::document::{Document, ElementFlags, NodeId};

/// Side of the anchor the content is placed on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// Above the anchor.
    Top,
    /// Below the anchor.
    Bottom,
    /// Left of the anchor.
    Left,
    /// Right of the anchor.
    Right,
}

impl Side {
    /// The side across the anchor.
    pub const fn opposite(self) -> Self {
        match self {
            Self::Top => Self::Bottom,
            Self::Bottom => Self::Top,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Alignment along the anchor edge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Align {
    /// Align leading edges.
    Start,
    /// Center on the anchor.
    Center,
    /// Align trailing edges.
    End,
}

/// Requested anchor side and alignment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Placement {
    /// Above, left edges aligned.
    TopStart,
    /// Above, centered.
    Top,
    /// Above, right edges aligned.
    TopEnd,
    /// Below, left edges aligned.
    BottomStart,
    /// Below, centered.
    Bottom,
    /// Below, right edges aligned.
    BottomEnd,
    /// Left, top edges aligned.
    LeftStart,
    /// Left, centered.
    Left,
    /// Left, bottom edges aligned.
    LeftEnd,
    /// Right, top edges aligned.
    RightStart,
    /// Right, centered.
    Right,
    /// Right, bottom edges aligned.
    RightEnd,
}

impl Placement {
    /// Every placement, in side-major order.
    pub const ALL: [Self; 12] = [
        Self::TopStart,
        Self::Top,
        Self::TopEnd,
        Self::BottomStart,
        Self::Bottom,
        Self::BottomEnd,
        Self::LeftStart,
        Self::Left,
        Self::LeftEnd,
        Self::RightStart,
        Self::Right,
        Self::RightEnd,
    ];

    /// Compose a placement from a side and an alignment.
    pub const fn new(side: Side, align: Align) -> Self {
        match (side, align) {
            (Side::Top, Align::Start) => Self::TopStart,
            (Side::Top, Align::Center) => Self::Top,
            (Side::Top, Align::End) => Self::TopEnd,
            (Side::Bottom, Align::Start) => Self::BottomStart,
            (Side::Bottom, Align::Center) => Self::Bottom,
            (Side::Bottom, Align::End) => Self::BottomEnd,
            (Side::Left, Align::Start) => Self::LeftStart,
            (Side::Left, Align::Center) => Self::Left,
            (Side::Left, Align::End) => Self::LeftEnd,
            (Side::Right, Align::Start) => Self::RightStart,
            (Side::Right, Align::Center) => Self::Right,
            (Side::Right, Align::End) => Self::RightEnd,
        }
    }

    /// Side component.
    pub const fn side(self) -> Side {
        match self {
            Self::TopStart | Self::Top | Self::TopEnd => Side::Top,
            Self::BottomStart | Self::Bottom | Self::BottomEnd => Side::Bottom,
            Self::LeftStart | Self::Left | Self::LeftEnd => Side::Left,
            Self::RightStart | Self::Right | Self::RightEnd => Side::Right,
        }
    }

    /// Alignment component.
    pub const fn align(self) -> Align {
        match self {
            Self::TopStart | Self::BottomStart | Self::LeftStart | Self::RightStart => Align::Start,
            Self::Top | Self::Bottom | Self::Left | Self::Right => Align::Center,
            Self::TopEnd | Self::BottomEnd | Self::LeftEnd | Self::RightEnd => Align::End,
        }
    }

    /// Same alignment on the opposite side.
    pub const fn flipped(self) -> Self {
        Self::new(self.side().opposite(), self.align())
    }
}

/// Region the content must stay inside.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Boundary {
    /// The document viewport.
    #[default]
    Viewport,
    /// The nearest scroll container around the anchor, else the viewport.
    ScrollContainer,
    /// The world bounds of a specific element.
    Element(NodeId),
    /// Unconstrained.
    None,
}

/// Inputs for [`PositionEngine::create`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PositionOptions {
    /// Preferred side and alignment.
    pub placement: Placement,
    /// Collision boundary.
    pub boundary: Boundary,
}

/// Engine that binds content elements to anchors.
pub trait PositionEngine {
    /// Place `content` next to `anchor` and keep a binding for later refreshes.
    fn create(
        &mut self,
        doc: &mut Document,
        anchor: NodeId,
        content: NodeId,
        options: &PositionOptions,
    ) -> Box<dyn PositionBinding>;
}

/// A live anchor/content binding.
pub trait PositionBinding {
    /// Recompute and apply the content position.
    fn update(&mut self, doc: &mut Document);
    /// Release the binding. Later `update` calls do nothing.
    fn destroy(&mut self, doc: &mut Document);
    /// Placement actually used by the last update (after any flip).
    fn placement(&self) -> Placement;
}

/// Default engine: side/alignment placement with flip and shift.
#[derive(Copy, Clone, Debug, Default)]
pub struct AnchoredPositioner {
    /// Gap between the anchor edge and the content, in world units.
    pub gap: f64,
}

impl PositionEngine for AnchoredPositioner {
    fn create(
        &mut self,
        doc: &mut Document,
        anchor: NodeId,
        content: NodeId,
        options: &PositionOptions,
    ) -> Box<dyn PositionBinding> {
        let mut binding = AnchoredBinding {
            anchor,
            content,
            options: *options,
            gap: self.gap,
            placement: options.placement,
            destroyed: false,
        };
        binding.update(doc);
        Box::new(binding)
    }
}

struct AnchoredBinding {
    anchor: NodeId,
    content: NodeId,
    options: PositionOptions,
    gap: f64,
    placement: Placement,
    destroyed: bool,
}

impl fmt::Debug for AnchoredBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnchoredBinding")
            .field("anchor", &self.anchor)
            .field("content", &self.content)
            .field("placement", &self.placement)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl PositionBinding for AnchoredBinding {
    fn update(&mut self, doc: &mut Document) {
        if self.destroyed {
            return;
        }
        let (Some(anchor), Some(content)) =
            (doc.world_bounds(self.anchor), doc.world_bounds(self.content))
        else {
            return;
        };
        let boundary = resolve_boundary(doc, self.anchor, self.options.boundary);
        let (rect, placement) = compute_position(
            anchor,
            content.size(),
            self.options.placement,
            boundary,
            self.gap,
        );
        self.placement = placement;
        doc.set_world_bounds(self.content, rect);
    }

    fn destroy(&mut self, _doc: &mut Document) {
        self.destroyed = true;
    }

    fn placement(&self) -> Placement {
        self.placement
    }
}

/// Resolve a [`Boundary`] to a world-space rectangle.
pub fn resolve_boundary(doc: &Document, anchor: NodeId, boundary: Boundary) -> Option<Rect> {
    match boundary {
        Boundary::Viewport => Some(doc.viewport()),
        Boundary::ScrollContainer => {
            let mut current = doc.parent_of(anchor);
            while let Some(node) = current {
                if doc
                    .flags(node)
                    .is_some_and(|f| f.contains(ElementFlags::SCROLL_CONTAINER))
                {
                    return doc.world_bounds(node);
                }
                current = doc.parent_of(node);
            }
            Some(doc.viewport())
        }
        Boundary::Element(node) => doc.world_bounds(node),
        Boundary::None => None,
    }
}

/// Compute the content rectangle for an anchor, returning the placement used.
pub fn compute_position(
    anchor: Rect,
    size: Size,
    placement: Placement,
    boundary: Option<Rect>,
    gap: f64,
) -> (Rect, Placement) {
    let preferred = place(anchor, size, placement, gap);
    let Some(bounds) = boundary else {
        return (preferred, placement);
    };

    let flipped = placement.flipped();
    let (rect, used) = if !fits_main_axis(preferred, placement.side(), bounds)
        && fits_main_axis(place(anchor, size, flipped, gap), flipped.side(), bounds)
    {
        (place(anchor, size, flipped, gap), flipped)
    } else {
        (preferred, placement)
    };
    (shift_into(rect, bounds), used)
}

fn place(anchor: Rect, size: Size, placement: Placement, gap: f64) -> Rect {
    let (w, h) = (size.width, size.height);
    let cross_x = match placement.align() {
        Align::Start => anchor.x0,
        Align::Center => anchor.center().x - w / 2.0,
        Align::End => anchor.x1 - w,
    };
    let cross_y = match placement.align() {
        Align::Start => anchor.y0,
        Align::Center => anchor.center().y - h / 2.0,
        Align::End => anchor.y1 - h,
    };
    match placement.side() {
        Side::Top => Rect::new(cross_x, anchor.y0 - gap - h, cross_x + w, anchor.y0 - gap),
        Side::Bottom => Rect::new(cross_x, anchor.y1 + gap, cross_x + w, anchor.y1 + gap + h),
        Side::Left => Rect::new(anchor.x0 - gap - w, cross_y, anchor.x0 - gap, cross_y + h),
        Side::Right => Rect::new(anchor.x1 + gap, cross_y, anchor.x1 + gap + w, cross_y + h),
    }
}

fn fits_main_axis(rect: Rect, side: Side, bounds: Rect) -> bool {
    match side {
        Side::Top => rect.y0 >= bounds.y0,
        Side::Bottom => rect.y1 <= bounds.y1,
        Side::Left => rect.x0 >= bounds.x0,
        Side::Right => rect.x1 <= bounds.x1,
    }
}

fn shift_into(rect: Rect, bounds: Rect) -> Rect {
    let dx = shift_1d(rect.x0, rect.x1, bounds.x0, bounds.x1);
    let dy = shift_1d(rect.y0, rect.y1, bounds.y0, bounds.y1);
    Rect::new(rect.x0 + dx, rect.y0 + dy, rect.x1 + dx, rect.y1 + dy)
}

// Oversized content keeps its leading edge on the boundary.
fn shift_1d(lo: f64, hi: f64, min: f64, max: f64) -> f64 {
    if hi - lo > max - min || lo < min {
        min - lo
    } else if hi > max {
        max - hi
    } else {
        0.0
    }
}
