// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Input events delivered to the overlay runtime.

use crate::document::NodeId;

/// Named keys the overlay core reacts to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    /// Arrow up.
    ArrowUp,
    /// Arrow down.
    ArrowDown,
    /// Arrow left.
    ArrowLeft,
    /// Arrow right.
    ArrowRight,
    /// Enter / Return.
    Enter,
    /// Escape.
    Escape,
    /// Space bar.
    Space,
    /// Tab.
    Tab,
    /// A printable character.
    Char(char),
}

/// Kind of an input event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Pointer entered the target element.
    PointerEnter,
    /// Pointer left the target element.
    PointerLeave,
    /// Pointer moved over the target (deepest element under the pointer).
    PointerMove,
    /// Primary button click.
    Click,
    /// Secondary button click / context menu request.
    ContextMenu,
    /// Target gained focus.
    Focus,
    /// Target lost focus.
    Blur,
    /// Key pressed while the target had focus.
    KeyDown(Key),
}

/// An input event targeted at an element.
///
/// The host performs hit testing and focus tracking; the runtime only needs to
/// know which element the event is aimed at.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// Deepest element the event is aimed at.
    pub target: NodeId,
    /// What happened.
    pub kind: EventKind,
}

impl Event {
    /// Construct an event.
    pub const fn new(target: NodeId, kind: EventKind) -> Self {
        Self { target, kind }
    }

    /// Click on `target`.
    pub const fn click(target: NodeId) -> Self {
        Self::new(target, EventKind::Click)
    }

    /// Key press with focus on `target`.
    pub const fn key(target: NodeId, key: Key) -> Self {
        Self::new(target, EventKind::KeyDown(key))
    }

    /// Pointer movement over `target`.
    pub const fn pointer_move(target: NodeId) -> Self {
        Self::new(target, EventKind::PointerMove)
    }

    /// The pressed key, for key events.
    pub fn as_key(&self) -> Option<Key> {
        match self.kind {
            EventKind::KeyDown(key) => Some(key),
            _ => None,
        }
    }
}
