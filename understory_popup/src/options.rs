// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Popup configuration: per-open options, trigger kinds, and custom trigger listeners.

use alloc::borrow::Cow;
use alloc::boxed::Box;
use core::fmt;

use crate::document::{NodeId, Selector};
use crate::event::Event;
use crate::position::{Boundary, Placement};

/// Class applied to the trigger (and optionally a marked ancestor) while open.
pub const DEFAULT_OPEN_CLASS: &str = "open";

/// Where popup content is mounted.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum AttachTarget {
    /// The trigger's parent element.
    #[default]
    Default,
    /// The nearest ancestor of the trigger matching the selector; falls back to
    /// the trigger's parent when nothing matches.
    Selector(Selector),
    /// An explicit container.
    Element(NodeId),
}

/// Options for one popup site, every field optional so that an override can
/// be merged over controller defaults field by field.
///
/// ```
/// use understory_popup::{Placement, PopupOptions};
///
/// let defaults = PopupOptions::new().placement(Placement::BottomStart).show_delay(100);
/// let merged = defaults.merged(&PopupOptions::new().show_delay(0).select_on_open(true));
/// let resolved = merged.resolve();
///
/// assert_eq!(resolved.placement, Placement::BottomStart);
/// assert_eq!(resolved.show_delay, 0);
/// assert!(resolved.select_on_open);
/// assert_eq!(resolved.hide_delay, 0);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PopupOptions {
    /// Preferred side and alignment.
    pub placement: Option<Placement>,
    /// Mount location for the content.
    pub attach: Option<AttachTarget>,
    /// Collision boundary for placement.
    pub boundary: Option<Boundary>,
    /// Delay before opening, in milliseconds.
    pub show_delay: Option<u64>,
    /// Delay before closing, in milliseconds.
    pub hide_delay: Option<u64>,
    /// Whether this popup is a submenu of another open popup.
    pub is_submenu: Option<bool>,
    /// Whether the first navigable item is selected on open.
    pub select_on_open: Option<bool>,
    /// Marker class applied to the trigger while open.
    pub open_class: Option<Cow<'static, str>>,
    /// Ancestor of the trigger that also receives the open marker.
    pub parent_selector_to_mark: Option<Selector>,
}

impl PopupOptions {
    /// Options with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the placement.
    pub fn placement(mut self, placement: Placement) -> Self {
        self.placement = Some(placement);
        self
    }

    /// Set the attach target.
    pub fn attach(mut self, attach: AttachTarget) -> Self {
        self.attach = Some(attach);
        self
    }

    /// Set the boundary.
    pub fn boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = Some(boundary);
        self
    }

    /// Set the show delay.
    pub fn show_delay(mut self, ms: u64) -> Self {
        self.show_delay = Some(ms);
        self
    }

    /// Set the hide delay.
    pub fn hide_delay(mut self, ms: u64) -> Self {
        self.hide_delay = Some(ms);
        self
    }

    /// Mark as a submenu.
    pub fn submenu(mut self, is_submenu: bool) -> Self {
        self.is_submenu = Some(is_submenu);
        self
    }

    /// Select the first navigable item on open.
    pub fn select_on_open(mut self, select: bool) -> Self {
        self.select_on_open = Some(select);
        self
    }

    /// Override the open marker class.
    pub fn open_class(mut self, class: impl Into<Cow<'static, str>>) -> Self {
        self.open_class = Some(class.into());
        self
    }

    /// Also mark the nearest ancestor matching `selector` while open.
    pub fn mark_parent(mut self, selector: Selector) -> Self {
        self.parent_selector_to_mark = Some(selector);
        self
    }

    /// Merge `over` on top of `self`; set fields in `over` win.
    pub fn merged(&self, over: &Self) -> Self {
        Self {
            placement: over.placement.or(self.placement),
            attach: over.attach.clone().or_else(|| self.attach.clone()),
            boundary: over.boundary.or(self.boundary),
            show_delay: over.show_delay.or(self.show_delay),
            hide_delay: over.hide_delay.or(self.hide_delay),
            is_submenu: over.is_submenu.or(self.is_submenu),
            select_on_open: over.select_on_open.or(self.select_on_open),
            open_class: over.open_class.clone().or_else(|| self.open_class.clone()),
            parent_selector_to_mark: over
                .parent_selector_to_mark
                .clone()
                .or_else(|| self.parent_selector_to_mark.clone()),
        }
    }

    /// Fill unset fields with defaults.
    pub fn resolve(&self) -> ResolvedOptions {
        ResolvedOptions {
            placement: self.placement.unwrap_or(Placement::BottomStart),
            attach: self.attach.clone().unwrap_or_default(),
            boundary: self.boundary.unwrap_or_default(),
            show_delay: self.show_delay.unwrap_or(0),
            hide_delay: self.hide_delay.unwrap_or(0),
            is_submenu: self.is_submenu.unwrap_or(false),
            select_on_open: self.select_on_open.unwrap_or(false),
            open_class: self
                .open_class
                .clone()
                .unwrap_or(Cow::Borrowed(DEFAULT_OPEN_CLASS)),
            parent_selector_to_mark: self.parent_selector_to_mark.clone(),
        }
    }
}

/// Effective options of an open session.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedOptions {
    /// Preferred side and alignment.
    pub placement: Placement,
    /// Mount location.
    pub attach: AttachTarget,
    /// Collision boundary.
    pub boundary: Boundary,
    /// Delay before opening, in milliseconds.
    pub show_delay: u64,
    /// Delay before closing, in milliseconds.
    pub hide_delay: u64,
    /// Whether this popup is a submenu.
    pub is_submenu: bool,
    /// Whether the first navigable item is selected on open.
    pub select_on_open: bool,
    /// Marker class applied while open.
    pub open_class: Cow<'static, str>,
    /// Ancestor that also receives the marker.
    pub parent_selector_to_mark: Option<Selector>,
}

impl Default for ResolvedOptions {
    fn default() -> Self {
        PopupOptions::default().resolve()
    }
}

bitflags::bitflags! {
    /// Built-in trigger kinds armed on the trigger element.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Triggers: u8 {
        /// Click toggles.
        const CLICK = 0b0000_0001;
        /// Pointer enter opens, pointer leave closes.
        const HOVER = 0b0000_0010;
        /// Focus opens, blur closes.
        const FOCUS = 0b0000_0100;
    }
}

impl Default for Triggers {
    fn default() -> Self {
        Self::CLICK
    }
}

/// Snapshot of a controller handed to custom trigger listeners.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct TriggerState {
    /// A session exists.
    pub open: bool,
    /// An open timer is armed.
    pub open_pending: bool,
    /// A close timer is armed.
    pub close_pending: bool,
}

/// Command a custom trigger listener asks its controller to perform.
#[derive(Clone, Debug, PartialEq)]
pub enum TriggerCommand {
    /// `open(options, force_reopen = false)`.
    Open(Option<PopupOptions>),
    /// `open(options, force_reopen = true)`.
    Reopen(Option<PopupOptions>),
    /// `close(delay)`.
    Close(Option<u64>),
    /// `toggle()`.
    Toggle,
}

/// Custom trigger: consulted for every event aimed at the trigger element.
pub type TriggerListener = Box<dyn FnMut(&Event, TriggerState) -> Option<TriggerCommand>>;

/// Construction-time configuration of a popup site.
#[derive(Default)]
pub struct PopupConfig {
    /// Default options for every open.
    pub options: PopupOptions,
    /// Built-in trigger kinds.
    pub triggers: Triggers,
    /// Optional custom trigger.
    pub listener: Option<TriggerListener>,
}

impl fmt::Debug for PopupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopupConfig")
            .field("options", &self.options)
            .field("triggers", &self.triggers)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl PopupConfig {
    /// Click-triggered popup with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default options.
    pub fn options(mut self, options: PopupOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the built-in triggers.
    pub fn triggers(mut self, triggers: Triggers) -> Self {
        self.triggers = triggers;
        self
    }

    /// Install a custom trigger listener.
    pub fn listener(
        mut self,
        listener: impl FnMut(&Event, TriggerState) -> Option<TriggerCommand> + 'static,
    ) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_override_per_field() {
        let defaults = PopupOptions::new()
            .placement(Placement::RightStart)
            .show_delay(200)
            .hide_delay(50)
            .submenu(true);
        let over = PopupOptions::new().show_delay(0).attach(AttachTarget::Default);
        let merged = defaults.merged(&over);

        assert_eq!(merged.placement, Some(Placement::RightStart));
        assert_eq!(merged.show_delay, Some(0));
        assert_eq!(merged.hide_delay, Some(50));
        assert_eq!(merged.is_submenu, Some(true));
        assert_eq!(merged.attach, Some(AttachTarget::Default));
    }

    #[test]
    fn resolve_fills_defaults() {
        let resolved = PopupOptions::new().resolve();
        assert_eq!(resolved.placement, Placement::BottomStart);
        assert_eq!(resolved.attach, AttachTarget::Default);
        assert_eq!(resolved.boundary, Boundary::Viewport);
        assert_eq!((resolved.show_delay, resolved.hide_delay), (0, 0));
        assert!(!resolved.is_submenu);
        assert!(!resolved.select_on_open);
        assert_eq!(resolved.open_class, DEFAULT_OPEN_CLASS);
        assert_eq!(resolved.parent_selector_to_mark, None);
    }
}
