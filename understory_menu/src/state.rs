// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The menu selection state machine.
//!
//! A [`MenuState`] tracks at most one selected item among the direct children
//! of a mounted content root and drives it from pointer and keyboard input.
//! Variants (plain menu, submenu, select list) differ only in their
//! [`MenuConfig`]:
//!
//! - [`FocusMode`]: whether focus follows the selection or stays on the trigger.
//! - `escape_key`: the key that closes this menu only.
//! - `preselect`: an item index selected on mount.
//! - `type_ahead`: whether printable keys search item labels.
//!
//! Key handling, in order: extra key bindings, the escape key, arrows, Enter,
//! and type-ahead. Anything else is [`Response::Ignored`] so that an
//! enclosing menu sees it.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use smallvec::SmallVec;
use understory_popup::{
    ContentHandler, ControllerId, Document, Event, EventKind, Key, NodeId, PopupError,
    PopupOptions, Response, SessionCx,
};

use crate::item::{ActionCx, ActionResult, ItemEntry};
use crate::typeahead::NavigationCycleState;

const LOG_TARGET: &str = "understory_menu";

/// Class applied to the selected item.
pub const SELECTED_CLASS: &str = "selected";

/// Where keyboard focus lives while the menu is open.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum FocusMode {
    /// Focus moves to the selected item, or the content root without a selection.
    #[default]
    FollowSelection,
    /// Focus stays on the trigger; keys aimed at the trigger drive the menu.
    StayOnTrigger,
}

/// Capabilities of one menu.
#[derive(Clone, Debug, PartialEq)]
pub struct MenuConfig {
    /// Focus behavior.
    pub focus: FocusMode,
    /// Key that closes this menu (and its submenus) only.
    pub escape_key: Key,
    /// Index of the item selected on mount, if it is selectable.
    ///
    /// Takes precedence over the `select_on_open` popup option.
    pub preselect: Option<usize>,
    /// Printable keys search item labels.
    pub type_ahead: bool,
    /// Width of the menu and its items.
    pub width: f64,
    /// Height of one item row.
    pub item_height: f64,
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            focus: FocusMode::FollowSelection,
            escape_key: Key::Escape,
            preselect: None,
            type_ahead: false,
            width: 160.0,
            item_height: 24.0,
        }
    }
}

impl MenuConfig {
    /// Root menu defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the focus mode.
    pub fn focus(mut self, focus: FocusMode) -> Self {
        self.focus = focus;
        self
    }

    /// Set the key that closes this menu.
    pub fn escape_key(mut self, key: Key) -> Self {
        self.escape_key = key;
        self
    }

    /// Select the item at `index` on mount.
    pub fn preselect(mut self, index: Option<usize>) -> Self {
        self.preselect = index;
        self
    }

    /// Enable or disable type-ahead.
    pub fn type_ahead(mut self, enabled: bool) -> Self {
        self.type_ahead = enabled;
        self
    }

    /// Set the menu width.
    pub fn width(mut self, width: f64) -> Self {
        self.width = width;
        self
    }

    /// Set the item row height.
    pub fn item_height(mut self, height: f64) -> Self {
        self.item_height = height;
        self
    }

    /// Configuration for a submenu of this menu: Left-arrow navigates out and
    /// nothing is preselected.
    pub fn for_submenu(&self) -> Self {
        Self {
            escape_key: Key::ArrowLeft,
            preselect: None,
            ..self.clone()
        }
    }
}

/// Direction of a navigation step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Toward the last child.
    Next,
    /// Toward the first child.
    Prev,
}

/// The selectable direct child of `root` one step away from `from`.
///
/// Without an origin (or with one that is not a child of `root`) the scan
/// starts at the first child for [`Direction::Next`] and the last child for
/// [`Direction::Prev`]. Otherwise it wraps around the children and skips
/// anything not [selectable](Document::is_selectable). Returns `None` when no
/// other selectable child exists.
pub fn step(
    doc: &Document,
    root: NodeId,
    from: Option<NodeId>,
    direction: Direction,
) -> Option<NodeId> {
    let children = doc.children_of(root);
    let len = children.len();
    let origin = from.and_then(|f| children.iter().position(|c| *c == f));
    let count = if origin.is_some() { len.saturating_sub(1) } else { len };
    let index = |k: usize| match (origin, direction) {
        (None, Direction::Next) => k,
        (None, Direction::Prev) => len - 1 - k,
        (Some(i), Direction::Next) => (i + 1 + k) % len,
        (Some(i), Direction::Prev) => (i + len - 1 - k) % len,
    };
    (0..count)
        .map(|k| children[index(k)])
        .find(|child| doc.is_selectable(*child))
}

/// Extra key handler registered on a menu.
pub(crate) struct KeyBinding {
    pub(crate) key: Key,
    pub(crate) also_bubble: bool,
    pub(crate) handler: Box<dyn FnMut(&mut ActionCx<'_>) -> ActionResult>,
}

impl fmt::Debug for KeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBinding")
            .field("key", &self.key)
            .field("also_bubble", &self.also_bubble)
            .finish_non_exhaustive()
    }
}

/// Selection state of one mounted menu.
#[derive(Debug)]
pub struct MenuState {
    config: MenuConfig,
    items: Vec<ItemEntry>,
    bindings: Vec<KeyBinding>,
    selected: Option<NodeId>,
    cycle: NavigationCycleState,
}

impl MenuState {
    pub(crate) fn new(
        config: MenuConfig,
        items: Vec<ItemEntry>,
        bindings: Vec<KeyBinding>,
    ) -> Self {
        Self {
            config,
            items,
            bindings,
            selected: None,
            cycle: NavigationCycleState::new(),
        }
    }

    /// The selected item.
    pub fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    /// The menu's configuration.
    pub fn config(&self) -> &MenuConfig {
        &self.config
    }

    fn entry(&self, node: NodeId) -> Option<&ItemEntry> {
        self.items.iter().find(|e| e.node == node)
    }

    /// Whether the selected item holds an open submenu.
    fn holds_open_submenu(&self, cx: &mut SessionCx<'_>) -> bool {
        self.selected
            .and_then(|node| self.entry(node))
            .and_then(|e| e.submenu)
            .is_some_and(|sub| cx.overlays().is_open(sub))
    }

    fn select(&mut self, cx: &mut SessionCx<'_>, new: Option<NodeId>) {
        let old = self.selected;
        if old == new {
            return;
        }
        if let Some(old) = old {
            cx.document().remove_class(old, SELECTED_CLASS);
            // Collapse the old item's submenu before focus moves.
            if let Some(sub) = self.entry(old).and_then(|e| e.submenu) {
                cx.overlays().close(sub, None);
            }
        }
        if let Some(new) = new {
            cx.document().add_class(new, SELECTED_CLASS);
        }
        self.selected = new;
        if self.config.focus == FocusMode::FollowSelection {
            let root = cx.content();
            cx.document().focus(new.unwrap_or(root));
        }
        log::trace!(target: LOG_TARGET, "selection {old:?} -> {new:?}");

        for (node, selected) in [(old, false), (new, true)] {
            let Some(node) = node else {
                continue;
            };
            if let Some(callback) = self
                .items
                .iter_mut()
                .find(|e| e.node == node)
                .and_then(|e| e.on_selection_change.as_mut())
            {
                callback(cx.document(), node, selected);
            }
        }
    }

    fn navigate(&mut self, cx: &mut SessionCx<'_>, direction: Direction) {
        let root = cx.content();
        match step(cx.document(), root, self.selected, direction) {
            Some(next) => self.select(cx, Some(next)),
            None => log::trace!(target: LOG_TARGET, "no selectable item {direction:?}"),
        }
    }

    fn hover(&mut self, cx: &mut SessionCx<'_>, target: NodeId) {
        let root = cx.content();
        let doc = cx.document();
        let hovered = doc
            .child_toward(root, target)
            .filter(|child| doc.is_selectable(*child));
        match hovered {
            Some(item) => self.select(cx, Some(item)),
            None if self.holds_open_submenu(cx) => {}
            None => self.select(cx, None),
        }
    }

    fn open_submenu(cx: &mut SessionCx<'_>, submenu: ControllerId) -> Result<(), PopupError> {
        log::debug!(target: LOG_TARGET, "opening submenu {submenu:?} from keyboard");
        cx.overlays().open(
            submenu,
            Some(PopupOptions::new().show_delay(0).select_on_open(true)),
            true,
        )
    }

    fn activate(
        &mut self,
        cx: &mut SessionCx<'_>,
        item: NodeId,
        from_key: bool,
    ) -> Result<Response, PopupError> {
        if !cx.document().is_selectable(item) {
            return Ok(Response::Handled);
        }
        let Some(idx) = self.items.iter().position(|e| e.node == item) else {
            return Ok(Response::Handled);
        };
        if let Some(submenu) = self.items[idx].submenu {
            if from_key {
                Self::open_submenu(cx, submenu)?;
            }
            return Ok(Response::Handled);
        }

        let (controller, trigger) = (cx.controller(), cx.trigger());
        let result = match self.items[idx].action.as_mut() {
            Some(action) => action(&mut ActionCx {
                overlays: cx.overlays(),
                controller,
                trigger,
                item: Some(item),
            }),
            None => ActionResult::Close,
        };
        log::debug!(target: LOG_TARGET, "activated {item:?}: {result:?}");
        Ok(match result {
            ActionResult::Close => Response::CloseChain,
            ActionResult::KeepOpen => Response::Handled,
        })
    }

    fn type_ahead(&mut self, cx: &mut SessionCx<'_>, c: char) {
        self.cycle.push(cx.now(), c);
        let doc = cx.document();
        let matches: SmallVec<[NodeId; 8]> = self
            .items
            .iter()
            .map(|e| e.node)
            .filter(|node| {
                doc.is_selectable(*node) && doc.label(*node).is_some_and(|l| self.cycle.matches(l))
            })
            .collect();
        log::trace!(
            target: LOG_TARGET,
            "type-ahead {:?} #{} over {} matches",
            self.cycle.term(),
            self.cycle.cycle_index(),
            matches.len()
        );
        if let Some(pick) = self.cycle.pick(&matches) {
            self.select(cx, Some(pick));
        }
    }

    fn key(&mut self, cx: &mut SessionCx<'_>, key: Key) -> Result<Response, PopupError> {
        if let Some(binding) = self.bindings.iter_mut().find(|b| b.key == key) {
            let (controller, trigger) = (cx.controller(), cx.trigger());
            let result = (binding.handler)(&mut ActionCx {
                overlays: cx.overlays(),
                controller,
                trigger,
                item: self.selected,
            });
            return Ok(match result {
                ActionResult::Close => Response::Close,
                ActionResult::KeepOpen if binding.also_bubble => Response::Ignored,
                ActionResult::KeepOpen => Response::Handled,
            });
        }

        if key == self.config.escape_key {
            return Ok(Response::Close);
        }
        match key {
            Key::ArrowDown => self.navigate(cx, Direction::Next),
            Key::ArrowUp => self.navigate(cx, Direction::Prev),
            Key::Enter => {
                if let Some(item) = self.selected {
                    return self.activate(cx, item, true);
                }
            }
            Key::ArrowRight => {
                let submenu = self.selected.and_then(|n| self.entry(n)).and_then(|e| e.submenu);
                if let Some(submenu) = submenu {
                    Self::open_submenu(cx, submenu)?;
                }
            }
            Key::Char(c) if self.config.type_ahead => self.type_ahead(cx, c),
            _ => return Ok(Response::Ignored),
        }
        Ok(Response::Handled)
    }
}

impl ContentHandler for MenuState {
    fn mount(&mut self, cx: &mut SessionCx<'_>) {
        let root = cx.content();
        log::debug!(target: LOG_TARGET, "menu mounted at {root:?}");
        let preselected = self
            .config
            .preselect
            .and_then(|idx| self.items.get(idx))
            .map(|e| e.node)
            .filter(|node| cx.document().is_selectable(*node));
        if let Some(item) = preselected {
            self.select(cx, Some(item));
        } else if cx.options().select_on_open {
            self.navigate(cx, Direction::Next);
        } else if self.config.focus == FocusMode::FollowSelection {
            cx.document().focus(root);
        }
    }

    fn handle(&mut self, cx: &mut SessionCx<'_>, event: &Event) -> Result<Response, PopupError> {
        match event.kind {
            EventKind::PointerMove => {
                self.hover(cx, event.target);
                Ok(Response::Handled)
            }
            EventKind::Click => {
                let root = cx.content();
                match cx.document().child_toward(root, event.target) {
                    Some(item) => self.activate(cx, item, false),
                    // Background clicks stay inside this menu.
                    None => Ok(Response::Handled),
                }
            }
            EventKind::KeyDown(key) => self.key(cx, key),
            _ => Ok(Response::Ignored),
        }
    }

    fn unmount(&mut self, cx: &mut SessionCx<'_>) {
        let root = cx.content();
        // Focus redirected elsewhere (for example by an action) is left alone.
        if cx.may_restore_focus() && cx.document().focus_within(root) {
            let trigger = cx.trigger();
            cx.document().focus(trigger);
        }
        log::debug!(target: LOG_TARGET, "menu unmounted from {root:?}");
    }
}
