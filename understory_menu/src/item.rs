// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Menu items and their actions.

use alloc::boxed::Box;
use alloc::string::String;
use core::fmt;

use kurbo::Rect;
use understory_popup::{ControllerId, Document, ElementFlags, ElementProps, NodeId, Overlays};

/// Class carried by every menu item element.
pub const ITEM_CLASS: &str = "menu-item";

/// Class carried by separator elements.
pub const SEPARATOR_CLASS: &str = "menu-separator";

/// What the menu should do after an item action ran.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ActionResult {
    /// Close the whole open chain.
    #[default]
    Close,
    /// Leave every popup open.
    KeepOpen,
}

/// Item action.
pub type ItemAction = Box<dyn FnMut(&mut ActionCx<'_>) -> ActionResult>;

/// Called with `true` when an item becomes selected and `false` when it stops
/// being selected.
pub type SelectionCallback = Box<dyn FnMut(&mut Document, NodeId, bool)>;

/// Context handed to item actions and key bindings.
pub struct ActionCx<'a> {
    pub(crate) overlays: &'a mut Overlays,
    pub(crate) controller: ControllerId,
    pub(crate) trigger: NodeId,
    pub(crate) item: Option<NodeId>,
}

impl fmt::Debug for ActionCx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionCx")
            .field("controller", &self.controller)
            .field("trigger", &self.trigger)
            .field("item", &self.item)
            .finish_non_exhaustive()
    }
}

impl ActionCx<'_> {
    /// The runtime.
    pub fn overlays(&mut self) -> &mut Overlays {
        self.overlays
    }

    /// Shorthand for the runtime's document.
    pub fn document(&mut self) -> &mut Document {
        self.overlays.document_mut()
    }

    /// Controller of the menu the action ran in.
    pub fn controller(&self) -> ControllerId {
        self.controller
    }

    /// Trigger of the menu the action ran in.
    pub fn trigger(&self) -> NodeId {
        self.trigger
    }

    /// The activated item; for key bindings, the selected item if any.
    pub fn item(&self) -> Option<NodeId> {
        self.item
    }
}

/// Description of one selectable menu item.
///
/// ```
/// use understory_menu::{ActionResult, MenuItem};
///
/// let item = MenuItem::new("Copy").action(|_| ActionResult::Close);
/// assert_eq!(item.label(), "Copy");
/// assert!(!item.is_disabled());
/// ```
pub struct MenuItem {
    label: String,
    disabled: bool,
    action: Option<ItemAction>,
    on_selection_change: Option<SelectionCallback>,
}

impl fmt::Debug for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuItem")
            .field("label", &self.label)
            .field("disabled", &self.disabled)
            .field("action", &self.action.is_some())
            .field("on_selection_change", &self.on_selection_change.is_some())
            .finish()
    }
}

impl MenuItem {
    /// Enabled item without an action; activating it just closes the menu.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            disabled: false,
            action: None,
            on_selection_change: None,
        }
    }

    /// Set the action run on click or Enter.
    pub fn action(mut self, f: impl FnMut(&mut ActionCx<'_>) -> ActionResult + 'static) -> Self {
        self.action = Some(Box::new(f));
        self
    }

    /// Mark the item disabled: never selected, clicks are swallowed.
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Observe selection changes of this item.
    pub fn on_selection_change(
        mut self,
        f: impl FnMut(&mut Document, NodeId, bool) + 'static,
    ) -> Self {
        self.on_selection_change = Some(Box::new(f));
        self
    }

    /// The label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the item is disabled.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Create the item element with the given local bounds.
    pub(crate) fn create_element(&self, doc: &mut Document, bounds: Rect) -> NodeId {
        let mut flags = ElementFlags::TABBABLE;
        flags.set(ElementFlags::DISABLED, self.disabled);
        doc.create(
            ElementProps::with_bounds(bounds)
                .flags(flags)
                .class(ITEM_CLASS)
                .label(self.label.clone()),
        )
    }

    pub(crate) fn into_entry(self, node: NodeId, submenu: Option<ControllerId>) -> ItemEntry {
        ItemEntry {
            node,
            action: self.action,
            on_selection_change: self.on_selection_change,
            submenu,
        }
    }
}

/// Behavior registered for one mounted item.
pub(crate) struct ItemEntry {
    pub(crate) node: NodeId,
    pub(crate) action: Option<ItemAction>,
    pub(crate) on_selection_change: Option<SelectionCallback>,
    pub(crate) submenu: Option<ControllerId>,
}

impl fmt::Debug for ItemEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemEntry")
            .field("node", &self.node)
            .field("submenu", &self.submenu)
            .finish_non_exhaustive()
    }
}
