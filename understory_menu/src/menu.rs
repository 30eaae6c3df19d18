// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Building menu content and attaching menus to triggers.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use kurbo::Rect;
use understory_popup::{
    Content, ContentCx, ControllerId, Document, ElementProps, Key, NodeId, Overlays, PopupConfig,
    PopupError,
};

use crate::item::{ActionCx, ActionResult, ItemEntry, MenuItem, SEPARATOR_CLASS};
use crate::state::{KeyBinding, MenuConfig, MenuState};
use crate::submenu::attach_submenu;

/// Class carried by menu content roots.
pub const MENU_CLASS: &str = "menu";

/// Height of a separator row.
const SEPARATOR_HEIGHT: f64 = 8.0;

/// Lays out one menu's items top to bottom and collects their behavior.
///
/// Items are direct children of the menu root, in insertion order.
pub struct MenuBuilder<'a> {
    overlays: &'a mut Overlays,
    config: MenuConfig,
    root: NodeId,
    next_y: f64,
    items: Vec<ItemEntry>,
    bindings: Vec<KeyBinding>,
    on_close: Option<Box<dyn FnOnce(&mut Document)>>,
}

impl fmt::Debug for MenuBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuBuilder")
            .field("config", &self.config)
            .field("root", &self.root)
            .field("items", &self.items.len())
            .finish_non_exhaustive()
    }
}

impl<'a> MenuBuilder<'a> {
    /// Create an empty menu root.
    pub fn new(overlays: &'a mut Overlays, config: MenuConfig) -> Self {
        let root = overlays.document_mut().create(
            ElementProps::with_bounds(Rect::new(0.0, 0.0, config.width, 0.0)).class(MENU_CLASS),
        );
        Self {
            overlays,
            config,
            root,
            next_y: 0.0,
            items: Vec::new(),
            bindings: Vec::new(),
            on_close: None,
        }
    }

    /// The menu root.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The menu's configuration.
    pub fn config(&self) -> &MenuConfig {
        &self.config
    }

    /// The document, for decorating elements.
    pub fn document(&mut self) -> &mut Document {
        self.overlays.document_mut()
    }

    /// Append an item.
    pub fn push(&mut self, item: MenuItem) -> NodeId {
        let node = self.mount(&item);
        self.items.push(item.into_entry(node, None));
        node
    }

    /// Append an enabled item with an action.
    pub fn item(
        &mut self,
        label: impl Into<String>,
        action: impl FnMut(&mut ActionCx<'_>) -> ActionResult + 'static,
    ) -> NodeId {
        self.push(MenuItem::new(label).action(action))
    }

    /// Append a non-selectable separator row.
    pub fn separator(&mut self) -> NodeId {
        let y = self.next_y;
        self.next_y += SEPARATOR_HEIGHT;
        let root = self.root;
        let doc = self.overlays.document_mut();
        let node = doc.create(
            ElementProps::with_bounds(Rect::new(0.0, y, self.config.width, y + SEPARATOR_HEIGHT))
                .class(SEPARATOR_CLASS),
        );
        doc.append_child(root, node);
        node
    }

    /// Append an item that owns a submenu built by `build` on every open.
    ///
    /// The item's own action is never run: activating it opens the submenu.
    pub fn submenu(
        &mut self,
        item: MenuItem,
        build: impl FnMut(&mut MenuBuilder<'_>) + 'static,
    ) -> NodeId {
        let node = self.mount(&item);
        let submenu = attach_submenu(
            self.overlays,
            node,
            self.root,
            self.config.for_submenu(),
            build,
        );
        self.items.push(item.into_entry(node, Some(submenu)));
        node
    }

    /// Bind an extra key. With `also_bubble`, a binding that keeps the menu
    /// open still lets enclosing menus see the key.
    pub fn bind(
        &mut self,
        key: Key,
        also_bubble: bool,
        handler: impl FnMut(&mut ActionCx<'_>) -> ActionResult + 'static,
    ) {
        self.bindings.push(KeyBinding {
            key,
            also_bubble,
            handler: Box::new(handler),
        });
    }

    /// Run `f` when this menu's session is disposed.
    pub fn on_close(&mut self, f: impl FnOnce(&mut Document) + 'static) {
        self.on_close = Some(Box::new(f));
    }

    /// Size the root to its items and hand out the content.
    pub fn finish(self) -> Content {
        let Self {
            overlays,
            config,
            root,
            next_y,
            items,
            bindings,
            on_close,
        } = self;
        overlays
            .document_mut()
            .set_bounds(root, Rect::new(0.0, 0.0, config.width, next_y));
        let mut content = Content::new(root).handler(MenuState::new(config, items, bindings));
        content.on_close = on_close;
        content
    }

    fn mount(&mut self, item: &MenuItem) -> NodeId {
        let y = self.next_y;
        let height = self.config.item_height;
        self.next_y += height;
        let root = self.root;
        let doc = self.overlays.document_mut();
        let node = item.create_element(doc, Rect::new(0.0, y, self.config.width, y + height));
        doc.append_child(root, node);
        node
    }
}

/// Content producer that builds a fresh menu on every open.
pub fn menu_producer(
    config: MenuConfig,
    mut build: impl FnMut(&mut MenuBuilder<'_>) + 'static,
) -> impl FnMut(&mut ContentCx<'_>) -> Result<Content, PopupError> + 'static {
    move |cx| {
        let mut menu = MenuBuilder::new(cx.overlays(), config.clone());
        build(&mut menu);
        Ok(menu.finish())
    }
}

/// Attach a menu to `trigger`.
pub fn attach_menu(
    overlays: &mut Overlays,
    trigger: NodeId,
    popup: PopupConfig,
    config: MenuConfig,
    build: impl FnMut(&mut MenuBuilder<'_>) + 'static,
) -> ControllerId {
    overlays.attach(trigger, popup, menu_producer(config, build))
}
