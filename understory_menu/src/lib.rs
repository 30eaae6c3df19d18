// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Menu: menus, submenus, and select lists on top of Understory Popup.
//!
//! A menu is popup content whose direct children are items. A [`MenuState`]
//! tracks one selected item among them:
//!
//! - ArrowDown/ArrowUp step through selectable items, wrapping and skipping
//!   disabled, untabbable, or zero-sized children.
//! - Pointer movement selects the hovered item; moving over the background
//!   clears the selection unless the selected item holds an open submenu.
//! - Click or Enter runs the item's action, then closes the whole open chain
//!   unless the action returns [`ActionResult::KeepOpen`]. Disabled items and
//!   the menu background swallow clicks.
//! - The configured escape key closes the menu. Root menus use Escape;
//!   submenus use ArrowLeft and let Escape reach the root, which closes the
//!   chain.
//!
//! Submenus are nested popup sites owned by an item ([`MenuBuilder::submenu`]).
//! They open after [`SUBMENU_HOVER_DELAY_MS`] of hover with nothing selected,
//! or immediately on ArrowRight/Enter with their first item selected, and
//! collapse when the parent selection moves to a sibling.
//!
//! Behavior variants are expressed through [`MenuConfig`] rather than separate
//! types; [`Select`] is a thin example that keeps focus on its button and
//! enables type-ahead ([`NavigationCycleState`]).
//!
//! ## Example
//!
//! ```
//! use kurbo::Rect;
//! use understory_menu::{attach_menu, ActionResult, MenuConfig};
//! use understory_popup::{ElementFlags, ElementProps, Event, Key, Overlays, PopupConfig};
//!
//! let mut overlays = Overlays::new(Rect::new(0.0, 0.0, 800.0, 600.0));
//! let doc = overlays.document_mut();
//! let button = doc.create(
//!     ElementProps::with_bounds(Rect::new(10.0, 10.0, 90.0, 30.0)).flags(ElementFlags::TABBABLE),
//! );
//! let body = doc.body();
//! doc.append_child(body, button);
//!
//! let menu = attach_menu(&mut overlays, button, PopupConfig::new(), MenuConfig::new(), |m| {
//!     m.item("Cut", |_| ActionResult::Close);
//!     m.item("Copy", |_| ActionResult::Close);
//! });
//!
//! overlays.dispatch(Event::click(button)).unwrap();
//! let focused = overlays.document().focused().unwrap();
//! overlays.dispatch(Event::key(focused, Key::ArrowDown)).unwrap();
//! let focused = overlays.document().focused().unwrap();
//! assert_eq!(overlays.document().label(focused), Some("Cut"));
//!
//! overlays.dispatch(Event::key(focused, Key::Enter)).unwrap();
//! assert!(!overlays.is_open(menu));
//! assert_eq!(overlays.document().focused(), Some(button));
//! ```
//!
//! ## Logging
//!
//! Uses the `understory_menu` log target: `debug` for mounts and activations,
//! `trace` for selection changes and type-ahead.
//!
//! ## Features
//!
//! - `std` (default): enables `std` support for dependencies such as `kurbo`.
//! - `libm`: enables `no_std` + `alloc` builds that rely on `libm` for floating-point math;
//!   typically used when integrating into embedded or `no_std` environments.
//!   Both features are forwarded to `understory_popup`.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod item;
mod menu;
mod select;
mod state;
mod submenu;
mod typeahead;

pub use item::{
    ActionCx, ActionResult, ITEM_CLASS, ItemAction, MenuItem, SEPARATOR_CLASS, SelectionCallback,
};
pub use menu::{MENU_CLASS, MenuBuilder, attach_menu, menu_producer};
pub use select::Select;
pub use state::{Direction, FocusMode, MenuConfig, MenuState, SELECTED_CLASS, step};
pub use submenu::{SUBMENU_CLASS, SUBMENU_HOVER_DELAY_MS, hover_listener};
pub use typeahead::{NavigationCycleState, TYPE_AHEAD_RESET_MS};
