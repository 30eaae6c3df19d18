// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Submenu wiring: a nested popup site owned by a menu item.
//!
//! The nested controller mounts its content inside the parent menu's content
//! root, so the parent treats clicks and pointer traffic in the submenu as
//! inside itself, and disposing the parent session destroys the nested site.
//! It has no built-in triggers: hovering opens it after
//! [`SUBMENU_HOVER_DELAY_MS`], and the parent menu opens it immediately on
//! Right-arrow or Enter and closes it when its selection moves away.

use understory_popup::{
    AttachTarget, ControllerId, Event, EventKind, NodeId, Overlays, Placement, PopupConfig,
    PopupOptions, TriggerCommand, TriggerState, Triggers,
};

use crate::menu::{MenuBuilder, menu_producer};
use crate::state::MenuConfig;

/// Hover time before a submenu opens, in milliseconds.
pub const SUBMENU_HOVER_DELAY_MS: u64 = 200;

/// Class carried by items that own a submenu.
pub const SUBMENU_CLASS: &str = "has-submenu";

/// Trigger listener of submenu sites.
///
/// Pointer enter requests a delayed open without preselection. Pointer leave
/// cancels an open that has not happened yet; an open submenu stays open so
/// the pointer can travel into it.
pub fn hover_listener(event: &Event, state: TriggerState) -> Option<TriggerCommand> {
    match event.kind {
        EventKind::PointerEnter => Some(TriggerCommand::Open(Some(
            PopupOptions::new()
                .show_delay(SUBMENU_HOVER_DELAY_MS)
                .select_on_open(false),
        ))),
        EventKind::PointerLeave if state.open_pending && !state.open => {
            Some(TriggerCommand::Close(None))
        }
        _ => None,
    }
}

/// Arm a submenu on `item`, mounting into `parent_root`.
pub(crate) fn attach_submenu(
    overlays: &mut Overlays,
    item: NodeId,
    parent_root: NodeId,
    config: MenuConfig,
    build: impl FnMut(&mut MenuBuilder<'_>) + 'static,
) -> ControllerId {
    overlays.document_mut().add_class(item, SUBMENU_CLASS);
    let popup = PopupConfig::new()
        .triggers(Triggers::empty())
        .options(
            PopupOptions::new()
                .submenu(true)
                .placement(Placement::RightStart)
                .attach(AttachTarget::Element(parent_root)),
        )
        .listener(hover_listener);
    let id = overlays.attach(item, popup, menu_producer(config, build));
    log::trace!(target: "understory_menu", "submenu {id:?} armed on {item:?}");
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some_node() -> NodeId {
        Overlays::new(kurbo::Rect::ZERO).document().body()
    }

    #[test]
    fn enter_requests_a_delayed_open() {
        let cmd = hover_listener(
            &Event::new(some_node(), EventKind::PointerEnter),
            TriggerState::default(),
        );
        let Some(TriggerCommand::Open(Some(options))) = cmd else {
            panic!("expected a delayed open, got {cmd:?}");
        };
        assert_eq!(options.show_delay, Some(SUBMENU_HOVER_DELAY_MS), "hover delay");
        assert_eq!(options.select_on_open, Some(false), "no preselection");
    }

    #[test]
    fn leave_only_cancels_pending_opens() {
        let leave = Event::new(some_node(), EventKind::PointerLeave);
        let pending = TriggerState {
            open_pending: true,
            ..TriggerState::default()
        };
        let open = TriggerState {
            open: true,
            ..TriggerState::default()
        };
        assert_eq!(
            hover_listener(&leave, pending),
            Some(TriggerCommand::Close(None)),
            "pending open cancelled"
        );
        assert_eq!(hover_listener(&leave, open), None, "open submenu stays open");
        assert_eq!(
            hover_listener(&Event::click(some_node()), TriggerState::default()),
            None,
            "clicks never open submenus"
        );
    }
}
