// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A select widget: a trigger button whose menu picks one of a fixed list of
//! options.
//!
//! Focus stays on the button while the list is open, so arrows, Enter, and
//! type-ahead keys are delivered to the button and drive the list from there.

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::Cell;

use understory_popup::{
    ControllerId, Event, Key, NodeId, Overlays, PopupConfig, TriggerCommand, TriggerState,
    Triggers,
};

use crate::item::{ActionResult, MenuItem};
use crate::menu::MenuBuilder;
use crate::state::{FocusMode, MenuConfig};

/// A select attached to a trigger button.
#[derive(Debug, Clone)]
pub struct Select {
    controller: ControllerId,
    value: Rc<Cell<Option<usize>>>,
}

impl Select {
    /// Attach a select over `options` to `trigger`, starting at `value`.
    pub fn attach(
        overlays: &mut Overlays,
        trigger: NodeId,
        options: impl IntoIterator<Item = impl Into<String>>,
        value: Option<usize>,
    ) -> Self {
        let labels: Vec<String> = options.into_iter().map(Into::into).collect();
        let value = Rc::new(Cell::new(value));
        let popup = PopupConfig::new()
            .triggers(Triggers::CLICK)
            .listener(open_on_arrow_keys);
        let chosen = value.clone();
        let controller = overlays.attach(trigger, popup, move |cx| {
            let config = MenuConfig::new()
                .focus(FocusMode::StayOnTrigger)
                .type_ahead(true)
                .preselect(chosen.get());
            let mut menu = MenuBuilder::new(cx.overlays(), config);
            for (index, label) in labels.iter().enumerate() {
                let chosen = chosen.clone();
                menu.push(MenuItem::new(label.clone()).action(move |_| {
                    chosen.set(Some(index));
                    log::debug!(target: "understory_menu", "select chose option {index}");
                    ActionResult::Close
                }));
            }
            Ok(menu.finish())
        });
        Self { controller, value }
    }

    /// The popup controller behind the list.
    pub fn controller(&self) -> ControllerId {
        self.controller
    }

    /// Index of the chosen option.
    pub fn value(&self) -> Option<usize> {
        self.value.get()
    }

    /// Change the chosen option; takes effect on the next open.
    pub fn set_value(&self, value: Option<usize>) {
        self.value.set(value);
    }
}

/// Opens a closed select on ArrowDown, ArrowUp, or Enter at the button.
fn open_on_arrow_keys(event: &Event, state: TriggerState) -> Option<TriggerCommand> {
    match event.as_key()? {
        Key::ArrowDown | Key::ArrowUp | Key::Enter if !state.open && !state.open_pending => {
            Some(TriggerCommand::Open(None))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use kurbo::Rect;
    use understory_popup::{ElementFlags, ElementProps};

    use super::*;
    use crate::state::SELECTED_CLASS;

    fn setup() -> (Overlays, NodeId, Select) {
        let mut overlays = Overlays::new(Rect::new(0.0, 0.0, 800.0, 600.0));
        let doc = overlays.document_mut();
        let button = doc.create(
            ElementProps::with_bounds(Rect::new(10.0, 10.0, 110.0, 30.0))
                .flags(ElementFlags::TABBABLE),
        );
        let body = doc.body();
        doc.append_child(body, button);
        doc.focus(button);
        let select = Select::attach(&mut overlays, button, ["apple", "apricot", "avocado"], None);
        (overlays, button, select)
    }

    fn selected(overlays: &Overlays, select: &Select) -> Option<usize> {
        let root = overlays.content_of(select.controller())?;
        let doc = overlays.document();
        doc.children_of(root)
            .iter()
            .position(|c| doc.has_class(*c, SELECTED_CLASS))
    }

    fn type_at(overlays: &mut Overlays, button: NodeId, now: u64, c: char) {
        overlays.advance(now).unwrap();
        overlays.dispatch(Event::key(button, Key::Char(c))).unwrap();
    }

    #[test]
    fn repeated_letter_cycles_matches() {
        let (mut overlays, button, select) = setup();
        overlays.dispatch(Event::click(button)).unwrap();
        assert_eq!(selected(&overlays, &select), None, "no value, nothing selected");

        let mut picks = Vec::new();
        for now in [0, 100, 200, 300] {
            type_at(&mut overlays, button, now, 'a');
            picks.push(selected(&overlays, &select));
        }
        assert_eq!(
            picks,
            [Some(0), Some(1), Some(2), Some(0)],
            "apple, apricot, avocado, apple"
        );
        assert_eq!(overlays.document().focused(), Some(button), "focus stays on the button");
    }

    #[test]
    fn inactivity_restarts_the_cycle() {
        let (mut overlays, button, select) = setup();
        overlays.dispatch(Event::click(button)).unwrap();
        type_at(&mut overlays, button, 0, 'a');
        type_at(&mut overlays, button, 100, 'a');
        assert_eq!(selected(&overlays, &select), Some(1), "apricot");
        type_at(&mut overlays, button, 1_200, 'a');
        assert_eq!(selected(&overlays, &select), Some(0), "back to apple after the pause");
    }

    #[test]
    fn arrow_key_opens_with_current_value_and_enter_commits() {
        let (mut overlays, button, select) = setup();
        select.set_value(Some(2));
        overlays
            .dispatch(Event::key(button, Key::ArrowDown))
            .unwrap();
        assert!(overlays.is_open(select.controller()), "arrow key opens");
        assert_eq!(selected(&overlays, &select), Some(2), "current value preselected");

        overlays.dispatch(Event::key(button, Key::ArrowDown)).unwrap();
        assert_eq!(selected(&overlays, &select), Some(0), "wraps to the first option");
        overlays.dispatch(Event::key(button, Key::Enter)).unwrap();
        assert!(!overlays.is_open(select.controller()), "enter commits and closes");
        assert_eq!(select.value(), Some(0), "value updated");
        assert_eq!(overlays.document().focused(), Some(button), "focus never left");
    }

    #[test]
    fn escape_closes_without_choosing() {
        let (mut overlays, button, select) = setup();
        overlays.dispatch(Event::click(button)).unwrap();
        overlays.dispatch(Event::key(button, Key::ArrowDown)).unwrap();
        overlays.dispatch(Event::key(button, Key::Escape)).unwrap();
        assert!(!overlays.is_open(select.controller()), "closed");
        assert_eq!(select.value(), None, "nothing chosen");
    }
}
