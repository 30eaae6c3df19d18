// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Open sessions: mounted content, its placement binding, markers, and teardown.

use alloc::boxed::Box;
use core::fmt;

use smallvec::SmallVec;

use crate::controller::ControllerId;
use crate::document::{Document, NodeId};
use crate::error::PopupError;
use crate::event::Event;
use crate::options::ResolvedOptions;
use crate::overlays::Overlays;
use crate::position::PositionBinding;

/// What a content handler did with an event.
///
/// Handlers return this instead of relying on propagation tricks: the runtime
/// walks open sessions from the innermost outward and stops at the first
/// handler that does not answer [`Response::Ignored`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Response {
    /// Not handled; offer the event to the enclosing session.
    Ignored,
    /// Handled; keep everything open and stop propagation.
    Handled,
    /// Handled; close this popup only.
    Close,
    /// Handled; close the whole open chain from its root.
    CloseChain,
}

/// Behavior attached to mounted content.
///
/// Handlers must not close their own controller from inside [`handle`]; they
/// return [`Response::Close`] or [`Response::CloseChain`] and let the runtime
/// do it once the handler is back in place.
///
/// [`handle`]: ContentHandler::handle
pub trait ContentHandler {
    /// Called once, right after the content is mounted and positioned.
    fn mount(&mut self, cx: &mut SessionCx<'_>) {
        let _ = cx;
    }

    /// Called for events aimed inside the content, or keys aimed at the trigger.
    ///
    /// Errors (for example from opening a nested popup) are returned from
    /// [`Overlays::dispatch`].
    fn handle(&mut self, cx: &mut SessionCx<'_>, event: &Event) -> Result<Response, PopupError>;

    /// Called during disposal, before the content leaves the document.
    fn unmount(&mut self, cx: &mut SessionCx<'_>) {
        let _ = cx;
    }
}

/// Produced content for one open.
pub struct Content {
    /// Root element to mount; removed from the document on close.
    pub root: NodeId,
    /// Runs first during disposal, while the content is still mounted.
    pub on_close: Option<Box<dyn FnOnce(&mut Document)>>,
    /// Optional behavior (for example a menu state machine).
    pub handler: Option<Box<dyn ContentHandler>>,
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Content")
            .field("root", &self.root)
            .field("on_close", &self.on_close.is_some())
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

impl Content {
    /// Plain content without callbacks.
    pub fn new(root: NodeId) -> Self {
        Self {
            root,
            on_close: None,
            handler: None,
        }
    }

    /// Attach an `on_close` callback.
    pub fn on_close(mut self, f: impl FnOnce(&mut Document) + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    /// Attach a content handler.
    pub fn handler(mut self, handler: impl ContentHandler + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }
}

/// Context handed to content producers.
pub struct ContentCx<'a> {
    pub(crate) overlays: &'a mut Overlays,
    pub(crate) controller: ControllerId,
    pub(crate) trigger: NodeId,
    pub(crate) options: &'a ResolvedOptions,
}

impl fmt::Debug for ContentCx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentCx")
            .field("controller", &self.controller)
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

impl ContentCx<'_> {
    /// The runtime, for building elements and nested popup sites.
    pub fn overlays(&mut self) -> &mut Overlays {
        self.overlays
    }

    /// Shorthand for the runtime's document.
    pub fn document(&mut self) -> &mut Document {
        self.overlays.document_mut()
    }

    /// The controller being opened.
    pub fn controller(&self) -> ControllerId {
        self.controller
    }

    /// The trigger element.
    pub fn trigger(&self) -> NodeId {
        self.trigger
    }

    /// Effective options of this open.
    pub fn options(&self) -> &ResolvedOptions {
        self.options
    }
}

/// Context handed to [`ContentHandler`] callbacks.
pub struct SessionCx<'a> {
    pub(crate) overlays: &'a mut Overlays,
    pub(crate) controller: ControllerId,
    pub(crate) trigger: NodeId,
    pub(crate) content: NodeId,
    pub(crate) options: &'a ResolvedOptions,
    pub(crate) restore_focus: bool,
}

impl fmt::Debug for SessionCx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCx")
            .field("controller", &self.controller)
            .field("trigger", &self.trigger)
            .field("content", &self.content)
            .finish_non_exhaustive()
    }
}

impl SessionCx<'_> {
    /// The runtime, for driving nested popup sites.
    pub fn overlays(&mut self) -> &mut Overlays {
        self.overlays
    }

    /// Shorthand for the runtime's document.
    pub fn document(&mut self) -> &mut Document {
        self.overlays.document_mut()
    }

    /// Current runtime time in milliseconds.
    pub fn now(&self) -> u64 {
        self.overlays.now()
    }

    /// The controller owning this session.
    pub fn controller(&self) -> ControllerId {
        self.controller
    }

    /// The trigger element.
    pub fn trigger(&self) -> NodeId {
        self.trigger
    }

    /// Root of the mounted content.
    pub fn content(&self) -> NodeId {
        self.content
    }

    /// Effective options of this session.
    pub fn options(&self) -> &ResolvedOptions {
        self.options
    }

    /// Whether focus may be handed back to the trigger.
    ///
    /// False when the trigger is gone or is being removed.
    pub fn may_restore_focus(&self) -> bool {
        self.restore_focus && self.overlays.document().is_connected(self.trigger)
    }
}

/// Identity of one open; a reopen gets a fresh id.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(crate) u64);

pub(crate) struct OpenSession {
    pub(crate) id: SessionId,
    pub(crate) trigger: NodeId,
    pub(crate) content: NodeId,
    pub(crate) options: ResolvedOptions,
    pub(crate) handler: Option<Box<dyn ContentHandler>>,
    pub(crate) on_close: Option<Box<dyn FnOnce(&mut Document)>>,
    position: Option<Box<dyn PositionBinding>>,
    marked: SmallVec<[NodeId; 2]>,
    outside_click: bool,
}

impl fmt::Debug for OpenSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenSession")
            .field("id", &self.id)
            .field("trigger", &self.trigger)
            .field("content", &self.content)
            .field("marked", &self.marked)
            .field("outside_click", &self.outside_click)
            .finish_non_exhaustive()
    }
}

impl OpenSession {
    /// Build a session around already-mounted content and apply open markers.
    pub(crate) fn new(
        doc: &mut Document,
        id: SessionId,
        trigger: NodeId,
        content: Content,
        options: ResolvedOptions,
        position: Box<dyn PositionBinding>,
    ) -> Self {
        let mut marked = SmallVec::new();
        doc.add_class(trigger, options.open_class.clone());
        marked.push(trigger);
        if let Some(selector) = &options.parent_selector_to_mark
            && let Some(ancestor) = doc
                .parent_of(trigger)
                .and_then(|p| doc.closest(p, selector))
        {
            doc.add_class(ancestor, options.open_class.clone());
            marked.push(ancestor);
        }
        Self {
            id,
            trigger,
            content: content.root,
            options,
            handler: content.handler,
            on_close: content.on_close,
            position: Some(position),
            marked,
            outside_click: true,
        }
    }

    /// Whether the outside-click watcher is still installed.
    pub(crate) fn watches_outside_clicks(&self) -> bool {
        self.outside_click
    }

    /// Whether `target` is outside both the trigger and the content.
    pub(crate) fn is_outside(&self, doc: &Document, target: NodeId) -> bool {
        !doc.contains(self.trigger, target) && !doc.contains(self.content, target)
    }

    pub(crate) fn reposition(&mut self, doc: &mut Document) {
        if let Some(position) = &mut self.position {
            position.update(doc);
        }
    }

    /// Remove content, release the binding, drop the watcher, revert markers.
    ///
    /// Safe to call more than once.
    pub(crate) fn teardown(&mut self, doc: &mut Document) {
        if doc.is_alive(self.content) {
            doc.remove(self.content);
        }
        if let Some(mut position) = self.position.take() {
            position.destroy(doc);
        }
        self.outside_click = false;
        for node in self.marked.drain(..) {
            doc.remove_class(node, &self.options.open_class);
        }
    }
}
