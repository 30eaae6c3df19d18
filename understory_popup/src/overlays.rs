// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The popup runtime: controllers, sessions, timers, and event delivery.
//!
//! ## Event delivery
//!
//! [`Overlays::dispatch`] processes one event in three passes:
//!
//! 1. For clicks, every session that existed before the event and whose
//!    trigger and content both lie outside the target is closed.
//! 2. Controllers armed on the target (or one of its ancestors) run their
//!    built-in triggers and custom listeners, innermost first.
//! 3. Content handlers of sessions that existed before the event are offered
//!    the event from the innermost session outward; the first one that does
//!    not answer [`Response::Ignored`] ends propagation.
//!
//! Sessions created while an event is being dispatched never observe that
//! event, so the click that opens a popup does not also dismiss it.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;
use kurbo::Rect;
use smallvec::SmallVec;

use crate::controller::{ContentProducer, ControllerId, PendingOpen, PopupController};
use crate::document::{Document, NodeId};
use crate::error::PopupError;
use crate::event::{Event, EventKind};
use crate::options::{
    AttachTarget, PopupConfig, PopupOptions, ResolvedOptions, TriggerCommand, Triggers,
};
use crate::position::{AnchoredPositioner, PositionEngine, PositionOptions};
use crate::session::{
    Content, ContentCx, ContentHandler, OpenSession, Response, SessionCx, SessionId,
};
use crate::timer::{Scheduler, TimerId};

const LOG_TARGET: &str = "understory_popup";

enum Task {
    Open(ControllerId),
    Close(ControllerId),
    Deferred(Box<dyn FnOnce(&mut Overlays)>),
}

/// Owner of a document and every popup site attached to it.
///
/// ```
/// use kurbo::Rect;
/// use understory_popup::{
///     Content, ElementFlags, ElementProps, Event, Overlays, PopupConfig,
/// };
///
/// let mut overlays = Overlays::new(Rect::new(0.0, 0.0, 800.0, 600.0));
/// let doc = overlays.document_mut();
/// let button = doc.create(
///     ElementProps::with_bounds(Rect::new(10.0, 10.0, 90.0, 30.0)).flags(ElementFlags::TABBABLE),
/// );
/// let body = doc.body();
/// doc.append_child(body, button);
///
/// let popup = overlays.attach(button, PopupConfig::new(), |cx| {
///     let panel = cx
///         .document()
///         .create(ElementProps::with_bounds(Rect::new(0.0, 0.0, 120.0, 60.0)));
///     Ok(Content::new(panel))
/// });
///
/// overlays.dispatch(Event::click(button)).unwrap();
/// assert!(overlays.is_open(popup));
/// assert!(overlays.document().has_class(button, "open"));
///
/// // Clicking the trigger again toggles it closed.
/// overlays.dispatch(Event::click(button)).unwrap();
/// assert!(!overlays.is_open(popup));
/// ```
pub struct Overlays {
    document: Document,
    positioner: Box<dyn PositionEngine>,
    timers: Scheduler<Task>,
    controllers: Vec<Option<PopupController>>,
    /// last generation per slot (persists across frees)
    generations: Vec<u32>,
    free_list: Vec<usize>,
    by_trigger: HashMap<NodeId, SmallVec<[ControllerId; 1]>>,
    now: u64,
    next_session: u64,
}

impl fmt::Debug for Overlays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alive = self.controllers.iter().filter(|c| c.is_some()).count();
        let open = self
            .controllers
            .iter()
            .flatten()
            .filter(|c| c.session.is_some())
            .count();
        f.debug_struct("Overlays")
            .field("now", &self.now)
            .field("controllers_alive", &alive)
            .field("sessions_open", &open)
            .field("timers", &self.timers)
            .finish_non_exhaustive()
    }
}

impl Overlays {
    /// Create a runtime over an empty document using [`AnchoredPositioner`].
    pub fn new(viewport: Rect) -> Self {
        Self::with_positioner(viewport, AnchoredPositioner::default())
    }

    /// Create a runtime over an empty document with a custom position engine.
    pub fn with_positioner(viewport: Rect, positioner: impl PositionEngine + 'static) -> Self {
        Self::with_document(Document::new(viewport), positioner)
    }

    /// Create a runtime over an existing document.
    pub fn with_document(document: Document, positioner: impl PositionEngine + 'static) -> Self {
        Self {
            document,
            positioner: Box::new(positioner),
            timers: Scheduler::new(),
            controllers: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            by_trigger: HashMap::new(),
            now: 0,
            next_session: 0,
        }
    }

    /// The document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The document, mutably.
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Current time in milliseconds, as last passed to [`Overlays::advance`].
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Earliest armed timer deadline, for hosts that sleep until it.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    /// Arm popup behavior on `trigger`.
    ///
    /// `producer` runs on every open and returns the content to mount.
    pub fn attach(
        &mut self,
        trigger: NodeId,
        config: PopupConfig,
        producer: impl FnMut(&mut ContentCx<'_>) -> Result<Content, PopupError> + 'static,
    ) -> ControllerId {
        let producer: ContentProducer = Box::new(producer);
        let id = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.controllers[idx] = Some(PopupController::new(generation, trigger, config, producer));
            #[allow(
                clippy::cast_possible_truncation,
                reason = "ControllerId uses 32-bit indices by design."
            )]
            ControllerId::new(idx as u32, generation)
        } else {
            let generation = 1_u32;
            self.controllers
                .push(Some(PopupController::new(generation, trigger, config, producer)));
            self.generations.push(generation);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "ControllerId uses 32-bit indices by design."
            )]
            ControllerId::new((self.controllers.len() - 1) as u32, generation)
        };
        self.by_trigger.entry(trigger).or_default().push(id);
        log::debug!(target: LOG_TARGET, "attached {id:?} to trigger {trigger:?}");
        id
    }

    /// Destroy a controller, disposing its session first. Idempotent.
    pub fn detach(&mut self, id: ControllerId) {
        self.destroy_controller(id, true);
    }

    /// Whether the controller has not been destroyed.
    pub fn is_alive(&self, id: ControllerId) -> bool {
        self.controller(id).is_some()
    }

    /// Trigger element of a live controller.
    pub fn trigger_of(&self, id: ControllerId) -> Option<NodeId> {
        self.controller(id).map(|c| c.trigger)
    }

    /// Controllers armed on exactly this element.
    pub fn controllers_for(&self, trigger: NodeId) -> &[ControllerId] {
        self.by_trigger
            .get(&trigger)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    /// True iff a session exists. A pending open does not count; a pending
    /// close still does.
    pub fn is_open(&self, id: ControllerId) -> bool {
        self.session(id).is_some()
    }

    /// Whether an open timer is armed.
    pub fn is_open_pending(&self, id: ControllerId) -> bool {
        self.controller(id).is_some_and(|c| c.open_timer.is_some())
    }

    /// Whether a close timer is armed.
    pub fn is_close_pending(&self, id: ControllerId) -> bool {
        self.controller(id).is_some_and(|c| c.close_timer.is_some())
    }

    /// Root element of the open session.
    pub fn content_of(&self, id: ControllerId) -> Option<NodeId> {
        self.session(id).map(|s| s.content)
    }

    /// Identity of the open session; changes on every reopen.
    pub fn session_id(&self, id: ControllerId) -> Option<SessionId> {
        self.session(id).map(|s| s.id)
    }

    /// Effective options of the open session.
    pub fn session_options(&self, id: ControllerId) -> Option<&ResolvedOptions> {
        self.session(id).map(|s| &s.options)
    }

    /// Controllers with an open session.
    pub fn open_controllers(&self) -> Vec<ControllerId> {
        self.iter_controllers()
            .filter(|(_, c)| c.session.is_some())
            .map(|(id, _)| id)
            .collect()
    }

    /// Request an open.
    ///
    /// A pending close is always cancelled. Without `force_reopen`, opening an
    /// already open popup with no open timer armed does nothing. Otherwise the
    /// session is created after the show delay (override, else default, else
    /// 0); a delay of 0 creates it synchronously, so content errors surface
    /// here. `force_reopen` disposes any current session before creating the
    /// new one.
    pub fn open(
        &mut self,
        id: ControllerId,
        options: Option<PopupOptions>,
        force_reopen: bool,
    ) -> Result<(), PopupError> {
        let now = self.now;
        let Some(c) = self.controller_mut(id) else {
            log::trace!(target: LOG_TARGET, "open on disposed {id:?} ignored");
            return Ok(());
        };
        let stale_close = c.close_timer.take();
        if !force_reopen && c.session.is_some() && c.open_timer.is_none() {
            if let Some(timer) = stale_close {
                self.timers.cancel(timer);
            }
            return Ok(());
        }
        let delay = c.show_delay(options.as_ref());
        let stale_open = c.open_timer.take();
        c.pending = None;
        for timer in [stale_close, stale_open].into_iter().flatten() {
            self.timers.cancel(timer);
        }

        if delay == 0 {
            return self.create_session(id, options, force_reopen);
        }
        let at = now.saturating_add(delay);
        let timer = self.timers.schedule(at, Task::Open(id));
        log::trace!(target: LOG_TARGET, "{id:?} opens at {at}");
        if let Some(c) = self.controller_mut(id) {
            c.open_timer = Some(timer);
            c.pending = Some(PendingOpen {
                options,
                force: force_reopen,
            });
        }
        Ok(())
    }

    /// Request a close.
    ///
    /// A pending open is always cancelled. The session is disposed after the
    /// hide delay (override, else the session's, else 0).
    pub fn close(&mut self, id: ControllerId, delay: Option<u64>) {
        let now = self.now;
        let Some(c) = self.controller_mut(id) else {
            return;
        };
        let stale_open = c.open_timer.take();
        c.pending = None;
        let open = c.session.is_some();
        let delay = c.hide_delay(delay);
        let stale_close = if open { c.close_timer.take() } else { None };
        for timer in [stale_open, stale_close].into_iter().flatten() {
            self.timers.cancel(timer);
        }
        if !open {
            return;
        }
        if delay == 0 {
            self.dispose_session(id, true);
            return;
        }
        let at = now.saturating_add(delay);
        let timer = self.timers.schedule(at, Task::Close(id));
        log::trace!(target: LOG_TARGET, "{id:?} closes at {at}");
        if let Some(c) = self.controller_mut(id) {
            c.close_timer = Some(timer);
        }
    }

    /// Open (forcing a fresh session) if closed, else close.
    pub fn toggle(&mut self, id: ControllerId) -> Result<(), PopupError> {
        if self.controller(id).is_some_and(|c| c.session.is_none()) {
            self.open(id, None, true)
        } else {
            self.close(id, None);
            Ok(())
        }
    }

    /// Refresh the placement of an open session.
    pub fn update(&mut self, id: ControllerId) {
        let Self {
            controllers,
            document,
            ..
        } = self;
        if let Some(Some(c)) = controllers.get_mut(id.idx())
            && c.generation == id.1
            && let Some(session) = &mut c.session
        {
            session.reposition(document);
        }
    }

    /// The open controller whose content hosts this controller's trigger.
    pub fn parent_of(&self, id: ControllerId) -> Option<ControllerId> {
        let trigger = self.controller(id)?.trigger;
        self.iter_controllers()
            .filter(|(cid, _)| *cid != id)
            .filter_map(|(cid, c)| {
                let session = c.session.as_ref()?;
                self.document
                    .contains(session.content, trigger)
                    .then(|| (cid, self.document.depth(session.content)))
            })
            .max_by_key(|&(_, depth)| depth)
            .map(|(cid, _)| cid)
    }

    /// Outermost controller of the open chain containing `id`.
    ///
    /// A chain is a root popup plus its nested submenus: the walk climbs from
    /// `id` only while the current session is marked as a submenu, so a plain
    /// popup hosting the chain's trigger is never part of it.
    pub fn chain_root(&self, id: ControllerId) -> ControllerId {
        let mut root = id;
        for _ in 0..self.controllers.len() {
            if !self.session(root).is_some_and(|s| s.options.is_submenu) {
                break;
            }
            match self.parent_of(root) {
                Some(parent) => root = parent,
                None => break,
            }
        }
        root
    }

    /// Close the whole open chain containing `id`, from its root.
    pub fn close_chain(&mut self, id: ControllerId) {
        let root = self.chain_root(id);
        log::debug!(target: LOG_TARGET, "closing chain of {id:?} from {root:?}");
        self.close(root, None);
    }

    /// Remove an element from the document, destroying every controller armed
    /// inside it and disposing every session mounted inside it first.
    ///
    /// Focus is never restored to a trigger that is going away.
    pub fn remove_element(&mut self, node: NodeId) {
        if !self.document.is_alive(node) || node == self.document.body() {
            return;
        }
        self.document.detach(node);

        let mut doomed: Vec<(usize, ControllerId)> = self
            .iter_controllers()
            .filter(|(_, c)| self.document.contains(node, c.trigger))
            .map(|(id, c)| (self.document.depth(c.trigger), id))
            .collect();
        doomed.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, id) in doomed {
            self.destroy_controller(id, false);
        }

        let hosted: Vec<ControllerId> = self
            .iter_controllers()
            .filter(|(_, c)| {
                c.session
                    .as_ref()
                    .is_some_and(|s| self.document.contains(node, s.content))
            })
            .map(|(id, _)| id)
            .collect();
        for id in hosted {
            self.dispose_session(id, false);
        }

        self.document.remove(node);
    }

    /// Deliver one input event. Returns the response of the content handler
    /// that ended propagation, or [`Response::Ignored`].
    pub fn dispatch(&mut self, event: Event) -> Result<Response, PopupError> {
        let target = event.target;
        if !self.document.is_alive(target) {
            return Ok(Response::Ignored);
        }
        let snapshot = self.session_snapshot();

        if event.kind == EventKind::Click {
            for &(id, sid) in &snapshot {
                let outside = self
                    .session(id)
                    .filter(|s| s.id == sid && s.watches_outside_clicks())
                    .is_some_and(|s| s.is_outside(&self.document, target));
                if outside {
                    log::debug!(target: LOG_TARGET, "outside click closes {id:?}");
                    self.dispose_session(id, true);
                }
            }
        }

        self.run_triggers(&event)?;

        let is_key = matches!(event.kind, EventKind::KeyDown(_));
        for (id, sid) in snapshot {
            let Some(session) = self.session(id).filter(|s| s.id == sid) else {
                continue;
            };
            let aimed = self.document.contains(session.content, target)
                || (is_key && !session.options.is_submenu && session.trigger == target);
            if !aimed {
                continue;
            }
            let Some(response) = self.with_handler(id, sid, true, |h, cx| h.handle(cx, &event))
            else {
                continue;
            };
            let response = response?;
            match response {
                Response::Ignored => continue,
                Response::Handled => {}
                Response::Close => self.close(id, None),
                Response::CloseChain => self.close_chain(id),
            }
            return Ok(response);
        }
        Ok(Response::Ignored)
    }

    /// Advance the clock to `now` and fire every due timer in deadline order.
    ///
    /// If a delayed open fails, the error is returned immediately and later
    /// due timers stay armed for the next call.
    pub fn advance(&mut self, now: u64) -> Result<(), PopupError> {
        self.now = self.now.max(now);
        while let Some((_, task)) = self.timers.pop_due(self.now) {
            match task {
                Task::Open(id) => {
                    let pending = self.controller_mut(id).and_then(|c| {
                        c.open_timer = None;
                        c.pending.take()
                    });
                    if let Some(pending) = pending {
                        self.create_session(id, pending.options, pending.force)?;
                    }
                }
                Task::Close(id) => {
                    if let Some(c) = self.controller_mut(id) {
                        c.close_timer = None;
                    }
                    self.dispose_session(id, true);
                }
                Task::Deferred(f) => f(self),
            }
        }
        Ok(())
    }

    /// Run `f` after `delay` milliseconds of runtime time.
    pub fn defer(&mut self, delay: u64, f: impl FnOnce(&mut Self) + 'static) -> TimerId {
        self.timers
            .schedule(self.now.saturating_add(delay), Task::Deferred(Box::new(f)))
    }

    /// Cancel a timer armed with [`Overlays::defer`].
    pub fn cancel_timer(&mut self, timer: TimerId) -> bool {
        self.timers.cancel(timer).is_some()
    }

    fn controller(&self, id: ControllerId) -> Option<&PopupController> {
        let c = self.controllers.get(id.idx())?.as_ref()?;
        (c.generation == id.1).then_some(c)
    }

    fn controller_mut(&mut self, id: ControllerId) -> Option<&mut PopupController> {
        let c = self.controllers.get_mut(id.idx())?.as_mut()?;
        (c.generation == id.1).then_some(c)
    }

    fn session(&self, id: ControllerId) -> Option<&OpenSession> {
        self.controller(id)?.session.as_ref()
    }

    fn iter_controllers(&self) -> impl Iterator<Item = (ControllerId, &PopupController)> {
        self.controllers.iter().enumerate().filter_map(|(idx, slot)| {
            let c = slot.as_ref()?;
            #[allow(
                clippy::cast_possible_truncation,
                reason = "ControllerId uses 32-bit indices by design."
            )]
            Some((ControllerId::new(idx as u32, c.generation), c))
        })
    }

    /// Open sessions, innermost (deepest content) first.
    fn session_snapshot(&self) -> Vec<(ControllerId, SessionId)> {
        let mut open: Vec<(usize, ControllerId, SessionId)> = self
            .iter_controllers()
            .filter_map(|(id, c)| {
                let s = c.session.as_ref()?;
                Some((self.document.depth(s.content), id, s.id))
            })
            .collect();
        open.sort_by(|a, b| b.0.cmp(&a.0).then(b.2.cmp(&a.2)));
        open.into_iter().map(|(_, id, sid)| (id, sid)).collect()
    }

    fn run_triggers(&mut self, event: &Event) -> Result<(), PopupError> {
        let mut armed: SmallVec<[ControllerId; 4]> = SmallVec::new();
        let mut current = Some(event.target);
        while let Some(node) = current {
            armed.extend(self.controllers_for(node).iter().copied());
            current = self.document.parent_of(node);
        }

        for id in armed {
            let Some(c) = self.controller(id) else {
                continue;
            };
            let exact = c.trigger == event.target;
            let builtin = match event.kind {
                EventKind::Click if c.triggers.contains(Triggers::CLICK) => {
                    Some(TriggerCommand::Toggle)
                }
                EventKind::PointerEnter if exact && c.triggers.contains(Triggers::HOVER) => {
                    Some(TriggerCommand::Open(None))
                }
                EventKind::PointerLeave if exact && c.triggers.contains(Triggers::HOVER) => {
                    Some(TriggerCommand::Close(None))
                }
                EventKind::Focus if exact && c.triggers.contains(Triggers::FOCUS) => {
                    Some(TriggerCommand::Open(None))
                }
                EventKind::Blur if exact && c.triggers.contains(Triggers::FOCUS) => {
                    Some(TriggerCommand::Close(None))
                }
                _ => None,
            };
            if let Some(command) = builtin {
                self.apply(id, command)?;
            }

            let Some(mut listener) = self.controller_mut(id).and_then(|c| c.listener.take())
            else {
                continue;
            };
            let state = self.controller(id).map(|c| c.state()).unwrap_or_default();
            let command = listener(event, state);
            if let Some(c) = self.controller_mut(id) {
                c.listener = Some(listener);
            }
            if let Some(command) = command {
                self.apply(id, command)?;
            }
        }
        Ok(())
    }

    fn apply(&mut self, id: ControllerId, command: TriggerCommand) -> Result<(), PopupError> {
        log::trace!(target: LOG_TARGET, "{id:?} trigger command {command:?}");
        match command {
            TriggerCommand::Open(options) => self.open(id, options, false),
            TriggerCommand::Reopen(options) => self.open(id, options, true),
            TriggerCommand::Close(delay) => {
                self.close(id, delay);
                Ok(())
            }
            TriggerCommand::Toggle => self.toggle(id),
        }
    }

    fn resolve_attach(&self, trigger: NodeId, attach: &AttachTarget) -> NodeId {
        let fallback = self
            .document
            .parent_of(trigger)
            .unwrap_or_else(|| self.document.body());
        match attach {
            AttachTarget::Default => fallback,
            AttachTarget::Element(node) if self.document.is_alive(*node) => *node,
            AttachTarget::Element(node) => {
                log::warn!(target: LOG_TARGET, "attach element {node:?} is gone; using trigger parent");
                fallback
            }
            AttachTarget::Selector(selector) => self
                .document
                .parent_of(trigger)
                .and_then(|p| self.document.closest(p, selector))
                .unwrap_or_else(|| {
                    log::warn!(target: LOG_TARGET, "attach selector {selector:?} matched no ancestor; using trigger parent");
                    fallback
                }),
        }
    }

    fn create_session(
        &mut self,
        id: ControllerId,
        options: Option<PopupOptions>,
        force: bool,
    ) -> Result<(), PopupError> {
        let Some(c) = self.controller(id) else {
            return Ok(());
        };
        if c.session.is_some() {
            if !force {
                return Ok(());
            }
            self.dispose_session(id, true);
        }

        let Some(c) = self.controller_mut(id) else {
            return Ok(());
        };
        let trigger = c.trigger;
        let resolved = match &options {
            Some(over) => c.defaults.merged(over),
            None => c.defaults.clone(),
        }
        .resolve();
        // Producer is missing while it runs; a nested open of the same site is ignored.
        let Some(mut producer) = c.producer.take() else {
            return Ok(());
        };
        let armed_before: Vec<ControllerId> = self.iter_controllers().map(|(cid, _)| cid).collect();
        let mark = self.document.creation_mark();
        let produced = producer(&mut ContentCx {
            overlays: self,
            controller: id,
            trigger,
            options: &resolved,
        });
        if let Some(c) = self.controller_mut(id) {
            c.producer = Some(producer);
        }
        let content = match produced {
            Ok(content) => content,
            Err(err) => {
                log::warn!(target: LOG_TARGET, "{id:?} stays closed: {err}");
                self.discard_partial(id, &armed_before, mark);
                return Err(err);
            }
        };
        if !self.document.is_alive(content.root) {
            log::warn!(target: LOG_TARGET, "{id:?} stays closed: content {:?} is gone", content.root);
            self.discard_partial(id, &armed_before, mark);
            return Err(PopupError::DetachedContent(content.root));
        }
        if !self.is_alive(id) {
            self.document.remove(content.root);
            self.discard_partial(id, &armed_before, mark);
            return Ok(());
        }

        let container = self.resolve_attach(trigger, &resolved.attach);
        self.document.append_child(container, content.root);
        let position = self.positioner.create(
            &mut self.document,
            trigger,
            content.root,
            &PositionOptions {
                placement: resolved.placement,
                boundary: resolved.boundary,
            },
        );
        let sid = SessionId(self.next_session);
        self.next_session += 1;
        let session = OpenSession::new(&mut self.document, sid, trigger, content, resolved, position);
        if let Some(c) = self.controller_mut(id) {
            c.session = Some(session);
        }
        log::debug!(target: LOG_TARGET, "{id:?} opened session {sid:?}");

        self.with_handler(id, sid, true, |h, cx| h.mount(cx));
        Ok(())
    }

    /// Undo what a producer built before its open failed: controllers it
    /// attached and orphan elements it created.
    fn discard_partial(&mut self, id: ControllerId, armed_before: &[ControllerId], mark: u64) {
        let stray: Vec<ControllerId> = self
            .iter_controllers()
            .map(|(cid, _)| cid)
            .filter(|cid| *cid != id && !armed_before.contains(cid))
            .collect();
        for cid in stray {
            self.destroy_controller(cid, false);
        }
        for node in self.document.detached_since(mark) {
            self.document.remove(node);
        }
    }

    /// Dispose the open session, nested sites first. Idempotent.
    fn dispose_session(&mut self, id: ControllerId, restore_focus: bool) {
        let Some(c) = self.controller_mut(id) else {
            return;
        };
        let Some(mut session) = c.session.take() else {
            return;
        };
        let stale_close = c.close_timer.take();
        if let Some(timer) = stale_close {
            self.timers.cancel(timer);
        }

        let mut nested: Vec<(usize, ControllerId)> = self
            .iter_controllers()
            .filter(|(cid, c)| *cid != id && self.document.contains(session.content, c.trigger))
            .map(|(cid, c)| (self.document.depth(c.trigger), cid))
            .collect();
        nested.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, nested_id) in nested {
            self.destroy_controller(nested_id, restore_focus);
        }

        if let Some(on_close) = session.on_close.take() {
            on_close(&mut self.document);
        }
        if let Some(mut handler) = session.handler.take() {
            let options = session.options.clone();
            handler.unmount(&mut SessionCx {
                overlays: self,
                controller: id,
                trigger: session.trigger,
                content: session.content,
                options: &options,
                restore_focus,
            });
        }
        session.teardown(&mut self.document);
        log::debug!(target: LOG_TARGET, "{id:?} disposed session {:?}", session.id);
    }

    fn destroy_controller(&mut self, id: ControllerId, restore_focus: bool) {
        if !self.is_alive(id) {
            return;
        }
        self.dispose_session(id, restore_focus);
        let Some(c) = self.controllers.get_mut(id.idx()).and_then(Option::take) else {
            return;
        };
        for timer in [c.open_timer, c.close_timer].into_iter().flatten() {
            self.timers.cancel(timer);
        }
        if let Some(ids) = self.by_trigger.get_mut(&c.trigger) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_trigger.remove(&c.trigger);
            }
        }
        self.free_list.push(id.idx());
        log::debug!(target: LOG_TARGET, "destroyed {id:?}");
    }

    /// Run `f` with the session's handler taken out, then put it back if the
    /// same session is still open.
    fn with_handler<R>(
        &mut self,
        id: ControllerId,
        sid: SessionId,
        restore_focus: bool,
        f: impl FnOnce(&mut dyn ContentHandler, &mut SessionCx<'_>) -> R,
    ) -> Option<R> {
        let session = self
            .controller_mut(id)?
            .session
            .as_mut()
            .filter(|s| s.id == sid)?;
        let mut handler = session.handler.take()?;
        let (trigger, content, options) = (session.trigger, session.content, session.options.clone());
        let result = f(
            handler.as_mut(),
            &mut SessionCx {
                overlays: self,
                controller: id,
                trigger,
                content,
                options: &options,
                restore_focus,
            },
        );
        if let Some(session) = self
            .controller_mut(id)
            .and_then(|c| c.session.as_mut())
            .filter(|s| s.id == sid)
        {
            session.handler = Some(handler);
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::vec;
    use core::cell::Cell;

    use super::*;
    use crate::document::{ElementFlags, ElementProps, Selector};
    use crate::event::Key;

    fn setup() -> (Overlays, NodeId) {
        let mut overlays = Overlays::new(Rect::new(0.0, 0.0, 800.0, 600.0));
        let doc = overlays.document_mut();
        let button = doc.create(
            ElementProps::with_bounds(Rect::new(10.0, 10.0, 90.0, 30.0))
                .flags(ElementFlags::TABBABLE),
        );
        let body = doc.body();
        doc.append_child(body, button);
        (overlays, button)
    }

    fn panel(cx: &mut ContentCx<'_>) -> Result<Content, PopupError> {
        let root = cx
            .document()
            .create(ElementProps::with_bounds(Rect::new(0.0, 0.0, 100.0, 50.0)).class("panel"));
        Ok(Content::new(root))
    }

    fn counting_panel(
        closes: Rc<Cell<u32>>,
    ) -> impl FnMut(&mut ContentCx<'_>) -> Result<Content, PopupError> {
        move |cx| {
            let closes = closes.clone();
            let root = cx
                .document()
                .create(ElementProps::with_bounds(Rect::new(0.0, 0.0, 100.0, 50.0)));
            Ok(Content::new(root).on_close(move |_| closes.set(closes.get() + 1)))
        }
    }

    #[test]
    fn zero_delay_open_mounts_and_marks_synchronously() {
        let (mut overlays, button) = setup();
        let popup = overlays.attach(button, PopupConfig::new(), panel);
        overlays.open(popup, None, false).unwrap();

        assert!(overlays.is_open(popup), "zero delay opens synchronously");
        let content = overlays.content_of(popup).unwrap();
        let doc = overlays.document();
        assert_eq!(doc.parent_of(content), doc.parent_of(button), "mounted next to trigger");
        assert!(doc.has_class(button, "open"), "trigger marked");
        let placed = doc.world_bounds(content).unwrap();
        assert_eq!(placed.y0, 30.0, "placed below the trigger");

        overlays.close(popup, None);
        assert!(!overlays.is_open(popup), "zero hide delay closes synchronously");
        assert!(!overlays.document().is_alive(content), "content removed");
        assert!(!overlays.document().has_class(button, "open"), "marker reverted");
    }

    #[test]
    fn open_on_open_popup_is_a_no_op() {
        let (mut overlays, button) = setup();
        let popup = overlays.attach(button, PopupConfig::new(), panel);
        overlays.open(popup, None, false).unwrap();
        let first = overlays.session_id(popup);
        overlays.open(popup, None, false).unwrap();
        assert_eq!(overlays.session_id(popup), first, "same session kept");
        overlays.open(popup, None, true).unwrap();
        assert_ne!(overlays.session_id(popup), first, "forced reopen builds a new session");
    }

    #[test]
    fn reopen_before_hide_delay_keeps_the_session() {
        let closes = Rc::new(Cell::new(0));
        let (mut overlays, button) = setup();
        let popup = overlays.attach(
            button,
            PopupConfig::new().options(PopupOptions::new().hide_delay(100)),
            counting_panel(closes.clone()),
        );
        overlays.open(popup, None, false).unwrap();
        let session = overlays.session_id(popup);

        overlays.close(popup, None);
        assert!(overlays.is_close_pending(popup), "close is delayed");
        assert!(overlays.is_open(popup), "still open while the close is pending");

        overlays.advance(50).unwrap();
        overlays.open(popup, None, false).unwrap();
        assert!(!overlays.is_close_pending(popup), "open cancels the close");
        overlays.advance(500).unwrap();

        assert!(overlays.is_open(popup), "never closed");
        assert_eq!(overlays.session_id(popup), session, "original session intact");
        assert_eq!(closes.get(), 0, "on_close never ran");
    }

    #[test]
    fn close_wins_over_pending_open() {
        let (mut overlays, button) = setup();
        let popup = overlays.attach(
            button,
            PopupConfig::new().options(PopupOptions::new().show_delay(200)),
            panel,
        );
        overlays.open(popup, None, false).unwrap();
        assert!(overlays.is_open_pending(popup), "open is delayed");
        assert!(!overlays.is_open(popup), "pending open is not open");

        overlays.advance(100).unwrap();
        overlays.close(popup, None);
        overlays.advance(1_000).unwrap();
        assert!(!overlays.is_open(popup), "cancelled open never fires");
        assert!(!overlays.is_open_pending(popup), "no timer left");
    }

    #[test]
    fn delayed_open_fires_at_the_deadline() {
        let (mut overlays, button) = setup();
        let popup = overlays.attach(button, PopupConfig::new(), panel);
        overlays
            .open(popup, Some(PopupOptions::new().show_delay(200)), false)
            .unwrap();
        assert_eq!(overlays.next_deadline(), Some(200), "one timer armed");
        overlays.advance(199).unwrap();
        assert!(!overlays.is_open(popup), "not yet");
        overlays.advance(200).unwrap();
        assert!(overlays.is_open(popup), "opened at the deadline");
    }

    #[test]
    fn producer_failure_leaves_the_controller_closed() {
        let (mut overlays, button) = setup();
        let popup = overlays.attach(button, PopupConfig::new(), |_| {
            Err(PopupError::content("no data"))
        });
        let err = overlays.open(popup, None, false).unwrap_err();
        assert_eq!(err, PopupError::content("no data"), "error reaches the caller");
        assert!(!overlays.is_open(popup), "not half open");
        assert!(!overlays.document().has_class(button, "open"), "no marker applied");

        overlays
            .open(popup, Some(PopupOptions::new().show_delay(10)), false)
            .unwrap();
        assert!(overlays.advance(10).is_err(), "delayed failure surfaces from advance");
        assert!(!overlays.is_open(popup), "still closed");
    }

    #[test]
    fn failed_opens_release_what_the_producer_built() {
        let built: Rc<core::cell::RefCell<Vec<(NodeId, ControllerId)>>> = Rc::default();
        let (mut overlays, button) = setup();
        let record = built.clone();
        let popup = overlays.attach(button, PopupConfig::new(), move |cx| {
            let doc = cx.document();
            let root = doc.create(ElementProps::default());
            let item = doc.create(ElementProps::default());
            doc.append_child(root, item);
            let nested = cx.overlays().attach(item, PopupConfig::new(), panel);
            record.borrow_mut().push((root, nested));
            Err(PopupError::content("backend offline"))
        });

        for _ in 0..5 {
            assert!(overlays.open(popup, None, false).is_err(), "every open fails");
        }
        let built = built.borrow();
        assert_eq!(built.len(), 5, "producer ran each time");
        for &(root, nested) in built.iter() {
            assert!(!overlays.is_alive(nested), "nested site destroyed");
            assert!(!overlays.document().is_alive(root), "orphan content freed");
        }
        assert!(overlays.is_alive(popup), "the failing site itself survives");
        assert_eq!(
            overlays.iter_controllers().count(),
            1,
            "only the failing site stays armed"
        );
    }

    #[test]
    fn dead_content_root_is_rejected() {
        let (mut overlays, button) = setup();
        let popup = overlays.attach(button, PopupConfig::new(), |cx| {
            let root = cx.document().create(ElementProps::default());
            cx.document().remove(root);
            Ok(Content::new(root))
        });
        let err = overlays.open(popup, None, false).unwrap_err();
        assert!(matches!(err, PopupError::DetachedContent(_)), "got {err:?}");
        assert!(!overlays.is_open(popup), "closed");
    }

    #[test]
    fn outside_click_closes_exactly_once() {
        let closes = Rc::new(Cell::new(0));
        let (mut overlays, button) = setup();
        let elsewhere = {
            let doc = overlays.document_mut();
            let node = doc.create(ElementProps::with_bounds(Rect::new(300.0, 300.0, 400.0, 400.0)));
            let body = doc.body();
            doc.append_child(body, node);
            node
        };
        let popup = overlays.attach(button, PopupConfig::new(), counting_panel(closes.clone()));

        overlays.dispatch(Event::click(button)).unwrap();
        assert!(overlays.is_open(popup), "the opening click does not dismiss");
        let content = overlays.content_of(popup).unwrap();

        overlays.dispatch(Event::click(content)).unwrap();
        assert!(overlays.is_open(popup), "click inside content keeps it open");

        overlays.dispatch(Event::click(elsewhere)).unwrap();
        assert!(!overlays.is_open(popup), "outside click closes");
        overlays.dispatch(Event::click(elsewhere)).unwrap();
        assert_eq!(closes.get(), 1, "on_close ran once");
    }

    #[test]
    fn hover_trigger_honors_delays() {
        let (mut overlays, button) = setup();
        let popup = overlays.attach(
            button,
            PopupConfig::new()
                .triggers(Triggers::HOVER)
                .options(PopupOptions::new().show_delay(100).hide_delay(100)),
            panel,
        );
        overlays
            .dispatch(Event::new(button, EventKind::PointerEnter))
            .unwrap();
        overlays.advance(100).unwrap();
        assert!(overlays.is_open(popup), "opened after the show delay");

        overlays
            .dispatch(Event::new(button, EventKind::PointerLeave))
            .unwrap();
        overlays.advance(150).unwrap();
        assert!(overlays.is_open(popup), "close still pending");
        overlays.advance(200).unwrap();
        assert!(!overlays.is_open(popup), "closed after the hide delay");
    }

    #[test]
    fn focus_trigger_opens_on_focus_and_closes_on_blur() {
        let (mut overlays, button) = setup();
        let popup = overlays.attach(button, PopupConfig::new().triggers(Triggers::FOCUS), panel);

        overlays.dispatch(Event::click(button)).unwrap();
        assert!(!overlays.is_open(popup), "click is not armed");
        overlays
            .dispatch(Event::new(button, EventKind::Focus))
            .unwrap();
        assert!(overlays.is_open(popup), "focus opens");
        overlays
            .dispatch(Event::new(button, EventKind::Blur))
            .unwrap();
        assert!(!overlays.is_open(popup), "blur closes");
    }

    #[test]
    fn update_follows_a_moved_trigger() {
        let (mut overlays, button) = setup();
        let popup = overlays.attach(button, PopupConfig::new(), panel);
        overlays.open(popup, None, false).unwrap();
        let content = overlays.content_of(popup).unwrap();
        assert_eq!(
            overlays.document().world_bounds(content).map(|r| r.y0),
            Some(30.0),
            "placed below the trigger"
        );

        overlays
            .document_mut()
            .set_bounds(button, Rect::new(10.0, 100.0, 90.0, 120.0));
        assert_eq!(
            overlays.document().world_bounds(content).map(|r| r.y0),
            Some(30.0),
            "placement is not refreshed on its own"
        );
        overlays.update(popup);
        assert_eq!(
            overlays.document().world_bounds(content).map(|r| r.y0),
            Some(120.0),
            "update re-anchors the content"
        );
    }

    #[test]
    fn reopen_command_replaces_the_session() {
        let closes = Rc::new(Cell::new(0));
        let (mut overlays, button) = setup();
        let popup = overlays.attach(
            button,
            PopupConfig::new()
                .triggers(Triggers::empty())
                .listener(|event, _| match event.kind {
                    EventKind::ContextMenu => Some(TriggerCommand::Reopen(None)),
                    _ => None,
                }),
            counting_panel(closes.clone()),
        );
        let menu_request = Event::new(button, EventKind::ContextMenu);

        overlays.dispatch(menu_request).unwrap();
        let first = overlays.session_id(popup);
        assert!(first.is_some(), "first request opens");

        overlays.dispatch(menu_request).unwrap();
        let second = overlays.session_id(popup);
        assert!(second.is_some(), "still open");
        assert_ne!(second, first, "fresh session");
        assert_eq!(closes.get(), 1, "old session disposed once");
    }

    #[test]
    fn huge_delays_saturate_instead_of_overflowing() {
        let (mut overlays, button) = setup();
        let popup = overlays.attach(button, PopupConfig::new(), panel);
        overlays.advance(10).unwrap();
        overlays
            .open(popup, Some(PopupOptions::new().show_delay(u64::MAX)), false)
            .unwrap();
        assert_eq!(overlays.next_deadline(), Some(u64::MAX), "deadline clamps");
        overlays.defer(u64::MAX, |_| {});
        overlays.advance(1_000_000).unwrap();
        assert!(overlays.is_open_pending(popup), "effectively never");
    }

    #[test]
    fn custom_listener_drives_the_controller() {
        let (mut overlays, button) = setup();
        let popup = overlays.attach(
            button,
            PopupConfig::new()
                .triggers(Triggers::empty())
                .listener(|event, state| match event.kind {
                    EventKind::ContextMenu if !state.open => Some(TriggerCommand::Open(None)),
                    _ => None,
                }),
            panel,
        );
        overlays.dispatch(Event::click(button)).unwrap();
        assert!(!overlays.is_open(popup), "click is not armed");
        overlays
            .dispatch(Event::new(button, EventKind::ContextMenu))
            .unwrap();
        assert!(overlays.is_open(popup), "listener opened it");
    }

    #[test]
    fn parent_selector_receives_the_marker() {
        let (mut overlays, button) = setup();
        let bar = {
            let doc = overlays.document_mut();
            let body = doc.body();
            let bar = doc.create(ElementProps::default().class("menubar"));
            doc.append_child(body, bar);
            doc.append_child(bar, button);
            bar
        };
        let popup = overlays.attach(
            button,
            PopupConfig::new()
                .options(PopupOptions::new().mark_parent(Selector::class("menubar")).open_class("active")),
            panel,
        );
        overlays.open(popup, None, false).unwrap();
        assert!(overlays.document().has_class(bar, "active"), "ancestor marked");
        overlays.close(popup, None);
        assert!(!overlays.document().has_class(bar, "active"), "ancestor unmarked");
    }

    #[test]
    fn selector_attach_falls_back_to_trigger_parent() {
        let (mut overlays, button) = setup();
        let popup = overlays.attach(
            button,
            PopupConfig::new().options(
                PopupOptions::new().attach(AttachTarget::Selector(Selector::class("missing"))),
            ),
            panel,
        );
        overlays.open(popup, None, false).unwrap();
        let content = overlays.content_of(popup).unwrap();
        let body = overlays.document().body();
        assert_eq!(overlays.document().parent_of(content), Some(body), "fallback used");
    }

    /// Arms a nested site on the first child of its content.
    fn nested_panel(
        nested: Rc<Cell<Option<ControllerId>>>,
        submenu: bool,
    ) -> impl FnMut(&mut ContentCx<'_>) -> Result<Content, PopupError> {
        move |cx| {
            let doc = cx.document();
            let root = doc.create(ElementProps::with_bounds(Rect::new(0.0, 0.0, 100.0, 80.0)));
            let item = doc.create(ElementProps::with_bounds(Rect::new(0.0, 0.0, 100.0, 20.0)));
            doc.append_child(root, item);
            let child = cx.overlays().attach(
                item,
                PopupConfig::new().options(
                    PopupOptions::new()
                        .attach(AttachTarget::Element(root))
                        .submenu(submenu),
                ),
                panel,
            );
            nested.set(Some(child));
            Ok(Content::new(root))
        }
    }

    #[test]
    fn closing_a_parent_destroys_nested_sites() {
        let nested = Rc::new(Cell::new(None));
        let (mut overlays, button) = setup();
        let parent = overlays.attach(button, PopupConfig::new(), nested_panel(nested.clone(), true));
        overlays.open(parent, None, false).unwrap();
        let child = nested.get().unwrap();
        overlays.open(child, None, false).unwrap();
        assert!(overlays.is_open(child), "child open");

        assert_eq!(overlays.parent_of(child), Some(parent), "chain link");
        assert_eq!(overlays.chain_root(child), parent, "chain root");

        let child_content = overlays.content_of(child).unwrap();
        let item = overlays.trigger_of(child).unwrap();
        overlays.dispatch(Event::click(child_content)).unwrap();
        assert!(overlays.is_open(parent), "click in child content is inside the parent");
        assert!(overlays.document().contains(overlays.content_of(parent).unwrap(), item), "item lives in parent");

        overlays.close_chain(child);
        assert!(!overlays.is_open(parent), "root closed");
        assert!(!overlays.is_alive(child), "nested site destroyed");
        assert!(!overlays.document().is_alive(child_content), "nested content removed");
    }

    #[test]
    fn chain_stops_at_a_plain_host_popup() {
        let nested = Rc::new(Cell::new(None));
        let (mut overlays, button) = setup();
        let host = overlays.attach(button, PopupConfig::new(), nested_panel(nested.clone(), false));
        overlays.open(host, None, false).unwrap();
        let inner = nested.get().unwrap();
        overlays.open(inner, None, false).unwrap();

        assert_eq!(overlays.parent_of(inner), Some(host), "hosted inside the outer popup");
        assert_eq!(overlays.chain_root(inner), inner, "a non-submenu is its own chain root");

        overlays.close_chain(inner);
        assert!(!overlays.is_open(inner), "inner chain closed");
        assert!(overlays.is_open(host), "host popup untouched");
    }

    #[test]
    fn removing_the_trigger_destroys_without_restoring_focus() {
        struct Restore(Rc<Cell<Option<bool>>>);
        impl ContentHandler for Restore {
            fn handle(&mut self, _: &mut SessionCx<'_>, _: &Event) -> Result<Response, PopupError> {
                Ok(Response::Ignored)
            }
            fn unmount(&mut self, cx: &mut SessionCx<'_>) {
                self.0.set(Some(cx.may_restore_focus()));
            }
        }

        let seen = Rc::new(Cell::new(None));
        let (mut overlays, button) = setup();
        let handler_seen = seen.clone();
        let popup = overlays.attach(button, PopupConfig::new(), move |cx| {
            let root = cx.document().create(ElementProps::default());
            Ok(Content::new(root).handler(Restore(handler_seen.clone())))
        });
        overlays.open(popup, None, false).unwrap();
        let content = overlays.content_of(popup).unwrap();

        overlays.remove_element(button);
        assert!(!overlays.is_alive(popup), "controller destroyed");
        assert!(!overlays.document().is_alive(content), "content removed");
        assert!(!overlays.document().is_alive(button), "trigger removed");
        assert_eq!(seen.get(), Some(false), "focus restore suppressed");

        overlays.open(popup, None, false).unwrap();
        overlays.close(popup, None);
        assert!(overlays.controllers_for(button).is_empty(), "index cleaned up");
    }

    #[test]
    fn handler_response_closes_and_stops_propagation() {
        struct EscapeCloses;
        impl ContentHandler for EscapeCloses {
            fn handle(&mut self, _: &mut SessionCx<'_>, event: &Event) -> Result<Response, PopupError> {
                Ok(match event.as_key() {
                    Some(Key::Escape) => Response::Close,
                    Some(_) => Response::Handled,
                    None => Response::Ignored,
                })
            }
        }

        let (mut overlays, button) = setup();
        let popup = overlays.attach(button, PopupConfig::new(), |cx| {
            let root = cx.document().create(ElementProps::default());
            Ok(Content::new(root).handler(EscapeCloses))
        });
        overlays.open(popup, None, false).unwrap();
        let content = overlays.content_of(popup).unwrap();

        let response = overlays.dispatch(Event::key(content, Key::Tab)).unwrap();
        assert_eq!(response, Response::Handled, "handled keys stop");
        assert!(overlays.is_open(popup), "still open");

        let response = overlays.dispatch(Event::key(content, Key::Escape)).unwrap();
        assert_eq!(response, Response::Close, "escape closes");
        assert!(!overlays.is_open(popup), "closed");
    }

    #[test]
    fn deferred_tasks_run_in_deadline_order() {
        let (mut overlays, _) = setup();
        let log = Rc::new(core::cell::RefCell::new(vec![]));
        let (a, b) = (log.clone(), log.clone());
        overlays.defer(20, move |_| a.borrow_mut().push("late"));
        overlays.defer(10, move |_| b.borrow_mut().push("early"));
        let cancelled = overlays.defer(15, |_| unreachable!("cancelled"));
        assert!(overlays.cancel_timer(cancelled), "cancel succeeds");
        overlays.advance(30).unwrap();
        assert_eq!(*log.borrow(), vec!["early", "late"], "deadline order");
    }

    #[test]
    fn stale_ids_are_ignored() {
        let (mut overlays, button) = setup();
        let popup = overlays.attach(button, PopupConfig::new(), panel);
        overlays.detach(popup);
        overlays.detach(popup);
        assert!(overlays.open(popup, None, false).is_ok(), "open on disposed is a no-op");
        let reused = overlays.attach(button, PopupConfig::new(), panel);
        assert_ne!(reused, popup, "generation bumped");
        assert!(!overlays.is_open(reused), "fresh controller is closed");
    }
}
