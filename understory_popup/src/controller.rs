// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-trigger popup state: defaults, triggers, timers, and the open session.

use alloc::boxed::Box;
use core::fmt;

use crate::document::NodeId;
use crate::error::PopupError;
use crate::options::{PopupConfig, PopupOptions, TriggerListener, TriggerState, Triggers};
use crate::session::{Content, ContentCx, OpenSession};
use crate::timer::TimerId;

/// Identifier for a popup controller (generational).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ControllerId(pub(crate) u32, pub(crate) u32);

impl ControllerId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Builds the content for each open.
pub type ContentProducer = Box<dyn FnMut(&mut ContentCx<'_>) -> Result<Content, PopupError>>;

/// An open request waiting on the show delay.
#[derive(Clone, Debug)]
pub(crate) struct PendingOpen {
    pub(crate) options: Option<PopupOptions>,
    pub(crate) force: bool,
}

/// State of one popup site.
///
/// At most one [`OpenSession`] exists at a time, and at most one of the open
/// and close timers is armed.
pub(crate) struct PopupController {
    pub(crate) generation: u32,
    pub(crate) trigger: NodeId,
    pub(crate) defaults: PopupOptions,
    pub(crate) triggers: Triggers,
    pub(crate) listener: Option<TriggerListener>,
    pub(crate) producer: Option<ContentProducer>,
    pub(crate) session: Option<OpenSession>,
    pub(crate) open_timer: Option<TimerId>,
    pub(crate) close_timer: Option<TimerId>,
    pub(crate) pending: Option<PendingOpen>,
}

impl fmt::Debug for PopupController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopupController")
            .field("trigger", &self.trigger)
            .field("triggers", &self.triggers)
            .field("session", &self.session)
            .field("open_timer", &self.open_timer)
            .field("close_timer", &self.close_timer)
            .finish_non_exhaustive()
    }
}

impl PopupController {
    pub(crate) fn new(
        generation: u32,
        trigger: NodeId,
        config: PopupConfig,
        producer: ContentProducer,
    ) -> Self {
        Self {
            generation,
            trigger,
            defaults: config.options,
            triggers: config.triggers,
            listener: config.listener,
            producer: Some(producer),
            session: None,
            open_timer: None,
            close_timer: None,
            pending: None,
        }
    }

    pub(crate) fn state(&self) -> TriggerState {
        TriggerState {
            open: self.session.is_some(),
            open_pending: self.open_timer.is_some(),
            close_pending: self.close_timer.is_some(),
        }
    }

    /// Show delay for an open request: override, else default, else 0.
    pub(crate) fn show_delay(&self, over: Option<&PopupOptions>) -> u64 {
        over.and_then(|o| o.show_delay)
            .or(self.defaults.show_delay)
            .unwrap_or(0)
    }

    /// Hide delay for a close request: override, else the session's, else default, else 0.
    pub(crate) fn hide_delay(&self, over: Option<u64>) -> u64 {
        over.or_else(|| self.session.as_ref().map(|s| s.options.hide_delay))
            .or(self.defaults.hide_delay)
            .unwrap_or(0)
    }
}
