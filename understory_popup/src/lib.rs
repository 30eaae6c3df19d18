// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Popup: a headless runtime for anchored overlays.
//!
//! A popup site is a trigger element plus a content producer. The runtime
//! decides when content exists, mounts it into a small element [`Document`],
//! positions it next to the trigger, and tears it down again. Hosts feed it
//! input events and the current time; nothing here renders or reads a clock.
//!
//! - [`Overlays`]: owns the document, every popup controller, and the timers.
//! - [`PopupConfig`] / [`PopupOptions`]: built-in triggers, delays, placement,
//!   attach target, and open markers.
//! - [`Content`] / [`ContentHandler`]: what a producer returns, and optional
//!   behavior that receives events aimed inside it.
//! - [`position`]: placement with flip and shift inside a boundary.
//! - [`timer`]: the deadline-ordered scheduler behind show and hide delays.
//!
//! ## Lifecycle
//!
//! - `open` cancels any pending close. With a show delay it arms a timer,
//!   otherwise content is produced synchronously and errors reach the caller.
//! - `close` cancels any pending open. With a hide delay it arms a timer;
//!   reopening before it fires keeps the original session.
//! - Disposal runs nested sites first, then `on_close`, then the handler's
//!   `unmount`, then removes content and reverts markers.
//! - Sites whose trigger lives inside another popup's content form a chain:
//!   closing the parent destroys them, and clicks inside them count as inside
//!   the parent.
//!
//! ## Example
//!
//! ```
//! use kurbo::Rect;
//! use understory_popup::{
//!     Content, ElementProps, Overlays, PopupConfig, PopupOptions, Triggers, Event, EventKind,
//! };
//!
//! let mut overlays = Overlays::new(Rect::new(0.0, 0.0, 640.0, 480.0));
//! let doc = overlays.document_mut();
//! let label = doc.create(ElementProps::with_bounds(Rect::new(20.0, 20.0, 120.0, 40.0)));
//! let body = doc.body();
//! doc.append_child(body, label);
//!
//! let tooltip = overlays.attach(
//!     label,
//!     PopupConfig::new()
//!         .triggers(Triggers::HOVER)
//!         .options(PopupOptions::new().show_delay(300)),
//!     |cx| {
//!         let tip = cx.document().create(ElementProps::with_bounds(Rect::new(0.0, 0.0, 80.0, 24.0)));
//!         Ok(Content::new(tip))
//!     },
//! );
//!
//! overlays.dispatch(Event::new(label, EventKind::PointerEnter)).unwrap();
//! assert!(overlays.is_open_pending(tooltip));
//! overlays.advance(300).unwrap();
//! assert!(overlays.is_open(tooltip));
//! ```
//!
//! ## Logging
//!
//! Lifecycle transitions are logged at `debug` and timer activity at `trace`
//! under the `understory_popup` target. Recovered problems (a failed producer,
//! an attach target that could not be resolved) are logged at `warn`.
//!
//! ## Features
//!
//! - `std` (default): enables `std` support for dependencies such as `kurbo`.
//! - `libm`: enables `no_std` + `alloc` builds that rely on `libm` for floating-point math;
//!   typically used when integrating into embedded or `no_std` environments.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod controller;
mod document;
mod error;
mod event;
mod options;
mod overlays;
mod session;

pub mod position;
pub mod timer;

pub use controller::{ContentProducer, ControllerId};
pub use document::{Document, ElementFlags, ElementProps, NodeId, Selector};
pub use error::PopupError;
pub use event::{Event, EventKind, Key};
pub use options::{
    AttachTarget, DEFAULT_OPEN_CLASS, PopupConfig, PopupOptions, ResolvedOptions, TriggerCommand,
    TriggerListener, TriggerState, Triggers,
};
pub use overlays::Overlays;
pub use position::{Boundary, Placement};
pub use session::{Content, ContentCx, ContentHandler, Response, SessionCx, SessionId};
