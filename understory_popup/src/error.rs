// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors surfaced to callers of `open`.

use alloc::string::String;
use core::fmt;

use crate::document::NodeId;

/// Failure to materialize a popup.
///
/// When any of these is returned the controller is left closed, never half
/// open: no content is mounted and no open markers are applied.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum PopupError {
    /// The content producer reported a failure.
    Content(String),
    /// The content producer returned an element that is no longer alive.
    DetachedContent(NodeId),
}

impl PopupError {
    /// Content producer failure with a message.
    pub fn content(reason: impl Into<String>) -> Self {
        Self::Content(reason.into())
    }
}

impl fmt::Display for PopupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content(reason) => write!(f, "popup content could not be built: {reason}"),
            Self::DetachedContent(node) => {
                write!(f, "popup content {node:?} is not a live element")
            }
        }
    }
}

impl core::error::Error for PopupError {}
