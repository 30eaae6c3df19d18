// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Type-ahead matching with repeated-key cycling.
//!
//! Typing a character appends it to the search term and restarts the cycle.
//! Typing the single character of a one-character term again advances the
//! cycle to the next item with that prefix instead. After
//! [`TYPE_AHEAD_RESET_MS`] without keystrokes the term starts over.
//!
//! ```
//! use understory_menu::NavigationCycleState;
//!
//! let labels = ["apple", "apricot", "banana"];
//! let mut cycle = NavigationCycleState::new();
//!
//! cycle.push(0, 'a');
//! let matches: Vec<usize> = (0..labels.len()).filter(|&i| cycle.matches(labels[i])).collect();
//! assert_eq!(cycle.pick(&matches), Some(0));
//!
//! cycle.push(10, 'a');
//! assert_eq!(cycle.pick(&matches), Some(1));
//! ```

use alloc::string::String;

/// Inactivity after which the search term is cleared, in milliseconds.
pub const TYPE_AHEAD_RESET_MS: u64 = 1000;

/// Search term and cycle position for type-ahead selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NavigationCycleState {
    term: String,
    cycle_index: usize,
    reset_at: u64,
}

impl NavigationCycleState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current search term.
    pub fn term(&self) -> &str {
        &self.term
    }

    /// Position within the current set of matches.
    pub fn cycle_index(&self) -> usize {
        self.cycle_index
    }

    /// Clear the term.
    pub fn reset(&mut self) {
        self.term.clear();
        self.cycle_index = 0;
    }

    /// Accept a keystroke at time `now`.
    pub fn push(&mut self, now: u64, c: char) {
        if now >= self.reset_at {
            self.reset();
        }
        let mut chars = self.term.chars();
        let repeat = match (chars.next(), chars.next()) {
            (Some(only), None) => only.to_lowercase().eq(c.to_lowercase()),
            _ => false,
        };
        if repeat {
            self.cycle_index += 1;
        } else {
            self.term.push(c);
            self.cycle_index = 0;
        }
        self.reset_at = now + TYPE_AHEAD_RESET_MS;
    }

    /// Case-insensitive prefix match of `label` against the term.
    pub fn matches(&self, label: &str) -> bool {
        let mut label = label.chars().flat_map(char::to_lowercase);
        self.term
            .chars()
            .flat_map(char::to_lowercase)
            .all(|t| label.next() == Some(t))
    }

    /// The match at the current cycle position, wrapping.
    pub fn pick<T: Copy>(&self, matches: &[T]) -> Option<T> {
        if matches.is_empty() {
            return None;
        }
        Some(matches[self.cycle_index % matches.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_key_cycles() {
        let mut s = NavigationCycleState::new();
        let matches = [10, 11, 12];
        let mut picked = alloc::vec::Vec::new();
        for t in [0, 100, 200, 300] {
            s.push(t, 'a');
            picked.push(s.pick(&matches));
        }
        assert_eq!(
            picked,
            [Some(10), Some(11), Some(12), Some(10)],
            "cycle wraps through all matches"
        );
        assert_eq!(s.term(), "a", "term stays a single character");
    }

    #[test]
    fn distinct_key_extends_term() {
        let mut s = NavigationCycleState::new();
        s.push(0, 'a');
        s.push(50, 'a');
        s.push(60, 'v');
        assert_eq!(s.term(), "av", "new character appended");
        assert_eq!(s.cycle_index(), 0, "cycle restarted");
        assert!(s.matches("Avocado"), "case-insensitive prefix");
        assert!(!s.matches("apple"), "prefix must match in full");
    }

    #[test]
    fn inactivity_resets_term() {
        let mut s = NavigationCycleState::new();
        s.push(0, 'a');
        s.push(100, 'a');
        assert_eq!(s.cycle_index(), 1, "cycled once");
        s.push(100 + TYPE_AHEAD_RESET_MS, 'a');
        assert_eq!(s.cycle_index(), 0, "reset after inactivity");
        assert_eq!(s.term(), "a", "fresh term");
    }

    #[test]
    fn empty_matches_pick_nothing() {
        let mut s = NavigationCycleState::new();
        s.push(0, 'z');
        assert_eq!(s.pick::<u32>(&[]), None, "nothing to pick");
    }
}
