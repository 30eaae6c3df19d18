// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Headless element tree: structure, flags, classes, geometry, and focus.

use alloc::borrow::Cow;
use alloc::string::String;
use alloc::vec::Vec;

use kurbo::{Rect, Vec2};
use smallvec::SmallVec;

/// Identifier for an element in the [`Document`] (generational).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NodeId(pub(crate) u32, pub(crate) u32);

impl NodeId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

bitflags::bitflags! {
    /// Element flags that the overlay core consults.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ElementFlags: u8 {
        /// Element has a non-negative tab index.
        const TABBABLE         = 0b0000_0001;
        /// Element carries the "disabled" marker.
        const DISABLED         = 0b0000_0010;
        /// Element is not rendered (treated as zero size).
        const HIDDEN           = 0b0000_0100;
        /// Element clips and scrolls its children; used as a placement boundary.
        const SCROLL_CONTAINER = 0b0000_1000;
    }
}

impl Default for ElementFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Construction data for an element.
#[derive(Clone, Debug, Default)]
pub struct ElementProps {
    /// Bounds relative to the parent element's origin.
    pub bounds: Rect,
    /// Focus and rendering flags.
    pub flags: ElementFlags,
    /// Initial class list.
    pub classes: Vec<Cow<'static, str>>,
    /// Optional text content, used for type-ahead matching and debugging.
    pub label: Option<String>,
}

impl ElementProps {
    /// Props for an element with the given local bounds and no flags.
    pub fn with_bounds(bounds: Rect) -> Self {
        Self {
            bounds,
            ..Self::default()
        }
    }

    /// Add a class to the initial class list.
    pub fn class(mut self, class: impl Into<Cow<'static, str>>) -> Self {
        self.classes.push(class.into());
        self
    }

    /// Set the flags.
    pub fn flags(mut self, flags: ElementFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the text label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Ancestor matcher used for attach targets and open markers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    /// Matches an element carrying this class.
    Class(Cow<'static, str>),
    /// Matches exactly this element.
    Node(NodeId),
}

impl Selector {
    /// Class selector.
    pub fn class(class: impl Into<Cow<'static, str>>) -> Self {
        Self::Class(class.into())
    }
}

#[derive(Clone, Debug)]
struct Element {
    generation: u32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    bounds: Rect,
    flags: ElementFlags,
    classes: SmallVec<[Cow<'static, str>; 2]>,
    label: Option<String>,
    /// creation order, for finding what a failed producer left behind
    serial: u64,
}

/// Element tree with a fixed body root, a viewport, and a focus singleton.
///
/// This is the boundary the overlay core needs from a reactive DOM layer:
/// element construction, parent/child structure, disposal of whole subtrees,
/// class markers, geometry, and focus. Elements are addressed by generational
/// [`NodeId`]s, so handles to removed elements answer "not alive" instead of
/// aliasing a recycled slot.
///
/// ```rust
/// use kurbo::Rect;
/// use understory_popup::{Document, ElementFlags, ElementProps};
///
/// let mut doc = Document::new(Rect::new(0.0, 0.0, 800.0, 600.0));
/// let button = doc.create(
///     ElementProps::with_bounds(Rect::new(10.0, 10.0, 90.0, 30.0))
///         .flags(ElementFlags::TABBABLE),
/// );
/// doc.append_child(doc.body(), button);
///
/// assert!(doc.is_connected(button));
/// assert!(doc.is_selectable(button));
/// ```
#[derive(Clone, Debug)]
pub struct Document {
    elements: Vec<Option<Element>>,
    /// last generation per slot (persists across frees)
    generations: Vec<u32>,
    free_list: Vec<usize>,
    body: NodeId,
    viewport: Rect,
    focused: Option<NodeId>,
    next_serial: u64,
}

impl Document {
    /// Create a document whose body covers `viewport`.
    pub fn new(viewport: Rect) -> Self {
        let mut doc = Self {
            elements: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            body: NodeId::new(0, 1),
            viewport,
            focused: None,
            next_serial: 0,
        };
        doc.body = doc.create(ElementProps::with_bounds(viewport));
        doc
    }

    /// The document body; every connected element descends from it.
    pub fn body(&self) -> NodeId {
        self.body
    }

    /// The visible viewport in world coordinates.
    pub fn viewport(&self) -> Rect {
        self.viewport
    }

    /// Resize the viewport.
    pub fn set_viewport(&mut self, viewport: Rect) {
        self.viewport = viewport;
    }

    /// Create a detached element.
    pub fn create(&mut self, props: ElementProps) -> NodeId {
        let serial = self.next_serial;
        self.next_serial += 1;
        let element = |generation| Element {
            generation,
            parent: None,
            children: Vec::new(),
            bounds: props.bounds,
            flags: props.flags,
            classes: props.classes.iter().cloned().collect(),
            label: props.label.clone(),
            serial,
        };
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.elements[idx] = Some(element(generation));
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeId uses 32-bit indices by design."
            )]
            (idx as u32, generation)
        } else {
            let generation = 1_u32;
            self.elements.push(Some(element(generation)));
            self.generations.push(generation);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeId uses 32-bit indices by design."
            )]
            ((self.elements.len() - 1) as u32, generation)
        };
        NodeId::new(idx, generation)
    }

    /// Append `child` as the last child of `parent`, detaching it from any
    /// previous parent first.
    ///
    /// Refuses (and returns `false`) when either id is stale or when the
    /// move would create a cycle.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if !self.is_alive(parent) || !self.is_alive(child) || self.contains(child, parent) {
            return false;
        }
        self.detach(child);
        if let Some(p) = self.element_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.element_mut(child) {
            c.parent = Some(parent);
        }
        true
    }

    /// Detach `id` from its parent, keeping the subtree alive.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent_of(id) else {
            return;
        };
        if let Some(p) = self.element_mut(parent) {
            p.children.retain(|c| *c != id);
        }
        if let Some(c) = self.element_mut(id) {
            c.parent = None;
        }
    }

    /// Remove an element and its whole subtree, returning the removed ids in
    /// depth-first pre-order.
    ///
    /// If focus was inside the removed subtree it is cleared. The body cannot
    /// be removed.
    pub fn remove(&mut self, id: NodeId) -> Vec<NodeId> {
        let mut removed = Vec::new();
        if !self.is_alive(id) || id == self.body {
            return removed;
        }
        self.detach(id);
        let mut stack = alloc::vec![id];
        while let Some(next) = stack.pop() {
            let Some(element) = self.elements[next.idx()].take() else {
                continue;
            };
            self.free_list.push(next.idx());
            removed.push(next);
            stack.extend(element.children.iter().rev().copied());
        }
        if self.focused.is_some_and(|f| !self.is_alive(f)) {
            self.focused = None;
        }
        removed
    }

    /// Returns true if the identifier refers to a live element.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.elements
            .get(id.idx())
            .and_then(|n| n.as_ref())
            .map(|n| n.generation == id.1)
            .unwrap_or(false)
    }

    /// Returns true if `id` is reachable from the body.
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.is_alive(id) && self.contains(self.body, id)
    }

    /// Parent of a live element.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.element(id).and_then(|e| e.parent)
    }

    /// Children of a live element, in document order.
    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        self.element(id).map(|e| e.children.as_slice()).unwrap_or(&[])
    }

    /// Inclusive ancestry: true if `node` is `ancestor` or one of its descendants.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        if !self.is_alive(ancestor) {
            return false;
        }
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent_of(id);
        }
        false
    }

    /// Number of ancestors above `id`.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            depth += 1;
            current = self.parent_of(parent);
        }
        depth
    }

    /// The child of `ancestor` on the path to `node`, if `node` is a strict
    /// descendant.
    pub fn child_toward(&self, ancestor: NodeId, node: NodeId) -> Option<NodeId> {
        let mut current = node;
        loop {
            let parent = self.parent_of(current)?;
            if parent == ancestor {
                return Some(current);
            }
            current = parent;
        }
    }

    /// Nearest inclusive ancestor of `id` matching `selector`.
    pub fn closest(&self, id: NodeId, selector: &Selector) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.matches(node, selector) {
                return Some(node);
            }
            current = self.parent_of(node);
        }
        None
    }

    /// Whether `id` matches `selector`.
    pub fn matches(&self, id: NodeId, selector: &Selector) -> bool {
        match selector {
            Selector::Class(class) => self.has_class(id, class),
            Selector::Node(node) => *node == id && self.is_alive(id),
        }
    }

    /// Flags of a live element.
    pub fn flags(&self, id: NodeId) -> Option<ElementFlags> {
        self.element(id).map(|e| e.flags)
    }

    /// Replace the flags of a live element.
    pub fn set_flags(&mut self, id: NodeId, flags: ElementFlags) {
        if let Some(e) = self.element_mut(id) {
            e.flags = flags;
        }
    }

    /// Toggle the disabled marker.
    pub fn set_disabled(&mut self, id: NodeId, disabled: bool) {
        if let Some(e) = self.element_mut(id) {
            e.flags.set(ElementFlags::DISABLED, disabled);
        }
    }

    /// Whether the element carries the disabled marker.
    pub fn is_disabled(&self, id: NodeId) -> bool {
        self.flags(id)
            .is_some_and(|f| f.contains(ElementFlags::DISABLED))
    }

    /// Local bounds of a live element, relative to its parent's origin.
    pub fn bounds(&self, id: NodeId) -> Option<Rect> {
        self.element(id).map(|e| e.bounds)
    }

    /// Update local bounds.
    pub fn set_bounds(&mut self, id: NodeId, bounds: Rect) {
        if let Some(e) = self.element_mut(id) {
            e.bounds = bounds;
        }
    }

    /// World-space bounds: local bounds translated by every ancestor's origin.
    pub fn world_bounds(&self, id: NodeId) -> Option<Rect> {
        let local = self.bounds(id)?;
        let mut offset = Vec2::ZERO;
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            let b = self.bounds(parent)?;
            offset += b.origin().to_vec2();
            current = self.parent_of(parent);
        }
        Some(local + offset)
    }

    /// Move a live element so that its world-space bounds become `world`.
    pub fn set_world_bounds(&mut self, id: NodeId, world: Rect) {
        let origin = self
            .parent_of(id)
            .and_then(|p| self.world_bounds(p))
            .map(|r| r.origin().to_vec2())
            .unwrap_or(Vec2::ZERO);
        self.set_bounds(id, world - origin);
    }

    /// Whether the element is rendered with a non-zero size.
    pub fn is_rendered(&self, id: NodeId) -> bool {
        let Some(e) = self.element(id) else {
            return false;
        };
        !e.flags.contains(ElementFlags::HIDDEN) && e.bounds.width() > 0.0 && e.bounds.height() > 0.0
    }

    /// Tab-reachable, not disabled, and rendered with a non-zero size.
    pub fn is_selectable(&self, id: NodeId) -> bool {
        self.flags(id).is_some_and(|f| {
            f.contains(ElementFlags::TABBABLE) && !f.contains(ElementFlags::DISABLED)
        }) && self.is_rendered(id)
    }

    /// Add a class marker (no-op if present).
    pub fn add_class(&mut self, id: NodeId, class: impl Into<Cow<'static, str>>) {
        let class = class.into();
        if let Some(e) = self.element_mut(id)
            && !e.classes.iter().any(|c| *c == class)
        {
            e.classes.push(class);
        }
    }

    /// Remove a class marker.
    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        if let Some(e) = self.element_mut(id) {
            e.classes.retain(|c| *c != *class);
        }
    }

    /// Whether the element carries a class marker.
    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id)
            .is_some_and(|e| e.classes.iter().any(|c| c == class))
    }

    /// Text label of a live element.
    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.element(id).and_then(|e| e.label.as_deref())
    }

    /// Currently focused element.
    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    /// Move focus to a live element. Returns false for stale ids.
    pub fn focus(&mut self, id: NodeId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        self.focused = Some(id);
        true
    }

    /// Clear focus.
    pub fn blur(&mut self) {
        self.focused = None;
    }

    /// Whether focus is currently at or inside `id`.
    pub fn focus_within(&self, id: NodeId) -> bool {
        self.focused.is_some_and(|f| self.contains(id, f))
    }

    /// Creation watermark: elements created after this call have a serial at
    /// or above the returned value.
    pub(crate) fn creation_mark(&self) -> u64 {
        self.next_serial
    }

    /// Parentless live elements created at or after `mark`, excluding the body.
    pub(crate) fn detached_since(&self, mark: u64) -> Vec<NodeId> {
        self.elements
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| {
                let e = slot.as_ref()?;
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "NodeId uses 32-bit indices by design."
                )]
                let id = NodeId::new(idx as u32, e.generation);
                (e.parent.is_none() && e.serial >= mark && id != self.body).then_some(id)
            })
            .collect()
    }

    fn element(&self, id: NodeId) -> Option<&Element> {
        let e = self.elements.get(id.idx())?.as_ref()?;
        (e.generation == id.1).then_some(e)
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        let e = self.elements.get_mut(id.idx())?.as_mut()?;
        (e.generation == id.1).then_some(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new(Rect::new(0.0, 0.0, 100.0, 100.0))
    }

    #[test]
    fn remove_frees_subtree_and_invalidates_ids() {
        let mut doc = doc();
        let a = doc.create(ElementProps::default());
        let b = doc.create(ElementProps::default());
        doc.append_child(doc.body(), a);
        doc.append_child(a, b);

        let removed = doc.remove(a);
        assert_eq!(removed, alloc::vec![a, b]);
        assert!(!doc.is_alive(a));
        assert!(!doc.is_alive(b));
        assert!(doc.children_of(doc.body()).is_empty());

        // The recycled slot gets a new generation.
        let c = doc.create(ElementProps::default());
        assert_ne!(c, a);
        assert!(!doc.is_alive(a));
        assert!(doc.is_alive(c));
    }

    #[test]
    fn append_child_rejects_cycles() {
        let mut doc = doc();
        let a = doc.create(ElementProps::default());
        let b = doc.create(ElementProps::default());
        assert!(doc.append_child(a, b));
        assert!(!doc.append_child(b, a));
        assert_eq!(doc.parent_of(b), Some(a));
    }

    #[test]
    fn world_bounds_accumulate_parent_origins() {
        let mut doc = doc();
        let a = doc.create(ElementProps::with_bounds(Rect::new(10.0, 20.0, 60.0, 70.0)));
        let b = doc.create(ElementProps::with_bounds(Rect::new(5.0, 5.0, 15.0, 15.0)));
        doc.append_child(doc.body(), a);
        doc.append_child(a, b);
        assert_eq!(doc.world_bounds(b), Some(Rect::new(15.0, 25.0, 25.0, 35.0)));

        doc.set_world_bounds(b, Rect::new(30.0, 30.0, 40.0, 40.0));
        assert_eq!(doc.bounds(b), Some(Rect::new(20.0, 10.0, 30.0, 20.0)));
    }

    #[test]
    fn selectable_requires_tab_index_enabled_and_size() {
        let mut doc = doc();
        let sized = Rect::new(0.0, 0.0, 10.0, 10.0);
        let ok = doc.create(ElementProps::with_bounds(sized).flags(ElementFlags::TABBABLE));
        let no_tab = doc.create(ElementProps::with_bounds(sized));
        let disabled = doc.create(
            ElementProps::with_bounds(sized)
                .flags(ElementFlags::TABBABLE | ElementFlags::DISABLED),
        );
        let zero = doc.create(ElementProps::default().flags(ElementFlags::TABBABLE));
        let hidden = doc.create(
            ElementProps::with_bounds(sized).flags(ElementFlags::TABBABLE | ElementFlags::HIDDEN),
        );

        assert!(doc.is_selectable(ok));
        assert!(!doc.is_selectable(no_tab));
        assert!(!doc.is_selectable(disabled));
        assert!(!doc.is_selectable(zero));
        assert!(!doc.is_selectable(hidden));
    }

    #[test]
    fn closest_and_child_toward() {
        let mut doc = doc();
        let wrap = doc.create(ElementProps::default().class("wrapper"));
        let mid = doc.create(ElementProps::default());
        let leaf = doc.create(ElementProps::default());
        doc.append_child(doc.body(), wrap);
        doc.append_child(wrap, mid);
        doc.append_child(mid, leaf);

        assert_eq!(doc.closest(leaf, &Selector::class("wrapper")), Some(wrap));
        assert_eq!(doc.closest(leaf, &Selector::class("missing")), None);
        assert_eq!(doc.child_toward(wrap, leaf), Some(mid));
        assert_eq!(doc.child_toward(leaf, leaf), None);
    }

    #[test]
    fn removing_focused_subtree_clears_focus() {
        let mut doc = doc();
        let a = doc.create(ElementProps::default());
        doc.append_child(doc.body(), a);
        doc.focus(a);
        assert!(doc.focus_within(doc.body()));
        doc.remove(a);
        assert_eq!(doc.focused(), None);
    }

    #[test]
    fn detached_since_finds_only_new_orphan_roots() {
        let mut doc = doc();
        let old = doc.create(ElementProps::default());
        let mark = doc.creation_mark();
        let root = doc.create(ElementProps::default());
        let child = doc.create(ElementProps::default());
        let placed = doc.create(ElementProps::default());
        doc.append_child(root, child);
        doc.append_child(doc.body(), placed);

        assert_eq!(doc.detached_since(mark), alloc::vec![root], "only the new orphan root");
        assert!(doc.detached_since(0).contains(&old), "older orphans below an earlier mark");
    }

    #[test]
    fn classes_are_deduplicated() {
        let mut doc = doc();
        let a = doc.create(ElementProps::default());
        doc.add_class(a, "open");
        doc.add_class(a, "open");
        assert!(doc.has_class(a, "open"));
        doc.remove_class(a, "open");
        assert!(!doc.has_class(a, "open"));
    }
}
