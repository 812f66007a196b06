//! Arena-backed element tree for the in-process test bed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::scheduler::Scheduler;
use crate::event::EventData;
use crate::geometry::BoundingBox;

/// Index of a node in the arena. Slots are never reused, so an id of a
/// removed node stays invalid forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Raw arena index
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }

    pub(crate) const fn from_index(index: usize) -> Self {
        Self(index)
    }
}

/// An event as seen by a listener
#[derive(Debug, Clone)]
pub struct DomEvent {
    /// Event name (`click`, `input`, ...)
    pub name: String,
    /// Node the event was dispatched on
    pub target: NodeId,
    /// Node whose listener is running
    pub current_target: NodeId,
    /// Extra event properties
    pub data: EventData,
}

/// Event listener. Runs synchronously during dispatch and may mutate the
/// tree or schedule further work.
pub type Listener = Arc<dyn Fn(&mut Dom, &mut Scheduler, &DomEvent) + Send + Sync>;

/// Events that are delivered to the target only
const NON_BUBBLING: &[&str] = &["focus", "blur", "mouseenter", "mouseleave"];

struct NodeData {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    styles: BTreeMap<String, String>,
    properties: BTreeMap<String, serde_json::Value>,
    bounds: BoundingBox,
    value: String,
    checked: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    listeners: Vec<(String, Listener)>,
}

impl NodeData {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            text: String::new(),
            styles: BTreeMap::new(),
            properties: BTreeMap::new(),
            bounds: BoundingBox::default(),
            value: String::new(),
            checked: false,
            parent: None,
            children: Vec::new(),
            listeners: Vec::new(),
        }
    }
}

/// Declarative description of an element subtree, inserted with [`Dom::append`]
#[derive(Clone, Default)]
pub struct ElementBuilder {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    styles: BTreeMap<String, String>,
    properties: BTreeMap<String, serde_json::Value>,
    bounds: BoundingBox,
    value: String,
    checked: bool,
    children: Vec<ElementBuilder>,
    listeners: Vec<(String, Listener)>,
}

impl fmt::Debug for ElementBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementBuilder")
            .field("tag", &self.tag)
            .field("attributes", &self.attributes)
            .field("text", &self.text)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

/// Start building an element with the given tag
#[must_use]
pub fn element(tag: &str) -> ElementBuilder {
    ElementBuilder {
        tag: tag.to_string(),
        ..ElementBuilder::default()
    }
}

impl ElementBuilder {
    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    /// Set the `id` attribute
    #[must_use]
    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    /// Append one or more space-separated classes
    #[must_use]
    pub fn class(mut self, classes: &str) -> Self {
        let merged = match self.attributes.get("class") {
            Some(existing) if !existing.is_empty() => format!("{existing} {classes}"),
            _ => classes.to_string(),
        };
        self.attributes.insert("class".to_string(), merged);
        self
    }

    /// Set the element's own text (rendered before its children)
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Set a computed style value
    #[must_use]
    pub fn style(mut self, property: &str, value: &str) -> Self {
        self.styles.insert(property.to_string(), value.to_string());
        self
    }

    /// Set a custom DOM property
    #[must_use]
    pub fn property(mut self, name: &str, value: serde_json::Value) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    /// Set layout geometry
    #[must_use]
    pub const fn bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = bounds;
        self
    }

    /// Set the input value
    #[must_use]
    pub fn value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    /// Set the checked state
    #[must_use]
    pub const fn checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    /// Append a child element
    #[must_use]
    pub fn child(mut self, child: ElementBuilder) -> Self {
        self.children.push(child);
        self
    }

    /// Append several child elements
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = ElementBuilder>) -> Self {
        self.children.extend(children);
        self
    }

    /// Register an event listener
    #[must_use]
    pub fn on<F>(mut self, event: &str, listener: F) -> Self
    where
        F: Fn(&mut Dom, &mut Scheduler, &DomEvent) + Send + Sync + 'static,
    {
        self.listeners.push((event.to_string(), Arc::new(listener)));
        self
    }
}

/// The rendered element tree.
///
/// Node 0 is the document; it has no tag-visible identity and never matches
/// a selector.
pub struct Dom {
    nodes: Vec<Option<NodeData>>,
    focused: Option<NodeId>,
    hovered: Option<NodeId>,
}

impl fmt::Debug for Dom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dom")
            .field("live_nodes", &self.nodes.iter().filter(|n| n.is_some()).count())
            .field("focused", &self.focused)
            .field("hovered", &self.hovered)
            .finish()
    }
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom {
    const DOCUMENT_TAG: &'static str = "#document";

    /// Create an empty document
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(NodeData::new(Self::DOCUMENT_TAG))],
            focused: None,
            hovered: None,
        }
    }

    /// The document node
    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Whether the node is still in the tree
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Whether this is the document node
    #[must_use]
    pub fn is_document(&self, id: NodeId) -> bool {
        id == self.root()
    }

    /// Insert a subtree as the last child of `parent`
    ///
    /// Returns the id of the subtree's root. Appending under a removed parent
    /// creates nodes that are immediately unreachable and reported stale.
    pub fn append(&mut self, parent: NodeId, builder: ElementBuilder) -> NodeId {
        let ElementBuilder {
            tag,
            attributes,
            text,
            styles,
            properties,
            bounds,
            value,
            checked,
            children,
            listeners,
        } = builder;

        let id = NodeId(self.nodes.len());
        let mut data = NodeData::new(&tag);
        data.attributes = attributes;
        data.text = text;
        data.styles = styles;
        data.properties = properties;
        data.bounds = bounds;
        data.value = value;
        data.checked = checked;
        data.listeners = listeners;
        data.parent = Some(parent);
        self.nodes.push(Some(data));

        match self.node_mut(parent) {
            Some(parent_data) => parent_data.children.push(id),
            None => self.nodes[id.0] = None,
        }

        for child in children {
            let _ = self.append(id, child);
        }
        id
    }

    /// Remove a node and its subtree. The document itself cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if self.is_document(id) || !self.contains(id) {
            return false;
        }
        if let Some(parent) = self.parent(id) {
            if let Some(parent_data) = self.node_mut(parent) {
                parent_data.children.retain(|c| *c != id);
            }
        }
        for node in self.descendants_inclusive(id) {
            if self.focused == Some(node) {
                self.focused = None;
            }
            if self.hovered == Some(node) {
                self.hovered = None;
            }
            self.nodes[node.0] = None;
        }
        true
    }

    /// Remove every child of a node
    pub fn clear_children(&mut self, id: NodeId) {
        for child in self.children(id).to_vec() {
            let _ = self.remove(child);
        }
    }

    /// Lower-case tag name
    #[must_use]
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.tag.as_str())
    }

    /// Parent node
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Children in document order
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |n| n.children.as_slice())
    }

    /// Position among the parent's children
    #[must_use]
    pub fn element_index(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    /// Previous sibling element
    #[must_use]
    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.element_index(id)?;
        index
            .checked_sub(1)
            .and_then(|i| self.children(parent).get(i).copied())
    }

    /// Strict descendants in document (pre-)order
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    fn descendants_inclusive(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![id];
        out.extend(self.descendants(id));
        out
    }

    fn ancestors_inclusive(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![id];
        let mut current = self.parent(id);
        while let Some(node) = current {
            out.push(node);
            current = self.parent(node);
        }
        out
    }

    /// Attribute value
    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)
            .and_then(|n| n.attributes.get(name))
            .map(String::as_str)
    }

    /// All attributes, sorted by name
    #[must_use]
    pub fn attributes(&self, id: NodeId) -> Vec<(&str, &str)> {
        self.node(id).map_or_else(Vec::new, |n| {
            n.attributes
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect()
        })
    }

    /// Set an attribute
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(node) = self.node_mut(id) {
            node.attributes.insert(name.to_string(), value.to_string());
        }
    }

    /// Remove an attribute
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        if let Some(node) = self.node_mut(id) {
            node.attributes.remove(name);
        }
    }

    /// Whether the class list contains `class`
    #[must_use]
    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attribute(id, "class")
            .is_some_and(|list| list.split_whitespace().any(|c| c == class))
    }

    /// Add a class
    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if self.has_class(id, class) {
            return;
        }
        let merged = match self.attribute(id, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
            _ => class.to_string(),
        };
        self.set_attribute(id, "class", &merged);
    }

    /// Remove a class
    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        let Some(existing) = self.attribute(id, "class") else {
            return;
        };
        let remaining: Vec<&str> = existing.split_whitespace().filter(|c| *c != class).collect();
        let remaining = remaining.join(" ");
        self.set_attribute(id, "class", &remaining);
    }

    /// Whether the element carries the `disabled` attribute
    #[must_use]
    pub fn is_disabled(&self, id: NodeId) -> bool {
        self.attribute(id, "disabled").is_some()
    }

    /// Checked state
    #[must_use]
    pub fn is_checked(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.checked)
    }

    /// Set checked state
    pub fn set_checked(&mut self, id: NodeId, checked: bool) {
        if let Some(node) = self.node_mut(id) {
            node.checked = checked;
        }
    }

    /// The element's own text, excluding children
    #[must_use]
    pub fn own_text(&self, id: NodeId) -> &str {
        self.node(id).map_or("", |n| n.text.as_str())
    }

    /// Replace the element's own text; children are kept
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let Some(node) = self.node_mut(id) {
            node.text = text.to_string();
        }
    }

    /// Own text followed by every descendant's text, in document order
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = self.own_text(id).to_string();
        for node in self.descendants(id) {
            out.push_str(self.own_text(node));
        }
        out
    }

    /// Input value
    #[must_use]
    pub fn value(&self, id: NodeId) -> &str {
        self.node(id).map_or("", |n| n.value.as_str())
    }

    /// Set input value without dispatching events
    pub fn set_value(&mut self, id: NodeId, value: &str) {
        if let Some(node) = self.node_mut(id) {
            node.value = value.to_string();
        }
    }

    pub(crate) fn value_mut(&mut self, id: NodeId) -> Option<&mut String> {
        self.node_mut(id).map(|n| &mut n.value)
    }

    /// Computed style value, empty when unset
    #[must_use]
    pub fn style(&self, id: NodeId, property: &str) -> &str {
        self.node(id)
            .and_then(|n| n.styles.get(property))
            .map_or("", String::as_str)
    }

    /// Set a computed style value
    pub fn set_style(&mut self, id: NodeId, property: &str, value: &str) {
        if let Some(node) = self.node_mut(id) {
            node.styles.insert(property.to_string(), value.to_string());
        }
    }

    /// Custom property value
    #[must_use]
    pub fn custom_property(&self, id: NodeId, name: &str) -> Option<&serde_json::Value> {
        self.node(id).and_then(|n| n.properties.get(name))
    }

    /// Set a custom property
    pub fn set_property(&mut self, id: NodeId, name: &str, value: serde_json::Value) {
        if let Some(node) = self.node_mut(id) {
            node.properties.insert(name.to_string(), value);
        }
    }

    /// Layout geometry
    #[must_use]
    pub fn bounds(&self, id: NodeId) -> BoundingBox {
        self.node(id).map(|n| n.bounds).unwrap_or_default()
    }

    /// Set layout geometry
    pub fn set_bounds(&mut self, id: NodeId, bounds: BoundingBox) {
        if let Some(node) = self.node_mut(id) {
            node.bounds = bounds;
        }
    }

    /// Currently focused element
    #[must_use]
    pub const fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    pub(crate) fn set_focused(&mut self, id: Option<NodeId>) {
        self.focused = id;
    }

    /// Element under the pointer
    #[must_use]
    pub const fn hovered(&self) -> Option<NodeId> {
        self.hovered
    }

    pub(crate) fn set_hovered(&mut self, id: Option<NodeId>) {
        self.hovered = id;
    }

    /// Register an event listener on an existing node
    pub fn listen<F>(&mut self, id: NodeId, event: &str, listener: F)
    where
        F: Fn(&mut Dom, &mut Scheduler, &DomEvent) + Send + Sync + 'static,
    {
        if let Some(node) = self.node_mut(id) {
            node.listeners.push((event.to_string(), Arc::new(listener)));
        }
    }

    /// Dispatch an event at `target`, bubbling through its ancestors unless
    /// the event type does not bubble.
    pub fn dispatch(&mut self, scheduler: &mut Scheduler, target: NodeId, name: &str, data: EventData) {
        let path = if NON_BUBBLING.contains(&name) {
            vec![target]
        } else {
            self.ancestors_inclusive(target)
        };
        for current in path {
            let listeners: Vec<Listener> = self.node(current).map_or_else(Vec::new, |n| {
                n.listeners
                    .iter()
                    .filter(|(event, _)| event == name)
                    .map(|(_, l)| Arc::clone(l))
                    .collect()
            });
            for listener in listeners {
                let event = DomEvent {
                    name: name.to_string(),
                    target,
                    current_target: current,
                    data: data.clone(),
                };
                listener(self, scheduler, &event);
            }
        }
    }

    /// Short outline such as `<li class="row">Third</li>`
    #[must_use]
    pub fn describe(&self, id: NodeId) -> String {
        let Some(tag) = self.tag(id) else {
            return "<detached>".to_string();
        };
        let mut out = format!("<{tag}");
        for (name, value) in self.attributes(id) {
            if matches!(name, "id" | "class" | "type" | "disabled") {
                if value.is_empty() {
                    out.push_str(&format!(" {name}"));
                } else {
                    out.push_str(&format!(" {name}=\"{value}\""));
                }
            }
        }
        out.push('>');
        let text = self.text_content(id);
        let text = text.trim();
        if text.chars().count() > 40 {
            out.extend(text.chars().take(37));
            out.push_str("...");
        } else {
            out.push_str(text);
        }
        out.push_str(&format!("</{tag}>"));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mod tree_tests {
        use super::*;

        #[test]
        fn test_append_builds_subtree() {
            let mut dom = Dom::new();
            let root = dom.root();
            let list = dom.append(
                root,
                element("ul")
                    .child(element("li").text("A"))
                    .child(element("li").text("B")),
            );
            assert_eq!(dom.children(list).len(), 2);
            assert_eq!(dom.text_content(list), "AB");
            assert_eq!(dom.parent(list), Some(root));
        }

        #[test]
        fn test_descendants_preorder() {
            let mut dom = Dom::new();
            let root = dom.root();
            let a = dom.append(root, element("div").child(element("span")));
            let b = dom.append(root, element("p"));
            let span = dom.children(a)[0];
            assert_eq!(dom.descendants(root), vec![a, span, b]);
        }

        #[test]
        fn test_remove_invalidates_subtree() {
            let mut dom = Dom::new();
            let root = dom.root();
            let list = dom.append(root, element("ul").child(element("li")));
            let item = dom.children(list)[0];
            assert!(dom.remove(list));
            assert!(!dom.contains(list));
            assert!(!dom.contains(item));
            assert!(dom.children(root).is_empty());
            assert!(!dom.remove(list));
        }

        #[test]
        fn test_document_cannot_be_removed() {
            let mut dom = Dom::new();
            let root = dom.root();
            assert!(!dom.remove(root));
            assert!(dom.contains(root));
        }

        #[test]
        fn test_append_under_removed_parent_is_detached() {
            let mut dom = Dom::new();
            let root = dom.root();
            let parent = dom.append(root, element("div"));
            dom.remove(parent);
            let orphan = dom.append(parent, element("span"));
            assert!(!dom.contains(orphan));
        }
    }

    mod attribute_tests {
        use super::*;

        #[test]
        fn test_classes() {
            let mut dom = Dom::new();
            let root = dom.root();
            let node = dom.append(root, element("div").class("a b"));
            assert!(dom.has_class(node, "a"));
            dom.add_class(node, "c");
            dom.remove_class(node, "a");
            assert_eq!(dom.attribute(node, "class"), Some("b c"));
        }

        #[test]
        fn test_describe() {
            let mut dom = Dom::new();
            let root = dom.root();
            let node = dom.append(
                root,
                element("button").class("primary").attr("disabled", "").text("Go"),
            );
            assert_eq!(
                dom.describe(node),
                "<button class=\"primary\" disabled>Go</button>"
            );
        }
    }

    mod dispatch_tests {
        use super::*;

        #[test]
        fn test_click_bubbles_to_ancestors() {
            let hits = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&hits);
            let mut dom = Dom::new();
            let mut scheduler = Scheduler::new();
            let root = dom.root();
            let list = dom.append(
                root,
                element("ul")
                    .on("click", move |_, _, _| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                    .child(element("li")),
            );
            let item = dom.children(list)[0];
            dom.dispatch(&mut scheduler, item, "click", EventData::new());
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn test_focus_does_not_bubble() {
            let hits = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&hits);
            let mut dom = Dom::new();
            let mut scheduler = Scheduler::new();
            let root = dom.root();
            let wrapper = dom.append(
                root,
                element("div")
                    .on("focus", move |_, _, _| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                    .child(element("input")),
            );
            let input = dom.children(wrapper)[0];
            dom.dispatch(&mut scheduler, input, "focus", EventData::new());
            assert_eq!(hits.load(Ordering::SeqCst), 0);
        }

        #[test]
        fn test_listener_can_mutate_tree() {
            let mut dom = Dom::new();
            let mut scheduler = Scheduler::new();
            let root = dom.root();
            let button = dom.append(
                root,
                element("button").on("click", |dom, _, event| {
                    dom.set_text(event.target, "Clicked");
                }),
            );
            dom.dispatch(&mut scheduler, button, "click", EventData::new());
            assert_eq!(dom.text_content(button), "Clicked");
        }
    }
}
