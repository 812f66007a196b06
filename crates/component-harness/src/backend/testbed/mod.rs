//! In-process test bed backend.
//!
//! Components render into an arena [`Dom`]; asynchronous UI work goes through
//! a deterministic [`Scheduler`]. Stabilizing means pumping the scheduler until
//! every queue is empty.

pub mod dom;
pub mod scheduler;
pub(crate) mod selector;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub use dom::{element, Dom, DomEvent, ElementBuilder, Listener, NodeId};
pub use scheduler::{Scheduler, Task, TimerId};

use super::{Backend, ElementAction, ElementRead, MouseButton, NodeRef};
use crate::config::HarnessConfig;
use crate::environment::HarnessEnvironment;
use crate::event::{EventData, KeyInput, ModifierKeys, TestKey};
use crate::geometry::Point;
use crate::result::{HarnessError, HarnessResult};
use selector::SelectorList;

const BACKEND_NAME: &str = "testbed";

/// Rendered tree plus its pending work
#[derive(Debug, Default)]
pub struct TestBedState {
    /// The element tree
    pub dom: Dom,
    /// Pending microtasks, frames and timers
    pub scheduler: Scheduler,
}

/// Backend over an in-process element tree.
///
/// Cloning is cheap; clones share the same tree, so a test can keep one
/// clone for setup and hand another to the environment.
#[derive(Debug, Clone)]
pub struct TestBedBackend {
    state: Arc<Mutex<TestBedState>>,
    config: HarnessConfig,
    stabilize_calls: Arc<AtomicU64>,
}

impl Default for TestBedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TestBedBackend {
    /// Create an empty test bed with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HarnessConfig::default())
    }

    /// Create an empty test bed
    #[must_use]
    pub fn with_config(config: HarnessConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(TestBedState::default())),
            config,
            stabilize_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Configuration this backend was created with
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Root environment over this backend, sharing its configuration
    #[must_use]
    pub fn environment(&self) -> HarnessEnvironment {
        HarnessEnvironment::new(Arc::new(self.clone()), self.config.clone())
    }

    fn lock(&self) -> HarnessResult<MutexGuard<'_, TestBedState>> {
        self.state
            .lock()
            .map_err(|_| HarnessError::backend(BACKEND_NAME, "state lock poisoned"))
    }

    /// Run `f` against the tree and scheduler, as a component would when
    /// rendering or reacting to outside input
    ///
    /// # Errors
    ///
    /// Returns a backend error if a listener panicked while holding the state
    pub fn update<R>(&self, f: impl FnOnce(&mut Dom, &mut Scheduler) -> R) -> HarnessResult<R> {
        let mut guard = self.lock()?;
        let TestBedState { dom, scheduler } = &mut *guard;
        Ok(f(dom, scheduler))
    }

    /// Append a subtree under the document root
    ///
    /// # Errors
    ///
    /// See [`TestBedBackend::update`]
    pub fn mount(&self, builder: ElementBuilder) -> HarnessResult<NodeId> {
        self.update(|dom, _| {
            let root = dom.root();
            dom.append(root, builder)
        })
    }

    /// Number of times [`Backend::force_stabilize`] was called
    #[must_use]
    pub fn stabilize_calls(&self) -> u64 {
        self.stabilize_calls.load(Ordering::SeqCst)
    }

    /// Current virtual time
    ///
    /// # Errors
    ///
    /// See [`TestBedBackend::update`]
    pub fn now_ms(&self) -> HarnessResult<u64> {
        self.update(|_, scheduler| scheduler.now_ms())
    }

    /// Advance virtual time, running whatever falls due
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StabilityTimeout`] when work keeps re-queuing
    /// itself inside the window for more than `max_stabilize_cycles` cycles
    pub fn advance_by(&self, ms: u64) -> HarnessResult<()> {
        let max_cycles = self.config.max_stabilize_cycles;
        self.update(|dom, scheduler| scheduler.advance_by(dom, ms, max_cycles))?
            .map(|_| ())
            .map_err(|(cycles, pending)| HarnessError::StabilityTimeout {
                backend: BACKEND_NAME.to_string(),
                cycles,
                pending,
            })
    }

    /// Handle for an arena node
    #[must_use]
    pub fn node_ref(id: NodeId) -> NodeRef {
        NodeRef::new(id.index() as u64)
    }

    /// Arena node behind a handle
    #[must_use]
    pub fn node_id(node: &NodeRef) -> Option<NodeId> {
        usize::try_from(node.id()).ok().map(NodeId::from_index)
    }

    fn live_node(dom: &Dom, node: &NodeRef) -> HarnessResult<NodeId> {
        Self::node_id(node)
            .filter(|id| dom.contains(*id))
            .ok_or(HarnessError::NodeDetached { node: *node })
    }
}

#[async_trait]
impl Backend for TestBedBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn force_stabilize(&self) -> HarnessResult<()> {
        self.stabilize_calls.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.lock()?;
        let TestBedState { dom, scheduler } = &mut *guard;
        match scheduler.run_until_idle(dom, self.config.max_stabilize_cycles) {
            Ok(cycles) => {
                if cycles > 0 {
                    tracing::trace!(cycles, "testbed settled");
                }
                Ok(())
            }
            Err((cycles, pending)) => Err(HarnessError::StabilityTimeout {
                backend: BACKEND_NAME.to_string(),
                cycles,
                pending,
            }),
        }
    }

    async fn document_root(&self) -> HarnessResult<NodeRef> {
        let guard = self.lock()?;
        Ok(Self::node_ref(guard.dom.root()))
    }

    async fn raw_find(&self, selector: &str, scope: &NodeRef) -> HarnessResult<Vec<NodeRef>> {
        let list = SelectorList::parse(selector)?;
        let guard = self.lock()?;
        let scope = Self::live_node(&guard.dom, scope)?;
        Ok(guard
            .dom
            .descendants(scope)
            .into_iter()
            .filter(|id| list.matches(&guard.dom, *id))
            .map(Self::node_ref)
            .collect())
    }

    async fn is_stale(&self, node: &NodeRef) -> HarnessResult<bool> {
        let guard = self.lock()?;
        Ok(Self::live_node(&guard.dom, node).is_err())
    }

    async fn describe(&self, node: &NodeRef) -> HarnessResult<String> {
        let guard = self.lock()?;
        let id = Self::live_node(&guard.dom, node)?;
        Ok(guard.dom.describe(id))
    }

    async fn read(&self, node: &NodeRef, read: &ElementRead) -> HarnessResult<serde_json::Value> {
        use serde_json::Value;

        let guard = self.lock()?;
        let dom = &guard.dom;
        let id = Self::live_node(dom, node)?;
        let value = match read {
            ElementRead::Text => Value::String(dom.text_content(id).trim().to_string()),
            ElementRead::Attribute(name) => dom
                .attribute(id, name)
                .map_or(Value::Null, |v| Value::String(v.to_string())),
            ElementRead::HasClass(class) => Value::Bool(dom.has_class(id, class)),
            ElementRead::Dimensions => serde_json::to_value(dom.bounds(id))?,
            ElementRead::IsFocused => Value::Bool(dom.focused() == Some(id)),
            ElementRead::MatchesSelector(css) => {
                Value::Bool(SelectorList::parse(css)?.matches(dom, id))
            }
            ElementRead::CssValue(property) => Value::String(dom.style(id, property).to_string()),
            ElementRead::Property(name) => read_property(dom, id, name),
        };
        Ok(value)
    }

    async fn perform(&self, node: &NodeRef, action: &ElementAction) -> HarnessResult<()> {
        let mut guard = self.lock()?;
        let TestBedState { dom, scheduler } = &mut *guard;
        let id = Self::live_node(dom, node)?;
        match action {
            ElementAction::Click { offset, button } => click(dom, scheduler, id, *offset, *button),
            ElementAction::Focus => focus(dom, scheduler, id),
            ElementAction::Blur => blur(dom, scheduler, id),
            ElementAction::Clear => {
                if !dom.is_disabled(id) {
                    focus(dom, scheduler, id);
                    dom.set_value(id, "");
                    dom.dispatch(scheduler, id, "input", EventData::new());
                }
            }
            ElementAction::SendKeys { modifiers, keys } => {
                send_keys(dom, scheduler, id, *modifiers, keys);
            }
            ElementAction::Hover => {
                dom.set_hovered(Some(id));
                dom.dispatch(scheduler, id, "mouseenter", EventData::new());
                dom.dispatch(scheduler, id, "mouseover", EventData::new());
            }
            ElementAction::MouseAway => {
                if dom.hovered() == Some(id) {
                    dom.set_hovered(None);
                }
                dom.dispatch(scheduler, id, "mouseleave", EventData::new());
                dom.dispatch(scheduler, id, "mouseout", EventData::new());
            }
            ElementAction::SetInputValue(value) => dom.set_value(id, value),
            ElementAction::DispatchEvent { name, data } => {
                dom.dispatch(scheduler, id, name, data.clone());
            }
            ElementAction::DragTo { target } => {
                let target = Self::live_node(dom, target)?;
                drag(dom, scheduler, id, target);
            }
        }
        Ok(())
    }
}

fn read_property(dom: &Dom, id: NodeId, name: &str) -> serde_json::Value {
    use serde_json::Value;

    match name {
        "value" => Value::String(dom.value(id).to_string()),
        "checked" => Value::Bool(dom.is_checked(id)),
        "disabled" => Value::Bool(dom.is_disabled(id)),
        "tagName" => Value::String(dom.tag(id).unwrap_or_default().to_ascii_uppercase()),
        "id" => Value::String(dom.attribute(id, "id").unwrap_or_default().to_string()),
        "className" => Value::String(dom.attribute(id, "class").unwrap_or_default().to_string()),
        "textContent" => Value::String(dom.text_content(id)),
        other => dom.custom_property(id, other).cloned().unwrap_or(Value::Null),
    }
}

fn mouse_data(dom: &Dom, id: NodeId, offset: Option<Point>, button: MouseButton) -> EventData {
    let bounds = dom.bounds(id);
    let point = offset.map_or_else(|| bounds.center(), |o| bounds.at_offset(o));
    let button = match button {
        MouseButton::Left => 0,
        MouseButton::Right => 2,
    };
    EventData::from([
        ("clientX".to_string(), point.x.into()),
        ("clientY".to_string(), point.y.into()),
        ("button".to_string(), button.into()),
    ])
}

fn click(dom: &mut Dom, scheduler: &mut Scheduler, id: NodeId, offset: Option<Point>, button: MouseButton) {
    if dom.is_disabled(id) {
        return;
    }
    let data = mouse_data(dom, id, offset, button);
    dom.dispatch(scheduler, id, "mousedown", data.clone());
    dom.dispatch(scheduler, id, "mouseup", data.clone());

    if button == MouseButton::Right {
        dom.dispatch(scheduler, id, "contextmenu", data);
        return;
    }

    let toggles = dom.tag(id) == Some("input")
        && matches!(dom.attribute(id, "type"), Some("checkbox" | "radio"));
    if toggles {
        let next = dom.attribute(id, "type") == Some("radio") || !dom.is_checked(id);
        dom.set_checked(id, next);
    }
    dom.dispatch(scheduler, id, "click", data);
    if toggles {
        dom.dispatch(scheduler, id, "input", EventData::new());
        dom.dispatch(scheduler, id, "change", EventData::new());
    }
}

fn focus(dom: &mut Dom, scheduler: &mut Scheduler, id: NodeId) {
    if dom.focused() == Some(id) || dom.is_disabled(id) {
        return;
    }
    if let Some(previous) = dom.focused() {
        dom.set_focused(None);
        dom.dispatch(scheduler, previous, "blur", EventData::new());
    }
    dom.set_focused(Some(id));
    dom.dispatch(scheduler, id, "focus", EventData::new());
}

fn blur(dom: &mut Dom, scheduler: &mut Scheduler, id: NodeId) {
    if dom.focused() == Some(id) {
        dom.set_focused(None);
        dom.dispatch(scheduler, id, "blur", EventData::new());
    }
}

fn key_data(key: &str, modifiers: ModifierKeys) -> EventData {
    EventData::from([
        ("key".to_string(), key.into()),
        ("ctrlKey".to_string(), modifiers.control.into()),
        ("altKey".to_string(), modifiers.alt.into()),
        ("shiftKey".to_string(), modifiers.shift.into()),
        ("metaKey".to_string(), modifiers.meta.into()),
    ])
}

fn send_keys(
    dom: &mut Dom,
    scheduler: &mut Scheduler,
    id: NodeId,
    modifiers: ModifierKeys,
    keys: &[KeyInput],
) {
    if dom.is_disabled(id) {
        return;
    }
    focus(dom, scheduler, id);

    for input in keys {
        match input {
            KeyInput::Text(text) => {
                for ch in text.chars() {
                    let data = key_data(&ch.to_string(), modifiers);
                    dom.dispatch(scheduler, id, "keydown", data.clone());
                    dom.dispatch(scheduler, id, "keypress", data.clone());
                    if let Some(value) = dom.value_mut(id) {
                        value.push(ch);
                    }
                    dom.dispatch(scheduler, id, "input", EventData::new());
                    dom.dispatch(scheduler, id, "keyup", data);
                }
            }
            KeyInput::Key(key) => {
                let data = key_data(&key.key_name(), modifiers);
                dom.dispatch(scheduler, id, "keydown", data.clone());
                match key {
                    TestKey::Backspace => {
                        let removed = dom.value_mut(id).and_then(String::pop).is_some();
                        if removed {
                            dom.dispatch(scheduler, id, "input", EventData::new());
                        }
                    }
                    TestKey::Enter => dom.dispatch(scheduler, id, "keypress", data.clone()),
                    _ => {}
                }
                dom.dispatch(scheduler, id, "keyup", data);
            }
        }
    }
}

fn drag(dom: &mut Dom, scheduler: &mut Scheduler, source: NodeId, target: NodeId) {
    let start = mouse_data(dom, source, None, MouseButton::Left);
    let end = mouse_data(dom, target, None, MouseButton::Left);
    dom.dispatch(scheduler, source, "dragstart", start.clone());
    dom.dispatch(scheduler, target, "dragenter", end.clone());
    dom.dispatch(scheduler, target, "dragover", end.clone());
    dom.dispatch(scheduler, target, "drop", end);
    dom.dispatch(scheduler, source, "dragend", start);
}
