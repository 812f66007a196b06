//! Backend boundary.
//!
//! Every execution environment implements [`Backend`]; the rest of the crate
//! only ever talks to `dyn Backend` and never branches on which one it is.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Backend (trait object, selected once per test setup)             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐            ┌──────────────────────┐    │
//! │  │  TestBedBackend      │            │  CdpBackend          │    │
//! │  │  in-process tree +   │            │  chromiumoxide page  │    │
//! │  │  scheduler pumping   │            │  (feature `browser`) │    │
//! │  └──────────────────────┘            └──────────────────────┘    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#[cfg(feature = "browser")]
pub mod cdp;
pub mod testbed;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::event::{EventData, KeyInput, ModifierKeys};
use crate::geometry::Point;
use crate::result::HarnessResult;

/// Opaque reference to a backend-native element.
///
/// Only meaningful to the backend that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef(u64);

impl NodeRef {
    /// Wrap a backend-specific id
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The backend-specific id
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Mouse button used for clicks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MouseButton {
    /// Primary button
    #[default]
    Left,
    /// Secondary button (context menu)
    Right,
}

/// Read-only queries against one element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementRead {
    /// Text content (string)
    Text,
    /// Attribute value (string or null)
    Attribute(String),
    /// Class membership (bool)
    HasClass(String),
    /// Bounding box (`BoundingBox` object)
    Dimensions,
    /// Focus state (bool)
    IsFocused,
    /// Whether the element matches a CSS selector (bool)
    MatchesSelector(String),
    /// Computed style value (string)
    CssValue(String),
    /// DOM property (any JSON value)
    Property(String),
}

impl fmt::Display for ElementRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Attribute(name) => write!(f, "attribute({name})"),
            Self::HasClass(name) => write!(f, "has_class({name})"),
            Self::Dimensions => f.write_str("dimensions"),
            Self::IsFocused => f.write_str("is_focused"),
            Self::MatchesSelector(css) => write!(f, "matches({css})"),
            Self::CssValue(prop) => write!(f, "css({prop})"),
            Self::Property(name) => write!(f, "property({name})"),
        }
    }
}

/// Mutating actions against one element
#[derive(Debug, Clone, PartialEq)]
pub enum ElementAction {
    /// Click, optionally at an element-relative offset
    Click {
        /// Offset from the element's top-left corner; center when `None`
        offset: Option<Point>,
        /// Mouse button
        button: MouseButton,
    },
    /// Focus the element
    Focus,
    /// Blur the element
    Blur,
    /// Clear an input's value
    Clear,
    /// Type a key sequence as one burst
    SendKeys {
        /// Modifiers held for the whole sequence
        modifiers: ModifierKeys,
        /// Keys in order
        keys: Vec<KeyInput>,
    },
    /// Move the pointer over the element
    Hover,
    /// Move the pointer away from the element
    MouseAway,
    /// Set an input's value property directly, without dispatching events
    SetInputValue(String),
    /// Dispatch a synthetic event
    DispatchEvent {
        /// Event name
        name: String,
        /// Extra event properties
        data: EventData,
    },
    /// Drag the element onto another element
    DragTo {
        /// Drop target
        target: NodeRef,
    },
}

impl ElementAction {
    /// Short action name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Click {
                button: MouseButton::Left,
                ..
            } => "click",
            Self::Click {
                button: MouseButton::Right,
                ..
            } => "right_click",
            Self::Focus => "focus",
            Self::Blur => "blur",
            Self::Clear => "clear",
            Self::SendKeys { .. } => "send_keys",
            Self::Hover => "hover",
            Self::MouseAway => "mouse_away",
            Self::SetInputValue(_) => "set_input_value",
            Self::DispatchEvent { .. } => "dispatch_event",
            Self::DragTo { .. } => "drag_to",
        }
    }
}

/// The capability set every execution environment provides.
///
/// Node operations must report a removed element with
/// [`HarnessError::NodeDetached`](crate::HarnessError::NodeDetached) on
/// every call, never act on a different element.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Backend name for diagnostics
    fn name(&self) -> &'static str;

    /// Return once no pending asynchronous UI work remains
    async fn force_stabilize(&self) -> HarnessResult<()>;

    /// Root node used for unscoped queries
    async fn document_root(&self) -> HarnessResult<NodeRef>;

    /// All descendants of `scope` matching `selector`, in document order
    async fn raw_find(&self, selector: &str, scope: &NodeRef) -> HarnessResult<Vec<NodeRef>>;

    /// Whether the node has been removed from the rendered tree
    async fn is_stale(&self, node: &NodeRef) -> HarnessResult<bool>;

    /// Short human-readable outline of the node (e.g. `<li class="row">Third</li>`)
    async fn describe(&self, node: &NodeRef) -> HarnessResult<String>;

    /// Perform one read, returning its JSON-encoded result
    async fn read(&self, node: &NodeRef, read: &ElementRead) -> HarnessResult<serde_json::Value>;

    /// Perform one mutating action
    async fn perform(&self, node: &NodeRef, action: &ElementAction) -> HarnessResult<()>;
}
