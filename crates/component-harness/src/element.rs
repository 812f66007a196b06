//! Backend-independent element handle.

use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

use crate::backend::{ElementAction, ElementRead, MouseButton, NodeRef};
use crate::environment::Session;
use crate::event::{EventData, KeyInput, ModifierKeys};
use crate::geometry::{BoundingBox, Point};
use crate::result::{HarnessError, HarnessResult};

/// Handle to one rendered element.
///
/// Bound to a single backend node for its whole life. Every method waits for
/// the UI to settle before touching the element; mutations wait again
/// afterwards. Once the element leaves the rendered tree every method fails
/// with [`HarnessError::StaleElement`].
///
/// ```ignore
/// let input = env.locator_for("input.search").await?;
/// input.send_keys(["rust", TestKey::Enter.into()]).await?;
/// assert_eq!(input.get_property::<String>("value").await?, "rust");
/// ```
#[derive(Clone)]
pub struct TestElement {
    session: Arc<Session>,
    node: NodeRef,
    selector: Arc<str>,
}

impl fmt::Debug for TestElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestElement")
            .field("backend", &self.session.backend.name())
            .field("node", &self.node)
            .field("selector", &self.selector)
            .finish()
    }
}

impl TestElement {
    pub(crate) fn new(session: Arc<Session>, node: NodeRef, selector: impl Into<Arc<str>>) -> Self {
        Self {
            session,
            node,
            selector: selector.into(),
        }
    }

    /// Backend node this handle is bound to
    #[must_use]
    pub const fn node(&self) -> NodeRef {
        self.node
    }

    /// Selector the element was located with
    #[must_use]
    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub(crate) const fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Translate a backend detach report for this node into a stale-handle error
    pub(crate) fn map_detached(&self, err: HarnessError) -> HarnessError {
        match err {
            HarnessError::NodeDetached { node } if node == self.node => {
                tracing::warn!(node = %self.node, selector = %self.selector, "stale element handle");
                HarnessError::StaleElement {
                    selector: self.selector.to_string(),
                }
            }
            other => other,
        }
    }

    async fn read<T: DeserializeOwned>(&self, read: ElementRead) -> HarnessResult<T> {
        self.session.stabilize().await?;
        let value = self
            .session
            .backend
            .read(&self.node, &read)
            .await
            .map_err(|e| self.map_detached(e))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn act(&self, action: ElementAction) -> HarnessResult<()> {
        self.session.stabilize().await?;
        tracing::trace!(
            action = action.name(),
            node = %self.node,
            selector = %self.selector,
            "element action"
        );
        let result = self.session.backend.perform(&self.node, &action).await;
        self.session.invalidate();
        result.map_err(|e| self.map_detached(e))?;
        if self.session.config.stabilize_after_actions {
            self.session.stabilize().await?;
        }
        Ok(())
    }

    // Reads

    /// Trimmed text content
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn text(&self) -> HarnessResult<String> {
        self.read(ElementRead::Text).await
    }

    /// Attribute value, `None` when absent
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn get_attribute(&self, name: &str) -> HarnessResult<Option<String>> {
        self.read(ElementRead::Attribute(name.to_string())).await
    }

    /// Whether the class list contains `name`
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn has_class(&self, name: &str) -> HarnessResult<bool> {
        self.read(ElementRead::HasClass(name.to_string())).await
    }

    /// Rendered bounding box
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn get_dimensions(&self) -> HarnessResult<BoundingBox> {
        self.read(ElementRead::Dimensions).await
    }

    /// Whether the element has focus
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn is_focused(&self) -> HarnessResult<bool> {
        self.read(ElementRead::IsFocused).await
    }

    /// Whether the element matches a CSS selector
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed, or
    /// [`HarnessError::InvalidSelector`]
    pub async fn matches_selector(&self, selector: &str) -> HarnessResult<bool> {
        self.read(ElementRead::MatchesSelector(selector.to_string()))
            .await
    }

    /// Computed style value
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn get_css_value(&self, property: &str) -> HarnessResult<String> {
        self.read(ElementRead::CssValue(property.to_string())).await
    }

    /// DOM property, deserialized into `T`
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed, or
    /// [`HarnessError::Json`] if the value does not fit `T`
    pub async fn get_property<T: DeserializeOwned>(&self, name: &str) -> HarnessResult<T> {
        self.read(ElementRead::Property(name.to_string())).await
    }

    /// Value of the `disabled` property
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn is_disabled(&self) -> HarnessResult<bool> {
        let disabled: Option<bool> = self.get_property("disabled").await?;
        Ok(disabled.unwrap_or(false))
    }

    /// Short outline of the element, used in diagnostics
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn describe(&self) -> HarnessResult<String> {
        self.session.stabilize().await?;
        self.session
            .backend
            .describe(&self.node)
            .await
            .map_err(|e| self.map_detached(e))
    }

    /// Whether the element has left the rendered tree. Never fails on a
    /// stale handle.
    ///
    /// # Errors
    ///
    /// Returns an error only if stabilization or the backend itself fails
    pub async fn is_stale(&self) -> HarnessResult<bool> {
        self.session.stabilize().await?;
        self.session.backend.is_stale(&self.node).await
    }

    // Mutations

    /// Click the element's center
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn click(&self) -> HarnessResult<()> {
        self.act(ElementAction::Click {
            offset: None,
            button: MouseButton::Left,
        })
        .await
    }

    /// Click at an offset from the element's top-left corner
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn click_at(&self, offset: Point) -> HarnessResult<()> {
        self.act(ElementAction::Click {
            offset: Some(offset),
            button: MouseButton::Left,
        })
        .await
    }

    /// Secondary-button click
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn right_click(&self) -> HarnessResult<()> {
        self.act(ElementAction::Click {
            offset: None,
            button: MouseButton::Right,
        })
        .await
    }

    /// Focus the element
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn focus(&self) -> HarnessResult<()> {
        self.act(ElementAction::Focus).await
    }

    /// Remove focus from the element
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn blur(&self) -> HarnessResult<()> {
        self.act(ElementAction::Blur).await
    }

    /// Clear an input's value
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn clear(&self) -> HarnessResult<()> {
        self.act(ElementAction::Clear).await
    }

    /// Type a sequence of text and named keys
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn send_keys<I, K>(&self, keys: I) -> HarnessResult<()>
    where
        I: IntoIterator<Item = K>,
        K: Into<KeyInput>,
    {
        self.send_keys_with_modifiers(ModifierKeys::NONE, keys).await
    }

    /// Type a key sequence while holding modifiers
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn send_keys_with_modifiers<I, K>(
        &self,
        modifiers: ModifierKeys,
        keys: I,
    ) -> HarnessResult<()>
    where
        I: IntoIterator<Item = K>,
        K: Into<KeyInput>,
    {
        let keys = keys.into_iter().map(Into::into).collect();
        self.act(ElementAction::SendKeys { modifiers, keys }).await
    }

    /// Move the pointer over the element
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn hover(&self) -> HarnessResult<()> {
        self.act(ElementAction::Hover).await
    }

    /// Move the pointer off the element
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn mouse_away(&self) -> HarnessResult<()> {
        self.act(ElementAction::MouseAway).await
    }

    /// Set the `value` property without dispatching events
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn set_input_value(&self, value: &str) -> HarnessResult<()> {
        self.act(ElementAction::SetInputValue(value.to_string()))
            .await
    }

    /// Drag this element onto `target`
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] naming whichever of the two
    /// elements was removed, or a backend error when `target` comes from a
    /// different environment
    pub async fn drag_to(&self, target: &Self) -> HarnessResult<()> {
        if !Arc::ptr_eq(&self.session, &target.session) {
            return Err(HarnessError::backend(
                self.session.backend.name(),
                "drag target belongs to a different environment",
            ));
        }
        self.act(ElementAction::DragTo {
            target: target.node,
        })
        .await
        .map_err(|e| target.map_detached(e))
    }

    /// Dispatch a synthetic event
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StaleElement`] if the element was removed
    pub async fn dispatch_event(&self, name: &str, data: EventData) -> HarnessResult<()> {
        self.act(ElementAction::DispatchEvent {
            name: name.to_string(),
            data,
        })
        .await
    }
}
