//! Component harness contract.
//!
//! A harness is a typed façade over one component instance. It only touches
//! the UI through its host [`TestElement`] and through locators scoped to
//! that host, so the same harness runs against any backend.
//!
//! ```ignore
//! #[derive(Debug, Clone)]
//! struct ButtonHarness {
//!     base: HarnessBase,
//! }
//!
//! impl ComponentHarness for ButtonHarness {
//!     const HOST_SELECTOR: &'static str = "button.app-button";
//!     type Filters = StandardFilters;
//!
//!     fn new(base: HarnessBase) -> Self {
//!         Self { base }
//!     }
//!
//!     fn base(&self) -> &HarnessBase {
//!         &self.base
//!     }
//! }
//!
//! impl ButtonHarness {
//!     async fn label(&self) -> HarnessResult<String> {
//!         self.host().text().await
//!     }
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::element::TestElement;
use crate::environment::HarnessEnvironment;
use crate::predicate::{HarnessPredicate, TextMatcher};
use crate::query::HarnessQuery;
use crate::result::{HarnessError, HarnessResult};

/// Short type name of a harness, used in predicate descriptions
pub(crate) fn harness_name<H>() -> &'static str {
    let full = std::any::type_name::<H>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Option bag accepted by a harness type.
///
/// Implementations should deny unknown fields so that
/// [`ComponentHarness::with_json`] rejects misspelled options.
pub trait HarnessFilters: Clone + Default + DeserializeOwned + Send + Sync + 'static {
    /// Selector replacing the harness host selector
    fn selector(&self) -> Option<&str>;

    /// Selector of an ancestor the host must be inside
    fn ancestor(&self) -> Option<&str>;

    /// Add the option-specific checks to a predicate
    #[must_use]
    fn refine<H: ComponentHarness>(&self, predicate: HarnessPredicate<H>) -> HarnessPredicate<H> {
        predicate
    }
}

/// Filters supporting only `selector` and `ancestor`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BaseHarnessFilters {
    /// Selector replacing the harness host selector
    pub selector: Option<String>,
    /// Ancestor the host must be inside
    pub ancestor: Option<String>,
}

impl HarnessFilters for BaseHarnessFilters {
    fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    fn ancestor(&self) -> Option<&str> {
        self.ancestor.as_deref()
    }
}

/// Filters with `selector`, `ancestor`, `text` and `disabled`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StandardFilters {
    /// Selector replacing the harness host selector
    pub selector: Option<String>,
    /// Ancestor the host must be inside
    pub ancestor: Option<String>,
    /// Host text, exact or regex
    pub text: Option<TextMatcher>,
    /// Host disabled state
    pub disabled: Option<bool>,
}

impl StandardFilters {
    /// No filters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the host selector
    #[must_use]
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// Require an ancestor
    #[must_use]
    pub fn with_ancestor(mut self, ancestor: impl Into<String>) -> Self {
        self.ancestor = Some(ancestor.into());
        self
    }

    /// Filter by host text
    #[must_use]
    pub fn with_text(mut self, text: impl Into<TextMatcher>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Filter by disabled state
    #[must_use]
    pub const fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = Some(disabled);
        self
    }
}

impl HarnessFilters for StandardFilters {
    fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    fn ancestor(&self) -> Option<&str> {
        self.ancestor.as_deref()
    }

    fn refine<H: ComponentHarness>(&self, predicate: HarnessPredicate<H>) -> HarnessPredicate<H> {
        predicate
            .with_text(self.text.clone())
            .with_disabled(self.disabled)
    }
}

/// What every harness is built from: its host element and a locator scoped
/// to it. Only the environment creates these.
#[derive(Debug, Clone)]
pub struct HarnessBase {
    host: TestElement,
    scope: HarnessEnvironment,
}

impl HarnessBase {
    pub(crate) fn new(host: TestElement) -> Self {
        let scope = HarnessEnvironment::scoped(host.clone());
        Self { host, scope }
    }

    /// The component's root element
    #[must_use]
    pub const fn host(&self) -> &TestElement {
        &self.host
    }

    /// Locator factory rooted at the host
    #[must_use]
    pub const fn scope(&self) -> &HarnessEnvironment {
        &self.scope
    }

    /// Locator factory rooted at the document, for overlays rendered outside
    /// the host
    #[must_use]
    pub fn document_root_scope(&self) -> HarnessEnvironment {
        self.scope.document_root_scope()
    }

    /// First match under the host
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::HarnessNotFound`] when nothing matches
    pub async fn locator_for<Q: HarnessQuery>(&self, query: Q) -> HarnessResult<Q::Output> {
        self.scope.locator_for(query).await
    }

    /// First match under the host, or `None`
    ///
    /// # Errors
    ///
    /// Fails only on stabilization, backend or predicate errors
    pub async fn locator_for_optional<Q: HarnessQuery>(
        &self,
        query: Q,
    ) -> HarnessResult<Option<Q::Output>> {
        self.scope.locator_for_optional(query).await
    }

    /// The only match under the host
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::HarnessNotFound`] or
    /// [`HarnessError::AmbiguousMatch`]
    pub async fn locator_for_exactly_one<Q: HarnessQuery>(
        &self,
        query: Q,
    ) -> HarnessResult<Q::Output> {
        self.scope.locator_for_exactly_one(query).await
    }

    /// Match at `index` under the host
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::HarnessNotFound`] when there are fewer matches
    pub async fn locator_for_nth<Q: HarnessQuery>(
        &self,
        query: Q,
        index: usize,
    ) -> HarnessResult<Q::Output> {
        self.scope.locator_for_nth(query, index).await
    }

    /// Every match under the host
    ///
    /// # Errors
    ///
    /// Fails only on stabilization, backend or predicate errors
    pub async fn locator_for_all<Q: HarnessQuery>(&self, query: Q) -> HarnessResult<Vec<Q::Output>> {
        self.scope.locator_for_all(query).await
    }

    /// Wait for the UI to settle
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StabilityTimeout`] when the backend gives up
    pub async fn force_stabilize(&self) -> HarnessResult<()> {
        self.scope.force_stabilize().await
    }
}

/// A typed harness for one kind of component.
///
/// Harnesses are cheap to clone and hold no state beyond their
/// [`HarnessBase`]; each operation looks up the elements it needs afresh.
pub trait ComponentHarness: Clone + Send + Sync + Sized + 'static {
    /// Selector matching the component's host element
    const HOST_SELECTOR: &'static str;

    /// Options accepted by [`ComponentHarness::with`]
    type Filters: HarnessFilters;

    /// Wrap a located host
    fn new(base: HarnessBase) -> Self;

    /// The harness's base
    fn base(&self) -> &HarnessBase;

    /// The component's root element
    fn host(&self) -> &TestElement {
        self.base().host()
    }

    /// Build the predicate for a set of options. Override to support options
    /// beyond those [`HarnessFilters::refine`] handles.
    fn predicate(filters: &Self::Filters) -> HarnessPredicate<Self> {
        filters.refine(HarnessPredicate::create(filters))
    }

    /// Predicate for these options
    fn with(filters: Self::Filters) -> HarnessPredicate<Self> {
        Self::predicate(&filters)
    }

    /// Predicate for options given as JSON
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidFilters`] for unknown keys or values of
    /// the wrong type
    fn with_json(value: serde_json::Value) -> HarnessResult<HarnessPredicate<Self>> {
        let filters: Self::Filters =
            serde_json::from_value(value).map_err(|e| HarnessError::InvalidFilters {
                harness: harness_name::<Self>().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self::predicate(&filters))
    }

    /// Predicate matching every instance
    fn query() -> HarnessPredicate<Self> {
        Self::with(Self::Filters::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testbed::{element, TestBedBackend};
    use serde_json::json;

    #[derive(Debug, Clone)]
    struct MenuHarness {
        base: HarnessBase,
    }

    impl ComponentHarness for MenuHarness {
        const HOST_SELECTOR: &'static str = ".menu";
        type Filters = BaseHarnessFilters;

        fn new(base: HarnessBase) -> Self {
            Self { base }
        }

        fn base(&self) -> &HarnessBase {
            &self.base
        }
    }

    impl MenuHarness {
        async fn item_labels(&self) -> HarnessResult<Vec<String>> {
            let mut labels = Vec::new();
            for item in self.base().locator_for_all(".item").await? {
                labels.push(item.text().await?);
            }
            Ok(labels)
        }
    }

    #[derive(Debug, Clone)]
    struct ItemHarness {
        base: HarnessBase,
    }

    impl ComponentHarness for ItemHarness {
        const HOST_SELECTOR: &'static str = ".item";
        type Filters = StandardFilters;

        fn new(base: HarnessBase) -> Self {
            Self { base }
        }

        fn base(&self) -> &HarnessBase {
            &self.base
        }
    }

    fn menus() -> TestBedBackend {
        let backend = TestBedBackend::new();
        backend
            .mount(
                element("nav")
                    .id("main")
                    .child(
                        element("ul")
                            .class("menu")
                            .child(element("li").class("item").text("Open"))
                            .child(element("li").class("item").attr("disabled", "").text("Save")),
                    ),
            )
            .unwrap();
        backend
            .mount(
                element("ul")
                    .class("menu")
                    .id("context")
                    .child(element("li").class("item").text("Copy")),
            )
            .unwrap();
        backend
    }

    mod name_tests {
        use super::*;

        #[test]
        fn test_harness_name() {
            assert_eq!(harness_name::<MenuHarness>(), "MenuHarness");
            assert_eq!(harness_name::<Vec<String>>(), "Vec");
        }
    }

    mod filter_tests {
        use super::*;

        #[test]
        fn test_with_json_rejects_unknown_keys() {
            let err = ItemHarness::with_json(json!({"label": "Open"})).unwrap_err();
            match err {
                HarnessError::InvalidFilters { harness, message } => {
                    assert_eq!(harness, "ItemHarness");
                    assert!(message.contains("label"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[test]
        fn test_with_json_accepts_known_keys() {
            let predicate =
                ItemHarness::with_json(json!({"text": {"regex": "^S"}, "disabled": true})).unwrap();
            assert_eq!(predicate.len(), 2);
            assert_eq!(
                predicate.to_string(),
                "ItemHarness with [text = /^S/, disabled = true]"
            );
        }

        #[test]
        fn test_base_filters_have_no_text() {
            assert!(MenuHarness::with_json(json!({"text": "x"})).is_err());
            assert!(MenuHarness::with_json(json!({"ancestor": "#main"})).is_ok());
        }
    }

    mod composition_tests {
        use super::*;

        #[tokio::test]
        async fn test_nested_locators_are_scoped_to_host() {
            let env = menus().environment();
            let menus = env.harness_for_all(MenuHarness::query()).await.unwrap();
            assert_eq!(menus.len(), 2);
            assert_eq!(menus[0].item_labels().await.unwrap(), vec!["Open", "Save"]);
            assert_eq!(menus[1].item_labels().await.unwrap(), vec!["Copy"]);
        }

        #[tokio::test]
        async fn test_ancestor_filter() {
            let env = menus().environment();
            let filters = BaseHarnessFilters {
                ancestor: Some("#main".to_string()),
                ..BaseHarnessFilters::default()
            };
            let menus = env.harness_for_all(MenuHarness::with(filters)).await.unwrap();
            assert_eq!(menus.len(), 1);
        }

        #[tokio::test]
        async fn test_selector_override() {
            let env = menus().environment();
            let filters = BaseHarnessFilters {
                selector: Some("#context".to_string()),
                ..BaseHarnessFilters::default()
            };
            let menu = env.harness_for(MenuHarness::with(filters)).await.unwrap();
            assert_eq!(menu.item_labels().await.unwrap(), vec!["Copy"]);
        }

        #[tokio::test]
        async fn test_child_harness_from_parent() {
            let env = menus().environment();
            let menu = env.harness_for(MenuHarness::query()).await.unwrap();
            let disabled = menu
                .base()
                .locator_for(ItemHarness::with(StandardFilters::new().with_disabled(true)))
                .await
                .unwrap();
            assert_eq!(disabled.host().text().await.unwrap(), "Save");

            let everywhere = menu
                .base()
                .document_root_scope()
                .locator_for_all(ItemHarness::query())
                .await
                .unwrap();
            assert_eq!(everywhere.len(), 3);
        }
    }
}
