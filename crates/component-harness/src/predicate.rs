//! Composable harness filters.

use async_trait::async_trait;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::element::TestElement;
use crate::environment::HarnessEnvironment;
use crate::harness::{harness_name, ComponentHarness, HarnessBase, HarnessFilters};
use crate::query::{compose_selector, HarnessQuery};
use crate::result::{HarnessError, HarnessResult};

/// Exact string or regular expression used by text-valued filters.
///
/// Deserializes from a plain string (exact match) or `{ "regex": "..." }`.
#[derive(Clone, Deserialize)]
#[serde(try_from = "TextMatcherRepr")]
pub enum TextMatcher {
    /// Whole-string equality
    Exact(String),
    /// Regex search anywhere in the string
    Pattern(Regex),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextMatcherRepr {
    Exact(String),
    Pattern(PatternRepr),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PatternRepr {
    regex: String,
}

impl TryFrom<TextMatcherRepr> for TextMatcher {
    type Error = regex::Error;

    fn try_from(repr: TextMatcherRepr) -> Result<Self, Self::Error> {
        match repr {
            TextMatcherRepr::Exact(text) => Ok(Self::Exact(text)),
            TextMatcherRepr::Pattern(PatternRepr { regex }) => Regex::new(&regex).map(Self::Pattern),
        }
    }
}

impl TextMatcher {
    /// Exact matcher
    #[must_use]
    pub fn exact(text: impl Into<String>) -> Self {
        Self::Exact(text.into())
    }

    /// Regex matcher
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidFilters`] if the pattern does not compile
    pub fn regex(pattern: &str) -> HarnessResult<Self> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|e| HarnessError::InvalidFilters {
                harness: "TextMatcher".to_string(),
                message: e.to_string(),
            })
    }

    /// Whether `value` satisfies this matcher
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(text) => text == value,
            Self::Pattern(regex) => regex.is_match(value),
        }
    }
}

impl PartialEq for TextMatcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(a), Self::Exact(b)) => a == b,
            (Self::Pattern(a), Self::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl fmt::Debug for TextMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(text) => write!(f, "{text:?}"),
            Self::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

impl From<&str> for TextMatcher {
    fn from(text: &str) -> Self {
        Self::Exact(text.to_string())
    }
}

impl From<String> for TextMatcher {
    fn from(text: String) -> Self {
        Self::Exact(text)
    }
}

impl From<Regex> for TextMatcher {
    fn from(regex: Regex) -> Self {
        Self::Pattern(regex)
    }
}

type Check<H> = Arc<dyn Fn(H) -> BoxFuture<'static, HarnessResult<bool>> + Send + Sync>;

/// Set of named async checks over harness candidates, plus the selector and
/// ancestor restriction used to find them.
///
/// ```ignore
/// let third_rows = RowHarness::with(StandardFilters::new().with_text("Third"));
/// let rows = env.locator_for_all(third_rows).await?;
/// ```
pub struct HarnessPredicate<H> {
    selector: String,
    ancestor: Option<String>,
    descriptions: Vec<String>,
    checks: Vec<Check<H>>,
}

impl<H> Clone for HarnessPredicate<H> {
    fn clone(&self) -> Self {
        Self {
            selector: self.selector.clone(),
            ancestor: self.ancestor.clone(),
            descriptions: self.descriptions.clone(),
            checks: self.checks.clone(),
        }
    }
}

/// Predicates are equal when they query the same selector, ancestor and
/// named checks. Check closures are not compared.
impl<H> PartialEq for HarnessPredicate<H> {
    fn eq(&self, other: &Self) -> bool {
        self.selector == other.selector
            && self.ancestor == other.ancestor
            && self.descriptions == other.descriptions
    }
}

impl<H> Eq for HarnessPredicate<H> {}

impl<H: ComponentHarness> fmt::Debug for HarnessPredicate<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessPredicate")
            .field("harness", &harness_name::<H>())
            .field("selector", &self.selector)
            .field("ancestor", &self.ancestor)
            .field("descriptions", &self.descriptions)
            .finish_non_exhaustive()
    }
}

impl<H: ComponentHarness> fmt::Display for HarnessPredicate<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} with [{}]",
            harness_name::<H>(),
            self.descriptions.join(", ")
        )
    }
}

impl<H: ComponentHarness> HarnessPredicate<H> {
    /// Predicate with no checks over the harness host selector, adjusted by
    /// the `selector` and `ancestor` options of `filters`
    #[must_use]
    pub fn create<F: HarnessFilters>(filters: &F) -> Self {
        let mut predicate = Self {
            selector: H::HOST_SELECTOR.to_string(),
            ancestor: None,
            descriptions: Vec::new(),
            checks: Vec::new(),
        };
        if let Some(selector) = filters.selector() {
            predicate.descriptions.push(format!("selector = {selector:?}"));
            predicate.selector = selector.to_string();
        }
        if let Some(ancestor) = filters.ancestor() {
            predicate.descriptions.push(format!("ancestor = {ancestor:?}"));
            predicate.ancestor = Some(ancestor.to_string());
        }
        predicate
    }

    /// Selector the backend is queried with
    #[must_use]
    pub fn selector(&self) -> String {
        compose_selector(self.ancestor.as_deref(), &self.selector)
    }

    /// Number of checks
    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Whether there are no checks
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Append a named check
    #[must_use]
    pub fn add<F, Fut>(mut self, description: impl Into<String>, check: F) -> Self
    where
        F: Fn(H) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HarnessResult<bool>> + Send + 'static,
    {
        self.descriptions.push(description.into());
        self.checks.push(Arc::new(move |harness: H| check(harness).boxed()));
        self
    }

    /// Append a check parameterized by an option value; `None` leaves the
    /// predicate untouched
    #[must_use]
    pub fn add_option<V, F, Fut>(self, name: &str, option: Option<V>, check: F) -> Self
    where
        V: fmt::Debug + Clone + Send + Sync + 'static,
        F: Fn(H, V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HarnessResult<bool>> + Send + 'static,
    {
        match option {
            None => self,
            Some(value) => {
                let description = format!("{name} = {value:?}");
                self.add(description, move |harness| check(harness, value.clone()))
            }
        }
    }

    /// Keep hosts whose text satisfies `matcher`
    #[must_use]
    pub fn with_text(self, matcher: Option<TextMatcher>) -> Self {
        self.add_option("text", matcher, |harness: H, matcher| async move {
            let text = harness.host().text().await?;
            Ok(Self::string_matches(Some(&text), Some(&matcher)))
        })
    }

    /// Keep hosts whose disabled state equals `disabled`
    #[must_use]
    pub fn with_disabled(self, disabled: Option<bool>) -> Self {
        self.add_option("disabled", disabled, |harness: H, disabled| async move {
            Ok(harness.host().is_disabled().await? == disabled)
        })
    }

    /// `None` matcher matches anything, including a missing value
    #[must_use]
    pub fn string_matches(value: Option<&str>, matcher: Option<&TextMatcher>) -> bool {
        match (matcher, value) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(matcher), Some(value)) => matcher.matches(value),
        }
    }

    async fn accepts(&self, candidate: H) -> HarnessResult<bool> {
        for check in &self.checks {
            if !check(candidate.clone()).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Keep the candidates passing every check.
    ///
    /// Candidates are checked concurrently; each candidate runs its checks in
    /// declaration order and stops at the first failure. Output keeps input
    /// order.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a check
    pub async fn evaluate(&self, candidates: Vec<H>) -> HarnessResult<Vec<H>> {
        let verdicts = try_join_all(candidates.into_iter().map(|candidate| async move {
            let keep = self.accepts(candidate.clone()).await?;
            Ok::<_, HarnessError>(keep.then_some(candidate))
        }))
        .await?;
        Ok(verdicts.into_iter().flatten().collect())
    }
}

#[async_trait]
impl<H: ComponentHarness> HarnessQuery for HarnessPredicate<H> {
    type Output = H;

    fn query_selector(&self) -> String {
        self.selector()
    }

    fn description(&self) -> String {
        self.to_string()
    }

    fn host_of(output: &H) -> &TestElement {
        output.host()
    }

    async fn resolve(
        &self,
        _env: &HarnessEnvironment,
        candidates: Vec<TestElement>,
    ) -> HarnessResult<Vec<H>> {
        let harnesses = candidates
            .into_iter()
            .map(|host| H::new(HarnessBase::new(host)))
            .collect();
        self.evaluate(harnesses).await
    }
}
