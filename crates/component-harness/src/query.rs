//! Selector queries and cardinality policies.

use async_trait::async_trait;
use std::fmt;

use crate::element::TestElement;
use crate::environment::HarnessEnvironment;
use crate::result::HarnessResult;

/// How many matches a locate operation expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Exactly one match; zero or several is an error
    ExactlyOne,
    /// First match if any
    Optional,
    /// First match, at least one required
    First,
    /// Match at a zero-based index
    Nth(usize),
    /// Every match
    All,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactlyOne => f.write_str("exactly-one"),
            Self::Optional => f.write_str("optional"),
            Self::First => f.write_str("first"),
            Self::Nth(index) => write!(f, "nth({index})"),
            Self::All => f.write_str("all"),
        }
    }
}

/// Something a [`HarnessEnvironment`] can locate.
///
/// Raw selectors (`&str`, `String`) yield [`TestElement`]s;
/// [`HarnessPredicate`](crate::HarnessPredicate)s yield harnesses.
#[async_trait]
pub trait HarnessQuery: Send + Sync {
    /// What a match turns into
    type Output: Send;

    /// Backend selector for the candidate elements
    fn query_selector(&self) -> String;

    /// Description used in diagnostics
    fn description(&self) -> String;

    /// Host element of a match
    fn host_of(output: &Self::Output) -> &TestElement;

    /// Turn raw candidates into matches, dropping those that fail filters.
    /// Order must be preserved.
    async fn resolve(
        &self,
        env: &HarnessEnvironment,
        candidates: Vec<TestElement>,
    ) -> HarnessResult<Vec<Self::Output>>;
}

#[async_trait]
impl<'a> HarnessQuery for &'a str {
    type Output = TestElement;

    fn query_selector(&self) -> String {
        (*self).to_string()
    }

    fn description(&self) -> String {
        format!("'{self}'")
    }

    fn host_of(output: &TestElement) -> &TestElement {
        output
    }

    async fn resolve(
        &self,
        _env: &HarnessEnvironment,
        candidates: Vec<TestElement>,
    ) -> HarnessResult<Vec<TestElement>> {
        Ok(candidates)
    }
}

#[async_trait]
impl HarnessQuery for String {
    type Output = TestElement;

    fn query_selector(&self) -> String {
        self.clone()
    }

    fn description(&self) -> String {
        format!("'{self}'")
    }

    fn host_of(output: &TestElement) -> &TestElement {
        output
    }

    async fn resolve(
        &self,
        _env: &HarnessEnvironment,
        candidates: Vec<TestElement>,
    ) -> HarnessResult<Vec<TestElement>> {
        Ok(candidates)
    }
}

/// Split on `delimiter` outside brackets, parentheses and quotes.
pub(crate) fn split_top_level(input: &str, delimiter: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0_i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in input.char_indices() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                '[' | '(' => depth += 1,
                ']' | ')' => depth -= 1,
                c if c == delimiter && depth == 0 => {
                    parts.push(&input[start..i]);
                    start = i + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Restrict `selector` to descendants of `ancestor`.
///
/// Both sides may be selector groups; the result is their cross product, so
/// `compose_selector(Some(".a, .b"), "li, td")` is
/// `.a li, .a td, .b li, .b td`.
#[must_use]
pub fn compose_selector(ancestor: Option<&str>, selector: &str) -> String {
    let Some(ancestor) = ancestor.map(str::trim).filter(|a| !a.is_empty()) else {
        return selector.to_string();
    };
    let mut composed = Vec::new();
    for outer in split_top_level(ancestor, ',') {
        for inner in split_top_level(selector, ',') {
            composed.push(format!("{} {}", outer.trim(), inner.trim()));
        }
    }
    composed.join(", ")
}
