//! CSS selector subset for the in-process tree.
//!
//! Supports type, universal, `#id`, `.class`, attribute conditions
//! (`[a]`, `=`, `~=`, `^=`, `$=`, `*=`, `|=`), the pseudo-classes
//! `:disabled`, `:enabled`, `:focus`, `:checked`, `:first-child`,
//! `:last-child`, `:empty` and `:not(...)`, selector groups, and the
//! descendant, child, adjacent-sibling and general-sibling combinators.

use super::dom::{Dom, NodeId};
use crate::query::split_top_level;
use crate::result::{HarnessError, HarnessResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AttrCondition {
    Exists { key: String },
    Eq { key: String, value: String },
    Includes { key: String, value: String },
    StartsWith { key: String, value: String },
    EndsWith { key: String, value: String },
    Contains { key: String, value: String },
    DashMatch { key: String, value: String },
}

impl AttrCondition {
    fn key(&self) -> &str {
        match self {
            Self::Exists { key }
            | Self::Eq { key, .. }
            | Self::Includes { key, .. }
            | Self::StartsWith { key, .. }
            | Self::EndsWith { key, .. }
            | Self::Contains { key, .. }
            | Self::DashMatch { key, .. } => key,
        }
    }

    fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        match self {
            Self::Exists { .. } => true,
            Self::Eq { value, .. } => actual == value,
            Self::Includes { value, .. } => actual.split_whitespace().any(|w| w == value),
            Self::StartsWith { value, .. } => !value.is_empty() && actual.starts_with(value.as_str()),
            Self::EndsWith { value, .. } => !value.is_empty() && actual.ends_with(value.as_str()),
            Self::Contains { value, .. } => !value.is_empty() && actual.contains(value.as_str()),
            Self::DashMatch { value, .. } => {
                actual == value || actual.starts_with(&format!("{value}-"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PseudoClass {
    Disabled,
    Enabled,
    Focus,
    Checked,
    FirstChild,
    LastChild,
    /// `:nth-child(An+B)`, one-based
    NthChild {
        step: i64,
        offset: i64,
    },
    Empty,
    Not(SelectorList),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Combinator {
    Descendant,
    Child,
    AdjacentSibling,
    GeneralSibling,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Compound {
    tag: Option<String>,
    universal: bool,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
    pseudos: Vec<PseudoClass>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && !self.universal
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.pseudos.is_empty()
    }

    fn matches(&self, dom: &Dom, node: NodeId) -> bool {
        let Some(tag) = dom.tag(node) else {
            return false;
        };
        if dom.is_document(node) {
            return false;
        }
        if let Some(expected) = &self.tag {
            if !expected.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if dom.attribute(node, "id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| dom.has_class(node, c)) {
            return false;
        }
        if !self
            .attrs
            .iter()
            .all(|cond| cond.matches(dom.attribute(node, cond.key())))
        {
            return false;
        }
        self.pseudos.iter().all(|pseudo| match pseudo {
            PseudoClass::Disabled => dom.is_disabled(node),
            PseudoClass::Enabled => !dom.is_disabled(node),
            PseudoClass::Focus => dom.focused() == Some(node),
            PseudoClass::Checked => dom.is_checked(node),
            PseudoClass::FirstChild => dom.element_index(node) == Some(0),
            PseudoClass::LastChild => dom
                .parent(node)
                .zip(dom.element_index(node))
                .is_some_and(|(parent, index)| index + 1 == dom.children(parent).len()),
            PseudoClass::NthChild { step, offset } => dom
                .element_index(node)
                .is_some_and(|index| nth_matches(*step, *offset, index as i64 + 1)),
            PseudoClass::Empty => dom.children(node).is_empty() && dom.own_text(node).is_empty(),
            PseudoClass::Not(inner) => !inner.matches(dom, node),
        })
    }
}

/// One complex selector: compounds joined by combinators, left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ComplexSelector {
    /// `parts[i].0` links `parts[i - 1]` to `parts[i]`; `parts[0].0` is unused
    parts: Vec<(Combinator, Compound)>,
}

impl ComplexSelector {
    fn matches(&self, dom: &Dom, node: NodeId) -> bool {
        let last = self.parts.len() - 1;
        self.parts[last].1.matches(dom, node) && self.matches_from(dom, last, node)
    }

    /// `node` already matches `parts[index]`; check the parts to its left.
    fn matches_from(&self, dom: &Dom, index: usize, node: NodeId) -> bool {
        if index == 0 {
            return true;
        }
        let (combinator, _) = &self.parts[index];
        let left = &self.parts[index - 1].1;
        match combinator {
            Combinator::Child => dom
                .parent(node)
                .is_some_and(|p| left.matches(dom, p) && self.matches_from(dom, index - 1, p)),
            Combinator::Descendant => {
                let mut current = dom.parent(node);
                while let Some(ancestor) = current {
                    if left.matches(dom, ancestor) && self.matches_from(dom, index - 1, ancestor) {
                        return true;
                    }
                    current = dom.parent(ancestor);
                }
                false
            }
            Combinator::AdjacentSibling => dom
                .previous_sibling(node)
                .is_some_and(|s| left.matches(dom, s) && self.matches_from(dom, index - 1, s)),
            Combinator::GeneralSibling => {
                let mut current = dom.previous_sibling(node);
                while let Some(sibling) = current {
                    if left.matches(dom, sibling) && self.matches_from(dom, index - 1, sibling) {
                        return true;
                    }
                    current = dom.previous_sibling(sibling);
                }
                false
            }
        }
    }
}

/// Comma-separated selector group
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SelectorList(Vec<ComplexSelector>);

impl SelectorList {
    pub(crate) fn parse(selector: &str) -> HarnessResult<Self> {
        let selectors = split_top_level(selector, ',')
            .into_iter()
            .map(|part| parse_complex(selector, part))
            .collect::<HarnessResult<Vec<_>>>()?;
        Ok(Self(selectors))
    }

    pub(crate) fn matches(&self, dom: &Dom, node: NodeId) -> bool {
        self.0.iter().any(|complex| complex.matches(dom, node))
    }
}

fn invalid(selector: &str, message: impl Into<String>) -> HarnessError {
    HarnessError::InvalidSelector {
        selector: selector.to_string(),
        message: message.into(),
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '-' || ch == '_'
}

struct Cursor<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn ident(&mut self) -> HarnessResult<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(invalid(self.source, format!("expected identifier at {start}")));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn attr_value(&mut self) -> HarnessResult<String> {
        match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some(c) if c == q => return Ok(value),
                        Some(c) => value.push(c),
                        None => return Err(invalid(self.source, "unterminated string")),
                    }
                }
            }
            _ => self.ident(),
        }
    }

    /// Contents of a parenthesized argument, cursor just past `(`
    fn parenthesized(&mut self) -> HarnessResult<String> {
        let mut depth = 1;
        let mut inner = String::new();
        while let Some(c) = self.bump() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(inner);
                    }
                }
                _ => {}
            }
            inner.push(c);
        }
        Err(invalid(self.source, "unbalanced parentheses"))
    }
}

fn parse_complex(source: &str, input: &str) -> HarnessResult<ComplexSelector> {
    let mut cursor = Cursor {
        chars: input.trim().chars().collect(),
        pos: 0,
        source,
    };
    if cursor.chars.is_empty() {
        return Err(invalid(source, "empty selector"));
    }

    let mut parts: Vec<(Combinator, Compound)> = Vec::new();
    let mut pending: Option<Combinator> = None;
    while cursor.peek().is_some() {
        cursor.skip_whitespace();
        let explicit = match cursor.peek() {
            Some('>') => Some(Combinator::Child),
            Some('+') => Some(Combinator::AdjacentSibling),
            Some('~') => Some(Combinator::GeneralSibling),
            _ => None,
        };
        if let Some(combinator) = explicit {
            if parts.is_empty() || pending.is_some() {
                return Err(invalid(source, "dangling combinator"));
            }
            cursor.pos += 1;
            cursor.skip_whitespace();
            pending = Some(combinator);
            continue;
        }
        if cursor.peek().is_none() {
            break;
        }
        // Compounds only end at whitespace or a combinator, so a missing
        // explicit combinator means descendant.
        let combinator = pending.take().unwrap_or(Combinator::Descendant);
        let compound = parse_compound(&mut cursor)?;
        parts.push((combinator, compound));
    }
    if pending.is_some() || parts.is_empty() {
        return Err(invalid(source, "selector ends with a combinator"));
    }
    Ok(ComplexSelector { parts })
}

fn parse_compound(cursor: &mut Cursor<'_>) -> HarnessResult<Compound> {
    let mut compound = Compound::default();
    if cursor.peek() == Some('*') {
        cursor.pos += 1;
        compound.universal = true;
    } else if cursor.peek().is_some_and(is_ident_char) {
        compound.tag = Some(cursor.ident()?.to_ascii_lowercase());
    }

    while let Some(ch) = cursor.peek() {
        match ch {
            '#' => {
                cursor.pos += 1;
                compound.id = Some(cursor.ident()?);
            }
            '.' => {
                cursor.pos += 1;
                compound.classes.push(cursor.ident()?);
            }
            '[' => {
                cursor.pos += 1;
                compound.attrs.push(parse_attr(cursor)?);
            }
            ':' => {
                cursor.pos += 1;
                compound.pseudos.push(parse_pseudo(cursor)?);
            }
            c if c.is_whitespace() || matches!(c, '>' | '+' | '~') => break,
            other => {
                return Err(invalid(
                    cursor.source,
                    format!("unexpected character '{other}'"),
                ))
            }
        }
    }

    if compound.is_empty() {
        return Err(invalid(cursor.source, "empty compound selector"));
    }
    Ok(compound)
}

fn parse_attr(cursor: &mut Cursor<'_>) -> HarnessResult<AttrCondition> {
    cursor.skip_whitespace();
    let key = cursor.ident()?;
    cursor.skip_whitespace();
    let op = match cursor.peek() {
        Some(']') => {
            cursor.pos += 1;
            return Ok(AttrCondition::Exists { key });
        }
        Some('=') => {
            cursor.pos += 1;
            '='
        }
        Some(c @ ('~' | '^' | '$' | '*' | '|')) => {
            cursor.pos += 1;
            if cursor.bump() != Some('=') {
                return Err(invalid(cursor.source, "expected '=' in attribute selector"));
            }
            c
        }
        _ => return Err(invalid(cursor.source, "malformed attribute selector")),
    };
    cursor.skip_whitespace();
    let value = cursor.attr_value()?;
    cursor.skip_whitespace();
    if cursor.bump() != Some(']') {
        return Err(invalid(cursor.source, "expected ']'"));
    }
    Ok(match op {
        '~' => AttrCondition::Includes { key, value },
        '^' => AttrCondition::StartsWith { key, value },
        '$' => AttrCondition::EndsWith { key, value },
        '*' => AttrCondition::Contains { key, value },
        '|' => AttrCondition::DashMatch { key, value },
        _ => AttrCondition::Eq { key, value },
    })
}

fn parse_pseudo(cursor: &mut Cursor<'_>) -> HarnessResult<PseudoClass> {
    let name = cursor.ident()?.to_ascii_lowercase();
    match name.as_str() {
        "disabled" => Ok(PseudoClass::Disabled),
        "enabled" => Ok(PseudoClass::Enabled),
        "focus" => Ok(PseudoClass::Focus),
        "checked" => Ok(PseudoClass::Checked),
        "first-child" => Ok(PseudoClass::FirstChild),
        "last-child" => Ok(PseudoClass::LastChild),
        "empty" => Ok(PseudoClass::Empty),
        "nth-child" => {
            if cursor.bump() != Some('(') {
                return Err(invalid(cursor.source, "expected '(' after :nth-child"));
            }
            let inner = cursor.parenthesized()?;
            parse_nth(cursor.source, &inner)
        }
        "not" => {
            if cursor.bump() != Some('(') {
                return Err(invalid(cursor.source, "expected '(' after :not"));
            }
            let inner = cursor.parenthesized()?;
            Ok(PseudoClass::Not(SelectorList::parse(&inner)?))
        }
        other => Err(invalid(
            cursor.source,
            format!("unsupported pseudo-class ':{other}'"),
        )),
    }
}

/// Parse an `An+B` argument, including `odd` and `even`
fn parse_nth(source: &str, argument: &str) -> HarnessResult<PseudoClass> {
    let text: String = argument
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    let bad = || invalid(source, format!("invalid :nth-child argument '{argument}'"));
    let (step, offset) = match text.as_str() {
        "odd" => (2, 1),
        "even" => (2, 0),
        _ => match text.split_once('n') {
            None => (0, text.parse::<i64>().map_err(|_| bad())?),
            Some((a, b)) => {
                let step = match a {
                    "" | "+" => 1,
                    "-" => -1,
                    a => a.parse::<i64>().map_err(|_| bad())?,
                };
                let offset = if b.is_empty() {
                    0
                } else if b.starts_with(['+', '-']) {
                    b.parse::<i64>().map_err(|_| bad())?
                } else {
                    return Err(bad());
                };
                (step, offset)
            }
        },
    };
    Ok(PseudoClass::NthChild { step, offset })
}

/// Whether `position` is `step * n + offset` for some `n >= 0`
fn nth_matches(step: i64, offset: i64, position: i64) -> bool {
    let diff = position - offset;
    if step == 0 {
        diff == 0
    } else {
        diff % step == 0 && diff / step >= 0
    }
}
