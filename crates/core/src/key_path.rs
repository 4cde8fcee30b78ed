//! Key path addressing
//!
//! A key path is a dotted/bracketed address into nested store data,
//! e.g. `cart.total` or `items[0].name`.
//!
//! # Path Syntax
//!
//! | Syntax | Meaning | Example |
//! |--------|---------|---------|
//! | `key` | Object property | `user` |
//! | `.key` | Nested property | `user.name` |
//! | `[n]` | Array index | `items[0]` |
//! | (empty) | Root | `` |
//!
//! Parsing and rendering are exact inverses: `stringify(parse(p)) == p` for
//! every syntactically valid `p`. Indices are digits only and carry no
//! leading zeros, so there is exactly one spelling per path.
//!
//! [`KeyPath::is_prefix_of`] and [`KeyPath::is_related_to`] are the sole
//! basis for routing changes to subscriptions and live expressions.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One component of a key path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathComponent {
    /// Object property access: `.name`
    Property(String),
    /// Array index access: `[0]`
    Index(usize),
}

impl fmt::Display for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathComponent::Property(name) => write!(f, ".{}", name),
            PathComponent::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// A parsed key path
///
/// # Examples
///
/// ```
/// use statekit_core::KeyPath;
///
/// let total: KeyPath = "cart.total".parse().unwrap();
/// let cart = KeyPath::root().child("cart");
///
/// assert!(cart.is_prefix_of(&total));
/// assert!(!total.is_prefix_of(&cart));
/// assert!(total.is_related_to(&cart));
/// assert_eq!(total.to_string(), "cart.total");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct KeyPath {
    components: Vec<PathComponent>,
}

impl KeyPath {
    /// The empty (root) path
    pub fn root() -> Self {
        KeyPath {
            components: Vec::new(),
        }
    }

    /// Parse a key path, reporting the raw string on failure
    pub fn parse(path: &str) -> StoreResult<Self> {
        parse(path).map(|components| KeyPath { components })
    }

    /// Build a path from components
    pub fn from_components(components: Vec<PathComponent>) -> Self {
        KeyPath { components }
    }

    /// The parsed components
    pub fn components(&self) -> &[PathComponent] {
        &self.components
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// True for the root path
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// True for the root path
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Append a property component (builder pattern)
    pub fn child(mut self, name: impl Into<String>) -> Self {
        self.components.push(PathComponent::Property(name.into()));
        self
    }

    /// Append an index component (builder pattern)
    pub fn index(mut self, idx: usize) -> Self {
        self.components.push(PathComponent::Index(idx));
        self
    }

    /// Concatenate another path onto this one
    pub fn join(&self, rest: &[PathComponent]) -> Self {
        let mut components = self.components.clone();
        components.extend_from_slice(rest);
        KeyPath { components }
    }

    /// Parent path, `None` at the root
    pub fn parent(&self) -> Option<KeyPath> {
        if self.components.is_empty() {
            None
        } else {
            let mut parent = self.clone();
            parent.components.pop();
            Some(parent)
        }
    }

    /// Last component, `None` at the root
    pub fn last(&self) -> Option<&PathComponent> {
        self.components.last()
    }

    /// Strict, non-root ancestors, outermost first
    ///
    /// `a.b[0].c` yields `a`, `a.b`, `a.b[0]`.
    pub fn ancestors(&self) -> Vec<KeyPath> {
        (1..self.components.len())
            .map(|n| KeyPath::from_components(self.components[..n].to_vec()))
            .collect()
    }

    /// Component-wise prefix test (a path is a prefix of itself)
    pub fn is_prefix_of(&self, other: &KeyPath) -> bool {
        self.components.len() <= other.components.len()
            && self
                .components
                .iter()
                .zip(other.components.iter())
                .all(|(a, b)| a == b)
    }

    /// Prefix test that excludes equality
    pub fn is_strict_prefix_of(&self, other: &KeyPath) -> bool {
        self.components.len() < other.components.len() && self.is_prefix_of(other)
    }

    /// One path is an ancestor of (or equal to) the other
    pub fn is_related_to(&self, other: &KeyPath) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }

    /// Components of `other` below this path, if this path is a prefix of it
    pub fn strip_prefix_of<'a>(&self, other: &'a KeyPath) -> Option<&'a [PathComponent]> {
        if self.is_prefix_of(other) {
            Some(&other.components[self.components.len()..])
        } else {
            None
        }
    }
}

/// Parse a key path string into components
pub fn parse(path: &str) -> StoreResult<Vec<PathComponent>> {
    let mut components = Vec::new();
    let chars: Vec<char> = path.chars().collect();
    let mut i = 0;
    let mut pending = String::new();
    // Whether a property may start at the current position
    let mut expect_property = true;

    while i < chars.len() {
        match chars[i] {
            '.' => {
                if expect_property {
                    // `.a`, `a..b`
                    if pending.is_empty() {
                        return Err(StoreError::invalid_key_path(
                            path,
                            format!("empty property at position {}", i),
                        ));
                    }
                }
                if !pending.is_empty() {
                    components.push(PathComponent::Property(std::mem::take(&mut pending)));
                }
                expect_property = true;
                i += 1;
                if i >= chars.len() {
                    return Err(StoreError::invalid_key_path(path, "trailing '.'"));
                }
            }
            '[' => {
                if !pending.is_empty() {
                    components.push(PathComponent::Property(std::mem::take(&mut pending)));
                } else if expect_property && !components.is_empty() {
                    // `a.[0]`
                    return Err(StoreError::invalid_key_path(
                        path,
                        format!("empty property at position {}", i),
                    ));
                }
                let start = i;
                i += 1;
                let digits_start = i;
                while i < chars.len() && chars[i] != ']' {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(StoreError::invalid_key_path(
                        path,
                        format!("unclosed bracket at position {}", start),
                    ));
                }
                let digits: String = chars[digits_start..i].iter().collect();
                components.push(PathComponent::Index(parse_index(path, &digits)?));
                i += 1;
                // After `]` only `.`, `[` or the end may follow
                if i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                    return Err(StoreError::invalid_key_path(
                        path,
                        format!("unexpected '{}' at position {}", chars[i], i),
                    ));
                }
                expect_property = false;
            }
            ']' => {
                return Err(StoreError::invalid_key_path(
                    path,
                    format!("unmatched ']' at position {}", i),
                ));
            }
            c => {
                pending.push(c);
                i += 1;
            }
        }
    }

    if !pending.is_empty() {
        components.push(PathComponent::Property(pending));
    }
    Ok(components)
}

fn parse_index(path: &str, digits: &str) -> StoreResult<usize> {
    if digits.is_empty() {
        return Err(StoreError::invalid_key_path(path, "empty index"));
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(StoreError::invalid_key_path(
            path,
            format!("index '{}' is not numeric", digits),
        ));
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return Err(StoreError::invalid_key_path(
            path,
            format!("index '{}' has a leading zero", digits),
        ));
    }
    digits
        .parse::<usize>()
        .map_err(|e| StoreError::invalid_key_path(path, format!("index '{}': {}", digits, e)))
}

/// Render components back to key path syntax
pub fn stringify(components: &[PathComponent]) -> String {
    let mut out = String::new();
    for (i, component) in components.iter().enumerate() {
        match component {
            PathComponent::Property(name) => {
                if i > 0 {
                    out.push('.');
                }
                out.push_str(name);
            }
            PathComponent::Index(idx) => {
                out.push('[');
                out.push_str(&idx.to_string());
                out.push(']');
            }
        }
    }
    out
}

/// `parse(a)` is a component-wise prefix of `parse(b)`
///
/// Unparseable input is never a prefix of anything.
pub fn is_prefix(a: &str, b: &str) -> bool {
    match (KeyPath::parse(a), KeyPath::parse(b)) {
        (Ok(a), Ok(b)) => a.is_prefix_of(&b),
        _ => false,
    }
}

/// `is_prefix(a, b) || is_prefix(b, a)`
pub fn are_related(a: &str, b: &str) -> bool {
    is_prefix(a, b) || is_prefix(b, a)
}

impl FromStr for KeyPath {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyPath::parse(s)
    }
}

impl TryFrom<&str> for KeyPath {
    type Error = StoreError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        KeyPath::parse(s)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&stringify(&self.components))
    }
}

impl Serialize for KeyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for KeyPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        KeyPath::parse(&raw).map_err(serde::de::Error::custom)
    }
}
