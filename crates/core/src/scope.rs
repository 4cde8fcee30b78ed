//! Scopes and storage kinds
//!
//! A [`Scope`] partitions stored data (app-wide vs. per running scenario).
//! A [`StorageKind`] is the persistence strategy bound to a scope instance.
//! Scope decides namespace isolation, never persistence.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical data partition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    /// Process/app-wide data
    App,
    /// Data tied to one running UI scenario/session
    Scenario(String),
}

impl Scope {
    /// Create a scenario scope
    pub fn scenario(id: impl Into<String>) -> Self {
        Scope::Scenario(id.into())
    }

    /// Wire tag: `"app"` or `"scenario"`
    pub fn wire_tag(&self) -> &'static str {
        match self {
            Scope::App => "app",
            Scope::Scenario(_) => "scenario",
        }
    }

    /// Namespace component of persistence keys
    ///
    /// Distinct scenario ids always give distinct keys, and a key never
    /// contains `.` or a path separator.
    ///
    /// ```
    /// use statekit_core::Scope;
    ///
    /// assert_eq!(Scope::scenario("checkout-1").key(), "scenario_checkout_2D1");
    /// assert_ne!(Scope::scenario("checkout-1").key(), Scope::scenario("checkout_1").key());
    /// ```
    pub fn key(&self) -> String {
        match self {
            Scope::App => "app".to_string(),
            Scope::Scenario(id) => format!("scenario_{}", escape(id)),
        }
    }

    /// Scenario id, if any
    pub fn scenario_id(&self) -> Option<&str> {
        match self {
            Scope::App => None,
            Scope::Scenario(id) => Some(id),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::App => f.write_str("app"),
            Scope::Scenario(id) => write!(f, "scenario({})", id),
        }
    }
}

/// Persistence strategy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageKind {
    /// Process memory only
    Memory,
    /// Durable preferences, optionally namespaced by a suite
    UserPrefs(Option<String>),
    /// A JSON document at a file location
    File(String),
    /// A remote, namespaced backend
    Backend(String),
    /// Memory that is discarded when the scenario session ends
    ScenarioSession,
}

impl StorageKind {
    /// Stable identifier used for backend lookup and persistence keys
    ///
    /// ```
    /// use statekit_core::StorageKind;
    ///
    /// assert_eq!(StorageKind::Memory.identifier(), "memory");
    /// assert_eq!(StorageKind::UserPrefs(None).identifier(), "userPrefs_default");
    /// assert_eq!(StorageKind::File("data/cart.json".into()).identifier(), "file_data_cart_json");
    /// ```
    pub fn identifier(&self) -> String {
        match self {
            StorageKind::Memory => "memory".to_string(),
            StorageKind::UserPrefs(suite) => {
                format!("userPrefs_{}", suite.as_deref().unwrap_or("default"))
            }
            StorageKind::File(location) => format!("file_{}", sanitize(location)),
            StorageKind::Backend(namespace) => format!("backend_{}", namespace),
            StorageKind::ScenarioSession => "scenarioSession".to_string(),
        }
    }

    /// Whether data outlives the process
    pub fn is_durable(&self) -> bool {
        matches!(
            self,
            StorageKind::UserPrefs(_) | StorageKind::File(_) | StorageKind::Backend(_)
        )
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

/// Key under which a (scope, kind) pair is persisted
pub fn persistence_key(scope: &Scope, kind: &StorageKind) -> String {
    format!("{}.{}", scope.key(), kind.identifier())
}

/// Keep `[A-Za-z0-9]` and write every other byte as `_XX` (upper-case hex)
///
/// Unlike [`sanitize`] this never maps two inputs onto one output.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("_{:02X}", byte));
        }
    }
    out
}

/// Replace every character outside `[A-Za-z0-9]` with `_`
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
