//! Live expressions
//!
//! A [`LiveExpression`] derives the value at its output key path from the
//! values at its declared dependencies. The engine owns the output path:
//! callers cannot write it or anything below it.
//!
//! # Recompute Order
//!
//! Expressions run in dependency-topological order, ties broken by
//! registration order. An expression is triggered when any dependency is
//! related to a path affected so far in the change, including the outputs
//! of expressions that already ran. Chains therefore settle in a single
//! change, and registration rejects any expression that would close a cycle.

use crate::state::StoreState;
use statekit_core::{affected_key_paths, KeyPath, Patch, StoreError, StoreResult, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Read access to the staged state while computing
pub struct Inputs<'a> {
    lookup: &'a dyn Fn(&KeyPath) -> Option<Value>,
}

impl<'a> Inputs<'a> {
    /// Value at a key path
    ///
    /// Unparseable paths read as absent.
    pub fn get(&self, key_path: &str) -> Option<Value> {
        KeyPath::parse(key_path).ok().and_then(|p| (self.lookup)(&p))
    }

    /// Value at a parsed key path
    pub fn get_path(&self, key_path: &KeyPath) -> Option<Value> {
        (self.lookup)(key_path)
    }

    /// String value at a key path, `""` when absent or not a string
    pub fn text(&self, key_path: &str) -> String {
        self.get(key_path)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default()
    }
}

type ComputeFn = Arc<dyn Fn(&Inputs<'_>) -> Value + Send + Sync>;

/// A computed value with declared dependencies
#[derive(Clone)]
pub struct LiveExpression {
    id: String,
    output: KeyPath,
    depends_on: Vec<KeyPath>,
    compute: ComputeFn,
}

impl LiveExpression {
    /// Create an expression
    ///
    /// # Example
    ///
    /// ```
    /// use statekit_core::{KeyPath, Value};
    /// use statekit_engine::LiveExpression;
    ///
    /// let full_name = LiveExpression::new(
    ///     "fullName",
    ///     KeyPath::parse("user.fullName").unwrap(),
    ///     vec![KeyPath::parse("user.first").unwrap(), KeyPath::parse("user.last").unwrap()],
    ///     |inputs| Value::from(format!("{} {}", inputs.text("user.first"), inputs.text("user.last"))),
    /// );
    /// assert_eq!(full_name.id(), "fullName");
    /// ```
    pub fn new<F>(id: impl Into<String>, output: KeyPath, depends_on: Vec<KeyPath>, compute: F) -> Self
    where
        F: Fn(&Inputs<'_>) -> Value + Send + Sync + 'static,
    {
        LiveExpression {
            id: id.into(),
            output,
            depends_on,
            compute: Arc::new(compute),
        }
    }

    /// Expression id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Engine-owned output path
    pub fn output(&self) -> &KeyPath {
        &self.output
    }

    /// Declared dependencies
    pub fn depends_on(&self) -> &[KeyPath] {
        &self.depends_on
    }

    /// Compute against a lookup function
    pub fn evaluate(&self, lookup: &dyn Fn(&KeyPath) -> Option<Value>) -> Value {
        (self.compute)(&Inputs { lookup })
    }

    /// Whether any dependency relates to one of `paths`
    pub fn is_triggered_by(&self, paths: &BTreeSet<KeyPath>) -> bool {
        self.depends_on
            .iter()
            .any(|dep| paths.iter().any(|p| p.is_related_to(dep)))
    }

    /// Whether `other`'s output feeds one of this expression's dependencies
    fn reads_from(&self, other: &LiveExpression) -> bool {
        self.depends_on.iter().any(|dep| dep.is_related_to(&other.output))
    }
}

impl fmt::Debug for LiveExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveExpression")
            .field("id", &self.id)
            .field("output", &self.output)
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

/// Registered expressions, kept in recompute order
#[derive(Debug, Clone, Default)]
pub(crate) struct LiveRegistry {
    /// Registration order
    registered: Vec<LiveExpression>,
    /// Indices into `registered`, topologically sorted
    order: Vec<usize>,
}

impl LiveRegistry {
    pub(crate) fn len(&self) -> usize {
        self.registered.len()
    }

    /// Register an expression, rejecting duplicates, conflicts and cycles
    pub(crate) fn register(&mut self, expr: LiveExpression) -> StoreResult<()> {
        if expr.output.is_root() {
            return Err(StoreError::InvalidConfiguration(format!(
                "live expression '{}' cannot own the root path",
                expr.id
            )));
        }
        if self.registered.iter().any(|e| e.id == expr.id) {
            return Err(StoreError::InvalidConfiguration(format!(
                "live expression '{}' is already registered",
                expr.id
            )));
        }
        if let Some(owner) = self
            .registered
            .iter()
            .find(|e| e.output.is_related_to(&expr.output))
        {
            return Err(StoreError::InvalidConfiguration(format!(
                "live expression '{}' overlaps the output of '{}'",
                expr.id, owner.id
            )));
        }
        if expr.reads_from(&expr) {
            return Err(StoreError::LiveExpressionCycle(expr.id));
        }

        let mut candidate = self.registered.clone();
        candidate.push(expr);
        let order = topological_order(&candidate).ok_or_else(|| {
            let id = candidate.last().map(|e| e.id.clone()).unwrap_or_default();
            StoreError::LiveExpressionCycle(id)
        })?;
        self.registered = candidate;
        self.order = order;
        Ok(())
    }

    /// Undo a registration whose initial compute could not be applied
    pub(crate) fn unregister(&mut self, id: &str) {
        self.registered.retain(|e| e.id != id);
        // Removing a node keeps the remaining graph acyclic
        self.order = topological_order(&self.registered).unwrap_or_default();
    }

    /// Expression owning `path` (its output or anything below it)
    pub(crate) fn owner_of(&self, path: &KeyPath) -> Option<&LiveExpression> {
        self.registered.iter().find(|e| e.output.is_prefix_of(path))
    }

    /// Recompute triggered expressions against staged state
    ///
    /// `affected` grows with every output written, so downstream
    /// expressions see upstream results. The expression named by `force`
    /// runs whether or not it is triggered.
    pub(crate) fn recompute(
        &self,
        affected: &mut BTreeSet<KeyPath>,
        state: &mut StoreState,
        force: Option<&str>,
    ) -> StoreResult<Vec<Patch>> {
        let mut patches = Vec::new();
        for &idx in &self.order {
            let expr = &self.registered[idx];
            if force != Some(expr.id.as_str()) && !expr.is_triggered_by(affected) {
                continue;
            }
            patches.push(compute_into(expr, state)?);
            affected.extend(affected_key_paths([&expr.output]));
        }
        Ok(patches)
    }
}

/// Evaluate one expression and write its output
fn compute_into(expr: &LiveExpression, state: &mut StoreState) -> StoreResult<Patch> {
    let value = {
        let snapshot: &StoreState = state;
        expr.evaluate(&|p: &KeyPath| snapshot.get(p))
    };
    let old = state.set(&expr.output, value.clone())?;
    Ok(Patch::set(expr.output.clone(), old, value))
}

/// Kahn's algorithm, always picking the earliest-registered ready node
fn topological_order(exprs: &[LiveExpression]) -> Option<Vec<usize>> {
    let n = exprs.len();
    // upstream[i] = expressions i reads from
    let upstream: Vec<Vec<usize>> = (0..n)
        .map(|i| (0..n).filter(|&j| j != i && exprs[i].reads_from(&exprs[j])).collect())
        .collect();

    let mut placed = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while order.len() < n {
        let next = (0..n).find(|&i| !placed[i] && upstream[i].iter().all(|&j| placed[j]))?;
        placed[next] = true;
        order.push(next);
    }
    Some(order)
}
