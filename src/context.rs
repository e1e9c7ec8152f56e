//! Per-execution context handed to breaker and retry callbacks.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type ContextValue = Arc<dyn Any + Send + Sync>;

/// Key/value data scoped to a single top-level execution.
///
/// A fresh context is created for every call unless the caller supplies one.
/// Hooks receive it mutably, so they can both read what the caller stored and
/// leave values behind for the caller to inspect afterwards.
#[derive(Clone, Default)]
pub struct Context {
    operation_key: Option<String>,
    data: BTreeMap<String, ContextValue>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty context labelled with an operation key.
    pub fn with_operation_key(key: impl Into<String>) -> Self {
        Self {
            operation_key: Some(key.into()),
            data: BTreeMap::new(),
        }
    }

    /// The operation key, if one was given.
    pub fn operation_key(&self) -> Option<&str> {
        self.operation_key.as_deref()
    }

    /// Stores `value` under `key`, returning `self` for chaining.
    pub fn with<T>(mut self, key: impl Into<String>, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.insert(key, value);
        self
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.data.insert(key.into(), Arc::new(value));
    }

    /// Returns the value stored under `key` if it has type `T`.
    pub fn get<T>(&self, key: &str) -> Option<&T>
    where
        T: Any + Send + Sync,
    {
        self.data.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    /// Returns true if any value is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Removes the value stored under `key`, returning whether one existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if no values are stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("operation_key", &self.operation_key)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}
