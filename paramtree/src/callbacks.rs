//! Per-path observers
//!
//! Callbacks run synchronously on the thread that committed the change, in
//! registration order, after the map lock is released. They may read the
//! device but should not block.

use std::collections::HashMap;
use std::sync::Arc;

use param_map::Parameter;
use parking_lot::RwLock;

/// Observer invoked with the parameter's state after a change
pub type Callback = Arc<dyn Fn(&Parameter) + Send + Sync>;

#[derive(Default)]
pub struct CallbackRegistry {
    observers: RwLock<HashMap<String, Vec<Callback>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for exact `destination`
    pub fn add<F>(&self, destination: impl Into<String>, callback: F)
    where
        F: Fn(&Parameter) + Send + Sync + 'static,
    {
        self.observers
            .write()
            .entry(destination.into())
            .or_default()
            .push(Arc::new(callback));
    }

    /// Drop every callback on `destination`; returns how many were removed
    pub fn clear(&self, destination: &str) -> usize {
        self.observers
            .write()
            .remove(destination)
            .map_or(0, |callbacks| callbacks.len())
    }

    pub fn count(&self, destination: &str) -> usize {
        self.observers.read().get(destination).map_or(0, Vec::len)
    }

    /// Invoke the callbacks registered for `parameter.destination`
    pub fn invoke(&self, parameter: &Parameter) {
        // Clone out so callbacks may register further observers
        let callbacks = match self.observers.read().get(&parameter.destination) {
            Some(callbacks) => callbacks.clone(),
            None => return,
        };
        for callback in callbacks {
            callback(parameter);
        }
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("destinations", &self.observers.read().len())
            .finish()
    }
}
