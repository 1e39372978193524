use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use crate::policy::PolicyRegistry;

/// Per-dispatch context shared by every node of a pipeline.
///
/// Carries a key/value bag that middleware and handlers can use to pass
/// data along the chain, and the named policies available to `UsePolicy`.
#[derive(Debug, Default)]
pub struct RequestContext {
    policies: Arc<PolicyRegistry>,
    bag: RwLock<HashMap<String, Value>>,
}

impl RequestContext {
    pub fn new(policies: Arc<PolicyRegistry>) -> Self {
        Self {
            policies,
            bag: RwLock::new(HashMap::new()),
        }
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.bag
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.bag
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// An independent copy, given to each subscriber of a published event.
    pub fn copy(&self) -> Self {
        let bag = self.bag.read().unwrap_or_else(PoisonError::into_inner).clone();
        Self {
            policies: Arc::clone(&self.policies),
            bag: RwLock::new(bag),
        }
    }
}
