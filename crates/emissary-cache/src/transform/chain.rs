//! All-or-nothing concurrent application of a transformation set.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use emissary_core::{EmissaryError, Entity, Result, SharedEntity, correlation};
use tokio::task::{Id, JoinSet};
use tracing::{Instrument, info, warn};

use super::{TransformError, Transformation};
use crate::metrics::CacheMetrics;

/// The active set of transformations.
///
/// [`apply`](Self::apply) runs every member concurrently and succeeds only
/// if all of them do.
#[derive(Clone, Default)]
pub struct TransformationChain {
    members: Vec<Arc<dyn Transformation>>,
    metrics: CacheMetrics,
}

impl TransformationChain {
    pub fn new(members: Vec<Arc<dyn Transformation>>) -> Self {
        Self {
            members,
            metrics: CacheMetrics::new(),
        }
    }

    /// A chain with no members.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds a member.
    pub fn with(mut self, transformation: impl Transformation) -> Self {
        self.members.push(Arc::new(transformation));
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.members.iter().map(|t| t.name()).collect()
    }

    /// Applies every member to `entity` concurrently.
    ///
    /// Members are spawned on the runtime inside the caller's correlation
    /// scope and tracing span. The first failure (an error or a panic) ends
    /// the wait: the remaining members are detached and left to finish on
    /// their own, and the partially mutated entity is dropped. An empty
    /// chain returns `entity` untouched.
    ///
    /// # Errors
    ///
    /// `EmissaryError::Transformation` naming the failed member.
    pub async fn apply(&self, entity: Entity) -> Result<Entity> {
        if self.members.is_empty() {
            return Ok(entity);
        }

        let shared = SharedEntity::new(entity);
        let ambient = correlation::current();
        let mut running = JoinSet::new();
        let mut names: HashMap<Id, String> = HashMap::with_capacity(self.members.len());

        for member in &self.members {
            let name = member.name().to_string();
            let member = Arc::clone(member);
            let target = shared.clone();
            let task = async move { member.apply(&target).await };

            let handle =
                running.spawn(correlation::scope_opt(ambient.clone(), task).in_current_span());
            names.insert(handle.id(), name);
        }

        while let Some(joined) = running.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(join_error) => {
                    let name = names.get(&join_error.id()).cloned().unwrap_or_default();
                    running.detach_all();
                    return Err(self.failed(&name, TransformError::other("panicked")));
                },
            };

            let name = names.get(&id).map(String::as_str).unwrap_or_default();
            match outcome {
                Ok(()) => info!(transformation = %name, "Transformation applied"),
                Err(e) => {
                    let name = name.to_string();
                    running.detach_all();
                    return Err(self.failed(&name, e));
                },
            }
        }

        Ok(shared.into_inner())
    }

    fn failed(&self, name: &str, error: TransformError) -> EmissaryError {
        warn!(transformation = %name, error = %error, "Transformation failed");
        self.metrics.record_transformation_failure(name);
        EmissaryError::transformation(name, error.to_string())
    }
}

impl fmt::Debug for TransformationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformationChain")
            .field("members", &self.names())
            .finish()
    }
}
