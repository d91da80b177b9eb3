//! Process-wide sets of pluggable resources.
//!
//! A [`ResourceRepository`] holds the discoverer providers, fetchers, or
//! credential providers the manager consults. Loading merges only unseen
//! resources and notifies subscribers with exactly the set that was added.
//! Repositories of different capability types are independent: loading new
//! discoverers never blocks loading new fetchers.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::credentials::CredentialProvider;
use crate::discovery::DiscovererProvider;
use crate::fetching::PluginFetcher;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// A resource loader failed to enumerate its resources. Retryable.
    #[error("failed to load resources: {reason}")]
    DataAccess { reason: String },

    /// A resource loader produced an invalid resource set.
    #[error("resource set is invalid: {reason}")]
    Corrupted { reason: String },
}

/// A resource that can live in a [`ResourceRepository`], keyed by a stable
/// identity so duplicate loads are detected.
pub trait ManagedResource: Send + Sync {
    fn resource_id(&self) -> &str;
}

impl ManagedResource for dyn DiscovererProvider {
    fn resource_id(&self) -> &str {
        self.name()
    }
}

impl ManagedResource for dyn PluginFetcher {
    fn resource_id(&self) -> &str {
        self.name()
    }
}

impl ManagedResource for dyn CredentialProvider {
    fn resource_id(&self) -> &str {
        self.name()
    }
}

type Subscriber<T> = Box<dyn Fn(&[Arc<T>]) + Send + Sync>;

/// Mutation-safe, ordered set of resources of one capability type.
///
/// Order is insertion order; callers that care about provider precedence
/// load resources in precedence order.
pub struct ResourceRepository<T: ManagedResource + ?Sized> {
    resources: Mutex<Vec<Arc<T>>>,
    subscribers: Mutex<Vec<Subscriber<T>>>,
}

impl<T: ManagedResource + ?Sized> ResourceRepository<T> {
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Merge `new_resources` into the set, skipping ids already present.
    ///
    /// Subscribers are notified after the repository lock is released, and
    /// only when the merge actually added something; the notification
    /// carries exactly the resources added by this call.
    pub fn load(&self, new_resources: Vec<Arc<T>>) -> usize {
        let added: Vec<Arc<T>> = {
            let mut resources = lock(&self.resources);
            let mut added = Vec::new();
            for resource in new_resources {
                let id = resource.resource_id();
                let duplicate = resources
                    .iter()
                    .chain(added.iter())
                    .any(|r| r.resource_id() == id);
                if duplicate {
                    tracing::debug!(resource = id, "skipping already-loaded resource");
                } else {
                    added.push(resource);
                }
            }
            resources.extend(added.iter().cloned());
            added
        };

        if !added.is_empty() {
            for subscriber in lock(&self.subscribers).iter() {
                subscriber(&added);
            }
        }
        added.len()
    }

    /// Merge the resources produced by `loader`.
    ///
    /// The loader runs outside the repository lock, so a slow loader never
    /// blocks snapshots.
    pub fn load_with<F>(&self, loader: F) -> Result<usize, RepositoryError>
    where
        F: FnOnce() -> Result<Vec<Arc<T>>, RepositoryError>,
    {
        Ok(self.load(loader()?))
    }

    /// Current resource set, in load order.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        lock(&self.resources).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.resources).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.resources).is_empty()
    }

    /// Register a callback invoked with each newly added resource set.
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&[Arc<T>]) + Send + Sync + 'static,
    {
        lock(&self.subscribers).push(Box::new(subscriber));
    }
}

impl<T: ManagedResource + ?Sized> Default for ResourceRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

// A poisoned lock only means another thread panicked mid-merge; the set
// itself is still a valid Vec, so recover it rather than propagate.
fn lock<'a, U: ?Sized>(mutex: &'a Mutex<U>) -> MutexGuard<'a, U> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
