//! Result caching stage.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tracing::debug;

use super::{ExecutionMode, ExecutionResult, Next, Stage};
use crate::command::CommandExecutionToken;
use crate::error::Result;
use crate::metadata::ObjectName;
use crate::rules::OperationTypes;

struct CachedResult {
    object: String,
    stored_at: Instant,
    result: ExecutionResult,
}

/// Caches the results of read-only commands.
///
/// Entries are keyed by command text and bound parameter values. Any write
/// to an object drops the entries read from it; commands that may touch
/// anything (stored procedure calls) drop every entry.
///
/// Every invalidation also advances a generation counter, and a read only
/// stores its result when no invalidation of its object happened while it
/// ran. A slow read overlapping a write therefore never caches the pre-write
/// rows.
pub struct CachingStage {
    entries: DashMap<String, CachedResult>,
    generations: DashMap<String, u64>,
    epoch: AtomicU64,
    ttl: Option<Duration>,
}

impl CachingStage {
    /// Creates a cache whose entries never expire on their own.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates a cache whose entries expire after `ttl`.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::build(Some(ttl))
    }

    fn build(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            generations: DashMap::new(),
            epoch: AtomicU64::new(0),
            ttl,
        }
    }

    /// Number of cached results, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every cached result read from `object`.
    pub fn invalidate_object(&self, object: &ObjectName) {
        let key = object.key();
        *self.generations.entry(key.clone()).or_insert(0) += 1;
        self.entries.retain(|_, entry| entry.object != key);
    }

    /// Drops every cached result.
    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
    }

    fn generation(&self, object: &str) -> (u64, u64) {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let generation = self.generations.get(object).map_or(0, |g| *g);
        (epoch, generation)
    }

    fn is_expired(&self, entry: &CachedResult) -> bool {
        self.ttl.is_some_and(|ttl| entry.stored_at.elapsed() >= ttl)
    }

    fn cache_key(token: &CommandExecutionToken, mode: ExecutionMode) -> String {
        let mut key = format!("{mode:?}\u{1f}{}", token.command_text());
        for parameter in token.parameters() {
            let _ = write!(
                key,
                "\u{1f}{}={}",
                parameter.name,
                parameter.value.to_sql_inline()
            );
        }
        key
    }

    fn lookup(&self, key: &str) -> Option<ExecutionResult> {
        {
            let entry = self.entries.get(key)?;
            if !self.is_expired(&entry) {
                return Some(entry.result.clone());
            }
        }
        // another reader may have refreshed the entry since the guard dropped
        self.entries.remove_if(key, |_, entry| self.is_expired(entry));
        None
    }

    fn store(&self, key: String, object: String, before: (u64, u64), result: &ExecutionResult) {
        if self.generation(&object) != before {
            debug!(object = %object, "Result not cached, object changed during the read");
            return;
        }
        let stored_at = Instant::now();
        self.entries.insert(
            key.clone(),
            CachedResult {
                object: object.clone(),
                stored_at,
                result: result.clone(),
            },
        );
        // an invalidation between the check and the insert may have purged
        // before this entry existed
        if self.generation(&object) != before {
            self.entries.remove_if(&key, |_, entry| entry.stored_at == stored_at);
        }
    }

    fn invalidate_for(&self, token: &CommandExecutionToken) {
        if token.operation() == OperationTypes::ALL {
            debug!(operation = token.operation_name(), "Result cache cleared");
            self.clear();
        } else {
            debug!(object = %token.object_name(), "Result cache invalidated");
            self.invalidate_object(token.object_name());
        }
    }
}

impl Default for CachingStage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CachingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingStage")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Stage for CachingStage {
    fn handle<'a>(
        &'a self,
        token: &'a CommandExecutionToken,
        mode: ExecutionMode,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<ExecutionResult>> {
        Box::pin(async move {
            if !token.is_read_only() {
                let result = next.run(token, mode).await;
                self.invalidate_for(token);
                return result;
            }

            let key = Self::cache_key(token, mode);
            if let Some(hit) = self.lookup(&key) {
                debug!(operation = token.operation_name(), object = %token.object_name(), "Result cache hit");
                return Ok(hit);
            }
            debug!(operation = token.operation_name(), object = %token.object_name(), "Result cache miss");

            let object = token.object_name().key();
            let before = self.generation(&object);
            let result = next.run(token, mode).await?;
            self.store(key, object, before, &result);
            Ok(result)
        })
    }
}
