//! Shared free lists for snapshots and clip evaluators.
//!
//! Pools are the only state shared between blenders running on different
//! threads. Each list sits behind its own mutex; acquire and release hold the
//! lock only for a push or pop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hashbrown::HashMap;
use tracing::debug;

use crate::clip::Clip;
use crate::config::BlendConfig;
use crate::evaluator::ClipEvaluator;
use crate::result::BlendResult;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[inline]
fn clip_key(clip: &Arc<Clip>) -> usize {
    Arc::as_ptr(clip) as usize
}

/// Allocation counters and current free-list sizes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub results_created: usize,
    pub evaluators_created: usize,
    pub pooled_results: usize,
    pub pooled_evaluators: usize,
    /// Clips with at least one pooled evaluator.
    pub pooled_clips: usize,
}

/// Free lists shared by blenders.
///
/// A pooled evaluator holds an `Arc` to its clip, so a clip with evaluators in
/// the pool stays alive until they are handed out again or
/// [`purge_clip`](Self::purge_clip) drops them. Clips with no pooled
/// evaluators leave no entry behind.
#[derive(Debug)]
pub struct BlendPools {
    config: BlendConfig,
    results: Mutex<Vec<BlendResult>>,
    // Keyed by clip address; pooled evaluators keep their clip alive.
    evaluators: Mutex<HashMap<usize, Vec<ClipEvaluator>>>,
    results_created: AtomicUsize,
    evaluators_created: AtomicUsize,
}

impl Default for BlendPools {
    fn default() -> Self {
        Self::new(BlendConfig::default())
    }
}

impl BlendPools {
    pub fn new(config: BlendConfig) -> Self {
        let initial = config.initial_result_pool;
        let pools = Self {
            results: Mutex::new(Vec::with_capacity(config.max_pooled_results.max(initial))),
            evaluators: Mutex::new(HashMap::new()),
            results_created: AtomicUsize::new(initial),
            evaluators_created: AtomicUsize::new(0),
            config,
        };
        lock(&pools.results).extend((0..initial).map(|_| BlendResult::new()));
        pools
    }

    #[inline]
    pub fn config(&self) -> &BlendConfig {
        &self.config
    }

    pub fn acquire_result(&self) -> BlendResult {
        if let Some(result) = lock(&self.results).pop() {
            return result;
        }
        let created = self.results_created.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(created, "pool: new blend result");
        BlendResult::new()
    }

    /// Return a snapshot; its channel list is dropped, its storage kept.
    pub fn release_result(&self, mut result: BlendResult) {
        result.clear_channels();
        let mut free = lock(&self.results);
        if free.len() < self.config.max_pooled_results {
            free.push(result);
        }
    }

    /// Pooled evaluator for `clip`, uninitialized.
    pub fn acquire_evaluator(&self, clip: &Arc<Clip>) -> ClipEvaluator {
        let key = clip_key(clip);
        let mut map = lock(&self.evaluators);
        if let Some(free) = map.get_mut(&key) {
            let eval = free.pop();
            if free.is_empty() {
                map.remove(&key);
            }
            if let Some(eval) = eval {
                return eval;
            }
        }
        drop(map);
        let created = self.evaluators_created.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(clip = clip.name(), created, "pool: new clip evaluator");
        ClipEvaluator::new(clip.clone())
    }

    pub fn release_evaluator(&self, mut evaluator: ClipEvaluator) {
        evaluator.cleanup();
        let cap = self.config.max_pooled_evaluators_per_clip;
        if cap == 0 {
            return;
        }
        let mut map = lock(&self.evaluators);
        let free = map.entry(clip_key(evaluator.clip())).or_default();
        if free.len() < cap {
            free.push(evaluator);
        }
    }

    /// Drop every pooled evaluator of `clip`, releasing the pool's references to it.
    pub fn purge_clip(&self, clip: &Arc<Clip>) -> usize {
        lock(&self.evaluators)
            .remove(&clip_key(clip))
            .map_or(0, |v| v.len())
    }

    pub fn stats(&self) -> PoolStats {
        let evaluators = lock(&self.evaluators);
        PoolStats {
            results_created: self.results_created.load(Ordering::Relaxed),
            evaluators_created: self.evaluators_created.load(Ordering::Relaxed),
            pooled_results: lock(&self.results).len(),
            pooled_evaluators: evaluators.values().map(Vec::len).sum(),
            pooled_clips: evaluators.len(),
        }
    }
}
