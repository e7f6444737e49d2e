//! Caching-state resolution shared by real executions and the probe
//!
//! Stages run in a fixed order: load the prior execution state, capture the
//! current fingerprint, detect overlapping outputs, look the result up in the
//! cache, then compare against the prior state. The first stage that can
//! answer decides. Nothing
//! here runs a task's action or writes to the history or the cache.

use tracing::debug;

use crate::cache::{CacheBackend, CacheEntry, CacheKey};
use crate::dag::TaskNode;
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::history::{ExecutionState, HistoryStore};
use crate::outcome::ProbeError;
use crate::task::TaskDefinition;

/// How a task's result can be obtained
#[derive(Debug)]
pub enum CachingState {
    /// Outputs on disk already match the last successful execution
    UpToDate,
    /// A cached result exists for the current inputs
    FromCache(CacheEntry),
    /// The action has to run
    Execute {
        /// Why the result is not available
        reasons: Vec<String>,
    },
}

/// Everything learned about a task before its action would run
#[derive(Debug)]
pub struct Resolution {
    /// State recorded by the last successful execution
    pub prior: Option<ExecutionState>,
    /// Fingerprint captured just now
    pub fingerprint: Fingerprint,
    /// Files in the output locations this task did not produce
    pub overlapping: Vec<String>,
    /// Key the result is cached under, for cacheable tasks
    pub cache_key: Option<CacheKey>,
    /// Outputs on disk match the prior state, whatever `state` says
    pub outputs_current: bool,
    pub state: CachingState,
}

/// Resolve the caching state of a scheduled task.
///
/// A cache hit is reported before the history comparison, so a task whose
/// result is cached resolves to [`CachingState::FromCache`] even when its
/// outputs are also current. Overlapping outputs block both kinds of reuse.
pub fn resolve<H, C>(
    node: &TaskNode,
    history: &H,
    cache: Option<&C>,
    fingerprinter: &dyn Fingerprinter,
) -> Result<Resolution, ProbeError>
where
    H: HistoryStore + ?Sized,
    C: CacheBackend + ?Sized,
{
    let prior = history.load_prior_state(&node.id)?;
    let fingerprint = fingerprinter.capture(node)?;
    let overlapping = fingerprinter.detect_overlapping_outputs(&fingerprint, prior.as_ref());

    let cache_key = node
        .definition
        .is_cacheable()
        .then(|| CacheKey::from_fingerprint(&node.id, &fingerprint));

    let reasons = execution_reasons(&node.definition, &fingerprint, prior.as_ref(), &overlapping);
    let outputs_current = reasons.is_empty();

    let mut hit = None;
    if overlapping.is_empty() {
        if let (Some(cache), Some(key)) = (cache, cache_key.as_ref()) {
            hit = cache.lookup(key)?;
        }
    }

    let state = match hit {
        Some(entry) => {
            debug!(task = %node.id, key = %entry.key, "result available from cache");
            CachingState::FromCache(entry)
        }
        None if outputs_current => {
            debug!(task = %node.id, "task is up to date");
            CachingState::UpToDate
        }
        None => {
            debug!(task = %node.id, reasons = reasons.len(), "task requires execution");
            CachingState::Execute { reasons }
        }
    };

    Ok(Resolution {
        prior,
        fingerprint,
        overlapping,
        cache_key,
        outputs_current,
        state,
    })
}

/// Reasons the task cannot be considered up to date. Empty means it is.
pub fn execution_reasons(
    definition: &TaskDefinition,
    current: &Fingerprint,
    prior: Option<&ExecutionState>,
    overlapping: &[String],
) -> Vec<String> {
    if !definition.has_outputs() {
        return vec!["Task has no declared outputs.".to_string()];
    }
    let Some(prior) = prior else {
        return vec!["No history is available.".to_string()];
    };

    let mut reasons = Vec::new();
    if prior.implementation != current.implementation {
        reasons.push("Task implementation has changed.".to_string());
    }

    for (path, hash) in &current.inputs {
        match prior.inputs.get(path) {
            Some(previous) if previous == hash => {}
            Some(_) => reasons.push(format!("Input file {} has changed.", path)),
            None => reasons.push(format!("Input file {} has been added.", path)),
        }
    }
    for path in prior.inputs.keys() {
        if !current.inputs.contains_key(path) {
            reasons.push(format!("Input file {} has been removed.", path));
        }
    }

    for path in prior.outputs.keys() {
        if !current.outputs.contains_key(path) {
            reasons.push(format!("Output file {} has been removed.", path));
        }
    }
    if !overlapping.is_empty() {
        reasons.push(format!("Overlapping outputs: {}.", overlapping.join(", ")));
    }

    reasons
}
