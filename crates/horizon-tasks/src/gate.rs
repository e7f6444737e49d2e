//! Gate evaluation: probe the representative, disable members when satisfied

use tracing::{debug, info, instrument};

use crate::cache::CacheBackend;
use crate::dag::{TaskDag, TaskNode};
use crate::history::HistoryStore;
use crate::horizon::{GroupError, HorizonGroup};
use crate::outcome::Outcome;
use crate::probe::Probe;
use crate::task::TaskId;

/// What a gate did for one run
#[derive(Debug)]
pub enum GateDecision {
    /// The representative is not scheduled, so there was nothing to gate
    NotScheduled,
    /// The result is available; every scheduled member was disabled
    Disabled {
        outcome: Outcome,
        members: Vec<TaskId>,
    },
    /// Members run normally
    Proceed { outcome: Outcome },
}

impl GateDecision {
    /// Probe outcome, when the probe ran
    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            GateDecision::NotScheduled => None,
            GateDecision::Disabled { outcome, .. } | GateDecision::Proceed { outcome } => {
                Some(outcome)
            }
        }
    }

    /// Members disabled by this decision
    pub fn disabled_members(&self) -> &[TaskId] {
        match self {
            GateDecision::Disabled { members, .. } => members,
            _ => &[],
        }
    }
}

/// Find the representative's node in the run graph
pub fn locate<'d>(group: &HorizonGroup, dag: &'d TaskDag) -> Result<&'d TaskNode, GroupError> {
    let id = group.representative().id();
    dag.get(id)
        .ok_or_else(|| GroupError::NodeNotScheduled(id.clone()))
}

/// Evaluate a horizon's gate against the current run graph.
///
/// Disabling is all-or-nothing across the members scheduled in `dag`.
#[instrument(skip_all, fields(horizon = %group.name()))]
pub fn execute<H, C>(group: &HorizonGroup, dag: &TaskDag, probe: &Probe<'_, H, C>) -> GateDecision
where
    H: HistoryStore + ?Sized,
    C: CacheBackend + ?Sized,
{
    let node = match locate(group, dag) {
        Ok(node) => node,
        Err(e) => {
            debug!(error = %e, "nothing to gate");
            return GateDecision::NotScheduled;
        }
    };

    let outcome = probe.run(node);
    if !outcome.is_satisfiable() {
        info!(horizon = %group.name(), outcome = %outcome.kind(), "horizon members will run");
        return GateDecision::Proceed { outcome };
    }

    let members: Vec<TaskId> = group
        .members()
        .iter()
        .filter_map(|member| dag.get(member.id()))
        .map(|node| {
            node.set_enabled(false);
            node.id.clone()
        })
        .collect();

    info!(
        horizon = %group.name(),
        outcome = %outcome.kind(),
        disabled = members.len(),
        "horizon result available, members disabled"
    );
    GateDecision::Disabled { outcome, members }
}
