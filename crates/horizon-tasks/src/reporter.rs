//! Task execution reporting

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::outcome::OutcomeKind;
use crate::task::TaskId;

/// Events emitted during a run
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A task is starting execution
    Started { id: TaskId, command: String },
    /// A task produced output
    Output {
        id: TaskId,
        line: String,
        is_stderr: bool,
    },
    /// A task completed successfully
    Completed {
        id: TaskId,
        duration: Duration,
        cached: bool,
        up_to_date: bool,
    },
    /// A task failed
    Failed {
        id: TaskId,
        duration: Duration,
        error: String,
    },
    /// A task was skipped (dry run, earlier failure)
    Skipped { id: TaskId, reason: String },
    /// A task was disabled by a horizon gate
    Disabled { id: TaskId },
    /// A horizon gate finished evaluating
    GateEvaluated {
        horizon: String,
        outcome: Option<OutcomeKind>,
        disabled: usize,
    },
    /// An execution wave is starting
    WaveStarted { wave: usize, task_count: usize },
    /// All tasks completed
    AllCompleted {
        total: usize,
        succeeded: usize,
        failed: usize,
        cached: usize,
        up_to_date: usize,
        disabled: usize,
        duration: Duration,
    },
}

/// Trait for reporting task execution progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Simple reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { id, command } => {
                tracing::info!("Starting {}: {}", id, command);
            }
            TaskEvent::Output {
                id,
                line,
                is_stderr,
            } => {
                if *is_stderr {
                    tracing::warn!("[{}] {}", id, line);
                } else {
                    tracing::debug!("[{}] {}", id, line);
                }
            }
            TaskEvent::Completed {
                id,
                duration,
                cached,
                up_to_date,
            } => {
                let suffix = if *up_to_date {
                    " (up-to-date)"
                } else if *cached {
                    " (cached)"
                } else {
                    ""
                };
                tracing::info!("{} completed{} in {:.1}s", id, suffix, duration.as_secs_f64());
            }
            TaskEvent::Failed {
                id,
                duration,
                error,
            } => {
                tracing::error!("{} failed after {:.1}s: {}", id, duration.as_secs_f64(), error);
            }
            TaskEvent::Skipped { id, reason } => {
                tracing::info!("{} skipped: {}", id, reason);
            }
            TaskEvent::Disabled { id } => {
                tracing::info!("{} disabled by horizon", id);
            }
            TaskEvent::GateEvaluated {
                horizon,
                outcome,
                disabled,
            } => match outcome {
                Some(outcome) => tracing::info!(
                    "Horizon {} is {}, {} member(s) disabled",
                    horizon,
                    outcome,
                    disabled
                ),
                None => tracing::info!("Horizon {} not scheduled, nothing to gate", horizon),
            },
            TaskEvent::WaveStarted { wave, task_count } => {
                tracing::info!("Starting wave {} ({} tasks)", wave, task_count);
            }
            TaskEvent::AllCompleted {
                total,
                succeeded,
                failed,
                cached,
                up_to_date,
                disabled,
                duration,
            } => {
                tracing::info!(
                    "All tasks complete: {}/{} succeeded, {} failed, {} cached, {} up-to-date, {} disabled ({:.1}s)",
                    succeeded,
                    total,
                    failed,
                    cached,
                    up_to_date,
                    disabled,
                    duration.as_secs_f64()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Tasks that emitted a `Started` event, in order
    pub fn started(&self) -> Vec<TaskId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TaskEvent::Started { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}

/// Broadcasts events to several reporters
pub struct TaskReporterRegistry {
    reporters: Vec<Arc<dyn TaskReporter>>,
}

impl TaskReporterRegistry {
    pub fn new() -> Self {
        Self {
            reporters: vec![Arc::new(TracingReporter)],
        }
    }

    pub fn empty() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn register<R: TaskReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Arc::new(reporter));
    }

    pub fn register_shared(&mut self, reporter: Arc<dyn TaskReporter>) {
        self.reporters.push(reporter);
    }

    pub fn all(&self) -> &[Arc<dyn TaskReporter>] {
        &self.reporters
    }

    /// Broadcast an event to all registered reporters
    pub fn broadcast(&self, event: &TaskEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

impl Default for TaskReporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskReporter for TaskReporterRegistry {
    fn report(&self, event: &TaskEvent) {
        self.broadcast(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::default();
        let id = TaskId::new("app", "compile");

        reporter.report(&TaskEvent::Started {
            id: id.clone(),
            command: "cc main.c".to_string(),
        });
        reporter.report(&TaskEvent::Disabled { id: id.clone() });

        assert_eq!(reporter.events().len(), 2);
        assert_eq!(reporter.started(), vec![id]);
    }

    #[test]
    fn test_tracing_reporter() {
        let reporter = TracingReporter;

        // Just verify it doesn't panic
        reporter.report(&TaskEvent::GateEvaluated {
            horizon: "assemble".to_string(),
            outcome: Some(OutcomeKind::UpToDate),
            disabled: 3,
        });
        reporter.report(&TaskEvent::Completed {
            id: TaskId::new("app", "assemble"),
            duration: Duration::from_secs(1),
            cached: false,
            up_to_date: true,
        });
    }

    #[test]
    fn test_broadcast() {
        let collecting = Arc::new(CollectingReporter::default());
        let mut registry = TaskReporterRegistry::empty();
        registry.register_shared(collecting.clone());
        registry.register(TracingReporter);
        assert_eq!(registry.all().len(), 2);

        registry.report(&TaskEvent::WaveStarted {
            wave: 0,
            task_count: 1,
        });
        assert_eq!(collecting.events().len(), 1);
    }
}
