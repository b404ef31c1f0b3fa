//! Provisioning pipeline orchestration and run reporting.

use crate::error::ProvisionError;
use crate::plan::ProvisionPlan;
use crate::step::{StepContext, StepOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Final state of one step in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Ran and changed the environment.
    Applied,
    /// Ran and found everything in place.
    AlreadyPresent,
    /// Skipped on operator request.
    Skipped,
    /// Ran and failed; the run stopped here.
    Failed,
    /// Not reached because an earlier step failed.
    NotRun,
}

/// Per-step entry of a run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    /// Step name.
    pub name: String,

    /// Final state.
    pub status: StepStatus,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Outcome detail or error message.
    pub detail: String,
}

/// Result of a complete provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionReport {
    /// Unique run ID.
    pub run_id: String,

    /// Digest of the ordered step names.
    pub plan_digest: String,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Whether every non-skipped step succeeded.
    pub success: bool,

    /// Name of the step that aborted the run.
    pub failed_step: Option<String>,

    /// One entry per planned step, in order.
    pub steps: Vec<StepReport>,
}

impl ProvisionReport {
    /// Number of steps with the given status.
    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// Status of the named step.
    pub fn status_of(&self, name: &str) -> Option<StepStatus> {
        self.steps.iter().find(|s| s.name == name).map(|s| s.status)
    }
}

/// Sequential provisioning driver.
pub struct Provisioner {
    ctx: StepContext,
}

impl Provisioner {
    pub fn new(ctx: StepContext) -> Self {
        Self { ctx }
    }

    /// Execute the plan in order, stopping at the first failing step.
    ///
    /// Steps after a failure are reported as `NotRun` and are never
    /// started. Nothing is rolled back.
    pub async fn run(&self, plan: &ProvisionPlan) -> Result<ProvisionReport, ProvisionError> {
        let run_id = Uuid::new_v4().to_string();
        let plan_digest = plan.digest();
        let started_at = Utc::now();

        info!(run_id = %run_id, plan = %&plan_digest[..12], steps = plan.len(), "Starting provisioning run");

        let mut reports = Vec::with_capacity(plan.len());
        let mut failure = None;

        for step in plan.steps() {
            let name = step.name().to_string();

            if failure.is_some() {
                reports.push(StepReport {
                    name,
                    status: StepStatus::NotRun,
                    duration_ms: 0,
                    detail: String::new(),
                });
                continue;
            }

            if plan.is_skipped(&name) {
                warn!(step = %name, "Skipping step on operator request");
                reports.push(StepReport {
                    name,
                    status: StepStatus::Skipped,
                    duration_ms: 0,
                    detail: "skipped".to_string(),
                });
                continue;
            }

            info!(step = %name, "Executing step");
            let start = Instant::now();
            let result = step.run(&self.ctx).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(outcome) => {
                    let status = match &outcome {
                        StepOutcome::Applied(_) => StepStatus::Applied,
                        StepOutcome::AlreadyPresent(_) => StepStatus::AlreadyPresent,
                    };
                    info!(step = %name, ?status, duration_ms, detail = outcome.detail(), "Step finished");
                    reports.push(StepReport {
                        name,
                        status,
                        duration_ms,
                        detail: outcome.detail().to_string(),
                    });
                }
                Err(e) => {
                    error!(step = %name, duration_ms, error = %e, "Step failed, aborting run");
                    reports.push(StepReport {
                        name: name.clone(),
                        status: StepStatus::Failed,
                        duration_ms,
                        detail: e.to_string(),
                    });
                    failure = Some((name, e));
                }
            }
        }

        let report = ProvisionReport {
            run_id,
            plan_digest,
            started_at,
            finished_at: Utc::now(),
            success: failure.is_none(),
            failed_step: failure.as_ref().map(|(name, _)| name.clone()),
            steps: reports,
        };

        match failure {
            None => {
                info!(
                    run_id = %report.run_id,
                    applied = report.count(StepStatus::Applied),
                    already_present = report.count(StepStatus::AlreadyPresent),
                    "Provisioning completed successfully"
                );
                Ok(report)
            }
            Some((step, source)) => Err(ProvisionError::StepFailed {
                step,
                report: Box::new(report),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(statuses: &[StepStatus]) -> ProvisionReport {
        ProvisionReport {
            run_id: "run123".to_string(),
            plan_digest: "abc123".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            success: !statuses.contains(&StepStatus::Failed),
            failed_step: None,
            steps: statuses
                .iter()
                .enumerate()
                .map(|(i, status)| StepReport {
                    name: format!("step{}", i),
                    status: *status,
                    duration_ms: 1,
                    detail: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_report_counts() {
        let r = report(&[
            StepStatus::Applied,
            StepStatus::AlreadyPresent,
            StepStatus::Failed,
            StepStatus::NotRun,
            StepStatus::NotRun,
        ]);
        assert_eq!(r.count(StepStatus::Applied), 1);
        assert_eq!(r.count(StepStatus::NotRun), 2);
        assert_eq!(r.status_of("step2"), Some(StepStatus::Failed));
        assert_eq!(r.status_of("missing"), None);
        assert!(!r.success);
    }

    #[test]
    fn test_report_serializes_snake_case() {
        let r = report(&[StepStatus::AlreadyPresent]);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["steps"][0]["status"], "already_present");
    }
}
