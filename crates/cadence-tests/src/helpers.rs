//! Test helper functions and utilities.

use cadence_core::ids::{JobId, StageId};
use cadence_core::job::JobResult;
use cadence_core::run::Stage;
use chrono::{DateTime, Utc};

/// Complete every job that is still active.
pub fn complete_all(stage: &mut Stage, result: JobResult, at: DateTime<Utc>) {
    for job in stage.jobs.iter_mut().filter(|j| j.is_active()) {
        job.complete(result, at).expect("active job can complete");
    }
}

/// Complete the named job with `result`.
pub fn complete_job(stage: &mut Stage, name: &str, result: JobResult, at: DateTime<Utc>) {
    stage
        .jobs
        .by_name_mut(name)
        .unwrap_or_else(|| panic!("no job named {name}"))
        .complete(result, at)
        .expect("job can complete");
}

/// Hand out ids from `next_id` the way the database would on save.
/// Transitions are renumbered wholesale when any of them is unsaved.
pub fn persist(stage: &mut Stage, next_id: &mut i64) {
    if !stage.id.is_persisted() {
        stage.id = StageId::new(*next_id);
        *next_id += 1;
    }
    for job in stage.jobs.iter_mut() {
        if !job.id().is_persisted() {
            job.set_id(JobId::new(*next_id));
            *next_id += 1;
        }
        if job.transitions().iter().any(|t| !t.id.is_persisted()) {
            job.transitions_mut().assign_ids(*next_id);
            *next_id += job.transitions().len() as i64;
        }
    }
}

pub fn job_names(stage: &Stage) -> Vec<String> {
    stage.jobs.iter().map(|j| j.name().to_string()).collect()
}
