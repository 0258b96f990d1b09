//! Cron validation and the scheduled-DAG listing for the planner's optional
//! `cronSchedule` (§4.1, §6). A DAG with a schedule is just a `Dag` row with
//! `cron_schedule` set; this module only validates the expression up front
//! (rejected before any LLM call) and derives a human-readable form.

use cron::Schedule;
use dagflow_kernel::model::Dag;
use dagflow_kernel::{DagFlowError, DagFlowResult};
use std::str::FromStr;

/// Validate a 5- or 6-field cron string. The `cron` crate requires a
/// leading seconds field, so a bare 5-field expression is given `0 ` in
/// front before parsing.
pub fn validate_cron(expr: &str) -> DagFlowResult<Schedule> {
    let fields = expr.split_whitespace().count();
    let normalized = if fields == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&normalized)
        .map_err(|e| DagFlowError::configuration(format!("invalid cron schedule '{expr}': {e}")))
}

/// A human-readable rendering good enough for CLI/API display. Not a full
/// natural-language cron describer — just a readable echo of the fields.
pub fn human_readable_cron(expr: &str) -> String {
    format!("runs on schedule `{expr}`")
}

#[derive(Debug, Clone)]
pub struct ScheduledDagSummary {
    pub id: String,
    pub title: Option<String>,
    pub cron: String,
    pub human_readable_cron: String,
    pub active: bool,
}

pub fn summarize_scheduled(dags: &[Dag]) -> Vec<ScheduledDagSummary> {
    dags.iter()
        .filter_map(|d| {
            let cron = d.cron_schedule.clone()?;
            Some(ScheduledDagSummary {
                id: d.id.clone(),
                title: d.dag_title.clone(),
                human_readable_cron: human_readable_cron(&cron),
                cron,
                active: d.schedule_active.unwrap_or(false),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_cron() {
        assert!(validate_cron("not a cron").is_err());
    }

    #[test]
    fn accepts_five_and_six_field_cron() {
        assert!(validate_cron("0 9 * * MON-FRI").is_ok());
        assert!(validate_cron("0 0 9 * * MON-FRI").is_ok());
    }
}
