//! Stage DAG planning: wave partitioning and condition evaluation,
//! building up a `Vec<Wave>` via an incremental builder.

use automatosx_types::checkpoint::{StageRecord, StageStatus};
use automatosx_types::{Error, Stage};
use std::collections::{HashMap, HashSet};

/// One layer of the DAG: stages whose dependencies are all satisfied
/// by prior waves, split into the concurrently runnable set and the
/// set that must run serially in declaration order.
#[derive(Debug, Clone)]
pub struct Wave {
    pub parallel: Vec<usize>,
    pub serial: Vec<usize>,
}

/// Builds the wave plan for `stages`, failing `StageDependencyCycle`
/// if the dependency graph has a cycle or references an unknown stage
/// name.
pub fn plan_waves(stages: &[Stage]) -> automatosx_types::Result<Vec<Wave>> {
    let index_of: HashMap<&str, usize> = stages.iter().enumerate().map(|(i, s)| (s.name.as_str(), i)).collect();

    for stage in stages {
        for dep in &stage.dependencies {
            if !index_of.contains_key(dep.as_str()) {
                return Err(Error::stage_dependency_cycle(&stage.name)
                    .add_context("missingDependency", dep.as_str()));
            }
        }
    }

    let mut placed: HashSet<usize> = HashSet::new();
    let mut waves = Vec::new();

    while placed.len() < stages.len() {
        let ready: Vec<usize> = stages
            .iter()
            .enumerate()
            .filter(|(i, stage)| {
                !placed.contains(i)
                    && stage
                        .dependencies
                        .iter()
                        .all(|dep| placed.contains(&index_of[dep.as_str()]))
            })
            .map(|(i, _)| i)
            .collect();

        if ready.is_empty() {
            let stuck = stages
                .iter()
                .enumerate()
                .find(|(i, _)| !placed.contains(i))
                .map(|(_, s)| s.name.clone())
                .unwrap_or_default();
            return Err(Error::stage_dependency_cycle(&stuck));
        }

        let mut parallel = Vec::new();
        let mut serial = Vec::new();
        for idx in ready {
            if stages[idx].parallel {
                parallel.push(idx);
            } else {
                serial.push(idx);
            }
            placed.insert(idx);
        }
        waves.push(Wave { parallel, serial });
    }

    Ok(waves)
}

/// Evaluates a stage's `condition` against prior stage records. The
/// grammar is `"<stageName>.success"` / `"<stageName>.failure"`; an
/// absent condition is always true. An unparsable condition or a
/// reference to a stage with no record yet is treated as false, since
/// the dependency can't have run.
pub fn evaluate_condition(condition: Option<&str>, records: &[StageRecord]) -> bool {
    let Some(condition) = condition else {
        return true;
    };
    let Some((stage_name, predicate)) = condition.rsplit_once('.') else {
        return false;
    };
    let Some(record) = records.iter().find(|r| r.name == stage_name) else {
        return false;
    };
    match predicate {
        "success" => record.status == StageStatus::Completed,
        "failure" => record.status == StageStatus::Failed,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automatosx_types::Stage;

    fn stage(name: &str, deps: &[&str], parallel: bool) -> Stage {
        Stage {
            name: name.to_string(),
            description: String::new(),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            parallel,
            condition: None,
            timeout: None,
            max_retries: None,
            retry_delay: None,
            provider: None,
            model: None,
        }
    }

    #[test]
    fn linear_chain_produces_one_stage_per_wave() {
        let stages = vec![stage("plan", &[], false), stage("impl", &["plan"], false), stage("test", &["impl"], false)];
        let waves = plan_waves(&stages).unwrap();
        assert_eq!(waves.len(), 3);
    }

    #[test]
    fn independent_parallel_stages_share_a_wave() {
        let stages = vec![
            stage("plan", &[], false),
            stage("frontend", &["plan"], true),
            stage("backend", &["plan"], true),
        ];
        let waves = plan_waves(&stages).unwrap();
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[1].parallel.len(), 2);
    }

    #[test]
    fn cycle_is_rejected() {
        let stages = vec![stage("a", &["b"], false), stage("b", &["a"], false)];
        let err = plan_waves(&stages).unwrap_err();
        assert_eq!(err.kind(), automatosx_types::ErrorKind::StageDependencyCycle);
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let stages = vec![stage("a", &["ghost"], false)];
        let err = plan_waves(&stages).unwrap_err();
        assert_eq!(err.kind(), automatosx_types::ErrorKind::StageDependencyCycle);
    }

    #[test]
    fn condition_checks_referenced_stage_status() {
        let records = vec![StageRecord {
            status: StageStatus::Completed,
            ..StageRecord::pending("impl")
        }];
        assert!(evaluate_condition(Some("impl.success"), &records));
        assert!(!evaluate_condition(Some("impl.failure"), &records));
        assert!(evaluate_condition(None, &records));
    }
}
