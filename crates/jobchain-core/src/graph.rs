use crate::errors::ChainError;
use crate::model::JobNode;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Orders jobs so that every job follows all of its predecessors (Kahn's
/// algorithm). Roots are visited in id order.
pub fn topological_order(jobs: &BTreeMap<String, JobNode>) -> Result<Vec<String>, ChainError> {
    let mut in_degree: HashMap<&str, usize> = jobs
        .iter()
        .map(|(id, job)| (id.as_str(), job.predecessors.len()))
        .collect();

    let mut queue: VecDeque<&str> = jobs
        .iter()
        .filter_map(|(id, job)| job.predecessors.is_empty().then_some(id.as_str()))
        .collect();
    let mut order = Vec::with_capacity(jobs.len());

    while let Some(job_id) = queue.pop_front() {
        order.push(job_id.to_string());
        let job = jobs
            .get(job_id)
            .ok_or_else(|| ChainError::UnknownJob(job_id.to_string()))?;

        for successor in &job.successors {
            let degree = in_degree
                .get_mut(successor.as_str())
                .ok_or_else(|| ChainError::UnknownJob(successor.clone()))?;
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(successor.as_str());
            }
        }
    }

    if order.len() != jobs.len() {
        return Err(ChainError::CycleDetected);
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStatus;
    use bytes::Bytes;

    fn build_jobs(defs: Vec<(&str, Vec<&str>)>) -> BTreeMap<String, JobNode> {
        let mut jobs = BTreeMap::new();
        for (id, deps) in &defs {
            jobs.insert(
                (*id).to_string(),
                JobNode {
                    id: (*id).to_string(),
                    job_type: "noop".to_string(),
                    name: (*id).to_string(),
                    state: Bytes::new(),
                    predecessors: deps.iter().map(|d| (*d).to_string()).collect(),
                    successors: Vec::new(),
                    status: JobStatus::Pending,
                    started_at: None,
                    finished_at: None,
                    last_error: None,
                },
            );
        }

        for (id, deps) in &defs {
            for dep in deps {
                jobs.get_mut(*dep)
                    .expect("dependency exists")
                    .successors
                    .push((*id).to_string());
            }
        }

        jobs
    }

    #[test]
    fn orders_linear_chain() {
        let jobs = build_jobs(vec![("c", vec!["b"]), ("b", vec!["a"]), ("a", vec![])]);
        assert_eq!(topological_order(&jobs).expect("order"), ["a", "b", "c"]);
    }

    #[test]
    fn orders_wide_fan_out_and_join() {
        let jobs = build_jobs(vec![
            ("root", vec![]),
            ("x", vec!["root"]),
            ("y", vec!["root"]),
            ("z", vec!["root"]),
            ("join", vec!["x", "y", "z"]),
        ]);
        let order = topological_order(&jobs).expect("order");
        assert_eq!(order.first().map(String::as_str), Some("root"));
        assert_eq!(order.last().map(String::as_str), Some("join"));
        assert_eq!(order.len(), 5);
    }

    #[test]
    fn independent_roots_are_ordered_by_id() {
        let jobs = build_jobs(vec![("b", vec![]), ("a", vec![]), ("c", vec!["a"])]);
        assert_eq!(topological_order(&jobs).expect("order"), ["a", "b", "c"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let jobs = build_jobs(vec![("a", vec!["c"]), ("b", vec!["a"]), ("c", vec!["b"])]);
        assert_eq!(topological_order(&jobs), Err(ChainError::CycleDetected));
    }
}
