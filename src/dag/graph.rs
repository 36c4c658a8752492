// src/dag/graph.rs

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::job::{Job, JobSpec, RunSummary};
use crate::errors::{OrchestratorError, Result};
use crate::types::{JobId, JobStatus};

/// Directed acyclic graph of jobs.
///
/// Jobs keep the order they were passed to [`JobGraph::build`]; that order
/// breaks ties everywhere the scheduler has a choice. Edges point from a
/// dependency to its dependent.
#[derive(Debug, Clone)]
pub struct JobGraph {
    jobs: Vec<Job>,
    index: HashMap<JobId, usize>,
    deps: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    topo: Vec<usize>,
}

impl JobGraph {
    /// Build and validate a graph.
    ///
    /// Fails with `DuplicateJob`, `UnknownDependency`, or `CycleDetected`
    /// naming the jobs along one offending cycle.
    pub fn build(specs: impl IntoIterator<Item = JobSpec>) -> Result<Self> {
        let mut jobs = Vec::new();
        let mut index = HashMap::new();

        for spec in specs {
            if index.contains_key(&spec.id) {
                return Err(OrchestratorError::DuplicateJob(spec.id));
            }
            index.insert(spec.id.clone(), jobs.len());
            jobs.push(Job::new(spec));
        }

        let mut deps = vec![Vec::new(); jobs.len()];
        let mut dependents = vec![Vec::new(); jobs.len()];
        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();

        for i in 0..jobs.len() {
            graph.add_node(i);
        }

        for (i, job) in jobs.iter().enumerate() {
            for dep in &job.spec.after {
                let d = *index
                    .get(dep)
                    .ok_or_else(|| OrchestratorError::UnknownDependency {
                        job: job.spec.id.clone(),
                        dep: dep.clone(),
                    })?;
                if deps[i].contains(&d) {
                    continue;
                }
                deps[i].push(d);
                dependents[d].push(i);
                graph.add_edge(d, i, ());
            }
        }

        let topo = match toposort(&graph, None) {
            Ok(order) => order,
            Err(_) => {
                let path = find_cycle(&graph)
                    .into_iter()
                    .map(|i| jobs[i].spec.id.clone())
                    .collect();
                return Err(OrchestratorError::CycleDetected(path));
            }
        };

        debug!(jobs = jobs.len(), "job graph built");

        Ok(Self {
            jobs,
            index,
            deps,
            dependents,
            topo,
        })
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs in insertion order.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.index.get(id).map(|&i| &self.jobs[i])
    }

    pub fn status(&self, id: &str) -> Option<JobStatus> {
        self.get(id).map(|j| j.status)
    }

    /// Insertion position of a job; used for deterministic ordering.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Immediate dependencies of a job.
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.index
            .get(id)
            .map(|&i| self.deps[i].iter().map(|&d| self.jobs[d].id()).collect())
            .unwrap_or_default()
    }

    /// Every job downstream of `id`, in insertion order.
    pub fn transitive_dependents(&self, id: &str) -> Vec<JobId> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };

        let mut seen: HashSet<usize> = HashSet::new();
        let mut queue: VecDeque<usize> = self.dependents[start].iter().copied().collect();

        while let Some(i) = queue.pop_front() {
            if seen.insert(i) {
                queue.extend(self.dependents[i].iter().copied());
            }
        }

        let mut out: Vec<usize> = seen.into_iter().collect();
        out.sort_unstable();
        out.into_iter().map(|i| self.jobs[i].spec.id.clone()).collect()
    }

    /// Job ids in a dependency-respecting order.
    pub fn topological_order(&self) -> Vec<&str> {
        self.topo.iter().map(|&i| self.jobs[i].id()).collect()
    }

    /// `Pending` jobs whose dependencies have all succeeded, in insertion
    /// order.
    pub fn ready_set(&self) -> Vec<JobId> {
        self.jobs
            .iter()
            .enumerate()
            .filter(|(i, job)| {
                job.status == JobStatus::Pending
                    && self.deps[*i]
                        .iter()
                        .all(|&d| self.jobs[d].status == JobStatus::Succeeded)
            })
            .map(|(_, job)| job.spec.id.clone())
            .collect()
    }

    /// Apply a forward status transition; returns the previous status.
    ///
    /// Rejects anything outside [`JobStatus::can_transition_to`], including
    /// the retry edge `Failed -> Pending` (use [`JobGraph::retry`]).
    pub fn mark_status(&mut self, id: &str, to: JobStatus) -> Result<JobStatus> {
        let job = self.job_mut(id)?;
        let from = job.status;
        if !from.can_transition_to(to) {
            return Err(OrchestratorError::InvalidTransition {
                job: id.to_string(),
                from,
                to,
            });
        }
        job.status = to;
        Ok(from)
    }

    /// Explicit retry: `Failed -> Pending`, consuming one retry.
    ///
    /// Returns the new retry count.
    pub fn retry(&mut self, id: &str) -> Result<u32> {
        let job = self.back_to_pending(id)?;
        job.retry_count += 1;
        Ok(job.retry_count)
    }

    /// `Failed -> Pending` without consuming a retry; used when an attempt was
    /// lost together with its worker.
    pub fn requeue(&mut self, id: &str) -> Result<()> {
        self.back_to_pending(id)?;
        Ok(())
    }

    /// Every job is terminal.
    pub fn is_complete(&self) -> bool {
        self.jobs.iter().all(|j| j.status.is_terminal())
    }

    /// Complete, and no job ended `Failed`.
    pub fn is_successful(&self) -> bool {
        self.is_complete() && self.jobs.iter().all(|j| j.status != JobStatus::Failed)
    }

    pub fn summary(&self) -> RunSummary {
        let count = |s: JobStatus| self.jobs.iter().filter(|j| j.status == s).count();
        RunSummary {
            total: self.jobs.len(),
            succeeded: count(JobStatus::Succeeded),
            failed: count(JobStatus::Failed),
            cancelled: count(JobStatus::Cancelled),
            complete: self.is_complete(),
            successful: self.is_successful(),
        }
    }

    fn job_mut(&mut self, id: &str) -> Result<&mut Job> {
        let i = *self
            .index
            .get(id)
            .ok_or_else(|| OrchestratorError::UnknownJob(id.to_string()))?;
        Ok(&mut self.jobs[i])
    }

    fn back_to_pending(&mut self, id: &str) -> Result<&mut Job> {
        let job = self.job_mut(id)?;
        if job.status != JobStatus::Failed {
            return Err(OrchestratorError::InvalidTransition {
                job: id.to_string(),
                from: job.status,
                to: JobStatus::Pending,
            });
        }
        job.status = JobStatus::Pending;
        Ok(job)
    }
}

/// Find one cycle in `graph`, as a node path whose first node is repeated at
/// the end. Empty if the graph is acyclic.
fn find_cycle(graph: &DiGraphMap<usize, ()>) -> Vec<usize> {
    let mut sccs = tarjan_scc(graph);
    for scc in sccs.iter_mut() {
        scc.sort_unstable();
    }
    sccs.sort_by_key(|scc| scc[0]);

    for scc in sccs {
        let start = scc[0];
        if scc.len() == 1 {
            if graph.contains_edge(start, start) {
                return vec![start, start];
            }
            continue;
        }

        let members: HashSet<usize> = scc.iter().copied().collect();
        let mut path = vec![start];
        let mut visited = HashSet::from([start]);
        if walk_back_to(graph, start, start, &members, &mut visited, &mut path) {
            return path;
        }
    }

    Vec::new()
}

fn walk_back_to(
    graph: &DiGraphMap<usize, ()>,
    node: usize,
    target: usize,
    members: &HashSet<usize>,
    visited: &mut HashSet<usize>,
    path: &mut Vec<usize>,
) -> bool {
    let mut next: Vec<usize> = graph.neighbors(node).collect();
    next.sort_unstable();

    for n in next {
        if n == target {
            path.push(target);
            return true;
        }
        if members.contains(&n) && visited.insert(n) {
            path.push(n);
            if walk_back_to(graph, n, target, members, visited, path) {
                return true;
            }
            path.pop();
        }
    }
    false
}
