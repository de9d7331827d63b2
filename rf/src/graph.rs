//! Dependency graph over tasks
//!
//! Builds a DAG from the declared `depends-on` edges and derives a
//! deterministic topological order. Ties at the same depth break by
//! (priority ascending, id lexicographic), so two runs over the same task
//! list always agree on the order. The graph is read-only after
//! construction.

use std::collections::{BTreeSet, HashMap, VecDeque};

use thiserror::Error;

use crate::domain::Task;

/// Errors raised during graph construction
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate task id \"{0}\"")]
    DuplicateId(String),

    #[error("task \"{task}\" depends on unknown task \"{dep}\"")]
    UnknownDependency { task: String, dep: String },

    #[error("dependency cycle detected: processed {processed} of {total} tasks")]
    CycleDetected { processed: usize, total: usize },
}

/// DAG of tasks with a precomputed topological order
#[derive(Debug, Default)]
pub struct TaskGraph {
    nodes: HashMap<String, Task>,
    parents: HashMap<String, BTreeSet<String>>,
    children: HashMap<String, Vec<String>>,
    order: Vec<String>,
}

impl TaskGraph {
    /// Build the graph and verify it is acyclic
    ///
    /// Runs Kahn's algorithm with a queue kept sorted by (priority, id);
    /// the queue is re-sorted after each batch of newly unblocked children
    /// so the emitted order is deterministic.
    pub fn build(tasks: &[Task]) -> Result<Self, GraphError> {
        let mut nodes: HashMap<String, Task> = HashMap::with_capacity(tasks.len());
        for task in tasks {
            if nodes.insert(task.id.clone(), task.clone()).is_some() {
                return Err(GraphError::DuplicateId(task.id.clone()));
            }
        }

        let mut parents: HashMap<String, BTreeSet<String>> = HashMap::with_capacity(tasks.len());
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for task in tasks {
            for dep in &task.depends_on {
                if !nodes.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        task: task.id.clone(),
                        dep: dep.clone(),
                    });
                }
                children.entry(dep.clone()).or_default().push(task.id.clone());
            }
            parents.insert(task.id.clone(), task.depends_on.clone());
        }

        let mut in_degree: HashMap<&str, usize> = parents
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        let mut queue: Vec<String> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| id.to_string())
            .collect();
        sort_by_priority(&mut queue, &nodes);

        let mut order = Vec::with_capacity(tasks.len());
        while !queue.is_empty() {
            let id = queue.remove(0);
            let mut unblocked = Vec::new();
            for child in children.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
                if let Some(deg) = in_degree.get_mut(child.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        unblocked.push(child.clone());
                    }
                }
            }
            order.push(id);
            if !unblocked.is_empty() {
                queue.extend(unblocked);
                sort_by_priority(&mut queue, &nodes);
            }
        }

        if order.len() != nodes.len() {
            return Err(GraphError::CycleDetected {
                processed: order.len(),
                total: nodes.len(),
            });
        }

        Ok(Self {
            nodes,
            parents,
            children,
            order,
        })
    }

    /// Topological order of all task ids
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Ids with no parents, in deterministic order
    pub fn roots(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| self.parents.get(*id).is_none_or(BTreeSet::is_empty))
            .cloned()
            .collect()
    }

    /// Direct children of a node
    pub fn children(&self, id: &str) -> &[String] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct parents of a node
    pub fn parents(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.parents.get(id)
    }

    /// Transitive closure of everything downstream of a node
    pub fn dependents(&self, id: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut frontier: VecDeque<&str> = self.children(id).iter().map(String::as_str).collect();
        while let Some(next) = frontier.pop_front() {
            if seen.insert(next.to_string()) {
                frontier.extend(self.children(next).iter().map(String::as_str));
            }
        }
        seen
    }

    /// Look up a task by id
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.nodes.get(id)
    }

    /// Number of tasks in the graph
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the graph holds no tasks
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Sort ids by (priority, id), the graph's tie-break order
fn sort_by_priority(ids: &mut [String], nodes: &HashMap<String, Task>) {
    ids.sort_by(|a, b| {
        let pa = nodes.get(a).map(|t| t.priority).unwrap_or_default();
        let pb = nodes.get(b).map(|t| t.priority).unwrap_or_default();
        (pa, a).cmp(&(pb, b))
    });
}
