use anyhow::{Result, bail};
use revo_core::AppError;
use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::task::Task;

/// Dependency graph over a workflow's tasks, indexed by position.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    /// dependency -> dependents
    edges: Vec<Vec<usize>>,
    /// dependent -> dependencies
    incoming: Vec<Vec<usize>>,
}

impl TaskGraph {
    /// Build and validate: duplicate ids, unknown dependencies and cycles are
    /// all rejected.
    pub fn build(tasks: &[Task]) -> Result<Self> {
        let mut index = HashMap::with_capacity(tasks.len());
        for (position, task) in tasks.iter().enumerate() {
            if index.insert(task.id.clone(), position).is_some() {
                bail!("duplicate task id '{}' in workflow", task.id);
            }
        }

        let mut edge_set: BTreeSet<(usize, usize)> = BTreeSet::new();
        for (to, task) in tasks.iter().enumerate() {
            for dependency in &task.dependencies {
                let from = *index.get(dependency).ok_or_else(|| AppError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dependency.clone(),
                })?;
                edge_set.insert((from, to));
            }
        }

        let mut edges = vec![Vec::new(); tasks.len()];
        let mut incoming = vec![Vec::new(); tasks.len()];
        for (from, to) in edge_set {
            edges[from].push(to);
            incoming[to].push(from);
        }

        let graph = Self {
            ids: tasks.iter().map(|task| task.id.clone()).collect(),
            index,
            edges,
            incoming,
        };
        graph.topological_order()?;
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(Vec::len).sum()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn id(&self, position: usize) -> &str {
        &self.ids[position]
    }

    pub fn dependents(&self, position: usize) -> &[usize] {
        &self.edges[position]
    }

    pub fn dependencies(&self, position: usize) -> &[usize] {
        &self.incoming[position]
    }

    /// Every task reachable downstream of `position`, excluding itself.
    pub fn transitive_dependents(&self, position: usize) -> Vec<usize> {
        let mut seen = vec![false; self.ids.len()];
        let mut queue: VecDeque<usize> = self.edges[position].iter().copied().collect();
        let mut out = Vec::new();
        while let Some(next) = queue.pop_front() {
            if seen[next] {
                continue;
            }
            seen[next] = true;
            out.push(next);
            queue.extend(self.edges[next].iter().copied());
        }
        out
    }

    /// Kahn's algorithm. Errors with the ids still carrying in-degree when a
    /// cycle exists.
    pub fn topological_order(&self) -> Result<Vec<usize>> {
        let mut indegree: Vec<usize> = self.incoming.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = indegree
            .iter()
            .enumerate()
            .filter_map(|(index, degree)| (*degree == 0).then_some(index))
            .collect();
        let mut order = Vec::with_capacity(self.ids.len());

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &next in &self.edges[node] {
                indegree[next] = indegree[next].saturating_sub(1);
                if indegree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() == self.ids.len() {
            return Ok(order);
        }

        let cycle: Vec<String> = indegree
            .iter()
            .enumerate()
            .filter_map(|(index, degree)| (*degree > 0).then(|| self.ids[index].clone()))
            .collect();
        Err(AppError::DependencyCycle(cycle).into())
    }

    pub fn to_mermaid(&self, labels: &[String]) -> String {
        let mut output = String::from("graph TD\n");

        for (index, id) in self.ids.iter().enumerate() {
            let label = labels.get(index).map(String::as_str).unwrap_or(id);
            output.push_str(&format!("  N{index}[\"{}\"]\n", escape_mermaid_label(label)));
        }

        for (from, children) in self.edges.iter().enumerate() {
            for to in children {
                output.push_str(&format!("  N{from} --> N{to}\n"));
            }
        }

        output
    }
}

fn escape_mermaid_label(label: &str) -> String {
    label.replace('"', "#quot;")
}
