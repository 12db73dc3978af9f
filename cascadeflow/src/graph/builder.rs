//! Workflow builder with construction-time validation.

use super::executor::{Edges, Workflow};
use super::Node;
use crate::errors::{ContractErrorInfo, ContractSuggestions, CycleDetectedError, PipelineValidationError};
use crate::events::{EventSink, NoOpEventSink};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Builder for workflow graphs.
///
/// Nodes may be added in any order. Edges are checked only in `build`.
#[derive(Debug)]
pub struct GraphBuilder {
    name: String,
    nodes: Vec<Arc<dyn Node>>,
    edges: Vec<(String, String)>,
    branches: Vec<(String, String, String)>,
    entry: Option<String>,
    finish: Vec<String>,
    event_sink: Arc<dyn EventSink>,
}

impl GraphBuilder {
    /// Creates a new workflow builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            branches: Vec::new(),
            entry: None,
            finish: Vec::new(),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Returns the workflow name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a node.
    #[must_use]
    pub fn node(self, node: impl Node + 'static) -> Self {
        self.add_node(Arc::new(node))
    }

    /// Adds a shared node.
    #[must_use]
    pub fn add_node(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds the fixed edge followed on [`crate::core::Route::Next`].
    #[must_use]
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Adds an edge followed when `from` routes to `label`.
    #[must_use]
    pub fn add_branch(
        mut self,
        from: impl Into<String>,
        label: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.branches.push((from.into(), label.into(), to.into()));
        self
    }

    /// Sets the first node.
    #[must_use]
    pub fn set_entry(mut self, node: impl Into<String>) -> Self {
        self.entry = Some(node.into());
        self
    }

    /// Marks a node as ending the workflow.
    #[must_use]
    pub fn set_finish(mut self, node: impl Into<String>) -> Self {
        self.finish.push(node.into());
        self
    }

    /// Sets the sink receiving lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Validates the workflow and builds it.
    ///
    /// # Errors
    ///
    /// Returns `PipelineValidationError` for an empty graph, duplicate or
    /// unknown nodes, a missing entry, conflicting edges, a cycle, or a path
    /// that never reaches a finish node.
    pub fn build(self) -> Result<Workflow, PipelineValidationError> {
        if self.nodes.is_empty() {
            return Err(contract_error(
                "CONTRACT-004-EMPTY",
                format!("Workflow '{}' has no nodes", self.name),
                Vec::new(),
            ));
        }

        let mut nodes: HashMap<String, Arc<dyn Node>> = HashMap::new();
        for node in &self.nodes {
            if nodes.insert(node.name().to_string(), node.clone()).is_some() {
                return Err(contract_error(
                    "CONTRACT-002-DUPLICATE",
                    format!("Node '{}' appears more than once", node.name()),
                    vec![node.name().to_string()],
                ));
            }
        }

        let entry = match &self.entry {
            Some(entry) if nodes.contains_key(entry) => entry.clone(),
            Some(entry) => {
                return Err(contract_error(
                    "CONTRACT-005-ENTRY",
                    format!("Entry node '{entry}' was never added"),
                    vec![entry.clone()],
                ))
            }
            None => {
                return Err(contract_error(
                    "CONTRACT-005-ENTRY",
                    format!("Workflow '{}' has no entry node", self.name),
                    Vec::new(),
                ))
            }
        };

        self.check_known(&nodes)?;
        let routes = self.routes()?;

        let successors: HashMap<&str, Vec<&str>> = routes
            .iter()
            .map(|(from, edges)| (from.as_str(), edges.targets()))
            .collect();

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();
        if let Some(cycle) = dfs_cycle(&entry, &successors, &mut visited, &mut rec_stack, &mut path) {
            return Err(CycleDetectedError::new(cycle).into());
        }

        // `visited` now holds every node reachable from the entry.
        let mut dead_ends: Vec<String> = visited
            .iter()
            .filter(|name| !routes.contains_key(*name))
            .cloned()
            .collect();
        if !dead_ends.is_empty() {
            dead_ends.sort();
            return Err(contract_error(
                "CONTRACT-007-UNREACHABLE",
                format!(
                    "Node(s) {} have no outgoing edge and are not finish nodes",
                    dead_ends.join(", ")
                ),
                dead_ends,
            ));
        }

        let unused: Vec<&str> = nodes
            .keys()
            .filter(|name| !visited.contains(*name))
            .map(String::as_str)
            .collect();
        if !unused.is_empty() {
            tracing::warn!(workflow = %self.name, nodes = ?unused, "Nodes are not reachable from the entry");
        }

        tracing::debug!(workflow = %self.name, nodes = nodes.len(), entry = %entry, "Built workflow");
        Ok(Workflow::new(self.name, nodes, routes, entry, self.event_sink))
    }

    fn check_known(&self, nodes: &HashMap<String, Arc<dyn Node>>) -> Result<(), PipelineValidationError> {
        let referenced = self
            .edges
            .iter()
            .flat_map(|(from, to)| [from, to])
            .chain(self.branches.iter().flat_map(|(from, _, to)| [from, to]))
            .chain(self.finish.iter());

        for name in referenced {
            if !nodes.contains_key(name) {
                return Err(contract_error(
                    "CONTRACT-003-UNKNOWN_NODE",
                    format!("Edge references unknown node '{name}'"),
                    vec![name.clone()],
                ));
            }
        }
        Ok(())
    }

    fn routes(&self) -> Result<HashMap<String, Edges>, PipelineValidationError> {
        let conflict = |from: &str, detail: &str| {
            contract_error(
                "CONTRACT-006-CONFLICT",
                format!("Node '{from}' {detail}"),
                vec![from.to_string()],
            )
        };

        let mut routes: HashMap<String, Edges> = HashMap::new();
        for name in &self.finish {
            routes.insert(name.clone(), Edges::Finish);
        }

        for (from, to) in &self.edges {
            match routes.entry(from.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(Edges::Fixed(to.clone()));
                }
                Entry::Occupied(slot) => {
                    let detail = match slot.get() {
                        Edges::Finish => "is a finish node but has an outgoing edge",
                        Edges::Fixed(_) => "has more than one fixed edge",
                        Edges::Branches(_) => "has both a fixed edge and branches",
                    };
                    return Err(conflict(from, detail));
                }
            }
        }

        for (from, label, to) in &self.branches {
            let edges = routes
                .entry(from.clone())
                .or_insert_with(|| Edges::Branches(BTreeMap::new()));
            match edges {
                Edges::Branches(labels) => {
                    if labels.insert(label.clone(), to.clone()).is_some() {
                        return Err(conflict(from, &format!("has two branches labelled '{label}'")));
                    }
                }
                Edges::Finish => return Err(conflict(from, "is a finish node but has an outgoing branch")),
                Edges::Fixed(_) => return Err(conflict(from, "has both a fixed edge and branches")),
            }
        }

        Ok(routes)
    }
}

fn dfs_cycle(
    node: &str,
    successors: &HashMap<&str, Vec<&str>>,
    visited: &mut HashSet<String>,
    rec_stack: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    visited.insert(node.to_string());
    rec_stack.insert(node.to_string());
    path.push(node.to_string());

    for &next in successors.get(node).map(Vec::as_slice).unwrap_or_default() {
        if !visited.contains(next) {
            if let Some(cycle) = dfs_cycle(next, successors, visited, rec_stack, path) {
                return Some(cycle);
            }
        } else if rec_stack.contains(next) {
            let start = path.iter().position(|n| n == next).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(next.to_string());
            return Some(cycle);
        }
    }

    path.pop();
    rec_stack.remove(node);
    None
}

fn contract_error(code: &str, summary: String, nodes: Vec<String>) -> PipelineValidationError {
    let mut info = ContractErrorInfo::new(code, summary.clone());
    if let Some(hint) = ContractSuggestions::get(code) {
        info = info.with_fix_hint(hint);
    }
    if let Some(node) = nodes.first() {
        info = info.with_context_entry("node", node.clone());
    }
    PipelineValidationError::new(summary)
        .with_stages(nodes)
        .with_error_info(info)
}
