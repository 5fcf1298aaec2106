//! Workflow DAG data model: nodes, edges, and Kahn's-algorithm validation.
//!
//! Grounded on `orchestration.rs`'s `RalphTask`/layering concepts in the
//! teacher crate, generalized from a flat PRD task list into the typed node
//! graph spec.md §3 describes. Kahn's algorithm is used both to verify the
//! acyclic invariant and to compute the parallel-execution layering used by
//! [`crate::workflow_agent::WorkflowAgent`] (spec §4.8) and the
//! dependency-aware planner (spec §4.7).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

/// The ten node types a [`WorkflowPlan`] may contain (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Http,
    Llm,
    Python,
    Database,
    Condition,
    Loop,
    Parallel,
    Container,
    Start,
    End,
}

impl NodeType {
    /// Config keys required for this node type (spec §3 invariant: "required
    /// config fields present per node type"). Kept intentionally small and
    /// explicit rather than data-driven, mirroring how `tool_protocol.rs`'s
    /// `ToolParameter` enumerates required fields per tool rather than
    /// inferring them.
    pub fn required_config_fields(self) -> &'static [&'static str] {
        match self {
            NodeType::Http => &["url", "method"],
            NodeType::Llm => &["prompt"],
            NodeType::Python => &["code"],
            NodeType::Database => &["query"],
            NodeType::Condition => &["expression"],
            NodeType::Loop => &["collection"],
            NodeType::Parallel => &[],
            NodeType::Container => &["children"],
            NodeType::Start | NodeType::End => &[],
        }
    }
}

impl std::str::FromStr for NodeType {
    type Err = ();

    /// Parse the lowercase `node_type` strings `create_node` decisions
    /// carry on the wire (spec §4.2) into a [`NodeType`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(NodeType::Http),
            "llm" => Ok(NodeType::Llm),
            "python" => Ok(NodeType::Python),
            "database" => Ok(NodeType::Database),
            "condition" => Ok(NodeType::Condition),
            "loop" => Ok(NodeType::Loop),
            "parallel" => Ok(NodeType::Parallel),
            "container" => Ok(NodeType::Container),
            "start" => Ok(NodeType::Start),
            "end" => Ok(NodeType::End),
            _ => Err(()),
        }
    }
}

/// A single node in a [`WorkflowPlan`] (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    pub node_type: NodeType,
    pub config: serde_json::Value,
    /// `${node_X.output.field}`-style references resolved before execution.
    pub input_mapping: Option<HashMap<String, String>>,
    /// Only meaningful for `NodeType::Container` (spec §4.8).
    pub children: Option<Vec<Node>>,
    /// Only meaningful for `NodeType::Container`: whether children execute
    /// in parallel (bounded by `max_parallel`) or sequentially.
    pub parallel: bool,
    /// UI hint only; carries no execution semantics.
    pub collapsed: bool,
}

impl Node {
    pub fn new(node_id: impl Into<String>, node_type: NodeType, config: serde_json::Value) -> Self {
        Self {
            node_id: node_id.into(),
            node_type,
            config,
            input_mapping: None,
            children: None,
            parallel: false,
            collapsed: false,
        }
    }
}

/// A directed edge between two nodes, optionally gated by a condition
/// expression evaluated against the source node's output (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub condition: Option<String>,
}

/// Global settings carried by a plan (spec §4.7, §4.8): bounds on
/// parallel dispatch and the workflow-level timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub max_parallel: usize,
    pub timeout_secs: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            max_parallel: 3,
            timeout_secs: 300,
        }
    }
}

/// A DAG of nodes and edges (spec §3 `WorkflowPlan`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowPlan {
    pub workflow_id: String,
    pub name: String,
    pub description: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub global_config: GlobalConfig,
}

/// Errors raised while validating a [`WorkflowPlan`]'s structural invariants
/// (spec §3 invariants, §4.2 `create_workflow_plan` constraints).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DagError {
    #[error("workflow plan must contain at least one node (nodes>=1)")]
    Empty,
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),
    #[error("edge references unknown node: {0}")]
    DanglingEdge(String),
    #[error("graph is not a DAG: cycle detected among nodes {0:?}")]
    Cycle(Vec<String>),
    #[error("node {node_id} missing required config field(s): {fields:?}")]
    MissingConfigFields {
        node_id: String,
        fields: Vec<String>,
    },
    #[error("container nesting exceeds max depth {max_depth}")]
    NestingTooDeep { max_depth: usize },
}

impl WorkflowPlan {
    /// Flatten top-level nodes plus any container children into a single
    /// id→node lookup table. Container children are not edge-connected
    /// themselves; they execute within their container's own layering
    /// (spec §4.8), so this flattening is only used for id-uniqueness and
    /// config-field checks, not for the top-level Kahn pass.
    fn all_node_ids_recursive<'a>(nodes: &'a [Node], out: &mut Vec<&'a str>, depth: usize, max_depth: usize) -> Result<(), DagError> {
        if depth > max_depth {
            return Err(DagError::NestingTooDeep { max_depth });
        }
        for node in nodes {
            out.push(&node.node_id);
            if let Some(children) = &node.children {
                Self::all_node_ids_recursive(children, out, depth + 1, max_depth)?;
            }
        }
        Ok(())
    }

    /// Validate every invariant named in spec §3: unique node ids (including
    /// nested container children), every edge referencing an existing
    /// top-level node, the graph being acyclic (Kahn's algorithm), required
    /// config fields present per node type, and container nesting within
    /// `max_depth` (spec §4.8, default 5).
    pub fn validate(&self, max_container_depth: usize) -> Result<(), DagError> {
        if self.nodes.is_empty() {
            return Err(DagError::Empty);
        }

        let mut all_ids = Vec::new();
        Self::all_node_ids_recursive(&self.nodes, &mut all_ids, 0, max_container_depth)?;

        let mut seen = HashSet::new();
        for id in &all_ids {
            if !seen.insert(*id) {
                return Err(DagError::DuplicateNodeId((*id).to_string()));
            }
        }

        let top_level: HashMap<&str, &Node> =
            self.nodes.iter().map(|n| (n.node_id.as_str(), n)).collect();

        for edge in &self.edges {
            if !top_level.contains_key(edge.source.as_str()) {
                return Err(DagError::DanglingEdge(edge.source.clone()));
            }
            if !top_level.contains_key(edge.target.as_str()) {
                return Err(DagError::DanglingEdge(edge.target.clone()));
            }
        }

        self.kahn_layers()?;

        for node in &self.nodes {
            let required = node.node_type.required_config_fields();
            let missing: Vec<String> = required
                .iter()
                .filter(|field| node.config.get(field).is_none())
                .map(|f| f.to_string())
                .collect();
            if !missing.is_empty() {
                return Err(DagError::MissingConfigFields {
                    node_id: node.node_id.clone(),
                    fields: missing,
                });
            }
        }

        Ok(())
    }

    /// Kahn's-algorithm layering over the top-level nodes: each layer
    /// contains nodes whose predecessors are all in earlier layers (spec
    /// GLOSSARY "Kahn layering"). Returns `Err(DagError::Cycle)` naming the
    /// unvisited node ids when a cycle prevents full traversal (spec §3
    /// invariant, §9 scenario 3).
    pub fn kahn_layers(&self) -> Result<Vec<Vec<String>>, DagError> {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| (n.node_id.as_str(), 0usize))
            .collect();
        let mut adjacency: HashMap<&str, Vec<&str>> = self
            .nodes
            .iter()
            .map(|n| (n.node_id.as_str(), Vec::new()))
            .collect();

        for edge in &self.edges {
            *in_degree.get_mut(edge.target.as_str()).unwrap() += 1;
            adjacency
                .get_mut(edge.source.as_str())
                .unwrap()
                .push(edge.target.as_str());
        }

        let mut layers: Vec<Vec<String>> = Vec::new();
        let mut remaining = in_degree.clone();
        let mut visited_count = 0usize;

        loop {
            let ready: Vec<&str> = remaining
                .iter()
                .filter(|(_, &deg)| deg == 0)
                .map(|(&id, _)| id)
                .collect();
            if ready.is_empty() {
                break;
            }
            let mut layer: Vec<String> = ready.iter().map(|s| s.to_string()).collect();
            layer.sort();
            for id in &ready {
                remaining.remove(id);
                visited_count += 1;
                for &next in &adjacency[id] {
                    if let Some(deg) = remaining.get_mut(next) {
                        *deg -= 1;
                    }
                }
            }
            layers.push(layer);
        }

        if visited_count != self.nodes.len() {
            let mut unvisited: Vec<String> = remaining.keys().map(|s| s.to_string()).collect();
            unvisited.sort();
            return Err(DagError::Cycle(unvisited));
        }

        Ok(layers)
    }

    /// Full topological order, flattening [`kahn_layers`](Self::kahn_layers)
    /// layer-by-layer. Used where execution order matters but layer
    /// grouping does not (e.g. test assertions in spec §9 scenario 2).
    pub fn topological_order(&self) -> Result<Vec<String>, DagError> {
        Ok(self.kahn_layers()?.into_iter().flatten().collect())
    }

    /// Breadth-first search for the node with the given id, descending into
    /// container children (spec §4.8).
    pub fn find_node(&self, node_id: &str) -> Option<&Node> {
        fn search<'a>(nodes: &'a [Node], node_id: &str) -> Option<&'a Node> {
            let mut queue: VecDeque<&Node> = nodes.iter().collect();
            while let Some(n) = queue.pop_front() {
                if n.node_id == node_id {
                    return Some(n);
                }
                if let Some(children) = &n.children {
                    queue.extend(children.iter());
                }
            }
            None
        }
        search(&self.nodes, node_id)
    }
}
