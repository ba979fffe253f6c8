//! The validated, index-resolved flow network.

use crate::document::{EdgeRecord, ModelDocument, NodeRecord};
use crate::error::{EdgeRole, ValidationError};
use crate::rules::{FlowRule, RuleKind};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Unbounded external supply.
    Source,
    /// Unbounded external disposal.
    Sink,
    /// Finite, simulated quantity.
    Storage,
    /// A held boundary value.
    Constant,
}

impl NodeKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "source" => Some(NodeKind::Source),
            "sink" => Some(NodeKind::Sink),
            "storage" => Some(NodeKind::Storage),
            "constant" => Some(NodeKind::Constant),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Source => "source",
            NodeKind::Sink => "sink",
            NodeKind::Storage => "storage",
            NodeKind::Constant => "constant",
        }
    }

    /// Flow leaving a node of this kind is subtracted from it.
    pub fn is_charged(self) -> bool {
        matches!(self, NodeKind::Storage | NodeKind::Sink)
    }

    /// Flow arriving at a node of this kind is added to it.
    pub fn is_credited(self) -> bool {
        matches!(self, NodeKind::Storage | NodeKind::Source)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    /// Initial value.
    pub value: f64,
}

/// An edge with its endpoints resolved to node indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: String,
    pub origin: usize,
    pub target: usize,
    pub rule: FlowRule,
}

/// Nodes and edges of one model. Immutable once built.
#[derive(Debug, Clone)]
pub struct NetworkModel {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    node_lookup: HashMap<String, usize>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl NetworkModel {
    pub fn from_document(document: &ModelDocument) -> Result<Self, ValidationError> {
        Self::from_records(&document.nodes, &document.edges)
    }

    /// Validates node and edge records and resolves every id reference.
    pub fn from_records(
        node_records: &[NodeRecord],
        edge_records: &[EdgeRecord],
    ) -> Result<Self, ValidationError> {
        let mut nodes = Vec::with_capacity(node_records.len());
        let mut node_lookup = HashMap::with_capacity(node_records.len());

        for record in node_records {
            if node_lookup.contains_key(&record.id) {
                return Err(ValidationError::DuplicateNode(record.id.clone()));
            }
            let kind = NodeKind::from_name(&record.kind).ok_or_else(|| {
                ValidationError::UnknownNodeKind {
                    node: record.id.clone(),
                    kind: record.kind.clone(),
                }
            })?;
            if !record.value.is_finite() {
                return Err(ValidationError::NonFiniteNodeValue(record.id.clone()));
            }
            node_lookup.insert(record.id.clone(), nodes.len());
            nodes.push(Node {
                id: record.id.clone(),
                kind,
                value: record.value,
            });
        }

        let resolve = |id: &str| node_lookup.get(id).copied();
        let mut edges = Vec::with_capacity(edge_records.len());
        let mut edge_ids = HashMap::with_capacity(edge_records.len());

        for (index, record) in edge_records.iter().enumerate() {
            let id = record.id_or_default(index);
            if edge_ids.insert(id.clone(), index).is_some() {
                return Err(ValidationError::DuplicateEdge(id));
            }
            let endpoint = |node: &str, role: EdgeRole| {
                resolve(node).ok_or_else(|| ValidationError::UnknownNode {
                    edge: id.clone(),
                    role,
                    node: node.to_string(),
                })
            };
            let origin = endpoint(&record.origin, EdgeRole::Origin)?;
            let target = endpoint(&record.target, EdgeRole::Target)?;
            let kind =
                RuleKind::from_name(&record.rule).ok_or_else(|| ValidationError::UnknownRule {
                    edge: id.clone(),
                    rule: record.rule.clone(),
                })?;
            let rule = FlowRule::from_params(&id, kind, &record.params, resolve)?;
            edges.push(Edge {
                id,
                origin,
                target,
                rule,
            });
        }

        let model = Self::assemble(nodes, edges, node_lookup);
        debug!(
            nodes = model.nodes.len(),
            edges = model.edges.len(),
            "validated flow network"
        );
        Ok(model)
    }

    fn assemble(nodes: Vec<Node>, edges: Vec<Edge>, node_lookup: HashMap<String, usize>) -> Self {
        let mut outgoing = vec![Vec::new(); nodes.len()];
        let mut incoming = vec![Vec::new(); nodes.len()];
        for (index, edge) in edges.iter().enumerate() {
            outgoing[edge.origin].push(index);
            incoming[edge.target].push(index);
        }
        Self {
            nodes,
            edges,
            node_lookup,
            outgoing,
            incoming,
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.node_lookup.get(id).copied()
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|node| node.id.clone()).collect()
    }

    /// Edges leaving `node_id`, in document order. Empty for unknown ids.
    pub fn edges_by_origin<'a>(&'a self, node_id: &str) -> impl Iterator<Item = &'a Edge> + 'a {
        let indices: &[usize] = match self.node_index(node_id) {
            Some(node) => self.outgoing[node].as_slice(),
            None => &[],
        };
        indices.iter().map(move |&edge| &self.edges[edge])
    }

    /// Edges arriving at `node_id`, in document order. Empty for unknown ids.
    pub fn edges_by_target<'a>(&'a self, node_id: &str) -> impl Iterator<Item = &'a Edge> + 'a {
        let indices: &[usize] = match self.node_index(node_id) {
            Some(node) => self.incoming[node].as_slice(),
            None => &[],
        };
        indices.iter().map(move |&edge| &self.edges[edge])
    }

    /// Indices of edges leaving node `index`.
    pub fn outgoing(&self, index: usize) -> &[usize] {
        &self.outgoing[index]
    }

    /// Indices of edges arriving at node `index`.
    pub fn incoming(&self, index: usize) -> &[usize] {
        &self.incoming[index]
    }

    pub fn initial_state(&self) -> Vec<f64> {
        self.nodes.iter().map(|node| node.value).collect()
    }

    /// The `k` coefficient of every edge, in edge order.
    pub fn rates(&self) -> Vec<f64> {
        self.edges.iter().map(|edge| edge.rule.rate()).collect()
    }

    /// A copy of this model with each edge's `k` replaced by `rates[i]`.
    pub fn with_rates(&self, rates: &[f64]) -> Result<Self, ValidationError> {
        if rates.len() != self.edges.len() {
            return Err(ValidationError::RateCountMismatch {
                expected: self.edges.len(),
                actual: rates.len(),
            });
        }
        let mut model = self.clone();
        for (edge, &rate) in model.edges.iter_mut().zip(rates) {
            if !rate.is_finite() {
                return Err(ValidationError::InvalidParameter {
                    edge: edge.id.clone(),
                    param: "k".to_string(),
                    reason: "must be finite",
                });
            }
            edge.rule = edge.rule.with_rate(rate);
        }
        Ok(model)
    }
}
