//! Serde shape of the model document: `nodes`, `edges` and `config`.
//!
//! Kinds, rules and methods stay strings here; validation in `model` and
//! `config` reports which node or edge is at fault.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A rule parameter: a number, or a node id for `control_node`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Defaults to `edge_<index>` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub origin: String,
    pub target: String,
    #[serde(alias = "logic")]
    pub rule: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub t_start: f64,
    pub t_end: f64,
    pub dt: f64,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub clamp_negative: bool,
}

fn default_method() -> String {
    "rk4".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDocument {
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
    pub config: ConfigRecord,
}

impl ModelDocument {
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json).map_err(|err| ValidationError::Malformed(err.to_string()))
    }
}

impl EdgeRecord {
    pub(crate) fn id_or_default(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| format!("edge_{index}"))
    }
}
