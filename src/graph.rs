// src/graph.rs

use log::{debug, error};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A character in the graph. Ids are kept as raw JSON so numeric and
/// string ids both survive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub val: u32,
}

/// A directed, labeled relationship between two characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLink {
    #[serde(default)]
    pub source: Value,
    #[serde(default)]
    pub target: Value,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub links: Vec<GraphLink>,
}

impl GraphData {
    /// Drops every link that points at a node id not in `nodes`.
    pub fn without_dangling_links(mut self) -> Self {
        let before = self.links.len();
        let links = std::mem::take(&mut self.links)
            .into_iter()
            .filter(|l| self.has_node(&l.source) && self.has_node(&l.target))
            .collect::<Vec<_>>();
        if links.len() != before {
            debug!("Dropped {} dangling link(s)", before - links.len());
        }
        self.links = links;
        self
    }

    fn has_node(&self, id: &Value) -> bool {
        self.nodes.iter().any(|n| &n.id == id)
    }

    pub fn node_name(&self, id: &Value) -> Option<&str> {
        self.nodes
            .iter()
            .find(|n| &n.id == id)
            .map(|n| n.name.as_str())
    }
}

/// Renders an id for display: strings without quotes, anything else as JSON.
pub fn display_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A graph plus the book metadata the inference server returns with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookGraph {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(flatten)]
    pub graph: GraphData,
}

fn filter_value(raw: &Value) -> Result<Value, String> {
    let nodes = raw
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or("graph has no node list")?;
    let links = raw
        .get("links")
        .and_then(Value::as_array)
        .ok_or("graph has no link list")?;

    let node_ids: Vec<Value> = nodes
        .iter()
        .map(|n| n.get("id").cloned().unwrap_or(Value::Null))
        .collect();

    let valid_links: Vec<Value> = links
        .iter()
        .filter(|l| {
            let source = l.get("source");
            let target = l.get("target");
            matches!((source, target), (Some(s), Some(t)) if node_ids.contains(s) && node_ids.contains(t))
        })
        .cloned()
        .collect();

    Ok(json!({ "nodes": nodes, "links": valid_links }))
}

/// Removes links to unknown nodes from raw server output.
///
/// Returns the input unchanged when it does not have the expected shape.
pub fn verify_graph_data(raw: Value) -> Value {
    match filter_value(&raw) {
        Ok(filtered) => filtered,
        Err(e) => {
            error!("Error validating graph data: {}", e);
            raw
        }
    }
}

/// Pulls the JSON object out of a model reply that may be wrapped in prose:
/// everything from the first `{` to the last `}`.
pub fn extract_graph_json(content: &str) -> Option<Value> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }

    match serde_json::from_str(&content[start..=end]) {
        Ok(value) => Some(value),
        Err(e) => {
            error!("Error parsing graph response: {}", e);
            None
        }
    }
}
