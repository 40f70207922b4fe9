//! Core graph types
//!
//! Graphs arrive as JSON documents of node instances and port-to-port
//! connections. Port types use a small closed vocabulary: JSON primitives
//! plus the audit data types that flow between import, detection and
//! reporting nodes.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier for a node instance within a graph
pub type NodeId = String;

/// Port values keyed by port name
pub type NodeInputs = HashMap<String, Value>;

/// Output values keyed by port name
pub type NodeOutputs = HashMap<String, Value>;

/// Node configuration as written in the graph document
pub type NodeConfig = serde_json::Map<String, Value>;

/// Reserved source id whose ports are bound from a run's initial inputs
pub const INITIAL_INPUTS_NODE: &str = "__initial__";

/// Data types that can flow through ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Wildcard, compatible with every type
    Any,
    String,
    Number,
    Boolean,
    Object,
    Array,
    /// Imported tabular records
    Records,
    /// General ledger entries
    Ledger,
    /// Accounting vouchers
    Vouchers,
    Invoices,
    /// Bank statement flows
    BankFlow,
    Contracts,
    /// Findings produced by detection nodes
    RiskSet,
    /// Opaque block of extracted data
    DataBlock,
}

impl DataType {
    /// Canonical name, also used as the `"type"` tag of audit data values
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Any => "any",
            DataType::String => "string",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Object => "object",
            DataType::Array => "array",
            DataType::Records => "records",
            DataType::Ledger => "ledger",
            DataType::Vouchers => "vouchers",
            DataType::Invoices => "invoices",
            DataType::BankFlow => "bank_flow",
            DataType::Contracts => "contracts",
            DataType::RiskSet => "risk_set",
            DataType::DataBlock => "data_block",
        }
    }

    /// Whether a runtime value is an instance of this type
    ///
    /// Audit data values are objects tagged with `"type": <name>`.
    pub fn matches_value(&self, value: &Value) -> bool {
        match self {
            DataType::Any => true,
            DataType::String => value.is_string(),
            DataType::Number => value.is_number(),
            DataType::Boolean => value.is_boolean(),
            DataType::Object => value.is_object(),
            DataType::Array => value.is_array(),
            tagged => value
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|tag| tag == tagged.name()),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared type of a port: one type or a set of accepted types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortType {
    Single(DataType),
    OneOf(Vec<DataType>),
}

impl PortType {
    /// The individual types this port declares
    pub fn members(&self) -> &[DataType] {
        match self {
            PortType::Single(t) => std::slice::from_ref(t),
            PortType::OneOf(ts) => ts,
        }
    }

    pub fn is_any(&self) -> bool {
        self.members().contains(&DataType::Any)
    }

    /// Whether a single source type may feed this port
    pub fn accepts(&self, source: DataType) -> bool {
        source == DataType::Any || self.is_any() || self.members().contains(&source)
    }

    /// Whether an upstream port of type `source` may connect into this port
    ///
    /// A source declaring several types is only compatible when every one of
    /// them is accepted here.
    pub fn accepts_port(&self, source: &PortType) -> bool {
        if source.is_any() || self.is_any() {
            return true;
        }
        let members = source.members();
        !members.is_empty() && members.iter().all(|t| self.accepts(*t))
    }

    /// Whether a runtime value matches any declared type
    pub fn matches_value(&self, value: &Value) -> bool {
        self.members().iter().any(|t| t.matches_value(value))
    }
}

impl From<DataType> for PortType {
    fn from(t: DataType) -> Self {
        PortType::Single(t)
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortType::Single(t) => write!(f, "{}", t),
            PortType::OneOf(ts) => {
                let names: Vec<&str> = ts.iter().map(DataType::name).collect();
                write!(f, "[{}]", names.join("|"))
            }
        }
    }
}

/// A node placed in a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInstance {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub config: NodeConfig,
}

impl NodeInstance {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            config: NodeConfig::new(),
        }
    }

    /// Set a config value
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

/// One side of a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub node_id: NodeId,
    #[serde(alias = "portName")]
    pub port: String,
}

impl Endpoint {
    pub fn new(node_id: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_id, self.port)
    }
}

/// A directed port-to-port connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub from: Endpoint,
    pub to: Endpoint,
}

impl Connection {
    pub fn new(from: Endpoint, to: Endpoint) -> Self {
        Self { from, to }
    }

    /// Whether this connection is bound from the run's initial inputs
    pub fn is_initial(&self) -> bool {
        self.from.node_id == INITIAL_INPUTS_NODE
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// A graph of node instances and their connections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub nodes: Vec<NodeInstance>,
    #[serde(default, alias = "edges")]
    pub connections: Vec<Connection>,
}

impl Graph {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Add a node instance
    pub fn node(mut self, node: NodeInstance) -> Self {
        self.nodes.push(node);
        self
    }

    /// Connect `from_node.from_port` to `to_node.to_port`
    pub fn connect(
        mut self,
        from_node: &str,
        from_port: &str,
        to_node: &str,
        to_port: &str,
    ) -> Self {
        self.connections.push(Connection::new(
            Endpoint::new(from_node, from_port),
            Endpoint::new(to_node, to_port),
        ));
        self
    }

    /// Find a node by id
    pub fn find_node(&self, id: &str) -> Option<&NodeInstance> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Connections that feed into the given node
    pub fn incoming(&self, node_id: &str) -> Vec<&Connection> {
        self.connections
            .iter()
            .filter(|c| c.to.node_id == node_id)
            .collect()
    }

    /// Connections that leave the given node
    pub fn outgoing(&self, node_id: &str) -> Vec<&Connection> {
        self.connections
            .iter()
            .filter(|c| c.from.node_id == node_id)
            .collect()
    }

    /// Ids of nodes the given node directly depends on
    pub fn dependencies(&self, node_id: &str) -> Vec<&str> {
        let mut deps: Vec<&str> = Vec::new();
        for conn in self.incoming(node_id) {
            if !conn.is_initial() && !deps.contains(&conn.from.node_id.as_str()) {
                deps.push(conn.from.node_id.as_str());
            }
        }
        deps
    }
}
