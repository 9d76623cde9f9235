// Graph model - pins, nodes, connections and graphs
//
// These types describe the editable side of a blueprint: the graphs a user
// draws. The compiler and the conformance passes read and rewrite them; the
// runtime never sees them.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Pin Types
// ─────────────────────────────────────────────────────────────────────────────

/// Direction of a pin on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinDirection {
    Input,
    Output,
}

/// Data types that can flow through pins, variables and properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "PascalCase")]
pub enum PinType {
    /// Execution flow (no data, just control flow)
    Exec,
    /// 64-bit floating point
    Real,
    /// 64-bit signed integer
    Integer,
    /// Boolean value
    Boolean,
    /// String value
    String,
    /// Interned name
    Name,
    /// Array of a specific type
    Array { element: Box<PinType> },
    /// User-defined struct type
    Struct { struct_id: String },
    /// Reference to an object of the given class (by class name)
    Object { class: String },
    /// Reference to a class deriving from the given class
    Class { class: String },
    /// Dynamic type - accepts anything
    Any,
}

impl PinType {
    /// Check if this type is compatible with another (for connection validation)
    pub fn is_compatible_with(&self, other: &PinType) -> bool {
        match (self, other) {
            (a, b) if a == b => true,
            (PinType::Any, _) | (_, PinType::Any) => true,
            (PinType::Real, PinType::Integer) | (PinType::Integer, PinType::Real) => true,
            (PinType::Name, PinType::String) | (PinType::String, PinType::Name) => true,
            (PinType::Array { element: a }, PinType::Array { element: b }) => {
                a.is_compatible_with(b)
            }
            _ => false,
        }
    }

    /// Check if this is an execution pin type
    pub fn is_exec(&self) -> bool {
        matches!(self, PinType::Exec)
    }

    /// Check if this is a data pin type
    pub fn is_data(&self) -> bool {
        !self.is_exec()
    }

    /// Class name referenced by this type, if any
    pub fn referenced_class(&self) -> Option<&str> {
        match self {
            PinType::Object { class } | PinType::Class { class } => Some(class),
            PinType::Array { element } => element.referenced_class(),
            _ => None,
        }
    }

    /// Create an object reference type
    pub fn object(class: impl Into<String>) -> Self {
        PinType::Object {
            class: class.into(),
        }
    }

    /// Create a struct type
    pub fn structure(struct_id: impl Into<String>) -> Self {
        PinType::Struct {
            struct_id: struct_id.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pin Definitions
// ─────────────────────────────────────────────────────────────────────────────

/// Name of the execution input pin
pub const PIN_EXEC: &str = "exec";
/// Name of the default execution output pin
pub const PIN_THEN: &str = "then";
/// Name of the return value pin on call nodes
pub const PIN_RETURN_VALUE: &str = "ReturnValue";

/// A pin on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinDef {
    /// Pin name (used in connections)
    pub name: String,
    /// Pin direction (input or output)
    pub direction: PinDirection,
    /// Data type of the pin
    #[serde(rename = "type")]
    pub pin_type: PinType,
    /// Default value for input pins (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl PinDef {
    /// Create an execution input pin
    pub fn exec_in() -> Self {
        Self::new(PIN_EXEC, PinDirection::Input, PinType::Exec)
    }

    /// Create an execution output pin with a custom name
    pub fn exec_out(name: &str) -> Self {
        Self::new(name, PinDirection::Output, PinType::Exec)
    }

    /// Create a data input pin
    pub fn data_in(name: &str, pin_type: PinType) -> Self {
        Self::new(name, PinDirection::Input, pin_type)
    }

    /// Create a data output pin
    pub fn data_out(name: &str, pin_type: PinType) -> Self {
        Self::new(name, PinDirection::Output, pin_type)
    }

    fn new(name: &str, direction: PinDirection, pin_type: PinType) -> Self {
        Self {
            name: name.to_string(),
            direction,
            pin_type,
            default: None,
        }
    }

    /// Add a default value
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Function Parameters
// ─────────────────────────────────────────────────────────────────────────────

/// A parameter for a function (input or output)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionParam {
    /// Parameter name
    pub name: String,
    /// Parameter type
    #[serde(rename = "type")]
    pub param_type: PinType,
    /// Default value for input parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl FunctionParam {
    pub fn new(name: impl Into<String>, param_type: PinType) -> Self {
        Self {
            name: name.into(),
            param_type,
            default: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Nodes
// ─────────────────────────────────────────────────────────────────────────────

/// Special node ID for function entry point
pub const FUNCTION_ENTRY_NODE: &str = "__entry__";
/// Special node ID for function exit point
pub const FUNCTION_EXIT_NODE: &str = "__exit__";

/// Reference from a node to a class member (function or variable)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberReference {
    /// Member name
    pub member_name: String,
    /// Class that owned the member when the node was last resolved.
    /// `None` means the member lives on the blueprint's own class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_parent: Option<String>,
}

impl MemberReference {
    /// Reference a member of the blueprint's own class
    pub fn self_member(name: impl Into<String>) -> Self {
        Self {
            member_name: name.into(),
            member_parent: None,
        }
    }

    /// Reference a member owned by a specific class
    pub fn external(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            member_name: name.into(),
            member_parent: Some(owner.into()),
        }
    }
}

/// What a node does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry point of a function graph; its outputs are the parameters
    FunctionEntry {
        #[serde(default)]
        params: Vec<FunctionParam>,
    },
    /// Exit point of a function graph; its inputs are the return values
    FunctionResult {
        #[serde(default)]
        outputs: Vec<FunctionParam>,
    },
    /// Event bound to a function declared by a parent class or an interface
    Event {
        event_name: String,
        /// Class that declared the event when it was last resolved
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature_class: Option<String>,
        /// Whether the event overrides an inherited function
        #[serde(default)]
        override_function: bool,
    },
    /// User-declared event with no inherited signature
    CustomEvent {
        name: String,
        #[serde(default)]
        params: Vec<FunctionParam>,
    },
    /// Call to a function on self or on another class
    CallFunction { target: MemberReference },
    /// Call to the parent class's implementation of a function
    CallParentFunction { target: MemberReference },
    /// Read a member variable
    VariableGet { variable: String },
    /// Write a member variable
    VariableSet { variable: String },
    /// Any other node (math, flow control) the compiler treats opaquely
    Generic {
        node_type: String,
        #[serde(default)]
        config: serde_json::Value,
    },
}

/// Position in the visual editor (for UI purposes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// A node instance within a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique instance ID within its graph
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Pins as last reconstructed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pins: Vec<PinDef>,
    /// Position in the visual editor
    #[serde(default)]
    pub position: Position,
}

impl Node {
    /// Create a node with no pins; `reconstruct` fills them in
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            pins: Vec::new(),
            position: Position::default(),
        }
    }

    pub fn with_pins(mut self, pins: Vec<PinDef>) -> Self {
        self.pins = pins;
        self
    }

    /// Create an override event node
    pub fn override_event(id: impl Into<String>, event_name: &str, signature_class: &str) -> Self {
        Self::new(
            id,
            NodeKind::Event {
                event_name: event_name.to_string(),
                signature_class: Some(signature_class.to_string()),
                override_function: true,
            },
        )
    }

    /// Get a pin by name
    pub fn find_pin(&self, name: &str) -> Option<&PinDef> {
        self.pins.iter().find(|p| p.name == name)
    }

    /// Data output pins, in declaration order
    pub fn data_outputs(&self) -> impl Iterator<Item = &PinDef> {
        self.pins
            .iter()
            .filter(|p| p.direction == PinDirection::Output && p.pin_type.is_data())
    }

    /// Whether reconstructing this node can change the class layout
    pub fn causes_structural_change(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::FunctionEntry { .. } | NodeKind::Event { .. } | NodeKind::CustomEvent { .. }
        )
    }

    /// Name of the event this node declares, if it is an event of any sort
    pub fn event_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Event { event_name, .. } => Some(event_name),
            NodeKind::CustomEvent { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_override_event(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Event {
                override_function: true,
                ..
            }
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connections
// ─────────────────────────────────────────────────────────────────────────────

/// A connection between two pins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Source: "node_id.pin_name"
    pub from: String,
    /// Destination: "node_id.pin_name"
    pub to: String,
}

impl Connection {
    /// Parse the "from" field into (node_id, pin_name)
    pub fn from_parts(&self) -> Option<(&str, &str)> {
        self.from.split_once('.')
    }

    /// Parse the "to" field into (node_id, pin_name)
    pub fn to_parts(&self) -> Option<(&str, &str)> {
        self.to.split_once('.')
    }

    /// Create a new connection
    pub fn new(from_node: &str, from_pin: &str, to_node: &str, to_pin: &str) -> Self {
        Self {
            from: format!("{}.{}", from_node, from_pin),
            to: format!("{}.{}", to_node, to_pin),
        }
    }

    /// Whether either end of the connection is on the given node
    pub fn touches(&self, node_id: &str) -> bool {
        self.from_parts().is_some_and(|(n, _)| n == node_id)
            || self.to_parts().is_some_and(|(n, _)| n == node_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Graphs
// ─────────────────────────────────────────────────────────────────────────────

/// A named graph of nodes (function, macro, event page, delegate signature)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// Graph name; for function graphs this is the function name
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl Graph {
    /// Create an empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// Create a function graph with entry and result nodes for a signature
    pub fn function(
        name: impl Into<String>,
        params: Vec<FunctionParam>,
        outputs: Vec<FunctionParam>,
    ) -> Self {
        let mut graph = Self::new(name);
        graph.nodes.push(Node::new(
            FUNCTION_ENTRY_NODE,
            NodeKind::FunctionEntry { params },
        ));
        if !outputs.is_empty() {
            graph.nodes.push(Node::new(
                FUNCTION_EXIT_NODE,
                NodeKind::FunctionResult { outputs },
            ));
        }
        graph
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    /// Get a node by ID
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Get a node by ID, mutably
    pub fn get_node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// The function entry node, if this is a function graph
    pub fn entry_node(&self) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| matches!(n.kind, NodeKind::FunctionEntry { .. }))
    }

    /// Get all connections from a specific node and pin
    pub fn connections_from(&self, node_id: &str, pin_name: &str) -> Vec<&Connection> {
        let prefix = format!("{}.{}", node_id, pin_name);
        self.connections.iter().filter(|c| c.from == prefix).collect()
    }

    /// Get all connections to a specific node and pin
    pub fn connections_to(&self, node_id: &str, pin_name: &str) -> Vec<&Connection> {
        let prefix = format!("{}.{}", node_id, pin_name);
        self.connections.iter().filter(|c| c.to == prefix).collect()
    }

    /// Remove a node and every connection touching it
    pub fn remove_node(&mut self, node_id: &str) -> Option<Node> {
        let index = self.nodes.iter().position(|n| n.id == node_id)?;
        self.connections.retain(|c| !c.touches(node_id));
        Some(self.nodes.remove(index))
    }

    /// Add a connection unless an identical one already exists
    pub fn connect(&mut self, connection: Connection) {
        if !self.connections.contains(&connection) {
            self.connections.push(connection);
        }
    }

    /// Produce a node ID not yet used in this graph
    pub fn unique_node_id(&self, prefix: &str) -> String {
        let mut index = self.nodes.len();
        loop {
            let candidate = format!("{}_{}", prefix, index);
            if self.get_node(&candidate).is_none() {
                return candidate;
            }
            index += 1;
        }
    }
}
