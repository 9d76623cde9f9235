//! Node reconstruction
//!
//! A node's pins are derived from what it refers to: a call node takes the
//! signature of its target function, an event node the signature of the
//! function it implements, a variable node the variable's type. Reconstructing
//! a node recomputes its pins against the current classes and drops the
//! connections of pins that no longer exist.

use std::collections::BTreeMap;

use blueprint_types::{
    Blueprint, ClassId, ClassRegistry, FunctionDef, FunctionParam, Graph, Node, NodeKind, PIN_THEN,
    PinDef, PinDirection, PinType,
};

/// Signature of a function graph: entry parameters and result outputs
pub fn graph_signature(graph: &Graph) -> (Vec<FunctionParam>, Vec<FunctionParam>) {
    let mut params = Vec::new();
    let mut outputs = Vec::new();
    for node in &graph.nodes {
        match &node.kind {
            NodeKind::FunctionEntry { params: p } => params = p.clone(),
            NodeKind::FunctionResult { outputs: o } => outputs = o.clone(),
            _ => {}
        }
    }
    (params, outputs)
}

/// Everything a node can resolve against while its pins are rebuilt
pub struct NodeContext<'a> {
    classes: &'a ClassRegistry,
    parent: Option<ClassId>,
    self_class: Option<ClassId>,
    interfaces: Vec<ClassId>,
    functions: BTreeMap<String, (Vec<FunctionParam>, Vec<FunctionParam>)>,
    variables: BTreeMap<String, PinType>,
}

impl<'a> NodeContext<'a> {
    pub fn new(blueprint: &Blueprint, classes: &'a ClassRegistry) -> Self {
        let parent = classes.find(&blueprint.parent_class);
        let self_class = blueprint
            .state
            .skeleton_class
            .or(blueprint.state.generated_class)
            .filter(|id| classes.contains(*id));

        let mut interfaces: Vec<ClassId> = blueprint
            .implemented_interfaces
            .iter()
            .filter_map(|desc| classes.find(&desc.interface))
            .collect();
        if let Some(parent) = parent {
            for inherited in classes.implemented_interfaces(parent) {
                if !interfaces.contains(&inherited) {
                    interfaces.push(inherited);
                }
            }
        }

        let mut functions = BTreeMap::new();
        let graphs = blueprint.function_graphs.iter().chain(
            blueprint
                .implemented_interfaces
                .iter()
                .flat_map(|desc| desc.graphs.iter()),
        );
        for graph in graphs {
            functions.insert(graph.name.clone(), graph_signature(graph));
        }
        for node in blueprint.event_graphs.iter().flat_map(|g| g.nodes.iter()) {
            if let NodeKind::CustomEvent { name, params } = &node.kind {
                functions.insert(name.clone(), (params.clone(), Vec::new()));
            }
        }

        let mut variables: BTreeMap<String, PinType> = blueprint
            .variables
            .iter()
            .map(|v| (v.name.clone(), v.var_type.clone()))
            .collect();
        for component in &blueprint.components {
            variables.insert(component.name.clone(), PinType::object(&component.class));
        }

        Self {
            classes,
            parent,
            self_class,
            interfaces,
            functions,
            variables,
        }
    }

    pub fn classes(&self) -> &'a ClassRegistry {
        self.classes
    }

    pub fn parent(&self) -> Option<ClassId> {
        self.parent
    }

    /// The function an event named `name` implements, searching the cached
    /// signature class, then the parent chain, then the interfaces
    pub fn resolve_event(&self, name: &str, signature_class: Option<&str>) -> Option<(ClassId, &'a FunctionDef)> {
        let classes = self.classes;
        signature_class
            .and_then(|owner| classes.find(owner))
            .and_then(|owner| classes.find_function(owner, name))
            .or_else(|| self.parent.and_then(|p| classes.find_function(p, name)))
            .or_else(|| {
                self.interfaces
                    .iter()
                    .find_map(|interface| classes.find_function(*interface, name))
            })
    }

    /// Signature of a function called by a call node
    fn resolve_call(&self, name: &str, owner: Option<&str>) -> Option<(Vec<FunctionParam>, Vec<FunctionParam>)> {
        let classes = self.classes;
        if let Some(owner) = owner {
            let owner = classes.find(owner)?;
            return classes
                .find_function(owner, name)
                .map(|(_, f)| (f.params.clone(), f.outputs.clone()));
        }
        if let Some(signature) = self.functions.get(name) {
            return Some(signature.clone());
        }
        self.self_class
            .or(self.parent)
            .and_then(|class| classes.find_function(class, name))
            .or_else(|| {
                self.interfaces
                    .iter()
                    .find_map(|interface| classes.find_function(*interface, name))
            })
            .map(|(_, f)| (f.params.clone(), f.outputs.clone()))
    }

    fn resolve_variable(&self, name: &str) -> Option<PinType> {
        if let Some(ty) = self.variables.get(name) {
            return Some(ty.clone());
        }
        self.self_class
            .or(self.parent)
            .and_then(|class| self.classes.find_property(class, name))
            .map(|(_, p)| p.ty.clone())
    }

    /// Pins the node should have, or `None` if its target cannot be resolved
    /// and the current pins should be left alone
    pub fn expected_pins(&self, node: &Node) -> Option<Vec<PinDef>> {
        let pins = match &node.kind {
            NodeKind::FunctionEntry { params } => std::iter::once(PinDef::exec_out(PIN_THEN))
                .chain(params.iter().map(|p| PinDef::data_out(&p.name, p.param_type.clone())))
                .collect(),
            NodeKind::FunctionResult { outputs } => std::iter::once(PinDef::exec_in())
                .chain(outputs.iter().map(|p| PinDef::data_in(&p.name, p.param_type.clone())))
                .collect(),
            NodeKind::Event {
                event_name,
                signature_class,
                ..
            } => {
                let (_, function) = self.resolve_event(event_name, signature_class.as_deref())?;
                event_pins(&function.params)
            }
            NodeKind::CustomEvent { params, .. } => event_pins(params),
            NodeKind::CallFunction { target } => {
                let (params, outputs) = self.resolve_call(&target.member_name, target.member_parent.as_deref())?;
                call_pins(&params, &outputs)
            }
            NodeKind::CallParentFunction { target } => {
                let parent = self.parent?;
                let (_, function) = self.classes.find_function(parent, &target.member_name)?;
                call_pins(&function.params, &function.outputs)
            }
            NodeKind::VariableGet { variable } => {
                vec![PinDef::data_out(variable, self.resolve_variable(variable)?)]
            }
            NodeKind::VariableSet { variable } => vec![
                PinDef::exec_in(),
                PinDef::exec_out(PIN_THEN),
                PinDef::data_in(variable, self.resolve_variable(variable)?),
            ],
            NodeKind::Generic { .. } => return None,
        };
        Some(pins)
    }
}

fn event_pins(params: &[FunctionParam]) -> Vec<PinDef> {
    std::iter::once(PinDef::exec_out(PIN_THEN))
        .chain(params.iter().map(|p| PinDef::data_out(&p.name, p.param_type.clone())))
        .collect()
}

fn call_pins(params: &[FunctionParam], outputs: &[FunctionParam]) -> Vec<PinDef> {
    let mut pins = vec![PinDef::exec_in(), PinDef::exec_out(PIN_THEN)];
    pins.extend(params.iter().map(|p| PinDef::data_in(&p.name, p.param_type.clone())));
    pins.extend(outputs.iter().map(|p| PinDef::data_out(&p.name, p.param_type.clone())));
    pins
}

/// Rebuild one node's pins in the live graph.
///
/// Input defaults survive on pins that keep their name. Connections attached
/// to pins that disappeared (or changed direction) are removed. Returns
/// whether anything changed.
pub fn reconstruct_node(graph: &mut Graph, node_id: &str, ctx: &NodeContext<'_>) -> bool {
    let Some(node) = graph.get_node(node_id) else {
        return false;
    };
    let Some(mut pins) = ctx.expected_pins(node) else {
        return false;
    };
    for pin in &mut pins {
        if let Some(old) = node
            .find_pin(&pin.name)
            .filter(|old| old.direction == pin.direction && pin.direction == PinDirection::Input)
        {
            pin.default = old.default.clone();
        }
    }
    if node.pins == pins {
        return false;
    }

    let has_pin = |name: &str, direction: PinDirection| {
        pins.iter().any(|p| p.name == name && p.direction == direction)
    };
    let before = graph.connections.len();
    graph.connections.retain(|c| {
        let from_ok = c
            .from_parts()
            .is_none_or(|(n, p)| n != node_id || has_pin(p, PinDirection::Output));
        let to_ok = c
            .to_parts()
            .is_none_or(|(n, p)| n != node_id || has_pin(p, PinDirection::Input));
        from_ok && to_ok
    });
    let pruned = before - graph.connections.len();
    if pruned > 0 {
        tracing::debug!(node = node_id, pruned, "dropped connections of removed pins");
    }

    if let Some(node) = graph.get_node_mut(node_id) {
        node.pins = pins;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint_types::{ClassDef, ClassFlags, Connection, MemberReference, VariableDef};

    fn classes() -> ClassRegistry {
        let mut classes = ClassRegistry::new();
        let object = classes.register(ClassDef::new("Object").with_flags(ClassFlags::NATIVE));
        classes.register(
            ClassDef::new("Actor")
                .with_super(object)
                .with_flags(ClassFlags::NATIVE)
                .with_function(
                    FunctionDef::event("ReceiveHit")
                        .with_param(FunctionParam::new("Other", PinType::object("Actor"))),
                )
                .with_function(
                    FunctionDef::new("SetHidden").with_param(FunctionParam::new("Hidden", PinType::Boolean)),
                ),
        );
        classes
    }

    #[test]
    fn test_event_pins_follow_parent_signature() {
        let classes = classes();
        let bp = Blueprint::new("bp", "Door", "Actor");
        let ctx = NodeContext::new(&bp, &classes);

        let node = Node::override_event("ev", "ReceiveHit", "Actor");
        let pins = ctx.expected_pins(&node).unwrap();
        assert_eq!(pins[0].name, PIN_THEN);
        assert_eq!(pins[1].name, "Other");
        assert_eq!(pins[1].direction, PinDirection::Output);

        let gone = Node::override_event("ev2", "ReceiveGone", "Actor");
        assert!(ctx.expected_pins(&gone).is_none());
    }

    #[test]
    fn test_reconstruct_prunes_dead_pins_and_keeps_defaults() {
        let classes = classes();
        let bp = Blueprint::new("bp", "Door", "Actor").with_variable(VariableDef::new("Open", PinType::Boolean));
        let ctx = NodeContext::new(&bp, &classes);

        let call = Node::new(
            "call",
            NodeKind::CallFunction {
                target: MemberReference::external("SetHidden", "Actor"),
            },
        )
        .with_pins(vec![
            PinDef::exec_in(),
            PinDef::exec_out(PIN_THEN),
            PinDef::data_in("Hidden", PinType::Boolean).with_default(serde_json::json!(true)),
            PinDef::data_in("Stale", PinType::Integer),
        ]);
        let mut graph = Graph::new("EventGraph")
            .with_node(Node::new("get", NodeKind::VariableGet { variable: "Open".into() }))
            .with_node(call)
            .with_connection(Connection::new("get", "Open", "call", "Hidden"))
            .with_connection(Connection::new("get", "Open", "call", "Stale"));

        assert!(reconstruct_node(&mut graph, "call", &ctx));
        assert_eq!(graph.connections, vec![Connection::new("get", "Open", "call", "Hidden")]);
        let node = graph.get_node("call").unwrap();
        assert!(node.find_pin("Stale").is_none());
        assert_eq!(node.find_pin("Hidden").unwrap().default, Some(serde_json::json!(true)));

        assert!(!reconstruct_node(&mut graph, "call", &ctx));
    }

    #[test]
    fn test_custom_event_calls_resolve_locally() {
        let classes = classes();
        let mut bp = Blueprint::new("bp", "Door", "Actor");
        bp.event_graphs[0].nodes.push(Node::new(
            "custom",
            NodeKind::CustomEvent {
                name: "Slam".into(),
                params: vec![FunctionParam::new("Force", PinType::Real)],
            },
        ));
        let ctx = NodeContext::new(&bp, &classes);

        let call = Node::new(
            "call",
            NodeKind::CallFunction {
                target: MemberReference::self_member("Slam"),
            },
        );
        let pins = ctx.expected_pins(&call).unwrap();
        assert!(pins.iter().any(|p| p.name == "Force" && p.direction == PinDirection::Input));
    }
}
