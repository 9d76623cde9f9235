//! Conformance passes
//!
//! Before a compile, the asset's graphs are brought in line with the classes
//! they refer to. Parents and interfaces may have changed since the asset
//! was saved; most drift is repaired silently (with a note or a warning in
//! the results log) and only unresolvable interfaces are errors.

use std::collections::BTreeMap;

use blueprint_types::{
    Blueprint, BlueprintStatus, ClassId, ClassRegistry, CompilerResultsLog, Connection, FUNCTION_EXIT_NODE,
    FunctionDef, FunctionParam, Graph, InterfaceDescription, Node, NodeKind, PIN_EXEC, PIN_THEN, Severity,
};

use crate::{BlueprintError, BlueprintResult, NodeContext, reconstruct_node};

/// What the conformance passes changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConformReport {
    pub structurally_modified: bool,
    /// Nodes whose cached owner class was rebound
    pub rebound: usize,
    pub removed_nodes: usize,
    /// Event nodes turned into custom events
    pub converted_events: usize,
    pub promoted_interfaces: usize,
}

/// Runs the three conformance passes against a class registry
pub struct ConformancePass<'a> {
    classes: &'a ClassRegistry,
}

impl<'a> ConformancePass<'a> {
    pub fn new(classes: &'a ClassRegistry) -> Self {
        Self { classes }
    }

    /// Parent calls, then overridden events, then implemented interfaces
    pub fn run(&self, blueprint: &mut Blueprint, log: &mut CompilerResultsLog) -> BlueprintResult<ConformReport> {
        let mut report = ConformReport::default();
        self.conform_calls_to_parent_functions(blueprint, log, &mut report);
        self.conform_implemented_events(blueprint, log, &mut report);
        self.conform_implemented_interfaces(blueprint, log, &mut report)?;

        tracing::debug!(
            blueprint = %blueprint.id,
            modified = report.structurally_modified,
            rebound = report.rebound,
            removed = report.removed_nodes,
            converted = report.converted_events,
            promoted = report.promoted_interfaces,
            "conformed asset"
        );
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Parent calls
    // ─────────────────────────────────────────────────────────────────────────

    /// Rebind every parent call to the class that now declares the function.
    /// Calls to functions the parent no longer has are spliced out of the
    /// exec chain.
    pub fn conform_calls_to_parent_functions(
        &self,
        blueprint: &mut Blueprint,
        log: &mut CompilerResultsLog,
        report: &mut ConformReport,
    ) {
        let Some(parent) = self.classes.find(&blueprint.parent_class) else {
            return;
        };

        for graph in blueprint.all_graphs_mut() {
            let calls: Vec<(String, String, Option<String>)> = graph
                .nodes
                .iter()
                .filter_map(|n| match &n.kind {
                    NodeKind::CallParentFunction { target } => {
                        Some((n.id.clone(), target.member_name.clone(), target.member_parent.clone()))
                    }
                    _ => None,
                })
                .collect();

            for (node_id, function, cached_owner) in calls {
                match self.classes.find_function(parent, &function) {
                    Some((owner, _)) => {
                        let owner = self.classes.name_of(owner);
                        if cached_owner.as_deref() == Some(owner) {
                            continue;
                        }
                        if let Some(Node {
                            kind: NodeKind::CallParentFunction { target },
                            ..
                        }) = graph.get_node_mut(&node_id)
                        {
                            target.member_parent = Some(owner.to_string());
                        }
                        log.node_message(
                            Severity::Note,
                            &node_id,
                            format!("Parent call to {function} now resolves to {owner}"),
                        );
                        report.rebound += 1;
                    }
                    None => {
                        splice_out(graph, &node_id);
                        log.node_message(
                            Severity::Note,
                            &node_id,
                            format!(
                                "Removed call to parent function {function}: {} no longer declares it",
                                self.classes.name_of(parent)
                            ),
                        );
                        report.removed_nodes += 1;
                        report.structurally_modified = true;
                    }
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Overridden events
    // ─────────────────────────────────────────────────────────────────────────

    /// Check every override event against the parent chain and interfaces.
    /// Events whose function is gone become custom events of the same name
    /// and shape, with one warning each.
    pub fn conform_implemented_events(
        &self,
        blueprint: &mut Blueprint,
        log: &mut CompilerResultsLog,
        report: &mut ConformReport,
    ) {
        let Some(parent) = self.classes.find(&blueprint.parent_class) else {
            return;
        };
        let interfaces = self.all_interfaces(blueprint, parent);
        // Members of the asset's own interfaces that turned function-style
        // are reshaped by the interface pass
        let own_interfaces: Vec<ClassId> = blueprint
            .implemented_interfaces
            .iter()
            .filter_map(|desc| self.classes.find(&desc.interface))
            .collect();

        for graph in &mut blueprint.event_graphs {
            for node in &mut graph.nodes {
                let NodeKind::Event {
                    event_name,
                    signature_class,
                    override_function: true,
                } = &mut node.kind
                else {
                    continue;
                };

                match self.event_owner(parent, &interfaces, event_name) {
                    Some(owner) => {
                        let owner = self.classes.name_of(owner);
                        if signature_class.as_deref() != Some(owner) {
                            log.node_message(
                                Severity::Note,
                                &node.id,
                                format!("Event {event_name} is now declared by {owner}"),
                            );
                            *signature_class = Some(owner.to_string());
                            report.rebound += 1;
                        }
                    }
                    None if own_interfaces
                        .iter()
                        .any(|i| self.classes.find_function(*i, event_name).is_some()) => {}
                    None => {
                        let name = event_name.clone();
                        log.node_message(
                            Severity::Warning,
                            &node.id,
                            format!(
                                "{name} is no longer an event of {}; it was converted to a custom event",
                                blueprint.parent_class
                            ),
                        );
                        node.kind = NodeKind::CustomEvent {
                            params: params_from_outputs(node),
                            name,
                        };
                        report.converted_events += 1;
                        report.structurally_modified = true;
                    }
                }
            }
        }
    }

    /// The class an event implementing `name` binds to: the most distant
    /// ancestor declaring it, else an interface declaring it
    fn event_owner(&self, parent: ClassId, interfaces: &[ClassId], name: &str) -> Option<ClassId> {
        let placeable = |class: ClassId| {
            self.classes
                .get(class)
                .and_then(|c| c.function(name))
                .is_some_and(FunctionDef::can_be_placed_as_event)
        };
        self.classes
            .super_chain(parent)
            .into_iter()
            .filter(|c| placeable(*c))
            .last()
            .or_else(|| {
                interfaces
                    .iter()
                    .find_map(|i| self.classes.find_function(*i, name))
                    .filter(|(_, f)| f.can_be_placed_as_event())
                    .map(|(owner, _)| owner)
            })
    }

    fn all_interfaces(&self, blueprint: &Blueprint, parent: ClassId) -> Vec<ClassId> {
        let mut interfaces: Vec<ClassId> = blueprint
            .implemented_interfaces
            .iter()
            .filter_map(|desc| self.classes.find(&desc.interface))
            .collect();
        for inherited in self.classes.implemented_interfaces(parent) {
            if !interfaces.contains(&inherited) {
                interfaces.push(inherited);
            }
        }
        interfaces
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Implemented interfaces
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate each interface entry and reshape its graphs to the
    /// interface's current functions
    pub fn conform_implemented_interfaces(
        &self,
        blueprint: &mut Blueprint,
        log: &mut CompilerResultsLog,
        report: &mut ConformReport,
    ) -> BlueprintResult<()> {
        let parent = self.classes.find(&blueprint.parent_class);
        let entries = std::mem::take(&mut blueprint.implemented_interfaces);

        for mut desc in entries {
            let interface = self
                .classes
                .find(&desc.interface)
                .filter(|id| self.classes.get(*id).is_some_and(|c| c.is_interface()));
            let Some(interface) = interface else {
                log.error(format!(
                    "{} implements {}, which is not an interface class",
                    blueprint.name, desc.interface
                ));
                blueprint.status = BlueprintStatus::Error;
                report.structurally_modified = true;
                continue;
            };

            if let Some(ancestor) = parent.and_then(|p| self.classes.find_inherited_interface(p, interface)) {
                report.structurally_modified = true;
                if desc.graphs.is_empty() {
                    log.note(format!(
                        "Removed {} from {}: {} already implements it",
                        desc.interface,
                        blueprint.name,
                        self.classes.name_of(ancestor)
                    ));
                } else {
                    promote_interface_implementation(blueprint, desc, self.classes, ancestor, log)?;
                    report.promoted_interfaces += 1;
                }
                continue;
            }

            if self.conform_interface_graphs(blueprint, &mut desc, interface, log) {
                report.structurally_modified = true;
            }
            blueprint.implemented_interfaces.push(desc);
        }
        Ok(())
    }

    /// Reshape one interface entry in place; returns whether anything changed
    fn conform_interface_graphs(
        &self,
        blueprint: &mut Blueprint,
        desc: &mut InterfaceDescription,
        interface: ClassId,
        log: &mut CompilerResultsLog,
    ) -> bool {
        let functions: BTreeMap<&str, &FunctionDef> = self
            .classes
            .all_functions(interface)
            .into_iter()
            .map(|(_, f)| (f.name.as_str(), f))
            .collect();
        let mut modified = false;

        for name in functions.keys() {
            if blueprint.variable(name).is_some() {
                log.error(format!(
                    "Interface function {}::{name} collides with variable {name} of {}",
                    desc.interface, blueprint.name
                ));
                blueprint.status = BlueprintStatus::Error;
            }
        }

        // Events whose function now needs a graph lose their auto-trigger
        let mut taken: Vec<String> = blueprint
            .all_graphs()
            .flat_map(|g| g.nodes.iter())
            .filter_map(|n| n.event_name().map(str::to_string))
            .chain(blueprint.function_graphs.iter().map(|g| g.name.clone()))
            .collect();
        for graph in &mut blueprint.event_graphs {
            for node in &mut graph.nodes {
                let NodeKind::Event {
                    event_name,
                    signature_class: Some(owner),
                    ..
                } = &node.kind
                else {
                    continue;
                };
                if owner != &desc.interface {
                    continue;
                }
                let Some(function) = functions.get(event_name.as_str()) else {
                    continue;
                };
                if function.can_be_placed_as_event() {
                    continue;
                }
                let renamed = unique_name(event_name, &taken);
                log.node_message(
                    Severity::Warning,
                    &node.id,
                    format!(
                        "{}::{event_name} can no longer be an event; it was renamed {renamed} and will not be triggered automatically",
                        desc.interface
                    ),
                );
                taken.push(renamed.clone());
                node.kind = NodeKind::CustomEvent {
                    params: params_from_outputs(node),
                    name: renamed,
                };
                modified = true;
            }
        }

        // Graphs whose function became event-shaped move into the event graph
        let (event_style, kept): (Vec<Graph>, Vec<Graph>) = std::mem::take(&mut desc.graphs)
            .into_iter()
            .partition(|g| functions.get(g.name.as_str()).is_some_and(|f| f.can_be_placed_as_event()));
        desc.graphs = kept;
        for graph in event_style {
            if blueprint.event_graphs.is_empty() {
                blueprint.event_graphs.push(Graph::new("EventGraph"));
            }
            let target = &mut blueprint.event_graphs[0];
            let event_id = move_graph_into_event(target, graph, &desc.interface);
            log.node_message(
                Severity::Note,
                &event_id,
                format!("Interface function implementation moved to an event in {}", target.name),
            );
            modified = true;
        }

        for (name, function) in &functions {
            if function.can_be_placed_as_event() || desc.graphs.iter().any(|g| g.name == *name) {
                continue;
            }
            desc.graphs.push(Graph::function(
                *name,
                function.params.clone(),
                function.outputs.clone(),
            ));
            log.note(format!("Added graph for new interface function {}::{name}", desc.interface));
            modified = true;
        }

        let before = desc.graphs.len();
        desc.graphs.retain(|g| {
            let keep = functions.contains_key(g.name.as_str());
            if !keep {
                log.note(format!(
                    "Removed graph {}: {} no longer declares it",
                    g.name, desc.interface
                ));
            }
            keep
        });
        modified |= desc.graphs.len() != before;
        modified
    }
}

/// Move an interface entry's graphs into the asset's function graphs, where
/// they override the implementation `ancestor` already provides.
///
/// Entry and result nodes are rebuilt against the signature of the
/// overridden function; links survive on every pin that keeps its name.
pub fn promote_interface_implementation(
    blueprint: &mut Blueprint,
    desc: InterfaceDescription,
    classes: &ClassRegistry,
    ancestor: ClassId,
    log: &mut CompilerResultsLog,
) -> BlueprintResult<usize> {
    if desc.graphs.is_empty() {
        return Err(BlueprintError::InvariantViolation(format!(
            "promoting {} on {} with no graphs",
            desc.interface, blueprint.id
        )));
    }

    let ancestor_name = classes.name_of(ancestor).to_string();
    let promoted = desc.graphs.len();
    for mut graph in desc.graphs {
        let overridden = classes
            .find_function(ancestor, &graph.name)
            .or_else(|| classes.find_interface_function(ancestor, &graph.name));
        if let Some((_, function)) = overridden {
            let ctx = NodeContext::new(blueprint, classes);
            rebind_to_override(&mut graph, function, &ctx)?;
        }
        if blueprint.function_graph(&graph.name).is_some() {
            let taken: Vec<String> = blueprint.function_graphs.iter().map(|g| g.name.clone()).collect();
            let renamed = unique_name(&graph.name, &taken);
            log.warning(format!(
                "{} already has a function {}; the promoted implementation was renamed {renamed}",
                blueprint.name, graph.name
            ));
            graph.name = renamed;
        }
        blueprint.function_graphs.push(graph);
    }
    log.note(format!(
        "{} is already implemented by {ancestor_name}; {promoted} graph(s) now override the inherited implementation",
        desc.interface
    ));
    Ok(promoted)
}

/// Swap a graph's entry and result nodes for ones carrying `function`'s signature
fn rebind_to_override(graph: &mut Graph, function: &FunctionDef, ctx: &NodeContext<'_>) -> BlueprintResult<()> {
    let entry = graph.entry_node().map(|n| n.id.clone()).ok_or_else(|| {
        BlueprintError::InvariantViolation(format!("interface graph {} has no entry node", graph.name))
    })?;
    if let Some(node) = graph.get_node_mut(&entry) {
        node.kind = NodeKind::FunctionEntry {
            params: function.params.clone(),
        };
    }
    reconstruct_node(graph, &entry, ctx);

    let result = graph
        .nodes
        .iter()
        .find(|n| matches!(n.kind, NodeKind::FunctionResult { .. }))
        .map(|n| n.id.clone());
    let result = match result {
        Some(id) => {
            if let Some(node) = graph.get_node_mut(&id) {
                node.kind = NodeKind::FunctionResult {
                    outputs: function.outputs.clone(),
                };
            }
            id
        }
        None if function.outputs.is_empty() => return Ok(()),
        None => {
            let id = if graph.get_node(FUNCTION_EXIT_NODE).is_none() {
                FUNCTION_EXIT_NODE.to_string()
            } else {
                graph.unique_node_id("exit")
            };
            graph.nodes.push(Node::new(
                &id,
                NodeKind::FunctionResult {
                    outputs: function.outputs.clone(),
                },
            ));
            id
        }
    };
    reconstruct_node(graph, &result, ctx);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Graph surgery
// ─────────────────────────────────────────────────────────────────────────────

/// Remove a node, joining every exec link into it to every link out of `then`
fn splice_out(graph: &mut Graph, node_id: &str) {
    let sources: Vec<String> = graph
        .connections_to(node_id, PIN_EXEC)
        .into_iter()
        .map(|c| c.from.clone())
        .collect();
    let targets: Vec<String> = graph
        .connections_from(node_id, PIN_THEN)
        .into_iter()
        .map(|c| c.to.clone())
        .collect();
    graph.remove_node(node_id);
    for from in &sources {
        for to in &targets {
            graph.connect(Connection {
                from: from.clone(),
                to: to.clone(),
            });
        }
    }
}

/// Copy a function graph's body into `target` behind a new override event.
///
/// The entry node becomes the event; result nodes and their links are
/// dropped. Returns the id of the event node.
fn move_graph_into_event(target: &mut Graph, graph: Graph, interface: &str) -> String {
    let mut ids: BTreeMap<String, Option<String>> = BTreeMap::new();
    let event_id = target.unique_node_id(&graph.name);

    for node in graph.nodes {
        match node.kind {
            NodeKind::FunctionEntry { .. } => {
                ids.insert(node.id, Some(event_id.clone()));
                let mut event = Node::override_event(event_id.clone(), &graph.name, interface);
                event.pins = node.pins;
                event.position = node.position;
                target.nodes.push(event);
            }
            NodeKind::FunctionResult { .. } => {
                ids.insert(node.id, None);
            }
            _ => {
                let new_id = target.unique_node_id(&format!("{}_{}", graph.name, node.id));
                ids.insert(node.id.clone(), Some(new_id.clone()));
                target.nodes.push(Node { id: new_id, ..node });
            }
        }
    }

    for connection in graph.connections {
        let (Some((from_node, from_pin)), Some((to_node, to_pin))) = (connection.from_parts(), connection.to_parts())
        else {
            continue;
        };
        let (Some(Some(from)), Some(Some(to))) = (ids.get(from_node), ids.get(to_node)) else {
            continue;
        };
        target.connect(Connection::new(from, from_pin, to, to_pin));
    }
    event_id
}

/// Custom-event parameters matching a node's current data outputs
fn params_from_outputs(node: &Node) -> Vec<FunctionParam> {
    node.data_outputs()
        .map(|pin| FunctionParam::new(pin.name.clone(), pin.pin_type.clone()))
        .collect()
}

/// `base` if free, else the first `base_<n>` not in `taken`
fn unique_name(base: &str, taken: &[String]) -> String {
    (1..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| !taken.iter().any(|t| t == candidate))
        .unwrap_or_else(|| base.to_string())
}
