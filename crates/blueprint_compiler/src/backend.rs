//! Compiler backends
//!
//! The orchestrator decides when and in which mode a blueprint is compiled;
//! a `CompilerBackend` does the compiling. `LayoutCompiler` is the reference
//! backend: it derives the class layout from the asset and emits symbolic
//! bytecode, without optimisation or a real VM.
//!
//! Skeleton and full classes are built from one shared layout, so every
//! member of the full class has an identically shaped counterpart on the
//! skeleton.

use std::collections::{BTreeMap, VecDeque};

use blueprint_runtime::{ACTOR_CLASS, ObjectError, ObjectFlags, ObjectModel, ObjectResult, PROP_CAN_EVER_TICK};
use blueprint_types::{
    Blueprint, ClassDef, ClassFlags, ClassId, ClassRegistry, CompileOptions, CompileType, CompilerResultsLog,
    FunctionDef, FunctionFlags, Graph, MemberReference, Node, NodeKind, ObjectId, PIN_EXEC, PinType, PropertyDef,
    PropertyFlags, Script, ScriptOp, Severity, StructDef, USER_CONSTRUCTION_SCRIPT, Value,
};

use crate::graph_signature;

/// Event whose presence makes an actor tick
pub const TICK_EVENT: &str = "ReceiveTick";

/// Classes produced by one backend call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOutput {
    pub skeleton_class: Option<ClassId>,
    /// `None` when the compile failed or did not produce a full class
    pub generated_class: Option<ClassId>,
}

/// Code generation, as seen by the orchestrator
pub trait CompilerBackend: Send + Sync {
    /// Compile `blueprint` in the requested mode.
    ///
    /// Problems go to `results`; a compile that logged errors must not
    /// report a generated class.
    fn compile(
        &self,
        blueprint: &Blueprint,
        options: &CompileOptions,
        results: &mut CompilerResultsLog,
        world: &mut dyn ObjectModel,
    ) -> CompileOutput;

    /// Compile a user-defined structure; returns whether it succeeded
    fn compile_user_defined_structure(&self, def: &StructDef, results: &mut CompilerResultsLog) -> bool;
}

// ─────────────────────────────────────────────────────────────────────────────
// Layout
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct ClassLayout {
    super_class: ClassId,
    flags: ClassFlags,
    interfaces: Vec<ClassId>,
    properties: Vec<PropertyDef>,
    functions: Vec<FunctionDef>,
}

impl ClassLayout {
    fn into_class(self, name: String, generated_by: &str, extra_flags: ClassFlags) -> ClassDef {
        ClassDef {
            id: ClassId(0),
            name,
            super_class: Some(self.super_class),
            flags: self.flags | extra_flags,
            interfaces: self.interfaces,
            properties: self.properties,
            functions: self.functions,
            default_object: None,
            generated_by: Some(generated_by.to_string()),
        }
    }

    fn declares_function(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f.name == name)
    }

    /// Whether `class` already has exactly this layout
    fn matches(&self, class: &ClassDef) -> bool {
        self.properties.len() == class.properties.len()
            && self.functions.len() == class.functions.len()
            && self
                .properties
                .iter()
                .all(|p| class.property(&p.name).is_some_and(|c| c.ty == p.ty))
            && self
                .functions
                .iter()
                .all(|f| class.function(&f.name).is_some_and(|c| c.signature_matches(f)))
    }
}

/// Graphs that become functions on the class
fn function_graphs(blueprint: &Blueprint) -> impl Iterator<Item = &Graph> {
    let is_interface = blueprint.is_interface();
    blueprint
        .function_graphs
        .iter()
        .filter(move |g| !(is_interface && g.name == USER_CONSTRUCTION_SCRIPT))
        .chain(blueprint.implemented_interfaces.iter().flat_map(|i| i.graphs.iter()))
}

fn build_layout(blueprint: &Blueprint, classes: &ClassRegistry, results: &mut CompilerResultsLog) -> Option<ClassLayout> {
    let Some(parent) = classes.find(&blueprint.parent_class) else {
        results.error(format!(
            "Parent class {} of {} not found",
            blueprint.parent_class, blueprint.name
        ));
        return None;
    };
    let parent_def = classes.get(parent)?;

    let mut flags = (parent_def.flags & ClassFlags::SCRIPT_INHERIT) | ClassFlags::COMPILED_FROM_BLUEPRINT;
    if blueprint.is_interface() {
        flags |= ClassFlags::INTERFACE;
    }

    let mut interfaces = Vec::new();
    for desc in &blueprint.implemented_interfaces {
        match classes.find(&desc.interface) {
            Some(id) if classes.get(id).is_some_and(|c| c.is_interface()) => interfaces.push(id),
            _ => results.error(format!(
                "Interface {} implemented by {} not found",
                desc.interface, blueprint.name
            )),
        }
    }

    let mut properties = Vec::new();
    for variable in &blueprint.variables {
        if classes.find_property(parent, &variable.name).is_some() {
            results.error(format!(
                "Variable {} of {} hides an inherited property",
                variable.name, blueprint.name
            ));
            continue;
        }
        properties.push(PropertyDef {
            name: variable.name.clone(),
            ty: variable.var_type.clone(),
            flags: variable.flags,
        });
    }
    for component in &blueprint.components {
        if classes.find(&component.class).is_none() {
            results.error(format!(
                "Component {} of {} has unknown class {}",
                component.name, blueprint.name, component.class
            ));
            continue;
        }
        properties.push(
            PropertyDef::new(&component.name, PinType::object(&component.class))
                .with_flags(PropertyFlags::BLUEPRINT_VISIBLE | PropertyFlags::INSTANCED_REFERENCE),
        );
    }

    let mut all_interfaces = interfaces.clone();
    for inherited in classes.implemented_interfaces(parent) {
        if !all_interfaces.contains(&inherited) {
            all_interfaces.push(inherited);
        }
    }
    let inherited = |name: &str| {
        classes
            .find_function(parent, name)
            .map(|(_, f)| f)
            .filter(|f| f.can_override())
            .or_else(|| {
                all_interfaces
                    .iter()
                    .find_map(|i| classes.find_function(*i, name))
                    .map(|(_, f)| f)
            })
    };

    let mut functions: Vec<FunctionDef> = Vec::new();
    let mut declare = |function: FunctionDef, results: &mut CompilerResultsLog| {
        if functions.iter().any(|f| f.name == function.name) {
            results.error(format!("{} declares {} more than once", blueprint.name, function.name));
        } else {
            functions.push(function);
        }
    };

    for graph in function_graphs(blueprint) {
        let (params, outputs) = graph_signature(graph);
        let flags = match inherited(&graph.name) {
            Some(overridden) => overridden.flags,
            None if blueprint.is_interface() => FunctionFlags::BLUEPRINT_EVENT | FunctionFlags::BLUEPRINT_CALLABLE,
            None => FunctionFlags::BLUEPRINT_CALLABLE,
        };
        declare(
            FunctionDef {
                name: graph.name.clone(),
                params,
                outputs,
                flags,
                script: None,
            },
            results,
        );
    }

    for node in blueprint.event_graphs.iter().flat_map(|g| g.nodes.iter()) {
        match &node.kind {
            NodeKind::Event { event_name, .. } => match inherited(event_name) {
                Some(overridden) => declare(
                    FunctionDef {
                        name: event_name.clone(),
                        params: overridden.params.clone(),
                        outputs: Vec::new(),
                        flags: overridden.flags,
                        script: None,
                    },
                    results,
                ),
                None => results.node_message(
                    Severity::Error,
                    &node.id,
                    format!("Event {} in {} does not override an inherited function", event_name, blueprint.name),
                ),
            },
            NodeKind::CustomEvent { name, params } => declare(
                FunctionDef {
                    name: name.clone(),
                    params: params.clone(),
                    outputs: Vec::new(),
                    flags: FunctionFlags::CUSTOM_EVENT | FunctionFlags::BLUEPRINT_CALLABLE,
                    script: None,
                },
                results,
            ),
            _ => {}
        }
    }

    Some(ClassLayout {
        super_class: parent,
        flags,
        interfaces,
        properties,
        functions,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Bytecode
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves node references while emitting bytecode
struct BodyCompiler<'a> {
    blueprint: &'a Blueprint,
    layout: &'a ClassLayout,
    classes: &'a ClassRegistry,
    /// Stand-in for the class being compiled
    self_class: ClassId,
}

impl BodyCompiler<'_> {
    fn compile_all(&self, results: &mut CompilerResultsLog) -> BTreeMap<String, Script> {
        let mut scripts = BTreeMap::new();
        if self.blueprint.is_interface() {
            return scripts;
        }

        for graph in function_graphs(self.blueprint) {
            let mut ops = vec![ScriptOp::Entry {
                event: graph.name.clone(),
            }];
            ops.extend(graph.nodes.iter().filter_map(|n| self.compile_node(n, results)));
            scripts.insert(graph.name.clone(), Script::new(ops));
        }

        for graph in &self.blueprint.event_graphs {
            for event in &graph.nodes {
                let Some(name) = event.event_name() else {
                    continue;
                };
                let mut ops = vec![ScriptOp::Entry { event: name.to_string() }];
                ops.extend(
                    reachable_nodes(graph, &event.id)
                        .into_iter()
                        .filter_map(|n| self.compile_node(n, results)),
                );
                scripts.insert(name.to_string(), Script::new(ops));
            }
        }
        scripts
    }

    fn compile_node(&self, node: &Node, results: &mut CompilerResultsLog) -> Option<ScriptOp> {
        let op = match &node.kind {
            NodeKind::CallFunction { target } => self.resolve_call(target).map(|class| ScriptOp::CallFunction {
                class,
                function: target.member_name.clone(),
            }),
            NodeKind::CallParentFunction { target } => self
                .parent()
                .and_then(|parent| self.classes.find_function(parent, &target.member_name))
                .map(|(class, _)| ScriptOp::CallParent {
                    class,
                    function: target.member_name.clone(),
                }),
            NodeKind::VariableGet { variable } => self.resolve_variable(variable).map(|class| ScriptOp::ReadVariable {
                class,
                property: variable.clone(),
            }),
            NodeKind::VariableSet { variable } => self.resolve_variable(variable).map(|class| ScriptOp::WriteVariable {
                class,
                property: variable.clone(),
            }),
            NodeKind::Generic { node_type, .. } => Some(ScriptOp::Native {
                node_type: node_type.clone(),
            }),
            NodeKind::FunctionEntry { .. }
            | NodeKind::FunctionResult { .. }
            | NodeKind::Event { .. }
            | NodeKind::CustomEvent { .. } => return None,
        };
        if op.is_none() {
            results.node_message(
                Severity::Error,
                &node.id,
                format!("Could not resolve {} in {}", describe_reference(&node.kind), self.blueprint.name),
            );
        }
        op
    }

    fn parent(&self) -> Option<ClassId> {
        self.classes.find(&self.blueprint.parent_class)
    }

    fn resolve_call(&self, target: &MemberReference) -> Option<ClassId> {
        let name = target.member_name.as_str();
        if let Some(owner) = &target.member_parent {
            let owner = self.classes.find(owner)?;
            return self.classes.find_function(owner, name).map(|(class, _)| class);
        }
        if self.layout.declares_function(name) {
            return Some(self.self_class);
        }
        let parent = self.parent()?;
        self.classes
            .find_function(parent, name)
            .or_else(|| self.classes.find_interface_function(parent, name))
            .or_else(|| {
                self.layout
                    .interfaces
                    .iter()
                    .find_map(|i| self.classes.find_function(*i, name))
            })
            .map(|(class, _)| class)
    }

    fn resolve_variable(&self, name: &str) -> Option<ClassId> {
        if self.layout.properties.iter().any(|p| p.name == name) {
            return Some(self.self_class);
        }
        self.parent()
            .and_then(|parent| self.classes.find_property(parent, name))
            .map(|(class, _)| class)
    }
}

fn describe_reference(kind: &NodeKind) -> String {
    match kind {
        NodeKind::CallFunction { target } | NodeKind::CallParentFunction { target } => match &target.member_parent {
            Some(owner) => format!("function {}::{}", owner, target.member_name),
            None => format!("function {}", target.member_name),
        },
        NodeKind::VariableGet { variable } | NodeKind::VariableSet { variable } => format!("variable {}", variable),
        _ => "node".to_string(),
    }
}

/// Nodes executed by the event starting at `start`, breadth first: everything
/// downstream of it plus the data nodes feeding those
fn reachable_nodes<'g>(graph: &'g Graph, start: &str) -> Vec<&'g Node> {
    let mut seen = vec![start.to_string()];
    let mut queue = VecDeque::from([start.to_string()]);
    let mut order = Vec::new();

    while let Some(current) = queue.pop_front() {
        let mut next = Vec::new();
        for connection in &graph.connections {
            let (Some((from, _)), Some((to, to_pin))) = (connection.from_parts(), connection.to_parts()) else {
                continue;
            };
            if from == current {
                next.push(to);
            } else if to == current && to_pin != PIN_EXEC {
                next.push(from);
            }
        }
        for id in next {
            if seen.iter().any(|s| s == id) {
                continue;
            }
            seen.push(id.to_string());
            let Some(node) = graph.get_node(id) else {
                continue;
            };
            if node.event_name().is_some() {
                continue;
            }
            order.push(node);
            queue.push_back(id.to_string());
        }
    }
    order
}

// ─────────────────────────────────────────────────────────────────────────────
// Default Objects
// ─────────────────────────────────────────────────────────────────────────────

fn set_property(world: &mut dyn ObjectModel, object: ObjectId, name: &str, value: Value) -> ObjectResult<()> {
    world
        .object_mut(object)
        .ok_or(ObjectError::ObjectNotFound(object))?
        .set(name, value);
    Ok(())
}

/// Write the asset's declared variable defaults onto a default object
pub fn apply_variable_defaults(
    world: &mut dyn ObjectModel,
    blueprint: &Blueprint,
    cdo: ObjectId,
    results: &mut CompilerResultsLog,
) -> ObjectResult<()> {
    for variable in &blueprint.variables {
        let Some(json) = &variable.default else {
            continue;
        };
        match Value::from_json_typed(json, &variable.var_type) {
            Ok(value) => set_property(world, cdo, &variable.name, value)?,
            Err(err) => results.warning(format!(
                "Default value of {}.{} ignored: {}",
                blueprint.name, variable.name, err
            )),
        }
    }
    Ok(())
}

/// Write everything the asset declares about its default object: variable
/// defaults, one default subobject per component template, and the tick flag
/// of actor classes.
///
/// Also run after default-object migration so values edited in the asset win
/// over the values carried from the previous default object.
pub fn apply_asset_defaults(
    world: &mut dyn ObjectModel,
    blueprint: &Blueprint,
    cdo: ObjectId,
    results: &mut CompilerResultsLog,
) -> ObjectResult<()> {
    let class = world
        .object(cdo)
        .map(|o| o.class)
        .ok_or(ObjectError::ObjectNotFound(cdo))?;
    apply_variable_defaults(world, blueprint, cdo, results)?;

    for component in &blueprint.components {
        let component_class = world.classes().resolve(&component.class)?;
        let existing = world
            .default_subobjects(cdo)
            .into_iter()
            .find(|id| world.object(*id).is_some_and(|o| o.name == component.name));
        let subobject = match existing {
            Some(sub) if world.object(sub).is_some_and(|o| o.class == component_class) => sub,
            stale => {
                if let Some(sub) = stale {
                    world.destroy(sub);
                }
                world.spawn(component_class, &component.name, Some(cdo), ObjectFlags::DEFAULT_SUBOBJECT)?
            }
        };
        for (name, json) in &component.properties {
            set_property(world, subobject, name, Value::from(json.clone()))?;
        }
        set_property(world, cdo, &component.name, Value::Object(Some(subobject)))?;
    }

    let is_actor = world
        .classes()
        .find_first_native_class(class)
        .is_some_and(|native| world.classes().name_of(native) == ACTOR_CLASS);
    if is_actor
        && blueprint.has_event(TICK_EVENT)
        && world.classes().find_property(class, PROP_CAN_EVER_TICK).is_some()
    {
        set_property(world, cdo, PROP_CAN_EVER_TICK, Value::Bool(true))?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Layout Compiler
// ─────────────────────────────────────────────────────────────────────────────

/// Reference backend producing classes and symbolic bytecode
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutCompiler;

impl LayoutCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Retire the current version of a class so a new one can take its name
    fn retire(world: &mut dyn ObjectModel, class: Option<ClassId>) {
        let Some(class) = class.filter(|id| world.classes().get(*id).is_some_and(|c| !c.is_retired())) else {
            return;
        };
        if let Ok(name) = world.classes_mut().retire(class) {
            tracing::debug!(%class, name = %name, "retired class");
        }
    }

    fn register_skeleton(
        &self,
        blueprint: &Blueprint,
        layout: ClassLayout,
        results: &mut CompilerResultsLog,
        world: &mut dyn ObjectModel,
    ) -> ClassId {
        Self::retire(world, blueprint.state.skeleton_class);
        let class = world.classes_mut().register(layout.into_class(
            blueprint.skeleton_class_name(),
            &blueprint.id,
            ClassFlags::SKELETON,
        ));
        let seeded = world
            .create_default_object(class)
            .and_then(|cdo| apply_variable_defaults(world, blueprint, cdo, results));
        if let Err(err) = seeded {
            results.error(format!("Could not create the skeleton default object of {}: {}", blueprint.name, err));
        }
        tracing::debug!(blueprint = %blueprint.id, %class, "compiled skeleton class");
        class
    }

    fn compile_skeleton(
        &self,
        blueprint: &Blueprint,
        results: &mut CompilerResultsLog,
        world: &mut dyn ObjectModel,
    ) -> CompileOutput {
        let skeleton_class = build_layout(blueprint, world.classes(), results)
            .map(|layout| self.register_skeleton(blueprint, layout, results, world));
        CompileOutput {
            skeleton_class,
            generated_class: blueprint.state.generated_class,
        }
    }

    fn compile_full(
        &self,
        blueprint: &Blueprint,
        results: &mut CompilerResultsLog,
        world: &mut dyn ObjectModel,
    ) -> CompileOutput {
        let errors_before = results.num_errors;
        let Some(layout) = build_layout(blueprint, world.classes(), results) else {
            return CompileOutput::default();
        };
        let skeleton = self.register_skeleton(blueprint, layout.clone(), results, world);
        let skeleton_class = Some(skeleton);

        let mut scripts = BodyCompiler {
            blueprint,
            layout: &layout,
            classes: world.classes(),
            self_class: skeleton,
        }
        .compile_all(results);
        if results.num_errors > errors_before {
            tracing::error!(blueprint = %blueprint.id, errors = results.num_errors - errors_before, "compile failed");
            return CompileOutput {
                skeleton_class,
                generated_class: None,
            };
        }

        Self::retire(world, blueprint.state.generated_class);
        let class = world.classes_mut().register(layout.into_class(
            blueprint.generated_class_name(),
            &blueprint.id,
            ClassFlags::empty(),
        ));
        if let Some(def) = world.classes_mut().get_mut(class) {
            for function in &mut def.functions {
                if let Some(mut script) = scripts.remove(&function.name) {
                    for op in &mut script.ops {
                        if op.class() == Some(skeleton) {
                            op.set_class(class);
                        }
                    }
                    function.script = Some(script);
                }
            }
        }

        let seeded = world
            .create_default_object(class)
            .and_then(|cdo| apply_asset_defaults(world, blueprint, cdo, results));
        if let Err(err) = seeded {
            results.error(format!("Could not create the default object of {}: {}", blueprint.name, err));
            return CompileOutput {
                skeleton_class,
                generated_class: None,
            };
        }

        tracing::info!(
            blueprint = %blueprint.id,
            class = %blueprint.generated_class_name(),
            id = %class,
            "compiled class"
        );
        CompileOutput {
            skeleton_class,
            generated_class: Some(class),
        }
    }

    fn compile_bytecode(
        &self,
        blueprint: &Blueprint,
        results: &mut CompilerResultsLog,
        world: &mut dyn ObjectModel,
    ) -> CompileOutput {
        let skeleton_class = blueprint.state.skeleton_class;
        let errors_before = results.num_errors;
        let Some(class) = blueprint
            .state
            .generated_class
            .filter(|id| world.classes().get(*id).is_some_and(|c| !c.is_retired()))
        else {
            results.error(format!("{} has no generated class; a full compile is required", blueprint.name));
            return CompileOutput {
                skeleton_class,
                generated_class: None,
            };
        };
        let Some(layout) = build_layout(blueprint, world.classes(), results) else {
            return CompileOutput {
                skeleton_class,
                generated_class: None,
            };
        };
        if !world.classes().get(class).is_some_and(|def| layout.matches(def)) {
            results.error(format!("The layout of {} changed; a full compile is required", blueprint.name));
            return CompileOutput {
                skeleton_class,
                generated_class: None,
            };
        }

        let mut scripts = BodyCompiler {
            blueprint,
            layout: &layout,
            classes: world.classes(),
            self_class: class,
        }
        .compile_all(results);
        if results.num_errors > errors_before {
            return CompileOutput {
                skeleton_class,
                generated_class: None,
            };
        }

        if let Some(def) = world.classes_mut().get_mut(class) {
            for function in &mut def.functions {
                if let Some(script) = scripts.remove(&function.name) {
                    function.script = Some(script);
                }
            }
        }
        tracing::debug!(blueprint = %blueprint.id, %class, "recompiled bytecode");
        CompileOutput {
            skeleton_class,
            generated_class: Some(class),
        }
    }
}

impl CompilerBackend for LayoutCompiler {
    fn compile(
        &self,
        blueprint: &Blueprint,
        options: &CompileOptions,
        results: &mut CompilerResultsLog,
        world: &mut dyn ObjectModel,
    ) -> CompileOutput {
        match options.compile_type {
            CompileType::SkeletonOnly => self.compile_skeleton(blueprint, results, world),
            CompileType::BytecodeOnly => self.compile_bytecode(blueprint, results, world),
            CompileType::Full => self.compile_full(blueprint, results, world),
        }
    }

    fn compile_user_defined_structure(&self, def: &StructDef, results: &mut CompilerResultsLog) -> bool {
        match def.validate() {
            Ok(()) => true,
            Err(errors) => {
                for error in errors {
                    results.error(format!("Structure {}: {}", def.name, error));
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint_runtime::ObjectWorld;
    use blueprint_types::{
        ComponentTemplate, Connection, FunctionParam, PIN_THEN, StructField, VariableDef,
    };

    fn world() -> ObjectWorld {
        let mut world = ObjectWorld::new();
        let object = world
            .register_class(ClassDef::new("Object").with_flags(ClassFlags::NATIVE))
            .unwrap();
        world
            .register_class(
                ClassDef::new("SceneComponent")
                    .with_super(object)
                    .with_flags(ClassFlags::NATIVE)
                    .with_property(PropertyDef::new("Visible", PinType::Boolean)),
            )
            .unwrap();
        world
            .register_class(
                ClassDef::new(ACTOR_CLASS)
                    .with_super(object)
                    .with_flags(ClassFlags::NATIVE | ClassFlags::CONFIG)
                    .with_property(PropertyDef::new(PROP_CAN_EVER_TICK, PinType::Boolean))
                    .with_function(FunctionDef::event(TICK_EVENT).with_param(FunctionParam::new("DeltaSeconds", PinType::Real)))
                    .with_function(FunctionDef::new("Destroy")),
            )
            .unwrap();
        world
    }

    fn door() -> Blueprint {
        let mut bp = Blueprint::new("bp-door", "Door", ACTOR_CLASS)
            .with_variable(VariableDef::new("Angle", PinType::Real).with_default(serde_json::json!(90.0)))
            .with_component(
                ComponentTemplate::new("Hinge", "SceneComponent").with_property("Visible", serde_json::json!(true)),
            );
        let graph = &mut bp.event_graphs[0];
        graph.nodes.push(Node::override_event("tick", TICK_EVENT, ACTOR_CLASS));
        graph.nodes.push(Node::new("read", NodeKind::VariableGet { variable: "Angle".into() }));
        graph.nodes.push(Node::new(
            "destroy",
            NodeKind::CallFunction {
                target: MemberReference::self_member("Destroy"),
            },
        ));
        graph.connections.push(Connection::new("tick", PIN_THEN, "destroy", PIN_EXEC));
        graph.connections.push(Connection::new("read", "Angle", "destroy", "Angle"));
        bp
    }

    #[test]
    fn test_full_compile_builds_class_and_defaults() {
        let mut world = world();
        let bp = door();
        let mut log = CompilerResultsLog::new();

        let output = LayoutCompiler.compile(&bp, &CompileOptions::full(), &mut log, &mut world);
        assert!(!log.has_errors(), "{:?}", log.messages);
        let class = output.generated_class.unwrap();
        let def = world.classes().get(class).unwrap();
        assert_eq!(def.name, "Door_C");
        assert!(def.flags.contains(ClassFlags::CONFIG | ClassFlags::COMPILED_FROM_BLUEPRINT));
        assert_eq!(def.generated_by.as_deref(), Some("bp-door"));

        let tick = def.function(TICK_EVENT).unwrap();
        let ops = &tick.script.as_ref().unwrap().ops;
        let actor = world.classes().find(ACTOR_CLASS).unwrap();
        assert_eq!(ops[0], ScriptOp::Entry { event: TICK_EVENT.into() });
        assert!(ops.contains(&ScriptOp::CallFunction { class: actor, function: "Destroy".into() }));
        assert!(ops.contains(&ScriptOp::ReadVariable { class, property: "Angle".into() }));

        let cdo = world.default_object(class).unwrap();
        assert_eq!(world.property(cdo, "Angle"), Some(&Value::Float(90.0)));
        assert_eq!(world.property(cdo, PROP_CAN_EVER_TICK), Some(&Value::Bool(true)));
        let hinge = world.property(cdo, "Hinge").and_then(Value::as_object).unwrap();
        assert_eq!(world.property(hinge, "Visible"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_skeleton_matches_full_layout() {
        let mut world = world();
        let bp = door();
        let mut log = CompilerResultsLog::new();
        let output = LayoutCompiler.compile(&bp, &CompileOptions::full(), &mut log, &mut world);

        let skeleton = world.classes().get(output.skeleton_class.unwrap()).unwrap();
        let full = world.classes().get(output.generated_class.unwrap()).unwrap();
        assert!(skeleton.flags.contains(ClassFlags::SKELETON));
        assert_eq!(skeleton.properties, full.properties);
        for function in &full.functions {
            assert!(skeleton.function(&function.name).unwrap().signature_matches(function));
            assert!(skeleton.function(&function.name).unwrap().script.is_none());
        }
    }

    #[test]
    fn test_unresolved_call_fails_compile() {
        let mut world = world();
        let mut bp = door();
        bp.event_graphs[0].nodes.push(Node::new(
            "missing",
            NodeKind::CallFunction {
                target: MemberReference::external("Explode", ACTOR_CLASS),
            },
        ));
        bp.event_graphs[0]
            .connections
            .push(Connection::new("destroy", PIN_THEN, "missing", PIN_EXEC));
        let mut log = CompilerResultsLog::new();

        let output = LayoutCompiler.compile(&bp, &CompileOptions::full(), &mut log, &mut world);
        assert!(output.generated_class.is_none());
        assert!(output.skeleton_class.is_some());
        assert_eq!(log.num_errors, 1);
        assert_eq!(log.messages[0].node.as_deref(), Some("missing"));
    }

    #[test]
    fn test_missing_parent_is_an_error() {
        let mut world = world();
        let bp = Blueprint::new("bp", "Orphan", "Nowhere");
        let mut log = CompilerResultsLog::new();
        let output = LayoutCompiler.compile(&bp, &CompileOptions::skeleton_only(), &mut log, &mut world);
        assert!(output.skeleton_class.is_none());
        assert!(log.has_errors());
    }

    #[test]
    fn test_bytecode_only_requires_matching_layout() {
        let mut world = world();
        let mut bp = door();
        let mut log = CompilerResultsLog::new();
        let output = LayoutCompiler.compile(&bp, &CompileOptions::full(), &mut log, &mut world);
        bp.state.skeleton_class = output.skeleton_class;
        bp.state.generated_class = output.generated_class;

        let output = LayoutCompiler.compile(&bp, &CompileOptions::bytecode_only(), &mut log, &mut world);
        assert_eq!(output.generated_class, bp.state.generated_class);
        assert!(!log.has_errors());

        bp.variables.push(VariableDef::new("Extra", PinType::Integer));
        let output = LayoutCompiler.compile(&bp, &CompileOptions::bytecode_only(), &mut log, &mut world);
        assert!(output.generated_class.is_none());
        assert!(log.has_errors());
    }

    #[test]
    fn test_structure_compile_reports_bad_defaults() {
        let good = StructDef::new("hit", "Hit").with_field(StructField::new("Damage", PinType::Real));
        let bad = StructDef::new("bad", "Bad")
            .with_field(StructField::new("Damage", PinType::Real).with_default(serde_json::json!("lots")));
        let mut log = CompilerResultsLog::new();
        assert!(LayoutCompiler.compile_user_defined_structure(&good, &mut log));
        assert!(!LayoutCompiler.compile_user_defined_structure(&bad, &mut log));
        assert!(log.has_errors());
    }
}
