//! Whole-asset node refresh
//!
//! Nodes that change the asset's signature (entries, events, custom events)
//! are reconstructed first. The skeleton class is recompiled as soon as the
//! last of them is done, so that every other node resolves against the new
//! signatures, and once more at the end if the asset only held structural
//! nodes.

use blueprint_runtime::ObjectModel;
use blueprint_types::{Blueprint, CompilerResultsLog};

use crate::{BlueprintError, BlueprintResult, CompileOrchestrator, NodeContext, reconstruct_node};

/// A node captured by the refresh snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    /// Position of the owning graph in `Blueprint::all_graphs` order
    pub graph: usize,
    pub node: String,
    pub structural: bool,
}

/// Snapshot every node of the asset, in graph order
pub fn snapshot_nodes(blueprint: &Blueprint) -> Vec<NodeRef> {
    blueprint
        .all_graphs()
        .enumerate()
        .flat_map(|(graph, g)| {
            g.nodes.iter().map(move |n| NodeRef {
                graph,
                node: n.id.clone(),
                structural: n.causes_structural_change(),
            })
        })
        .collect()
}

/// Structural nodes first; relative order is otherwise kept
pub fn sort_for_refresh(nodes: &mut [NodeRef]) {
    nodes.sort_by_key(|n| !n.structural);
}

pub fn is_refresh_ordered(nodes: &[NodeRef]) -> bool {
    nodes.windows(2).all(|w| w[0].structural || !w[1].structural)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub reconstructed: usize,
    pub skeleton_recompiles: usize,
}

/// Reconstruct every node of the asset against the current classes
pub fn refresh_all_nodes(
    blueprint: &mut Blueprint,
    world: &mut dyn ObjectModel,
    orchestrator: &CompileOrchestrator,
    log: &mut CompilerResultsLog,
) -> BlueprintResult<RefreshReport> {
    let mut nodes = snapshot_nodes(blueprint);
    sort_for_refresh(&mut nodes);

    let recompiles = !blueprint.is_macro_library();
    let mut report = RefreshReport::default();
    let mut last_structural = true;

    for node in &nodes {
        if last_structural && !node.structural {
            if recompiles {
                orchestrator.compile_skeleton(blueprint, world, log);
                report.skeleton_recompiles += 1;
            }
        } else if !last_structural && node.structural {
            return Err(BlueprintError::InvariantViolation(format!(
                "structural node {} refreshed after non-structural nodes in {}",
                node.node, blueprint.id
            )));
        }
        last_structural = node.structural;

        let ctx = NodeContext::new(blueprint, world.classes());
        let Some(graph) = blueprint.all_graphs_mut().nth(node.graph) else {
            continue;
        };
        if reconstruct_node(graph, &node.node, &ctx) {
            report.reconstructed += 1;
        }
    }

    if last_structural && recompiles {
        orchestrator.compile_skeleton(blueprint, world, log);
        report.skeleton_recompiles += 1;
    }

    tracing::debug!(
        blueprint = %blueprint.id,
        nodes = nodes.len(),
        reconstructed = report.reconstructed,
        recompiles = report.skeleton_recompiles,
        "refreshed all nodes"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LayoutCompiler;
    use blueprint_runtime::ObjectWorld;
    use blueprint_types::{
        BlueprintType, ClassDef, ClassFlags, FunctionDef, FunctionParam, Graph, MemberReference, Node, NodeKind,
        PinType,
    };

    fn world() -> ObjectWorld {
        let mut world = ObjectWorld::new();
        let object = world
            .register_class(ClassDef::new("Object").with_flags(ClassFlags::NATIVE))
            .unwrap();
        world
            .register_class(
                ClassDef::new("Actor")
                    .with_super(object)
                    .with_flags(ClassFlags::NATIVE)
                    .with_function(FunctionDef::event("ReceiveBeginPlay"))
                    .with_function(
                        FunctionDef::new("SetHidden").with_param(FunctionParam::new("Hidden", PinType::Boolean)),
                    ),
            )
            .unwrap();
        world
    }

    fn node(id: usize, structural: bool) -> NodeRef {
        NodeRef {
            graph: 0,
            node: format!("n{id}"),
            structural,
        }
    }

    fn permutations(items: &mut Vec<NodeRef>, k: usize, out: &mut Vec<Vec<NodeRef>>) {
        if k <= 1 {
            out.push(items.clone());
            return;
        }
        permutations(items, k - 1, out);
        for i in 0..k - 1 {
            if k % 2 == 0 {
                items.swap(i, k - 1);
            } else {
                items.swap(0, k - 1);
            }
            permutations(items, k - 1, out);
        }
    }

    #[test]
    fn test_structural_sort_is_ordered_and_stable_for_every_permutation() {
        let mut items = vec![node(0, true), node(1, false), node(2, true), node(3, false), node(4, false)];
        let mut all = Vec::new();
        let len = items.len();
        permutations(&mut items, len, &mut all);
        assert_eq!(all.len(), 120);

        for permutation in all {
            let mut sorted = permutation.clone();
            sort_for_refresh(&mut sorted);
            assert!(is_refresh_ordered(&sorted));

            for structural in [true, false] {
                let expected: Vec<_> = permutation.iter().filter(|n| n.structural == structural).collect();
                let actual: Vec<_> = sorted.iter().filter(|n| n.structural == structural).collect();
                assert_eq!(expected, actual);
            }
        }
    }

    #[test]
    fn test_unordered_input_is_detected() {
        assert!(!is_refresh_ordered(&[node(0, false), node(1, true)]));
        assert!(is_refresh_ordered(&[node(0, true), node(1, false)]));
        assert!(is_refresh_ordered(&[]));
    }

    fn count_recompiles(blueprint: &mut Blueprint) -> usize {
        let mut world = world();
        let orchestrator = CompileOrchestrator::new(LayoutCompiler);
        refresh_all_nodes(blueprint, &mut world, &orchestrator, &mut CompilerResultsLog::new())
            .unwrap()
            .skeleton_recompiles
    }

    fn call(id: &str) -> Node {
        Node::new(
            id,
            NodeKind::CallFunction {
                target: MemberReference::external("SetHidden", "Actor"),
            },
        )
    }

    #[test]
    fn test_skeleton_recompiles_at_boundary_and_end() {
        // Entry of the construction script makes every asset start structural
        let mut mixed = Blueprint::new("bp", "Door", "Actor").with_event_graph(
            Graph::new("Events")
                .with_node(Node::override_event("begin", "ReceiveBeginPlay", "Actor"))
                .with_node(call("hide")),
        );
        assert_eq!(count_recompiles(&mut mixed), 1);

        let mut structural_only = Blueprint::new("bp", "Door", "Actor");
        assert_eq!(count_recompiles(&mut structural_only), 1);

        let mut empty = Blueprint::new("bp", "Door", "Actor");
        empty.function_graphs.clear();
        empty.event_graphs.clear();
        assert_eq!(count_recompiles(&mut empty), 1);

        let mut calls_only = Blueprint::new("bp", "Door", "Actor");
        calls_only.function_graphs.clear();
        calls_only.event_graphs = vec![Graph::new("Events").with_node(call("a")).with_node(call("b"))];
        assert_eq!(count_recompiles(&mut calls_only), 1);
    }

    #[test]
    fn test_macro_libraries_never_recompile() {
        let mut library = Blueprint::new("lib", "Helpers", "Actor")
            .with_type(BlueprintType::MacroLibrary)
            .with_event_graph(Graph::new("Macros").with_node(call("hide")));
        assert_eq!(count_recompiles(&mut library), 0);
        assert!(library.state.skeleton_class.is_none());
    }

    #[test]
    fn test_refresh_rebuilds_call_pins() {
        let mut bp = Blueprint::new("bp", "Door", "Actor");
        bp.event_graphs = vec![Graph::new("Events").with_node(call("hide"))];
        let mut world = world();
        let orchestrator = CompileOrchestrator::new(LayoutCompiler);
        let report =
            refresh_all_nodes(&mut bp, &mut world, &orchestrator, &mut CompilerResultsLog::new()).unwrap();

        assert!(report.reconstructed >= 1);
        let node = bp.event_graphs[0].get_node("hide").unwrap();
        assert!(node.find_pin("Hidden").is_some());
    }
}
