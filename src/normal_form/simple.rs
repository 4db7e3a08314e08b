//! The generic normal form: common subexpression elimination.

use crate::error::Result;
use crate::graph::{Graph, NodeId, Origin, RegionId, User};
use crate::normal_form::Flag;
use crate::operation::Operation;

/// Find a node in `region` computing `operation` over exactly `operands`.
///
/// Candidates are the users of the first operand, or the region's top
/// nodes for nullary operations.
pub(crate) fn find_equivalent(
    graph: &Graph,
    region: RegionId,
    operation: &Operation,
    operands: &[Origin],
    exclude: Option<NodeId>,
) -> Option<NodeId> {
    let matches = |candidate: NodeId| {
        if Some(candidate) == exclude {
            return false;
        }
        let node = graph.node(candidate);
        !node.is_structural()
            && node.operation() == operation
            && node.ninputs() == operands.len()
            && node
                .inputs()
                .iter()
                .zip(operands)
                .all(|(input, &origin)| input.origin() == origin)
    };
    match operands.first() {
        Some(&first) => graph
            .users(first)
            .iter()
            .filter_map(|user| match user {
                User::Input(input) if input.index == 0 => Some(input.node),
                _ => None,
            })
            .find(|&n| matches(n)),
        None => graph.region(region).top_nodes().iter().copied().find(|&n| matches(n)),
    }
}

/// Return the outputs of an equivalent node when `cse` allows it,
/// otherwise create a new node.
pub(crate) fn create_or_reuse(
    graph: &mut Graph,
    region: RegionId,
    operation: Operation,
    operands: &[Origin],
    cse: bool,
) -> Result<Vec<Origin>> {
    if cse {
        if let Some(existing) = find_equivalent(graph, region, &operation, operands, None) {
            tracing::trace!(node = ?existing, %operation, "reused");
            return Ok(graph.outputs_of(existing));
        }
    }
    let node = graph.create_node(region, operation, operands)?;
    Ok(graph.outputs_of(node))
}

pub(crate) fn normalized_create(
    graph: &mut Graph,
    region: RegionId,
    operation: Operation,
    operands: &[Origin],
) -> Result<Vec<Origin>> {
    let cse = graph.flag(operation.kind(), Flag::Cse);
    create_or_reuse(graph, region, operation, operands, cse)
}

/// Merge `node` into an equivalent earlier node, if any.
pub(crate) fn normalize_node(graph: &mut Graph, node: NodeId) -> Result<bool> {
    let n = graph.node(node);
    if n.is_structural() || !graph.flag(n.operation().kind(), Flag::Cse) {
        return Ok(false);
    }
    let operands = graph.operands_of(node);
    let Some(existing) = find_equivalent(graph, n.region(), n.operation(), &operands, Some(node))
    else {
        return Ok(false);
    };
    let replacements = graph.outputs_of(existing);
    graph.replace_node(node, &replacements)?;
    Ok(true)
}
