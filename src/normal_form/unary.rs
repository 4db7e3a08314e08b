//! Single-operand operations: constant folding and involutions.

use crate::error::Result;
use crate::graph::{Graph, NodeId, Origin, RegionId};
use crate::normal_form::{simple, Flag};
use crate::operation::Operation;

enum Reduction {
    /// Replace with a constant computed by this operation.
    Constant(Operation),
    /// Replace with an existing value.
    Forward(Origin),
}

fn reduce(graph: &Graph, operation: &Operation, operand: Origin) -> Option<Reduction> {
    if let Some(value) = graph.constant_value(operand) {
        return operation.reduce_constant_operand(value).map(Reduction::Constant);
    }
    // not(not x) and neg(neg x)
    if let (Operation::Unary(_), Origin::Output(inner)) = (operation, operand) {
        let producer = graph.node(inner.node);
        if producer.operation() == operation {
            return Some(Reduction::Forward(producer.input(0).origin()));
        }
    }
    None
}

pub(crate) fn normalized_create(
    graph: &mut Graph,
    region: RegionId,
    operation: Operation,
    operand: Origin,
) -> Result<Vec<Origin>> {
    if graph.flag(operation.kind(), Flag::Reducible) {
        match reduce(graph, &operation, operand) {
            Some(Reduction::Constant(constant)) => {
                tracing::trace!(%operation, %constant, "folded");
                return simple::normalized_create(graph, region, constant, &[]);
            }
            Some(Reduction::Forward(origin)) => return Ok(vec![origin]),
            None => {}
        }
    }
    simple::normalized_create(graph, region, operation, &[operand])
}

pub(crate) fn normalize_node(graph: &mut Graph, node: NodeId) -> Result<bool> {
    let n = graph.node(node);
    let operation = n.operation().clone();
    let region = n.region();
    let operand = n.input(0).origin();
    if graph.flag(operation.kind(), Flag::Reducible) {
        let replacement = match reduce(graph, &operation, operand) {
            Some(Reduction::Constant(constant)) => {
                simple::normalized_create(graph, region, constant, &[])?
            }
            Some(Reduction::Forward(origin)) => vec![origin],
            None => return simple::normalize_node(graph, node),
        };
        graph.replace_node(node, &replacement)?;
        return Ok(true);
    }
    simple::normalize_node(graph, node)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::graph::Graph;
    use crate::operation::{MatchOp, OpKind, Operation, UnaryKind};
    use crate::normal_form::Flag;
    use crate::types::Type;

    #[test]
    fn folds_constants() {
        let mut graph = Graph::new();
        let root = graph.root();
        let three = graph.create_value(root, Operation::bit_constant(32, 3), &[]).unwrap();
        let neg = graph
            .create_value(root, Operation::unary(UnaryKind::Neg, 32), &[three])
            .unwrap();
        let not = graph
            .create_value(root, Operation::unary(UnaryKind::Not, 32), &[three])
            .unwrap();
        assert_eq!(graph.constant_value(neg).map(|v| v.to_signed()), Some(-3));
        assert_eq!(graph.constant_value(not).map(|v| v.to_signed()), Some(-4));
    }

    #[test]
    fn eliminates_involutions() {
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_import(Type::Bits(16));
        let once = graph
            .create_value(root, Operation::unary(UnaryKind::Not, 16), &[x])
            .unwrap();
        let twice = graph
            .create_value(root, Operation::unary(UnaryKind::Not, 16), &[once])
            .unwrap();
        assert_eq!(twice, x);

        // Mixed operators do not cancel.
        let mixed = graph
            .create_value(root, Operation::unary(UnaryKind::Neg, 16), &[once])
            .unwrap();
        assert_ne!(mixed, x);
    }

    #[test]
    fn match_of_constant_selects_alternative() {
        let mut graph = Graph::new();
        let root = graph.root();
        let seven = graph.create_value(root, Operation::bit_constant(8, 7), &[]).unwrap();
        let op = Operation::Match(MatchOp {
            width: 8,
            mapping: BTreeMap::from([(7, 1)]),
            default_alternative: 0,
            alternatives: 2,
        });
        let ctl = graph.create_value(root, op, &[seven]).unwrap();
        let producer = graph.producer(ctl).unwrap();
        assert_eq!(
            graph.node(producer).operation(),
            &Operation::ControlConstant {
                alternatives: 2,
                value: 1
            }
        );
    }

    #[test]
    fn normalize_folds_after_the_fact() {
        let mut graph = Graph::new();
        let root = graph.root();
        graph
            .set_flag(OpKind::UnaryFamily, Flag::Reducible, false)
            .unwrap();
        let three = graph.create_value(root, Operation::bit_constant(8, 3), &[]).unwrap();
        let neg = graph
            .create_value(root, Operation::unary(UnaryKind::Neg, 8), &[three])
            .unwrap();
        let export = graph.add_export(neg, Type::Bits(8)).unwrap();
        assert!(graph.constant_value(neg).is_none());

        graph
            .set_flag(OpKind::UnaryFamily, Flag::Reducible, true)
            .unwrap();
        graph.normalize().unwrap();
        graph.prune();
        let folded = graph.region(root).result(export.index).origin();
        assert_eq!(graph.constant_value(folded).map(|v| v.to_signed()), Some(-3));
        assert_eq!(graph.nnodes(root), 1);
    }
}
