//! Bitstring binary operators: constant folding, flattening of associative
//! chains, canonical operand order, and the distributive laws.
//!
//! Creation and in-place normalization run the same pipeline over an
//! operand list:
//!
//! 1. flatten: splice in the operands of same-operator producers that have
//!    no other user;
//! 2. reduce: fold constants, drop neutral elements, collapse on absorbing
//!    elements;
//! 3. factorize `x*a + x*b` into `x*(a+b)`;
//! 4. reorder operands of commutative operators;
//! 5. distribute `x*(a+b)` into `x*a + x*b` unless the outer operator
//!    factorizes, or would itself distribute back (`&` and `|`).
//!
//! Whatever operands survive become a binary node (two operands) or a
//! flattened n-ary node, reused through CSE where possible.

use std::hash::Hasher;

use rustc_hash::{FxHashMap, FxHasher};

use crate::bits::BitValue;
use crate::error::Result;
use crate::graph::{Graph, NodeId, Origin, RegionId, User};
use crate::normal_form::{simple, Flag};
use crate::operation::{BinaryKind, BinaryOp, OpKind, Operation, PairReduction};

/// Shape of the binary trees produced by [`Graph::expand_flattened`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandMode {
    /// `((a op b) op c) op d`
    Linear,
    /// `(a op b) op (c op d)`
    Parallel,
}

#[derive(Debug, Clone, Copy)]
struct Flags {
    reducible: bool,
    flatten: bool,
    reorder: bool,
    distribute: bool,
    factorize: bool,
}

impl Flags {
    fn of(graph: &Graph, kind: BinaryKind) -> Self {
        let kind = OpKind::Binary(kind);
        Flags {
            reducible: graph.flag(kind, Flag::Reducible),
            flatten: graph.flag(kind, Flag::Flatten),
            reorder: graph.flag(kind, Flag::Reorder),
            distribute: graph.flag(kind, Flag::Distribute),
            factorize: graph.flag(kind, Flag::Factorize),
        }
    }
}

enum Simplified {
    /// The whole expression is an existing value.
    Value(Origin),
    /// The expression still needs a node over these operands.
    Operands(Vec<Origin>),
}

fn operation_for(op: BinaryOp, arity: usize) -> Operation {
    if arity > 2 {
        Operation::FlattenedBinary { op, arity }
    } else {
        Operation::Binary(op)
    }
}

pub(crate) fn normalized_create(
    graph: &mut Graph,
    region: RegionId,
    op: BinaryOp,
    operands: Vec<Origin>,
) -> Result<Vec<Origin>> {
    if !graph.flag(OpKind::Binary(op.kind), Flag::Mutable) {
        let node = graph.create_node(region, operation_for(op, operands.len()), &operands)?;
        return Ok(graph.outputs_of(node));
    }
    let value = match simplify(graph, region, op, operands, None)? {
        Simplified::Value(value) => value,
        Simplified::Operands(operands) => create_final(graph, region, op, operands)?,
    };
    Ok(vec![value])
}

pub(crate) fn normalize_node(graph: &mut Graph, node: NodeId) -> Result<bool> {
    let n = graph.node(node);
    let region = n.region();
    let op = match n.operation() {
        Operation::Binary(op) | Operation::FlattenedBinary { op, .. } => *op,
        _ => return simple::normalize_node(graph, node),
    };
    if !graph.flag(OpKind::Binary(op.kind), Flag::Mutable) {
        return Ok(false);
    }
    let operands = graph.operands_of(node);
    let value = match simplify(graph, region, op, operands.clone(), Some(node))? {
        Simplified::Value(value) => value,
        Simplified::Operands(simplified) if simplified == operands => {
            return simple::normalize_node(graph, node);
        }
        Simplified::Operands(simplified) => create_final(graph, region, op, simplified)?,
    };
    graph.replace_node(node, &[value])?;
    Ok(true)
}

fn simplify(
    graph: &mut Graph,
    region: RegionId,
    op: BinaryOp,
    mut operands: Vec<Origin>,
    consumer: Option<NodeId>,
) -> Result<Simplified> {
    let flags = Flags::of(graph, op.kind);
    if flags.flatten && op.kind.is_associative() {
        operands = flatten(graph, op, operands, consumer);
    }
    if flags.reducible {
        match reduce(graph, region, op, operands)? {
            Simplified::Value(value) => return Ok(Simplified::Value(value)),
            Simplified::Operands(reduced) => operands = reduced,
        }
    }
    if flags.factorize {
        if let Some(factored) = factorize(graph, region, op, &operands)? {
            if let [single] = factored.as_slice() {
                return Ok(Simplified::Value(*single));
            }
            operands = factored;
        }
    }
    if flags.reorder && op.kind.is_commutative() {
        reorder(graph, &mut operands);
    }
    if flags.distribute {
        if let Some(value) = distribute(graph, region, op, &operands)? {
            return Ok(Simplified::Value(value));
        }
    }
    Ok(Simplified::Operands(operands))
}

fn create_final(
    graph: &mut Graph,
    region: RegionId,
    op: BinaryOp,
    operands: Vec<Origin>,
) -> Result<Origin> {
    if let [single] = operands.as_slice() {
        return Ok(*single);
    }
    let cse = graph.flag(OpKind::Binary(op.kind), Flag::Cse);
    let operation = operation_for(op, operands.len());
    let outputs = simple::create_or_reuse(graph, region, operation, &operands, cse)?;
    Ok(outputs[0])
}

fn constant(graph: &mut Graph, region: RegionId, value: BitValue) -> Result<Origin> {
    let outputs = simple::normalized_create(graph, region, Operation::BitConstant(value), &[])?;
    Ok(outputs[0])
}

// ─── Flatten ────────────────────────────────────────────────────────────────

/// Operands of the node producing `origin` if it applies `op` and its
/// result feeds nothing but `consumer`.
fn absorbable(
    graph: &Graph,
    op: BinaryOp,
    origin: Origin,
    consumer: Option<NodeId>,
) -> Option<Vec<Origin>> {
    let Origin::Output(output) = origin else {
        return None;
    };
    let producer = graph.node(output.node);
    let inner = match producer.operation() {
        Operation::Binary(inner) | Operation::FlattenedBinary { op: inner, .. } => *inner,
        _ => return None,
    };
    if inner != op {
        return None;
    }
    let exclusive = graph
        .users(origin)
        .iter()
        .all(|user| matches!(user, User::Input(i) if Some(i.node) == consumer));
    exclusive.then(|| graph.operands_of(output.node))
}

fn flatten(
    graph: &Graph,
    op: BinaryOp,
    operands: Vec<Origin>,
    consumer: Option<NodeId>,
) -> Vec<Origin> {
    let mut flat = Vec::with_capacity(operands.len());
    for origin in operands {
        match absorbable(graph, op, origin, consumer) {
            Some(inner) => flat.extend(inner),
            None => flat.push(origin),
        }
    }
    flat
}

// ─── Reduce ─────────────────────────────────────────────────────────────────

fn reduce(
    graph: &mut Graph,
    region: RegionId,
    op: BinaryOp,
    operands: Vec<Origin>,
) -> Result<Simplified> {
    let kind = op.kind;
    if !kind.is_associative() {
        let (lhs, rhs) = (operands[0], operands[1]);
        let reduction = kind.reduce_pair(graph.constant_value(lhs), graph.constant_value(rhs));
        return Ok(match reduction {
            Some(PairReduction::Constant(value)) => {
                Simplified::Value(constant(graph, region, value)?)
            }
            Some(PairReduction::Left) => Simplified::Value(lhs),
            Some(PairReduction::Right) => Simplified::Value(rhs),
            None => Simplified::Operands(operands),
        });
    }

    // Associative operators here are all commutative: fold every constant
    // into one, wherever it sits.
    let mut folded: Option<BitValue> = None;
    let mut sources = Vec::new();
    let mut rest = Vec::with_capacity(operands.len());
    for origin in operands {
        match (graph.constant_value(origin), folded) {
            (Some(value), None) => {
                folded = Some(value);
                sources.push(origin);
            }
            (Some(value), Some(acc)) => match kind.fold(acc, value) {
                Some(result) => {
                    folded = Some(result);
                    sources.push(origin);
                }
                None => rest.push(origin),
            },
            (None, _) => rest.push(origin),
        }
    }
    let Some(value) = folded else {
        return Ok(Simplified::Operands(rest));
    };
    if rest.is_empty() {
        return Ok(Simplified::Value(constant(graph, region, value)?));
    }
    match kind.reduce_pair(None, Some(value)) {
        Some(PairReduction::Constant(value)) => {
            Ok(Simplified::Value(constant(graph, region, value)?))
        }
        Some(PairReduction::Left) => match rest.as_slice() {
            [single] => Ok(Simplified::Value(*single)),
            _ => Ok(Simplified::Operands(rest)),
        },
        _ => {
            let origin = match sources.as_slice() {
                [single] => *single,
                _ => constant(graph, region, value)?,
            };
            rest.push(origin);
            Ok(Simplified::Operands(rest))
        }
    }
}

// ─── Reorder ────────────────────────────────────────────────────────────────

/// Hash of the expression computing `origin`, independent of node ids.
///
/// Only explicit bytes reach the hasher (operation text, port indices,
/// operand hashes), so the key depends on nothing but the `rustc-hash`
/// version in use.
fn structural_hash(graph: &Graph, origin: Origin, memo: &mut FxHashMap<Origin, u64>) -> u64 {
    if let Some(&hash) = memo.get(&origin) {
        return hash;
    }
    let mut hasher = FxHasher::default();
    match origin {
        Origin::Argument(argument) => {
            hasher.write_u8(0);
            hasher.write_u64(argument.index as u64);
            hasher.write_u64(graph.nesting_depth(argument.region) as u64);
        }
        Origin::Output(output) => {
            hasher.write_u8(1);
            hasher.write_u64(output.index as u64);
            let node = graph.node(output.node);
            hasher.write(node.operation().to_string().as_bytes());
            for input in node.inputs() {
                hasher.write_u64(structural_hash(graph, input.origin(), memo));
            }
        }
    }
    let hash = hasher.finish();
    memo.insert(origin, hash);
    hash
}

/// Non-constants first, then by structural hash. Stable for ties.
fn reorder(graph: &Graph, operands: &mut [Origin]) {
    let mut memo = FxHashMap::default();
    let mut keyed: Vec<(bool, u64, Origin)> = operands
        .iter()
        .map(|&origin| {
            let is_constant = graph.constant_value(origin).is_some();
            (is_constant, structural_hash(graph, origin, &mut memo), origin)
        })
        .collect();
    keyed.sort_by_key(|&(is_constant, hash, _)| (is_constant, hash));
    for (slot, (_, _, origin)) in operands.iter_mut().zip(keyed) {
        *slot = origin;
    }
}

// ─── Distributive laws ──────────────────────────────────────────────────────

/// The two operands of a plain binary node computing `origin`.
fn binary_operands(graph: &Graph, origin: Origin) -> Option<(BinaryOp, Origin, Origin)> {
    let Origin::Output(output) = origin else {
        return None;
    };
    let node = graph.node(output.node);
    match node.operation() {
        Operation::Binary(op) => Some((*op, node.input(0).origin(), node.input(1).origin())),
        _ => None,
    }
}

/// Given `x i y` and `x i z` for commutative `i`, find `(x, y, z)`.
fn common_factor(a: (Origin, Origin), b: (Origin, Origin)) -> Option<(Origin, Origin, Origin)> {
    if a.0 == b.0 {
        Some((a.0, a.1, b.1))
    } else if a.0 == b.1 {
        Some((a.0, a.1, b.0))
    } else if a.1 == b.0 {
        Some((a.1, a.0, b.1))
    } else if a.1 == b.1 {
        Some((a.1, a.0, b.0))
    } else {
        None
    }
}

/// Rewrite one pair `(x i y) outer (x i z)` into `x i (y outer z)`.
fn factorize(
    graph: &mut Graph,
    region: RegionId,
    outer: BinaryOp,
    operands: &[Origin],
) -> Result<Option<Vec<Origin>>> {
    let pairs: Vec<(usize, usize)> = if outer.kind.is_commutative() {
        (0..operands.len())
            .flat_map(|i| (i + 1..operands.len()).map(move |j| (i, j)))
            .collect()
    } else {
        vec![(0, 1)]
    };
    for (i, j) in pairs {
        let (Some((a_op, a0, a1)), Some((b_op, b0, b1))) = (
            binary_operands(graph, operands[i]),
            binary_operands(graph, operands[j]),
        ) else {
            continue;
        };
        if a_op != b_op || !a_op.kind.is_commutative() || !a_op.kind.distributes_over(outer.kind) {
            continue;
        }
        let Some((x, y, z)) = common_factor((a0, a1), (b0, b1)) else {
            continue;
        };
        tracing::trace!(outer = outer.kind.name(), inner = a_op.kind.name(), "factorizing");
        let sum = normalized_create(graph, region, outer, vec![y, z])?[0];
        let product = normalized_create(graph, region, a_op, vec![x, sum])?[0];
        let mut factored = operands.to_vec();
        factored[i] = product;
        factored.remove(j);
        return Ok(Some(factored));
    }
    Ok(None)
}

/// Rewrite `x op (a outer b)` into `(x op a) outer (x op b)`.
fn distribute(
    graph: &mut Graph,
    region: RegionId,
    op: BinaryOp,
    operands: &[Origin],
) -> Result<Option<Origin>> {
    let &[lhs, rhs] = operands else {
        return Ok(None);
    };
    for (side, factor, sum) in [(1usize, lhs, rhs), (0usize, rhs, lhs)] {
        let Origin::Output(output) = sum else {
            continue;
        };
        let producer = graph.node(output.node);
        let outer = match producer.operation() {
            Operation::Binary(outer) | Operation::FlattenedBinary { op: outer, .. } => *outer,
            _ => continue,
        };
        // The rebuilt `outer` node would distribute straight back over `op`.
        let reverses = outer.kind.distributes_over(op.kind)
            && graph.flag(OpKind::Binary(outer.kind), Flag::Distribute);
        if outer.width != op.width
            || !op.kind.distributes_over(outer.kind)
            || graph.flag(OpKind::Binary(outer.kind), Flag::Factorize)
            || reverses
        {
            continue;
        }
        tracing::trace!(op = op.kind.name(), outer = outer.kind.name(), "distributing");
        let terms = graph.operands_of(output.node);
        let mut products = Vec::with_capacity(terms.len());
        for term in terms {
            let pair = if side == 1 {
                vec![factor, term]
            } else {
                vec![term, factor]
            };
            products.push(normalized_create(graph, region, op, pair)?[0]);
        }
        return Ok(Some(normalized_create(graph, region, outer, products)?[0]));
    }
    Ok(None)
}

// ─── Expansion ──────────────────────────────────────────────────────────────

impl Graph {
    /// Replace every flattened n-ary node in `region` and its subregions
    /// with a tree of binary nodes. Returns the number of nodes expanded.
    pub fn expand_flattened(&mut self, region: RegionId, mode: ExpandMode) -> Result<usize> {
        let mut expanded = 0;
        let members: Vec<NodeId> = self.region(region).nodes().iter().copied().collect();
        for node in members {
            for sub in self.node(node).subregions().to_vec() {
                expanded += self.expand_flattened(sub, mode)?;
            }
            let Operation::FlattenedBinary { op, .. } = *self.node(node).operation() else {
                continue;
            };
            let operands = self.operands_of(node);
            let value = match mode {
                ExpandMode::Linear => {
                    let mut acc = operands[0];
                    for &operand in &operands[1..] {
                        acc = self.expand_pair(region, op, acc, operand)?;
                    }
                    acc
                }
                ExpandMode::Parallel => {
                    let mut layer = operands;
                    while layer.len() > 1 {
                        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
                        for chunk in layer.chunks(2) {
                            next.push(match *chunk {
                                [lhs, rhs] => self.expand_pair(region, op, lhs, rhs)?,
                                [single] => single,
                                _ => unreachable!("chunks(2) yields one or two items"),
                            });
                        }
                        layer = next;
                    }
                    layer[0]
                }
            };
            self.replace_node(node, &[value])?;
            expanded += 1;
        }
        if expanded > 0 {
            tracing::debug!(?region, expanded, ?mode, "expanded flattened nodes");
        }
        Ok(expanded)
    }

    fn expand_pair(&mut self, region: RegionId, op: BinaryOp, lhs: Origin, rhs: Origin) -> Result<Origin> {
        let node = self.create_node(region, Operation::Binary(op), &[lhs, rhs])?;
        Ok(Origin::output(node, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    fn setup(width: u32, imports: usize) -> (Graph, RegionId, Vec<Origin>) {
        let mut graph = Graph::new();
        let root = graph.root();
        let args = (0..imports)
            .map(|_| graph.add_import(Type::Bits(width)))
            .collect();
        (graph, root, args)
    }

    fn producer_op(graph: &Graph, origin: Origin) -> Operation {
        let node = graph.producer(origin).expect("value has a producer");
        graph.node(node).operation().clone()
    }

    #[test]
    fn folds_and_drops_neutral_elements() {
        let (mut graph, root, args) = setup(32, 1);
        let x = args[0];
        let zero = graph.create_value(root, Operation::bit_constant(32, 0), &[]).unwrap();
        let one = graph.create_value(root, Operation::bit_constant(32, 1), &[]).unwrap();

        let sum = graph
            .create_value(root, Operation::binary(BinaryKind::Add, 32), &[x, zero])
            .unwrap();
        assert_eq!(sum, x);
        let product = graph
            .create_value(root, Operation::binary(BinaryKind::Mul, 32), &[one, x])
            .unwrap();
        assert_eq!(product, x);
        let masked = graph
            .create_value(root, Operation::binary(BinaryKind::And, 32), &[x, zero])
            .unwrap();
        assert_eq!(masked, zero);
        let shifted = graph
            .create_value(root, Operation::binary(BinaryKind::Shl, 32), &[x, zero])
            .unwrap();
        assert_eq!(shifted, x);
        // Non-commutative: 0 - x stays.
        let negated = graph
            .create_value(root, Operation::binary(BinaryKind::Sub, 32), &[zero, x])
            .unwrap();
        assert_eq!(
            producer_op(&graph, negated),
            Operation::binary(BinaryKind::Sub, 32)
        );
    }

    #[test]
    fn division_by_zero_is_not_folded() {
        let (mut graph, root, _) = setup(32, 0);
        let seven = graph.create_value(root, Operation::bit_constant(32, 7), &[]).unwrap();
        let zero = graph.create_value(root, Operation::bit_constant(32, 0), &[]).unwrap();
        let quotient = graph
            .create_value(root, Operation::binary(BinaryKind::UDiv, 32), &[seven, zero])
            .unwrap();
        assert_eq!(
            producer_op(&graph, quotient),
            Operation::binary(BinaryKind::UDiv, 32)
        );
    }

    #[test]
    fn flattens_single_use_chains() {
        let (mut graph, root, args) = setup(8, 3);
        let add = Operation::binary(BinaryKind::Add, 8);
        let inner = graph.create_value(root, add.clone(), &[args[0], args[1]]).unwrap();
        let outer = graph.create_value(root, add.clone(), &[inner, args[2]]).unwrap();
        let node = graph.producer(outer).unwrap();
        assert!(matches!(
            graph.node(node).operation(),
            Operation::FlattenedBinary { arity: 3, .. }
        ));

        // A shared inner node is not absorbed.
        let shared = graph.create_value(root, add.clone(), &[args[1], args[2]]).unwrap();
        graph.add_export(shared, Type::Bits(8)).unwrap();
        let other = graph.create_value(root, add, &[shared, args[0]]).unwrap();
        assert!(matches!(
            graph.node(graph.producer(other).unwrap()).operation(),
            Operation::Binary(_)
        ));
    }

    #[test]
    fn folds_constants_across_a_flattened_chain() {
        let (mut graph, root, args) = setup(16, 1);
        let add = Operation::binary(BinaryKind::Add, 16);
        let two = graph.create_value(root, Operation::bit_constant(16, 2), &[]).unwrap();
        let three = graph.create_value(root, Operation::bit_constant(16, 3), &[]).unwrap();
        let inner = graph.create_value(root, add.clone(), &[two, args[0]]).unwrap();
        let outer = graph.create_value(root, add, &[inner, three]).unwrap();
        let node = graph.producer(outer).unwrap();
        let operands = graph.operands_of(node);
        assert_eq!(operands.len(), 2);
        assert_eq!(operands[0], args[0]);
        assert_eq!(
            graph.constant_value(operands[1]).map(|v| v.to_unsigned()),
            Some(5)
        );
    }

    #[test]
    fn reorder_makes_commuted_expressions_equal() {
        let (mut graph, root, args) = setup(32, 2);
        let xor = Operation::binary(BinaryKind::Xor, 32);
        let ab = graph.create(root, xor.clone(), &[args[0], args[1]]).unwrap();
        let ba = graph.create(root, xor, &[args[1], args[0]]).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(graph.nnodes(root), 1);

        // Ordered comparisons are not commutative.
        let slt = Operation::binary(BinaryKind::Slt, 32);
        let lt = graph.create(root, slt.clone(), &[args[0], args[1]]).unwrap();
        let gt = graph.create(root, slt, &[args[1], args[0]]).unwrap();
        assert_ne!(lt, gt);
    }

    #[test]
    fn structural_hash_ignores_node_ids() {
        let build = |graph: &mut Graph, root: RegionId, x: Origin, y: Origin| {
            let c = graph.create_value(root, Operation::bit_constant(32, 7), &[]).unwrap();
            let sum = graph
                .create_value(root, Operation::binary(BinaryKind::Sub, 32), &[x, c])
                .unwrap();
            graph
                .create_value(root, Operation::binary(BinaryKind::Shl, 32), &[sum, y])
                .unwrap()
        };

        let (mut first, root, args) = setup(32, 2);
        let a = build(&mut first, root, args[0], args[1]);

        let (mut second, root, args) = setup(32, 2);
        for value in 0..5 {
            second
                .create_value(root, Operation::bit_constant(8, value), &[])
                .unwrap();
        }
        let b = build(&mut second, root, args[0], args[1]);
        assert_ne!(first.producer(a), second.producer(b));

        let ha = structural_hash(&first, a, &mut FxHashMap::default());
        let hb = structural_hash(&second, b, &mut FxHashMap::default());
        assert_eq!(ha, hb);
        let swapped = build(&mut second, root, args[1], args[0]);
        assert_ne!(structural_hash(&second, swapped, &mut FxHashMap::default()), hb);
    }

    #[test]
    fn factorize_and_distribute() {
        let (mut graph, root, args) = setup(32, 3);
        let (x, a, b) = (args[0], args[1], args[2]);
        let mul = Operation::binary(BinaryKind::Mul, 32);
        let add = Operation::binary(BinaryKind::Add, 32);

        graph
            .set_flag(OpKind::Binary(BinaryKind::Add), Flag::Factorize, true)
            .unwrap();
        let xa = graph.create_value(root, mul.clone(), &[x, a]).unwrap();
        let xb = graph.create_value(root, mul.clone(), &[x, b]).unwrap();
        let sum = graph.create_value(root, add.clone(), &[xa, xb]).unwrap();
        let node = graph.producer(sum).unwrap();
        assert_eq!(graph.node(node).operation(), &mul);

        // With factorization on for add, distribution over add is held back.
        graph
            .set_flag(OpKind::Binary(BinaryKind::Mul), Flag::Distribute, true)
            .unwrap();
        let a_plus_b = graph.create_value(root, add.clone(), &[a, b]).unwrap();
        let product = graph.create_value(root, mul.clone(), &[x, a_plus_b]).unwrap();
        assert_eq!(graph.node(graph.producer(product).unwrap()).operation(), &mul);

        graph
            .set_flag(OpKind::Binary(BinaryKind::Add), Flag::Factorize, false)
            .unwrap();
        let distributed = graph.create_value(root, mul, &[x, a_plus_b]).unwrap();
        assert_eq!(
            graph.node(graph.producer(distributed).unwrap()).operation(),
            &add
        );
    }

    #[test]
    fn family_wide_distribution_leaves_and_or_alone() {
        let (mut graph, root, args) = setup(16, 3);
        let (x, a, b) = (args[0], args[1], args[2]);
        let and = Operation::binary(BinaryKind::And, 16);
        let or = Operation::binary(BinaryKind::Or, 16);
        graph
            .set_flag(OpKind::BinaryFamily, Flag::Distribute, true)
            .unwrap();

        // `&` and `|` distribute over each other, so neither side is expanded.
        let a_or_b = graph.create_value(root, or.clone(), &[a, b]).unwrap();
        let masked = graph.create_value(root, and.clone(), &[x, a_or_b]).unwrap();
        assert_eq!(producer_op(&graph, masked), and);
        let a_and_b = graph.create_value(root, and.clone(), &[a, b]).unwrap();
        let merged = graph.create_value(root, or, &[x, a_and_b]).unwrap();
        assert_eq!(producer_op(&graph, merged), Operation::binary(BinaryKind::Or, 16));

        // One-way laws still apply.
        let xor = Operation::binary(BinaryKind::Xor, 16);
        let a_xor_b = graph.create_value(root, xor.clone(), &[a, b]).unwrap();
        let split = graph.create_value(root, and.clone(), &[x, a_xor_b]).unwrap();
        assert_eq!(producer_op(&graph, split), xor);
        let node = graph.producer(split).unwrap();
        for operand in graph.operands_of(node) {
            assert_eq!(producer_op(&graph, operand), and);
        }
    }

    #[test]
    fn expand_flattened_rebuilds_binary_trees() {
        for (mode, depth) in [(ExpandMode::Linear, 2), (ExpandMode::Parallel, 1)] {
            let (mut graph, root, args) = setup(8, 4);
            let flat = Operation::FlattenedBinary {
                op: BinaryOp::new(BinaryKind::Or, 8),
                arity: 4,
            };
            let node = graph.create_node(root, flat, &args).unwrap();
            graph.add_export(Origin::output(node, 0), Type::Bits(8)).unwrap();

            assert_eq!(graph.expand_flattened(root, mode).unwrap(), 1);
            assert!(!graph.contains_node(node));
            assert_eq!(graph.nsimpnodes(root), 3);
            let top = graph.region(root).result(0).origin();
            let top = graph.producer(top).unwrap();
            assert_eq!(graph.node(top).depth(), depth);
        }
    }
}
