use rvsdg::{
    BinaryKind, BitValue, Graph, NodeId, Operation, Origin, OutputRef, RegionId,
    SubstitutionMap, Type, UnaryKind,
};

const WIDTHS: [u32; 8] = [1, 7, 8, 16, 31, 32, 63, 64];

const SAMPLES: [u64; 7] = [
    0,
    1,
    2,
    0x7f,
    0x8000_0000,
    0xdead_beef_cafe_f00d,
    u64::MAX,
];

/// Depth, top/bottom membership, and operand type/region agreement for
/// every node of `region` and its subregions.
fn check_invariants(graph: &Graph, region: RegionId) {
    let r = graph.region(region);
    for &id in r.nodes() {
        let node = graph.node(id);
        let expected = node
            .inputs()
            .iter()
            .filter_map(|i| i.origin().node())
            .map(|p| graph.node(p).depth() + 1)
            .max()
            .unwrap_or(0);
        assert_eq!(node.depth(), expected, "depth of {id:?}");
        assert_eq!(r.top_nodes().contains(&id), node.ninputs() == 0, "top {id:?}");
        assert_eq!(r.bottom_nodes().contains(&id), node.is_dead(), "bottom {id:?}");
        for input in node.inputs() {
            assert_eq!(input.ty(), graph.origin_type(input.origin()));
            assert_eq!(graph.origin_region(input.origin()), region);
        }
        for &sub in node.subregions() {
            check_invariants(graph, sub);
        }
    }
    for result in r.results() {
        assert_eq!(result.ty(), graph.origin_type(result.origin()));
        assert_eq!(graph.origin_region(result.origin()), region);
    }
}

/// A small expression DAG over two imports, with a dead branch.
fn expression(graph: &mut Graph) -> Vec<Origin> {
    let root = graph.root();
    let x = graph.add_import(Type::Bits(32));
    let y = graph.add_import(Type::Bits(32));
    let c = graph
        .create_value(root, Operation::bit_constant(32, 12), &[])
        .unwrap();
    let sum = graph
        .create_value(root, Operation::binary(BinaryKind::Add, 32), &[x, y])
        .unwrap();
    let scaled = graph
        .create_value(root, Operation::binary(BinaryKind::Mul, 32), &[sum, c])
        .unwrap();
    let masked = graph
        .create_value(root, Operation::binary(BinaryKind::And, 32), &[scaled, x])
        .unwrap();
    let _dead = graph
        .create_value(root, Operation::unary(UnaryKind::Not, 32), &[masked])
        .unwrap();
    let shifted = graph
        .create_value(root, Operation::binary(BinaryKind::Shr, 32), &[masked, y])
        .unwrap();
    graph.add_export(shifted, Type::Bits(32)).unwrap();
    vec![x, y, sum, scaled, masked, shifted]
}

#[test]
fn invariants_hold_through_construction_and_rewiring() {
    let mut graph = Graph::new();
    let root = graph.root();
    let values = expression(&mut graph);
    check_invariants(&graph, root);

    // Move the shift's value operand to the very first import.
    let shift = graph.producer(values[5]).unwrap();
    graph
        .divert_input(rvsdg::InputRef { node: shift, index: 0 }, values[0])
        .unwrap();
    check_invariants(&graph, root);

    graph.prune();
    check_invariants(&graph, root);
    graph.normalize().unwrap();
    check_invariants(&graph, root);
}

#[test]
fn cse_shares_identical_requests() {
    let mut graph = Graph::new();
    let root = graph.root();
    let x = graph.add_import(Type::Bits(16));
    let y = graph.add_import(Type::Bits(16));
    let op = Operation::binary(BinaryKind::Sub, 16);
    let first = graph.create_value(root, op.clone(), &[x, y]).unwrap();
    let second = graph.create_value(root, op.clone(), &[x, y]).unwrap();
    assert_eq!(first, second);
    assert_eq!(graph.nnodes(root), 1);

    // Operand order matters for a non-commutative operator.
    let swapped = graph.create_value(root, op, &[y, x]).unwrap();
    assert_ne!(first, swapped);
}

#[test]
fn commutative_folds_match_direct_evaluation() {
    let kinds: Vec<BinaryKind> = BinaryKind::ALL
        .iter()
        .copied()
        .filter(|k| k.is_commutative())
        .collect();
    for width in WIDTHS {
        for kind in &kinds {
            let mut graph = Graph::new();
            let root = graph.root();
            for &a in &SAMPLES {
                for &b in &SAMPLES {
                    let (av, bv) = (BitValue::new(width, a), BitValue::new(width, b));
                    let ca = graph
                        .create_value(root, Operation::BitConstant(av), &[])
                        .unwrap();
                    let cb = graph
                        .create_value(root, Operation::BitConstant(bv), &[])
                        .unwrap();
                    let folded = graph
                        .create_value(root, Operation::binary(*kind, width), &[ca, cb])
                        .unwrap();
                    assert_eq!(
                        graph.constant_value(folded),
                        kind.fold(av, bv),
                        "{} {width} {a:#x} {b:#x}",
                        kind.name()
                    );
                }
            }
            assert_eq!(graph.nstructnodes(root), 0);
        }
    }
}

#[test]
fn wrapping_folds_per_width() {
    let cases: [(BinaryKind, u32, i64, i64, i64); 8] = [
        (BinaryKind::Add, 8, 127, 1, -128),
        (BinaryKind::Sub, 8, -128, 1, 127),
        (BinaryKind::Mul, 16, 300, 300, 24464),
        (BinaryKind::SDiv, 32, -7, 2, -3),
        (BinaryKind::SMod, 32, -7, 2, -1),
        (BinaryKind::AShr, 8, -64, 3, -8),
        (BinaryKind::Shr, 8, -64, 3, 24),
        (BinaryKind::Shl, 4, 3, 3, -8),
    ];
    for (kind, width, a, b, expected) in cases {
        let mut graph = Graph::new();
        let root = graph.root();
        let ca = graph
            .create_value(root, Operation::signed_constant(width, a), &[])
            .unwrap();
        let cb = graph
            .create_value(root, Operation::signed_constant(width, b), &[])
            .unwrap();
        let folded = graph
            .create_value(root, Operation::binary(kind, width), &[ca, cb])
            .unwrap();
        assert_eq!(
            graph.constant_value(folded).map(|v| v.to_signed()),
            Some(expected),
            "{} {width}",
            kind.name()
        );
    }
}

#[test]
fn prune_twice_is_a_no_op() {
    let mut graph = Graph::new();
    let root = graph.root();
    expression(&mut graph);
    graph.prune();
    let after_first = graph.to_string();
    let count = graph.nnodes(root);
    graph.prune();
    assert_eq!(graph.nnodes(root), count);
    assert_eq!(graph.to_string(), after_first);
}

#[test]
fn copy_reproduces_an_isomorphic_region() {
    let mut graph = Graph::new();
    let root = graph.root();
    let p = graph.add_import(Type::Control(1));
    let x = graph.add_import(Type::Bits(32));
    let y = graph.add_import(Type::Bits(32));

    let source = graph.gamma(root, p, 1).unwrap();
    let ex = source.add_entry_var(&mut graph, x).unwrap().arguments[0];
    let ey = source.add_entry_var(&mut graph, y).unwrap().arguments[0];
    let src = source.subregion(&graph, 0);
    let sum = graph
        .create_node(src, Operation::binary(BinaryKind::Add, 32), &[ex, ey])
        .unwrap();
    let not = graph
        .create_node(src, Operation::unary(UnaryKind::Not, 32), &[Origin::output(sum, 0)])
        .unwrap();
    let mixed = graph
        .create_node(
            src,
            Operation::binary(BinaryKind::Xor, 32),
            &[Origin::output(not, 0), ex],
        )
        .unwrap();
    source
        .add_exit_var(&mut graph, &[Origin::output(mixed, 0)])
        .unwrap();
    source
        .add_exit_var(&mut graph, &[Origin::output(sum, 0)])
        .unwrap();

    let target = graph.gamma(root, p, 1).unwrap();
    let dst = target.subregion(&graph, 0);
    let mut smap = SubstitutionMap::new();
    graph.copy_region(src, dst, &mut smap, true, true).unwrap();

    assert_eq!(graph.nnodes(dst), graph.nnodes(src));
    assert_eq!(graph.region(dst).narguments(), graph.region(src).narguments());
    assert_eq!(graph.region(dst).nresults(), graph.region(src).nresults());

    let copied = |node: NodeId| -> NodeId {
        smap.output(OutputRef { node, index: 0 })
            .map(|o| o.node)
            .unwrap()
    };
    for node in [sum, not, mixed] {
        let copy = copied(node);
        assert_eq!(graph.node(copy).region(), dst);
        assert_eq!(graph.node(copy).operation(), graph.node(node).operation());
        for (original, duplicate) in graph.node(node).inputs().iter().zip(graph.node(copy).inputs()) {
            assert_eq!(smap.origin(original.origin()), Some(duplicate.origin()));
        }
    }
    for (original, duplicate) in graph
        .region(src)
        .results()
        .iter()
        .zip(graph.region(dst).results())
    {
        assert_eq!(smap.origin(original.origin()), Some(duplicate.origin()));
    }
    check_invariants(&graph, root);
}
