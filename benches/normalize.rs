use divan::{Bencher, black_box};
use rvsdg::{BinaryKind, ExpandMode, Flag, Graph, OpKind, Operation, Origin, Type};

fn main() {
    divan::main();
}

// ── Builders ────────────────────────────────────────────────────────────────

/// `n` layers of `(a + b) * c ^ d` over four imports, with normal forms off
/// so the graph is built exactly as written.
fn raw_lattice(n: usize) -> Graph {
    let mut graph = Graph::new();
    graph.set_flag(OpKind::Node, Flag::Mutable, false).unwrap();
    let root = graph.root();
    let mut values: Vec<Origin> = (0..4).map(|_| graph.add_import(Type::Bits(32))).collect();
    for layer in 0..n {
        let c = graph
            .create_value(root, Operation::bit_constant(32, layer as u64 % 3), &[])
            .unwrap();
        let sum = graph
            .create_value(root, Operation::binary(BinaryKind::Add, 32), &[values[0], values[1]])
            .unwrap();
        let product = graph
            .create_value(root, Operation::binary(BinaryKind::Mul, 32), &[sum, c])
            .unwrap();
        let mixed = graph
            .create_value(root, Operation::binary(BinaryKind::Xor, 32), &[product, values[3]])
            .unwrap();
        values.rotate_left(1);
        values[3] = mixed;
    }
    for &value in &values {
        graph.add_export(value, Type::Bits(32)).unwrap();
    }
    graph.set_flag(OpKind::Node, Flag::Mutable, true).unwrap();
    graph
}

fn add_chain(graph: &mut Graph, n: usize) -> Origin {
    let root = graph.root();
    let x = graph.add_import(Type::Bits(64));
    let mut acc = x;
    for i in 0..n {
        let c = graph
            .create_value(root, Operation::bit_constant(64, i as u64), &[])
            .unwrap();
        let term = graph
            .create_value(root, Operation::binary(BinaryKind::Mul, 64), &[x, c])
            .unwrap();
        acc = graph
            .create_value(root, Operation::binary(BinaryKind::Add, 64), &[acc, term])
            .unwrap();
    }
    acc
}

// ── Benches ─────────────────────────────────────────────────────────────────

#[divan::bench(args = [16, 128, 1024])]
fn normalize_lattice(bencher: Bencher, n: usize) {
    bencher
        .with_inputs(|| raw_lattice(n))
        .bench_local_values(|mut graph| {
            graph.normalize().unwrap();
            graph.prune();
            black_box(graph)
        });
}

#[divan::bench(args = [16, 128, 1024])]
fn create_normalized_chain(bencher: Bencher, n: usize) {
    bencher.bench_local(|| {
        let mut graph = Graph::new();
        black_box(add_chain(&mut graph, n));
        graph
    });
}

fn expand_chain(bencher: Bencher, mode: ExpandMode) {
    bencher
        .with_inputs(|| {
            let mut graph = Graph::new();
            let value = add_chain(&mut graph, 256);
            graph.add_export(value, Type::Bits(64)).unwrap();
            graph.prune();
            graph
        })
        .bench_local_values(|mut graph| {
            let root = graph.root();
            black_box(graph.expand_flattened(root, mode).unwrap());
            graph
        });
}

#[divan::bench]
fn expand_linear(bencher: Bencher) {
    expand_chain(bencher, ExpandMode::Linear);
}

#[divan::bench]
fn expand_parallel(bencher: Bencher) {
    expand_chain(bencher, ExpandMode::Parallel);
}

#[divan::bench(args = [128, 1024])]
fn dump(bencher: Bencher, n: usize) {
    let graph = raw_lattice(n);
    bencher.bench_local(|| black_box(graph.to_string()));
}
