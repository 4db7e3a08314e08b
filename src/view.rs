//! Text dump of a graph, used by tests and tracing.
//!
//! Nodes are listed in top-down order, so every origin is printed before
//! its first use. Origins read as `n{node}.{output}` or `a{argument}`.

use std::fmt;

use crate::graph::{Graph, NodeId, Origin, RegionId};
use crate::node::Output;
use crate::operation::Operation;
use crate::traverser::Direction;

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_region(f, self.root(), 0)
    }
}

/// Displays one region of a graph. See [`Graph::display_region`].
pub struct RegionDisplay<'a> {
    graph: &'a Graph,
    region: RegionId,
}

impl fmt::Display for RegionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.graph.fmt_region(f, self.region, 0)
    }
}

impl Graph {
    pub fn display_region(&self, region: RegionId) -> RegionDisplay<'_> {
        RegionDisplay {
            graph: self,
            region,
        }
    }

    fn fmt_region(&self, f: &mut fmt::Formatter<'_>, region: RegionId, indent: usize) -> fmt::Result {
        let r = self.region(region);
        let pad = "  ".repeat(indent);
        let inner_pad = "  ".repeat(indent + 1);

        writeln!(f, "{pad}region {{")?;
        write!(f, "{inner_pad}args: [")?;
        for (i, arg) in r.arguments().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "a{i}")?;
            if let Some(name) = &arg.port().name {
                write!(f, " {name:?}")?;
            }
            write!(f, ": {}", arg.ty())?;
        }
        writeln!(f, "]")?;

        for node in self.traversal_order(region, Direction::TopDown) {
            self.fmt_node(f, node, indent + 1)?;
        }

        write!(f, "{inner_pad}results: [")?;
        for (i, result) in r.results().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            fmt_origin(f, result.origin())?;
        }
        writeln!(f, "]")?;
        writeln!(f, "{pad}}}")
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, node: NodeId, indent: usize) -> fmt::Result {
        let n = self.node(node);
        let pad = "  ".repeat(indent);
        let origins: Vec<Origin> = n.inputs().iter().map(|i| i.origin()).collect();

        match n.operation() {
            Operation::Gamma { .. } => {
                writeln!(f, "{pad}n{} = {} [", node.index(), n.operation())?;
                let inputs_pad = "  ".repeat(indent + 1);
                if let Some((&predicate, entries)) = origins.split_first() {
                    write!(f, "{inputs_pad}pred: ")?;
                    fmt_origin(f, predicate)?;
                    writeln!(f)?;
                    for (i, &origin) in entries.iter().enumerate() {
                        write!(f, "{inputs_pad}in{i}: ")?;
                        fmt_origin(f, origin)?;
                        writeln!(f)?;
                    }
                }
                writeln!(f, "{pad}] {{")?;
                for (i, &sub) in n.subregions().iter().enumerate() {
                    writeln!(f, "{inputs_pad}branch {i}:")?;
                    self.fmt_region(f, sub, indent + 2)?;
                }
                write!(f, "{pad}}} -> ")?;
                fmt_outputs(f, n.outputs())?;
            }
            Operation::Theta => {
                write!(f, "{pad}n{} = theta ", node.index())?;
                fmt_origins(f, &origins)?;
                writeln!(f, " {{")?;
                for &sub in n.subregions() {
                    self.fmt_region(f, sub, indent + 1)?;
                }
                write!(f, "{pad}}} -> ")?;
                fmt_outputs(f, n.outputs())?;
            }
            operation => {
                write!(f, "{pad}n{} = {operation} ", node.index())?;
                fmt_origins(f, &origins)?;
                write!(f, " -> ")?;
                fmt_outputs(f, n.outputs())?;
            }
        }
        writeln!(f)
    }
}

fn fmt_origin(f: &mut fmt::Formatter<'_>, origin: Origin) -> fmt::Result {
    match origin {
        Origin::Output(output) => write!(f, "n{}.{}", output.node.index(), output.index),
        Origin::Argument(argument) => write!(f, "a{}", argument.index),
    }
}

fn fmt_origins(f: &mut fmt::Formatter<'_>, origins: &[Origin]) -> fmt::Result {
    write!(f, "[")?;
    for (i, &origin) in origins.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        fmt_origin(f, origin)?;
    }
    write!(f, "]")
}

fn fmt_outputs(f: &mut fmt::Formatter<'_>, outputs: &[Output]) -> fmt::Result {
    write!(f, "[")?;
    for (i, output) in outputs.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", output.ty())?;
    }
    write!(f, "]")
}

#[cfg(test)]
mod tests {
    use crate::graph::{Graph, Origin};
    use crate::operation::{BinaryKind, Operation};
    use crate::types::{Port, Type};

    #[test]
    fn dump_simple_region() {
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_import(Port::named(Type::Bits(32), "x"));
        let one = graph.create_node(root, Operation::bit_constant(32, 1), &[]).unwrap();
        let add = graph
            .create_node(
                root,
                Operation::binary(BinaryKind::Add, 32),
                &[x, Origin::output(one, 0)],
            )
            .unwrap();
        graph.add_export(Origin::output(add, 0), Type::Bits(32)).unwrap();

        insta::assert_snapshot!(graph.to_string(), @r#"
        region {
          args: [a0 "x": bits32]
          n0 = bitconstant(32, 0x1) [] -> [bits32]
          n1 = bitadd(32) [a0, n0.0] -> [bits32]
          results: [n1.0]
        }
        "#);
    }

    #[test]
    fn dump_gamma() {
        let mut graph = Graph::new();
        let root = graph.root();
        let p = graph.add_import(Type::Control(2));
        let x = graph.add_import(Type::Bits(8));
        let gamma = graph.gamma(root, p, 2).unwrap();
        let ev = gamma.add_entry_var(&mut graph, x).unwrap();
        let out = gamma.add_exit_var(&mut graph, &ev.arguments).unwrap();
        graph.add_export(out, Type::Bits(8)).unwrap();

        insta::assert_snapshot!(graph.to_string(), @r"
        region {
          args: [a0: ctl2, a1: bits8]
          n0 = gamma(2) [
            pred: a0
            in0: a1
          ] {
            branch 0:
              region {
                args: [a0: bits8]
                results: [a0]
              }
            branch 1:
              region {
                args: [a0: bits8]
                results: [a0]
              }
          } -> [bits8]
          results: [n0.0]
        }
        ");
    }
}
