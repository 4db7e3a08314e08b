//! Builders for the two structural nodes: gamma (N-way conditional) and
//! theta (tail-controlled loop).
//!
//! Both are thin handles over a [`NodeId`]. They keep the port bindings
//! consistent: every gamma input past the predicate has one argument per
//! alternative, every gamma output one result per alternative, and theta
//! loop variable `i` owns input `i`, argument `i`, output `i` and result
//! `i + 1`. Body result 0 of a theta is its repetition predicate.

use crate::error::{Error, Result};
use crate::graph::{ArgumentRef, Graph, InputRef, NodeId, Origin, OutputRef, RegionId, ResultRef};
use crate::operation::Operation;
use crate::types::Type;

/// Handle to a gamma node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gamma {
    node: NodeId,
}

/// An entry variable: one gamma input and its argument in every alternative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryVar {
    pub input: InputRef,
    pub arguments: Vec<Origin>,
}

impl Gamma {
    /// View an existing node as a gamma.
    pub fn from_node(graph: &Graph, node: NodeId) -> Option<Self> {
        matches!(graph.node(node).operation(), Operation::Gamma { .. }).then_some(Gamma { node })
    }

    pub fn node(self) -> NodeId {
        self.node
    }

    pub fn predicate(self, graph: &Graph) -> Origin {
        graph.node(self.node).input(0).origin()
    }

    pub fn nalternatives(self, graph: &Graph) -> usize {
        graph.node(self.node).subregions().len()
    }

    pub fn subregion(self, graph: &Graph, alternative: usize) -> RegionId {
        graph.node(self.node).subregions()[alternative]
    }

    /// Route `origin` into every alternative.
    pub fn add_entry_var(self, graph: &mut Graph, origin: Origin) -> Result<EntryVar> {
        let input = graph.add_input(self.node, origin)?;
        let ty = graph.origin_type(origin);
        let mut arguments = Vec::new();
        for sub in graph.node(self.node).subregions().to_vec() {
            let argument = graph.add_argument(sub, Some(input), ty)?;
            arguments.push(Origin::Argument(argument));
        }
        Ok(EntryVar { input, arguments })
    }

    /// Merge one value per alternative into a new gamma output.
    ///
    /// All values are checked before the output is created, so a failed
    /// call leaves the node untouched.
    pub fn add_exit_var(self, graph: &mut Graph, values: &[Origin]) -> Result<Origin> {
        let subregions = graph.node(self.node).subregions().to_vec();
        if values.len() != subregions.len() {
            return Err(Error::ArityMismatch {
                operation: graph.node(self.node).operation().to_string(),
                expected: subregions.len(),
                found: values.len(),
            });
        }
        let Some(&first) = values.first() else {
            return Err(Error::Malformed(format!("{:?} has no alternatives", self.node)));
        };
        let ty = graph.origin_type(first);
        for (&sub, &value) in subregions.iter().zip(values) {
            if graph.origin_region(value) != sub {
                return Err(Error::RegionMismatch(
                    "exit value is produced outside its alternative",
                ));
            }
            let found = graph.origin_type(value);
            if found != ty {
                return Err(Error::TypeMismatch { expected: ty, found });
            }
        }

        let output = graph.add_output(self.node, ty);
        for (&sub, &value) in subregions.iter().zip(values) {
            graph.add_result(sub, value, Some(output), ty)?;
        }
        Ok(Origin::Output(output))
    }
}

/// Handle to a theta node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theta {
    node: NodeId,
}

/// A loop variable and its four bound ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopVar {
    pub input: InputRef,
    pub argument: ArgumentRef,
    pub output: OutputRef,
    pub result: ResultRef,
}

impl LoopVar {
    /// The value inside the body at the start of an iteration.
    pub fn pre(&self) -> Origin {
        Origin::Argument(self.argument)
    }

    /// The value after the loop exits.
    pub fn post(&self) -> Origin {
        Origin::Output(self.output)
    }
}

impl Theta {
    pub fn from_node(graph: &Graph, node: NodeId) -> Option<Self> {
        matches!(graph.node(node).operation(), Operation::Theta).then_some(Theta { node })
    }

    pub fn node(self) -> NodeId {
        self.node
    }

    pub fn body(self, graph: &Graph) -> RegionId {
        graph.node(self.node).subregions()[0]
    }

    /// The value deciding whether to iterate again.
    pub fn predicate(self, graph: &Graph) -> Origin {
        graph.region(self.body(graph)).result(0).origin()
    }

    pub fn set_predicate(self, graph: &mut Graph, origin: Origin) -> Result<()> {
        let body = self.body(graph);
        graph.divert_result(ResultRef { region: body, index: 0 }, origin)
    }

    pub fn nloopvars(self, graph: &Graph) -> usize {
        graph.node(self.node).ninputs()
    }

    pub fn loop_var(self, graph: &Graph, index: usize) -> LoopVar {
        let body = self.body(graph);
        LoopVar {
            input: InputRef { node: self.node, index },
            argument: ArgumentRef { region: body, index },
            output: OutputRef { node: self.node, index },
            result: ResultRef { region: body, index: index + 1 },
        }
    }

    /// Add a loop variable entering with `origin`. Its body result starts
    /// out as the unchanged argument.
    pub fn add_loop_var(self, graph: &mut Graph, origin: Origin) -> Result<LoopVar> {
        let body = self.body(graph);
        let input = graph.add_input(self.node, origin)?;
        let ty = graph.origin_type(origin);
        let argument = graph.add_argument(body, Some(input), ty)?;
        let output = graph.add_output(self.node, ty);
        let result = graph.add_result(body, Origin::Argument(argument), Some(output), ty)?;
        Ok(LoopVar {
            input,
            argument,
            output,
            result,
        })
    }

    /// Set the value a loop variable carries into the next iteration.
    pub fn set_result(self, graph: &mut Graph, var: &LoopVar, origin: Origin) -> Result<()> {
        graph.divert_result(var.result, origin)
    }
}

impl Graph {
    /// Create a gamma choosing among `alternatives` branches by `predicate`.
    pub fn gamma(&mut self, region: RegionId, predicate: Origin, alternatives: u32) -> Result<Gamma> {
        if alternatives == 0 {
            return Err(Error::InvalidOperation(
                Operation::Gamma { alternatives }.to_string(),
            ));
        }
        if self.origin_region(predicate) != region {
            return Err(Error::RegionMismatch("predicate is produced in another region"));
        }
        let expected = Type::Control(alternatives);
        let found = self.origin_type(predicate);
        if found != expected {
            return Err(Error::TypeMismatch { expected, found });
        }
        let node = self.create_structural(region, Operation::Gamma { alternatives })?;
        self.add_input(node, predicate)?;
        Ok(Gamma { node })
    }

    /// Create a theta whose body initially runs once.
    pub fn theta(&mut self, region: RegionId) -> Result<Theta> {
        let node = self.create_structural(region, Operation::Theta)?;
        let body = self.nodes[node].subregions[0];
        let exit = self.create_node(
            body,
            Operation::ControlConstant {
                alternatives: 2,
                value: 0,
            },
            &[],
        )?;
        self.add_result(body, Origin::output(exit, 0), None, Type::Control(2))?;
        Ok(Theta { node })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{BinaryKind, UnaryKind};

    #[test]
    fn gamma_binds_entry_and_exit_vars() {
        let mut graph = Graph::new();
        let root = graph.root();
        let p = graph.add_import(Type::Control(2));
        let x = graph.add_import(Type::Bits(32));
        let gamma = graph.gamma(root, p, 2).unwrap();
        let ev = gamma.add_entry_var(&mut graph, x).unwrap();
        assert_eq!(ev.input.index, 1);
        assert_eq!(ev.arguments.len(), 2);

        let sub0 = gamma.subregion(&graph, 0);
        let not = graph
            .create_node(sub0, Operation::unary(UnaryKind::Not, 32), &[ev.arguments[0]])
            .unwrap();
        let out = gamma
            .add_exit_var(&mut graph, &[Origin::output(not, 0), ev.arguments[1]])
            .unwrap();

        assert_eq!(graph.origin_type(out), Type::Bits(32));
        let Origin::Output(output) = out else {
            panic!("exit var is not an output");
        };
        assert_eq!(graph.node(gamma.node()).output(output.index).results().len(), 2);
        assert_eq!(graph.region(sub0).argument(0).input(), Some(ev.input));
    }

    #[test]
    fn gamma_rejects_wrong_predicate() {
        let mut graph = Graph::new();
        let root = graph.root();
        let p = graph.add_import(Type::Control(3));
        assert_eq!(
            graph.gamma(root, p, 2),
            Err(Error::TypeMismatch {
                expected: Type::Control(2),
                found: Type::Control(3),
            })
        );
        assert_eq!(graph.nnodes(root), 0);
    }

    #[test]
    fn exit_var_checks_every_value_first() {
        let mut graph = Graph::new();
        let root = graph.root();
        let p = graph.add_import(Type::Control(2));
        let x = graph.add_import(Type::Bits(8));
        let y = graph.add_import(Type::Bits(16));
        let gamma = graph.gamma(root, p, 2).unwrap();
        let ex = gamma.add_entry_var(&mut graph, x).unwrap();
        let ey = gamma.add_entry_var(&mut graph, y).unwrap();
        let err = gamma
            .add_exit_var(&mut graph, &[ex.arguments[0], ey.arguments[1]])
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(graph.node(gamma.node()).noutputs(), 0);

        let err = gamma.add_exit_var(&mut graph, &[ex.arguments[0]]).unwrap_err();
        assert!(matches!(err, Error::ArityMismatch { expected: 2, found: 1, .. }));
    }

    #[test]
    fn theta_loop_var_layout() {
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_import(Type::Bits(32));
        let theta = graph.theta(root).unwrap();
        let body = theta.body(&graph);
        assert_eq!(graph.region(body).nresults(), 1);

        let lv = theta.add_loop_var(&mut graph, x).unwrap();
        assert_eq!(theta.loop_var(&graph, 0), lv);
        assert_eq!(lv.result.index, 1);
        assert_eq!(graph.region(body).result(1).origin(), lv.pre());

        let one = graph.create_node(body, Operation::bit_constant(32, 1), &[]).unwrap();
        let next = graph
            .create_node(
                body,
                Operation::binary(BinaryKind::Add, 32),
                &[lv.pre(), Origin::output(one, 0)],
            )
            .unwrap();
        theta.set_result(&mut graph, &lv, Origin::output(next, 0)).unwrap();
        assert_eq!(graph.region(body).result(1).origin(), Origin::output(next, 0));
        assert_eq!(graph.origin_type(lv.post()), Type::Bits(32));
    }

    #[test]
    fn theta_predicate_must_be_control() {
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_import(Type::Bits(32));
        let theta = graph.theta(root).unwrap();
        let lv = theta.add_loop_var(&mut graph, x).unwrap();
        assert!(matches!(
            theta.set_predicate(&mut graph, lv.pre()),
            Err(Error::TypeMismatch { .. })
        ));
    }
}
