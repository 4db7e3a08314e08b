//! Regions: ordered, acyclic node containers with boundary ports.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Weak;

use crate::error::{Error, Result};
use crate::graph::{ArgumentRef, Graph, InputRef, NodeId, Origin, OutputRef, RegionId, ResultRef, User};
use crate::node::Node;
use crate::substitution::SubstitutionMap;
use crate::traverser::{Event, Visit};
use crate::types::{Port, Type};

/// A value entering a region from outside.
#[derive(Debug, Clone)]
pub struct Argument {
    pub(crate) port: Port,
    pub(crate) users: Vec<User>,
    /// The structural input feeding this argument. `None` for imports.
    pub(crate) input: Option<InputRef>,
}

impl Argument {
    pub fn port(&self) -> &Port {
        &self.port
    }

    pub fn ty(&self) -> Type {
        self.port.ty
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn input(&self) -> Option<InputRef> {
        self.input
    }
}

/// A value leaving a region.
#[derive(Debug, Clone)]
pub struct RegionResult {
    pub(crate) port: Port,
    pub(crate) origin: Origin,
    /// The structural output this result feeds. `None` for exports.
    pub(crate) output: Option<OutputRef>,
}

impl RegionResult {
    pub fn port(&self) -> &Port {
        &self.port
    }

    pub fn ty(&self) -> Type {
        self.port.ty
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn output(&self) -> Option<OutputRef> {
        self.output
    }
}

/// A region is a set of nodes with arguments and results.
/// Regions nest: a structural node inside a region owns further regions.
#[derive(Debug)]
pub struct Region {
    /// The owning structural node. `None` for the root region.
    pub(crate) node: Option<NodeId>,
    /// Nodes in creation order.
    pub(crate) nodes: BTreeSet<NodeId>,
    /// Nodes without inputs.
    pub(crate) top: BTreeSet<NodeId>,
    /// Nodes whose outputs have no users.
    pub(crate) bottom: BTreeSet<NodeId>,
    pub(crate) arguments: Vec<Argument>,
    pub(crate) results: Vec<RegionResult>,
    /// Liveness tokens of the traversers registered over this region.
    /// A dropped [`Traverser`](crate::Traverser) leaves a dead token behind.
    pub(crate) traversers: Vec<Weak<()>>,
}

impl Region {
    pub(crate) fn new(node: Option<NodeId>) -> Self {
        Region {
            node,
            nodes: BTreeSet::new(),
            top: BTreeSet::new(),
            bottom: BTreeSet::new(),
            arguments: Vec::new(),
            results: Vec::new(),
            traversers: Vec::new(),
        }
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn nodes(&self) -> &BTreeSet<NodeId> {
        &self.nodes
    }

    pub fn top_nodes(&self) -> &BTreeSet<NodeId> {
        &self.top
    }

    pub fn bottom_nodes(&self) -> &BTreeSet<NodeId> {
        &self.bottom
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn results(&self) -> &[RegionResult] {
        &self.results
    }

    pub fn argument(&self, index: usize) -> &Argument {
        &self.arguments[index]
    }

    pub fn result(&self, index: usize) -> &RegionResult {
        &self.results[index]
    }

    pub fn narguments(&self) -> usize {
        self.arguments.len()
    }

    pub fn nresults(&self) -> usize {
        self.results.len()
    }

    pub fn has_active_traversers(&self) -> bool {
        self.traversers.iter().any(|t| t.strong_count() > 0)
    }
}

impl Graph {
    // ─── Arguments ──────────────────────────────────────────────────────

    /// Append an argument, optionally bound to an input of the owning
    /// structural node.
    pub fn add_argument(
        &mut self,
        region: RegionId,
        input: Option<InputRef>,
        port: impl Into<Port>,
    ) -> Result<ArgumentRef> {
        let port = port.into();
        if let Some(input) = input {
            if self.regions[region].node != Some(input.node) {
                return Err(Error::RegionMismatch(
                    "argument bound to an input of another node",
                ));
            }
            let found = self.nodes[input.node].inputs[input.index].ty;
            if found != port.ty {
                return Err(Error::TypeMismatch {
                    expected: port.ty,
                    found,
                });
            }
        }
        let arguments = &mut self.regions[region].arguments;
        let argument = ArgumentRef {
            region,
            index: arguments.len(),
        };
        arguments.push(Argument {
            port,
            users: Vec::new(),
            input,
        });
        if let Some(input) = input {
            self.nodes[input.node].inputs[input.index]
                .arguments
                .push(argument);
        }
        Ok(argument)
    }

    /// Remove an unused argument, shifting later arguments down by one.
    pub fn remove_argument(&mut self, argument: ArgumentRef) {
        let ArgumentRef { region, index } = argument;
        let removed = self.regions[region].arguments.remove(index);
        assert!(
            removed.users.is_empty(),
            "argument {argument:?} removed while in use"
        );
        if let Some(input) = removed.input {
            self.nodes[input.node].inputs[input.index]
                .arguments
                .retain(|&a| a != argument);
        }

        for index in index..self.regions[region].arguments.len() {
            let old = ArgumentRef {
                region,
                index: index + 1,
            };
            let new = ArgumentRef { region, index };
            let moved = &self.regions[region].arguments[index];
            let (users, bound) = (moved.users.clone(), moved.input);
            for user in users {
                self.set_user_origin(user, Origin::Argument(new));
            }
            if let Some(input) = bound {
                for slot in &mut self.nodes[input.node].inputs[input.index].arguments {
                    if *slot == old {
                        *slot = new;
                    }
                }
            }
        }
    }

    // ─── Results ────────────────────────────────────────────────────────

    /// Append a result reading `origin`, optionally bound to an output of
    /// the owning structural node.
    pub fn add_result(
        &mut self,
        region: RegionId,
        origin: Origin,
        output: Option<OutputRef>,
        port: impl Into<Port>,
    ) -> Result<ResultRef> {
        let port = port.into();
        if self.origin_region(origin) != region {
            return Err(Error::RegionMismatch(
                "result origin is produced in another region",
            ));
        }
        let found = self.origin_type(origin);
        if found != port.ty {
            return Err(Error::TypeMismatch {
                expected: port.ty,
                found,
            });
        }
        if let Some(output) = output {
            if self.regions[region].node != Some(output.node) {
                return Err(Error::RegionMismatch(
                    "result bound to an output of another node",
                ));
            }
            let found = self.nodes[output.node].outputs[output.index].port.ty;
            if found != port.ty {
                return Err(Error::TypeMismatch {
                    expected: port.ty,
                    found,
                });
            }
        }

        let results = &mut self.regions[region].results;
        let result = ResultRef {
            region,
            index: results.len(),
        };
        results.push(RegionResult {
            port,
            origin,
            output,
        });
        if let Some(output) = output {
            self.nodes[output.node].outputs[output.index]
                .results
                .push(result);
        }
        self.add_user(origin, User::Result(result));
        self.notify(Event::EdgeAdded {
            origin,
            user: User::Result(result),
        });
        Ok(result)
    }

    /// Remove a result, shifting later results down by one.
    pub fn remove_result(&mut self, result: ResultRef) {
        let ResultRef { region, index } = result;
        let origin = self.regions[region].results[index].origin;
        self.remove_user(origin, User::Result(result));
        let removed = self.regions[region].results.remove(index);
        if let Some(output) = removed.output {
            self.nodes[output.node].outputs[output.index]
                .results
                .retain(|&r| r != result);
        }

        for index in index..self.regions[region].results.len() {
            let old = ResultRef {
                region,
                index: index + 1,
            };
            let new = ResultRef { region, index };
            let moved = &self.regions[region].results[index];
            let (moved_origin, bound) = (moved.origin, moved.output);
            self.rename_user(moved_origin, User::Result(old), User::Result(new));
            if let Some(output) = bound {
                for slot in &mut self.nodes[output.node].outputs[output.index].results {
                    if *slot == old {
                        *slot = new;
                    }
                }
            }
        }
        self.notify(Event::EdgeRemoved {
            origin,
            user: User::Result(result),
        });
    }

    /// Divert a region result. See [`Graph::divert`].
    pub fn divert_result(&mut self, result: ResultRef, origin: Origin) -> Result<()> {
        self.divert(User::Result(result), origin)
    }

    // ─── Destruction ────────────────────────────────────────────────────

    /// Tear down a subregion of a node being removed.
    pub(crate) fn destroy_region(&mut self, region: RegionId) {
        self.reap_traversals();
        assert!(
            !self.regions[region].has_active_traversers(),
            "region {region:?} destroyed during traversal"
        );
        while let Some(index) = self.regions[region].results.len().checked_sub(1) {
            self.remove_result(ResultRef { region, index });
        }
        self.prune_region(region, false);
        assert!(
            self.regions[region].nodes.is_empty(),
            "region {region:?} still holds nodes after pruning"
        );
        while let Some(index) = self.regions[region].arguments.len().checked_sub(1) {
            self.remove_argument(ArgumentRef { region, index });
        }
        self.regions.remove(region);
    }

    // ─── Pruning ────────────────────────────────────────────────────────

    /// Remove dead nodes until none remain. With `recursive`, also prune
    /// the subregions of every surviving structural node.
    pub fn prune_region(&mut self, region: RegionId, recursive: bool) {
        let mut removed = 0usize;
        while let Some(&node) = self.regions[region].bottom.first() {
            self.remove_node(node);
            removed += 1;
        }
        if removed > 0 {
            tracing::debug!(?region, removed, "pruned");
        }
        if recursive {
            let structural: Vec<NodeId> = self.regions[region]
                .nodes
                .iter()
                .copied()
                .filter(|&n| self.nodes[n].is_structural())
                .collect();
            for node in structural {
                for sub in self.nodes[node].subregions.clone() {
                    self.prune_region(sub, true);
                }
            }
        }
    }

    // ─── Normalization ──────────────────────────────────────────────────

    /// Normalize every node of `region` in top-down order. With
    /// `recursive`, a structural node's subregions are normalized before
    /// the node itself.
    pub fn normalize_region(&mut self, region: RegionId, recursive: bool) -> Result<()> {
        let mut traverser = self.top_down(region);
        let mut changed = 0usize;
        while let Some(visit) = traverser.next(self) {
            let Visit::Node(node) = visit else {
                continue;
            };
            if let Err(err) = self.normalize_visited(node, recursive, &mut changed) {
                traverser.finish(self);
                return Err(err);
            }
        }
        tracing::debug!(?region, changed, "normalized");
        Ok(())
    }

    fn normalize_visited(
        &mut self,
        node: NodeId,
        recursive: bool,
        changed: &mut usize,
    ) -> Result<()> {
        if recursive {
            for sub in self.nodes[node].subregions.clone() {
                self.normalize_region(sub, true)?;
            }
        }
        if self.normalize_node(node)? {
            *changed += 1;
        }
        Ok(())
    }

    // ─── Copying ────────────────────────────────────────────────────────

    /// Copy the nodes of `source` into `target`, reading operands through
    /// `smap` and recording every copied port in it.
    ///
    /// Nodes are copied in depth order, so each producer is mapped before
    /// its users. Operands produced outside the copied set must already be
    /// mapped (arguments are, when `copy_arguments` is set). Nodes are
    /// recreated as they are, without normalization.
    pub fn copy_region(
        &mut self,
        source: RegionId,
        target: RegionId,
        smap: &mut SubstitutionMap,
        copy_arguments: bool,
        copy_results: bool,
    ) -> Result<()> {
        if copy_arguments {
            for index in 0..self.regions[source].arguments.len() {
                let argument = &self.regions[source].arguments[index];
                let port = argument.port.clone();
                let input = argument.input.and_then(|i| smap.input(i));
                let new = self.add_argument(target, input, port)?;
                smap.insert_origin(Origin::argument(source, index), Origin::Argument(new));
            }
        }

        let mut buckets: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
        for &node in &self.regions[source].nodes {
            buckets.entry(self.nodes[node].depth).or_default().push(node);
        }
        for node in buckets.into_values().flatten() {
            self.copy_node(node, target, smap)?;
        }

        if copy_results {
            for index in 0..self.regions[source].results.len() {
                let result = &self.regions[source].results[index];
                let port = result.port.clone();
                let output = result.output.and_then(|o| smap.output(o));
                let origin = substitute(smap, result.origin);
                self.add_result(target, origin, output, port)?;
            }
        }
        tracing::debug!(?source, ?target, "copied region");
        Ok(())
    }

    fn copy_node(&mut self, node: NodeId, target: RegionId, smap: &mut SubstitutionMap) -> Result<()> {
        let Node {
            operation,
            inputs,
            outputs,
            subregions,
            ..
        } = &self.nodes[node];
        let operation = operation.clone();
        let operands: Vec<Origin> = inputs.iter().map(|i| substitute(smap, i.origin)).collect();
        let ports: Vec<Port> = outputs.iter().map(|o| o.port.clone()).collect();
        let subregions = subregions.clone();

        let copy = if operation.is_structural() {
            let copy = self.create_structural(target, operation)?;
            for (index, &operand) in operands.iter().enumerate() {
                let input = self.add_input(copy, operand)?;
                smap.insert_input(InputRef { node, index }, input);
            }
            for port in ports {
                self.push_output(copy, port);
            }
            copy
        } else {
            self.create_node(target, operation, &operands)?
        };

        for index in 0..self.nodes[copy].outputs.len() {
            smap.insert_origin(Origin::output(node, index), Origin::output(copy, index));
            smap.insert_output(OutputRef { node, index }, OutputRef { node: copy, index });
        }
        for (index, sub) in subregions.into_iter().enumerate() {
            let copied = self.nodes[copy].subregions[index];
            smap.insert_region(sub, copied);
            self.copy_region(sub, copied, smap, true, true)?;
        }
        Ok(())
    }
}

fn substitute(smap: &SubstitutionMap, origin: Origin) -> Origin {
    smap.origin(origin)
        .unwrap_or_else(|| panic!("no substitution for {origin:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{BinaryKind, Operation, UnaryKind};

    #[test]
    fn results_must_be_local() {
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_import(Type::Bits(32));
        let gamma = graph.create_structural(root, Operation::Gamma { alternatives: 2 }).unwrap();
        let sub = graph.node(gamma).subregions()[0];
        assert_eq!(
            graph.add_result(sub, x, None, Type::Bits(32)),
            Err(Error::RegionMismatch("result origin is produced in another region"))
        );
        assert_eq!(graph.region(sub).nresults(), 0);
    }

    #[test]
    fn argument_removal_reindexes_users() {
        let mut graph = Graph::new();
        let root = graph.root();
        let _a = graph.add_import(Type::Bits(8));
        let b = graph.add_import(Type::Bits(8));
        let n = graph.create_node(root, Operation::unary(UnaryKind::Not, 8), &[b]).unwrap();
        graph.remove_argument(ArgumentRef { region: root, index: 0 });
        assert_eq!(graph.node(n).input(0).origin(), Origin::argument(root, 0));
        assert_eq!(graph.region(root).argument(0).users().len(), 1);
    }

    #[test]
    fn prune_removes_dead_chains_and_is_idempotent() {
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_import(Type::Bits(32));
        let a = graph.create_node(root, Operation::unary(UnaryKind::Not, 32), &[x]).unwrap();
        let b = graph
            .create_node(root, Operation::unary(UnaryKind::Neg, 32), &[Origin::output(a, 0)])
            .unwrap();
        let live = graph
            .create_node(root, Operation::binary(BinaryKind::Add, 32), &[x, x])
            .unwrap();
        graph.add_export(Origin::output(live, 0), Type::Bits(32)).unwrap();

        graph.prune_region(root, true);
        assert!(!graph.contains_node(a));
        assert!(!graph.contains_node(b));
        assert_eq!(graph.nnodes(root), 1);
        graph.prune_region(root, true);
        assert_eq!(graph.nnodes(root), 1);
    }

    #[test]
    fn copy_preserves_shape() {
        let mut graph = Graph::new();
        let root = graph.root();
        let first = graph.create_structural(root, Operation::Theta).unwrap();
        let second = graph.create_structural(root, Operation::Theta).unwrap();
        let source = graph.node(first).subregions()[0];
        let target = graph.node(second).subregions()[0];

        let x = Origin::Argument(graph.add_argument(source, None, Type::Bits(16)).unwrap());
        let k = graph.create_node(source, Operation::bit_constant(16, 3), &[]).unwrap();
        let add = graph
            .create_node(
                source,
                Operation::binary(BinaryKind::Add, 16),
                &[x, Origin::output(k, 0)],
            )
            .unwrap();
        graph.add_result(source, Origin::output(add, 0), None, Type::Bits(16)).unwrap();

        let mut smap = SubstitutionMap::new();
        graph.copy_region(source, target, &mut smap, true, true).unwrap();

        let copied = graph.region(target);
        assert_eq!(copied.narguments(), 1);
        assert_eq!(copied.nresults(), 1);
        assert_eq!(copied.nodes().len(), 2);
        let Some(Origin::Output(out)) = smap.origin(Origin::output(add, 0)) else {
            panic!("add was not copied");
        };
        assert_eq!(
            graph.node(out.node).operation(),
            &Operation::binary(BinaryKind::Add, 16)
        );
        assert_eq!(
            graph.node(out.node).input(0).origin(),
            Origin::argument(target, 0)
        );
        assert_eq!(copied.result(0).origin(), Origin::Output(out));
    }
}
