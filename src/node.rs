//! Nodes, their ports, and edge-level mutation.
//!
//! Edges are stored twice: inline in the consuming input (its origin) and
//! in the producing output's user list. Every mutation here keeps both
//! sides, the region's top/bottom sets, and node depths in sync.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::graph::{ArgumentRef, Graph, InputRef, NodeId, Origin, OutputRef, RegionId, ResultRef, User};
use crate::operation::Operation;
use crate::traverser::Event;
use crate::types::{Port, Type};

/// An input port on a node.
#[derive(Debug, Clone)]
pub struct Input {
    pub(crate) ty: Type,
    pub(crate) origin: Origin,
    /// Subregion arguments bound to this input (structural nodes only).
    pub(crate) arguments: Vec<ArgumentRef>,
}

impl Input {
    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn arguments(&self) -> &[ArgumentRef] {
        &self.arguments
    }
}

/// An output port on a node.
#[derive(Debug, Clone)]
pub struct Output {
    pub(crate) port: Port,
    pub(crate) users: Vec<User>,
    /// Subregion results bound to this output (structural nodes only).
    pub(crate) results: Vec<ResultRef>,
}

impl Output {
    pub fn port(&self) -> &Port {
        &self.port
    }

    pub fn ty(&self) -> Type {
        self.port.ty
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn results(&self) -> &[ResultRef] {
        &self.results
    }
}

/// A node in the RVSDG.
#[derive(Debug)]
pub struct Node {
    pub(crate) region: RegionId,
    pub(crate) operation: Operation,
    pub(crate) inputs: Vec<Input>,
    pub(crate) outputs: Vec<Output>,
    /// Longest producer chain to this node within its region.
    pub(crate) depth: usize,
    /// Owned regions. Empty for simple nodes.
    pub(crate) subregions: Vec<RegionId>,
}

impl Node {
    pub(crate) fn new(region: RegionId, operation: Operation) -> Self {
        Node {
            region,
            operation,
            inputs: Vec::new(),
            outputs: Vec::new(),
            depth: 0,
            subregions: Vec::new(),
        }
    }

    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn input(&self, index: usize) -> &Input {
        &self.inputs[index]
    }

    pub fn output(&self, index: usize) -> &Output {
        &self.outputs[index]
    }

    pub fn ninputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn noutputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn subregions(&self) -> &[RegionId] {
        &self.subregions
    }

    pub fn is_structural(&self) -> bool {
        self.operation.is_structural()
    }

    /// No output has a user.
    pub fn is_dead(&self) -> bool {
        self.outputs.iter().all(|o| o.users.is_empty())
    }
}

impl Graph {
    // ─── Inputs ─────────────────────────────────────────────────────────

    /// Append an input to structural `node` reading `origin`. Simple nodes
    /// have the fixed arity of their operation and are rejected.
    pub fn add_input(&mut self, node: NodeId, origin: Origin) -> Result<InputRef> {
        if !self.nodes[node].is_structural() {
            return Err(Error::InvalidOperation(self.nodes[node].operation.to_string()));
        }
        if self.origin_region(origin) != self.nodes[node].region {
            return Err(Error::RegionMismatch("operand is produced in another region"));
        }
        Ok(self.link_input(node, origin))
    }

    /// Append an already validated input.
    pub(crate) fn link_input(&mut self, node: NodeId, origin: Origin) -> InputRef {
        let ty = self.origin_type(origin);
        let n = &mut self.nodes[node];
        let input = InputRef {
            node,
            index: n.inputs.len(),
        };
        n.inputs.push(Input {
            ty,
            origin,
            arguments: Vec::new(),
        });
        if input.index == 0 {
            let region = n.region;
            self.regions[region].top.remove(&node);
        }
        self.add_user(origin, User::Input(input));
        if let Some(producer) = origin.node() {
            if self.nodes[producer].depth + 1 > self.nodes[node].depth {
                self.recompute_depth(node);
            }
        }
        self.mark_denormalized();
        self.notify(Event::EdgeAdded {
            origin,
            user: User::Input(input),
        });
        input
    }

    /// Remove an input, shifting later inputs down by one.
    ///
    /// Panics if subregion arguments are still bound to the input.
    pub fn remove_input(&mut self, input: InputRef) {
        let removed = &self.nodes[input.node].inputs[input.index];
        assert!(
            removed.arguments.is_empty(),
            "input {input:?} removed while bound to region arguments"
        );
        let origin = removed.origin;
        self.remove_user(origin, User::Input(input));
        self.nodes[input.node].inputs.remove(input.index);

        for index in input.index..self.nodes[input.node].inputs.len() {
            let old = InputRef {
                node: input.node,
                index: index + 1,
            };
            let new = InputRef {
                node: input.node,
                index,
            };
            let moved = &self.nodes[input.node].inputs[index];
            let (moved_origin, bound) = (moved.origin, moved.arguments.clone());
            self.rename_user(moved_origin, User::Input(old), User::Input(new));
            for argument in bound {
                self.regions[argument.region].arguments[argument.index].input = Some(new);
            }
        }

        let node = &self.nodes[input.node];
        if node.inputs.is_empty() {
            let region = node.region;
            self.regions[region].top.insert(input.node);
        }
        if let Some(producer) = origin.node() {
            if self.nodes[producer].depth + 1 == self.nodes[input.node].depth {
                self.recompute_depth(input.node);
            }
        }
        self.mark_denormalized();
        self.notify(Event::EdgeRemoved {
            origin,
            user: User::Input(input),
        });
    }

    // ─── Outputs ────────────────────────────────────────────────────────

    /// Append an output to `node`.
    pub fn add_output(&mut self, node: NodeId, port: impl Into<Port>) -> OutputRef {
        self.push_output(node, port.into())
    }

    pub(crate) fn push_output(&mut self, node: NodeId, port: Port) -> OutputRef {
        let outputs = &mut self.nodes[node].outputs;
        outputs.push(Output {
            port,
            users: Vec::new(),
            results: Vec::new(),
        });
        OutputRef {
            node,
            index: outputs.len() - 1,
        }
    }

    /// Remove an unused output, shifting later outputs down by one.
    ///
    /// Panics if the output still has users or bound subregion results.
    pub fn remove_output(&mut self, output: OutputRef) {
        let removed = &self.nodes[output.node].outputs[output.index];
        assert!(
            removed.users.is_empty(),
            "output {output:?} removed while in use"
        );
        assert!(
            removed.results.is_empty(),
            "output {output:?} removed while bound to region results"
        );
        self.nodes[output.node].outputs.remove(output.index);

        for index in output.index..self.nodes[output.node].outputs.len() {
            let new = Origin::output(output.node, index);
            let moved = &self.nodes[output.node].outputs[index];
            let (users, bound) = (moved.users.clone(), moved.results.clone());
            for user in users {
                self.set_user_origin(user, new);
            }
            for result in bound {
                self.regions[result.region].results[result.index].output = Some(OutputRef {
                    node: output.node,
                    index,
                });
            }
        }

        let node = &self.nodes[output.node];
        if node.is_dead() {
            let region = node.region;
            self.regions[region].bottom.insert(output.node);
        }
    }

    // ─── Users ──────────────────────────────────────────────────────────

    pub(crate) fn add_user(&mut self, origin: Origin, user: User) {
        match origin {
            Origin::Output(o) => {
                let node = &mut self.nodes[o.node];
                node.outputs[o.index].users.push(user);
                let region = node.region;
                self.regions[region].bottom.remove(&o.node);
            }
            Origin::Argument(a) => {
                self.regions[a.region].arguments[a.index].users.push(user);
            }
        }
    }

    pub(crate) fn remove_user(&mut self, origin: Origin, user: User) {
        let users = match origin {
            Origin::Output(o) => &mut self.nodes[o.node].outputs[o.index].users,
            Origin::Argument(a) => &mut self.regions[a.region].arguments[a.index].users,
        };
        let position = users
            .iter()
            .position(|&u| u == user)
            .unwrap_or_else(|| panic!("{user:?} is not a user of {origin:?}"));
        users.remove(position);
        if let Origin::Output(o) = origin {
            let node = &self.nodes[o.node];
            if node.is_dead() {
                let region = node.region;
                self.regions[region].bottom.insert(o.node);
            }
        }
    }

    /// Re-address a user in its origin's user list after a port shift.
    pub(crate) fn rename_user(&mut self, origin: Origin, from: User, to: User) {
        let users = match origin {
            Origin::Output(o) => &mut self.nodes[o.node].outputs[o.index].users,
            Origin::Argument(a) => &mut self.regions[a.region].arguments[a.index].users,
        };
        if let Some(slot) = users.iter_mut().find(|u| **u == from) {
            *slot = to;
        }
    }

    /// Overwrite the stored origin of a user without touching user lists.
    pub(crate) fn set_user_origin(&mut self, user: User, origin: Origin) {
        match user {
            User::Input(i) => self.nodes[i.node].inputs[i.index].origin = origin,
            User::Result(r) => self.regions[r.region].results[r.index].origin = origin,
        }
    }

    // ─── Rewiring ───────────────────────────────────────────────────────

    /// Point `user` at a different origin.
    ///
    /// No-op if it already reads `origin`. Fails without changing anything
    /// if the types differ or `origin` lives in another region.
    pub fn divert(&mut self, user: User, origin: Origin) -> Result<()> {
        let old = self.user_origin(user);
        if old == origin {
            return Ok(());
        }
        let expected = self.user_type(user);
        let found = self.origin_type(origin);
        if expected != found {
            return Err(Error::TypeMismatch { expected, found });
        }
        if self.user_region(user) != self.origin_region(origin) {
            return Err(Error::RegionMismatch("new origin is in another region"));
        }

        self.remove_user(old, user);
        self.set_user_origin(user, origin);
        self.add_user(origin, user);
        if let User::Input(input) = user {
            self.recompute_depth(input.node);
        }
        self.mark_denormalized();
        tracing::trace!(?user, from = ?old, to = ?origin, "diverted");
        self.notify(Event::EdgeRemoved { origin: old, user });
        self.notify(Event::EdgeAdded { origin, user });
        Ok(())
    }

    /// Divert a node input. See [`Graph::divert`].
    pub fn divert_input(&mut self, input: InputRef, origin: Origin) -> Result<()> {
        self.divert(User::Input(input), origin)
    }

    /// Divert every user of `from` to `to`.
    pub fn divert_users(&mut self, from: Origin, to: Origin) -> Result<()> {
        if from == to {
            return Ok(());
        }
        for user in self.users(from).to_vec() {
            self.divert(user, to)?;
        }
        Ok(())
    }

    /// Divert the users of each output of `node` to the matching origin in
    /// `replacements`, then remove `node`.
    pub fn replace_node(&mut self, node: NodeId, replacements: &[Origin]) -> Result<()> {
        assert_eq!(
            self.nodes[node].outputs.len(),
            replacements.len(),
            "replacement arity differs from {node:?}"
        );
        for (index, &to) in replacements.iter().enumerate() {
            self.divert_users(Origin::output(node, index), to)?;
        }
        tracing::trace!(?node, "replaced");
        self.remove_node(node);
        Ok(())
    }

    // ─── Depth ──────────────────────────────────────────────────────────

    /// Recompute the depth of `start` and propagate any change to its
    /// transitive users.
    ///
    /// The worklist is ordered by stored depth, so producers settle before
    /// their users and a node is normally processed once per call.
    pub(crate) fn recompute_depth(&mut self, start: NodeId) {
        let mut worklist = BTreeSet::from([(self.nodes[start].depth, start)]);
        while let Some((_, node)) = worklist.pop_first() {
            let depth = self.computed_depth(node);
            if depth == self.nodes[node].depth {
                continue;
            }
            self.nodes[node].depth = depth;
            for output in &self.nodes[node].outputs {
                for user in &output.users {
                    if let User::Input(input) = user {
                        worklist.insert((self.nodes[input.node].depth, input.node));
                    }
                }
            }
        }
    }

    fn computed_depth(&self, node: NodeId) -> usize {
        self.nodes[node]
            .inputs
            .iter()
            .filter_map(|input| input.origin.node())
            .map(|producer| self.nodes[producer].depth + 1)
            .max()
            .unwrap_or(0)
    }

    // ─── Removal ────────────────────────────────────────────────────────

    /// Destroy a node together with its subregions.
    ///
    /// Panics if any output still has users: callers divert or remove the
    /// consumers first.
    pub fn remove_node(&mut self, node: NodeId) {
        assert!(
            self.nodes[node].is_dead(),
            "node {node:?} removed while its outputs are in use"
        );
        for sub in self.nodes[node].subregions.clone() {
            self.destroy_region(sub);
        }
        while let Some(index) = self.nodes[node].inputs.len().checked_sub(1) {
            self.remove_input(InputRef { node, index });
        }

        self.notify(Event::NodeDestroyed(node));
        let removed = self.nodes.remove(node);
        let region = &mut self.regions[removed.region];
        region.nodes.remove(&node);
        region.top.remove(&node);
        region.bottom.remove(&node);
        tracing::trace!(?node, operation = %removed.operation, "node removed");
    }
}
