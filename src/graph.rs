//! The graph: arena storage for nodes and regions, edge references, and the
//! normal form registry.
//!
//! Every mutation goes through `&mut Graph`. Nodes and regions are addressed
//! by [`NodeId`] / [`RegionId`]; ports are addressed by (owner, index) pairs
//! which stay valid until a port before them is removed.

use crate::arena::{Arena, Id};
use crate::bits::BitValue;
use crate::error::{Error, Result};
use crate::node::Node;
use crate::normal_form::NormalForms;
use crate::operation::Operation;
use crate::region::Region;
use crate::traverser::{Event, TraversalState};
use crate::types::{Port, Type};

pub type NodeId = Id<Node>;
pub type RegionId = Id<Region>;

// ─── Port references ────────────────────────────────────────────────────────

/// A reference to a node's output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputRef {
    pub node: NodeId,
    pub index: usize,
}

/// A reference to a region argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArgumentRef {
    pub region: RegionId,
    pub index: usize,
}

/// A reference to a node's input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputRef {
    pub node: NodeId,
    pub index: usize,
}

/// A reference to a region result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResultRef {
    pub region: RegionId,
    pub index: usize,
}

/// Where a value comes from.
///
/// Every input and every result has exactly one origin, living in the same
/// region as the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Origin {
    /// An output of a node in the same region.
    Output(OutputRef),
    /// A region argument (value entering from outside).
    Argument(ArgumentRef),
}

impl Origin {
    pub fn output(node: NodeId, index: usize) -> Self {
        Origin::Output(OutputRef { node, index })
    }

    pub fn argument(region: RegionId, index: usize) -> Self {
        Origin::Argument(ArgumentRef { region, index })
    }

    /// The node owning this output, if it is not a region argument.
    pub fn node(self) -> Option<NodeId> {
        match self {
            Origin::Output(output) => Some(output.node),
            Origin::Argument(_) => None,
        }
    }
}

impl From<OutputRef> for Origin {
    fn from(output: OutputRef) -> Self {
        Origin::Output(output)
    }
}

impl From<ArgumentRef> for Origin {
    fn from(argument: ArgumentRef) -> Self {
        Origin::Argument(argument)
    }
}

/// Where a value is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum User {
    Input(InputRef),
    Result(ResultRef),
}

impl User {
    /// The consuming node, if this is not a region result.
    pub fn node(self) -> Option<NodeId> {
        match self {
            User::Input(input) => Some(input.node),
            User::Result(_) => None,
        }
    }
}

// ─── Graph ──────────────────────────────────────────────────────────────────

/// A complete RVSDG: a root region, everything nested in it, and the normal
/// forms governing node creation.
pub struct Graph {
    pub(crate) nodes: Arena<Node>,
    pub(crate) regions: Arena<Region>,
    pub(crate) traversals: Arena<TraversalState>,
    pub(crate) normal_forms: NormalForms,
    root: RegionId,
    denormalized: bool,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        let mut regions = Arena::new();
        let root = regions.push(Region::new(None));
        Graph {
            nodes: Arena::new(),
            regions,
            traversals: Arena::new(),
            normal_forms: NormalForms::new(),
            root,
            denormalized: false,
        }
    }

    /// The root region. It has no owning node; its arguments and results
    /// are the graph's imports and exports.
    pub fn root(&self) -> RegionId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id]
    }

    /// Whether `id` still names a live node.
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    pub fn contains_region(&self, id: RegionId) -> bool {
        self.regions.contains(id)
    }

    /// False whenever a mutation may have invalidated an earlier
    /// [`Graph::normalize`].
    pub fn is_normalized(&self) -> bool {
        !self.denormalized
    }

    pub fn mark_denormalized(&mut self) {
        self.denormalized = true;
    }

    // ─── Port queries ───────────────────────────────────────────────────

    pub fn origin_type(&self, origin: Origin) -> Type {
        match origin {
            Origin::Output(o) => self.nodes[o.node].outputs[o.index].port.ty,
            Origin::Argument(a) => self.regions[a.region].arguments[a.index].port.ty,
        }
    }

    pub fn origin_region(&self, origin: Origin) -> RegionId {
        match origin {
            Origin::Output(o) => self.nodes[o.node].region,
            Origin::Argument(a) => a.region,
        }
    }

    /// The consumers of a value, in the order they were connected.
    pub fn users(&self, origin: Origin) -> &[User] {
        match origin {
            Origin::Output(o) => &self.nodes[o.node].outputs[o.index].users,
            Origin::Argument(a) => &self.regions[a.region].arguments[a.index].users,
        }
    }

    pub fn user_origin(&self, user: User) -> Origin {
        match user {
            User::Input(i) => self.nodes[i.node].inputs[i.index].origin,
            User::Result(r) => self.regions[r.region].results[r.index].origin,
        }
    }

    pub fn user_type(&self, user: User) -> Type {
        match user {
            User::Input(i) => self.nodes[i.node].inputs[i.index].ty,
            User::Result(r) => self.regions[r.region].results[r.index].port.ty,
        }
    }

    pub fn user_region(&self, user: User) -> RegionId {
        match user {
            User::Input(i) => self.nodes[i.node].region,
            User::Result(r) => r.region,
        }
    }

    /// The node computing `origin`.
    ///
    /// Arguments of structural nodes are followed through their bound input
    /// into the enclosing region. Loop-carried theta arguments whose value
    /// changes between iterations have no single producer, and neither do
    /// the root region's imports.
    pub fn producer(&self, origin: Origin) -> Option<NodeId> {
        let argument = match origin {
            Origin::Output(o) => return Some(o.node),
            Origin::Argument(a) => a,
        };
        let region = &self.regions[argument.region];
        let input = region.arguments[argument.index].input?;
        let owner = &self.nodes[input.node];
        if let Operation::Theta = owner.operation {
            let invariant = region
                .results
                .get(argument.index + 1)
                .is_some_and(|result| result.origin == origin);
            if !invariant {
                return None;
            }
        }
        self.producer(owner.inputs[input.index].origin)
    }

    /// The constant carried by `origin`, if it is the output of a bitstring
    /// constant node.
    pub fn constant_value(&self, origin: Origin) -> Option<BitValue> {
        let Origin::Output(o) = origin else {
            return None;
        };
        self.nodes[o.node].operation.as_bit_constant()
    }

    /// How many structural nodes enclose `region`.
    pub fn nesting_depth(&self, region: RegionId) -> usize {
        let mut depth = 0;
        let mut cursor = region;
        while let Some(owner) = self.regions[cursor].node {
            depth += 1;
            cursor = self.nodes[owner].region;
        }
        depth
    }

    // ─── Imports and exports ────────────────────────────────────────────

    /// Add an unbound argument to the root region.
    pub fn add_import(&mut self, port: impl Into<Port>) -> Origin {
        let root = self.root;
        let index = self.regions[root].arguments.len();
        self.regions[root].arguments.push(crate::region::Argument {
            port: port.into(),
            users: Vec::new(),
            input: None,
        });
        Origin::argument(root, index)
    }

    /// Add an unbound result to the root region.
    pub fn add_export(&mut self, origin: Origin, port: impl Into<Port>) -> Result<ResultRef> {
        let root = self.root;
        self.add_result(root, origin, None, port.into())
    }

    // ─── Node creation ──────────────────────────────────────────────────

    pub(crate) fn validate_operands(
        &self,
        region: RegionId,
        operation: &Operation,
        operands: &[Origin],
    ) -> Result<()> {
        let Some(expected) = operation.argument_types() else {
            return Err(Error::InvalidOperation(operation.to_string()));
        };
        if let Operation::FlattenedBinary { op, arity } = operation {
            if *arity < 2 || !op.kind.is_associative() {
                return Err(Error::InvalidOperation(operation.to_string()));
            }
        }
        if expected.len() != operands.len() {
            return Err(Error::ArityMismatch {
                operation: operation.to_string(),
                expected: expected.len(),
                found: operands.len(),
            });
        }
        for (&ty, &origin) in expected.iter().zip(operands) {
            if self.origin_region(origin) != region {
                return Err(Error::RegionMismatch("operand is produced in another region"));
            }
            let found = self.origin_type(origin);
            if found != ty {
                return Err(Error::TypeMismatch {
                    expected: ty,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Create a simple node unconditionally, bypassing normal forms.
    ///
    /// Operands are validated before anything is linked, so a failed call
    /// leaves the region untouched.
    pub fn create_node(
        &mut self,
        region: RegionId,
        operation: Operation,
        operands: &[Origin],
    ) -> Result<NodeId> {
        self.validate_operands(region, &operation, operands)?;
        let result_types = operation.result_types();
        let node = self.insert_node(region, operation);
        for &origin in operands {
            self.link_input(node, origin);
        }
        for ty in result_types {
            self.push_output(node, Port::from(ty));
        }
        Ok(node)
    }

    /// Create a structural node with fresh, empty subregions. Inputs and
    /// outputs are added afterwards, together with their bound arguments
    /// and results.
    pub fn create_structural(&mut self, region: RegionId, operation: Operation) -> Result<NodeId> {
        let subregions = match operation {
            Operation::Gamma { alternatives } if alternatives > 0 => alternatives as usize,
            Operation::Theta => 1,
            _ => return Err(Error::InvalidOperation(operation.to_string())),
        };
        let node = self.insert_node(region, operation);
        for _ in 0..subregions {
            let sub = self.regions.push(Region::new(Some(node)));
            self.nodes[node].subregions.push(sub);
        }
        Ok(node)
    }

    fn insert_node(&mut self, region: RegionId, operation: Operation) -> NodeId {
        let node = self.nodes.push(Node::new(region, operation));
        let r = &mut self.regions[region];
        r.nodes.insert(node);
        r.top.insert(node);
        r.bottom.insert(node);
        self.denormalized = true;
        tracing::trace!(?node, ?region, operation = %self.nodes[node].operation, "node created");
        self.notify(Event::NodeCreated(node));
        node
    }

    /// The outputs of `node` as origins.
    pub fn outputs_of(&self, node: NodeId) -> Vec<Origin> {
        (0..self.nodes[node].outputs.len())
            .map(|index| Origin::output(node, index))
            .collect()
    }

    /// The origins feeding `node`, in input order.
    pub fn operands_of(&self, node: NodeId) -> Vec<Origin> {
        self.nodes[node].inputs.iter().map(|i| i.origin).collect()
    }

    // ─── Whole-graph passes ─────────────────────────────────────────────

    /// Normalize every region, innermost first, and clear the denormalized
    /// flag.
    pub fn normalize(&mut self) -> Result<()> {
        let root = self.root;
        self.normalize_region(root, true)?;
        self.denormalized = false;
        Ok(())
    }

    /// Remove every dead node, recursively.
    pub fn prune(&mut self) {
        let root = self.root;
        self.prune_region(root, true);
    }

    // ─── Counts ─────────────────────────────────────────────────────────

    /// Nodes in `region` and all of its subregions.
    pub fn nnodes(&self, region: RegionId) -> usize {
        self.fold_nodes(region, &|_| 1)
    }

    /// Structural nodes in `region` and all of its subregions.
    pub fn nstructnodes(&self, region: RegionId) -> usize {
        self.fold_nodes(region, &|node| node.is_structural() as usize)
    }

    /// Simple nodes in `region` and all of its subregions.
    pub fn nsimpnodes(&self, region: RegionId) -> usize {
        self.fold_nodes(region, &|node| (!node.is_structural()) as usize)
    }

    /// Node inputs and region results in `region` and all of its subregions.
    pub fn ninputs(&self, region: RegionId) -> usize {
        let r = &self.regions[region];
        r.results.len()
            + r.nodes
                .iter()
                .map(|&n| {
                    let node = &self.nodes[n];
                    node.inputs.len()
                        + node
                            .subregions
                            .iter()
                            .map(|&sub| self.ninputs(sub))
                            .sum::<usize>()
                })
                .sum::<usize>()
    }

    fn fold_nodes(&self, region: RegionId, count: &dyn Fn(&Node) -> usize) -> usize {
        self.regions[region]
            .nodes
            .iter()
            .map(|&n| {
                let node = &self.nodes[n];
                count(node)
                    + node
                        .subregions
                        .iter()
                        .map(|&sub| self.fold_nodes(sub, count))
                        .sum::<usize>()
            })
            .sum()
    }

    // ─── Change notification ────────────────────────────────────────────

    /// Forward a mutation to every traversal active over the affected region.
    pub(crate) fn notify(&mut self, event: Event) {
        if self.traversals.is_empty() {
            return;
        }
        self.reap_traversals();
        let region = match event {
            Event::NodeCreated(node) | Event::NodeDestroyed(node) => self.nodes[node].region,
            Event::EdgeAdded { user, .. } | Event::EdgeRemoved { user, .. } => {
                self.user_region(user)
            }
        };
        let nodes = &self.nodes;
        for (_, state) in self.traversals.iter_mut() {
            if state.region() == region {
                state.observe(nodes, event);
            }
        }
    }
}
