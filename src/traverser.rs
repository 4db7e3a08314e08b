//! Depth-ordered traversal of a region that tolerates mutation.
//!
//! A traversal registers itself with the graph and is told about every node
//! and edge change in its region. Each node carries a mark:
//!
//! - `Ahead`: not visited, still waiting on an upstream node.
//! - `Frontier`: not visited, every upstream node is done.
//! - `Visited`: yielded.
//! - `Bypassed`: created during the traversal without depending on any
//!   pending node, so it is skipped.
//!
//! "Upstream" means producers for a top-down walk and users for a
//! bottom-up one. A bypassed node that gains a pending downstream node is
//! revived so the pending node still sees it first.

use std::collections::{BTreeSet, HashMap};
use std::rc::{Rc, Weak};

use crate::arena::{Arena, Id};
use crate::graph::{Graph, NodeId, Origin, RegionId, User};
use crate::node::Node;

/// One step of a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Node(NodeId),
    /// The region's results, treated as a synthetic node consuming every
    /// exported value. Last in top-down order, first in bottom-up order.
    Results(RegionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    TopDown,
    BottomUp,
}

/// A mutation reported to active traversals.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Event {
    NodeCreated(NodeId),
    NodeDestroyed(NodeId),
    EdgeAdded { origin: Origin, user: User },
    EdgeRemoved { origin: Origin, user: User },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Ahead,
    Frontier,
    Visited,
    Bypassed,
}

impl Mark {
    fn is_done(self) -> bool {
        matches!(self, Mark::Visited | Mark::Bypassed)
    }
}

#[derive(Debug)]
pub(crate) struct TraversalState {
    region: RegionId,
    handle: Weak<()>,
    direction: Direction,
    marks: HashMap<NodeId, Mark>,
    frontier: BTreeSet<NodeId>,
    results_visited: bool,
}

impl TraversalState {
    fn new(graph: &Graph, region: RegionId, direction: Direction, handle: Weak<()>) -> Self {
        let mut state = TraversalState {
            region,
            handle,
            direction,
            marks: HashMap::new(),
            frontier: BTreeSet::new(),
            results_visited: false,
        };
        let members = &graph.regions[region].nodes;
        for &node in members {
            state.marks.insert(node, Mark::Ahead);
        }
        for &node in members {
            if state.is_ready(&graph.nodes, node) {
                state.set(node, Mark::Frontier);
            }
        }
        state
    }

    pub(crate) fn region(&self) -> RegionId {
        self.region
    }

    /// Whether the owning [`Traverser`] still exists.
    pub(crate) fn is_live(&self) -> bool {
        self.handle.strong_count() > 0
    }

    fn mark(&self, node: NodeId) -> Mark {
        self.marks.get(&node).copied().unwrap_or(Mark::Ahead)
    }

    fn set(&mut self, node: NodeId, mark: Mark) {
        if mark == Mark::Frontier {
            self.frontier.insert(node);
        } else {
            self.frontier.remove(&node);
        }
        self.marks.insert(node, mark);
    }

    fn producers(nodes: &Arena<Node>, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        nodes[node].inputs.iter().filter_map(|i| i.origin.node())
    }

    fn consumers(nodes: &Arena<Node>, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        nodes[node]
            .outputs
            .iter()
            .flat_map(|o| o.users.iter().filter_map(|u| u.node()))
    }

    fn upstream(&self, nodes: &Arena<Node>, node: NodeId) -> Vec<NodeId> {
        match self.direction {
            Direction::TopDown => Self::producers(nodes, node).collect(),
            Direction::BottomUp => Self::consumers(nodes, node).collect(),
        }
    }

    fn downstream(&self, nodes: &Arena<Node>, node: NodeId) -> Vec<NodeId> {
        match self.direction {
            Direction::TopDown => Self::consumers(nodes, node).collect(),
            Direction::BottomUp => Self::producers(nodes, node).collect(),
        }
    }

    fn is_ready(&self, nodes: &Arena<Node>, node: NodeId) -> bool {
        self.upstream(nodes, node)
            .into_iter()
            .all(|n| self.mark(n).is_done())
    }

    /// Split an edge into (upstream, downstream) endpoints for this direction.
    fn orient(&self, origin: Origin, user: User) -> (Option<NodeId>, Option<NodeId>) {
        match self.direction {
            Direction::TopDown => (origin.node(), user.node()),
            Direction::BottomUp => (user.node(), origin.node()),
        }
    }

    fn revive(&mut self, nodes: &Arena<Node>, node: NodeId) {
        self.set(node, Mark::Ahead);
        for up in self.upstream(nodes, node) {
            if self.mark(up) == Mark::Bypassed {
                self.revive(nodes, up);
            }
        }
        if self.is_ready(nodes, node) {
            self.set(node, Mark::Frontier);
        }
    }

    pub(crate) fn advance(&mut self, nodes: &Arena<Node>) -> Option<Visit> {
        if self.direction == Direction::BottomUp && !self.results_visited {
            self.results_visited = true;
            return Some(Visit::Results(self.region));
        }

        let key = |&n: &NodeId| (nodes[n].depth, n);
        let candidates = self.frontier.iter().copied();
        let next = match self.direction {
            Direction::TopDown => candidates.min_by_key(key),
            Direction::BottomUp => candidates.max_by_key(key),
        };
        if let Some(node) = next {
            self.set(node, Mark::Visited);
            for down in self.downstream(nodes, node) {
                if self.mark(down) == Mark::Ahead && self.is_ready(nodes, down) {
                    self.set(down, Mark::Frontier);
                }
            }
            return Some(Visit::Node(node));
        }

        if self.direction == Direction::TopDown && !self.results_visited {
            self.results_visited = true;
            return Some(Visit::Results(self.region));
        }
        None
    }

    pub(crate) fn observe(&mut self, nodes: &Arena<Node>, event: Event) {
        match event {
            Event::NodeCreated(node) => self.set(node, Mark::Bypassed),
            Event::NodeDestroyed(node) => {
                self.marks.remove(&node);
                self.frontier.remove(&node);
            }
            Event::EdgeAdded { origin, user } => {
                let (Some(up), Some(down)) = self.orient(origin, user) else {
                    return;
                };
                let down_mark = self.mark(down);
                if down_mark == Mark::Visited {
                    return;
                }
                if self.mark(up) == Mark::Bypassed && down_mark != Mark::Bypassed {
                    self.revive(nodes, up);
                }
                if !self.mark(up).is_done() && matches!(self.mark(down), Mark::Frontier | Mark::Bypassed) {
                    self.set(down, Mark::Ahead);
                }
            }
            Event::EdgeRemoved { origin, user } => {
                let (_, Some(down)) = self.orient(origin, user) else {
                    return;
                };
                if self.mark(down) == Mark::Ahead && self.is_ready(nodes, down) {
                    self.set(down, Mark::Frontier);
                }
            }
        }
    }
}

/// Handle to a traversal registered with a [`Graph`].
///
/// The traversal stays registered until [`Traverser::next`] returns `None`,
/// [`Traverser::finish`] is called, or the handle is dropped. While it is
/// registered its region reports active traversers and cannot be destroyed.
/// State left behind by a dropped handle is reclaimed on the graph's next
/// mutation.
#[derive(Debug)]
#[must_use = "a traversal does nothing unless `next` is called"]
pub struct Traverser {
    id: Id<TraversalState>,
    region: RegionId,
    alive: Option<Rc<()>>,
}

impl Traverser {
    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn next(&mut self, graph: &mut Graph) -> Option<Visit> {
        self.alive.as_ref()?;
        let nodes = &graph.nodes;
        let visit = graph.traversals[self.id].advance(nodes);
        if visit.is_none() {
            self.release(graph);
        }
        visit
    }

    /// Stop early and unregister.
    pub fn finish(mut self, graph: &mut Graph) {
        self.release(graph);
    }

    fn release(&mut self, graph: &mut Graph) {
        if let Some(alive) = self.alive.take() {
            drop(alive);
            graph.traversals.remove(self.id);
            graph.regions[self.region]
                .traversers
                .retain(|t| t.strong_count() > 0);
        }
    }
}

impl Graph {
    /// Start a traversal yielding every node after all of its producers.
    pub fn top_down(&mut self, region: RegionId) -> Traverser {
        self.start_traversal(region, Direction::TopDown)
    }

    /// Start a traversal yielding every node after all of its users.
    pub fn bottom_up(&mut self, region: RegionId) -> Traverser {
        self.start_traversal(region, Direction::BottomUp)
    }

    fn start_traversal(&mut self, region: RegionId, direction: Direction) -> Traverser {
        self.reap_traversals();
        let alive = Rc::new(());
        let state = TraversalState::new(self, region, direction, Rc::downgrade(&alive));
        let id = self.traversals.push(state);
        self.regions[region].traversers.push(Rc::downgrade(&alive));
        Traverser {
            id,
            region,
            alive: Some(alive),
        }
    }

    /// Drop the state of traversals whose handle is gone.
    pub(crate) fn reap_traversals(&mut self) {
        let dead: Vec<(Id<TraversalState>, RegionId)> = self
            .traversals
            .iter()
            .filter(|(_, state)| !state.is_live())
            .map(|(id, state)| (id, state.region))
            .collect();
        for (id, region) in dead {
            tracing::trace!(?region, "reaping dropped traversal");
            self.traversals.remove(id);
            if let Some(region) = self.regions.get_mut(region) {
                region.traversers.retain(|t| t.strong_count() > 0);
            }
        }
    }

    /// The nodes of `region` in traversal order, without registering a
    /// traversal.
    pub fn traversal_order(&self, region: RegionId, direction: Direction) -> Vec<NodeId> {
        let mut state = TraversalState::new(self, region, direction, Weak::new());
        let mut order = Vec::with_capacity(self.regions[region].nodes.len());
        while let Some(visit) = state.advance(&self.nodes) {
            if let Visit::Node(node) = visit {
                order.push(node);
            }
        }
        order
    }
}
