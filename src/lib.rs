//! Core of a regionalized value state dependence graph (RVSDG) IR.
//!
//! A [`Graph`] owns a tree of regions. Each region holds simple nodes
//! (operations on values) and structural nodes ([`Gamma`], [`Theta`])
//! whose subregions nest further graphs. Edges run from an [`Origin`]
//! (node output or region argument) to a [`User`] (node input or region
//! result) within one region.
//!
//! Nodes created through [`Graph::create`] pass through per-kind normal
//! forms: common subexpression elimination, constant folding, and
//! algebraic canonicalization of binary operators. [`Graph::normalize`]
//! applies the same rules to an existing graph after flags change.

pub mod arena;
pub mod bits;
pub mod config;
pub mod error;
pub mod graph;
pub mod immediate;
pub mod node;
pub mod normal_form;
pub mod operation;
pub mod region;
pub mod structural;
pub mod substitution;
pub mod traverser;
pub mod types;
pub mod view;

pub use bits::BitValue;
pub use config::NormalFormConfig;
pub use error::{Error, Result};
pub use graph::{
    ArgumentRef, Graph, InputRef, NodeId, Origin, OutputRef, RegionId, ResultRef, User,
};
pub use immediate::{Immediate, Label};
pub use normal_form::{ExpandMode, Flag};
pub use operation::{BinaryKind, BinaryOp, MatchOp, OpKind, OpaqueOp, Operation, UnaryKind, UnaryOp};
pub use structural::{EntryVar, Gamma, LoopVar, Theta};
pub use substitution::SubstitutionMap;
pub use traverser::{Direction, Traverser, Visit};
pub use types::{Port, Type};
