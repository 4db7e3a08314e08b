//! Normal forms: per-operation-kind rewrite rules applied at node creation
//! and during [`Graph::normalize`].
//!
//! The registry is a tree mirroring the operation vocabulary (see
//! [`OpKind::parent`]). Setting a flag on a kind propagates it to every
//! descendant that supports the flag, stopping at descendants already
//! holding the requested value.

pub(crate) mod binary;
pub(crate) mod gamma;
pub(crate) mod simple;
pub(crate) mod unary;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId, Origin, RegionId};
use crate::operation::{OpKind, Operation};

pub use binary::ExpandMode;

/// A toggle on a normal form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    /// When off, nodes of this kind are created and kept exactly as requested.
    Mutable,
    /// Reuse an existing node with the same operation and operands.
    Cse,
    /// Fold constant operands and eliminate neutral elements.
    Reducible,
    /// Merge chains of an associative operator into one n-ary node.
    Flatten,
    /// Sort the operands of commutative operators canonically.
    Reorder,
    /// Rewrite `x * (a + b)` into `x*a + x*b`.
    Distribute,
    /// Rewrite `x*a + x*b` into `x * (a + b)`.
    Factorize,
    /// Inline the selected branch of a gamma with a constant predicate.
    PredicateReduction,
    /// Route gamma exit variables that merely forward an entry variable
    /// around the gamma.
    InvariantReduction,
}

impl Flag {
    pub fn name(self) -> &'static str {
        match self {
            Flag::Mutable => "mutable",
            Flag::Cse => "cse",
            Flag::Reducible => "reducible",
            Flag::Flatten => "flatten",
            Flag::Reorder => "reorder",
            Flag::Distribute => "distribute",
            Flag::Factorize => "factorize",
            Flag::PredicateReduction => "predicate_reduction",
            Flag::InvariantReduction => "invariant_reduction",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The rule set of one operation kind.
#[derive(Debug, Clone)]
pub struct NormalForm {
    kind: OpKind,
    children: Vec<OpKind>,
    flags: BTreeMap<Flag, bool>,
}

impl NormalForm {
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn parent(&self) -> Option<OpKind> {
        self.kind.parent()
    }

    pub fn children(&self) -> &[OpKind] {
        &self.children
    }

    pub fn supports(&self, flag: Flag) -> bool {
        self.flags.contains_key(&flag)
    }

    /// The current value of `flag`, or `None` if this kind lacks it.
    pub fn get(&self, flag: Flag) -> Option<bool> {
        self.flags.get(&flag).copied()
    }

    /// Every supported flag with its current value.
    pub fn flags(&self) -> impl Iterator<Item = (Flag, bool)> + '_ {
        self.flags.iter().map(|(&flag, &value)| (flag, value))
    }
}

/// Default flags for a kind.
fn default_flags(kind: OpKind) -> Vec<(Flag, bool)> {
    let mut flags = vec![(Flag::Mutable, true), (Flag::Cse, true)];
    match kind {
        OpKind::UnaryFamily | OpKind::Unary(_) | OpKind::Match => {
            flags.push((Flag::Reducible, true));
        }
        OpKind::BinaryFamily | OpKind::Binary(_) => flags.extend([
            (Flag::Reducible, true),
            (Flag::Flatten, true),
            (Flag::Reorder, true),
            (Flag::Distribute, false),
            (Flag::Factorize, false),
        ]),
        OpKind::Gamma => flags.extend([
            (Flag::PredicateReduction, true),
            (Flag::InvariantReduction, true),
        ]),
        _ => {}
    }
    flags
}

/// Every normal form of a graph, keyed by kind.
#[derive(Debug, Clone)]
pub struct NormalForms {
    forms: BTreeMap<OpKind, NormalForm>,
}

impl NormalForms {
    pub(crate) fn new() -> Self {
        let mut forms: BTreeMap<OpKind, NormalForm> = OpKind::all()
            .into_iter()
            .map(|kind| {
                let form = NormalForm {
                    kind,
                    children: Vec::new(),
                    flags: default_flags(kind).into_iter().collect(),
                };
                (kind, form)
            })
            .collect();
        for kind in OpKind::all() {
            if let Some(parent) = kind.parent() {
                if let Some(form) = forms.get_mut(&parent) {
                    form.children.push(kind);
                }
            }
        }
        NormalForms { forms }
    }

    pub fn get(&self, kind: OpKind) -> &NormalForm {
        &self.forms[&kind]
    }

    /// The value of `flag` for `kind`; false where unsupported.
    pub(crate) fn flag(&self, kind: OpKind, flag: Flag) -> bool {
        self.forms[&kind].get(flag).unwrap_or(false)
    }

    pub(crate) fn set(&mut self, kind: OpKind, flag: Flag, value: bool) -> Result<()> {
        let form = self.forms.get_mut(&kind).ok_or_else(|| Error::UnsupportedFlag {
            kind: kind.to_string(),
            flag: flag.to_string(),
        })?;
        let Some(slot) = form.flags.get_mut(&flag) else {
            return Err(Error::UnsupportedFlag {
                kind: kind.to_string(),
                flag: flag.to_string(),
            });
        };
        *slot = value;
        for child in form.children.clone() {
            self.propagate(child, flag, value);
        }
        Ok(())
    }

    fn propagate(&mut self, kind: OpKind, flag: Flag, value: bool) {
        let Some(form) = self.forms.get_mut(&kind) else {
            return;
        };
        match form.flags.get_mut(&flag) {
            Some(slot) if *slot != value => *slot = value,
            _ => return,
        }
        for child in form.children.clone() {
            self.propagate(child, flag, value);
        }
    }
}

impl Graph {
    pub fn normal_form(&self, kind: OpKind) -> &NormalForm {
        self.normal_forms.get(kind)
    }

    /// Set `flag` on `kind` and its descendants. Enabling a flag marks the
    /// graph denormalized.
    pub fn set_flag(&mut self, kind: OpKind, flag: Flag, value: bool) -> Result<()> {
        self.normal_forms.set(kind, flag, value)?;
        tracing::debug!(%kind, %flag, value, "normal form flag set");
        if value {
            self.mark_denormalized();
        }
        Ok(())
    }

    pub(crate) fn flag(&self, kind: OpKind, flag: Flag) -> bool {
        self.normal_forms.flag(kind, flag)
    }

    /// Create a simple node through its normal form.
    ///
    /// The normal form may return the outputs of an existing equivalent
    /// node, a simplified value, or the outputs of a new node.
    pub fn create(
        &mut self,
        region: RegionId,
        operation: Operation,
        operands: &[Origin],
    ) -> Result<Vec<Origin>> {
        self.validate_operands(region, &operation, operands)?;
        if !self.flag(operation.kind(), Flag::Mutable) {
            let node = self.create_node(region, operation, operands)?;
            return Ok(self.outputs_of(node));
        }
        match operation {
            Operation::Binary(op) | Operation::FlattenedBinary { op, .. } => {
                binary::normalized_create(self, region, op, operands.to_vec())
            }
            Operation::Unary(_) | Operation::Match(_) => {
                unary::normalized_create(self, region, operation, operands[0])
            }
            _ => simple::normalized_create(self, region, operation, operands),
        }
    }

    /// Create a node with a single output and return that output.
    pub fn create_value(
        &mut self,
        region: RegionId,
        operation: Operation,
        operands: &[Origin],
    ) -> Result<Origin> {
        let outputs = self.create(region, operation, operands)?;
        match outputs.as_slice() {
            [single] => Ok(*single),
            _ => Err(Error::ArityMismatch {
                operation: "single-result creation".to_string(),
                expected: 1,
                found: outputs.len(),
            }),
        }
    }

    /// Apply the normal form of `node` to it. Returns whether anything
    /// changed; the node may have been removed.
    pub fn normalize_node(&mut self, node: NodeId) -> Result<bool> {
        let kind = self.nodes[node].operation.kind();
        if !self.flag(kind, Flag::Mutable) {
            return Ok(false);
        }
        match kind {
            OpKind::Binary(_) | OpKind::FlattenedBinary => binary::normalize_node(self, node),
            OpKind::Unary(_) | OpKind::Match => unary::normalize_node(self, node),
            OpKind::Gamma => gamma::normalize_node(self, node),
            OpKind::Theta => Ok(false),
            _ => simple::normalize_node(self, node),
        }
    }
}
