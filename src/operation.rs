//! The operation vocabulary labelling nodes.
//!
//! Operations are immutable values: two nodes compute the same thing iff
//! their operations compare equal and their operands are identical. The set
//! is closed; capability queries (is this a bitstring binary operator, is it
//! structural) are plain matches on [`Operation`] rather than run-time type
//! inspection.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::bits::BitValue;
use crate::error::Error;
use crate::types::Type;

// ─── Unary ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnaryKind {
    /// Two's complement negation.
    Neg,
    /// Bitwise complement.
    Not,
}

impl UnaryKind {
    pub const ALL: [UnaryKind; 2] = [UnaryKind::Neg, UnaryKind::Not];

    pub fn name(self) -> &'static str {
        match self {
            UnaryKind::Neg => "bitneg",
            UnaryKind::Not => "bitnot",
        }
    }

    pub fn fold(self, operand: BitValue) -> BitValue {
        match self {
            UnaryKind::Neg => operand.neg(),
            UnaryKind::Not => operand.not(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnaryOp {
    pub kind: UnaryKind,
    pub width: u32,
}

// ─── Binary ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BinaryKind {
    And,
    Or,
    Xor,
    Add,
    Sub,
    Mul,
    UMulH,
    SMulH,
    Shl,
    Shr,
    AShr,
    UDiv,
    SDiv,
    UMod,
    SMod,
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

/// Outcome of simplifying one operand pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PairReduction {
    /// The pair collapses to a constant.
    Constant(BitValue),
    /// The pair is equivalent to its left operand.
    Left,
    /// The pair is equivalent to its right operand.
    Right,
}

impl BinaryKind {
    pub const ALL: [BinaryKind; 25] = [
        BinaryKind::And,
        BinaryKind::Or,
        BinaryKind::Xor,
        BinaryKind::Add,
        BinaryKind::Sub,
        BinaryKind::Mul,
        BinaryKind::UMulH,
        BinaryKind::SMulH,
        BinaryKind::Shl,
        BinaryKind::Shr,
        BinaryKind::AShr,
        BinaryKind::UDiv,
        BinaryKind::SDiv,
        BinaryKind::UMod,
        BinaryKind::SMod,
        BinaryKind::Eq,
        BinaryKind::Ne,
        BinaryKind::Slt,
        BinaryKind::Sle,
        BinaryKind::Sgt,
        BinaryKind::Sge,
        BinaryKind::Ult,
        BinaryKind::Ule,
        BinaryKind::Ugt,
        BinaryKind::Uge,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BinaryKind::And => "bitand",
            BinaryKind::Or => "bitor",
            BinaryKind::Xor => "bitxor",
            BinaryKind::Add => "bitadd",
            BinaryKind::Sub => "bitsub",
            BinaryKind::Mul => "bitmul",
            BinaryKind::UMulH => "bitumulh",
            BinaryKind::SMulH => "bitsmulh",
            BinaryKind::Shl => "bitshl",
            BinaryKind::Shr => "bitshr",
            BinaryKind::AShr => "bitashr",
            BinaryKind::UDiv => "bitudiv",
            BinaryKind::SDiv => "bitsdiv",
            BinaryKind::UMod => "bitumod",
            BinaryKind::SMod => "bitsmod",
            BinaryKind::Eq => "biteq",
            BinaryKind::Ne => "bitne",
            BinaryKind::Slt => "bitslt",
            BinaryKind::Sle => "bitsle",
            BinaryKind::Sgt => "bitsgt",
            BinaryKind::Sge => "bitsge",
            BinaryKind::Ult => "bitult",
            BinaryKind::Ule => "bitule",
            BinaryKind::Ugt => "bitugt",
            BinaryKind::Uge => "bituge",
        }
    }

    pub fn is_associative(self) -> bool {
        matches!(
            self,
            BinaryKind::And | BinaryKind::Or | BinaryKind::Xor | BinaryKind::Add | BinaryKind::Mul
        )
    }

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryKind::And
                | BinaryKind::Or
                | BinaryKind::Xor
                | BinaryKind::Add
                | BinaryKind::Mul
                | BinaryKind::UMulH
                | BinaryKind::SMulH
                | BinaryKind::Eq
                | BinaryKind::Ne
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryKind::Eq
                | BinaryKind::Ne
                | BinaryKind::Slt
                | BinaryKind::Sle
                | BinaryKind::Sgt
                | BinaryKind::Sge
                | BinaryKind::Ult
                | BinaryKind::Ule
                | BinaryKind::Ugt
                | BinaryKind::Uge
        )
    }

    /// Whether `x self (y outer z) == (x self y) outer (x self z)`.
    pub fn distributes_over(self, outer: BinaryKind) -> bool {
        matches!(
            (self, outer),
            (BinaryKind::Mul, BinaryKind::Add)
                | (BinaryKind::Mul, BinaryKind::Sub)
                | (BinaryKind::And, BinaryKind::Or)
                | (BinaryKind::And, BinaryKind::Xor)
                | (BinaryKind::Or, BinaryKind::And)
        )
    }

    /// Evaluate on two constants. `None` when the result is undefined
    /// (division by zero).
    pub fn fold(self, lhs: BitValue, rhs: BitValue) -> Option<BitValue> {
        let value = match self {
            BinaryKind::And => lhs.and(rhs),
            BinaryKind::Or => lhs.or(rhs),
            BinaryKind::Xor => lhs.xor(rhs),
            BinaryKind::Add => lhs.add(rhs),
            BinaryKind::Sub => lhs.sub(rhs),
            BinaryKind::Mul => lhs.mul(rhs),
            BinaryKind::UMulH => lhs.umulh(rhs),
            BinaryKind::SMulH => lhs.smulh(rhs),
            BinaryKind::Shl => lhs.shl(rhs),
            BinaryKind::Shr => lhs.shr(rhs),
            BinaryKind::AShr => lhs.ashr(rhs),
            BinaryKind::UDiv => return lhs.udiv(rhs),
            BinaryKind::SDiv => return lhs.sdiv(rhs),
            BinaryKind::UMod => return lhs.umod(rhs),
            BinaryKind::SMod => return lhs.smod(rhs),
            BinaryKind::Eq => lhs.eq(rhs),
            BinaryKind::Ne => lhs.ne(rhs),
            BinaryKind::Slt => lhs.slt(rhs),
            BinaryKind::Sle => lhs.sle(rhs),
            BinaryKind::Sgt => rhs.slt(lhs),
            BinaryKind::Sge => rhs.sle(lhs),
            BinaryKind::Ult => lhs.ult(rhs),
            BinaryKind::Ule => lhs.ule(rhs),
            BinaryKind::Ugt => rhs.ult(lhs),
            BinaryKind::Uge => rhs.ule(lhs),
        };
        Some(value)
    }

    /// Simplify an operand pair given whichever operands are constants.
    pub(crate) fn reduce_pair(
        self,
        lhs: Option<BitValue>,
        rhs: Option<BitValue>,
    ) -> Option<PairReduction> {
        if let (Some(l), Some(r)) = (lhs, rhs) {
            return self.fold(l, r).map(PairReduction::Constant);
        }
        let zero_of = |v: BitValue| BitValue::new(v.width(), 0);
        match self {
            BinaryKind::Add | BinaryKind::Xor => match (lhs, rhs) {
                (Some(l), _) if l.is_zero() => Some(PairReduction::Right),
                (_, Some(r)) if r.is_zero() => Some(PairReduction::Left),
                _ => None,
            },
            BinaryKind::Or => match (lhs, rhs) {
                (Some(l), _) if l.is_zero() => Some(PairReduction::Right),
                (_, Some(r)) if r.is_zero() => Some(PairReduction::Left),
                (Some(c), _) | (_, Some(c)) if c.is_all_ones() => Some(PairReduction::Constant(c)),
                _ => None,
            },
            BinaryKind::And => match (lhs, rhs) {
                (Some(c), _) | (_, Some(c)) if c.is_zero() => Some(PairReduction::Constant(c)),
                (Some(l), _) if l.is_all_ones() => Some(PairReduction::Right),
                (_, Some(r)) if r.is_all_ones() => Some(PairReduction::Left),
                _ => None,
            },
            BinaryKind::Mul => match (lhs, rhs) {
                (Some(c), _) | (_, Some(c)) if c.is_zero() => Some(PairReduction::Constant(c)),
                (Some(l), _) if l.is_one() => Some(PairReduction::Right),
                (_, Some(r)) if r.is_one() => Some(PairReduction::Left),
                _ => None,
            },
            BinaryKind::Sub => match rhs {
                Some(r) if r.is_zero() => Some(PairReduction::Left),
                _ => None,
            },
            BinaryKind::Shl | BinaryKind::Shr | BinaryKind::AShr => match (lhs, rhs) {
                (_, Some(r)) if r.is_zero() => Some(PairReduction::Left),
                (Some(l), _) if l.is_zero() => Some(PairReduction::Constant(zero_of(l))),
                _ => None,
            },
            BinaryKind::UDiv | BinaryKind::SDiv => match rhs {
                Some(r) if r.is_one() => Some(PairReduction::Left),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinaryOp {
    pub kind: BinaryKind,
    pub width: u32,
}

impl BinaryOp {
    pub fn new(kind: BinaryKind, width: u32) -> Self {
        BinaryOp { kind, width }
    }

    pub fn result_type(&self) -> Type {
        if self.kind.is_comparison() {
            Type::Bits(1)
        } else {
            Type::Bits(self.width)
        }
    }
}

// ─── Match and opaque ───────────────────────────────────────────────────────

/// Map a bitstring to a control value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchOp {
    pub width: u32,
    pub mapping: BTreeMap<u64, u32>,
    pub default_alternative: u32,
    pub alternatives: u32,
}

impl MatchOp {
    pub fn alternative(&self, value: u64) -> u32 {
        self.mapping
            .get(&value)
            .copied()
            .unwrap_or(self.default_alternative)
    }
}

/// An uninterpreted simple operation, identified by name and signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpaqueOp {
    pub name: String,
    pub arguments: Vec<Type>,
    pub results: Vec<Type>,
}

// ─── Operation ──────────────────────────────────────────────────────────────

/// The operation computed by a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    /// A bitstring literal.
    /// Inputs: []. Outputs: [Bits(w)].
    BitConstant(BitValue),

    /// Inputs: [Bits(w)]. Outputs: [Bits(w)].
    Unary(UnaryOp),

    /// Inputs: [Bits(w), Bits(w)]. Outputs: [Bits(w)] or [Bits(1)] for comparisons.
    Binary(BinaryOp),

    /// The n-ary form of an associative binary operator.
    /// Inputs: [Bits(w) * arity]. Outputs: [Bits(w)].
    FlattenedBinary { op: BinaryOp, arity: usize },

    /// Inputs: []. Outputs: [Control(alternatives)].
    ControlConstant { alternatives: u32, value: u32 },

    /// Inputs: [Bits(w)]. Outputs: [Control(alternatives)].
    Match(MatchOp),

    Opaque(OpaqueOp),

    /// Multi-way branch. First input is the Control(alternatives) predicate,
    /// one subregion per alternative.
    Gamma { alternatives: u32 },

    /// Tail-controlled loop with a single body region.
    Theta,
}

impl Operation {
    pub fn bit_constant(width: u32, value: u64) -> Self {
        Operation::BitConstant(BitValue::new(width, value))
    }

    pub fn signed_constant(width: u32, value: i64) -> Self {
        Operation::BitConstant(BitValue::from_signed(width, value))
    }

    pub fn binary(kind: BinaryKind, width: u32) -> Self {
        Operation::Binary(BinaryOp::new(kind, width))
    }

    pub fn unary(kind: UnaryKind, width: u32) -> Self {
        Operation::Unary(UnaryOp { kind, width })
    }

    pub fn opaque(name: impl Into<String>, arguments: Vec<Type>, results: Vec<Type>) -> Self {
        Operation::Opaque(OpaqueOp {
            name: name.into(),
            arguments,
            results,
        })
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, Operation::Gamma { .. } | Operation::Theta)
    }

    pub fn as_bit_constant(&self) -> Option<BitValue> {
        match self {
            Operation::BitConstant(value) => Some(*value),
            _ => None,
        }
    }

    /// Operand types of a simple operation. Structural operations have a
    /// variable signature and return `None`.
    pub fn argument_types(&self) -> Option<Vec<Type>> {
        let types = match self {
            Operation::BitConstant(_) | Operation::ControlConstant { .. } => Vec::new(),
            Operation::Unary(op) => vec![Type::Bits(op.width)],
            Operation::Binary(op) => vec![Type::Bits(op.width); 2],
            Operation::FlattenedBinary { op, arity } => vec![Type::Bits(op.width); *arity],
            Operation::Match(op) => vec![Type::Bits(op.width)],
            Operation::Opaque(op) => op.arguments.clone(),
            Operation::Gamma { .. } | Operation::Theta => return None,
        };
        Some(types)
    }

    /// Result types of a simple operation. Structural outputs are added
    /// alongside their exit variables, so this is empty for them.
    pub fn result_types(&self) -> Vec<Type> {
        match self {
            Operation::BitConstant(value) => vec![Type::Bits(value.width())],
            Operation::Unary(op) => vec![Type::Bits(op.width)],
            Operation::Binary(op) | Operation::FlattenedBinary { op, .. } => {
                vec![op.result_type()]
            }
            Operation::ControlConstant { alternatives, .. } => vec![Type::Control(*alternatives)],
            Operation::Match(op) => vec![Type::Control(op.alternatives)],
            Operation::Opaque(op) => op.results.clone(),
            Operation::Gamma { .. } | Operation::Theta => Vec::new(),
        }
    }

    /// The normal form key for this operation.
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::BitConstant(_) => OpKind::BitConstant,
            Operation::Unary(op) => OpKind::Unary(op.kind),
            Operation::Binary(op) => OpKind::Binary(op.kind),
            Operation::FlattenedBinary { .. } => OpKind::FlattenedBinary,
            Operation::ControlConstant { .. } => OpKind::ControlConstant,
            Operation::Match(_) => OpKind::Match,
            Operation::Opaque(_) => OpKind::Opaque,
            Operation::Gamma { .. } => OpKind::Gamma,
            Operation::Theta => OpKind::Theta,
        }
    }

    /// For single-operand operations: the constant operation this reduces
    /// to when its operand is the constant `value`.
    pub fn reduce_constant_operand(&self, value: BitValue) -> Option<Operation> {
        match self {
            Operation::Unary(op) => Some(Operation::BitConstant(op.kind.fold(value))),
            Operation::Match(op) => Some(Operation::ControlConstant {
                alternatives: op.alternatives,
                value: op.alternative(value.to_unsigned()),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::BitConstant(value) => write!(f, "bitconstant({}, {value})", value.width()),
            Operation::Unary(op) => write!(f, "{}({})", op.kind.name(), op.width),
            Operation::Binary(op) => write!(f, "{}({})", op.kind.name(), op.width),
            Operation::FlattenedBinary { op, arity } => {
                write!(f, "{}({})x{arity}", op.kind.name(), op.width)
            }
            Operation::ControlConstant {
                alternatives,
                value,
            } => write!(f, "ctlconstant({value}/{alternatives})"),
            Operation::Match(op) => {
                write!(f, "match({}, [", op.width)?;
                for (i, (value, alt)) in op.mapping.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}->{alt}")?;
                }
                write!(f, "], default {}/{})", op.default_alternative, op.alternatives)
            }
            Operation::Opaque(op) => write!(f, "{}", op.name),
            Operation::Gamma { alternatives } => write!(f, "gamma({alternatives})"),
            Operation::Theta => write!(f, "theta"),
        }
    }
}

// ─── Normal form keys ───────────────────────────────────────────────────────

/// Key of a normal form in the registry. Leaf kinds correspond to concrete
/// operations; `Node`, `UnaryFamily`, `BinaryFamily` and `Structural` are
/// the interior levels of the normal form tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpKind {
    Node,
    BitConstant,
    ControlConstant,
    Opaque,
    UnaryFamily,
    Unary(UnaryKind),
    Match,
    BinaryFamily,
    Binary(BinaryKind),
    FlattenedBinary,
    Structural,
    Gamma,
    Theta,
}

impl OpKind {
    /// Every kind, parents before children.
    pub fn all() -> Vec<OpKind> {
        let mut kinds = vec![
            OpKind::Node,
            OpKind::BitConstant,
            OpKind::ControlConstant,
            OpKind::Opaque,
            OpKind::UnaryFamily,
        ];
        kinds.extend(UnaryKind::ALL.iter().map(|&k| OpKind::Unary(k)));
        kinds.push(OpKind::Match);
        kinds.push(OpKind::BinaryFamily);
        kinds.extend(BinaryKind::ALL.iter().map(|&k| OpKind::Binary(k)));
        kinds.extend([
            OpKind::FlattenedBinary,
            OpKind::Structural,
            OpKind::Gamma,
            OpKind::Theta,
        ]);
        kinds
    }

    pub fn parent(self) -> Option<OpKind> {
        match self {
            OpKind::Node => None,
            OpKind::BitConstant
            | OpKind::ControlConstant
            | OpKind::Opaque
            | OpKind::UnaryFamily
            | OpKind::BinaryFamily
            | OpKind::FlattenedBinary
            | OpKind::Structural => Some(OpKind::Node),
            OpKind::Unary(_) | OpKind::Match => Some(OpKind::UnaryFamily),
            OpKind::Binary(_) => Some(OpKind::BinaryFamily),
            OpKind::Gamma | OpKind::Theta => Some(OpKind::Structural),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OpKind::Node => "node",
            OpKind::BitConstant => "bitconstant",
            OpKind::ControlConstant => "ctlconstant",
            OpKind::Opaque => "opaque",
            OpKind::UnaryFamily => "unary",
            OpKind::Unary(kind) => kind.name(),
            OpKind::Match => "match",
            OpKind::BinaryFamily => "binary",
            OpKind::Binary(kind) => kind.name(),
            OpKind::FlattenedBinary => "flattened",
            OpKind::Structural => "structural",
            OpKind::Gamma => "gamma",
            OpKind::Theta => "theta",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OpKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpKind::all()
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| Error::Config(format!("unknown operation kind `{s}`")))
    }
}
