//! Value types carried by ports.

use std::fmt;

/// What a port carries. Two ports can be connected only if their types are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// A bitstring of the given width (1..=64 bits).
    Bits(u32),
    /// A control value selecting one of N alternatives.
    Control(u32),
    /// An ordering token for side effects.
    State,
}

impl Type {
    /// The bitstring width, if this is a bitstring type.
    pub fn bit_width(self) -> Option<u32> {
        match self {
            Type::Bits(width) => Some(width),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bits(width) => write!(f, "bits{width}"),
            Type::Control(alternatives) => write!(f, "ctl{alternatives}"),
            Type::State => write!(f, "state"),
        }
    }
}

/// Declared shape of a port: its type plus an optional debug name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub ty: Type,
    pub name: Option<String>,
}

impl Port {
    pub fn named(ty: Type, name: impl Into<String>) -> Self {
        Port {
            ty,
            name: Some(name.into()),
        }
    }
}

impl From<Type> for Port {
    fn from(ty: Type) -> Self {
        Port { ty, name: None }
    }
}
