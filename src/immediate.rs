//! Symbolic immediates: a constant offset plus at most one added and one
//! subtracted label, as needed for address arithmetic before layout.

use std::fmt;

use crate::error::{Error, Result};

/// A symbol whose address is not known yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub String);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `offset + add_label - sub_label`, with modular offset arithmetic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Immediate {
    pub offset: u64,
    pub add_label: Option<Label>,
    pub sub_label: Option<Label>,
}

impl Immediate {
    pub fn new(offset: u64) -> Self {
        Immediate {
            offset,
            ..Default::default()
        }
    }

    pub fn label(label: Label) -> Self {
        Immediate {
            add_label: Some(label),
            ..Default::default()
        }
    }

    /// True if no label remains.
    pub fn is_constant(&self) -> bool {
        self.add_label.is_none() && self.sub_label.is_none()
    }

    pub fn checked_add(&self, other: &Immediate) -> Result<Immediate> {
        let (add_label, sub_label) = combine(
            [self.add_label.clone(), other.add_label.clone()],
            [self.sub_label.clone(), other.sub_label.clone()],
        )
        .ok_or(Error::ImmediateLabels("add"))?;
        Ok(Immediate {
            offset: self.offset.wrapping_add(other.offset),
            add_label,
            sub_label,
        })
    }

    pub fn checked_sub(&self, other: &Immediate) -> Result<Immediate> {
        let (add_label, sub_label) = combine(
            [self.add_label.clone(), other.sub_label.clone()],
            [self.sub_label.clone(), other.add_label.clone()],
        )
        .ok_or(Error::ImmediateLabels("subtract"))?;
        Ok(Immediate {
            offset: self.offset.wrapping_sub(other.offset),
            add_label,
            sub_label,
        })
    }
}

/// Cancel equal labels of opposite sign; `None` if more than one label
/// of either sign survives.
fn combine(
    adds: [Option<Label>; 2],
    subs: [Option<Label>; 2],
) -> Option<(Option<Label>, Option<Label>)> {
    let mut adds: Vec<Label> = adds.into_iter().flatten().collect();
    let mut subs: Vec<Label> = subs.into_iter().flatten().collect();
    adds.retain(|label| match subs.iter().position(|s| s == label) {
        Some(index) => {
            subs.remove(index);
            false
        }
        None => true,
    });
    if adds.len() > 1 || subs.len() > 1 {
        return None;
    }
    Some((adds.pop(), subs.pop()))
}

impl From<u64> for Immediate {
    fn from(offset: u64) -> Self {
        Immediate::new(offset)
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.offset)?;
        if let Some(label) = &self.add_label {
            write!(f, " + {label}")?;
        }
        if let Some(label) = &self.sub_label {
            write!(f, " - {label}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(name: &str) -> Label {
        Label(name.to_string())
    }

    #[test]
    fn labels_cancel() {
        let a = Immediate::label(label("start"));
        let b = Immediate {
            offset: 8,
            ..Immediate::label(label("start"))
        };
        let diff = b.checked_sub(&a).unwrap();
        assert_eq!(diff, Immediate::new(8));
        assert!(diff.is_constant());
    }

    #[test]
    fn one_label_each_way() {
        let a = Immediate::label(label("end"));
        let b = Immediate::label(label("start"));
        let span = a.checked_sub(&b).unwrap();
        assert_eq!(span.add_label, Some(label("end")));
        assert_eq!(span.sub_label, Some(label("start")));
        assert_eq!(span.to_string(), "0x0 + end - start");

        // Adding the start back cancels the subtraction.
        let back = span.checked_add(&b).unwrap();
        assert_eq!(back, Immediate::label(label("end")));
    }

    #[test]
    fn two_labels_in_one_slot_fail() {
        let a = Immediate::label(label("x"));
        let b = Immediate::label(label("y"));
        assert_eq!(a.checked_add(&b), Err(Error::ImmediateLabels("add")));
        let neg = Immediate::new(0).checked_sub(&a).unwrap();
        assert_eq!(
            neg.checked_sub(&b),
            Err(Error::ImmediateLabels("subtract"))
        );
    }

    #[test]
    fn offsets_wrap() {
        let a = Immediate::new(1);
        let b = Immediate::new(2);
        assert_eq!(a.checked_sub(&b).unwrap().offset, u64::MAX);
        assert_eq!(Immediate::from(u64::MAX).checked_add(&a).unwrap().offset, 0);
    }
}
