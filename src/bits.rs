//! Fixed-width bitstring values and their arithmetic.
//!
//! All arithmetic is modular in the value's width. Widths range over
//! 1..=64; the payload is stored zero-extended in a `u64`.

use std::fmt;

/// A bitstring constant of a fixed width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitValue {
    width: u32,
    bits: u64,
}

fn mask(width: u32) -> u64 {
    if width == 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

impl BitValue {
    /// Build a value from the low `width` bits of `value`.
    pub fn new(width: u32, value: u64) -> Self {
        assert!(
            (1..=64).contains(&width),
            "bitstring width {width} out of range 1..=64"
        );
        BitValue {
            width,
            bits: value & mask(width),
        }
    }

    /// Build a value from a signed integer, truncated to `width` bits.
    pub fn from_signed(width: u32, value: i64) -> Self {
        Self::new(width, value as u64)
    }

    pub fn width(self) -> u32 {
        self.width
    }

    /// The value zero-extended to 64 bits.
    pub fn to_unsigned(self) -> u64 {
        self.bits
    }

    /// The value sign-extended to 64 bits.
    pub fn to_signed(self) -> i64 {
        let shift = 64 - self.width;
        ((self.bits << shift) as i64) >> shift
    }

    pub fn is_zero(self) -> bool {
        self.bits == 0
    }

    pub fn is_one(self) -> bool {
        self.bits == 1
    }

    pub fn is_all_ones(self) -> bool {
        self.bits == mask(self.width)
    }

    fn with(self, bits: u64) -> Self {
        Self::new(self.width, bits)
    }

    fn flag(value: bool) -> Self {
        Self::new(1, value as u64)
    }

    pub fn add(self, rhs: Self) -> Self {
        self.with(self.bits.wrapping_add(rhs.bits))
    }

    pub fn sub(self, rhs: Self) -> Self {
        self.with(self.bits.wrapping_sub(rhs.bits))
    }

    pub fn mul(self, rhs: Self) -> Self {
        self.with(self.bits.wrapping_mul(rhs.bits))
    }

    /// High half of the unsigned double-width product.
    pub fn umulh(self, rhs: Self) -> Self {
        let wide = self.bits as u128 * rhs.bits as u128;
        self.with((wide >> self.width) as u64)
    }

    /// High half of the signed double-width product.
    pub fn smulh(self, rhs: Self) -> Self {
        let wide = self.to_signed() as i128 * rhs.to_signed() as i128;
        self.with((wide >> self.width) as u64)
    }

    pub fn and(self, rhs: Self) -> Self {
        self.with(self.bits & rhs.bits)
    }

    pub fn or(self, rhs: Self) -> Self {
        self.with(self.bits | rhs.bits)
    }

    pub fn xor(self, rhs: Self) -> Self {
        self.with(self.bits ^ rhs.bits)
    }

    pub fn not(self) -> Self {
        self.with(!self.bits)
    }

    pub fn neg(self) -> Self {
        self.with(self.bits.wrapping_neg())
    }

    pub fn shl(self, amount: Self) -> Self {
        match amount.bits {
            n if n >= self.width as u64 => self.with(0),
            n => self.with(self.bits << n),
        }
    }

    pub fn shr(self, amount: Self) -> Self {
        match amount.bits {
            n if n >= self.width as u64 => self.with(0),
            n => self.with(self.bits >> n),
        }
    }

    pub fn ashr(self, amount: Self) -> Self {
        let n = if amount.bits >= self.width as u64 {
            63
        } else {
            amount.bits as u32
        };
        self.with((self.to_signed() >> n) as u64)
    }

    pub fn udiv(self, rhs: Self) -> Option<Self> {
        self.bits.checked_div(rhs.bits).map(|q| self.with(q))
    }

    pub fn umod(self, rhs: Self) -> Option<Self> {
        self.bits.checked_rem(rhs.bits).map(|r| self.with(r))
    }

    pub fn sdiv(self, rhs: Self) -> Option<Self> {
        if rhs.is_zero() {
            return None;
        }
        Some(self.with(self.to_signed().wrapping_div(rhs.to_signed()) as u64))
    }

    pub fn smod(self, rhs: Self) -> Option<Self> {
        if rhs.is_zero() {
            return None;
        }
        Some(self.with(self.to_signed().wrapping_rem(rhs.to_signed()) as u64))
    }

    pub fn eq(self, rhs: Self) -> Self {
        Self::flag(self.bits == rhs.bits)
    }

    pub fn ne(self, rhs: Self) -> Self {
        Self::flag(self.bits != rhs.bits)
    }

    pub fn slt(self, rhs: Self) -> Self {
        Self::flag(self.to_signed() < rhs.to_signed())
    }

    pub fn sle(self, rhs: Self) -> Self {
        Self::flag(self.to_signed() <= rhs.to_signed())
    }

    pub fn ult(self, rhs: Self) -> Self {
        Self::flag(self.bits < rhs.bits)
    }

    pub fn ule(self, rhs: Self) -> Self {
        Self::flag(self.bits <= rhs.bits)
    }
}

impl fmt::Display for BitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.bits)
    }
}
