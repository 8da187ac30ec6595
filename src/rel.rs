//! Normalized fact forms.
//!
//! The enclosing rewriting engine decomposes an arbitrary boolean-typed term
//! into `left - right ◁ offset` form before it reaches the theory core; a
//! [`Relationship`] is that decomposition, threaded explicitly through every
//! call instead of living in shared normalizer state.

use std::fmt;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::Zero;

use crate::types::TermId;

/// The comparison of a normalized fact.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RelOp {
    /// `left - right <= offset`
    Le,
    /// `left - right < offset`
    Lt,
    /// `left - right = offset`
    Eq,
    /// `left - right != offset`
    Ne,
}

/// A normalized assertion: `left - right ◁ offset`.
///
/// Term equalities and disequalities over uninterpreted terms are the
/// `Eq`/`Ne` cases with a zero offset.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Relationship {
    pub left: TermId,
    pub right: TermId,
    pub offset: BigRational,
    pub op: RelOp,
}

impl Relationship {
    pub fn new(left: TermId, right: TermId, offset: BigRational, op: RelOp) -> Self {
        Self {
            left,
            right,
            offset,
            op,
        }
    }

    /// `left - right <= offset`
    pub fn le(left: TermId, right: TermId, offset: BigRational) -> Self {
        Self::new(left, right, offset, RelOp::Le)
    }

    /// `left - right < offset`
    pub fn lt(left: TermId, right: TermId, offset: BigRational) -> Self {
        Self::new(left, right, offset, RelOp::Lt)
    }

    /// `left = right`
    pub fn eq(left: TermId, right: TermId) -> Self {
        Self::new(left, right, BigRational::zero(), RelOp::Eq)
    }

    /// `left - right = offset`
    pub fn eq_offset(left: TermId, right: TermId, offset: BigRational) -> Self {
        Self::new(left, right, offset, RelOp::Eq)
    }

    /// `left != right`
    pub fn ne(left: TermId, right: TermId) -> Self {
        Self::new(left, right, BigRational::zero(), RelOp::Ne)
    }

    /// `left - right != offset`
    pub fn ne_offset(left: TermId, right: TermId, offset: BigRational) -> Self {
        Self::new(left, right, offset, RelOp::Ne)
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            RelOp::Le => "<=",
            RelOp::Lt => "<",
            RelOp::Eq => "=",
            RelOp::Ne => "!=",
        };
        write!(f, "{} - {} {} {}", self.left, self.right, op, self.offset)
    }
}

/// The answer of a read-only equality query.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EqualityStatus {
    Equal,
    Disequal,
    Unknown,
}

/// Exact rational from a machine integer; convenience for callers and tests.
pub fn rat(n: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let a = TermId::new(1);
        let b = TermId::new(2);
        let r = Relationship::le(a, b, rat(3));
        assert_eq!(r.op, RelOp::Le);
        assert_eq!(r.offset, rat(3));
        let e = Relationship::eq(a, b);
        assert!(e.offset.is_zero());
    }

    #[test]
    fn test_display() {
        let a = TermId::new(1);
        let b = TermId::new(2);
        assert_eq!(Relationship::lt(a, b, rat(-2)).to_string(), "t1 - t2 < -2");
        assert_eq!(Relationship::ne(a, b).to_string(), "t1 - t2 != 0");
    }
}
