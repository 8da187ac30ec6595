//! Explanations: which asserted facts justify a derived fact.
//!
//! An [`Explanation`] is an ordered list of fact handles. Duplicates are
//! allowed while an explanation is being assembled; [`Explanation::dedup`]
//! normalizes it before it is handed to the caller. Concatenation always
//! produces a fresh list, so an explanation returned from the engine is
//! never mutated afterwards.

use std::fmt;

use crate::types::FactId;

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Explanation {
    facts: Vec<FactId>,
}

impl Explanation {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(fact: FactId) -> Self {
        Self { facts: vec![fact] }
    }

    pub fn from_facts(facts: Vec<FactId>) -> Self {
        Self { facts }
    }

    pub fn facts(&self) -> &[FactId] {
        &self.facts
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn push(&mut self, fact: FactId) {
        self.facts.push(fact);
    }

    /// Append a copy of `other`'s facts.
    pub fn extend(&mut self, other: &Explanation) {
        self.facts.extend_from_slice(&other.facts);
    }

    /// Concatenate into a fresh explanation.
    pub fn union(&self, other: &Explanation) -> Explanation {
        let mut facts = Vec::with_capacity(self.facts.len() + other.facts.len());
        facts.extend_from_slice(&self.facts);
        facts.extend_from_slice(&other.facts);
        Explanation { facts }
    }

    /// Sort and remove duplicate fact handles.
    pub fn dedup(&mut self) {
        self.facts.sort();
        self.facts.dedup();
    }

    /// Normalized copy, for returning to the caller.
    pub fn into_deduped(mut self) -> Explanation {
        self.dedup();
        self
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, fact) in self.facts.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", fact)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(id: u32) -> FactId {
        FactId::new(id)
    }

    #[test]
    fn test_union_is_fresh() {
        let a = Explanation::single(f(1));
        let b = Explanation::single(f(2));
        let c = a.union(&b);
        assert_eq!(c.facts(), &[f(1), f(2)]);
        // Originals untouched.
        assert_eq!(a.facts(), &[f(1)]);
        assert_eq!(b.facts(), &[f(2)]);
    }

    #[test]
    fn test_dedup() {
        let mut e = Explanation::from_facts(vec![f(3), f(1), f(3), f(2), f(1)]);
        e.dedup();
        assert_eq!(e.facts(), &[f(1), f(2), f(3)]);
    }

    #[test]
    fn test_display() {
        let e = Explanation::from_facts(vec![f(1), f(2)]);
        assert_eq!(e.to_string(), "{f1, f2}");
    }
}
