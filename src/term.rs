//! Hash-consed term interner.
//!
//! The theory core reasons over opaque term handles; the interner provides
//! them. Every distinct term exists exactly once, so handle equality is
//! term identity and [`TermArena::decompose`] is the structural view the
//! congruence-closure engine consumes (functor plus ordered argument
//! handles).
//!
//! The interner is deliberately *not* rolled back on scope pop: term handles
//! are vocabulary shared with the enclosing rewriting engine and must stay
//! valid across backtracking.

use std::fmt;

use crate::table::Table;
use crate::types::TermId;
use crate::utils::{pairing2, DetHash};

/// An interned functor symbol (1-indexed table entry).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Functor(u32);

impl Functor {
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Functor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The structure of one interned term.
#[derive(Debug, Clone, Eq, PartialEq)]
enum TermKey {
    /// An atomic symbol: a variable or constant.
    Sym(Functor),
    /// An application of a functor to interned arguments.
    App(Functor, Vec<TermId>),
}

impl DetHash for TermKey {
    fn det_hash(&self) -> u64 {
        match self {
            TermKey::Sym(f) => pairing2(f.id() as u64, 0),
            TermKey::App(f, args) => {
                let mut h = pairing2(f.id() as u64, 1);
                for arg in args {
                    h = pairing2(h, arg.id() as u64);
                }
                h
            }
        }
    }
}

pub struct TermArena {
    functors: Table<String, ()>,
    terms: Table<TermKey, ()>,
}

impl Default for TermArena {
    fn default() -> Self {
        TermArena::new(16)
    }
}

impl TermArena {
    pub fn new(bits: usize) -> Self {
        Self {
            functors: Table::new(bits),
            terms: Table::new(bits),
        }
    }

    /// Number of interned terms.
    pub fn len(&self) -> usize {
        self.terms.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Intern a functor symbol by name.
    pub fn functor(&mut self, name: &str) -> Functor {
        let (index, _) = self.functors.intern(name.to_string(), || ());
        Functor(index as u32)
    }

    pub fn functor_name(&self, f: Functor) -> &str {
        self.functors.key_at(f.0 as usize)
    }

    /// Intern an atomic term (a named variable or constant).
    pub fn symbol(&mut self, name: &str) -> TermId {
        let f = self.functor(name);
        let (index, _) = self.terms.intern(TermKey::Sym(f), || ());
        TermId::new(index as u32)
    }

    /// Intern an application `f(args...)`.
    ///
    /// # Panics
    ///
    /// Panics if `args` is empty (atoms go through [`TermArena::symbol`]) or
    /// if any argument handle is foreign to this arena.
    pub fn app(&mut self, f: Functor, args: &[TermId]) -> TermId {
        assert!(!args.is_empty(), "Applications take at least one argument");
        for arg in args {
            assert!(
                arg.index() < self.terms.len(),
                "Argument {} is not a term of this arena",
                arg
            );
        }
        let key = TermKey::App(f, args.to_vec());
        let (index, _) = self.terms.intern(key, || ());
        TermId::new(index as u32)
    }

    /// The top functor of a term.
    pub fn functor_of(&self, t: TermId) -> Functor {
        match self.terms.key_at(t.index()) {
            TermKey::Sym(f) => *f,
            TermKey::App(f, _) => *f,
        }
    }

    /// Structural decomposition: `Some((functor, args))` for applications,
    /// `None` for atoms.
    pub fn decompose(&self, t: TermId) -> Option<(Functor, &[TermId])> {
        match self.terms.key_at(t.index()) {
            TermKey::Sym(_) => None,
            TermKey::App(f, args) => Some((*f, args.as_slice())),
        }
    }

    pub fn is_symbol(&self, t: TermId) -> bool {
        matches!(self.terms.key_at(t.index()), TermKey::Sym(_))
    }

    /// Render a term for diagnostics: `f(a, g(b))`.
    pub fn display(&self, t: TermId) -> String {
        match self.terms.key_at(t.index()) {
            TermKey::Sym(f) => self.functor_name(*f).to_string(),
            TermKey::App(f, args) => {
                let mut s = self.functor_name(*f).to_string();
                s.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        s.push_str(", ");
                    }
                    s.push_str(&self.display(*arg));
                }
                s.push(')');
                s
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_interning() {
        let mut arena = TermArena::default();
        let x = arena.symbol("x");
        let y = arena.symbol("y");
        let x2 = arena.symbol("x");
        assert_eq!(x, x2);
        assert_ne!(x, y);
        assert!(arena.is_symbol(x));
        assert_eq!(arena.decompose(x), None);
    }

    #[test]
    fn test_app_interning() {
        let mut arena = TermArena::default();
        let x = arena.symbol("x");
        let y = arena.symbol("y");
        let f = arena.functor("f");
        let fxy = arena.app(f, &[x, y]);
        let fxy2 = arena.app(f, &[x, y]);
        let fyx = arena.app(f, &[y, x]);
        assert_eq!(fxy, fxy2);
        assert_ne!(fxy, fyx);
        let (g, args) = arena.decompose(fxy).unwrap();
        assert_eq!(g, f);
        assert_eq!(args, &[x, y]);
    }

    #[test]
    fn test_nested_display() {
        let mut arena = TermArena::default();
        let a = arena.symbol("a");
        let g = arena.functor("g");
        let f = arena.functor("f");
        let ga = arena.app(g, &[a]);
        let fga = arena.app(f, &[ga, a]);
        assert_eq!(arena.display(fga), "f(g(a), a)");
    }

    #[test]
    #[should_panic(expected = "at least one argument")]
    fn test_empty_app_panics() {
        let mut arena = TermArena::default();
        let f = arena.functor("f");
        arena.app(f, &[]);
    }
}
