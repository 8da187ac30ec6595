//! # dcc-rs: difference constraints with congruence closure
//!
//! **`dcc-rs`** is an incremental, explanation-producing theory core for
//! arithmetic difference constraints and equality over uninterpreted terms.
//! It is the kind of engine a DPLL(T)-style search driver sits on top of:
//! the driver asserts facts under handles of its choosing, and every
//! contradiction comes back as the exact set of handles responsible.
//!
//! ## What it reasons about
//!
//! Facts are normalized to `left - right ◁ offset` over interned terms,
//! with `◁` one of `<=`, `<`, `=`, `!=` and an exact rational offset:
//!
//! - inequalities feed a **difference-constraint graph**; a negative cycle
//!   (or a zero cycle through a strict edge) is a contradiction, and a
//!   zero-width interval is a *discovered equality*;
//! - equalities and disequalities over applied terms feed a
//!   **congruence-closure union-find**, with both congruence directions
//!   propagated (equal arguments force equal applications, and unequal
//!   applications differing in one argument force that pair unequal);
//! - the two engines exchange everything they derive about shared terms.
//!
//! ## Key Features
//!
//! - **Manager-Centric Architecture**: All operations go through the
//!   [`Theory`][crate::theory::Theory] manager, which owns the term
//!   interner, both engines, the undo trail, and the scope stack.
//! - **Explanations Everywhere**: Every derived fact carries the asserted
//!   facts it depends on; re-asserting exactly an explanation's facts
//!   reproduces its contradiction.
//! - **Cheap Backtracking**: `push` snapshots arena lengths and the trail
//!   mark; `pop` replays typed undo records and truncates, costing only
//!   what the popped scope created.
//! - **Exact Arithmetic**: Offsets are arbitrary-precision rationals; no
//!   overflow, no rounding.
//!
//! ## Basic Usage
//!
//! ```rust
//! use dcc_rs::rel::{rat, EqualityStatus, Relationship};
//! use dcc_rs::theory::Theory;
//! use dcc_rs::types::FactId;
//!
//! let mut th = Theory::new();
//! let x = th.symbol("x");
//! let y = th.symbol("y");
//!
//! // x - y <= 0 and y - x <= 0 pin the two terms equal.
//! th.assert(FactId::new(1), &Relationship::le(x, y, rat(0))).unwrap();
//! th.assert(FactId::new(2), &Relationship::le(y, x, rat(0))).unwrap();
//! th.propagate().unwrap();
//! assert_eq!(th.equality_status(x, y), EqualityStatus::Equal);
//!
//! // x - y <= -1 now closes a negative cycle; the explanation names
//! // exactly the facts involved.
//! let err = th.assert(FactId::new(3), &Relationship::le(x, y, rat(-1))).unwrap_err();
//! assert!(err.facts().contains(&FactId::new(2)));
//! assert!(err.facts().contains(&FactId::new(3)));
//! ```
//!
//! ## Core Components
//!
//! - **[`theory`]**: The [`Theory`][crate::theory::Theory] manager and the
//!   cross-engine propagation loop.
//! - **[`graph`]** and **[`check`]**: The difference-constraint graph and
//!   its consistency checker.
//! - **[`congruence`]**: The union-find with congruence propagation.
//! - **[`trail`]**: The typed undo trail backing `push`/`pop`.
//!
//! For a deep dive into the algorithms, check the [`check`] and
//! [`congruence`] module documentation.

pub mod check;
pub mod congruence;
pub mod debug;
pub mod explain;
pub mod graph;
pub mod rel;
pub mod table;
pub mod term;
pub mod theory;
pub mod trail;
pub mod types;
pub mod utils;
