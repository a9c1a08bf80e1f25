//! uncross is a library for untangling relationship charts written in the
//! Graphviz `dot` language.
//!
//! # Summary
//!
//! Genealogy programs export relationship charts as `dot` sources in which every
//! person is one line. `dot` lays people out roughly in the order they are written,
//! so the order of those lines decides how many edges cross in the drawing.
//! uncross searches for a better order:
//!
//! 1. [document::parse] splits the source into header, people, edges, groups and
//!    families, of which only people may be reordered,
//! 2. [optimizer::Optimizer] swaps people at shrinking distances and keeps every swap
//!    that `dot` (via [evaluator::Dot]) scores with fewer crossings,
//! 3. [interrupt::Finalizer] writes the best ordering found, on completion or when
//!    the run is interrupted.
//!
//! The command-line frontend lives in the `uncross-cli` package.
pub mod error;

pub mod document;

pub mod evaluator;

pub mod optimizer;

pub mod interrupt;
