// flockc — Flock patch compiler
//
// Library root. Each compiler phase lives in its own module.

pub mod canon;
pub mod cardinality;
pub mod catalog;
pub mod continuity;
pub mod diag;
pub mod dot;
pub mod exec;
pub mod graph;
pub mod id;
pub mod ir;
pub mod lower;
pub mod pass;
pub mod pipeline;
pub mod registry;
pub mod schedule;
pub mod subst;
pub mod value;
