//! Context assembly for a single conversation turn.
//!
//! # Sources
//!
//! | Source | Store | Window |
//! |--------|-------|--------|
//! | Recent entries | `users/{u}/entries` | trailing N days, newest first |
//! | Profile | `users/{u}/virtual_profile` | latest snapshot only |
//! | History | `users/{u}/models/{persona}/messages` | last N exchanges, oldest first |
//!
//! The three reads run concurrently. A failed read leaves its field empty and
//! is reported in [`AssembledContext::degraded`]; assembly itself never fails.

pub mod assembler;

pub use assembler::{AssembledContext, ContextAssembler, ContextSource, ContextWindow, DegradeInfo};
