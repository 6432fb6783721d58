//! tests/integration/mod.rs

mod handoff;
