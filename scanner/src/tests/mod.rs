//! Cross-module scenario tests for the scan engine.
//!
//! Per-module unit tests live beside their implementation; this tree is for
//! tests that exercise more than one component together (§8 end-to-end
//! scenarios).

mod scenarios;
