//! Deterministic, pure logic shared by the agent core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod candidate;
pub mod compare;
pub mod machine;
pub mod session;
pub mod table;
pub mod types;
