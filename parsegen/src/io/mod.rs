//! Side-effecting helpers: filesystem layout, child processes, generation
//! service and candidate runtime.

pub mod attempt_log;
pub mod config;
pub mod generator;
pub mod loader;
pub mod paths;
pub mod persist;
pub mod process;
pub mod prompt;
pub mod reference;
