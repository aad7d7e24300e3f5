//! Command implementations
//!
//! Each command returns the [`declarative::ExitCode`] it wants the process
//! to end with; errors are turned into exit code 1 by `main`.

pub mod adopt;
pub mod apply;
pub mod diff;
pub mod merge;
pub mod state;
