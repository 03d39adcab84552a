//! `tether` command-line front end.
//!
//! Library half of the binary so the pieces can be tested without spawning it.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
