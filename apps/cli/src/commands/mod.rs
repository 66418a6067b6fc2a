//! Command implementations for the Herald CLI.

pub mod config;
pub mod plan;
pub mod run;
pub mod tools;
