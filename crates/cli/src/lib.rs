//! Process wiring for the `hapwire` binary.

pub mod catalog;
pub mod cli;
pub mod commands;
pub mod logging;
pub mod styles;
