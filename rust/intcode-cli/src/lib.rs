//! Intcode CLI library.
//!
//! Configuration loading and the command implementations behind the
//! `intcode` binary.

pub mod commands;
pub mod config;
pub mod error;
