//! # lrs
//!
//! Command-line front end of the record store.
//!
//! - `cli`: clap argument tree and command implementations
//! - `config`: layered settings (flags, environment, TOML file)

pub mod cli;
pub mod config;
