//! Runtime adapters for linefix (config, file persistence, subprocesses).

pub mod config;
pub mod fs;
pub mod runner;
pub mod util;

pub use config::Config;
