//! Configuration module for the signing subsystem.
//!
//! Handles loading and validating configuration from TOML files. All
//! tunables the subsystem honors live here; nothing is read from process
//! globals.

mod settings;

pub use settings::*;
