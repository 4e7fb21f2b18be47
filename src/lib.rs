//! # class-recover
//!
//! Unpacks a Java archive, decompiles every compiled class it contains with an
//! external decompiler and optionally introspects selected classes.
//!
//! ## Architecture
//!
//! - **extract**: zip extraction into the extraction root
//! - **scan**: lazy enumeration of `.class` files below a directory
//! - **decompile**: CFR / javap invocation with captured output and timeouts
//! - **dispatch**: per-file batch driver, sequential or on a bounded rayon pool
//! - **introspect**: pluggable class introspection (tree-sitter or Java reflection)
//! - **pipeline**: extract → enumerate → dispatch → introspect
//! - **report**: run report, console rendering and archive digest
//! - **config**: CLI/env resolution into an explicit `PipelineConfig`

pub mod cli;
pub mod config;
pub mod decompile;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod introspect;
pub mod pipeline;
pub mod report;
pub mod scan;

pub use error::{Error, Result};
