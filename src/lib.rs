//! # cuxe - Incremental CUDA Kernel Builds
//!
//! cuxe compiles a tree of `.cu` sources to PTX, cubin or fatbin artifacts by
//! running `nvcc` once per kernel, on every core, and only for kernels whose
//! output is missing or older than the source.
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a cux.toml with the defaults
//! cux init
//!
//! # Compile whatever changed
//! cux build
//! ```
//!
//! ## Module Organization
//!
//! - [`build`] - Discovery, staleness, the compiler runner and the scheduler
//! - [`config`] - Configuration parsing (`cux.toml`) and validation
//! - [`error`] - Configuration and build-level error types

/// Parallel incremental compilation engine.
pub mod build;

/// Configuration file parsing (`cux.toml`).
pub mod config;

/// Error types.
pub mod error;
