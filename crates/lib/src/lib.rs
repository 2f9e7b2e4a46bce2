//! fanout-lib: build orchestration for Rust binaries across a platform matrix
//!
//! For every supported platform this crate produces three outputs from one
//! source tree:
//! - `default`: the binary built for the platform's native target
//! - `static`: a fully static musl binary
//! - `devShell`: an environment with the same toolchain plus dev tools
//!
//! Toolchains and build results live in a content-addressed [`store`], so an
//! output whose inputs have not changed is never rebuilt.

pub mod build;
pub mod config;
pub mod consts;
pub mod devshell;
pub mod orchestrate;
pub mod platform;
pub mod registry;
pub mod source;
pub mod store;
pub mod toolchain;
pub mod util;
