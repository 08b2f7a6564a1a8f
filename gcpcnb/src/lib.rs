//! A runner framework for [Cloud Native Buildpacks](https://buildpacks.io/): dispatches the
//! detect and build phases of registered buildpacks, manages layer metadata, resolves build
//! plans and assembles image metadata.

// This lint triggers when both layer_dir and layers_dir are present which are quite common.
#![allow(clippy::similar_names)]

pub mod build;
pub mod builder_output;
pub mod cache;
pub mod config;
pub mod detect;
pub mod devmode;
pub mod exec;
pub mod exit_code;
pub mod layer;
pub mod layer_env;
pub mod log;
pub mod metadata;
pub mod plan;
pub mod platform;
pub mod registry;
pub mod runtime;
pub mod toml_file;

mod env;
mod error;

#[doc(inline)]
pub use gcpcnb_data as data;

pub use env::*;
pub use error::*;

pub use registry::{Buildpack, BuildpackFns, Registry};
pub use runtime::{dispatch, Invocation};
