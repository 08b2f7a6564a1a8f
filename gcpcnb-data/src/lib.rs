//! Low-level representations for the Cloud Native Buildpack data types read and written by the
//! gcpcnb runner.

pub mod bom;
pub mod build;
pub mod build_metadata;
pub mod build_plan;
pub mod buildpack;
pub mod buildpack_plan;
pub mod launch;
pub mod layer;
pub mod layer_content_metadata;

mod newtypes;
