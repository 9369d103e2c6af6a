//! Ember core - scene ingestion for the wavefront path tracer.
//!
//! This crate provides:
//!
//! - **Scene tables**: `Scene`, `TriangleTables`, `Triangle` - the read-only
//!   SoA data consumed by the render kernels
//! - **Materials**: the tagged `Material` variants the sorter dispatches on
//! - **Environment**: `Sky` panorama, mip-mapped `Texture`
//! - **Configuration**: `Settings`, `Camera`, `Screen`, compile-time tunables

pub mod camera;
pub mod constants;
pub mod error;
pub mod material;
pub mod scene;
pub mod settings;
pub mod sky;
pub mod texture;

pub use camera::Camera;
pub use error::{RenderError, RenderResult};
pub use material::{Material, MaterialTag};
pub use scene::{LightTable, Scene, Screen, Triangle, TriangleTables};
pub use settings::{LightSelection, ReconstructionFilter, Settings};
pub use sky::Sky;
pub use texture::Texture;
