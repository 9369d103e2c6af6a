//! Ember renderer - the wavefront path tracing core.
//!
//! Rendering is organized as a sequence of bulk-parallel passes over ray
//! streams: generate, trace, sort-by-material, shade, shadow-trace,
//! reconstruct, accumulate. Rays live in structure-of-arrays queues indexed
//! by atomically reserved slots; a kernel call is the barrier between
//! stages.
//!
//! The acceleration structure is a spatial-split BVH collapsed into a
//! 4-wide MBVH before rendering begins.

mod accel;
mod bvh;
mod film;
mod generate;
mod lod;
mod pipeline;
mod queues;
mod sampler;
mod shade;
mod slots;
mod sort;
mod trace;

pub use accel::SceneAccel;
pub use bvh::{BvhNode, Mbvh, Sbvh};
pub use film::FrameBuffers;
pub use generate::GBuffer;
pub use pipeline::PathTracer;
pub use queues::HitRecord;
