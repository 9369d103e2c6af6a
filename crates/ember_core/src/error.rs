//! Error types for scene validation and BVH construction.

use thiserror::Error;

/// Errors raised before or during acceleration-structure construction.
/// The render kernels themselves never fail; paths terminate statistically.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("scene exceeds limits: {0}")]
    Configuration(String),

    #[error("SBVH emitted {nodes} nodes for {triangles} triangles, above the {limit}-node budget")]
    BvhOverflow {
        nodes: usize,
        triangles: usize,
        limit: usize,
    },
}

pub type RenderResult<T> = Result<T, RenderError>;
