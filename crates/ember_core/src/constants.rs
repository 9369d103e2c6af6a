//! Compile-time tunables for the renderer.

/// Hard path-length cap. Russian roulette terminates most paths earlier.
pub const NUM_BOUNCES: usize = 5;

/// Glossy surfaces rougher than this are treated as area reflectors for
/// next-event estimation; smoother ones behave like mirrors.
pub const ROUGHNESS_CUTOFF: f32 = 0.1;

/// Upper bound on the material table accepted at scene validation.
pub const MAX_MATERIALS: usize = 1024;

/// Upper bound on the texture table accepted at scene validation.
pub const MAX_TEXTURES: usize = 256;

/// Bin resolution of the spatial-split search.
pub const SBVH_BIN_COUNT: usize = 256;

/// Node budget multiplier: the SBVH may emit at most this many nodes per
/// input triangle before construction fails.
pub const SBVH_OVERALLOCATION: usize = 3;

/// Triangles per leaf above which a split is always attempted.
pub const MAX_PRIMITIVES_IN_LEAF: usize = 8;

/// Offset applied to shadow-ray lengths and intersection epsilons.
pub const EPSILON: f32 = 0.001;
