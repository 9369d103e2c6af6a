//! Structure-of-arrays ray streams and their per-bounce counters.
//!
//! Every pipeline stage consumes one queue and produces into others. A slot
//! is reserved with a relaxed atomic fetch-add and lives for exactly one
//! stage; nothing is cleared between bounces because each bounce has its own
//! counter.

use std::sync::atomic::{AtomicU32, Ordering};

use ember_core::constants::NUM_BOUNCES;
use ember_core::MaterialTag;
use ember_math::Vec3;
use half::f16;

use crate::slots::Slots;

/// Packed intersection result.
///
/// Barycentrics are stored as half floats; they are normalized coordinates
/// and survive the precision loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitRecord {
    pub mesh_id: u32,
    /// Flattened triangle slot; -1 means no hit.
    pub triangle_id: i32,
    pub t: f32,
    pub u: f16,
    pub v: f16,
}

impl HitRecord {
    pub fn new(mesh_id: u32, triangle_id: i32, t: f32, u: f32, v: f32) -> Self {
        Self {
            mesh_id,
            triangle_id,
            t,
            u: f16::from_f32(u),
            v: f16::from_f32(v),
        }
    }

    #[inline]
    pub fn is_miss(&self) -> bool {
        self.triangle_id < 0
    }
}

impl Default for HitRecord {
    fn default() -> Self {
        Self {
            mesh_id: 0,
            triangle_id: -1,
            t: f32::INFINITY,
            u: f16::ZERO,
            v: f16::ZERO,
        }
    }
}

/// Rays awaiting traversal, plus the path state that survives the bounce.
pub struct TraceQueue {
    pub origin: Slots<Vec3>,
    pub direction: Slots<Vec3>,
    pub cone_width: Slots<f32>,
    pub pixel_index: Slots<u32>,
    pub throughput: Slots<Vec3>,
    pub last_material: Slots<MaterialTag>,
    pub last_pdf: Slots<f32>,
    pub hit: Slots<HitRecord>,
}

impl TraceQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            origin: Slots::new(capacity),
            direction: Slots::new(capacity),
            cone_width: Slots::new(capacity),
            pixel_index: Slots::new(capacity),
            throughput: Slots::new(capacity),
            last_material: Slots::new(capacity),
            last_pdf: Slots::new(capacity),
            hit: Slots::new(capacity),
        }
    }
}

/// Hits routed to one shading kernel.
pub struct MaterialQueue {
    pub direction: Slots<Vec3>,
    pub cone_width: Slots<f32>,
    pub hit: Slots<HitRecord>,
    pub pixel_index: Slots<u32>,
    pub throughput: Slots<Vec3>,
}

impl MaterialQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            direction: Slots::new(capacity),
            cone_width: Slots::new(capacity),
            hit: Slots::new(capacity),
            pixel_index: Slots::new(capacity),
            throughput: Slots::new(capacity),
        }
    }
}

/// Occlusion queries emitted by next-event estimation.
pub struct ShadowQueue {
    pub origin: Slots<Vec3>,
    pub direction: Slots<Vec3>,
    pub max_distance: Slots<f32>,
    pub pixel_index: Slots<u32>,
    pub illumination: Slots<Vec3>,
}

impl ShadowQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            origin: Slots::new(capacity),
            direction: Slots::new(capacity),
            max_distance: Slots::new(capacity),
            pixel_index: Slots::new(capacity),
            illumination: Slots::new(capacity),
        }
    }
}

/// Per-bounce queue sizes, reset once per frame.
pub struct QueueCounters {
    pub trace: [AtomicU32; NUM_BOUNCES],
    pub diffuse: [AtomicU32; NUM_BOUNCES],
    pub dielectric: [AtomicU32; NUM_BOUNCES],
    pub glossy: [AtomicU32; NUM_BOUNCES],
    pub shadow: [AtomicU32; NUM_BOUNCES],
}

impl QueueCounters {
    pub fn new() -> Self {
        Self {
            trace: std::array::from_fn(|_| AtomicU32::new(0)),
            diffuse: std::array::from_fn(|_| AtomicU32::new(0)),
            dielectric: std::array::from_fn(|_| AtomicU32::new(0)),
            glossy: std::array::from_fn(|_| AtomicU32::new(0)),
            shadow: std::array::from_fn(|_| AtomicU32::new(0)),
        }
    }

    pub fn reset(&self) {
        for counter in self
            .trace
            .iter()
            .chain(&self.diffuse)
            .chain(&self.dielectric)
            .chain(&self.glossy)
            .chain(&self.shadow)
        {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Reserve one output slot.
    #[inline]
    pub fn reserve(counter: &AtomicU32) -> usize {
        counter.fetch_add(1, Ordering::Relaxed) as usize
    }

    /// Read a counter after the producing pass completed.
    #[inline]
    pub fn count(counter: &AtomicU32) -> usize {
        counter.load(Ordering::Relaxed) as usize
    }
}

impl Default for QueueCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_record_miss_sentinel() {
        let miss = HitRecord::default();
        assert!(miss.is_miss());

        let hit = HitRecord::new(0, 7, 1.5, 0.25, 0.5);
        assert!(!hit.is_miss());
        assert!((hit.u.to_f32() - 0.25).abs() < 1e-3);
        assert!((hit.v.to_f32() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_counters_reset() {
        let counters = QueueCounters::new();
        QueueCounters::reserve(&counters.trace[0]);
        QueueCounters::reserve(&counters.trace[0]);
        QueueCounters::reserve(&counters.shadow[2]);

        assert_eq!(QueueCounters::count(&counters.trace[0]), 2);
        assert_eq!(QueueCounters::count(&counters.shadow[2]), 1);

        counters.reset();
        assert_eq!(QueueCounters::count(&counters.trace[0]), 0);
        assert_eq!(QueueCounters::count(&counters.shadow[2]), 0);
    }
}
