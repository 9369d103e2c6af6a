//! The per-frame pipeline driver.
//!
//! Owns the queues, counters and frame buffers, and dispatches the pass
//! sequence: generate, then per bounce trace / sort / shade x3 / shadow,
//! then reconstruct and accumulate. Every pass sizes itself from the
//! counter its producer filled; a pass call returning is the barrier.

use ember_core::constants::NUM_BOUNCES;
use ember_core::settings::ReconstructionFilter;
use ember_core::{Camera, MaterialTag, RenderResult, Scene, Screen, Settings};
use ember_math::{Ray, Vec4};
use rayon::prelude::*;
use std::sync::atomic::AtomicU32;

use crate::accel::SceneAccel;
use crate::film::FrameBuffers;
use crate::generate::{self, GBuffer};
use crate::queues::{MaterialQueue, QueueCounters, ShadowQueue, TraceQueue};
use crate::shade;
use crate::sort;
use crate::trace;

/// A progressive wavefront path tracer over one scene.
pub struct PathTracer {
    pub(crate) accel: SceneAccel,
    pub settings: Settings,
    pub camera: Camera,
    pub(crate) screen: Screen,

    pub(crate) counters: QueueCounters,
    pub(crate) trace_queues: [TraceQueue; 2],
    pub(crate) diffuse_queue: MaterialQueue,
    pub(crate) dielectric_queue: MaterialQueue,
    pub(crate) glossy_queue: MaterialQueue,
    pub(crate) shadow_queue: ShadowQueue,

    pub(crate) film: FrameBuffers,

    /// Monotonic frame index seeding the per-frame random streams.
    pub(crate) frame: u32,
    frames_accumulated: u32,
}

impl PathTracer {
    /// Build the acceleration structure and allocate the ray streams.
    pub fn new(
        scene: Scene,
        settings: Settings,
        mut camera: Camera,
        screen: Screen,
    ) -> RenderResult<Self> {
        camera.resize(screen.width, screen.height);
        let accel = SceneAccel::build(scene)?;

        let rays = screen.pixel_count();
        Ok(Self {
            accel,
            settings,
            camera,
            screen,
            counters: QueueCounters::new(),
            trace_queues: [TraceQueue::new(rays), TraceQueue::new(rays)],
            diffuse_queue: MaterialQueue::new(rays),
            dielectric_queue: MaterialQueue::new(rays),
            glossy_queue: MaterialQueue::new(rays),
            shadow_queue: ShadowQueue::new(rays),
            film: FrameBuffers::new(screen.buffer_len()),
            frame: 0,
            frames_accumulated: 0,
        })
    }

    /// Render one progressive sample per pixel with ray-traced primary
    /// visibility.
    pub fn render_frame(&mut self) {
        self.begin_frame();
        generate::generate_primary(self);
        for bounce in 0..NUM_BOUNCES {
            self.run_bounce(bounce);
        }
        self.end_frame();
    }

    /// Render one frame replaying rasterized primary visibility from a
    /// G-buffer instead of tracing camera rays.
    pub fn render_frame_with_gbuffer(&mut self, gbuffer: &GBuffer) {
        self.begin_frame();
        generate::replay_gbuffer(self, gbuffer);
        for bounce in 0..NUM_BOUNCES {
            self.run_bounce(bounce);
        }
        self.end_frame();
    }

    fn begin_frame(&mut self) {
        // One reset per frame; per-bounce counter indexing does the rest
        self.counters.reset();
    }

    fn run_bounce(&self, bounce: usize) {
        let last_bounce = bounce + 1 == NUM_BOUNCES;

        self.trace_pass(bounce);
        sort::run(self, bounce);
        shade::diffuse::run(self, bounce, last_bounce);
        shade::dielectric::run(self, bounce, last_bounce);
        shade::glossy::run(self, bounce, last_bounce);
        self.shadow_pass(bounce);
    }

    fn end_frame(&mut self) {
        self.frames_accumulated += 1;
        if self.settings.reconstruction_filter != ReconstructionFilter::Box {
            self.film.reconstruct(self.screen, &self.settings);
        }

        let screen = self.screen;
        let settings = self.settings.clone();
        self.film.accumulate(screen, &settings, self.frames_accumulated);

        self.frame = self.frame.wrapping_add(1);
    }

    /// Closest-hit traversal for every queued ray of this bounce.
    fn trace_pass(&self, bounce: usize) {
        let n = QueueCounters::count(&self.counters.trace[bounce]);
        let queue = self.trace_queue(bounce);

        (0..n).into_par_iter().for_each(|slot| {
            let ray = Ray::new(queue.origin.get(slot), queue.direction.get(slot));
            let hit = trace::intersect(&self.accel.mbvh, &self.accel.tables, &ray, f32::INFINITY);
            queue.hit.set(slot, hit);
        });
    }

    /// Any-hit traversal for the queued shadow rays; unoccluded ones settle
    /// their stored contribution.
    fn shadow_pass(&self, bounce: usize) {
        let n = QueueCounters::count(&self.counters.shadow[bounce]);
        let queue = &self.shadow_queue;
        let epsilon = ember_core::constants::EPSILON;

        (0..n).into_par_iter().for_each(|slot| {
            let ray = Ray::new(queue.origin.get(slot), queue.direction.get(slot));
            let max_distance = queue.max_distance.get(slot) - epsilon;

            if !trace::occluded(&self.accel.mbvh, &self.accel.tables, &ray, max_distance) {
                let pixel = queue.pixel_index.get(slot);
                self.film.add_illumination(bounce, pixel, queue.illumination.get(slot));
            }
        });
    }

    /// The trace queue of a bounce; two buffers ping-pong by parity.
    #[inline]
    pub(crate) fn trace_queue(&self, bounce: usize) -> &TraceQueue {
        &self.trace_queues[bounce & 1]
    }

    /// Queue and counter a material tag routes to at a given bounce.
    #[inline]
    pub(crate) fn material_queue(
        &self,
        tag: MaterialTag,
        bounce: usize,
    ) -> (&MaterialQueue, &AtomicU32) {
        match tag {
            MaterialTag::Diffuse => (&self.diffuse_queue, &self.counters.diffuse[bounce]),
            MaterialTag::Dielectric => (&self.dielectric_queue, &self.counters.dielectric[bounce]),
            MaterialTag::Glossy { .. } => (&self.glossy_queue, &self.counters.glossy[bounce]),
        }
    }

    /// The progressive display surface.
    pub fn accumulator(&self) -> &[Vec4] {
        &self.film.accumulator
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn frames_accumulated(&self) -> u32 {
        self.frames_accumulated
    }

    /// Restart progressive accumulation, e.g. after a camera move.
    pub fn reset_accumulation(&mut self) {
        self.frames_accumulated = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::{Material, Sky, Triangle};
    use ember_math::{Vec2, Vec3};

    fn look_down_negative_z(fov_degrees: f32) -> Camera {
        Camera::new(fov_degrees.to_radians())
    }

    fn pixel_of(screen: Screen, x: u32, y: u32) -> usize {
        (y * screen.pitch + x) as usize
    }

    #[test]
    fn test_empty_scene_resolves_to_sky() {
        let sky_color = Vec3::new(0.2, 0.4, 0.8);
        let scene = Scene::new(Vec::new(), Vec::new(), Vec::new(), Sky::constant(sky_color));
        let screen = Screen::new(8, 8);
        let mut pt = PathTracer::new(
            scene,
            Settings::default(),
            look_down_negative_z(90.0),
            screen,
        )
        .unwrap();

        pt.render_frame();

        for y in 0..screen.height {
            for x in 0..screen.width {
                let c = pt.accumulator()[pixel_of(screen, x, y)];
                assert!((c.x - sky_color.x).abs() < 1e-4);
                assert!((c.y - sky_color.y).abs() < 1e-4);
                assert!((c.z - sky_color.z).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_emissive_triangle_direct_hit() {
        let emission = Vec3::new(3.0, 2.0, 1.0);
        let triangles = vec![Triangle::new(
            [
                Vec3::new(-1.0, -1.0, -2.0),
                Vec3::new(1.0, -1.0, -2.0),
                Vec3::new(0.0, 1.5, -2.0),
            ],
            [Vec3::Z; 3],
            [Vec2::ZERO; 3],
            0,
            0,
        )];
        let scene = Scene::new(
            triangles,
            vec![Material::Light { emission }],
            Vec::new(),
            Sky::constant(Vec3::ZERO),
        );

        let screen = Screen::new(16, 16);
        let mut settings = Settings::default();
        settings.enable_next_event_estimation = false;
        settings.enable_multiple_importance_sampling = false;

        let mut pt =
            PathTracer::new(scene, settings, look_down_negative_z(90.0), screen).unwrap();
        pt.render_frame();

        // Center pixels look straight at the light; primary hits deposit
        // the full emission
        let center = pt.accumulator()[pixel_of(screen, 8, 8)];
        assert!((center.x - emission.x).abs() < 1e-3);
        assert!((center.y - emission.y).abs() < 1e-3);

        // A corner ray passes the triangle and lands in the black sky
        let corner = pt.accumulator()[pixel_of(screen, 0, 0)];
        assert_eq!(corner.x, 0.0);
    }

    #[test]
    fn test_continuations_bounded_by_shade_counts() {
        // A diffuse floor under a light: paths bounce several times
        let floor = [
            Triangle::flat(
                [
                    Vec3::new(-10.0, -1.0, -10.0),
                    Vec3::new(10.0, -1.0, -10.0),
                    Vec3::new(-10.0, -1.0, 10.0),
                ],
                0,
            ),
            Triangle::flat(
                [
                    Vec3::new(10.0, -1.0, -10.0),
                    Vec3::new(10.0, -1.0, 10.0),
                    Vec3::new(-10.0, -1.0, 10.0),
                ],
                0,
            ),
        ];
        let light = Triangle::flat(
            [
                Vec3::new(-1.0, 4.0, -3.0),
                Vec3::new(1.0, 4.0, -3.0),
                Vec3::new(0.0, 4.0, -5.0),
            ],
            1,
        );
        let scene = Scene::new(
            vec![floor[0].clone(), floor[1].clone(), light],
            vec![
                Material::Diffuse {
                    albedo: Vec3::splat(0.7),
                    texture: None,
                },
                Material::Light {
                    emission: Vec3::splat(5.0),
                },
            ],
            Vec::new(),
            Sky::constant(Vec3::splat(0.1)),
        );

        let screen = Screen::new(16, 16);
        let mut pt = PathTracer::new(
            scene,
            Settings::default(),
            look_down_negative_z(90.0),
            screen,
        )
        .unwrap();
        pt.camera.position = Vec3::new(0.0, 1.0, 4.0);
        pt.camera.resize(screen.width, screen.height);
        pt.render_frame();

        for bounce in 0..NUM_BOUNCES - 1 {
            let continuations = QueueCounters::count(&pt.counters.trace[bounce + 1]);
            let shaded = QueueCounters::count(&pt.counters.diffuse[bounce])
                + QueueCounters::count(&pt.counters.dielectric[bounce])
                + QueueCounters::count(&pt.counters.glossy[bounce]);
            assert!(
                continuations <= shaded,
                "bounce {bounce}: {continuations} continuations from {shaded} shaded rays"
            );
        }

        // The primary dispatch covered every pixel exactly once
        assert_eq!(
            QueueCounters::count(&pt.counters.trace[0]),
            screen.pixel_count()
        );
    }

    #[test]
    fn test_russian_roulette_kills_black_paths() {
        // Every surface is perfectly absorbing: after the first diffuse
        // event the throughput is zero and roulette must terminate every
        // path unconditionally
        let floor = Triangle::flat(
            [
                Vec3::new(-50.0, 0.0, -50.0),
                Vec3::new(50.0, 0.0, -50.0),
                Vec3::new(0.0, 0.0, 50.0),
            ],
            0,
        );
        let scene = Scene::new(
            vec![floor],
            vec![Material::Diffuse {
                albedo: Vec3::ZERO,
                texture: None,
            }],
            Vec::new(),
            Sky::constant(Vec3::ZERO),
        );

        let screen = Screen::new(8, 8);
        let mut pt = PathTracer::new(
            scene,
            Settings::default(),
            look_down_negative_z(90.0),
            screen,
        )
        .unwrap();
        pt.camera.position = Vec3::new(0.0, 2.0, 0.0);
        pt.camera.look_at(Vec3::new(0.0, 0.0, -5.0), Vec3::Y);
        pt.camera.resize(screen.width, screen.height);
        pt.render_frame();

        // Bounce-1 rays exist (continuations from the floor) but none of
        // them survives the bounce-1 sort
        assert!(QueueCounters::count(&pt.counters.trace[1]) > 0);
        assert_eq!(QueueCounters::count(&pt.counters.diffuse[1]), 0);
    }

    #[test]
    fn test_nee_lights_a_diffuse_floor() {
        let floor = Triangle::flat(
            [
                Vec3::new(-20.0, 0.0, -20.0),
                Vec3::new(20.0, 0.0, -20.0),
                Vec3::new(0.0, 0.0, 20.0),
            ],
            0,
        );
        // Light hanging above, facing down
        let light = Triangle::flat(
            [
                Vec3::new(-1.0, 3.0, -4.0),
                Vec3::new(0.0, 3.0, -6.0),
                Vec3::new(1.0, 3.0, -4.0),
            ],
            1,
        );
        let scene = Scene::new(
            vec![floor, light],
            vec![
                Material::Diffuse {
                    albedo: Vec3::splat(0.8),
                    texture: None,
                },
                Material::Light {
                    emission: Vec3::splat(10.0),
                },
            ],
            Vec::new(),
            Sky::constant(Vec3::ZERO),
        );

        let screen = Screen::new(16, 16);
        let mut pt = PathTracer::new(
            scene,
            Settings::default(),
            look_down_negative_z(90.0),
            screen,
        )
        .unwrap();
        pt.camera.position = Vec3::new(0.0, 1.5, 0.0);
        pt.camera.look_at(Vec3::new(0.0, 0.0, -5.0), Vec3::Y);
        pt.camera.resize(screen.width, screen.height);

        for _ in 0..4 {
            pt.render_frame();
        }
        assert_eq!(pt.frames_accumulated(), 4);

        // The floor below the light must receive energy
        let mut lit = 0;
        for y in 0..screen.height {
            for x in 0..screen.width {
                let c = pt.accumulator()[pixel_of(screen, x, y)];
                assert!(c.x.is_finite() && c.x >= 0.0);
                if c.x > 0.0 {
                    lit += 1;
                }
            }
        }
        assert!(lit > 0, "no pixel received any light");
    }

    #[test]
    fn test_gbuffer_replay_matches_material_routing() {
        // One diffuse triangle filling the center of the view
        let triangles = vec![Triangle::new(
            [
                Vec3::new(-2.0, -2.0, -3.0),
                Vec3::new(2.0, -2.0, -3.0),
                Vec3::new(0.0, 2.0, -3.0),
            ],
            [Vec3::Z; 3],
            [Vec2::ZERO, Vec2::X, Vec2::Y],
            0,
            0,
        )];
        let scene = Scene::new(
            triangles,
            vec![Material::Diffuse {
                albedo: Vec3::splat(0.5),
                texture: None,
            }],
            Vec::new(),
            Sky::constant(Vec3::splat(0.3)),
        );

        let screen = Screen::new(8, 8);
        let mut settings = Settings::default();
        settings.jitter_primary = false;

        let mut pt =
            PathTracer::new(scene, settings, look_down_negative_z(90.0), screen).unwrap();

        // Hand-built G-buffer: the center pixel saw the triangle's centroid
        let mut gbuffer = GBuffer::new(screen.buffer_len());
        let center = pixel_of(screen, 4, 4);
        gbuffer.triangle_id[center] = 0;
        gbuffer.uv[center] = Vec2::new(0.25, 0.25);

        pt.render_frame_with_gbuffer(&gbuffer);

        // Exactly one pixel went through the diffuse queue; the rest were
        // settled as misses during replay
        assert_eq!(QueueCounters::count(&pt.counters.diffuse[0]), 1);
        assert_eq!(QueueCounters::count(&pt.counters.trace[0]), 0);

        let sky_pixel = pt.accumulator()[pixel_of(screen, 0, 0)];
        assert!((sky_pixel.x - 0.3).abs() < 1e-4);
    }
}
