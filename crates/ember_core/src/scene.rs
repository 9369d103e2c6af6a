//! Scene tables consumed by the render kernels.
//!
//! A `Scene` is the ingestion form: a triangle soup plus material, texture
//! and sky tables. The acceleration-structure builder reorders the soup into
//! flattened leaf order; `TriangleTables` and `LightTable` are built from
//! that order and are the read-only SoA data the kernels index directly.

use ember_math::{Aabb, Vec2, Vec3};

use crate::constants::{MAX_MATERIALS, MAX_TEXTURES};
use crate::error::{RenderError, RenderResult};
use crate::material::Material;
use crate::settings::LightSelection;
use crate::sky::Sky;
use crate::texture::Texture;

/// Output surface dimensions. `pitch >= width` keeps rows aligned; pixel
/// index is `y * pitch + x`.
#[derive(Debug, Clone, Copy)]
pub struct Screen {
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
}

impl Screen {
    /// Create a screen with rows padded to a 64-pixel alignment.
    pub fn new(width: u32, height: u32) -> Self {
        let pitch = width.div_ceil(64) * 64;
        Self {
            width,
            height,
            pitch,
        }
    }

    /// Total buffer slots, including row padding.
    pub fn buffer_len(&self) -> usize {
        (self.pitch * self.height) as usize
    }

    /// Live pixels, excluding row padding.
    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }
}

/// One input triangle with full shading attributes.
#[derive(Debug, Clone)]
pub struct Triangle {
    pub position0: Vec3,
    pub position1: Vec3,
    pub position2: Vec3,
    pub normal0: Vec3,
    pub normal1: Vec3,
    pub normal2: Vec3,
    pub tex_coord0: Vec2,
    pub tex_coord1: Vec2,
    pub tex_coord2: Vec2,
    pub material_id: u32,
    pub mesh_id: u32,
    pub aabb: Aabb,
}

impl Triangle {
    /// Create a triangle with smooth normals and UVs.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        positions: [Vec3; 3],
        normals: [Vec3; 3],
        tex_coords: [Vec2; 3],
        material_id: u32,
        mesh_id: u32,
    ) -> Self {
        Self {
            position0: positions[0],
            position1: positions[1],
            position2: positions[2],
            normal0: normals[0],
            normal1: normals[1],
            normal2: normals[2],
            tex_coord0: tex_coords[0],
            tex_coord1: tex_coords[1],
            tex_coord2: tex_coords[2],
            material_id,
            mesh_id,
            aabb: Aabb::from_points(&positions),
        }
    }

    /// Create a flat-shaded triangle: the geometric normal at every vertex,
    /// zero UVs.
    pub fn flat(positions: [Vec3; 3], material_id: u32) -> Self {
        let normal = (positions[1] - positions[0])
            .cross(positions[2] - positions[0])
            .normalize_or_zero();
        Self::new(
            positions,
            [normal; 3],
            [Vec2::ZERO; 3],
            material_id,
            0,
        )
    }

    pub fn center(&self) -> Vec3 {
        self.aabb.centroid()
    }

    pub fn area(&self) -> f32 {
        0.5 * (self.position1 - self.position0)
            .cross(self.position2 - self.position0)
            .length()
    }
}

/// The scene in ingestion form.
pub struct Scene {
    pub triangles: Vec<Triangle>,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
    pub sky: Sky,
}

impl Scene {
    /// Create a scene over a uniform sky.
    pub fn new(
        triangles: Vec<Triangle>,
        materials: Vec<Material>,
        textures: Vec<Texture>,
        sky: Sky,
    ) -> Self {
        Self {
            triangles,
            materials,
            textures,
            sky,
        }
    }

    /// Enforce the table limits before any device upload happens.
    pub fn validate(&self) -> RenderResult<()> {
        if self.materials.len() > MAX_MATERIALS {
            return Err(RenderError::Configuration(format!(
                "{} materials, maximum is {}",
                self.materials.len(),
                MAX_MATERIALS
            )));
        }
        if self.textures.len() > MAX_TEXTURES {
            return Err(RenderError::Configuration(format!(
                "{} textures, maximum is {}",
                self.textures.len(),
                MAX_TEXTURES
            )));
        }
        for tri in &self.triangles {
            if tri.material_id as usize >= self.materials.len() {
                return Err(RenderError::Configuration(format!(
                    "triangle references material {} of {}",
                    tri.material_id,
                    self.materials.len()
                )));
            }
        }
        Ok(())
    }
}

/// Triangle attributes in SoA layout, ordered by flattened BVH leaf slot.
///
/// Positions, normals and UVs are stored as a base vertex plus two edges so
/// the shading kernels can reconstruct any surface point as
/// `base + u * edge1 + v * edge2`.
#[derive(Default)]
pub struct TriangleTables {
    pub position0: Vec<Vec3>,
    pub position_edge1: Vec<Vec3>,
    pub position_edge2: Vec<Vec3>,

    pub normal0: Vec<Vec3>,
    pub normal_edge1: Vec<Vec3>,
    pub normal_edge2: Vec<Vec3>,

    pub tex_coord0: Vec<Vec2>,
    pub tex_coord_edge1: Vec<Vec2>,
    pub tex_coord_edge2: Vec<Vec2>,

    pub material_id: Vec<u32>,
    pub mesh_id: Vec<u32>,
}

impl TriangleTables {
    /// Flatten `triangles` into SoA order given the BVH leaf index array.
    /// Slots may repeat source triangles when references were split.
    pub fn build(triangles: &[Triangle], order: &[u32]) -> Self {
        let mut tables = Self::with_capacity(order.len());
        for &src in order {
            tables.push(&triangles[src as usize]);
        }
        tables
    }

    fn with_capacity(n: usize) -> Self {
        Self {
            position0: Vec::with_capacity(n),
            position_edge1: Vec::with_capacity(n),
            position_edge2: Vec::with_capacity(n),
            normal0: Vec::with_capacity(n),
            normal_edge1: Vec::with_capacity(n),
            normal_edge2: Vec::with_capacity(n),
            tex_coord0: Vec::with_capacity(n),
            tex_coord_edge1: Vec::with_capacity(n),
            tex_coord_edge2: Vec::with_capacity(n),
            material_id: Vec::with_capacity(n),
            mesh_id: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, tri: &Triangle) {
        self.position0.push(tri.position0);
        self.position_edge1.push(tri.position1 - tri.position0);
        self.position_edge2.push(tri.position2 - tri.position0);

        self.normal0.push(tri.normal0);
        self.normal_edge1.push(tri.normal1 - tri.normal0);
        self.normal_edge2.push(tri.normal2 - tri.normal0);

        self.tex_coord0.push(tri.tex_coord0);
        self.tex_coord_edge1.push(tri.tex_coord1 - tri.tex_coord0);
        self.tex_coord_edge2.push(tri.tex_coord2 - tri.tex_coord0);

        self.material_id.push(tri.material_id);
        self.mesh_id.push(tri.mesh_id);
    }

    pub fn len(&self) -> usize {
        self.position0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position0.is_empty()
    }

    /// Surface point at barycentric (u, v) on a slot.
    #[inline]
    pub fn point(&self, slot: usize, u: f32, v: f32) -> Vec3 {
        self.position0[slot] + u * self.position_edge1[slot] + v * self.position_edge2[slot]
    }

    /// Interpolated shading normal at barycentric (u, v), unit length.
    #[inline]
    pub fn normal(&self, slot: usize, u: f32, v: f32) -> Vec3 {
        (self.normal0[slot] + u * self.normal_edge1[slot] + v * self.normal_edge2[slot])
            .normalize_or_zero()
    }

    /// Interpolated texture coordinate at barycentric (u, v).
    #[inline]
    pub fn tex_coord(&self, slot: usize, u: f32, v: f32) -> Vec2 {
        self.tex_coord0[slot] + u * self.tex_coord_edge1[slot] + v * self.tex_coord_edge2[slot]
    }

    /// Geometric normal of a slot, unit length.
    #[inline]
    pub fn geometric_normal(&self, slot: usize) -> Vec3 {
        self.position_edge1[slot]
            .cross(self.position_edge2[slot])
            .normalize_or_zero()
    }

    /// World-space area of a slot.
    #[inline]
    pub fn area(&self, slot: usize) -> f32 {
        0.5 * self.position_edge1[slot]
            .cross(self.position_edge2[slot])
            .length()
    }
}

/// Emissive-triangle table for next-event estimation.
///
/// Holds one entry per *source* emissive triangle, pointing at its first
/// flattened slot; spatial splits may duplicate a triangle across leaves but
/// it must be sampled exactly once.
pub struct LightTable {
    /// Flattened slots of the emissive triangles.
    pub indices: Vec<u32>,
    /// Per-light world-space area, parallel to `indices`.
    pub areas: Vec<f32>,
    /// Cumulative area distribution for area-weighted selection.
    cdf: Vec<f32>,
    pub total_area: f32,
}

impl LightTable {
    /// Scan for emissive source triangles and map each to its first
    /// flattened slot.
    pub fn build(triangles: &[Triangle], materials: &[Material], order: &[u32]) -> Self {
        let mut first_slot = vec![u32::MAX; triangles.len()];
        for (slot, &src) in order.iter().enumerate() {
            let entry = &mut first_slot[src as usize];
            if *entry == u32::MAX {
                *entry = slot as u32;
            }
        }

        let mut indices = Vec::new();
        let mut areas = Vec::new();
        for (i, tri) in triangles.iter().enumerate() {
            if materials[tri.material_id as usize].is_light() && first_slot[i] != u32::MAX {
                indices.push(first_slot[i]);
                areas.push(tri.area());
            }
        }

        let mut cdf = Vec::with_capacity(areas.len());
        let mut total_area = 0.0;
        for &a in &areas {
            total_area += a;
            cdf.push(total_area);
        }

        if !indices.is_empty() {
            log::info!(
                "{} emissive triangles, total area {:.4}",
                indices.len(),
                total_area
            );
        }

        Self {
            indices,
            areas,
            cdf,
            total_area,
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Pick a light from a uniform random number. Returns the light's
    /// flattened slot, its area, and the selection probability.
    pub fn select(&self, strategy: LightSelection, xi: f32) -> (u32, f32, f32) {
        debug_assert!(!self.is_empty());
        let n = self.indices.len();

        let light = match strategy {
            LightSelection::Uniform => ((xi * n as f32) as usize).min(n - 1),
            LightSelection::Area => {
                let target = xi * self.total_area;
                self.cdf.partition_point(|&c| c < target).min(n - 1)
            }
        };

        let area = self.areas[light];
        let pdf = match strategy {
            LightSelection::Uniform => 1.0 / n as f32,
            LightSelection::Area => area / self.total_area,
        };

        (self.indices[light], area, pdf)
    }

    /// Selection probability of a light with the given area.
    pub fn selection_pdf(&self, strategy: LightSelection, area: f32) -> f32 {
        match strategy {
            LightSelection::Uniform => 1.0 / self.indices.len().max(1) as f32,
            LightSelection::Area => {
                if self.total_area > 0.0 {
                    area / self.total_area
                } else {
                    0.0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_triangles(material_id: u32) -> Vec<Triangle> {
        vec![
            Triangle::flat(
                [
                    Vec3::new(0.0, 0.0, 0.0),
                    Vec3::new(1.0, 0.0, 0.0),
                    Vec3::new(0.0, 1.0, 0.0),
                ],
                material_id,
            ),
            Triangle::flat(
                [
                    Vec3::new(1.0, 0.0, 0.0),
                    Vec3::new(1.0, 1.0, 0.0),
                    Vec3::new(0.0, 1.0, 0.0),
                ],
                material_id,
            ),
        ]
    }

    #[test]
    fn test_screen_pitch_alignment() {
        let screen = Screen::new(100, 50);
        assert_eq!(screen.pitch, 128);
        assert_eq!(screen.buffer_len(), 128 * 50);
        assert_eq!(screen.pixel_count(), 100 * 50);
    }

    #[test]
    fn test_triangle_area() {
        let tri = Triangle::flat(
            [Vec3::ZERO, Vec3::X, Vec3::Y],
            0,
        );
        assert!((tri.area() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_tables_reconstruct_point() {
        let triangles = quad_triangles(0);
        let order: Vec<u32> = vec![0, 1];
        let tables = TriangleTables::build(&triangles, &order);

        assert_eq!(tables.len(), 2);

        // Barycenter of the first triangle
        let p = tables.point(0, 1.0 / 3.0, 1.0 / 3.0);
        assert!((p - Vec3::new(1.0 / 3.0, 1.0 / 3.0, 0.0)).length() < 1e-5);

        let n = tables.normal(0, 0.2, 0.3);
        assert!((n.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_scene_validation_limits() {
        let scene = Scene::new(
            vec![Triangle::flat([Vec3::ZERO, Vec3::X, Vec3::Y], 5)],
            vec![Material::Diffuse {
                albedo: Vec3::ONE,
                texture: None,
            }],
            Vec::new(),
            Sky::constant(Vec3::ZERO),
        );
        // Triangle references material 5 but only one exists
        assert!(scene.validate().is_err());
    }

    #[test]
    fn test_light_table_dedups_split_references() {
        let triangles = quad_triangles(0);
        let materials = vec![Material::Light {
            emission: Vec3::ONE,
        }];
        // Triangle 0 duplicated across two leaves, as a spatial split would
        let order: Vec<u32> = vec![0, 0, 1];
        let lights = LightTable::build(&triangles, &materials, &order);

        assert_eq!(lights.len(), 2);
        assert_eq!(lights.indices[0], 0); // first slot of triangle 0
        assert_eq!(lights.indices[1], 2); // triangle 1 landed at slot 2
        assert!((lights.total_area - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_light_selection_pdfs() {
        let triangles = quad_triangles(0);
        let materials = vec![Material::Light {
            emission: Vec3::ONE,
        }];
        let order: Vec<u32> = vec![0, 1];
        let lights = LightTable::build(&triangles, &materials, &order);

        let (_, _, pdf) = lights.select(LightSelection::Uniform, 0.4);
        assert!((pdf - 0.5).abs() < 1e-6);

        let (_, area, pdf) = lights.select(LightSelection::Area, 0.9);
        assert!((pdf - area / lights.total_area).abs() < 1e-6);
    }
}
