//! Scene preparation: build the SBVH, collapse it, flatten the triangle
//! tables into leaf order and derive the light table.

use ember_core::{LightTable, Material, RenderResult, Scene, Sky, Texture, TriangleTables};

use crate::bvh::{Mbvh, Sbvh};

/// Everything the render kernels read: the traversal structure plus the
/// flattened read-only scene tables.
pub struct SceneAccel {
    pub mbvh: Mbvh,
    pub tables: TriangleTables,
    pub lights: LightTable,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
    pub sky: Sky,
}

impl SceneAccel {
    /// Validate and upload a scene. Consumes it; the renderer owns the
    /// tables from here on.
    pub fn build(scene: Scene) -> RenderResult<Self> {
        scene.validate()?;

        let sbvh = Sbvh::build(&scene.triangles)?;
        let mbvh = Mbvh::from_sbvh(&sbvh);

        // Flattening by leaf order removes the index indirection from the
        // traversal inner loop
        let tables = TriangleTables::build(&scene.triangles, &sbvh.indices);
        let lights = LightTable::build(&scene.triangles, &scene.materials, &sbvh.indices);

        log::info!(
            "scene ready: {} triangles ({} flattened), {} materials, {} lights",
            scene.triangles.len(),
            tables.len(),
            scene.materials.len(),
            lights.len()
        );

        Ok(Self {
            mbvh,
            tables,
            lights,
            materials: scene.materials,
            textures: scene.textures,
            sky: scene.sky,
        })
    }

    /// Material of a flattened triangle slot.
    #[inline]
    pub fn material_of(&self, slot: usize) -> &Material {
        &self.materials[self.tables.material_id[slot] as usize]
    }
}
