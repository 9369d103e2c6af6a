//! Tagged material variants.
//!
//! The wavefront pipeline never dispatches on a material dynamically: the
//! sorter buckets hits into one homogeneous queue per tag and each shading
//! kernel handles exactly one variant.

use ember_math::Vec3;

/// Index into the scene's texture table.
pub type TextureId = u32;

/// A surface material.
#[derive(Debug, Clone, PartialEq)]
pub enum Material {
    /// Emits light; terminates paths that hit it.
    Light { emission: Vec3 },
    /// Lambertian reflector with an optional albedo texture.
    Diffuse {
        albedo: Vec3,
        texture: Option<TextureId>,
    },
    /// Smooth refractive interface with Beer-Lambert absorption.
    Dielectric { ior: f32, absorption: Vec3 },
    /// Beckmann microfacet reflector.
    Glossy {
        albedo: Vec3,
        ior: f32,
        roughness: f32,
        texture: Option<TextureId>,
    },
}

impl Material {
    /// True for materials whose emission terminates a path.
    pub fn is_light(&self) -> bool {
        matches!(self, Material::Light { .. })
    }

    /// Emitted radiance; zero for non-lights.
    pub fn emission(&self) -> Vec3 {
        match self {
            Material::Light { emission } => *emission,
            _ => Vec3::ZERO,
        }
    }

    /// The queue tag the sorter routes this material to.
    /// Lights are terminated before routing and have no tag.
    pub fn tag(&self) -> Option<MaterialTag> {
        match self {
            Material::Light { .. } => None,
            Material::Diffuse { .. } => Some(MaterialTag::Diffuse),
            Material::Dielectric { .. } => Some(MaterialTag::Dielectric),
            Material::Glossy { roughness, .. } => Some(MaterialTag::Glossy {
                roughness: *roughness,
            }),
        }
    }
}

/// Which shading kernel produced the ray currently in flight.
///
/// Carried along a path so the sorter can pick the MIS branch when the next
/// segment lands on a light. Glossy events carry their roughness because
/// near-mirror lobes are exempt from MIS weighting.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MaterialTag {
    Diffuse,
    /// Also the seed tag for primary rays: a bounce-0 light hit must take
    /// the no-MIS branch, which is the dielectric rule.
    #[default]
    Dielectric,
    Glossy { roughness: f32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_tags() {
        let light = Material::Light {
            emission: Vec3::ONE,
        };
        assert!(light.is_light());
        assert_eq!(light.tag(), None);
        assert_eq!(light.emission(), Vec3::ONE);

        let diffuse = Material::Diffuse {
            albedo: Vec3::splat(0.5),
            texture: None,
        };
        assert_eq!(diffuse.tag(), Some(MaterialTag::Diffuse));
        assert_eq!(diffuse.emission(), Vec3::ZERO);

        let glass = Material::Dielectric {
            ior: 1.5,
            absorption: Vec3::ZERO,
        };
        assert_eq!(glass.tag(), Some(MaterialTag::Dielectric));

        let glossy = Material::Glossy {
            albedo: Vec3::ONE,
            ior: 1.3,
            roughness: 0.4,
            texture: None,
        };
        assert_eq!(glossy.tag(), Some(MaterialTag::Glossy { roughness: 0.4 }));
    }

    #[test]
    fn test_default_tag_is_dielectric() {
        // Primary rays are seeded with the default tag so bounce-0 light
        // hits deposit full emission.
        assert_eq!(MaterialTag::default(), MaterialTag::Dielectric);
    }
}
