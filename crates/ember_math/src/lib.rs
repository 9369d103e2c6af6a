// Re-export glam for convenience
pub use glam::*;

// Ember math types
mod aabb;
mod ray;

pub use aabb::Aabb;
pub use ray::Ray;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_reexport() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(v.x, 1.0);
        assert_eq!(v.max_element(), 3.0);
    }
}
