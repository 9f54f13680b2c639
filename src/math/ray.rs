//! Rays and the slab test against bounding boxes

use crate::core::types::Vec3;
use super::aabb::Aabb;

/// Ray with a cached reciprocal direction
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    /// 1/direction; infinite on axes the ray doesn't move along
    pub inv_direction: Vec3,
}

impl Ray {
    /// Create a new ray (direction should be normalized)
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            inv_direction: direction.recip(),
        }
    }

    /// Point at parameter `t`
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Parameters `(t_enter, t_exit)` of the line through `aabb`; a miss when
    /// `t_enter > t_exit`. Same test as `slab_interval` in prelude.wgsl.
    pub fn slab_interval(&self, aabb: &Aabb) -> (f32, f32) {
        let t1 = (aabb.min - self.origin) * self.inv_direction;
        let t2 = (aabb.max - self.origin) * self.inv_direction;
        (t1.min(t2).max_element(), t1.max(t2).min_element())
    }

    /// Part of `[t_min, t_max]` spent inside `aabb`
    pub fn clip(&self, aabb: &Aabb, t_min: f32, t_max: f32) -> Option<(f32, f32)> {
        let (t_enter, t_exit) = self.slab_interval(aabb);
        let start = t_enter.max(t_min);
        let end = t_exit.min(t_max);
        (start <= end).then_some((start, end))
    }

    /// Forward part of the ray inside `aabb`; `t_near` is 0 when the origin is inside
    pub fn intersects_aabb(&self, aabb: &Aabb) -> Option<(f32, f32)> {
        self.clip(aabb, 0.0, f32::INFINITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Aabb {
        Aabb::new(Vec3::ZERO, Vec3::ONE)
    }

    #[test]
    fn test_at() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 1.0), Vec3::NEG_Z);
        assert_eq!(ray.at(21.0), Vec3::new(0.0, 0.0, -20.0));
    }

    #[test]
    fn test_enters_and_exits() {
        let ray = Ray::new(Vec3::new(-2.0, 0.5, 0.5), Vec3::X);
        let (t_near, t_far) = ray.intersects_aabb(&unit_box()).unwrap();
        assert!((t_near - 2.0).abs() < 0.001);
        assert!((t_far - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_misses_box() {
        let ray = Ray::new(Vec3::new(-2.0, 5.0, 0.5), Vec3::X);
        let (t_enter, t_exit) = ray.slab_interval(&unit_box());
        assert!(t_enter > t_exit);
        assert!(ray.intersects_aabb(&unit_box()).is_none());
    }

    #[test]
    fn test_origin_inside() {
        let ray = Ray::new(Vec3::splat(0.5), Vec3::X);
        let (t_near, t_far) = ray.intersects_aabb(&unit_box()).unwrap();
        assert_eq!(t_near, 0.0);
        assert!((t_far - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_box_behind() {
        let ray = Ray::new(Vec3::new(2.0, 0.5, 0.5), Vec3::X);
        assert!(ray.intersects_aabb(&unit_box()).is_none());
    }

    #[test]
    fn test_clip_to_range() {
        // Sphere volume box from the default scene, camera at z = 1
        let aabb = Aabb::new(Vec3::new(-7.0, -7.0, -27.0), Vec3::new(7.0, 7.0, -13.0));
        let ray = Ray::new(Vec3::new(0.0, 0.0, 1.0), Vec3::NEG_Z);

        assert_eq!(ray.clip(&aabb, 0.0, 100.0), Some((14.0, 28.0)));
        assert_eq!(ray.clip(&aabb, 20.0, 25.0), Some((20.0, 25.0)));
        assert!(ray.clip(&aabb, 0.0, 10.0).is_none());
    }
}
