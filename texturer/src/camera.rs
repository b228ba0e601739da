use serde::Deserialize;

use crate::geometry::{Point3, ProjectedPoint, Rotation3, Vector2, Vector3};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Projection {
    Orthographic,
    Perspective,
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Orthographic
    }
}

// Pinhole camera of the estimator's crop: points are translated into the
// camera frame and projected onto a size x size image with the principal
// point at its center. Projected points are [i, j] pixel coordinates.
#[derive(Clone, Copy, Debug)]
pub struct ImageCamera {
    pub focal_length: f64,
    pub size: f64,
    pub translation: Vector3,
}

impl ImageCamera {
    pub fn project(&self, point: &Point3) -> ProjectedPoint {
        let p = point.coords + self.translation;
        let half = self.size / 2.0;
        let scale = self.focal_length / p.z;
        ProjectedPoint {
            point: Vector2::new(p.y * scale + half, p.x * scale + half),
            depth: p.z,
        }
    }

    pub fn project_all(&self, points: &[Point3]) -> Vec<ProjectedPoint> {
        points.iter().map(|p| self.project(p)).collect()
    }
}

// Observer used for hidden-surface tests. The eye sits at the estimated
// translation with the z-axis flipped and looks down +z.
#[derive(Clone, Copy, Debug)]
pub struct ViewCamera {
    pub eye: Point3,
    pub projection: Projection,
}

impl ViewCamera {
    pub fn new(translation: Vector3, projection: Projection) -> Self {
        ViewCamera {
            eye: Point3::new(translation.x, translation.y, -translation.z),
            projection,
        }
    }

    pub fn project(&self, point: &Point3) -> ProjectedPoint {
        let depth = point.z - self.eye.z;
        let xy = Vector2::new(point.x, point.y);
        let point = match self.projection {
            Projection::Orthographic => xy,
            Projection::Perspective => {
                (xy - Vector2::new(self.eye.x, self.eye.y)) / depth
            }
        };
        ProjectedPoint { point, depth }
    }

    pub fn project_all(&self, points: &[Point3]) -> Vec<ProjectedPoint> {
        points.iter().map(|p| self.project(p)).collect()
    }

    // Unit direction from the point toward the observer.
    pub fn direction_to_eye(&self, point: &Point3) -> Vector3 {
        match self.projection {
            Projection::Orthographic => -Vector3::z(),
            Projection::Perspective => (self.eye - point).normalize(),
        }
    }
}

// Viewpoint of a render, given as Euler angles in degrees.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ViewRotation {
    pub euler_degrees: [f64; 3],
}

impl ViewRotation {
    pub fn identity() -> Self {
        ViewRotation {
            euler_degrees: [0.0; 3],
        }
    }

    pub fn rotation(&self) -> Rotation3 {
        let [x, y, z] = self.euler_degrees;
        Rotation3::from_euler_angles(
            x.to_radians(),
            y.to_radians(),
            z.to_radians(),
        )
    }
}

impl From<[f64; 3]> for ViewRotation {
    fn from(euler_degrees: [f64; 3]) -> Self {
        ViewRotation { euler_degrees }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use base::assert_eq_f32;

    #[test]
    fn test_image_camera_center() {
        let camera = ImageCamera {
            focal_length: 5000.0,
            size: 224.0,
            translation: Vector3::new(0.0, 0.0, 50.0),
        };
        let p = camera.project(&Point3::new(0.0, 0.0, 0.0));
        assert_eq_f32!(p.point[0], 112.0);
        assert_eq_f32!(p.point[1], 112.0);
        assert_eq_f32!(p.depth, 50.0);

        // x moves columns, y moves rows.
        let p = camera.project(&Point3::new(0.1, -0.2, 0.0));
        assert_eq_f32!(p.point[1], 112.0 + 10.0);
        assert_eq_f32!(p.point[0], 112.0 - 20.0);
    }

    #[test]
    fn test_view_camera_flips_z() {
        let translation = Vector3::new(0.5, 0.0, 10.0);
        let camera = ViewCamera::new(translation, Projection::Orthographic);
        assert_eq!(camera.eye, Point3::new(0.5, 0.0, -10.0));
        let p = camera.project(&Point3::new(1.0, 2.0, 0.0));
        assert_eq!(p.point, Vector2::new(1.0, 2.0));
        assert_eq_f32!(p.depth, 10.0);

        let camera = ViewCamera::new(translation, Projection::Perspective);
        let p = camera.project(&Point3::new(1.5, 2.0, 0.0));
        assert_eq_f32!(p.point[0], 0.1);
        assert_eq_f32!(p.point[1], 0.2);
        let d = camera.direction_to_eye(&Point3::new(0.5, 0.0, 0.0));
        assert_eq_f32!(d.z, -1.0);
    }

    #[test]
    fn test_view_rotation_about_vertical_axis() {
        let r = ViewRotation::from([0.0, 180.0, 0.0]).rotation();
        let p = r * Point3::new(1.0, 2.0, 3.0);
        assert_eq_f32!(p.x, -1.0);
        assert_eq_f32!(p.y, 2.0);
        assert_eq_f32!(p.z, -3.0);
        assert_eq!(ViewRotation::identity().rotation(), Rotation3::identity());
    }
}
