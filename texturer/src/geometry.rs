// Geometry types and triangle helpers shared by the UV coverage, the
// visibility oracle and the software renderer.

pub type Vector2 = nalgebra::Vector2<f64>;
pub type Vector3 = nalgebra::Vector3<f64>;
pub type Point3 = nalgebra::Point3<f64>;
pub type Matrix2 = nalgebra::Matrix2<f64>;
pub type Matrix3 = nalgebra::Matrix3<f64>;
pub type Rotation3 = nalgebra::Rotation3<f64>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectedPoint {
    pub point: Vector2,
    pub depth: f64,
}

pub struct BarycentricCoordinateSystem {
    vs: [Vector2; 3],
    inv22: Matrix2,
}

impl BarycentricCoordinateSystem {
    pub fn new(vs: [Vector2; 3]) -> Option<Self> {
        let m22 = Matrix2::from_columns(&[vs[1] - vs[0], vs[2] - vs[0]]);
        // None when the triangle is degenerate.
        let inv22 = m22.try_inverse()?;
        Some(Self { vs, inv22 })
    }

    pub fn infer(&self, v: Vector2) -> Vector3 {
        let l = self.inv22 * (v - self.vs[0]);
        Vector3::new(1.0 - l[0] - l[1], l[0], l[1])
    }
}

pub fn all_nonneg(v: Vector3) -> bool {
    v.iter().all(|&c| c >= 0.0)
}

pub fn interpolate<T>(bary: Vector3, values: [T; 3]) -> T
where
    T: std::ops::Mul<f64, Output = T> + std::ops::Add<Output = T> + Copy,
{
    values[0] * bary[0] + values[1] * bary[1] + values[2] * bary[2]
}

// Visits every cell of a height x width grid whose center lies inside the
// triangle. Corners are given as continuous [i, j] coordinates, where cell
// (i, j) spans [i, i + 1) x [j, j + 1).
pub fn rasterize_triangle<F: FnMut(usize, usize, Vector3)>(
    ijs: [Vector2; 3],
    height: usize,
    width: usize,
    mut visit: F,
) {
    let finite = ijs.iter().all(|ij| ij.iter().all(|c| c.is_finite()));
    if height == 0 || width == 0 || !finite {
        return;
    }
    let bcs = match BarycentricCoordinateSystem::new(ijs) {
        Some(bcs) => bcs,
        None => return,
    };

    let coord = |k: usize| ijs.iter().map(move |ij| ij[k]);
    let lo = |k: usize| coord(k).fold(f64::INFINITY, f64::min);
    let hi = |k: usize| coord(k).fold(f64::NEG_INFINITY, f64::max);
    let range = |k: usize, len: usize| {
        let first = (lo(k) - 0.5).ceil().max(0.0) as usize;
        let last = (hi(k) - 0.5).floor();
        if last < 0.0 {
            return first..first;
        }
        first..(last as usize + 1).min(len)
    };

    for i in range(0, height) {
        for j in range(1, width) {
            let center = Vector2::new(i as f64 + 0.5, j as f64 + 0.5);
            let bary = bcs.infer(center);
            if all_nonneg(bary) {
                visit(i, j, bary);
            }
        }
    }
}

pub fn face_normal(vs: [Point3; 3]) -> Vector3 {
    (vs[1] - vs[0]).cross(&(vs[2] - vs[0]))
}

// Area-weighted vertex normals.
pub fn vertex_normals(
    vertices: &[Point3],
    faces: &[[usize; 3]],
) -> Vec<Vector3> {
    let mut normals = vec![Vector3::zeros(); vertices.len()];
    for &[v0, v1, v2] in faces {
        let n = face_normal([vertices[v0], vertices[v1], vertices[v2]]);
        normals[v0] += n;
        normals[v1] += n;
        normals[v2] += n;
    }
    for n in normals.iter_mut() {
        let norm = n.norm();
        if norm > 0.0 {
            *n /= norm;
        }
    }
    normals
}

#[cfg(test)]
mod tests {
    use super::*;

    use base::assert_eq_f32;

    #[test]
    fn test_barycentric_round_trip() {
        let vs = [
            Vector2::new(0.0, 0.0),
            Vector2::new(4.0, 0.0),
            Vector2::new(0.0, 2.0),
        ];
        let bcs = BarycentricCoordinateSystem::new(vs).unwrap();
        let v = Vector2::new(1.0, 0.5);
        let bary = bcs.infer(v);
        assert_eq_f32!(bary.sum(), 1.0);
        assert_eq_f32!(bary[1], 0.25);
        assert_eq_f32!(bary[2], 0.25);
        assert_eq_f32!((interpolate(bary, vs) - v).norm(), 0.0);
    }

    #[test]
    fn test_degenerate_triangle() {
        let p = Vector2::new(1.0, 1.0);
        assert!(BarycentricCoordinateSystem::new([p, p, p]).is_none());

        let mut visited = 0;
        rasterize_triangle([p, p, p], 4, 4, |_, _, _| visited += 1);
        assert_eq!(visited, 0);
    }

    #[test]
    fn test_rasterize_square_halves() {
        // Two triangles covering a 4x4 grid.
        let a = Vector2::new(0.0, 0.0);
        let b = Vector2::new(0.0, 4.0);
        let c = Vector2::new(4.0, 4.0);
        let d = Vector2::new(4.0, 0.0);

        let mut hits = vec![0; 16];
        rasterize_triangle([a, b, c], 4, 4, |i, j, _| hits[i * 4 + j] += 1);
        rasterize_triangle([a, c, d], 4, 4, |i, j, _| hits[i * 4 + j] += 1);

        // Every cell is covered, diagonal cells by both triangles.
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 2 } else { 1 };
                assert_eq!(hits[i * 4 + j], expected, "cell ({}, {})", i, j);
            }
        }
    }

    #[test]
    fn test_rasterize_clips_to_grid() {
        let mut visited = vec![];
        rasterize_triangle(
            [
                Vector2::new(-10.0, -10.0),
                Vector2::new(-10.0, 30.0),
                Vector2::new(30.0, -10.0),
            ],
            2,
            3,
            |i, j, _| visited.push((i, j)),
        );
        assert_eq!(
            visited,
            vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]
        );
    }

    #[test]
    fn test_vertex_normals() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let normals = vertex_normals(&vertices, &[[0, 1, 2]]);
        for n in normals {
            assert_eq_f32!((n - Vector3::new(0.0, 0.0, 1.0)).norm(), 0.0);
        }
    }
}
