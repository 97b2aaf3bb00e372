//! Pure geometric kernels on node coordinates (spec §4.1). Every function here is
//! deterministic and order-independent up to floating point, and none of them touch
//! topology or per-step state — they only ever see positions.

use glam::DVec3;

use crate::error::HydroError;

/// Arithmetic mean of a face's node positions.
pub fn face_centroid(node_positions: &[DVec3]) -> DVec3 {
    let sum: DVec3 = node_positions.iter().copied().sum();
    sum / node_positions.len() as f64
}

/// Componentwise mean of two node positions (the midpoint of the edge `a`-`b`).
pub fn half_edge(a: DVec3, b: DVec3) -> DVec3 {
    0.5 * (a + b)
}

/// `S = 0.5 * (a x b)`, oriented so that `S . ab >= 0`.
///
/// This is how the core copes with unknown input face orientation (spec §4.1, §9):
/// area vectors are never trusted as given, they are reoriented against a caller-supplied
/// reference direction every time they're used.
pub fn signed_area_vector(a: DVec3, b: DVec3, ab: DVec3) -> DVec3 {
    let s = 0.5 * a.cross(b);
    if s.dot(ab) < 0.0 { -s } else { s }
}

/// Builds the sub-tetrahedron `(tip, face_centroid, half_edge, node)` implicitly via its
/// two defining edge vectors, and returns the oriented area vector together with a third
/// of its scalar triple product (the sub-tet volume contribution, spec §4.1/§4.2).
///
/// `tip` is normally a cell centroid; `half_edge` is the midpoint between `node` and some
/// other node sharing a face with it. The returned volume is always non-negative.
pub fn sub_tet_contribution(
    tip: DVec3,
    face_centroid: DVec3,
    half_edge: DVec3,
    node: DVec3,
) -> (DVec3, f64) {
    let a = face_centroid - tip;
    let b = face_centroid - half_edge;
    let ab = half_edge - node;

    let s = signed_area_vector(a, b, ab);
    let volume = s.dot(ab) / 3.0;

    (s, volume)
}

/// Scalar triple product `a . (b x c)`.
pub fn triple_product(a: DVec3, b: DVec3, c: DVec3) -> f64 {
    a.dot(b.cross(c))
}

/// Classical cofactor-expansion inverse of a 3x3 matrix stored row-major.
/// Returns [`HydroError::NonInvertibleMatrix`] if `|det(M)| < eps`.
pub fn invert_3x3(m: [[f64; 3]; 3], eps: f64) -> Result<[[f64; 3]; 3], HydroError> {
    let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);

    if det.abs() < eps {
        return Err(HydroError::NonInvertibleMatrix(det));
    }

    let inv_det = 1.0 / det;

    let cof = |r0: usize, r1: usize, c0: usize, c1: usize| {
        m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0]
    };

    // Adjugate transpose, scaled by 1/det.
    Ok([
        [
            cof(1, 2, 1, 2) * inv_det,
            -cof(0, 2, 1, 2) * inv_det,
            cof(0, 1, 1, 2) * inv_det,
        ],
        [
            -cof(1, 2, 0, 2) * inv_det,
            cof(0, 2, 0, 2) * inv_det,
            -cof(0, 1, 0, 2) * inv_det,
        ],
        [
            cof(1, 2, 0, 1) * inv_det,
            -cof(0, 2, 0, 1) * inv_det,
            cof(0, 1, 0, 1) * inv_det,
        ],
    ])
}

/// Multiply a 3x3 matrix (row-major) by a vector.
pub fn mat3_vec(m: [[f64; 3]; 3], v: DVec3) -> DVec3 {
    DVec3::new(
        m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
        m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
        m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn face_centroid_is_mean() {
        let ps = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(2.0, 0.0, 0.0),
            DVec3::new(2.0, 2.0, 0.0),
            DVec3::new(0.0, 2.0, 0.0),
        ];
        check!(face_centroid(&ps) == DVec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn half_edge_is_midpoint() {
        let a = DVec3::new(0.0, 0.0, 0.0);
        let b = DVec3::new(2.0, 4.0, 6.0);
        check!(half_edge(a, b) == DVec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn signed_area_vector_matches_half_cross() {
        let a = DVec3::new(1.0, 0.0, 0.0);
        let b = DVec3::new(0.0, 1.0, 0.0);
        let ab = DVec3::new(0.0, 0.0, 1.0);
        let s = signed_area_vector(a, b, ab);
        check!(s == 0.5 * a.cross(b));
    }

    #[test]
    fn signed_area_vector_orientation_correction() {
        // S . ab < 0 before correction must be flipped so the result satisfies S . ab >= 0.
        let a = DVec3::new(1.0, 0.0, 0.0);
        let b = DVec3::new(0.0, 1.0, 0.0);
        let ab = DVec3::new(0.0, 0.0, -1.0);
        let s = signed_area_vector(a, b, ab);
        check!(s.dot(ab) >= 0.0);
    }

    #[test]
    fn sub_tet_contribution_is_nonnegative() {
        let tip = DVec3::ZERO;
        let fc = DVec3::new(1.0, 0.0, 0.0);
        let he = DVec3::new(1.0, 1.0, 0.0);
        let node = DVec3::new(1.0, 1.0, 1.0);
        let (_, v) = sub_tet_contribution(tip, fc, he, node);
        check!(v >= 0.0);
    }

    #[test]
    fn invert_3x3_identity() {
        let id = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let inv = invert_3x3(id, 1e-12).unwrap();
        check!(inv == id);
    }

    #[test]
    fn invert_3x3_singular_errors() {
        let m = [[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [1.0, 1.0, 1.0]];
        let err = invert_3x3(m, 1e-9);
        check!(err.is_err());
    }

    #[test]
    fn invert_3x3_round_trip() {
        let m = [[2.0, 1.0, 0.0], [1.0, 3.0, 1.0], [0.0, 1.0, 4.0]];
        let inv = invert_3x3(m, 1e-12).unwrap();
        let v = DVec3::new(1.0, 2.0, 3.0);
        let forward = mat3_vec(m, v);
        let back = mat3_vec(inv, forward);
        check!((back - v).length() < 1e-9);
    }

    #[test]
    fn triple_product_of_orthonormal_basis_is_one() {
        let x = DVec3::X;
        let y = DVec3::Y;
        let z = DVec3::Z;
        check!(triple_product(x, y, z) == 1.0);
    }
}
