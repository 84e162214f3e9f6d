use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Below this UV determinant the mapping is treated as degenerate.
const MIN_UV_DETERMINANT: f32 = 1e-8;

/// Per-vertex tangent basis used for normal mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TangentFrame {
    pub tangent: Vec3,
    pub bitangent: Vec3,
}

/// Unnormalized position derivatives with respect to u and v.
pub(crate) fn uv_gradients(positions: [Vec3; 3], uvs: [Vec2; 3]) -> Option<(Vec3, Vec3)> {
    let edge1 = positions[1] - positions[0];
    let edge2 = positions[2] - positions[1];
    let delta_uv1 = uvs[1] - uvs[0];
    let delta_uv2 = uvs[2] - uvs[1];

    let det = delta_uv1.x * delta_uv2.y - delta_uv2.x * delta_uv1.y;
    if !det.is_finite() || det.abs() < MIN_UV_DETERMINANT {
        return None;
    }
    let f = 1.0 / det;
    let dp_du = f * (delta_uv2.y * edge1 - delta_uv1.y * edge2);
    let dp_dv = f * (-delta_uv2.x * edge1 + delta_uv1.x * edge2);
    (dp_du.is_finite() && dp_dv.is_finite()).then_some((dp_du, dp_dv))
}

/// Solves the tangent and bitangent of a triangle from its UV gradients.
///
/// Triangles whose UV mapping collapses (zero-area in UV space, or edges
/// that produce a zero-length gradient) get an arbitrary orthonormal basis
/// around the face normal instead.
pub fn compute_tangent_frame(positions: [Vec3; 3], uvs: [Vec2; 3]) -> TangentFrame {
    if let Some((dp_du, dp_dv)) = uv_gradients(positions, uvs) {
        let tangent = dp_du.normalize_or_zero();
        let bitangent = dp_dv.normalize_or_zero();
        if tangent != Vec3::ZERO && bitangent != Vec3::ZERO {
            return TangentFrame { tangent, bitangent };
        }
    }
    let normal = (positions[1] - positions[0])
        .cross(positions[2] - positions[0])
        .try_normalize()
        .unwrap_or(Vec3::Z);
    let (tangent, bitangent) = orthonormal_basis(normal);
    TangentFrame { tangent, bitangent }
}

/// Two unit vectors perpendicular to `normal` and to each other.
pub fn orthonormal_basis(normal: Vec3) -> (Vec3, Vec3) {
    let up = if normal.y.abs() < 0.9 { Vec3::Y } else { Vec3::X };
    let tangent = normal.cross(up).normalize();
    let bitangent = normal.cross(tangent).normalize();
    (tangent, bitangent)
}
