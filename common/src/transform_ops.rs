//! Helpers for composing, decomposing and probing rigid transforms.

use cgmath::{
    EuclideanSpace, InnerSpace, Matrix, Matrix3, Matrix4, Point3, Quaternion, Rotation,
    SquareMatrix, Vector3,
};

/// Composes a translation/rotation/scale triple into a single matrix,
/// applied scale-first: `T * R * S`.
pub fn compose_trs(
    translation: Point3<f32>,
    rotation: Quaternion<f32>,
    scale: Vector3<f32>,
) -> Matrix4<f32> {
    Matrix4::from_translation(translation.to_vec())
        * Matrix4::from(rotation)
        * Matrix4::from_nonuniform_scale(scale.x, scale.y, scale.z)
}

/// Splits a matrix back into translation, rotation and scale.
///
/// Assumes the matrix was built from a TRS composition: no shear and no
/// zero scale components. Scale is recovered from the basis column
/// magnitudes, rotation from the normalized basis.
pub fn decompose_trs(matrix: &Matrix4<f32>) -> (Point3<f32>, Quaternion<f32>, Vector3<f32>) {
    let translation = Point3::new(matrix.w.x, matrix.w.y, matrix.w.z);

    let x = matrix.x.truncate();
    let y = matrix.y.truncate();
    let z = matrix.z.truncate();
    let scale = Vector3::new(x.magnitude(), y.magnitude(), z.magnitude());

    let rotation = Quaternion::from(Matrix3::from_cols(
        x / scale.x,
        y / scale.y,
        z / scale.z,
    ));

    (translation, rotation, scale)
}

/// The local +X axis of a rotation, in the parent frame.
pub fn local_axis_x(rotation: Quaternion<f32>) -> Vector3<f32> {
    rotation.rotate_vector(Vector3::unit_x())
}

/// The local +Y axis of a rotation, in the parent frame.
pub fn local_axis_y(rotation: Quaternion<f32>) -> Vector3<f32> {
    rotation.rotate_vector(Vector3::unit_y())
}

/// The local +Z axis of a rotation, in the parent frame.
pub fn local_axis_z(rotation: Quaternion<f32>) -> Vector3<f32> {
    rotation.rotate_vector(Vector3::unit_z())
}

/// Inverse-transpose of the upper 3x3 of a model matrix, for transforming
/// normals under non-uniform scale. Falls back to identity when the matrix
/// is singular.
pub fn normal_matrix(model: &Matrix4<f32>) -> Matrix3<f32> {
    let upper = Matrix3::from_cols(
        model.x.truncate(),
        model.y.truncate(),
        model.z.truncate(),
    );
    match upper.invert() {
        Some(inverse) => inverse.transpose(),
        None => {
            log::warn!("normal_matrix: singular model matrix, falling back to identity");
            Matrix3::identity()
        }
    }
}

/// Builds a model matrix placing `eye` so its local +Z axis points at
/// `target`, with `up` as the roll hint.
///
/// This is the inverse convention of a view matrix: the result is meant to
/// be assigned as a node's local transform. Degenerate inputs (target at
/// eye, or a forward parallel to `up`) yield a translation-only matrix.
pub fn look_at_basis(eye: Point3<f32>, target: Point3<f32>, up: Vector3<f32>) -> Matrix4<f32> {
    let to_target = target - eye;
    if to_target.magnitude2() <= f32::EPSILON {
        return Matrix4::from_translation(eye.to_vec());
    }
    let forward = to_target.normalize();

    let right = up.cross(forward);
    if right.magnitude2() <= f32::EPSILON {
        return Matrix4::from_translation(eye.to_vec());
    }
    let right = right.normalize();
    let up = forward.cross(right);

    Matrix4::from_cols(
        right.extend(0.0),
        up.extend(0.0),
        forward.extend(0.0),
        eye.to_vec().extend(1.0),
    )
}
