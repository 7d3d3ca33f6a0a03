//! Joint orientations reconstructed from joint positions
//!
//! Predicted skeletons carry positions only. Each joint's orientation is
//! rebuilt as a right-handed frame whose Y axis points along the bone leaving
//! the joint and whose Z axis is normal to the plane of an adjacent bone.
//! Where the adjacent bones are nearly colinear the plane is undefined, so the
//! frame is taken relative to the torso instead. The hip center is the
//! exception: its Y axis is the normal of the plane spanned by the two hip
//! directions.

use nalgebra::{Matrix3, Quaternion, UnitQuaternion, Vector3};

use crate::skeleton::{JointType, SkeletonData};

/// |cos| between two bones above which they are treated as colinear
pub const COLINEAR_COS: f64 = 0.94;

const EPS: f64 = 1e-9;

/// Convert a rotation matrix to a unit quaternion.
///
/// Trace-based conversion choosing among four branches by the largest
/// diagonal term so the square root never sees a small argument.
pub fn rotation_to_quaternion(m: &Matrix3<f64>) -> UnitQuaternion<f64> {
    let trace = m[(0, 0)] + m[(1, 1)] + m[(2, 2)];

    let (w, x, y, z) = if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0;
        (
            0.25 * s,
            (m[(2, 1)] - m[(1, 2)]) / s,
            (m[(0, 2)] - m[(2, 0)]) / s,
            (m[(1, 0)] - m[(0, 1)]) / s,
        )
    } else if m[(0, 0)] > m[(1, 1)] && m[(0, 0)] > m[(2, 2)] {
        let s = (1.0 + m[(0, 0)] - m[(1, 1)] - m[(2, 2)]).sqrt() * 2.0;
        (
            (m[(2, 1)] - m[(1, 2)]) / s,
            0.25 * s,
            (m[(0, 1)] + m[(1, 0)]) / s,
            (m[(0, 2)] + m[(2, 0)]) / s,
        )
    } else if m[(1, 1)] > m[(2, 2)] {
        let s = (1.0 + m[(1, 1)] - m[(0, 0)] - m[(2, 2)]).sqrt() * 2.0;
        (
            (m[(0, 2)] - m[(2, 0)]) / s,
            (m[(0, 1)] + m[(1, 0)]) / s,
            0.25 * s,
            (m[(1, 2)] + m[(2, 1)]) / s,
        )
    } else {
        let s = (1.0 + m[(2, 2)] - m[(0, 0)] - m[(1, 1)]).sqrt() * 2.0;
        (
            (m[(1, 0)] - m[(0, 1)]) / s,
            (m[(0, 2)] + m[(2, 0)]) / s,
            (m[(1, 2)] + m[(2, 1)]) / s,
            0.25 * s,
        )
    };

    let q = Quaternion::new(w, x, y, z);
    if !q.norm().is_finite() || q.norm() < EPS {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::from_quaternion(q)
}

/// Frame with Y along `y_axis` and Z along `x_hint × y_axis`.
///
/// `None` when either vector is degenerate or they are parallel.
fn frame(y_axis: &Vector3<f64>, x_hint: &Vector3<f64>) -> Option<Matrix3<f64>> {
    let y = y_axis.try_normalize(EPS)?;
    let z = x_hint.cross(&y).try_normalize(EPS)?;
    let x = y.cross(&z);
    Some(Matrix3::from_columns(&[x, y, z]))
}

/// First well-defined frame over `hints`, else `fallback`
fn frame_or(y_axis: &Vector3<f64>, hints: &[Vector3<f64>], fallback: &Matrix3<f64>) -> Matrix3<f64> {
    hints
        .iter()
        .find_map(|hint| frame(y_axis, hint))
        .unwrap_or(*fallback)
}

/// Frame at a hinge joint between an incoming and an outgoing bone
fn hinge_frame(
    incoming: &Vector3<f64>,
    outgoing: &Vector3<f64>,
    reference: &Matrix3<f64>,
) -> Matrix3<f64> {
    let bent = match (incoming.try_normalize(EPS), outgoing.try_normalize(EPS)) {
        (Some(a), Some(b)) => a.dot(&b).abs() < COLINEAR_COS,
        _ => false,
    };
    let axes = [reference.column(0).into_owned(), reference.column(2).into_owned()];
    if bent {
        if let Some(m) = frame(outgoing, incoming) {
            return m;
        }
    }
    frame_or(outgoing, &axes, reference)
}

/// Hip-center frame with Y along `left × right` and X along the hip line.
///
/// `None` when the two hip directions are degenerate or nearly colinear.
fn pelvis_frame(left: &Vector3<f64>, right: &Vector3<f64>) -> Option<Matrix3<f64>> {
    let l = left.try_normalize(EPS)?;
    let r = right.try_normalize(EPS)?;
    if l.dot(&r).abs() >= COLINEAR_COS {
        return None;
    }
    frame(&l.cross(&r), &(r - l))
}

/// Joints of one limb, root to tip
struct Limb {
    root: JointType,
    hinge: JointType,
    end: JointType,
    tip: JointType,
}

#[rustfmt::skip]
const LIMBS: [Limb; 4] = [
    Limb { root: JointType::ShoulderLeft,  hinge: JointType::ElbowLeft,  end: JointType::WristLeft,  tip: JointType::HandLeft },
    Limb { root: JointType::ShoulderRight, hinge: JointType::ElbowRight, end: JointType::WristRight, tip: JointType::HandRight },
    Limb { root: JointType::HipLeft,       hinge: JointType::KneeLeft,   end: JointType::AnkleLeft,  tip: JointType::FootLeft },
    Limb { root: JointType::HipRight,      hinge: JointType::KneeRight,  end: JointType::AnkleRight, tip: JointType::FootRight },
];

/// Overwrite every joint orientation with one derived from the positions.
///
/// Fingertips, thumbs, the neck and reserved slots get the identity.
pub fn reconstruct_orientations(skeleton: &mut SkeletonData) {
    let p = |jt: JointType| skeleton[jt].position.coords;

    let hip_line = p(JointType::HipRight) - p(JointType::HipLeft);
    let shoulder_line = p(JointType::ShoulderRight) - p(JointType::ShoulderLeft);
    let spine = p(JointType::ShoulderCenter) - p(JointType::HipCenter);

    let torso = frame(&spine, &shoulder_line)
        .or_else(|| frame(&spine, &hip_line))
        .unwrap_or_else(Matrix3::identity);
    let torso_x = torso.column(0).into_owned();
    let torso_z = torso.column(2).into_owned();

    let mut frames = [Matrix3::identity(); crate::skeleton::JOINT_SLOTS];

    frames[JointType::HipCenter.index()] = pelvis_frame(
        &(p(JointType::HipLeft) - p(JointType::HipCenter)),
        &(p(JointType::HipRight) - p(JointType::HipCenter)),
    )
    .unwrap_or_else(|| {
        frame_or(
            &(p(JointType::Spine) - p(JointType::HipCenter)),
            &[hip_line, torso_x],
            &torso,
        )
    });
    frames[JointType::Spine.index()] = frame_or(
        &(p(JointType::ShoulderCenter) - p(JointType::Spine)),
        &[shoulder_line, torso_x],
        &torso,
    );
    let neck = frame_or(
        &(p(JointType::Head) - p(JointType::ShoulderCenter)),
        &[shoulder_line, torso_x],
        &torso,
    );
    frames[JointType::ShoulderCenter.index()] = neck;
    frames[JointType::Head.index()] = neck;

    for limb in &LIMBS {
        let upper = p(limb.hinge) - p(limb.root);
        let lower = p(limb.end) - p(limb.hinge);
        let distal = p(limb.tip) - p(limb.end);

        let root = frame_or(&upper, &[torso_x, torso_z], &torso);
        let hinge = hinge_frame(&upper, &lower, &torso);
        let end = frame_or(&distal, &[hinge.column(0).into_owned(), torso_x], &hinge);

        frames[limb.root.index()] = root;
        frames[limb.hinge.index()] = hinge;
        frames[limb.end.index()] = end;
        frames[limb.tip.index()] = end;
    }

    for (slot, m) in frames.iter().enumerate() {
        skeleton[slot].orientation = rotation_to_quaternion(m);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Rotation3};

    fn upright_skeleton() -> SkeletonData {
        let mut s = SkeletonData::new();
        #[rustfmt::skip]
        let joints = [
            (JointType::HipCenter,     [0.0, 0.0, 0.0]),
            (JointType::Spine,         [0.0, 0.3, 0.0]),
            (JointType::ShoulderCenter,[0.0, 0.6, 0.0]),
            (JointType::Head,          [0.0, 0.8, 0.0]),
            (JointType::ShoulderLeft,  [-0.2, 0.6, 0.0]),
            (JointType::ShoulderRight, [0.2, 0.6, 0.0]),
            (JointType::ElbowLeft,     [-0.2, 0.3, 0.0]),
            (JointType::WristLeft,     [-0.2, 0.3, 0.3]),
            (JointType::HandLeft,      [-0.2, 0.3, 0.4]),
            (JointType::ElbowRight,    [0.2, 0.3, 0.0]),
            (JointType::WristRight,    [0.2, 0.0, 0.0]),
            (JointType::HandRight,     [0.2, -0.1, 0.0]),
            (JointType::HipLeft,       [-0.1, 0.0, 0.0]),
            (JointType::HipRight,      [0.1, 0.0, 0.0]),
            (JointType::KneeLeft,      [-0.1, -0.4, 0.0]),
            (JointType::AnkleLeft,     [-0.1, -0.8, 0.0]),
            (JointType::FootLeft,      [-0.1, -0.8, 0.1]),
            (JointType::KneeRight,     [0.1, -0.4, 0.0]),
            (JointType::AnkleRight,    [0.1, -0.8, 0.0]),
            (JointType::FootRight,     [0.1, -0.8, 0.1]),
        ];
        for (jt, [x, y, z]) in joints {
            s[jt].position = Point3::new(x, y, z);
        }
        s
    }

    #[test]
    fn test_rotation_to_quaternion_all_branches() {
        let rotations = [
            Rotation3::from_euler_angles(0.1, 0.2, 0.3),
            Rotation3::from_axis_angle(&Vector3::x_axis(), 3.0),
            Rotation3::from_axis_angle(&Vector3::y_axis(), 3.0),
            Rotation3::from_axis_angle(&Vector3::z_axis(), 3.0),
        ];
        for r in rotations {
            let q = rotation_to_quaternion(r.matrix());
            let expected = UnitQuaternion::from_rotation_matrix(&r);
            assert!(q.angle_to(&expected) < 1e-9);
        }
    }

    #[test]
    fn test_upright_torso_is_identity() {
        let mut s = upright_skeleton();
        reconstruct_orientations(&mut s);
        assert!(s[JointType::HipCenter].orientation.angle() < 1e-9);
        assert!(s[JointType::Spine].orientation.angle() < 1e-9);
        assert!(s[JointType::Head].orientation.angle() < 1e-9);
    }

    #[test]
    fn test_hip_center_up_axis_from_hip_directions() {
        let mut s = upright_skeleton();
        s[JointType::HipLeft].position = Point3::new(-0.1, -0.05, 0.0);
        s[JointType::HipRight].position = Point3::new(0.1, -0.05, 0.0);
        reconstruct_orientations(&mut s);

        let left = (s[JointType::HipLeft].position - s[JointType::HipCenter].position).normalize();
        let right = (s[JointType::HipRight].position - s[JointType::HipCenter].position).normalize();
        let up = left.cross(&right).normalize();

        let q = s[JointType::HipCenter].orientation;
        assert!(((q * Vector3::y()) - up).norm() < 1e-9);
        assert!(((q * Vector3::x()) - Vector3::x()).norm() < 1e-9);
    }

    #[test]
    fn test_bent_elbow_normal_to_bone_plane() {
        let mut s = upright_skeleton();
        reconstruct_orientations(&mut s);

        let upper = s[JointType::ElbowLeft].position - s[JointType::ShoulderLeft].position;
        let fore = s[JointType::WristLeft].position - s[JointType::ElbowLeft].position;
        let normal = upper.cross(&fore).normalize();

        let z = s[JointType::ElbowLeft].orientation * Vector3::z();
        let y = s[JointType::ElbowLeft].orientation * Vector3::y();
        assert!((z - normal).norm() < 1e-9);
        assert!((y - fore.normalize()).norm() < 1e-9);
    }

    #[test]
    fn test_straight_elbow_falls_back_to_torso() {
        let mut s = upright_skeleton();
        reconstruct_orientations(&mut s);

        // Right arm hangs straight down: Y points down, X along the torso X
        let q = s[JointType::ElbowRight].orientation;
        assert!(((q * Vector3::y()) - Vector3::new(0.0, -1.0, 0.0)).norm() < 1e-9);
        assert!(((q * Vector3::x()).cross(&Vector3::x())).norm() < 1e-9);
    }

    #[test]
    fn test_degenerate_skeleton_yields_identity() {
        let mut s = SkeletonData::new();
        reconstruct_orientations(&mut s);
        for joint in s.iter() {
            assert!(joint.orientation.angle() < 1e-12);
            assert!(joint.orientation.coords.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_unanchored_joints_are_identity() {
        let mut s = upright_skeleton();
        s[JointType::Neck].orientation = UnitQuaternion::from_euler_angles(1.0, 0.0, 0.0);
        reconstruct_orientations(&mut s);
        assert!(s[JointType::Neck].orientation.angle() < 1e-12);
        assert!(s[JointType::ThumbLeft].orientation.angle() < 1e-12);
        assert!(s[27].orientation.angle() < 1e-12);
    }
}
