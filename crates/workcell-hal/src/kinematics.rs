//! Analytic kinematics for a six-joint UR-style arm.
//!
//! The arm is described by standard Denavit–Hartenberg parameters with
//! `alpha = [π/2, 0, 0, π/2, -π/2, 0]`, `a = [0, a2, a3, 0, 0, 0]` and
//! `d = [d1, 0, 0, d4, d5, d6]`. Joint order is shoulder pan, shoulder lift,
//! elbow, wrist 1, wrist 2, wrist 3.
//!
//! [`UrKinematics::inverse`] returns every closed-form branch (up to eight:
//! two shoulder, two wrist, two elbow). Picking a branch is left to the
//! caller.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use nalgebra::{Isometry3, Matrix3, Matrix4, Rotation3, Translation3, UnitQuaternion, Vector3};
use workcell_perception::transform::{isometry_to_pose, pose_to_isometry};
use workcell_types::{CellError, Pose};

/// Number of revolute joints.
pub const JOINTS: usize = 6;

/// One joint-space configuration, in radians.
pub type JointVector = [f64; JOINTS];

/// Below this |sin θ5| the wrist is singular and θ6 is fixed to zero.
const WRIST_SINGULAR_EPS: f64 = 1e-8;
/// Slack allowed on `acos` arguments before a branch is declared unreachable.
const REACH_EPS: f64 = 1e-9;

/// DH link lengths and offsets, in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UrParameters {
    pub d1: f64,
    pub a2: f64,
    pub a3: f64,
    pub d4: f64,
    pub d5: f64,
    pub d6: f64,
}

impl UrParameters {
    /// UR10, the arm mounted in the competition cell.
    pub fn ur10() -> Self {
        Self {
            d1: 0.1273,
            a2: -0.612,
            a3: -0.5723,
            d4: 0.163941,
            d5: 0.1157,
            d6: 0.0922,
        }
    }

    pub fn ur5() -> Self {
        Self {
            d1: 0.089159,
            a2: -0.425,
            a3: -0.39225,
            d4: 0.10915,
            d5: 0.09465,
            d6: 0.0823,
        }
    }
}

/// Forward/inverse kinematics solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UrKinematics {
    params: UrParameters,
}

impl Default for UrKinematics {
    fn default() -> Self {
        Self::new(UrParameters::ur10())
    }
}

impl UrKinematics {
    pub fn new(params: UrParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &UrParameters {
        &self.params
    }

    /// End-effector transform in the base frame for `joints`.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::MalformedInput`] unless exactly six angles are given.
    pub fn forward(&self, joints: &[f64]) -> Result<Matrix4<f64>, CellError> {
        let q = <&JointVector>::try_from(joints).map_err(|_| {
            CellError::MalformedInput(format!("expected {JOINTS} joint angles, got {}", joints.len()))
        })?;
        Ok(self.forward_joints(q))
    }

    /// Infallible [`forward`][Self::forward] for a fixed-size vector.
    pub fn forward_joints(&self, q: &JointVector) -> Matrix4<f64> {
        q.iter()
            .enumerate()
            .fold(Matrix4::identity(), |acc, (i, theta)| acc * self.link(i, *theta))
    }

    /// All joint configurations that place the end effector at `target`.
    ///
    /// Angles are wrapped to `(-π, π]`. Returns an empty list when the pose
    /// is out of reach or sits on the shoulder singularity.
    pub fn inverse(&self, target: &Matrix4<f64>) -> Vec<JointVector> {
        let UrParameters { a2, a3, d4, d6, .. } = self.params;
        let mut solutions = Vec::with_capacity(8);

        let p06 = Vector3::new(target[(0, 3)], target[(1, 3)], target[(2, 3)]);
        let z6 = Vector3::new(target[(0, 2)], target[(1, 2)], target[(2, 2)]);
        let p05 = p06 - d6 * z6;

        // Shoulder: the wrist centre lies on the plane z1 · p = d4.
        let r = p05.x.hypot(p05.y);
        if r < REACH_EPS || d4.abs() > r * (1.0 + REACH_EPS) {
            return solutions;
        }
        let psi = p05.y.atan2(p05.x);
        let phi = clamp_unit(d4 / r).acos();

        for theta1 in [psi + phi + FRAC_PI_2, psi - phi + FRAC_PI_2] {
            let (s1, c1) = theta1.sin_cos();

            // Wrist 2 from the flange height along z1.
            let c5 = (p06.x * s1 - p06.y * c1 - d4) / d6;
            if c5.abs() > 1.0 + REACH_EPS {
                continue;
            }
            let t5 = clamp_unit(c5).acos();

            for theta5 in [t5, -t5] {
                let s5 = theta5.sin();

                // z1 expressed in the flange frame is (s5·c6, -s5·s6, c5).
                let theta6 = if s5.abs() < WRIST_SINGULAR_EPS {
                    0.0
                } else {
                    let zx = s1 * target[(0, 0)] - c1 * target[(1, 0)];
                    let zy = s1 * target[(0, 1)] - c1 * target[(1, 1)];
                    (-zy / s5).atan2(zx / s5)
                };

                let t14 = rigid_inverse(&self.link(0, theta1))
                    * target
                    * rigid_inverse(&self.link(5, theta6))
                    * rigid_inverse(&self.link(4, theta5));

                // Planar 2R problem for shoulder lift and elbow.
                let (px, py) = (t14[(0, 3)], t14[(1, 3)]);
                let c3 = (px * px + py * py - a2 * a2 - a3 * a3) / (2.0 * a2 * a3);
                if c3.abs() > 1.0 + REACH_EPS {
                    continue;
                }
                let t3 = clamp_unit(c3).acos();
                let theta234 = t14[(1, 0)].atan2(t14[(0, 0)]);

                for theta3 in [t3, -t3] {
                    let (s3, c3) = theta3.sin_cos();
                    let theta2 = py.atan2(px) - (a3 * s3).atan2(a2 + a3 * c3);
                    let theta4 = theta234 - theta2 - theta3;
                    solutions.push([theta1, theta2, theta3, theta4, theta5, theta6].map(wrap_angle));
                }
            }
        }
        solutions
    }

    /// DH transform of link `i` at joint angle `theta`.
    fn link(&self, i: usize, theta: f64) -> Matrix4<f64> {
        let p = &self.params;
        let (a, alpha, d) = match i {
            0 => (0.0, FRAC_PI_2, p.d1),
            1 => (p.a2, 0.0, 0.0),
            2 => (p.a3, 0.0, 0.0),
            3 => (0.0, FRAC_PI_2, p.d4),
            4 => (0.0, -FRAC_PI_2, p.d5),
            _ => (0.0, 0.0, p.d6),
        };
        dh_matrix(theta, alpha, a, d)
    }
}

/// Standard Denavit-Hartenberg link transform.
#[rustfmt::skip]
fn dh_matrix(theta: f64, alpha: f64, a: f64, d: f64) -> Matrix4<f64> {
    let (st, ct) = theta.sin_cos();
    let (sa, ca) = alpha.sin_cos();
    Matrix4::new(
        ct, -st * ca,  st * sa, a * ct,
        st,  ct * ca, -ct * sa, a * st,
        0.0,      sa,       ca,      d,
        0.0,     0.0,      0.0,    1.0,
    )
}

/// Homogeneous matrix of a wire pose (orientation normalised).
pub fn pose_to_matrix(pose: &Pose) -> Matrix4<f64> {
    pose_to_isometry(pose).to_homogeneous()
}

/// Wire pose of a homogeneous matrix whose rotation block is orthonormal.
pub fn matrix_to_pose(m: &Matrix4<f64>) -> Pose {
    let rotation: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation));
    let translation = Translation3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
    isometry_to_pose(&Isometry3::from_parts(translation, rotation))
}

/// Wrap an angle into `(-π, π]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

fn clamp_unit(x: f64) -> f64 {
    x.clamp(-1.0, 1.0)
}

/// Inverse of a rigid homogeneous transform: `[Rᵀ | -Rᵀp]`.
fn rigid_inverse(m: &Matrix4<f64>) -> Matrix4<f64> {
    let r_t = m.fixed_view::<3, 3>(0, 0).transpose();
    let p = Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
    let p_inv = -(r_t * p);
    let mut inv = Matrix4::identity();
    inv.fixed_view_mut::<3, 3>(0, 0).copy_from(&r_t);
    inv[(0, 3)] = p_inv.x;
    inv[(1, 3)] = p_inv.y;
    inv[(2, 3)] = p_inv.z;
    inv
}
