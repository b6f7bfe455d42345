// SPDX-License-Identifier: GPL-3.0-only

//! Tracked users and their skeleton joints

use crate::constants::JOINT_COUNT;
use crate::driver::{JointPose, Point3, Quaternion, SkeletonState, UserId, UserObservation};

/// The fifteen joints of a tracked skeleton
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointType {
    Head,
    Neck,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftHand,
    RightHand,
    Torso,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftFoot,
    RightFoot,
}

impl JointType {
    /// All joints in observation order
    pub const ALL: [JointType; JOINT_COUNT] = [
        JointType::Head,
        JointType::Neck,
        JointType::LeftShoulder,
        JointType::RightShoulder,
        JointType::LeftElbow,
        JointType::RightElbow,
        JointType::LeftHand,
        JointType::RightHand,
        JointType::Torso,
        JointType::LeftHip,
        JointType::RightHip,
        JointType::LeftKnee,
        JointType::RightKnee,
        JointType::LeftFoot,
        JointType::RightFoot,
    ];

    /// Position of this joint in the observation array
    pub fn index(self) -> usize {
        self as usize
    }

    /// Parent link in the fixed skeleton topology; the torso is the root
    ///
    /// Topology only: established once at user construction and identical
    /// for every user.
    pub fn parent(self) -> Option<JointType> {
        match self {
            JointType::Torso => None,
            JointType::Neck => Some(JointType::Torso),
            JointType::Head => Some(JointType::Neck),
            JointType::LeftShoulder => Some(JointType::Torso),
            JointType::LeftElbow => Some(JointType::LeftShoulder),
            JointType::LeftHand => Some(JointType::LeftElbow),
            JointType::RightShoulder => Some(JointType::Torso),
            JointType::RightElbow => Some(JointType::RightShoulder),
            JointType::RightHand => Some(JointType::RightElbow),
            JointType::LeftHip => Some(JointType::Torso),
            JointType::LeftKnee => Some(JointType::LeftHip),
            JointType::LeftFoot => Some(JointType::LeftKnee),
            JointType::RightHip => Some(JointType::Torso),
            JointType::RightKnee => Some(JointType::RightHip),
            JointType::RightFoot => Some(JointType::RightKnee),
        }
    }
}

/// One posed joint of a tracked user
#[derive(Debug, Clone, Copy)]
pub struct Joint {
    joint_type: JointType,
    parent: Option<JointType>,
    pose: JointPose,
}

impl Joint {
    fn new(joint_type: JointType) -> Self {
        Self {
            joint_type,
            parent: joint_type.parent(),
            pose: JointPose::default(),
        }
    }

    pub fn joint_type(&self) -> JointType {
        self.joint_type
    }

    /// Parent joint in the skeleton hierarchy; `None` only for the torso
    pub fn parent(&self) -> Option<JointType> {
        self.parent
    }

    pub fn position(&self) -> Point3 {
        self.pose.position
    }

    pub fn orientation(&self) -> Quaternion {
        self.pose.orientation
    }

    pub fn position_confidence(&self) -> f32 {
        self.pose.position_confidence
    }

    pub fn orientation_confidence(&self) -> f32 {
        self.pose.orientation_confidence
    }

    pub fn pose(&self) -> &JointPose {
        &self.pose
    }
}

/// One tracked person
///
/// Created on the middleware's first "new" observation of an id, refreshed
/// every frame the user is present, removed from the registry on the "lost"
/// observation.
#[derive(Debug, Clone)]
pub struct User {
    id: UserId,
    visible: bool,
    skeleton_state: SkeletonState,
    center_of_mass: Point3,
    joints: [Joint; JOINT_COUNT],
    status: String,
}

impl User {
    pub(crate) fn new(id: UserId) -> Self {
        Self {
            id,
            visible: false,
            skeleton_state: SkeletonState::None,
            center_of_mass: Point3::default(),
            joints: JointType::ALL.map(Joint::new),
            status: String::new(),
        }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn skeleton_state(&self) -> SkeletonState {
        self.skeleton_state
    }

    pub fn center_of_mass(&self) -> Point3 {
        self.center_of_mass
    }

    /// Human-readable summary of visibility and calibration state
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn joint(&self, joint_type: JointType) -> &Joint {
        &self.joints[joint_type.index()]
    }

    pub fn joint_by_index(&self, index: usize) -> Option<&Joint> {
        self.joints.get(index)
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub(crate) fn apply_observation(&mut self, obs: &UserObservation) {
        self.visible = obs.is_visible;
        self.skeleton_state = obs.skeleton;
        self.center_of_mass = obs.center_of_mass;
        for (joint, pose) in self.joints.iter_mut().zip(obs.joints.iter()) {
            joint.pose = *pose;
        }

        let visibility = if self.visible { "Visible" } else { "Out of scene" };
        let state = match self.skeleton_state {
            SkeletonState::None => "Stopped tracking.".to_string(),
            SkeletonState::Calibrating => "Calibrating...".to_string(),
            SkeletonState::Tracked => "Tracking!".to_string(),
            SkeletonState::CalibrationFailed(reason) => {
                format!("Calibration failed ({})", reason)
            }
        };
        self.status = format!("[{}]\n{}\n{}", self.id, visibility, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::CalibrationFailure;

    #[test]
    fn test_topology_every_joint_has_a_parent_except_torso() {
        for joint in JointType::ALL {
            match joint {
                JointType::Torso => assert!(joint.parent().is_none()),
                other => assert!(other.parent().is_some()),
            }
        }
    }

    #[test]
    fn test_left_hand_parent_chain_reaches_torso() {
        let chain = [
            JointType::LeftHand,
            JointType::LeftElbow,
            JointType::LeftShoulder,
            JointType::Torso,
        ];
        for pair in chain.windows(2) {
            assert_eq!(pair[0].parent(), Some(pair[1]));
        }
    }

    #[test]
    fn test_user_joints_carry_topology_from_construction() {
        let user = User::new(3);
        assert_eq!(
            user.joint(JointType::RightFoot).parent(),
            Some(JointType::RightKnee)
        );
        assert!(user.joint(JointType::Torso).parent().is_none());
        assert_eq!(user.joints().len(), JOINT_COUNT);
    }

    #[test]
    fn test_status_reflects_state() {
        let mut user = User::new(1);
        let mut obs = UserObservation {
            id: 1,
            is_new: true,
            is_lost: false,
            is_visible: true,
            center_of_mass: Point3::default(),
            skeleton: SkeletonState::Tracked,
            joints: [JointPose::default(); JOINT_COUNT],
        };
        user.apply_observation(&obs);
        assert!(user.status().contains("Tracking!"));
        assert!(user.status().contains("Visible"));

        obs.is_visible = false;
        obs.skeleton = SkeletonState::CalibrationFailed(CalibrationFailure::NotInPose);
        user.apply_observation(&obs);
        assert!(user.status().contains("Out of scene"));
        assert!(user.status().contains("not in pose"));
    }
}
