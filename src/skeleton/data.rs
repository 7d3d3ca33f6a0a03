//! Fixed-size joint container

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use super::joint::{Joint, JointType, JOINT_SLOTS};

/// Exactly [`JOINT_SLOTS`] joints, indexable by [`JointType`] or slot index.
///
/// A joint's type is its slot, so storing a joint under the wrong key is not
/// expressible.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkeletonData {
    joints: [Joint; JOINT_SLOTS],
}

impl SkeletonData {
    /// All joints at the origin, identity orientation, never updated
    pub fn new() -> Self {
        Self {
            joints: [Joint::default(); JOINT_SLOTS],
        }
    }

    /// Number of slots (always [`JOINT_SLOTS`])
    #[inline]
    pub const fn len(&self) -> usize {
        JOINT_SLOTS
    }

    /// Never true; present for API symmetry with `len`
    #[inline]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Joint of a given type
    #[inline]
    pub fn joint(&self, joint_type: JointType) -> &Joint {
        &self.joints[joint_type.index()]
    }

    /// Replace the joint of a given type
    #[inline]
    pub fn set(&mut self, joint_type: JointType, joint: Joint) {
        self.joints[joint_type.index()] = joint;
    }

    /// Slot access by index, `None` past the last slot
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Joint> {
        self.joints.get(index)
    }

    /// Iterate all slots in order
    pub fn iter(&self) -> std::slice::Iter<'_, Joint> {
        self.joints.iter()
    }

    /// Iterate the addressable joints together with their type
    pub fn iter_typed(&self) -> impl Iterator<Item = (JointType, &Joint)> {
        JointType::ALL
            .iter()
            .map(move |&jt| (jt, &self.joints[jt.index()]))
    }

    /// Underlying slots
    pub fn as_slice(&self) -> &[Joint] {
        &self.joints
    }
}

impl Default for SkeletonData {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<JointType> for SkeletonData {
    type Output = Joint;

    fn index(&self, joint_type: JointType) -> &Joint {
        &self.joints[joint_type.index()]
    }
}

impl IndexMut<JointType> for SkeletonData {
    fn index_mut(&mut self, joint_type: JointType) -> &mut Joint {
        &mut self.joints[joint_type.index()]
    }
}

impl Index<usize> for SkeletonData {
    type Output = Joint;

    fn index(&self, index: usize) -> &Joint {
        &self.joints[index]
    }
}

impl IndexMut<usize> for SkeletonData {
    fn index_mut(&mut self, index: usize) -> &mut Joint {
        &mut self.joints[index]
    }
}

impl<'a> IntoIterator for &'a SkeletonData {
    type Item = &'a Joint;
    type IntoIter = std::slice::Iter<'a, Joint>;

    fn into_iter(self) -> Self::IntoIter {
        self.joints.iter()
    }
}
