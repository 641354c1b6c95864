//! Identity types for the animation process

use std::fmt;

/// Robot (board) identifier, appended to every socket base path
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RobotId(pub u32);

impl RobotId {
    pub const ZERO: RobotId = RobotId(0);

    #[inline]
    pub fn new(id: u32) -> Self {
        RobotId(id)
    }
}

impl fmt::Debug for RobotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Robot({})", self.0)
    }
}

impl fmt::Display for RobotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation tag supplied by whoever requested an animation.
///
/// Start/end notifications carry the tag back, and `abort` is scoped by it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct AnimationTag(pub u8);

impl AnimationTag {
    /// Tag of "nothing playing"; also used as the wildcard for aborts
    pub const NOT_ANIMATING: AnimationTag = AnimationTag(0);
    /// Tag used for animations requested through the pending-animation slot
    pub const PENDING: AnimationTag = AnimationTag(1);

    #[inline]
    pub fn new(tag: u8) -> Self {
        AnimationTag(tag)
    }

    #[inline]
    pub fn is_not_animating(self) -> bool {
        self == Self::NOT_ANIMATING
    }
}

impl fmt::Debug for AnimationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.0)
    }
}

impl fmt::Display for AnimationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for AnimationTag {
    fn from(value: u8) -> Self {
        AnimationTag(value)
    }
}
