//! Track selection bitmask

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Set of animation tracks (1 byte on the wire)
///
/// Used both as the lock mask (tracks that are never emitted) and as the
/// in-use mask (tracks emitted since the last full stop).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TrackFlags(pub u8);

impl TrackFlags {
    pub const NONE: TrackFlags = TrackFlags(0);

    // Track bits
    pub const HEAD: u8 = 0b0000_0001;
    pub const LIFT: u8 = 0b0000_0010;
    pub const BODY: u8 = 0b0000_0100;
    pub const FACE: u8 = 0b0000_1000;
    pub const BACKPACK_LIGHTS: u8 = 0b0001_0000;
    pub const AUDIO: u8 = 0b0010_0000;
    pub const EVENT: u8 = 0b0100_0000;
    pub const ALL: u8 = 0b0111_1111;

    #[inline]
    pub fn new(bits: u8) -> Self {
        TrackFlags(bits & Self::ALL)
    }

    #[inline]
    pub fn all() -> Self {
        TrackFlags(Self::ALL)
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn contains(self, track: u8) -> bool {
        self.0 & track == track
    }

    #[inline]
    pub fn intersects(self, tracks: u8) -> bool {
        self.0 & tracks != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn insert(&mut self, tracks: u8) {
        self.0 |= tracks & Self::ALL;
    }

    #[inline]
    pub fn remove(&mut self, tracks: u8) {
        self.0 &= !tracks;
    }

    #[inline]
    pub fn set(&mut self, tracks: u8, value: bool) {
        if value {
            self.insert(tracks);
        } else {
            self.remove(tracks);
        }
    }
}

impl From<u8> for TrackFlags {
    fn from(bits: u8) -> Self {
        TrackFlags::new(bits)
    }
}

impl From<TrackFlags> for u8 {
    fn from(flags: TrackFlags) -> Self {
        flags.0
    }
}

impl BitOr<u8> for TrackFlags {
    type Output = TrackFlags;

    fn bitor(self, rhs: u8) -> Self::Output {
        TrackFlags::new(self.0 | rhs)
    }
}

impl BitOrAssign<u8> for TrackFlags {
    fn bitor_assign(&mut self, rhs: u8) {
        self.insert(rhs);
    }
}

impl fmt::Debug for TrackFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(u8, &str); 7] = [
            (TrackFlags::HEAD, "HEAD"),
            (TrackFlags::LIFT, "LIFT"),
            (TrackFlags::BODY, "BODY"),
            (TrackFlags::FACE, "FACE"),
            (TrackFlags::BACKPACK_LIGHTS, "BACKPACK"),
            (TrackFlags::AUDIO, "AUDIO"),
            (TrackFlags::EVENT, "EVENT"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "TrackFlags[{}]", names.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_set_and_clear() {
        let mut flags = TrackFlags::NONE;
        flags.insert(TrackFlags::HEAD | TrackFlags::BODY);
        assert!(flags.contains(TrackFlags::HEAD));
        assert!(flags.contains(TrackFlags::BODY));
        assert!(!flags.contains(TrackFlags::LIFT));

        flags.remove(TrackFlags::HEAD);
        assert!(!flags.contains(TrackFlags::HEAD));
        assert!(flags.intersects(TrackFlags::BODY | TrackFlags::LIFT));

        flags.set(TrackFlags::FACE, true);
        assert_eq!(flags.bits(), TrackFlags::BODY | TrackFlags::FACE);
    }

    #[test]
    fn test_unknown_bits_masked() {
        let flags = TrackFlags::from(0xFF);
        assert_eq!(flags, TrackFlags::all());
        assert_eq!(u8::from(flags), 0x7F);
    }

    #[test]
    fn test_debug_lists_tracks() {
        let flags = TrackFlags::new(TrackFlags::HEAD | TrackFlags::AUDIO);
        assert_eq!(format!("{:?}", flags), "TrackFlags[HEAD|AUDIO]");
    }
}
