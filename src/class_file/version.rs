use crate::class_file::Serialize;
use byteorder::WriteBytesExt;
use std::cmp::Ordering;

/// Class file format version
///
/// The minor version is serialized first, but the major version is what matters for ordering.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Version {
    pub minor: u16,
    pub major: u16,
}

impl Version {
    pub const JAVA1_1: Version = Version::new(45, 3);
    pub const JAVA1_2: Version = Version::new(46, 0);
    pub const JAVA1_3: Version = Version::new(47, 0);
    pub const JAVA1_4: Version = Version::new(48, 0);
    pub const JAVA5: Version = Version::new(49, 0);
    pub const JAVA6: Version = Version::new(50, 0);
    pub const JAVA7: Version = Version::new(51, 0);
    pub const JAVA8: Version = Version::new(52, 0);
    pub const JAVA11: Version = Version::new(55, 0);
    pub const JAVA17: Version = Version::new(61, 0);
    pub const JAVA21: Version = Version::new(65, 0);

    /// Newest major version the reader accepts
    pub const LATEST_SUPPORTED: Version = Version::new(69, 0);

    pub const fn new(major: u16, minor: u16) -> Version {
        Version { minor, major }
    }

    /// Starting with Java 6, methods carry `StackMapTable` attributes
    pub fn uses_stack_map_frames(&self) -> bool {
        self.major >= Version::JAVA6.major
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Version) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Version) -> Ordering {
        (self.major, self.minor).cmp(&(other.major, other.minor))
    }
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.minor.serialize(writer)?;
        self.major.serialize(writer)?;
        Ok(())
    }
}
