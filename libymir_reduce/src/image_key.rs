use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// The acquisition role of a frame.
///
/// The discriminant is the code written to the `image_key` log of the detector,
/// so comparisons against on-disk logs go through [`ImageKey::as_index`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumIter,
    Serialize,
    Deserialize,
)]
pub enum ImageKey {
    #[strum(serialize = "SAMPLE")]
    Sample = 0,
    #[strum(serialize = "OPEN_BEAM")]
    OpenBeam = 1,
    #[strum(serialize = "DARK_CURRENT")]
    DarkCurrent = 2,
}

impl ImageKey {
    /// The code used for this role in image key logs
    pub fn as_index(&self) -> i64 {
        *self as i64
    }

    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(Self::Sample),
            1 => Some(Self::OpenBeam),
            2 => Some(Self::DarkCurrent),
            _ => None,
        }
    }
}

/// File name prefixes used when exporting images of each role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePrefixMap {
    pub sample: String,
    pub open_beam: String,
    pub dark_current: String,
}

impl Default for ImagePrefixMap {
    fn default() -> Self {
        Self {
            sample: String::from("sample"),
            open_beam: String::from("ob"),
            dark_current: String::from("dc"),
        }
    }
}

impl ImagePrefixMap {
    pub fn get(&self, key: &ImageKey) -> &str {
        match key {
            ImageKey::Sample => &self.sample,
            ImageKey::OpenBeam => &self.open_beam,
            ImageKey::DarkCurrent => &self.dark_current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_index_round_trip() {
        for key in ImageKey::iter() {
            assert_eq!(ImageKey::from_index(key.as_index()), Some(key));
        }
        assert_eq!(ImageKey::from_index(3), None);
        assert_eq!(ImageKey::Sample.as_index(), 0);
        assert_eq!(ImageKey::OpenBeam.as_index(), 1);
        assert_eq!(ImageKey::DarkCurrent.as_index(), 2);
    }

    #[test]
    fn test_default_prefixes() {
        let prefixes = ImagePrefixMap::default();
        assert_eq!(prefixes.get(&ImageKey::Sample), "sample");
        assert_eq!(prefixes.get(&ImageKey::OpenBeam), "ob");
        assert_eq!(prefixes.get(&ImageKey::DarkCurrent), "dc");
    }
}
