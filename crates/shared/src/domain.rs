use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_newtype!(SessionId);
id_newtype!(UserId);

/// Identifier assigned by the document store to an inserted log record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Position of the wizard. Persisted documents may carry any integer, so
/// this is signed and unchecked; the step layout decides what it means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Step(pub i32);

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub String);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

pub const GROUP_COUNT: usize = 9;

/// One of the nine fixed image groups, rendered as `group0`..`group8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(u8);

impl GroupKey {
    pub const ALL: [GroupKey; GROUP_COUNT] = [
        GroupKey(0),
        GroupKey(1),
        GroupKey(2),
        GroupKey(3),
        GroupKey(4),
        GroupKey(5),
        GroupKey(6),
        GroupKey(7),
        GroupKey(8),
    ];

    pub fn new(index: usize) -> Option<Self> {
        (index < GROUP_COUNT).then(|| GroupKey(index as u8))
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Key of one sub-collection, e.g. `group3A`.
    pub fn sub_key(self, side: Side) -> String {
        format!("{self}{side}")
    }

    /// Label the comparison screen reports its outcome under, e.g. `group3Acompare`.
    pub fn comparison_context(self, side: Side) -> String {
        format!("{self}{side}compare")
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid group key '{0}'")]
pub struct InvalidGroupKey(pub String);

impl FromStr for GroupKey {
    type Err = InvalidGroupKey;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        raw.strip_prefix("group")
            .and_then(|digits| digits.parse::<usize>().ok())
            .and_then(GroupKey::new)
            .ok_or_else(|| InvalidGroupKey(raw.to_string()))
    }
}

impl Serialize for GroupKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GroupKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The two image sub-collections of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => f.write_str("A"),
            Side::B => f.write_str("B"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}
