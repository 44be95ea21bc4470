//! MPLS label type.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 20-bit MPLS label value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct MplsLabel(u32);

impl MplsLabel {
    /// Largest encodable label.
    pub const MAX: u32 = 1_048_575;

    pub const fn new(label: u32) -> Result<Self, ParseError> {
        if label <= Self::MAX {
            Ok(MplsLabel(label))
        } else {
            Err(ParseError::InvalidMplsLabel(label))
        }
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for MplsLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for MplsLabel {
    type Error = ParseError;

    fn try_from(label: u32) -> Result<Self, Self::Error> {
        MplsLabel::new(label)
    }
}

impl From<MplsLabel> for u32 {
    fn from(label: MplsLabel) -> u32 {
        label.0
    }
}
