//! This module defines [`Height`].

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MithrilIBCError;

/// IBC height of the Cardano chain.
///
/// The revision number is always 0 for this client; the total order is by
/// `revision_height` alone. The revision height is the Cardano block number
/// certified by a transaction snapshot.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Height {
    /// The revision number.
    /// This is always 0 in the current implementation.
    #[serde(default)]
    pub revision_number: u64,
    /// The block height.
    pub revision_height: u64,
}

impl Height {
    /// The uninitialized sentinel height.
    pub const ZERO: Self = Self {
        revision_number: 0,
        revision_height: 0,
    };

    /// Creates a new height at revision 0.
    #[must_use]
    pub const fn new(revision_height: u64) -> Self {
        Self {
            revision_number: 0,
            revision_height,
        }
    }

    /// Whether this is the zero sentinel height.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.revision_height == 0
    }

    /// Returns the height incremented by one block.
    #[must_use]
    pub const fn increment(&self) -> Self {
        Self::new(self.revision_height + 1)
    }

    /// Returns the height decremented by one block, or `None` when already
    /// at the zero sentinel.
    #[must_use]
    pub const fn decrement(&self) -> Option<Self> {
        if self.revision_height == 0 {
            None
        } else {
            Some(Self::new(self.revision_height - 1))
        }
    }
}

impl PartialOrd for Height {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Height {
    fn cmp(&self, other: &Self) -> Ordering {
        self.revision_height
            .cmp(&other.revision_height)
            .then_with(|| self.revision_number.cmp(&other.revision_number))
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.revision_number, self.revision_height)
    }
}

impl FromStr for Height {
    type Err = MithrilIBCError;

    /// Parses either the `{revision_number}-{revision_height}` form or a bare
    /// decimal revision height.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MithrilIBCError::InvalidHeight(s.to_string());

        match s.split_once('-') {
            Some((revision, height)) => {
                let revision_number = revision.parse::<u64>().map_err(|_| invalid())?;
                let revision_height = height.parse::<u64>().map_err(|_| invalid())?;
                Ok(Self {
                    revision_number,
                    revision_height,
                })
            }
            None => {
                let revision_height = s.parse::<u64>().map_err(|_| invalid())?;
                Ok(Self::new(revision_height))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Height;

    #[test]
    fn test_ordering_by_revision_height() {
        let low = Height::new(10);
        let high = Height::new(11);
        assert!(low < high);
        assert!(high > low);
        assert_eq!(low, Height::new(10));
    }

    #[test]
    fn test_parse_round_trip() {
        let height = Height::new(303_388);
        assert_eq!(height.to_string(), "0-303388");
        assert_eq!("0-303388".parse::<Height>().unwrap(), height);
        assert_eq!("303388".parse::<Height>().unwrap(), height);
        assert!("not-a-height".parse::<Height>().is_err());
    }

    #[test]
    fn test_zero_sentinel() {
        assert!(Height::ZERO.is_zero());
        assert!(Height::ZERO.decrement().is_none());
        assert_eq!(Height::ZERO.increment(), Height::new(1));
    }
}
