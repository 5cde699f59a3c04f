//! Misbehaviour evidence: two conflicting Mithril headers.

use serde::{Deserialize, Serialize};

use crate::error::MithrilIBCError;
use crate::header::MithrilHeader;
use crate::types::height::Height;

/// The height all clients are frozen at on misbehaviour.
pub const FROZEN_HEIGHT: Height = Height {
    revision_number: 0,
    revision_height: 1,
};

/// Evidence of two conflicting headers, ordered so that
/// `mithril_header_1.height() >= mithril_header_2.height()`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Misbehaviour {
    /// The client the evidence is submitted against.
    pub client_id: String,
    /// The higher (or equal) conflicting header.
    pub mithril_header_1: Option<MithrilHeader>,
    /// The lower (or equal) conflicting header.
    pub mithril_header_2: Option<MithrilHeader>,
}

impl Misbehaviour {
    /// The first header, or an error when missing.
    pub fn header_1(&self) -> Result<&MithrilHeader, MithrilIBCError> {
        self.mithril_header_1.as_ref().ok_or_else(|| {
            MithrilIBCError::InvalidMithrilHeader(
                "misbehaviour mithril header 1 cannot be nil".to_string(),
            )
        })
    }

    /// The second header, or an error when missing.
    pub fn header_2(&self) -> Result<&MithrilHeader, MithrilIBCError> {
        self.mithril_header_2.as_ref().ok_or_else(|| {
            MithrilIBCError::InvalidMithrilHeader(
                "misbehaviour mithril header 2 cannot be nil".to_string(),
            )
        })
    }

    /// The misbehaviour time in seconds: the larger of the two header
    /// timestamps, so the evidence cannot fall outside its own age range.
    pub fn timestamp_secs(&self) -> Result<u64, MithrilIBCError> {
        let first = self.header_1()?.timestamp_secs()?;
        let second = self.header_2()?.timestamp_secs()?;
        Ok(first.max(second))
    }

    /// Basic stateless validation of the evidence.
    pub fn validate_basic(&self) -> Result<(), MithrilIBCError> {
        let header_1 = self.header_1()?;
        let header_2 = self.header_2()?;

        if self.client_id.trim().is_empty() {
            return Err(MithrilIBCError::InvalidMithrilHeader(
                "misbehaviour client id cannot be empty".to_string(),
            ));
        }
        if header_1.height().is_zero() || header_2.height().is_zero() {
            return Err(MithrilIBCError::InvalidMithrilHeaderHeight);
        }

        header_1.validate_basic()?;
        header_2.validate_basic()?;

        if header_1.height() < header_2.height() {
            return Err(MithrilIBCError::InvalidMithrilHeader(format!(
                "mithril header 1 height is less than mithril header 2 height ({} < {})",
                header_1.height(),
                header_2.height(),
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Misbehaviour;
    use crate::error::MithrilIBCError;
    use crate::testing::test_header;

    fn misbehaviour(height_1: u64, height_2: u64) -> Misbehaviour {
        Misbehaviour {
            client_id: "2000-cardano-mithril-0".to_string(),
            mithril_header_1: Some(test_header(2, height_1)),
            mithril_header_2: Some(test_header(2, height_2)),
        }
    }

    #[test]
    fn test_validate_basic_enforces_height_order() {
        misbehaviour(303_389, 303_388).validate_basic().unwrap();
        misbehaviour(303_388, 303_388).validate_basic().unwrap();

        assert!(matches!(
            misbehaviour(303_388, 303_389).validate_basic(),
            Err(MithrilIBCError::InvalidMithrilHeader(_))
        ));
    }

    #[test]
    fn test_zero_height_is_rejected() {
        assert_eq!(
            misbehaviour(303_388, 0).validate_basic(),
            Err(MithrilIBCError::InvalidMithrilHeaderHeight)
        );
    }

    #[test]
    fn test_missing_header_is_rejected() {
        let mut evidence = misbehaviour(303_389, 303_388);
        evidence.mithril_header_2 = None;
        assert!(evidence.validate_basic().is_err());
    }

    #[test]
    fn test_empty_client_id_is_rejected() {
        let mut evidence = misbehaviour(303_389, 303_388);
        evidence.client_id = "  ".to_string();
        assert!(evidence.validate_basic().is_err());
    }
}
