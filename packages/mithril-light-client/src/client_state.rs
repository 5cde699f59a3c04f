//! This module defines [`ClientState`] and the client [`Status`].

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MithrilIBCError;
use crate::types::height::Height;
use crate::types::protocol::MithrilProtocolParameters;
use crate::MODULE_NAME;

/// Maximum accepted `chain_id` length.
///
/// Matches the CometBFT chain-id bound so identifiers stay exchangeable with
/// the counterparty stack.
pub const MAX_CHAIN_ID_LEN: usize = 50;

/// The per-client state of the Mithril light client.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientState {
    /// The Cardano chain id.
    pub chain_id: String,
    /// Latest height the client was updated to.
    pub latest_height: Height,
    /// Height at which the client was frozen due to misbehaviour. The zero
    /// sentinel means the client is not frozen.
    pub frozen_height: Height,
    /// Epoch of the current chain state.
    pub current_epoch: u64,
    /// Trusting period in seconds.
    pub trusting_period: u64,
    /// Mithril protocol parameters in force.
    pub protocol_parameters: MithrilProtocolParameters,
    /// Path at which the next upgraded client will be committed.
    #[serde(default)]
    pub upgrade_path: Vec<String>,
}

/// The derived client status.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// The client is allowed to process packets.
    Active,
    /// Misbehaviour was detected and the client can no longer be used.
    Frozen,
    /// The client was not updated within its trusting period.
    Expired,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Frozen => write!(f, "Frozen"),
            Self::Expired => write!(f, "Expired"),
        }
    }
}

impl ClientState {
    /// Creates a new, unfrozen client state.
    #[must_use]
    pub fn new(
        chain_id: impl Into<String>,
        latest_height: Height,
        current_epoch: u64,
        trusting_period: u64,
        protocol_parameters: MithrilProtocolParameters,
        upgrade_path: Vec<String>,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            latest_height,
            frozen_height: Height::ZERO,
            current_epoch,
            trusting_period,
            protocol_parameters,
            upgrade_path,
        }
    }

    /// The IBC client type of this client.
    #[must_use]
    pub const fn client_type() -> &'static str {
        MODULE_NAME
    }

    /// Whether the client is frozen due to misbehaviour.
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        !self.frozen_height.is_zero()
    }

    /// Whether the trusting period has passed since the given latest
    /// consensus timestamp.
    ///
    /// Both times are in seconds since the Unix epoch.
    #[must_use]
    pub const fn is_expired(&self, latest_timestamp: u64, now: u64) -> bool {
        latest_timestamp + self.trusting_period <= now
    }

    /// Basic validation of the client state fields.
    pub fn validate(&self) -> Result<(), MithrilIBCError> {
        if self.chain_id.trim().is_empty() {
            return Err(MithrilIBCError::InvalidChainId(
                "chain id cannot be empty string".to_string(),
            ));
        }
        if self.chain_id.len() > MAX_CHAIN_ID_LEN {
            return Err(MithrilIBCError::InvalidChainId(format!(
                "chain id is too long; got: {}, max: {}",
                self.chain_id.len(),
                MAX_CHAIN_ID_LEN
            )));
        }
        if self.latest_height.revision_height == 0 {
            return Err(MithrilIBCError::InvalidMithrilHeaderHeight);
        }
        if self.current_epoch < 2 {
            return Err(MithrilIBCError::InvalidCurrentEpoch(self.current_epoch));
        }
        if self.trusting_period == 0 {
            return Err(MithrilIBCError::InvalidTrustingPeriod);
        }
        self.protocol_parameters
            .validate()
            .map_err(|err| MithrilIBCError::InvalidProtocolParameters(err.to_string()))?;

        // The upgrade path may be empty, but present keys must be non-empty.
        for (index, key) in self.upgrade_path.iter().enumerate() {
            if key.trim().is_empty() {
                return Err(MithrilIBCError::InvalidChainId(format!(
                    "key in upgrade path at index {index} cannot be empty"
                )));
            }
        }

        Ok(())
    }

    /// A copy with all client-customizable fields zeroed out.
    ///
    /// Only chain-specified fields survive; used to verify chain upgrades
    /// that break a client verification parameter.
    #[must_use]
    pub fn zero_custom_fields(&self) -> Self {
        Self {
            chain_id: self.chain_id.clone(),
            latest_height: self.latest_height,
            upgrade_path: self.upgrade_path.clone(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MAX_CHAIN_ID_LEN;
    use crate::error::MithrilIBCError;
    use crate::testing::test_client_state;
    use crate::types::height::Height;

    #[test]
    fn test_validate_accepts_well_formed_state() {
        test_client_state().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut state = test_client_state();
        state.chain_id = " ".to_string();
        assert!(matches!(
            state.validate(),
            Err(MithrilIBCError::InvalidChainId(_))
        ));

        let mut state = test_client_state();
        state.chain_id = "x".repeat(MAX_CHAIN_ID_LEN + 1);
        assert!(state.validate().is_err());

        let mut state = test_client_state();
        state.latest_height = Height::ZERO;
        assert_eq!(
            state.validate(),
            Err(MithrilIBCError::InvalidMithrilHeaderHeight)
        );

        let mut state = test_client_state();
        state.current_epoch = 1;
        assert_eq!(state.validate(), Err(MithrilIBCError::InvalidCurrentEpoch(1)));

        let mut state = test_client_state();
        state.trusting_period = 0;
        assert_eq!(state.validate(), Err(MithrilIBCError::InvalidTrustingPeriod));

        let mut state = test_client_state();
        state.upgrade_path = vec!["upgrade".to_string(), String::new()];
        assert!(state.validate().is_err());
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let state = test_client_state();
        let timestamp = 1_707_122_694;
        assert!(!state.is_expired(timestamp, timestamp + state.trusting_period - 1));
        assert!(state.is_expired(timestamp, timestamp + state.trusting_period));
        assert!(state.is_expired(timestamp, timestamp + state.trusting_period + 1));
    }

    #[test]
    fn test_zero_custom_fields_keeps_chain_specified_fields() {
        let state = test_client_state();
        let zeroed = state.zero_custom_fields();

        assert_eq!(zeroed.chain_id, state.chain_id);
        assert_eq!(zeroed.latest_height, state.latest_height);
        assert_eq!(zeroed.upgrade_path, state.upgrade_path);
        assert_eq!(zeroed.current_epoch, 0);
        assert_eq!(zeroed.trusting_period, 0);
        assert!(!zeroed.is_frozen());
    }
}
