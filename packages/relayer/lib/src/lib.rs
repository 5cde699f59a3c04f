//! Library for the Cardano side of the relayer.
//!
//! The [`processor::ChainProcessor`] watches the Cardano chain through a
//! [`gateway::CardanoGateway`], decodes IBC events out of block results,
//! keeps connection and channel state caches warm, and drives
//! `MsgUpdateClient` submission toward the counterparty chain.

pub mod cache;
pub mod events;
pub mod gateway;
pub mod processor;
