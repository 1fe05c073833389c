use crate::amount::AmountRaw;
use chrono::{
    DateTime,
    Utc,
};
use ethers::types::Address;
use std::future::Future;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("chain call failed: {0}")]
    Call(String),
    #[error("malformed chain response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("network switch failed: {0}")]
pub struct SwitchError(pub String);

/// Contract-defined bounds on a single wager, in raw units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WagerLimits {
    pub min: AmountRaw,
    pub max: AmountRaw,
}

impl WagerLimits {
    pub fn new(min: AmountRaw, max: AmountRaw) -> Result<Self, ReadError> {
        if min > max {
            return Err(ReadError::Malformed(format!(
                "minimum wager {min} exceeds maximum {max}"
            )));
        }
        Ok(Self { min, max })
    }
}

/// Token position of the connected identity. `None` means unknown, never zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountState {
    pub balance: Option<AmountRaw>,
    pub allowance: Option<AmountRaw>,
}

/// Everything read from the chain for the current eligibility window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainFacts {
    pub precision: Option<u8>,
    pub limits: Option<WagerLimits>,
    pub account: AccountState,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Idempotent reads against the token and game contracts.
pub trait ChainReader {
    fn balance(&self, owner: Address) -> impl Future<Output = Result<AmountRaw, ReadError>>;

    fn precision(&self) -> impl Future<Output = Result<u8, ReadError>>;

    fn wager_limits(&self) -> impl Future<Output = Result<WagerLimits, ReadError>>;

    /// Amount `owner` has authorized `spender` to transfer.
    fn allowance(
        &self,
        owner: Address,
        spender: Address,
    ) -> impl Future<Output = Result<AmountRaw, ReadError>>;
}

/// Whether the active network is the one the game is deployed on.
pub trait NetworkEligibility {
    fn is_eligible(&self) -> impl Future<Output = bool>;

    fn request_switch(&self) -> impl Future<Output = Result<(), SwitchError>>;
}

/// Awaits a read, downgrading any failure to "unknown".
pub async fn known<T>(
    what: &'static str,
    read: impl Future<Output = Result<T, ReadError>>,
) -> Option<T> {
    match read.await {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(%err, what, "chain read failed; treating value as unknown");
            None
        }
    }
}
