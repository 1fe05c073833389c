use crate::{
    amount::{
        AmountError,
        AmountRaw,
    },
    chain::{
        AccountState,
        WagerLimits,
    },
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("bet is below the minimum wager")]
    BelowMinimum,
    #[error("bet is above the maximum wager")]
    AboveMaximum,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("on-chain data is not available yet")]
    DataUnavailable,
    #[error("approve the wager amount first")]
    ApprovalRequired,
    #[error("invalid amount: {0}")]
    InvalidAmount(AmountError),
}

/// Checks a bet against the contract limits and the account balance.
///
/// Rules apply in a fixed order and the first failure wins. Unknown inputs
/// always yield [`ValidationError::DataUnavailable`].
pub fn validate(
    amount: Option<AmountRaw>,
    limits: Option<&WagerLimits>,
    account: &AccountState,
) -> Result<(), ValidationError> {
    let (Some(amount), Some(limits), Some(balance), Some(_)) =
        (amount, limits, account.balance, account.allowance)
    else {
        return Err(ValidationError::DataUnavailable);
    };
    if amount < limits.min {
        return Err(ValidationError::BelowMinimum);
    }
    if amount > limits.max {
        return Err(ValidationError::AboveMaximum);
    }
    if amount > balance {
        return Err(ValidationError::InsufficientBalance);
    }
    Ok(())
}

/// Advisory only: true when the current allowance does not cover `amount`.
pub fn needs_approval(amount: AmountRaw, allowance: AmountRaw) -> bool {
    allowance < amount
}
