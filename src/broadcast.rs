use crate::amount::AmountRaw;
use ethers::types::{
    Address,
    H256,
};
use std::future::Future;
use thiserror::Error;

pub type TxHash = H256;

/// A state-changing contract call issued for one leg of a wager attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegCall {
    /// `approve(spender, amount)` on the token contract.
    Approve { spender: Address, amount: AmountRaw },
    /// `spinWithUSDC(amount)` on the game contract.
    Spin { amount: AmountRaw },
}

impl LegCall {
    pub fn amount(&self) -> AmountRaw {
        match self {
            LegCall::Approve { amount, .. } | LegCall::Spin { amount } => *amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("rejected by signer: {0}")]
    RejectedBySigner(String),
    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),
    #[error("reverted: {0}")]
    Reverted(String),
    #[error("transaction {0:#x} was dropped before confirmation")]
    Dropped(TxHash),
}

/// Signs, broadcasts and follows transactions on behalf of the connected identity.
pub trait Broadcaster {
    /// Signs and broadcasts `call`, resolving once the node accepted it.
    fn submit(&self, call: LegCall) -> impl Future<Output = Result<TxHash, TransactionError>>;

    /// Resolves once `hash` is included in a block, or fails if it reverted.
    fn confirm(&self, hash: TxHash) -> impl Future<Output = Result<(), TransactionError>>;
}
