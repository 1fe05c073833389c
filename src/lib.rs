//! Two-step ERC-20 wager client: approve the game contract, then spin.
//!
//! [`orchestrator::Orchestrator`] is the core. It validates bets against
//! on-chain facts read through [`chain::ChainReader`], and sequences the
//! approval and spin transactions through a [`broadcast::Broadcaster`].
//! [`evm`] provides the `ethers` implementations of those seams.

pub mod amount;
pub mod broadcast;
pub mod chain;
pub mod config;
pub mod evm;
pub mod orchestrator;
pub mod presenter;
pub mod validator;
pub mod wallets;

pub mod test_helpers;
