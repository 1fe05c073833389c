//! `ethers` adapters for the chain reader, broadcaster and network check.

use crate::{
    amount::AmountRaw,
    broadcast::{
        Broadcaster,
        LegCall,
        TransactionError,
        TxHash,
    },
    chain::{
        ChainReader,
        NetworkEligibility,
        ReadError,
        SwitchError,
        WagerLimits,
    },
    config::NetworkProfile,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use ethers::{
    contract::{
        ContractError,
        abigen,
    },
    middleware::{
        SignerMiddleware,
        signer::SignerMiddlewareError,
    },
    providers::{
        Http,
        Middleware,
        PendingTransaction,
        Provider,
    },
    signers::LocalWallet,
    types::{
        Address,
        U64,
        U256,
    },
};
use std::{
    sync::Arc,
    time::Duration,
};
use tracing::{
    info,
    warn,
};

abigen!(
    Erc20Token,
    r#"[
        function balanceOf(address account) external view returns (uint256)
        function decimals() external view returns (uint8)
        function allowance(address owner, address spender) external view returns (uint256)
        function approve(address spender, uint256 amount) external returns (bool)
    ]"#
);

abigen!(
    SlotMachine,
    r#"[
        function spinWithUSDC(uint256 wager) external
        function minBetUSDC() external view returns (uint256)
        function maxBetUSDC() external view returns (uint256)
    ]"#
);

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

pub fn connect_provider(profile: &NetworkProfile) -> Result<Provider<Http>> {
    let provider = Provider::<Http>::try_from(profile.rpc_url.as_str())
        .wrap_err_with(|| format!("Invalid RPC URL {}", profile.rpc_url))?;
    Ok(provider.interval(profile.receipt_poll()))
}

#[derive(Clone)]
pub struct EvmChain {
    token: Erc20Token<Provider<Http>>,
    game: SlotMachine<Provider<Http>>,
}

impl EvmChain {
    pub fn new(provider: Provider<Http>, profile: &NetworkProfile) -> Self {
        let provider = Arc::new(provider);
        Self {
            token: Erc20Token::new(profile.token_address, provider.clone()),
            game: SlotMachine::new(profile.game_address, provider),
        }
    }
}

impl ChainReader for EvmChain {
    async fn balance(&self, owner: Address) -> Result<AmountRaw, ReadError> {
        self.token.balance_of(owner).call().await.map_err(read_error)
    }

    async fn precision(&self) -> Result<u8, ReadError> {
        self.token.decimals().call().await.map_err(read_error)
    }

    async fn wager_limits(&self) -> Result<WagerLimits, ReadError> {
        let min = self.game.min_bet_usdc().call().await.map_err(read_error)?;
        let max = self.game.max_bet_usdc().call().await.map_err(read_error)?;
        WagerLimits::new(min, max)
    }

    async fn allowance(
        &self,
        owner: Address,
        spender: Address,
    ) -> Result<AmountRaw, ReadError> {
        self.token
            .allowance(owner, spender)
            .call()
            .await
            .map_err(read_error)
    }
}

fn read_error<M: Middleware>(err: ContractError<M>) -> ReadError {
    let malformed = matches!(
        err,
        ContractError::DecodingError(_)
            | ContractError::AbiError(_)
            | ContractError::DetokenizationError(_)
    );
    if malformed {
        ReadError::Malformed(err.to_string())
    } else {
        ReadError::Call(err.to_string())
    }
}

/// Signs with a local keystore and waits for receipts by polling the node.
#[derive(Clone)]
pub struct EvmWallet {
    client: Arc<SignerClient>,
    token: Erc20Token<SignerClient>,
    game: SlotMachine<SignerClient>,
    receipt_poll: Duration,
}

impl EvmWallet {
    pub fn new(provider: Provider<Http>, signer: LocalWallet, profile: &NetworkProfile) -> Self {
        let client = Arc::new(SignerMiddleware::new(provider, signer));
        Self {
            token: Erc20Token::new(profile.token_address, client.clone()),
            game: SlotMachine::new(profile.game_address, client.clone()),
            client,
            receipt_poll: profile.receipt_poll(),
        }
    }

    pub fn address(&self) -> Address {
        self.client.address()
    }
}

impl Broadcaster for EvmWallet {
    async fn submit(&self, call: LegCall) -> Result<TxHash, TransactionError> {
        let sent = match call {
            LegCall::Approve { spender, amount } => self
                .token
                .approve(spender, amount)
                .send()
                .await
                .map(|pending| pending.tx_hash()),
            LegCall::Spin { amount } => self
                .game
                .spin_with_usdc(amount)
                .send()
                .await
                .map(|pending| pending.tx_hash()),
        };
        sent.map_err(send_error)
    }

    async fn confirm(&self, hash: TxHash) -> Result<(), TransactionError> {
        let receipt = PendingTransaction::new(hash, self.client.provider())
            .interval(self.receipt_poll)
            .await
            .map_err(|err| TransactionError::BroadcastFailed(err.to_string()))?;
        let Some(receipt) = receipt else {
            warn!(tx_hash = %format!("{:#x}", hash), "transaction dropped from mempool");
            return Err(TransactionError::Dropped(hash));
        };
        if receipt.status == Some(U64::zero()) {
            warn!(tx_hash = %format!("{:#x}", hash), "transaction reverted");
            return Err(TransactionError::Reverted(format!(
                "transaction {hash:#x} reverted in block {}",
                receipt.block_number.unwrap_or_default()
            )));
        }
        Ok(())
    }
}

fn send_error(err: ContractError<SignerClient>) -> TransactionError {
    if let Some(reason) = err.decode_revert::<String>() {
        return TransactionError::Reverted(reason);
    }
    if err.is_revert() {
        return TransactionError::Reverted(err.to_string());
    }
    match err {
        ContractError::MiddlewareError {
            e: SignerMiddlewareError::SignerError(e),
        } => TransactionError::RejectedBySigner(e.to_string()),
        other => TransactionError::BroadcastFailed(other.to_string()),
    }
}

/// Eligible while the node reports the profile's chain id.
#[derive(Clone)]
/// Eligibility is the chain id reported by the configured node. A JSON-RPC
/// node cannot be told to change chains, so a switch request re-reads the id
/// and explains what to change when it is still wrong.
pub struct EvmNetwork {
    provider: Provider<Http>,
    chain_id: u64,
    rpc_url: String,
}

impl EvmNetwork {
    pub fn new(provider: Provider<Http>, profile: &NetworkProfile) -> Self {
        Self {
            provider,
            chain_id: profile.chain_id,
            rpc_url: profile.rpc_url.clone(),
        }
    }
}

impl NetworkEligibility for EvmNetwork {
    async fn is_eligible(&self) -> bool {
        match self.provider.get_chainid().await {
            Ok(id) => id == U256::from(self.chain_id),
            Err(err) => {
                warn!(%err, "failed to read chain id");
                false
            }
        }
    }

    async fn request_switch(&self) -> Result<(), SwitchError> {
        info!(
            chain_id = self.chain_id,
            rpc_url = %self.rpc_url,
            "re-checking node chain id"
        );
        let reported = self.provider.get_chainid().await.map_err(|err| {
            SwitchError(format!("could not read chain id from {}: {err}", self.rpc_url))
        })?;
        expect_chain(reported, self.chain_id, &self.rpc_url)
    }
}

fn expect_chain(reported: U256, expected: u64, rpc_url: &str) -> Result<(), SwitchError> {
    if reported == U256::from(expected) {
        return Ok(());
    }
    Err(SwitchError(format!(
        "node at {rpc_url} is on chain {reported}, expected {expected}; \
         restart with --rpc-url for that chain"
    )))
}
