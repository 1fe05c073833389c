//! In-memory collaborators for exercising the orchestrator without a node.

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
    orchestrator::{
        LegUpdate,
        Orchestrator,
    },
};
use ethers::types::{
    Address,
    H256,
    U256,
};
use futures::channel::oneshot;
use std::{
    cell::{
        Cell,
        RefCell,
    },
    collections::{
        HashMap,
        VecDeque,
    },
    rc::Rc,
};

pub const USDC_PRECISION: u8 = 6;

pub fn player() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn game_contract() -> Address {
    Address::repeat_byte(0x9a)
}

struct FakeChainState {
    precision: u8,
    limits: (AmountRaw, AmountRaw),
    balance: AmountRaw,
    allowance: AmountRaw,
    failing: bool,
    balance_reads: usize,
    allowance_reads: usize,
    limit_reads: usize,
}

impl FakeChainState {
    fn check(&self) -> Result<(), ReadError> {
        if self.failing {
            return Err(ReadError::Call("node unreachable".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct FakeChain {
    state: Rc<RefCell<FakeChainState>>,
}

impl FakeChain {
    pub fn new(min: u64, max: u64, balance: u64, allowance: u64) -> Self {
        Self {
            state: Rc::new(RefCell::new(FakeChainState {
                precision: USDC_PRECISION,
                limits: (U256::from(min), U256::from(max)),
                balance: U256::from(balance),
                allowance: U256::from(allowance),
                failing: false,
                balance_reads: 0,
                allowance_reads: 0,
                limit_reads: 0,
            })),
        }
    }

    pub fn set_balance(&self, balance: u64) {
        self.state.borrow_mut().balance = U256::from(balance);
    }

    pub fn set_allowance(&self, allowance: u64) {
        self.state.borrow_mut().allowance = U256::from(allowance);
    }

    pub fn fail_reads(&self, failing: bool) {
        self.state.borrow_mut().failing = failing;
    }

    pub fn balance_reads(&self) -> usize {
        self.state.borrow().balance_reads
    }

    pub fn allowance_reads(&self) -> usize {
        self.state.borrow().allowance_reads
    }

    pub fn limit_reads(&self) -> usize {
        self.state.borrow().limit_reads
    }
}

impl ChainReader for FakeChain {
    async fn balance(&self, _owner: Address) -> Result<AmountRaw, ReadError> {
        let mut state = self.state.borrow_mut();
        state.balance_reads += 1;
        state.check()?;
        Ok(state.balance)
    }

    async fn precision(&self) -> Result<u8, ReadError> {
        let state = self.state.borrow();
        state.check()?;
        Ok(state.precision)
    }

    async fn wager_limits(&self) -> Result<WagerLimits, ReadError> {
        let mut state = self.state.borrow_mut();
        state.limit_reads += 1;
        state.check()?;
        WagerLimits::new(state.limits.0, state.limits.1)
    }

    async fn allowance(
        &self,
        _owner: Address,
        _spender: Address,
    ) -> Result<AmountRaw, ReadError> {
        let mut state = self.state.borrow_mut();
        state.allowance_reads += 1;
        state.check()?;
        Ok(state.allowance)
    }
}

type Receipt = Result<(), TransactionError>;

#[derive(Default)]
struct FakeWalletState {
    sent: Vec<(TxHash, LegCall)>,
    submit_failures: VecDeque<TransactionError>,
    outcomes: HashMap<TxHash, Receipt>,
    waiters: HashMap<TxHash, oneshot::Sender<Receipt>>,
}

/// Accepts every submission immediately; receipts resolve only when a test
/// settles them.
#[derive(Clone, Default)]
pub struct FakeWallet {
    state: Rc<RefCell<FakeWalletState>>,
}

impl FakeWallet {
    pub fn sent(&self) -> Vec<(TxHash, LegCall)> {
        self.state.borrow().sent.clone()
    }

    pub fn fail_next_submission(&self, err: TransactionError) {
        self.state.borrow_mut().submit_failures.push_back(err);
    }

    pub fn settle(&self, hash: TxHash, outcome: Receipt) {
        let mut state = self.state.borrow_mut();
        match state.waiters.remove(&hash) {
            Some(waiter) => {
                let _ = waiter.send(outcome);
            }
            None => {
                state.outcomes.insert(hash, outcome);
            }
        }
    }
}

impl Broadcaster for FakeWallet {
    async fn submit(&self, call: LegCall) -> Result<TxHash, TransactionError> {
        let mut state = self.state.borrow_mut();
        if let Some(err) = state.submit_failures.pop_front() {
            return Err(err);
        }
        let hash = H256::from_low_u64_be(state.sent.len() as u64 + 1);
        state.sent.push((hash, call));
        Ok(hash)
    }

    async fn confirm(&self, hash: TxHash) -> Result<(), TransactionError> {
        let receiver = {
            let mut state = self.state.borrow_mut();
            if let Some(outcome) = state.outcomes.remove(&hash) {
                return outcome;
            }
            let (sender, receiver) = oneshot::channel();
            state.waiters.insert(hash, sender);
            receiver
        };
        receiver.await.unwrap_or(Err(TransactionError::Dropped(hash)))
    }
}

#[derive(Clone)]
pub struct FakeNetwork {
    eligible: Rc<Cell<bool>>,
    switch_requests: Rc<Cell<usize>>,
    refusal: Rc<RefCell<Option<SwitchError>>>,
}

impl FakeNetwork {
    pub fn new(eligible: bool) -> Self {
        Self {
            eligible: Rc::new(Cell::new(eligible)),
            switch_requests: Rc::new(Cell::new(0)),
            refusal: Rc::new(RefCell::new(None)),
        }
    }

    pub fn set_eligible(&self, eligible: bool) {
        self.eligible.set(eligible);
    }

    pub fn switch_requests(&self) -> usize {
        self.switch_requests.get()
    }

    /// Every later switch request fails with `reason` until `None` is set.
    pub fn refuse_switches(&self, reason: Option<&str>) {
        *self.refusal.borrow_mut() = reason.map(|r| SwitchError(r.to_string()));
    }
}

impl NetworkEligibility for FakeNetwork {
    async fn is_eligible(&self) -> bool {
        self.eligible.get()
    }

    async fn request_switch(&self) -> Result<(), SwitchError> {
        self.switch_requests.set(self.switch_requests.get() + 1);
        if let Some(err) = self.refusal.borrow().clone() {
            return Err(err);
        }
        self.eligible.set(true);
        Ok(())
    }
}

pub type TestOrchestrator = Orchestrator<FakeChain, FakeWallet, FakeNetwork>;

pub struct TestContext {
    pub chain: FakeChain,
    pub wallet: FakeWallet,
    pub network: FakeNetwork,
    pub orchestrator: TestOrchestrator,
}

impl TestContext {
    /// Eligible network, facts already refreshed, amount entered.
    pub async fn new(min: u64, max: u64, balance: u64, allowance: u64, amount: &str) -> Self {
        let chain = FakeChain::new(min, max, balance, allowance);
        let wallet = FakeWallet::default();
        let network = FakeNetwork::new(true);
        let mut orchestrator = Orchestrator::new(
            chain.clone(),
            wallet.clone(),
            network.clone(),
            player(),
            game_contract(),
        );
        orchestrator.refresh().await;
        orchestrator.set_amount(amount);
        Self {
            chain,
            wallet,
            network,
            orchestrator,
        }
    }

    /// Applies the next leg notification; panics if nothing is ready to resolve.
    pub async fn pump(&mut self) -> (LegUpdate, bool) {
        let update = self
            .orchestrator
            .next_update()
            .await
            .expect("a leg notification");
        let applied = self.orchestrator.apply(update.clone()).await;
        (update, applied)
    }
}
