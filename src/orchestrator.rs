//! Two-leg wager state machine: token approval first, then the spin call.
//!
//! Every submission is tagged with a [`Ticket`]. Notifications whose ticket no
//! longer matches the leg they target (the attempt was abandoned, or the leg was
//! re-issued) are dropped without touching state.

use crate::{
    amount::{
        AmountRaw,
        parse_units,
    },
    broadcast::{
        Broadcaster,
        LegCall,
        TransactionError,
        TxHash,
    },
    chain::{
        AccountState,
        ChainFacts,
        ChainReader,
        NetworkEligibility,
        SwitchError,
        WagerLimits,
        known,
    },
    validator::{
        ValidationError,
        needs_approval,
        validate,
    },
};
use chrono::{
    DateTime,
    Utc,
};
use ethers::types::Address;
use futures::{
    FutureExt,
    StreamExt,
    future::LocalBoxFuture,
    stream::FuturesUnordered,
};
use std::fmt;
use thiserror::Error;
use tracing::{
    debug,
    info,
    warn,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LegKind {
    Approval,
    Wager,
}

impl fmt::Display for LegKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LegKind::Approval => "approve",
            LegKind::Wager => "spin",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LegState {
    #[default]
    Idle,
    Submitting,
    Pending(TxHash),
    Confirmed(TxHash),
    Reverted(TransactionError),
}

impl LegState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, LegState::Submitting | LegState::Pending(_))
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, LegState::Confirmed(_))
    }

    pub fn hash(&self) -> Option<TxHash> {
        match self {
            LegState::Pending(hash) | LegState::Confirmed(hash) => Some(*hash),
            _ => None,
        }
    }
}

/// Identifies one submission of one leg.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket {
    pub attempt: u64,
    pub submission: u64,
}

#[derive(Clone, Debug, Default)]
pub struct TransactionLeg {
    state: LegState,
    ticket: Option<Ticket>,
}

impl TransactionLeg {
    pub fn state(&self) -> &LegState {
        &self.state
    }
}

#[derive(Clone, Debug)]
pub struct WagerAttempt {
    id: u64,
    amount: AmountRaw,
    approval: TransactionLeg,
    wager: TransactionLeg,
}

impl WagerAttempt {
    fn new(id: u64, amount: AmountRaw) -> Self {
        Self {
            id,
            amount,
            approval: TransactionLeg::default(),
            wager: TransactionLeg::default(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn amount(&self) -> AmountRaw {
        self.amount
    }

    pub fn leg(&self, kind: LegKind) -> &TransactionLeg {
        match kind {
            LegKind::Approval => &self.approval,
            LegKind::Wager => &self.wager,
        }
    }

    fn leg_mut(&mut self, kind: LegKind) -> &mut TransactionLeg {
        match kind {
            LegKind::Approval => &mut self.approval,
            LegKind::Wager => &mut self.wager,
        }
    }

    /// The spin went through; any further action starts a new attempt.
    pub fn is_complete(&self) -> bool {
        self.wager.state.is_confirmed()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LegEvent {
    Broadcast(TxHash),
    Confirmed(TxHash),
    Failed(TransactionError),
}

/// Completion notification produced by an in-flight leg.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegUpdate {
    pub ticket: Ticket,
    pub leg: LegKind,
    pub event: LegEvent,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum IssueRejection {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("{0} transaction is already in flight")]
    LegInFlight(LegKind),
    #[error("connect to the required network first")]
    NetworkIneligible,
}

/// Read-only view handed to the presenter after every state change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WagerSnapshot {
    pub network_eligible: bool,
    pub precision: Option<u8>,
    pub limits: Option<WagerLimits>,
    pub account: AccountState,
    pub amount_text: String,
    pub amount: Option<AmountRaw>,
    pub attempt_id: Option<u64>,
    pub approval: LegState,
    pub wager: LegState,
    pub validation: Result<(), ValidationError>,
    pub needs_approval: Option<bool>,
    pub last_rejection: Option<IssueRejection>,
    pub switch_error: Option<SwitchError>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

type InFlight = FuturesUnordered<LocalBoxFuture<'static, LegUpdate>>;

pub struct Orchestrator<R, B, N> {
    reader: R,
    broadcaster: B,
    network: N,
    identity: Address,
    spender: Address,
    eligible: bool,
    facts: ChainFacts,
    amount_text: String,
    attempt: Option<WagerAttempt>,
    next_attempt_id: u64,
    next_submission_id: u64,
    in_flight: InFlight,
    last_rejection: Option<IssueRejection>,
    switch_error: Option<SwitchError>,
}

impl<R, B, N> Orchestrator<R, B, N>
where
    R: ChainReader,
    B: Broadcaster + Clone + 'static,
    N: NetworkEligibility,
{
    /// `identity` is the connected account, `spender` the game contract that
    /// pulls the wager through the token allowance.
    pub fn new(
        reader: R,
        broadcaster: B,
        network: N,
        identity: Address,
        spender: Address,
    ) -> Self {
        Self {
            reader,
            broadcaster,
            network,
            identity,
            spender,
            eligible: false,
            facts: ChainFacts::default(),
            amount_text: String::new(),
            attempt: None,
            next_attempt_id: 0,
            next_submission_id: 0,
            in_flight: FuturesUnordered::new(),
            last_rejection: None,
            switch_error: None,
        }
    }

    pub fn identity(&self) -> Address {
        self.identity
    }

    pub fn facts(&self) -> &ChainFacts {
        &self.facts
    }

    pub fn attempt(&self) -> Option<&WagerAttempt> {
        self.attempt.as_ref()
    }

    pub fn amount_text(&self) -> &str {
        &self.amount_text
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Replaces the entered amount. A different raw value abandons the current
    /// attempt; transactions it already broadcast keep running untracked.
    /// While precision is unknown the comparison waits for the next refresh.
    pub fn set_amount(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text == self.amount_text {
            return;
        }
        self.amount_text = text;
        self.last_rejection = None;
        self.reconcile_attempt();
    }

    /// Re-reads every fact. Precision and limits are read once per
    /// eligibility window; balance and allowance every time.
    pub async fn refresh(&mut self) {
        if !self.check_network().await {
            return;
        }
        if self.facts.precision.is_none() {
            self.facts.precision = known("precision", self.reader.precision()).await;
        }
        if self.facts.limits.is_none() {
            self.facts.limits = known("wager limits", self.reader.wager_limits()).await;
        }
        self.facts.account.balance =
            known("balance", self.reader.balance(self.identity)).await;
        self.facts.account.allowance = known(
            "allowance",
            self.reader.allowance(self.identity, self.spender),
        )
        .await;
        self.facts.refreshed_at = Some(Utc::now());
        self.reconcile_attempt();
    }

    pub async fn request_network_switch(&mut self) -> Result<(), SwitchError> {
        info!("requesting network switch");
        if let Err(err) = self.network.request_switch().await {
            warn!(%err, "network switch refused");
            self.switch_error = Some(err.clone());
            return Err(err);
        }
        self.switch_error = None;
        self.refresh().await;
        Ok(())
    }

    /// Broadcasts `approve(game, amount)` if the bet is valid and no approval
    /// is already in flight.
    pub async fn issue_approval(&mut self) -> Result<Ticket, IssueRejection> {
        let result = self.try_issue_approval().await;
        self.record_outcome(LegKind::Approval, &result);
        result
    }

    /// Broadcasts the spin once this attempt's approval is confirmed and a
    /// freshly read allowance covers the amount.
    pub async fn issue_wager(&mut self) -> Result<Ticket, IssueRejection> {
        let result = self.try_issue_wager().await;
        self.record_outcome(LegKind::Wager, &result);
        result
    }

    /// Next notification from an in-flight leg; `None` when nothing is in flight.
    pub async fn next_update(&mut self) -> Option<LegUpdate> {
        self.in_flight.next().await
    }

    /// Applies a leg notification. Returns false when it was stale and ignored.
    pub async fn apply(&mut self, update: LegUpdate) -> bool {
        let LegUpdate {
            ticket,
            leg: kind,
            event,
        } = update;
        let Some(attempt) = self.attempt.as_mut().filter(|a| a.id == ticket.attempt)
        else {
            debug!(
                attempt = ticket.attempt,
                leg = %kind,
                ?event,
                "ignoring update for abandoned attempt"
            );
            return false;
        };
        let leg = attempt.leg_mut(kind);
        if leg.ticket != Some(ticket) {
            debug!(attempt = ticket.attempt, leg = %kind, "ignoring superseded update");
            return false;
        }

        let mut confirmed = false;
        match event {
            LegEvent::Broadcast(hash) => {
                info!(attempt = ticket.attempt, leg = %kind, hash = %format!("{hash:#x}"), "transaction broadcast");
                leg.state = LegState::Pending(hash);
                let broadcaster = self.broadcaster.clone();
                self.in_flight.push(
                    async move {
                        let event = match broadcaster.confirm(hash).await {
                            Ok(()) => LegEvent::Confirmed(hash),
                            Err(err) => LegEvent::Failed(err),
                        };
                        LegUpdate {
                            ticket,
                            leg: kind,
                            event,
                        }
                    }
                    .boxed_local(),
                );
            }
            LegEvent::Confirmed(hash) => {
                info!(attempt = ticket.attempt, leg = %kind, hash = %format!("{hash:#x}"), "transaction confirmed");
                leg.state = LegState::Confirmed(hash);
                confirmed = true;
            }
            LegEvent::Failed(err) => {
                warn!(attempt = ticket.attempt, leg = %kind, %err, "transaction failed");
                leg.state = LegState::Reverted(err);
            }
        }

        if confirmed {
            // the allowance a confirmation changed must be re-read before it is trusted
            match kind {
                LegKind::Approval => {
                    self.refresh_allowance().await;
                }
                LegKind::Wager => {
                    self.refresh_balance().await;
                    self.refresh_allowance().await;
                }
            }
        }
        true
    }

    pub fn snapshot(&self) -> WagerSnapshot {
        let amount = self.amount().ok();
        let (approval, wager) = match &self.attempt {
            Some(attempt) => (attempt.approval.state.clone(), attempt.wager.state.clone()),
            None => (LegState::Idle, LegState::Idle),
        };
        WagerSnapshot {
            network_eligible: self.eligible,
            precision: self.facts.precision,
            limits: self.facts.limits,
            account: self.facts.account,
            amount_text: self.amount_text.clone(),
            amount,
            attempt_id: self.attempt.as_ref().map(|a| a.id),
            approval,
            wager,
            validation: self.validation(),
            needs_approval: amount
                .zip(self.facts.account.allowance)
                .map(|(amount, allowance)| needs_approval(amount, allowance)),
            last_rejection: self.last_rejection.clone(),
            switch_error: self.switch_error.clone(),
            refreshed_at: self.facts.refreshed_at,
        }
    }

    async fn try_issue_approval(&mut self) -> Result<Ticket, IssueRejection> {
        self.ensure_not_in_flight(LegKind::Approval)?;
        self.ensure_eligible().await?;
        let amount = self.amount()?;
        validate(Some(amount), self.facts.limits.as_ref(), &self.facts.account)?;
        let call = LegCall::Approve {
            spender: self.spender,
            amount,
        };
        Ok(self.submit(LegKind::Approval, call))
    }

    async fn try_issue_wager(&mut self) -> Result<Ticket, IssueRejection> {
        self.ensure_not_in_flight(LegKind::Wager)?;
        self.ensure_eligible().await?;
        let amount = self.amount()?;
        self.refresh_balance().await;
        let allowance = self.refresh_allowance().await;
        validate(Some(amount), self.facts.limits.as_ref(), &self.facts.account)?;
        let approved = self.attempt.as_ref().is_some_and(|attempt| {
            attempt.amount == amount
                && !attempt.is_complete()
                && attempt.approval.state.is_confirmed()
        });
        if !approved {
            return Err(ValidationError::ApprovalRequired.into());
        }
        match allowance {
            None => Err(ValidationError::DataUnavailable.into()),
            Some(allowance) if needs_approval(amount, allowance) => {
                Err(ValidationError::ApprovalRequired.into())
            }
            Some(_) => Ok(self.submit(LegKind::Wager, LegCall::Spin { amount })),
        }
    }

    fn ensure_not_in_flight(&self, kind: LegKind) -> Result<(), IssueRejection> {
        let in_flight = self
            .attempt
            .as_ref()
            .is_some_and(|attempt| attempt.leg(kind).state.is_in_flight());
        if in_flight {
            return Err(IssueRejection::LegInFlight(kind));
        }
        Ok(())
    }

    async fn ensure_eligible(&mut self) -> Result<(), IssueRejection> {
        if self.check_network().await {
            Ok(())
        } else {
            Err(IssueRejection::NetworkIneligible)
        }
    }

    /// Moves `kind` to `Submitting` and queues its broadcast.
    fn submit(&mut self, kind: LegKind, call: LegCall) -> Ticket {
        let amount = call.amount();
        let attempt = match self.attempt.take() {
            Some(attempt) if attempt.amount == amount && !attempt.is_complete() => attempt,
            _ => {
                self.next_attempt_id += 1;
                debug!(attempt = self.next_attempt_id, %amount, "starting wager attempt");
                WagerAttempt::new(self.next_attempt_id, amount)
            }
        };
        self.next_submission_id += 1;
        let attempt = self.attempt.insert(attempt);
        let ticket = Ticket {
            attempt: attempt.id,
            submission: self.next_submission_id,
        };
        let leg = attempt.leg_mut(kind);
        leg.state = LegState::Submitting;
        leg.ticket = Some(ticket);
        info!(attempt = ticket.attempt, leg = %kind, %amount, "submitting transaction");

        let broadcaster = self.broadcaster.clone();
        self.in_flight.push(
            async move {
                let event = match broadcaster.submit(call).await {
                    Ok(hash) => LegEvent::Broadcast(hash),
                    Err(err) => LegEvent::Failed(err),
                };
                LegUpdate {
                    ticket,
                    leg: kind,
                    event,
                }
            }
            .boxed_local(),
        );
        ticket
    }

    fn record_outcome(&mut self, kind: LegKind, result: &Result<Ticket, IssueRejection>) {
        match result {
            Ok(_) => self.last_rejection = None,
            Err(rejection) => {
                info!(leg = %kind, %rejection, "action rejected");
                self.last_rejection = Some(rejection.clone());
            }
        }
    }

    /// A flip in either direction opens a new window: every fact becomes unknown.
    async fn check_network(&mut self) -> bool {
        let eligible = self.network.is_eligible().await;
        if eligible != self.eligible {
            info!(eligible, "network eligibility changed");
            self.facts = ChainFacts::default();
            self.eligible = eligible;
        }
        eligible
    }

    async fn refresh_allowance(&mut self) -> Option<AmountRaw> {
        if !self.check_network().await {
            return None;
        }
        let allowance = known(
            "allowance",
            self.reader.allowance(self.identity, self.spender),
        )
        .await;
        self.facts.account.allowance = allowance;
        self.facts.refreshed_at = Some(Utc::now());
        allowance
    }

    async fn refresh_balance(&mut self) -> Option<AmountRaw> {
        if !self.check_network().await {
            return None;
        }
        let balance = known("balance", self.reader.balance(self.identity)).await;
        self.facts.account.balance = balance;
        self.facts.refreshed_at = Some(Utc::now());
        balance
    }

    /// Drops the attempt once the entered amount is known to differ from
    /// the one it was started with. Text that cannot be resolved yet, for
    /// want of precision or while half typed, leaves the attempt alone.
    fn reconcile_attempt(&mut self) {
        let Ok(amount) = self.amount() else {
            return;
        };
        let abandoned = self
            .attempt
            .as_ref()
            .filter(|attempt| attempt.amount != amount);
        if let Some(attempt) = abandoned {
            info!(
                attempt = attempt.id,
                approval = ?attempt.approval.state,
                wager = ?attempt.wager.state,
                "wager amount changed; abandoning attempt"
            );
            self.attempt = None;
        }
    }

    fn amount(&self) -> Result<AmountRaw, ValidationError> {
        let precision = self
            .facts
            .precision
            .ok_or(ValidationError::DataUnavailable)?;
        parse_units(&self.amount_text, precision).map_err(ValidationError::InvalidAmount)
    }

    fn validation(&self) -> Result<(), ValidationError> {
        let amount = self.amount()?;
        validate(Some(amount), self.facts.limits.as_ref(), &self.facts.account)
    }
}
