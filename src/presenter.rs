//! Turns a [`WagerSnapshot`] into text and button states for the front-end.

use crate::{
    amount::{
        AmountRaw,
        format_units,
    },
    broadcast::TxHash,
    orchestrator::{
        IssueRejection,
        LegKind,
        LegState,
        WagerSnapshot,
    },
    validator::ValidationError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tone {
    Info,
    Progress,
    Success,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusLine {
    pub tone: Tone,
    pub text: String,
}

impl StatusLine {
    fn new(tone: Tone, text: impl Into<String>) -> Self {
        Self {
            tone,
            text: text.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActionGates {
    pub approve: bool,
    pub spin: bool,
    pub switch_network: bool,
}

pub fn action_gates(snapshot: &WagerSnapshot) -> ActionGates {
    let playable = snapshot.network_eligible && snapshot.validation.is_ok();
    ActionGates {
        approve: playable && !snapshot.approval.is_in_flight(),
        spin: playable
            && snapshot.approval.is_confirmed()
            && !snapshot.wager.is_in_flight()
            && !snapshot.wager.is_confirmed(),
        switch_network: !snapshot.network_eligible,
    }
}

/// Ordered status lines: network, leg progress, rejections, then bet guidance.
pub fn status_lines(snapshot: &WagerSnapshot, symbol: &str) -> Vec<StatusLine> {
    if !snapshot.network_eligible {
        let mut lines = vec![StatusLine::new(
            Tone::Warning,
            "Wrong network. Point --rpc-url at the game chain, then press n to re-check",
        )];
        if let Some(err) = &snapshot.switch_error {
            lines.push(StatusLine::new(Tone::Error, capitalize(&err.to_string())));
        }
        return lines;
    }

    let mut lines = Vec::new();
    for (kind, state) in [
        (LegKind::Approval, &snapshot.approval),
        (LegKind::Wager, &snapshot.wager),
    ] {
        if let Some(line) = leg_line(kind, state) {
            lines.push(line);
        }
    }

    match &snapshot.last_rejection {
        Some(IssueRejection::Invalid(err)) if snapshot.validation.as_ref().err() == Some(err) => {}
        Some(rejection) => lines.push(StatusLine::new(Tone::Warning, capitalize(&rejection.to_string()))),
        None => {}
    }

    match &snapshot.validation {
        Ok(()) => {
            let approving = snapshot.approval.is_in_flight() || snapshot.approval.is_confirmed();
            if snapshot.needs_approval == Some(true) && !approving {
                lines.push(StatusLine::new(Tone::Info, "Approve before spinning"));
            }
        }
        Err(err) => lines.push(guidance(err, snapshot, symbol)),
    }
    lines
}

/// Label/value pairs for the account panel. Unknown facts read "unknown".
pub fn fact_rows(snapshot: &WagerSnapshot, symbol: &str) -> Vec<(&'static str, String)> {
    let show = |amount: Option<AmountRaw>| match (amount, snapshot.precision) {
        (Some(amount), Some(precision)) => format!("{} {symbol}", format_units(amount, precision)),
        _ => "unknown".to_string(),
    };
    vec![
        ("Balance", show(snapshot.account.balance)),
        ("Allowance", show(snapshot.account.allowance)),
        ("Minimum bet", show(snapshot.limits.map(|l| l.min))),
        ("Maximum bet", show(snapshot.limits.map(|l| l.max))),
    ]
}

/// `0x1234...abcd`
pub fn short_hash(hash: &TxHash) -> String {
    let full = format!("{hash:#x}");
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

fn leg_line(kind: LegKind, state: &LegState) -> Option<StatusLine> {
    let line = match state {
        LegState::Idle => return None,
        LegState::Submitting => StatusLine::new(Tone::Progress, format!("Sending {kind}...")),
        LegState::Pending(hash) => StatusLine::new(
            Tone::Progress,
            format!("Confirming {kind}... ({})", short_hash(hash)),
        ),
        LegState::Confirmed(hash) => StatusLine::new(
            Tone::Success,
            format!("{} completed ({})", capitalize(&kind.to_string()), short_hash(hash)),
        ),
        LegState::Reverted(err) => StatusLine::new(
            Tone::Error,
            format!("{} failed: {err}", capitalize(&kind.to_string())),
        ),
    };
    Some(line)
}

fn guidance(err: &ValidationError, snapshot: &WagerSnapshot, symbol: &str) -> StatusLine {
    let bound = |amount: AmountRaw| {
        snapshot
            .precision
            .map(|precision| format!("{} {symbol}", format_units(amount, precision)))
    };
    match err {
        ValidationError::BelowMinimum => match snapshot.limits.and_then(|l| bound(l.min)) {
            Some(min) => StatusLine::new(Tone::Warning, format!("Minimum bet: {min}")),
            None => StatusLine::new(Tone::Warning, capitalize(&err.to_string())),
        },
        ValidationError::AboveMaximum => match snapshot.limits.and_then(|l| bound(l.max)) {
            Some(max) => StatusLine::new(Tone::Warning, format!("Maximum bet: {max}")),
            None => StatusLine::new(Tone::Warning, capitalize(&err.to_string())),
        },
        ValidationError::InsufficientBalance => {
            StatusLine::new(Tone::Warning, "Insufficient balance")
        }
        ValidationError::DataUnavailable => {
            StatusLine::new(Tone::Info, "Waiting for on-chain data (press r to refresh)")
        }
        ValidationError::ApprovalRequired => {
            StatusLine::new(Tone::Info, "Approve before spinning")
        }
        ValidationError::InvalidAmount(_) => {
            StatusLine::new(Tone::Error, capitalize(&err.to_string()))
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        amount::AmountError,
        broadcast::TransactionError,
        chain::{
            AccountState,
            SwitchError,
            WagerLimits,
        },
    };
    use ethers::types::{
        H256,
        U256,
    };

    fn usdc(units: u64) -> AmountRaw {
        U256::from(units)
    }

    fn ready_snapshot() -> WagerSnapshot {
        WagerSnapshot {
            network_eligible: true,
            precision: Some(6),
            limits: Some(WagerLimits::new(usdc(1_000000), usdc(100_000000)).unwrap()),
            account: AccountState {
                balance: Some(usdc(5_000000)),
                allowance: Some(usdc(0)),
            },
            amount_text: "2".to_string(),
            amount: Some(usdc(2_000000)),
            attempt_id: None,
            approval: LegState::Idle,
            wager: LegState::Idle,
            validation: Ok(()),
            needs_approval: Some(true),
            last_rejection: None,
            switch_error: None,
            refreshed_at: None,
        }
    }

    fn texts(lines: &[StatusLine]) -> Vec<&str> {
        lines.iter().map(|line| line.text.as_str()).collect()
    }

    #[test]
    fn short_hash__keeps_prefix_and_suffix() {
        let hash = H256::from_low_u64_be(0xabcd);
        assert_eq!(short_hash(&hash), "0x0000...abcd");
    }

    #[test]
    fn status_lines__fresh_bet_asks_for_approval() {
        let lines = status_lines(&ready_snapshot(), "USDC");
        assert_eq!(texts(&lines), vec!["Approve before spinning"]);
    }

    #[test]
    fn status_lines__wrong_network_hides_everything_else() {
        // given
        let mut snapshot = ready_snapshot();
        snapshot.network_eligible = false;
        snapshot.approval = LegState::Submitting;

        // when
        let lines = status_lines(&snapshot, "USDC");

        // then
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].tone, Tone::Warning);

        // when the switch was refused
        snapshot.switch_error = Some(SwitchError("user rejected".to_string()));
        let lines = status_lines(&snapshot, "USDC");

        // then
        assert_eq!(lines[1].text, "Network switch failed: user rejected");
        assert_eq!(lines[1].tone, Tone::Error);
    }

    #[test]
    fn status_lines__legs_report_progress_and_outcome() {
        // given
        let hash = H256::from_low_u64_be(0x1234);
        let mut snapshot = ready_snapshot();
        snapshot.approval = LegState::Confirmed(hash);
        snapshot.wager = LegState::Reverted(TransactionError::Reverted("paused".to_string()));

        // when
        let lines = status_lines(&snapshot, "USDC");

        // then
        assert_eq!(
            texts(&lines),
            vec!["Approve completed (0x0000...1234)", "Spin failed: reverted: paused"]
        );
        assert_eq!(lines[1].tone, Tone::Error);

        // when
        snapshot.approval = LegState::Pending(hash);
        snapshot.wager = LegState::Submitting;
        let lines = status_lines(&snapshot, "USDC");

        // then
        assert_eq!(
            texts(&lines),
            vec!["Confirming approve... (0x0000...1234)", "Sending spin..."]
        );
    }

    #[test]
    fn status_lines__validation_guidance_uses_token_units() {
        let mut snapshot = ready_snapshot();
        snapshot.validation = Err(ValidationError::BelowMinimum);
        assert_eq!(texts(&status_lines(&snapshot, "USDC")), vec!["Minimum bet: 1 USDC"]);

        snapshot.validation = Err(ValidationError::AboveMaximum);
        assert_eq!(texts(&status_lines(&snapshot, "USDC")), vec!["Maximum bet: 100 USDC"]);

        snapshot.validation = Err(ValidationError::InsufficientBalance);
        assert_eq!(texts(&status_lines(&snapshot, "USDC")), vec!["Insufficient balance"]);

        snapshot.validation = Err(ValidationError::InvalidAmount(AmountError::Empty));
        assert_eq!(
            texts(&status_lines(&snapshot, "USDC")),
            vec!["Invalid amount: enter an amount"]
        );
    }

    #[test]
    fn status_lines__rejection_shown_once() {
        // given a rejection that repeats the current validation error
        let mut snapshot = ready_snapshot();
        snapshot.validation = Err(ValidationError::InsufficientBalance);
        snapshot.last_rejection = Some(ValidationError::InsufficientBalance.into());
        assert_eq!(status_lines(&snapshot, "USDC").len(), 1);

        // when the rejection says something new
        snapshot.validation = Ok(());
        snapshot.needs_approval = Some(false);
        snapshot.last_rejection = Some(ValidationError::ApprovalRequired.into());

        // then
        assert_eq!(
            texts(&status_lines(&snapshot, "USDC")),
            vec!["Approve the wager amount first"]
        );
    }

    #[test]
    fn action_gates__spin_needs_confirmed_approval() {
        // given
        let mut snapshot = ready_snapshot();
        assert_eq!(
            action_gates(&snapshot),
            ActionGates {
                approve: true,
                spin: false,
                switch_network: false,
            }
        );

        // when
        snapshot.approval = LegState::Confirmed(H256::zero());

        // then
        assert!(action_gates(&snapshot).spin);

        // when the spin is in flight
        snapshot.wager = LegState::Pending(H256::zero());
        assert!(!action_gates(&snapshot).spin);
    }

    #[test]
    fn action_gates__invalid_bet_disables_both() {
        let mut snapshot = ready_snapshot();
        snapshot.validation = Err(ValidationError::DataUnavailable);
        let gates = action_gates(&snapshot);
        assert!(!gates.approve);
        assert!(!gates.spin);
    }

    #[test]
    fn fact_rows__unknown_values_are_not_zero() {
        let mut snapshot = ready_snapshot();
        snapshot.account.balance = None;
        let rows = fact_rows(&snapshot, "USDC");
        assert_eq!(rows[0], ("Balance", "unknown".to_string()));
        assert_eq!(rows[1], ("Allowance", "0 USDC".to_string()));
        assert_eq!(rows[3], ("Maximum bet", "100 USDC".to_string()));
    }
}
