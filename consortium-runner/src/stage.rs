//! Workflow stages and the per-run state that threads through them.
//!
//! Stages run in strictly increasing order. [`WorkflowState::enter`] is the
//! barrier: a stage may only start after the last completed one.

use std::fmt;

use serde::Serialize;

use consortium_core::types::{ChannelHandle, ChannelId, TransactionId};

use crate::error::WorkflowError;

/// Workflow stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    ChannelSetup,
    PeerDiscovery,
    ChaincodeDeploy,
    TransactAndVerify,
    Upgrade,
    PolicyEnforcementCheck,
    DynamicEndorserCheck,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Init,
        Stage::ChannelSetup,
        Stage::PeerDiscovery,
        Stage::ChaincodeDeploy,
        Stage::TransactAndVerify,
        Stage::Upgrade,
        Stage::PolicyEnforcementCheck,
        Stage::DynamicEndorserCheck,
    ];

    /// Stable name used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::ChannelSetup => "channel_setup",
            Self::PeerDiscovery => "peer_discovery",
            Self::ChaincodeDeploy => "chaincode_deploy",
            Self::TransactAndVerify => "transact_and_verify",
            Self::Upgrade => "upgrade",
            Self::PolicyEnforcementCheck => "policy_enforcement_check",
            Self::DynamicEndorserCheck => "dynamic_endorser_check",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transaction submitted during the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedTransaction {
    pub stage: Stage,
    pub operation: &'static str,
    pub transaction_id: String,
}

/// Mutable state of a single workflow run.
///
/// Owned by the caller and passed `&mut` into every stage.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    /// Set once both organizations have joined the channel.
    pub channel_joined: bool,
    /// Value the verifying peer must report at the next checkpoint.
    pub expected_value: i64,
    /// Channel id plus the last observed configuration block.
    pub channel: ChannelHandle,
    completed: Vec<Stage>,
    skipped: Vec<Stage>,
    transactions: Vec<RecordedTransaction>,
}

impl WorkflowState {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel_joined: false,
            expected_value: 0,
            channel: ChannelHandle::new(channel),
            completed: Vec::new(),
            skipped: Vec::new(),
            transactions: Vec::new(),
        }
    }

    /// Stage barrier.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::OutOfOrder`] when `stage` does not come strictly after
    /// the last completed stage.
    pub fn enter(&self, stage: Stage) -> Result<(), WorkflowError> {
        match self.last_completed() {
            Some(last) if stage <= last => Err(WorkflowError::OutOfOrder { stage, last }),
            _ => Ok(()),
        }
    }

    pub fn complete(&mut self, stage: Stage) {
        self.completed.push(stage);
    }

    /// Marks a stage as intentionally not run (for example a disabled upgrade).
    pub fn skip(&mut self, stage: Stage) {
        self.skipped.push(stage);
    }

    pub fn record_transaction(
        &mut self,
        stage: Stage,
        operation: &'static str,
        transaction_id: &TransactionId,
    ) {
        self.transactions.push(RecordedTransaction {
            stage,
            operation,
            transaction_id: transaction_id.to_string(),
        });
    }

    pub fn last_completed(&self) -> Option<Stage> {
        self.completed.last().copied()
    }

    pub fn completed(&self) -> &[Stage] {
        &self.completed
    }

    pub fn skipped(&self) -> &[Stage] {
        &self.skipped
    }

    pub fn transactions(&self) -> &[RecordedTransaction] {
        &self.transactions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> WorkflowState {
        WorkflowState::new(ChannelId::new("orgchannel"))
    }

    #[test]
    fn stages_are_ordered() {
        let mut sorted = Stage::ALL;
        sorted.sort();
        assert_eq!(sorted, Stage::ALL);
        assert_eq!(Stage::PolicyEnforcementCheck.to_string(), "policy_enforcement_check");
    }

    #[test]
    fn enter_accepts_any_later_stage() {
        let mut state = state();
        assert!(state.enter(Stage::Init).is_ok());
        state.complete(Stage::Init);
        assert!(state.enter(Stage::ChannelSetup).is_ok());
        assert!(state.enter(Stage::Upgrade).is_ok());
    }

    #[test]
    fn enter_rejects_repeated_or_earlier_stage() {
        let mut state = state();
        state.complete(Stage::Init);
        state.complete(Stage::ChannelSetup);
        state.complete(Stage::PeerDiscovery);

        let err = state.enter(Stage::PeerDiscovery).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::OutOfOrder {
                stage: Stage::PeerDiscovery,
                last: Stage::PeerDiscovery
            }
        ));
        assert!(state.enter(Stage::Init).is_err());
    }

    #[test]
    fn records_transactions_in_order() {
        let mut state = state();
        state.record_transaction(Stage::ChannelSetup, "create_channel", &TransactionId("a".into()));
        state.record_transaction(Stage::TransactAndVerify, "move", &TransactionId("b".into()));

        let ids: Vec<&str> = state
            .transactions()
            .iter()
            .map(|t| t.transaction_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn new_state_starts_unjoined() {
        let state = state();
        assert!(!state.channel_joined);
        assert_eq!(state.expected_value, 0);
        assert_eq!(state.channel.last_config_block, None);
        assert!(state.completed().is_empty());
    }
}
