//! Run report rendered after a successful workflow.

use std::io::Write;
use std::time::Duration;

use serde::Serialize;

use consortium_sandbox::StatsSnapshot;

use crate::output::Render;
use crate::stage::{RecordedTransaction, Stage, WorkflowState};

/// Outcome of a single stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    /// `false` when the stage was skipped (disabled upgrade, channel already joined).
    pub executed: bool,
    pub elapsed_ms: u64,
}

/// Summary of a complete run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub channel_id: String,
    pub chaincode: String,
    pub last_config_block: Option<u64>,
    pub final_value: i64,
    pub stages: Vec<StageReport>,
    pub transactions: Vec<RecordedTransaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_calls: Option<StatsSnapshot>,
}

impl RunReport {
    pub fn new(state: &WorkflowState, chaincode: String, stages: Vec<StageReport>) -> Self {
        Self {
            channel_id: state.channel.id.to_string(),
            chaincode,
            last_config_block: state.channel.last_config_block,
            final_value: state.expected_value,
            stages,
            transactions: state.transactions().to_vec(),
            network_calls: None,
        }
    }

    /// Attach sandbox call counters.
    pub fn with_network_calls(mut self, stats: StatsSnapshot) -> Self {
        self.network_calls = Some(stats);
        self
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

pub(crate) fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

impl Render for RunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Consortium Run Report")?;
        writeln!(w, "{}", "=".repeat(48))?;
        writeln!(w, "Channel:      {}", self.channel_id)?;
        writeln!(w, "Chaincode:    {}", self.chaincode)?;
        match self.last_config_block {
            Some(block) => writeln!(w, "Config block: {block}")?,
            None => writeln!(w, "Config block: -")?,
        }
        writeln!(w, "Final value:  {}", self.final_value)?;
        writeln!(w)?;

        writeln!(w, "{:<28} {:<10} {:>10}", "STAGE", "RESULT", "ELAPSED")?;
        writeln!(w, "{}", "-".repeat(50))?;
        for stage in &self.stages {
            let result = if stage.executed { "ok" } else { "skipped" };
            writeln!(
                w,
                "{:<28} {:<10} {:>8}ms",
                stage.stage.as_str(),
                result,
                stage.elapsed_ms
            )?;
        }

        if !self.transactions.is_empty() {
            writeln!(w)?;
            writeln!(w, "Transactions:")?;
            for tx in &self.transactions {
                writeln!(
                    w,
                    "  {:<24} {:<18} {}",
                    tx.stage.as_str(),
                    tx.operation,
                    tx.transaction_id
                )?;
            }
        }

        if let Some(calls) = &self.network_calls {
            writeln!(w)?;
            writeln!(
                w,
                "Network calls: save_channel={} join={} install={} instantiate={} upgrade={} execute={} query={}",
                calls.save_channel,
                calls.join_channel,
                calls.install,
                calls.instantiate,
                calls.upgrade,
                calls.execute,
                calls.query
            )?;
        }
        Ok(())
    }
}

/// Result of `--validate`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chaincode: Option<String>,
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if self.valid {
            writeln!(w, "Configuration valid: {}", self.source)?;
            if let Some(channel) = &self.channel_id {
                writeln!(w, "  channel:   {channel}")?;
            }
            if let Some(chaincode) = &self.chaincode {
                writeln!(w, "  chaincode: {chaincode}")?;
            }
        } else {
            writeln!(w, "Configuration invalid: {}", self.source)?;
            for error in &self.errors {
                writeln!(w, "  - {error}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consortium_core::types::{ChannelId, TransactionId};

    fn report() -> RunReport {
        let mut state = WorkflowState::new(ChannelId::new("orgchannel"));
        state.expected_value = 102;
        assert!(state.channel.observe_config_block(2));
        state.record_transaction(Stage::TransactAndVerify, "move", &TransactionId("tx-1".into()));
        RunReport::new(
            &state,
            "exampleCC:1".to_owned(),
            vec![
                StageReport {
                    stage: Stage::Init,
                    executed: true,
                    elapsed_ms: 0,
                },
                StageReport {
                    stage: Stage::Upgrade,
                    executed: false,
                    elapsed_ms: 0,
                },
            ],
        )
    }

    #[test]
    fn text_report_lists_stages_and_transactions() {
        let mut buffer = Vec::new();
        report().render_text(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("Final value:  102"));
        assert!(text.contains("Config block: 2"));
        assert!(text.contains("upgrade"));
        assert!(text.contains("skipped"));
        assert!(text.contains("tx-1"));
        assert!(!text.contains("Network calls"));
    }

    #[test]
    fn json_report_omits_missing_network_calls() {
        let json = serde_json::to_value(report()).unwrap();
        assert_eq!(json["final_value"], 102);
        assert_eq!(json["stages"][0]["stage"], "init");
        assert!(json.get("network_calls").is_none());

        let json = serde_json::to_value(report().with_network_calls(StatsSnapshot::default())).unwrap();
        assert_eq!(json["network_calls"]["execute"], 0);
    }

    #[test]
    fn invalid_config_lists_errors() {
        let report = ConfigValidationReport {
            source: "consortium.toml".to_owned(),
            valid: false,
            channel_id: None,
            chaincode: None,
            errors: vec!["chaincode.name must not be empty".to_owned()],
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("Configuration invalid"));
        assert!(text.contains("chaincode.name"));
    }

    #[test]
    fn millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
