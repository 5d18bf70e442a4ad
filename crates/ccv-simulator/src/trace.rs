//! Action traces
//!
//! A trace is the list of actions a run applied, in order, with the timeout
//! flag each one reported. Traces are stored as JSON and can be replayed
//! against the same protocol parameters to reproduce a run exactly.

use std::path::Path;

use ccv_core::{CcvError, ProtocolParams, Result};
use ccv_protocol::{Action, CcvDriver, ProtocolState};
use serde::{Deserialize, Serialize};

/// One applied action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Position in the run
    pub index: usize,
    /// The action as applied, after policy adjustment
    pub action: Action,
    /// Whether the action timed out a consumer
    #[serde(default)]
    pub timed_out: bool,
}

/// A recorded run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    /// Seed that produced the run, if it was generated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Scheduling policy of the run
    #[serde(default)]
    pub policy: String,
    /// Applied actions in order
    pub records: Vec<TraceRecord>,
}

impl Trace {
    /// Empty trace for a run with `policy`.
    pub fn new(seed: Option<u64>, policy: impl Into<String>) -> Self {
        Self {
            seed,
            policy: policy.into(),
            records: Vec::new(),
        }
    }

    /// Append an applied action.
    pub fn push(&mut self, action: Action, timed_out: bool) {
        let index = self.records.len();
        self.records.push(TraceRecord {
            index,
            action,
            timed_out,
        });
    }

    /// Number of recorded actions.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| CcvError::serialization(format!("failed to parse trace: {e}")))
    }

    /// Write the trace to `path` as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?).map_err(|e| {
            CcvError::from(e).with_context(format!("failed to write trace {}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), records = self.len(), "trace saved");
        Ok(())
    }

    /// Read a trace written by `save`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CcvError::from(e).with_context(format!("failed to read trace {}", path.display()))
        })?;
        Self::from_json(&content)
    }
}

/// Re-apply every record of `trace` from genesis.
///
/// Fails with `CcvError::Internal` if a record no longer applies or reports a
/// different timeout outcome.
pub fn replay(trace: &Trace, params: &ProtocolParams) -> Result<ProtocolState> {
    let mut driver = CcvDriver::new(params.clone())?;
    for record in &trace.records {
        let timed_out = driver.apply(&record.action).map_err(|e| {
            CcvError::internal(format!(
                "step {} ({}) no longer applies: {e}",
                record.index, record.action
            ))
        })?;
        if timed_out != record.timed_out {
            return Err(CcvError::internal(format!(
                "step {} ({}) diverged: recorded timed_out={}, replayed {timed_out}",
                record.index, record.action, record.timed_out
            )));
        }
    }
    tracing::info!(records = trace.len(), "trace replayed");
    Ok(driver.into_state())
}
