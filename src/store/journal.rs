//! Append-only JSONL change journal.
//!
//! Every store mutation is appended as one JSON line carrying the full row
//! after the write (or the deleted id). Opening a store replays the journal
//! in order to rebuild in-memory state, so the last line for an id wins.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{
    AutomationExecution, AutomationRule, CultivationPlan, CultivationTask, DonorMove,
    EmailTemplate, Touchpoint,
};
use crate::error::Result;

/// One journal line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// When this change was written.
    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub change: Change,
}

/// The mutation itself, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "row", rename_all = "snake_case")]
pub enum Change {
    MoveUpserted(DonorMove),
    PlanUpserted(CultivationPlan),
    PlanDeleted(Uuid),
    TaskUpserted(CultivationTask),
    TaskDeleted(Uuid),
    TouchpointAppended(Touchpoint),
    RuleUpserted(AutomationRule),
    RuleDeleted(Uuid),
    ExecutionUpserted(AutomationExecution),
    TemplateUpserted(EmailTemplate),
}

/// JSONL-backed change journal.
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one change to the log.
    pub async fn append(&self, change: &Change) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let event = ChangeEvent {
            timestamp: Utc::now(),
            change: change.clone(),
        };
        let json = serde_json::to_string(&event)?;
        file.write_all(format!("{}\n", json).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    /// Replay all changes in write order.
    pub async fn replay(&self) -> Result<Vec<ChangeEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: ChangeEvent = serde_json::from_str(&line)?;
            events.push(event);
        }

        Ok(events)
    }
}
