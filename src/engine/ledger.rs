use anyhow::bail;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Lifecycle of one pipeline stage for one target.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StageState {
    /// No record on disk; the stage has never finished.
    Pending,
    /// A record was written at stage start but never finalized; the
    /// previous run died mid-stage and the stage must restart from
    /// scratch.
    InProgress,
    /// The stage ran to completion and is skipped on re-runs.
    Complete,
}

/// Persistent per-target stage records, one file per stage under the
/// target's stamps folder. A stage is complete iff its record reads
/// `complete`; records are only finalized after configure, make and
/// install all succeeded, and are removed wholesale by `clean`.
#[derive(Debug)]
pub struct StageLedger {
    dir: PathBuf,
}

impl StageLedger {
    pub fn new<P: Into<PathBuf>>(dir: P) -> StageLedger {
        StageLedger { dir: dir.into() }
    }

    pub fn record_path(&self, stage: &str) -> PathBuf {
        self.dir.join(format!("{}.stage", stage))
    }

    pub async fn state(&self, stage: &str) -> anyhow::Result<StageState> {
        let raw = match tokio::fs::read_to_string(self.record_path(stage)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StageState::Pending),
            Err(e) => return Err(e.into()),
        };

        match raw.trim() {
            "in-progress" => Ok(StageState::InProgress),
            "complete" => Ok(StageState::Complete),
            other => bail!("corrupt stage record for {}: {:?}", stage, other),
        }
    }

    /// Marks the stage started. Any earlier record is overwritten, so
    /// a crash before `finish` leaves the stage in-progress.
    pub async fn begin(&self, stage: &str) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.record_path(stage), "in-progress\n").await?;
        Ok(())
    }

    pub async fn finish(&self, stage: &str) -> anyhow::Result<()> {
        tokio::fs::write(self.record_path(stage), "complete\n").await?;
        Ok(())
    }
}
