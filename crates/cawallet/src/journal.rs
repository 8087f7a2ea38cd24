//! Append-only record of cross-chain transfer phases.
//!
//! A `step1_confirmed` line is written before step 2 is attempted, so a crash between the two
//! steps still leaves the recovery parameters on disk.

use eyre::Context as _;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferPhase {
    Step1Confirmed,
    RecoveryNeeded,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainRecord {
    pub ts: String,
    pub transfer_id: String,
    pub phase: TransferPhase,
    pub source_chain_id: String,
    pub to_chain_id: String,
    pub symbol: String,
    pub amount: i64,
    pub to: String,
    pub manager_address: String,
    pub token_contract_address: String,
    pub ca_hash: String,
    pub ca_address: String,
    pub step1_transaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step2_transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CrossChainRecord {
    #[must_use]
    pub fn at_phase(&self, phase: TransferPhase) -> Self {
        Self {
            ts: utc_now_iso(),
            phase,
            ..self.clone()
        }
    }
}

pub fn utc_now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub trait TransferJournal: Send + Sync {
    /// Durably append one record. An error means the record may not be on disk.
    fn append(&self, record: &CrossChainRecord) -> eyre::Result<()>;
}

/// JSON lines in a private file, fsynced per record.
#[derive(Debug, Clone)]
pub struct JsonlJournal {
    path: PathBuf,
}

impl JsonlJournal {
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn read_all(&self) -> eyre::Result<Vec<CrossChainRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let s = fs::read_to_string(&self.path).context("read cross-chain journal")?;
        s.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).context("parse cross-chain journal line"))
            .collect()
    }

    /// Transfers whose last record is `step1_confirmed` or `recovery_needed`.
    pub fn unresolved(&self) -> eyre::Result<Vec<CrossChainRecord>> {
        let mut last: Vec<CrossChainRecord> = Vec::new();
        for rec in self.read_all()? {
            match last.iter_mut().find(|r| r.transfer_id == rec.transfer_id) {
                Some(slot) => *slot = rec,
                None => last.push(rec),
            }
        }
        last.retain(|r| r.phase != TransferPhase::Completed);
        Ok(last)
    }
}

impl TransferJournal for JsonlJournal {
    fn append(&self, record: &CrossChainRecord) -> eyre::Result<()> {
        let line = serde_json::to_string(record).context("encode journal record")?;
        crate::fsutil::append_line_private(&self.path, &line)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryJournal {
        pub records: Mutex<Vec<CrossChainRecord>>,
        pub fail: bool,
    }

    impl MemoryJournal {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn phases(&self) -> Vec<TransferPhase> {
            self.records
                .lock()
                .map(|r| r.iter().map(|x| x.phase).collect())
                .unwrap_or_default()
        }
    }

    impl TransferJournal for MemoryJournal {
        fn append(&self, record: &CrossChainRecord) -> eyre::Result<()> {
            if self.fail {
                eyre::bail!("disk full");
            }
            self.records
                .lock()
                .map_err(|e| eyre::eyre!("mutex poisoned: {e}"))?
                .push(record.clone());
            Ok(())
        }
    }

    pub fn sample(transfer_id: &str) -> CrossChainRecord {
        CrossChainRecord {
            ts: utc_now_iso(),
            transfer_id: transfer_id.to_owned(),
            phase: TransferPhase::Step1Confirmed,
            source_chain_id: "tDVV".to_owned(),
            to_chain_id: "AELF".to_owned(),
            symbol: "ELF".to_owned(),
            amount: 100,
            to: "to".to_owned(),
            manager_address: "mgr".to_owned(),
            token_contract_address: "token".to_owned(),
            ca_hash: "hash".to_owned(),
            ca_address: "ca".to_owned(),
            step1_transaction_id: "t1".to_owned(),
            step2_transaction_id: None,
            error: None,
        }
    }

    #[test]
    fn unresolved_tracks_last_phase_per_transfer() -> eyre::Result<()> {
        let td = tempfile::tempdir()?;
        let j = JsonlJournal::new(td.path().join("data").join("journal.jsonl"));
        let a = sample("a");
        let b = sample("b");
        j.append(&a)?;
        j.append(&b)?;
        j.append(&a.at_phase(TransferPhase::Completed))?;
        j.append(&b.at_phase(TransferPhase::RecoveryNeeded))?;

        assert_eq!(j.read_all()?.len(), 4);
        let open = j.unresolved()?;
        assert_eq!(open.len(), 1);
        assert_eq!(open.first().map(|r| r.transfer_id.as_str()), Some("b"));
        assert_eq!(
            open.first().map(|r| r.phase),
            Some(TransferPhase::RecoveryNeeded)
        );
        Ok(())
    }

    #[test]
    fn phases_serialize_snake_case() -> eyre::Result<()> {
        let v = serde_json::to_value(sample("x"))?;
        assert_eq!(v.get("phase"), Some(&serde_json::json!("step1_confirmed")));
        assert!(v.get("step2_transaction_id").is_none());
        Ok(())
    }
}
