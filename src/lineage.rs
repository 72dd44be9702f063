//! Append-only, parent-hash-linked version log.
//!
//! Each key moves through BASE → REPORT_ADJUSTED (any number) → FINAL. A write
//! must declare the hash of the current head as its parent; a stale or missing
//! parent is rejected rather than silently forking the history.
use crate::error::{ValidationError, WorkflowError};
use crate::types::TimeStamp;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const SEQ_DIGITS: usize = 20;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStage {
    #[n(0)]
    Base,
    #[n(1)]
    ReportAdjusted,
    #[n(2)]
    Final,
}

impl VersionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStage::Base => "BASE",
            VersionStage::ReportAdjusted => "REPORT_ADJUSTED",
            VersionStage::Final => "FINAL",
        }
    }

    fn may_follow(&self, head: Option<VersionStage>) -> bool {
        match (head, self) {
            (None, VersionStage::Base) => true,
            (Some(VersionStage::Base | VersionStage::ReportAdjusted), VersionStage::ReportAdjusted) => true,
            (Some(VersionStage::Base | VersionStage::ReportAdjusted), VersionStage::Final) => true,
            _ => false,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct SnapshotVersion {
    #[n(0)]
    pub key: String,
    #[n(1)]
    pub seq: u64,
    #[n(2)]
    pub stage: VersionStage,
    #[n(3)]
    pub parent_hash: Option<String>,
    #[n(4)]
    pub payload: Vec<u8>,
    #[n(5)]
    pub recorded_at: TimeStamp<Utc>,
}

impl SnapshotVersion {
    // the hash covers every field, the parent link included
    pub fn build(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}

pub struct LineageLog {
    tree: sled::Tree,
}

impl LineageLog {
    pub fn open(db: &Arc<sled::Db>) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree("lineage")?,
        })
    }

    // `<key>\0<seq:020>`; keys may not contain NUL, so one key's prefix never covers another's
    fn key_prefix(key: &str) -> Vec<u8> {
        let mut prefix = key.as_bytes().to_vec();
        prefix.push(0);
        prefix
    }

    fn entry_key(key: &str, seq: u64) -> Vec<u8> {
        let mut entry = Self::key_prefix(key);
        entry.extend_from_slice(format!("{seq:020}").as_bytes());
        entry
    }

    fn versions(&self, key: &str) -> impl DoubleEndedIterator<Item = sled::Result<(sled::IVec, sled::IVec)>> {
        let prefix = Self::key_prefix(key);
        let exact = prefix.len() + SEQ_DIGITS;
        self.tree.scan_prefix(&prefix).filter(move |entry| match entry {
            Ok((k, _)) => k.len() == exact && k[exact - SEQ_DIGITS..].iter().all(u8::is_ascii_digit),
            Err(_) => true,
        })
    }

    /// Every version of `key`, oldest first.
    pub fn history(&self, key: &str) -> anyhow::Result<Vec<SnapshotVersion>> {
        let mut versions = vec![];
        for entry in self.versions(key) {
            let (_, value) = entry?;
            versions.push(minicbor::decode(&value)?);
        }
        Ok(versions)
    }

    /// Latest version of `key` with its hash.
    pub fn head(&self, key: &str) -> anyhow::Result<Option<(String, SnapshotVersion)>> {
        let Some(entry) = self.versions(key).next_back() else {
            return Ok(None);
        };
        let (_, value) = entry?;
        let version: SnapshotVersion = minicbor::decode(&value)?;
        let (hash, _) = version.build()?;
        Ok(Some((hash, version)))
    }

    pub fn append(
        &self,
        key: &str,
        stage: VersionStage,
        declared_parent: Option<&str>,
        payload: Vec<u8>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<String> {
        if key.is_empty() || key.contains('\0') {
            return Err(WorkflowError::from(ValidationError::InvalidLineageKey(key.escape_default().to_string())).into());
        }
        let head = self.head(key)?;
        let head_hash = head.as_ref().map(|(h, _)| h.clone());
        if head_hash.as_deref() != declared_parent {
            return Err(WorkflowError::LineageConflict {
                key: key.into(),
                expected: head_hash,
                declared: declared_parent.map(Into::into),
            }
            .into());
        }

        let head_stage = head.as_ref().map(|(_, v)| v.stage);
        if !stage.may_follow(head_stage) {
            return Err(WorkflowError::from(ValidationError::StageOrder {
                head: head_stage.map_or("none", |s| s.as_str()).into(),
                stage: stage.as_str().into(),
            })
            .into());
        }

        let version = SnapshotVersion {
            key: key.into(),
            seq: head.as_ref().map_or(0, |(_, v)| v.seq + 1),
            stage,
            parent_hash: head_hash.clone(),
            payload,
            recorded_at: now.into(),
        };
        let (hash, cbor) = version.build()?;

        // a concurrent writer that got there first owns this sequence slot
        let slot = Self::entry_key(key, version.seq);
        if self
            .tree
            .compare_and_swap(slot, None as Option<&[u8]>, Some(cbor))?
            .is_err()
        {
            return Err(WorkflowError::LineageConflict {
                key: key.into(),
                expected: None,
                declared: head_hash,
            }
            .into());
        }

        tracing::info!(key, stage = stage.as_str(), seq = version.seq, %hash, "lineage version appended");
        Ok(hash)
    }

    /// Recomputes every hash and parent link of `key`.
    pub fn verify(&self, key: &str) -> anyhow::Result<()> {
        let mut parent: Option<String> = None;
        for (expected_seq, version) in self.history(key)?.into_iter().enumerate() {
            if version.seq != expected_seq as u64 || version.parent_hash != parent {
                return Err(WorkflowError::LineageBroken {
                    key: key.into(),
                    seq: version.seq,
                }
                .into());
            }
            parent = Some(version.build()?.0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn log() -> anyhow::Result<(tempfile::TempDir, LineageLog)> {
        let temp_dir = tempdir()?;
        let db = Arc::new(sled::open(temp_dir.path().join("lineage.db"))?);
        Ok((temp_dir, LineageLog::open(&db)?))
    }

    #[test]
    fn chain_links_each_version_to_its_parent() -> anyhow::Result<()> {
        let (_dir, log) = log()?;
        let now = Utc::now();

        let base = log.append("deal_1", VersionStage::Base, None, b"v0".to_vec(), now)?;
        let adj = log.append("deal_1", VersionStage::ReportAdjusted, Some(&base), b"v1".to_vec(), now)?;
        let fin = log.append("deal_1", VersionStage::Final, Some(&adj), b"v2".to_vec(), now)?;

        let history = log.history("deal_1")?;
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].parent_hash.as_deref(), Some(base.as_str()));
        assert_eq!(log.head("deal_1")?.map(|(h, _)| h), Some(fin));
        log.verify("deal_1")?;
        Ok(())
    }

    #[test]
    fn stale_parent_is_rejected() -> anyhow::Result<()> {
        let (_dir, log) = log()?;
        let now = Utc::now();
        let base = log.append("deal_1", VersionStage::Base, None, b"v0".to_vec(), now)?;
        log.append("deal_1", VersionStage::ReportAdjusted, Some(&base), b"v1".to_vec(), now)?;

        let err = log
            .append("deal_1", VersionStage::ReportAdjusted, Some(&base), b"v1b".to_vec(), now)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WorkflowError>(),
            Some(WorkflowError::LineageConflict { .. })
        ));

        let err = log.append("deal_2", VersionStage::Base, Some(&base), b"x".to_vec(), now).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WorkflowError>(),
            Some(WorkflowError::LineageConflict { expected: None, .. })
        ));
        Ok(())
    }

    #[test]
    fn stages_are_forward_only() -> anyhow::Result<()> {
        let (_dir, log) = log()?;
        let now = Utc::now();

        assert!(log.append("k", VersionStage::Final, None, vec![], now).is_err());
        let base = log.append("k", VersionStage::Base, None, vec![], now)?;
        assert!(log.append("k", VersionStage::Base, Some(&base), vec![], now).is_err());
        let fin = log.append("k", VersionStage::Final, Some(&base), vec![], now)?;

        let err = log
            .append("k", VersionStage::ReportAdjusted, Some(&fin), vec![], now)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WorkflowError>(),
            Some(WorkflowError::Validation(ValidationError::StageOrder { .. }))
        ));
        Ok(())
    }

    #[test]
    fn nested_keys_keep_separate_chains() -> anyhow::Result<()> {
        let (_dir, log) = log()?;
        let now = Utc::now();
        let base = log.append("a", VersionStage::Base, None, b"parent".to_vec(), now)?;
        let child = log.append("a/b", VersionStage::Base, None, b"child".to_vec(), now)?;

        assert_eq!(log.history("a")?.len(), 1);
        assert_eq!(log.head("a")?.map(|(h, _)| h), Some(base.clone()));
        assert_eq!(log.head("a/b")?.map(|(h, _)| h), Some(child));

        log.append("a", VersionStage::ReportAdjusted, Some(&base), b"adjusted".to_vec(), now)?;
        assert_eq!(log.history("a")?.len(), 2);
        assert_eq!(log.history("a/b")?.len(), 1);
        log.verify("a")?;
        log.verify("a/b")?;
        Ok(())
    }

    #[test]
    fn nul_in_key_is_rejected() -> anyhow::Result<()> {
        let (_dir, log) = log()?;
        let err = log
            .append("a\0b", VersionStage::Base, None, vec![], Utc::now())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WorkflowError>(),
            Some(WorkflowError::Validation(ValidationError::InvalidLineageKey(_)))
        ));
        assert!(log.append("", VersionStage::Base, None, vec![], Utc::now()).is_err());
        Ok(())
    }

    #[test]
    fn keys_do_not_share_history() -> anyhow::Result<()> {
        let (_dir, log) = log()?;
        let now = Utc::now();
        log.append("deal_1", VersionStage::Base, None, b"a".to_vec(), now)?;
        log.append("deal_10", VersionStage::Base, None, b"b".to_vec(), now)?;

        assert_eq!(log.history("deal_1")?.len(), 1);
        assert_eq!(log.history("deal_10")?.len(), 1);
        Ok(())
    }
}
