//! The chain descriptor: the authoritative record of one segment.
//!
//! A [`ChainDescriptor`] maps the segment's byte range onto an ordered list
//! of [`LedgerEntry`] values. Entries are stored as a contiguous array and
//! tile `[0, length)` without gaps, so any offset resolves by binary search
//! over entry end offsets. Only the last entry may be unsealed; that entry
//! is the segment's open ledger.
//!
//! Descriptors are persisted as JSON in the metadata store. The store's
//! record version travels alongside the decoded descriptor and is the guard
//! of every conditional update.

use chrono::{DateTime, Utc};
use segmentstore_storage::{LedgerId, Version};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentError};

/// One ledger's contribution to a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Ledger holding the bytes.
    pub ledger_id: LedgerId,
    /// Segment offset of the ledger's first byte.
    pub start_offset: u64,
    /// Number of bytes the segment uses, always `[0, length)` of the ledger.
    pub length: u64,
    /// Whether the entry accepts no further appends.
    pub sealed: bool,
}

impl LedgerEntry {
    /// Segment offset one past the entry's last byte.
    #[must_use]
    pub fn end_offset(&self) -> u64 {
        self.start_offset.saturating_add(self.length)
    }
}

/// Record of the last concat applied to a target segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcatMarker {
    /// Name of the merged source segment.
    pub source: String,
    /// Target offset at which the source bytes begin.
    pub target_offset: u64,
    /// Number of bytes merged.
    pub length: u64,
}

/// A piece of a read resolved against one ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadSlice {
    pub(crate) ledger_id: LedgerId,
    /// Position inside the ledger.
    pub(crate) position: u64,
    pub(crate) length: u64,
}

/// Persisted mapping from a segment to its ledger chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    pub(crate) name: String,
    pub(crate) entries: Vec<LedgerEntry>,
    pub(crate) length: u64,
    pub(crate) epoch: u64,
    pub(crate) owner: String,
    pub(crate) sealed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) merged_into: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) last_concat: Option<ConcatMarker>,
    pub(crate) last_modified: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) version: Option<Version>,
}

impl ChainDescriptor {
    /// Creates the descriptor of a freshly created segment: no entries,
    /// epoch 0, unsealed.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            length: 0,
            epoch: 0,
            owner: String::new(),
            sealed: false,
            merged_into: None,
            last_concat: None,
            last_modified: Utc::now(),
            version: None,
        }
    }

    /// Segment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ledger entries in segment order.
    #[must_use]
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Total segment length in bytes.
    #[must_use]
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Current fencing epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Owner token of the current epoch; empty before the first fence.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Whether the segment is sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Target of a concat in progress, if this segment is being merged.
    #[must_use]
    pub fn merged_into(&self) -> Option<&str> {
        self.merged_into.as_deref()
    }

    /// The last concat applied to this segment as a target.
    #[must_use]
    pub fn last_concat(&self) -> Option<&ConcatMarker> {
        self.last_concat.as_ref()
    }

    /// Time of the last persisted mutation.
    #[must_use]
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Metadata store version this descriptor was read at, if persisted.
    #[must_use]
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// The unsealed last entry, if any.
    #[must_use]
    pub fn open_entry(&self) -> Option<&LedgerEntry> {
        self.entries.last().filter(|entry| !entry.sealed)
    }

    /// Returns `true` if any entry references `ledger_id`.
    #[must_use]
    pub fn contains_ledger(&self, ledger_id: LedgerId) -> bool {
        self.entries.iter().any(|entry| entry.ledger_id == ledger_id)
    }

    /// Returns `true` if every ledger of `source` is referenced here.
    ///
    /// Used to detect that a concat already extended this segment with the
    /// source's chain.
    #[must_use]
    pub fn holds_chain_of(&self, source: &ChainDescriptor) -> bool {
        !source.entries.is_empty()
            && source.entries.iter().all(|entry| self.contains_ledger(entry.ledger_id))
    }

    /// Index of the entry holding byte `offset`.
    ///
    /// Zero-length entries never hold a byte and are skipped.
    #[must_use]
    pub fn locate(&self, offset: u64) -> Option<usize> {
        let index = self.entries.partition_point(|entry| entry.end_offset() <= offset);
        (index < self.entries.len()).then_some(index)
    }

    /// Resolves `[offset, offset + length)` into per-ledger reads, in order.
    ///
    /// The caller has checked the range against [`length`](Self::length).
    pub(crate) fn read_plan(&self, offset: u64, length: u64) -> Vec<ReadSlice> {
        let mut plan = Vec::new();
        let Some(first) = self.locate(offset) else {
            return plan;
        };

        let end = offset.saturating_add(length);
        let mut cursor = offset;
        for entry in &self.entries[first..] {
            if cursor >= end {
                break;
            }
            if entry.length == 0 {
                continue;
            }
            let slice_end = entry.end_offset().min(end);
            plan.push(ReadSlice {
                ledger_id: entry.ledger_id,
                position: cursor - entry.start_offset,
                length: slice_end - cursor,
            });
            cursor = slice_end;
        }
        plan
    }

    /// Marks the open entry sealed and returns its ledger.
    pub(crate) fn seal_open_entry(&mut self) -> Option<LedgerId> {
        let entry = self.entries.last_mut().filter(|entry| !entry.sealed)?;
        entry.sealed = true;
        Some(entry.ledger_id)
    }

    /// Appends an empty open entry for `ledger_id` at the current length.
    pub(crate) fn push_entry(&mut self, ledger_id: LedgerId) {
        self.entries.push(LedgerEntry {
            ledger_id,
            start_offset: self.length,
            length: 0,
            sealed: false,
        });
    }

    /// Accounts `bytes` appended to the open entry's ledger.
    pub(crate) fn record_append(&mut self, ledger_id: LedgerId, bytes: u64) -> Result<()> {
        let entry = self
            .entries
            .last_mut()
            .filter(|entry| !entry.sealed && entry.ledger_id == ledger_id)
            .ok_or_else(|| {
                SegmentError::corrupt(&self.name, format!("ledger {ledger_id} is not the open entry"))
            })?;
        entry.length += bytes;
        self.length += bytes;
        Ok(())
    }

    /// Extends this chain with the entries of sealed `source`, re-based to
    /// start at the current length.
    pub(crate) fn append_chain(&mut self, source: &ChainDescriptor) {
        self.seal_open_entry();
        let target_offset = self.length;
        self.entries.extend(source.entries.iter().map(|entry| LedgerEntry {
            ledger_id: entry.ledger_id,
            start_offset: target_offset + entry.start_offset,
            length: entry.length,
            sealed: true,
        }));
        self.length += source.length;
        self.last_concat = Some(ConcatMarker {
            source: source.name.clone(),
            target_offset,
            length: source.length,
        });
    }

    /// Stamps the modification time.
    pub(crate) fn touch(&mut self) {
        self.last_modified = Utc::now();
    }

    /// Checks the structural invariants of the chain.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::Corrupt`] if entries are not contiguous from
    /// offset 0, an entry other than the last is unsealed, `length` is not
    /// the end of the last entry, a sealed segment has an open entry, or a
    /// segment being merged is not sealed.
    pub fn validate(&self) -> Result<()> {
        let mut expected_start = 0u64;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.start_offset != expected_start {
                return Err(SegmentError::corrupt(
                    &self.name,
                    format!(
                        "entry {index} starts at {} instead of {expected_start}",
                        entry.start_offset
                    ),
                ));
            }
            if !entry.sealed && index + 1 != self.entries.len() {
                return Err(SegmentError::corrupt(
                    &self.name,
                    format!("entry {index} is unsealed but not last"),
                ));
            }
            expected_start = entry.start_offset.checked_add(entry.length).ok_or_else(|| {
                SegmentError::corrupt(&self.name, format!("entry {index} overflows"))
            })?;
        }

        if self.length != expected_start {
            return Err(SegmentError::corrupt(
                &self.name,
                format!("length {} does not match chain end {expected_start}", self.length),
            ));
        }
        if self.sealed && self.open_entry().is_some() {
            return Err(SegmentError::corrupt(&self.name, "sealed segment has an open entry"));
        }
        if self.merged_into.is_some() && !self.sealed {
            return Err(SegmentError::corrupt(&self.name, "merge pending on unsealed segment"));
        }
        Ok(())
    }

    /// Serializes the descriptor for the metadata store.
    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            SegmentError::corrupt(&self.name, format!("failed to encode descriptor: {e}"))
        })
    }

    /// Decodes and validates a stored descriptor for segment `name`.
    pub(crate) fn decode(name: &str, bytes: &[u8], version: Version) -> Result<Self> {
        let mut descriptor: Self = serde_json::from_slice(bytes)
            .map_err(|e| SegmentError::corrupt(name, format!("undecodable descriptor: {e}")))?;
        if descriptor.name != name {
            return Err(SegmentError::corrupt(
                name,
                format!("record names segment '{}'", descriptor.name),
            ));
        }
        descriptor.validate()?;
        descriptor.version = Some(version);
        Ok(descriptor)
    }
}

/// Externally visible state of a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentProperties {
    /// Segment name.
    pub name: String,
    /// Length in bytes.
    pub length: u64,
    /// Whether the segment is sealed.
    pub sealed: bool,
    /// Time of the last persisted mutation.
    pub last_modified: DateTime<Utc>,
}

impl From<&ChainDescriptor> for SegmentProperties {
    fn from(descriptor: &ChainDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            length: descriptor.length,
            sealed: descriptor.sealed,
            last_modified: descriptor.last_modified,
        }
    }
}
