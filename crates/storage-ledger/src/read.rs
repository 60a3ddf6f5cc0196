//! The read path: byte ranges resolved across ledger boundaries.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use segmentstore_storage::StorageError;
use tracing::{debug, trace};

use crate::{
    descriptor::ChainDescriptor,
    error::{Result, SegmentError},
    manager::ChainManager,
    retry::with_retry,
};

fn check_range(descriptor: &ChainDescriptor, offset: u64, length: u64) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= descriptor.length => Ok(()),
        _ => Err(SegmentError::OutOfRange {
            name: descriptor.name.clone(),
            offset,
            length,
            segment_length: descriptor.length,
        }),
    }
}

impl ChainManager {
    /// Reads `[offset, offset + length)` of segment `name`.
    ///
    /// Only bytes recorded in the descriptor are readable; an unsealed tail
    /// entry is read up to its last committed byte. A range beyond the
    /// cached length, or a ledger that vanished under a cached chain, is
    /// retried once against a fresh descriptor.
    ///
    /// # Errors
    ///
    /// - [`SegmentError::NotFound`] if the segment does not exist
    /// - [`SegmentError::OutOfRange`] if the range ends past the segment length
    /// - [`SegmentError::Corrupt`] if a ledger returns fewer bytes than its entry records
    #[tracing::instrument(skip(self))]
    pub(crate) async fn read(&self, name: &str, offset: u64, length: u64) -> Result<Bytes> {
        let mut chain = self.metadata.load(name).await?;
        if check_range(&chain, offset, length).is_err() {
            chain = self.metadata.load_fresh(name).await?;
            check_range(&chain, offset, length)?;
        }

        match self.read_chain(&chain, offset, length).await {
            Err(SegmentError::Storage(StorageError::LedgerNotFound { ledger_id })) => {
                debug!(segment = name, %ledger_id, "ledger missing under cached chain, reloading");
                let chain = self.metadata.load_fresh(name).await?;
                check_range(&chain, offset, length)?;
                self.read_chain(&chain, offset, length).await
            },
            result => result,
        }
    }

    async fn read_chain(
        &self,
        chain: &Arc<ChainDescriptor>,
        offset: u64,
        length: u64,
    ) -> Result<Bytes> {
        let mut buffer = BytesMut::with_capacity(usize::try_from(length).unwrap_or(0));
        for slice in chain.read_plan(offset, length) {
            let bytes = with_retry(&self.retry, "read", || {
                self.log.read(slice.ledger_id, slice.position, slice.length)
            })
            .await?;
            if bytes.len() as u64 != slice.length {
                return Err(SegmentError::corrupt(
                    &chain.name,
                    format!(
                        "ledger {} returned {} bytes for a {}-byte read",
                        slice.ledger_id,
                        bytes.len(),
                        slice.length
                    ),
                ));
            }
            trace!(ledger_id = %slice.ledger_id, position = slice.position, len = slice.length, "ledger read");
            buffer.extend_from_slice(&bytes);
        }

        if buffer.len() as u64 != length {
            return Err(SegmentError::corrupt(
                &chain.name,
                format!("chain resolved {} of {length} bytes", buffer.len()),
            ));
        }
        Ok(buffer.freeze())
    }
}
