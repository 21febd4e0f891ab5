//! # Transfer Dispatch
//!
//! Chooses between the single-request and the chunked transfer strategy and
//! tracks progress through a chunked transfer.
//!
//! The decision is a pure function of the file size: files strictly below
//! [`TransferConfig::small_file_threshold`] go up in one request, everything
//! else is split into fixed-size chunks. Chunk boundaries are fixed by the
//! config, not chosen per call, because resumable-upload endpoints reject
//! chunks that are not multiples of 320 KiB.

use crate::error::{Result, SyncError};
use core_async::sync::CancellationToken;
use core_runtime::config::TransferConfig;
use core_runtime::events::{CoreEvent, EventBus, TransferDirection, TransferEvent, TransferStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One contiguous byte range of a chunked transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: u64,
    pub offset: u64,
    pub len: u64,
}

impl Chunk {
    /// Offset of the last byte in the chunk.
    pub fn last_byte(&self) -> u64 {
        self.offset + self.len.saturating_sub(1)
    }

    /// `Content-Range` value for uploading this chunk of a `total`-byte body.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.offset, self.last_byte(), total)
    }

    /// `Range` request header value for downloading this chunk.
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.offset, self.last_byte())
    }
}

/// Splits `total` bytes into `chunk_size` pieces; the last may be shorter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    pub fn new(total: u64, chunk_size: usize) -> Self {
        Self {
            total,
            chunk_size: (chunk_size as u64).max(1),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn chunk_count(&self) -> u64 {
        self.total.div_ceil(self.chunk_size)
    }

    pub fn chunks(&self) -> impl Iterator<Item = Chunk> {
        let ChunkPlan { total, chunk_size } = *self;
        (0..self.chunk_count()).map(move |index| {
            let offset = index * chunk_size;
            Chunk {
                index,
                offset,
                len: chunk_size.min(total - offset),
            }
        })
    }
}

/// Picks the transfer strategy for a `size`-byte file.
pub fn select_strategy(size: u64, config: &TransferConfig) -> TransferStrategy {
    if size < config.small_file_threshold {
        TransferStrategy::Small
    } else {
        TransferStrategy::Large
    }
}

#[derive(Debug, Clone)]
pub struct TransferDispatcher {
    config: TransferConfig,
    cancel: CancellationToken,
    event_bus: Option<EventBus>,
}

impl TransferDispatcher {
    pub fn new(config: TransferConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            cancel,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn strategy_for(&self, size: u64) -> TransferStrategy {
        let strategy = select_strategy(size, &self.config);
        debug!(size, %strategy, "Selected transfer strategy");
        strategy
    }

    pub fn upload_plan(&self, total: u64) -> ChunkPlan {
        ChunkPlan::new(total, self.config.upload_chunk_size)
    }

    pub fn download_plan(&self, total: u64) -> ChunkPlan {
        ChunkPlan::new(total, self.config.download_chunk_size)
    }

    /// Announces a transfer and returns the tracker its chunk loop reports to.
    pub fn begin(
        &self,
        remote_name: &str,
        direction: TransferDirection,
        size: u64,
        strategy: Option<TransferStrategy>,
    ) -> TransferProgress {
        info!(remote_name, ?direction, size, "Transfer started");
        self.emit(TransferEvent::Started {
            remote_name: remote_name.to_string(),
            direction,
            size,
            strategy,
        });

        TransferProgress {
            remote_name: remote_name.to_string(),
            total_bytes: size,
            bytes_transferred: 0,
            cancel: self.cancel.clone(),
            event_bus: self.event_bus.clone(),
        }
    }

    fn emit(&self, event: TransferEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Transfer(event));
        }
    }
}

/// Progress of one running transfer.
///
/// The chunk loop calls [`checkpoint`](Self::checkpoint) before each chunk so
/// a cancelled transfer stops at the next chunk boundary.
#[derive(Debug)]
pub struct TransferProgress {
    remote_name: String,
    total_bytes: u64,
    bytes_transferred: u64,
    cancel: CancellationToken,
    event_bus: Option<EventBus>,
}

impl TransferProgress {
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            info!(
                remote_name = %self.remote_name,
                bytes_transferred = self.bytes_transferred,
                "Transfer cancelled"
            );
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    pub fn chunk_done(&mut self, chunk: &Chunk) {
        self.bytes_transferred += chunk.len;
        debug!(
            remote_name = %self.remote_name,
            chunk = chunk.index,
            bytes_transferred = self.bytes_transferred,
            total_bytes = self.total_bytes,
            "Chunk transferred"
        );
        self.emit(TransferEvent::ChunkCompleted {
            remote_name: self.remote_name.clone(),
            chunk_index: chunk.index,
            bytes_transferred: self.bytes_transferred,
            total_bytes: self.total_bytes,
        });
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    /// Emits the terminal event for `result` and passes it through.
    pub fn finish<T>(self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => {
                info!(
                    remote_name = %self.remote_name,
                    bytes_transferred = self.bytes_transferred,
                    "Transfer completed"
                );
                self.emit(TransferEvent::Completed {
                    remote_name: self.remote_name.clone(),
                    bytes_transferred: self.bytes_transferred,
                });
            }
            Err(SyncError::Cancelled) => self.emit(TransferEvent::Cancelled {
                remote_name: self.remote_name.clone(),
            }),
            Err(e) => self.emit(TransferEvent::Failed {
                remote_name: self.remote_name.clone(),
                message: e.to_string(),
            }),
        }
        result
    }

    fn emit(&self, event: TransferEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Transfer(event));
        }
    }
}
