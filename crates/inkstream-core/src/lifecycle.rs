//! Stream identity and status transitions.
//!
//! All status changes go through [`StreamLifecycle`], which maps them onto the
//! store's atomic check-and-set. `begin_drive` is the single-writer gate: at
//! most one caller ever receives a [`DriveToken`] for a stream.

use std::fmt;

use tracing::{debug, info};
use uuid::Uuid;

use inkstream_store::{CasOutcome, SharedStreamStore, StreamId, StreamRecord, StreamStatus};

use crate::error::{LifecycleError, LifecycleResult};

/// Authorization to commit chunks to one stream.
///
/// Carries the fence the store checks on every commit. Not `Clone`: a drive
/// owns exactly one token.
pub struct DriveToken {
    stream_id: StreamId,
    fence: String,
}

impl DriveToken {
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    pub fn fence(&self) -> &str {
        &self.fence
    }
}

impl fmt::Debug for DriveToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveToken")
            .field("stream_id", &self.stream_id)
            .finish_non_exhaustive()
    }
}

/// Creates streams and moves them through their status machine.
#[derive(Clone)]
pub struct StreamLifecycle {
    store: SharedStreamStore,
}

impl StreamLifecycle {
    pub fn new(store: SharedStreamStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SharedStreamStore {
        &self.store
    }

    /// Allocate a new `pending` stream.
    pub async fn create(&self) -> LifecycleResult<StreamId> {
        self.create_with_input(None).await
    }

    /// Allocate a new `pending` stream carrying generation input.
    pub async fn create_with_input(&self, input: Option<String>) -> LifecycleResult<StreamId> {
        let record = StreamRecord::new_pending(input);
        self.store.insert_stream(&record).await?;
        info!(stream_id = %record.id, "Stream created");
        Ok(record.id)
    }

    /// Claim the stream for driving: `pending -> streaming`.
    ///
    /// Exactly one caller succeeds per stream; every other caller gets
    /// `AlreadyDriven` with the status it observed.
    pub async fn begin_drive(&self, id: &StreamId) -> LifecycleResult<DriveToken> {
        let fence = Uuid::new_v4().simple().to_string();

        match self
            .store
            .compare_and_set_status(
                id,
                &[StreamStatus::Pending],
                StreamStatus::Streaming,
                Some(&fence),
            )
            .await?
        {
            CasOutcome::Applied { .. } => {
                info!(stream_id = %id, "Drive started");
                Ok(DriveToken {
                    stream_id: id.clone(),
                    fence,
                })
            }
            CasOutcome::Conflict { current } => {
                debug!(stream_id = %id, status = %current, "Drive rejected");
                Err(LifecycleError::AlreadyDriven {
                    stream_id: id.clone(),
                    status: current,
                })
            }
        }
    }

    /// Move a `streaming` stream to a terminal status.
    ///
    /// Returns the status the stream holds afterwards. If the stream is
    /// already terminal nothing changes and the existing status is returned.
    pub async fn finalize(
        &self,
        id: &StreamId,
        outcome: StreamStatus,
    ) -> LifecycleResult<StreamStatus> {
        if !outcome.is_terminal() {
            return Err(LifecycleError::InvalidTransition {
                stream_id: id.clone(),
                from: StreamStatus::Streaming,
                to: outcome,
            });
        }

        match self
            .store
            .compare_and_set_status(id, &[StreamStatus::Streaming], outcome, None)
            .await?
        {
            CasOutcome::Applied { .. } => {
                info!(stream_id = %id, status = %outcome, "Stream finalized");
                Ok(outcome)
            }
            CasOutcome::Conflict { current } if current.is_terminal() => {
                debug!(
                    stream_id = %id,
                    status = %current,
                    requested = %outcome,
                    "Stream already finalized"
                );
                Ok(current)
            }
            CasOutcome::Conflict { current } => Err(LifecycleError::InvalidTransition {
                stream_id: id.clone(),
                from: current,
                to: outcome,
            }),
        }
    }

    pub async fn status(&self, id: &StreamId) -> LifecycleResult<StreamStatus> {
        Ok(self.store.get_stream(id).await?.status)
    }
}
