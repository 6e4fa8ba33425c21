// Free slot selection on a task queue
//
// The allocator only proposes a slot from a snapshot. Two callers can pick the
// same slot, the ledger accepts one of them and the other sees a conflict.

use log::{debug, info, warn};
use std::sync::Arc;
use tasklane_common::{
    account::TaskQueueV0,
    crypto::Pubkey,
    derive::task_key,
    program::queue::update_task_queue_v0,
    transaction::UpdateTaskQueueArgsV0,
};

use crate::{
    error::ClientError,
    ledger::{fetch, Ledger},
    signer::Signer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub slot: u16,
    // address of the task that will occupy the slot
    pub task: Pubkey,
    pub capacity: u16,
    pub resized: bool,
}

pub struct QueueSlotAllocator {
    ledger: Arc<dyn Ledger>,
    capacity_increment: u16,
}

impl QueueSlotAllocator {
    pub fn new(ledger: Arc<dyn Ledger>, capacity_increment: u16) -> Self {
        Self {
            ledger,
            capacity_increment,
        }
    }

    pub fn capacity_increment(&self) -> u16 {
        self.capacity_increment
    }

    pub async fn snapshot(&self, queue: &Pubkey) -> Result<TaskQueueV0, ClientError> {
        let state = fetch::<TaskQueueV0>(self.ledger.as_ref(), queue)
            .await?
            .ok_or(ClientError::QueueNotFound(*queue))?;
        if log::log_enabled!(log::Level::Debug) {
            debug!(
                "task queue {}: {}/{} slots occupied",
                queue,
                state.occupied(),
                state.capacity
            );
        }
        Ok(state)
    }

    /// Pick the lowest free slot of `queue`.
    ///
    /// A full queue gets exactly one resize request, signed by `signer` as the
    /// queue's update authority, before the bitmap is scanned again.
    pub async fn allocate(&self, queue: &Pubkey, signer: &dyn Signer) -> Result<Allocation, ClientError> {
        let state = self.snapshot(queue).await?;
        if let Some(slot) = state.first_free_slot() {
            return self.allocation(queue, slot, state.capacity, false);
        }

        let capacity = state.capacity;
        let requested = capacity.saturating_add(self.capacity_increment);
        let rejected = ClientError::QueueFullResizeRejected {
            queue: *queue,
            capacity,
            requested,
        };
        if requested == capacity {
            warn!("task queue {} is full and cannot grow past {}", queue, capacity);
            return Err(rejected);
        }

        info!("task queue {} is full, resizing from {} to {}", queue, capacity, requested);
        let args = UpdateTaskQueueArgsV0 {
            capacity: Some(requested),
            ..Default::default()
        };
        let payer = signer.pubkey();
        let ix = update_task_queue_v0(&payer, &payer, queue, &args)?;
        match self.ledger.submit(vec![ix], signer).await {
            Ok(signature) => debug!("resize of {} accepted in {}", queue, signature),
            Err(e) if e.rejection_kind().is_some() => {
                warn!("resize of {} rejected: {}", queue, e);
                return Err(self.after_lost_resize(queue, capacity, rejected).await?);
            }
            Err(e) => return Err(e.into()),
        }

        let state = self.snapshot(queue).await?;
        match state.first_free_slot() {
            Some(slot) => self.allocation(queue, slot, state.capacity, true),
            None => {
                warn!("task queue {} is still full after resizing", queue);
                Err(self.after_lost_resize(queue, capacity, rejected).await?)
            }
        }
    }

    // A queue that moved since the snapshot was raced, not exhausted
    async fn after_lost_resize(
        &self,
        queue: &Pubkey,
        capacity: u16,
        rejected: ClientError,
    ) -> Result<ClientError, ClientError> {
        let state = self.snapshot(queue).await?;
        if state.capacity != capacity || state.first_free_slot().is_some() {
            return Ok(ClientError::SnapshotStale(format!(
                "task queue {} moved from capacity {} to {} while resizing",
                queue, capacity, state.capacity
            )));
        }
        Ok(rejected)
    }

    fn allocation(&self, queue: &Pubkey, slot: u16, capacity: u16, resized: bool) -> Result<Allocation, ClientError> {
        let task = task_key(queue, slot)?;
        debug!("proposing slot {} of {} for task {}", slot, queue, task);
        Ok(Allocation {
            slot,
            task,
            capacity,
            resized,
        })
    }
}
