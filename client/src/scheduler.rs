// Deferred and recurring calls on a task queue
//
// One-shot tasks: register once, then snapshot, allocate, build and submit in
// a loop bounded by the retry policy. A submission losing its slot to another
// caller is a contention error and starts a new attempt from a fresh snapshot.
//
// Recurring tasks: a cron job is looked up by name and created in a single
// transaction when absent. A losing concurrent creator observes the winner's
// name record and returns the same job.

use log::{debug, info, warn};
use std::sync::Arc;
use tasklane_common::{
    account::{CronJobNameMappingV0, CronJobV0, UserCronJobsV0},
    config::{DEFAULT_CRON_SCHEDULE, MAX_CRON_NAME_LEN},
    crypto::{Pubkey, Signature},
    derive::{
        cron_job_name_mapping_key, cron_job_transaction_key, program_queue_authority_key,
        task_queue_authority_key, user_cron_jobs_key,
    },
    program::{
        cron::{add_cron_transaction_v0, initialize_cron_job_v0},
        queue::queue_task_v0,
    },
    transaction::{
        compile_transaction, system_transfer, AccountMeta, AddCronTransactionArgsV0,
        CompiledTransactionV0, InitializeCronJobArgsV0, Instruction, QueueTaskArgsV0, RejectionKind,
        TransactionSourceV0, TriggerV0,
    },
};

use crate::{
    allocator::{Allocation, QueueSlotAllocator},
    config::ClientConfig,
    error::{ClientError, LedgerError},
    ledger::{fetch, Ledger},
    registrar::AuthorityRegistrar,
    retry::RetryPolicy,
    signer::Signer,
};

/// Instructions run by the cranker, with the seeds of the derived signers the
/// queue program signs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPayload {
    pub instructions: Vec<Instruction>,
    pub signer_seeds: Vec<Vec<Vec<u8>>>,
}

impl CompiledPayload {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            signer_seeds: Vec::new(),
        }
    }

    pub fn with_signer_seeds(mut self, signer_seeds: Vec<Vec<Vec<u8>>>) -> Self {
        self.signer_seeds = signer_seeds;
        self
    }

    pub fn compile(&self) -> Result<(CompiledTransactionV0, Vec<AccountMeta>), ClientError> {
        Ok(compile_transaction(
            self.instructions.clone(),
            self.signer_seeds.clone(),
        )?)
    }
}

/// Everything a program needs to queue a task through its own instruction.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleContext {
    pub payer: Pubkey,
    pub queue: Pubkey,
    pub queue_authority: Pubkey,
    pub task_queue_authority: Pubkey,
    pub slot: u16,
    pub task: Pubkey,
}

/// A program that queues tasks itself, signing with a derived queue authority.
pub trait ProgramSchedule: Send + Sync {
    fn program_id(&self) -> Pubkey;

    fn queue_authority(&self) -> Result<Pubkey, ClientError> {
        Ok(program_queue_authority_key(&self.program_id())?.0)
    }

    // The program call queueing a task in `context.slot`
    fn build(&self, context: &ScheduleContext) -> Result<Vec<Instruction>, ClientError>;
}

#[derive(Clone)]
pub enum Payload {
    // queued directly, the caller is the queue authority
    Compiled(CompiledPayload),
    // queued by a program call
    Program(Arc<dyn ProgramSchedule>),
}

impl From<CompiledPayload> for Payload {
    fn from(payload: CompiledPayload) -> Self {
        Self::Compiled(payload)
    }
}

#[derive(Clone)]
pub struct TaskRequest {
    pub payload: Payload,
    pub trigger: TriggerV0,
    pub crank_reward: Option<u64>,
    pub free_tasks: u8,
    pub description: String,
}

impl TaskRequest {
    pub fn new(payload: impl Into<Payload>, trigger: TriggerV0) -> Self {
        Self {
            payload: payload.into(),
            trigger,
            crank_reward: None,
            free_tasks: 0,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_crank_reward(mut self, crank_reward: u64) -> Self {
        self.crank_reward = Some(crank_reward);
        self
    }

    pub fn with_free_tasks(mut self, free_tasks: u8) -> Self {
        self.free_tasks = free_tasks;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle {
    pub queue: Pubkey,
    pub task: Pubkey,
    pub slot: u16,
    pub queue_authority: Pubkey,
    pub trigger: TriggerV0,
    pub signature: Signature,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronJobHandle {
    pub address: Pubkey,
    pub name: String,
    pub name_mapping: Pubkey,
    pub id: u32,
    // false when an existing job was reused
    pub created: bool,
    pub signature: Option<Signature>,
    pub usable: bool,
}

impl CronJobHandle {
    pub fn transaction_address(&self, index: u32) -> Result<Pubkey, ClientError> {
        Ok(cron_job_transaction_key(&self.address, index)?)
    }
}

#[derive(Debug, Clone)]
pub struct CronRequest {
    pub name: String,
    pub schedule: String,
    pub payload: CompiledPayload,
    pub free_tasks_per_transaction: u8,
    pub num_tasks_per_queue_call: u8,
}

impl CronRequest {
    pub fn new(name: impl Into<String>, schedule: impl Into<String>, payload: CompiledPayload) -> Self {
        Self {
            name: name.into(),
            schedule: schedule.into(),
            payload,
            free_tasks_per_transaction: 0,
            num_tasks_per_queue_call: 1,
        }
    }

    // Every minute
    pub fn every_minute(name: impl Into<String>, payload: CompiledPayload) -> Self {
        Self::new(name, DEFAULT_CRON_SCHEDULE, payload)
    }
}

pub fn validate_cron_name(name: &str) -> Result<(), ClientError> {
    let reason = if name.is_empty() {
        "empty"
    } else if name.len() > MAX_CRON_NAME_LEN {
        "longer than 32 bytes"
    } else {
        return Ok(());
    };
    Err(ClientError::InvalidCronName {
        name: name.to_string(),
        reason,
    })
}

pub struct TaskScheduler {
    ledger: Arc<dyn Ledger>,
    signer: Arc<dyn Signer>,
    allocator: QueueSlotAllocator,
    registrar: AuthorityRegistrar,
    retry: RetryPolicy,
    crank_reward: u64,
    cron_funding: u64,
}

impl TaskScheduler {
    pub fn new(ledger: Arc<dyn Ledger>, signer: Arc<dyn Signer>, config: &ClientConfig) -> Self {
        Self {
            allocator: QueueSlotAllocator::new(Arc::clone(&ledger), config.capacity_increment),
            registrar: AuthorityRegistrar::new(Arc::clone(&ledger)),
            ledger,
            signer,
            retry: config.retry,
            crank_reward: config.crank_reward,
            cron_funding: config.cron_funding,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn allocator(&self) -> &QueueSlotAllocator {
        &self.allocator
    }

    pub fn registrar(&self) -> &AuthorityRegistrar {
        &self.registrar
    }

    /// Queue `payload` to run once `trigger` holds.
    pub async fn schedule_once(
        &self,
        queue: &Pubkey,
        payload: impl Into<Payload>,
        trigger: TriggerV0,
    ) -> Result<TaskHandle, ClientError> {
        self.schedule(queue, &TaskRequest::new(payload, trigger)).await
    }

    pub async fn schedule(&self, queue: &Pubkey, request: &TaskRequest) -> Result<TaskHandle, ClientError> {
        let queue_authority = match &request.payload {
            Payload::Compiled(_) => self.signer.pubkey(),
            Payload::Program(program) => program.queue_authority()?,
        };

        self.registrar
            .ensure_registered(queue, &queue_authority, self.signer.as_ref())
            .await?;

        let handle = self
            .retry
            .run("schedule task", |attempt| {
                self.try_schedule(queue, &queue_authority, request, attempt)
            })
            .await?;

        info!(
            "Task {} queued in slot {} of {} after {} attempt(s)",
            handle.task, handle.slot, queue, handle.attempts
        );
        Ok(handle)
    }

    async fn try_schedule(
        &self,
        queue: &Pubkey,
        queue_authority: &Pubkey,
        request: &TaskRequest,
        attempt: u32,
    ) -> Result<TaskHandle, ClientError> {
        let Allocation { slot, task, .. } = self.allocator.allocate(queue, self.signer.as_ref()).await?;
        let payer = self.signer.pubkey();

        let instructions = match &request.payload {
            Payload::Compiled(payload) => {
                let (compiled, remaining) = payload.compile()?;
                let args = QueueTaskArgsV0 {
                    id: slot,
                    trigger: request.trigger,
                    transaction: TransactionSourceV0::CompiledV0(compiled),
                    crank_reward: Some(request.crank_reward.unwrap_or(self.crank_reward)),
                    free_tasks: request.free_tasks,
                    description: request.description.clone(),
                };
                vec![queue_task_v0(&payer, queue_authority, queue, &args, remaining)?]
            }
            Payload::Program(program) => {
                let context = ScheduleContext {
                    payer,
                    queue: *queue,
                    queue_authority: *queue_authority,
                    task_queue_authority: task_queue_authority_key(queue, queue_authority)?,
                    slot,
                    task,
                };
                program.build(&context)?
            }
        };

        debug!("submitting task {} in slot {} of {}", task, slot, queue);
        match self.ledger.submit(instructions, self.signer.as_ref()).await {
            Ok(signature) => Ok(TaskHandle {
                queue: *queue,
                task,
                slot,
                queue_authority: *queue_authority,
                trigger: request.trigger,
                signature,
                attempts: attempt,
            }),
            Err(e) if e.is_conflict() => Err(ClientError::SlotTaken { queue: *queue, slot }),
            Err(e) if is_unregistered(&e) => Err(ClientError::AuthorityNotRegistered {
                queue: *queue,
                queue_authority: *queue_authority,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Find the cron job called `request.name`, or create it.
    ///
    /// Creation initializes the job, funds it and adds its transaction 0 in a
    /// single transaction, so a job is never observed half built.
    pub async fn schedule_recurring(&self, queue: &Pubkey, request: &CronRequest) -> Result<CronJobHandle, ClientError> {
        validate_cron_name(&request.name)?;
        self.retry
            .run("schedule recurring task", |_| self.try_schedule_recurring(queue, request))
            .await
    }

    pub async fn find_cron_job(&self, name: &str) -> Result<Option<CronJobHandle>, ClientError> {
        let authority = self.signer.pubkey();
        let name_mapping = cron_job_name_mapping_key(&authority, name)?;
        let Some(mapping) = fetch::<CronJobNameMappingV0>(self.ledger.as_ref(), &name_mapping).await? else {
            return Ok(None);
        };

        let job = fetch::<CronJobV0>(self.ledger.as_ref(), &mapping.cron_job)
            .await?
            .ok_or(ClientError::AccountNotFound(mapping.cron_job))?;
        Ok(Some(CronJobHandle {
            address: mapping.cron_job,
            name: mapping.name,
            name_mapping,
            id: job.id,
            created: false,
            signature: None,
            usable: job.is_usable(),
        }))
    }

    async fn try_schedule_recurring(&self, queue: &Pubkey, request: &CronRequest) -> Result<CronJobHandle, ClientError> {
        if let Some(existing) = self.find_cron_job(&request.name).await? {
            if !existing.usable {
                warn!("cron job '{}' at {} has no transaction yet", existing.name, existing.address);
            }
            debug!("reusing cron job '{}' at {}", existing.name, existing.address);
            return Ok(existing);
        }

        let authority = self.signer.pubkey();
        let counter_key = user_cron_jobs_key(&authority)?;
        let next_id = fetch::<UserCronJobsV0>(self.ledger.as_ref(), &counter_key)
            .await?
            .map(|counter| counter.next_cron_job_id)
            .unwrap_or(0);

        let (compiled, remaining) = request.payload.compile()?;
        let args = InitializeCronJobArgsV0 {
            schedule: request.schedule.clone(),
            name: request.name.clone(),
            free_tasks_per_transaction: request.free_tasks_per_transaction,
            num_tasks_per_queue_call: request.num_tasks_per_queue_call,
        };
        let (initialize, cron_job) = initialize_cron_job_v0(&authority, &authority, next_id, queue, &args)?;
        let add_transaction = add_cron_transaction_v0(
            &authority,
            &authority,
            &cron_job,
            &AddCronTransactionArgsV0 {
                index: 0,
                transaction_source: TransactionSourceV0::CompiledV0(compiled),
            },
            remaining,
        )?;
        let instructions = vec![
            initialize,
            system_transfer(&authority, &cron_job, self.cron_funding),
            add_transaction,
        ];

        info!("Creating cron job '{}' as {} on {}", request.name, cron_job, queue);
        match self.ledger.submit(instructions, self.signer.as_ref()).await {
            Ok(signature) => {
                info!("Cron job '{}' created in {}", request.name, signature);
                Ok(CronJobHandle {
                    address: cron_job,
                    name: request.name.clone(),
                    name_mapping: cron_job_name_mapping_key(&authority, &request.name)?,
                    id: next_id,
                    created: true,
                    signature: Some(signature),
                    usable: true,
                })
            }
            Err(e) if e.rejection_kind().is_some() => {
                // lost against a creator of the same name, or of another job id
                if let Some(winner) = self.find_cron_job(&request.name).await? {
                    debug!("cron job '{}' was created concurrently at {}", request.name, winner.address);
                    return Ok(winner);
                }

                let current = fetch::<UserCronJobsV0>(self.ledger.as_ref(), &counter_key)
                    .await?
                    .map(|counter| counter.next_cron_job_id)
                    .unwrap_or(0);
                if current != next_id {
                    return Err(ClientError::SnapshotStale(format!(
                        "cron job id moved from {} to {}",
                        next_id, current
                    )));
                }
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn is_unregistered(error: &LedgerError) -> bool {
    match error {
        LedgerError::Rejected { kind, message, .. } => {
            *kind == RejectionKind::InsufficientAuthority
                && message.to_lowercase().contains("invalid queue authority")
        }
        LedgerError::Transport(_) => false,
    }
}
