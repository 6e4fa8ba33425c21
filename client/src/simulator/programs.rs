// Built-in programs of the local ledger
//
// They enforce the account constraints the client depends on: seeds, owners,
// signers, slot occupancy and the one record per name or authority rule. Fees,
// rent and lookup tables are not modelled.

use borsh::BorshSerialize;
use log::debug;
use tasklane_common::{
    account::{
        bitmap, AnchorAccount, CronJobNameMappingV0, CronJobTransactionV0, CronJobV0,
        TaskQueueAuthorityV0, TaskQueueV0, TaskV0, UserCronJobsV0,
    },
    config::{
        CRON_JOB_NAME_MAPPING_SEED, CRON_JOB_SEED, CRON_JOB_TRANSACTION_SEED, DELEGATION_PROGRAM_ID,
        MAX_CRON_NAME_LEN, TASK_QUEUE_AUTHORITY_SEED, TASK_SEED,
        TUKTUK_PROGRAM_ID, USER_CRON_JOBS_SEED,
    },
    crypto::{find_program_address, Pubkey},
    program::{
        cron::{ADD_CRON_TRANSACTION, INITIALIZE_CRON_JOB},
        delegation::{decode_delegate, MagicInstruction},
        is_method,
        queue::{ADD_QUEUE_AUTHORITY, QUEUE_TASK, UPDATE_TASK_QUEUE},
    },
    transaction::{
        decode_system_transfer, AddCronTransactionArgsV0, InitializeCronJobArgsV0, Instruction,
        QueueTaskArgsV0, RejectionKind, TransactionSourceV0, UpdateTaskQueueArgsV0,
    },
};

use super::{
    runtime::{account_at, decode_args, not_initialized, rejected, Effect, InvokeContext, ProgramHandler},
    Layer,
};
use crate::error::LedgerError;

fn load<T: AnchorAccount>(ctx: &InvokeContext<'_>, key: &Pubkey) -> Result<T, LedgerError> {
    let account = ctx.account(key).ok_or_else(|| not_initialized(key))?;
    T::decode(&account.data).map_err(|e| {
        rejected(
            RejectionKind::PreconditionUnmet,
            format!("AnchorError caused by account: {}. Error Code: AccountDiscriminatorMismatch. {}", key, e),
        )
    })
}

fn encode<T: AnchorAccount>(value: &T) -> Result<Vec<u8>, LedgerError> {
    value
        .encode()
        .map_err(|e| rejected(RejectionKind::Malformed, e.to_string()))
}

fn store<T: AnchorAccount>(ctx: &mut InvokeContext<'_>, key: &Pubkey, value: &T) -> Result<(), LedgerError> {
    let data = encode(value)?;
    *ctx.data_mut(key)? = data;
    Ok(())
}

fn create<T: AnchorAccount>(ctx: &mut InvokeContext<'_>, key: &Pubkey, value: &T) -> Result<(), LedgerError> {
    let data = encode(value)?;
    ctx.create_account(key, data)
}

fn require_signer(ctx: &InvokeContext<'_>, key: &Pubkey) -> Result<(), LedgerError> {
    if !ctx.is_signer(key) {
        return Err(rejected(
            RejectionKind::InsufficientAuthority,
            format!("AnchorError caused by account: {}. Error Code: ConstraintSigner", key),
        ));
    }
    Ok(())
}

// Check `key` is the canonical address of `seeds` and return its bump
fn require_seeds(key: &Pubkey, seeds: &[&[u8]], program_id: &Pubkey) -> Result<u8, LedgerError> {
    let (expected, bump) = find_program_address(seeds, program_id)
        .map_err(|e| rejected(RejectionKind::PreconditionUnmet, e.to_string()))?;
    if expected != *key {
        return Err(rejected(
            RejectionKind::PreconditionUnmet,
            format!(
                "AnchorError caused by account: {}. Error Code: ConstraintSeeds. Expected {}",
                key, expected
            ),
        ));
    }
    Ok(bump)
}

fn unknown_method() -> LedgerError {
    rejected(
        RejectionKind::Malformed,
        "AnchorError occurred. Error Code: InstructionFallbackNotFound",
    )
}

pub(crate) struct SystemProgram;

impl ProgramHandler for SystemProgram {
    fn process(&self, ctx: &mut InvokeContext<'_>, instruction: &Instruction) -> Result<(), LedgerError> {
        let lamports = decode_system_transfer(instruction).ok_or_else(|| {
            rejected(
                RejectionKind::Malformed,
                "invalid instruction data: only transfers are supported",
            )
        })?;
        let from = account_at(instruction, 0)?;
        let to = account_at(instruction, 1)?;
        ctx.transfer(&from, &to, lamports)
    }
}

// Task queue program serviced by crankers
pub(crate) struct QueueProgram;

impl QueueProgram {
    fn queue_task(&self, ctx: &mut InvokeContext<'_>, instruction: &Instruction) -> Result<(), LedgerError> {
        let payer = account_at(instruction, 0)?;
        let queue_authority = account_at(instruction, 1)?;
        let task_queue = account_at(instruction, 2)?;
        let authority_record = account_at(instruction, 3)?;
        let task = account_at(instruction, 4)?;
        let args: QueueTaskArgsV0 = decode_args(&instruction.data)?;

        require_signer(ctx, &queue_authority)?;
        let mut queue: TaskQueueV0 = load(ctx, &task_queue)?;

        require_seeds(
            &authority_record,
            &[TASK_QUEUE_AUTHORITY_SEED, task_queue.as_ref(), queue_authority.as_ref()],
            ctx.program_id(),
        )?;
        if ctx.account(&authority_record).is_none() {
            return Err(rejected(
                RejectionKind::InsufficientAuthority,
                format!("invalid queue authority {} for task queue {}", queue_authority, task_queue),
            ));
        }

        if args.id >= queue.capacity {
            return Err(rejected(
                RejectionKind::PreconditionUnmet,
                format!("Task id {} is out of range, capacity is {}", args.id, queue.capacity),
            ));
        }

        let bump_seed = require_seeds(
            &task,
            &[TASK_SEED, task_queue.as_ref(), &args.id.to_le_bytes()],
            ctx.program_id(),
        )?;

        if bitmap::is_occupied(&queue.task_bitmap, args.id) {
            return Err(rejected(
                RejectionKind::ResourceConflict,
                format!("task slot taken: {} of {}", args.id, task_queue),
            ));
        }

        // every account of the payload must be passed along
        if let TransactionSourceV0::CompiledV0(compiled) = &args.transaction {
            let passed: Vec<Pubkey> = instruction.accounts.iter().skip(6).map(|meta| meta.pubkey).collect();
            if compiled.accounts.iter().any(|key| !passed.contains(key)) {
                return Err(rejected(RejectionKind::Malformed, "Error Code: NotEnoughAccountKeys"));
            }
        }

        let crank_reward = args.crank_reward.unwrap_or(queue.min_crank_reward);
        if crank_reward < queue.min_crank_reward {
            return Err(rejected(
                RejectionKind::PreconditionUnmet,
                format!(
                    "Crank reward {} is below the queue minimum {}",
                    crank_reward, queue.min_crank_reward
                ),
            ));
        }

        let record = TaskV0 {
            task_queue,
            rent_amount: 0,
            crank_reward,
            id: args.id,
            trigger: args.trigger,
            rent_refund: payer,
            transaction: args.transaction,
            queued_at: ctx.clock(),
            bump_seed,
            free_tasks: args.free_tasks,
            description: args.description,
        };
        create(ctx, &task, &record)?;
        ctx.transfer(&payer, &task, crank_reward)?;

        bitmap::set_occupied(&mut queue.task_bitmap, args.id);
        queue.updated_at = ctx.clock();
        store(ctx, &task_queue, &queue)?;

        ctx.log(format!("queued task {} in slot {}", task, args.id));
        Ok(())
    }

    fn add_queue_authority(&self, ctx: &mut InvokeContext<'_>, instruction: &Instruction) -> Result<(), LedgerError> {
        let queue_authority = account_at(instruction, 1)?;
        let authority_record = account_at(instruction, 2)?;
        let task_queue = account_at(instruction, 3)?;

        let mut queue: TaskQueueV0 = load(ctx, &task_queue)?;
        let bump_seed = require_seeds(
            &authority_record,
            &[TASK_QUEUE_AUTHORITY_SEED, task_queue.as_ref(), queue_authority.as_ref()],
            ctx.program_id(),
        )?;

        let record = TaskQueueAuthorityV0 {
            task_queue,
            queue_authority,
            bump_seed,
        };
        create(ctx, &authority_record, &record)?;

        queue.num_queue_authorities = queue.num_queue_authorities.saturating_add(1);
        store(ctx, &task_queue, &queue)
    }

    fn update_task_queue(&self, ctx: &mut InvokeContext<'_>, instruction: &Instruction) -> Result<(), LedgerError> {
        let update_authority = account_at(instruction, 1)?;
        let task_queue = account_at(instruction, 2)?;
        let args: UpdateTaskQueueArgsV0 = decode_args(&instruction.data)?;

        require_signer(ctx, &update_authority)?;
        let mut queue: TaskQueueV0 = load(ctx, &task_queue)?;
        if queue.update_authority != update_authority {
            return Err(rejected(
                RejectionKind::InsufficientAuthority,
                format!("AnchorError caused by account: {}. Error Code: ConstraintHasOne", task_queue),
            ));
        }

        if let Some(capacity) = args.capacity {
            if capacity < queue.capacity {
                return Err(rejected(
                    RejectionKind::PreconditionUnmet,
                    format!("Capacity cannot shrink from {} to {}", queue.capacity, capacity),
                ));
            }
            queue.capacity = capacity;
            queue.task_bitmap.resize(bitmap::bitmap_len(capacity), 0);
        }
        if let Some(min_crank_reward) = args.min_crank_reward {
            queue.min_crank_reward = min_crank_reward;
        }
        if let Some(lookup_tables) = args.lookup_tables {
            queue.lookup_tables = lookup_tables;
        }
        if let Some(authority) = args.update_authority {
            queue.update_authority = authority;
        }
        if let Some(age) = args.stale_task_age {
            queue.stale_task_age = age;
        }
        queue.updated_at = ctx.clock();

        store(ctx, &task_queue, &queue)
    }
}

impl ProgramHandler for QueueProgram {
    fn process(&self, ctx: &mut InvokeContext<'_>, instruction: &Instruction) -> Result<(), LedgerError> {
        if is_method(&instruction.data, QUEUE_TASK) {
            self.queue_task(ctx, instruction)
        } else if is_method(&instruction.data, ADD_QUEUE_AUTHORITY) {
            self.add_queue_authority(ctx, instruction)
        } else if is_method(&instruction.data, UPDATE_TASK_QUEUE) {
            self.update_task_queue(ctx, instruction)
        } else {
            Err(unknown_method())
        }
    }

    fn deployed_on(&self, layer: Layer) -> bool {
        layer == Layer::Base
    }
}

// Second minute hour day month weekday, optionally a year
pub(crate) fn is_valid_schedule(schedule: &str) -> bool {
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    (6..=7).contains(&fields.len())
        && fields.iter().all(|field| {
            field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '/' | ',' | '-' | '?' | '#'))
        })
}

pub(crate) struct CronProgram;

impl CronProgram {
    fn initialize(&self, ctx: &mut InvokeContext<'_>, instruction: &Instruction) -> Result<(), LedgerError> {
        let authority = account_at(instruction, 1)?;
        let user_cron_jobs = account_at(instruction, 2)?;
        let cron_job = account_at(instruction, 3)?;
        let name_mapping = account_at(instruction, 4)?;
        let task_queue = account_at(instruction, 5)?;
        let args: InitializeCronJobArgsV0 = decode_args(&instruction.data)?;

        require_signer(ctx, &authority)?;
        if args.name.is_empty() || args.name.len() > MAX_CRON_NAME_LEN {
            return Err(rejected(
                RejectionKind::PreconditionUnmet,
                format!("Cron job name must be 1 to {} bytes long", MAX_CRON_NAME_LEN),
            ));
        }

        let mapping_bump = require_seeds(
            &name_mapping,
            &[CRON_JOB_NAME_MAPPING_SEED, authority.as_ref(), args.name.as_bytes()],
            ctx.program_id(),
        )?;
        // a taken name is reported before anything else
        if ctx.account(&name_mapping).is_some() {
            return Err(rejected(
                RejectionKind::ResourceConflict,
                format!("Allocate: account Address {{ address: {}, base: None }} already in use", name_mapping),
            ));
        }

        if !is_valid_schedule(&args.schedule) {
            return Err(rejected(
                RejectionKind::PreconditionUnmet,
                format!("Error Code: InvalidSchedule. '{}'", args.schedule),
            ));
        }

        if ctx.account(&task_queue).map(|a| a.owner) != Some(*TUKTUK_PROGRAM_ID) {
            return Err(not_initialized(&task_queue));
        }

        let counter_bump = require_seeds(
            &user_cron_jobs,
            &[USER_CRON_JOBS_SEED, authority.as_ref()],
            ctx.program_id(),
        )?;
        let mut counter = if ctx.account(&user_cron_jobs).is_some() {
            load::<UserCronJobsV0>(ctx, &user_cron_jobs)?
        } else {
            let counter = UserCronJobsV0 {
                authority,
                min_cron_job_id: 0,
                next_cron_job_id: 0,
                bump_seed: counter_bump,
            };
            create(ctx, &user_cron_jobs, &counter)?;
            counter
        };

        let id = counter.next_cron_job_id;
        let job_bump = require_seeds(
            &cron_job,
            &[CRON_JOB_SEED, authority.as_ref(), &id.to_le_bytes()],
            ctx.program_id(),
        )?;

        let job = CronJobV0 {
            id,
            user_cron_jobs,
            task_queue,
            authority,
            free_tasks_per_transaction: args.free_tasks_per_transaction,
            num_tasks_per_queue_call: args.num_tasks_per_queue_call,
            schedule: args.schedule,
            name: args.name.clone(),
            current_exec_ts: ctx.clock(),
            current_transaction_id: 0,
            num_transactions: 0,
            next_transaction_id: 0,
            removed_from_queue: false,
            bump_seed: job_bump,
        };
        create(ctx, &cron_job, &job)?;

        let mapping = CronJobNameMappingV0 {
            cron_job,
            name: args.name,
            bump_seed: mapping_bump,
        };
        create(ctx, &name_mapping, &mapping)?;

        counter.next_cron_job_id += 1;
        store(ctx, &user_cron_jobs, &counter)
    }

    fn add_transaction(&self, ctx: &mut InvokeContext<'_>, instruction: &Instruction) -> Result<(), LedgerError> {
        let authority = account_at(instruction, 1)?;
        let cron_job = account_at(instruction, 2)?;
        let transaction = account_at(instruction, 3)?;
        let args: AddCronTransactionArgsV0 = decode_args(&instruction.data)?;

        require_signer(ctx, &authority)?;
        let mut job: CronJobV0 = load(ctx, &cron_job)?;
        if job.authority != authority {
            return Err(rejected(
                RejectionKind::InsufficientAuthority,
                format!("AnchorError caused by account: {}. Error Code: ConstraintHasOne", cron_job),
            ));
        }

        let bump_seed = require_seeds(
            &transaction,
            &[CRON_JOB_TRANSACTION_SEED, cron_job.as_ref(), &args.index.to_le_bytes()],
            ctx.program_id(),
        )?;
        let record = CronJobTransactionV0 {
            id: args.index,
            cron_job,
            transaction: args.transaction_source,
            bump_seed,
        };
        create(ctx, &transaction, &record)?;

        job.num_transactions += 1;
        job.next_transaction_id = job.next_transaction_id.max(args.index + 1);
        store(ctx, &cron_job, &job)
    }
}

impl ProgramHandler for CronProgram {
    fn process(&self, ctx: &mut InvokeContext<'_>, instruction: &Instruction) -> Result<(), LedgerError> {
        if is_method(&instruction.data, INITIALIZE_CRON_JOB) {
            self.initialize(ctx, instruction)
        } else if is_method(&instruction.data, ADD_CRON_TRANSACTION) {
            self.add_transaction(ctx, instruction)
        } else {
            Err(unknown_method())
        }
    }

    fn deployed_on(&self, layer: Layer) -> bool {
        layer == Layer::Base
    }
}

#[derive(BorshSerialize)]
struct DelegationRecord {
    owner_program: Pubkey,
    validator: Option<Pubkey>,
    commit_frequency_ms: u32,
}

// Takes ownership of accounts handed to the rollup
pub(crate) struct DelegationProgram;

impl ProgramHandler for DelegationProgram {
    fn process(&self, ctx: &mut InvokeContext<'_>, instruction: &Instruction) -> Result<(), LedgerError> {
        let args = decode_delegate(instruction)
            .ok_or_else(|| rejected(RejectionKind::Malformed, "invalid instruction data"))?;
        let delegated = account_at(instruction, 1)?;
        let owner_program = account_at(instruction, 2)?;
        let record = account_at(instruction, 4)?;
        let metadata = account_at(instruction, 5)?;

        let owner = ctx
            .account(&delegated)
            .map(|account| account.owner)
            .ok_or_else(|| not_initialized(&delegated))?;
        if owner == *DELEGATION_PROGRAM_ID || ctx.account(&record).is_some() {
            return Err(rejected(
                RejectionKind::ResourceConflict,
                format!("Account {} is already delegated", delegated),
            ));
        }

        if ctx.caller() != Some(&owner_program) || owner != owner_program {
            return Err(rejected(
                RejectionKind::InsufficientAuthority,
                format!("Unauthorized: {} can only be delegated by its owner program {}", delegated, owner),
            ));
        }

        require_signer(ctx, &delegated)?;

        let data = borsh::to_vec(&DelegationRecord {
            owner_program,
            validator: args.validator,
            commit_frequency_ms: args.commit_frequency_ms,
        })
        .map_err(|e| rejected(RejectionKind::Malformed, e.to_string()))?;
        ctx.create_account(&record, data)?;
        ctx.create_account(&metadata, Vec::new())?;
        ctx.set_owner(&delegated, *DELEGATION_PROGRAM_ID)?;

        debug!("delegating {} of {}", delegated, owner_program);
        ctx.push_effect(Effect::Delegated {
            account: delegated,
            owner_program,
            validator: args.validator,
        });
        Ok(())
    }

    fn deployed_on(&self, layer: Layer) -> bool {
        layer == Layer::Base
    }
}

// Schedules commits of rollup state to the base ledger
pub(crate) struct MagicProgram;

impl ProgramHandler for MagicProgram {
    fn process(&self, ctx: &mut InvokeContext<'_>, instruction: &Instruction) -> Result<(), LedgerError> {
        let kind = MagicInstruction::decode(instruction)
            .ok_or_else(|| rejected(RejectionKind::Malformed, "invalid instruction data"))?;
        if instruction.accounts.len() < 3 {
            return Err(rejected(RejectionKind::Malformed, "Error Code: NotEnoughAccountKeys"));
        }

        for meta in instruction.accounts.iter().skip(2) {
            let account = meta.pubkey;
            let delegation = ctx.delegation(&account).ok_or_else(|| {
                rejected(
                    RejectionKind::PreconditionUnmet,
                    format!("Account {} is not delegated", account),
                )
            })?;
            if delegation.undelegating {
                return Err(rejected(
                    RejectionKind::PreconditionUnmet,
                    format!("Account {} is already being undelegated", account),
                ));
            }
            if ctx.caller() != Some(&delegation.owner_program) {
                return Err(rejected(
                    RejectionKind::InsufficientAuthority,
                    format!("Unauthorized: only {} can commit {}", delegation.owner_program, account),
                ));
            }

            ctx.push_effect(Effect::ScheduleCommit {
                account,
                undelegate: kind.undelegates(),
            });
        }

        Ok(())
    }

    fn deployed_on(&self, layer: Layer) -> bool {
        layer == Layer::Rollup
    }
}
