// Shared fixtures of the integration tests: a local cluster with a task queue,
// and two small programs deployed on it.
#![allow(dead_code)]

use borsh::{BorshDeserialize, BorshSerialize};
use std::{sync::Arc, time::Duration};

use tasklane_client::{
    config::ClientConfig,
    delegation::DelegateIxArgs,
    error::{ClientError, LedgerError},
    scheduler::{ProgramSchedule, ScheduleContext, TaskScheduler},
    signer::{Keypair, Signer},
    simulator::{InvokeContext, LocalLedger, ProgramHandler},
    watcher::CompletionWatcher,
    RetryPolicy,
};
use tasklane_common::{
    account::Account,
    config::{LAMPORTS_PER_SOL, QUEUE_AUTHORITY_SEED, SYSTEM_PROGRAM_ID, USER_SEED},
    crypto::{find_program_address, Pubkey},
    derive::{escrow_key, program_queue_authority_key, user_state_key},
    program::{
        delegation::{delegate, schedule_commit, schedule_commit_and_undelegate, DelegateArgs},
        is_method, queue::queue_task_v0, split_discriminator,
    },
    transaction::{
        compile_transaction, AccountMeta, Instruction, QueueTaskArgsV0, RejectionKind,
        TransactionSourceV0, TriggerV0,
    },
};

pub const STATE_PROGRAM_ID: Pubkey = Pubkey::new([0x51; 32]);
pub const ESCROW_PROGRAM_ID: Pubkey = Pubkey::new([0x52; 32]);

fn args<T: BorshDeserialize>(instruction: &Instruction) -> Result<T, LedgerError> {
    split_discriminator(&instruction.data)
        .and_then(|(_, mut body)| T::deserialize(&mut body).ok())
        .ok_or_else(|| LedgerError::rejected(RejectionKind::Malformed, "InstructionDidNotDeserialize"))
}

fn key(instruction: &Instruction, index: usize) -> Result<Pubkey, LedgerError> {
    instruction
        .accounts
        .get(index)
        .map(|meta| meta.pubkey)
        .ok_or_else(|| LedgerError::rejected(RejectionKind::Malformed, "NotEnoughAccountKeys"))
}

fn require_signer(ctx: &InvokeContext<'_>, address: &Pubkey) -> Result<(), LedgerError> {
    if ctx.is_signer(address) {
        Ok(())
    } else {
        Err(LedgerError::rejected(
            RejectionKind::InsufficientAuthority,
            format!("{}: missing required signature for instruction", address),
        ))
    }
}

fn build_failed(e: impl ToString) -> LedgerError {
    LedgerError::rejected(RejectionKind::Malformed, e.to_string())
}

#[derive(BorshSerialize, BorshDeserialize)]
pub struct WriteArgs {
    pub value: u64,
}

/// One u64 per user, delegable to the rollup.
pub struct StateProgram;

impl StateProgram {
    pub fn state_of(user: &Pubkey) -> Pubkey {
        user_state_key(&STATE_PROGRAM_ID, user).unwrap()
    }

    pub fn initialize(user: &Pubkey) -> Instruction {
        let accounts = vec![
            AccountMeta::new(*user, true),
            AccountMeta::new(Self::state_of(user), false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ];
        Instruction::anchor(STATE_PROGRAM_ID, "initialize", &(), accounts).unwrap()
    }

    pub fn write(user: &Pubkey, value: u64) -> Instruction {
        let accounts = vec![
            AccountMeta::new(*user, true),
            AccountMeta::new(Self::state_of(user), false),
        ];
        Instruction::anchor(STATE_PROGRAM_ID, "write", &WriteArgs { value }, accounts).unwrap()
    }

    pub fn value(account: &Account) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&account.data[..8]);
        u64::from_le_bytes(bytes)
    }

    fn bump(user: &Pubkey, state: &Pubkey) -> Result<u8, LedgerError> {
        let (expected, bump) = find_program_address(&[USER_SEED, user.as_ref()], &STATE_PROGRAM_ID)
            .map_err(build_failed)?;
        if expected != *state {
            return Err(LedgerError::rejected(
                RejectionKind::PreconditionUnmet,
                format!("AnchorError caused by account: {}. Error Code: ConstraintSeeds", state),
            ));
        }
        Ok(bump)
    }
}

impl ProgramHandler for StateProgram {
    fn process(&self, ctx: &mut InvokeContext<'_>, instruction: &Instruction) -> Result<(), LedgerError> {
        let user = key(instruction, 0)?;
        let state = key(instruction, 1)?;
        require_signer(ctx, &user)?;
        let bump = Self::bump(&user, &state)?;

        if is_method(&instruction.data, "initialize") {
            ctx.create_account(&state, 0u64.to_le_bytes().to_vec())
        } else if is_method(&instruction.data, "write") {
            let WriteArgs { value } = args(instruction)?;
            *ctx.data_mut(&state)? = value.to_le_bytes().to_vec();
            ctx.log(format!("value set to {}", value));
            Ok(())
        } else if is_method(&instruction.data, "delegate") {
            let DelegateIxArgs { validator } = args(instruction)?;
            let seeds = vec![USER_SEED.to_vec(), user.to_bytes().to_vec()];
            let ix = delegate(
                &user,
                &state,
                ctx.program_id(),
                &DelegateArgs {
                    commit_frequency_ms: 30_000,
                    seeds: seeds.clone(),
                    validator,
                },
            )
            .map_err(build_failed)?;
            let mut signer = seeds;
            signer.push(vec![bump]);
            ctx.invoke_signed(ix, vec![signer]);
            Ok(())
        } else if is_method(&instruction.data, "commit") {
            ctx.invoke_signed(schedule_commit(&user, &[state]), Vec::new());
            Ok(())
        } else if is_method(&instruction.data, "undelegate") {
            ctx.invoke_signed(schedule_commit_and_undelegate(&user, &[state]), Vec::new());
            Ok(())
        } else {
            Err(LedgerError::rejected(RejectionKind::Malformed, "InstructionFallbackNotFound"))
        }
    }
}

#[derive(BorshSerialize, BorshDeserialize)]
pub struct OpenArgs {
    pub seed: u64,
    pub amount: u64,
}

#[derive(BorshSerialize, BorshDeserialize)]
pub struct QueueRefundArgs {
    pub task_id: u16,
    pub seed: u64,
}

/// Escrow refunded to its maker by a queued task.
///
/// `queue_refund` queues the refund itself, signing as the program's queue
/// authority.
pub struct EscrowProgram;

impl EscrowProgram {
    pub fn escrow_of(maker: &Pubkey, seed: u64) -> Pubkey {
        escrow_key(&ESCROW_PROGRAM_ID, maker, seed).unwrap()
    }

    pub fn open(maker: &Pubkey, seed: u64, amount: u64) -> Instruction {
        let accounts = vec![
            AccountMeta::new(*maker, true),
            AccountMeta::new(Self::escrow_of(maker, seed), false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ];
        Instruction::anchor(ESCROW_PROGRAM_ID, "open", &OpenArgs { seed, amount }, accounts).unwrap()
    }

    pub fn refund(maker: &Pubkey, seed: u64) -> Instruction {
        let accounts = vec![
            AccountMeta::new(Self::escrow_of(maker, seed), false),
            AccountMeta::new(*maker, false),
        ];
        Instruction::anchor(ESCROW_PROGRAM_ID, "refund", &(), accounts).unwrap()
    }

    fn queue_refund(&self, ctx: &mut InvokeContext<'_>, instruction: &Instruction) -> Result<(), LedgerError> {
        let payer = key(instruction, 0)?;
        let queue_authority = key(instruction, 1)?;
        let queue = key(instruction, 3)?;
        let maker = key(instruction, 6)?;
        let QueueRefundArgs { task_id, seed } = args(instruction)?;

        let (expected, bump) = program_queue_authority_key(&ESCROW_PROGRAM_ID).map_err(build_failed)?;
        if expected != queue_authority {
            return Err(LedgerError::rejected(
                RejectionKind::PreconditionUnmet,
                "Error Code: ConstraintSeeds",
            ));
        }

        let (compiled, remaining) =
            compile_transaction(vec![Self::refund(&maker, seed)], Vec::new()).map_err(build_failed)?;
        let args = QueueTaskArgsV0 {
            id: task_id,
            trigger: TriggerV0::Now,
            transaction: TransactionSourceV0::CompiledV0(compiled),
            crank_reward: None,
            free_tasks: 0,
            description: "refund escrow".to_string(),
        };
        let ix = queue_task_v0(&payer, &queue_authority, &queue, &args, remaining).map_err(build_failed)?;
        ctx.invoke_signed(ix, vec![vec![QUEUE_AUTHORITY_SEED.to_vec(), vec![bump]]]);
        Ok(())
    }
}

impl ProgramHandler for EscrowProgram {
    fn process(&self, ctx: &mut InvokeContext<'_>, instruction: &Instruction) -> Result<(), LedgerError> {
        if is_method(&instruction.data, "open") {
            let maker = key(instruction, 0)?;
            let escrow = key(instruction, 1)?;
            let OpenArgs { seed, amount } = args(instruction)?;
            require_signer(ctx, &maker)?;
            if escrow != Self::escrow_of(&maker, seed) {
                return Err(LedgerError::rejected(
                    RejectionKind::PreconditionUnmet,
                    "Error Code: ConstraintSeeds",
                ));
            }
            ctx.create_account(&escrow, maker.to_bytes().to_vec())?;
            ctx.transfer(&maker, &escrow, amount)
        } else if is_method(&instruction.data, "refund") {
            let escrow = key(instruction, 0)?;
            let maker = key(instruction, 1)?;
            ctx.close_account(&escrow, &maker)
        } else if is_method(&instruction.data, "queue_refund") {
            self.queue_refund(ctx, instruction)
        } else {
            Err(LedgerError::rejected(RejectionKind::Malformed, "InstructionFallbackNotFound"))
        }
    }
}

/// Client side of `EscrowProgram::queue_refund`.
pub struct EscrowRefund {
    pub maker: Pubkey,
    pub seed: u64,
}

impl ProgramSchedule for EscrowRefund {
    fn program_id(&self) -> Pubkey {
        ESCROW_PROGRAM_ID
    }

    fn build(&self, context: &ScheduleContext) -> Result<Vec<Instruction>, ClientError> {
        let accounts = vec![
            AccountMeta::new(context.payer, true),
            AccountMeta::new_readonly(context.queue_authority, false),
            AccountMeta::new_readonly(context.task_queue_authority, false),
            AccountMeta::new(context.queue, false),
            AccountMeta::new(context.task, false),
            AccountMeta::new(escrow_key(&ESCROW_PROGRAM_ID, &self.maker, self.seed)?, false),
            AccountMeta::new(self.maker, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ];
        let args = QueueRefundArgs {
            task_id: context.slot,
            seed: self.seed,
        };
        Ok(vec![Instruction::anchor(
            ESCROW_PROGRAM_ID,
            "queue_refund",
            &args,
            accounts,
        )?])
    }
}

pub struct Harness {
    pub ledger: LocalLedger,
    pub operator: Arc<Keypair>,
    pub queue: Pubkey,
}

impl Harness {
    pub async fn new(capacity: u16, task_bitmap: Vec<u8>) -> Self {
        let ledger = LocalLedger::new();
        ledger.register_program(STATE_PROGRAM_ID, Arc::new(StateProgram)).await;
        ledger.register_program(ESCROW_PROGRAM_ID, Arc::new(EscrowProgram)).await;

        let operator = Arc::new(Keypair::new());
        ledger.fund(&operator.pubkey(), 10 * LAMPORTS_PER_SOL).await;
        let queue = ledger
            .create_task_queue(&operator.pubkey(), capacity, task_bitmap, 0)
            .await;

        Self { ledger, operator, queue }
    }

    pub async fn funded_keypair(&self) -> Arc<Keypair> {
        let keypair = Arc::new(Keypair::new());
        self.ledger.fund(&keypair.pubkey(), 10 * LAMPORTS_PER_SOL).await;
        keypair
    }

    pub fn scheduler(&self, signer: Arc<Keypair>) -> TaskScheduler {
        TaskScheduler::new(Arc::new(self.ledger.clone()), signer, &ClientConfig::default())
            .with_retry(RetryPolicy::fixed(8, Duration::from_millis(1)))
    }

    pub async fn open_escrow(&self, maker: &Keypair, seed: u64, amount: u64) -> Pubkey {
        use tasklane_client::Ledger;
        self.ledger
            .submit(vec![EscrowProgram::open(&maker.pubkey(), seed, amount)], maker)
            .await
            .unwrap();
        EscrowProgram::escrow_of(&maker.pubkey(), seed)
    }
}

pub fn watcher(max_attempts: u32) -> CompletionWatcher {
    CompletionWatcher::new(Duration::from_millis(1), max_attempts)
}
