// In-memory base ledger and rollup
//
// `LocalLedger` implements `Ledger` over a shared cluster holding both layers,
// so the client can be exercised without a validator. Submissions are atomic and
// serialized by a single lock, every ledger call first yields to the scheduler so
// concurrent callers interleave between their reads and their writes.
//
// Scheduled commits land on the base ledger `commit_latency` ledger calls after
// the rollup transaction that scheduled them, or on `settle`.

mod programs;
mod runtime;

pub use runtime::{InvokeContext, ProgramHandler};

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use log::{debug, info, trace, warn};
use tokio::sync::Mutex;

use tasklane_common::{
    account::{bitmap, Account, AnchorAccount, TaskQueueV0, TaskV0},
    config::{
        CRON_PROGRAM_ID, DELEGATION_PROGRAM_ID, MAGIC_PROGRAM_ID, SYSTEM_PROGRAM_ID,
        TUKTUK_PROGRAM_ID,
    },
    crypto::{create_program_address, hashv, Hash, Pubkey, Signature},
    derive::{delegation_metadata_key, delegation_record_key, task_key},
    program::is_method,
    time::{get_current_time_in_seconds, UnixTimestamp},
    transaction::{
        AccountMeta, CompiledTransactionV0, Instruction, Message, RejectionKind,
        TransactionSourceV0,
    },
};

use crate::{error::LedgerError, signer::Signer};
use programs::{CronProgram, DelegationProgram, MagicProgram, QueueProgram, SystemProgram};
use runtime::{Delegation, Effect, Environment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Base,
    Rollup,
}

// One transaction as seen by the ledger, accepted or not
#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    pub layer: Layer,
    pub signature: Signature,
    pub payer: Pubkey,
    pub instructions: Vec<Instruction>,
    pub error: Option<(RejectionKind, String)>,
}

impl SubmissionRecord {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// Result of one task run by `crank`
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub slot: u16,
    pub task: Pubkey,
    pub result: Result<Signature, (RejectionKind, String)>,
}

#[derive(Debug, Clone)]
struct PendingCommit {
    rollup_signature: Signature,
    // account, committed data, hand back to the owner program
    accounts: Vec<(Pubkey, Vec<u8>, bool)>,
    ready_at: u64,
}

struct Cluster {
    base: HashMap<Pubkey, Account>,
    rollup: HashMap<Pubkey, Account>,
    delegations: HashMap<Pubkey, Delegation>,
    pending: Vec<PendingCommit>,
    commitments: HashMap<Signature, Signature>,
    programs: HashMap<Pubkey, Arc<dyn ProgramHandler>>,
    logs: HashMap<Signature, Vec<String>>,
    history: Vec<SubmissionRecord>,
    clock: UnixTimestamp,
    tick: u64,
    commit_latency: u64,
    sequence: u64,
}

impl Cluster {
    fn new() -> Self {
        let mut programs: HashMap<Pubkey, Arc<dyn ProgramHandler>> = HashMap::new();
        programs.insert(SYSTEM_PROGRAM_ID, Arc::new(SystemProgram));
        programs.insert(*TUKTUK_PROGRAM_ID, Arc::new(QueueProgram));
        programs.insert(*CRON_PROGRAM_ID, Arc::new(CronProgram));
        programs.insert(*DELEGATION_PROGRAM_ID, Arc::new(DelegationProgram));
        programs.insert(*MAGIC_PROGRAM_ID, Arc::new(MagicProgram));

        Self {
            base: HashMap::new(),
            rollup: HashMap::new(),
            delegations: HashMap::new(),
            pending: Vec::new(),
            commitments: HashMap::new(),
            programs,
            logs: HashMap::new(),
            history: Vec::new(),
            clock: get_current_time_in_seconds(),
            tick: 0,
            commit_latency: 2,
            sequence: 0,
        }
    }

    fn accounts(&self, layer: Layer) -> &HashMap<Pubkey, Account> {
        match layer {
            Layer::Base => &self.base,
            Layer::Rollup => &self.rollup,
        }
    }

    fn accounts_mut(&mut self, layer: Layer) -> &mut HashMap<Pubkey, Account> {
        match layer {
            Layer::Base => &mut self.base,
            Layer::Rollup => &mut self.rollup,
        }
    }

    fn next_blockhash(&mut self) -> Hash {
        self.sequence += 1;
        hashv(&[b"blockhash", &self.sequence.to_le_bytes()])
    }

    // Deterministic signature for transactions produced by the ledger itself
    fn ledger_signature(&mut self, label: &[u8]) -> Signature {
        self.sequence += 1;
        let sequence = self.sequence.to_le_bytes();
        let first = hashv(&[label, &sequence, b"0"]);
        let second = hashv(&[label, &sequence, b"1"]);
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(first.as_bytes());
        bytes[32..].copy_from_slice(second.as_bytes());
        Signature::new(bytes)
    }

    fn advance(&mut self) {
        self.tick += 1;
        let tick = self.tick;
        let (due, waiting): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.pending).into_iter().partition(|c| c.ready_at <= tick);
        self.pending = waiting;
        for commit in due {
            self.apply_commit(commit);
        }
    }

    fn settle(&mut self) {
        for commit in std::mem::take(&mut self.pending) {
            self.apply_commit(commit);
        }
    }

    fn apply_commit(&mut self, commit: PendingCommit) {
        let signature = self.ledger_signature(b"commit");
        let mut logs = Vec::new();
        for (key, data, undelegate) in commit.accounts {
            if let Some(account) = self.base.get_mut(&key) {
                account.data = data;
            }
            logs.push(format!("Committed {}", key));

            if undelegate {
                if let Some(delegation) = self.delegations.remove(&key) {
                    if let Some(account) = self.base.get_mut(&key) {
                        account.owner = delegation.owner_program;
                    }
                    for record in [delegation_record_key(&key), delegation_metadata_key(&key)]
                        .into_iter()
                        .flatten()
                    {
                        self.base.remove(&record);
                    }
                    self.rollup.remove(&key);
                    logs.push(format!("Undelegated {} back to {}", key, delegation.owner_program));
                }
            }
        }

        info!("Commit of {} landed on base as {}", commit.rollup_signature, signature);
        self.logs.insert(signature, logs);
        self.commitments.insert(commit.rollup_signature, signature);
    }

    fn submit(
        &mut self,
        layer: Layer,
        instructions: Vec<Instruction>,
        signer: &dyn Signer,
    ) -> Result<Signature, LedgerError> {
        let payer = signer.pubkey();
        let blockhash = self.next_blockhash();
        let message = Message::new(&instructions, &payer, blockhash)
            .map_err(|e| LedgerError::rejected(RejectionKind::Malformed, e.to_string()))?;
        let signature = signer.sign_message(&message.serialize());

        let result = self.execute(layer, &instructions, &message, &payer, signature);
        self.history.push(SubmissionRecord {
            layer,
            signature,
            payer,
            instructions,
            error: result.as_ref().err().and_then(|e| match e {
                LedgerError::Rejected { kind, message, .. } => Some((*kind, message.clone())),
                LedgerError::Transport(_) => None,
            }),
        });

        match result {
            Ok(()) => {
                debug!("{:?} transaction {} accepted", layer, signature);
                Ok(signature)
            }
            Err(e) => {
                debug!("{:?} transaction {} rejected: {}", layer, signature, e);
                Err(e)
            }
        }
    }

    fn execute(
        &mut self,
        layer: Layer,
        instructions: &[Instruction],
        message: &Message,
        payer: &Pubkey,
        signature: Signature,
    ) -> Result<(), LedgerError> {
        if let Some(missing) = message.signer_keys().iter().find(|key| *key != payer) {
            return Err(LedgerError::rejected(
                RejectionKind::InsufficientAuthority,
                format!("{}: missing required signature for instruction", missing),
            ));
        }

        let signers: HashSet<Pubkey> = [*payer].into_iter().collect();
        let environment = Environment {
            layer,
            clock: self.clock,
            programs: &self.programs,
            delegations: &self.delegations,
        };

        match environment.execute(self.accounts(layer), instructions, &signers) {
            Ok(tx) => {
                self.logs.insert(signature, tx.logs);
                *self.accounts_mut(layer) = tx.accounts;
                self.apply_effects(layer, &tx.touched, tx.effects, signature);
                Ok(())
            }
            Err((error, logs)) => {
                self.logs.insert(signature, logs.clone());
                Err(match error {
                    LedgerError::Rejected { kind, message, .. } => LedgerError::Rejected { kind, message, logs },
                    other => other,
                })
            }
        }
    }

    fn apply_effects(
        &mut self,
        layer: Layer,
        touched: &HashSet<Pubkey>,
        effects: Vec<Effect>,
        signature: Signature,
    ) {
        if layer == Layer::Rollup {
            for key in touched {
                if let Some(delegation) = self.delegations.get_mut(key) {
                    delegation.dirty = true;
                }
            }
        }

        let mut scheduled = Vec::new();
        for effect in effects {
            match effect {
                Effect::Delegated {
                    account,
                    owner_program,
                    validator,
                } => {
                    debug!(
                        "{} delegated by {} to {}",
                        account,
                        owner_program,
                        validator.map_or_else(|| "any validator".to_string(), |v| v.to_string())
                    );
                    if let Some(base) = self.base.get(&account) {
                        let mut copy = base.clone();
                        copy.owner = owner_program;
                        self.rollup.insert(account, copy);
                    }
                    self.delegations.insert(
                        account,
                        Delegation {
                            owner_program,
                            validator,
                            dirty: false,
                            undelegating: false,
                        },
                    );
                }
                Effect::ScheduleCommit { account, undelegate } => {
                    let Some(delegation) = self.delegations.get_mut(&account) else {
                        continue;
                    };
                    // nothing to commit, no base transaction is produced
                    if !delegation.dirty && !undelegate {
                        trace!("{} has no pending change, skipping commit", account);
                        continue;
                    }
                    delegation.dirty = false;
                    delegation.undelegating |= undelegate;
                    let data = self
                        .rollup
                        .get(&account)
                        .map(|a| a.data.clone())
                        .unwrap_or_default();
                    scheduled.push((account, data, undelegate));
                }
            }
        }

        if !scheduled.is_empty() {
            self.pending.push(PendingCommit {
                rollup_signature: signature,
                accounts: scheduled,
                ready_at: self.tick + self.commit_latency,
            });
        }
    }

    // Run every runnable task of `queue`, each in its own transaction
    fn crank(&mut self, queue: &Pubkey, cranker: &Pubkey) -> Result<Vec<TaskRun>, LedgerError> {
        let snapshot = self
            .base
            .get(queue)
            .ok_or_else(|| LedgerError::rejected(RejectionKind::PreconditionUnmet, format!("Task queue {} not found", queue)))?;
        let state = TaskQueueV0::decode(&snapshot.data)
            .map_err(|e| LedgerError::rejected(RejectionKind::PreconditionUnmet, e.to_string()))?;

        let mut runs = Vec::new();
        for slot in 0..state.capacity {
            if !bitmap::is_occupied(&state.task_bitmap, slot) {
                continue;
            }
            let Ok(task_address) = task_key(queue, slot) else {
                continue;
            };
            let Some(task) = self
                .base
                .get(&task_address)
                .and_then(|account| TaskV0::decode(&account.data).ok())
            else {
                continue;
            };
            if !task.is_runnable(self.clock) {
                trace!("task {} of {} is not due yet", slot, queue);
                continue;
            }

            let signature = self.ledger_signature(b"crank");
            let result = self
                .run_task(queue, slot, &task_address, &task, cranker, signature)
                .map(|_| signature)
                .map_err(|e| match e {
                    LedgerError::Rejected { kind, message, .. } => (kind, message),
                    LedgerError::Transport(e) => (RejectionKind::PreconditionUnmet, e.to_string()),
                });
            if let Err((_, message)) = &result {
                warn!("task {} of {} failed: {}", slot, queue, message);
            }
            runs.push(TaskRun {
                slot,
                task: task_address,
                result,
            });
        }

        Ok(runs)
    }

    fn run_task(
        &mut self,
        queue: &Pubkey,
        slot: u16,
        task_address: &Pubkey,
        task: &TaskV0,
        cranker: &Pubkey,
        signature: Signature,
    ) -> Result<(), LedgerError> {
        let TransactionSourceV0::CompiledV0(compiled) = &task.transaction else {
            return Err(LedgerError::rejected(
                RejectionKind::PreconditionUnmet,
                "Remote transactions cannot be fetched by the local ledger",
            ));
        };

        let mut signers: HashSet<Pubkey> = [*cranker].into_iter().collect();
        for seeds in compiled.signer_seeds.iter() {
            let seeds: Vec<&[u8]> = seeds.iter().map(Vec::as_slice).collect();
            let signer = create_program_address(&seeds, &TUKTUK_PROGRAM_ID)
                .map_err(|e| LedgerError::rejected(RejectionKind::Malformed, e.to_string()))?;
            signers.insert(signer);
        }

        let instructions = decompile(compiled)?;
        let environment = Environment {
            layer: Layer::Base,
            clock: self.clock,
            programs: &self.programs,
            delegations: &self.delegations,
        };
        let mut tx = match environment.execute(&self.base, &instructions, &signers) {
            Ok(tx) => tx,
            Err((error, logs)) => {
                self.logs.insert(signature, logs);
                return Err(error);
            }
        };

        // free the slot and pay the cranker out of the task account
        let queue_account = tx
            .accounts
            .get_mut(queue)
            .ok_or_else(|| LedgerError::rejected(RejectionKind::PreconditionUnmet, "Task queue closed while running"))?;
        let mut state = TaskQueueV0::decode(&queue_account.data)
            .map_err(|e| LedgerError::rejected(RejectionKind::PreconditionUnmet, e.to_string()))?;
        bitmap::clear_occupied(&mut state.task_bitmap, slot);
        queue_account.data = state
            .encode()
            .map_err(|e| LedgerError::rejected(RejectionKind::Malformed, e.to_string()))?;
        if let Some(closed) = tx.accounts.remove(task_address) {
            tx.accounts
                .entry(*cranker)
                .or_insert_with(|| Account::new(0, SYSTEM_PROGRAM_ID, Vec::new()))
                .lamports += closed.lamports;
        }

        tx.logs.push(format!("Program log: ran task {} of {}", slot, queue));
        self.logs.insert(signature, tx.logs);
        self.base = tx.accounts;
        self.apply_effects(Layer::Base, &tx.touched, tx.effects, signature);
        info!("Cranked task {} of {} in {}", slot, queue, signature);
        Ok(())
    }
}

// Expand a compiled payload back into instructions
fn decompile(compiled: &CompiledTransactionV0) -> Result<Vec<Instruction>, LedgerError> {
    let signers = compiled.num_rw_signers as usize + compiled.num_ro_signers as usize;
    let key_at = |index: u8| -> Result<AccountMeta, LedgerError> {
        let index = index as usize;
        let pubkey = *compiled
            .accounts
            .get(index)
            .ok_or_else(|| LedgerError::rejected(RejectionKind::Malformed, "Error Code: NotEnoughAccountKeys"))?;
        let is_signer = index < signers;
        let is_writable = index < compiled.num_rw_signers as usize
            || (index >= signers && index < signers + compiled.num_rw as usize);
        Ok(AccountMeta {
            pubkey,
            is_signer,
            is_writable,
        })
    };

    compiled
        .instructions
        .iter()
        .map(|ix| {
            let program_id = key_at(ix.program_id_index)?.pubkey;
            let accounts = ix
                .accounts
                .iter()
                .map(|index| key_at(*index))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Instruction::new(program_id, accounts, ix.data.clone()))
        })
        .collect()
}

/// Handle on one layer of a shared in-memory cluster.
///
/// Clones share the same cluster. `rollup()` gives the other layer.
#[derive(Clone)]
pub struct LocalLedger {
    cluster: Arc<Mutex<Cluster>>,
    layer: Layer,
}

impl LocalLedger {
    pub fn new() -> Self {
        Self {
            cluster: Arc::new(Mutex::new(Cluster::new())),
            layer: Layer::Base,
        }
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn base(&self) -> Self {
        Self {
            cluster: Arc::clone(&self.cluster),
            layer: Layer::Base,
        }
    }

    pub fn rollup(&self) -> Self {
        Self {
            cluster: Arc::clone(&self.cluster),
            layer: Layer::Rollup,
        }
    }

    /// Credit `lamports` to `address` on this layer.
    pub async fn fund(&self, address: &Pubkey, lamports: u64) {
        let mut cluster = self.cluster.lock().await;
        cluster
            .accounts_mut(self.layer)
            .entry(*address)
            .or_insert_with(|| Account::new(0, SYSTEM_PROGRAM_ID, Vec::new()))
            .lamports += lamports;
    }

    // Write an account as is, bypassing every program
    pub async fn set_account(&self, address: Pubkey, account: Account) {
        self.cluster
            .lock()
            .await
            .accounts_mut(self.layer)
            .insert(address, account);
    }

    /// Create a task queue owned by the queue program, the way an operator would.
    ///
    /// `bitmap` is stored as given, so tests can start from any occupancy.
    pub async fn create_task_queue(
        &self,
        update_authority: &Pubkey,
        capacity: u16,
        task_bitmap: Vec<u8>,
        min_crank_reward: u64,
    ) -> Pubkey {
        let mut cluster = self.cluster.lock().await;
        cluster.sequence += 1;
        let id = cluster.sequence as u32;
        let address = Pubkey::new(hashv(&[b"task_queue", &id.to_le_bytes()]).to_bytes());

        let queue = TaskQueueV0 {
            tuktuk_config: Pubkey::zero(),
            id,
            update_authority: *update_authority,
            reserved: Pubkey::zero(),
            min_crank_reward,
            uncollected_protocol_fees: 0,
            capacity,
            created_at: cluster.clock,
            updated_at: cluster.clock,
            bump_seed: 0,
            task_bitmap,
            name: format!("queue-{}", id),
            lookup_tables: Vec::new(),
            num_queue_authorities: 0,
            stale_task_age: 0,
        };
        // encoding a freshly built queue cannot fail
        let data = queue.encode().unwrap_or_default();
        cluster
            .base
            .insert(address, Account::new(1, *TUKTUK_PROGRAM_ID, data));
        info!("Created task queue {} with capacity {}", address, capacity);
        address
    }

    pub async fn register_program(&self, program_id: Pubkey, handler: Arc<dyn ProgramHandler>) {
        self.cluster.lock().await.programs.insert(program_id, handler);
    }

    pub async fn clock(&self) -> UnixTimestamp {
        self.cluster.lock().await.clock
    }

    pub async fn set_clock(&self, clock: UnixTimestamp) {
        self.cluster.lock().await.clock = clock;
    }

    // Number of ledger calls a scheduled commit takes to reach the base ledger
    pub async fn set_commit_latency(&self, latency: u64) {
        self.cluster.lock().await.commit_latency = latency;
    }

    /// Land every pending commit on the base ledger now.
    pub async fn settle(&self) {
        self.cluster.lock().await.settle();
    }

    pub async fn pending_commits(&self) -> usize {
        self.cluster.lock().await.pending.len()
    }

    pub async fn is_delegated(&self, address: &Pubkey) -> bool {
        self.cluster.lock().await.delegations.contains_key(address)
    }

    /// Validator pinned by the delegation of `address`, `None` when not delegated.
    pub async fn delegated_validator(&self, address: &Pubkey) -> Option<Option<Pubkey>> {
        self.cluster
            .lock()
            .await
            .delegations
            .get(address)
            .map(|delegation| delegation.validator)
    }

    /// Run every due task of `queue`, the way a cranker would.
    pub async fn crank(&self, queue: &Pubkey, cranker: &Pubkey) -> Result<Vec<TaskRun>, LedgerError> {
        let mut cluster = self.cluster.lock().await;
        cluster.advance();
        cluster.crank(queue, cranker)
    }

    pub async fn history(&self) -> Vec<SubmissionRecord> {
        self.cluster.lock().await.history.clone()
    }

    pub async fn transaction_logs(&self, signature: &Signature) -> Option<Vec<String>> {
        self.cluster.lock().await.logs.get(signature).cloned()
    }

    /// Accepted transactions of this layer calling `method` of `program_id`.
    pub async fn count_method(&self, program_id: &Pubkey, method: &str) -> usize {
        self.cluster
            .lock()
            .await
            .history
            .iter()
            .filter(|record| record.layer == self.layer && record.is_success())
            .filter(|record| {
                record
                    .instructions
                    .iter()
                    .any(|ix| ix.program_id == *program_id && is_method(&ix.data, method))
            })
            .count()
    }

    /// Submissions of this layer, accepted or rejected.
    pub async fn submission_count(&self) -> usize {
        self.cluster
            .lock()
            .await
            .history
            .iter()
            .filter(|record| record.layer == self.layer)
            .count()
    }
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl crate::ledger::Ledger for LocalLedger {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError> {
        tokio::task::yield_now().await;
        let mut cluster = self.cluster.lock().await;
        cluster.advance();
        Ok(cluster.accounts(self.layer).get(address).cloned())
    }

    async fn submit(
        &self,
        instructions: Vec<Instruction>,
        signer: &dyn Signer,
    ) -> Result<Signature, LedgerError> {
        tokio::task::yield_now().await;
        let mut cluster = self.cluster.lock().await;
        cluster.advance();
        cluster.submit(self.layer, instructions, signer)
    }

    async fn get_commitment_signature(
        &self,
        rollup_signature: &Signature,
    ) -> Result<Option<Signature>, LedgerError> {
        tokio::task::yield_now().await;
        let mut cluster = self.cluster.lock().await;
        cluster.advance();
        if self.layer != Layer::Rollup {
            return Err(LedgerError::rejected(
                RejectionKind::Malformed,
                "Commitments are only tracked by the rollup",
            ));
        }
        Ok(cluster.commitments.get(rollup_signature).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ledger::Ledger, signer::Keypair};
    use tasklane_common::transaction::system_transfer;

    #[tokio::test]
    async fn test_transfer_is_atomic() {
        let ledger = LocalLedger::new();
        let payer = Keypair::new();
        let other = Pubkey::new([9u8; 32]);
        ledger.fund(&payer.pubkey(), 100).await;

        let ok = system_transfer(&payer.pubkey(), &other, 40);
        ledger.submit(vec![ok], &payer).await.unwrap();
        assert_eq!(ledger.get_balance(&other).await.unwrap(), 40);

        // the second transfer fails, the first one of the same transaction is undone
        let first = system_transfer(&payer.pubkey(), &other, 10);
        let second = system_transfer(&payer.pubkey(), &other, 1_000);
        let err = ledger.submit(vec![first, second], &payer).await.unwrap_err();
        assert_eq!(err.rejection_kind(), Some(RejectionKind::PreconditionUnmet));
        assert_eq!(ledger.get_balance(&payer.pubkey()).await.unwrap(), 60);
        assert_eq!(ledger.get_balance(&other).await.unwrap(), 40);
    }

    #[tokio::test]
    async fn test_foreign_signer_is_rejected() {
        let ledger = LocalLedger::new();
        let payer = Keypair::new();
        let stranger = Keypair::new();
        ledger.fund(&stranger.pubkey(), 100).await;

        let ix = system_transfer(&stranger.pubkey(), &payer.pubkey(), 10);
        let err = ledger.submit(vec![ix], &payer).await.unwrap_err();
        assert_eq!(err.rejection_kind(), Some(RejectionKind::InsufficientAuthority));
        assert_eq!(ledger.history().await.len(), 1);
        assert!(!ledger.history().await[0].is_success());
    }

    #[tokio::test]
    async fn test_layers_are_separate() {
        let base = LocalLedger::new();
        let rollup = base.rollup();
        let key = Pubkey::new([3u8; 32]);
        base.fund(&key, 5).await;

        assert!(base.account_exists(&key).await.unwrap());
        assert!(!rollup.account_exists(&key).await.unwrap());
        assert!(base.get_commitment_signature(&Signature::zero()).await.is_err());
        assert_eq!(rollup.get_commitment_signature(&Signature::zero()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_created_queue_decodes() {
        let ledger = LocalLedger::new();
        let authority = Pubkey::new([1u8; 32]);
        let queue = ledger.create_task_queue(&authority, 8, vec![0b0111_1111], 10).await;

        let account = ledger.get_account(&queue).await.unwrap().unwrap();
        assert!(account.is_owned_by(&TUKTUK_PROGRAM_ID));
        let state = TaskQueueV0::decode(&account.data).unwrap();
        assert_eq!(state.first_free_slot(), Some(7));
        assert_eq!(state.update_authority, authority);
    }

    #[test]
    fn test_decompile_restores_flags() {
        let signer = Pubkey::new([1u8; 32]);
        let writable = Pubkey::new([2u8; 32]);
        let program = Pubkey::new([3u8; 32]);
        let ix = Instruction::new(
            program,
            vec![AccountMeta::new(signer, true), AccountMeta::new(writable, false)],
            vec![1, 2],
        );
        let (compiled, _) =
            tasklane_common::transaction::compile_transaction(vec![ix.clone()], vec![]).unwrap();
        assert_eq!(decompile(&compiled).unwrap(), vec![ix]);
    }
}
