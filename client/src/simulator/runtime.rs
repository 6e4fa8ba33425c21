// Transaction execution of the local ledger
//
// A transaction runs against a copy of the layer's accounts. Nothing is written
// back unless every instruction succeeds.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use borsh::BorshDeserialize;
use log::trace;
use tasklane_common::{
    account::{Account, DISCRIMINATOR_SIZE},
    config::SYSTEM_PROGRAM_ID,
    crypto::{create_program_address, Pubkey},
    time::UnixTimestamp,
    transaction::{Instruction, RejectionKind},
};

use super::Layer;
use crate::error::LedgerError;

// Nested invocations deeper than this are refused
const MAX_INVOKE_DEPTH: usize = 4;

/// Program logic run by the local ledger for instructions sent to `program_id`.
pub trait ProgramHandler: Send + Sync {
    fn process(&self, ctx: &mut InvokeContext<'_>, instruction: &Instruction) -> Result<(), LedgerError>;

    // Layers where the program is deployed
    fn deployed_on(&self, _layer: Layer) -> bool {
        true
    }
}

// Delegation of one account to the rollup
#[derive(Debug, Clone)]
pub(crate) struct Delegation {
    pub owner_program: Pubkey,
    pub validator: Option<Pubkey>,
    // written on the rollup since the last scheduled commit
    pub dirty: bool,
    pub undelegating: bool,
}

// Cross layer changes applied once the transaction succeeded
#[derive(Debug, Clone)]
pub(crate) enum Effect {
    Delegated {
        account: Pubkey,
        owner_program: Pubkey,
        validator: Option<Pubkey>,
    },
    ScheduleCommit {
        account: Pubkey,
        undelegate: bool,
    },
}

// Working state of one transaction
pub(crate) struct Transaction {
    pub accounts: HashMap<Pubkey, Account>,
    pub touched: HashSet<Pubkey>,
    pub effects: Vec<Effect>,
    pub logs: Vec<String>,
}

// Read only view of the cluster a transaction executes in
pub(crate) struct Environment<'a> {
    pub layer: Layer,
    pub clock: UnixTimestamp,
    pub programs: &'a HashMap<Pubkey, Arc<dyn ProgramHandler>>,
    pub delegations: &'a HashMap<Pubkey, Delegation>,
}

impl Environment<'_> {
    pub fn execute(
        &self,
        accounts: &HashMap<Pubkey, Account>,
        instructions: &[Instruction],
        signers: &HashSet<Pubkey>,
    ) -> Result<Transaction, (LedgerError, Vec<String>)> {
        let mut tx = Transaction {
            accounts: accounts.clone(),
            touched: HashSet::new(),
            effects: Vec::new(),
            logs: Vec::new(),
        };

        for instruction in instructions {
            if let Err(e) = self.invoke(&mut tx, instruction, signers, None, 0) {
                tx.logs.push(format!("Program {} failed: {}", instruction.program_id, e));
                return Err((e, tx.logs));
            }
        }

        Ok(tx)
    }

    fn invoke(
        &self,
        tx: &mut Transaction,
        instruction: &Instruction,
        signers: &HashSet<Pubkey>,
        caller: Option<Pubkey>,
        depth: usize,
    ) -> Result<(), LedgerError> {
        if depth > MAX_INVOKE_DEPTH {
            return Err(rejected(
                RejectionKind::PreconditionUnmet,
                "Cross-program invocation call depth too deep",
            ));
        }

        for meta in instruction.accounts.iter() {
            if meta.is_signer && !signers.contains(&meta.pubkey) {
                return Err(rejected(
                    RejectionKind::InsufficientAuthority,
                    format!("{}: missing required signature for instruction", meta.pubkey),
                ));
            }
        }

        let program_id = instruction.program_id;
        let handler = self
            .programs
            .get(&program_id)
            .filter(|handler| handler.deployed_on(self.layer))
            .ok_or_else(|| {
                rejected(
                    RejectionKind::PreconditionUnmet,
                    format!("Program {} is not deployed on the {:?} layer", program_id, self.layer),
                )
            })?;

        tx.logs.push(format!("Program {} invoke [{}]", program_id, depth + 1));
        let invocations = {
            let mut ctx = InvokeContext {
                program_id,
                caller,
                layer: self.layer,
                clock: self.clock,
                signers,
                delegations: self.delegations,
                tx: &mut *tx,
                invocations: Vec::new(),
            };
            handler.process(&mut ctx, instruction)?;
            ctx.invocations
        };

        for (inner, signer_seeds) in invocations {
            let mut inner_signers = signers.clone();
            for seeds in signer_seeds.iter() {
                let seeds: Vec<&[u8]> = seeds.iter().map(Vec::as_slice).collect();
                let derived = create_program_address(&seeds, &program_id).map_err(|e| {
                    rejected(RejectionKind::InsufficientAuthority, format!("Could not create program address: {}", e))
                })?;
                inner_signers.insert(derived);
            }
            trace!("{} invokes {}", program_id, inner.program_id);
            self.invoke(tx, &inner, &inner_signers, Some(program_id), depth + 1)?;
        }

        tx.logs.push(format!("Program {} success", program_id));
        Ok(())
    }
}

pub(crate) fn rejected(kind: RejectionKind, message: impl Into<String>) -> LedgerError {
    LedgerError::rejected(kind, message)
}

/// What a program sees while processing one instruction.
pub struct InvokeContext<'a> {
    program_id: Pubkey,
    caller: Option<Pubkey>,
    layer: Layer,
    clock: UnixTimestamp,
    signers: &'a HashSet<Pubkey>,
    delegations: &'a HashMap<Pubkey, Delegation>,
    tx: &'a mut Transaction,
    invocations: Vec<(Instruction, Vec<Vec<Vec<u8>>>)>,
}

impl InvokeContext<'_> {
    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    // Program that invoked this one, `None` for a top level instruction
    pub fn caller(&self) -> Option<&Pubkey> {
        self.caller.as_ref()
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn clock(&self) -> UnixTimestamp {
        self.clock
    }

    pub fn is_signer(&self, key: &Pubkey) -> bool {
        self.signers.contains(key)
    }

    pub fn account(&self, key: &Pubkey) -> Option<&Account> {
        self.tx.accounts.get(key)
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.tx.logs.push(format!("Program log: {}", message.into()));
    }

    pub(crate) fn delegation(&self, key: &Pubkey) -> Option<&Delegation> {
        self.delegations.get(key)
    }

    pub(crate) fn push_effect(&mut self, effect: Effect) {
        self.tx.effects.push(effect);
    }

    /// Mutable data of an account owned by the running program.
    pub fn data_mut(&mut self, key: &Pubkey) -> Result<&mut Vec<u8>, LedgerError> {
        self.check_writable(key)?;
        self.tx.touched.insert(*key);
        self.tx
            .accounts
            .get_mut(key)
            .map(|account| &mut account.data)
            .ok_or_else(|| not_initialized(key))
    }

    fn check_writable(&self, key: &Pubkey) -> Result<(), LedgerError> {
        let account = self.tx.accounts.get(key).ok_or_else(|| not_initialized(key))?;
        if account.owner != self.program_id {
            return Err(rejected(
                RejectionKind::PreconditionUnmet,
                format!(
                    "AnchorError caused by account: {}. Error Code: ConstraintOwner. Owned by {}",
                    key, account.owner
                ),
            ));
        }

        if self.layer == Layer::Rollup {
            if let Some(delegation) = self.delegations.get(key) {
                if delegation.undelegating {
                    return Err(rejected(
                        RejectionKind::PreconditionUnmet,
                        format!("Account {} is being undelegated and is read only", key),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Create an account owned by the running program.
    pub fn create_account(&mut self, key: &Pubkey, data: Vec<u8>) -> Result<(), LedgerError> {
        if self.tx.accounts.contains_key(key) {
            return Err(rejected(
                RejectionKind::ResourceConflict,
                format!("Allocate: account Address {{ address: {}, base: None }} already in use", key),
            ));
        }
        self.tx.touched.insert(*key);
        self.tx
            .accounts
            .insert(*key, Account::new(0, self.program_id, data));
        Ok(())
    }

    /// Close an account owned by the running program, its lamports go to `destination`.
    pub fn close_account(&mut self, key: &Pubkey, destination: &Pubkey) -> Result<(), LedgerError> {
        self.check_writable(key)?;
        let lamports = self
            .tx
            .accounts
            .remove(key)
            .map(|account| account.lamports)
            .unwrap_or(0);
        self.tx.touched.insert(*key);
        self.credit(destination, lamports);
        Ok(())
    }

    /// Move lamports out of a signer or an account owned by the running program.
    pub fn transfer(&mut self, from: &Pubkey, to: &Pubkey, lamports: u64) -> Result<(), LedgerError> {
        let source = self.tx.accounts.get(from).ok_or_else(|| {
            rejected(
                RejectionKind::PreconditionUnmet,
                format!("Transfer: from account {} has no lamports", from),
            )
        })?;

        if !self.is_signer(from) && source.owner != self.program_id {
            return Err(rejected(
                RejectionKind::InsufficientAuthority,
                format!("{}: missing required signature for instruction", from),
            ));
        }

        if source.lamports < lamports {
            return Err(rejected(
                RejectionKind::PreconditionUnmet,
                format!(
                    "Transfer: insufficient lamports {}, need {}",
                    source.lamports, lamports
                ),
            ));
        }

        if let Some(source) = self.tx.accounts.get_mut(from) {
            source.lamports -= lamports;
        }
        self.tx.touched.insert(*from);
        self.credit(to, lamports);
        Ok(())
    }

    fn credit(&mut self, to: &Pubkey, lamports: u64) {
        self.tx.touched.insert(*to);
        self.tx
            .accounts
            .entry(*to)
            .or_insert_with(|| Account::new(0, SYSTEM_PROGRAM_ID, Vec::new()))
            .lamports += lamports;
    }

    // Hand an account over to another owner, reserved to the delegation machinery
    pub(crate) fn set_owner(&mut self, key: &Pubkey, owner: Pubkey) -> Result<(), LedgerError> {
        let account = self.tx.accounts.get_mut(key).ok_or_else(|| not_initialized(key))?;
        account.owner = owner;
        self.tx.touched.insert(*key);
        Ok(())
    }

    /// Invoke `instruction` once this one returns, signed by the addresses the
    /// running program derives from `signer_seeds` (bump included).
    pub fn invoke_signed(&mut self, instruction: Instruction, signer_seeds: Vec<Vec<Vec<u8>>>) {
        self.invocations.push((instruction, signer_seeds));
    }
}

pub(crate) fn not_initialized(key: &Pubkey) -> LedgerError {
    rejected(
        RejectionKind::PreconditionUnmet,
        format!(
            "AnchorError caused by account: {}. Error Code: AccountNotInitialized",
            key
        ),
    )
}

// Arguments following the method discriminator
pub(crate) fn decode_args<T: BorshDeserialize>(data: &[u8]) -> Result<T, LedgerError> {
    let malformed = || {
        rejected(
            RejectionKind::Malformed,
            "AnchorError occurred. Error Code: InstructionDidNotDeserialize",
        )
    };
    let mut body = data.get(DISCRIMINATOR_SIZE..).ok_or_else(malformed)?;
    T::deserialize(&mut body).map_err(|_| malformed())
}

// The `index`-th account of an instruction
pub(crate) fn account_at(instruction: &Instruction, index: usize) -> Result<Pubkey, LedgerError> {
    instruction
        .accounts
        .get(index)
        .map(|meta| meta.pubkey)
        .ok_or_else(|| rejected(RejectionKind::Malformed, "Error Code: NotEnoughAccountKeys"))
}
