// Delegation lifecycle of one account between the base ledger and the rollup
//
//   base --delegate--> delegated --rollup write--> rollup-committing
//   rollup-committing --commit--> delegated
//   delegated | rollup-committing --undelegate--> undelegating
//   undelegating --owner observed on base--> base
//
// Every operation is guarded by the location known to the manager. The ledgers
// enforce the same rule, a guard only saves a doomed submission.

use borsh::{BorshDeserialize, BorshSerialize};
use log::{debug, info, warn};
use std::{fmt, sync::Arc};
use tasklane_common::{
    account::Account,
    config::{DELEGATION_PROGRAM_ID, MAGIC_CONTEXT_ID, MAGIC_PROGRAM_ID, SYSTEM_PROGRAM_ID},
    crypto::{Pubkey, Signature},
    derive::{delegate_buffer_key, delegation_metadata_key, delegation_record_key},
    transaction::{AccountMeta, Instruction},
};

use crate::{
    error::ClientError,
    ledger::Ledger,
    signer::Signer,
    watcher::{CommitmentMaterialized, CompletionWatcher, OwnedBy, WatchOutcome},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Base,
    Delegated,
    RollupCommitting,
    Undelegating,
}

impl Location {
    pub fn on_rollup(&self) -> bool {
        matches!(self, Self::Delegated | Self::RollupCommitting)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Base => "on the base ledger",
            Self::Delegated => "delegated",
            Self::RollupCommitting => "written on the rollup",
            Self::Undelegating => "undelegating",
        };
        f.write_str(label)
    }
}

/// Calls of the program owning the delegated account.
///
/// Delegation, commits and undelegation must be requested by the owner
/// program, the client only asks it to.
pub trait DelegatedProgram: Send + Sync {
    fn program_id(&self) -> Pubkey;

    fn delegate(&self, payer: &Pubkey, account: &Pubkey, validator: Option<Pubkey>) -> Result<Instruction, ClientError>;

    fn commit(&self, payer: &Pubkey, account: &Pubkey) -> Result<Instruction, ClientError>;

    fn undelegate(&self, payer: &Pubkey, account: &Pubkey) -> Result<Instruction, ClientError>;
}

#[derive(BorshSerialize, BorshDeserialize)]
pub struct DelegateIxArgs {
    pub validator: Option<Pubkey>,
}

pub const DELEGATE_METHOD: &str = "delegate";
pub const COMMIT_METHOD: &str = "commit";
pub const UNDELEGATE_METHOD: &str = "undelegate";

// Program exposing `delegate`, `commit` and `undelegate` methods
#[derive(Debug, Clone, Copy)]
pub struct AnchorDelegatedProgram {
    pub program_id: Pubkey,
}

impl AnchorDelegatedProgram {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    fn magic_accounts(&self, payer: &Pubkey, account: &Pubkey) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(*account, false),
            AccountMeta::new_readonly(*MAGIC_PROGRAM_ID, false),
            AccountMeta::new(*MAGIC_CONTEXT_ID, false),
        ]
    }
}

impl DelegatedProgram for AnchorDelegatedProgram {
    fn program_id(&self) -> Pubkey {
        self.program_id
    }

    fn delegate(&self, payer: &Pubkey, account: &Pubkey, validator: Option<Pubkey>) -> Result<Instruction, ClientError> {
        let accounts = vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(*account, false),
            AccountMeta::new(delegate_buffer_key(&self.program_id, account)?, false),
            AccountMeta::new(delegation_record_key(account)?, false),
            AccountMeta::new(delegation_metadata_key(account)?, false),
            AccountMeta::new_readonly(self.program_id, false),
            AccountMeta::new_readonly(*DELEGATION_PROGRAM_ID, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ];
        Ok(Instruction::anchor(
            self.program_id,
            DELEGATE_METHOD,
            &DelegateIxArgs { validator },
            accounts,
        )?)
    }

    fn commit(&self, payer: &Pubkey, account: &Pubkey) -> Result<Instruction, ClientError> {
        Ok(Instruction::anchor(
            self.program_id,
            COMMIT_METHOD,
            &(),
            self.magic_accounts(payer, account),
        )?)
    }

    fn undelegate(&self, payer: &Pubkey, account: &Pubkey) -> Result<Instruction, ClientError> {
        Ok(Instruction::anchor(
            self.program_id,
            UNDELEGATE_METHOD,
            &(),
            self.magic_accounts(payer, account),
        )?)
    }
}

// Correlates a rollup commit request with its future base ledger transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitHandle {
    pub account: Pubkey,
    pub rollup_signature: Signature,
    pub undelegate: bool,
}

pub struct DelegationLifecycleManager {
    base: Arc<dyn Ledger>,
    rollup: Arc<dyn Ledger>,
    signer: Arc<dyn Signer>,
    program: Arc<dyn DelegatedProgram>,
    account: Pubkey,
    location: Location,
    watcher: CompletionWatcher,
    last_commit: Option<CommitHandle>,
}

impl DelegationLifecycleManager {
    /// Manage `account`, assumed to be on the base ledger. Use `attach` to
    /// start from the location observed on the base ledger.
    pub fn new(
        base: Arc<dyn Ledger>,
        rollup: Arc<dyn Ledger>,
        signer: Arc<dyn Signer>,
        program: Arc<dyn DelegatedProgram>,
        account: Pubkey,
        watcher: CompletionWatcher,
    ) -> Self {
        Self {
            base,
            rollup,
            signer,
            program,
            account,
            location: Location::Base,
            watcher,
            last_commit: None,
        }
    }

    pub async fn attach(
        base: Arc<dyn Ledger>,
        rollup: Arc<dyn Ledger>,
        signer: Arc<dyn Signer>,
        program: Arc<dyn DelegatedProgram>,
        account: Pubkey,
        watcher: CompletionWatcher,
    ) -> Result<Self, ClientError> {
        let mut manager = Self::new(base, rollup, signer, program, account, watcher);
        manager.observe().await?;
        Ok(manager)
    }

    pub fn account(&self) -> &Pubkey {
        &self.account
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn last_commit(&self) -> Option<&CommitHandle> {
        self.last_commit.as_ref()
    }

    fn guard(&self, operation: &'static str, allowed: &[Location]) -> Result<(), ClientError> {
        if allowed.contains(&self.location) {
            Ok(())
        } else {
            Err(ClientError::WrongLocation {
                operation,
                location: self.location,
            })
        }
    }

    fn transition(&mut self, to: Location) {
        if self.location != to {
            debug!("{}: {} -> {}", self.account, self.location, to);
            self.location = to;
        }
    }

    /// Re-read the owner of the account on the base ledger.
    ///
    /// The manager keeps its finer grained rollup state when the base ledger
    /// still shows the account as delegated.
    pub async fn observe(&mut self) -> Result<Location, ClientError> {
        let account = self
            .base
            .get_account(&self.account)
            .await?
            .ok_or(ClientError::AccountNotFound(self.account))?;

        let observed = if account.is_owned_by(&self.program.program_id()) {
            Location::Base
        } else if account.is_owned_by(&DELEGATION_PROGRAM_ID) {
            match self.location {
                Location::Base => Location::Delegated,
                current => current,
            }
        } else {
            warn!("{} is owned by {}, an unknown program", self.account, account.owner);
            return Err(ClientError::UnexpectedOwner {
                account: self.account,
                owner: account.owner,
            });
        };

        self.transition(observed);
        Ok(observed)
    }

    /// Hand the account to the rollup.
    pub async fn delegate(&mut self, validator: Option<Pubkey>) -> Result<Signature, ClientError> {
        self.guard("delegate", &[Location::Base])?;
        let payer = self.signer.pubkey();
        let ix = self.program.delegate(&payer, &self.account, validator)?;

        info!("Delegating {} to the rollup", self.account);
        match self.base.submit(vec![ix], self.signer.as_ref()).await {
            Ok(signature) => {
                self.transition(Location::Delegated);
                Ok(signature)
            }
            Err(e) if e.is_conflict() => {
                // delegated by someone else since our last look
                let observed = self.observe().await?;
                Err(ClientError::WrongLocation {
                    operation: "delegate",
                    location: observed,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Mutate the account on the base ledger, only while it lives there.
    pub async fn write_base(&mut self, instructions: Vec<Instruction>) -> Result<Signature, ClientError> {
        self.guard("write on the base ledger", &[Location::Base])?;
        Ok(self.base.submit(instructions, self.signer.as_ref()).await?)
    }

    /// Mutate the account on the rollup, only while it is delegated.
    pub async fn write_rollup(&mut self, instructions: Vec<Instruction>) -> Result<Signature, ClientError> {
        self.guard(
            "write on the rollup",
            &[Location::Delegated, Location::RollupCommitting],
        )?;
        let signature = self.rollup.submit(instructions, self.signer.as_ref()).await?;
        self.transition(Location::RollupCommitting);
        Ok(signature)
    }

    /// Ask the rollup to commit the account, without waiting for the base
    /// ledger transaction. See `await_commitment`.
    pub async fn commit(&mut self) -> Result<CommitHandle, ClientError> {
        self.guard("commit", &[Location::Delegated, Location::RollupCommitting])?;
        let payer = self.signer.pubkey();
        let ix = self.program.commit(&payer, &self.account)?;
        let rollup_signature = self.rollup.submit(vec![ix], self.signer.as_ref()).await?;

        info!("Commit of {} requested in {}", self.account, rollup_signature);
        let handle = CommitHandle {
            account: self.account,
            rollup_signature,
            undelegate: false,
        };
        self.last_commit = Some(handle);
        self.transition(Location::Delegated);
        Ok(handle)
    }

    /// Commit and hand the account back to its program on the base ledger.
    ///
    /// The account is `Undelegating` until `confirm_undelegation` observes it on
    /// the base ledger.
    pub async fn undelegate(&mut self) -> Result<CommitHandle, ClientError> {
        self.guard("undelegate", &[Location::Delegated, Location::RollupCommitting])?;
        let payer = self.signer.pubkey();
        let ix = self.program.undelegate(&payer, &self.account)?;
        let rollup_signature = self.rollup.submit(vec![ix], self.signer.as_ref()).await?;

        info!("Undelegation of {} requested in {}", self.account, rollup_signature);
        let handle = CommitHandle {
            account: self.account,
            rollup_signature,
            undelegate: true,
        };
        self.last_commit = Some(handle);
        self.transition(Location::Undelegating);
        Ok(handle)
    }

    /// Wait for the base ledger transaction of a commit.
    pub async fn await_commitment(&self, handle: &CommitHandle) -> Result<WatchOutcome<Signature>, ClientError> {
        let condition = CommitmentMaterialized {
            rollup: Arc::clone(&self.rollup),
            rollup_signature: handle.rollup_signature,
        };
        self.watcher.wait(&condition).await
    }

    /// Wait until the program owns the account again on the base ledger.
    ///
    /// The location becomes `Base` only once this is observed. A timeout
    /// leaves it `Undelegating`.
    pub async fn confirm_undelegation(&mut self) -> Result<WatchOutcome<Account>, ClientError> {
        self.guard("confirm undelegation", &[Location::Undelegating])?;
        let condition = OwnedBy {
            ledger: Arc::clone(&self.base),
            address: self.account,
            owner: self.program.program_id(),
        };

        let outcome = self.watcher.wait(&condition).await?;
        if outcome.is_satisfied() {
            info!("{} is back on the base ledger", self.account);
            self.transition(Location::Base);
        }
        Ok(outcome)
    }
}
