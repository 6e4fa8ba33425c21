mod rpc;

pub use rpc::{parse_log_signature, RpcLedger, RpcLedgerConfig};

use async_trait::async_trait;
use tasklane_common::{
    account::{Account, AnchorAccount},
    crypto::{Pubkey, Signature},
    transaction::Instruction,
};

use crate::{
    error::{ClientError, LedgerError},
    signer::Signer,
};

/// Capabilities consumed from a ledger, base or rollup.
///
/// The ledger is the only serialization point: two submissions racing for the
/// same resource never both succeed, the loser is rejected with
/// `RejectionKind::ResourceConflict`.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError>;

    /// Submit `instructions` as one atomic transaction signed and paid by `signer`.
    async fn submit(
        &self,
        instructions: Vec<Instruction>,
        signer: &dyn Signer,
    ) -> Result<Signature, LedgerError>;

    /// Base ledger signature committing the state changed by `rollup_signature`,
    /// once it exists. Only meaningful on a rollup.
    async fn get_commitment_signature(
        &self,
        rollup_signature: &Signature,
    ) -> Result<Option<Signature>, LedgerError>;

    async fn get_balance(&self, address: &Pubkey) -> Result<u64, LedgerError> {
        Ok(self
            .get_account(address)
            .await?
            .map(|account| account.lamports)
            .unwrap_or(0))
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, LedgerError> {
        Ok(self.get_account(address).await?.is_some())
    }
}

// Read and decode an account, `None` when it does not exist
pub async fn fetch<T: AnchorAccount>(
    ledger: &dyn Ledger,
    address: &Pubkey,
) -> Result<Option<T>, ClientError> {
    match ledger.get_account(address).await? {
        Some(account) => Ok(Some(T::decode(&account.data)?)),
        None => Ok(None),
    }
}
