// Bounded polling of conditions completed asynchronously by other parties
//
// A timeout is not a failure: the condition may still become true later, it was
// just not observed within the attempt budget.

use async_trait::async_trait;
use log::{debug, info};
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;

use tasklane_common::{
    account::Account,
    crypto::{Pubkey, Signature},
};

use crate::{config::WatchConfig, error::ClientError, ledger::Ledger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome<T> {
    Satisfied { value: T, attempts: u32 },
    NotYetObserved { attempts: u32 },
}

impl<T> WatchOutcome<T> {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }

    pub fn value(self) -> Option<T> {
        match self {
            Self::Satisfied { value, .. } => Some(value),
            Self::NotYetObserved { .. } => None,
        }
    }

    // For callers that treat a timeout as an error
    pub fn into_result(self, condition: &str) -> Result<T, ClientError> {
        match self {
            Self::Satisfied { value, .. } => Ok(value),
            Self::NotYetObserved { attempts } => Err(ClientError::NotYetObserved {
                condition: condition.to_string(),
                attempts,
            }),
        }
    }
}

/// Something the watcher polls until it yields a value.
#[async_trait]
pub trait Condition: Send + Sync {
    type Output: Send;

    // `None` while the condition does not hold yet
    async fn check(&self) -> Result<Option<Self::Output>, ClientError>;

    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy)]
pub struct CompletionWatcher {
    poll_interval: Duration,
    max_attempts: u32,
}

impl CompletionWatcher {
    pub fn new(poll_interval: Duration, max_attempts: u32) -> Self {
        Self {
            poll_interval,
            max_attempts,
        }
    }

    pub fn from_config(config: &WatchConfig) -> Self {
        Self::new(config.poll_interval(), config.max_attempts)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Sleep, check, repeat, at most `max_attempts` times.
    ///
    /// Errors of the condition stop the loop and are returned as they are.
    pub async fn wait<C: Condition + ?Sized>(
        &self,
        condition: &C,
    ) -> Result<WatchOutcome<C::Output>, ClientError> {
        let description = condition.describe();
        for attempt in 1..=self.max_attempts {
            sleep(self.poll_interval).await;
            if let Some(value) = condition.check().await? {
                info!("{} observed after {} attempts", description, attempt);
                return Ok(WatchOutcome::Satisfied { value, attempts: attempt });
            }
            debug!("{} not observed yet ({}/{})", description, attempt, self.max_attempts);
        }

        info!("{} not observed after {} attempts", description, self.max_attempts);
        Ok(WatchOutcome::NotYetObserved {
            attempts: self.max_attempts,
        })
    }
}

impl From<&WatchConfig> for CompletionWatcher {
    fn from(config: &WatchConfig) -> Self {
        Self::from_config(config)
    }
}

// The account no longer exists, e.g. an escrow closed by its task
pub struct AccountClosed {
    pub ledger: Arc<dyn Ledger>,
    pub address: Pubkey,
}

#[async_trait]
impl Condition for AccountClosed {
    type Output = ();

    async fn check(&self) -> Result<Option<()>, ClientError> {
        Ok((!self.ledger.account_exists(&self.address).await?).then_some(()))
    }

    fn describe(&self) -> String {
        format!("closing of {}", self.address)
    }
}

pub struct AccountExists {
    pub ledger: Arc<dyn Ledger>,
    pub address: Pubkey,
}

#[async_trait]
impl Condition for AccountExists {
    type Output = Account;

    async fn check(&self) -> Result<Option<Account>, ClientError> {
        Ok(self.ledger.get_account(&self.address).await?)
    }

    fn describe(&self) -> String {
        format!("creation of {}", self.address)
    }
}

// The account exists and `owner` owns it, e.g. back to its program after undelegation
pub struct OwnedBy {
    pub ledger: Arc<dyn Ledger>,
    pub address: Pubkey,
    pub owner: Pubkey,
}

#[async_trait]
impl Condition for OwnedBy {
    type Output = Account;

    async fn check(&self) -> Result<Option<Account>, ClientError> {
        Ok(self
            .ledger
            .get_account(&self.address)
            .await?
            .filter(|account| account.is_owned_by(&self.owner)))
    }

    fn describe(&self) -> String {
        format!("ownership of {} by {}", self.address, self.owner)
    }
}

// Lamports differ from `baseline`, yields the new balance
pub struct BalanceChanged {
    pub ledger: Arc<dyn Ledger>,
    pub address: Pubkey,
    pub baseline: u64,
}

#[async_trait]
impl Condition for BalanceChanged {
    type Output = u64;

    async fn check(&self) -> Result<Option<u64>, ClientError> {
        let balance = self.ledger.get_balance(&self.address).await?;
        Ok((balance != self.baseline).then_some(balance))
    }

    fn describe(&self) -> String {
        format!("balance change of {} from {}", self.address, self.baseline)
    }
}

// Base ledger signature of a commit scheduled on the rollup
pub struct CommitmentMaterialized {
    pub rollup: Arc<dyn Ledger>,
    pub rollup_signature: Signature,
}

#[async_trait]
impl Condition for CommitmentMaterialized {
    type Output = Signature;

    async fn check(&self) -> Result<Option<Signature>, ClientError> {
        Ok(self
            .rollup
            .get_commitment_signature(&self.rollup_signature)
            .await?)
    }

    fn describe(&self) -> String {
        format!("commitment of {}", self.rollup_signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AfterChecks {
        needed: u32,
        checks: AtomicU32,
    }

    #[async_trait]
    impl Condition for AfterChecks {
        type Output = u32;

        async fn check(&self) -> Result<Option<u32>, ClientError> {
            let done = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
            Ok((done >= self.needed).then_some(done))
        }

        fn describe(&self) -> String {
            "counter".to_string()
        }
    }

    struct Failing;

    #[async_trait]
    impl Condition for Failing {
        type Output = ();

        async fn check(&self) -> Result<Option<()>, ClientError> {
            Err(ClientError::AccountNotFound(Pubkey::zero()))
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    #[tokio::test]
    async fn test_satisfied_before_budget() {
        let watcher = CompletionWatcher::new(Duration::from_millis(1), 5);
        let condition = AfterChecks {
            needed: 3,
            checks: AtomicU32::new(0),
        };
        let outcome = watcher.wait(&condition).await.unwrap();
        assert_eq!(outcome, WatchOutcome::Satisfied { value: 3, attempts: 3 });
    }

    #[tokio::test]
    async fn test_timeout_is_not_an_error() {
        let watcher = CompletionWatcher::new(Duration::from_millis(1), 4);
        let condition = AfterChecks {
            needed: 10,
            checks: AtomicU32::new(0),
        };
        let outcome = watcher.wait(&condition).await.unwrap();
        assert_eq!(outcome, WatchOutcome::NotYetObserved { attempts: 4 });
        assert_eq!(condition.checks.load(Ordering::SeqCst), 4);
        assert!(outcome.into_result("counter").unwrap_err().is_not_yet_observed());
    }

    #[tokio::test]
    async fn test_condition_errors_propagate() {
        let watcher = CompletionWatcher::new(Duration::from_millis(1), 4);
        assert!(matches!(
            watcher.wait(&Failing).await,
            Err(ClientError::AccountNotFound(_))
        ));
    }
}
