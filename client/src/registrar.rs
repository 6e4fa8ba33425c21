// Registration of queue authorities
//
// Registration is a create-if-absent on the record derived from (queue,
// authority). The existence check comes first, so a registered caller never
// submits anything. Between the check and the submission another caller may
// register the same authority: the conflict is resolved by checking again.

use log::{debug, info};
use std::sync::Arc;
use tasklane_common::{
    account::TaskQueueAuthorityV0,
    crypto::{Pubkey, Signature},
    derive::task_queue_authority_key,
    program::queue::add_queue_authority_v0,
};

use crate::{
    error::ClientError,
    ledger::{fetch, Ledger},
    signer::Signer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    AlreadyRegistered,
    Registered(Signature),
}

impl Registration {
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Registered(_))
    }
}

pub struct AuthorityRegistrar {
    ledger: Arc<dyn Ledger>,
}

impl AuthorityRegistrar {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    pub async fn is_registered(&self, queue: &Pubkey, queue_authority: &Pubkey) -> Result<bool, ClientError> {
        let record = task_queue_authority_key(queue, queue_authority)?;
        Ok(fetch::<TaskQueueAuthorityV0>(self.ledger.as_ref(), &record)
            .await?
            .is_some())
    }

    /// Make sure `queue_authority` may queue tasks on `queue`, `payer` pays for
    /// the record when it has to be created.
    pub async fn ensure_registered(
        &self,
        queue: &Pubkey,
        queue_authority: &Pubkey,
        payer: &dyn Signer,
    ) -> Result<Registration, ClientError> {
        if self.is_registered(queue, queue_authority).await? {
            debug!("{} already registered on {}", queue_authority, queue);
            return Ok(Registration::AlreadyRegistered);
        }

        if !self.ledger.account_exists(queue).await? {
            return Err(ClientError::QueueNotFound(*queue));
        }

        info!("Registering queue authority {} on {}", queue_authority, queue);
        let ix = add_queue_authority_v0(&payer.pubkey(), queue_authority, queue)?;
        match self.ledger.submit(vec![ix], payer).await {
            Ok(signature) => {
                info!("Queue authority {} registered in {}", queue_authority, signature);
                Ok(Registration::Registered(signature))
            }
            Err(e) if e.is_conflict() => {
                // someone else registered it in the meantime
                if self.is_registered(queue, queue_authority).await? {
                    debug!("{} was registered concurrently on {}", queue_authority, queue);
                    Ok(Registration::AlreadyRegistered)
                } else {
                    Err(e.into())
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{signer::Keypair, simulator::LocalLedger};
    use tasklane_common::{config::TUKTUK_PROGRAM_ID, program::queue::ADD_QUEUE_AUTHORITY};

    #[tokio::test]
    async fn test_second_call_does_not_submit() {
        let ledger = LocalLedger::new();
        let payer = Keypair::new();
        ledger.fund(&payer.pubkey(), 1_000_000_000).await;
        let queue = ledger.create_task_queue(&payer.pubkey(), 8, vec![0], 0).await;
        let registrar = AuthorityRegistrar::new(Arc::new(ledger.clone()));

        let first = registrar
            .ensure_registered(&queue, &payer.pubkey(), &payer)
            .await
            .unwrap();
        assert!(first.is_new());
        let submissions = ledger.submission_count().await;

        let second = registrar
            .ensure_registered(&queue, &payer.pubkey(), &payer)
            .await
            .unwrap();
        assert_eq!(second, Registration::AlreadyRegistered);
        assert_eq!(ledger.submission_count().await, submissions);
        assert_eq!(ledger.count_method(&TUKTUK_PROGRAM_ID, ADD_QUEUE_AUTHORITY).await, 1);
    }

    #[tokio::test]
    async fn test_unknown_queue() {
        let ledger = LocalLedger::new();
        let payer = Keypair::new();
        let registrar = AuthorityRegistrar::new(Arc::new(ledger.clone()));
        let queue = Pubkey::new([6u8; 32]);

        let err = registrar
            .ensure_registered(&queue, &payer.pubkey(), &payer)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::QueueNotFound(_)));
        assert_eq!(ledger.submission_count().await, 0);
    }
}
