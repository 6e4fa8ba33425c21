mod common;

use std::sync::Arc;

use common::Harness;
use tasklane_client::{registrar::AuthorityRegistrar, signer::Signer, Registration};
use tasklane_common::{config::TUKTUK_PROGRAM_ID, program::queue::ADD_QUEUE_AUTHORITY};

#[tokio::test]
async fn test_concurrent_registration_creates_one_record() {
    let harness = Harness::new(8, vec![0]).await;
    let authority = harness.funded_keypair().await;
    let registrars: Vec<_> = (0..4)
        .map(|_| AuthorityRegistrar::new(Arc::new(harness.ledger.clone())))
        .collect();

    let authority_key = authority.pubkey();
    let results = futures::future::join_all(
        registrars
            .iter()
            .map(|registrar| registrar.ensure_registered(&harness.queue, &authority_key, authority.as_ref())),
    )
    .await;

    let outcomes: Vec<Registration> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_new()).count(), 1);
    assert_eq!(
        harness.ledger.count_method(&TUKTUK_PROGRAM_ID, ADD_QUEUE_AUTHORITY).await,
        1
    );
    assert!(registrars[0]
        .is_registered(&harness.queue, &authority.pubkey())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_registration_is_per_queue() {
    let harness = Harness::new(8, vec![0]).await;
    let other_queue = harness
        .ledger
        .create_task_queue(&harness.operator.pubkey(), 8, vec![0], 0)
        .await;
    let registrar = AuthorityRegistrar::new(Arc::new(harness.ledger.clone()));
    let authority = harness.operator.pubkey();

    registrar
        .ensure_registered(&harness.queue, &authority, harness.operator.as_ref())
        .await
        .unwrap();
    assert!(!registrar.is_registered(&other_queue, &authority).await.unwrap());

    let second = registrar
        .ensure_registered(&other_queue, &authority, harness.operator.as_ref())
        .await
        .unwrap();
    assert!(second.is_new());
}
