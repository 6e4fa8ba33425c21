mod common;

use std::{collections::HashSet, sync::Arc};

use common::{EscrowProgram, EscrowRefund, Harness};
use tasklane_client::{
    ledger::fetch,
    scheduler::{CompiledPayload, Payload, ProgramSchedule, TaskRequest},
    signer::Signer,
    watcher::{AccountClosed, BalanceChanged},
    ClientError, Ledger,
};
use tasklane_common::{
    account::{TaskQueueV0, TaskV0},
    config::{DEFAULT_CRANK_REWARD, LAMPORTS_PER_SOL, TUKTUK_PROGRAM_ID},
    program::queue::{QUEUE_TASK, UPDATE_TASK_QUEUE},
    transaction::TriggerV0,
};

#[tokio::test]
async fn test_concurrent_schedulers_get_distinct_slots() {
    let harness = Harness::new(8, vec![0]).await;
    let schedulers: Vec<_> = (0..4).map(|_| harness.scheduler(Arc::clone(&harness.operator))).collect();
    let maker = harness.funded_keypair().await;
    let mut escrows = Vec::new();
    for seed in 0..4 {
        escrows.push(harness.open_escrow(&maker, seed, LAMPORTS_PER_SOL / 10).await);
    }

    let results = futures::future::join_all(schedulers.iter().enumerate().map(|(i, scheduler)| {
        let payload = CompiledPayload::new(vec![EscrowProgram::refund(&maker.pubkey(), i as u64)]);
        scheduler.schedule_once(&harness.queue, payload, TriggerV0::Now)
    }))
    .await;

    let handles: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    let slots: HashSet<u16> = handles.iter().map(|handle| handle.slot).collect();
    assert_eq!(slots.len(), 4);
    assert!(slots.iter().all(|slot| *slot < 4));

    let queue = fetch::<TaskQueueV0>(&harness.ledger, &harness.queue).await.unwrap().unwrap();
    assert_eq!(queue.occupied(), 4);
    assert_eq!(harness.ledger.count_method(&TUKTUK_PROGRAM_ID, QUEUE_TASK).await, 4);

    for handle in handles.iter() {
        let task = fetch::<TaskV0>(&harness.ledger, &handle.task).await.unwrap().unwrap();
        assert_eq!(task.id, handle.slot);
        assert_eq!(task.crank_reward, DEFAULT_CRANK_REWARD);
    }
}

#[tokio::test]
async fn test_two_callers_race_for_the_last_slot() {
    // only slot 7 is free, the loser must resize the queue
    let harness = Harness::new(8, vec![0b0111_1111]).await;
    let first = harness.scheduler(Arc::clone(&harness.operator));
    let second = harness.scheduler(Arc::clone(&harness.operator));
    let payload = || CompiledPayload::new(vec![EscrowProgram::refund(&harness.operator.pubkey(), 0)]);

    let (a, b) = tokio::join!(
        first.schedule_once(&harness.queue, payload(), TriggerV0::Now),
        second.schedule_once(&harness.queue, payload(), TriggerV0::Now),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.slot, b.slot);
    assert!(a.slot == 7 || b.slot == 7);

    let queue = fetch::<TaskQueueV0>(&harness.ledger, &harness.queue).await.unwrap().unwrap();
    assert_eq!(queue.capacity, 18);
    assert_eq!(queue.occupied(), 9);
    assert_eq!(harness.ledger.count_method(&TUKTUK_PROGRAM_ID, UPDATE_TASK_QUEUE).await, 1);
}

#[tokio::test]
async fn test_cranked_task_refunds_escrow() {
    let harness = Harness::new(8, vec![0]).await;
    let maker = harness.funded_keypair().await;
    let escrow = harness.open_escrow(&maker, 1, LAMPORTS_PER_SOL).await;
    let before = harness.ledger.get_balance(&maker.pubkey()).await.unwrap();

    let scheduler = harness.scheduler(Arc::clone(&harness.operator));
    let payload = CompiledPayload::new(vec![EscrowProgram::refund(&maker.pubkey(), 1)]);
    let handle = scheduler
        .schedule(
            &harness.queue,
            &TaskRequest::new(payload, TriggerV0::Now).with_description("refund maker"),
        )
        .await
        .unwrap();
    assert_eq!(handle.queue_authority, harness.operator.pubkey());

    let cranker = harness.funded_keypair().await;
    let runs = harness.ledger.crank(&harness.queue, &cranker.pubkey()).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].result.is_ok());

    let closed = common::watcher(5)
        .wait(&AccountClosed {
            ledger: Arc::new(harness.ledger.clone()),
            address: escrow,
        })
        .await
        .unwrap();
    assert!(closed.is_satisfied());
    assert_eq!(
        harness.ledger.get_balance(&maker.pubkey()).await.unwrap(),
        before + LAMPORTS_PER_SOL
    );
    assert!(!harness.ledger.account_exists(&handle.task).await.unwrap());
    assert_eq!(
        harness.ledger.get_balance(&cranker.pubkey()).await.unwrap(),
        10 * LAMPORTS_PER_SOL + DEFAULT_CRANK_REWARD
    );

    // the slot is free again
    let queue = fetch::<TaskQueueV0>(&harness.ledger, &harness.queue).await.unwrap().unwrap();
    assert_eq!(queue.first_free_slot(), Some(0));
}

#[tokio::test]
async fn test_timestamp_trigger_waits_for_the_clock() {
    let harness = Harness::new(8, vec![0]).await;
    let maker = harness.funded_keypair().await;
    let escrow = harness.open_escrow(&maker, 2, LAMPORTS_PER_SOL).await;
    let now = harness.ledger.clock().await;

    let scheduler = harness.scheduler(Arc::clone(&harness.operator));
    let payload = CompiledPayload::new(vec![EscrowProgram::refund(&maker.pubkey(), 2)]);
    scheduler
        .schedule_once(&harness.queue, payload, TriggerV0::Timestamp(now + 60))
        .await
        .unwrap();

    let cranker = harness.funded_keypair().await;
    assert!(harness.ledger.crank(&harness.queue, &cranker.pubkey()).await.unwrap().is_empty());
    let outcome = common::watcher(3)
        .wait(&BalanceChanged {
            ledger: Arc::new(harness.ledger.clone()),
            address: cranker.pubkey(),
            baseline: 10 * LAMPORTS_PER_SOL,
        })
        .await
        .unwrap();
    assert!(!outcome.is_satisfied());

    harness.ledger.set_clock(now + 61).await;
    let runs = harness.ledger.crank(&harness.queue, &cranker.pubkey()).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(!harness.ledger.account_exists(&escrow).await.unwrap());
}

#[tokio::test]
async fn test_program_queues_its_own_task() {
    let harness = Harness::new(8, vec![0b0000_0001]).await;
    let maker = harness.funded_keypair().await;
    let escrow = harness.open_escrow(&maker, 9, LAMPORTS_PER_SOL).await;

    let program = Arc::new(EscrowRefund {
        maker: maker.pubkey(),
        seed: 9,
    });
    let scheduler = harness.scheduler(Arc::clone(&maker));
    let handle = scheduler
        .schedule_once(&harness.queue, Payload::Program(program.clone()), TriggerV0::Now)
        .await
        .unwrap();
    assert_eq!(handle.slot, 1);

    assert_eq!(handle.queue_authority, program.queue_authority().unwrap());
    assert!(scheduler
        .registrar()
        .is_registered(&harness.queue, &handle.queue_authority)
        .await
        .unwrap());

    let runs = harness.ledger.crank(&harness.queue, &harness.operator.pubkey()).await.unwrap();
    assert!(runs.iter().any(|run| run.slot == 1 && run.result.is_ok()));
    assert!(!harness.ledger.account_exists(&escrow).await.unwrap());
}

#[tokio::test]
async fn test_oversized_description_is_refused_before_submitting() {
    let harness = Harness::new(8, vec![0]).await;
    let scheduler = harness.scheduler(Arc::clone(&harness.operator));
    let payload = CompiledPayload::new(vec![EscrowProgram::refund(&harness.operator.pubkey(), 0)]);
    let request = TaskRequest::new(payload, TriggerV0::Now).with_description("x".repeat(41));

    let submitted = harness.ledger.submission_count().await;
    let err = scheduler.schedule(&harness.queue, &request).await.unwrap_err();
    assert!(matches!(err, ClientError::Build(_)));
    // only the registration went through
    assert_eq!(harness.ledger.submission_count().await, submitted + 1);
}
