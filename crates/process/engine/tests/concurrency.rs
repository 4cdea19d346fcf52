//! Concurrent access: one instance serializes, different instances do not

mod common;

use common::*;
use process_engine::{DispatchError, TransitionError};
use process_types::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn amount(value: i64) -> BTreeMap<AttributeId, AttributeValue> {
    BTreeMap::from([(AttributeId::new("amount"), AttributeValue::integer(value))])
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_versioned_advance_has_one_winner() {
    let orchestrator = Arc::new(orchestrator_with(vec![expense()]));
    let instance = orchestrator
        .start_instance("Expense", None, actor("ops"), amount(10))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let orchestrator = orchestrator.clone();
        let id = instance.id.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .advance(
                    &id,
                    &subject("clerk"),
                    NextState::to("Check").expecting_version(0),
                    &actor(&format!("clerk-{i}")),
                )
                .await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) => {
                assert!(outcome.is_applied());
                applied += 1;
            }
            Err(TransitionError::ConcurrentModification { expected, actual }) => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(applied, 1);

    let trail = orchestrator.audit_trail(&instance.id).collect().await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(
        orchestrator.get_instance(&instance.id).await.unwrap().version,
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unversioned_losers_see_new_state() {
    let orchestrator = Arc::new(orchestrator_with(vec![expense()]));
    let instance = orchestrator
        .start_instance("Expense", None, actor("ops"), amount(10))
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            let id = instance.id.clone();
            tokio::spawn(async move {
                orchestrator
                    .advance(&id, &subject("clerk"), NextState::to("Check"), &actor("c"))
                    .await
            })
        })
        .collect();

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => applied += 1,
            Err(TransitionError::IllegalTransition { from, .. }) => {
                assert_eq!(from, StateId::new("Check"));
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(applied, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_instances_progress_independently() {
    let orchestrator = Arc::new(orchestrator_with(vec![expense()]));
    let mut ids = Vec::new();
    for i in 0..20 {
        let instance = orchestrator
            .start_instance("Expense", None, actor("ops"), amount(i))
            .await
            .unwrap();
        ids.push(instance.id);
    }

    let handles: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                for target in ["Check", "Filed"] {
                    orchestrator
                        .advance(&id, &subject("clerk"), NextState::to(target), &actor("c"))
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    for id in &ids {
        let trail = orchestrator.audit_trail(id).collect().await.unwrap();
        let sequences: Vec<u64> = trail.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
        assert!(orchestrator.get_instance(id).await.unwrap().is_completed());
    }
    assert_eq!(orchestrator.list_instances().await.len(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_task_claimed_at_most_once() {
    let orchestrator = Arc::new(orchestrator_with(vec![expense()]));
    let instance = orchestrator
        .start_instance("Expense", None, actor("ops"), amount(1))
        .await
        .unwrap();
    let task_id = orchestrator.instances().tasks(&instance.id).await.unwrap()[0]
        .id
        .clone();

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let orchestrator = orchestrator.clone();
            let filter = TaskFilter::task(task_id.clone());
            tokio::spawn(async move {
                orchestrator
                    .fetch_task(&subject("clerk"), &filter, &actor(&format!("a{i}")))
                    .await
            })
        })
        .collect();

    let mut claimed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(Some(task)) => {
                assert!(task.status.is_claimed());
                claimed += 1;
            }
            Err(DispatchError::AlreadyClaimed { task, .. }) => assert_eq!(task, task_id),
            other => panic!("unexpected result: {other:?}"),
        }
    }
    assert_eq!(claimed, 1);
}
