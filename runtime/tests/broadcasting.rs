//! Integration tests for Store action broadcasting
//!
//! Covers the observation features the tavern roles rely on: waiting for a
//! terminal action after a send, and watching every action an effect produces.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::time::Duration;
use tavern_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
use tavern_runtime::{Store, StoreError};

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum MealAction {
    /// Start serving a meal to a table
    Order { table: u64 },
    /// One course reached the table
    CourseServed { table: u64, course: u32 },
    /// Whole meal served (terminal action)
    MealFinished { table: u64 },
    /// Pour a drink
    Pour,
    /// Drink poured
    Poured { total: u32 },
}

#[derive(Debug, Clone, Default)]
struct MealState {
    drinks: u32,
    courses: Vec<u32>,
}

#[derive(Clone)]
struct Kitchen;

#[derive(Clone)]
struct MealReducer;

impl Reducer for MealReducer {
    type State = MealState;
    type Action = MealAction;
    type Environment = Kitchen;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            MealAction::Order { table } => {
                state.courses.clear();
                smallvec![Effect::future(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Some(MealAction::CourseServed { table, course: 1 })
                })]
            },
            MealAction::CourseServed { table, course } => {
                state.courses.push(course);
                if course < 3 {
                    smallvec![Effect::future(async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Some(MealAction::CourseServed { table, course: course + 1 })
                    })]
                } else {
                    smallvec![Effect::future(async move { Some(MealAction::MealFinished { table }) })]
                }
            },
            MealAction::MealFinished { .. } | MealAction::Poured { .. } => smallvec![Effect::None],
            MealAction::Pour => {
                state.drinks += 1;
                let total = state.drinks;
                smallvec![Effect::future(async move { Some(MealAction::Poured { total }) })]
            },
        }
    }
}

fn store() -> Store<MealState, MealAction, Kitchen, MealReducer> {
    Store::new(MealState::default(), MealReducer, Kitchen)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn wait_for_immediate_result() {
    let store = store();

    let result = store
        .send_and_wait_for(
            MealAction::Pour,
            |action| matches!(action, MealAction::Poured { .. }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(result, MealAction::Poured { total: 1 });
}

#[tokio::test]
async fn wait_for_multi_step_flow() {
    let store = store();

    let result = store
        .send_and_wait_for(
            MealAction::Order { table: 7 },
            |action| matches!(action, MealAction::MealFinished { table: 7 }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(result, MealAction::MealFinished { table: 7 });
    assert_eq!(store.state(|s| s.courses.clone()).await, vec![1, 2, 3]);
}

#[tokio::test]
async fn wait_times_out_when_nothing_matches() {
    let store = store();

    let result = store
        .send_and_wait_for(
            MealAction::Pour,
            |action| matches!(action, MealAction::MealFinished { .. }),
            Duration::from_millis(50),
        )
        .await;

    assert!(matches!(result, Err(StoreError::Timeout)));
}

#[tokio::test]
async fn observer_sees_every_course() {
    let store = store();
    let mut rx = store.subscribe_actions();

    store.send(MealAction::Order { table: 1 }).await.unwrap();

    let mut seen = Vec::new();
    loop {
        let action = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("observer timed out")
            .expect("broadcast closed");
        let done = matches!(action, MealAction::MealFinished { .. });
        seen.push(action);
        if done {
            break;
        }
    }

    assert_eq!(
        seen,
        vec![
            MealAction::CourseServed { table: 1, course: 1 },
            MealAction::CourseServed { table: 1, course: 2 },
            MealAction::CourseServed { table: 1, course: 3 },
            MealAction::MealFinished { table: 1 },
        ]
    );
}

#[tokio::test]
async fn multiple_observers_receive_same_actions() {
    let store = store();
    let mut first = store.subscribe_actions();
    let mut second = store.subscribe_actions();

    store.send(MealAction::Pour).await.unwrap();

    let a = tokio::time::timeout(Duration::from_secs(1), first.recv()).await.unwrap().unwrap();
    let b = tokio::time::timeout(Duration::from_secs(1), second.recv()).await.unwrap().unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn sent_actions_are_not_broadcast() {
    let store = store();
    let mut rx = store.subscribe_actions();

    store.send(MealAction::Pour).await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert!(matches!(first, MealAction::Poured { .. }));
}

#[tokio::test]
async fn concurrent_waiters_get_their_own_result() {
    let store = store();

    let tasks: Vec<_> = (10..13)
        .map(|table| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .send_and_wait_for(
                        MealAction::Order { table },
                        move |action| matches!(action, MealAction::MealFinished { table: t } if *t == table),
                        Duration::from_secs(2),
                    )
                    .await
            })
        })
        .collect();

    for (task, table) in tasks.into_iter().zip(10..13) {
        let result = task.await.unwrap().unwrap();
        assert_eq!(result, MealAction::MealFinished { table });
    }
}
