//! Integration tests for the cluster reindexing state machine.

mod common;

use chrono::{Duration as ChronoDuration, Utc};

use common::{run_to_completion, Harness, HarnessOptions, ScriptedStatus};
use search_sync::errors::ReindexingError;
use search_sync::reindexing::ReindexingConfig;
use search_sync_repository::opensearch::target_index_name;
use search_sync_repository::{ControlState, IndexLayout, IndexSettings, ReindexingRepository};
use search_sync_shared::{NewReindexingTask, ReindexingState, SourceType};

fn single_slice_task() -> NewReindexingTask {
    NewReindexingTask {
        max_slices_running: 1,
        slice_multiplier: 1,
    }
}

async fn set_shards(harness: &Harness, index: &str, shards: i32) {
    harness.engine.state.lock().await.settings.insert(
        index.to_string(),
        IndexSettings {
            number_of_shards: shards,
            number_of_replicas: 1,
            refresh_interval: Some("30s".to_string()),
        },
    );
}

async fn is_paused(harness: &Harness) -> bool {
    harness.control_state.pause_indexing().await.unwrap()
}

#[tokio::test]
async fn test_slice_retried_twice_then_succeeds() {
    let harness = Harness::new();
    harness.engine.seed("search-sync", 10).await;
    set_shards(&harness, "search-sync-v1", 3).await;
    let task = harness
        .reindexing
        .create_task(single_slice_task())
        .await
        .unwrap();

    // Preconditions pass, indexing is paused.
    assert_eq!(
        harness.reindexing.execute().await.unwrap(),
        Some(ReindexingState::IndexingPaused)
    );
    assert!(is_paused(&harness).await);

    // Tick 1: subtask and three slices are created, slice 0 is dispatched.
    assert_eq!(
        harness.reindexing.execute().await.unwrap(),
        Some(ReindexingState::Reindexing)
    );
    let subtasks = harness.repository.subtasks(task.id).await.unwrap();
    assert_eq!(subtasks.len(), 1);
    let subtask = &subtasks[0];
    assert_eq!(subtask.index_name_from, "search-sync-v1");
    assert_eq!(subtask.documents_count, 10);
    assert_eq!(harness.repository.slices(subtask.id).await.unwrap().len(), 3);
    {
        let state = harness.engine.state.lock().await;
        assert_eq!(state.reindex_calls.len(), 1);
        assert_eq!(state.reindex_calls[0].slice, 0);
        assert_eq!(state.reindex_calls[0].max_slice, 3);
    }

    harness
        .engine
        .script(&[ScriptedStatus::EngineError, ScriptedStatus::EngineError])
        .await;

    // Ticks 2 and 3: slice 0 fails and is redispatched.
    for attempt in 1..=2 {
        assert_eq!(
            harness.reindexing.execute().await.unwrap(),
            Some(ReindexingState::Reindexing)
        );
        let slices = harness.repository.slices(subtask.id).await.unwrap();
        assert_eq!(slices[0].retry_attempt, attempt);
        assert!(!slices[1].is_started());
    }

    // Tick 4: slice 0 completes and slice 1 is dispatched.
    assert_eq!(
        harness.reindexing.execute().await.unwrap(),
        Some(ReindexingState::Reindexing)
    );
    let slices = harness.repository.slices(subtask.id).await.unwrap();
    assert!(slices[0].completed);
    assert!(slices[1].is_running());
    assert!(!slices[2].is_started());

    // Tick 5 dispatches slice 2, tick 6 verifies and switches.
    let states = run_to_completion(&harness, 5).await;
    assert_eq!(
        states,
        vec![ReindexingState::Reindexing, ReindexingState::Success]
    );

    let calls: Vec<i32> = harness
        .engine
        .state
        .lock()
        .await
        .reindex_calls
        .iter()
        .map(|c| c.slice)
        .collect();
    assert_eq!(calls, vec![0, 0, 0, 1, 2]);
    assert_eq!(
        harness.engine.alias_target("search-sync").await,
        Some(subtask.index_name_to.clone())
    );
    assert!(!is_paused(&harness).await);

    let task = harness.repository.get_task(task.id).await.unwrap();
    assert_eq!(task.state, ReindexingState::Success);
    assert!(task.error_message.is_none());
    let subtasks = harness.repository.subtasks(task.id).await.unwrap();
    assert_eq!(subtasks[0].documents_count_target, Some(10));
}

#[tokio::test]
async fn test_slice_failing_past_the_ceiling_fails_the_task() {
    let harness = Harness::with_options(HarnessOptions {
        reindexing: ReindexingConfig {
            max_retry_attempts: 3,
            ..Default::default()
        },
        ..Default::default()
    });
    harness.engine.state.lock().await.default_status = Some(ScriptedStatus::EngineError);
    let task = harness
        .reindexing
        .create_task(single_slice_task())
        .await
        .unwrap();

    let states = run_to_completion(&harness, 20).await;

    assert_eq!(states.last(), Some(&ReindexingState::Failure));
    // The first dispatch plus exactly three retries.
    assert_eq!(harness.engine.state.lock().await.reindex_calls.len(), 4);
    let task = harness.repository.get_task(task.id).await.unwrap();
    let message = task.error_message.unwrap();
    assert!(message.contains("has failed with"), "{}", message);
    assert!(message.contains("an engine error"), "{}", message);
    assert!(!is_paused(&harness).await);
}

#[tokio::test]
async fn test_failure_messages_name_the_cause() {
    let cases = [
        (ScriptedStatus::NotFound, "Couldn't load task status for node:1"),
        (
            ScriptedStatus::CountMismatch,
            "Task node:1 has failed with a documents count mismatch",
        ),
        (
            ScriptedStatus::EngineError,
            "Task node:1 has failed with an engine error",
        ),
    ];

    for (status, expected) in cases {
        let harness = Harness::with_options(HarnessOptions {
            reindexing: ReindexingConfig {
                max_retry_attempts: 0,
                ..Default::default()
            },
            ..Default::default()
        });
        harness.engine.state.lock().await.default_status = Some(status);
        let task = harness
            .reindexing
            .create_task(single_slice_task())
            .await
            .unwrap();

        run_to_completion(&harness, 10).await;

        let task = harness.repository.get_task(task.id).await.unwrap();
        assert_eq!(task.state, ReindexingState::Failure);
        assert_eq!(task.error_message.as_deref(), Some(expected));
    }
}

#[tokio::test]
async fn test_running_slices_are_left_alone() {
    let harness = Harness::new();
    harness.engine.state.lock().await.default_status = Some(ScriptedStatus::Running);
    harness
        .reindexing
        .create_task(single_slice_task())
        .await
        .unwrap();

    let states = run_to_completion(&harness, 6).await;

    assert_eq!(states.last(), Some(&ReindexingState::Reindexing));
    assert_eq!(harness.engine.state.lock().await.reindex_calls.len(), 1);
}

#[tokio::test]
async fn test_every_alias_is_migrated() {
    let harness = Harness::with_options(HarnessOptions {
        layout: IndexLayout::new("search-sync")
            .with_standalone(SourceType::Note, "search-sync-notes"),
        ..Default::default()
    });
    harness.engine.seed("search-sync", 4).await;
    harness.engine.seed("search-sync-notes", 2).await;
    let task = harness
        .reindexing
        .create_task(NewReindexingTask::default())
        .await
        .unwrap();

    let states = run_to_completion(&harness, 10).await;

    assert_eq!(states.last(), Some(&ReindexingState::Success));
    let subtasks = harness.repository.subtasks(task.id).await.unwrap();
    assert_eq!(subtasks.len(), 2);

    let state = harness.engine.state.lock().await;
    for subtask in &subtasks {
        assert!(subtask
            .index_name_to
            .starts_with(&format!("{}-reindex-{}-", subtask.alias_name, task.id)));
        assert_eq!(
            state.aliases.get(&subtask.alias_name),
            Some(&subtask.index_name_to)
        );
    }
    for (_, body) in &state.created_indices {
        assert_eq!(body["settings"]["index"]["number_of_replicas"], 0);
        assert_eq!(body["settings"]["index"]["refresh_interval"], "-1");
    }
    assert_eq!(state.settings_updates.len(), 2);
    for (_, settings) in &state.settings_updates {
        assert_eq!(settings["number_of_replicas"], 1);
        assert_eq!(settings["refresh_interval"], "30s");
        assert_eq!(settings["translog"]["durability"], "request");
    }
    drop(state);

    let task = harness.repository.get_task(task.id).await.unwrap();
    let delete_at = task.delete_original_index_at.unwrap();
    let expected = Utc::now() + ChronoDuration::days(14);
    assert!((expected - delete_at).num_minutes().abs() < 5);
}

#[tokio::test]
async fn test_document_count_mismatch_fails_the_task() {
    let harness = Harness::new();
    harness.engine.seed("search-sync", 10).await;
    let task = harness
        .reindexing
        .create_task(single_slice_task())
        .await
        .unwrap();
    harness.reindexing.execute().await.unwrap();
    harness.reindexing.execute().await.unwrap();
    let target = harness.repository.subtasks(task.id).await.unwrap()[0]
        .index_name_to
        .clone();
    harness
        .engine
        .state
        .lock()
        .await
        .count_overrides
        .insert(target, 3);

    let states = run_to_completion(&harness, 10).await;

    assert_eq!(states.last(), Some(&ReindexingState::Failure));
    let task = harness.repository.get_task(task.id).await.unwrap();
    assert_eq!(
        task.error_message.as_deref(),
        Some("Documents count is different, Count from new index: 3 Count from original index: 10. This likely means something went wrong during reindexing.")
    );
    assert_eq!(
        harness.engine.alias_target("search-sync").await.as_deref(),
        Some("search-sync-v1")
    );
    assert!(!is_paused(&harness).await);
}

#[tokio::test]
async fn test_index_must_be_behind_an_alias() {
    let harness = Harness::new();
    harness.engine.state.lock().await.aliases.clear();
    let task = harness
        .reindexing
        .create_task(NewReindexingTask::default())
        .await
        .unwrap();

    assert_eq!(
        harness.reindexing.execute().await.unwrap(),
        Some(ReindexingState::Failure)
    );
    let task = harness.repository.get_task(task.id).await.unwrap();
    assert_eq!(
        task.error_message.as_deref(),
        Some("Your search index must first use aliases before you can use this feature. Please recreate your index from scratch before reindexing.")
    );
    assert!(!is_paused(&harness).await);
}

#[tokio::test]
async fn test_pending_migrations_block_reindexing() {
    let harness = Harness::with_options(HarnessOptions {
        pending_migrations: true,
        ..Default::default()
    });
    let task = harness
        .reindexing
        .create_task(NewReindexingTask::default())
        .await
        .unwrap();

    harness.reindexing.execute().await.unwrap();

    let task = harness.repository.get_task(task.id).await.unwrap();
    assert_eq!(task.state, ReindexingState::Failure);
    assert_eq!(
        task.error_message.as_deref(),
        Some("You have unapplied search migrations. Please wait until it is finished or fix the migrations before reindexing.")
    );
}

#[tokio::test]
async fn test_storage_must_fit_a_second_copy() {
    let harness = Harness::new();
    {
        let mut state = harness.engine.state.lock().await;
        state.index_size_bytes = 1_000;
        state.free_bytes = 1_500;
    }
    let task = harness
        .reindexing
        .create_task(NewReindexingTask::default())
        .await
        .unwrap();

    harness.reindexing.execute().await.unwrap();

    let task = harness.repository.get_task(task.id).await.unwrap();
    assert_eq!(task.state, ReindexingState::Failure);
    assert_eq!(
        task.error_message.as_deref(),
        Some("You should have at least 2000 bytes of storage available to perform reindexing. Please increase the storage in your cluster before reindexing.")
    );
    assert!(harness.engine.state.lock().await.created_indices.is_empty());
}

#[tokio::test]
async fn test_only_one_task_in_flight() {
    let harness = Harness::new();
    let first = harness
        .reindexing
        .create_task(NewReindexingTask::default())
        .await
        .unwrap();

    let refused = harness
        .reindexing
        .create_task(NewReindexingTask::default())
        .await;
    assert!(matches!(refused, Err(ReindexingError::TaskInProgress(id)) if id == first.id));
    assert_eq!(
        harness.reindexing.current_task().await.unwrap().map(|t| t.id),
        Some(first.id)
    );

    run_to_completion(&harness, 10).await;
    assert!(harness.reindexing.current_task().await.unwrap().is_none());
    assert!(harness
        .reindexing
        .create_task(NewReindexingTask::default())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_old_indices_are_dropped_after_the_grace_period() {
    let harness = Harness::with_options(HarnessOptions {
        reindexing: ReindexingConfig {
            delete_original_index_after: ChronoDuration::zero(),
            ..Default::default()
        },
        ..Default::default()
    });
    let task = harness
        .reindexing
        .create_task(NewReindexingTask::default())
        .await
        .unwrap();
    run_to_completion(&harness, 10).await;

    assert_eq!(harness.reindexing.drop_old_indices().await.unwrap(), 1);
    assert_eq!(
        harness.engine.state.lock().await.deleted_indices,
        vec!["search-sync-v1".to_string()]
    );
    let task = harness.repository.get_task(task.id).await.unwrap();
    assert!(task.delete_original_index_at.is_none());
    assert_eq!(harness.reindexing.drop_old_indices().await.unwrap(), 0);
}

#[tokio::test]
async fn test_old_indices_are_kept_during_the_grace_period() {
    let harness = Harness::new();
    harness
        .reindexing
        .create_task(NewReindexingTask::default())
        .await
        .unwrap();
    run_to_completion(&harness, 10).await;

    assert_eq!(harness.reindexing.drop_old_indices().await.unwrap(), 0);
    assert!(harness.engine.state.lock().await.deleted_indices.is_empty());
}

#[tokio::test]
async fn test_finish_resumes_after_a_failed_alias_switch() {
    let harness = Harness::with_options(HarnessOptions {
        layout: IndexLayout::new("search-sync")
            .with_standalone(SourceType::Note, "search-sync-notes"),
        ..Default::default()
    });
    let task = harness
        .reindexing
        .create_task(NewReindexingTask::default())
        .await
        .unwrap();
    harness.reindexing.execute().await.unwrap();
    harness.reindexing.execute().await.unwrap();
    harness
        .engine
        .state
        .lock()
        .await
        .fail_switch_once
        .insert("search-sync-notes".to_string());

    // The main alias is switched, the notes alias is not.
    assert!(harness.reindexing.execute().await.is_err());
    let subtasks = harness.repository.subtasks(task.id).await.unwrap();
    let main = subtasks
        .iter()
        .find(|s| s.alias_name == "search-sync")
        .unwrap();
    assert_eq!(
        harness.engine.alias_target("search-sync").await,
        Some(main.index_name_to.clone())
    );
    assert!(is_paused(&harness).await);

    assert_eq!(
        harness.reindexing.execute().await.unwrap(),
        Some(ReindexingState::Success)
    );
    let state = harness.engine.state.lock().await;
    for subtask in &subtasks {
        assert_eq!(
            state.aliases.get(&subtask.alias_name),
            Some(&subtask.index_name_to)
        );
    }
    drop(state);
    assert!(!is_paused(&harness).await);
}

#[tokio::test]
async fn test_target_index_left_by_an_interrupted_step_is_reused() {
    let harness = Harness::new();
    harness.engine.seed("search-sync", 3).await;
    let task = harness
        .reindexing
        .create_task(NewReindexingTask::default())
        .await
        .unwrap();
    harness.reindexing.execute().await.unwrap();

    // The index was created, but the subtask was never recorded.
    let target = target_index_name("search-sync", task.id, task.created_at);
    harness
        .engine
        .state
        .lock()
        .await
        .documents
        .insert(target.clone(), Default::default());

    assert_eq!(
        harness.reindexing.execute().await.unwrap(),
        Some(ReindexingState::Reindexing)
    );
    let subtasks = harness.repository.subtasks(task.id).await.unwrap();
    assert_eq!(subtasks.len(), 1);
    assert_eq!(subtasks[0].index_name_to, target);

    let states = run_to_completion(&harness, 10).await;
    assert_eq!(states.last(), Some(&ReindexingState::Success));
    assert_eq!(
        harness.engine.alias_target("search-sync").await,
        Some(target)
    );
}
