//! Repository contract tests against the SQLite backend.
//!
//! SQLite is the hermetic backend: every test runs against its own
//! throwaway database file, so the full contract is exercised here.

mod common;

use agent_storage::{
    with_provider, ActionExecution, ControlExecution, ControlExecutionStatus, Repository,
    StorageError, StorageProvider,
};
use common::{remove_db_file, sample_control, sqlite_test_config};
use uuid::Uuid;

#[tokio::test]
async fn create_then_get_round_trips() -> anyhow::Result<()> {
    let (config, path) = sqlite_test_config();
    let provider = StorageProvider::connect(&config).await?;
    let repo = provider.repository::<ControlExecution>().await?;

    let exec = sample_control();
    let stored = repo.create(&exec).await?;
    assert_eq!(stored.id, exec.id);

    let fetched = repo.get(exec.id).await?.expect("record should exist");
    assert_eq!(fetched.id, exec.id);
    assert_eq!(fetched.customer_id, exec.customer_id);
    assert_eq!(fetched.status, ControlExecutionStatus::Pending);

    provider.close().await;
    remove_db_file(&path);
    Ok(())
}

#[tokio::test]
async fn absent_records_are_not_errors() -> anyhow::Result<()> {
    let (config, path) = sqlite_test_config();
    let provider = StorageProvider::connect(&config).await?;
    let repo = provider.repository::<ControlExecution>().await?;

    let missing = Uuid::new_v4();
    assert!(repo.get(missing).await?.is_none());
    assert!(!repo.delete(missing).await?);

    provider.close().await;
    remove_db_file(&path);
    Ok(())
}

#[tokio::test]
async fn update_of_missing_record_is_not_found() -> anyhow::Result<()> {
    let (config, path) = sqlite_test_config();
    let provider = StorageProvider::connect(&config).await?;
    let repo = provider.repository::<ControlExecution>().await?;

    let exec = sample_control();
    let err = repo.update(&exec).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));

    provider.close().await;
    remove_db_file(&path);
    Ok(())
}

#[tokio::test]
async fn update_changes_only_the_targeted_record() -> anyhow::Result<()> {
    let (config, path) = sqlite_test_config();
    let provider = StorageProvider::connect(&config).await?;
    let repo = provider.repository::<ControlExecution>().await?;

    let mut first = sample_control();
    let second = sample_control();
    repo.create(&first).await?;
    repo.create(&second).await?;

    first.mark_failed("browser session lost");
    repo.update(&first).await?;

    let records = repo.list().await?;
    assert_eq!(records.len(), 2);
    for record in records {
        if record.id == first.id {
            assert_eq!(record.status, ControlExecutionStatus::Failed);
            assert_eq!(record.error_message.as_deref(), Some("browser session lost"));
        } else {
            assert_eq!(record.id, second.id);
            assert_eq!(record.status, ControlExecutionStatus::Pending);
            assert!(record.error_message.is_none());
        }
    }

    provider.close().await;
    remove_db_file(&path);
    Ok(())
}

#[tokio::test]
async fn duplicate_create_is_a_conflict() -> anyhow::Result<()> {
    let (config, path) = sqlite_test_config();
    let provider = StorageProvider::connect(&config).await?;
    let repo = provider.repository::<ControlExecution>().await?;

    let exec = sample_control();
    repo.create(&exec).await?;
    let err = repo.create(&exec).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));

    provider.close().await;
    remove_db_file(&path);
    Ok(())
}

#[tokio::test]
async fn get_many_skips_absent_ids() -> anyhow::Result<()> {
    let (config, path) = sqlite_test_config();
    let provider = StorageProvider::connect(&config).await?;
    let repo = provider.repository::<ControlExecution>().await?;

    let first = sample_control();
    let second = sample_control();
    repo.create(&first).await?;
    repo.create(&second).await?;

    let fetched = repo
        .get_many(&[first.id, Uuid::new_v4(), second.id])
        .await?;
    let mut ids: Vec<Uuid> = fetched.iter().map(|r| r.id).collect();
    ids.sort();
    let mut expected = vec![first.id, second.id];
    expected.sort();
    assert_eq!(ids, expected);

    assert!(repo.get_many(&[]).await?.is_empty());

    provider.close().await;
    remove_db_file(&path);
    Ok(())
}

#[tokio::test]
async fn append_json_field_accumulates_log_entries() -> anyhow::Result<()> {
    let (config, path) = sqlite_test_config();
    let provider = StorageProvider::connect(&config).await?;
    let repo = provider.repository::<ControlExecution>().await?;

    let exec = sample_control();
    repo.create(&exec).await?;

    let first = serde_json::json!({"message": "execution started"});
    let second = serde_json::json!({"message": "step 1 complete"});
    assert!(repo.append_json_field(exec.id, "log", &first).await?);
    assert!(repo.append_json_field(exec.id, "log", &second).await?);

    let fetched = repo.get(exec.id).await?.expect("record should exist");
    assert_eq!(fetched.log, vec![first, second]);

    // Absent records report false rather than failing.
    assert!(
        !repo
            .append_json_field(Uuid::new_v4(), "log", &serde_json::json!({}))
            .await?
    );

    provider.close().await;
    remove_db_file(&path);
    Ok(())
}

#[tokio::test]
async fn one_provider_serves_multiple_record_types() -> anyhow::Result<()> {
    let (config, path) = sqlite_test_config();
    let provider = StorageProvider::connect(&config).await?;

    let controls = provider.repository::<ControlExecution>().await?;
    let actions = provider.repository::<ActionExecution>().await?;

    let control = sample_control();
    controls.create(&control).await?;
    let action = ActionExecution::new(control.id, "generic_browser_agent", 0);
    actions.create(&action).await?;

    assert_eq!(controls.list().await?.len(), 1);
    assert_eq!(actions.list().await?.len(), 1);

    // Both repositories borrow the provider's connection: closing the
    // provider invalidates them together.
    provider.close().await;
    assert!(provider.is_closed());
    assert!(matches!(
        controls.get(control.id).await,
        Err(StorageError::Connection(_))
    ));
    assert!(matches!(
        actions.get(action.id).await,
        Err(StorageError::Connection(_))
    ));

    remove_db_file(&path);
    Ok(())
}

#[tokio::test]
async fn scoped_provider_is_released_on_success() -> anyhow::Result<()> {
    let (config, path) = sqlite_test_config();

    let mut captured: Option<StorageProvider> = None;
    let count = with_provider(&config, |provider| {
        captured = Some(provider.clone());
        async move {
            let repo = provider.repository::<ControlExecution>().await?;
            repo.create(&sample_control()).await?;
            Ok(repo.list().await?.len())
        }
    })
    .await?;

    assert_eq!(count, 1);
    assert!(captured.expect("provider should be captured").is_closed());

    remove_db_file(&path);
    Ok(())
}

#[tokio::test]
async fn scoped_provider_is_released_when_the_block_fails() -> anyhow::Result<()> {
    let (config, path) = sqlite_test_config();

    let mut captured: Option<StorageProvider> = None;
    let result: agent_storage::StorageResult<()> = with_provider(&config, |provider| {
        captured = Some(provider.clone());
        async move {
            let repo = provider.repository::<ControlExecution>().await?;
            let exec = sample_control();
            // update before create: surfaces NotFound out of the scope
            repo.update(&exec).await?;
            Ok(())
        }
    })
    .await;

    assert!(matches!(result, Err(StorageError::NotFound(_))));
    assert!(captured.expect("provider should be captured").is_closed());

    remove_db_file(&path);
    Ok(())
}
