//! Configuration loading and the settings derived from it.

use std::sync::Arc;
use std::time::Duration;

use crate::test_helpers::App;
use rstest::rstest;
use taskflow::config::{ConfigError, Environment, TaskflowConfig};
use taskflow::task::{
    adapters::memory::InMemoryTaskRepository,
    domain::{CreateTaskRequest, TaskPatch, UpdatePolicy},
    services::{TaskMutator, TaskReader},
};

#[rstest]
fn empty_document_yields_defaults() -> Result<(), eyre::Report> {
    let config = TaskflowConfig::from_json("{}")?;

    eyre::ensure!(config == TaskflowConfig::default());
    eyre::ensure!(config.environment == Environment::Development);
    eyre::ensure!(config.command_settings().lock_ttl == Duration::from_secs(10));
    eyre::ensure!(config.cache_ttl() == Duration::from_secs(300));
    eyre::ensure!(config.worker_settings().concurrency == 5);
    eyre::ensure!(config.scanner_settings().period == Duration::from_secs(3600));
    eyre::ensure!(config.sweep_settings().batch_size == 100);
    Ok(())
}

#[rstest]
fn nested_overrides_keep_sibling_defaults() -> Result<(), eyre::Report> {
    let config = TaskflowConfig::from_json(
        r#"{
            "environment": "production",
            "update_policy": "permissive",
            "worker": { "concurrency": 2 },
            "overdue": { "batch_size": 25 }
        }"#,
    )?;

    eyre::ensure!(config.environment == Environment::Production);
    eyre::ensure!(config.command_settings().update_policy == UpdatePolicy::Permissive);
    eyre::ensure!(config.worker_settings().concurrency == 2);
    eyre::ensure!(config.worker_settings().poll_interval == Duration::from_millis(500));
    eyre::ensure!(config.sweep_settings().batch_size == 25);
    eyre::ensure!(config.scanner_settings().job_options.max_attempts() == 3);
    Ok(())
}

#[rstest]
fn malformed_document_is_rejected() {
    let result = TaskflowConfig::from_json(r#"{ "lock_ttl_ms": "soon" }"#);

    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[rstest]
#[case(Environment::Development, true)]
#[case(Environment::Test, true)]
#[case(Environment::Production, false)]
fn cache_flush_is_withheld_in_production(#[case] environment: Environment, #[case] permitted: bool) {
    let config = TaskflowConfig {
        environment,
        ..TaskflowConfig::default()
    };

    assert_eq!(config.flush_permit().is_some(), permitted);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn flush_permit_clears_cached_tasks() -> Result<(), eyre::Report> {
    let app = App::new();
    let task = app
        .commands
        .create(CreateTaskRequest::new("Cached", "user-1"))
        .await?;
    app.queries.get_by_id(task.id()).await?;
    let key = taskflow::coordination::Cache::<crate::test_helpers::Store>::key_for(
        "task",
        task.id(),
    );
    eyre::ensure!(app.cache.exists(&key).await?, "task should be cached");

    let permit = app
        .config
        .flush_permit()
        .ok_or_else(|| eyre::eyre!("development config should permit flushing"))?;
    app.cache.clear(&permit).await?;

    eyre::ensure!(!app.cache.exists(&key).await?, "cache should be empty");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn permissive_policy_applies_valid_fields() -> Result<(), eyre::Report> {
    let config = TaskflowConfig::from_json(r#"{ "update_policy": "permissive" }"#)?;
    let app = App::with_repository(Arc::new(InMemoryTaskRepository::new()), config);
    let task = app
        .commands
        .create(CreateTaskRequest::new("Original", "user-1"))
        .await?;

    let updated = app
        .commands
        .update(
            task.id(),
            TaskPatch::new().title("Renamed").priority("urgent-ish"),
        )
        .await?;

    eyre::ensure!(updated.title() == "Renamed");
    eyre::ensure!(updated.priority() == task.priority());
    Ok(())
}
