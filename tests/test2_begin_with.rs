use sql_driver::prelude::*;
use sql_driver::test_utils::RecordingPool;
use thiserror::Error;

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Driver(#[from] SqlDriverError),
    #[error("validation failed: {0}")]
    Validation(&'static str),
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn count(sql: &[String], statement: &str) -> usize {
    sql.iter().filter(|s| s.starts_with(statement)).count()
}

#[tokio::test]
async fn success_commits_and_releases_once() -> Result<(), SqlDriverError> {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    let affected = driver
        .begin_with(|trx| {
            Box::pin(async move {
                trx.insert_into("users", row! { "username" => "foo" }).await?;
                Ok::<_, SqlDriverError>(1)
            })
        })
        .await?;
    assert_eq!(affected, 1);

    assert_eq!(
        pool.sql(),
        [
            "BEGIN",
            "insert into \"users\" (\"username\") values ($1)",
            "COMMIT"
        ]
    );
    assert_eq!(pool.checkouts(), 1);
    assert_eq!(pool.releases(), 1);
    Ok(())
}

#[tokio::test]
async fn failure_rolls_back_and_returns_callback_error() {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    let result: Result<(), AppError> = driver
        .begin_with(|trx| {
            Box::pin(async move {
                trx.query(sql!("update users set active = {}", false)?).await?;
                Err(AppError::Validation("no active users left"))
            })
        })
        .await;

    assert!(matches!(
        result,
        Err(AppError::Validation("no active users left"))
    ));
    assert_eq!(
        pool.sql(),
        ["BEGIN", "update users set active = $1", "ROLLBACK"]
    );
    assert_eq!(pool.releases(), 1);
}

#[tokio::test]
async fn explicit_commit_in_callback_is_not_repeated() -> Result<(), SqlDriverError> {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    driver
        .begin_with(|trx| {
            Box::pin(async move {
                trx.commit().await?;
                Ok::<_, SqlDriverError>(())
            })
        })
        .await?;

    assert_eq!(pool.sql(), ["BEGIN", "COMMIT"]);
    assert_eq!(pool.releases(), 1);
    Ok(())
}

#[tokio::test]
async fn explicit_rollback_in_callback_keeps_value() -> Result<(), SqlDriverError> {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    let value = driver
        .begin_with(|trx| {
            Box::pin(async move {
                trx.rollback().await?;
                Ok::<_, SqlDriverError>("kept")
            })
        })
        .await?;

    assert_eq!(value, "kept");
    assert_eq!(pool.sql(), ["BEGIN", "ROLLBACK"]);
    assert_eq!(pool.releases(), 1);
    Ok(())
}

#[tokio::test]
async fn error_after_explicit_commit_fails_the_rollback_loudly() {
    init_tracing();
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    let result: Result<(), AppError> = driver
        .begin_with(|trx| {
            Box::pin(async move {
                trx.commit().await?;
                Err(AppError::Validation("too late"))
            })
        })
        .await;

    assert!(matches!(
        result,
        Err(AppError::Driver(SqlDriverError::InvalidTransition {
            action: "rolled back",
            state: TransactionState::Committed,
        }))
    ));
    assert_eq!(pool.sql(), ["BEGIN", "COMMIT"]);
    assert_eq!(pool.releases(), 1);
}

#[tokio::test]
async fn error_after_explicit_root_rollback_fails_the_rollback_loudly() {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    let result: Result<(), AppError> = driver
        .begin_with(|trx| {
            Box::pin(async move {
                trx.rollback().await?;
                Err(AppError::Validation("too late"))
            })
        })
        .await;

    assert!(matches!(
        result,
        Err(AppError::Driver(SqlDriverError::InvalidTransition {
            action: "rolled back",
            state: TransactionState::RolledBack,
        }))
    ));
    assert_eq!(pool.sql(), ["BEGIN", "ROLLBACK"]);
    assert_eq!(pool.releases(), 1);
}

#[tokio::test]
async fn nested_error_after_explicit_rollback_fails_loudly() -> Result<(), AppError> {
    init_tracing();
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    let root_name = driver
        .begin_with(|trx| {
            Box::pin(async move {
                let root_name = trx.savepoint_name().to_string();
                let nested: Result<(), AppError> = trx
                    .begin_with(|child| {
                        Box::pin(async move {
                            child.rollback().await?;
                            Err(AppError::Validation("too late"))
                        })
                    })
                    .await;
                assert!(matches!(
                    nested,
                    Err(AppError::Driver(SqlDriverError::InvalidTransition {
                        action: "rolled back",
                        state: TransactionState::RolledBack,
                    }))
                ));
                assert_eq!(trx.state(), TransactionState::Pending);
                Ok::<_, AppError>(root_name)
            })
        })
        .await?;

    let sql = pool.sql();
    assert_eq!(
        sql,
        vec![
            "BEGIN".to_string(),
            format!("SAVEPOINT \"{root_name}\""),
            format!("ROLLBACK TO SAVEPOINT \"{root_name}\""),
            "COMMIT".to_string(),
        ]
    );
    assert_eq!(count(&sql, "ROLLBACK"), 1);
    assert_eq!(pool.releases(), 1);
    Ok(())
}

#[tokio::test]
async fn nested_error_after_explicit_commit_fails_loudly() -> Result<(), AppError> {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    driver
        .begin_with(|trx| {
            Box::pin(async move {
                let nested: Result<(), AppError> = trx
                    .begin_with(|child| {
                        Box::pin(async move {
                            child.commit().await?;
                            Err(AppError::Validation("too late"))
                        })
                    })
                    .await;
                assert!(matches!(
                    nested,
                    Err(AppError::Driver(SqlDriverError::InvalidTransition {
                        action: "rolled back",
                        state: TransactionState::Committed,
                    }))
                ));
                Ok::<_, AppError>(())
            })
        })
        .await?;

    let sql = pool.sql();
    assert_eq!(count(&sql, "SAVEPOINT"), 2);
    assert_eq!(count(&sql, "ROLLBACK"), 0);
    assert_eq!(sql.last().map(String::as_str), Some("COMMIT"));
    Ok(())
}

#[tokio::test]
async fn nested_failure_rolls_back_to_savepoint_once() -> Result<(), AppError> {
    init_tracing();
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    let root_name = driver
        .begin_with(|trx| {
            Box::pin(async move {
                let root_name = trx.savepoint_name().to_string();
                let nested = trx
                    .begin_with(|child| {
                        Box::pin(async move {
                            child.query(sql!("delete from users where id = {}", 1)?).await?;
                            Err::<(), _>(AppError::Validation("keep user 1"))
                        })
                    })
                    .await;
                assert!(matches!(nested, Err(AppError::Validation("keep user 1"))));
                // The root stays usable after the nested scope failed.
                assert_eq!(trx.state(), TransactionState::Pending);
                trx.query(Query::new("select 1")).await?;
                Ok::<_, AppError>(root_name)
            })
        })
        .await?;

    let sql = pool.sql();
    assert_eq!(
        sql,
        vec![
            "BEGIN".to_string(),
            format!("SAVEPOINT \"{root_name}\""),
            "delete from users where id = $1".to_string(),
            format!("ROLLBACK TO SAVEPOINT \"{root_name}\""),
            "select 1".to_string(),
            "COMMIT".to_string(),
        ]
    );
    assert_eq!(count(&sql, "ROLLBACK"), 1);
    assert_eq!(pool.releases(), 1);
    Ok(())
}

#[tokio::test]
async fn nested_success_marks_child_savepoint() -> Result<(), SqlDriverError> {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    let (root_name, child_name) = driver
        .begin_with(|trx| {
            Box::pin(async move {
                let root_name = trx.savepoint_name().to_string();
                let child_name = trx
                    .begin_with(|child| {
                        Box::pin(async move {
                            child.insert_into("users", row! { "username" => "bar" }).await?;
                            Ok::<_, SqlDriverError>(child.savepoint_name().to_string())
                        })
                    })
                    .await?;
                Ok::<_, SqlDriverError>((root_name, child_name))
            })
        })
        .await?;

    assert_eq!(
        pool.sql(),
        vec![
            "BEGIN".to_string(),
            format!("SAVEPOINT \"{root_name}\""),
            "insert into \"users\" (\"username\") values ($1)".to_string(),
            format!("SAVEPOINT \"{child_name}\""),
            "COMMIT".to_string(),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn nested_explicit_commit_is_not_repeated() -> Result<(), SqlDriverError> {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    driver
        .begin_with(|trx| {
            Box::pin(async move {
                trx.begin_with(|child| {
                    Box::pin(async move {
                        child.commit().await?;
                        Ok::<_, SqlDriverError>(())
                    })
                })
                .await
            })
        })
        .await?;

    let sql = pool.sql();
    assert_eq!(sql.len(), 4);
    assert_eq!(count(&sql, "SAVEPOINT"), 2);
    assert_eq!(sql[3], "COMMIT");
    Ok(())
}

#[tokio::test]
async fn deeply_nested_failure_only_unwinds_its_own_scope() -> Result<(), SqlDriverError> {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    driver
        .begin_with(|trx| {
            Box::pin(async move {
                trx.begin_with(|child| {
                    Box::pin(async move {
                        let child_name = child.savepoint_name().to_string();
                        let inner: Result<(), SqlDriverError> = child
                            .begin_with(|grandchild| {
                                Box::pin(async move {
                                    assert_eq!(grandchild.depth(), 2);
                                    Err(SqlDriverError::ExecutionError("inner".into()))
                                })
                            })
                            .await;
                        assert!(inner.is_err());
                        Ok::<_, SqlDriverError>(child_name)
                    })
                })
                .await
            })
        })
        .await
        .map(|child_name| {
            let sql = pool.sql();
            assert!(sql.contains(&format!("ROLLBACK TO SAVEPOINT \"{child_name}\"")));
            assert_eq!(count(&sql, "ROLLBACK"), 1);
            assert_eq!(sql.last().map(String::as_str), Some("COMMIT"));
        })
}

#[tokio::test]
async fn failed_rollback_replaces_error() {
    init_tracing();
    let pool = RecordingPool::new();
    pool.fail_when("ROLLBACK");
    let driver = Driver::new(pool.clone());

    let result: Result<(), AppError> = driver
        .begin_with(|_trx| Box::pin(async move { Err(AppError::Validation("boom")) }))
        .await;

    match result {
        Err(AppError::Driver(SqlDriverError::ExecutionError(msg))) => {
            assert!(msg.contains("ROLLBACK"), "{msg}");
        }
        other => panic!("expected rollback failure, got {other:?}"),
    }
    assert_eq!(pool.releases(), 1);
}

#[tokio::test]
async fn failed_commit_rolls_back() {
    let pool = RecordingPool::new();
    pool.fail_when("COMMIT");
    let driver = Driver::new(pool.clone());

    let result = driver
        .begin_with(|_trx| Box::pin(async move { Ok::<_, SqlDriverError>(()) }))
        .await;

    assert!(matches!(result, Err(SqlDriverError::ExecutionError(_))));
    assert_eq!(pool.sql(), ["BEGIN", "COMMIT", "ROLLBACK"]);
    assert_eq!(pool.releases(), 1);
}

#[tokio::test]
async fn checkout_failure_surfaces_before_callback() {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());
    driver.disconnect();

    let mut called = false;
    let result = driver
        .begin_with(|_trx| {
            called = true;
            Box::pin(async move { Ok::<_, SqlDriverError>(()) })
        })
        .await;

    assert!(matches!(result, Err(SqlDriverError::ConnectionError(_))));
    assert!(!called);
    assert!(pool.sql().is_empty());
}
