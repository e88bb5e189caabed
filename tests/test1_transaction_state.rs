use sql_driver::prelude::*;
use sql_driver::escape_identifier;
use sql_driver::test_utils::RecordingPool;

fn quoted(name: &str) -> String {
    format!("\"{name}\"")
}

#[tokio::test]
async fn root_commit_then_second_finalize_fails() -> Result<(), SqlDriverError> {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    let mut trx = driver.begin().await?;
    assert!(trx.is_root());
    assert_eq!(trx.depth(), 0);
    assert_eq!(trx.state(), TransactionState::Pending);

    trx.commit().await?;
    assert_eq!(trx.state(), TransactionState::Committed);

    let err = trx.commit().await.unwrap_err();
    assert!(matches!(
        err,
        SqlDriverError::InvalidTransition {
            action: "committed",
            state: TransactionState::Committed
        }
    ));
    assert_eq!(
        err.to_string(),
        "Transaction can't be committed after being committed."
    );
    assert_eq!(
        trx.rollback().await.unwrap_err().to_string(),
        "Transaction can't be rolled back after being committed."
    );
    assert_eq!(
        trx.savepoint().await.unwrap_err().to_string(),
        "Transaction can't be saved after being committed."
    );
    assert_eq!(trx.state(), TransactionState::Committed);

    // Nothing was sent for the rejected calls.
    assert_eq!(pool.sql(), ["BEGIN", "COMMIT"]);

    drop(trx);
    assert_eq!(pool.releases(), 1);
    Ok(())
}

#[tokio::test]
async fn root_rollback_releases_immediately() -> Result<(), SqlDriverError> {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    let mut trx = driver.begin().await?;
    trx.query(sql!("delete from users where id = {}", 7)?).await?;
    trx.rollback().await?;
    assert_eq!(trx.state(), TransactionState::RolledBack);
    assert_eq!(pool.releases(), 1);

    let err = trx.commit().await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Transaction can't be committed after being rolled back."
    );

    // Queries after release fail locally instead of touching another session.
    let err = trx.query(Query::new("select 1")).await.unwrap_err();
    assert!(matches!(err, SqlDriverError::ConnectionError(_)));

    drop(trx);
    assert_eq!(pool.releases(), 1);
    assert_eq!(
        pool.sql(),
        ["BEGIN", "delete from users where id = $1", "ROLLBACK"]
    );
    Ok(())
}

#[tokio::test]
async fn nested_rollback_returns_to_parent_savepoint() -> Result<(), SqlDriverError> {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    let mut root = driver.begin().await?;
    let root_name = root.savepoint_name().to_string();
    {
        let mut child = root.begin().await?;
        assert!(!child.is_root());
        assert_eq!(child.depth(), 1);
        assert_ne!(child.savepoint_name(), root_name);
        assert_eq!(
            child.parent_savepoint().map(|p| p.as_str()),
            Some(root_name.as_str())
        );

        child.query(sql!("select {}", 1)?).await?;
        child.rollback().await?;
        assert!(child.rollback().await.unwrap_err().is_invalid_transition());
    }
    assert_eq!(root.state(), TransactionState::Pending);
    root.commit().await?;
    drop(root);

    assert_eq!(
        pool.sql(),
        vec![
            "BEGIN".to_string(),
            format!("SAVEPOINT {}", quoted(&root_name)),
            "select $1".to_string(),
            format!("ROLLBACK TO SAVEPOINT {}", quoted(&root_name)),
            "COMMIT".to_string(),
        ]
    );
    // Only the root owns a pooled connection.
    assert_eq!(pool.checkouts(), 1);
    assert_eq!(pool.releases(), 1);
    Ok(())
}

#[tokio::test]
async fn nested_commit_marks_its_own_savepoint() -> Result<(), SqlDriverError> {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    let mut root = driver.begin().await?;
    let child_name = {
        let mut child = root.begin().await?;
        child.savepoint().await?;
        child.commit().await?;
        assert_eq!(child.state(), TransactionState::Committed);
        child.savepoint_name().to_string()
    };
    root.rollback().await?;

    let sql = pool.sql();
    assert_eq!(sql.len(), 5);
    assert_eq!(sql[2], format!("SAVEPOINT {}", quoted(&child_name)));
    assert_eq!(sql[3], format!("SAVEPOINT {}", quoted(&child_name)));
    assert_eq!(sql[4], "ROLLBACK");
    assert!(!sql.iter().any(|s| s == "COMMIT"));
    Ok(())
}

#[tokio::test]
async fn cannot_nest_under_finalized_transaction() -> Result<(), SqlDriverError> {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    let mut root = driver.begin().await?;
    root.commit().await?;
    let err = root.begin().await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Transaction can't be nested after being committed."
    );
    assert_eq!(pool.sql(), ["BEGIN", "COMMIT"]);
    Ok(())
}

#[tokio::test]
async fn grandchildren_track_depth_and_parent() -> Result<(), SqlDriverError> {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    let mut root = driver.begin().await?;
    let mut child = root.begin().await?;
    let child_name = child.savepoint_name().to_string();
    let mut grandchild = child.begin().await?;
    assert_eq!(grandchild.depth(), 2);
    assert_eq!(
        grandchild.parent_savepoint().map(ToString::to_string),
        Some(child_name.clone())
    );
    grandchild.rollback().await?;
    drop(grandchild);

    assert_eq!(
        pool.sql().last().cloned(),
        Some(format!("ROLLBACK TO SAVEPOINT {}", quoted(&child_name)))
    );
    drop(child);
    root.commit().await?;
    Ok(())
}

#[tokio::test]
async fn savepoint_names_are_unique_and_escaped() -> Result<(), SqlDriverError> {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    let first = driver.begin().await?;
    let second = driver.begin().await?;
    assert_ne!(first.savepoint_name(), second.savepoint_name());
    assert!(first.savepoint_name().starts_with("trx"));
    drop((first, second));

    assert_eq!(escape_identifier("trx1"), "\"trx1\"");
    assert_eq!(escape_identifier("we\"ird"), "\"we\"\"ird\"");
    Ok(())
}

#[tokio::test]
async fn dropping_a_pending_root_rolls_back() -> Result<(), SqlDriverError> {
    let pool = RecordingPool::new();
    let driver = Driver::new(pool.clone());

    let trx = driver.begin().await?;
    drop(trx);

    // The rollback runs on a spawned task.
    for _ in 0..100 {
        if pool.releases() == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(pool.sql(), ["BEGIN", "ROLLBACK"]);
    assert_eq!(pool.releases(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_begin_releases_the_connection() {
    let pool = RecordingPool::new();
    pool.fail_when("BEGIN");
    let driver = Driver::new(pool.clone());

    let err = driver.begin().await.unwrap_err();
    assert!(matches!(err, SqlDriverError::ExecutionError(_)));
    assert_eq!(pool.checkouts(), 1);
    assert_eq!(pool.releases(), 1);
}
