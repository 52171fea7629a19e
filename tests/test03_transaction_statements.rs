use std::sync::Arc;
use std::time::Duration;

use sqlfx::prelude::*;
use sqlfx::test_utils::RecordingAcquirer;

#[tokio::test(flavor = "current_thread")]
async fn nested_scopes_emit_savepoint_statements() -> Result<(), SqlFxError> {
    let acquirer = RecordingAcquirer::empty();
    let client = acquirer.client(Dialect::Postgres)?;

    client
        .with_transaction(|tx| async move {
            tx.statement("INSERT INTO t VALUES (1)").await?;
            let inner = tx
                .with_transaction(|sp| async move {
                    sp.statement("INSERT INTO t VALUES (2)").await?;
                    Err::<(), _>(SqlFxError::sql("inner failure"))
                })
                .await;
            assert!(inner.is_err());
            Ok::<_, SqlFxError>(())
        })
        .await?;

    assert_eq!(
        acquirer.statements(),
        vec![
            "BEGIN",
            "INSERT INTO t VALUES (1)",
            "SAVEPOINT sqlfx1",
            "INSERT INTO t VALUES (2)",
            "ROLLBACK TO SAVEPOINT sqlfx1",
            "COMMIT",
        ]
    );
    // One checkout serves the whole transaction.
    assert_eq!(acquirer.acquired_count(), 1);
    assert!(acquirer.executed().iter().all(|e| e.connection == 1));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn savepoint_names_follow_depth() -> Result<(), SqlFxError> {
    let acquirer = RecordingAcquirer::empty();
    let client = acquirer.client(Dialect::Sqlite)?;

    client
        .with_transaction(|tx| async move {
            tx.with_transaction(|one| async move {
                one.with_transaction(|two| async move {
                    assert_eq!(two.transaction_depth(), Some(2));
                    Ok::<_, SqlFxError>(())
                })
                .await
            })
            .await
        })
        .await?;

    assert_eq!(
        acquirer.statements(),
        vec!["BEGIN", "SAVEPOINT sqlfx1", "SAVEPOINT sqlfx2", "COMMIT"]
    );
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn mssql_uses_transaction_keywords() -> Result<(), SqlFxError> {
    let acquirer = RecordingAcquirer::empty();
    let client = acquirer.client(Dialect::Mssql)?;

    let _ = client
        .with_transaction(|tx| async move {
            tx.with_transaction(|_sp| async move { Err::<(), _>(SqlFxError::sql("no")) })
                .await
        })
        .await;

    assert_eq!(
        acquirer.statements(),
        vec![
            "BEGIN TRANSACTION",
            "SAVE TRANSACTION sqlfx1",
            "ROLLBACK TRANSACTION sqlfx1",
            "ROLLBACK TRANSACTION",
        ]
    );
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn rollback_failure_does_not_hide_the_original_error() -> Result<(), SqlFxError> {
    let acquirer = RecordingAcquirer::new(|sql, _| {
        if sql == "ROLLBACK" {
            Err(SqlFxError::sql("connection lost"))
        } else {
            Ok(ResultSet::affected(0))
        }
    });
    let client = acquirer.client(Dialect::Postgres)?;

    let outcome = client
        .with_transaction(|_tx| async move { Err::<(), _>(SqlFxError::sql("business rule")) })
        .await;
    assert_eq!(outcome, Err(SqlFxError::sql("business rule")));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn commit_failure_is_surfaced() -> Result<(), SqlFxError> {
    let acquirer = RecordingAcquirer::new(|sql, _| {
        if sql == "COMMIT" {
            Err(SqlFxError::sql("serialization failure"))
        } else {
            Ok(ResultSet::affected(0))
        }
    });
    let client = acquirer.client(Dialect::Postgres)?;

    let outcome = client
        .with_transaction(|_tx| async move { Ok::<_, SqlFxError>(42) })
        .await;
    assert_eq!(outcome, Err(SqlFxError::sql("serialization failure")));
    assert_eq!(acquirer.statements(), vec!["BEGIN", "COMMIT", "ROLLBACK"]);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn cancelled_transaction_is_rolled_back() -> Result<(), SqlFxError> {
    let acquirer = RecordingAcquirer::empty();
    let client = acquirer.client(Dialect::Postgres)?;

    let cancelled = tokio::time::timeout(
        Duration::from_millis(20),
        client.with_transaction(|tx| async move {
            tx.statement("UPDATE t SET n = n + 1").await?;
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, SqlFxError>(())
        }),
    )
    .await;
    assert!(cancelled.is_err());

    // The rollback runs on a spawned task.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        acquirer.statements(),
        vec!["BEGIN", "UPDATE t SET n = n + 1", "ROLLBACK"]
    );
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn statements_outside_transactions_acquire_per_statement() -> Result<(), SqlFxError> {
    let acquirer = RecordingAcquirer::empty();
    let client = acquirer.client(Dialect::Postgres)?;

    client.statement("SELECT 1").await?;
    client.statement("SELECT 2").await?;
    assert_eq!(acquirer.acquired_count(), 2);
    assert!(!client.in_transaction());
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn result_names_are_transformed_unless_disabled() -> Result<(), SqlFxError> {
    let acquirer = RecordingAcquirer::new(|_, _| {
        Ok(sqlfx::test_utils::result_set(
            &["user_id", "display_name"],
            vec![vec![Primitive::Int(1), Primitive::Text("Ada".into())]],
        ))
    });
    let client = Client::builder(Dialect::Postgres)
        .acquirer(Arc::new(acquirer.clone()))
        .transforms(NameTransforms::camel_case())
        .build()?;

    let rows = client
        .statement(FragmentBuilder::new().sql("SELECT ").ident("userId").sql(" FROM users"))
        .await?;
    assert_eq!(rows.columns(), ["userId", "displayName"]);
    assert_eq!(acquirer.statements(), vec![r#"SELECT "user_id" FROM users"#]);

    let raw = client
        .statement("SELECT user_id, display_name FROM users")
        .without_transform()
        .await?;
    assert_eq!(raw.columns(), ["user_id", "display_name"]);
    Ok(())
}
