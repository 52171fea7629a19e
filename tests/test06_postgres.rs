#![cfg(feature = "postgres")]

//! Runs against a live server when `SQLFX_TEST_PG_URL` is set, e.g.
//! `postgres://testuser@localhost:5432/testing`; otherwise each test passes
//! without doing anything.

use std::env;

use serde::Deserialize;
use sqlfx::prelude::*;

async fn connect() -> Result<Option<Client>, SqlFxError> {
    let Ok(url) = env::var("SQLFX_TEST_PG_URL") else {
        return Ok(None);
    };
    let opts = PgOptions::builder()
        .url(url)
        .pool(PoolConfig::default().max_size(4))
        .finish()?;
    Ok(Some(Client::postgres(opts).await?))
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Reading {
    sensor: String,
    value: f64,
    small: i64,
}

#[tokio::test(flavor = "multi_thread")]
async fn parameters_narrow_to_declared_types() -> Result<(), SqlFxError> {
    let Some(client) = connect().await? else {
        return Ok(());
    };
    client
        .execute_batch(
            "DROP TABLE IF EXISTS sqlfx_readings;
             CREATE TABLE sqlfx_readings (sensor TEXT, value REAL, small SMALLINT, meta JSONB)",
        )
        .await?;

    let insert = FragmentBuilder::new()
        .sql("INSERT INTO sqlfx_readings ")
        .push(Fragment::insert(vec![
            Record::new()
                .with("sensor", "a")
                .with("value", 1_i64)
                .with("small", 7_i64)
                .with("meta", serde_json::json!({"unit": "c"})),
        ]))
        .build();
    assert_eq!(client.statement(insert).execute().await?, 1);

    let rows = client
        .statement("SELECT sensor, value::float8 AS value, small::int8 AS small FROM sqlfx_readings")
        .await?;
    let readings: Vec<Reading> = sqlfx::schema::decode_all(rows.rows())?;
    assert_eq!(
        readings,
        vec![Reading {
            sensor: "a".into(),
            value: 1.0,
            small: 7
        }]
    );
    client.execute_batch("DROP TABLE sqlfx_readings").await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn savepoint_rollback_on_postgres() -> Result<(), SqlFxError> {
    let Some(client) = connect().await? else {
        return Ok(());
    };
    client
        .execute_batch(
            "DROP TABLE IF EXISTS sqlfx_tx; CREATE TABLE sqlfx_tx (name TEXT NOT NULL)",
        )
        .await?;

    client
        .with_transaction(|tx| async move {
            tx.statement("INSERT INTO sqlfx_tx VALUES ('X')").execute().await?;
            let _ = tx
                .with_transaction(|sp| async move {
                    sp.statement("INSERT INTO sqlfx_tx VALUES ('Y')").execute().await?;
                    Err::<(), _>(SqlFxError::sql("drop Y"))
                })
                .await;
            Ok::<_, SqlFxError>(())
        })
        .await?;

    let names = client
        .statement("SELECT name FROM sqlfx_tx ORDER BY name")
        .values()
        .await?;
    assert_eq!(names, vec![vec![Primitive::Text("X".into())]]);
    client.execute_batch("DROP TABLE sqlfx_tx").await?;
    Ok(())
}
