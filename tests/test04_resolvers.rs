use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use sqlfx::prelude::*;
use sqlfx::schema::decode;
use sqlfx::test_utils::{RecordingAcquirer, result_set};
use sqlfx::SchemaDirection;

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Person {
    id: i64,
    name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Pet {
    owner_id: i64,
    name: String,
}

/// Answers `... IN (ids)` with one row per id up to 100, in request order.
fn people_acquirer() -> RecordingAcquirer {
    RecordingAcquirer::new(|_, params| {
        let rows = params
            .iter()
            .filter_map(Primitive::as_int)
            .filter(|id| *id <= 100)
            .map(|id| vec![Primitive::Int(id), Primitive::Text(format!("person{id}"))])
            .collect();
        Ok(result_set(&["id", "name"], rows))
    })
}

fn people_query(ids: Vec<i64>) -> Fragment {
    FragmentBuilder::new()
        .sql("SELECT id, name FROM people WHERE id IN ")
        .push(Fragment::in_list(ids))
        .build()
}

fn person(id: i64) -> Person {
    Person {
        id,
        name: format!("person{id}"),
    }
}

fn people_resolver(client: &Client) -> Resolver<i64, Person> {
    client.resolver("people", |client: Client, ids: Vec<i64>| async move {
        client.statement(people_query(ids)).await
    })
}

fn person_by_id(client: &Client) -> Resolver<i64, Option<Person>> {
    client.id_resolver(
        "person-by-id",
        |id: &i64| *id,
        |row: &Row| row.get("id").and_then(Primitive::as_int),
        |client: Client, ids: Vec<i64>| async move { client.statement(people_query(ids)).await },
    )
}

#[tokio::test(flavor = "current_thread")]
async fn concurrent_requests_share_one_query() -> Result<(), SqlFxError> {
    let acquirer = people_acquirer();
    let client = acquirer.client(Dialect::Postgres)?;
    let people = people_resolver(&client);

    let found = join_all([3, 1, 2].map(|id| people.execute(id))).await;
    let found: Vec<Person> = found.into_iter().collect::<Result<_, _>>()?;

    assert_eq!(found, vec![person(3), person(1), person(2)]);
    assert_eq!(
        acquirer.statements(),
        vec!["SELECT id, name FROM people WHERE id IN ($1, $2, $3)"]
    );
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn wrong_row_count_fails_the_whole_batch() -> Result<(), SqlFxError> {
    let acquirer = people_acquirer();
    let client = acquirer.client(Dialect::Postgres)?;
    let people = people_resolver(&client);

    // 500 has no row, so three requests get two rows back.
    let results = join_all([1, 500, 2].map(|id| people.execute(id))).await;
    for result in results {
        assert_eq!(
            result,
            Err(SqlFxError::ResultLengthMismatch {
                expected: 3,
                actual: 2
            })
        );
    }
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn id_resolver_matches_rows_by_key() -> Result<(), SqlFxError> {
    let acquirer = people_acquirer();
    let client = acquirer.client(Dialect::Postgres)?;
    let by_id = person_by_id(&client);

    let results = join_all([7, 500, 8].map(|id| by_id.execute(id))).await;
    let results: Vec<Option<Person>> = results.into_iter().collect::<Result<_, _>>()?;

    assert_eq!(results, vec![Some(person(7)), None, Some(person(8))]);
    assert_eq!(acquirer.statements().len(), 1);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn id_resolver_many_groups_rows() -> Result<(), SqlFxError> {
    let acquirer = RecordingAcquirer::new(|_, _| {
        Ok(result_set(
            &["owner_id", "name"],
            vec![
                vec![Primitive::Int(1), Primitive::Text("rex".into())],
                vec![Primitive::Int(1), Primitive::Text("tom".into())],
                vec![Primitive::Int(3), Primitive::Text("kit".into())],
            ],
        ))
    });
    let client = acquirer.client(Dialect::Sqlite)?;
    let pets: Resolver<i64, Vec<Pet>> = client.id_resolver_many(
        "pets-by-owner",
        |owner: &i64| *owner,
        |row: &Row| row.get("owner_id").and_then(Primitive::as_int),
        |client: Client, owners: Vec<i64>| async move {
            client
                .statement(
                    FragmentBuilder::new()
                        .sql("SELECT owner_id, name FROM pets WHERE owner_id IN ")
                        .push(Fragment::in_list(owners))
                        .build(),
                )
                .await
        },
    );

    let results = join_all([1, 2, 3].map(|owner| pets.execute(owner))).await;
    let results: Vec<Vec<Pet>> = results.into_iter().collect::<Result<_, _>>()?;

    let names: Vec<Vec<&str>> = results
        .iter()
        .map(|pets| pets.iter().map(|p| p.name.as_str()).collect())
        .collect();
    assert_eq!(names, vec![vec!["rex", "tom"], vec![], vec!["kit"]]);
    assert!(results[0].iter().all(|p| p.owner_id == 1));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn decode_failure_only_affects_its_request() -> Result<(), SqlFxError> {
    let acquirer = RecordingAcquirer::new(|_, _| {
        Ok(result_set(
            &["id", "name"],
            vec![
                vec![Primitive::Int(1), Primitive::Text("ok".into())],
                vec![Primitive::Int(2), Primitive::Null],
            ],
        ))
    });
    let client = acquirer.client(Dialect::Postgres)?;
    let by_id = person_by_id(&client);

    let mut results = join_all([1, 2].map(|id| by_id.execute(id))).await.into_iter();
    assert!(matches!(results.next(), Some(Ok(Some(Person { id: 1, .. })))));
    assert!(matches!(
        results.next(),
        Some(Err(SqlFxError::Schema {
            direction: SchemaDirection::Result,
            ..
        }))
    ));
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(try_from = "i64")]
struct PositiveId(i64);

impl TryFrom<i64> for PositiveId {
    type Error = String;
    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(format!("{value} is not a valid id"))
        }
    }
}

#[tokio::test(flavor = "current_thread")]
async fn encode_failure_fails_every_request_in_the_batch() -> Result<(), SqlFxError> {
    let acquirer = people_acquirer();
    let client = acquirer.client(Dialect::Postgres)?;
    let people: Resolver<i64, Person> =
        client.resolver("people-checked", |client: Client, ids: Vec<PositiveId>| async move {
            client
                .statement(people_query(ids.into_iter().map(|id| id.0).collect()))
                .await
        });

    let results = join_all([1, -1].map(|id| people.execute(id))).await;
    for result in results {
        assert!(matches!(
            result,
            Err(SqlFxError::Schema {
                direction: SchemaDirection::Request,
                ..
            })
        ));
    }
    assert!(acquirer.statements().is_empty());

    // Failures are not cached.
    assert_eq!(people.execute(1).await?, person(1));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn cache_deduplicates_and_can_be_seeded() -> Result<(), SqlFxError> {
    let acquirer = people_acquirer();
    let client = acquirer.client(Dialect::Postgres)?;
    let people = people_resolver(&client);

    let (a, b) = tokio::join!(people.execute(4), people.execute(4));
    assert_eq!(a?, b?);
    assert_eq!(
        acquirer.statements(),
        vec!["SELECT id, name FROM people WHERE id IN ($1)"]
    );

    // Served from the cache.
    assert_eq!(people.execute(4).await?, person(4));
    assert_eq!(acquirer.statements().len(), 1);

    people.populate_cache(&9, Person { id: 9, name: "seeded".into() })?;
    assert_eq!(people.execute(9).await?.name, "seeded");
    assert_eq!(acquirer.statements().len(), 1);

    people.invalidate_cache(&9)?;
    assert_eq!(people.execute(9).await?, person(9));
    assert_eq!(acquirer.statements().len(), 2);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn fresh_request_cache_forgets_results() -> Result<(), SqlFxError> {
    let acquirer = people_acquirer();
    let client = acquirer.client(Dialect::Postgres)?;
    let people = people_resolver(&client);

    people.execute(5).await?;
    let scoped = client.with_request_cache(RequestCache::default());
    people.execute_in(&scoped, 5).await?;
    assert_eq!(acquirer.statements().len(), 2);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn void_resolver_batches_side_effects() -> Result<(), SqlFxError> {
    let acquirer = RecordingAcquirer::empty();
    let client = acquirer.client(Dialect::Postgres)?;

    #[derive(Serialize, Deserialize)]
    struct Touch {
        id: i64,
    }

    let touch = client.void_resolver("touch", |client: Client, rows: Vec<Touch>| async move {
        client
            .statement(
                FragmentBuilder::new()
                    .sql("UPDATE people SET seen = now() WHERE id IN ")
                    .push(Fragment::in_list(rows.into_iter().map(|t| t.id)))
                    .build(),
            )
            .await
    });

    let results = join_all([1, 2, 3].map(|id| touch.execute(Touch { id }))).await;
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(acquirer.statements().len(), 1);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn single_resolvers_run_one_query_per_request() -> Result<(), SqlFxError> {
    let acquirer = people_acquirer();
    let client = acquirer.client(Dialect::Postgres)?;
    let lookup = |client: Client, id: i64| async move {
        client
            .statement(FragmentBuilder::new().sql("SELECT id, name FROM people WHERE id = ").bind(id))
            .await
    };
    let one: Resolver<i64, Person> = client.single_resolver("one-person", lookup);
    let maybe: Resolver<i64, Option<Person>> = client.single_resolver_option("maybe-person", lookup);

    let results = join_all([1, 2].map(|id| one.execute(id))).await;
    assert_eq!(results, vec![Ok(person(1)), Ok(person(2))]);
    assert_eq!(acquirer.statements().len(), 2);

    assert_eq!(
        one.execute(404).await,
        Err(SqlFxError::ResultLengthMismatch {
            expected: 1,
            actual: 0
        })
    );
    assert_eq!(maybe.execute(404).await?, None);
    assert_eq!(maybe.execute(3).await?, Some(person(3)));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn max_batch_size_splits_batches() -> Result<(), SqlFxError> {
    let acquirer = people_acquirer();
    let client = acquirer.client(Dialect::Postgres)?;
    let people = people_resolver(&client).with_max_batch_size(2);

    let results = join_all([1, 2, 3, 4, 5].map(|id| people.execute(id))).await;
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(acquirer.statements().len(), 3);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn batch_window_collects_staggered_requests() -> Result<(), SqlFxError> {
    let acquirer = people_acquirer();
    let client = acquirer.client(Dialect::Postgres)?;
    let people = people_resolver(&client).with_batch_window(Duration::from_millis(30));

    let late = async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        people.execute(2).await
    };
    let (a, b) = tokio::join!(people.execute(1), late);
    assert_eq!((a?, b?), (person(1), person(2)));
    assert_eq!(acquirer.statements().len(), 1);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn resolvers_inside_a_transaction_use_its_connection() -> Result<(), SqlFxError> {
    let acquirer = people_acquirer();
    let client = acquirer.client(Dialect::Postgres)?;
    let people = people_resolver(&client);

    client
        .with_transaction(|tx| {
            let people = people.clone();
            async move {
                let found = people.execute_in(&tx, 6).await?;
                assert_eq!(found, person(6));
                Ok::<_, SqlFxError>(())
            }
        })
        .await?;

    let executed = acquirer.executed();
    assert_eq!(executed.len(), 3);
    assert!(executed.iter().all(|e| e.connection == executed[0].connection));
    assert_eq!(executed[2].sql, "COMMIT");
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn schema_helpers_decode_rows() -> Result<(), SqlFxError> {
    let acquirer = people_acquirer();
    let client = acquirer.client(Dialect::Postgres)?;
    let query = |client: Client, ids: Vec<i64>| async move {
        client.statement(people_query(ids)).await
    };

    let all: Vec<Person> = client.schema(&vec![1, 2], query).await?;
    assert_eq!(all, vec![person(1), person(2)]);

    let first: Person = client.single_schema(&vec![3], query).await?;
    assert_eq!(first, person(3));

    let none: Option<Person> = client.single_schema_option(&vec![404], query).await?;
    assert_eq!(none, None);

    let broken = result_set(&["id", "name"], vec![vec![Primitive::Int(1), Primitive::Null]]);
    assert!(decode::<Person>(&broken.rows()[0]).is_err());
    Ok(())
}
