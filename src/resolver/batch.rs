use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::{BoxFuture, join_all};
use tokio::sync::oneshot;

use crate::client::Client;
use crate::error::SqlFxError;

/// Runs one batch: `inputs[i]` must produce `results[i]`.
pub(crate) type BatchFn<I, A> =
    Arc<dyn Fn(Client, Vec<I>) -> BoxFuture<'static, Vec<Result<A, SqlFxError>>> + Send + Sync>;

struct Pending<I, A> {
    client: Client,
    input: I,
    respond_to: oneshot::Sender<Result<A, SqlFxError>>,
}

struct Queue<I, A> {
    items: Vec<Pending<I, A>>,
    flush_scheduled: bool,
}

/// Collects requests issued close together and runs them as one batch.
///
/// The first request after a flush schedules the next flush; it happens after
/// one scheduler tick, or after `window` when one is set. Requests from
/// different transaction scopes are never mixed in one batch.
pub(crate) struct Batcher<I, A> {
    run: BatchFn<I, A>,
    queue: Arc<Mutex<Queue<I, A>>>,
    window: Option<Duration>,
    max_batch_size: Option<usize>,
}

impl<I, A> Batcher<I, A>
where
    I: Send + 'static,
    A: Send + 'static,
{
    pub(crate) fn new(run: BatchFn<I, A>) -> Self {
        Self {
            run,
            queue: Arc::new(Mutex::new(Queue {
                items: Vec::new(),
                flush_scheduled: false,
            })),
            window: None,
            max_batch_size: None,
        }
    }

    /// Same batch function with different timing; the queue starts empty.
    pub(crate) fn reconfigure(&self, window: Option<Duration>, max_batch_size: Option<usize>) -> Self {
        let mut batcher = Self::new(Arc::clone(&self.run));
        batcher.window = window;
        batcher.max_batch_size = max_batch_size.filter(|n| *n > 0);
        batcher
    }

    pub(crate) fn window(&self) -> Option<Duration> {
        self.window
    }

    pub(crate) fn max_batch_size(&self) -> Option<usize> {
        self.max_batch_size
    }

    /// Queue `input` and return the receiver its result will arrive on.
    pub(crate) fn enqueue(
        &self,
        client: Client,
        input: I,
    ) -> oneshot::Receiver<Result<A, SqlFxError>> {
        let (respond_to, receiver) = oneshot::channel();
        let schedule = {
            let mut queue = lock(&self.queue);
            queue.items.push(Pending {
                client,
                input,
                respond_to,
            });
            !std::mem::replace(&mut queue.flush_scheduled, true)
        };

        if schedule {
            let queue = Arc::clone(&self.queue);
            let run = Arc::clone(&self.run);
            let window = self.window;
            let max_batch_size = self.max_batch_size;
            tokio::spawn(async move {
                match window {
                    Some(window) => tokio::time::sleep(window).await,
                    None => tokio::task::yield_now().await,
                }
                let items = {
                    let mut queue = lock(&queue);
                    queue.flush_scheduled = false;
                    std::mem::take(&mut queue.items)
                };
                dispatch(&run, items, max_batch_size).await;
            });
        }
        receiver
    }
}

fn lock<I, A>(queue: &Mutex<Queue<I, A>>) -> MutexGuard<'_, Queue<I, A>> {
    queue
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

async fn dispatch<I, A>(run: &BatchFn<I, A>, items: Vec<Pending<I, A>>, max_batch_size: Option<usize>)
where
    I: Send + 'static,
    A: Send + 'static,
{
    let mut groups: HashMap<Option<u64>, Vec<Pending<I, A>>> = HashMap::new();
    for item in items {
        let scope = item.client.transaction().map(|ctx| ctx.id());
        groups.entry(scope).or_default().push(item);
    }

    let mut batches = Vec::new();
    for (_, mut group) in groups {
        let chunk = max_batch_size.unwrap_or(group.len()).max(1);
        while !group.is_empty() {
            let rest = group.split_off(chunk.min(group.len()));
            batches.push(run_batch(run, std::mem::replace(&mut group, rest)));
        }
    }
    join_all(batches).await;
}

async fn run_batch<I, A>(run: &BatchFn<I, A>, batch: Vec<Pending<I, A>>)
where
    I: Send + 'static,
    A: Send + 'static,
{
    let Some(client) = batch.first().map(|p| p.client.clone()) else {
        return;
    };
    let size = batch.len();
    let (inputs, senders): (Vec<I>, Vec<_>) = batch
        .into_iter()
        .map(|p| (p.input, p.respond_to))
        .unzip();

    tracing::debug!(size, "running resolver batch");
    let results = run(client, inputs).await;

    if results.len() == size {
        for (sender, result) in senders.into_iter().zip(results) {
            // The requester may have given up; nothing to deliver then.
            let _ = sender.send(result);
        }
    } else {
        let err = SqlFxError::ResultLengthMismatch {
            expected: size,
            actual: results.len(),
        };
        for sender in senders {
            let _ = sender.send(Err(err.clone()));
        }
    }
}
