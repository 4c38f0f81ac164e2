use std::future::Future;

use futures::StreamExt;

/// Default number of concurrent workers per stage.
pub const DEFAULT_WORKERS: usize = 6;

/// Run `work` over every item with at most `workers` in flight.
///
/// Results come back in input order regardless of completion order. Each
/// unit is independent: a failing unit only affects its own slot, so callers
/// encode failure in `R` (typically `Option` or `Result`).
pub async fn dispatch<T, R, F, Fut>(items: Vec<T>, workers: usize, work: F) -> Vec<R>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    futures::stream::iter(items)
        .map(work)
        .buffered(workers.max(1))
        .collect()
        .await
}
