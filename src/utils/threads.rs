use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Run `futures` with at most `max_concurrent` in flight, returning results in
/// input order once every future has settled.
pub async fn do_parallel_with_limit<F, T>(futures: Vec<F>, max_concurrent: usize) -> Vec<T>
where
    F: Future<Output = T>,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

    let controlled_futures = futures.into_iter().map(|fut| {
        let permit = Arc::clone(&semaphore);
        async move {
            // the semaphore is never closed
            let _permit = permit.acquire().await;
            fut.await
        }
    });

    join_all(controlled_futures).await
}
