use std::future::Future;

use cms_core::{CmsError, CmsResult, ErrorKind};
use cms_store::Transactor;
use tracing::warn;

/// Run `op` inside a transaction, retrying up to `retries` more times when it
/// fails with [`ErrorKind::Conflict`].
///
/// `op` is called once per attempt; any error rolls the attempt back. Side
/// effects outside the store are not rolled back, so callers keep them out of
/// `op` or make them run once.
pub async fn with_tx_retry<T, F, Fut>(transactor: &dyn Transactor, retries: usize, mut op: F) -> CmsResult<T>
where
    T: Send,
    F: FnMut() -> Fut,
    Fut: Future<Output = CmsResult<T>> + Send,
{
    let mut attempt = 0;
    loop {
        let tx = transactor.begin().await?;
        let work = op();
        let mut outcome = None;
        tx.scope(Box::pin(async {
            outcome = Some(work.await);
        }))
        .await;

        let result = match outcome {
            Some(Ok(value)) => tx.commit().await.map(|()| value),
            Some(Err(err)) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
            None => Err(CmsError::internal("transaction work finished without a result")),
        };

        match result {
            Err(err) if err.is(ErrorKind::Conflict) && attempt < retries => {
                attempt += 1;
                warn!(attempt, error = %err, "transaction conflict, retrying");
            }
            other => return other,
        }
    }
}
