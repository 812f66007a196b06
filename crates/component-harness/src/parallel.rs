//! Concurrent harness operations over one settled snapshot.

use futures::future::try_join_all;
use std::future::Future;

use crate::environment::HarnessEnvironment;
use crate::result::HarnessResult;

/// Run independent operations concurrently after a single stability wait.
///
/// Results come back in submission order. Reads inside the batch reuse the
/// settled snapshot; an element action invalidates it, so the next wait after
/// a mutation reaches the backend again. Running the same operations one by
/// one yields the same results.
///
/// ```ignore
/// let rows = env.locator_for_all(".row").await?;
/// let texts = parallel(&env, rows.iter().map(|row| row.text())).await?;
/// ```
///
/// # Errors
///
/// Returns the stabilization failure or the first operation error
pub async fn parallel<I, F, T>(env: &HarnessEnvironment, ops: I) -> HarnessResult<Vec<T>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = HarnessResult<T>>,
{
    env.batch(try_join_all(ops)).await
}
