//! Limits on concurrent CPU-heavy external processes.

use std::sync::LazyLock;

use tokio::sync::Semaphore;

use crate::prelude::*;

/// One permit per CPU, shared by every `pdftocairo` run in this process.
static CPU_SEMAPHORE: LazyLock<Semaphore> =
    LazyLock::new(|| Semaphore::new(num_cpus::get()));

/// Call an async function while holding a permit from the CPU semaphore.
///
/// At most one `pdftocairo` per CPU runs at once, across every extraction in
/// this process.
#[instrument(level = "trace", skip_all)]
pub async fn with_cpu_semaphore<Func, Fut, R>(f: Func) -> Result<R>
where
    Func: FnOnce() -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let permit = CPU_SEMAPHORE
        .acquire()
        .await
        .context("Could not acquire CPU permit")?;
    let result = f().await;
    drop(permit);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_are_returned_after_each_call() {
        let before = CPU_SEMAPHORE.available_permits();
        let value = with_cpu_semaphore(|| async {
            assert!(CPU_SEMAPHORE.available_permits() < num_cpus::get());
            Ok(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        let err = with_cpu_semaphore(|| async { Err::<(), _>(anyhow!("boom")) })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(CPU_SEMAPHORE.available_permits(), before);
    }
}
