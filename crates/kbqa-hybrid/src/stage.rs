//! Per-stage deadlines and error classification for external service calls.

use std::future::Future;
use std::time::Duration;

use kbqa_core::error::{Error, Result, Stage};

/// Await `fut` under `limit`, attributing timeouts and failures to `stage`.
pub(crate) async fn with_deadline<T, F>(stage: Stage, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Err(_) => Err(Error::Timeout { stage, after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX) }),
        Ok(Err(e)) => Err(classify(stage, &e)),
        Ok(Ok(v)) => Ok(v),
    }
}

/// Run a synchronous model or index call on the blocking pool under `limit`.
pub(crate) async fn blocking_with_deadline<T, F>(stage: Stage, limit: Duration, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    with_deadline(stage, limit, async move {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| anyhow::anyhow!("worker task failed: {e}"))?
    })
    .await
}

pub(crate) fn classify(stage: Stage, err: &anyhow::Error) -> Error {
    let message = format!("{err:#}");
    match stage {
        Stage::Rerank => Error::Rerank(message),
        Stage::Embed | Stage::VectorSearch | Stage::KeywordSearch | Stage::Context => Error::Retrieval { stage, message },
        Stage::Router | Stage::Answer | Stage::Judge => Error::Generation { stage, message },
    }
}
