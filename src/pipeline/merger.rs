//! Fan-in of per-root entry streams.

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

/// Merge several bounded sources into one.
///
/// Every item of every source is forwarded exactly once, and items of one
/// source keep their relative order. Interleaving across sources is
/// unspecified. A `None` source counts as already closed. The output closes
/// once every source has closed, or when `cancel` fires.
///
/// # Errors
///
/// Returns [`PipelineError::NoSources`] if `sources` is empty.
pub fn merge<T: Send + 'static>(
    sources: Vec<Option<mpsc::Receiver<T>>>,
    capacity: usize,
    cancel: CancellationToken,
) -> Result<mpsc::Receiver<T>, PipelineError> {
    if sources.is_empty() {
        return Err(PipelineError::NoSources);
    }

    let total = sources.len();
    let streams: Vec<ReceiverStream<T>> = sources
        .into_iter()
        .flatten()
        .map(ReceiverStream::new)
        .collect();
    let (tx, rx) = mpsc::channel(capacity.max(1));

    tracing::debug!(
        sources = total,
        open = streams.len(),
        "Merging entry streams"
    );

    tokio::spawn(async move {
        let mut merged = stream::select_all(streams);
        let mut forwarded: u64 = 0;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(forwarded, "Merge cancelled");
                    break;
                }
                item = merged.next() => {
                    let Some(item) = item else {
                        tracing::debug!(forwarded, "All sources closed");
                        break;
                    };
                    if tx.send(item).await.is_err() {
                        tracing::debug!(forwarded, "Merged receiver dropped");
                        break;
                    }
                    forwarded += 1;
                }
            }
        }
    });

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn source(items: Vec<(u8, u32)>) -> mpsc::Receiver<(u8, u32)> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            for item in items {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    async fn drain<T>(mut rx: mpsc::Receiver<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn test_merge_is_complete_and_keeps_source_order() {
        let a: Vec<(u8, u32)> = (0..50).map(|i| (0, i)).collect();
        let b: Vec<(u8, u32)> = (0..30).map(|i| (1, i)).collect();
        let c: Vec<(u8, u32)> = (0..10).map(|i| (2, i)).collect();

        let rx = merge(
            vec![Some(source(a)), Some(source(b)), Some(source(c))],
            1,
            CancellationToken::new(),
        )
        .unwrap();
        let out = drain(rx).await;
        assert_eq!(out.len(), 90);

        let mut per_source: HashMap<u8, Vec<u32>> = HashMap::new();
        for (src, seq) in out {
            per_source.entry(src).or_default().push(seq);
        }
        assert_eq!(per_source[&0], (0..50).collect::<Vec<_>>());
        assert_eq!(per_source[&1], (0..30).collect::<Vec<_>>());
        assert_eq!(per_source[&2], (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_absent_sources_count_as_closed() {
        let rx = merge(
            vec![None, Some(source(vec![(0, 1), (0, 2)])), None],
            1,
            CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(drain(rx).await, vec![(0, 1), (0, 2)]);
    }

    #[tokio::test]
    async fn test_all_sources_absent_closes_immediately() {
        let rx = merge::<u32>(vec![None, None], 1, CancellationToken::new()).unwrap();
        assert!(drain(rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_no_sources_is_an_error() {
        let err = merge::<u32>(Vec::new(), 1, CancellationToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::NoSources));
    }

    #[tokio::test]
    async fn test_empty_source_closes_output() {
        let (tx, rx) = mpsc::channel::<u32>(1);
        drop(tx);
        let out = merge(vec![Some(rx)], 1, CancellationToken::new()).unwrap();
        assert!(drain(out).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_closes_output() {
        let (tx, rx) = mpsc::channel::<u32>(1);
        let cancel = CancellationToken::new();
        let mut out = merge(vec![Some(rx)], 1, cancel.clone()).unwrap();

        tx.send(7).await.unwrap();
        assert_eq!(out.recv().await, Some(7));

        cancel.cancel();
        assert_eq!(out.recv().await, None);
        drop(tx);
    }
}
