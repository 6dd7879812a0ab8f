//! Chunked calls to the metadata adapter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::config::TrackerConfig;
use crate::platform::{FetchError, FetchResult, VideoSource};

/// Results for one chunk, one entry per requested id.
pub type ChunkResults = HashMap<String, FetchResult>;

/// Splits lookups into adapter-sized chunks and normalises the responses.
pub struct BatchCaller {
    source: Arc<dyn VideoSource>,
    chunk_size: usize,
    chunk_timeout: Duration,
    spacing: Duration,
}

impl BatchCaller {
    pub fn new(source: Arc<dyn VideoSource>, config: &TrackerConfig) -> Self {
        let chunk_size = config.max_batch_size.min(source.batch_limit()).max(1);
        Self {
            source,
            chunk_size,
            chunk_timeout: config.chunk_timeout(),
            spacing: config.chunk_spacing(),
        }
    }

    pub fn platform(&self) -> &'static str {
        self.source.platform()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Time allowed for looking up `count` ids: one chunk timeout per chunk
    /// plus one spare.
    pub fn timeout_for(&self, count: usize) -> Duration {
        let chunks = u32::try_from(count / self.chunk_size + 1).unwrap_or(u32::MAX);
        self.chunk_timeout.saturating_mul(chunks)
    }

    /// Look up one chunk.
    ///
    /// A failed call is reported as an IO failure for every id; ids the
    /// adapter left out of its response are reported as not found.
    pub async fn fetch_chunk(&self, ids: &[String]) -> ChunkResults {
        match self.source.get_videos(ids).await {
            Ok(mut found) => ids
                .iter()
                .map(|id| {
                    let result = found.remove(id).unwrap_or(Err(FetchError::NotFound));
                    (id.clone(), result)
                })
                .collect(),
            Err(e) => {
                warn!(platform = self.platform(), ids = ids.len(), error = %e, "Metadata call failed");
                let error = match e {
                    FetchError::Io(msg) => FetchError::Io(msg),
                    FetchError::NotFound => FetchError::io("whole batch reported not found"),
                };
                ids.iter()
                    .map(|id| (id.clone(), Err(error.clone())))
                    .collect()
            }
        }
    }

    /// Look up `ids` chunk by chunk, yielding each chunk's results as soon
    /// as they arrive. Consecutive calls are spaced apart.
    pub fn stream(&self, ids: Vec<String>) -> impl Stream<Item = ChunkResults> + '_ {
        let chunks: Vec<Vec<String>> = ids.chunks(self.chunk_size).map(<[String]>::to_vec).collect();
        debug!(platform = self.platform(), ids = ids.len(), chunks = chunks.len(), "Calling metadata API");

        stream::iter(chunks.into_iter().enumerate()).then(move |(index, chunk)| async move {
            if index > 0 && !self.spacing.is_zero() {
                tokio::time::sleep(self.spacing).await;
            }
            self.fetch_chunk(&chunk).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::VideoInfo;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct ScriptedSource {
        calls: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl VideoSource for ScriptedSource {
        fn platform(&self) -> &'static str {
            "test"
        }

        fn batch_limit(&self) -> usize {
            2
        }

        async fn get_videos(&self, ids: &[String]) -> Result<ChunkResults, FetchError> {
            self.calls.lock().push(ids.to_vec());
            if self.fail {
                return Err(FetchError::io("boom"));
            }
            // Drops the last id of every call.
            Ok(ids
                .iter()
                .take(ids.len() - 1)
                .map(|id| {
                    let info = VideoInfo {
                        id: id.clone(),
                        ..Default::default()
                    };
                    (id.clone(), Ok(info))
                })
                .collect())
        }
    }

    fn caller(fail: bool) -> (Arc<ScriptedSource>, BatchCaller) {
        let source = Arc::new(ScriptedSource {
            calls: Mutex::new(Vec::new()),
            fail,
        });
        let config = TrackerConfig {
            chunk_spacing_ms: 0,
            ..Default::default()
        };
        let caller = BatchCaller::new(source.clone(), &config);
        (source, caller)
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("v{i}")).collect()
    }

    #[test]
    fn test_chunk_size_and_timeout() {
        let (_, caller) = caller(false);
        assert_eq!(caller.chunk_size(), 2);
        assert_eq!(caller.timeout_for(0), Duration::from_secs(20));
        assert_eq!(caller.timeout_for(5), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_missing_ids_are_not_found() {
        let (source, caller) = caller(false);
        let chunks: Vec<ChunkResults> = caller.stream(ids(3)).collect().await;

        assert_eq!(source.calls.lock().len(), 2);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0]["v0"].is_ok());
        assert_eq!(chunks[0]["v1"], Err(FetchError::NotFound));
        assert_eq!(chunks[1]["v2"], Err(FetchError::NotFound));
    }

    #[tokio::test]
    async fn test_failed_call_is_io_for_every_id() {
        let (_, caller) = caller(true);
        let results = caller.fetch_chunk(&ids(2)).await;
        assert_eq!(results.len(), 2);
        assert!(results.values().all(|r| matches!(r, Err(FetchError::Io(_)))));
    }
}
