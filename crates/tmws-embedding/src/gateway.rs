use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, Mutex as TokioMutex};
use tracing::{debug, warn};

use crate::provider::EmbeddingProvider;
use tmws_core::{Result, TmwsError};

/// Maximum number of texts sent to the provider in one batch.
pub const MAX_BATCH: usize = 32;

/// How long the first arrival waits for others to coalesce with.
pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(50);

/// Minimum entries kept in the content-hash cache.
pub const CACHE_CAPACITY: usize = 1024;

type CacheKey = [u8; 32];

/// LRU cache keyed by blake3 of the input text. Eviction scans for the
/// least-recently-used entry only when the cache is full.
struct LruCache {
    capacity: usize,
    tick: u64,
    map: HashMap<CacheKey, (Vec<f32>, u64)>,
}

impl LruCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tick: 0,
            map: HashMap::with_capacity(capacity),
        }
    }

    fn get(&mut self, key: &CacheKey) -> Option<Vec<f32>> {
        self.tick += 1;
        let tick = self.tick;
        self.map.get_mut(key).map(|entry| {
            entry.1 = tick;
            entry.0.clone()
        })
    }

    fn insert(&mut self, key: CacheKey, value: Vec<f32>) {
        self.tick += 1;
        if self.map.len() >= self.capacity && !self.map.contains_key(&key) {
            if let Some(oldest) = self
                .map
                .iter()
                .min_by_key(|(_, (_, t))| *t)
                .map(|(k, _)| *k)
            {
                self.map.remove(&oldest);
            }
        }
        self.map.insert(key, (value, self.tick));
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

struct Pending {
    text: String,
    key: CacheKey,
    tx: oneshot::Sender<Result<Vec<f32>>>,
}

/// The only component holding a reference to the external embedder.
///
/// Caches by content hash and coalesces concurrent single-text requests
/// into provider batches: the first arrival waits out a short window,
/// then drains the queue in chunks of at most [`MAX_BATCH`].
pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Mutex<LruCache>,
    pending: TokioMutex<Vec<Pending>>,
    window: Duration,
}

impl EmbeddingGateway {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self::with_window(provider, DEFAULT_COALESCE_WINDOW)
    }

    pub fn with_window(provider: Arc<dyn EmbeddingProvider>, window: Duration) -> Self {
        Self {
            provider,
            cache: Mutex::new(LruCache::new(CACHE_CAPACITY)),
            pending: TokioMutex::new(Vec::new()),
            window,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Deterministic fallback vector for callers that accept a degraded
    /// memory when the embedder is down.
    pub fn zero_vector(&self) -> Vec<f32> {
        vec![0.0; self.provider.dimensions()]
    }

    /// Embed one text, going through the cache and the coalescing queue.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = *blake3::hash(text.as_bytes()).as_bytes();
        if let Some(hit) = self.cache.lock().get(&key) {
            return Ok(hit);
        }

        let (tx, rx) = oneshot::channel();
        let is_leader = {
            let mut queue = self.pending.lock().await;
            queue.push(Pending {
                text: text.to_string(),
                key,
                tx,
            });
            queue.len() == 1
        };

        if is_leader {
            if !self.window.is_zero() {
                tokio::time::sleep(self.window).await;
            }
            loop {
                let batch: Vec<Pending> = {
                    let mut queue = self.pending.lock().await;
                    let n = queue.len().min(MAX_BATCH);
                    queue.drain(..n).collect()
                };
                if batch.is_empty() {
                    break;
                }
                self.run_batch(batch).await;
            }
        }

        rx.await
            .map_err(|_| TmwsError::Embedder("embedding worker dropped request".into()))?
    }

    /// Embed many texts at once. Cache hits are served locally; misses go
    /// to the provider in [`MAX_BATCH`]-sized chunks.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<(usize, CacheKey)> = Vec::new();
        {
            let mut cache = self.cache.lock();
            for (i, text) in texts.iter().enumerate() {
                let key = *blake3::hash(text.as_bytes()).as_bytes();
                match cache.get(&key) {
                    Some(hit) => out[i] = Some(hit),
                    None => misses.push((i, key)),
                }
            }
        }

        for chunk in misses.chunks(MAX_BATCH) {
            let batch_texts: Vec<&str> = chunk.iter().map(|(i, _)| texts[*i]).collect();
            let vecs = self.provider.embed(&batch_texts).await?;
            if vecs.len() != batch_texts.len() {
                return Err(TmwsError::Embedder(format!(
                    "provider returned {} embeddings for {} inputs",
                    vecs.len(),
                    batch_texts.len()
                )));
            }
            let mut cache = self.cache.lock();
            for ((i, key), vec) in chunk.iter().zip(vecs) {
                cache.insert(*key, vec.clone());
                out[*i] = Some(vec);
            }
        }

        Ok(out.into_iter().map(|v| v.expect("filled")).collect())
    }

    async fn run_batch(&self, batch: Vec<Pending>) {
        let texts: Vec<&str> = batch.iter().map(|p| p.text.as_str()).collect();
        debug!(provider = self.provider.name(), count = texts.len(), "embedding batch");
        match self.provider.embed(&texts).await {
            Ok(vecs) if vecs.len() == batch.len() => {
                let mut cache = self.cache.lock();
                for (pending, vec) in batch.into_iter().zip(vecs) {
                    cache.insert(pending.key, vec.clone());
                    let _ = pending.tx.send(Ok(vec));
                }
            }
            Ok(vecs) => {
                warn!(
                    expected = batch.len(),
                    got = vecs.len(),
                    "embedding provider returned short batch"
                );
                for pending in batch {
                    let _ = pending
                        .tx
                        .send(Err(TmwsError::Embedder("short embedding response".into())));
                }
            }
            Err(e) => {
                warn!(error = %e, "embedding provider failed");
                let message = e.to_string();
                for pending in batch {
                    let _ = pending.tx.send(Err(TmwsError::Embedder(message.clone())));
                }
            }
        }
    }

    #[cfg(test)]
    fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashEmbedding;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        inner: HashEmbedding,
        calls: AtomicUsize,
        texts_seen: AtomicUsize,
    }

    impl CountingProvider {
        fn new(dims: usize) -> Self {
            Self {
                inner: HashEmbedding::new(dims),
                calls: AtomicUsize::new(0),
                texts_seen: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts_seen.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.embed(texts).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        async fn embed(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Err(TmwsError::Embedder("model offline".into()))
        }

        fn dimensions(&self) -> usize {
            8
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn cache_avoids_repeat_provider_calls() {
        let provider = Arc::new(CountingProvider::new(32));
        let gateway = EmbeddingGateway::with_window(provider.clone(), Duration::ZERO);

        let a = gateway.embed("hello").await.unwrap();
        let b = gateway.embed("hello").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.cache_len(), 1);
    }

    #[tokio::test]
    async fn batch_serves_mixed_hits_and_misses() {
        let provider = Arc::new(CountingProvider::new(32));
        let gateway = EmbeddingGateway::with_window(provider.clone(), Duration::ZERO);

        gateway.embed("alpha").await.unwrap();
        let out = gateway.embed_batch(&["alpha", "beta", "gamma"]).await.unwrap();
        assert_eq!(out.len(), 3);
        // Only beta and gamma went to the provider in the second call.
        assert_eq!(provider.texts_seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn concurrent_requests_coalesce() {
        let provider = Arc::new(CountingProvider::new(32));
        let gateway = Arc::new(EmbeddingGateway::with_window(
            provider.clone(),
            Duration::from_millis(20),
        ));

        let mut handles = Vec::new();
        for i in 0..8 {
            let g = Arc::clone(&gateway);
            handles.push(tokio::spawn(async move {
                g.embed(&format!("text number {i}")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        // 8 distinct texts, far fewer provider round-trips than 8.
        assert!(provider.calls.load(Ordering::SeqCst) < 8);
        assert_eq!(provider.texts_seen.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn provider_failure_surfaces_embedder_error() {
        let gateway = EmbeddingGateway::with_window(Arc::new(FailingProvider), Duration::ZERO);
        let err = gateway.embed("anything").await.unwrap_err();
        assert_eq!(err.wire_code(), "ErrEmbedder");
        assert_eq!(gateway.zero_vector().len(), 8);
    }

    #[tokio::test]
    async fn lru_evicts_oldest() {
        let provider = Arc::new(CountingProvider::new(8));
        let gateway = EmbeddingGateway::with_window(provider, Duration::ZERO);
        {
            let mut cache = gateway.cache.lock();
            // Shrink for the test.
            cache.capacity = 2;
        }
        gateway.embed("one").await.unwrap();
        gateway.embed("two").await.unwrap();
        gateway.embed("one").await.unwrap(); // refresh "one"
        gateway.embed("three").await.unwrap(); // evicts "two"
        assert_eq!(gateway.cache_len(), 2);
        let key_one = *blake3::hash(b"one").as_bytes();
        let key_two = *blake3::hash(b"two").as_bytes();
        assert!(gateway.cache.lock().get(&key_one).is_some());
        assert!(gateway.cache.lock().get(&key_two).is_none());
    }
}
