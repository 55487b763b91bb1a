//! Batch Query Coordinator
//!
//! Two-phase coalescing buffer. Until [`Coordinator::flush`] every query
//! submitted through a [`Batcher`] is buffered and answered with a [`Handle`].
//! Flush hands each processor its whole buffer in one call, in registration
//! order. After flush, queries are no longer buffered: each one is delivered
//! to its processor alone, as a batch of one.
//!
//! Dispatch is spawned on the tokio runtime, so `submit` and `flush` never
//! suspend. Every handle is resolved or failed exactly once; a resolver that
//! is dropped unresolved fails its handle with [`Error::ContractViolation`].

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::debug;

/// Maximum number of objects a remote API accepts per call.
pub const MAX_BATCH_SIZE: usize = 100;

/// Split `items` into consecutive chunks of at most `size` entries,
/// preserving order. An empty input yields no chunks.
pub fn batch<T>(items: impl IntoIterator<Item = T>, size: usize) -> Vec<Vec<T>> {
    assert!(size > 0, "batch size must be positive");

    let mut chunks = Vec::new();
    let mut current = Vec::with_capacity(size);
    for item in items {
        current.push(item);
        if current.len() == size {
            chunks.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Group values by key, keeping keys in first-seen order and values in
/// submission order.
pub fn group<K: Eq + Hash + Clone, V>(entries: impl IntoIterator<Item = (K, V)>) -> Vec<(K, Vec<V>)> {
    let mut groups: Vec<(K, Vec<V>)> = Vec::new();
    let mut index: HashMap<K, usize> = HashMap::new();
    for (key, value) in entries {
        match index.get(&key) {
            Some(&slot) => groups[slot].1.push(value),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![value]));
            }
        }
    }
    groups
}

/// Create a connected resolver/handle pair.
pub fn channel<T>() -> (Resolver<T>, Handle<T>) {
    let (tx, rx) = oneshot::channel();
    (Resolver { tx }, Handle { rx })
}

/// Single-assignment deferred result, awaited by the submitter.
#[derive(Debug)]
pub struct Handle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for Handle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx).poll(cx).map(|received| match received {
            Ok(result) => result,
            Err(_) => Err(Error::ContractViolation(
                "result handle dropped without being resolved".to_string(),
            )),
        })
    }
}

/// Write side of a [`Handle`]. Consumed by resolving, so it can fire only once.
#[derive(Debug)]
pub struct Resolver<T> {
    tx: oneshot::Sender<Result<T>>,
}

impl<T> Resolver<T> {
    pub fn resolve(self, value: T) {
        // Submitter may have stopped waiting; nothing to do then.
        let _ = self.tx.send(Ok(value));
    }

    pub fn fail(self, error: Error) {
        let _ = self.tx.send(Err(error));
    }
}

/// A submitted query together with the resolver of its handle.
#[derive(Debug)]
pub struct Pending<Q, T> {
    pub query: Q,
    pub resolver: Resolver<T>,
}

/// Batch-execution logic for one query family.
///
/// `execute` receives every pending query delivered in one dispatch and must
/// resolve or fail each resolver before its future completes.
pub trait Processor: Send + Sync + 'static {
    type Query: Send + 'static;
    type Output: Send + 'static;

    /// Name used in logs.
    fn name(&self) -> &'static str;

    fn execute(
        &self,
        batch: Vec<Pending<Self::Query, Self::Output>>,
    ) -> BoxFuture<'static, ()>;
}

enum Buffer<Q, T> {
    Open(Vec<Pending<Q, T>>),
    Dispatched,
}

struct Queue<P: Processor> {
    processor: P,
    buffer: Mutex<Buffer<P::Query, P::Output>>,
}

impl<P: Processor> Queue<P> {
    fn lock(&self) -> MutexGuard<'_, Buffer<P::Query, P::Output>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, batch: Vec<Pending<P::Query, P::Output>>) {
        tokio::spawn(self.processor.execute(batch));
    }
}

trait Flush: Send + Sync {
    /// Switch to the dispatched phase, delivering any buffered queries.
    /// Returns how many queries were delivered.
    fn flush(&self) -> usize;
}

impl<P: Processor> Flush for Queue<P> {
    fn flush(&self) -> usize {
        let buffered = match std::mem::replace(&mut *self.lock(), Buffer::Dispatched) {
            Buffer::Open(buffered) => buffered,
            Buffer::Dispatched => return 0,
        };

        let count = buffered.len();
        if count > 0 {
            debug!(processor = self.processor.name(), count, "flushing buffered queries");
            self.dispatch(buffered);
        }
        count
    }
}

/// Submission side of one registered processor.
pub struct Batcher<P: Processor> {
    queue: Arc<Queue<P>>,
}

impl<P: Processor> Clone for Batcher<P> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<P: Processor> Batcher<P> {
    /// Submit a query. Buffered before flush; dispatched alone after it.
    ///
    /// Must be called from within a tokio runtime once the coordinator has
    /// been flushed.
    pub fn submit(&self, query: P::Query) -> Handle<P::Output> {
        let (resolver, handle) = channel();
        let pending = Pending { query, resolver };

        let mut buffer = self.queue.lock();
        if let Buffer::Open(buffered) = &mut *buffer {
            buffered.push(pending);
            return handle;
        }
        drop(buffer);

        debug!(
            processor = self.queue.processor.name(),
            "query submitted after flush, dispatching alone"
        );
        self.queue.dispatch(vec![pending]);
        handle
    }
}

/// Owns the queues of every processor registered for one run.
#[derive(Default)]
pub struct Coordinator {
    queues: Mutex<Vec<Arc<dyn Flush>>>,
    flushed: AtomicBool,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor. Registration order is flush order.
    pub fn register<P: Processor>(&self, processor: P) -> Batcher<P> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let buffer = if self.is_flushed() {
            Buffer::Dispatched
        } else {
            Buffer::Open(Vec::new())
        };
        let queue = Arc::new(Queue {
            processor,
            buffer: Mutex::new(buffer),
        });
        queues.push(Arc::clone(&queue) as Arc<dyn Flush>);
        Batcher { queue }
    }

    /// Deliver every buffered query and enter the dispatched phase.
    ///
    /// Only the first call delivers anything. Returns the number of queries
    /// delivered. Must be called from within a tokio runtime.
    pub fn flush(&self) -> usize {
        let queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        if self.flushed.swap(true, Ordering::SeqCst) {
            return 0;
        }
        queues.iter().map(|queue| queue.flush()).sum()
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed.load(Ordering::SeqCst)
    }
}
