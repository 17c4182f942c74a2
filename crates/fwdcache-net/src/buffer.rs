//! Reusable body buffers.

use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use http_body::Body;
use http_body_util::BodyExt;

use crate::error::TransportError;

/// Size of the buffers handed out by [`BufferPool::default`].
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Maximum number of idle buffers a pool keeps around.
const MAX_IDLE: usize = 256;

/// A pool of reusable [`BytesMut`] buffers for draining bodies.
///
/// Cloning the pool is cheap and every clone shares the same buffers. A
/// buffer whose previous contents were frozen into [`Bytes`] and since
/// dropped gets its allocation back on the next [`get`](Self::get).
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    free: Mutex<Vec<BytesMut>>,
    buf_size: usize,
}

impl BufferPool {
    /// Create a pool producing buffers of `buf_size` bytes.
    pub fn new(buf_size: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::new()),
                buf_size,
            }),
        }
    }

    /// Size of a fresh buffer.
    pub fn buffer_size(&self) -> usize {
        self.inner.buf_size
    }

    /// Number of idle buffers waiting in the pool.
    pub fn idle(&self) -> usize {
        self.inner.free.lock().expect("buffer pool lock poisoned").len()
    }

    /// Take a buffer from the pool, allocating one if the pool is empty.
    pub fn get(&self) -> BytesMut {
        let reused = self.inner.free.lock().expect("buffer pool lock poisoned").pop();
        match reused {
            Some(mut buf) => {
                buf.reserve(self.inner.buf_size);
                buf
            }
            None => BytesMut::with_capacity(self.inner.buf_size),
        }
    }

    /// Return a buffer to the pool.
    pub fn put(&self, mut buf: BytesMut) {
        buf.clear();
        let mut free = self.inner.free.lock().expect("buffer pool lock poisoned");
        if free.len() < MAX_IDLE {
            free.push(buf);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

/// Drain `body` into a single [`Bytes`], through `pool` when one is given.
pub async fn collect_body<B>(body: B, pool: Option<&BufferPool>) -> Result<Bytes, TransportError>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let Some(pool) = pool else {
        let collected = body
            .collect()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;
        return Ok(collected.to_bytes());
    };

    let mut body = std::pin::pin!(body);
    let mut buf = pool.get();
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Ok(data) = frame.into_data() {
                    buf.extend_from_slice(&data);
                }
            }
            Err(e) => {
                pool.put(buf);
                return Err(TransportError::Body(e.to_string()));
            }
        }
    }

    let out = buf.split().freeze();
    pool.put(buf);
    Ok(out)
}
