//! Scratch buffers shared by every relay.
//!
//! Tunnels are short lived and numerous, so the copy buffers are recycled through an
//! `object-pool` instead of being allocated per session. A buffer goes back to the pool when its
//! [`PooledBuf`] is dropped, unless the pool already holds `max_idle` buffers.

use object_pool::{Pool, ReusableOwned};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;
pub const DEFAULT_MAX_IDLE: usize = 64;

#[derive(Clone)]
pub struct BufferPool {
    pool: Arc<Pool<Vec<u8>>>,
    buffer_size: usize,
    max_idle: usize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_IDLE, DEFAULT_BUFFER_SIZE)
    }

    /// Pool of `buffer_size` byte buffers keeping at most `max_idle` of them around.
    ///
    /// The pool starts empty, buffers are allocated on demand.
    pub fn with_capacity(max_idle: usize, buffer_size: usize) -> Self {
        Self {
            pool: Arc::new(Pool::new(0, move || vec![0; buffer_size])),
            buffer_size,
            max_idle,
        }
    }

    pub fn get(&self) -> PooledBuf {
        let size = self.buffer_size;
        PooledBuf {
            inner: Some(self.pool.pull_owned(move || vec![0; size])),
            pool: self.pool.clone(),
            max_idle: self.max_idle,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of buffers currently waiting in the pool
    pub fn idle(&self) -> usize {
        self.pool.len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A fixed size buffer borrowed from a [`BufferPool`]
pub struct PooledBuf {
    inner: Option<ReusableOwned<Vec<u8>>>,
    pool: Arc<Pool<Vec<u8>>>,
    max_idle: usize,
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match &self.inner {
            Some(buf) => buf.as_slice(),
            None => &[],
        }
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.inner {
            Some(buf) => buf.as_mut_slice(),
            None => &mut [],
        }
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if self.pool.len() >= self.max_idle {
            if let Some(buf) = self.inner.take() {
                drop(buf.detach());
            }
        }
    }
}

impl std::fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuf").field("len", &self.len()).field("max_idle", &self.max_idle).finish()
    }
}
