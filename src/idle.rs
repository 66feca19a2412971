//! Idle timeout guard for tunnel connections.
//!
//! [`IdleTimeoutStream::wrap`] spawns a watchdog that closes the wrapped stream once neither a
//! read nor a write completed on it for the whole timeout, then runs the `on_timeout` callback.
//! The close happens on the watchdog itself, whether or not anything is polling the stream.
//! Every successful read or write pushes the deadline back.

use futures::task::AtomicWaker;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

struct IdleState<T> {
    // `None` once closed by the watchdog or the owner
    inner: Mutex<Option<T>>,
    started: Instant,
    timeout: Duration,
    // millis since `started`
    last_activity: AtomicU64,
    expired: AtomicBool,
    expiry: Notify,
    read_waker: AtomicWaker,
    write_waker: AtomicWaker,
    dropped: Notify,
}

impl<T> IdleState<T> {
    fn touch(&self) {
        self.last_activity.store(self.started.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    fn deadline(&self) -> Instant {
        self.started + Duration::from_millis(self.last_activity.load(Ordering::Relaxed)) + self.timeout
    }

    fn take_inner(&self) -> Option<T> {
        self.inner.lock().ok().and_then(|mut inner| inner.take())
    }

    fn expire(&self) {
        self.expired.store(true, Ordering::Release);
        // dropping the stream closes the socket
        drop(self.take_inner());
        self.read_waker.wake();
        self.write_waker.wake();
        self.expiry.notify_waiters();
    }

    fn is_expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    fn poll_inner<R>(&self, poll: impl FnOnce(Pin<&mut T>) -> Poll<io::Result<R>>) -> Poll<io::Result<R>>
    where
        T: Unpin,
    {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "idle guard lock poisoned"))),
        };
        match inner.as_mut() {
            Some(inner) => poll(Pin::new(inner)),
            None => Poll::Ready(Err(idle_timeout_error())),
        }
    }
}

pub struct IdleTimeoutStream<T> {
    state: Arc<IdleState<T>>,
}

impl<T> IdleTimeoutStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Guards `inner` with an idle timeout. A zero timeout makes the wrapper a plain passthrough.
    ///
    /// Must be called from within a tokio runtime when `timeout` is not zero.
    pub fn wrap<F>(inner: T, timeout: Duration, on_timeout: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let state = Arc::new(IdleState {
            inner: Mutex::new(Some(inner)),
            started: Instant::now(),
            timeout,
            last_activity: AtomicU64::new(0),
            expired: AtomicBool::new(false),
            expiry: Notify::new(),
            read_waker: AtomicWaker::new(),
            write_waker: AtomicWaker::new(),
            dropped: Notify::new(),
        });
        if !timeout.is_zero() {
            tokio::spawn(watchdog(Arc::downgrade(&state), on_timeout));
        }

        Self { state }
    }

    /// Resolves once the idle timeout closed the stream, never when the timeout is disabled.
    pub fn expired(&self) -> impl Future<Output = ()> + Send + 'static {
        let state = self.state.clone();
        async move {
            let notified = state.expiry.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !state.is_expired() {
                notified.await;
            }
        }
    }
}

impl<T> IdleTimeoutStream<T> {
    pub fn is_expired(&self) -> bool {
        self.state.is_expired()
    }

    /// Whether the wrapped stream is gone, dropped after the idle timeout.
    pub fn is_closed(&self) -> bool {
        self.state.inner.lock().map_or(true, |inner| inner.is_none())
    }
}

fn idle_timeout_error() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "connection closed after idle timeout")
}

async fn watchdog<T, F>(weak: Weak<IdleState<T>>, on_timeout: F)
where
    F: FnOnce(),
{
    while let Some(state) = weak.upgrade() {
        tokio::select! {
            _ = sleep_until(state.deadline()) => {}
            _ = state.dropped.notified() => return,
        }

        if state.deadline() <= Instant::now() {
            trace!("Idle timeout of {:?} reached", state.timeout);
            state.expire();
            on_timeout();
            return;
        }
    }
}

impl<T> Drop for IdleTimeoutStream<T> {
    fn drop(&mut self) {
        drop(self.state.take_inner());
        self.state.dropped.notify_one();
    }
}

impl<T> AsyncRead for IdleTimeoutStream<T>
where
    T: AsyncRead + Unpin,
{
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        // registered before polling, so an expiry racing with this poll still wakes us
        self.state.read_waker.register(cx.waker());
        let res = self.state.poll_inner(|inner| inner.poll_read(cx, buf));
        if let Poll::Ready(Ok(())) = res {
            self.state.touch();
        }
        res
    }
}

impl<T> AsyncWrite for IdleTimeoutStream<T>
where
    T: AsyncWrite + Unpin,
{
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.state.write_waker.register(cx.waker());
        let res = self.state.poll_inner(|inner| inner.poll_write(cx, buf));
        if let Poll::Ready(Ok(_)) = res {
            self.state.touch();
        }
        res
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.state.write_waker.register(cx.waker());
        self.state.poll_inner(|inner| inner.poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.state.write_waker.register(cx.waker());
        match self.state.poll_inner(|inner| inner.poll_shutdown(cx)) {
            // already closed by the watchdog
            Poll::Ready(Err(e)) if e.kind() == io::ErrorKind::TimedOut => Poll::Ready(Ok(())),
            res => res,
        }
    }
}
