//! Operation scopes for tagging concurrent work.
//!
//! An [`Op`] owns a tracing span with a unique id. Tasks spawned through [`Op::spawn`] run inside
//! that span, so the logs of both relay directions of a tunnel share the same `id` field. The
//! operation exits when the last clone is dropped.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, trace, Instrument, Span};
use uuid::Uuid;

#[derive(Clone)]
pub struct Op {
    inner: Arc<OpInner>,
}

struct OpInner {
    name: &'static str,
    id: Uuid,
    span: Span,
    started: Instant,
    error: Mutex<Option<String>>,
}

impl Op {
    pub fn enter(name: &'static str) -> Self {
        let id = Uuid::new_v4();
        let span = info_span!("op", op = name, id = %id);
        Self {
            inner: Arc::new(OpInner {
                name,
                id,
                span,
                started: Instant::now(),
                error: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn span(&self) -> &Span {
        &self.inner.span
    }

    /// Spawns `task` on the runtime, inside this operation's span.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(task.instrument(self.inner.span.clone()))
    }

    /// Records `msg` as the operation's error and hands it back for logging or responding.
    pub fn error(&self, msg: impl Into<String>) -> String {
        let msg = msg.into();
        if let Ok(mut error) = self.inner.error.lock() {
            *error = Some(msg.clone());
        }
        msg
    }

    /// Last error recorded with [`Op::error`]
    pub fn failure(&self) -> Option<String> {
        self.inner.error.lock().ok().and_then(|error| error.clone())
    }
}

impl Drop for OpInner {
    fn drop(&mut self) {
        let _entered = self.span.enter();
        let error = self.error.get_mut().ok().and_then(|error| error.take());
        match error {
            Some(error) => debug!("{} failed after {:?}: {}", self.name, self.started.elapsed(), error),
            None => trace!("{} done after {:?}", self.name, self.started.elapsed()),
        }
    }
}
