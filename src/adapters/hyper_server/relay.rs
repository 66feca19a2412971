use futures::FutureExt;
use std::future::Future;
use std::io;
use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::debug;

use crate::buffers::BufferPool;
use crate::domain::{CloseCause, RelayStats};
use crate::ops::Op;

/// Pipes bytes between `client` and `outbound` until both directions are done, then closes both.
///
/// The client to outbound copy runs on its own task, the other direction on the caller. A direction
/// that reaches end of stream half-closes its destination. When the outbound to client copy fails,
/// or `idle` resolves because the outbound connection was closed for inactivity, the upload is
/// interrupted so the session never outlives its outbound connection.
pub async fn relay<C, O, I>(op: &Op, pool: &BufferPool, client: C, outbound: O, idle: I) -> RelayStats
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    O: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    I: Future<Output = ()> + Send,
{
    let (mut client_read, mut client_write) = split(client);
    let (mut out_read, mut out_write) = split(outbound);
    let (abort_tx, abort_rx) = oneshot::channel::<()>();
    let idle = idle.fuse();
    tokio::pin!(idle);

    let upload_pool = pool.clone();
    let upload_op = op.clone();
    let mut upload = op.spawn(async move {
        let mut buf = upload_pool.get();
        let mut copied = 0;
        let res = tokio::select! {
            res = copy_with_buffer(&mut client_read, &mut out_write, &mut buf, &mut copied) => res,
            _ = abort_rx => Err(io::Error::new(io::ErrorKind::Interrupted, "outbound side closed")),
        };
        match &res {
            Ok(()) => shutdown_write("outbound", &mut out_write).await,
            Err(e) => debug!("{}", upload_op.error(format!("Error copying client to origin: {}", e))),
        }
        (client_read, out_write, copied, res.err().map(|e| e.kind()))
    });

    let mut buf = pool.get();
    let mut downloaded = 0;
    let download = tokio::select! {
        res = copy_with_buffer(&mut out_read, &mut client_write, &mut buf, &mut downloaded) => res,
        _ = &mut idle => Err(idle_error()),
    };
    drop(buf);

    let mut abort_tx = Some(abort_tx);
    let mut cause = match download {
        Ok(()) => {
            shutdown_write("client", &mut client_write).await;
            CloseCause::Eof
        }
        Err(e) => {
            debug!("{}", op.error(format!("Error copying origin to client: {}", e)));
            if let Some(abort) = abort_tx.take() {
                let _ = abort.send(());
            }
            close_cause(e.kind())
        }
    };

    // the upload may be parked on a silent client while the outbound side is already gone
    let joined = match abort_tx.take() {
        Some(abort) => tokio::select! {
            joined = &mut upload => joined,
            _ = &mut idle => {
                debug!("{}", op.error(idle_error().to_string()));
                let _ = abort.send(());
                cause = CloseCause::IdleTimeout;
                upload.await
            }
        },
        None => upload.await,
    };

    let uploaded = match joined {
        Ok((client_read, out_write, uploaded, failure)) => {
            if let (Some(kind), CloseCause::Eof) = (failure, cause) {
                cause = close_cause(kind);
            }
            close("client", client_read.unsplit(client_write)).await;
            close("outbound", out_read.unsplit(out_write)).await;
            uploaded
        }
        Err(e) => {
            // halves held by the task are already dropped
            debug!("{}", op.error(format!("Upload task failed: {}", e)));
            cause = CloseCause::Error;
            0
        }
    };

    RelayStats {
        uploaded,
        downloaded,
        cause,
    }
}

fn idle_error() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "outbound connection closed after idle timeout")
}

fn close_cause(kind: io::ErrorKind) -> CloseCause {
    if kind == io::ErrorKind::TimedOut {
        CloseCause::IdleTimeout
    } else {
        CloseCause::Error
    }
}

/// `tokio::io::copy` with a caller provided buffer, counting the bytes written so far.
pub async fn copy_with_buffer<R, W>(reader: &mut R, writer: &mut W, buf: &mut [u8], copied: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    loop {
        let n = reader.read(buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        *copied += n as u64;
    }
}

async fn shutdown_write<W: AsyncWrite + Unpin>(name: &str, writer: &mut W) {
    if let Err(e) = writer.shutdown().await {
        debug!("Error half-closing the {} connection: {}", name, e);
    }
}

async fn close<S: AsyncWrite + Unpin>(name: &str, mut stream: S) {
    if let Err(e) = stream.shutdown().await {
        debug!("Error closing the {} connection: {}", name, e);
    }
}
