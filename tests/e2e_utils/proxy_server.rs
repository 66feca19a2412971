#![cfg(test)]
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ServerBuilder;

use httpconnect::adapters::{ConnectionTracker, HttpConnectHandler, MethodNotAllowed, TcpConnector};
use httpconnect::buffers::BufferPool;
use httpconnect::domain::{TunnelConfig, TunnelService};
use httpconnect::ports::TrackingPort;

pub const DIAL_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TestProxyServer {
    addr: SocketAddr,
    tracker: Arc<ConnectionTracker>,
    _server_handle: JoinHandle<()>,
}

impl TestProxyServer {
    pub async fn start(config: TunnelConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let tracker = Arc::new(ConnectionTracker::new());
        let tracker_port: Arc<dyn TrackingPort> = tracker.clone();
        // small buffers so every relay goes through several chunks
        let handler = Arc::new(
            HttpConnectHandler::new(MethodNotAllowed, TunnelService::new(config, tracker_port))
                .with_connector(TcpConnector::with_timeout(DIAL_TIMEOUT))
                .with_buffer_pool(BufferPool::with_capacity(16, 4 * 1024)),
        );

        let server_handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let io = TokioIo::new(stream);
                let handler = handler.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let handler = handler.clone();
                        async move { Ok::<_, hyper::Error>(handler.handle(req).await) }
                    });

                    // Silently handle errors in test
                    let _ = ServerBuilder::new(TokioExecutor::new())
                        .serve_connection_with_upgrades(io, service)
                        .await;
                });
            }
        });

        Ok(Self {
            addr,
            tracker,
            _server_handle: server_handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }
}
