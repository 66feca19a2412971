use hyper::header::HOST;
use hyper::upgrade::OnUpgrade;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use tracing::{debug, error, trace, warn};

use super::connector::TcpConnector;
use super::relay::relay;
use super::response::{respond_error, respond_ok};
use crate::buffers::BufferPool;
use crate::domain::{TunnelError, TunnelService};
use crate::idle::IdleTimeoutStream;
use crate::ops::Op;
use crate::ports::{Body, NextHandler};

/// Middleware turning `CONNECT` requests into raw TCP tunnels.
///
/// Any other method is handed untouched to the next handler.
pub struct HttpConnectHandler<N> {
    next: N,
    tunneler: Tunneler,
}

#[derive(Clone)]
struct Tunneler {
    service: TunnelService,
    connector: TcpConnector,
    pool: BufferPool,
}

impl<N> HttpConnectHandler<N> {
    pub fn new(next: N, service: TunnelService) -> Self {
        Self {
            next,
            tunneler: Tunneler {
                service,
                connector: TcpConnector::new(),
                pool: BufferPool::new(),
            },
        }
    }

    pub fn with_connector(mut self, connector: TcpConnector) -> Self {
        self.tunneler.connector = connector;
        self
    }

    pub fn with_buffer_pool(mut self, pool: BufferPool) -> Self {
        self.tunneler.pool = pool;
        self
    }

    pub fn service(&self) -> &TunnelService {
        &self.tunneler.service
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<Body>
    where
        N: NextHandler<B>,
        B: Send + 'static,
    {
        if req.method() != Method::CONNECT {
            return self.next.handle(req).await;
        }

        trace!(
            "HttpConnectHandler received request: {} {} {:?} {:?}",
            req.method(),
            req.uri(),
            req.version(),
            req.headers()
        );

        let op = Op::enter("proxy_https");
        op.span().in_scope(|| self.intercept(&op, req))
    }

    fn intercept<B>(&self, op: &Op, mut req: Request<B>) -> Response<Body> {
        let host = connect_host(&req);

        if let Err(e) = self.tunneler.service.authorize(&host) {
            return serve_error(op, &host, &e);
        }

        // the upgrade only resolves once the 200 below has been written
        let on_upgrade = match req.extensions_mut().remove::<OnUpgrade>() {
            Some(on_upgrade) => on_upgrade,
            None => {
                let e = TunnelError::HijackFailed("connection does not support upgrades".into());
                return serve_error(op, &host, &e);
            }
        };

        op.spawn(self.tunneler.clone().run(op.clone(), on_upgrade, host));
        respond_ok()
    }
}

impl Tunneler {
    async fn run(self, op: Op, on_upgrade: OnUpgrade, host: String) {
        let client = match on_upgrade.await {
            Ok(upgraded) => TokioIo::new(upgraded),
            Err(e) => {
                error!("{}", op.error(TunnelError::HijackFailed(e.to_string()).to_string()));
                return;
            }
        };

        let outbound = match self.connector.connect(&host).await {
            Ok(outbound) => outbound,
            Err(e) => {
                error!("{}", op.error(e.to_string()));
                // nothing will be relayed, don't leave the client hanging
                drop(client);
                return;
            }
        };

        let span = op.span().clone();
        let target = host.clone();
        let outbound = IdleTimeoutStream::wrap(outbound, self.service.config().idle_timeout(), move || {
            span.in_scope(|| debug!("Closed idle connection to {}", target))
        });
        let idle = outbound.expired();

        if let Err(e) = self.service.open_tunnel(op.id(), &host).await {
            warn!("Unable to track tunnel to {}: {}", host, e);
        }

        let stats = relay(&op, &self.pool, client, outbound, idle).await;

        if let Err(e) = self.service.close_tunnel(op.id(), stats).await {
            warn!("Unable to track tunnel to {}: {}", host, e);
        }
    }
}

/// Target of a `CONNECT`, from the request line authority or else the Host header.
fn connect_host<B>(req: &Request<B>) -> String {
    req.uri()
        .authority()
        .map(|authority| authority.as_str().to_string())
        .or_else(|| {
            req.headers()
                .get(HOST)
                .and_then(|host| host.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

fn serve_error(op: &Op, host: &str, e: &TunnelError) -> Response<Body> {
    let status = e.status();
    error!(
        "{}",
        op.error(format!(
            "Respond error to CONNECT request to {}: {} {}",
            host,
            status.as_u16(),
            e
        ))
    );
    respond_error(status, &e.to_string())
}
