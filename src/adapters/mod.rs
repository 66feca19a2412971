pub mod hyper_server;
pub mod tracking;

pub use hyper_server::{HttpConnectHandler, MethodNotAllowed, TcpConnector};
pub use tracking::ConnectionTracker;
