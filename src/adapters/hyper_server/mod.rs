mod adapter;
mod connector;
mod fallback;
pub mod relay;
pub mod response;

pub use adapter::HttpConnectHandler;
pub use connector::TcpConnector;
pub use fallback::MethodNotAllowed;
pub use relay::relay;
