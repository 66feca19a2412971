#![cfg(test)]
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod client;
pub mod echo_server;
pub mod proxy_server;

pub use client::{send_connect, wait_closed, wait_until, ProxyResponse};
pub use echo_server::EchoServer;
pub use proxy_server::TestProxyServer;
