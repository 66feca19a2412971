#![cfg(test)]
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

pub struct ProxyResponse {
    pub status: u16,
    pub head: String,
    pub body: String,
}

/// Sends `CONNECT target` and reads the response without consuming any tunneled byte.
pub async fn send_connect(proxy: SocketAddr, target: &str) -> (TcpStream, ProxyResponse) {
    let mut stream = TcpStream::connect(proxy)
        .await
        .expect("Should be able to connect to the proxy");

    let connect_request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
    stream
        .write_all(connect_request.as_bytes())
        .await
        .expect("Should be able to write CONNECT request");

    let response = timeout(Duration::from_secs(5), read_response(&mut stream))
        .await
        .expect("Should receive response within timeout");
    (stream, response)
}

pub async fn read_response(stream: &mut TcpStream) -> ProxyResponse {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.expect("Should be able to read response");
        assert!(n > 0, "Connection closed before the end of the response head");
        head.push(byte[0]);
    }
    let head = String::from_utf8_lossy(&head).to_string();

    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("Response should start with a status line");

    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; content_length];
    stream.read_exact(&mut body).await.expect("Should be able to read response body");

    ProxyResponse {
        status,
        head,
        body: String::from_utf8_lossy(&body).to_string(),
    }
}

/// Resolves once the peer closed the stream, whether cleanly or with a reset.
pub async fn wait_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => continue,
        }
    }
}

pub async fn wait_until<F, Fut>(deadline: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition().await {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    condition().await
}
