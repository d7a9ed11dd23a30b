//! Shared utilities for integration testing.

use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Start a mock backend that echoes "METHOD PATH" plus the request body.
///
/// Lets tests assert the exact path and body bytes the gateway forwarded.
pub async fn start_echo_backend(addr: SocketAddr) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = Vec::new();
                        let mut chunk = [0u8; 1024];

                        // Read until the end of the header block.
                        let header_end = loop {
                            match socket.read(&mut chunk).await {
                                Ok(0) => return,
                                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                                Err(_) => return,
                            }
                            if let Some(pos) = find_header_end(&buf) {
                                break pos;
                            }
                        };

                        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
                        let mut lines = head.lines();
                        let request_line = lines.next().unwrap_or_default().to_string();
                        let content_length: usize = lines
                            .filter_map(|l| l.split_once(':'))
                            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                            .and_then(|(_, v)| v.trim().parse().ok())
                            .unwrap_or(0);

                        // Drain the body.
                        let mut body = buf[header_end + 4..].to_vec();
                        while body.len() < content_length {
                            match socket.read(&mut chunk).await {
                                Ok(0) => break,
                                Ok(n) => body.extend_from_slice(&chunk[..n]),
                                Err(_) => break,
                            }
                        }

                        let mut parts = request_line.split_whitespace();
                        let method = parts.next().unwrap_or_default();
                        let path = parts.next().unwrap_or_default();

                        let mut reply = format!("{method} {path}").into_bytes();
                        if !body.is_empty() {
                            reply.push(b'\n');
                            reply.extend_from_slice(&body);
                        }

                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            reply.len()
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.write_all(&reply).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
