//! Newline-delimited JSON frames over TCP
//!
//! Both sides read at most `MAX_FRAME_BYTES` per frame; anything longer is a
//! protocol error rather than an unbounded allocation.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Largest accepted frame, newline included
pub const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Errors from one request/response exchange
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[error("{address} timed out during {stage} after {timeout:?}")]
    Timeout {
        address: String,
        stage: &'static str,
        timeout: Duration,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Connection closed before a frame arrived")]
    Closed,

    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}

impl RpcError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout { .. })
    }
}

/// Read one frame and decode it
pub async fn read_frame<T, R>(reader: &mut R) -> Result<T, RpcError>
where
    T: DeserializeOwned,
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let limit = (MAX_FRAME_BYTES + 1) as u64;
    let bytes_read = (&mut *reader).take(limit).read_line(&mut line).await?;
    if bytes_read == 0 {
        return Err(RpcError::Closed);
    }
    if bytes_read > MAX_FRAME_BYTES {
        return Err(RpcError::TooLarge { limit: MAX_FRAME_BYTES });
    }
    debug!(bytes_read, "read_frame: frame received");
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Encode one frame and write it followed by a newline
pub async fn write_frame<T, W>(writer: &mut W, msg: &T) -> Result<(), RpcError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let mut json = serde_json::to_vec(msg)?;
    json.push(b'\n');
    if json.len() > MAX_FRAME_BYTES {
        return Err(RpcError::TooLarge { limit: MAX_FRAME_BYTES });
    }
    writer.write_all(&json).await?;
    writer.flush().await?;
    debug!(bytes = json.len(), "write_frame: frame sent");
    Ok(())
}

/// Connect to `address`, send `request` and read one response
///
/// Connecting and writing are bounded by `io_timeout`. Reading the response
/// is bounded by `response_timeout` when given and waits indefinitely
/// otherwise.
pub async fn exchange<Req, Resp>(
    address: &str,
    request: &Req,
    io_timeout: Duration,
    response_timeout: Option<Duration>,
) -> Result<Resp, RpcError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    debug!(%address, "exchange: called");
    let stream = timeout(io_timeout, TcpStream::connect(address))
        .await
        .map_err(|_| RpcError::Timeout {
            address: address.to_string(),
            stage: "connect",
            timeout: io_timeout,
        })?
        .map_err(|source| RpcError::Connect {
            address: address.to_string(),
            source,
        })?;
    let (read_half, mut write_half) = stream.into_split();

    timeout(io_timeout, write_frame(&mut write_half, request))
        .await
        .map_err(|_| RpcError::Timeout {
            address: address.to_string(),
            stage: "write",
            timeout: io_timeout,
        })??;

    let mut reader = BufReader::new(read_half);
    match response_timeout {
        Some(limit) => timeout(limit, read_frame(&mut reader))
            .await
            .map_err(|_| RpcError::Timeout {
                address: address.to_string(),
                stage: "read",
                timeout: limit,
            })?,
        None => read_frame(&mut reader).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::messages::{BrokerRequest, BrokerResponse};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_frame_over_duplex() {
        let (mut client, server) = tokio::io::duplex(1024);

        write_frame(&mut client, &BrokerRequest::Quit).await.unwrap();
        let mut reader = BufReader::new(server);
        let msg: BrokerRequest = read_frame(&mut reader).await.unwrap();
        assert_eq!(msg, BrokerRequest::Quit);
    }

    #[tokio::test]
    async fn test_read_frame_on_closed_stream() {
        let mut reader = BufReader::new(&b""[..]);
        let result: Result<BrokerRequest, _> = read_frame(&mut reader).await;
        assert!(matches!(result, Err(RpcError::Closed)));
    }

    #[tokio::test]
    async fn test_read_frame_rejects_garbage() {
        let mut reader = BufReader::new(&b"not json\n"[..]);
        let result: Result<BrokerRequest, _> = read_frame(&mut reader).await;
        assert!(matches!(result, Err(RpcError::Json(_))));
    }

    #[tokio::test]
    async fn test_exchange_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let msg: BrokerRequest = read_frame(&mut reader).await.unwrap();
            assert_eq!(msg, BrokerRequest::Ping);
            write_frame(
                &mut write_half,
                &BrokerResponse::Pong {
                    version: "test-version".to_string(),
                },
            )
            .await
            .unwrap();
        });

        let response: BrokerResponse = exchange(&address, &BrokerRequest::Ping, Duration::from_secs(1), None)
            .await
            .unwrap();
        assert_eq!(
            response,
            BrokerResponse::Pong {
                version: "test-version".to_string()
            }
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_exchange_connection_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result: Result<BrokerResponse, _> =
            exchange(&address, &BrokerRequest::Ping, Duration::from_secs(1), None).await;
        assert!(matches!(result, Err(RpcError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_exchange_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            // Accept and never answer
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(stream);
        });

        let result: Result<BrokerResponse, _> = exchange(
            &address,
            &BrokerRequest::Ping,
            Duration::from_secs(1),
            Some(Duration::from_millis(50)),
        )
        .await;
        let err = result.unwrap_err();
        assert!(err.is_timeout());
        server.await.unwrap();
    }
}
