//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap origin connects and handler calls with a deadline
//! - Keep timeout errors distinct from other failures
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timed-out origin connects and handlers return 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;

/// A deadline elapsed before the operation completed.
#[derive(Debug, Error)]
#[error("{operation} timed out after {after:?}")]
pub struct Elapsed {
    pub operation: &'static str,
    pub after: Duration,
}

/// Run `fut`, failing with `Elapsed` if it does not finish within `after`.
pub async fn with_deadline<F, T>(operation: &'static str, after: Duration, fut: F) -> Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| Elapsed { operation, after })
}

/// Failure to open a connection to an origin.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Timeout(#[from] Elapsed),
    #[error("connect to {authority} failed: {source}")]
    Io {
        authority: String,
        #[source]
        source: std::io::Error,
    },
}

/// Open a TCP connection to `authority` within `after`.
pub async fn connect_with_timeout(authority: &str, after: Duration) -> Result<TcpStream, ConnectError> {
    let stream = with_deadline("origin connect", after, TcpStream::connect(authority))
        .await?
        .map_err(|source| ConnectError::Io {
            authority: authority.to_string(),
            source,
        })?;
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_elapses() {
        let err = with_deadline("sleep", Duration::from_millis(20), tokio::time::sleep(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert_eq!(err.operation, "sleep");
        assert!(err.to_string().contains("sleep timed out"));
    }

    #[tokio::test]
    async fn refused_connect_is_io_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect_with_timeout(&addr.to_string(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::Io { .. }));
    }
}
