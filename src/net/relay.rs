//! Bidirectional byte relay.
//!
//! # Responsibilities
//! - Copy bytes client → origin and origin → client until both sides finish
//! - Propagate half-close (EOF on one side shuts down the peer's write half)
//! - Abort when neither direction has moved a byte for the idle timeout
//!
//! # Design Decisions
//! - No inspection or buffering beyond one read chunk per direction
//! - Idle tracking is shared across directions so a long one-way download
//!   is not cut off

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Instant};

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Bytes moved in each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub client_to_origin: u64,
    pub origin_to_client: u64,
}

/// Idle deadline shared by every direction of one exchange.
#[derive(Debug)]
pub struct IdleClock {
    start: Instant,
    last_activity: AtomicU64,
    idle: Duration,
}

impl IdleClock {
    pub fn new(idle: Duration) -> Self {
        Self {
            start: Instant::now(),
            last_activity: AtomicU64::new(0),
            idle,
        }
    }

    /// Record that bytes moved in some direction.
    pub fn touch(&self) {
        self.last_activity
            .store(self.start.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    fn expired(&self) -> bool {
        let last = Duration::from_millis(self.last_activity.load(Ordering::Relaxed));
        self.start.elapsed().saturating_sub(last) >= self.idle
    }
}

/// Relay between `client` and `origin` until both directions reach EOF.
///
/// Both streams are consumed and dropped on every return path.
pub async fn relay<C, O>(client: C, origin: O, idle: Duration) -> io::Result<RelayStats>
where
    C: AsyncRead + AsyncWrite + Unpin,
    O: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut origin_read, mut origin_write) = tokio::io::split(origin);

    let clock = IdleClock::new(idle);
    let mut sent = 0u64;
    let mut received = 0u64;

    // EOF on either side is passed along as a half-close.
    let upstream = async {
        pipe(&mut client_read, &mut origin_write, &clock, &mut sent).await?;
        let _ = origin_write.shutdown().await;
        Ok::<(), io::Error>(())
    };
    let downstream = async {
        pipe(&mut origin_read, &mut client_write, &clock, &mut received).await?;
        let _ = client_write.shutdown().await;
        Ok::<(), io::Error>(())
    };

    tokio::try_join!(upstream, downstream)?;
    Ok(RelayStats {
        client_to_origin: sent,
        origin_to_client: received,
    })
}

/// Copy `reader` into `writer` until `reader` reaches EOF.
///
/// `writer` is left open. `copied` is updated as bytes move, so the count
/// survives the future being dropped.
pub async fn pipe<R, W>(reader: &mut R, writer: &mut W, clock: &IdleClock, copied: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];

    loop {
        let n = match timeout(clock.idle, reader.read(&mut buf)).await {
            Ok(result) => result?,
            Err(_) => {
                if clock.expired() {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "relay idle timeout"));
                }
                continue;
            }
        };

        if n == 0 {
            return Ok(());
        }

        writer.write_all(&buf[..n]).await?;
        *copied += n as u64;
        clock.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn relays_both_directions_until_eof() {
        let (client, mut client_peer) = duplex(64);
        let (origin, mut origin_peer) = duplex(64);

        let task = tokio::spawn(relay(client, origin, Duration::from_secs(5)));

        client_peer.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        origin_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        origin_peer.write_all(b"pong!").await.unwrap();
        let mut buf = [0u8; 5];
        client_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong!");

        drop(client_peer);
        drop(origin_peer);

        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.client_to_origin, 4);
        assert_eq!(stats.origin_to_client, 5);
    }

    #[tokio::test]
    async fn idle_relay_times_out() {
        let (client, _client_peer) = duplex(64);
        let (origin, _origin_peer) = duplex(64);

        let err = relay(client, origin, Duration::from_millis(100)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn pipe_leaves_writer_open() {
        let (mut reader, mut reader_peer) = duplex(64);
        let (mut writer, mut writer_peer) = duplex(64);
        let clock = IdleClock::new(Duration::from_secs(5));
        let mut copied = 0;

        reader_peer.write_all(b"first").await.unwrap();
        drop(reader_peer);
        pipe(&mut reader, &mut writer, &clock, &mut copied).await.unwrap();
        assert_eq!(copied, 5);

        writer.write_all(b"+more").await.unwrap();
        drop(writer);
        let mut out = Vec::new();
        writer_peer.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"first+more");
    }

    #[tokio::test]
    async fn touched_clock_keeps_pipe_alive() {
        let (mut reader, _reader_peer) = duplex(64);
        let (mut writer, _writer_peer) = duplex(64);
        let clock = IdleClock::new(Duration::from_millis(200));
        let mut copied = 0;

        let keep_alive = async {
            for _ in 0..4 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                clock.touch();
            }
        };
        let piped = tokio::time::timeout(
            Duration::from_millis(350),
            pipe(&mut reader, &mut writer, &clock, &mut copied),
        );

        let (_, result) = tokio::join!(keep_alive, piped);
        assert!(result.is_err(), "pipe gave up while the other direction was active");
    }
}
