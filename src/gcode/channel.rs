//! Trait abstraction for the line-oriented machine command channel to enable testing

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::error::{JogError, Result};

/// Bidirectional line protocol to the machine.
#[async_trait]
pub trait CommandChannel: Send {
    /// Send one command line; the line terminator is added here.
    async fn send_line(&mut self, line: &str) -> Result<()>;

    /// Read the next non-empty line, without its terminator.
    ///
    /// `None` waits as long as it takes. With a timeout, running out of
    /// time is a `ChannelProtocol` error; a partly received line is kept
    /// for the next read.
    async fn read_line(&mut self, timeout: Option<Duration>) -> Result<String>;

    /// Throw away everything that arrives until the channel has been quiet
    /// for `quiet_for`. Returns the number of bytes discarded.
    async fn discard_pending(&mut self, quiet_for: Duration) -> Result<usize>;
}

/// [`CommandChannel`] over any async byte stream pair (serial port, stdio).
pub struct LineChannel<R, W> {
    reader: BufReader<R>,
    writer: W,
    // Bytes of a line not yet terminated, kept across timed out reads.
    partial: Vec<u8>,
}

impl<R, W> LineChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            partial: Vec::new(),
        }
    }

    async fn read_raw_line(&mut self) -> Result<String> {
        loop {
            let n = self.reader.read_until(b'\n', &mut self.partial).await?;
            if n == 0 && self.partial.is_empty() {
                return Err(JogError::ChannelClosed);
            }
            let buf = std::mem::take(&mut self.partial);
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(&['\r', '\n'][..]);
            if !line.is_empty() {
                return Ok(line.to_string());
            }
        }
    }
}

#[async_trait]
impl<R, W> CommandChannel for LineChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send_line(&mut self, line: &str) -> Result<()> {
        let mut out = String::with_capacity(line.len() + 1);
        out.push_str(line);
        out.push('\n');
        self.writer.write_all(out.as_bytes()).await?;
        self.writer.flush().await?;
        debug!("-> {}", line);
        Ok(())
    }

    async fn read_line(&mut self, timeout: Option<Duration>) -> Result<String> {
        let line = match timeout {
            Some(t) => tokio::time::timeout(t, self.read_raw_line())
                .await
                .map_err(|_| {
                    JogError::ChannelProtocol(format!("no response within {} ms", t.as_millis()))
                })??,
            None => self.read_raw_line().await?,
        };
        debug!("<- {}", line);
        Ok(line)
    }

    async fn discard_pending(&mut self, quiet_for: Duration) -> Result<usize> {
        let mut total = self.partial.len();
        self.partial.clear();
        let mut buf = [0u8; 128];
        loop {
            match tokio::time::timeout(quiet_for, self.reader.read(&mut buf)).await {
                Err(_) => break,
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    total += n;
                    debug!("discarded: {}", String::from_utf8_lossy(&buf[..n]).trim_end());
                }
                Ok(Err(e)) => return Err(e.into()),
            }
        }
        Ok(total)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_send_line_appends_newline() {
        let mock = Builder::new().write(b"G21\n").build();
        let (reader, writer) = tokio::io::split(mock);
        let mut channel = LineChannel::new(reader, writer);
        channel.send_line("G21").await.unwrap();
    }

    #[tokio::test]
    async fn test_read_line_strips_terminators_and_blank_lines() {
        let mock = Builder::new().read(b"\r\n").read(b"ok\r\n").read(b"X:1 Y:2 Z:3\n").build();
        let (reader, writer) = tokio::io::split(mock);
        let mut channel = LineChannel::new(reader, writer);
        assert_eq!(channel.read_line(None).await.unwrap(), "ok");
        assert_eq!(channel.read_line(None).await.unwrap(), "X:1 Y:2 Z:3");
    }

    #[tokio::test]
    async fn test_read_line_reports_closed_channel() {
        let mock = Builder::new().build();
        let (reader, writer) = tokio::io::split(mock);
        let mut channel = LineChannel::new(reader, writer);
        assert!(matches!(channel.read_line(None).await, Err(JogError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_read_line_invalid_utf8_is_lossy() {
        let mock = Builder::new().read(b"ok \xff\n").build();
        let (reader, writer) = tokio::io::split(mock);
        let mut channel = LineChannel::new(reader, writer);
        let line = channel.read_line(None).await.unwrap();
        assert!(line.starts_with("ok "));
    }

    #[tokio::test]
    async fn test_discard_pending_counts_bytes_until_eof() {
        let mock = Builder::new()
            .read(b"start\n")
            .read(b"echo: External Reset\n")
            .build();
        let (reader, writer) = tokio::io::split(mock);
        let mut channel = LineChannel::new(reader, writer);
        let discarded = channel.discard_pending(Duration::from_millis(50)).await.unwrap();
        assert_eq!(discarded, 6 + 21);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_pending_stops_when_quiet() {
        let (client, mut machine) = tokio::io::duplex(256);
        machine.write_all(b"Marlin 2.1\nok\n").await.unwrap();
        let (reader, writer) = tokio::io::split(client);
        let mut channel = LineChannel::new(reader, writer);
        let discarded = channel.discard_pending(Duration::from_millis(100)).await.unwrap();
        assert_eq!(discarded, 14);

        // nothing buffered afterwards: a timed read runs out of time
        let result = channel.read_line(Some(Duration::from_millis(10))).await;
        assert!(matches!(result, Err(JogError::ChannelProtocol(_))));
        drop(machine);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_read_keeps_partial_line() {
        let (client, mut machine) = tokio::io::duplex(256);
        let (reader, writer) = tokio::io::split(client);
        let mut channel = LineChannel::new(reader, writer);

        machine.write_all(b"X:1.00 Y:").await.unwrap();
        let result = channel.read_line(Some(Duration::from_millis(10))).await;
        assert!(matches!(result, Err(JogError::ChannelProtocol(_))));

        machine.write_all(b"2.00 Z:3.00\nok\n").await.unwrap();
        assert_eq!(channel.read_line(None).await.unwrap(), "X:1.00 Y:2.00 Z:3.00");
        assert_eq!(channel.read_line(None).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_line_without_terminator_before_eof() {
        let mock = Builder::new().read(b"ok").build();
        let (reader, writer) = tokio::io::split(mock);
        let mut channel = LineChannel::new(reader, writer);
        assert_eq!(channel.read_line(None).await.unwrap(), "ok");
        assert!(matches!(channel.read_line(None).await, Err(JogError::ChannelClosed)));
    }
}
