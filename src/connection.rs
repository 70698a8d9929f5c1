//! Connection abstraction for Unix socket and TCP control streams

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{tcp, unix, TcpStream, UnixStream};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::protocol::Response;

/// Longest request line accepted, terminator included
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// One request line as read off the wire
#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    /// Raw bytes of the line, terminator included
    Bytes(Vec<u8>),
    /// The line exceeded `MAX_LINE_LENGTH` and was discarded
    TooLong,
    /// End of stream
    Closed,
}

/// A control connection from the mail server plugin, split into buffered read and write halves
pub enum Connection {
    /// Unix domain socket connection
    Unix {
        reader: Mutex<BufReader<unix::OwnedReadHalf>>,
        writer: Mutex<BufWriter<unix::OwnedWriteHalf>>,
    },
    /// TCP connection
    Tcp {
        reader: Mutex<BufReader<tcp::OwnedReadHalf>>,
        writer: Mutex<BufWriter<tcp::OwnedWriteHalf>>,
        peer_addr: std::net::SocketAddr,
    },
}

impl Connection {
    pub fn unix(stream: UnixStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self::Unix {
            reader: Mutex::new(BufReader::new(read_half)),
            writer: Mutex::new(BufWriter::new(write_half)),
        }
    }

    pub fn tcp(stream: TcpStream) -> Result<Self> {
        let peer_addr = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self::Tcp {
            reader: Mutex::new(BufReader::new(read_half)),
            writer: Mutex::new(BufWriter::new(write_half)),
            peer_addr,
        })
    }

    /// Read one request line without assuming it is valid UTF-8
    pub async fn read_line(&self) -> Result<Line> {
        match self {
            Connection::Unix { reader, .. } => {
                read_capped_line(&mut *reader.lock().await, MAX_LINE_LENGTH).await
            }
            Connection::Tcp { reader, .. } => {
                read_capped_line(&mut *reader.lock().await, MAX_LINE_LENGTH).await
            }
        }
    }

    /// Write a response to the connection
    pub async fn write_response(&self, response: &Response) -> Result<()> {
        let response_str = response.to_string();
        match self {
            Connection::Unix { writer, .. } => {
                let mut guard = writer.lock().await;
                guard.write_all(response_str.as_bytes()).await?;
                guard.flush().await?;
            }
            Connection::Tcp { writer, .. } => {
                let mut guard = writer.lock().await;
                guard.write_all(response_str.as_bytes()).await?;
                guard.flush().await?;
            }
        }
        Ok(())
    }

    /// Peer description for logging
    pub fn peer(&self) -> String {
        match self {
            Connection::Unix { .. } => "unix socket".to_string(),
            Connection::Tcp { peer_addr, .. } => peer_addr.to_string(),
        }
    }
}

/// Read up to `max` bytes of a line
///
/// When no newline shows up within `max` bytes the rest of the line is
/// skipped, so the next read starts at the following request.
async fn read_capped_line<R>(reader: &mut R, max: usize) -> Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(max as u64)
        .read_until(b'\n', &mut buf)
        .await?;
    if n == 0 {
        return Ok(Line::Closed);
    }
    if buf.last() == Some(&b'\n') || n < max {
        return Ok(Line::Bytes(buf));
    }

    loop {
        let (consumed, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            }
        };
        reader.consume(consumed);
        if done {
            break;
        }
    }
    Ok(Line::TooLong)
}
