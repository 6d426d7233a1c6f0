//! A small async client for the linecached text protocol. This crate is
//! not part of the server's core; it exists so integration tests (and any
//! future CLI/load-generation tooling) can speak the wire protocol without
//! hand-rolling `TcpStream` plumbing in every test.

use std::collections::HashMap;
use std::io;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("protocol: unexpected line {0:?}")]
    Protocol(String),
}

/// One entry returned by `get`/`gets`.
#[derive(Debug, Clone)]
pub struct Item {
    pub key: String,
    pub flags: u32,
    pub value: Bytes,
    pub cas: Option<u64>,
}

pub struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl Client {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
        })
    }

    pub async fn get(&mut self, keys: &[&str]) -> Result<Vec<Item>, ClientError> {
        self.write_line(&format!("get {}", keys.join(" "))).await?;
        self.read_values().await
    }

    pub async fn gets(&mut self, keys: &[&str]) -> Result<Vec<Item>, ClientError> {
        self.write_line(&format!("gets {}", keys.join(" "))).await?;
        self.read_values().await
    }

    pub async fn set(
        &mut self,
        key: &str,
        flags: u32,
        expire: i64,
        value: &[u8],
    ) -> Result<(), ClientError> {
        self.write_set_line(key, flags, expire, value, false).await?;
        self.expect_line("STORED").await
    }

    pub async fn set_noreply(
        &mut self,
        key: &str,
        flags: u32,
        expire: i64,
        value: &[u8],
    ) -> Result<(), ClientError> {
        self.write_set_line(key, flags, expire, value, true).await
    }

    async fn write_set_line(
        &mut self,
        key: &str,
        flags: u32,
        expire: i64,
        value: &[u8],
        noreply: bool,
    ) -> Result<(), ClientError> {
        let suffix = if noreply { " noreply" } else { "" };
        self.writer
            .write_all(format!("set {key} {flags} {expire} {}{suffix}\r\n", value.len()).as_bytes())
            .await?;
        self.writer.write_all(value).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn delete(&mut self, key: &str) -> Result<bool, ClientError> {
        self.write_line(&format!("delete {key}")).await?;
        match self.read_line().await?.as_str() {
            "DELETED" => Ok(true),
            "NOT_FOUND" => Ok(false),
            other => Err(ClientError::Protocol(other.to_string())),
        }
    }

    pub async fn flush_all(&mut self) -> Result<(), ClientError> {
        self.write_line("flush_all").await?;
        self.expect_line("OK").await
    }

    pub async fn cache_memlimit(&mut self, mb: u64) -> Result<(), ClientError> {
        self.write_line(&format!("cache_memlimit {mb}")).await?;
        self.expect_line("OK").await
    }

    pub async fn version(&mut self) -> Result<String, ClientError> {
        self.write_line("version").await?;
        let line = self.read_line().await?;
        line.strip_prefix("VERSION ")
            .map(str::to_string)
            .ok_or(ClientError::Protocol(line))
    }

    pub async fn stats(&mut self) -> Result<HashMap<String, String>, ClientError> {
        self.write_line("stats").await?;
        let mut out = HashMap::new();
        loop {
            let line = self.read_line().await?;
            if line == "END" {
                return Ok(out);
            }
            let mut parts = line.splitn(3, ' ');
            match (parts.next(), parts.next(), parts.next()) {
                (Some("STAT"), Some(name), Some(value)) => {
                    out.insert(name.to_string(), value.to_string());
                }
                _ => return Err(ClientError::Protocol(line)),
            }
        }
    }

    /// Sends `quit` and consumes the client; the server closes its side
    /// without a reply.
    pub async fn quit(mut self) -> Result<(), ClientError> {
        self.write_line("quit").await
    }

    async fn write_line(&mut self, line: &str) -> Result<(), ClientError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, ClientError> {
        let mut buf = String::new();
        let n = self.reader.read_line(&mut buf).await?;
        if n == 0 {
            return Err(ClientError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed",
            )));
        }
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(buf)
    }

    async fn expect_line(&mut self, expected: &str) -> Result<(), ClientError> {
        let line = self.read_line().await?;
        if line == expected {
            Ok(())
        } else {
            Err(ClientError::Protocol(line))
        }
    }

    async fn read_values(&mut self) -> Result<Vec<Item>, ClientError> {
        let mut items = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line == "END" {
                return Ok(items);
            }

            let mut parts = line.split(' ');
            if parts.next() != Some("VALUE") {
                return Err(ClientError::Protocol(line));
            }
            let key = parts
                .next()
                .ok_or_else(|| ClientError::Protocol(line.clone()))?
                .to_string();
            let flags: u32 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ClientError::Protocol(line.clone()))?;
            let len: usize = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ClientError::Protocol(line.clone()))?;
            let cas = parts.next().and_then(|s| s.parse().ok());

            let mut value = vec![0u8; len + 2];
            self.reader.read_exact(&mut value).await?;
            value.truncate(len);

            items.push(Item {
                key,
                flags,
                value: Bytes::from(value),
                cas,
            });
        }
    }
}
