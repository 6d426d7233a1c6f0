use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use linecached_proto::{parse_line, Encoder, MemcachedMarshal, Op, Parsed, ProtoError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::cache::{schedule_flush, CacheEngine, ValueRecord};
use crate::config::Config;
use crate::metrics::Metrics;
use crate::server::counting::CountingStream;
use crate::stats::{RuntimeSampler, StatsSnapshot, SERVER_VERSION};

pub const READ_BUF_CAPACITY: usize = 64 * 1024;
pub const WRITE_BUF_CAPACITY: usize = 256 * 1024;

/// Everything a connection task needs, shared across the whole process.
pub struct Context {
    pub cache: Arc<CacheEngine>,
    pub metrics: Arc<Metrics>,
    pub runtime: Arc<RuntimeSampler>,
    pub config: Config,
}

/// Runs the `READ_LINE -> PARSE -> DISPATCH -> WRITE -> FLUSH` loop for one
/// connection until EOF, `quit`, an idle timeout, or an unrecoverable error.
pub async fn handle(stream: TcpStream, ctx: Arc<Context>, idle_timeout: Option<Duration>) {
    let counted = CountingStream::new(stream, ctx.metrics.clone());
    let (read_half, write_half) = tokio::io::split(counted);
    let mut reader = BufReader::with_capacity(READ_BUF_CAPACITY, read_half);
    let mut writer = BufWriter::with_capacity(WRITE_BUF_CAPACITY, write_half);

    loop {
        let line = match read_command_line(&mut reader, ctx.config.cache_max_item_size, idle_timeout).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => break,
            Err(LineReadError::TooLong) => {
                let err = ProtoError::client("line too long");
                if write_error(&mut writer, &err).await.is_err() {
                    break;
                }
                continue;
            }
            Err(LineReadError::Io(_)) => break,
        };

        let line = match std::str::from_utf8(&line) {
            Ok(s) => s,
            Err(_) => {
                if write_error(&mut writer, &ProtoError::client("bad command line format")).await.is_err() {
                    break;
                }
                continue;
            }
        };

        match dispatch(line, &mut reader, &mut writer, &ctx, idle_timeout).await {
            Ok(true) => continue,
            Ok(false) => break,
            Err(_) => break,
        }
    }

    let _ = writer.flush().await;
}

/// Writes a single `SERVER_ERROR <msg>` and drops the connection. Used for
/// hard-cap rejections before a handler loop ever starts.
pub async fn reject(mut stream: TcpStream, msg: &str) {
    let mut enc = Encoder::new();
    enc.error(&ProtoError::server(msg));
    let _ = stream.write_all(enc.as_bytes()).await;
}

async fn with_idle_timeout<T>(
    fut: impl std::future::Future<Output = io::Result<T>>,
    deadline: Option<Duration>,
) -> io::Result<T> {
    match deadline {
        Some(d) => timeout(d, fut)
            .await
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "idle timeout"))),
        None => fut.await,
    }
}

/// A line-read failure that needs different handling than a plain IO error:
/// an overlong line keeps the connection usable (§4.5 step 2), everything
/// else closes it.
enum LineReadError {
    TooLong,
    Io(io::Error),
}

/// Reads one CRLF-terminated line via `fill_buf`/`consume` so an overlong
/// line (no terminator within `max_len` bytes) is rejected without
/// buffering unboundedly. Once the line exceeds `max_len`, the remaining
/// bytes up to and including the terminator are still consumed from the
/// stream so framing stays intact for the next command. Returns `Ok(None)`
/// on a clean EOF before any bytes were read.
async fn read_command_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    max_len: usize,
    idle_timeout: Option<Duration>,
) -> Result<Option<Vec<u8>>, LineReadError> {
    let mut line = Vec::new();
    let mut too_long = false;
    loop {
        let available = with_idle_timeout(reader.fill_buf(), idle_timeout)
            .await
            .map_err(LineReadError::Io)?;

        if available.is_empty() {
            return if too_long {
                Err(LineReadError::TooLong)
            } else if line.is_empty() {
                Ok(None)
            } else {
                Err(LineReadError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof mid-line")))
            };
        }

        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            if !too_long {
                line.extend_from_slice(&available[..pos]);
            }
            reader.consume(pos + 1);
            return if too_long {
                Err(LineReadError::TooLong)
            } else {
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                Ok(Some(line))
            };
        }

        if !too_long {
            line.extend_from_slice(available);
        }
        let used = available.len();
        reader.consume(used);
        if !too_long && line.len() > max_len {
            too_long = true;
            line.clear();
        }
    }
}

async fn write_error<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    err: &ProtoError,
) -> io::Result<()> {
    let mut enc = Encoder::new();
    enc.error(err);
    writer.write_all(enc.as_bytes()).await?;
    writer.flush().await
}

/// Parses and executes one command line. Returns `Ok(true)` to keep the
/// connection's loop going, `Ok(false)` to close it cleanly (`quit`),
/// `Err(())` on an unrecoverable IO error.
async fn dispatch<R, W>(
    line: &str,
    reader: &mut R,
    writer: &mut W,
    ctx: &Arc<Context>,
    idle_timeout: Option<Duration>,
) -> Result<bool, ()>
where
    R: AsyncBufRead + AsyncReadExt + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let parsed = match parse_line(line) {
        Ok(p) => p,
        Err(e) => {
            write_error(writer, &e).await.map_err(|_| ())?;
            return Ok(true);
        }
    };

    let op = match parsed {
        Parsed::Op(op) => op,
        Parsed::PendingSet(pending) => {
            ctx.metrics.cmd_set.fetch_add(1, Ordering::Relaxed);

            if pending.length > ctx.config.cache_max_item_size as u64 {
                // Still has to come off the wire: leaving it unread would
                // desync framing for every command after this one on the
                // same connection. Discarded in fixed-size chunks so a
                // client can't force an allocation proportional to its own
                // (rejected) declared length.
                let discard_fut = discard_payload(reader, pending.length);
                if with_idle_timeout(discard_fut, idle_timeout).await.is_err() {
                    return Err(());
                }
                let err = ProtoError::client(format!(
                    "length of {} greater than max item size of {}",
                    pending.length, ctx.config.cache_max_item_size
                ));
                write_error(writer, &err).await.map_err(|_| ())?;
                ctx.metrics.store_too_large.fetch_add(1, Ordering::Relaxed);
                return Ok(true);
            }

            let bytes = match read_payload(reader, pending.length as usize, idle_timeout).await {
                Ok(b) => b,
                Err((read_so_far, e)) => {
                    let err = ProtoError::client(format!(
                        "unable to read {} payload bytes, only read {read_so_far}: {e}",
                        pending.length
                    ));
                    let _ = write_error(writer, &err).await;
                    return Err(());
                }
            };

            Op::Set(linecached_proto::SetOp {
                key: pending.key,
                flags: pending.flags,
                expire: pending.expire,
                noreply: pending.noreply,
                bytes,
            })
        }
    };

    match op {
        Op::Get { keys, with_cas } => {
            ctx.metrics.cmd_get.fetch_add(1, Ordering::Relaxed);
            let mut enc = Encoder::new();
            for (key, entry) in ctx.cache.get(&keys) {
                let cas = with_cas.then_some(entry.unique);
                enc.marshal(&ValueRecord {
                    key: &key,
                    flags: entry.flags,
                    value: &entry.value,
                    cas,
                });
            }
            enc.end();
            writer.write_all(enc.as_bytes()).await.map_err(|_| ())?;
            writer.flush().await.map_err(|_| ())?;
        }
        Op::Set(set_op) => {
            let unique = ctx
                .cache
                .set(set_op.key, set_op.flags, set_op.expire, set_op.bytes);
            let _ = unique;
            if !set_op.noreply {
                let mut enc = Encoder::new();
                enc.stored();
                writer.write_all(enc.as_bytes()).await.map_err(|_| ())?;
                writer.flush().await.map_err(|_| ())?;
            }
        }
        Op::Delete { key, noreply } => {
            let existed = ctx.cache.delete(&key);
            if existed {
                ctx.metrics.delete_hits.fetch_add(1, Ordering::Relaxed);
            } else {
                ctx.metrics.delete_misses.fetch_add(1, Ordering::Relaxed);
            }
            if !noreply {
                let mut enc = Encoder::new();
                if existed {
                    enc.deleted();
                } else {
                    enc.error(&ProtoError::NotFound);
                }
                writer.write_all(enc.as_bytes()).await.map_err(|_| ())?;
                writer.flush().await.map_err(|_| ())?;
            }
        }
        Op::FlushAll { delay_secs, noreply } => {
            ctx.metrics.cmd_flush.fetch_add(1, Ordering::Relaxed);
            if delay_secs == 0 {
                ctx.cache.flush_all();
            } else {
                schedule_flush(ctx.cache.clone(), Duration::from_secs(delay_secs));
            }
            if !noreply {
                let mut enc = Encoder::new();
                enc.ok();
                writer.write_all(enc.as_bytes()).await.map_err(|_| ())?;
                writer.flush().await.map_err(|_| ())?;
            }
        }
        Op::CacheMemLimit { mb, noreply } => {
            ctx.cache.set_max_capacity(mb * 1024 * 1024);
            if !noreply {
                let mut enc = Encoder::new();
                enc.ok();
                writer.write_all(enc.as_bytes()).await.map_err(|_| ())?;
                writer.flush().await.map_err(|_| ())?;
            }
        }
        Op::Stats => {
            let runtime = ctx.runtime.snapshot();
            let snapshot = StatsSnapshot::build(&ctx.config, &ctx.metrics, &ctx.cache, runtime);
            let mut enc = Encoder::new();
            enc.marshal(&snapshot);
            writer.write_all(enc.as_bytes()).await.map_err(|_| ())?;
            writer.flush().await.map_err(|_| ())?;
        }
        Op::Version => {
            let mut enc = Encoder::new();
            enc.version(SERVER_VERSION);
            writer.write_all(enc.as_bytes()).await.map_err(|_| ())?;
            writer.flush().await.map_err(|_| ())?;
        }
        Op::Quit => return Ok(false),
    }

    Ok(true)
}

/// Reads exactly `length + 2` bytes (payload plus trailing CRLF), applying
/// the idle deadline to each individual read so a slow-but-alive client
/// doesn't get penalized for the whole transfer taking longer than one
/// deadline. On a short read (EOF or timeout before the buffer fills), the
/// error carries how many bytes were actually read so the wire message can
/// report both numbers, matching the reference server's `unable to read %d
/// payload bytes, only read %d` wording.
async fn read_payload<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    length: usize,
    idle_timeout: Option<Duration>,
) -> Result<Bytes, (usize, io::Error)> {
    let mut buf = vec![0u8; length + 2];
    let mut read_so_far = 0;
    while read_so_far < buf.len() {
        let read_fut = reader.read(&mut buf[read_so_far..]);
        match with_idle_timeout(read_fut, idle_timeout).await {
            Ok(0) => {
                return Err((read_so_far, io::Error::new(io::ErrorKind::UnexpectedEof, "eof")));
            }
            Ok(n) => read_so_far += n,
            Err(e) => return Err((read_so_far, e)),
        }
    }
    buf.truncate(length);
    Ok(Bytes::from(buf))
}

const DISCARD_CHUNK_SIZE: usize = 8 * 1024;

/// Reads and drops `length + 2` bytes (payload plus trailing CRLF) in
/// bounded chunks, so rejecting an oversized `set` costs a fixed amount of
/// memory regardless of the declared length.
async fn discard_payload<R: AsyncReadExt + Unpin>(reader: &mut R, length: u64) -> io::Result<()> {
    let mut remaining = length + 2;
    let mut chunk = [0u8; DISCARD_CHUNK_SIZE];
    while remaining > 0 {
        let take = remaining.min(DISCARD_CHUNK_SIZE as u64) as usize;
        reader.read_exact(&mut chunk[..take]).await?;
        remaining -= take as u64;
    }
    Ok(())
}
