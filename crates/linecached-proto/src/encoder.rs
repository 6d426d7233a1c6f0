use crate::ProtoError;
use bytes::BytesMut;

/// Lets an entry or a stats snapshot format itself onto an [`Encoder`]
/// without the encoder needing to know anything about the caller's type.
pub trait MemcachedMarshal {
    fn marshal(&self, out: &mut Encoder);
}

/// Builds one response into an in-memory buffer. The connection handler
/// writes the finished buffer to the socket in a single `write_all` call;
/// the encoder itself never touches I/O, which keeps it synchronous and
/// unit-testable without a live connection.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: BytesMut,
}

impl Encoder {
    pub fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: BytesMut::with_capacity(cap) }
    }

    pub fn line(&mut self, s: &str) -> &mut Self {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
        self
    }

    pub fn raw_bytes(&mut self, b: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(b);
        self.buf.extend_from_slice(b"\r\n");
        self
    }

    pub fn end(&mut self) -> &mut Self {
        self.line("END")
    }

    pub fn stored(&mut self) -> &mut Self {
        self.line("STORED")
    }

    pub fn deleted(&mut self) -> &mut Self {
        self.line("DELETED")
    }

    pub fn ok(&mut self) -> &mut Self {
        self.line("OK")
    }

    pub fn version(&mut self, v: &str) -> &mut Self {
        self.line(&format!("VERSION {v}"))
    }

    pub fn error(&mut self, err: &ProtoError) -> &mut Self {
        match err.wire_line() {
            Some(l) => self.line(&l),
            None => self,
        }
    }

    pub fn marshal(&mut self, obj: &dyn MemcachedMarshal) -> &mut Self {
        obj.marshal(self);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> BytesMut {
        self.buf
    }
}

/// Formats a `VALUE` header for a single `get`/`gets` hit. `cas` is `Some`
/// only when the request was `gets`.
pub fn value_header(key: &str, flags: u32, len: usize, cas: Option<u64>) -> String {
    match cas {
        Some(unique) => format!("VALUE {key} {flags} {len} {unique}"),
        None => format!("VALUE {key} {flags} {len}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_is_idempotent() {
        let mut a = Encoder::new();
        a.line("VALUE foo 0 5").raw_bytes(b"hello").end();
        let mut b = Encoder::new();
        b.line("VALUE foo 0 5").raw_bytes(b"hello").end();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn value_header_with_and_without_cas() {
        assert_eq!(value_header("foo", 0, 5, None), "VALUE foo 0 5");
        assert_eq!(value_header("foo", 0, 5, Some(1)), "VALUE foo 0 5 1");
    }

    #[test]
    fn error_quit_writes_nothing() {
        let mut e = Encoder::new();
        e.error(&ProtoError::Quit);
        assert!(e.as_bytes().is_empty());
    }

    #[test]
    fn error_client_writes_exact_token() {
        let mut e = Encoder::new();
        e.error(&ProtoError::client("bad key: contains invalid characters"));
        assert_eq!(e.as_bytes(), b"CLIENT_ERROR bad key: contains invalid characters\r\n");
    }
}
