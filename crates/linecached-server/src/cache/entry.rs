use bytes::Bytes;
use linecached_proto::{value_header, Encoder, MemcachedMarshal};
use std::time::Duration;

/// A stored record. `ttl` is the duration from creation to expiry, computed
/// once at `set` time and handed to moka's `Expiry` implementation; the
/// engine never inspects it again.
pub struct Entry {
    pub flags: u32,
    pub value: Bytes,
    pub unique: u64,
    pub ttl: Option<Duration>,
}

impl Entry {
    /// Accounting weight: `12 + |key| + |value|`, matching the reference
    /// server's cost formula.
    pub fn cost(key: &str, value_len: usize) -> u32 {
        (12 + key.len() + value_len) as u32
    }
}

/// A view of one `get`/`gets` hit, ready to marshal itself onto an
/// [`Encoder`] as a `VALUE` record. `cas` carries the entry's `unique` only
/// when the request was `gets`.
pub struct ValueRecord<'a> {
    pub key: &'a str,
    pub flags: u32,
    pub value: &'a [u8],
    pub cas: Option<u64>,
}

impl MemcachedMarshal for ValueRecord<'_> {
    fn marshal(&self, out: &mut Encoder) {
        out.line(&value_header(self.key, self.flags, self.value.len(), self.cas));
        out.raw_bytes(self.value);
    }
}
