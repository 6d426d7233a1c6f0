use bytes::Bytes;

/// The 30-day boundary (in seconds) separating a relative `expire` from an
/// absolute Unix timestamp.
pub const MAX_RELATIVE_EXPIRE: i64 = 2_592_000;

/// A fully parsed request. Everything the connection handler needs to
/// dispatch is owned here; nothing refers back to the source line.
#[derive(Debug)]
pub enum Op {
    Get { keys: Vec<String>, with_cas: bool },
    Set(SetOp),
    Delete { key: String, noreply: bool },
    FlushAll { delay_secs: u64, noreply: bool },
    CacheMemLimit { mb: u64, noreply: bool },
    Stats,
    Version,
    Quit,
}

#[derive(Debug)]
pub struct SetOp {
    pub key: String,
    pub flags: u32,
    pub expire: i64,
    pub noreply: bool,
    pub bytes: Bytes,
}

/// A `set` command whose line has been parsed but whose payload has not yet
/// arrived. The connection handler reads exactly `length + 2` more bytes
/// from the socket and hands them to [`SetOp::finish`].
#[derive(Debug)]
pub struct PendingSet {
    pub key: String,
    pub flags: u32,
    pub expire: i64,
    pub length: u64,
    pub noreply: bool,
}

/// Either a complete operation or a `set` still waiting on its payload.
#[derive(Debug)]
pub enum Parsed {
    Op(Op),
    PendingSet(PendingSet),
}
