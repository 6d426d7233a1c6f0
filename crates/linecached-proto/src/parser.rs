use crate::key::validate_key;
use crate::ops::{Op, Parsed, PendingSet};
use crate::ProtoError;

const UNSUPPORTED_VERBS: &[&str] = &[
    "add", "append", "prepend", "replace", "cas", "incr", "decr", "touch", "gat", "gats", "lru",
    "slabs", "watch", "shutdown",
];

/// Parses one command line (tokens space-separated, `\r\n` already
/// stripped). Everything except `set` resolves to a complete [`Op`]; `set`
/// resolves to a [`PendingSet`] since its payload hasn't been read yet.
pub fn parse_line(line: &str) -> Result<Parsed, ProtoError> {
    if line.is_empty() {
        return Err(ProtoError::BadCommand);
    }

    let parts: Vec<&str> = line.split(' ').filter(|s| !s.is_empty()).collect();
    if parts.is_empty() {
        return Err(ProtoError::BadCommand);
    }

    let cmd = parts[0].to_ascii_lowercase();
    match cmd.as_str() {
        "get" => parse_get(line, &parts, false).map(Parsed::Op),
        "gets" => parse_get(line, &parts, true).map(Parsed::Op),
        "set" => parse_set(line, &parts).map(Parsed::PendingSet),
        "delete" => parse_delete(line, &parts).map(Parsed::Op),
        "flush_all" => parse_flush_all(line, &parts).map(Parsed::Op),
        "cache_memlimit" => parse_cache_memlimit(line, &parts).map(Parsed::Op),
        "quit" => Ok(Parsed::Op(Op::Quit)),
        "stats" => Ok(Parsed::Op(Op::Stats)),
        "version" => Ok(Parsed::Op(Op::Version)),
        _ if UNSUPPORTED_VERBS.contains(&cmd.as_str()) => {
            Err(ProtoError::server(format!("{cmd} not implemented")))
        }
        _ => Err(ProtoError::BadCommand),
    }
}

fn parse_get(line: &str, parts: &[&str], with_cas: bool) -> Result<Op, ProtoError> {
    if parts.len() < 2 {
        return Err(ProtoError::client(format!("bad command line format: '{line}'")));
    }
    let keys: Vec<String> = parts[1..].iter().map(|s| s.to_string()).collect();
    for key in &keys {
        validate_key(key)?;
    }
    Ok(Op::Get { keys, with_cas })
}

fn parse_set(line: &str, parts: &[&str]) -> Result<PendingSet, ProtoError> {
    if parts.len() < 4 {
        return Err(ProtoError::client(format!("bad command line format: '{line}'")));
    }

    let key = parts[1].to_string();
    validate_key(&key)?;

    let flags: u32 = parts[2]
        .parse()
        .map_err(|_| ProtoError::client(format!("bad command line format: '{line}'")))?;
    let expire: i64 = parts[3]
        .parse()
        .map_err(|_| ProtoError::client(format!("bad command line format: '{line}'")))?;
    let length: u64 = parts
        .get(4)
        .ok_or_else(|| ProtoError::client(format!("bad command line format: '{line}'")))?
        .parse()
        .map_err(|_| ProtoError::client(format!("bad command line format: '{line}'")))?;

    let noreply = parts.get(5).is_some_and(|t| t.eq_ignore_ascii_case("noreply"));

    Ok(PendingSet {
        key,
        flags,
        expire,
        length,
        noreply,
    })
}

fn parse_delete(line: &str, parts: &[&str]) -> Result<Op, ProtoError> {
    if parts.len() < 2 {
        return Err(ProtoError::client(format!("bad command line format: '{line}'")));
    }
    let key = parts[1].to_string();
    validate_key(&key)?;
    let noreply = parts.get(2).is_some_and(|t| t.eq_ignore_ascii_case("noreply"));
    Ok(Op::Delete { key, noreply })
}

fn parse_flush_all(line: &str, parts: &[&str]) -> Result<Op, ProtoError> {
    match parts.len() {
        1 => Ok(Op::FlushAll { delay_secs: 0, noreply: false }),
        2 => {
            if parts[1].eq_ignore_ascii_case("noreply") {
                Ok(Op::FlushAll { delay_secs: 0, noreply: true })
            } else {
                let delay_secs: u64 = parts[1]
                    .parse()
                    .map_err(|_| ProtoError::client(format!("bad delay: '{line}'")))?;
                Ok(Op::FlushAll { delay_secs, noreply: false })
            }
        }
        3 => {
            let delay_secs: u64 = parts[1]
                .parse()
                .map_err(|_| ProtoError::client(format!("bad delay: '{line}'")))?;
            let noreply = parts[2].eq_ignore_ascii_case("noreply");
            Ok(Op::FlushAll { delay_secs, noreply })
        }
        _ => Err(ProtoError::client(format!("bad command line format: '{line}'"))),
    }
}

fn parse_cache_memlimit(line: &str, parts: &[&str]) -> Result<Op, ProtoError> {
    if parts.len() < 2 {
        return Err(ProtoError::client(format!("bad cache_memlimit command '{line}'")));
    }
    let mb: u64 = parts[1]
        .parse()
        .map_err(|_| ProtoError::client(format!("bad cache size: '{line}'")))?;
    if mb == 0 {
        return Err(ProtoError::client("bad cache size: must be at least 1 MB"));
    }
    let noreply = parts.get(2).is_some_and(|t| t.eq_ignore_ascii_case("noreply"));
    Ok(Op::CacheMemLimit { mb, noreply })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_with_multiple_keys() {
        match parse_line("get foo bar").unwrap() {
            Parsed::Op(Op::Get { keys, with_cas }) => {
                assert_eq!(keys, vec!["foo", "bar"]);
                assert!(!with_cas);
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn parses_gets_as_cas_variant() {
        match parse_line("gets foo").unwrap() {
            Parsed::Op(Op::Get { with_cas, .. }) => assert!(with_cas),
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn parses_set_header_into_pending_set() {
        match parse_line("set foo 0 0 5").unwrap() {
            Parsed::PendingSet(p) => {
                assert_eq!(p.key, "foo");
                assert_eq!(p.flags, 0);
                assert_eq!(p.expire, 0);
                assert_eq!(p.length, 5);
                assert!(!p.noreply);
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn set_noreply_trailing_token() {
        match parse_line("set foo 0 0 5 noreply").unwrap() {
            Parsed::PendingSet(p) => assert!(p.noreply),
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn empty_line_is_bad_command() {
        assert!(matches!(parse_line(""), Err(ProtoError::BadCommand)));
    }

    #[test]
    fn unknown_verb_is_bad_command() {
        assert!(matches!(parse_line("foobar"), Err(ProtoError::BadCommand)));
    }

    #[test]
    fn known_unsupported_verb_is_server_error() {
        match parse_line("incr foo 1") {
            Err(ProtoError::Server(msg)) => assert_eq!(msg, "incr not implemented"),
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn flush_all_bare_noreply() {
        match parse_line("flush_all noreply").unwrap() {
            Parsed::Op(Op::FlushAll { delay_secs, noreply }) => {
                assert_eq!(delay_secs, 0);
                assert!(noreply);
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn flush_all_with_delay_and_noreply() {
        match parse_line("flush_all 30 noreply").unwrap() {
            Parsed::Op(Op::FlushAll { delay_secs, noreply }) => {
                assert_eq!(delay_secs, 30);
                assert!(noreply);
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn cache_memlimit_rejects_zero() {
        assert!(matches!(
            parse_cache_memlimit("cache_memlimit 0", &["cache_memlimit", "0"]),
            Err(ProtoError::Client(_))
        ));
    }

    #[test]
    fn key_too_long_is_client_error() {
        let long_key = "a".repeat(251);
        let line = format!("get {long_key}");
        assert!(matches!(parse_line(&line), Err(ProtoError::Client(_))));
    }

    #[test]
    fn key_at_max_length_is_accepted() {
        let key = "a".repeat(250);
        let line = format!("get {key}");
        assert!(parse_line(&line).is_ok());
    }
}
