//! Key → canonical slot tables.
//!
//! Structured formats name the same concept a dozen different ways. Each
//! format owns a static table mapping its keys onto a [`Slot`]; assignment
//! into the event is shared so every format coerces values identically.

use super::model::NormalizedEvent;

/// A canonical field of [`NormalizedEvent`] that a source key can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Timestamp,
    Level,
    Message,
    SourceIp,
    SourcePort,
    Hostname,
    Service,
    DestIp,
    DestPort,
    Category,
    Action,
    Outcome,
    UserId,
    UserName,
    Protocol,
    BytesIn,
    BytesOut,
    HttpMethod,
    HttpStatus,
    Url,
    UserAgent,
    FilePath,
    FileHash,
    ProcessName,
    Pid,
}

/// Synonyms shared by JSON and logfmt. Earlier entries win their slot.
pub const GENERIC_KEYS: &[(&str, Slot)] = &[
    ("timestamp", Slot::Timestamp),
    ("@timestamp", Slot::Timestamp),
    ("time", Slot::Timestamp),
    ("ts", Slot::Timestamp),
    ("datetime", Slot::Timestamp),
    ("eventtime", Slot::Timestamp),
    ("level", Slot::Level),
    ("severity", Slot::Level),
    ("lvl", Slot::Level),
    ("loglevel", Slot::Level),
    ("log_level", Slot::Level),
    ("message", Slot::Message),
    ("msg", Slot::Message),
    ("text", Slot::Message),
    ("log", Slot::Message),
    ("description", Slot::Message),
    ("host", Slot::Hostname),
    ("hostname", Slot::Hostname),
    ("host_name", Slot::Hostname),
    ("computer", Slot::Hostname),
    ("service", Slot::Service),
    ("app", Slot::Service),
    ("application", Slot::Service),
    ("program", Slot::Service),
    ("logger", Slot::Service),
    ("component", Slot::Service),
    ("src_ip", Slot::SourceIp),
    ("source_ip", Slot::SourceIp),
    ("src", Slot::SourceIp),
    ("client_ip", Slot::SourceIp),
    ("clientip", Slot::SourceIp),
    ("remote_addr", Slot::SourceIp),
    ("remote_ip", Slot::SourceIp),
    ("ip", Slot::SourceIp),
    ("src_port", Slot::SourcePort),
    ("source_port", Slot::SourcePort),
    ("sport", Slot::SourcePort),
    ("client_port", Slot::SourcePort),
    ("dst_ip", Slot::DestIp),
    ("dest_ip", Slot::DestIp),
    ("destination_ip", Slot::DestIp),
    ("dst", Slot::DestIp),
    ("server_ip", Slot::DestIp),
    ("dst_port", Slot::DestPort),
    ("dest_port", Slot::DestPort),
    ("destination_port", Slot::DestPort),
    ("dport", Slot::DestPort),
    ("server_port", Slot::DestPort),
    ("category", Slot::Category),
    ("event_category", Slot::Category),
    ("event_type", Slot::Category),
    ("action", Slot::Action),
    ("event_action", Slot::Action),
    ("outcome", Slot::Outcome),
    ("result", Slot::Outcome),
    ("event_outcome", Slot::Outcome),
    ("user_id", Slot::UserId),
    ("userid", Slot::UserId),
    ("uid", Slot::UserId),
    ("user", Slot::UserName),
    ("username", Slot::UserName),
    ("user_name", Slot::UserName),
    ("usr", Slot::UserName),
    ("account", Slot::UserName),
    ("protocol", Slot::Protocol),
    ("proto", Slot::Protocol),
    ("transport", Slot::Protocol),
    ("bytes_in", Slot::BytesIn),
    ("bytes_received", Slot::BytesIn),
    ("bytes_out", Slot::BytesOut),
    ("bytes_sent", Slot::BytesOut),
    ("bytes", Slot::BytesOut),
    ("method", Slot::HttpMethod),
    ("http_method", Slot::HttpMethod),
    ("request_method", Slot::HttpMethod),
    ("status", Slot::HttpStatus),
    ("status_code", Slot::HttpStatus),
    ("http_status", Slot::HttpStatus),
    ("response_code", Slot::HttpStatus),
    ("url", Slot::Url),
    ("uri", Slot::Url),
    ("path", Slot::Url),
    ("request_uri", Slot::Url),
    ("user_agent", Slot::UserAgent),
    ("useragent", Slot::UserAgent),
    ("http_user_agent", Slot::UserAgent),
    ("file", Slot::FilePath),
    ("file_path", Slot::FilePath),
    ("filename", Slot::FilePath),
    ("hash", Slot::FileHash),
    ("file_hash", Slot::FileHash),
    ("sha256", Slot::FileHash),
    ("md5", Slot::FileHash),
    ("process", Slot::ProcessName),
    ("process_name", Slot::ProcessName),
    ("proc", Slot::ProcessName),
    ("exe", Slot::ProcessName),
    ("pid", Slot::Pid),
    ("process_id", Slot::Pid),
];

/// Case-insensitive lookup of `key` in a format table.
pub fn lookup(table: &[(&str, Slot)], key: &str) -> Option<Slot> {
    position(table, key).map(|(_, slot)| slot)
}

fn position(table: &[(&str, Slot)], key: &str) -> Option<(usize, Slot)> {
    table
        .iter()
        .position(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|idx| (idx, table[idx].1))
}

/// Split `pairs` into slot candidates and unmapped pairs.
///
/// Candidates come back ordered by table position, so the preferred
/// synonym claims its slot no matter where it sits in the input. Unmapped
/// pairs keep input order.
pub fn rank_pairs<K, V, I>(table: &[(&str, Slot)], pairs: I) -> (Vec<(Slot, K, V)>, Vec<(K, V)>)
where
    K: AsRef<str>,
    I: IntoIterator<Item = (K, V)>,
{
    let mut ranked = Vec::new();
    let mut unmapped = Vec::new();
    for (key, value) in pairs {
        match position(table, key.as_ref()) {
            Some((idx, slot)) => ranked.push((idx, slot, key, value)),
            None => unmapped.push((key, value)),
        }
    }
    ranked.sort_by_key(|(idx, ..)| *idx);
    let candidates = ranked
        .into_iter()
        .map(|(_, slot, key, value)| (slot, key, value))
        .collect();
    (candidates, unmapped)
}

/// Fill an empty slot from `value`.
///
/// False when the slot is already taken or `value` yields nothing; the
/// caller then keeps the pair in `fields`.
pub fn fill<T>(target: &mut Option<T>, value: impl FnOnce() -> Option<T>) -> bool {
    if target.is_some() {
        return false;
    }
    *target = value();
    target.is_some()
}

fn set_text(target: &mut Option<String>, value: &str) -> bool {
    fill(target, || Some(value.to_string()))
}

fn set_parsed<T: std::str::FromStr>(target: &mut Option<T>, value: &str) -> bool {
    fill(target, || value.trim().parse::<T>().ok())
}

impl Slot {
    /// Store `value` in the event unless the slot is already filled.
    ///
    /// Returns `false` when the slot is taken or the value cannot be coerced
    /// into the slot's type (e.g. a non-numeric port); the caller then keeps
    /// the pair in `fields`.
    /// `Timestamp`, `Level` and `Message` need format context and are
    /// resolved by the caller, so they report `false` here.
    pub fn assign(self, event: &mut NormalizedEvent, value: &str) -> bool {
        if value.is_empty() || value == "-" {
            return true;
        }
        match self {
            Slot::Timestamp | Slot::Level | Slot::Message => false,
            Slot::SourceIp => set_text(&mut event.source_ip, value),
            Slot::SourcePort => set_parsed(&mut event.source_port, value),
            Slot::Hostname => set_text(&mut event.hostname, value),
            Slot::Service => set_text(&mut event.service, value),
            Slot::DestIp => set_text(&mut event.dest_ip, value),
            Slot::DestPort => set_parsed(&mut event.dest_port, value),
            Slot::Category => set_text(&mut event.category, value),
            Slot::Action => set_text(&mut event.action, value),
            Slot::Outcome => set_text(&mut event.outcome, value),
            Slot::UserId => set_text(&mut event.user_id, value),
            Slot::UserName => set_text(&mut event.user_name, value),
            Slot::Protocol => set_text(&mut event.protocol, value),
            Slot::BytesIn => set_parsed(&mut event.bytes_in, value),
            Slot::BytesOut => set_parsed(&mut event.bytes_out, value),
            Slot::HttpMethod => set_text(&mut event.http_method, value),
            Slot::HttpStatus => set_parsed(&mut event.http_status, value),
            Slot::Url => set_text(&mut event.url, value),
            Slot::UserAgent => set_text(&mut event.user_agent, value),
            Slot::FilePath => set_text(&mut event.file_path, value),
            Slot::FileHash => set_text(&mut event.file_hash, value),
            Slot::ProcessName => set_text(&mut event.process_name, value),
            Slot::Pid => set_parsed(&mut event.pid, value),
        }
    }
}
