// src/extract.rs

//! Turning raw provider log output into ordered [`ChangeRecord`]s.
//!
//! Each provider speaks its own log format, so parsing sits behind the
//! [`HistoryExtractor`] trait. Shape validation happens here and nowhere
//! else: records leaving this module are well formed.

use chrono::DateTime;
use indicatif::{ProgressBar, ProgressStyle};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{ExtractionError, Result};
use crate::model::{Action, ChangeRecord, ChangedPath, Kind};
use crate::provider::HistoryProvider;

/// Default trailer git-svn appends to every converted commit message
pub const DEFAULT_LINK_MARKER: &str = "git-svn-id:";

pub trait HistoryExtractor: Send + Sync {
    fn extract(&self, raw: &str) -> std::result::Result<Vec<ChangeRecord>, ExtractionError>;
}

/// Parser for `svn log --xml --verbose`.
#[derive(Debug, Default, Clone)]
pub struct SvnLogExtractor;

#[derive(Default)]
struct PendingEntry {
    id: String,
    author: String,
    date: String,
    msg: String,
    paths: Vec<ChangedPath>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Author,
    Date,
    Msg,
    Path,
}

impl HistoryExtractor for SvnLogExtractor {
    fn extract(&self, raw: &str) -> std::result::Result<Vec<ChangeRecord>, ExtractionError> {
        let mut reader = Reader::from_str(raw);
        let mut records = Vec::new();
        let mut saw_root = false;
        let mut entry: Option<PendingEntry> = None;
        let mut field: Option<Field> = None;
        let mut text = String::new();
        // action and kind of the <path> being read; kind is None for non-files
        let mut path_attrs: Option<(Action, Option<Kind>)> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                ExtractionError::Malformed(format!("at byte {}: {e}", reader.buffer_position()))
            })?;
            match event {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"log" => saw_root = true,
                    b"logentry" => {
                        let id = attribute(&e, "revision")?.ok_or_else(|| {
                            ExtractionError::Malformed("logentry without revision".into())
                        })?;
                        if id.parse::<u64>().is_err() {
                            return Err(invalid(&id, format!("revision `{id}` is not a number")));
                        }
                        entry = Some(PendingEntry { id, ..Default::default() });
                    }
                    b"author" => begin(&mut field, &mut text, Field::Author),
                    b"date" => begin(&mut field, &mut text, Field::Date),
                    b"msg" => begin(&mut field, &mut text, Field::Msg),
                    b"path" => {
                        let id = entry.as_ref().map(|e| e.id.clone()).unwrap_or_default();
                        let action = match attribute(&e, "action")?.as_deref() {
                            Some("A") | Some("R") => Action::Added,
                            Some("M") => Action::Modified,
                            Some("D") => Action::Deleted,
                            other => return Err(invalid(&id, format!("unknown path action {other:?}"))),
                        };
                        let kind = match attribute(&e, "kind")?.as_deref() {
                            Some("file") => Some(Kind::File),
                            Some("dir") => Some(Kind::Directory),
                            _ => None,
                        };
                        path_attrs = Some((action, kind));
                        begin(&mut field, &mut text, Field::Path);
                    }
                    _ => {}
                },
                Event::Empty(e) => {
                    if e.local_name().as_ref() == b"log" {
                        saw_root = true;
                    }
                }
                Event::Text(e) => {
                    if field.is_some() {
                        let unescaped = e
                            .unescape()
                            .map_err(|err| ExtractionError::Malformed(err.to_string()))?;
                        text.push_str(&unescaped);
                    }
                }
                Event::CData(e) => {
                    if field.is_some() {
                        text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Event::End(e) => {
                    let name = e.local_name();
                    let Some(current) = entry.as_mut() else {
                        continue;
                    };
                    match name.as_ref() {
                        b"author" => current.author = std::mem::take(&mut text),
                        b"date" => current.date = std::mem::take(&mut text),
                        b"msg" => current.msg = std::mem::take(&mut text),
                        b"path" => {
                            let path = std::mem::take(&mut text);
                            // unknown kinds never take part in verification
                            if let Some((action, Some(kind))) = path_attrs.take() {
                                current.paths.push(ChangedPath { action, kind, path });
                            }
                        }
                        b"logentry" => {
                            // r0 only records the repository's creation
                            match entry.take() {
                                Some(done) if done.id == "0" => debug!("skipping revision 0"),
                                Some(done) => records.push(finish(done)?),
                                None => {}
                            }
                        }
                        _ => {}
                    }
                    field = None;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_root {
            return Err(ExtractionError::Malformed("missing <log> element".into()));
        }
        if let Some(open) = entry {
            return Err(invalid(&open.id, "unterminated logentry".into()));
        }
        Ok(records)
    }
}

fn begin(field: &mut Option<Field>, text: &mut String, which: Field) {
    *field = Some(which);
    text.clear();
}

fn attribute(e: &BytesStart<'_>, name: &str) -> std::result::Result<Option<String>, ExtractionError> {
    let attr = e
        .try_get_attribute(name)
        .map_err(|err| ExtractionError::Malformed(err.to_string()))?;
    attr.map(|a| {
        a.unescape_value()
            .map(|v| v.into_owned())
            .map_err(|err| ExtractionError::Malformed(err.to_string()))
    })
    .transpose()
}

fn invalid(id: &str, message: String) -> ExtractionError {
    ExtractionError::InvalidEntry { id: id.to_string(), message }
}

fn finish(entry: PendingEntry) -> std::result::Result<ChangeRecord, ExtractionError> {
    validate_timestamp(&entry.id, &entry.date)?;
    Ok(ChangeRecord {
        id: entry.id,
        author: entry.author,
        timestamp: entry.date,
        message: entry.msg,
        changed_paths: entry.paths,
        foreign_link: None,
        foreign_location: None,
    })
}

fn validate_timestamp(id: &str, timestamp: &str) -> std::result::Result<(), ExtractionError> {
    if !timestamp.is_empty() && DateTime::parse_from_rfc3339(timestamp).is_err() {
        return Err(invalid(id, format!("unparseable timestamp `{timestamp}`")));
    }
    Ok(())
}

/// Record separator between commits in the git log format.
pub const GIT_RECORD_SEP: char = '\x1e';
/// Field separator inside one git log record.
pub const GIT_FIELD_SEP: char = '\x1f';
/// `--pretty` format matching [`GitLogExtractor`]; the `--name-status`
/// block follows the final field separator.
pub const GIT_LOG_FORMAT: &str = "format:%x1e%H%x1f%an%x1f%aI%x1f%B%x1f";

/// Parser for `git log --name-status` output in [`GIT_LOG_FORMAT`].
#[derive(Debug, Clone)]
pub struct GitLogExtractor {
    marker: String,
}

impl Default for GitLogExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_LINK_MARKER)
    }
}

impl GitLogExtractor {
    pub fn new(marker: impl Into<String>) -> Self {
        Self { marker: marker.into() }
    }

    fn parse_record(&self, record: &str) -> std::result::Result<ChangeRecord, ExtractionError> {
        let mut fields = record.splitn(4, GIT_FIELD_SEP);
        let (Some(hash), Some(author), Some(date), Some(rest)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(ExtractionError::Malformed(format!(
                "commit record has too few fields: {:?}",
                record.chars().take(60).collect::<String>()
            )));
        };
        let hash = hash.trim();
        if hash.len() < 4 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ExtractionError::Malformed(format!("invalid commit hash {hash:?}")));
        }
        // The status block never contains the separator, the message might.
        let (body, status) = rest.rsplit_once(GIT_FIELD_SEP).ok_or_else(|| {
            invalid(hash, "missing name-status separator".into())
        })?;
        validate_timestamp(hash, date)?;

        let (message, link) = split_foreign_link(body, &self.marker);
        let (foreign_link, foreign_location) = match link {
            Some(link) => (Some(link.id), link.location),
            None => (None, None),
        };
        let changed_paths = parse_name_status(hash, status)?;

        Ok(ChangeRecord {
            id: hash.to_string(),
            author: author.to_string(),
            timestamp: date.to_string(),
            message,
            changed_paths,
            foreign_link,
            foreign_location,
        })
    }
}

impl HistoryExtractor for GitLogExtractor {
    fn extract(&self, raw: &str) -> std::result::Result<Vec<ChangeRecord>, ExtractionError> {
        let mut pieces = raw.split(GIT_RECORD_SEP);
        match pieces.next() {
            Some(lead) if !lead.trim().is_empty() => {
                return Err(ExtractionError::Malformed("text before first commit record".into()))
            }
            _ => {}
        }
        pieces.map(|record| self.parse_record(record)).collect()
    }
}

fn parse_name_status(id: &str, block: &str) -> std::result::Result<Vec<ChangedPath>, ExtractionError> {
    let mut paths = Vec::new();
    for line in block.lines().filter(|l| !l.trim().is_empty()) {
        let mut cols = line.split('\t');
        let status = cols.next().unwrap_or_default();
        let cols: Vec<&str> = cols.collect();
        let rooted = |p: &str| format!("/{}", unquote_path(p).trim_start_matches('/'));
        match (status.chars().next(), cols.as_slice()) {
            (Some('A'), [p]) => paths.push(ChangedPath::file(Action::Added, rooted(*p))),
            (Some('M') | Some('T'), [p]) => paths.push(ChangedPath::file(Action::Modified, rooted(*p))),
            (Some('D'), [p]) => paths.push(ChangedPath::file(Action::Deleted, rooted(*p))),
            (Some('C'), [_, to]) => paths.push(ChangedPath::file(Action::Added, rooted(*to))),
            (Some('R'), [from, to]) => {
                paths.push(ChangedPath::file(Action::Deleted, rooted(*from)));
                paths.push(ChangedPath::file(Action::Added, rooted(*to)));
            }
            _ => return Err(invalid(id, format!("unrecognised name-status line {line:?}"))),
        }
    }
    Ok(paths)
}

/// Decodes a path git printed in C-style quotes (`"a\tb"`, `"\303\244.txt"`).
/// Unquoted paths come back unchanged.
pub fn unquote_path(raw: &str) -> Cow<'_, str> {
    let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) else {
        return Cow::Borrowed(raw);
    };
    let mut bytes = Vec::with_capacity(inner.len());
    let mut rest = inner.bytes().peekable();
    while let Some(b) = rest.next() {
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        match rest.next() {
            Some(b'a') => bytes.push(0x07),
            Some(b'b') => bytes.push(0x08),
            Some(b'f') => bytes.push(0x0c),
            Some(b'n') => bytes.push(b'\n'),
            Some(b'r') => bytes.push(b'\r'),
            Some(b't') => bytes.push(b'\t'),
            Some(b'v') => bytes.push(0x0b),
            Some(d @ b'0'..=b'7') => {
                let mut value = u32::from(d - b'0');
                for _ in 0..2 {
                    match rest.peek() {
                        Some(&o @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(o - b'0');
                            rest.next();
                        }
                        _ => break,
                    }
                }
                bytes.push(value as u8);
            }
            Some(other) => bytes.push(other),
            None => bytes.push(b'\\'),
        }
    }
    Cow::Owned(String::from_utf8_lossy(&bytes).into_owned())
}

/// The id a target unit's trailer points at, and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignLink {
    pub id: String,
    /// Branch URL before the `@`, when the token has one
    pub location: Option<String>,
}

/// Splits `message` at the first occurrence of `marker`.
///
/// Returns the text before the marker and the link carried by the token
/// right after it. For git-svn trailers the token is `<url>@<revision>`: the
/// id is the revision and the location is the url.
pub fn split_foreign_link(message: &str, marker: &str) -> (String, Option<ForeignLink>) {
    let Some(at) = message.find(marker) else {
        return (message.to_string(), None);
    };
    let canonical = message[..at].trim_end().to_string();
    let token = message[at + marker.len()..].split_whitespace().next().unwrap_or_default();
    let (location, id) = match token.rsplit_once('@') {
        Some((url, rev)) => ((!url.is_empty()).then(|| url.to_string()), rev),
        None => (None, token),
    };
    let link = (!id.is_empty()).then(|| ForeignLink { id: id.to_string(), location });
    (canonical, link)
}

/// How to treat an id that an earlier batch already produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    KeepFirst,
    /// For providers whose windows overlap and repeat units
    LastWriteWins,
}

/// Merges extraction batches into one history, keyed by id, in first-seen order.
#[derive(Debug)]
pub struct HistoryAccumulator {
    policy: DuplicatePolicy,
    records: Vec<ChangeRecord>,
    positions: HashMap<String, usize>,
}

impl HistoryAccumulator {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self { policy, records: Vec::new(), positions: HashMap::new() }
    }

    /// Returns how many records in `batch` were already present.
    pub fn merge(&mut self, batch: Vec<ChangeRecord>) -> usize {
        let mut duplicates = 0;
        for record in batch {
            match self.positions.get(&record.id) {
                Some(&pos) => {
                    duplicates += 1;
                    match self.policy {
                        DuplicatePolicy::KeepFirst => {
                            warn!(id = %record.id, "duplicate unit in history batch, keeping first");
                        }
                        DuplicatePolicy::LastWriteWins => self.records[pos] = record,
                    }
                }
                None => {
                    self.positions.insert(record.id.clone(), self.records.len());
                    self.records.push(record);
                }
            }
        }
        duplicates
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<ChangeRecord> {
        self.records
    }
}

/// Extracts a provider's full history, in windows of `batch_size` ids when
/// the provider reports a head.
pub fn extract_batched(
    provider: &dyn HistoryProvider,
    extractor: &dyn HistoryExtractor,
    batch_size: u64,
    progress: bool,
) -> Result<Vec<ChangeRecord>> {
    let policy = if provider.overlapping_windows() {
        DuplicatePolicy::LastWriteWins
    } else {
        DuplicatePolicy::KeepFirst
    };
    let mut acc = HistoryAccumulator::new(policy);

    let Some(head) = provider.head()? else {
        let raw = provider.list_history(None)?;
        acc.merge(extractor.extract(&raw)?);
        return Ok(acc.into_records());
    };

    let batch_size = batch_size.max(1);
    let windows = head.div_ceil(batch_size);
    let bar = if progress { ProgressBar::new(windows) } else { ProgressBar::hidden() };
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}") {
        bar.set_style(style);
    }
    bar.set_message(format!("Extracting {}", provider.name()));

    // revision 0 never has a counterpart, windows start at 1
    let mut start = 1;
    while start <= head {
        let end = start.saturating_add(batch_size - 1).min(head);
        let raw = provider.list_history(Some((start, end)))?;
        let batch = extractor.extract(&raw)?;
        debug!(start, end, records = batch.len(), "extracted batch");
        acc.merge(batch);
        bar.inc(1);
        start = end + 1;
    }
    bar.finish_and_clear();
    Ok(acc.into_records())
}
