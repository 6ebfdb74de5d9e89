//! feedback.rs: append-only log of user-reported misclassifications.
//!
//! One CSV row per report; the header is written once when the file is empty.
//! Appends are serialized twice over: an in-process mutex and an exclusive
//! advisory lock on the file, so concurrent reports from threads or from other
//! processes can never interleave into a malformed row.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::classifier::Class;
use crate::decision::{Decision, Label};
use crate::engine::Article;
use crate::error::{Error, Result};

pub const FEEDBACK_HEADER: [&str; 7] = [
    "timestamp",
    "title",
    "url",
    "body",
    "predicted_label",
    "user_label",
    "trusted_source",
];

/// Label asserted by the user. Only these two values feed retraining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserLabel {
    Valid,
    Hoaks,
}

impl UserLabel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Valid" => Some(Self::Valid),
            "Hoaks" => Some(Self::Hoaks),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::Hoaks => "Hoaks",
        }
    }

    pub fn class(self) -> Class {
        match self {
            Self::Valid => Class::Valid,
            Self::Hoaks => Class::Hoax,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub url: Option<String>,
    pub body_snapshot: String,
    pub predicted_label: Label,
    pub user_label: UserLabel,
    pub trusted_source: bool,
}

impl FeedbackRecord {
    pub fn new(article: &Article, decision: &Decision, user_label: UserLabel) -> Self {
        Self::reported(article, decision.label, user_label, decision.trusted_source)
    }

    /// Record for a decision the client only echoes back. `trusted_source`
    /// must come from the server's allow-list, never from the client.
    pub fn reported(
        article: &Article,
        predicted_label: Label,
        user_label: UserLabel,
        trusted_source: bool,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            title: article.title.clone(),
            url: article.source_url.clone(),
            body_snapshot: article.body.clone(),
            predicted_label,
            user_label,
            trusted_source,
        }
    }

    fn csv_fields(&self) -> [String; 7] {
        [
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.title.clone(),
            self.url.clone().unwrap_or_default(),
            self.body_snapshot.clone(),
            self.predicted_label.log_str().to_string(),
            self.user_label.as_str().to_string(),
            self.trusted_source.to_string(),
        ]
    }
}

#[derive(Debug)]
pub struct FeedbackRecorder {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FeedbackRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Capture a correction for a shown decision and append it durably.
    pub fn record(
        &self,
        article: &Article,
        decision: &Decision,
        user_label: UserLabel,
    ) -> Result<FeedbackRecord> {
        self.record_reported(article, decision.label, user_label, decision.trusted_source)
    }

    pub fn record_reported(
        &self,
        article: &Article,
        predicted_label: Label,
        user_label: UserLabel,
        trusted_source: bool,
    ) -> Result<FeedbackRecord> {
        let rec = FeedbackRecord::reported(article, predicted_label, user_label, trusted_source);
        self.append(&rec)?;
        Ok(rec)
    }

    /// Append one record. Either the whole row lands or an error is returned.
    pub fn append(&self, rec: &FeedbackRecord) -> Result<()> {
        let row = encode_row(&rec.csv_fields())?;

        let _inproc = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| Error::persistence(format!("creating {}", parent.display()), e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::persistence(format!("opening {}", self.path.display()), e))?;

        let mut lock = fd_lock::RwLock::new(file);
        let mut guard = lock
            .write()
            .map_err(|e| Error::persistence(format!("locking {}", self.path.display()), e))?;

        let start_len = guard
            .metadata()
            .map_err(|e| Error::persistence(format!("stat {}", self.path.display()), e))?
            .len();

        let mut buf = Vec::with_capacity(row.len() + 96);
        if start_len == 0 {
            buf.extend(encode_row(&FEEDBACK_HEADER)?);
        }
        buf.extend(row);

        write_row(&mut *guard, start_len, &buf)
            .map_err(|e| Error::persistence(format!("appending to {}", self.path.display()), e))?;

        counter!("feedback_records_total").increment(1);
        tracing::info!(
            target: "feedback",
            path = %self.path.display(),
            predicted = rec.predicted_label.log_str(),
            user = rec.user_label.as_str(),
            trusted = rec.trusted_source,
            "feedback recorded"
        );
        Ok(())
    }
}

/// Durable append target that can be cut back to a previous length.
trait LogSink: Write {
    fn sync(&mut self) -> io::Result<()>;
    fn rollback(&mut self, len: u64) -> io::Result<()>;
}

impl LogSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn rollback(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.sync_data()
    }
}

/// Write and sync `buf`; on any failure truncate back to `start_len` so a
/// torn row never stays in the log.
fn write_row<S: LogSink>(sink: &mut S, start_len: u64, buf: &[u8]) -> io::Result<()> {
    let res = sink.write_all(buf).and_then(|()| sink.sync());
    if res.is_err() {
        if let Err(undo) = sink.rollback(start_len) {
            tracing::error!(target: "feedback", error = %undo, len = start_len, "could not truncate partial row");
        }
    }
    res
}

fn encode_row<S: AsRef<[u8]>>(fields: &[S]) -> Result<Vec<u8>> {
    let to_err = |e: csv::Error| {
        Error::persistence(
            "encoding feedback row",
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
        )
    };
    let mut w = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    w.write_record(fields).map_err(to_err)?;
    w.into_inner().map_err(|e| to_err(e.into_error().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ScoreResult;
    use crate::decision::DecisionPolicy;

    fn article() -> Article {
        Article {
            title: "Banjir, besar".into(),
            body: "Isi \"berita\"\nbaris dua".into(),
            source_url: Some("https://kompas.com/x".into()),
        }
    }

    #[test]
    fn header_written_once_then_rows_appended() {
        let tmp = tempfile::tempdir().unwrap();
        let rec = FeedbackRecorder::new(tmp.path().join("data").join("log.csv"));
        let d = DecisionPolicy::default().decide(ScoreResult::from_valid(0.2), true);

        rec.record(&article(), &d, UserLabel::Valid).unwrap();
        rec.record(&article(), &d, UserLabel::Hoaks).unwrap();

        let mut rdr = csv::Reader::from_path(rec.path()).unwrap();
        let headers: Vec<String> = rdr.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, FEEDBACK_HEADER.map(String::from).to_vec());
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "Banjir, besar");
        assert_eq!(&rows[0][3], "Isi \"berita\"\nbaris dua");
        assert_eq!(&rows[0][4], "Hoaks");
        assert_eq!(&rows[0][5], "Valid");
        assert_eq!(&rows[0][6], "true");
        assert_eq!(&rows[1][5], "Hoaks");
    }

    #[test]
    fn unwritable_path_is_persistence_error() {
        let tmp = tempfile::tempdir().unwrap();
        // adresář místo souboru → open selže
        let rec = FeedbackRecorder::new(tmp.path());
        let d = DecisionPolicy::default().decide(ScoreResult::from_valid(0.9), false);
        let err = rec.record(&article(), &d, UserLabel::Valid).unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
    }

    /// Accepts `budget` bytes, then fails; `rollback` truncates the buffer.
    struct FlakySink {
        data: Vec<u8>,
        budget: usize,
        fail_sync: bool,
    }

    impl Write for FlakySink {
        fn write(&mut self, b: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::other("disk full"));
            }
            let n = b.len().min(self.budget);
            self.data.extend_from_slice(&b[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogSink for FlakySink {
        fn sync(&mut self) -> io::Result<()> {
            if self.fail_sync {
                Err(io::Error::other("fsync failed"))
            } else {
                Ok(())
            }
        }

        fn rollback(&mut self, len: u64) -> io::Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }
    }

    fn sink(budget: usize, fail_sync: bool) -> FlakySink {
        FlakySink {
            data: b"timestamp,title\n".to_vec(),
            budget,
            fail_sync,
        }
    }

    #[test]
    fn short_write_leaves_no_partial_row() {
        let mut s = sink(5, false);
        let start = s.data.len() as u64;
        assert!(write_row(&mut s, start, b"2024-01-01,Banjir besar\n").is_err());
        assert_eq!(s.data, b"timestamp,title\n");
    }

    #[test]
    fn failed_sync_rolls_back_the_row() {
        let mut s = sink(usize::MAX, true);
        let start = s.data.len() as u64;
        assert!(write_row(&mut s, start, b"2024-01-01,Banjir\n").is_err());
        assert_eq!(s.data.len() as u64, start);
    }

    #[test]
    fn complete_write_is_kept() {
        let mut s = sink(usize::MAX, false);
        let start = s.data.len() as u64;
        write_row(&mut s, start, b"2024-01-01,Banjir\n").unwrap();
        assert_eq!(s.data, b"timestamp,title\n2024-01-01,Banjir\n");
    }

    #[test]
    fn user_label_parsing_is_strict() {
        assert_eq!(UserLabel::parse("Valid"), Some(UserLabel::Valid));
        assert_eq!(UserLabel::parse(" Hoaks "), Some(UserLabel::Hoaks));
        assert_eq!(UserLabel::parse("hoaks"), None);
        assert_eq!(UserLabel::parse("Hoax"), None);
    }
}
