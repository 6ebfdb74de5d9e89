// src/corpus.rs
//! Training corpus assembly: base dataset + feedback log → deduplicated rows.
//!
//! Both sources go through `normalize` exactly like live requests do.
//! Legacy datasets are tolerated: non-UTF-8 fields decode as ISO-8859-1 and
//! malformed rows are skipped and counted instead of aborting the load.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::classifier::Class;
use crate::error::{Error, Result};
use crate::feedback::UserLabel;
use crate::normalize::{normalize, normalize_article, NormalizedText};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrigin {
    Base,
    Feedback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub text: NormalizedText,
    pub class: Class,
    pub origin: RowOrigin,
}

#[derive(Debug, Default)]
pub struct BaseLoad {
    pub rows: Vec<TrainingRow>,
    /// Rows dropped for wrong field count, empty text, or unparsable label.
    pub skipped: usize,
}

#[derive(Debug, Default)]
pub struct FeedbackLoad {
    pub rows: Vec<TrainingRow>,
    /// Rows whose `user_label` is missing or not one of `Valid` / `Hoaks`.
    pub excluded: usize,
    /// Rows dropped for wrong field count or empty text.
    pub skipped: usize,
    pub present: bool,
}

/// Where the text of a base row comes from.
enum TextColumns {
    Single(usize),
    HeadlineBody(usize, usize),
}

/// Load the base dataset. Requires a text-bearing column (`text`, `tweet`, or
/// `Headline` + `Body`) and a `label` column holding 0/1.
pub fn load_base_corpus(path: &Path) -> Result<BaseLoad> {
    let bytes = fs::read(path).map_err(|e| Error::schema(path, format!("cannot read corpus: {e}")))?;
    let mut rdr = reader_for(&bytes);

    let headers = header_names(&mut rdr).map_err(|e| Error::schema(path, e))?;
    let text_cols = if let Some(i) = find_col(&headers, &["text"]) {
        TextColumns::Single(i)
    } else if let Some(i) = find_col(&headers, &["tweet"]) {
        TextColumns::Single(i)
    } else if let (Some(h), Some(b)) = (find_col(&headers, &["headline"]), find_col(&headers, &["body"])) {
        TextColumns::HeadlineBody(h, b)
    } else {
        return Err(Error::schema(
            path,
            format!("no text column (expected text, tweet, or Headline+Body); found {headers:?}"),
        ));
    };
    let label_col = find_col(&headers, &["label"])
        .ok_or_else(|| Error::schema(path, format!("no label column; found {headers:?}")))?;

    let mut out = BaseLoad::default();
    for rec in rdr.byte_records() {
        let Ok(rec) = rec else {
            out.skipped += 1;
            continue;
        };
        if rec.len() != headers.len() {
            out.skipped += 1;
            continue;
        }
        let text = match text_cols {
            TextColumns::Single(i) => normalize(&decode_field(&rec[i])),
            TextColumns::HeadlineBody(h, b) => {
                normalize_article(&decode_field(&rec[h]), &decode_field(&rec[b]))
            }
        };
        let Some(class) = parse_label(&decode_field(&rec[label_col])) else {
            out.skipped += 1;
            continue;
        };
        if text.is_empty() {
            out.skipped += 1;
            continue;
        }
        out.rows.push(TrainingRow {
            text,
            class,
            origin: RowOrigin::Base,
        });
    }

    if out.skipped > 0 {
        tracing::warn!(target: "retrain", path = %path.display(), skipped = out.skipped, "skipped malformed base corpus rows");
    }
    Ok(out)
}

/// Load the feedback log if it exists. Text is `title + " " + body`, label is
/// mapped `Valid → 0`, `Hoaks → 1`; anything else is excluded and counted.
pub fn load_feedback_log(path: &Path) -> Result<FeedbackLoad> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!(target: "retrain", path = %path.display(), "no feedback log found");
            return Ok(FeedbackLoad::default());
        }
        Err(e) => return Err(Error::schema(path, format!("cannot read feedback log: {e}"))),
    };
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(FeedbackLoad {
            present: true,
            ..FeedbackLoad::default()
        });
    }

    let mut rdr = reader_for(&bytes);
    let headers = header_names(&mut rdr).map_err(|e| Error::schema(path, e))?;
    // Older logs used the Indonesian column names.
    let title = find_col(&headers, &["title", "judul"]);
    let body = find_col(&headers, &["body", "isi"]);
    let label = find_col(&headers, &["user_label", "label_benar"]);
    let (Some(title), Some(body), Some(label)) = (title, body, label) else {
        return Err(Error::schema(
            path,
            format!("feedback log needs title, body and user_label columns; found {headers:?}"),
        ));
    };

    let mut out = FeedbackLoad {
        present: true,
        ..FeedbackLoad::default()
    };
    for rec in rdr.byte_records() {
        let Ok(rec) = rec else {
            out.skipped += 1;
            continue;
        };
        if rec.len() != headers.len() {
            out.skipped += 1;
            continue;
        }
        let Some(user_label) = UserLabel::parse(&decode_field(&rec[label])) else {
            out.excluded += 1;
            continue;
        };
        let text = normalize_article(&decode_field(&rec[title]), &decode_field(&rec[body]));
        if text.is_empty() {
            out.skipped += 1;
            continue;
        }
        out.rows.push(TrainingRow {
            text,
            class: user_label.class(),
            origin: RowOrigin::Feedback,
        });
    }

    if out.excluded > 0 {
        tracing::warn!(target: "retrain", path = %path.display(), excluded = out.excluded, "feedback rows with unmapped labels excluded");
    }
    if out.skipped > 0 {
        tracing::warn!(target: "retrain", path = %path.display(), skipped = out.skipped, "skipped malformed feedback rows");
    }
    Ok(out)
}

/// Concatenate base then feedback rows and collapse duplicates by normalized text.
/// The row keeps its first position but takes the label of the last occurrence,
/// so a feedback correction overrides the base label for the same text.
/// Returns the merged rows and the number of rows collapsed.
pub fn merge_dedup(base: Vec<TrainingRow>, feedback: Vec<TrainingRow>) -> (Vec<TrainingRow>, usize) {
    let mut index: HashMap<NormalizedText, usize> = HashMap::new();
    let mut merged: Vec<TrainingRow> = Vec::with_capacity(base.len() + feedback.len());
    let mut collapsed = 0usize;

    for row in base.into_iter().chain(feedback) {
        match index.get(&row.text) {
            Some(&i) => {
                merged[i].class = row.class;
                merged[i].origin = row.origin;
                collapsed += 1;
            }
            None => {
                index.insert(row.text.clone(), merged.len());
                merged.push(row);
            }
        }
    }
    (merged, collapsed)
}

fn reader_for(bytes: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(bytes))
        .flexible(true)
        .from_reader(bytes)
}

/// `;` if the header line has more semicolons than commas, else `,`.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|&b| b == b'\n').next().unwrap_or_default();
    let semis = first_line.iter().filter(|&&b| b == b';').count();
    let commas = first_line.iter().filter(|&&b| b == b',').count();
    if semis > commas {
        b';'
    } else {
        b','
    }
}

fn header_names(rdr: &mut csv::Reader<&[u8]>) -> std::result::Result<Vec<String>, String> {
    let h = rdr.byte_headers().map_err(|e| format!("unreadable header: {e}"))?;
    Ok(h.iter()
        .map(|f| decode_field(f).trim().trim_start_matches('\u{feff}').to_string())
        .collect())
}

fn find_col(headers: &[String], names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
}

/// UTF-8 when valid, otherwise ISO-8859-1 (every byte maps to one code point).
pub fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Accepts `0`, `1`, and float spellings such as `1.0`.
fn parse_label(raw: &str) -> Option<Class> {
    let t = raw.trim();
    if let Ok(v) = t.parse::<u8>() {
        return Class::from_label(v);
    }
    match t.parse::<f64>() {
        Ok(v) if v == 0.0 => Some(Class::Valid),
        Ok(v) if v == 1.0 => Some(Class::Hoax),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &[u8]) -> std::path::PathBuf {
        let p = dir.join(name);
        fs::write(&p, content).unwrap();
        p
    }

    fn row(text: &str, class: Class, origin: RowOrigin) -> TrainingRow {
        TrainingRow {
            text: normalize(text),
            class,
            origin,
        }
    }

    #[test]
    fn loads_text_label_corpus() {
        let tmp = tempfile::tempdir().unwrap();
        let p = write(tmp.path(), "c.csv", b"text,label\n\"Berita, resmi\",0\nHoaks viral,1\n");
        let load = load_base_corpus(&p).unwrap();
        assert_eq!(load.rows.len(), 2);
        assert_eq!(load.rows[0].text.as_str(), "berita, resmi");
        assert_eq!(load.rows[1].class, Class::Hoax);
        assert_eq!(load.skipped, 0);
    }

    #[test]
    fn tweet_column_and_float_labels_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        let p = write(tmp.path(), "c.csv", b"tweet,label\nsatu,0.0\ndua,1.0\n");
        let load = load_base_corpus(&p).unwrap();
        assert_eq!(load.rows.len(), 2);
        assert_eq!(load.rows[0].class, Class::Valid);
    }

    #[test]
    fn semicolon_headline_body_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let p = write(
            tmp.path(),
            "c.csv",
            b"Headline;Body;Label\nBanjir Jakarta;Air naik, warga mengungsi;0\n",
        );
        let load = load_base_corpus(&p).unwrap();
        assert_eq!(load.rows.len(), 1);
        assert_eq!(load.rows[0].text.as_str(), "banjir jakarta air naik, warga mengungsi");
    }

    #[test]
    fn missing_columns_is_schema_error() {
        let tmp = tempfile::tempdir().unwrap();
        let p = write(tmp.path(), "c.csv", b"content,label\nx,0\n");
        assert!(matches!(load_base_corpus(&p), Err(Error::Schema { .. })));
        let p = write(tmp.path(), "d.csv", b"text,kind\nx,0\n");
        assert!(matches!(load_base_corpus(&p), Err(Error::Schema { .. })));
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let p = write(
            tmp.path(),
            "c.csv",
            b"text,label\nok satu,0\ntoo,many,fields\nbad label,maybe\n!!!,1\nok dua,1\n",
        );
        let load = load_base_corpus(&p).unwrap();
        assert_eq!(load.rows.len(), 2);
        assert_eq!(load.skipped, 3);
    }

    #[test]
    fn latin1_bytes_are_decoded() {
        let tmp = tempfile::tempdir().unwrap();
        // 0xE9 = 'é' v ISO-8859-1, neplatné UTF-8
        let p = write(tmp.path(), "c.csv", b"text,label\ncaf\xe9 berita,0\n");
        let load = load_base_corpus(&p).unwrap();
        assert_eq!(load.rows.len(), 1);
        assert_eq!(load.rows[0].text.as_str(), "caf berita");
        assert_eq!(decode_field(b"caf\xe9"), "caf\u{e9}");
    }

    #[test]
    fn absent_feedback_log_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let load = load_feedback_log(&tmp.path().join("none.csv")).unwrap();
        assert!(!load.present);
        assert!(load.rows.is_empty());
    }

    #[test]
    fn feedback_labels_are_mapped_and_unknown_excluded() {
        let tmp = tempfile::tempdir().unwrap();
        let p = write(
            tmp.path(),
            "log.csv",
            b"timestamp,title,url,body,predicted_label,user_label,trusted_source\n\
              2024-01-01T00:00:00Z,Judul A,,Isi A,Hoaks,Valid,false\n\
              2024-01-01T00:00:01Z,Judul B,,Isi B,Valid,Hoaks,false\n\
              2024-01-01T00:00:02Z,Judul C,,Isi C,Valid,Mungkin,false\n\
              2024-01-01T00:00:03Z,Judul D,,Isi D,Valid,,false\n",
        );
        let load = load_feedback_log(&p).unwrap();
        assert_eq!(load.rows.len(), 2);
        assert_eq!(load.excluded, 2);
        assert_eq!(load.rows[0].text.as_str(), "judul a isi a");
        assert_eq!(load.rows[0].class, Class::Valid);
        assert_eq!(load.rows[1].class, Class::Hoax);
    }

    #[test]
    fn legacy_indonesian_log_columns_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        let p = write(
            tmp.path(),
            "log.csv",
            b"timestamp,judul,url,isi,prediksi_awal,label_benar\nt,J,u,I,Valid,Hoaks\n",
        );
        let load = load_feedback_log(&p).unwrap();
        assert_eq!(load.rows.len(), 1);
        assert_eq!(load.rows[0].class, Class::Hoax);
    }

    #[test]
    fn feedback_log_without_label_column_is_schema_error() {
        let tmp = tempfile::tempdir().unwrap();
        let p = write(tmp.path(), "log.csv", b"title,body\nA,B\n");
        assert!(matches!(load_feedback_log(&p), Err(Error::Schema { .. })));
    }

    #[test]
    fn dedup_keeps_position_and_feedback_label_wins() {
        let base = vec![
            row("Sama persis!", Class::Hoax, RowOrigin::Base),
            row("lain", Class::Valid, RowOrigin::Base),
        ];
        let feedback = vec![row("sama   PERSIS", Class::Valid, RowOrigin::Feedback)];
        let (merged, collapsed) = merge_dedup(base, feedback);
        assert_eq!(collapsed, 1);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].text.as_str(), "sama persis");
        assert_eq!(merged[0].class, Class::Valid);
        assert_eq!(merged[0].origin, RowOrigin::Feedback);
    }

    #[test]
    fn delimiter_sniffing() {
        assert_eq!(sniff_delimiter(b"a;b;c\n1,2;3"), b';');
        assert_eq!(sniff_delimiter(b"a,b\n"), b',');
        assert_eq!(sniff_delimiter(b""), b',');
    }
}
