//! Reading and writing the run artifacts.
//!
//! Inference output is split into one directory per query variant:
//! `<prompt with <> → mask>.<input type>` (spaces → `_`) in text mode, and
//! `image_to_image_similarity` in image-to-image mode.
//!
//! - Prediction files: one line per sample, tab-separated candidate ids, best first
//! - Full-result tables: CSV, one row per sample and query variant
//! - Gold files: `candidate_id \t language` per line
//! - Metric log: append-only JSON Lines, one [`MetricRecord`] per run

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::config::PROMPT_PLACEHOLDER;
use crate::dataset::InputType;
use crate::error::{DatasetError, Result};
use crate::evaluation::MetricRecord;

/// Output directory of image-to-image runs.
pub const IMAGE_QUERY_DIR: &str = "image_to_image_similarity";

/// Output directory of one text-mode variant, e.g. `This_is_mask..target_word`.
pub fn variant_dir(prompt: &str, input_type: InputType) -> String {
    format!("{}.{}", prompt.replace(PROMPT_PLACEHOLDER, "mask"), input_type).replace(' ', "_")
}

/// `<dir>/prediction.<language>.txt`
pub fn prediction_path(dir: &Path, language: &str) -> PathBuf {
    dir.join(format!("prediction.{language}.txt"))
}

/// `<dir>/full_result.<language>.csv`
pub fn full_result_path(dir: &Path, language: &str) -> PathBuf {
    dir.join(format!("full_result.{language}.csv"))
}

/// Write one tab-separated ranking per line (no trailing newline).
pub fn write_predictions<W: Write>(mut writer: W, predictions: &[Vec<String>]) -> io::Result<()> {
    let lines: Vec<String> = predictions.iter().map(|p| p.join("\t")).collect();
    writer.write_all(lines.join("\n").as_bytes())?;
    writer.flush()
}

/// Read a prediction file. Blank lines are ignored.
pub fn read_predictions(path: &Path) -> Result<Vec<Vec<String>>> {
    let lines = read_lines(path)?;
    Ok(lines
        .iter()
        .map(|line| line.split('\t').map(str::to_string).collect())
        .collect())
}

/// Read the gold candidates for `language` from a `candidate \t language` file.
pub fn read_gold(path: &Path, language: &str) -> Result<Vec<String>> {
    let mut references = Vec::new();
    for (line_no, line) in read_lines(path)?.iter().enumerate() {
        let Some((candidate, lang)) = line.split_once('\t') else {
            return Err(DatasetError::Malformed {
                path: path.to_path_buf(),
                line: line_no + 1,
                message: "expected `candidate<TAB>language`".to_string(),
            }
            .into());
        };
        if lang.trim() == language {
            references.push(candidate.trim().to_string());
        }
    }
    Ok(references)
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(DatasetError::NotFound(path.to_path_buf()).into());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if !line.trim().is_empty() {
            lines.push(line.to_string());
        }
    }
    Ok(lines)
}

/// One row of the full-result table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullResultRow {
    pub language: String,
    pub index: usize,
    #[serde(serialize_with = "as_json")]
    pub ranking: Vec<String>,
    #[serde(serialize_with = "as_json")]
    pub relevance: Vec<f32>,
    /// Prompt after substitution (text mode)
    pub text: Option<String>,
    /// Sample field used in the prompt, or `image_query`
    pub input_type: Option<String>,
    /// Prompt template, or `image_to_image`
    pub prompt: Option<String>,
    /// Query image file name (image mode)
    pub query_image: Option<String>,
}

fn as_json<T: Serialize, S: Serializer>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    let json = serde_json::to_string(value).map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&json)
}

/// Write the full-result table as CSV with a header row.
pub fn write_full_results<W: Write>(writer: W, rows: &[FullResultRow]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// A writer that serializes one JSON object per line.
pub struct JsonlWriter<W: Write> {
    writer: W,
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a single item followed by a newline.
    pub fn write<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?;
        writeln!(self.writer)
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// The append-only log of metric records.
pub struct MetricLog {
    path: PathBuf,
}

impl MetricLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Earlier records are never rewritten.
    pub fn append(&self, record: &MetricRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let needs_newline = self.path.exists() && !ends_with_newline(&self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut buffered = BufWriter::new(file);
        if needs_newline {
            writeln!(buffered)?;
        }
        let mut writer = JsonlWriter::new(buffered);
        writer.write(record)?;
        writer.flush()?;
        Ok(())
    }

    /// Read every record in the log (empty if the log doesn't exist yet).
    pub fn read_all(&self) -> Result<Vec<MetricRecord>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                records.push(serde_json::from_str(&line)?);
            }
        }
        Ok(records)
    }
}

fn ends_with_newline(path: &Path) -> io::Result<bool> {
    let content = std::fs::read(path)?;
    Ok(content.is_empty() || content.ends_with(b"\n"))
}

/// Render records as a markdown table with one column per metric.
pub fn markdown_table(records: &[MetricRecord]) -> String {
    let columns: BTreeSet<&String> = records.iter().flat_map(|r| r.metrics.keys()).collect();

    let mut builder = Builder::default();
    builder.set_header(
        std::iter::once("model".to_string()).chain(columns.iter().map(|c| c.to_string())),
    );
    for record in records {
        builder.push_record(std::iter::once(record.model.clone()).chain(columns.iter().map(
            |c| {
                record
                    .metrics
                    .get(*c)
                    .map(|v| format!("{v:.4}"))
                    .unwrap_or_default()
            },
        )));
    }

    let mut table = builder.build();
    table.with(Style::markdown());
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(model: &str, mrr: f64) -> MetricRecord {
        let mut r = MetricRecord::new(model);
        r.metrics.insert("mrr_official/en".into(), mrr);
        r
    }

    #[test]
    fn test_variant_dir_names() {
        assert_eq!(variant_dir("<>", InputType::TargetWord), "mask.target_word");
        assert_eq!(
            variant_dir("This is <>.", InputType::TargetWord),
            "This_is_mask..target_word"
        );
        assert_eq!(
            variant_dir(
                "Example of an image caption that explains <>.",
                InputType::TargetPhrase
            ),
            "Example_of_an_image_caption_that_explains_mask..target_phrase"
        );
    }

    #[test]
    fn test_prediction_file_layout() {
        let mut buffer = Vec::new();
        write_predictions(
            &mut buffer,
            &[vec!["b".into(), "a".into()], vec!["c".into(), "d".into()]],
        )
        .unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "b\ta\nc\td");
    }

    #[test]
    fn test_read_predictions_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = prediction_path(dir.path(), "en");
        std::fs::write(&path, "b\ta\r\n\nc\td\n").unwrap();
        let predictions = read_predictions(&path).unwrap();
        assert_eq!(predictions, vec![vec!["b", "a"], vec!["c", "d"]]);
    }

    #[test]
    fn test_read_gold_filters_language() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gold.txt");
        std::fs::write(&path, "a.jpg\ten\nb.jpg\tfa\nc.jpg\ten\n").unwrap();
        assert_eq!(read_gold(&path, "en").unwrap(), vec!["a.jpg", "c.jpg"]);
        assert_eq!(read_gold(&path, "fa").unwrap(), vec!["b.jpg"]);
        assert!(read_gold(&path, "it").unwrap().is_empty());
    }

    #[test]
    fn test_read_gold_rejects_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gold.txt");
        std::fs::write(&path, "a.jpg en\n").unwrap();
        assert!(read_gold(&path, "en").is_err());
    }

    #[test]
    fn test_missing_prediction_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_predictions(&dir.path().join("nope.txt")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_full_results_csv() {
        let rows = vec![FullResultRow {
            language: "en".into(),
            index: 0,
            ranking: vec!["b".into(), "a".into()],
            relevance: vec![0.5, 0.25],
            text: Some("a photo of bank".into()),
            input_type: Some("target word".into()),
            prompt: Some("a photo of <>".into()),
            query_image: None,
        }];
        let mut buffer = Vec::new();
        write_full_results(&mut buffer, &rows).unwrap();
        let csv = String::from_utf8(buffer).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "language,index,ranking,relevance,text,input_type,prompt,query_image"
        );
        assert_eq!(
            lines.next().unwrap(),
            r#"en,0,"[""b"",""a""]","[0.5,0.25]",a photo of bank,target word,a photo of <>,"#
        );
    }

    #[test]
    fn test_metric_log_appends() {
        let dir = tempfile::tempdir().unwrap();
        let log = MetricLog::new(dir.path().join("logs").join("rank_metrics.jsonl"));
        assert!(log.read_all().unwrap().is_empty());

        log.append(&record("run1", 0.5)).unwrap();
        log.append(&record("run2", 0.75)).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].model, "run1");
        assert_eq!(records[1].metrics["mrr_official/en"], 0.75);
    }

    #[test]
    fn test_metric_log_repairs_missing_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rank_metrics.jsonl");
        std::fs::write(&path, r#"{"model":"old","mrr_official/en":0.1}"#).unwrap();

        let log = MetricLog::new(&path);
        log.append(&record("new", 0.2)).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].model, "old");
    }

    #[test]
    fn test_markdown_table() {
        let mut second = record("run2", 0.75);
        second.metrics.insert("ndcg@5/en".into(), 0.8);
        let table = markdown_table(&[record("run1", 0.5), second]);

        let header = table.lines().next().unwrap();
        assert!(header.contains("model"));
        assert!(header.contains("ndcg@5/en"));
        assert!(table.contains("0.5000"));
        assert!(table.contains("0.8000"));
        assert_eq!(table.lines().count(), 4);
    }
}
