//! Output writer: persist one [`JobResult`] as a `.txt` / `.json` pair.
//!
//! Files are named `{input stem}_{provider}_{YYYYmmdd-HHMMSS}`. When that stem
//! is already taken in the output directory (two runs in the same second, or
//! two inputs with the same stem) a `-1`, `-2`, … suffix is appended, so a run
//! never overwrites output it or an earlier run produced.
//!
//! ## Atomicity
//!
//! Each file is written to a [`tempfile::NamedTempFile`] inside the output
//! directory and then renamed into place, which is atomic on the same
//! filesystem. The text file goes first; if it fails the JSON is never
//! attempted. If the JSON cannot be persisted the already-renamed text file is
//! removed again, so a (file, provider) pair yields both files or neither.

use crate::error::OcrError;
use crate::pipeline::aggregate::{Envelope, JobResult};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Format of the timestamp embedded in output names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Paths of a successfully written pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFiles {
    pub text: PathBuf,
    pub json: PathBuf,
}

/// Writes result pairs into one output directory.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
}

impl OutputWriter {
    /// Create the writer, creating `dir` (and parents) if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, OcrError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| OcrError::OutputWriteFailed {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `result` using the current local time.
    pub fn write(
        &self,
        input_stem: &str,
        provider: &str,
        result: &JobResult,
    ) -> Result<WrittenFiles, OcrError> {
        self.write_at(input_stem, provider, &timestamp_now(), result)
    }

    /// Write `result` with an explicit timestamp string.
    pub fn write_at(
        &self,
        input_stem: &str,
        provider: &str,
        timestamp: &str,
        result: &JobResult,
    ) -> Result<WrittenFiles, OcrError> {
        let stem = self.unique_stem(&output_stem(input_stem, provider, timestamp));
        let text_path = self.dir.join(format!("{stem}.txt"));
        let json_path = self.dir.join(format!("{stem}.json"));

        let json = to_pretty_json(&result.envelope).map_err(|e| OcrError::OutputWriteFailed {
            path: json_path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

        self.write_pair(&text_path, result.text.as_bytes(), &json_path, &json)?;

        info!("Saved {} and {}", text_path.display(), json_path.display());
        Ok(WrittenFiles {
            text: text_path,
            json: json_path,
        })
    }

    /// Write the text then the JSON; a failed JSON write removes the text so
    /// the pair is never left half-written.
    fn write_pair(
        &self,
        text_path: &Path,
        text: &[u8],
        json_path: &Path,
        json: &[u8],
    ) -> Result<(), OcrError> {
        self.write_atomic(text_path, text)?;
        debug!("Wrote {}", text_path.display());

        if let Err(e) = self.write_atomic(json_path, json) {
            if let Err(rm) = std::fs::remove_file(text_path) {
                warn!(
                    "Could not remove orphaned {}: {}",
                    text_path.display(),
                    rm
                );
            }
            return Err(e);
        }
        debug!("Wrote {}", json_path.display());
        Ok(())
    }

    /// First of `stem`, `stem-1`, `stem-2`, … with neither `.txt` nor `.json`
    /// present.
    fn unique_stem(&self, stem: &str) -> String {
        let taken = |s: &str| {
            self.dir.join(format!("{s}.txt")).exists() || self.dir.join(format!("{s}.json")).exists()
        };
        if !taken(stem) {
            return stem.to_string();
        }
        (1..)
            .map(|n| format!("{stem}-{n}"))
            .find(|s| !taken(s))
            .unwrap_or_else(|| stem.to_string())
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), OcrError> {
        let fail = |source| OcrError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(fail)?;
        tmp.write_all(bytes).map_err(fail)?;
        tmp.as_file().sync_all().map_err(fail)?;
        tmp.persist(path).map_err(|e| fail(e.error))?;
        Ok(())
    }
}

/// `{stem}_{provider}_{timestamp}`.
pub fn output_stem(input_stem: &str, provider: &str, timestamp: &str) -> String {
    format!("{input_stem}_{provider}_{timestamp}")
}

/// Local time formatted with [`TIMESTAMP_FORMAT`].
pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Pretty JSON with 4-space indentation and non-ASCII left unescaped.
pub fn to_pretty_json(envelope: &Envelope) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    envelope.serialize(&mut ser)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::aggregate::{aggregate, AggregateContext, Method, PageText};
    use serde_json::json;

    fn result(text: &str) -> JobResult {
        aggregate(
            vec![PageText {
                page: 1,
                text: text.to_string(),
                response: json!({ "fullTextAnnotation": { "text": text } }),
            }],
            AggregateContext {
                source_file: Path::new("scans/receipt.png"),
                provider: "google",
                method: Method::Direct,
                document: None,
                failed_pages: Vec::new(),
            },
        )
        .unwrap()
    }

    #[test]
    fn writes_pair_with_expected_names() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path().join("out")).unwrap();
        let written = writer
            .write_at("receipt", "google", "20240501-101500", &result("Café total"))
            .unwrap();

        assert_eq!(
            written.text.file_name().unwrap(),
            "receipt_google_20240501-101500.txt"
        );
        assert_eq!(std::fs::read_to_string(&written.text).unwrap(), "Café total");

        let raw = std::fs::read_to_string(&written.json).unwrap();
        assert!(raw.contains("Café"), "non-ASCII must not be escaped");
        assert!(raw.contains("\n    \"pages\""), "4-space indent expected");
        let back: Envelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, result("Café total").envelope);
    }

    #[test]
    fn collision_gets_numeric_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path()).unwrap();
        let a = writer.write_at("doc", "azure", "20240501-101500", &result("a")).unwrap();
        let b = writer.write_at("doc", "azure", "20240501-101500", &result("b")).unwrap();
        let c = writer.write_at("doc", "azure", "20240501-101500", &result("c")).unwrap();

        assert_eq!(a.text.file_name().unwrap(), "doc_azure_20240501-101500.txt");
        assert_eq!(b.text.file_name().unwrap(), "doc_azure_20240501-101500-1.txt");
        assert_eq!(c.json.file_name().unwrap(), "doc_azure_20240501-101500-2.json");
        assert_eq!(std::fs::read_to_string(&a.text).unwrap(), "a");
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path()).unwrap();
        writer.write("doc", "mistral", &result("x")).unwrap();
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2, "got {names:?}");
        assert!(names.iter().all(|n| n.starts_with("doc_mistral_")));
    }

    #[test]
    fn empty_text_still_written() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path()).unwrap();
        let w = writer.write_at("blank", "openai", "20240101-000000", &result("")).unwrap();
        assert_eq!(std::fs::read_to_string(&w.text).unwrap(), "");
        assert!(w.json.exists());
    }

    #[test]
    fn failed_json_write_removes_text() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path()).unwrap();
        let text_path = dir.path().join("doc_azure_20240101-000000.txt");
        let json_path = dir.path().join("doc_azure_20240101-000000.json");
        // A directory in the way makes the rename onto the JSON path fail.
        std::fs::create_dir(&json_path).unwrap();

        let err = writer
            .write_pair(&text_path, b"hello", &json_path, b"{}")
            .unwrap_err();
        assert!(matches!(err, OcrError::OutputWriteFailed { .. }), "got {err:?}");
        assert!(!text_path.exists(), "orphaned text file left behind");
        assert!(json_path.is_dir());
        let stray: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|n| n != "doc_azure_20240101-000000.json")
            .collect();
        assert!(stray.is_empty(), "got {stray:?}");
    }

    #[test]
    fn timestamp_shape() {
        let ts = timestamp_now();
        assert_eq!(ts.len(), 15);
        assert_eq!(&ts[8..9], "-");
    }
}
