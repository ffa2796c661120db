//! Corpus files and input expansion.

use crate::result::{BenchError, BenchResult};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// One labelled instance of a schema
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TestCase {
    /// Instance to serialize and feed to the engine
    pub data: Value,
    /// Expected verdict
    pub valid: bool,
}

/// A schema with its labelled instances, loaded from one corpus file
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaJob {
    /// Basename of the corpus file
    pub id: String,
    /// JSON Schema document
    pub schema: Value,
    /// Instances in corpus order
    pub tests: Vec<TestCase>,
}

#[derive(Deserialize)]
struct CorpusFile {
    schema: Value,
    #[serde(default)]
    tests: Vec<TestCase>,
}

impl SchemaJob {
    /// Build a job in memory
    #[must_use]
    pub fn new(id: impl Into<String>, schema: Value, tests: Vec<TestCase>) -> Self {
        Self {
            id: id.into(),
            schema,
            tests,
        }
    }

    /// Parse `{"schema": ..., "tests": [...]}` from `path`
    pub fn load(path: &Path) -> BenchResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BenchError::corpus(path, e.to_string()))?;
        let file: CorpusFile =
            serde_json::from_str(&text).map_err(|e| BenchError::corpus(path, e.to_string()))?;
        Ok(Self {
            id: job_id(path)?,
            schema: file.schema,
            tests: file.tests,
        })
    }
}

/// Job id of a corpus file: its basename
pub fn job_id(path: &Path) -> BenchResult<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| BenchError::corpus(path, "path has no usable file name"))
}

/// Expand command-line inputs into corpus files.
///
/// An argument ending in `.json` is taken as a file. A directory contributes
/// its `*.json` entries. Anything else is treated as a glob pattern.
pub fn expand_inputs<S: AsRef<str>>(args: &[S]) -> BenchResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for arg in args {
        let arg = arg.as_ref();
        if arg.ends_with(".json") && !has_glob_chars(arg) {
            files.push(PathBuf::from(arg));
            continue;
        }
        let pattern = if Path::new(arg).is_dir() {
            format!("{}/*.json", arg.trim_end_matches('/'))
        } else {
            arg.to_string()
        };
        let entries = glob::glob(&pattern)
            .map_err(|e| BenchError::config(format!("bad input pattern '{arg}': {e}")))?;
        let mut matched: Vec<PathBuf> = entries.filter_map(Result::ok).filter(|p| p.is_file()).collect();
        matched.sort();
        tracing::debug!(input = arg, files = matched.len(), "expanded corpus input");
        files.extend(matched);
    }
    Ok(files)
}

fn has_glob_chars(arg: &str) -> bool {
    arg.contains(['*', '?', '['])
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_job() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "int.json",
            r#"{"schema": {"type": "integer"}, "tests": [{"data": 5, "valid": true}, {"data": "x", "valid": false}]}"#,
        );
        let job = SchemaJob::load(&path).unwrap();
        assert_eq!(job.id, "int.json");
        assert_eq!(job.schema, json!({"type": "integer"}));
        assert_eq!(job.tests.len(), 2);
        assert!(!job.tests[1].valid);
    }

    #[test]
    fn test_missing_tests_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.json", r#"{"schema": true}"#);
        assert!(SchemaJob::load(&path).unwrap().tests.is_empty());
    }

    #[test]
    fn test_bad_file_is_corpus_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bad.json", r#"{"tests": []}"#);
        let err = SchemaJob::load(&path).unwrap_err();
        assert!(matches!(err, BenchError::Corpus { .. }));
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn test_expand_dir_file_and_glob() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.json", "{}");
        write(dir.path(), "a.json", "{}");
        write(dir.path(), "notes.txt", "");
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let single = write(&sub, "c.json", "{}");

        let root = dir.path().to_str().unwrap().to_string();
        let files = expand_inputs(&[root.clone()]).unwrap();
        let names: Vec<_> = files.iter().map(|p| p.file_name().unwrap().to_owned()).collect();
        assert_eq!(names, vec!["a.json", "b.json"]);

        let files = expand_inputs(&[single.to_str().unwrap()]).unwrap();
        assert_eq!(files, vec![single.clone()]);

        let files = expand_inputs(&[format!("{root}/*/*.json")]).unwrap();
        assert_eq!(files, vec![single]);
    }

    #[test]
    fn test_expand_missing_dir_is_empty() {
        let files = expand_inputs(&["/definitely/not/here"]).unwrap();
        assert!(files.is_empty());
    }
}
