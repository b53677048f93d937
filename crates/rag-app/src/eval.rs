//! Evaluation input and output files.
//!
//! Questions are read from a JSON array of `{question, ground_truth}`
//! objects. Records are written as JSON lines, one [`EvalRecord`] per line.

use std::io::Write;
use std::path::Path;

use tracing::info;

use rag_core::{EvalQuestion, EvalRecord, RagError, Result};

/// Read evaluation questions from a JSON file.
pub fn load_questions(path: &Path) -> Result<Vec<EvalQuestion>> {
    let content = std::fs::read_to_string(path).map_err(|e| RagError::LoadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let questions: Vec<EvalQuestion> = serde_json::from_str(&content)?;
    info!(path = %path.display(), questions = questions.len(), "Loaded evaluation questions");
    Ok(questions)
}

/// Write records as JSON lines, replacing the file.
pub fn write_records(path: &Path, records: &[EvalRecord]) -> Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut file, record)?;
        file.write_all(b"\n")?;
    }
    file.flush()?;

    info!(path = %path.display(), records = records.len(), "Wrote evaluation records");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_questions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.json");
        std::fs::write(
            &path,
            r#"[{"question": "What voltage?", "ground_truth": "5V"}]"#,
        )
        .unwrap();

        let questions = load_questions(&path).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].ground_truth, "5V");
    }

    #[test]
    fn test_missing_questions_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_questions(&dir.path().join("none.json")).unwrap_err();
        assert_eq!(err.error_code(), "LOAD_FAILED");
    }

    #[test]
    fn test_write_records_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let records = vec![
            EvalRecord {
                question: "q1".to_string(),
                answer: "a1".to_string(),
                contexts: vec!["c1".to_string()],
                ground_truth: "g1".to_string(),
            },
            EvalRecord {
                question: "q2".to_string(),
                answer: "a2".to_string(),
                contexts: Vec::new(),
                ground_truth: "g2".to_string(),
            },
        ];

        write_records(&path, &records).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["contexts"][0], "c1");
        assert_eq!(first["ground_truth"], "g1");
    }
}
