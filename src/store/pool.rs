//! The few-shot example pool and prompt rendering.
//!
//! Epistemic foundation:
//! - K_i: The pool is append-only; order is the order labels arrived in
//! - B_i: Other processes may edit the backing file → re-read before append

use crate::models::{ArbitriumError, Label, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Placeholder in the prompt replaced by the item under classification.
const CLASSIFIEE_SLOT: &str = "{CLASSIFIEE}";
/// Placeholder in the prompt replaced by the rendered example pool.
const EXAMPLES_SLOT: &str = "{EXAMPLES}";

/// One labeled example: a question, the human's answer, and optionally why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QAPair {
    pub question: String,
    pub no_or_yes: Label,
    pub explanation: Option<String>,
}

impl QAPair {
    /// Render this example as a query/reference block for the prompt.
    pub fn render(&self) -> String {
        let mut s = format!(
            "<query>\n{}\n</query>\n<reference>\n{}",
            self.question,
            self.no_or_yes.answer(),
        );
        if let Some(explanation) = &self.explanation {
            s.push_str(&format!(", because:\n{explanation}"));
        }
        s.push_str("\n</reference>");
        s
    }
}

/// The judge prompt plus its ordered example pool, backed by a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptAndExamples {
    #[serde(skip)]
    path: PathBuf,

    pub prompt: String,
    pub examples: Vec<QAPair>,
}

impl PromptAndExamples {
    /// Load the pool from its backing file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ArbitriumError::io("reading example pool", e))?;
        let mut pool: Self = serde_json::from_str(&content)
            .map_err(|e| ArbitriumError::ParseError(format!("Invalid example pool: {e}")))?;
        pool.path = path.to_path_buf();
        Ok(pool)
    }

    /// Rewrite the backing file (2-space indent).
    pub fn write_file(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ArbitriumError::Internal(format!("Serializing example pool: {e}")))?;
        fs::write(&self.path, content)
            .map_err(|e| ArbitriumError::io("writing example pool", e))?;
        Ok(())
    }

    /// Render the full judge prompt for one classifiee.
    pub fn render(&self, classifiee: &str, omit_examples: bool) -> String {
        let mut p = self
            .prompt
            .replace(CLASSIFIEE_SLOT, &format!("<query>\n{classifiee}\n</query>"));
        if !omit_examples {
            let examples = self
                .examples
                .iter()
                .map(QAPair::render)
                .collect::<Vec<_>>()
                .join("\n\n");
            p = p.replace(EXAMPLES_SLOT, &examples);
        }
        p
    }

    /// Append one example and persist, re-reading the backing file first so
    /// examples added by concurrent external writers are not clobbered.
    pub fn add_example_syncing_file(&self, example: QAPair) -> Result<Self> {
        let latest = Self::from_file(&self.path)?;
        let added = Self {
            path: latest.path,
            prompt: latest.prompt,
            examples: latest
                .examples
                .into_iter()
                .chain(std::iter::once(example))
                .collect(),
        };
        added.write_file()?;
        debug!(examples = added.examples.len(), "Example pool grown");
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_pool(dir: &TempDir, prompt: &str, examples: &[QAPair]) -> PathBuf {
        let path = dir.path().join("pool.json");
        let pool = PromptAndExamples {
            path: path.clone(),
            prompt: prompt.to_string(),
            examples: examples.to_vec(),
        };
        pool.write_file().unwrap();
        path
    }

    #[test]
    fn qa_pair_render_with_and_without_explanation() {
        let plain = QAPair {
            question: "Is water wet?".to_string(),
            no_or_yes: Label::Yes,
            explanation: None,
        };
        assert_eq!(
            plain.render(),
            "<query>\nIs water wet?\n</query>\n<reference>\nYes\n</reference>"
        );

        let explained = QAPair {
            question: "Is lava cold?".to_string(),
            no_or_yes: Label::No,
            explanation: Some("it is molten rock".to_string()),
        };
        assert_eq!(
            explained.render(),
            "<query>\nIs lava cold?\n</query>\n<reference>\nNo, because:\nit is molten rock\n</reference>"
        );
    }

    #[test]
    fn render_substitutes_both_slots() {
        let dir = TempDir::new().unwrap();
        let path = write_pool(
            &dir,
            "Decide.\n{EXAMPLES}\nNow: {CLASSIFIEE}\nAnswer Yes or No.",
            &[QAPair {
                question: "q1".to_string(),
                no_or_yes: Label::Yes,
                explanation: None,
            }],
        );
        let pool = PromptAndExamples::from_file(&path).unwrap();

        let full = pool.render("the item", false);
        assert!(full.contains("<query>\nthe item\n</query>"));
        assert!(full.contains("<query>\nq1\n</query>"));
        assert!(!full.contains(EXAMPLES_SLOT));

        let bare = pool.render("the item", true);
        assert!(bare.contains(EXAMPLES_SLOT));
    }

    #[test]
    fn append_re_reads_before_write() {
        let dir = TempDir::new().unwrap();
        let path = write_pool(&dir, "p {CLASSIFIEE} {EXAMPLES}", &[]);
        let pool = PromptAndExamples::from_file(&path).unwrap();

        // An external writer appends behind our back.
        let mut external = PromptAndExamples::from_file(&path).unwrap();
        external.examples.push(QAPair {
            question: "external".to_string(),
            no_or_yes: Label::No,
            explanation: None,
        });
        external.write_file().unwrap();

        let added = pool
            .add_example_syncing_file(QAPair {
                question: "ours".to_string(),
                no_or_yes: Label::Yes,
                explanation: None,
            })
            .unwrap();

        let questions: Vec<_> = added.examples.iter().map(|e| e.question.as_str()).collect();
        assert_eq!(questions, vec!["external", "ours"]);

        let reloaded = PromptAndExamples::from_file(&path).unwrap();
        assert_eq!(reloaded.examples.len(), 2);
    }
}
