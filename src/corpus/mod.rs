//! Corpus loading for the document pool.
//!
//! Documents come either from a 20 Newsgroups directory tree laid out as
//! `<split>/<newsgroup>/<message>` or from a JSON file holding an array of
//! documents. Ids in a tree are assigned in sorted path order, so the same
//! tree always yields the same ids.

use crate::error::{AnnotatorError, Result};
use crate::models::{Document, DocumentId};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// The loaded document pool.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    documents: Vec<Document>,
    index: HashMap<DocumentId, usize>,
}

impl Corpus {
    /// Build a corpus, rejecting duplicate ids.
    pub fn from_documents(documents: Vec<Document>) -> Result<Self> {
        let mut index = HashMap::with_capacity(documents.len());

        for (pos, doc) in documents.iter().enumerate() {
            if index.insert(doc.id, pos).is_some() {
                return Err(AnnotatorError::Corpus(format!(
                    "duplicate document id {}",
                    doc.id
                )));
            }
        }

        Ok(Self { documents, index })
    }

    pub fn get(&self, id: DocumentId) -> Option<&Document> {
        self.index.get(&id).map(|&pos| &self.documents[pos])
    }

    /// All document ids in corpus order.
    pub fn ids(&self) -> Vec<DocumentId> {
        self.documents.iter().map(|d| d.id).collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Loads a corpus from disk.
pub struct CorpusLoader {
    root: PathBuf,
    show_progress: bool,
}

impl CorpusLoader {
    /// Create a loader for a directory tree or JSON file.
    pub fn new(root: PathBuf, show_progress: bool) -> Self {
        Self {
            root,
            show_progress,
        }
    }

    /// Load every document.
    pub fn load(&self) -> Result<Corpus> {
        if !self.root.exists() {
            return Err(AnnotatorError::Corpus(format!(
                "corpus not found: {}",
                self.root.display()
            )));
        }

        let documents = if self.root.is_dir() {
            self.load_tree()?
        } else {
            self.load_json()?
        };

        let corpus = Corpus::from_documents(documents)?;
        if corpus.is_empty() {
            return Err(AnnotatorError::Corpus(format!(
                "no documents in {}",
                self.root.display()
            )));
        }

        info!(
            "Loaded {} documents from {}",
            corpus.len(),
            self.root.display()
        );
        Ok(corpus)
    }

    fn load_json(&self) -> Result<Vec<Document>> {
        let content = fs::read_to_string(&self.root)?;
        serde_json::from_str(&content).map_err(|source| AnnotatorError::Malformed {
            path: self.root.clone(),
            source,
        })
    }

    fn load_tree(&self) -> Result<Vec<Document>> {
        let spinner = self.show_progress.then(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });

        let mut documents = Vec::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !is_hidden(entry.file_name().to_str().unwrap_or(""))
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable corpus entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Some(label) = parent_name(path) else {
                debug!("Skipping file outside a newsgroup directory: {}", path.display());
                continue;
            };
            if path.parent() == Some(self.root.as_path()) {
                debug!("Skipping top-level file: {}", path.display());
                continue;
            }

            let raw = fs::read(path)?;
            let message = String::from_utf8_lossy(&raw);
            let (subject, text) = parse_message(&message);

            documents.push(Document {
                id: documents.len() as DocumentId,
                text,
                subject,
                original_label: label,
                source: split_name(path, &self.root),
            });

            if let Some(ref pb) = spinner {
                pb.set_message(format!("{} documents", documents.len()));
            }
        }

        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }

        if documents.is_empty() {
            return Err(AnnotatorError::Corpus(format!(
                "no documents found under {}",
                self.root.display()
            )));
        }

        Ok(documents)
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn parent_name(path: &Path) -> Option<String> {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(String::from)
}

/// Split name from the directory two levels up, e.g. `20news-bydate-train` -> `train`.
fn split_name(path: &Path, root: &Path) -> String {
    let split_dir = path
        .parent()
        .and_then(|p| p.parent())
        .filter(|p| *p != root)
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if split_dir.contains("train") {
        "train".to_string()
    } else if split_dir.contains("test") {
        "test".to_string()
    } else {
        split_dir.to_string()
    }
}

/// Split a Usenet message into its subject and cleaned body.
///
/// The body drops quoted lines, attribution lines and everything after the
/// last `--` signature separator.
pub fn parse_message(message: &str) -> (String, String) {
    let (headers, body) = match message.find("\n\n") {
        Some(pos) => (&message[..pos], &message[pos + 2..]),
        None => ("", message),
    };

    let subject = headers
        .lines()
        .take(20)
        .find_map(|line| line.strip_prefix("Subject: "))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "(No Subject)".to_string());

    let mut lines: Vec<&str> = body.lines().collect();
    if let Some(sig) = lines.iter().rposition(|line| line.trim_end() == "--") {
        lines.truncate(sig);
    }

    let text = lines
        .into_iter()
        .filter(|line| {
            let trimmed = line.trim_start();
            !(trimmed.starts_with('>')
                || trimmed.starts_with('|')
                || trimmed.ends_with("writes:")
                || trimmed.ends_with("wrote:"))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    (subject, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_parse_message() {
        let message = "From: someone\nSubject: Re: Orbit question\nLines: 5\n\n\
In article <1> bob writes:\n> quoted text\nThe shuttle orbit is low.\n--\nSignature";
        let (subject, text) = parse_message(message);
        assert_eq!(subject, "Re: Orbit question");
        assert_eq!(text, "The shuttle orbit is low.");
    }

    #[test]
    fn test_parse_message_without_subject() {
        let (subject, text) = parse_message("From: x\n\nBody only");
        assert_eq!(subject, "(No Subject)");
        assert_eq!(text, "Body only");
    }

    #[test]
    fn test_load_tree_assigns_stable_ids() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(
            &root.join("20news-bydate-train/sci.space/1"),
            "Subject: Moon\n\nLunar base",
        );
        write(
            &root.join("20news-bydate-train/rec.autos/2"),
            "Subject: Cars\n\nEngine noise",
        );
        write(&root.join("20news-bydate-test/sci.med/3"), "Subject: Flu\n\nVaccines");
        write(&root.join("README"), "not a message");
        write(&root.join(".hidden/sci.med/4"), "Subject: x\n\nx");

        let corpus = CorpusLoader::new(root.to_path_buf(), false).load().unwrap();
        assert_eq!(corpus.len(), 3);

        // test < train in sorted order
        let first = corpus.get(0).unwrap();
        assert_eq!(first.original_label, "sci.med");
        assert_eq!(first.source, "test");

        let autos = corpus.get(1).unwrap();
        assert_eq!(autos.subject, "Cars");
        assert_eq!(autos.source, "train");

        let again = CorpusLoader::new(root.to_path_buf(), false).load().unwrap();
        assert_eq!(again.ids(), corpus.ids());
        assert_eq!(again.get(2), corpus.get(2));
    }

    #[test]
    fn test_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corpus.json");
        fs::write(
            &path,
            r#"[{"id": 10, "text": "a", "original_label": "sci.space"},
                {"id": 11, "text": "b", "subject": "S", "original_label": "rec.autos", "source": "test"}]"#,
        )
        .unwrap();

        let corpus = CorpusLoader::new(path, false).load().unwrap();
        assert_eq!(corpus.ids(), vec![10, 11]);
        assert_eq!(corpus.get(10).unwrap().subject, "(No Subject)");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let doc = Document {
            id: 1,
            text: String::new(),
            subject: String::new(),
            original_label: String::new(),
            source: String::new(),
        };
        let err = Corpus::from_documents(vec![doc.clone(), doc]).unwrap_err();
        assert!(matches!(err, AnnotatorError::Corpus(_)));
    }

    #[test]
    fn test_empty_json_corpus() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.json");
        fs::write(&path, "[]").unwrap();

        let result = CorpusLoader::new(path, false).load();
        assert!(matches!(result, Err(AnnotatorError::Corpus(_))));
    }

    #[test]
    fn test_missing_corpus() {
        let dir = TempDir::new().unwrap();
        let result = CorpusLoader::new(dir.path().join("nope"), false).load();
        assert!(matches!(result, Err(AnnotatorError::Corpus(_))));
    }
}
