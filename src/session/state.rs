//! Annotation session state machine.
//!
//! The session consumes one input line at a time and returns the lines to
//! show. It never touches stdin or stdout itself.

use crate::corpus::Corpus;
use crate::error::{AnnotatorError, Result};
use crate::models::{
    Annotation, AnnotationRecord, AnnotatorName, Category, Document, DocumentId, Phase,
};
use crate::store::RecordStore;
use std::collections::HashSet;
use tracing::{debug, info};

/// Maximum number of characters of document text shown at once.
pub const MAX_DISPLAY_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingName,
    AwaitingMode,
    Annotating,
    Done,
}

/// A command entered while annotating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    Label(Category),
    Skip,
    Help,
    Quit,
}

impl SessionInput {
    pub fn parse(line: &str) -> Result<Self> {
        let trimmed = line.trim();
        match trimmed.to_lowercase().as_str() {
            "s" => Ok(SessionInput::Skip),
            "h" => Ok(SessionInput::Help),
            "q" => Ok(SessionInput::Quit),
            other => other
                .parse::<u8>()
                .ok()
                .and_then(Category::from_number)
                .map(SessionInput::Label)
                .ok_or_else(|| AnnotatorError::InvalidChoice(trimmed.to_string())),
        }
    }
}

/// Counts reported when a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub annotator: Option<String>,
    pub phase: Option<Phase>,
    pub labeled: usize,
    pub skipped: usize,
    pub remaining: usize,
}

/// One annotator working through one phase of their assignment.
pub struct Session<'a> {
    store: &'a RecordStore,
    corpus: &'a Corpus,
    state: SessionState,
    annotator: Option<AnnotatorName>,
    record: Option<AnnotationRecord>,
    phase: Option<Phase>,
    assignment: Vec<DocumentId>,
    skipped: HashSet<DocumentId>,
    current: Option<DocumentId>,
    labeled: usize,
}

impl<'a> Session<'a> {
    pub fn new(store: &'a RecordStore, corpus: &'a Corpus) -> Self {
        Self {
            store,
            corpus,
            state: SessionState::AwaitingName,
            annotator: None,
            record: None,
            phase: None,
            assignment: Vec::new(),
            skipped: HashSet::new(),
            current: None,
            labeled: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_document(&self) -> Option<DocumentId> {
        self.current
    }

    /// Prompt for the current state.
    pub fn prompt(&self) -> &'static str {
        match self.state {
            SessionState::AwaitingName => "Enter your annotator name: ",
            SessionState::AwaitingMode => {
                "Select mode (1 = initial annotation, 2 = re-annotation): "
            }
            SessionState::Annotating => "Category (1-20, s = skip, h = help, q = quit): ",
            SessionState::Done => "",
        }
    }

    /// Feed one input line.
    ///
    /// Input errors leave the state unchanged and should be shown before
    /// re-prompting; any other error ends the session.
    pub fn handle(&mut self, line: &str) -> Result<Vec<String>> {
        match self.state {
            SessionState::AwaitingName => self.handle_name(line),
            SessionState::AwaitingMode => self.handle_mode(line),
            SessionState::Annotating => match SessionInput::parse(line)? {
                SessionInput::Label(category) => self.label(category),
                SessionInput::Skip => self.skip(),
                SessionInput::Help => Ok(category_list()),
                SessionInput::Quit => self.quit(),
            },
            SessionState::Done => Ok(Vec::new()),
        }
    }

    /// End of input: persist progress and finish like `q`.
    pub fn finish(&mut self) -> Result<Vec<String>> {
        match self.state {
            SessionState::Annotating => self.quit(),
            _ => {
                self.state = SessionState::Done;
                Ok(Vec::new())
            }
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            annotator: self.annotator.as_ref().map(|n| n.to_string()),
            phase: self.phase,
            labeled: self.labeled,
            skipped: self.skipped.len(),
            remaining: self.remaining(),
        }
    }

    fn handle_name(&mut self, line: &str) -> Result<Vec<String>> {
        let name = AnnotatorName::parse(line)?;
        let record = self.store.load_or_create_record(&name)?;

        let greeting = format!(
            "Welcome, {}! Phase 1 labels so far: {}, Phase 2 labels so far: {}.",
            name,
            record.count(Phase::Initial),
            record.count(Phase::Reannotation)
        );
        info!("Session started for {}", name);

        self.annotator = Some(name);
        self.record = Some(record);
        self.state = SessionState::AwaitingMode;
        Ok(vec![greeting])
    }

    fn handle_mode(&mut self, line: &str) -> Result<Vec<String>> {
        let phase = match line.trim() {
            "1" => Phase::Initial,
            "2" => Phase::Reannotation,
            other => return Err(AnnotatorError::InvalidMode(other.to_string())),
        };
        let name = self
            .annotator
            .clone()
            .ok_or_else(|| AnnotatorError::Configuration("no annotator selected".to_string()))?;

        let assignment = match phase {
            Phase::Initial => self.store.require_phase1()?.batches.remove(&name),
            Phase::Reannotation => self.store.require_phase2()?.assignments.remove(&name),
        }
        .ok_or_else(|| AnnotatorError::NoAssignment {
            annotator: name.to_string(),
            phase: phase.number(),
        })?;

        if let Some(missing) = assignment.iter().find(|id| self.corpus.get(**id).is_none()) {
            return Err(AnnotatorError::Corpus(format!(
                "document {} assigned to '{}' is not in the loaded corpus",
                missing, name
            )));
        }

        debug!("{} selected {} with {} documents", name, phase, assignment.len());
        self.phase = Some(phase);
        self.assignment = assignment;
        self.state = SessionState::Annotating;

        let mut output = vec![format!(
            "{}: {} assigned document(s), {} remaining.",
            phase,
            self.assignment.len(),
            self.remaining()
        )];
        output.extend(category_list());
        output.extend(self.advance());
        Ok(output)
    }

    fn label(&mut self, category: Category) -> Result<Vec<String>> {
        let (Some(id), Some(phase)) = (self.current, self.phase) else {
            return Ok(Vec::new());
        };
        let document = self.document(id)?;
        let record = self
            .record
            .as_mut()
            .ok_or_else(|| AnnotatorError::Configuration("no record loaded".to_string()))?;

        record.record(Annotation::new(document, category, phase));
        self.store.save_record(record)?;
        self.labeled += 1;
        debug!("Document {} labeled {}", id, category);

        let mut output = vec![format!("Saved: document {} -> {}", id, category)];
        output.extend(self.advance());
        Ok(output)
    }

    fn skip(&mut self) -> Result<Vec<String>> {
        let mut output = Vec::new();
        if let Some(id) = self.current {
            self.skipped.insert(id);
            output.push(format!("Skipped document {}", id));
        }
        output.extend(self.advance());
        Ok(output)
    }

    fn quit(&mut self) -> Result<Vec<String>> {
        if let Some(record) = self.record.as_mut() {
            self.store.save_record(record)?;
        }
        self.state = SessionState::Done;
        self.current = None;

        Ok(vec![format!(
            "Progress saved. Labeled {} document(s) this session, {} remaining.",
            self.labeled,
            self.remaining()
        )])
    }

    /// Move to the next unlabeled, unskipped document or finish.
    fn advance(&mut self) -> Vec<String> {
        let corpus = self.corpus;
        self.current = self.next_document();

        match self.current.and_then(|id| corpus.get(id)) {
            Some(document) => {
                let position = self
                    .assignment
                    .iter()
                    .position(|id| *id == document.id)
                    .unwrap_or(0);
                render_document(document, position + 1, self.assignment.len(), self.remaining())
            }
            None => {
                self.state = SessionState::Done;
                vec![format!(
                    "No documents left in this phase. Labeled {} this session, {} skipped.",
                    self.labeled,
                    self.skipped.len()
                )]
            }
        }
    }

    fn next_document(&self) -> Option<DocumentId> {
        let (record, phase) = (self.record.as_ref()?, self.phase?);
        self.assignment
            .iter()
            .copied()
            .find(|id| record.get(phase, *id).is_none() && !self.skipped.contains(id))
    }

    /// Assigned documents not yet labeled in the current phase.
    fn remaining(&self) -> usize {
        match (self.record.as_ref(), self.phase) {
            (Some(record), Some(phase)) => self
                .assignment
                .iter()
                .filter(|id| record.get(phase, **id).is_none())
                .count(),
            _ => 0,
        }
    }

    fn document(&self, id: DocumentId) -> Result<&'a Document> {
        self.corpus
            .get(id)
            .ok_or_else(|| AnnotatorError::Corpus(format!("document {} is not in the corpus", id)))
    }
}

/// The guideline category list.
pub fn category_list() -> Vec<String> {
    let mut lines = vec!["Categories:".to_string()];
    lines.extend(
        Category::all().map(|category| format!("  {:>2}. {}", category.number(), category.name())),
    );
    lines
}

/// Document display with position and truncated text.
pub fn render_document(
    document: &Document,
    position: usize,
    total: usize,
    remaining: usize,
) -> Vec<String> {
    let mut text: String = document.text.chars().take(MAX_DISPLAY_CHARS).collect();
    if document.text.chars().count() > MAX_DISPLAY_CHARS {
        text.push_str("\n... [truncated]");
    }

    vec![
        String::new(),
        format!(
            "=== Document {} of {} (id {}, {} remaining) ===",
            position, total, document.id, remaining
        ),
        format!("Subject: {}", document.subject),
        String::new(),
        text,
        String::new(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Phase1Manifest;
    use crate::planner::plan_phase2;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn corpus(n: u32) -> Corpus {
        let documents = (0..n)
            .map(|id| Document {
                id,
                text: format!("body of document {}", id),
                subject: format!("subject {}", id),
                original_label: "sci.space".to_string(),
                source: "train".to_string(),
            })
            .collect();
        Corpus::from_documents(documents).unwrap()
    }

    fn name(raw: &str) -> AnnotatorName {
        AnnotatorName::parse(raw).unwrap()
    }

    fn setup(dir: &TempDir) -> (RecordStore, Corpus) {
        let store = RecordStore::new(dir.path().to_path_buf());
        let manifest = Phase1Manifest {
            seed: 42,
            batch_size: 3,
            pool_size: 6,
            created_at: Utc::now(),
            batches: BTreeMap::from([(name("alice"), vec![4, 0, 2]), (name("bob"), vec![1, 3, 5])]),
        };
        store.save_phase1(&manifest).unwrap();
        (store, corpus(6))
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(SessionInput::parse(" s ").unwrap(), SessionInput::Skip);
        assert_eq!(SessionInput::parse("Q").unwrap(), SessionInput::Quit);
        assert_eq!(
            SessionInput::parse("13").unwrap(),
            SessionInput::Label(Category::from_number(13).unwrap())
        );
        for bad in ["0", "21", "abc", ""] {
            assert!(SessionInput::parse(bad).unwrap_err().is_input_error());
        }
    }

    #[test]
    fn test_full_session_labels_in_assignment_order() {
        let dir = TempDir::new().unwrap();
        let (store, corpus) = setup(&dir);
        let mut session = Session::new(&store, &corpus);

        session.handle("Alice").unwrap();
        assert_eq!(session.state(), SessionState::AwaitingMode);
        session.handle("1").unwrap();
        assert_eq!(session.state(), SessionState::Annotating);
        assert_eq!(session.current_document(), Some(4));

        session.handle("13").unwrap();
        assert_eq!(session.current_document(), Some(0));
        session.handle("1").unwrap();
        session.handle("2").unwrap();
        assert_eq!(session.state(), SessionState::Done);

        let record = store.require_record(&name("alice")).unwrap();
        assert_eq!(record.count(Phase::Initial), 3);
        assert_eq!(
            record.get(Phase::Initial, 4).map(|a| a.category_name.as_str()),
            Some("sci.space")
        );
        assert!(store.backup_path(&name("alice")).exists());
    }

    #[test]
    fn test_invalid_input_reprompts() {
        let dir = TempDir::new().unwrap();
        let (store, corpus) = setup(&dir);
        let mut session = Session::new(&store, &corpus);

        assert!(session.handle("  ").unwrap_err().is_input_error());
        assert_eq!(session.state(), SessionState::AwaitingName);

        session.handle("alice").unwrap();
        assert!(session.handle("3").unwrap_err().is_input_error());
        assert_eq!(session.state(), SessionState::AwaitingMode);

        session.handle("1").unwrap();
        assert!(session.handle("42").unwrap_err().is_input_error());
        assert_eq!(session.current_document(), Some(4));

        let help = session.handle("h").unwrap();
        assert_eq!(help.len(), 21);
        assert_eq!(session.state(), SessionState::Annotating);
    }

    #[test]
    fn test_skip_and_quit_persist_progress() {
        let dir = TempDir::new().unwrap();
        let (store, corpus) = setup(&dir);
        let mut session = Session::new(&store, &corpus);

        session.handle("bob").unwrap();
        session.handle("1").unwrap();
        session.handle("s").unwrap();
        assert_eq!(session.current_document(), Some(3));
        session.handle("6").unwrap();
        session.handle("q").unwrap();
        assert_eq!(session.state(), SessionState::Done);

        let summary = session.summary();
        assert_eq!(summary.labeled, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.remaining, 2);

        // A new session resumes at the first unlabeled document, skips forgotten
        let mut resumed = Session::new(&store, &corpus);
        resumed.handle("bob").unwrap();
        resumed.handle("1").unwrap();
        assert_eq!(resumed.current_document(), Some(1));
    }

    #[test]
    fn test_end_of_input_saves() {
        let dir = TempDir::new().unwrap();
        let (store, corpus) = setup(&dir);
        let mut session = Session::new(&store, &corpus);

        session.handle("alice").unwrap();
        session.handle("1").unwrap();
        session.finish().unwrap();

        assert_eq!(session.state(), SessionState::Done);
        assert!(store.record_path(&name("alice")).exists());
    }

    #[test]
    fn test_missing_assignment_is_fatal() {
        let dir = TempDir::new().unwrap();
        let (store, corpus) = setup(&dir);
        let mut session = Session::new(&store, &corpus);

        session.handle("carol").unwrap();
        let err = session.handle("1").unwrap_err();
        assert!(matches!(err, AnnotatorError::NoAssignment { phase: 1, .. }));
        assert!(!err.is_input_error());

        let mut session = Session::new(&store, &corpus);
        session.handle("alice").unwrap();
        assert!(matches!(
            session.handle("2"),
            Err(AnnotatorError::MissingManifest { .. })
        ));
    }

    #[test]
    fn test_phase2_labels_are_separate() {
        let dir = TempDir::new().unwrap();
        let (store, corpus) = setup(&dir);
        let phase1 = store.require_phase1().unwrap();
        let phase2 = plan_phase2(&phase1, 2, 42, None).unwrap();
        store.save_phase2(&phase2).unwrap();

        let mut session = Session::new(&store, &corpus);
        session.handle("alice").unwrap();
        session.handle("1").unwrap();
        for _ in 0..3 {
            session.handle("5").unwrap();
        }

        let mut session = Session::new(&store, &corpus);
        session.handle("alice").unwrap();
        session.handle("2").unwrap();
        assert_eq!(session.current_document(), Some(phase2.subset[0]));
        session.handle("7").unwrap();
        session.handle("7").unwrap();
        assert_eq!(session.state(), SessionState::Done);

        let record = store.require_record(&name("alice")).unwrap();
        assert_eq!(record.count(Phase::Initial), 3);
        assert_eq!(record.count(Phase::Reannotation), 2);
    }

    #[test]
    fn test_render_document_truncates() {
        let document = Document {
            id: 9,
            text: "x".repeat(MAX_DISPLAY_CHARS + 10),
            subject: "Long".to_string(),
            original_label: "sci.med".to_string(),
            source: String::new(),
        };
        let lines = render_document(&document, 1, 5, 5);
        assert!(lines[4].ends_with("[truncated]"));
        assert!(lines.iter().all(|l| !l.contains("sci.med")));
    }
}
