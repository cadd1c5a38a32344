use std::path::{Path, PathBuf};

use autoarc::{ConflictAction, Error, EventHandler};

/// Recording handler used by the integration tests: collects every
/// event and replies with preconfigured decisions.
#[derive(Default)]
pub struct Recorder {
    pub scanned: Option<u64>,
    pub progress: Vec<(u64, u64)>,
    pub decide_destination: Vec<(PathBuf, Vec<PathBuf>)>,
    pub conflicts: Vec<PathBuf>,
    pub passphrase_requests: u64,
    pub completed: bool,
    pub cancelled: bool,
    pub errors: Vec<String>,
    pub events_after_terminal: u64,

    pub destination_to_suggest: Option<PathBuf>,
    pub conflict_action: Option<ConflictAction>,
    pub passphrase_to_return: Option<String>,
}

impl Recorder {
    pub fn terminal_count(&self) -> u64 {
        self.completed as u64 + self.cancelled as u64 + self.errors.len() as u64
    }

    fn terminal_reached(&self) -> bool {
        self.terminal_count() > 0
    }

    fn note_event(&mut self) {
        if self.terminal_reached() {
            self.events_after_terminal += 1;
        }
    }
}

impl EventHandler for Recorder {
    fn scanned(&mut self, total_files: u64) {
        self.note_event();
        self.scanned = Some(total_files);
    }

    fn decide_destination(&mut self, proposed: &Path, entry_paths: &[PathBuf]) -> Option<PathBuf> {
        self.note_event();
        self.decide_destination
            .push((proposed.to_path_buf(), entry_paths.to_vec()));
        self.destination_to_suggest.clone()
    }

    fn progress(&mut self, completed_size: u64, completed_files: u64) {
        self.note_event();
        if let Some(&(last_size, last_files)) = self.progress.last() {
            assert!(completed_size >= last_size, "completed_size went backwards");
            assert!(completed_files >= last_files, "completed_files went backwards");
        }
        self.progress.push((completed_size, completed_files));
    }

    fn conflict(&mut self, path: &Path) -> ConflictAction {
        self.note_event();
        self.conflicts.push(path.to_path_buf());
        self.conflict_action.clone().unwrap_or(ConflictAction::Unhandled)
    }

    fn request_passphrase(&mut self) -> Option<String> {
        self.note_event();
        self.passphrase_requests += 1;
        self.passphrase_to_return.clone()
    }

    fn cancelled(&mut self) {
        self.note_event();
        self.cancelled = true;
    }

    fn completed(&mut self) {
        self.note_event();
        self.completed = true;
    }

    fn error(&mut self, error: &Error) {
        self.note_event();
        self.errors.push(error.to_string());
    }
}

/// Asserts the run emitted exactly one terminal event and nothing
/// after it.
pub fn assert_single_terminal(recorder: &Recorder) {
    assert_eq!(recorder.terminal_count(), 1, "expected exactly one terminal event");
    assert_eq!(recorder.events_after_terminal, 0, "events were emitted after the terminal");
}
