//! Engine configuration.

/// Configuration for a domain model and its history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum undo entries kept (`None` = unbounded).
    pub history_limit: Option<usize>,

    /// Whether `save`/`update` also clear the redo stack.
    pub clear_redo_on_save: bool,

    /// Whether every commit is written to storage through `Storage::update`.
    pub write_through: bool,

    /// Thread name of the worker scheduler.
    pub worker_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_limit: Some(100),
            clear_redo_on_save: false,
            write_through: false,
            worker_name: "shardgraph-worker".to_string(),
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of undo entries.
    #[must_use]
    pub const fn history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self
    }

    /// Sets whether saving clears the redo stack.
    #[must_use]
    pub const fn clear_redo_on_save(mut self, value: bool) -> Self {
        self.clear_redo_on_save = value;
        self
    }

    /// Sets whether commits are written through to storage.
    #[must_use]
    pub const fn write_through(mut self, value: bool) -> Self {
        self.write_through = value;
        self
    }

    /// Sets the worker thread name.
    #[must_use]
    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }
}
