//! Tool-runner binding.
//!
//! The runner executes commands against projects and reacts to source edits.
//! This module only manages its lifetime: at most one runner is live, and it
//! is replaced whenever the interpreter path changes.

mod binding;
mod error;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::SourceFileChangedEvent;

pub use binding::RunnerBinding;
pub use error::{RunnerError, RunnerResult};

/// A live tool runner.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Prepare the runner for use. Called once, right after construction.
    async fn initialize(&self) -> RunnerResult<()>;

    /// A source file inside a project changed.
    fn on_source_file_changed(&self, event: &SourceFileChangedEvent);

    /// Tear the runner down. It receives no events afterwards.
    async fn dispose(&self) -> RunnerResult<()>;
}

/// Constructs runners for an interpreter.
pub trait RunnerFactory: Send + Sync {
    fn create(&self, interpreter: &Path) -> RunnerResult<Arc<dyn ToolRunner>>;
}

impl<F> RunnerFactory for F
where
    F: Fn(&Path) -> RunnerResult<Arc<dyn ToolRunner>> + Send + Sync,
{
    fn create(&self, interpreter: &Path) -> RunnerResult<Arc<dyn ToolRunner>> {
        self(interpreter)
    }
}
