//! Lifetime management for the single live tool runner.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{Mutex, watch};

use crate::cache::SourceFileChangedEvent;

use super::{RunnerError, RunnerFactory, RunnerResult, ToolRunner};

/// How long a runner gets to shut down before it is abandoned.
const DEFAULT_DISPOSE_TIMEOUT: Duration = Duration::from_secs(5);

struct ActiveRunner {
    interpreter: PathBuf,
    runner: Arc<dyn ToolRunner>,
}

/// Holds at most one live runner, rebuilt whenever the interpreter changes.
pub struct RunnerBinding {
    factory: Option<Arc<dyn RunnerFactory>>,
    current: RwLock<Option<ActiveRunner>>,
    /// Serializes replacements so two interpreter updates never interleave.
    swap: Mutex<()>,
    dispose_timeout: Duration,
}

impl RunnerBinding {
    pub fn new(factory: Arc<dyn RunnerFactory>) -> Self {
        Self {
            factory: Some(factory),
            current: RwLock::new(None),
            swap: Mutex::new(()),
            dispose_timeout: DEFAULT_DISPOSE_TIMEOUT,
        }
    }

    /// A binding that never starts a runner.
    pub fn disabled() -> Self {
        Self {
            factory: None,
            current: RwLock::new(None),
            swap: Mutex::new(()),
            dispose_timeout: DEFAULT_DISPOSE_TIMEOUT,
        }
    }

    /// Limit on how long a runner's dispose may take.
    pub fn with_dispose_timeout(mut self, timeout: Duration) -> Self {
        self.dispose_timeout = timeout;
        self
    }

    pub fn is_active(&self) -> bool {
        self.current.read().is_some()
    }

    /// Interpreter of the live runner.
    pub fn interpreter(&self) -> Option<PathBuf> {
        self.current
            .read()
            .as_ref()
            .map(|active| active.interpreter.clone())
    }

    /// Replace the live runner for a new interpreter path.
    ///
    /// The old runner is torn down first. `None` leaves no runner behind.
    /// Returns whether a runner is live afterwards.
    pub async fn set_interpreter(&self, interpreter: Option<PathBuf>) -> RunnerResult<bool> {
        let _guard = self.swap.lock().await;

        let unchanged = matches!(
            (&interpreter, self.interpreter()),
            (Some(wanted), Some(active)) if *wanted == active
        );
        if unchanged {
            return Ok(true);
        }

        self.teardown().await;

        let (Some(interpreter), Some(factory)) = (interpreter, self.factory.as_ref()) else {
            crate::debug_event!("runner", "inactive");
            return Ok(false);
        };

        let runner = factory.create(&interpreter)?;
        if let Err(e) = runner.initialize().await {
            tracing::error!("[runner] initialization failed for {}: {e}", interpreter.display());
            return Err(e);
        }

        crate::log_event!("runner", "started", "{}", interpreter.display());
        *self.current.write() = Some(ActiveRunner {
            interpreter,
            runner,
        });
        Ok(true)
    }

    /// Forward a source change to the live runner. Returns false when there is none.
    pub fn forward(&self, event: &SourceFileChangedEvent) -> bool {
        let runner = self
            .current
            .read()
            .as_ref()
            .map(|active| Arc::clone(&active.runner));

        match runner {
            Some(runner) => {
                runner.on_source_file_changed(event);
                true
            }
            None => false,
        }
    }

    /// Tear down the live runner, if any.
    pub async fn shutdown(&self) {
        let _guard = self.swap.lock().await;
        self.teardown().await;
    }

    /// Apply every interpreter update from the host until the sender goes away.
    pub async fn follow_interpreter(self: Arc<Self>, mut updates: watch::Receiver<Option<PathBuf>>) {
        let mut interpreter = updates.borrow_and_update().clone();
        loop {
            if let Err(e) = self.set_interpreter(interpreter).await {
                tracing::warn!("[runner] interpreter update failed: {e}");
            }
            if updates.changed().await.is_err() {
                crate::debug_event!("runner", "interpreter updates closed");
                break;
            }
            interpreter = updates.borrow_and_update().clone();
        }
    }

    async fn teardown(&self) {
        let previous = self.current.write().take();
        if let Some(previous) = previous {
            let disposed = tokio::time::timeout(self.dispose_timeout, previous.runner.dispose())
                .await
                .unwrap_or_else(|_| {
                    Err(RunnerError::Dispose {
                        reason: format!("timed out after {:?}", self.dispose_timeout),
                    })
                });
            match disposed {
                Ok(()) => crate::log_event!(
                    "runner",
                    "stopped",
                    "{}",
                    previous.interpreter.display()
                ),
                Err(e) => tracing::warn!("[runner] dispose failed: {e}"),
            }
        }
    }
}

impl Default for RunnerBinding {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRunner {
        events: AtomicUsize,
        disposed: AtomicUsize,
        fail_init: bool,
    }

    #[async_trait]
    impl ToolRunner for CountingRunner {
        async fn initialize(&self) -> RunnerResult<()> {
            if self.fail_init {
                return Err(RunnerError::Init {
                    interpreter: PathBuf::from("broken"),
                    reason: "no such interpreter".to_string(),
                });
            }
            Ok(())
        }

        fn on_source_file_changed(&self, _event: &SourceFileChangedEvent) {
            self.events.fetch_add(1, Ordering::SeqCst);
        }

        async fn dispose(&self) -> RunnerResult<()> {
            self.disposed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    type Created = Arc<parking_lot::Mutex<Vec<Arc<CountingRunner>>>>;

    fn binding() -> (RunnerBinding, Created) {
        let created: Created = Arc::default();
        let sink = Arc::clone(&created);
        let factory = move |interpreter: &Path| -> RunnerResult<Arc<dyn ToolRunner>> {
            let runner = Arc::new(CountingRunner {
                fail_init: interpreter == Path::new("broken"),
                ..CountingRunner::default()
            });
            sink.lock().push(Arc::clone(&runner));
            Ok(runner)
        };
        (RunnerBinding::new(Arc::new(factory)), created)
    }

    fn event() -> SourceFileChangedEvent {
        SourceFileChangedEvent {
            path: PathBuf::from("/ws/proj/models/a.sql"),
            project_root: Some(PathBuf::from("/ws/proj")),
        }
    }

    #[tokio::test]
    async fn test_forward_without_runner_is_noop() {
        let (binding, _) = binding();
        assert!(!binding.forward(&event()));
        assert!(!binding.is_active());
    }

    #[tokio::test]
    async fn test_interpreter_change_replaces_runner() {
        let (binding, created) = binding();

        assert!(binding.set_interpreter(Some(PathBuf::from("/py/a"))).await.unwrap());
        assert!(binding.forward(&event()));
        assert!(binding.set_interpreter(Some(PathBuf::from("/py/b"))).await.unwrap());
        assert!(binding.forward(&event()));

        let created = created.lock();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].disposed.load(Ordering::SeqCst), 1);
        assert_eq!(created[0].events.load(Ordering::SeqCst), 1);
        assert_eq!(created[1].disposed.load(Ordering::SeqCst), 0);
        assert_eq!(created[1].events.load(Ordering::SeqCst), 1);
        assert_eq!(binding.interpreter(), Some(PathBuf::from("/py/b")));
    }

    #[tokio::test]
    async fn test_same_interpreter_keeps_runner() {
        let (binding, created) = binding();

        binding.set_interpreter(Some(PathBuf::from("/py/a"))).await.unwrap();
        binding.set_interpreter(Some(PathBuf::from("/py/a"))).await.unwrap();

        assert_eq!(created.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_clearing_interpreter_stops_runner() {
        let (binding, created) = binding();

        binding.set_interpreter(Some(PathBuf::from("/py/a"))).await.unwrap();
        assert!(!binding.set_interpreter(None).await.unwrap());

        assert!(!binding.is_active());
        assert_eq!(created.lock()[0].disposed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_initialization_leaves_slot_empty() {
        let (binding, _) = binding();

        binding.set_interpreter(Some(PathBuf::from("/py/a"))).await.unwrap();
        assert!(binding.set_interpreter(Some(PathBuf::from("broken"))).await.is_err());

        assert!(!binding.is_active());
        assert!(!binding.forward(&event()));
    }

    #[tokio::test]
    async fn test_disabled_binding_never_starts() {
        let binding = RunnerBinding::disabled();
        assert!(!binding.set_interpreter(Some(PathBuf::from("/py/a"))).await.unwrap());
        assert!(!binding.is_active());
    }

    #[tokio::test]
    async fn test_follow_interpreter_applies_updates() {
        let (binding, created) = binding();
        let binding = Arc::new(binding);
        let (tx, rx) = watch::channel(Some(PathBuf::from("/py/a")));

        let task = tokio::spawn(Arc::clone(&binding).follow_interpreter(rx));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(binding.interpreter(), Some(PathBuf::from("/py/a")));

        tx.send(Some(PathBuf::from("/py/b"))).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(binding.interpreter(), Some(PathBuf::from("/py/b")));

        drop(tx);
        task.await.unwrap();
        assert_eq!(created.lock().len(), 2);
    }

    struct StuckRunner;

    #[async_trait]
    impl ToolRunner for StuckRunner {
        async fn initialize(&self) -> RunnerResult<()> {
            Ok(())
        }

        fn on_source_file_changed(&self, _event: &SourceFileChangedEvent) {}

        async fn dispose(&self) -> RunnerResult<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stuck_dispose_is_abandoned() {
        let factory = |_: &Path| -> RunnerResult<Arc<dyn ToolRunner>> { Ok(Arc::new(StuckRunner)) };
        let binding =
            RunnerBinding::new(Arc::new(factory)).with_dispose_timeout(Duration::from_millis(50));
        binding.set_interpreter(Some(PathBuf::from("/py/a"))).await.unwrap();

        let swapped = tokio::time::timeout(
            Duration::from_secs(2),
            binding.set_interpreter(Some(PathBuf::from("/py/b"))),
        )
        .await
        .expect("replacement waited on a stuck runner");

        assert!(swapped.unwrap());
        assert_eq!(binding.interpreter(), Some(PathBuf::from("/py/b")));
    }
}
