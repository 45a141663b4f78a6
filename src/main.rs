use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};

use dbt_project_cache::runner::RunnerResult;
use dbt_project_cache::{
    ManifestChangedEvent, ProjectCache, RunnerBinding, RunnerError, Settings,
    SourceFileChangedEvent, ToolRunner, WorkspaceWatcher, logging,
};

#[derive(Parser)]
#[command(name = "dbtpc", version)]
#[command(about = "Discover dbt projects and keep them cached while the workspace changes")]
struct Cli {
    /// Workspace root to search (repeatable, overrides configuration)
    #[arg(long = "root", global = true)]
    roots: Vec<PathBuf>,

    /// Settings file to use instead of .dbtpc/settings.toml
    #[arg(long, global = true, env = "DBTPC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .dbtpc/settings.toml in the current directory
    Init {
        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Config,

    /// List discovered project roots
    List {
        #[arg(long)]
        json: bool,
    },

    /// Show which project (and vendored package) owns a path
    Resolve {
        path: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Build the cache and keep it current until interrupted
    Watch {
        /// Quiet period after a new top-level entry, in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Print cache-changed events as JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { force } = cli.command {
        let path = Settings::init_config_file(force)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .context("failed to create settings file")?;
        println!("Created configuration at: {}", path.display());
        return Ok(());
    }

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .map_err(|e| anyhow::anyhow!("failed to load settings: {e}"))?;

    if !cli.roots.is_empty() {
        settings.workspace_roots = cli
            .roots
            .iter()
            .map(std::path::absolute)
            .collect::<std::io::Result<_>>()
            .context("cannot resolve workspace root")?;
    }

    logging::init_with_config(&settings.logging);

    match cli.command {
        // Handled before settings are loaded
        Commands::Init { .. } => {}
        Commands::Config => {
            let rendered = toml::to_string_pretty(&settings).context("failed to render settings")?;
            print!("{rendered}");
        }
        Commands::List { json } => list(&settings, json).await?,
        Commands::Resolve { path, json } => resolve(&settings, &path, json).await?,
        Commands::Watch { debounce_ms, json } => {
            if let Some(ms) = debounce_ms {
                settings.watcher.debounce_ms = ms;
            }
            run_watch(settings, json).await?;
        }
    }

    Ok(())
}

async fn list(settings: &Settings, json: bool) -> Result<()> {
    let cache = ProjectCache::from_settings(settings);
    cache.create_manifests().await?;
    let projects = cache.projects();

    if json {
        println!("{}", serde_json::to_string_pretty(&projects)?);
    } else if projects.is_empty() {
        eprintln!("No projects found");
    } else {
        for root in projects {
            println!("{}", root.display());
        }
    }
    cache.shutdown().await;
    Ok(())
}

async fn resolve(settings: &Settings, path: &Path, json: bool) -> Result<()> {
    let path = std::path::absolute(path).context("cannot resolve path")?;
    let cache = ProjectCache::from_settings(settings);
    cache.create_manifests().await?;

    let root = cache.project_root(&path);
    let package = cache.package_name(&path);

    if json {
        let value = serde_json::json!({
            "path": path,
            "project_root": root,
            "package": package,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        match &root {
            Some(root) => println!("project: {}", root.display()),
            None => println!("project: (none)"),
        }
        if let Some(package) = package {
            println!("package: {package}");
        }
    }
    cache.shutdown().await;
    Ok(())
}

async fn run_watch(settings: Settings, json: bool) -> Result<()> {
    if settings.workspace_roots.is_empty() {
        eprintln!("No workspace roots configured; pass --root or run 'dbtpc init'");
        return Ok(());
    }

    let runner = RunnerBinding::new(Arc::new(|interpreter: &Path| -> RunnerResult<Arc<dyn ToolRunner>> {
        Ok(Arc::new(LoggingRunner {
            interpreter: interpreter.to_path_buf(),
        }))
    }));
    let cache = Arc::new(
        ProjectCache::builder()
            .workspace_roots(settings.workspace_roots.clone())
            .discovery(dbt_project_cache::ProjectDiscovery::new(&settings.discovery))
            .runner(runner)
            .build(),
    );

    cache.add_provider(Arc::new(move |event: &ManifestChangedEvent| {
        if json {
            if let Ok(line) = serde_json::to_string(event) {
                println!("{line}");
            }
            return;
        }
        match event {
            ManifestChangedEvent::CacheRebuilt {
                generation,
                added,
                removed,
                project_count,
            } => println!(
                "generation {generation}: {project_count} projects (+{} -{})",
                added.len(),
                removed.len()
            ),
            ManifestChangedEvent::ProjectRefreshed { root, .. } => {
                println!("refreshed {}", root.display())
            }
        }
    }));

    if let Err(e) = cache
        .runner()
        .set_interpreter(settings.runner.interpreter.clone())
        .await
    {
        tracing::warn!("[runner] not started: {e}");
    }

    cache.rebuild_and_refresh().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let edits = forward_edits(Arc::clone(&cache), shutdown_rx.clone())?;

    let watcher_task = if settings.watcher.enabled {
        let watcher = WorkspaceWatcher::builder()
            .cache(Arc::clone(&cache))
            .debounce_ms(settings.watcher.debounce_ms)
            .tick_ms(settings.watcher.tick_ms)
            .shutdown(shutdown_rx)
            .build()?;
        Some(tokio::spawn(watcher.watch()))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    let _ = shutdown_tx.send(true);

    if let Some(task) = watcher_task {
        if let Err(e) = task.await? {
            tracing::warn!("[watcher] stopped with error: {e}");
        }
    }
    edits.abort();
    cache.shutdown().await;
    Ok(())
}

/// Forward edits of files inside projects to the tool runner.
fn forward_edits(
    cache: Arc<ProjectCache>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<tokio::task::JoinHandle<()>> {
    let (tx, mut rx) = mpsc::channel(256);
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = tx.blocking_send(res);
    })?;
    for root in cache.workspace_roots() {
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("cannot watch {}", root.display()))?;
    }

    Ok(tokio::spawn(async move {
        let _watcher = watcher;
        loop {
            tokio::select! {
                Some(res) = rx.recv() => {
                    let Ok(event) = res else { continue };
                    if !matches!(event.kind, EventKind::Modify(_)) {
                        continue;
                    }
                    for path in &event.paths {
                        let is_file = tokio::fs::metadata(path)
                            .await
                            .is_ok_and(|metadata| metadata.is_file());
                        if is_file {
                            cache.source_file_changed(path);
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }))
}

/// Tool runner that reports source edits in the log.
struct LoggingRunner {
    interpreter: PathBuf,
}

#[async_trait]
impl ToolRunner for LoggingRunner {
    async fn initialize(&self) -> RunnerResult<()> {
        tokio::fs::metadata(&self.interpreter)
            .await
            .map(|_| ())
            .map_err(|e| RunnerError::Init {
                interpreter: self.interpreter.clone(),
                reason: e.to_string(),
            })
    }

    fn on_source_file_changed(&self, event: &SourceFileChangedEvent) {
        match &event.project_root {
            Some(root) => dbt_project_cache::log_event!(
                "runner",
                "source changed",
                "{} in {}",
                event.path.display(),
                root.display()
            ),
            None => dbt_project_cache::debug_event!(
                "runner",
                "outside any project",
                "{}",
                event.path.display()
            ),
        }
    }

    async fn dispose(&self) -> RunnerResult<()> {
        Ok(())
    }
}
