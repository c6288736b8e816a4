//! Invoking the dbt compiler
//!
//! Compilation produces `target/manifest.json` with compiled SQL for every
//! model. Models can be compiled one file at a time (a failing model does not
//! stop the others) or the whole project at once.

use lineagegraph_core::ProjectConfig;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Outcome of compiling model files one by one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileSummary {
    /// Model files compiled successfully (relative to the project root)
    pub compiled: Vec<PathBuf>,

    /// Model files that failed, with the compiler's error output
    pub failed: Vec<(PathBuf, String)>,
}

impl CompileSummary {
    pub fn total(&self) -> usize {
        self.compiled.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs the transformation compiler against a project
#[derive(Debug, Clone)]
pub struct ProjectCompiler {
    project_path: PathBuf,
    program: String,
}

impl ProjectCompiler {
    pub fn new(project_path: impl Into<PathBuf>, program: impl Into<String>) -> Self {
        Self {
            project_path: project_path.into(),
            program: program.into(),
        }
    }

    pub fn from_config(config: &ProjectConfig) -> Self {
        Self::new(&config.path, &config.compiler)
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    /// Every `.sql` file under `<project>/models`, relative to the project root, sorted
    pub fn discover_models(&self) -> Result<Vec<PathBuf>, CompileError> {
        let models_dir = self.project_path.join("models");
        if !models_dir.is_dir() {
            return Err(CompileError::ModelsDirMissing(models_dir));
        }

        let mut models = Vec::new();
        for entry in WalkDir::new(&models_dir).follow_links(true) {
            let entry = entry.map_err(|e| CompileError::Walk(e.to_string()))?;
            let path = entry.path();

            if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "sql") {
                let relative = path
                    .strip_prefix(&self.project_path)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| path.to_path_buf());
                models.push(relative);
            }
        }

        models.sort();
        Ok(models)
    }

    /// Compile each model file separately with `compile --select <file>`
    pub fn compile_each(&self) -> Result<CompileSummary, CompileError> {
        let models = self.discover_models()?;
        info!(count = models.len(), "Found model(s) to compile");

        let mut summary = CompileSummary::default();
        for model in models {
            let selector = model.to_string_lossy().to_string();
            debug!(model = %selector, "Compiling");

            match self.run(&["compile", "--select", &selector]) {
                Ok(()) => {
                    info!(model = %selector, "Compiled");
                    summary.compiled.push(model);
                }
                Err(e) => {
                    warn!(model = %selector, "Compilation failed: {}", e);
                    summary.failed.push((model, e.to_string()));
                }
            }
        }

        Ok(summary)
    }

    /// Compile the whole project in one invocation
    pub fn compile_all(&self) -> Result<(), CompileError> {
        info!(project = %self.project_path.display(), "Compiling project");
        self.run(&["compile"])
    }

    fn run(&self, args: &[&str]) -> Result<(), CompileError> {
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(&self.project_path)
            .output()
            .map_err(|source| CompileError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            // dbt reports most compilation errors on stdout
            let message = if stderr.is_empty() { stdout } else { stderr };

            Err(CompileError::Failed {
                status: output.status.code(),
                message,
            })
        }
    }
}

/// Compiler invocation errors
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("Models directory not found: {0}")]
    ModelsDirMissing(PathBuf),

    #[error("Failed to scan models: {0}")]
    Walk(String),

    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Compiler exited with status {status:?}: {message}")]
    Failed { status: Option<i32>, message: String },
}
