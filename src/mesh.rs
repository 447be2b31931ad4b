//! External mesh tool invocation.
//!
//! The mesh is built by a separate 3D tool that reads the saved graph
//! document. One blocking subprocess per graph, output captured. A failed
//! run leaves the saved graph untouched.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use log::{error, info};

use crate::config::MeshToolConfig;

/// Executable looked up on `PATH` when none is configured.
pub const DEFAULT_PROGRAM: &str = "blender";

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("mesh tool `{0}` not found on PATH")]
    ToolNotFound(String),

    #[error("failed to start mesh tool {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("mesh tool exited with {}", code.map_or("a signal".to_string(), |c| format!("code {}", c)))]
    Failed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

/// Output of a successful tool run.
#[derive(Clone, Debug)]
pub struct MeshReport {
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

#[derive(Clone, Debug)]
pub struct MeshTool {
    program: PathBuf,
    script: PathBuf,
    background: bool,
}

impl MeshTool {
    pub fn new(program: impl Into<PathBuf>, script: impl Into<PathBuf>, background: bool) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
            background,
        }
    }

    /// Resolve the tool from config, falling back to a `PATH` lookup.
    pub fn from_config(config: &MeshToolConfig) -> Result<Self, MeshError> {
        let program = match &config.program {
            Some(program) => program.clone(),
            None => find_on_path(DEFAULT_PROGRAM)
                .ok_or_else(|| MeshError::ToolNotFound(DEFAULT_PROGRAM.to_string()))?,
        };
        Ok(Self::new(program, &config.script, config.background))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// `<program> [--background] --python <script> -- -g <graph_dir> -index <i> -name <name>`
    pub fn command(&self, graph_dir: &Path, index: usize, name: &str) -> Command {
        let mut command = Command::new(&self.program);
        if self.background {
            command.arg("--background");
        }
        command
            .arg("--python")
            .arg(&self.script)
            .arg("--")
            .arg("-g")
            .arg(graph_dir)
            .arg("-index")
            .arg(index.to_string())
            .arg("-name")
            .arg(name);
        command
    }

    /// Run the tool on one saved graph and wait for it.
    pub fn run(&self, graph_dir: &Path, index: usize, name: &str) -> Result<MeshReport, MeshError> {
        info!("meshing graph {} of {} from {}", index, name, graph_dir.display());
        let started = Instant::now();

        let output = self
            .command(graph_dir, index, name)
            .output()
            .map_err(|source| MeshError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stdout.lines() {
            info!("[mesh] {}", line);
        }
        for line in stderr.lines() {
            error!("[mesh] {}", line);
        }

        if !output.status.success() {
            return Err(MeshError::Failed {
                code: output.status.code(),
                stdout,
                stderr,
            });
        }

        Ok(MeshReport {
            stdout,
            stderr,
            duration: started.elapsed(),
        })
    }
}

/// First executable named `name` in the `PATH` directories.
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths: OsString = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(command: &Command) -> Vec<String> {
        command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_command_line_layout() {
        let tool = MeshTool::new("blender", "src/blender.py", true);
        let command = tool.command(Path::new("data/run"), 3, "run");
        assert_eq!(command.get_program(), "blender");
        assert_eq!(
            args(&command),
            vec!["--background", "--python", "src/blender.py", "--", "-g", "data/run", "-index", "3", "-name", "run"]
        );
    }

    #[test]
    fn test_foreground_omits_background_flag() {
        let tool = MeshTool::new("blender", "mesh.py", false);
        let command = tool.command(Path::new("g"), 0, "n");
        assert_eq!(args(&command)[0], "--python");
    }

    #[test]
    fn test_configured_program_is_used_as_is() {
        let config = MeshToolConfig {
            program: Some(PathBuf::from("/opt/tool/bin/mesher")),
            ..Default::default()
        };
        let tool = MeshTool::from_config(&config).unwrap();
        assert_eq!(tool.program(), Path::new("/opt/tool/bin/mesher"));
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_run() {
        let tool = MeshTool::new("true", "unused.py", true);
        assert!(tool.run(Path::new("."), 0, "ok").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit_is_reported() {
        let tool = MeshTool::new("false", "unused.py", true);
        let err = tool.run(Path::new("."), 0, "fail").unwrap_err();
        assert!(matches!(err, MeshError::Failed { code: Some(1), .. }));
    }

    #[test]
    fn test_missing_program_fails_to_spawn() {
        let tool = MeshTool::new("/nonexistent/mesh-tool-binary", "unused.py", true);
        let err = tool.run(Path::new("."), 0, "missing").unwrap_err();
        assert!(matches!(err, MeshError::Spawn { .. }));
    }

    #[test]
    fn test_path_lookup_misses_unknown_tool() {
        assert!(find_on_path("definitely-not-a-real-mesh-tool").is_none());
    }
}
