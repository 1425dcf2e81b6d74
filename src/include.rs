// Include directive resolution for inventory and task sources
//
// A line `@path` splices the named file in place of the directive, resolving
// its own includes first. A line `@!path` runs the named executable and
// splices its standard output. Blank lines and `#` comments are dropped
// during the pass.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::output::errors::ArmadaError;

/// Which include directives a source format accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeMode {
    /// `@file` and `@!script` (inventory sources)
    FilesAndScripts,
    /// `@file` only (task sources)
    FilesOnly,
}

/// Resolves include directives into a single flattened buffer.
///
/// Each resolution owns its own chain state, so independent sources can be
/// resolved concurrently. The chain records every file entered so that a
/// file including itself, directly or through intermediaries, is rejected.
pub struct IncludeResolver {
    mode: IncludeMode,
    chain: Vec<PathBuf>,
}

impl IncludeResolver {
    pub fn new(mode: IncludeMode) -> Self {
        IncludeResolver {
            mode,
            chain: Vec::new(),
        }
    }

    /// Resolve a file on disk, splicing its includes recursively.
    pub fn resolve_file(&mut self, path: &Path) -> Result<String, ArmadaError> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if self.chain.contains(&canonical) {
            return Err(ArmadaError::Io {
                message: format!("Include cycle detected: {}", path.display()),
                path: Some(path.to_path_buf()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ArmadaError::Io {
            message: format!("Failed to read include file: {}", e),
            path: Some(path.to_path_buf()),
        })?;

        self.chain.push(canonical);
        let result = self.resolve(&content, path.parent(), &path.to_string_lossy());
        self.chain.pop();
        result
    }

    /// Resolve in-memory content. Relative include paths are joined against
    /// `base_dir`; with no base they resolve against the working directory.
    pub fn resolve(
        &mut self,
        content: &str,
        base_dir: Option<&Path>,
        source_name: &str,
    ) -> Result<String, ArmadaError> {
        let mut buf = String::new();

        for (idx, raw) in content.lines().enumerate() {
            let line_num = idx + 1;
            let line = raw.trim_start();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if !line.starts_with('@') {
                buf.push_str(raw);
                buf.push('\n');
                continue;
            }

            let rest = &line[1..];
            if rest.is_empty() {
                return Err(ArmadaError::parse(
                    "No path given for include",
                    source_name,
                    line_num,
                ));
            }

            if let Some(script) = rest.strip_prefix('!') {
                if self.mode == IncludeMode::FilesOnly {
                    return Err(ArmadaError::parse(
                        "Script includes are not allowed in task files",
                        source_name,
                        line_num,
                    ));
                }
                if script.is_empty() {
                    return Err(ArmadaError::parse(
                        "No path given for script include",
                        source_name,
                        line_num,
                    ));
                }

                let script_path = join_base(base_dir, script);
                buf.push_str(&run_script_include(&script_path)?);
                buf.push('\n');
                continue;
            }

            let inc_path = join_base(base_dir, rest);
            if !inc_path.exists() {
                return Err(ArmadaError::Io {
                    message: format!("Include file does not exist: {}", inc_path.display()),
                    path: Some(inc_path),
                });
            }
            buf.push_str(&self.resolve_file(&inc_path)?);
        }

        Ok(buf)
    }
}

fn join_base(base_dir: Option<&Path>, rel: &str) -> PathBuf {
    let rel = Path::new(rel.trim());
    if rel.is_absolute() {
        return rel.to_path_buf();
    }
    match base_dir {
        Some(dir) => dir.join(rel),
        None => rel.to_path_buf(),
    }
}

fn run_script_include(script: &Path) -> Result<String, ArmadaError> {
    debug!(script = %script.display(), "running script include");

    let output = Command::new(script).output().map_err(|e| ArmadaError::Io {
        message: format!("Failed to run include script: {}", e),
        path: Some(script.to_path_buf()),
    })?;

    if !output.status.success() {
        return Err(ArmadaError::Io {
            message: format!(
                "Include script failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            path: Some(script.to_path_buf()),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
