// Human-readable error messages for Armada

use std::fmt;
use std::io::IsTerminal;
use std::path::PathBuf;

use colored::*;

/// Initialize color output based on TTY detection and NO_COLOR environment variable
fn should_use_colors() -> bool {
    // Check NO_COLOR environment variable first (https://no-color.org/)
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    // Check if stderr is a TTY (errors are typically written to stderr)
    std::io::stderr().is_terminal()
}

/// All error types in Armada
#[derive(Debug)]
pub enum ArmadaError {
    /// Structural parse errors (inventory and task sources)
    Parse(Box<ParseError>),

    /// I/O errors (missing source files, unreadable includes)
    Io {
        message: String,
        path: Option<PathBuf>,
    },

    /// Script compilation errors (unknown blocks, reserved prefixes)
    Compile {
        message: String,
        block: Option<String>,
    },

    /// Inventory errors (filter terms, name collisions)
    Inventory {
        message: String,
        suggestion: Option<String>,
    },

    /// Template file lookup errors
    Template { name: String, path: PathBuf },

    /// Per-device execution errors
    Execution {
        device: String,
        message: String,
        stderr: Option<String>,
    },

    /// Missing external dependency (the script interpreter)
    Dependency {
        message: String,
        suggestion: Option<String>,
    },
}

#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    pub file: Option<String>,
    pub line: Option<usize>,
    pub suggestion: Option<String>,
}

impl ArmadaError {
    /// Build a parse error pinned to a source file and line
    pub fn parse(message: impl Into<String>, file: &str, line: usize) -> Self {
        ArmadaError::Parse(Box::new(ParseError {
            message: message.into(),
            file: if file.is_empty() {
                None
            } else {
                Some(file.to_string())
            },
            line: Some(line),
            suggestion: None,
        }))
    }

    /// Build a parse error with a hint for the user
    pub fn parse_with_hint(
        message: impl Into<String>,
        file: &str,
        line: usize,
        hint: impl Into<String>,
    ) -> Self {
        ArmadaError::Parse(Box::new(ParseError {
            message: message.into(),
            file: if file.is_empty() {
                None
            } else {
                Some(file.to_string())
            },
            line: Some(line),
            suggestion: Some(hint.into()),
        }))
    }

    pub fn compile(message: impl Into<String>) -> Self {
        ArmadaError::Compile {
            message: message.into(),
            block: None,
        }
    }

    pub fn compile_in_block(message: impl Into<String>, block: impl Into<String>) -> Self {
        ArmadaError::Compile {
            message: message.into(),
            block: Some(block.into()),
        }
    }
}

impl std::error::Error for ArmadaError {}

impl fmt::Display for ArmadaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Set color mode based on TTY detection and NO_COLOR
        let use_colors = should_use_colors();
        if !use_colors {
            colored::control::set_override(false);
        }

        match self {
            ArmadaError::Parse(err) => {
                writeln!(f, "{}: {}", "ERROR".red().bold(), err.message)?;

                if let Some(ref file) = err.file {
                    write!(f, "  {} ", "-->".blue())?;
                    write!(f, "{}", file.cyan())?;
                    if let Some(line) = err.line {
                        write!(f, ":{}", line)?;
                    }
                    writeln!(f)?;
                }

                if let Some(ref suggestion) = err.suggestion {
                    writeln!(f)?;
                    writeln!(f, "{}: {}", "Hint".yellow().bold(), suggestion)?;
                }

                Ok(())
            }

            ArmadaError::Io { message, path } => {
                writeln!(f, "{}: {}", "I/O ERROR".red().bold(), message)?;
                if let Some(path) = path {
                    writeln!(f, "  {} {}", "Path:".dimmed(), path.display())?;
                }
                Ok(())
            }

            ArmadaError::Compile { message, block } => {
                writeln!(f, "{}: {}", "COMPILE ERROR".red().bold(), message)?;
                if let Some(block) = block {
                    writeln!(f, "  {} {}", "Block:".dimmed(), block)?;
                }
                Ok(())
            }

            ArmadaError::Inventory {
                message,
                suggestion,
            } => {
                writeln!(f, "{}: {}", "INVENTORY ERROR".red().bold(), message)?;

                if let Some(suggestion) = suggestion {
                    writeln!(f)?;
                    writeln!(f, "{}: {}", "Hint".yellow().bold(), suggestion)?;
                }

                Ok(())
            }

            ArmadaError::Template { name, path } => {
                writeln!(f, "{}: template not found: {}", "ERROR".red().bold(), name)?;
                writeln!(f, "  {} {}", "Path:".dimmed(), path.display())?;
                Ok(())
            }

            ArmadaError::Execution {
                device,
                message,
                stderr,
            } => {
                writeln!(f, "{}: {}", "EXECUTION ERROR".red().bold(), message)?;
                writeln!(f, "  {} {}", "Device:".dimmed(), device)?;

                if let Some(ref stderr) = stderr {
                    if !stderr.is_empty() {
                        writeln!(f)?;
                        writeln!(f, "  {}:", "stderr".dimmed())?;
                        for line in stderr.lines().take(10) {
                            writeln!(f, "    {}", line)?;
                        }
                    }
                }

                Ok(())
            }

            ArmadaError::Dependency {
                message,
                suggestion,
            } => {
                writeln!(f, "{}: {}", "DEPENDENCY ERROR".red().bold(), message)?;

                if let Some(suggestion) = suggestion {
                    writeln!(f)?;
                    writeln!(f, "{}: {}", "Hint".yellow().bold(), suggestion)?;
                }

                Ok(())
            }
        }
    }
}
