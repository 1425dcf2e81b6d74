// Task file parser
//
// Root lines are `key: value` settings. A `commands:` line opens a named
// command block and a `devices:` line opens the device filter list; both
// bodies are indentation-delimited, and the first body line fixes the exact
// whitespace prefix every following line must repeat.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{CommandBlock, Task, DEFAULT_CONCURRENT, STANDARD_METADATA};
use crate::include::{IncludeMode, IncludeResolver};
use crate::output::errors::{ArmadaError, ParseError};

static LEADING_WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s+)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Root,
    Commands,
    Devices,
}

/// Parse a task file, resolving `@` includes first
pub fn parse_task_file(path: &Path) -> Result<Task, ArmadaError> {
    match path.metadata() {
        Ok(meta) if !meta.is_dir() => {}
        _ => {
            return Err(ArmadaError::Io {
                message: format!("Task file does not exist: {}", path.display()),
                path: Some(path.to_path_buf()),
            });
        }
    }

    let mut resolver = IncludeResolver::new(IncludeMode::FilesOnly);
    let resolved = resolver.resolve_file(path)?;
    TaskParser::new(&path.to_string_lossy()).parse(&resolved)
}

/// Parse a task from an in-memory string
pub fn parse_task(content: &str) -> Result<Task, ArmadaError> {
    let mut resolver = IncludeResolver::new(IncludeMode::FilesOnly);
    let resolved = resolver.resolve(content, None, "")?;
    TaskParser::new("").parse(&resolved)
}

/// One parse invocation. Each parser value owns its own mode and
/// indentation state, so task files can be parsed in parallel.
pub struct TaskParser {
    mode: Mode,
    sig_ws: String,
    current_block: String,
    file: String,
    task: Task,
}

impl TaskParser {
    pub fn new(file: &str) -> Self {
        TaskParser {
            mode: Mode::Root,
            sig_ws: String::new(),
            current_block: String::new(),
            file: file.to_string(),
            task: Task::default(),
        }
    }

    pub fn parse(mut self, content: &str) -> Result<Task, ArmadaError> {
        for (idx, raw) in content.lines().enumerate() {
            let line_num = idx + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            match self.mode {
                Mode::Commands => self.parse_command_line(raw, line_num)?,
                Mode::Devices => self.parse_device_line(raw, line_num)?,
                Mode::Root => self.parse_root_line(trimmed, line_num)?,
            }
        }

        self.finish()
    }

    fn parse_root_line(&mut self, line: &str, line_num: usize) -> Result<(), ArmadaError> {
        self.mode = Mode::Root;

        let (key, value) = line.split_once(':').ok_or_else(|| {
            ArmadaError::parse("Malformed line in task file", &self.file, line_num)
        })?;
        let value = value.trim();

        match normalize_key(key).as_str() {
            "Commands" => return self.start_command_block(value, line_num),
            "Devices" => {
                self.mode = Mode::Devices;
                return Ok(());
            }
            "Concurrent" => {
                if self.task.concurrent > 0 {
                    return Err(self.redeclared(key, line_num));
                }
                self.task.concurrent = value.parse().map_err(|_| {
                    ArmadaError::parse(
                        format!("Expected integer for setting '{}'", key),
                        &self.file,
                        line_num,
                    )
                })?;
                return Ok(());
            }
            "Template" => return self.set_string_field(|t| &mut t.template, key, value, line_num),
            "Prompt" => return self.set_string_field(|t| &mut t.prompt, key, value, line_num),
            "Inventory" => {
                return self.set_string_field(|t| &mut t.inventory, key, value, line_num)
            }
            "Output" => return self.set_string_field(|t| &mut t.output, key, value, line_num),
            "DefaultCommandBlock" => {
                return self.set_string_field(|t| &mut t.default_block, key, value, line_num)
            }
            _ => {}
        }

        // Custom data
        if let Some(custom) = key.strip_prefix('$') {
            self.task
                .metadata
                .insert(format!("_{}", custom), value.to_string());
            return Ok(());
        }

        // Standard metadata
        if STANDARD_METADATA.contains(&key) {
            self.task.metadata.insert(key.to_string(), value.to_string());
            return Ok(());
        }

        Err(ArmadaError::parse(
            format!("Invalid setting \"{}\"", key),
            &self.file,
            line_num,
        ))
    }

    fn set_string_field(
        &mut self,
        field: impl Fn(&mut Task) -> &mut String,
        key: &str,
        value: &str,
        line_num: usize,
    ) -> Result<(), ArmadaError> {
        if !field(&mut self.task).is_empty() {
            return Err(self.redeclared(key, line_num));
        }
        *field(&mut self.task) = value.to_string();
        Ok(())
    }

    fn redeclared(&self, key: &str, line_num: usize) -> ArmadaError {
        ArmadaError::parse(
            format!("Cannot redeclare setting '{}'", key),
            &self.file,
            line_num,
        )
    }

    fn start_command_block(&mut self, opts: &str, line_num: usize) -> Result<(), ArmadaError> {
        let pieces: Vec<&str> = opts.split(' ').collect();

        // A bare `commands:` opens the unnamed default block
        let (name, settings_start) = if !pieces[0].contains('=') {
            (pieces[0].to_string(), 1)
        } else {
            (String::new(), 0)
        };

        if self.task.blocks.contains_key(&name) {
            return Err(ArmadaError::parse(
                format!("commands block with name '{}' already exists", name),
                &self.file,
                line_num,
            ));
        }

        let mut block = CommandBlock::new(&name);

        for setting in &pieces[settings_start.min(pieces.len())..] {
            let Some((key, value)) = setting.split_once('=') else {
                continue;
            };

            let slot = match title_case(key).as_str() {
                "Type" => &mut block.kind,
                "Template" => &mut block.template,
                _ => {
                    return Err(ArmadaError::parse(
                        format!("Invalid block setting \"{}\"", key),
                        &self.file,
                        line_num,
                    ));
                }
            };
            if !slot.is_empty() {
                return Err(self.redeclared(key, line_num));
            }
            *slot = value.to_string();
        }

        self.task.blocks.insert(name.clone(), block);
        self.current_block = name;
        self.mode = Mode::Commands;
        Ok(())
    }

    fn parse_command_line(&mut self, raw: &str, line_num: usize) -> Result<(), ArmadaError> {
        let Some(ws) = leading_whitespace(raw) else {
            // An unindented line ends the block and is a root line again
            return self.parse_root_line(raw.trim(), line_num);
        };

        if let Some(block) = self.task.blocks.get_mut(&self.current_block) {
            if block.commands.is_empty() {
                self.sig_ws = ws.to_string();
            } else if ws != self.sig_ws {
                return Err(ArmadaError::parse(
                    "Command not in block, check indentation",
                    &self.file,
                    line_num,
                ));
            }
            block.commands.push(raw.trim().to_string());
        }
        Ok(())
    }

    fn parse_device_line(&mut self, raw: &str, line_num: usize) -> Result<(), ArmadaError> {
        let Some(ws) = leading_whitespace(raw) else {
            return self.parse_root_line(raw.trim(), line_num);
        };

        if self.task.devices.is_empty() {
            self.sig_ws = ws.to_string();
        } else if ws != self.sig_ws {
            return Err(ArmadaError::parse(
                "Device not in block, check indentation",
                &self.file,
                line_num,
            ));
        }
        self.task.devices.push(raw.trim().to_string());
        Ok(())
    }

    fn finish(mut self) -> Result<Task, ArmadaError> {
        if self.task.concurrent <= 0 {
            self.task.concurrent = DEFAULT_CONCURRENT;
        }

        // Resolve the entry block: an explicit default, the unnamed block,
        // or "main"
        if !self.task.default_block.is_empty() {
            if !self.task.blocks.contains_key(&self.task.default_block) {
                return Err(self.missing_entry(format!(
                    "Default command block '{}' not declared",
                    self.task.default_block
                )));
            }
        } else if self.task.blocks.contains_key("") {
            // Unnamed block is the entry
        } else if self.task.blocks.contains_key("main") {
            self.task.default_block = "main".to_string();
        } else {
            return Err(self.missing_entry("No entry command block declared".to_string()));
        }

        Ok(self.task)
    }

    fn missing_entry(&self, message: String) -> ArmadaError {
        ArmadaError::Parse(Box::new(ParseError {
            message,
            file: if self.file.is_empty() {
                None
            } else {
                Some(self.file.clone())
            },
            line: None,
            suggestion: Some("Declare a 'commands:' or 'commands: main' block".to_string()),
        }))
    }
}

/// Lowercase, Title-case each word, strip spaces: "default command block"
/// becomes "DefaultCommandBlock"
fn normalize_key(key: &str) -> String {
    key.to_lowercase()
        .split_whitespace()
        .map(title_case)
        .collect()
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn leading_whitespace(line: &str) -> Option<&str> {
    LEADING_WS_RE.find(line).map(|m| m.as_str())
}
