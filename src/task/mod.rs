// Task module - parsed task files and their command blocks

mod parser;

pub use parser::{parse_task, parse_task_file, TaskParser};

use std::collections::HashMap;

/// Concurrency limit applied when a task does not set one
pub const DEFAULT_CONCURRENT: i32 = 300;

/// Prompt used for send/expect wrapping when a task does not set one
pub const DEFAULT_PROMPT: &str = "#";

/// Metadata keys accepted without a `$` prefix
pub const STANDARD_METADATA: &[&str] = &["name", "description", "author", "date", "version"];

/// A parsed task file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Task {
    /// Standard metadata plus custom `$key` entries (stored as `_key`)
    pub metadata: HashMap<String, String>,

    pub concurrent: i32,
    pub template: String,
    pub prompt: String,

    pub inventory: String,
    /// Directory for per-device stdout capture, empty to disable
    pub output: String,
    /// Group/device filter terms from the devices block
    pub devices: Vec<String>,

    /// Entry block name. Resolved by the parser: an explicit setting, the
    /// unnamed block, or "main".
    pub default_block: String,
    pub blocks: HashMap<String, CommandBlock>,
}

impl Task {
    /// Look up a metadata value, empty string when unset
    pub fn meta(&self, key: &str) -> &str {
        self.metadata.get(key).map(|s| s.as_str()).unwrap_or("")
    }

    /// Store user-supplied data. Custom keys are prefixed with an underscore
    /// internally to keep them apart from the standard metadata.
    pub fn set_user_data(&mut self, key: &str, value: &str) {
        self.metadata.insert(format!("_{}", key), value.to_string());
    }

    /// Name of the command block execution starts from
    pub fn entry_block(&self) -> &str {
        &self.default_block
    }

    pub fn block(&self, name: &str) -> Option<&CommandBlock> {
        self.blocks.get(name)
    }

    /// Prompt string for send/expect wrapping
    pub fn prompt(&self) -> &str {
        if self.prompt.is_empty() {
            DEFAULT_PROMPT
        } else {
            &self.prompt
        }
    }
}

/// A named, ordered list of command lines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandBlock {
    pub name: String,
    /// "" for send/expect wrapping, "raw" for pass-through
    pub kind: String,
    /// Per-block template override, empty to use the task template
    pub template: String,
    pub commands: Vec<String>,
}

impl CommandBlock {
    pub fn new(name: impl Into<String>) -> Self {
        CommandBlock {
            name: name.into(),
            ..Default::default()
        }
    }
}
