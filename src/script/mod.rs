// Script generation - from a parsed task to an executable base script

pub mod template;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::compiler::{self, CompiledScript, ScriptRun};
use crate::inventory::{Device, Inventory};
use crate::output::errors::ArmadaError;
use crate::task::Task;

/// A script ready for the execution engine
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedScript {
    /// Rendered base script, expanded per device before execution
    Templated(PathBuf),
    /// Direct external script invocation, run exactly once
    External(ScriptRun),
}

/// Compile a task's entry block and render it through its template.
///
/// A `_s` hand-off skips template rendering entirely.
pub fn generate(
    task: &Task,
    templates_dir: &Path,
    work_dir: &Path,
) -> Result<GeneratedScript, ArmadaError> {
    let entry = task.entry_block();

    match compiler::compile(entry, task)? {
        CompiledScript::ScriptRun(run) => Ok(GeneratedScript::External(run)),
        CompiledScript::Commands(text) => {
            // A block-level template override wins over the task template
            let block_template = task.block(entry).map(|b| b.template.as_str()).unwrap_or("");
            let name = if !block_template.is_empty() {
                block_template
            } else {
                task.template.as_str()
            };

            let template = template::find(templates_dir, name)?;
            let base = template::render(&template, &text, &task.metadata, work_dir)?;
            Ok(GeneratedScript::Templated(base))
        }
    }
}

/// Replace every `{{name}}` occurrence in a file with the given values.
///
/// Keys carrying the internal `_` custom-data prefix are matched without it.
/// Placeholders with no matching key are left alone.
pub fn substitute_variables(
    path: &Path,
    vars: &HashMap<String, String>,
) -> Result<(), ArmadaError> {
    let mut content = std::fs::read_to_string(path).map_err(|e| ArmadaError::Io {
        message: format!("Failed to read script: {}", e),
        path: Some(path.to_path_buf()),
    })?;

    for (key, value) in vars {
        let key = key.strip_prefix('_').unwrap_or(key);
        content = content.replace(&format!("{{{{{}}}}}", key), value);
    }

    std::fs::write(path, content).map_err(|e| ArmadaError::Io {
        message: format!("Failed to write script: {}", e),
        path: Some(path.to_path_buf()),
    })
}

/// Connection variables for one device, with defaults applied through the
/// inventory's resolution chain
pub fn host_variables(inventory: &Inventory, device: &Device) -> HashMap<String, String> {
    let resolve = |key: &str| inventory.resolve(device, key).unwrap_or("").to_string();
    let mut vars = HashMap::new();

    let protocol = resolve("protocol");
    vars.insert(
        "protocol".to_string(),
        if protocol.is_empty() {
            "ssh".to_string()
        } else {
            protocol
        },
    );

    let address = resolve("address");
    vars.insert(
        "hostname".to_string(),
        if address.is_empty() {
            device.name.clone()
        } else {
            address
        },
    );

    let user = resolve("remote_user");
    vars.insert(
        "remote_user".to_string(),
        if user.is_empty() { "root".to_string() } else { user },
    );

    let password = resolve("remote_password");
    vars.insert("remote_password".to_string(), password.clone());

    let enable = resolve("cisco_enable");
    vars.insert(
        "cisco_enable".to_string(),
        if enable.is_empty() { password } else { enable },
    );

    vars
}
