// Script compiler - expands a task's command blocks into linear command text
//
// Expansion is purely textual. Three directives are understood:
//   `_c <block>`   splice another declared block
//   `_b <name>`    splice a builtin snippet ("nil" stops the current block)
//   `_s <path>`    hand the whole task off to an external script
//
// A `_s` directive anywhere in the block graph terminates compilation of the
// entire call chain, not just the block it appears in: such a task IS the
// external script.

pub mod builtins;

use crate::output::errors::ArmadaError;
use crate::task::{CommandBlock, Task};

/// The result of compiling a task's entry block
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledScript {
    /// Linear command text ready for template rendering
    Commands(String),
    /// Direct hand-off to an external script
    ScriptRun(ScriptRun),
}

/// An external script invocation from a `_s` directive
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptRun {
    pub path: String,
    pub args: Vec<String>,
}

impl ScriptRun {
    /// Split a `_s` payload into path and arguments.
    ///
    /// Form: `path` or `path -- arg1;arg2;...`
    fn parse(payload: &str) -> Result<Self, ArmadaError> {
        let (path, args) = match payload.split_once("--") {
            Some((path, rest)) => {
                let args = rest
                    .split(';')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect();
                (path.trim(), args)
            }
            None => (payload.trim(), Vec::new()),
        };

        if path.is_empty() {
            return Err(ArmadaError::compile("'_s' must have a file name"));
        }

        Ok(ScriptRun {
            path: path.to_string(),
            args,
        })
    }
}

// Internal expansion result: a script-run propagates up unchanged through
// every level of `_c` recursion
enum Expansion {
    Text(String),
    Script(String),
}

/// Compile the named command block of a task
pub fn compile(entry: &str, task: &Task) -> Result<CompiledScript, ArmadaError> {
    let block = task
        .block(entry)
        .ok_or_else(|| ArmadaError::compile(format!("Command block \"{}\" not declared", entry)))?;

    match expand(task, block)? {
        Expansion::Text(text) => Ok(CompiledScript::Commands(text)),
        Expansion::Script(payload) => Ok(CompiledScript::ScriptRun(ScriptRun::parse(&payload)?)),
    }
}

fn expand(task: &Task, block: &CommandBlock) -> Result<Expansion, ArmadaError> {
    let mut out = String::new();
    let prompt = task.prompt();

    for cmd in &block.commands {
        if let Some(payload) = cmd.strip_prefix("_s ") {
            return Ok(Expansion::Script(payload.to_string()));
        }

        if let Some(name) = cmd.strip_prefix("_c ") {
            if name == block.name {
                return Err(ArmadaError::compile_in_block(
                    format!("Cannot include self in command block '{}'", name),
                    &block.name,
                ));
            }
            let included = task.block(name).ok_or_else(|| {
                ArmadaError::compile_in_block(
                    format!("Command block not declared '{}'", name),
                    &block.name,
                )
            })?;
            match expand(task, included)? {
                Expansion::Text(text) => out.push_str(&text),
                script => return Ok(script),
            }
            continue;
        }

        if let Some(name) = cmd.strip_prefix("_b ") {
            if name == "nil" {
                return Ok(Expansion::Text(out));
            }
            let text = builtins::lookup(name).ok_or_else(|| {
                ArmadaError::compile_in_block(
                    format!("Builtin block '{}' not found", name),
                    &block.name,
                )
            })?;
            out.push_str(text);
            continue;
        }

        if cmd.starts_with('_') {
            return Err(ArmadaError::compile_in_block(
                format!("Command line cannot start with \"_\": {}", cmd),
                &block.name,
            ));
        }

        if block.kind == "raw" {
            out.push_str(cmd);
            out.push('\n');
        } else {
            // Wrap command lines with expect's send command and prompt
            let escaped = cmd.replace('"', "\\\"");
            out.push_str(&format!("send \"{}\\n\"\nexpect \"{}\"\n", escaped, prompt));
        }
    }

    Ok(Expansion::Text(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::parse_task;
    use pretty_assertions::assert_eq;

    fn compile_entry(source: &str) -> Result<CompiledScript, ArmadaError> {
        let task = parse_task(source).unwrap();
        compile(task.entry_block(), &task)
    }

    #[test]
    fn test_nil_builtin_compiles_to_empty_text() {
        let compiled = compile_entry("commands: main\n    _b nil\n").unwrap();
        assert_eq!(compiled, CompiledScript::Commands(String::new()));
    }

    #[test]
    fn test_send_expect_wrapping() {
        let compiled = compile_entry("commands: main\n    show version\n").unwrap();
        assert_eq!(
            compiled,
            CompiledScript::Commands("send \"show version\\n\"\nexpect \"#\"\n".to_string())
        );
    }

    #[test]
    fn test_prompt_override_and_quote_escaping() {
        let compiled =
            compile_entry("prompt: $\ncommands: main\n    echo \"hi\"\n").unwrap();
        assert_eq!(
            compiled,
            CompiledScript::Commands(
                "send \"echo \\\"hi\\\"\\n\"\nexpect \"$\"\n".to_string()
            )
        );
    }

    #[test]
    fn test_raw_round_trip() {
        let lines = ["set system host-name lab1", "commit", "exit"];
        let source = format!(
            "commands: main type=raw\n    {}\n    {}\n    {}\n",
            lines[0], lines[1], lines[2]
        );
        let compiled = compile_entry(&source).unwrap();
        assert_eq!(
            compiled,
            CompiledScript::Commands(format!("{}\n", lines.join("\n")))
        );
    }

    #[test]
    fn test_block_inclusion() {
        let compiled = compile_entry(
            "commands: main type=raw\n    one\n    _c extra\n    three\ncommands: extra type=raw\n    two\n",
        )
        .unwrap();
        assert_eq!(
            compiled,
            CompiledScript::Commands("one\ntwo\nthree\n".to_string())
        );
    }

    #[test]
    fn test_self_inclusion_is_error() {
        let err = compile_entry("commands: main\n    _c main\n").unwrap_err();
        assert!(err.to_string().contains("include self"));
    }

    #[test]
    fn test_unknown_block_is_error() {
        let err = compile_entry("commands: main\n    _c nope\n").unwrap_err();
        assert!(err.to_string().contains("not declared"));
    }

    #[test]
    fn test_unknown_builtin_is_error() {
        let err = compile_entry("commands: main\n    _b nope\n").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_reserved_prefix_is_error() {
        let err = compile_entry("commands: main\n    _x whatever\n").unwrap_err();
        assert!(err.to_string().contains("cannot start with"));
    }

    #[test]
    fn test_script_run_aborts_whole_chain() {
        // The _s sits in a nested block; nothing accumulated before it
        // survives
        let compiled = compile_entry(
            "commands: main type=raw\n    one\n    _c handoff\n    three\ncommands: handoff\n    _s scripts/push.sh -- fast;force\n",
        )
        .unwrap();

        assert_eq!(
            compiled,
            CompiledScript::ScriptRun(ScriptRun {
                path: "scripts/push.sh".to_string(),
                args: vec!["fast".to_string(), "force".to_string()],
            })
        );
    }

    #[test]
    fn test_script_run_without_args() {
        let compiled = compile_entry("commands: main\n    _s scripts/push.sh\n").unwrap();
        assert_eq!(
            compiled,
            CompiledScript::ScriptRun(ScriptRun {
                path: "scripts/push.sh".to_string(),
                args: Vec::new(),
            })
        );
    }

    #[test]
    fn test_script_run_requires_path() {
        let task = parse_task("commands: main\n    _s -- fast\n").unwrap();
        let err = compile(task.entry_block(), &task).unwrap_err();
        assert!(err.to_string().contains("file name"));
    }

    #[test]
    fn test_unknown_entry_block() {
        let task = parse_task("commands: main\n    show version\n").unwrap();
        let err = compile("deploy", &task).unwrap_err();
        assert!(err.to_string().contains("not declared"));
    }
}
