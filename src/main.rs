// Armada CLI - Fleet Automation for Network Devices

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use colored::*;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use armada::compiler;
use armada::executor::{Runner, RunnerConfig};
use armada::inventory::parse_inventory_file;
use armada::output::{ArmadaError, OutputFormat, OutputWriter};
use armada::task::{parse_task_file, Task};

#[derive(Parser)]
#[command(
    name = "armada",
    about = "Fleet automation for network devices",
    version,
    disable_colored_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - only show errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    output_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run task files against their inventories
    Run {
        /// Task files to run
        #[arg(required = true)]
        tasks: Vec<PathBuf>,

        /// Inventory file (overrides the task file setting)
        #[arg(short, long)]
        inventory: Option<PathBuf>,

        /// Generate everything but execute nothing; lists affected devices
        #[arg(short = 'r', long)]
        dry_run: bool,

        /// Keep generated script files and log extra internals
        #[arg(short, long)]
        debug: bool,

        /// Directory holding script templates
        #[arg(long, default_value = "templates")]
        templates: PathBuf,

        /// Extra task variables (key:value;key:value)
        #[arg(long = "var")]
        vars: Vec<String>,
    },

    /// Validate task files without executing them
    Test {
        /// Task files to check
        #[arg(required = true)]
        tasks: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("armada=warn")),
        )
        .init();

    let cli = Cli::parse();

    let output_format = OutputFormat::from_str(&cli.output_format).unwrap_or_else(|_| {
        eprintln!("Invalid output format: {}. Using 'text'.", cli.output_format);
        OutputFormat::Text
    });
    let output = Arc::new(Mutex::new(OutputWriter::new(
        output_format,
        cli.verbose,
        cli.quiet,
    )));

    let code = match cli.command {
        Commands::Run {
            tasks,
            inventory,
            dry_run,
            debug,
            templates,
            vars,
        } => {
            run_tasks(
                &tasks,
                inventory.as_deref(),
                dry_run,
                debug,
                templates,
                &vars,
                output,
                cli.quiet,
            )
            .await
        }
        Commands::Test { tasks } => test_tasks(&tasks, cli.verbose),
    };

    std::process::exit(code);
}

#[allow(clippy::too_many_arguments)]
async fn run_tasks(
    tasks: &[PathBuf],
    inventory_override: Option<&Path>,
    dry_run: bool,
    debug: bool,
    templates: PathBuf,
    var_specs: &[String],
    output: Arc<Mutex<OutputWriter>>,
    quiet: bool,
) -> i32 {
    if let Err(e) = Runner::check_dependencies() {
        eprintln!("{}", e);
        return 1;
    }

    let cli_vars = match parse_cli_vars(var_specs) {
        Ok(vars) => vars,
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };

    let runner = Runner::new(
        RunnerConfig {
            dry_run,
            debug,
            templates_dir: templates,
            work_dir: PathBuf::from("tmp"),
        },
        output.clone(),
    );

    let start = Instant::now();
    let mut code = 0;

    // A fatal error in one task file skips only that task
    for file in tasks {
        if let Err(e) = run_one(file, inventory_override, &cli_vars, &runner, &output, quiet).await
        {
            eprintln!("{}", e);
            code = 1;
        }
    }

    if !quiet {
        println!();
        println!("Execution completed in {:.2}s", start.elapsed().as_secs_f64());
    }
    code
}

async fn run_one(
    file: &Path,
    inventory_override: Option<&Path>,
    cli_vars: &[(String, String)],
    runner: &Runner,
    output: &Arc<Mutex<OutputWriter>>,
    quiet: bool,
) -> Result<(), ArmadaError> {
    let mut task = parse_task_file(file)?;

    // Inventory from the command line overrides the task file
    if let Some(inv) = inventory_override {
        task.inventory = inv.to_string_lossy().to_string();
    }
    if task.inventory.is_empty() {
        task.inventory = "inventory".to_string();
    }

    for (key, value) in cli_vars {
        task.set_user_data(key, value);
    }

    if task.devices.is_empty() {
        return Err(ArmadaError::Inventory {
            message: format!("No devices were given in task file: {}", file.display()),
            suggestion: Some("Add a 'devices:' block with group or device names".to_string()),
        });
    }

    let inventory = parse_inventory_file(Path::new(&task.inventory))?;
    let selected = inventory.filter(&task.devices)?;
    if selected.device_count() == 0 {
        if !quiet {
            println!("No devices match task {}, skipping", file.display());
        }
        return Ok(());
    }

    let recap = runner.run_task(&task, &selected).await?;
    output.lock().print_recap(&recap);
    Ok(())
}

fn test_tasks(tasks: &[PathBuf], verbose: bool) -> i32 {
    let mut code = 0;

    for file in tasks {
        match validate_task_file(file) {
            Ok(task) => {
                if verbose {
                    print_task_info(&task);
                }
                println!(
                    "The task named \"{}\" has no syntax errors.",
                    task.meta("name").bold()
                );
            }
            Err(e) => {
                eprintln!("\nErrors found in \"{}\"", file.display());
                eprintln!("{}", e);
                code = 1;
            }
        }
    }
    code
}

// Parse without touching the filesystem beyond reading sources: structure
// plus a compile of the entry block
fn validate_task_file(file: &Path) -> Result<Task, ArmadaError> {
    let task = parse_task_file(file)?;
    compiler::compile(task.entry_block(), &task)?;
    Ok(task)
}

fn print_task_info(task: &Task) {
    println!();
    println!("Information for task \"{}\"", task.meta("name"));
    println!("  Description: {}", task.meta("description"));
    println!("  Author: {}", task.meta("author"));
    println!("  Last Changed: {}", task.meta("date"));
    println!("  Version: {}", task.meta("version"));
    println!("  Concurrent Devices: {}", task.concurrent);
    println!("  Template: {}", task.template);
    println!("  Inventory File: {}", task.inventory);

    println!("  ---- Custom Data ----");
    for (key, value) in &task.metadata {
        if let Some(custom) = key.strip_prefix('_') {
            println!("  {}: {}", custom, value);
        }
    }

    println!("  ---- Devices ----");
    for device in &task.devices {
        println!("  {}", device);
    }

    println!("  ---- Command Blocks ----");
    for block in task.blocks.values() {
        println!("  Name: {}", block.name);
        println!("  Type: {}", block.kind);
        println!("  Commands:");
        for cmd in &block.commands {
            println!("     {}", cmd);
        }
        println!("  ---------------");
    }
}

fn parse_cli_vars(specs: &[String]) -> Result<Vec<(String, String)>, String> {
    let mut vars = Vec::new();

    for spec in specs {
        if spec.trim().is_empty() {
            continue;
        }
        for pair in spec.split(';') {
            let Some((key, value)) = pair.split_once(':') else {
                return Err(format!("No value given for variable '{}'", pair));
            };
            vars.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cli_vars() {
        let vars =
            parse_cli_vars(&["ticket:CHG-1;owner:netops".to_string()]).unwrap();
        assert_eq!(
            vars,
            vec![
                ("ticket".to_string(), "CHG-1".to_string()),
                ("owner".to_string(), "netops".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_cli_vars_rejects_missing_value() {
        assert!(parse_cli_vars(&["justakey".to_string()]).is_err());
    }
}
