// Execution engine - runs generated scripts against selected devices
//
// One task per device, dispatched in inventory order and gated by a counting
// semaphore sized to the task's concurrency limit. Per-device script files
// are exclusive to their task and removed on completion, so no file locking
// is needed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::compiler::ScriptRun;
use crate::inventory::Inventory;
use crate::output::errors::ArmadaError;
use crate::output::{DeviceResult, OutputWriter, RunRecap};
use crate::script::{self, template, GeneratedScript};
use crate::task::Task;

/// Settings for a [`Runner`]
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Generate everything but never spawn the script processes
    pub dry_run: bool,
    /// Keep generated script files after the run
    pub debug: bool,
    /// Directory holding `<name>-template.tmpl` files
    pub templates_dir: PathBuf,
    /// Scratch directory for generated scripts, recreated per run
    pub work_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            dry_run: false,
            debug: false,
            templates_dir: PathBuf::from("templates"),
            work_dir: PathBuf::from("tmp"),
        }
    }
}

/// Executes one task against a filtered inventory
pub struct Runner {
    config: RunnerConfig,
    output: Arc<Mutex<OutputWriter>>,
}

impl Runner {
    pub fn new(config: RunnerConfig, output: Arc<Mutex<OutputWriter>>) -> Self {
        Runner { config, output }
    }

    /// Verify the device-interaction runtime is available. Called once
    /// before any run starts.
    pub fn check_dependencies() -> Result<(), ArmadaError> {
        which::which("expect").map(|_| ()).map_err(|_| ArmadaError::Dependency {
            message: "The 'expect' interpreter does not appear to be installed".to_string(),
            suggestion: Some("Install expect and make sure it is on PATH".to_string()),
        })
    }

    /// Run a task against every device of the (already filtered) inventory.
    ///
    /// Individual device failures are recorded in the recap and do not abort
    /// the batch; only setup problems return an error.
    pub async fn run_task(
        &self,
        task: &Task,
        inventory: &Inventory,
    ) -> Result<RunRecap, ArmadaError> {
        let start = Instant::now();
        self.prepare_work_dir()?;

        let script = script::generate(task, &self.config.templates_dir, &self.config.work_dir)?;

        let mut recap = RunRecap {
            task_name: task.meta("name").to_string(),
            touched: inventory.device_count(),
            dry_run: self.config.dry_run,
            ..Default::default()
        };

        {
            let out = self.output.lock();
            out.print_task_header(task.meta("name"), inventory.device_count());
        }

        match script {
            GeneratedScript::External(run) => {
                self.run_external(&run, task, &mut recap).await?;
            }
            GeneratedScript::Templated(base) => {
                self.run_templated(&base, task, inventory, &mut recap).await?;
                if !self.config.debug {
                    let _ = std::fs::remove_file(&base);
                }
            }
        }

        recap.total_duration = start.elapsed();
        Ok(recap)
    }

    // Direct hand-off: the whole task is one external script, run exactly
    // once with no per-device templating
    async fn run_external(
        &self,
        run: &ScriptRun,
        task: &Task,
        recap: &mut RunRecap,
    ) -> Result<(), ArmadaError> {
        let path = Path::new(&run.path);
        if !path.is_file() {
            return Err(ArmadaError::Io {
                message: format!("Script file does not exist: {}", run.path),
                path: Some(path.to_path_buf()),
            });
        }

        {
            let out = self.output.lock();
            out.print_script_run(&run.path);
        }

        let capture = self.capture_path(task, task.meta("name"));
        let start = Instant::now();
        let mut result = execute_file(
            path,
            &run.args,
            &run.path,
            "",
            self.config.dry_run,
            capture,
        )
        .await;
        result.duration = start.elapsed();

        // Unlike per-device failures, a failed hand-off aborts the task
        if result.failed {
            return Err(ArmadaError::Execution {
                device: run.path.clone(),
                message: result
                    .message
                    .unwrap_or_else(|| "script failed".to_string()),
                stderr: result.stderr,
            });
        }

        recap.record(&result);
        self.output.lock().print_device_result(&result);
        Ok(())
    }

    async fn run_templated(
        &self,
        base: &Path,
        task: &Task,
        inventory: &Inventory,
        recap: &mut RunRecap,
    ) -> Result<(), ArmadaError> {
        let limit = task.concurrent.max(1) as usize;
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut futures = Vec::new();

        for device in inventory.devices() {
            let vars = script::host_variables(inventory, device);
            let hostname = vars["hostname"].clone();

            {
                let out = self.output.lock();
                out.print_device_start(&device.name, &hostname);
                if self.config.dry_run {
                    out.print_dry_run_device(&device.name, &hostname, &vars["protocol"]);
                }
            }

            // Materialize the device-specific script
            let device_script = device_script_path(base, &device.name);
            if let Err(e) = copy_script(base, &device_script) {
                let result =
                    DeviceResult::failed(device.name.as_str(), hostname.as_str(), e.to_string());
                self.output.lock().print_device_result(&result);
                recap.record(&result);
                continue;
            }
            script::substitute_variables(&device_script, &vars)?;
            debug!(device = %device.name, script = %device_script.display(), "generated device script");

            let sem = semaphore.clone();
            let output = self.output.clone();
            let dry_run = self.config.dry_run;
            let keep_files = self.config.debug;
            let device_name = device.name.clone();
            let capture = self.capture_path(task, &device_name);

            futures.push(async move {
                let _permit = sem.acquire().await.unwrap();

                let start = Instant::now();
                let mut result =
                    execute_file(&device_script, &[], &device_name, &hostname, dry_run, capture)
                        .await;
                result.duration = start.elapsed();

                if !keep_files {
                    let _ = std::fs::remove_file(&device_script);
                }

                output.lock().print_device_result(&result);
                result
            });
        }

        for result in join_all(futures).await {
            recap.record(&result);
        }
        Ok(())
    }

    fn prepare_work_dir(&self) -> Result<(), ArmadaError> {
        let _ = std::fs::remove_dir_all(&self.config.work_dir);
        std::fs::create_dir_all(&self.config.work_dir).map_err(|e| ArmadaError::Io {
            message: format!("Failed to create work directory: {}", e),
            path: Some(self.config.work_dir.clone()),
        })
    }

    // Capture file for one device's stdout, when the task asks for it
    fn capture_path(&self, task: &Task, label: &str) -> Option<PathBuf> {
        if task.output.is_empty() {
            return None;
        }
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        Some(Path::new(&task.output).join(format!("{}-{}.out", stamp, label)))
    }
}

fn device_script_path(base: &Path, device: &str) -> PathBuf {
    PathBuf::from(format!("{}-{}.sh", base.display(), device))
}

fn copy_script(src: &Path, dst: &Path) -> Result<(), ArmadaError> {
    std::fs::copy(src, dst).map_err(|e| ArmadaError::Io {
        message: format!("Failed to copy script: {}", e),
        path: Some(dst.to_path_buf()),
    })?;
    template::make_executable(dst)
}

async fn execute_file(
    script: &Path,
    args: &[String],
    device: &str,
    hostname: &str,
    dry_run: bool,
    capture: Option<PathBuf>,
) -> DeviceResult {
    if dry_run {
        return DeviceResult::skipped(device, hostname);
    }

    let output = match tokio::process::Command::new(script).args(args).output().await {
        Ok(output) => output,
        Err(e) => {
            return DeviceResult::failed(device, hostname, format!("Failed to run script: {}", e));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if let Some(path) = capture {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&path, &stdout) {
            warn!(path = %path.display(), "failed to write output capture: {}", e);
        }
    }

    let mut result = if output.status.success() {
        DeviceResult::ok(device, hostname)
    } else {
        DeviceResult::failed(device, hostname, format!("script exited with {}", output.status))
    };
    result.stdout = if stdout.is_empty() { None } else { Some(stdout) };
    result.stderr = if stderr.is_empty() { None } else { Some(stderr) };
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::parse_inventory;
    use crate::output::OutputFormat;
    use crate::task::parse_task;
    use pretty_assertions::assert_eq;

    fn quiet_output() -> Arc<Mutex<OutputWriter>> {
        Arc::new(Mutex::new(OutputWriter::new(OutputFormat::Text, false, true)))
    }

    fn runner(dir: &Path, dry_run: bool, debug: bool) -> Runner {
        Runner::new(
            RunnerConfig {
                dry_run,
                debug,
                templates_dir: dir.join("templates"),
                work_dir: dir.join("tmp"),
            },
            quiet_output(),
        )
    }

    fn write_template(dir: &Path, content: &str) {
        let templates = dir.join("templates");
        std::fs::create_dir_all(&templates).unwrap();
        std::fs::write(templates.join("expect-template.tmpl"), content).unwrap();
    }

    #[tokio::test]
    async fn test_dry_run_generates_but_never_executes() {
        let dir = tempfile::tempdir().unwrap();
        // A template that would fail loudly if it ever ran
        write_template(dir.path(), "#!/bin/sh\nexit 1\n# {{main}}");

        let task = parse_task("name: probe\ncommands: main\n    show version\n").unwrap();
        let inv = parse_inventory("[lab]\nsw1\nsw2\nsw3\n").unwrap();

        let recap = runner(dir.path(), true, false)
            .run_task(&task, &inv)
            .await
            .unwrap();

        assert_eq!(recap.touched, 3);
        assert!(recap.dry_run);
        assert!(recap.failed.is_empty());
    }

    #[tokio::test]
    async fn test_device_scripts_substitute_resolved_variables() {
        let dir = tempfile::tempdir().unwrap();
        write_template(
            dir.path(),
            "#!/bin/sh\n# user={{remote_user}} host={{hostname}}\n{{main}}",
        );

        let task =
            parse_task("name: e2e\ndevices:\n    site\ncommands: main\n    _b nil\n").unwrap();
        let inv = parse_inventory(
            "[global]\nremote_user=alice\n\n[site]\nd1 address=10.0.0.1\nd2\n",
        )
        .unwrap();
        let selected = inv.filter(&task.devices).unwrap();

        // Debug keeps the generated files around for inspection
        let recap = runner(dir.path(), true, true)
            .run_task(&task, &selected)
            .await
            .unwrap();
        assert_eq!(recap.touched, 2);

        let read_script = |device: &str| {
            let mut scripts: Vec<PathBuf> = std::fs::read_dir(dir.path().join("tmp"))
                .unwrap()
                .map(|e| e.unwrap().path())
                .filter(|p| p.to_string_lossy().ends_with(&format!("-{}.sh", device)))
                .collect();
            assert_eq!(scripts.len(), 1);
            std::fs::read_to_string(scripts.pop().unwrap()).unwrap()
        };

        assert!(read_script("d1").contains("user=alice host=10.0.0.1"));
        assert!(read_script("d2").contains("user=alice host=d2"));
    }

    #[tokio::test]
    async fn test_concurrency_gate_bounds_in_flight_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let running = dir.path().join("running");
        std::fs::create_dir_all(&running).unwrap();

        // Each script registers itself, checks how many are registered, and
        // flags a violation if the gate let too many through at once
        let template = "#!/bin/sh\nd=RUNDIR\ntouch \"$d/{{hostname}}\"\nn=$(ls \"$d\" | wc -l)\nif [ \"$n\" -gt 2 ]; then touch \"$d.violation\"; fi\nsleep 0.2\nrm \"$d/{{hostname}}\"\n# {{main}}"
            .replace("RUNDIR", &running.display().to_string());
        write_template(dir.path(), &template);

        let task =
            parse_task("name: gate\nconcurrent: 2\ncommands: main\n    _b nil\n").unwrap();
        let inv = parse_inventory("[lab]\na\nb\nc\nd\ne\nf\n").unwrap();

        let recap = runner(dir.path(), false, false)
            .run_task(&task, &inv)
            .await
            .unwrap();

        // Joined only after every device completed
        assert_eq!(recap.touched, 6);
        assert!(recap.failed.is_empty());
        assert!(!dir.path().join("running.violation").exists());
        // Every script finished and removed its marker
        assert_eq!(std::fs::read_dir(&running).unwrap().count(), 0);
        // Per-device scripts were cleaned up
        let leftovers = std::fs::read_dir(dir.path().join("tmp"))
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .path()
                    .to_string_lossy()
                    .ends_with(".sh")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_failing_device_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        write_template(
            dir.path(),
            "#!/bin/sh\necho failing for {{hostname}} >&2\nexit 1\n# {{main}}",
        );

        let task = parse_task("name: doomed\ncommands: main\n    _b nil\n").unwrap();
        let inv = parse_inventory("[lab]\nsw1\nsw2\n").unwrap();

        let recap = runner(dir.path(), false, false)
            .run_task(&task, &inv)
            .await
            .unwrap();

        assert_eq!(recap.touched, 2);
        assert_eq!(recap.failed.len(), 2);
    }

    #[tokio::test]
    async fn test_script_run_executes_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("calls");
        let handoff = dir.path().join("push.sh");
        std::fs::write(
            &handoff,
            format!("#!/bin/sh\necho \"$1 $2\" >> {}\n", marker.display()),
        )
        .unwrap();
        template::make_executable(&handoff).unwrap();

        let task = parse_task(&format!(
            "name: handoff\ncommands: main\n    _s {} -- fast;force\n",
            handoff.display()
        ))
        .unwrap();
        let inv = parse_inventory("[lab]\nsw1\nsw2\nsw3\n").unwrap();

        let recap = runner(dir.path(), false, false)
            .run_task(&task, &inv)
            .await
            .unwrap();

        assert!(recap.failed.is_empty());
        let calls = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(calls, "fast force\n");
    }

    #[tokio::test]
    async fn test_script_run_failure_aborts_task() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = dir.path().join("push.sh");
        std::fs::write(&handoff, "#!/bin/sh\necho broken >&2\nexit 3\n").unwrap();
        template::make_executable(&handoff).unwrap();

        let task = parse_task(&format!(
            "commands: main\n    _s {}\n",
            handoff.display()
        ))
        .unwrap();
        let inv = parse_inventory("[lab]\nsw1\n").unwrap();

        let err = runner(dir.path(), false, false)
            .run_task(&task, &inv)
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(console::strip_ansi_codes(&text).contains("broken"));
    }

    #[tokio::test]
    async fn test_script_run_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let task = parse_task("commands: main\n    _s /nonexistent/push.sh\n").unwrap();
        let inv = parse_inventory("[lab]\nsw1\n").unwrap();

        let err = runner(dir.path(), false, false)
            .run_task(&task, &inv)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_output_capture_writes_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let capture_dir = dir.path().join("capture");
        write_template(dir.path(), "#!/bin/sh\necho captured-{{hostname}}\n# {{main}}");

        let task = parse_task(&format!(
            "name: capture\noutput: {}\ncommands: main\n    _b nil\n",
            capture_dir.display()
        ))
        .unwrap();
        let inv = parse_inventory("[lab]\nsw1\n").unwrap();

        runner(dir.path(), false, false)
            .run_task(&task, &inv)
            .await
            .unwrap();

        let entries: Vec<_> = std::fs::read_dir(&capture_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1);
        let content = std::fs::read_to_string(&entries[0]).unwrap();
        assert_eq!(content, "captured-sw1\n");
    }
}
