// JSON output for structured logging

use serde_json::json;

use super::terminal::{DeviceResult, RunRecap};

/// JSON output manager for machine-readable logging (NDJSON, one event per
/// line)
pub struct JsonOutput {
    verbose: bool,
    quiet: bool,
}

impl JsonOutput {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        JsonOutput { verbose, quiet }
    }

    pub fn print_task_header(&self, task_name: &str, device_count: usize) {
        if self.quiet {
            return;
        }

        self.emit(&json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "event": "task_start",
            "task": task_name,
            "device_count": device_count,
        }));
    }

    pub fn print_device_start(&self, device: &str, hostname: &str) {
        if self.quiet || !self.verbose {
            return;
        }

        self.emit(&json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "event": "device_start",
            "device": device,
            "hostname": hostname,
        }));
    }

    pub fn print_device_result(&self, result: &DeviceResult) {
        if self.quiet && !result.failed {
            return;
        }

        let status = if result.failed {
            "failed"
        } else if result.skipped {
            "skipped"
        } else {
            "ok"
        };

        let mut event = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "event": "device_complete",
            "device": result.device,
            "hostname": result.hostname,
            "status": status,
            "duration_ms": result.duration.as_millis() as u64,
        });

        if self.verbose || result.failed {
            if let Some(stdout) = &result.stdout {
                event["stdout"] = json!(stdout);
            }
            if let Some(stderr) = &result.stderr {
                event["stderr"] = json!(stderr);
            }
            if let Some(message) = &result.message {
                event["message"] = json!(message);
            }
        }

        self.emit(&event);
    }

    pub fn print_script_run(&self, path: &str) {
        if self.quiet {
            return;
        }

        self.emit(&json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "event": "script_run",
            "path": path,
        }));
    }

    pub fn print_dry_run_device(&self, device: &str, hostname: &str, protocol: &str) {
        if self.quiet || !self.verbose {
            return;
        }

        self.emit(&json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "event": "dry_run_device",
            "device": device,
            "hostname": hostname,
            "protocol": protocol,
        }));
    }

    pub fn print_recap(&self, recap: &RunRecap) {
        if self.quiet {
            return;
        }

        self.emit(&json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "event": "run_recap",
            "recap": recap,
            "duration_secs": recap.total_duration.as_secs_f64(),
        }));
    }

    fn emit(&self, event: &serde_json::Value) {
        println!("{}", event);
    }
}
