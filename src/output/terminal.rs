// Rich terminal output for Armada

use std::io::IsTerminal;
use std::time::Duration;

use colored::*;
use serde::Serialize;

/// Terminal output manager
pub struct TerminalOutput {
    verbose: bool,
    quiet: bool,
}

impl TerminalOutput {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        // Respect NO_COLOR (https://no-color.org/) and non-TTY stdout
        if std::env::var("NO_COLOR").is_ok() || !std::io::stdout().is_terminal() {
            colored::control::set_override(false);
        }

        TerminalOutput { verbose, quiet }
    }

    /// Print a header for a task run
    pub fn print_task_header(&self, task_name: &str, device_count: usize) {
        if self.quiet {
            return;
        }

        println!();
        println!(
            "{} {} ({} devices)",
            "TASK".green().bold(),
            task_name.cyan(),
            device_count
        );
        println!("{}", "─".repeat(60).dimmed());
    }

    /// Announce a device before its script is dispatched
    pub fn print_device_start(&self, device: &str, hostname: &str) {
        if self.quiet || !self.verbose {
            return;
        }

        println!("Configuring device {} ({})", device.bold(), hostname);
    }

    /// Print the result of one device's script
    pub fn print_device_result(&self, result: &DeviceResult) {
        if self.quiet && !result.failed {
            return;
        }

        let status = if result.failed {
            "FAILED".red().bold()
        } else if result.skipped {
            "SKIPPED".cyan()
        } else {
            "OK".green()
        };

        println!(
            "  {} {} {} ({})",
            status,
            "=>".dimmed(),
            result.device.white().bold(),
            result.hostname
        );

        if self.verbose || result.failed {
            if let Some(stdout) = &result.stdout {
                for line in stdout.lines() {
                    println!("      {}", line.dimmed());
                }
            }

            if let Some(stderr) = &result.stderr {
                for line in stderr.lines() {
                    println!("      {}", line.red());
                }
            }

            if let Some(msg) = &result.message {
                if !msg.is_empty() {
                    println!("      {}", msg);
                }
            }
        }
    }

    /// Announce a direct external script run
    pub fn print_script_run(&self, path: &str) {
        if self.quiet {
            return;
        }

        println!("Running script {}", path.cyan());
    }

    /// Dry-run listing of an affected device
    pub fn print_dry_run_device(&self, device: &str, hostname: &str, protocol: &str) {
        if self.quiet || !self.verbose {
            return;
        }

        println!("Device: {}", device.bold());
        println!("  Address: {}", hostname);
        println!("  Protocol: {}", protocol);
    }

    /// Print the run recap summary
    pub fn print_recap(&self, recap: &RunRecap) {
        if self.quiet {
            return;
        }

        println!();
        println!("{}", "RUN RECAP".green().bold());
        println!("{}", "─".repeat(60).dimmed());

        if recap.dry_run {
            println!("{}", "Dry run, no scripts were executed".yellow());
        }

        let failed = if recap.failed.is_empty() {
            format!("failed={}", recap.failed.len()).normal()
        } else {
            format!("failed={}", recap.failed.len()).red().bold()
        };
        println!(
            "{:<30} : {}    {}",
            recap.task_name.white().bold(),
            format!("touched={}", recap.touched).green(),
            failed
        );

        for device in &recap.failed {
            println!("  {} {}", "FAILED".red().bold(), device);
        }

        println!();
        println!("Total time: {:.2}s", recap.total_duration.as_secs_f64());
    }
}

/// Result of one device's script execution
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceResult {
    pub device: String,
    pub hostname: String,
    pub failed: bool,
    /// Set in dry-run mode: generated but never executed
    pub skipped: bool,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub message: Option<String>,
    #[serde(skip)]
    pub duration: Duration,
}

impl DeviceResult {
    pub fn ok(device: impl Into<String>, hostname: impl Into<String>) -> Self {
        DeviceResult {
            device: device.into(),
            hostname: hostname.into(),
            ..Default::default()
        }
    }

    pub fn skipped(device: impl Into<String>, hostname: impl Into<String>) -> Self {
        DeviceResult {
            skipped: true,
            ..DeviceResult::ok(device, hostname)
        }
    }

    pub fn failed(
        device: impl Into<String>,
        hostname: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        DeviceResult {
            failed: true,
            message: Some(message.into()),
            ..DeviceResult::ok(device, hostname)
        }
    }
}

/// Summary of one task run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunRecap {
    pub task_name: String,
    /// Devices the run touched (generated scripts for)
    pub touched: usize,
    /// Names of devices whose script failed
    pub failed: Vec<String>,
    pub dry_run: bool,
    #[serde(skip)]
    pub total_duration: Duration,
}

impl RunRecap {
    pub fn record(&mut self, result: &DeviceResult) {
        if result.failed {
            self.failed.push(result.device.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recap_records_failures() {
        let mut recap = RunRecap {
            task_name: "upgrade".to_string(),
            touched: 3,
            ..Default::default()
        };

        recap.record(&DeviceResult::ok("sw1", "10.0.0.1"));
        recap.record(&DeviceResult::failed("sw2", "10.0.0.2", "exit status 1"));

        assert_eq!(recap.failed, vec!["sw2"]);
    }
}
