// Output module for Armada

pub mod errors;
pub mod json_output;
pub mod terminal;

pub use errors::*;
pub use json_output::*;
pub use terminal::*;

/// Output format for Armada
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text output with colors
    #[default]
    Text,
    /// Machine-readable JSON output (NDJSON format)
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(()),
        }
    }
}

/// Unified output writer supporting both text and JSON formats
pub enum OutputWriter {
    Text(TerminalOutput),
    Json(JsonOutput),
}

impl OutputWriter {
    pub fn new(format: OutputFormat, verbose: bool, quiet: bool) -> Self {
        match format {
            OutputFormat::Text => OutputWriter::Text(TerminalOutput::new(verbose, quiet)),
            OutputFormat::Json => OutputWriter::Json(JsonOutput::new(verbose, quiet)),
        }
    }

    pub fn print_task_header(&self, task_name: &str, device_count: usize) {
        match self {
            OutputWriter::Text(output) => output.print_task_header(task_name, device_count),
            OutputWriter::Json(output) => output.print_task_header(task_name, device_count),
        }
    }

    pub fn print_device_start(&self, device: &str, hostname: &str) {
        match self {
            OutputWriter::Text(output) => output.print_device_start(device, hostname),
            OutputWriter::Json(output) => output.print_device_start(device, hostname),
        }
    }

    pub fn print_device_result(&self, result: &DeviceResult) {
        match self {
            OutputWriter::Text(output) => output.print_device_result(result),
            OutputWriter::Json(output) => output.print_device_result(result),
        }
    }

    pub fn print_script_run(&self, path: &str) {
        match self {
            OutputWriter::Text(output) => output.print_script_run(path),
            OutputWriter::Json(output) => output.print_script_run(path),
        }
    }

    pub fn print_dry_run_device(&self, device: &str, hostname: &str, protocol: &str) {
        match self {
            OutputWriter::Text(output) => output.print_dry_run_device(device, hostname, protocol),
            OutputWriter::Json(output) => output.print_dry_run_device(device, hostname, protocol),
        }
    }

    pub fn print_recap(&self, recap: &RunRecap) {
        match self {
            OutputWriter::Text(output) => output.print_recap(recap),
            OutputWriter::Json(output) => output.print_recap(recap),
        }
    }
}
