// Armada - Fleet Automation for Network Devices
//
// Compiles declarative task files into per-device scripts and runs them
// against an inventory of routers and switches in parallel.

pub mod compiler;
pub mod executor;
pub mod include;
pub mod inventory;
pub mod output;
pub mod script;
pub mod task;

pub use executor::{Runner, RunnerConfig};
pub use inventory::{Device, DeviceGroup, Inventory};
pub use output::{ArmadaError, DeviceResult, OutputWriter, RunRecap, TerminalOutput};
pub use task::{CommandBlock, Task};

/// Version of the Armada tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::executor::{Runner, RunnerConfig};
    pub use crate::inventory::{parse_inventory, parse_inventory_file, Device, Inventory};
    pub use crate::output::{ArmadaError, DeviceResult, OutputWriter, RunRecap};
    pub use crate::task::{parse_task, parse_task_file, Task};
}
