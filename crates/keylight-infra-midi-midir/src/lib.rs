pub mod input;
pub mod output;

pub use input::*;
pub use output::*;

use keylight_ports::types::DeviceId;

/// Stable-enough id for a port: direction, enumeration index and name.
pub(crate) fn device_id(direction: &str, index: usize, name: &str) -> DeviceId {
    DeviceId(format!("midir:{}:{}:{}", direction, index, name))
}
