use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The framework's `--device` selector: `cpu` or CUDA indices such as `0` or `0,1`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    Cpu,
    Cuda(Vec<u32>),
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("cpu") {
            return Ok(Device::Cpu);
        }
        let indices = s
            .split(',')
            .map(|part| part.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| format!("invalid device '{}': expected 'cpu' or indices like '0,1'", s))?;
        if indices.is_empty() {
            return Err(format!("invalid device '{}'", s));
        }
        Ok(Device::Cuda(indices))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(indices) => {
                let joined: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
                write!(f, "{}", joined.join(","))
            }
        }
    }
}

impl TryFrom<String> for Device {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}
