//! Device selection for encoders.

use std::fmt;
use std::str::FromStr;

use candle_core::Device;
use serde::{Deserialize, Serialize};

use crate::error::{FewshotError, Result};

/// Device an encoder should run on.
///
/// In TOML this is `"cpu"` or `{ cuda = 0 }`; on the command line and in
/// `FEWSHOT_DEVICE` it is `cpu`, `cuda` or `cuda:N`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceRequest {
    /// Run on the CPU.
    #[default]
    Cpu,
    /// Run on the CUDA device with this ordinal.
    Cuda(usize),
}

impl DeviceRequest {
    /// Resolve the request into a candle [`Device`].
    ///
    /// # Errors
    ///
    /// [`FewshotError::Device`] if the CUDA device cannot be opened, including
    /// builds without the `cuda` feature.
    pub fn resolve(self) -> Result<Device> {
        match self {
            DeviceRequest::Cpu => Ok(Device::Cpu),
            DeviceRequest::Cuda(i) => Device::new_cuda(i)
                .map_err(|e| FewshotError::Device(format!("cuda:{i} unavailable: {e}"))),
        }
    }
}

impl fmt::Display for DeviceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRequest::Cpu => write!(f, "cpu"),
            DeviceRequest::Cuda(i) => write!(f, "cuda:{i}"),
        }
    }
}

impl FromStr for DeviceRequest {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "cpu" => Ok(DeviceRequest::Cpu),
            "cuda" | "gpu" => Ok(DeviceRequest::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|i| i.parse().ok())
                .map(DeviceRequest::Cuda)
                .ok_or_else(|| format!("unknown device '{other}', expected cpu or cuda:N")),
        }
    }
}
