//! Runtime device discovery
//!
//! Discovers command-queue devices at runtime by scanning `/dev/ertq*` and
//! PCIe sysfs. No hardcoded device lists — queue geometry comes from sysfs
//! attributes, with published platform defaults where the driver exposes
//! none.

use crate::device::ErtDevice;
use crate::error::{ErtError, Result};
use std::path::{Path, PathBuf};

/// Xilinx PCIe vendor id, shared by every shell generation.
const XILINX_VENDOR_ID: u16 = 0x10ee;

/// Highest device node index scanned.
const MAX_NODES: usize = 16;

/// Command-queue geometry, a set of deployment parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueGeometry {
    /// Number of command slots.
    pub slot_count: usize,
    /// Bytes per slot.
    pub slot_size: usize,
    /// Minimum transfer alignment in bytes.
    pub min_alignment: u32,
}

impl Default for QueueGeometry {
    fn default() -> Self {
        Self {
            slot_count: 16,
            slot_size: 4096,
            min_alignment: 64,
        }
    }
}

impl QueueGeometry {
    /// Read geometry from the device's sysfs attributes, falling back to
    /// the platform defaults for attributes the driver does not expose.
    pub fn from_sysfs(index: usize) -> Self {
        let base = format!("/sys/class/ertq/ertq{index}");
        let defaults = Self::default();

        let read_attr = |attr: &str| -> Option<usize> {
            std::fs::read_to_string(format!("{base}/{attr}"))
                .ok()
                .and_then(|s| s.trim().parse().ok())
        };

        let geometry = Self {
            slot_count: read_attr("slot_count").unwrap_or(defaults.slot_count),
            slot_size: read_attr("slot_size").unwrap_or(defaults.slot_size),
            min_alignment: read_attr("min_alignment")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.min_alignment),
        };

        if geometry == defaults {
            tracing::debug!("ertq{index}: using default queue geometry");
        }
        geometry
    }
}

/// Information about a discovered device
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device index (0, 1, 2, ...)
    pub index: usize,

    /// Device node path (/dev/ertq0, etc.)
    pub path: PathBuf,

    /// PCIe bus address (0000:3b:00.1, etc.); `None` on platform (edge)
    /// devices where the queue is not behind PCIe.
    pub pcie_address: Option<String>,

    /// Queue geometry (discovered at runtime)
    pub geometry: QueueGeometry,
}

impl DeviceInfo {
    /// Placeholder info for a software-scheduler session with no device
    /// node behind it.
    pub fn simulated(geometry: QueueGeometry) -> Self {
        Self {
            index: 0,
            path: PathBuf::from("<sim>"),
            pcie_address: None,
            geometry,
        }
    }
}

/// Device manager for runtime discovery and access
#[derive(Debug)]
pub struct DeviceManager {
    devices: Vec<DeviceInfo>,
}

impl DeviceManager {
    /// Discover all command-queue devices on the system.
    ///
    /// Scans `/dev/ertq*` nodes and queries geometry via sysfs.
    ///
    /// # Errors
    ///
    /// Returns [`ErtError::NoDevicesFound`] if no devices are detected.
    pub fn discover() -> Result<Self> {
        tracing::info!("discovering command-queue devices...");

        let mut devices = Vec::new();

        for index in 0..MAX_NODES {
            let path = PathBuf::from(format!("/dev/ertq{index}"));
            if !path.exists() {
                continue;
            }

            tracing::debug!("found device node: {}", path.display());

            let pcie_address = Self::find_pcie_address(index);
            let geometry = QueueGeometry::from_sysfs(index);

            tracing::info!(
                "device {}: {} @ {} ({} slots x {} bytes)",
                index,
                path.display(),
                pcie_address.as_deref().unwrap_or("platform bus"),
                geometry.slot_count,
                geometry.slot_size
            );

            devices.push(DeviceInfo {
                index,
                path,
                pcie_address,
                geometry,
            });
        }

        if devices.is_empty() {
            tracing::error!("no command-queue devices found");
            return Err(ErtError::NoDevicesFound);
        }

        tracing::info!("discovered {} device(s)", devices.len());

        Ok(Self { devices })
    }

    /// Get number of discovered devices
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Get slice of all devices
    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    /// Get device info by index
    ///
    /// # Errors
    ///
    /// Returns [`ErtError::InvalidIndex`] if the index is out of bounds.
    pub fn device(&self, index: usize) -> Result<&DeviceInfo> {
        self.devices
            .iter()
            .find(|d| d.index == index)
            .ok_or(ErtError::InvalidIndex {
                index,
                count: self.devices.len(),
            })
    }

    /// Resolve a device by node path, index, or PCIe address.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing discovered matches `device`.
    pub fn resolve(&self, device: &str) -> Result<&DeviceInfo> {
        if device.starts_with("/dev/") {
            return self
                .devices
                .iter()
                .find(|d| d.path == Path::new(device))
                .ok_or_else(|| ErtError::device_not_found(device));
        }
        if let Ok(index) = device.parse::<usize>() {
            return self.device(index);
        }
        self.devices
            .iter()
            .find(|d| d.pcie_address.as_deref() == Some(device))
            .ok_or_else(|| ErtError::device_not_found(device))
    }

    /// Open device by index
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be opened or the index is
    /// invalid.
    pub fn open(&self, index: usize) -> Result<ErtDevice> {
        let info = self.device(index)?;
        ErtDevice::open(info)
    }

    /// Open first available device
    ///
    /// # Errors
    ///
    /// Returns an error if no devices are available or the device cannot be
    /// opened.
    pub fn open_first(&self) -> Result<ErtDevice> {
        let info = self.devices.first().ok_or(ErtError::NoDevicesFound)?;
        ErtDevice::open(info)
    }

    /// Find the PCIe address backing a device index.
    ///
    /// Scans `/sys/bus/pci/devices/*/` for functions with the Xilinx vendor
    /// id; `None` for platform-bus devices.
    fn find_pcie_address(device_index: usize) -> Option<String> {
        let entries = std::fs::read_dir("/sys/bus/pci/devices").ok()?;

        let mut matches = Vec::new();
        for entry in entries.flatten() {
            let vendor = Self::read_hex_sysfs(&entry.path().join("vendor"));
            if vendor == Some(XILINX_VENDOR_ID) {
                matches.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        // Sort to ensure consistent ordering
        matches.sort();
        matches.get(device_index).cloned()
    }

    /// Read a hexadecimal value from sysfs
    fn read_hex_sysfs(path: &Path) -> Option<u16> {
        let content = std::fs::read_to_string(path).ok()?;
        let trimmed = content.trim().trim_start_matches("0x");
        u16::from_str_radix(trimmed, 16).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry_is_sane() {
        let geometry = QueueGeometry::default();
        assert!(geometry.slot_size % geometry.min_alignment as usize == 0);
        assert!(geometry.slot_count > 0);
    }

    #[test]
    fn discovery_without_hardware() {
        match DeviceManager::discover() {
            Ok(manager) => {
                println!("found {} device(s)", manager.device_count());
            }
            Err(ErtError::NoDevicesFound) => {
                println!("no devices found (hardware required)");
            }
            Err(e) => {
                eprintln!("discovery error (expected if no hardware): {e}");
            }
        }
    }
}
