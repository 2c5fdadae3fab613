//! Runtime configuration for a [`BleInstance`](crate::BleInstance).

use std::time::Duration;

use crate::radio::ModuleRole;

/// Configuration for the BLE stack.
///
/// All fields have sensible defaults for an ESP32 running the stock AT
/// firmware; use the `with_*` methods to adjust individual values.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BleConfig {
    /// Timeout handed to the driver when polling for out-of-band notifications.
    pub poll_timeout_ms: u32,
    /// Whether a single poll should drain every pending notification.
    pub poll_all: bool,
    /// Maximum number of primary services fetched per discovery.
    pub max_discovered_services: usize,
    /// Maximum number of characteristics fetched per discovered service.
    pub max_discovered_characteristics: usize,
    /// Size of the scratch buffer used for client reads.
    pub read_buffer_size: usize,
    /// Role the module is initialized with.
    pub module_role: ModuleRole,
    /// Prefer the OS/hardware random source for the static random address.
    pub prefer_hardware_rng: bool,
}

impl BleConfig {
    /// Default poll timeout (1 ms).
    pub const DEFAULT_POLL_TIMEOUT_MS: u32 = 1;
    /// Default discovery limit, for both services and characteristics.
    pub const DEFAULT_DISCOVERY_LIMIT: usize = 8;
    /// Default client read buffer size.
    pub const DEFAULT_READ_BUFFER_SIZE: usize = 512;

    /// Set the poll timeout.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        self
    }

    /// Set the discovery limits.
    pub fn with_discovery_limits(mut self, services: usize, characteristics: usize) -> Self {
        self.max_discovered_services = services;
        self.max_discovered_characteristics = characteristics;
        self
    }

    /// Set the client read buffer size.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the module role applied during init.
    pub fn with_module_role(mut self, role: ModuleRole) -> Self {
        self.module_role = role;
        self
    }

    /// Choose whether the hardware random source is tried first.
    pub fn with_hardware_rng(mut self, prefer: bool) -> Self {
        self.prefer_hardware_rng = prefer;
        self
    }
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: Self::DEFAULT_POLL_TIMEOUT_MS,
            poll_all: false,
            max_discovered_services: Self::DEFAULT_DISCOVERY_LIMIT,
            max_discovered_characteristics: Self::DEFAULT_DISCOVERY_LIMIT,
            read_buffer_size: Self::DEFAULT_READ_BUFFER_SIZE,
            module_role: ModuleRole::Server,
            prefer_hardware_rng: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BleConfig::default();
        assert_eq!(config.poll_timeout_ms, 1);
        assert!(!config.poll_all);
        assert_eq!(config.max_discovered_services, 8);
        assert_eq!(config.read_buffer_size, 512);
        assert_eq!(config.module_role, ModuleRole::Server);
    }

    #[test]
    fn test_builder_methods() {
        let config = BleConfig::default()
            .with_poll_timeout(Duration::from_millis(20))
            .with_discovery_limits(4, 2)
            .with_module_role(ModuleRole::Client)
            .with_hardware_rng(false);

        assert_eq!(config.poll_timeout_ms, 20);
        assert_eq!(config.max_discovered_services, 4);
        assert_eq!(config.max_discovered_characteristics, 2);
        assert_eq!(config.module_role, ModuleRole::Client);
        assert!(!config.prefer_hardware_rng);
    }
}
