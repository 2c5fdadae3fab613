//! Device addresses and static random address generation.
//!
//! The host API presents addresses most-significant byte first; the radio
//! module wants them least-significant byte first. [`Address`] always holds
//! the host order, and every boundary crossing goes through
//! [`Address::from_module_order`] / [`Address::to_module_order`].

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// A 48-bit Bluetooth device address, most-significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address(pub [u8; 6]);

impl Address {
    /// Create from bytes in host order.
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Create from bytes in module order (least-significant byte first).
    pub fn from_module_order(mut bytes: [u8; 6]) -> Self {
        bytes.reverse();
        Self(bytes)
    }

    /// Bytes in module order.
    pub fn to_module_order(&self) -> [u8; 6] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }

    /// Bytes in host order.
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Check the two most-significant bits required of a static random address.
    pub fn is_static_random(&self) -> bool {
        self.0[0] & 0xC0 == 0xC0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Kind of the local device address reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
    /// Factory public address.
    Public,
    /// Static random address.
    RandomStatic,
}

/// Own address type selected through the advertising/scan parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum OwnAddressType {
    /// Use the module's public address.
    Public = 0,
    /// Use the generated static random address.
    #[default]
    Random = 1,
    /// Resolvable private address, public fallback.
    ResolvablePrivateOrPublic = 2,
    /// Resolvable private address, random fallback.
    ResolvablePrivateOrRandom = 3,
}

/// Address type of a remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PeerAddressType {
    /// Public device address.
    Public = 0,
    /// Random device address.
    Random = 1,
    /// Public identity address.
    PublicIdentity = 2,
    /// Random static identity address.
    RandomStaticIdentity = 3,
    /// Anonymous advertisement.
    #[default]
    Anonymous = 0xFF,
}

impl PeerAddressType {
    /// Create from a raw address type code.
    pub fn from_raw(value: u8) -> Self {
        match value {
            0 => Self::Public,
            1 => Self::Random,
            2 => Self::PublicIdentity,
            3 => Self::RandomStaticIdentity,
            _ => Self::Anonymous,
        }
    }
}

/// Source of analog noise used to seed address generation when no hardware
/// random source is available.
pub trait NoiseSource: Send {
    /// Take one 16-bit noise sample.
    fn read_u16(&mut self) -> u16;
}

impl<F> NoiseSource for F
where
    F: FnMut() -> u16 + Send,
{
    fn read_u16(&mut self) -> u16 {
        self()
    }
}

/// Noise taken from the low bits of the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClockNoise;

impl NoiseSource for ClockNoise {
    fn read_u16(&mut self) -> u16 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as u16)
            .unwrap_or(0)
    }
}

/// Generate a static random device address.
///
/// The hardware random source is tried first when `prefer_hardware` is set.
/// Otherwise, or if it fails, a pseudo-random generator is reseeded from a
/// fresh noise sample for each half of the address and three bytes are taken
/// from each draw.
pub fn generate_static_random(prefer_hardware: bool, noise: &mut dyn NoiseSource) -> Address {
    let mut bytes = [0u8; 6];

    let from_hardware = prefer_hardware && OsRng.try_fill_bytes(&mut bytes).is_ok();
    if !from_hardware {
        for half in bytes.chunks_mut(3) {
            let mut rng = StdRng::seed_from_u64(u64::from(noise.read_u16()));
            let draw = rng.next_u32().to_le_bytes();
            half.copy_from_slice(&draw[..3]);
        }
    }

    bytes[0] |= 0xC0;
    let address = Address(bytes);
    debug!(
        "Generated static random address {} ({})",
        address,
        if from_hardware { "hardware" } else { "noise seeded" }
    );
    address
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_order_reversal() {
        let address = Address::new([0xC1, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(address.to_module_order(), [0x06, 0x05, 0x04, 0x03, 0x02, 0xC1]);
        assert_eq!(Address::from_module_order(address.to_module_order()), address);
    }

    #[test]
    fn test_display() {
        let address = Address::new([0xC1, 0x02, 0x03, 0x04, 0x05, 0xAB]);
        assert_eq!(address.to_string(), "C1:02:03:04:05:AB");
    }

    #[test]
    fn test_generated_address_is_static_random() {
        let mut noise = || 0u16;
        let address = generate_static_random(false, &mut noise);
        assert!(address.is_static_random());

        let address = generate_static_random(true, &mut ClockNoise);
        assert!(address.is_static_random());
    }

    #[test]
    fn test_noise_seeded_generation_is_deterministic() {
        let mut samples = [0x1234u16, 0xBEEF].into_iter().cycle();
        let mut noise = move || samples.next().unwrap_or(0);
        let first = generate_static_random(false, &mut noise);
        let second = generate_static_random(false, &mut noise);
        assert_eq!(first, second);
    }

    #[test]
    fn test_noise_is_sampled_twice() {
        let mut count = 0u32;
        {
            let mut noise = || {
                count += 1;
                7u16
            };
            generate_static_random(false, &mut noise);
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn test_peer_address_type_from_raw() {
        assert_eq!(PeerAddressType::from_raw(0), PeerAddressType::Public);
        assert_eq!(PeerAddressType::from_raw(1), PeerAddressType::Random);
        assert_eq!(PeerAddressType::from_raw(9), PeerAddressType::Anonymous);
    }
}
