//! MAC address type with safe parsing and formatting.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 48-bit Ethernet MAC address.
///
/// # Examples
///
/// ```
/// use sfc_types::MacAddress;
///
/// let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();
/// assert_eq!(mac.to_string(), "00:11:22:33:44:55");
///
/// let mac2: MacAddress = "00-11-22-33-44-55".parse().unwrap();
/// assert_eq!(mac, mac2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// The broadcast MAC address (FF:FF:FF:FF:FF:FF).
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    /// The zero/null MAC address (00:00:00:00:00:00).
    pub const ZERO: MacAddress = MacAddress([0; 6]);

    /// First octet of every synthetic address: unicast, locally administered.
    const SYNTHETIC_OUI: u8 = 0x02;

    /// Creates a new MAC address from raw bytes.
    pub const fn new(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    /// Derives the virtual address of one hop of a service path.
    ///
    /// The layout is `02:p3:p2:p1:p0:si`: the full 32-bit path id followed
    /// by the service index, so distinct `(path_id, service_index)` pairs
    /// never map to the same address.
    ///
    /// ```
    /// use sfc_types::MacAddress;
    ///
    /// let mac = MacAddress::synthetic(0x0000_2a01, 255);
    /// assert_eq!(mac.to_string(), "02:00:00:2a:01:ff");
    /// assert!(mac.is_local() && mac.is_unicast());
    /// ```
    pub const fn synthetic(path_id: u32, service_index: u8) -> Self {
        let p = path_id.to_be_bytes();
        MacAddress([Self::SYNTHETIC_OUI, p[0], p[1], p[2], p[3], service_index])
    }

    /// Returns the raw bytes of the MAC address.
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Returns true if this is a multicast address.
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Returns true if this is a unicast address.
    pub const fn is_unicast(&self) -> bool {
        !self.is_multicast()
    }

    /// Returns true if this is a locally administered address.
    pub const fn is_local(&self) -> bool {
        self.0[0] & 0x02 != 0
    }

    /// Returns true if this is the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let separator = if s.contains(':') { ':' } else { '-' };

        let parts: Vec<&str> = s.split(separator).collect();
        if parts.len() != 6 {
            return Err(ParseError::InvalidMacAddress(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(ParseError::InvalidMacAddress(s.to_string()));
            }
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseError::InvalidMacAddress(s.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> String {
        mac.to_string()
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn test_parse_colon_format() {
        let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();
        assert_eq!(mac.as_bytes(), &[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    }

    #[test]
    fn test_parse_hyphen_format() {
        let mac: MacAddress = "aa-bb-cc-dd-ee-ff".parse().unwrap();
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_invalid_format() {
        assert!("invalid".parse::<MacAddress>().is_err());
        assert!("00:11:22:33:44".parse::<MacAddress>().is_err());
        assert!("00:11:22:33:44:55:66".parse::<MacAddress>().is_err());
        assert!("gg:11:22:33:44:55".parse::<MacAddress>().is_err());
        assert!("0:11:22:33:44:5".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_serde_string_form() {
        let mac: MacAddress = serde_json::from_str("\"00:00:00:00:00:01\"").unwrap();
        assert_eq!(mac, MacAddress::new([0, 0, 0, 0, 0, 1]));
        assert!(serde_json::from_str::<MacAddress>("\"nope\"").is_err());
    }

    #[test]
    fn test_synthetic_layout() {
        let mac = MacAddress::synthetic(0x0102_0304, 0x05);
        assert_eq!(mac.as_bytes(), &[0x02, 0x01, 0x02, 0x03, 0x04, 0x05]);
        assert!(mac.is_local());
        assert!(mac.is_unicast());
    }

    #[test]
    fn test_synthetic_unique_across_concurrent_chains() {
        // Dense low path ids, sparse high ones and every service index.
        let path_ids: Vec<u32> = (0..64)
            .chain([0x00ff_ffff, 0x0100_0000, 0x7fff_ffff, u32::MAX])
            .collect();
        let mut seen = HashSet::new();
        for &path_id in &path_ids {
            for si in 0..=u8::MAX {
                assert!(
                    seen.insert(MacAddress::synthetic(path_id, si)),
                    "collision for path {path_id} index {si}"
                );
            }
        }
        assert_eq!(seen.len(), path_ids.len() * 256);
    }
}
