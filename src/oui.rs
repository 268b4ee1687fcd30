//! MAC vendor lookup over an OUI (Organizationally Unique Identifier) table.
//!
//! The table uses the flat layout shipped with LuCI's traffic views:
//! `["0050C2", 24, "IEEE Registration Authority", "0050C2000", 36, "T.L.S. Corp.", ...]`.
//! Prefixes are left-aligned hex strings; the second element is the number of
//! significant bits out of 48.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::{MonitorError, Result};

pub const MAC_BITS: u8 = 48;
const MAC_MAX: u64 = (1 << MAC_BITS) - 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OuiEntry {
    pub prefix: u64,
    pub bits: u8,
    pub vendor: String,
}

impl OuiEntry {
    pub fn new(prefix: u64, bits: u8, vendor: impl Into<String>) -> Self {
        Self {
            prefix: prefix & MAC_MAX,
            bits: bits.min(MAC_BITS),
            vendor: vendor.into(),
        }
    }

    /// Parses a left-aligned hex prefix such as `"0050C2"` or `"0050C2000"`.
    pub fn from_hex(prefix: &str, bits: u8, vendor: impl Into<String>) -> Result<Self> {
        let digits: String = prefix.chars().filter(|c| c.is_ascii_hexdigit()).collect();
        if digits.is_empty() || digits.len() > 12 {
            return Err(MonitorError::InvalidOui(format!("bad prefix {prefix:?}")));
        }
        if bits > MAC_BITS {
            return Err(MonitorError::InvalidOui(format!(
                "prefix {prefix} has {bits} bits"
            )));
        }

        let value = u64::from_str_radix(&digits, 16)
            .map_err(|e| MonitorError::InvalidOui(format!("bad prefix {prefix:?}: {e}")))?;
        let shift = 4 * (12 - digits.len() as u32);

        Ok(Self::new(value << shift, bits, vendor))
    }

    fn masked(&self) -> u64 {
        self.prefix & mask(self.bits)
    }
}

/// 48-bit mask with the top `bits` bits set.
pub fn mask(bits: u8) -> u64 {
    let bits = bits.min(MAC_BITS);
    if bits == 0 {
        return 0;
    }
    MAC_MAX & !((1u64 << (MAC_BITS - bits)) - 1)
}

/// Reads a MAC address written with any punctuation (`aa:bb:..`, `aa-bb-..`,
/// `aabb.ccdd.eeff`) into its 48-bit value.
pub fn parse_mac(mac: &str) -> Option<u64> {
    let digits: String = mac.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if digits.is_empty() || digits.len() > 12 {
        return None;
    }
    u64::from_str_radix(&digits, 16).ok()
}

#[derive(Debug, Default, Clone)]
pub struct OuiTable {
    entries: Vec<OuiEntry>,
    // prefix length -> (masked prefix, entry index), sorted by masked prefix
    by_length: BTreeMap<u8, Vec<(u64, usize)>>,
}

impl OuiTable {
    pub fn from_entries(mut entries: Vec<OuiEntry>) -> Self {
        entries.sort_by_key(|e| e.prefix);

        let mut by_length: BTreeMap<u8, Vec<(u64, usize)>> = BTreeMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            by_length
                .entry(entry.bits)
                .or_default()
                .push((entry.masked(), idx));
        }
        for bucket in by_length.values_mut() {
            // stable, so duplicates resolve to the first entry in table order
            bucket.sort_by_key(|&(masked, _)| masked);
        }

        Self { entries, by_length }
    }

    pub fn from_flat_json(json: &str) -> Result<Self> {
        let flat: Vec<Value> = serde_json::from_str(json)?;
        if flat.len() % 3 != 0 {
            return Err(MonitorError::InvalidOui(format!(
                "{} elements is not a multiple of 3",
                flat.len()
            )));
        }

        let mut entries = Vec::with_capacity(flat.len() / 3);
        for triple in flat.chunks_exact(3) {
            let prefix = triple[0]
                .as_str()
                .ok_or_else(|| MonitorError::InvalidOui(format!("prefix {} is not a string", triple[0])))?;
            let bits = triple[1]
                .as_u64()
                .and_then(|b| u8::try_from(b).ok())
                .ok_or_else(|| MonitorError::InvalidOui(format!("bad prefix length {}", triple[1])))?;
            let vendor = triple[2]
                .as_str()
                .ok_or_else(|| MonitorError::InvalidOui(format!("vendor {} is not a string", triple[2])))?;

            entries.push(OuiEntry::from_hex(prefix, bits, vendor)?);
        }

        Ok(Self::from_entries(entries))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let table = Self::from_flat_json(&json)?;
        tracing::info!(path = %path.display(), entries = table.len(), "OUI table loaded");
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[OuiEntry] {
        &self.entries
    }

    /// Vendor of the longest registered prefix covering `mac`.
    pub fn lookup(&self, mac: &str) -> Option<&str> {
        parse_mac(mac).and_then(|value| self.lookup_value(value))
    }

    pub fn lookup_value(&self, mac: u64) -> Option<&str> {
        for (&bits, bucket) in self.by_length.iter().rev() {
            let wanted = mac & mask(bits);
            if let Ok(pos) = bucket.binary_search_by_key(&wanted, |&(masked, _)| masked) {
                // step back to the first duplicate
                let first = bucket[..pos]
                    .iter()
                    .rposition(|&(masked, _)| masked != wanted)
                    .map_or(0, |p| p + 1);
                return Some(self.entries[bucket[first].1].vendor.as_str());
            }
        }
        None
    }
}
