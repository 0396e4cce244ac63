//! BIP32 derivation paths.
//!
//! A path such as `44'/5'/0'/0/3` identifies one key pair inside a hardware
//! wallet's derivation tree.  An apostrophe marks a *hardened* element, which
//! is encoded on the wire by setting the top bit (`0x8000_0000`).
//!
//! The collateral search space is the 10×10×10 grid below
//! `purpose'/coin'`.  [`SearchOrder`] flattens it into a single iterator so
//! that callers can check for cancellation before every candidate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bit that marks a hardened derivation element.
pub const HARDENED: u32 = 0x8000_0000;

/// BIP44 purpose element.
pub const PURPOSE: u32 = 44;

/// Registered coin type of the network's main chain.
pub const COIN_TYPE: u32 = 5;

/// Number of accounts, decades and indices-per-decade visited by the search.
pub const SEARCH_WIDTH: u32 = 10;

/// Error type for path parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("empty derivation path")]
    Empty,
    #[error("invalid path element {element:?}")]
    InvalidElement { element: String },
    #[error("path element {0} is out of range")]
    OutOfRange(u64),
}

/// A parsed BIP32 derivation path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bip32Path(Vec<u32>);

impl Bip32Path {
    /// Builds a path from raw (already hardened where needed) elements.
    pub fn from_elements(elements: Vec<u32>) -> Self {
        Self(elements)
    }

    /// Returns the raw elements.
    pub fn elements(&self) -> &[u32] {
        &self.0
    }

    /// Number of elements in the path.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// The fixed shallow path `44'/5'` whose address keys the derivation
    /// cache.  It changes whenever the device's passphrase changes.
    pub fn partition_root() -> Self {
        Self(vec![PURPOSE | HARDENED, COIN_TYPE | HARDENED])
    }

    /// The collateral path `44'/5'/account'/0/index`.
    pub fn collateral(account: u32, index: u32) -> Self {
        Self(vec![
            PURPOSE | HARDENED,
            COIN_TYPE | HARDENED,
            account | HARDENED,
            0,
            index,
        ])
    }
}

impl fmt::Display for Bip32Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            if element & HARDENED != 0 {
                write!(f, "{}'", element & !HARDENED)?;
            } else {
                write!(f, "{element}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for Bip32Path {
    type Err = PathError;

    /// Parses `44'/5'/0'/0/3`.  A leading `m/` is accepted, and `h`/`H` are
    /// accepted as hardened markers alongside the apostrophe.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix("m/")
            .or_else(|| trimmed.strip_prefix("M/"))
            .unwrap_or(trimmed);
        if body.is_empty() || body == "m" {
            return Err(PathError::Empty);
        }

        let mut elements = Vec::new();
        for raw in body.split('/') {
            let raw = raw.trim();
            let (digits, hardened) = match raw.strip_suffix(['\'', 'h', 'H']) {
                Some(d) => (d, true),
                None => (raw, false),
            };
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(PathError::InvalidElement {
                    element: raw.to_string(),
                });
            }
            let value: u64 = digits.parse().map_err(|_| PathError::InvalidElement {
                element: raw.to_string(),
            })?;
            if value >= u64::from(HARDENED) {
                return Err(PathError::OutOfRange(value));
            }
            let value = value as u32;
            elements.push(if hardened { value | HARDENED } else { value });
        }
        Ok(Self(elements))
    }
}

impl TryFrom<String> for Bip32Path {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Bip32Path> for String {
    fn from(path: Bip32Path) -> Self {
        path.to_string()
    }
}

// ── Search order ──────────────────────────────────────────────────────────────

/// Position of one candidate inside the collateral search grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSlot {
    pub account: u32,
    pub decade: u32,
    pub index: u32,
}

impl SearchSlot {
    /// Address index below the account's external chain.
    pub fn address_index(&self) -> u32 {
        self.decade * SEARCH_WIDTH + self.index
    }

    /// The derivation path of this slot.
    pub fn path(&self) -> Bip32Path {
        Bip32Path::collateral(self.account, self.address_index())
    }

    /// Zero-based position of this slot in [`SearchOrder`].
    pub fn ordinal(&self) -> usize {
        ((self.decade * SEARCH_WIDTH + self.account) * SEARCH_WIDTH + self.index) as usize
    }
}

/// Iterator over the collateral search grid.
///
/// Ten indices of account 0 are visited, then the same ten of account 1, and
/// so on to account 9; only then does the walk move on to the next decade of
/// account 0.  Collaterals usually sit at low indices of successive accounts,
/// so they surface long before a deep scan of a single account would reach
/// them.
#[derive(Debug, Clone, Default)]
pub struct SearchOrder {
    next: u32,
}

impl SearchOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of candidates in the grid.
    pub const fn len() -> usize {
        (SEARCH_WIDTH * SEARCH_WIDTH * SEARCH_WIDTH) as usize
    }
}

impl Iterator for SearchOrder {
    type Item = SearchSlot;

    fn next(&mut self) -> Option<Self::Item> {
        let width = SEARCH_WIDTH;
        if self.next >= width * width * width {
            return None;
        }
        let n = self.next;
        self.next += 1;
        Some(SearchSlot {
            decade: n / (width * width),
            account: (n / width) % width,
            index: n % width,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = Self::len() - self.next as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SearchOrder {}

// ── Tests ─────────────────────────────────────────────────────────────────────
