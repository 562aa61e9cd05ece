//! Per-call cache-control options.
//!
//! Callers steer the decision cache with a small set of flags instead of
//! ad-hoc booleans.
//!
//! | Option | Reads cache | Writes cache | Effect |
//! |--------|-------------|--------------|--------|
//! | *(none)* | yes | on miss | Reuse a matching prior decision |
//! | `IgnoreCmabCache` | no | no | Always fetch, leave the cache untouched |
//! | `ResetCmabCache` | yes | on miss | Clear every entry first, all users |
//! | `InvalidateUserCmabCache` | yes | on miss | Drop this user's entry for the rule first |
//!
//! ```
//! use cmab_cache::options::{DecideOption, DecideOptions};
//!
//! let options = DecideOption::ResetCmabCache | DecideOption::InvalidateUserCmabCache;
//! assert!(options.contains(DecideOption::ResetCmabCache));
//! assert!(!options.contains(DecideOption::IgnoreCmabCache));
//! ```

use crate::error::Error;
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// A single cache-control flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecideOption {
    /// Fetch from the prediction service without reading or writing the cache.
    IgnoreCmabCache,

    /// Clear the whole cache before the lookup.
    ResetCmabCache,

    /// Remove the calling user's entry for this rule before the lookup.
    InvalidateUserCmabCache,
}

impl DecideOption {
    pub const ALL: [DecideOption; 3] = [
        DecideOption::IgnoreCmabCache,
        DecideOption::ResetCmabCache,
        DecideOption::InvalidateUserCmabCache,
    ];

    const fn bit(self) -> u8 {
        match self {
            DecideOption::IgnoreCmabCache => 1,
            DecideOption::ResetCmabCache => 1 << 1,
            DecideOption::InvalidateUserCmabCache => 1 << 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DecideOption::IgnoreCmabCache => "IGNORE_CMAB_CACHE",
            DecideOption::ResetCmabCache => "RESET_CMAB_CACHE",
            DecideOption::InvalidateUserCmabCache => "INVALIDATE_USER_CMAB_CACHE",
        }
    }
}

impl fmt::Display for DecideOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecideOption {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DecideOption::ALL
            .into_iter()
            .find(|option| option.as_str() == s)
            .ok_or_else(|| Error::ConfigError(format!("Unknown decide option: {}", s)))
    }
}

/// Set of `DecideOption`s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DecideOptions(u8);

impl DecideOptions {
    pub const fn empty() -> Self {
        DecideOptions(0)
    }

    /// Return a copy with `option` added.
    pub const fn with(self, option: DecideOption) -> Self {
        DecideOptions(self.0 | option.bit())
    }

    pub const fn contains(&self, option: DecideOption) -> bool {
        self.0 & option.bit() != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = DecideOption> + '_ {
        DecideOption::ALL
            .into_iter()
            .filter(move |option| self.contains(*option))
    }
}

impl From<DecideOption> for DecideOptions {
    fn from(option: DecideOption) -> Self {
        DecideOptions::empty().with(option)
    }
}

impl FromIterator<DecideOption> for DecideOptions {
    fn from_iter<I: IntoIterator<Item = DecideOption>>(iter: I) -> Self {
        iter.into_iter().fold(DecideOptions::empty(), DecideOptions::with)
    }
}

impl BitOr for DecideOption {
    type Output = DecideOptions;

    fn bitor(self, rhs: DecideOption) -> DecideOptions {
        DecideOptions::from(self).with(rhs)
    }
}

impl BitOr<DecideOption> for DecideOptions {
    type Output = DecideOptions;

    fn bitor(self, rhs: DecideOption) -> DecideOptions {
        self.with(rhs)
    }
}

impl fmt::Display for DecideOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|option| option.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
