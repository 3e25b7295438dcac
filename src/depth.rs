//! The WebDAV `Depth` header.
//!
//! [`Depth`] is an explicit tri-state instead of a magic "unlimited" integer:
//! recursion into children consumes one level of a finite depth, leaves
//! [`Depth::Infinite`] unchanged, and stops at [`Depth::Zero`].

use crate::error::{Error, Result};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

/// How many collection levels an operation affects.
///
/// # Default
///
/// The default is [`Depth::Infinite`], the RFC 4918 default for COPY and MOVE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Depth {
    /// Only the resource itself.
    Zero,
    /// The resource and this many levels of descendants.
    Levels(NonZeroU32),
    /// The whole subtree.
    #[default]
    Infinite,
}

impl Depth {
    /// `Depth: 1`
    pub const ONE: Depth = Depth::Levels(NonZeroU32::MIN);

    /// Create a finite depth; `0` yields [`Depth::Zero`].
    pub fn levels(n: u32) -> Self {
        NonZeroU32::new(n).map_or(Depth::Zero, Depth::Levels)
    }

    /// Depth to use for the children of a collection processed at this depth.
    ///
    /// Returns `None` for [`Depth::Zero`]: children must not be touched.
    pub fn descend(self) -> Option<Depth> {
        match self {
            Depth::Zero => None,
            Depth::Levels(n) => Some(Depth::levels(n.get() - 1)),
            Depth::Infinite => Some(Depth::Infinite),
        }
    }

    /// Returns true for [`Depth::Zero`].
    pub fn is_zero(self) -> bool {
        self == Depth::Zero
    }

    /// Returns true for [`Depth::Infinite`].
    pub fn is_infinite(self) -> bool {
        self == Depth::Infinite
    }

    /// Parse a `Depth` header value (`0`, `1`, ..., or `infinity`).
    ///
    /// A missing header should be treated as [`Depth::default()`].
    pub fn parse_header(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("infinity") {
            return Ok(Depth::Infinite);
        }
        value
            .parse::<u32>()
            .map(Depth::levels)
            .map_err(|_| Error::InvalidDepthHeader(value.to_owned()))
    }
}

impl FromStr for Depth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Depth::parse_header(s)
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Depth::Zero => f.write_str("0"),
            Depth::Levels(n) => write!(f, "{n}"),
            Depth::Infinite => f.write_str("infinity"),
        }
    }
}
