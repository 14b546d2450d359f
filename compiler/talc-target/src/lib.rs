//! The architecture size record: the one piece of target information the
//! type model needs (§4: `{address_size, default_integer_size,
//! default_float_size, boolean_size}`), plus a `Size` helper matching the
//! teacher's own `hash-target::size::Size`.

use std::fmt;

/// A byte count, kept as its own type rather than a bare `u64` so that
/// "bytes" and "bits" can't be silently confused at a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Size {
    bytes: u64,
}

impl Size {
    pub const ZERO: Self = Self { bytes: 0 };

    pub const fn from_bytes(bytes: u64) -> Self {
        Self { bytes }
    }

    /// Rounds up to the nearest whole byte.
    pub const fn from_bits(bits: u64) -> Self {
        Self { bytes: (bits + 7) / 8 }
    }

    pub const fn bytes(self) -> u64 {
        self.bytes
    }

    pub const fn bits(self) -> u64 {
        self.bytes * 8
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.bytes)
    }
}

/// Widths the type model is parameterised over. Every `AnyType::get_size`
/// and `AnyType::get_alignment` call in `talc-types` is relative to one of
/// these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchitectureSizes {
    /// Size (and natural alignment) of a pointer.
    pub address_size: Size,
    /// Size used for an un-suffixed integer literal once it is forced to
    /// commit to a concrete width (mirrors the source language's default
    /// `int`).
    pub default_integer_size: Size,
    /// Size used for an un-suffixed float literal once forced to commit.
    pub default_float_size: Size,
    /// Size (and alignment) of `bool`.
    pub boolean_size: Size,
}

impl ArchitectureSizes {
    pub const fn new(
        address_size: Size,
        default_integer_size: Size,
        default_float_size: Size,
        boolean_size: Size,
    ) -> Self {
        Self { address_size, default_integer_size, default_float_size, boolean_size }
    }
}

impl Default for ArchitectureSizes {
    /// A typical LP64 target: 8-byte pointers, `i64` default integers,
    /// `f64` default floats, 1-byte booleans.
    fn default() -> Self {
        Self::new(
            Size::from_bytes(8),
            Size::from_bytes(8),
            Size::from_bytes(8),
            Size::from_bytes(1),
        )
    }
}

/// A `{arch}-{os}-{config}` target triple, parsed loosely: only the
/// architecture component determines `ArchitectureSizes` today (`os`/
/// `config` are retained for the C emitter, which is out of this
/// repository's scope, to branch on).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub arch: String,
    pub os: String,
    pub config: String,
}

impl Target {
    pub fn from_triple(triple: &str) -> Option<Self> {
        let mut parts = triple.splitn(3, '-');
        let arch = parts.next()?.to_string();
        let os = parts.next().unwrap_or("unknown").to_string();
        let config = parts.next().unwrap_or("none").to_string();
        Some(Self { arch, os, config })
    }

    /// The size record implied by this target's architecture. Unknown
    /// architectures fall back to the LP64 default.
    pub fn sizes(&self) -> ArchitectureSizes {
        match self.arch.as_str() {
            "x86" | "i686" | "arm" | "wasm32" => ArchitectureSizes::new(
                Size::from_bytes(4),
                Size::from_bytes(4),
                Size::from_bytes(8),
                Size::from_bytes(1),
            ),
            _ => ArchitectureSizes::default(),
        }
    }
}

impl Default for Target {
    fn default() -> Self {
        Self { arch: std::env::consts::ARCH.to_string(), os: "unknown".into(), config: "none".into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bits_rounds_up() {
        assert_eq!(Size::from_bits(1).bytes(), 1);
        assert_eq!(Size::from_bits(8).bytes(), 1);
        assert_eq!(Size::from_bits(9).bytes(), 2);
    }

    #[test]
    fn target_triple_parses() {
        let t = Target::from_triple("x86_64-linux-gnu").unwrap();
        assert_eq!(t.arch, "x86_64");
        assert_eq!(t.os, "linux");
        assert_eq!(t.config, "gnu");
    }

    #[test]
    fn x86_target_is_32_bit() {
        let t = Target::from_triple("x86-linux-gnu").unwrap();
        assert_eq!(t.sizes().address_size.bytes(), 4);
    }
}
