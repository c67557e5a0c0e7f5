//! Call-site identity recorded in every block header.

use std::fmt;
use std::panic::Location;

/// Placeholder for a site component that is not known.
pub const NOT_AVAILABLE: &str = "N/A";

/// File, function and line of the call that produced or checked a block.
///
/// The strings are borrowed for `'static`: they are literals from
/// `file!()`/`module_path!()`, `Location::caller()`, or C `__FILE__`/`__func__`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Provenance {
    pub file: &'static str,
    pub function: &'static str,
    pub line: u32,
    /// Zero when the caller cannot supply a column (C call sites).
    pub column: u32,
}

impl Provenance {
    #[must_use]
    pub const fn new(file: &'static str, function: &'static str, line: u32) -> Self {
        Self {
            file,
            function,
            line,
            column: 0,
        }
    }

    #[must_use]
    pub const fn with_column(mut self, column: u32) -> Self {
        self.column = column;
        self
    }

    /// Site of the caller, resolved through `#[track_caller]`.
    ///
    /// Rust has no call-site function name, so `function` is [`NOT_AVAILABLE`].
    #[must_use]
    #[track_caller]
    pub fn caller() -> Self {
        let loc: &'static Location<'static> = Location::caller();
        Self {
            file: loc.file(),
            function: NOT_AVAILABLE,
            line: loc.line(),
            column: loc.column(),
        }
    }

    /// A site with every component unknown.
    #[must_use]
    pub const fn unknown() -> Self {
        Self::new(NOT_AVAILABLE, NOT_AVAILABLE, 0)
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.file, self.function, self.line)
    }
}

/// Captures the current file, module path and line as a [`Provenance`].
#[macro_export]
macro_rules! provenance {
    () => {
        $crate::Provenance::new(file!(), module_path!(), line!()).with_column(column!())
    };
}

/// Which operation produced the current header state of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockKind {
    Allocate = 1,
    AllocateZeroed = 2,
    Reallocate = 3,
}

impl BlockKind {
    /// Name of the C entry point that produces this kind.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Allocate => "malloc",
            Self::AllocateZeroed => "calloc",
            Self::Reallocate => "realloc",
        }
    }

    #[must_use]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Allocate),
            2 => Some(Self::AllocateZeroed),
            3 => Some(Self::Reallocate),
            _ => None,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_file_function_line() {
        let site = Provenance::new("src/net.c", "open_socket", 42);
        assert_eq!(site.to_string(), "src/net.c:open_socket@42");
    }

    #[test]
    fn caller_points_at_this_file() {
        let line = line!() + 1;
        let site = Provenance::caller();
        assert!(site.file.ends_with("provenance.rs"));
        assert_eq!(site.line, line);
        assert_eq!(site.function, NOT_AVAILABLE);
        assert!(site.column > 0);
    }

    #[test]
    fn macro_records_module_path() {
        let site = crate::provenance!();
        assert_eq!(site.function, module_path!());
        assert!(site.file.ends_with("provenance.rs"));
    }

    #[test]
    fn kind_byte_round_trip_rejects_garbage() {
        for kind in [
            BlockKind::Allocate,
            BlockKind::AllocateZeroed,
            BlockKind::Reallocate,
        ] {
            assert_eq!(BlockKind::from_u8(kind as u8), Some(kind));
        }
        assert_eq!(BlockKind::from_u8(0), None);
        assert_eq!(BlockKind::from_u8(0xAA), None);
    }

    #[test]
    fn kind_symbols() {
        assert_eq!(BlockKind::Allocate.to_string(), "malloc");
        assert_eq!(BlockKind::AllocateZeroed.to_string(), "calloc");
        assert_eq!(BlockKind::Reallocate.to_string(), "realloc");
    }
}
