//! Diagnostic channel.
//!
//! Everything here runs inside the allocator, possibly after the heap has
//! been found corrupted or exhausted, so nothing allocates: lines are
//! formatted into a fixed stack buffer and handed to `write(2)` on stderr.

use std::fmt::{self, Write as _};

use crate::config::trace_enabled;
use crate::fault::GuardFault;

/// Prefix of every line this crate writes.
pub const LINE_PREFIX: &str = "guardmalloc: ";

const LINE_CAP: usize = 1024;
const TRUNCATION_MARK: &[u8] = b"...";

/// Fixed-capacity line buffer. Output past the capacity is dropped and the
/// line ends in `...`.
pub struct StackLine {
    buf: [u8; LINE_CAP],
    len: usize,
    truncated: bool,
}

impl StackLine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: [0; LINE_CAP],
            len: 0,
            truncated: false,
        }
    }

    /// Bytes written so far, with the truncation mark and newline appended.
    #[must_use]
    pub fn finish(&mut self) -> &[u8] {
        let reserve = TRUNCATION_MARK.len() + 1;
        if self.truncated {
            self.len = self.len.min(LINE_CAP - reserve);
            self.buf[self.len..self.len + TRUNCATION_MARK.len()].copy_from_slice(TRUNCATION_MARK);
            self.len += TRUNCATION_MARK.len();
        } else if self.len == LINE_CAP {
            self.len -= 1;
        }
        self.buf[self.len] = b'\n';
        &self.buf[..=self.len]
    }
}

impl Default for StackLine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for StackLine {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = LINE_CAP - self.len;
        let take = s.len().min(room);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        if take < s.len() {
            self.truncated = true;
        }
        Ok(())
    }
}

/// Write all of `bytes` to stderr, retrying on `EINTR` and short writes.
/// Errors are dropped: there is nowhere left to report them.
pub fn write_stderr(mut bytes: &[u8]) {
    while !bytes.is_empty() {
        // SAFETY: `bytes` is a live slice; write(2) only reads from it.
        let n = unsafe { libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len()) };
        if n < 0 {
            if std::io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return;
        }
        if n == 0 {
            return;
        }
        bytes = &bytes[n as usize..];
    }
}

/// Format one prefixed line and write it to stderr.
pub fn emit(args: fmt::Arguments<'_>) {
    let mut line = StackLine::new();
    let _ = line.write_str(LINE_PREFIX);
    let _ = line.write_fmt(args);
    write_stderr(line.finish());
}

/// Per-operation trace line, only when `GUARDMALLOC_TRACE` is on.
#[inline]
pub fn trace(args: fmt::Arguments<'_>) {
    if trace_enabled() {
        emit(args);
    }
}

/// Report `fault` and abort the process.
#[cold]
#[inline(never)]
pub fn fatal(fault: GuardFault) -> ! {
    emit(format_args!("{fault}"));
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    #[test]
    fn short_line_gets_newline() {
        let mut line = StackLine::new();
        write!(line, "malloc {} bytes", 16).unwrap();
        assert_eq!(line.finish(), b"malloc 16 bytes\n");
    }

    #[test]
    fn long_line_is_truncated_with_mark() {
        let mut line = StackLine::new();
        for _ in 0..LINE_CAP {
            line.write_str("ab").unwrap();
        }
        let out = line.finish();
        assert_eq!(out.len(), LINE_CAP);
        assert!(out.ends_with(b"...\n"));
    }

    #[test]
    fn exactly_full_line_keeps_room_for_newline() {
        let mut line = StackLine::new();
        let fill = "x".repeat(LINE_CAP);
        line.write_str(&fill).unwrap();
        let out = line.finish();
        assert_eq!(out.len(), LINE_CAP);
        assert_eq!(out.last(), Some(&b'\n'));
    }

    #[test]
    fn empty_write_is_noop() {
        write_stderr(b"");
    }
}
