//! Guarded block layout: header, payload, footer.
//!
//! All reads and writes of block metadata go through this module. The
//! metadata record and the footer are accessed unaligned; the header marker
//! always occupies the 8 bytes immediately before the payload.

use std::mem::size_of;
use std::ptr;

use crate::fault::{GuardFault, GuardOp};
use crate::provenance::{BlockKind, Provenance};

/// Length of the corruption marker, in bytes.
pub const MARKER_LEN: usize = 8;

/// Canonical marker written in front of and behind every payload.
pub const MARKER: [u8; MARKER_LEN] = [0xAA, 0xBB, 0xCC, 0xDD, 0x55, 0x77, 0x88, 0x99];

/// Alignment the platform `malloc` guarantees for every raw block.
pub const RAW_ALIGN: usize = 2 * size_of::<usize>();

/// Bytes in front of the payload. A multiple of [`RAW_ALIGN`], so the
/// payload is as aligned as the raw block.
pub const HEADER_SIZE: usize = round_up(size_of::<BlockMeta>() + MARKER_LEN, RAW_ALIGN);

/// Bytes behind the payload.
pub const FOOTER_SIZE: usize = MARKER_LEN;

const MARKER_OFFSET: usize = HEADER_SIZE - MARKER_LEN;

const fn round_up(n: usize, to: usize) -> usize {
    n.div_ceil(to) * to
}

const _: () = assert!(HEADER_SIZE % RAW_ALIGN == 0);
const _: () = assert!(size_of::<BlockMeta>() <= MARKER_OFFSET);

/// Header fields in front of the marker.
///
/// `kind` is kept as a raw byte: a header whose marker survived but whose
/// body was hit must not produce an invalid enum value.
#[derive(Clone, Copy)]
#[repr(C)]
struct BlockMeta {
    origin: Provenance,
    payload_size: usize,
    kind: u8,
}

/// Validated view of a live block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Start of the raw allocation (header included).
    pub raw: *mut u8,
    /// Caller-visible pointer, `raw + HEADER_SIZE`.
    pub payload: *mut u8,
    pub payload_size: usize,
    /// `HEADER_SIZE + payload_size + FOOTER_SIZE`.
    pub raw_size: usize,
    pub kind: Option<BlockKind>,
    /// Site that produced the current header state.
    pub origin: Provenance,
}

/// Raw allocation size for a payload of `size` bytes.
///
/// Wraps on overflow; callers of the allocator must keep sizes sane.
#[must_use]
pub const fn raw_size_for(size: usize) -> usize {
    HEADER_SIZE.wrapping_add(size).wrapping_add(FOOTER_SIZE)
}

/// Raw block pointer for a payload pointer.
#[must_use]
pub fn raw_of(payload: *const u8) -> *mut u8 {
    payload.wrapping_sub(HEADER_SIZE).cast_mut()
}

/// Writes header and footer into a fresh raw block and returns the payload.
///
/// # Safety
///
/// `raw` must be valid for writes of `raw_size_for(size)` bytes.
pub unsafe fn seal(raw: *mut u8, size: usize, kind: BlockKind, origin: Provenance) -> *mut u8 {
    let meta = BlockMeta {
        origin,
        payload_size: size,
        kind: kind as u8,
    };
    // SAFETY: the caller guarantees `raw` spans header, payload and footer;
    // every write below stays inside that span.
    unsafe {
        ptr::write_unaligned(raw.cast::<BlockMeta>(), meta);
        ptr::copy_nonoverlapping(MARKER.as_ptr(), raw.add(MARKER_OFFSET), MARKER_LEN);
        let payload = raw.add(HEADER_SIZE);
        ptr::copy_nonoverlapping(MARKER.as_ptr(), payload.add(size), MARKER_LEN);
        payload
    }
}

/// Checks both markers of the block behind `payload`.
///
/// The footer is only located after the header marker has matched; a broken
/// header yields [`GuardFault::HeaderCorrupted`] without reading any other
/// header field.
///
/// # Safety
///
/// `payload` must be non-null and the `HEADER_SIZE` bytes before it must be
/// readable. If the header marker matches, the recorded payload size must
/// describe readable memory (true for every block this crate sealed).
pub unsafe fn inspect(
    payload: *const u8,
    op: GuardOp,
    site: Provenance,
) -> Result<BlockInfo, GuardFault> {
    let raw = raw_of(payload);

    // SAFETY: the header span is readable per the caller contract.
    let head = unsafe { ptr::read_unaligned(raw.add(MARKER_OFFSET).cast::<[u8; MARKER_LEN]>()) };
    if head != MARKER {
        return Err(GuardFault::HeaderCorrupted {
            op,
            ptr: payload as usize,
            site,
        });
    }

    // SAFETY: header marker matched, so this is a block sealed by `seal`.
    let meta = unsafe { ptr::read_unaligned(raw.cast::<BlockMeta>()) };
    let size = meta.payload_size;
    let raw_size = raw_size_for(size);

    // SAFETY: footer sits inside the raw block described by `meta`.
    let tail = unsafe { ptr::read_unaligned(payload.add(size).cast::<[u8; MARKER_LEN]>()) };
    let kind = BlockKind::from_u8(meta.kind);
    if tail != MARKER {
        return Err(GuardFault::FooterCorrupted {
            op,
            ptr: payload as usize,
            size,
            raw_size,
            kind,
            origin: meta.origin,
            site,
        });
    }

    Ok(BlockInfo {
        raw,
        payload: payload.cast_mut(),
        payload_size: size,
        raw_size,
        kind,
        origin: meta.origin,
    })
}
