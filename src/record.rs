//! The on-queue record layout: a fixed header plus a tightly packed
//! argument payload, and the immutable call-site [`Metadata`] it points at.
//!
//! Grounded on `quicklog`'s `queue/log.rs::LogHeader`/`Metadata`: a
//! `#[repr(C)]` header carrying a `&'static Metadata` pointer, a timestamp,
//! and a decoder function pointer, followed by the raw argument bytes.

use crate::clock::Ticks;
use crate::codec::DecodeFn;
use crate::levels::Level;

/// Immutable, program-lifetime information about one call site. Built once
/// (conceptually by a logging macro; see [`crate::callsite`]) and shared by
/// every record that call site ever produces.
#[derive(Debug)]
pub struct Metadata {
    /// Name of the logger this call site targets (looked up in the
    /// registry by the backend; see [`crate::registry`]).
    pub logger: &'static str,
    /// Format template string, e.g. `"request {method} took {:.2}ms"`. The
    /// pattern formatter's `named_args` are derived from this string at
    /// format time by [`crate::message::Template`]; no separate field-name
    /// list needs to travel with the metadata.
    pub format_str: &'static str,
    pub file: &'static str,
    pub line: u32,
    pub function: &'static str,
    pub level: Level,
    /// Decodes this call site's packed argument tuple into a type-erased
    /// [`crate::codec::Value`] (a `Value::Seq` in declaration order).
    pub decode: DecodeFn,
}

impl Metadata {
    pub const fn new(
        logger: &'static str,
        format_str: &'static str,
        file: &'static str,
        line: u32,
        function: &'static str,
        level: Level,
        decode: DecodeFn,
    ) -> Self {
        Self { logger, format_str, file, line, function, level, decode }
    }
}

/// Fixed-size header written at the front of every record, immediately
/// followed by the encoded argument payload.
///
/// `#[repr(C)]` so its raw-byte layout in the ring is exactly what
/// [`RecordHeader::write`]/[`RecordHeader::read`] expect.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct RecordHeader {
    /// Total bytes of this record including the header itself.
    pub total_size: u32,
    /// Monotonic ticks captured by the producer at the log call.
    pub timestamp: Ticks,
    /// Address of this call site's `&'static Metadata`, stored as a raw
    /// `usize` since `Metadata` itself is not `Encode`.
    pub metadata_ptr: usize,
}

impl RecordHeader {
    pub const ENCODED_SIZE: usize = 4 + 8 + 8;

    pub fn new(payload_len: usize, timestamp: Ticks, metadata: &'static Metadata) -> Self {
        Self {
            total_size: (Self::ENCODED_SIZE + payload_len) as u32,
            timestamp,
            metadata_ptr: metadata as *const Metadata as usize,
        }
    }

    pub fn write(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.total_size.to_ne_bytes());
        buf[4..12].copy_from_slice(&self.timestamp.0.to_ne_bytes());
        buf[12..20].copy_from_slice(&(self.metadata_ptr as u64).to_ne_bytes());
    }

    /// Reads a header from the front of `buf`. `buf` must be at least
    /// [`RecordHeader::ENCODED_SIZE`] bytes.
    pub fn read(buf: &[u8]) -> Self {
        let mut total_size = [0u8; 4];
        total_size.copy_from_slice(&buf[0..4]);
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&buf[4..12]);
        let mut ptr = [0u8; 8];
        ptr.copy_from_slice(&buf[12..20]);
        Self {
            total_size: u32::from_ne_bytes(total_size),
            timestamp: Ticks(u64::from_ne_bytes(ts)),
            metadata_ptr: u64::from_ne_bytes(ptr) as usize,
        }
    }

    /// Reconstructs the `&'static Metadata` this record points at.
    ///
    /// # Safety
    /// The caller must guarantee `metadata_ptr` was produced by
    /// [`RecordHeader::new`] from a genuine `&'static Metadata` that is
    /// still valid, which holds for any header actually read back out of
    /// the queue (producers never write anything else).
    pub unsafe fn metadata(&self) -> &'static Metadata {
        unsafe { &*(self.metadata_ptr as *const Metadata) }
    }

    #[inline]
    pub fn payload_len(&self) -> usize {
        self.total_size as usize - Self::ENCODED_SIZE
    }
}
