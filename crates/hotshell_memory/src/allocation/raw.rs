//! Byte-level helpers shared by the push paths.

use std::ptr::NonNull;

/// Bytes to skip from `address` so the result is a multiple of `alignment`.
///
/// `alignment` must be a power of two.
#[inline]
pub fn alignment_offset(address: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    let mask = alignment - 1;
    match address & mask {
        0 => 0,
        low_bits => alignment - low_bits,
    }
}

/// Fills `size` bytes at `ptr` with zeroes.
///
/// # Safety
///
/// `ptr` must be valid for writes of `size` bytes.
#[inline]
pub unsafe fn zero_size(ptr: NonNull<u8>, size: usize) {
    std::ptr::write_bytes(ptr.as_ptr(), 0, size);
}

/// Copies `source` into `dest` and returns `dest`.
///
/// # Safety
///
/// `dest` must be valid for writes of `source.len()` bytes and must not
/// overlap `source`.
#[inline]
pub unsafe fn copy(source: &[u8], dest: NonNull<u8>) -> NonNull<u8> {
    std::ptr::copy_nonoverlapping(source.as_ptr(), dest.as_ptr(), source.len());
    dest
}

/// Length of a C-style string: bytes before the first NUL, or the whole
/// slice when it has no terminator.
pub fn string_length(bytes: &[u8]) -> usize {
    bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len())
}
