//! # allocator
//! The native heap the guest allocations are served from. In single-program
//! emulation the guest heap simply is the host heap, so an implementation of
//! [`HeapBackend`] only has to call the host allocator, which the shadow
//! engine has already intercepted.
//!
//! There is no `realloc`: reallocation is rebuilt from `malloc`, a copy and
//! `free`, see [`crate::Qasan::realloc`].
use core::ffi::c_int;

use crate::HostAddr;

#[cfg(target_os = "linux")]
pub mod libc;

pub mod nop;

/// Native allocation primitives. `None` stands for a null return.
pub trait HeapBackend: Send + Sync {
    fn malloc(&self, size: usize) -> Option<HostAddr>;
    fn calloc(&self, nmemb: usize, size: usize) -> Option<HostAddr>;
    fn memalign(&self, align: usize, size: usize) -> Option<HostAddr>;
    fn aligned_alloc(&self, align: usize, size: usize) -> Option<HostAddr>;
    /// On failure returns the error code `posix_memalign` would return.
    fn posix_memalign(&self, align: usize, size: usize) -> Result<Option<HostAddr>, c_int>;
    fn valloc(&self, size: usize) -> Option<HostAddr>;
    fn pvalloc(&self, size: usize) -> Option<HostAddr>;
    fn free(&self, addr: HostAddr);
    fn usable_size(&self, addr: HostAddr) -> usize;
}
