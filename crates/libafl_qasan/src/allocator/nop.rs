//! # nop
//! A [`HeapBackend`] where every allocation fails. Used when no guest heap is
//! available, e.g. in whole-system emulation where only the check actions can
//! be reached.
use core::ffi::c_int;

use crate::{HostAddr, allocator::HeapBackend};

#[derive(Debug, Default, Clone, Copy)]
pub struct NopHeap;

impl HeapBackend for NopHeap {
    fn malloc(&self, _size: usize) -> Option<HostAddr> {
        None
    }

    fn calloc(&self, _nmemb: usize, _size: usize) -> Option<HostAddr> {
        None
    }

    fn memalign(&self, _align: usize, _size: usize) -> Option<HostAddr> {
        None
    }

    fn aligned_alloc(&self, _align: usize, _size: usize) -> Option<HostAddr> {
        None
    }

    fn posix_memalign(&self, _align: usize, _size: usize) -> Result<Option<HostAddr>, c_int> {
        Err(libc::ENOMEM)
    }

    fn valloc(&self, _size: usize) -> Option<HostAddr> {
        None
    }

    fn pvalloc(&self, _size: usize) -> Option<HostAddr> {
        None
    }

    fn free(&self, _addr: HostAddr) {}

    fn usable_size(&self, _addr: HostAddr) -> usize {
        0
    }
}
