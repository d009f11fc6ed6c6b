//! # libc
//! [`HeapBackend`] calling straight into the host C library. When the host is
//! linked against the address sanitizer runtime these are the sanitizer's own
//! interceptors.
use core::ffi::{c_int, c_void};
use core::ptr::null_mut;

use crate::{HostAddr, allocator::HeapBackend};

unsafe extern "C" {
    fn valloc(size: libc::size_t) -> *mut c_void;
    fn pvalloc(size: libc::size_t) -> *mut c_void;
}

fn non_null(ptr: *mut c_void) -> Option<HostAddr> {
    (!ptr.is_null()).then_some(ptr as HostAddr)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LibcHeap;

impl HeapBackend for LibcHeap {
    fn malloc(&self, size: usize) -> Option<HostAddr> {
        non_null(unsafe { libc::malloc(size) })
    }

    fn calloc(&self, nmemb: usize, size: usize) -> Option<HostAddr> {
        non_null(unsafe { libc::calloc(nmemb, size) })
    }

    fn memalign(&self, align: usize, size: usize) -> Option<HostAddr> {
        non_null(unsafe { libc::memalign(align, size) })
    }

    fn aligned_alloc(&self, align: usize, size: usize) -> Option<HostAddr> {
        non_null(unsafe { libc::aligned_alloc(align, size) })
    }

    fn posix_memalign(&self, align: usize, size: usize) -> Result<Option<HostAddr>, c_int> {
        let mut ptr = null_mut();
        match unsafe { libc::posix_memalign(&mut ptr, align, size) } {
            0 => Ok(non_null(ptr)),
            err => Err(err),
        }
    }

    fn valloc(&self, size: usize) -> Option<HostAddr> {
        non_null(unsafe { valloc(size) })
    }

    fn pvalloc(&self, size: usize) -> Option<HostAddr> {
        non_null(unsafe { pvalloc(size) })
    }

    fn free(&self, addr: HostAddr) {
        unsafe { libc::free(addr as *mut c_void) }
    }

    fn usable_size(&self, addr: HostAddr) -> usize {
        if addr == 0 {
            return 0;
        }
        unsafe { libc::malloc_usable_size(addr as *mut c_void) }
    }
}
