//! # asan
//! [`Shadow`] backed by the compiler-rt address sanitizer the host itself was
//! built with.
use core::ffi::{c_int, c_void};

use crate::{
    HostAddr, exit,
    shadow::{Shadow, ranges_overlap},
};

unsafe extern "C" {
    fn __asan_load1(addr: HostAddr);
    fn __asan_load2(addr: HostAddr);
    fn __asan_load4(addr: HostAddr);
    fn __asan_load8(addr: HostAddr);
    fn __asan_store1(addr: HostAddr);
    fn __asan_store2(addr: HostAddr);
    fn __asan_store4(addr: HostAddr);
    fn __asan_store8(addr: HostAddr);
    fn __asan_loadN(addr: HostAddr, size: usize);
    fn __asan_storeN(addr: HostAddr, size: usize);
    fn __asan_poison_memory_region(addr: *const c_void, size: usize);
    fn __asan_unpoison_memory_region(addr: *const c_void, size: usize);
    fn __asan_memcpy(dest: *mut c_void, src: *const c_void, size: usize) -> *mut c_void;
    fn __asan_memmove(dest: *mut c_void, src: *const c_void, size: usize) -> *mut c_void;
    fn __asan_memset(s: *mut c_void, c: c_int, size: usize) -> *mut c_void;
    fn __sanitizer_print_stack_trace();
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AsanShadow;

impl Shadow for AsanShadow {
    fn load1(&self, addr: HostAddr) {
        unsafe { __asan_load1(addr) }
    }

    fn load2(&self, addr: HostAddr) {
        unsafe { __asan_load2(addr) }
    }

    fn load4(&self, addr: HostAddr) {
        unsafe { __asan_load4(addr) }
    }

    fn load8(&self, addr: HostAddr) {
        unsafe { __asan_load8(addr) }
    }

    fn store1(&self, addr: HostAddr) {
        unsafe { __asan_store1(addr) }
    }

    fn store2(&self, addr: HostAddr) {
        unsafe { __asan_store2(addr) }
    }

    fn store4(&self, addr: HostAddr) {
        unsafe { __asan_store4(addr) }
    }

    fn store8(&self, addr: HostAddr) {
        unsafe { __asan_store8(addr) }
    }

    fn load_n(&self, addr: HostAddr, len: usize) {
        unsafe { __asan_loadN(addr, len) }
    }

    fn store_n(&self, addr: HostAddr, len: usize) {
        unsafe { __asan_storeN(addr, len) }
    }

    fn poison(&self, addr: HostAddr, len: usize) {
        unsafe { __asan_poison_memory_region(addr as *const c_void, len) }
    }

    fn unpoison(&self, addr: HostAddr, len: usize) {
        unsafe { __asan_unpoison_memory_region(addr as *const c_void, len) }
    }

    fn memcpy(&self, dest: HostAddr, src: HostAddr, len: usize) {
        unsafe { __asan_memcpy(dest as *mut c_void, src as *const c_void, len) };
    }

    fn memmove(&self, dest: HostAddr, src: HostAddr, len: usize) {
        unsafe { __asan_memmove(dest as *mut c_void, src as *const c_void, len) };
    }

    fn memset(&self, addr: HostAddr, c: i32, len: usize) {
        unsafe { __asan_memset(addr as *mut c_void, c, len) };
    }

    // The runtime exports no standalone overlap check, report it the way its
    // interceptors do.
    fn check_overlap(
        &self,
        name: &'static str,
        a: HostAddr,
        a_len: usize,
        b: HostAddr,
        b_len: usize,
    ) {
        if ranges_overlap(a, a_len, b, b_len) {
            unsafe { __sanitizer_print_stack_trace() };
            exit::fatal(format_args!(
                "{name}-param-overlap: memory ranges [{a:#x},{:#x}) and [{b:#x},{:#x}) overlap",
                a.wrapping_add(a_len),
                b.wrapping_add(b_len),
            ));
        }
    }
}
