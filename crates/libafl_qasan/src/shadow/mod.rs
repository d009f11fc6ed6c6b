//! # shadow
//! The shadow memory engine. This crate does not maintain shadow memory
//! itself, it only forwards translated host addresses to the engine. Any
//! violation is reported (and usually turned into a crash) by the engine, the
//! checks here never return a verdict.
#[cfg(feature = "asan-rt")]
pub mod asan;

use crate::HostAddr;

pub trait Shadow: Send + Sync {
    fn load1(&self, addr: HostAddr);
    fn load2(&self, addr: HostAddr);
    fn load4(&self, addr: HostAddr);
    fn load8(&self, addr: HostAddr);
    fn store1(&self, addr: HostAddr);
    fn store2(&self, addr: HostAddr);
    fn store4(&self, addr: HostAddr);
    fn store8(&self, addr: HostAddr);

    /// Checks that `[addr, addr + len)` may be read.
    fn load_n(&self, addr: HostAddr, len: usize);
    /// Checks that `[addr, addr + len)` may be written.
    fn store_n(&self, addr: HostAddr, len: usize);

    fn poison(&self, addr: HostAddr, len: usize);
    fn unpoison(&self, addr: HostAddr, len: usize);

    /// Copies `len` bytes from `src` to `dest` through the engine's own
    /// instrumented copy: both ranges are checked and overlapping ranges are
    /// reported. Both addresses must be mapped host memory.
    fn memcpy(&self, dest: HostAddr, src: HostAddr, len: usize);
    /// Like [`Shadow::memcpy`], overlapping ranges are allowed.
    fn memmove(&self, dest: HostAddr, src: HostAddr, len: usize);
    /// Fills `[addr, addr + len)` with `c` through the engine's instrumented
    /// fill.
    fn memset(&self, addr: HostAddr, c: i32, len: usize);

    /// Reports a `name` parameter overlap if `[a, a + a_len)` and
    /// `[b, b + b_len)` share a byte.
    fn check_overlap(
        &self,
        name: &'static str,
        a: HostAddr,
        a_len: usize,
        b: HostAddr,
        b_len: usize,
    );
}

/// Whether the half open ranges `[a, a + a_len)` and `[b, b + b_len)` share a
/// byte. Empty ranges never overlap.
#[must_use]
pub fn ranges_overlap(a: HostAddr, a_len: usize, b: HostAddr, b_len: usize) -> bool {
    a_len != 0 && b_len != 0 && a < b.saturating_add(b_len) && b < a.saturating_add(a_len)
}
