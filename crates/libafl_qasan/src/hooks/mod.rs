//! # hooks
//! Interception of the string and memory routines of the C library.
//!
//! Every pointer operand is translated first (sources for reading,
//! destinations for writing); if any of them fails the call is abandoned
//! before touching memory. The ranges the routine is about to access are then
//! checked with the shadow engine, the same way an instrumented libc would,
//! and the routine is performed on host memory. The plain copies and fills
//! (`memcpy`, `memmove`, `memset`) are handed to the engine's own routines
//! instead, which check the ranges themselves and report overlapping copies.
//! Pointer results are returned as guest addresses.
pub mod mem;
pub mod parse;
pub mod string;

use core::{cmp::Ordering, ffi::CStr};

use crate::{
    GuestAddr, HostAddr,
    action::LibcAction,
    allocator::HeapBackend,
    dispatch::Qasan,
    guest_int,
    pages::PageTable,
    shadow::Shadow,
};

impl<P, S, H> Qasan<P, S, H>
where
    P: PageTable,
    S: Shadow,
    H: HeapBackend,
{
    pub(crate) unsafe fn libc_action(&self, cpu: &P::Cpu, action: LibcAction) -> GuestAddr {
        let res = unsafe {
            match action {
                LibcAction::Memcmp { s1, s2, n } => self.memcmp(cpu, s1, s2, n),
                LibcAction::Memcpy { dest, src, n } => self.memcpy(cpu, dest, src, n),
                LibcAction::Memmove { dest, src, n } => self.memmove(cpu, dest, src, n),
                LibcAction::Memset { s, c, n } => self.memset(cpu, s, c, n),
                LibcAction::Strchr { s, c } => self.strchr(cpu, s, c),
                LibcAction::Strcasecmp { s1, s2 } => self.strcasecmp(cpu, s1, s2),
                LibcAction::Strcat { dest, src } => self.strcat(cpu, dest, src),
                LibcAction::Strcmp { s1, s2 } => self.strcmp(cpu, s1, s2),
                LibcAction::Strcpy { dest, src } => self.strcpy(cpu, dest, src),
                LibcAction::Strdup { s } => self.strdup(cpu, s),
                LibcAction::Strlen { s } => self.strlen(cpu, s),
                LibcAction::Strncasecmp { s1, s2, n } => self.strncasecmp(cpu, s1, s2, n),
                LibcAction::Strncmp { s1, s2, n } => self.strncmp(cpu, s1, s2, n),
                LibcAction::Strncat { dest, src, n } => self.strncat(cpu, dest, src, n),
                LibcAction::Strncpy { dest, src, n } => self.strncpy(cpu, dest, src, n),
                LibcAction::Strnlen { s, maxlen } => self.strnlen(cpu, s, maxlen),
                LibcAction::Strrchr { s, c } => self.strrchr(cpu, s, c),
                LibcAction::Atoi { nptr } => self.atoi(cpu, nptr),
                LibcAction::Atol { nptr } => self.atol(cpu, nptr),
                LibcAction::Atoll { nptr } => self.atoll(cpu, nptr),
            }
        };
        Self::complete(res)
    }
}

/// Length of the C string at `s`.
pub(crate) unsafe fn host_strlen(s: HostAddr) -> usize {
    unsafe { CStr::from_ptr(s as *const _) }.count_bytes()
}

/// Length of the C string at `s`, reading at most `max` bytes.
pub(crate) unsafe fn host_strnlen(s: HostAddr, max: usize) -> usize {
    let s = s as *const u8;
    let mut len = 0;
    while len < max && unsafe { *s.add(len) } != 0 {
        len += 1;
    }
    len
}

/// Compares two C strings through `fold`, reading at most `n` bytes of
/// each. Returns the number of bytes read from each string and the result.
pub(crate) unsafe fn host_strcmp(
    s1: HostAddr,
    s2: HostAddr,
    n: usize,
    fold: fn(u8) -> u8,
) -> (usize, Ordering) {
    let (s1, s2) = (s1 as *const u8, s2 as *const u8);
    for i in 0..n {
        let (c1, c2) = unsafe { (fold(*s1.add(i)), fold(*s2.add(i))) };
        match c1.cmp(&c2) {
            Ordering::Equal if c1 == 0 => return (i + 1, Ordering::Equal),
            Ordering::Equal => (),
            ord => return (i + 1, ord),
        }
    }
    (n, Ordering::Equal)
}

pub(crate) fn ordering(ord: Ordering) -> GuestAddr {
    guest_int(ord as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GuestIsize;

    #[test]
    fn test_ordering_is_guest_signed() {
        assert_eq!(ordering(Ordering::Equal), 0);
        assert_eq!(ordering(Ordering::Greater), 1);
        assert_eq!(ordering(Ordering::Less), GuestAddr::MAX);
        assert_eq!(ordering(Ordering::Less) as GuestIsize, -1);
    }

    #[test]
    fn test_host_strcmp_stops_at_difference() {
        let (a, b) = (b"abcd\0", b"abxd\0");
        let (read, ord) =
            unsafe { host_strcmp(a.as_ptr() as HostAddr, b.as_ptr() as HostAddr, 16, |c| c) };
        assert_eq!((read, ord), (3, Ordering::Less));

        let (a, b) = (b"ABC\0", b"abc\0");
        let (read, ord) = unsafe {
            host_strcmp(a.as_ptr() as HostAddr, b.as_ptr() as HostAddr, 16, |c| {
                c.to_ascii_lowercase()
            })
        };
        assert_eq!((read, ord), (4, Ordering::Equal));
    }
}
