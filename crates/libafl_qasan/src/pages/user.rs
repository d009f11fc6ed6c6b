//! # user
//! Page table for single-program emulation. The guest address space is a
//! window on the host one, offset by `guest_base`, and page flags are kept at
//! page granularity in a [`RangeMap`].
use core::{fmt, marker::PhantomData, ops::Range};
use std::sync::{PoisonError, RwLock};

use log::debug;
use rangemap::RangeMap;

use crate::{
    GuestAddr, HostAddr,
    pages::{Access, PageFlags, PageTable, TranslationFault},
};

pub const DEFAULT_PAGE_SIZE: usize = 4096;

pub struct UserPages<C: ?Sized = ()> {
    guest_base: HostAddr,
    page_mask: GuestAddr,
    flags: RwLock<RangeMap<GuestAddr, PageFlags>>,
    phantom: PhantomData<fn(&C)>,
}

impl<C: ?Sized> UserPages<C> {
    #[must_use]
    pub fn new(guest_base: HostAddr) -> Self {
        Self::with_page_size(guest_base, DEFAULT_PAGE_SIZE)
    }

    /// # Panics
    /// If `page_size` is not a power of two.
    #[must_use]
    pub fn with_page_size(guest_base: HostAddr, page_size: usize) -> Self {
        assert!(page_size.is_power_of_two());
        Self {
            guest_base,
            page_mask: !(page_size as GuestAddr - 1),
            flags: RwLock::new(RangeMap::new()),
            phantom: PhantomData,
        }
    }

    #[must_use]
    pub fn guest_base(&self) -> HostAddr {
        self.guest_base
    }

    #[must_use]
    pub fn g2h(&self, addr: GuestAddr) -> HostAddr {
        (addr as HostAddr).wrapping_add(self.guest_base)
    }

    /// The flags of the page holding `addr`, if it was ever marked.
    #[must_use]
    pub fn flags(&self, addr: GuestAddr) -> Option<PageFlags> {
        let flags = self.flags.read().unwrap_or_else(PoisonError::into_inner);
        flags.get(&addr).copied()
    }

    fn page_range(&self, start: GuestAddr, end: GuestAddr) -> Range<GuestAddr> {
        let start = start & self.page_mask;
        let end = match end.checked_add(!self.page_mask) {
            Some(end) => end & self.page_mask,
            None => GuestAddr::MAX,
        };
        start..end
    }
}

impl<C: ?Sized> fmt::Debug for UserPages<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPages")
            .field("guest_base", &format_args!("{:#x}", self.guest_base))
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl<C: ?Sized> PageTable for UserPages<C> {
    type Cpu = C;

    fn translate(
        &self,
        _cpu: &C,
        addr: GuestAddr,
        access: Access,
    ) -> Result<HostAddr, TranslationFault> {
        let flags = self
            .flags(addr)
            .filter(|f| f.contains(PageFlags::VALID))
            .ok_or(TranslationFault::Unmapped(addr))?;
        if access == Access::Write && !flags.contains(PageFlags::WRITE) {
            Err(TranslationFault::Protected(addr, access))?;
        }
        Ok(self.g2h(addr))
    }

    fn h2g(&self, host: HostAddr) -> GuestAddr {
        host.wrapping_sub(self.guest_base) as GuestAddr
    }

    fn mark_range(&self, start: GuestAddr, end: GuestAddr, flags: PageFlags) {
        let range = self.page_range(start, end);
        debug!(
            "mark_range - start: {:#x}, end: {:#x}, flags: {flags:?}",
            range.start, range.end
        );
        if range.is_empty() {
            return;
        }
        let mut map = self.flags.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(range, flags);
    }
}
