//! # heap
//! Allocation interception. Allocations are served by the native heap (and so
//! carry the shadow engine's own redzones); this module records each of them,
//! padded by `heap_pad` bytes on both sides, in the guest page table so that
//! the guest can reach the payload and checks landing in the redzones still
//! translate.
//!
//! Freed ranges are left in the page table: a later access to them has to
//! reach the shadow engine to be reported as a use-after-free.
use core::mem::size_of;

use log::{debug, trace};

use crate::{
    GuestAddr, HostAddr,
    action::HeapAction,
    allocator::HeapBackend,
    dispatch::Qasan,
    guest_int,
    pages::{Access, PageFlags, PageTable, TranslationFault},
    shadow::Shadow,
};

impl<P, S, H> Qasan<P, S, H>
where
    P: PageTable,
    S: Shadow,
    H: HeapBackend,
{
    pub(crate) unsafe fn heap_action(&self, cpu: &P::Cpu, action: HeapAction) -> GuestAddr {
        let res = match action {
            HeapAction::MallocUsableSize { ptr } => self.malloc_usable_size(cpu, ptr),
            HeapAction::Malloc { size } => Ok(self.malloc(size)),
            HeapAction::Calloc { nmemb, size } => Ok(self.calloc(nmemb, size)),
            HeapAction::Realloc { ptr, size } => unsafe { self.realloc(cpu, ptr, size) },
            HeapAction::PosixMemalign {
                memptr,
                align,
                size,
            } => unsafe { self.posix_memalign(cpu, memptr, align, size) },
            HeapAction::Memalign { align, size } => Ok(self.memalign(align, size)),
            HeapAction::AlignedAlloc { align, size } => Ok(self.aligned_alloc(align, size)),
            HeapAction::Valloc { size } => Ok(self.valloc(size)),
            HeapAction::Pvalloc { size } => Ok(self.pvalloc(size)),
            HeapAction::Free { ptr } => self.free(cpu, ptr).map(|()| 0),
        };
        Self::complete(res)
    }

    /// Marks `[p - heap_pad, p + size + heap_pad)` as heap in the page table.
    /// The range is clamped to the guest address space.
    pub(crate) fn track(&self, p: GuestAddr, size: usize) {
        let pad = GuestAddr::try_from(self.config.heap_pad).unwrap_or(GuestAddr::MAX);
        let len = GuestAddr::try_from(size).unwrap_or(GuestAddr::MAX);
        let start = p.saturating_sub(pad);
        let end = p.saturating_add(len).saturating_add(pad);
        debug!("track - p: {p:#x}, size: {size:#x}, start: {start:#x}, end: {end:#x}");
        self.pages.mark_range(start, end, PageFlags::HEAP);
    }

    /// Converts a native allocation result for the guest. A null result is
    /// passed through and nothing is recorded.
    pub(crate) fn register(&self, host: Option<HostAddr>, size: usize) -> GuestAddr {
        match host {
            Some(h) => {
                let p = self.pages.h2g(h);
                self.track(p, size);
                p
            }
            None => 0,
        }
    }

    pub fn malloc(&self, size: usize) -> GuestAddr {
        trace!("malloc - size: {size:#x}");
        self.register(self.heap.malloc(size), size)
    }

    pub fn calloc(&self, nmemb: usize, size: usize) -> GuestAddr {
        trace!("calloc - nmemb: {nmemb:#x}, size: {size:#x}");
        self.register(self.heap.calloc(nmemb, size), nmemb.saturating_mul(size))
    }

    pub fn memalign(&self, align: usize, size: usize) -> GuestAddr {
        trace!("memalign - align: {align:#x}, size: {size:#x}");
        self.register(self.heap.memalign(align, size), size)
    }

    pub fn aligned_alloc(&self, align: usize, size: usize) -> GuestAddr {
        trace!("aligned_alloc - align: {align:#x}, size: {size:#x}");
        self.register(self.heap.aligned_alloc(align, size), size)
    }

    pub fn valloc(&self, size: usize) -> GuestAddr {
        trace!("valloc - size: {size:#x}");
        self.register(self.heap.valloc(size), size)
    }

    pub fn pvalloc(&self, size: usize) -> GuestAddr {
        trace!("pvalloc - size: {size:#x}");
        self.register(self.heap.pvalloc(size), size)
    }

    /// Stores the new allocation to the guest pointer at `memptr` and returns
    /// the `posix_memalign` status.
    ///
    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn posix_memalign(
        &self,
        cpu: &P::Cpu,
        memptr: GuestAddr,
        align: usize,
        size: usize,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("posix_memalign - memptr: {memptr:#x}, align: {align:#x}, size: {size:#x}");
        let out = self.pages.translate(cpu, memptr, Access::Write)?;
        match self.heap.posix_memalign(align, size) {
            Ok(host) => {
                let p = self.register(host, size);
                self.shadow.store_n(out, size_of::<GuestAddr>());
                unsafe { (out as *mut GuestAddr).write_unaligned(p) };
                Ok(0)
            }
            Err(err) => Ok(guest_int(err.into())),
        }
    }

    /// Rebuilds the allocation instead of resizing it natively, so that the
    /// new chunk gets a fresh redzone: `malloc(size)`, an instrumented copy of
    /// the smaller of `size` and the old usable size, then `free(ptr)` whether
    /// or not the allocation succeeded.
    ///
    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn realloc(
        &self,
        cpu: &P::Cpu,
        ptr: GuestAddr,
        size: usize,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("realloc - ptr: {ptr:#x}, size: {size:#x}");
        if ptr == 0 {
            return Ok(self.malloc(size));
        }
        let old = self.pages.translate(cpu, ptr, Access::Read)?;
        let new = self.heap.malloc(size);
        let p = self.register(new, size);
        if let Some(new) = new {
            let len = self.heap.usable_size(old).min(size);
            self.shadow.memcpy(new, old, len);
        }
        self.heap.free(old);
        Ok(p)
    }

    pub fn free(&self, cpu: &P::Cpu, ptr: GuestAddr) -> Result<(), TranslationFault> {
        trace!("free - ptr: {ptr:#x}");
        if ptr == 0 {
            return Ok(());
        }
        let h = self.pages.translate(cpu, ptr, Access::Read)?;
        self.heap.free(h);
        Ok(())
    }

    pub fn malloc_usable_size(
        &self,
        cpu: &P::Cpu,
        ptr: GuestAddr,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("malloc_usable_size - ptr: {ptr:#x}");
        if ptr == 0 {
            return Ok(0);
        }
        let h = self.pages.translate(cpu, ptr, Access::Read)?;
        Ok(self.heap.usable_size(h) as GuestAddr)
    }
}
