use core::slice::from_raw_parts;

use log::trace;

use crate::{
    GuestAddr,
    allocator::HeapBackend,
    dispatch::Qasan,
    hooks::ordering,
    pages::{Access, PageTable, TranslationFault},
    shadow::Shadow,
};

impl<P, S, H> Qasan<P, S, H>
where
    P: PageTable,
    S: Shadow,
    H: HeapBackend,
{
    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn memcmp(
        &self,
        cpu: &P::Cpu,
        s1: GuestAddr,
        s2: GuestAddr,
        n: usize,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("memcmp - s1: {s1:#x}, s2: {s2:#x}, n: {n:#x}");
        if n == 0 {
            return Ok(0);
        }
        let h1 = self.pages.translate(cpu, s1, Access::Read)?;
        let h2 = self.pages.translate(cpu, s2, Access::Read)?;
        self.shadow.load_n(h1, n);
        self.shadow.load_n(h2, n);
        let (b1, b2) = unsafe {
            (
                from_raw_parts(h1 as *const u8, n),
                from_raw_parts(h2 as *const u8, n),
            )
        };
        Ok(ordering(b1.cmp(b2)))
    }

    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn memcpy(
        &self,
        cpu: &P::Cpu,
        dest: GuestAddr,
        src: GuestAddr,
        n: usize,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("memcpy - dest: {dest:#x}, src: {src:#x}, n: {n:#x}");
        if n == 0 {
            return Ok(dest);
        }
        let d = self.pages.translate(cpu, dest, Access::Write)?;
        let s = self.pages.translate(cpu, src, Access::Read)?;
        self.shadow.memcpy(d, s, n);
        Ok(self.pages.h2g(d))
    }

    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn memmove(
        &self,
        cpu: &P::Cpu,
        dest: GuestAddr,
        src: GuestAddr,
        n: usize,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("memmove - dest: {dest:#x}, src: {src:#x}, n: {n:#x}");
        if n == 0 {
            return Ok(dest);
        }
        let d = self.pages.translate(cpu, dest, Access::Write)?;
        let s = self.pages.translate(cpu, src, Access::Read)?;
        self.shadow.memmove(d, s, n);
        Ok(self.pages.h2g(d))
    }

    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn memset(
        &self,
        cpu: &P::Cpu,
        s: GuestAddr,
        c: i32,
        n: usize,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("memset - s: {s:#x}, c: {c:#x}, n: {n:#x}");
        if n == 0 {
            return Ok(s);
        }
        let h = self.pages.translate(cpu, s, Access::Write)?;
        self.shadow.memset(h, c, n);
        Ok(self.pages.h2g(h))
    }
}
