use core::{
    ptr::{copy, copy_nonoverlapping, write_bytes},
    slice::from_raw_parts,
};

use log::trace;

use crate::{
    GuestAddr,
    allocator::HeapBackend,
    dispatch::Qasan,
    hooks::{host_strcmp, host_strlen, host_strnlen, ordering},
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
    pub unsafe fn strlen(&self, cpu: &P::Cpu, s: GuestAddr) -> Result<GuestAddr, TranslationFault> {
        trace!("strlen - s: {s:#x}");
        let h = self.pages.translate(cpu, s, Access::Read)?;
        let len = unsafe { host_strlen(h) };
        self.shadow.load_n(h, len + 1);
        Ok(len as GuestAddr)
    }

    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn strnlen(
        &self,
        cpu: &P::Cpu,
        s: GuestAddr,
        maxlen: usize,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("strnlen - s: {s:#x}, maxlen: {maxlen:#x}");
        if maxlen == 0 {
            return Ok(0);
        }
        let h = self.pages.translate(cpu, s, Access::Read)?;
        let len = unsafe { host_strnlen(h, maxlen) };
        self.shadow.load_n(h, (len + 1).min(maxlen));
        Ok(len as GuestAddr)
    }

    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn strchr(
        &self,
        cpu: &P::Cpu,
        s: GuestAddr,
        c: i32,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("strchr - s: {s:#x}, c: {c:#x}");
        let h = self.pages.translate(cpu, s, Access::Read)?;
        let len = unsafe { host_strlen(h) };
        let bytes = unsafe { from_raw_parts(h as *const u8, len + 1) };
        match bytes.iter().position(|&b| b == c as u8) {
            Some(pos) => {
                self.shadow.load_n(h, pos + 1);
                Ok(self.pages.h2g(h + pos))
            }
            None => {
                self.shadow.load_n(h, len + 1);
                Ok(0)
            }
        }
    }

    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn strrchr(
        &self,
        cpu: &P::Cpu,
        s: GuestAddr,
        c: i32,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("strrchr - s: {s:#x}, c: {c:#x}");
        let h = self.pages.translate(cpu, s, Access::Read)?;
        let len = unsafe { host_strlen(h) };
        self.shadow.load_n(h, len + 1);
        let bytes = unsafe { from_raw_parts(h as *const u8, len + 1) };
        Ok(bytes
            .iter()
            .rposition(|&b| b == c as u8)
            .map_or(0, |pos| self.pages.h2g(h + pos)))
    }

    unsafe fn compare(
        &self,
        cpu: &P::Cpu,
        s1: GuestAddr,
        s2: GuestAddr,
        n: usize,
        fold: fn(u8) -> u8,
    ) -> Result<GuestAddr, TranslationFault> {
        if n == 0 {
            return Ok(0);
        }
        let h1 = self.pages.translate(cpu, s1, Access::Read)?;
        let h2 = self.pages.translate(cpu, s2, Access::Read)?;
        let (len, ord) = unsafe { host_strcmp(h1, h2, n, fold) };
        self.shadow.load_n(h1, len);
        self.shadow.load_n(h2, len);
        Ok(ordering(ord))
    }

    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn strcmp(
        &self,
        cpu: &P::Cpu,
        s1: GuestAddr,
        s2: GuestAddr,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("strcmp - s1: {s1:#x}, s2: {s2:#x}");
        unsafe { self.compare(cpu, s1, s2, usize::MAX, |c| c) }
    }

    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn strncmp(
        &self,
        cpu: &P::Cpu,
        s1: GuestAddr,
        s2: GuestAddr,
        n: usize,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("strncmp - s1: {s1:#x}, s2: {s2:#x}, n: {n:#x}");
        unsafe { self.compare(cpu, s1, s2, n, |c| c) }
    }

    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn strcasecmp(
        &self,
        cpu: &P::Cpu,
        s1: GuestAddr,
        s2: GuestAddr,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("strcasecmp - s1: {s1:#x}, s2: {s2:#x}");
        unsafe { self.compare(cpu, s1, s2, usize::MAX, |c| c.to_ascii_lowercase()) }
    }

    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn strncasecmp(
        &self,
        cpu: &P::Cpu,
        s1: GuestAddr,
        s2: GuestAddr,
        n: usize,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("strncasecmp - s1: {s1:#x}, s2: {s2:#x}, n: {n:#x}");
        unsafe { self.compare(cpu, s1, s2, n, |c| c.to_ascii_lowercase()) }
    }

    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn strcpy(
        &self,
        cpu: &P::Cpu,
        dest: GuestAddr,
        src: GuestAddr,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("strcpy - dest: {dest:#x}, src: {src:#x}");
        let d = self.pages.translate(cpu, dest, Access::Write)?;
        let s = self.pages.translate(cpu, src, Access::Read)?;
        let len = unsafe { host_strlen(s) };
        self.shadow.load_n(s, len + 1);
        self.shadow.store_n(d, len + 1);
        self.shadow.check_overlap("strcpy", d, len + 1, s, len + 1);
        unsafe { copy(s as *const u8, d as *mut u8, len + 1) };
        Ok(self.pages.h2g(d))
    }

    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn strncpy(
        &self,
        cpu: &P::Cpu,
        dest: GuestAddr,
        src: GuestAddr,
        n: usize,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("strncpy - dest: {dest:#x}, src: {src:#x}, n: {n:#x}");
        if n == 0 {
            return Ok(dest);
        }
        let d = self.pages.translate(cpu, dest, Access::Write)?;
        let s = self.pages.translate(cpu, src, Access::Read)?;
        let len = unsafe { host_strnlen(s, n) };
        self.shadow.load_n(s, (len + 1).min(n));
        self.shadow.store_n(d, n);
        self.shadow.check_overlap("strncpy", d, n, s, (len + 1).min(n));
        unsafe {
            copy(s as *const u8, d as *mut u8, len);
            write_bytes((d + len) as *mut u8, 0, n - len);
        }
        Ok(self.pages.h2g(d))
    }

    /// The native `strcat` is not relied upon for the checks: the source is
    /// checked over its length and, if it is not empty, the destination over
    /// its current length and the appended bytes including the terminator,
    /// then the whole resulting string against the source for overlap.
    ///
    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn strcat(
        &self,
        cpu: &P::Cpu,
        dest: GuestAddr,
        src: GuestAddr,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("strcat - dest: {dest:#x}, src: {src:#x}");
        let d = self.pages.translate(cpu, dest, Access::Write)?;
        let s = self.pages.translate(cpu, src, Access::Read)?;
        let (dest_len, src_len) = unsafe { (host_strlen(d), host_strlen(s)) };
        self.shadow.load_n(s, src_len);
        if src_len != 0 {
            self.shadow.load_n(d, dest_len);
            self.shadow.store_n(d + dest_len, src_len + 1);
            self.shadow
                .check_overlap("strcat", d, dest_len + src_len + 1, s, src_len + 1);
        }
        unsafe { copy(s as *const u8, (d + dest_len) as *mut u8, src_len + 1) };
        Ok(self.pages.h2g(d))
    }

    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn strncat(
        &self,
        cpu: &P::Cpu,
        dest: GuestAddr,
        src: GuestAddr,
        n: usize,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("strncat - dest: {dest:#x}, src: {src:#x}, n: {n:#x}");
        let d = self.pages.translate(cpu, dest, Access::Write)?;
        let s = self.pages.translate(cpu, src, Access::Read)?;
        let src_len = unsafe { host_strnlen(s, n) };
        self.shadow.load_n(s, (src_len + 1).min(n));
        let dest_len = unsafe { host_strlen(d) };
        self.shadow.load_n(d, dest_len);
        self.shadow.store_n(d + dest_len, src_len + 1);
        self.shadow.check_overlap(
            "strncat",
            d,
            dest_len + src_len + 1,
            s,
            (src_len + 1).min(n),
        );
        unsafe {
            copy(s as *const u8, (d + dest_len) as *mut u8, src_len);
            *((d + dest_len + src_len) as *mut u8) = 0;
        }
        Ok(self.pages.h2g(d))
    }

    /// Duplicates the string on the native heap and records the copy like
    /// any other allocation.
    ///
    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn strdup(&self, cpu: &P::Cpu, s: GuestAddr) -> Result<GuestAddr, TranslationFault> {
        trace!("strdup - s: {s:#x}");
        let h = self.pages.translate(cpu, s, Access::Read)?;
        let len = unsafe { host_strlen(h) };
        self.shadow.load_n(h, len + 1);
        let dup = self.heap.malloc(len + 1);
        let p = self.register(dup, len);
        if let Some(dup) = dup {
            unsafe { copy_nonoverlapping(h as *const u8, dup as *mut u8, len + 1) };
        }
        Ok(p)
    }
}
