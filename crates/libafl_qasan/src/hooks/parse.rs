use log::trace;

use crate::{
    GuestAddr,
    allocator::HeapBackend,
    dispatch::Qasan,
    guest_int,
    hooks::host_strlen,
    pages::{Access, PageTable, TranslationFault},
    shadow::Shadow,
};

/// Parses a base 10 integer the way `strtol` does: leading whitespace, an
/// optional sign, then digits up to the first non-digit. Out of range values
/// saturate.
#[must_use]
pub fn parse_long(s: &[u8]) -> i64 {
    let mut bytes = s
        .iter()
        .copied()
        .skip_while(|&b| matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r'))
        .peekable();
    let negative = match bytes.peek() {
        Some(b'-') => {
            bytes.next();
            true
        }
        Some(b'+') => {
            bytes.next();
            false
        }
        _ => false,
    };
    bytes
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |val, b| {
            let digit = i64::from(b - b'0');
            if negative {
                val.saturating_mul(10).saturating_sub(digit)
            } else {
                val.saturating_mul(10).saturating_add(digit)
            }
        })
}

impl<P, S, H> Qasan<P, S, H>
where
    P: PageTable,
    S: Shadow,
    H: HeapBackend,
{
    unsafe fn parse(&self, cpu: &P::Cpu, nptr: GuestAddr) -> Result<i64, TranslationFault> {
        let h = self.pages.translate(cpu, nptr, Access::Read)?;
        let len = unsafe { host_strlen(h) };
        self.shadow.load_n(h, len + 1);
        let bytes = unsafe { core::slice::from_raw_parts(h as *const u8, len) };
        Ok(parse_long(bytes))
    }

    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn atoi(&self, cpu: &P::Cpu, nptr: GuestAddr) -> Result<GuestAddr, TranslationFault> {
        trace!("atoi - nptr: {nptr:#x}");
        let val = unsafe { self.parse(cpu, nptr) }?;
        Ok(guest_int(i64::from(val as i32)))
    }

    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn atol(&self, cpu: &P::Cpu, nptr: GuestAddr) -> Result<GuestAddr, TranslationFault> {
        trace!("atol - nptr: {nptr:#x}");
        let val = unsafe { self.parse(cpu, nptr) }?;
        Ok(guest_int(val))
    }

    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn atoll(
        &self,
        cpu: &P::Cpu,
        nptr: GuestAddr,
    ) -> Result<GuestAddr, TranslationFault> {
        trace!("atoll - nptr: {nptr:#x}");
        let val = unsafe { self.parse(cpu, nptr) }?;
        Ok(guest_int(val))
    }
}
