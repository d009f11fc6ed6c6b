//! # pages
//! The guest page-permission table. It is the only authority on whether a
//! guest address can currently be accessed, and the only way to turn a guest
//! address into a host one.
use bitflags::bitflags;
use thiserror::Error;

use crate::{GuestAddr, HostAddr};

pub mod user;

bitflags! {
    /// Page protection bits, using the same values as QEMU's `PAGE_*` flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PageFlags: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const EXEC = 0x4;
        const VALID = 0x8;
    }
}

impl PageFlags {
    /// Flags given to every range handed out by the heap interceptor.
    pub const HEAP: Self = Self::READ.union(Self::WRITE).union(Self::VALID);
}

/// The kind of access a translation is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationFault {
    #[error("Unmapped guest address: {0:#x}")]
    Unmapped(GuestAddr),
    #[error("Guest address {0:#x} does not permit {1:?}")]
    Protected(GuestAddr, Access),
}

/// The emulator's page table, as seen by the sanitizer bridge.
///
/// Translation is recomputed on every access and never cached by this crate.
/// All methods take `&self`: the table is shared by every guest CPU and an
/// implementation must synchronize internally.
pub trait PageTable: Send + Sync {
    /// The per-CPU execution context translations are performed for.
    type Cpu: ?Sized;

    /// Translates `addr` to a host address.
    ///
    /// Succeeds only if the page holding `addr` is [`PageFlags::VALID`] and,
    /// for [`Access::Write`], also [`PageFlags::WRITE`]. The width of the
    /// access is not checked.
    fn translate(
        &self,
        cpu: &Self::Cpu,
        addr: GuestAddr,
        access: Access,
    ) -> Result<HostAddr, TranslationFault>;

    /// Converts a host address produced by the native heap back to the guest
    /// address space.
    fn h2g(&self, host: HostAddr) -> GuestAddr;

    /// Sets the flags of every page overlapping `[start, end)`.
    fn mark_range(&self, start: GuestAddr, end: GuestAddr, flags: PageFlags);
}
