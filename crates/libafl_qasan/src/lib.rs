//! # libafl_qasan
//!
//! `libafl_qasan` is the emulator side of QASan. A guest program running under
//! a dynamic binary translator has its memory accesses and libc heap/string
//! calls checked by the host's address sanitizer, even though the sanitizer
//! only understands host pointers.
//!
//! The crate is built around three seams, each a trait so that it can be
//! provided by the emulator (or replaced by a fake in tests):
//!
//! - [`PageTable`] - the guest page-permission table. It translates guest
//!   addresses to host addresses and records the ranges handed out by the
//!   heap.
//! - [`Shadow`] - the shadow memory engine, i.e. the `__asan_*` check, poison
//!   and unpoison primitives.
//! - [`HeapBackend`] - the native allocator, already intercepted by the shadow
//!   engine.
//!
//! [`Qasan`] ties them together and exposes the two entry points used by
//! translated code:
//!
//! - the per-width helpers ([`Qasan::load1`] ... [`Qasan::store8`]) called on
//!   every ordinary guest load and store, and
//! - [`Qasan::fake_instr`], reached from the synthesized instruction the
//!   guest-side `libqasan` emits for each intercepted libc call.
#![cfg_attr(feature = "document-features", doc = document_features::document_features!())]

#[cfg(all(feature = "usermode", feature = "systemmode"))]
compile_error!("Cannot define both usermode and systemmode at the same time");

#[cfg(not(any(feature = "usermode", feature = "systemmode")))]
compile_error!("Either usermode or systemmode must be enabled");

pub mod access;

pub mod action;

pub mod allocator;

pub mod config;

pub mod dispatch;

pub mod exit;

#[cfg(feature = "usermode")]
pub mod heap;

#[cfg(feature = "usermode")]
pub mod hooks;

pub mod pages;

pub mod shadow;

pub use access::Direction;
pub use action::{ActionCode, ActionError, QasanAction};
pub use allocator::HeapBackend;
pub use config::{ConfigError, QasanConfig};
pub use dispatch::{Qasan, QasanBuilder};
pub use pages::{Access, PageFlags, PageTable, TranslationFault};
pub use shadow::Shadow;

#[cfg(not(feature = "guest32"))]
pub type GuestAddr = u64;

#[cfg(not(feature = "guest32"))]
pub type GuestIsize = i64;

#[cfg(feature = "guest32")]
pub type GuestAddr = u32;

#[cfg(feature = "guest32")]
pub type GuestIsize = i32;

pub type HostAddr = usize;

/// Value returned to the guest when one of the addresses of an action does
/// not translate.
pub const TRANSLATION_FAILED: GuestAddr = GuestAddr::MAX;

/// Sign-extends (or truncates) a host integer result to the guest width.
#[inline]
#[must_use]
pub(crate) fn guest_int(value: i64) -> GuestAddr {
    value as GuestIsize as GuestAddr
}
