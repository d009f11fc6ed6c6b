//! # action
//! The actions a guest can request through the synthesized QASan instruction.
//!
//! The guest passes an untyped code and three guest-width operands.
//! [`QasanAction::decode`] turns them into a typed value once, at the edge;
//! everything behind it matches exhaustively on [`QasanAction`].
use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

use crate::{GuestAddr, GuestIsize};

/// Numeric action codes, in the order `libqasan` emits them.
#[derive(IntoPrimitive, TryFromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ActionCode {
    CheckLoad,
    CheckStore,
    Poison,
    Unpoison,
    MallocUsableSize,
    Malloc,
    Calloc,
    Realloc,
    PosixMemalign,
    Memalign,
    AlignedAlloc,
    Valloc,
    Pvalloc,
    Free,
    Memcmp,
    Memcpy,
    Memmove,
    Memset,
    Strchr,
    Strcasecmp,
    Strcat,
    Strcmp,
    Strcpy,
    Strdup,
    Strlen,
    Strncasecmp,
    Strncmp,
    Strncat,
    Strncpy,
    Strnlen,
    Strrchr,
    Atoi,
    Atol,
    Atoll,
}

/// Codes are carried as the guest's signed register value.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionError {
    #[error("Invalid action {0}")]
    Invalid(GuestIsize),
    #[error("Invalid action {0} (not available in system mode)")]
    Unavailable(GuestIsize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QasanAction {
    CheckLoad {
        addr: GuestAddr,
        len: usize,
    },
    CheckStore {
        addr: GuestAddr,
        len: usize,
    },
    Poison {
        addr: GuestAddr,
        len: usize,
    },
    Unpoison {
        addr: GuestAddr,
        len: usize,
    },
    #[cfg(feature = "usermode")]
    Heap(HeapAction),
    #[cfg(feature = "usermode")]
    Libc(LibcAction),
}

/// Allocator entry points.
#[cfg(feature = "usermode")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapAction {
    MallocUsableSize {
        ptr: GuestAddr,
    },
    Malloc {
        size: usize,
    },
    Calloc {
        nmemb: usize,
        size: usize,
    },
    Realloc {
        ptr: GuestAddr,
        size: usize,
    },
    /// `memptr` is the guest location the result is stored to.
    PosixMemalign {
        memptr: GuestAddr,
        align: usize,
        size: usize,
    },
    Memalign {
        align: usize,
        size: usize,
    },
    AlignedAlloc {
        align: usize,
        size: usize,
    },
    Valloc {
        size: usize,
    },
    Pvalloc {
        size: usize,
    },
    Free {
        ptr: GuestAddr,
    },
}

/// String and memory routines.
#[cfg(feature = "usermode")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibcAction {
    Memcmp {
        s1: GuestAddr,
        s2: GuestAddr,
        n: usize,
    },
    Memcpy {
        dest: GuestAddr,
        src: GuestAddr,
        n: usize,
    },
    Memmove {
        dest: GuestAddr,
        src: GuestAddr,
        n: usize,
    },
    Memset {
        s: GuestAddr,
        c: i32,
        n: usize,
    },
    Strchr {
        s: GuestAddr,
        c: i32,
    },
    Strcasecmp {
        s1: GuestAddr,
        s2: GuestAddr,
    },
    Strcat {
        dest: GuestAddr,
        src: GuestAddr,
    },
    Strcmp {
        s1: GuestAddr,
        s2: GuestAddr,
    },
    Strcpy {
        dest: GuestAddr,
        src: GuestAddr,
    },
    Strdup {
        s: GuestAddr,
    },
    Strlen {
        s: GuestAddr,
    },
    Strncasecmp {
        s1: GuestAddr,
        s2: GuestAddr,
        n: usize,
    },
    Strncmp {
        s1: GuestAddr,
        s2: GuestAddr,
        n: usize,
    },
    Strncat {
        dest: GuestAddr,
        src: GuestAddr,
        n: usize,
    },
    Strncpy {
        dest: GuestAddr,
        src: GuestAddr,
        n: usize,
    },
    Strnlen {
        s: GuestAddr,
        maxlen: usize,
    },
    Strrchr {
        s: GuestAddr,
        c: i32,
    },
    Atoi {
        nptr: GuestAddr,
    },
    Atol {
        nptr: GuestAddr,
    },
    Atoll {
        nptr: GuestAddr,
    },
}

impl ActionCode {
    pub fn decode(code: GuestAddr) -> Result<Self, ActionError> {
        Self::try_from(u64::from(code)).map_err(|_| ActionError::Invalid(code as GuestIsize))
    }
}

impl QasanAction {
    /// Decodes the operands of the synthesized instruction.
    pub fn decode(
        code: GuestAddr,
        arg1: GuestAddr,
        arg2: GuestAddr,
        arg3: GuestAddr,
    ) -> Result<Self, ActionError> {
        let action = match ActionCode::decode(code)? {
            ActionCode::CheckLoad => Self::CheckLoad {
                addr: arg1,
                len: arg2 as usize,
            },
            ActionCode::CheckStore => Self::CheckStore {
                addr: arg1,
                len: arg2 as usize,
            },
            ActionCode::Poison => Self::Poison {
                addr: arg1,
                len: arg2 as usize,
            },
            ActionCode::Unpoison => Self::Unpoison {
                addr: arg1,
                len: arg2 as usize,
            },
            other => Self::decode_intercept(other, arg1, arg2, arg3)
                .ok_or(ActionError::Unavailable(u64::from(other) as GuestIsize))?,
        };
        Ok(action)
    }

    #[cfg(feature = "usermode")]
    fn decode_intercept(
        code: ActionCode,
        arg1: GuestAddr,
        arg2: GuestAddr,
        arg3: GuestAddr,
    ) -> Option<Self> {
        HeapAction::decode(code, arg1, arg2, arg3)
            .map(Self::Heap)
            .or_else(|| LibcAction::decode(code, arg1, arg2, arg3).map(Self::Libc))
    }

    #[cfg(not(feature = "usermode"))]
    fn decode_intercept(
        _code: ActionCode,
        _arg1: GuestAddr,
        _arg2: GuestAddr,
        _arg3: GuestAddr,
    ) -> Option<Self> {
        None
    }
}

#[cfg(feature = "usermode")]
impl HeapAction {
    #[must_use]
    pub fn decode(
        code: ActionCode,
        arg1: GuestAddr,
        arg2: GuestAddr,
        arg3: GuestAddr,
    ) -> Option<Self> {
        let action = match code {
            ActionCode::MallocUsableSize => Self::MallocUsableSize { ptr: arg1 },
            ActionCode::Malloc => Self::Malloc {
                size: arg1 as usize,
            },
            ActionCode::Calloc => Self::Calloc {
                nmemb: arg1 as usize,
                size: arg2 as usize,
            },
            ActionCode::Realloc => Self::Realloc {
                ptr: arg1,
                size: arg2 as usize,
            },
            ActionCode::PosixMemalign => Self::PosixMemalign {
                memptr: arg1,
                align: arg2 as usize,
                size: arg3 as usize,
            },
            ActionCode::Memalign => Self::Memalign {
                align: arg1 as usize,
                size: arg2 as usize,
            },
            ActionCode::AlignedAlloc => Self::AlignedAlloc {
                align: arg1 as usize,
                size: arg2 as usize,
            },
            ActionCode::Valloc => Self::Valloc {
                size: arg1 as usize,
            },
            ActionCode::Pvalloc => Self::Pvalloc {
                size: arg1 as usize,
            },
            ActionCode::Free => Self::Free { ptr: arg1 },
            _ => return None,
        };
        Some(action)
    }
}

#[cfg(feature = "usermode")]
impl LibcAction {
    #[must_use]
    pub fn decode(
        code: ActionCode,
        arg1: GuestAddr,
        arg2: GuestAddr,
        arg3: GuestAddr,
    ) -> Option<Self> {
        let n = arg3 as usize;
        let action = match code {
            ActionCode::Memcmp => Self::Memcmp {
                s1: arg1,
                s2: arg2,
                n,
            },
            ActionCode::Memcpy => Self::Memcpy {
                dest: arg1,
                src: arg2,
                n,
            },
            ActionCode::Memmove => Self::Memmove {
                dest: arg1,
                src: arg2,
                n,
            },
            ActionCode::Memset => Self::Memset {
                s: arg1,
                c: arg2 as i32,
                n,
            },
            ActionCode::Strchr => Self::Strchr {
                s: arg1,
                c: arg2 as i32,
            },
            ActionCode::Strcasecmp => Self::Strcasecmp { s1: arg1, s2: arg2 },
            ActionCode::Strcat => Self::Strcat {
                dest: arg1,
                src: arg2,
            },
            ActionCode::Strcmp => Self::Strcmp { s1: arg1, s2: arg2 },
            ActionCode::Strcpy => Self::Strcpy {
                dest: arg1,
                src: arg2,
            },
            ActionCode::Strdup => Self::Strdup { s: arg1 },
            ActionCode::Strlen => Self::Strlen { s: arg1 },
            ActionCode::Strncasecmp => Self::Strncasecmp {
                s1: arg1,
                s2: arg2,
                n,
            },
            ActionCode::Strncmp => Self::Strncmp {
                s1: arg1,
                s2: arg2,
                n,
            },
            ActionCode::Strncat => Self::Strncat {
                dest: arg1,
                src: arg2,
                n,
            },
            ActionCode::Strncpy => Self::Strncpy {
                dest: arg1,
                src: arg2,
                n,
            },
            ActionCode::Strnlen => Self::Strnlen {
                s: arg1,
                maxlen: arg2 as usize,
            },
            ActionCode::Strrchr => Self::Strrchr {
                s: arg1,
                c: arg2 as i32,
            },
            ActionCode::Atoi => Self::Atoi { nptr: arg1 },
            ActionCode::Atol => Self::Atol { nptr: arg1 },
            ActionCode::Atoll => Self::Atoll { nptr: arg1 },
            _ => return None,
        };
        Some(action)
    }
}
