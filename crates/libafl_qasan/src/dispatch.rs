//! # dispatch
//! [`Qasan`] owns the page table, the shadow engine and the native heap, and
//! is the single consumer of the actions requested by the guest.
use core::fmt;

use log::{debug, info};

use crate::{
    GuestAddr, TRANSLATION_FAILED,
    action::QasanAction,
    allocator::{HeapBackend, nop::NopHeap},
    config::{ConfigError, QasanConfig},
    exit,
    pages::{Access, PageTable, TranslationFault},
    shadow::Shadow,
};

pub struct Qasan<P, S, H = NopHeap> {
    pub(crate) pages: P,
    pub(crate) shadow: S,
    pub(crate) heap: H,
    pub(crate) config: QasanConfig,
}

pub struct QasanBuilder<P, S, H> {
    pages: P,
    shadow: S,
    heap: H,
    config: QasanConfig,
}

impl QasanBuilder<(), (), NopHeap> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pages: (),
            shadow: (),
            heap: NopHeap,
            config: QasanConfig::default(),
        }
    }
}

impl Default for QasanBuilder<(), (), NopHeap> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, S, H> QasanBuilder<P, S, H> {
    #[must_use]
    pub fn pages<P2: PageTable>(self, pages: P2) -> QasanBuilder<P2, S, H> {
        QasanBuilder {
            pages,
            shadow: self.shadow,
            heap: self.heap,
            config: self.config,
        }
    }

    #[must_use]
    pub fn shadow<S2: Shadow>(self, shadow: S2) -> QasanBuilder<P, S2, H> {
        QasanBuilder {
            pages: self.pages,
            shadow,
            heap: self.heap,
            config: self.config,
        }
    }

    #[must_use]
    pub fn heap<H2: HeapBackend>(self, heap: H2) -> QasanBuilder<P, S, H2> {
        QasanBuilder {
            pages: self.pages,
            shadow: self.shadow,
            heap,
            config: self.config,
        }
    }

    #[must_use]
    pub fn config(self, config: QasanConfig) -> Self {
        Self { config, ..self }
    }

    /// Replaces the configuration with [`QasanConfig::from_env`].
    pub fn config_from_env(self) -> Result<Self, ConfigError> {
        Ok(self.config(QasanConfig::from_env()?))
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    #[must_use]
    pub fn heap_pad(mut self, heap_pad: usize) -> Self {
        self.config.heap_pad = heap_pad;
        self
    }
}

impl<P, S, H> QasanBuilder<P, S, H>
where
    P: PageTable,
    S: Shadow,
    H: HeapBackend,
{
    #[must_use]
    pub fn build(self) -> Qasan<P, S, H> {
        Qasan {
            pages: self.pages,
            shadow: self.shadow,
            heap: self.heap,
            config: self.config,
        }
    }
}

impl<P, S, H> fmt::Debug for Qasan<P, S, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Qasan")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Qasan<(), (), NopHeap> {
    /// Starts from [`QasanConfig::default`]; the environment is only read
    /// through [`QasanBuilder::config_from_env`].
    #[must_use]
    pub fn builder() -> QasanBuilder<(), (), NopHeap> {
        QasanBuilder::new()
    }
}

impl<P, S, H> Qasan<P, S, H>
where
    P: PageTable,
    S: Shadow,
    H: HeapBackend,
{
    #[must_use]
    pub fn pages(&self) -> &P {
        &self.pages
    }

    #[must_use]
    pub fn shadow(&self) -> &S {
        &self.shadow
    }

    #[must_use]
    pub fn heap(&self) -> &H {
        &self.heap
    }

    #[must_use]
    pub fn config(&self) -> &QasanConfig {
        &self.config
    }

    /// Entry point of the synthesized QASan instruction.
    ///
    /// Any code this build does not know about means the guest-side
    /// instrumentation and this runtime are out of sync: the process is
    /// aborted.
    ///
    /// # Safety
    /// See [`Qasan::dispatch`].
    pub unsafe fn fake_instr(
        &self,
        cpu: &P::Cpu,
        action: GuestAddr,
        arg1: GuestAddr,
        arg2: GuestAddr,
        arg3: GuestAddr,
    ) -> GuestAddr {
        match QasanAction::decode(action, arg1, arg2, arg3) {
            Ok(action) => unsafe { self.dispatch(cpu, action) },
            Err(err) => exit::fatal(format_args!("{err}")),
        }
    }

    /// Performs `action` on behalf of the guest.
    ///
    /// Returns [`TRANSLATION_FAILED`] as soon as one of the guest addresses
    /// involved does not translate. Actions without a result return `0`.
    ///
    /// # Safety
    /// Every host address the page table hands out must be backed by live
    /// host memory for the duration of the call, as is the case when the
    /// guest address space is a view on the host one.
    pub unsafe fn dispatch(&self, cpu: &P::Cpu, action: QasanAction) -> GuestAddr {
        if self.config.debug {
            info!("dispatch - {action:?}");
        }
        let res = match action {
            QasanAction::CheckLoad { addr, len } => self
                .pages
                .translate(cpu, addr, Access::Read)
                .map(|h| self.shadow.load_n(h, len)),
            QasanAction::CheckStore { addr, len } => self
                .pages
                .translate(cpu, addr, Access::Write)
                .map(|h| self.shadow.store_n(h, len)),
            QasanAction::Poison { addr, len } => self
                .pages
                .translate(cpu, addr, Access::Read)
                .map(|h| self.shadow.poison(h, len)),
            QasanAction::Unpoison { addr, len } => self
                .pages
                .translate(cpu, addr, Access::Read)
                .map(|h| self.shadow.unpoison(h, len)),
            #[cfg(feature = "usermode")]
            QasanAction::Heap(action) => return unsafe { self.heap_action(cpu, action) },
            #[cfg(feature = "usermode")]
            QasanAction::Libc(action) => return unsafe { self.libc_action(cpu, action) },
        };
        Self::complete(res.map(|()| 0))
    }

    pub(crate) fn complete(res: Result<GuestAddr, TranslationFault>) -> GuestAddr {
        res.unwrap_or_else(|fault| {
            debug!("dispatch - {fault}");
            TRANSLATION_FAILED
        })
    }
}
