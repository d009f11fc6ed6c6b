#![allow(dead_code)]

use core::ffi::c_int;
use std::{
    alloc::{Layout, alloc_zeroed, dealloc},
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use libafl_qasan::{
    Access, ActionCode, GuestAddr, HeapBackend, HostAddr, PageFlags, PageTable, Qasan, Shadow,
    TranslationFault, pages::user::UserPages, shadow::ranges_overlap,
};
use log::debug;
use mockall::mock;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

mock! {
    pub Engine {}

    impl Shadow for Engine {
        fn load1(&self, addr: HostAddr);
        fn load2(&self, addr: HostAddr);
        fn load4(&self, addr: HostAddr);
        fn load8(&self, addr: HostAddr);
        fn store1(&self, addr: HostAddr);
        fn store2(&self, addr: HostAddr);
        fn store4(&self, addr: HostAddr);
        fn store8(&self, addr: HostAddr);
        fn load_n(&self, addr: HostAddr, len: usize);
        fn store_n(&self, addr: HostAddr, len: usize);
        fn poison(&self, addr: HostAddr, len: usize);
        fn unpoison(&self, addr: HostAddr, len: usize);
        fn memcpy(&self, dest: HostAddr, src: HostAddr, len: usize);
        fn memmove(&self, dest: HostAddr, src: HostAddr, len: usize);
        fn memset(&self, addr: HostAddr, c: i32, len: usize);
        fn check_overlap(
            &self,
            name: &'static str,
            a: HostAddr,
            a_len: usize,
            b: HostAddr,
            b_len: usize,
        );
    }
}

mock! {
    pub Heap {}

    impl HeapBackend for Heap {
        fn malloc(&self, size: usize) -> Option<HostAddr>;
        fn calloc(&self, nmemb: usize, size: usize) -> Option<HostAddr>;
        fn memalign(&self, align: usize, size: usize) -> Option<HostAddr>;
        fn aligned_alloc(&self, align: usize, size: usize) -> Option<HostAddr>;
        fn posix_memalign(&self, align: usize, size: usize) -> Result<Option<HostAddr>, c_int>;
        fn valloc(&self, size: usize) -> Option<HostAddr>;
        fn pvalloc(&self, size: usize) -> Option<HostAddr>;
        fn free(&self, addr: HostAddr);
        fn usable_size(&self, addr: HostAddr) -> usize;
    }
}

mock! {
    pub Pages {}

    impl PageTable for Pages {
        type Cpu = ();

        fn translate(
            &self,
            cpu: &(),
            addr: GuestAddr,
            access: Access,
        ) -> Result<HostAddr, TranslationFault>;
        fn h2g(&self, host: HostAddr) -> GuestAddr;
        fn mark_range(&self, start: GuestAddr, end: GuestAddr, flags: PageFlags);
    }
}

pub type FakeQasan = Qasan<UserPages, FakeAsan, FakeAsan>;

/// A runtime over [`FakeAsan`] with guest and host address spaces
/// coinciding.
pub fn fake_qasan() -> (FakeQasan, FakeAsan) {
    init_logging();
    let asan = FakeAsan::new(0x10_0000);
    let qasan = Qasan::builder()
        .pages(UserPages::<()>::new(0))
        .shadow(asan.clone())
        .heap(asan.clone())
        .build();
    (qasan, asan)
}

pub fn call(qasan: &FakeQasan, code: ActionCode, args: [GuestAddr; 3]) -> GuestAddr {
    unsafe { qasan.fake_instr(&(), code.into(), args[0], args[1], args[2]) }
}

/// Makes a host buffer reachable from a guest whose `guest_base` is zero.
pub fn map(pages: &UserPages, buf: &[u8]) -> GuestAddr {
    let start = buf.as_ptr() as GuestAddr;
    pages.mark_range(
        start,
        start + buf.len() as GuestAddr,
        PageFlags::READ | PageFlags::WRITE | PageFlags::VALID,
    );
    start
}

pub fn guest(buf: &[u8]) -> GuestAddr {
    buf.as_ptr() as GuestAddr
}

/// Bytes of the C string at `addr`, without the terminator.
///
/// # Safety
/// `addr` must point to a live, terminated string.
pub unsafe fn c_str(addr: GuestAddr) -> Vec<u8> {
    unsafe { core::ffi::CStr::from_ptr(addr as usize as *const _) }
        .to_bytes()
        .to_vec()
}

pub const REDZONE: usize = 16;
const ALIGN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unallocated,
    Addressable,
    LeftRedzone,
    RightRedzone,
    Freed,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    Wild,
    HeapBufferOverflow,
    UseAfterFree,
    UserPoisoned,
    DoubleFree,
    BadFree,
    ParamOverlap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub addr: HostAddr,
    pub len: usize,
    pub write: bool,
}

#[derive(Debug)]
struct Arena {
    base: HostAddr,
    layout: Layout,
    next: usize,
    state: Vec<State>,
    chunks: BTreeMap<HostAddr, usize>,
    violations: Vec<Violation>,
}

impl Arena {
    fn contains(&self, addr: HostAddr) -> bool {
        addr >= self.base && addr < self.base + self.layout.size()
    }

    fn set(&mut self, start: HostAddr, end: HostAddr, state: State) {
        for addr in start..end {
            if self.contains(addr) {
                self.state[addr - self.base] = state;
            }
        }
    }

    fn check(&mut self, addr: HostAddr, len: usize, write: bool) {
        for byte in addr..addr + len {
            if !self.contains(byte) {
                continue;
            }
            let kind = match self.state[byte - self.base] {
                State::Addressable => continue,
                State::Unallocated => ViolationKind::Wild,
                State::LeftRedzone | State::RightRedzone => ViolationKind::HeapBufferOverflow,
                State::Freed => ViolationKind::UseAfterFree,
                State::User => ViolationKind::UserPoisoned,
            };
            debug!("fake asan - {kind:?} at {byte:#x} ({addr:#x}, {len:#x})");
            self.violations.push(Violation {
                kind,
                addr,
                len,
                write,
            });
            return;
        }
    }

    fn alloc(&mut self, align: usize, size: usize) -> Option<HostAddr> {
        let align = align.max(ALIGN);
        let left = self.base + self.next;
        let payload = (left + REDZONE).next_multiple_of(align);
        let end = payload + size;
        let chunk_end = (end + REDZONE).next_multiple_of(ALIGN);
        if chunk_end > self.base + self.layout.size() {
            return None;
        }
        self.set(left, payload, State::LeftRedzone);
        self.set(payload, end, State::Addressable);
        self.set(end, chunk_end, State::RightRedzone);
        self.next = chunk_end - self.base;
        self.chunks.insert(payload, size);
        Some(payload)
    }

    fn overlap(&mut self, name: &str, a: HostAddr, a_len: usize, b: HostAddr, b_len: usize) {
        if ranges_overlap(a, a_len, b, b_len) {
            debug!("fake asan - {name} overlap ({a:#x}, {a_len:#x}) ({b:#x}, {b_len:#x})");
            self.violations.push(Violation {
                kind: ViolationKind::ParamOverlap,
                addr: a,
                len: a_len,
                write: true,
            });
        }
    }

    fn free(&mut self, addr: HostAddr) {
        match self.chunks.remove(&addr) {
            Some(size) => self.set(addr, addr + size, State::Freed),
            None => {
                let kind = if self.contains(addr) && self.state[addr - self.base] == State::Freed
                {
                    ViolationKind::DoubleFree
                } else {
                    ViolationKind::BadFree
                };
                self.violations.push(Violation {
                    kind,
                    addr,
                    len: 0,
                    write: false,
                });
            }
        }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe { dealloc(self.base as *mut u8, self.layout) };
    }
}

/// A tiny stand-in for the sanitizer runtime: a bump heap whose chunks are
/// surrounded by redzones, and a byte granular shadow that records
/// violations instead of aborting.
#[derive(Debug, Clone)]
pub struct FakeAsan(Arc<Mutex<Arena>>);

impl FakeAsan {
    pub fn new(size: usize) -> Self {
        let layout = Layout::from_size_align(size, 4096).unwrap();
        let base = unsafe { alloc_zeroed(layout) } as HostAddr;
        assert_ne!(base, 0);
        Self(Arc::new(Mutex::new(Arena {
            base,
            layout,
            next: 0,
            state: vec![State::Unallocated; size],
            chunks: BTreeMap::new(),
            violations: Vec::new(),
        })))
    }

    fn arena(&self) -> MutexGuard<'_, Arena> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.arena().violations.clone()
    }

    pub fn take_violations(&self) -> Vec<Violation> {
        core::mem::take(&mut self.arena().violations)
    }

    pub fn is_live(&self, addr: HostAddr) -> bool {
        self.arena().chunks.contains_key(&addr)
    }
}

impl Shadow for FakeAsan {
    fn load1(&self, addr: HostAddr) {
        self.arena().check(addr, 1, false);
    }

    fn load2(&self, addr: HostAddr) {
        self.arena().check(addr, 2, false);
    }

    fn load4(&self, addr: HostAddr) {
        self.arena().check(addr, 4, false);
    }

    fn load8(&self, addr: HostAddr) {
        self.arena().check(addr, 8, false);
    }

    fn store1(&self, addr: HostAddr) {
        self.arena().check(addr, 1, true);
    }

    fn store2(&self, addr: HostAddr) {
        self.arena().check(addr, 2, true);
    }

    fn store4(&self, addr: HostAddr) {
        self.arena().check(addr, 4, true);
    }

    fn store8(&self, addr: HostAddr) {
        self.arena().check(addr, 8, true);
    }

    fn load_n(&self, addr: HostAddr, len: usize) {
        self.arena().check(addr, len, false);
    }

    fn store_n(&self, addr: HostAddr, len: usize) {
        self.arena().check(addr, len, true);
    }

    fn poison(&self, addr: HostAddr, len: usize) {
        self.arena().set(addr, addr + len, State::User);
    }

    fn unpoison(&self, addr: HostAddr, len: usize) {
        self.arena().set(addr, addr + len, State::Addressable);
    }

    fn memcpy(&self, dest: HostAddr, src: HostAddr, len: usize) {
        {
            let mut arena = self.arena();
            arena.check(src, len, false);
            arena.check(dest, len, true);
            arena.overlap("memcpy", dest, len, src, len);
        }
        unsafe { core::ptr::copy(src as *const u8, dest as *mut u8, len) };
    }

    fn memmove(&self, dest: HostAddr, src: HostAddr, len: usize) {
        {
            let mut arena = self.arena();
            arena.check(src, len, false);
            arena.check(dest, len, true);
        }
        unsafe { core::ptr::copy(src as *const u8, dest as *mut u8, len) };
    }

    fn memset(&self, addr: HostAddr, c: i32, len: usize) {
        self.arena().check(addr, len, true);
        unsafe { core::ptr::write_bytes(addr as *mut u8, c as u8, len) };
    }

    fn check_overlap(
        &self,
        name: &'static str,
        a: HostAddr,
        a_len: usize,
        b: HostAddr,
        b_len: usize,
    ) {
        self.arena().overlap(name, a, a_len, b, b_len);
    }
}

impl HeapBackend for FakeAsan {
    fn malloc(&self, size: usize) -> Option<HostAddr> {
        self.arena().alloc(ALIGN, size)
    }

    fn calloc(&self, nmemb: usize, size: usize) -> Option<HostAddr> {
        let size = nmemb.checked_mul(size)?;
        let ptr = self.arena().alloc(ALIGN, size)?;
        unsafe { core::ptr::write_bytes(ptr as *mut u8, 0, size) };
        Some(ptr)
    }

    fn memalign(&self, align: usize, size: usize) -> Option<HostAddr> {
        self.arena().alloc(align, size)
    }

    fn aligned_alloc(&self, align: usize, size: usize) -> Option<HostAddr> {
        self.arena().alloc(align, size)
    }

    fn posix_memalign(&self, align: usize, size: usize) -> Result<Option<HostAddr>, c_int> {
        if !align.is_power_of_two() || align % size_of::<usize>() != 0 {
            return Err(libc::EINVAL);
        }
        self.arena().alloc(align, size).map(Some).ok_or(libc::ENOMEM)
    }

    fn valloc(&self, size: usize) -> Option<HostAddr> {
        self.arena().alloc(4096, size)
    }

    fn pvalloc(&self, size: usize) -> Option<HostAddr> {
        self.arena().alloc(4096, size.max(1).next_multiple_of(4096))
    }

    fn free(&self, addr: HostAddr) {
        self.arena().free(addr);
    }

    fn usable_size(&self, addr: HostAddr) -> usize {
        self.arena().chunks.get(&addr).copied().unwrap_or(0)
    }
}
