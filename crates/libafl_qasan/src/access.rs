//! # access
//! Helpers called by translated code on every ordinary guest load and store.
//!
//! A guest address that does not translate is not reported here: the access
//! itself will fault through the emulator's normal path.
use crate::{
    GuestAddr,
    allocator::HeapBackend,
    dispatch::Qasan,
    pages::{Access, PageTable},
    shadow::Shadow,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Load,
    Store,
}

impl From<Direction> for Access {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Load => Access::Read,
            Direction::Store => Access::Write,
        }
    }
}

impl<P, S, H> Qasan<P, S, H>
where
    P: PageTable,
    S: Shadow,
    H: HeapBackend,
{
    /// Checks an `N` byte guest access. `_off` is part of the helper ABI and
    /// is not used.
    #[inline]
    pub fn check_access<const N: usize>(
        &self,
        cpu: &P::Cpu,
        addr: GuestAddr,
        _off: u32,
        direction: Direction,
    ) {
        const { assert!(N == 1 || N == 2 || N == 4 || N == 8) };

        let Ok(h) = self.pages.translate(cpu, addr, direction.into()) else {
            return;
        };

        match (direction, N) {
            (Direction::Load, 1) => self.shadow.load1(h),
            (Direction::Load, 2) => self.shadow.load2(h),
            (Direction::Load, 4) => self.shadow.load4(h),
            (Direction::Load, _) => self.shadow.load8(h),
            (Direction::Store, 1) => self.shadow.store1(h),
            (Direction::Store, 2) => self.shadow.store2(h),
            (Direction::Store, 4) => self.shadow.store4(h),
            (Direction::Store, _) => self.shadow.store8(h),
        }
    }

    pub fn load1(&self, cpu: &P::Cpu, addr: GuestAddr, off: u32) {
        self.check_access::<1>(cpu, addr, off, Direction::Load);
    }

    pub fn load2(&self, cpu: &P::Cpu, addr: GuestAddr, off: u32) {
        self.check_access::<2>(cpu, addr, off, Direction::Load);
    }

    pub fn load4(&self, cpu: &P::Cpu, addr: GuestAddr, off: u32) {
        self.check_access::<4>(cpu, addr, off, Direction::Load);
    }

    pub fn load8(&self, cpu: &P::Cpu, addr: GuestAddr, off: u32) {
        self.check_access::<8>(cpu, addr, off, Direction::Load);
    }

    pub fn store1(&self, cpu: &P::Cpu, addr: GuestAddr, off: u32) {
        self.check_access::<1>(cpu, addr, off, Direction::Store);
    }

    pub fn store2(&self, cpu: &P::Cpu, addr: GuestAddr, off: u32) {
        self.check_access::<2>(cpu, addr, off, Direction::Store);
    }

    pub fn store4(&self, cpu: &P::Cpu, addr: GuestAddr, off: u32) {
        self.check_access::<4>(cpu, addr, off, Direction::Store);
    }

    pub fn store8(&self, cpu: &P::Cpu, addr: GuestAddr, off: u32) {
        self.check_access::<8>(cpu, addr, off, Direction::Store);
    }
}
