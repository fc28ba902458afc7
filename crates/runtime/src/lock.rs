//! A single-core, cooperative-scheduling [`mutex_api::Mutex`].
//!
//! There is never more than one thread of execution here, so mutual
//! exclusion only needs to catch reentrancy bugs, not arbitrate between
//! cores. `RefCell` does exactly that: a second `lock()` call while a guard
//! from the first is still live panics instead of silently aliasing.

use core::cell::RefCell;
use core::ops::{Deref, DerefMut};

use mutex_api::Mutex;

pub struct CooperativeLock<T>(RefCell<T>);

unsafe impl<T> Sync for CooperativeLock<T> {}

pub struct Guard<'a, T>(core::cell::RefMut<'a, T>);

impl<T> Deref for Guard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Guard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> Mutex for CooperativeLock<T> {
    type Data = T;
    type Guard<'a>
        = Guard<'a, T>
    where
        T: 'a;

    fn new(data: T) -> Self {
        Self(RefCell::new(data))
    }

    fn lock(&self) -> Guard<'_, T> {
        Guard(self.0.borrow_mut())
    }
}
