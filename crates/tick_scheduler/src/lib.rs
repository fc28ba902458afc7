//! Hashed timing wheel cooperative scheduler.
//!
//! Grounded on the donor codebase's `TICKS` single-producer tick counter
//! (bumped from interrupt context, observed from the main context) and its
//! cooperative run-loop shape; the wheel/long-list/deferred-pool algorithm
//! itself has no donor analogue and follows the timing-wheel design
//! directly. Task storage is an index-based free list over fixed arrays, no
//! heap, no intrusive pointers.

#![cfg_attr(not(test), no_std)]

use core::sync::atomic::{AtomicU32, Ordering};

use arrayvec::ArrayVec;
use status::Error;

pub use status::Result;

/// A monotonically increasing tick counter, bumped by a single producer
/// (typically a timer interrupt handler) and observed by [`Scheduler::poll`].
#[derive(Default)]
pub struct TickCounter(AtomicU32);

impl TickCounter {
    /// Creates a counter starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Advances the counter by one tick. Called only from the tick context.
    pub fn tick(&self) {
        self.0.fetch_add(1, Ordering::Release);
    }

    /// Reads the current tick value.
    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}

/// Converts a millisecond period into a tick count, rounding up and
/// clamping to a minimum of one tick.
#[must_use]
pub const fn ms_to_ticks(period_ms: u32, ms_per_tick: u32) -> u32 {
    let ticks = period_ms.div_ceil(ms_per_tick);
    if ticks == 0 { 1 } else { ticks }
}

/// Handle to a registered periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskId(usize);

impl TaskId {
    /// The task's slot index in the scheduler's task table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Handle to a pending deferred (one-shot) task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredId(usize);

impl DeferredId {
    /// The task's slot index in the deferred pool.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

struct PeriodicTask {
    func: fn(),
    period: u32,
    /// Ticks accumulated since the last time this entry's remaining time
    /// was evaluated, while parked in the long list.
    accumulated: u32,
}

struct DeferredTask {
    func: fn(),
    period: u32,
    elapsed: u32,
}

enum Location {
    Bucket(usize),
    LongList,
}

fn schedule_location(cur_bucket: usize, period: u32, wheel_size: usize) -> Location {
    if (period as usize) <= wheel_size {
        Location::Bucket((cur_bucket + period as usize) % wheel_size)
    } else {
        Location::LongList
    }
}

/// Cooperative tick-driven scheduler: a hashed timing wheel for periodic
/// tasks plus a fixed pool of one-shot deferred tasks.
///
/// `WHEEL_SIZE` must be a power of two. `MAX_TASKS` bounds the number of
/// simultaneously registered periodic tasks (whether wheel-bound or parked
/// in the long list). `MAX_DEFER` bounds simultaneously pending deferred
/// tasks.
pub struct Scheduler<const WHEEL_SIZE: usize, const MAX_TASKS: usize, const MAX_DEFER: usize> {
    tasks: [Option<PeriodicTask>; MAX_TASKS],
    buckets: [ArrayVec<usize, MAX_TASKS>; WHEEL_SIZE],
    long_list: ArrayVec<usize, MAX_TASKS>,
    defer: [Option<DeferredTask>; MAX_DEFER],
    cur_bucket: usize,
    prev_tick: u32,
}

impl<const WHEEL_SIZE: usize, const MAX_TASKS: usize, const MAX_DEFER: usize> Default
    for Scheduler<WHEEL_SIZE, MAX_TASKS, MAX_DEFER>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const WHEEL_SIZE: usize, const MAX_TASKS: usize, const MAX_DEFER: usize>
    Scheduler<WHEEL_SIZE, MAX_TASKS, MAX_DEFER>
{
    /// Creates an empty scheduler.
    ///
    /// # Panics
    ///
    /// Panics if `WHEEL_SIZE` is not a power of two.
    #[must_use]
    pub fn new() -> Self {
        assert!(
            WHEEL_SIZE.is_power_of_two(),
            "wheel size must be a power of two"
        );
        Self {
            tasks: [const { None }; MAX_TASKS],
            buckets: [const { ArrayVec::new_const() }; WHEEL_SIZE],
            long_list: ArrayVec::new_const(),
            defer: [const { None }; MAX_DEFER],
            cur_bucket: 0,
            prev_tick: 0,
        }
    }

    /// Registers a task to run every `period_ticks` ticks (minimum 1),
    /// starting `period_ticks` ticks from now.
    pub fn register_periodic(&mut self, func: fn(), period_ticks: u32) -> Result<TaskId> {
        let period = period_ticks.max(1);
        let slot = self
            .tasks
            .iter()
            .position(Option::is_none)
            .ok_or(Error::SchedulerFull)?;

        match schedule_location(self.cur_bucket, period, WHEEL_SIZE) {
            Location::Bucket(bucket) => {
                self.buckets[bucket]
                    .try_push(slot)
                    .map_err(|_| Error::SchedulerFull)?;
            }
            Location::LongList => {
                self.long_list
                    .try_push(slot)
                    .map_err(|_| Error::SchedulerFull)?;
            }
        }

        self.tasks[slot] = Some(PeriodicTask {
            func,
            period,
            accumulated: 0,
        });
        Ok(TaskId(slot))
    }

    /// Submits a one-shot task to run once, `delay_ticks` ticks from now.
    pub fn submit_deferred(&mut self, func: fn(), delay_ticks: u32) -> Result<DeferredId> {
        let slot = self
            .defer
            .iter()
            .position(Option::is_none)
            .ok_or(Error::DeferredPoolFull)?;
        self.defer[slot] = Some(DeferredTask {
            func,
            period: delay_ticks.max(1),
            elapsed: 0,
        });
        Ok(DeferredId(slot))
    }

    /// Drains every tick recorded by `counter` since the last call,
    /// dispatching ready tasks one tick at a time.
    pub fn poll(&mut self, counter: &TickCounter) {
        while self.prev_tick != counter.get() {
            self.prev_tick = self.prev_tick.wrapping_add(1);
            self.advance_one_tick();
        }
    }

    fn advance_one_tick(&mut self) {
        self.cur_bucket = (self.cur_bucket + 1) % WHEEL_SIZE;

        if self.cur_bucket == 0 {
            self.promote_long_list();
        }
        self.drain_bucket(self.cur_bucket);
        self.drain_deferred();
    }

    fn promote_long_list(&mut self) {
        let mut i = 0;
        while i < self.long_list.len() {
            let slot = self.long_list[i];
            let period = self.tasks[slot]
                .as_ref()
                .expect("long-list entry always has a live task")
                .period;
            let accumulated = {
                let task = self.tasks[slot].as_mut().expect("checked above");
                #[allow(clippy::cast_possible_truncation)]
                {
                    task.accumulated += WHEEL_SIZE as u32;
                }
                task.accumulated
            };
            let remaining = period.saturating_sub(accumulated);

            if remaining == 0 {
                (self.tasks[slot].as_ref().expect("checked above").func)();
                self.tasks[slot].as_mut().expect("checked above").accumulated = 0;
                i += 1;
            } else if (remaining as usize) < WHEEL_SIZE {
                self.long_list.swap_remove(i);
                let bucket = (self.cur_bucket + remaining as usize) % WHEEL_SIZE;
                self.tasks[slot].as_mut().expect("checked above").accumulated = 0;
                self.buckets[bucket]
                    .try_push(slot)
                    .expect("bucket capacity equals the task table capacity");
            } else {
                i += 1;
            }
        }
    }

    fn drain_bucket(&mut self, bucket: usize) {
        let entries: ArrayVec<usize, MAX_TASKS> = self.buckets[bucket].drain(..).collect();
        for slot in entries {
            let (func, period) = {
                let task = self.tasks[slot].as_ref().expect("bucket entry is live");
                (task.func, task.period)
            };
            func();
            match schedule_location(self.cur_bucket, period, WHEEL_SIZE) {
                Location::Bucket(bucket) => {
                    self.buckets[bucket]
                        .try_push(slot)
                        .expect("bucket capacity equals the task table capacity");
                }
                Location::LongList => {
                    self.tasks[slot].as_mut().expect("checked above").accumulated = 0;
                    self.long_list
                        .try_push(slot)
                        .expect("long list capacity equals the task table capacity");
                }
            }
        }
    }

    fn drain_deferred(&mut self) {
        for entry in &mut self.defer {
            let Some(task) = entry else { continue };
            task.elapsed += 1;
            if task.elapsed >= task.period {
                (task.func)();
                *entry = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    static COUNTS: [AtomicU32; 3] = [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)];

    fn reset_counts() {
        for c in &COUNTS {
            c.store(0, Ordering::SeqCst);
        }
    }

    fn bump0() {
        COUNTS[0].fetch_add(1, Ordering::SeqCst);
    }
    fn bump1() {
        COUNTS[1].fetch_add(1, Ordering::SeqCst);
    }
    fn bump2() {
        COUNTS[2].fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn wheel_dispatches_tasks_at_their_declared_periods() {
        reset_counts();
        let counter = TickCounter::new();
        let mut scheduler: Scheduler<32, 8, 4> = Scheduler::new();
        scheduler.register_periodic(bump0, 1).unwrap();
        scheduler.register_periodic(bump1, 32).unwrap();
        scheduler.register_periodic(bump2, 100).unwrap();

        for _ in 0..100 {
            counter.tick();
            scheduler.poll(&counter);
        }

        assert_eq!(COUNTS[0].load(Ordering::SeqCst), 100);
        assert_eq!(COUNTS[1].load(Ordering::SeqCst), 3);
        assert_eq!(COUNTS[2].load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deferred_task_runs_once_and_frees_its_slot() {
        reset_counts();
        let counter = TickCounter::new();
        let mut scheduler: Scheduler<32, 8, 4> = Scheduler::new();

        for _ in 0..10 {
            counter.tick();
            scheduler.poll(&counter);
        }
        scheduler.submit_deferred(bump0, 5).unwrap();
        for _ in 0..4 {
            counter.tick();
            scheduler.poll(&counter);
        }
        assert_eq!(COUNTS[0].load(Ordering::SeqCst), 0);
        counter.tick();
        scheduler.poll(&counter);
        assert_eq!(COUNTS[0].load(Ordering::SeqCst), 1);

        // slot was freed; resubmitting must succeed.
        scheduler.submit_deferred(bump0, 1).unwrap();
    }

    #[test]
    fn deferred_pool_exhaustion_is_reported() {
        let mut scheduler: Scheduler<32, 8, 1> = Scheduler::new();
        scheduler.submit_deferred(bump0, 1).unwrap();
        assert_eq!(
            scheduler.submit_deferred(bump0, 1),
            Err(Error::DeferredPoolFull)
        );
    }

    #[test]
    fn ms_to_ticks_rounds_up_and_clamps_to_one() {
        assert_eq!(ms_to_ticks(0, 1), 1);
        assert_eq!(ms_to_ticks(5, 1), 5);
        assert_eq!(ms_to_ticks(5, 2), 3);
    }
}
