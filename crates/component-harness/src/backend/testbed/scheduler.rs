//! Deterministic task scheduler with a virtual clock.
//!
//! Work is drained in priority order, one queue per pump cycle:
//!
//! 1. every microtask queued before the cycle started,
//! 2. otherwise every animation frame callback queued before the cycle,
//! 3. otherwise the earliest timer, advancing the virtual clock to its due time.
//!
//! Time never advances on its own; tests stay deterministic regardless of
//! wall-clock speed.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use super::dom::Dom;

/// Deferred unit of work. Receives the tree and the scheduler so it can
/// mutate the UI and queue follow-up work.
pub type Task = Box<dyn FnOnce(&mut Dom, &mut Scheduler) + Send>;

/// Handle for cancelling a pending timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Pending work queues plus the virtual clock
#[derive(Default)]
pub struct Scheduler {
    microtasks: VecDeque<Task>,
    frames: Vec<Task>,
    timers: BTreeMap<(u64, u64), Task>,
    now_ms: u64,
    next_seq: u64,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("microtasks", &self.microtasks.len())
            .field("frames", &self.frames.len())
            .field("timers", &self.timers.len())
            .field("now_ms", &self.now_ms)
            .finish()
    }
}

impl Scheduler {
    /// Create an idle scheduler at virtual time zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in milliseconds
    #[must_use]
    pub const fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Number of queued tasks across all queues
    #[must_use]
    pub fn pending(&self) -> usize {
        self.microtasks.len() + self.frames.len() + self.timers.len()
    }

    /// Whether nothing is queued
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Queue a microtask
    pub fn queue_microtask<F>(&mut self, task: F)
    where
        F: FnOnce(&mut Dom, &mut Scheduler) + Send + 'static,
    {
        self.microtasks.push_back(Box::new(task));
    }

    /// Queue a callback for the next animation frame
    pub fn request_animation_frame<F>(&mut self, task: F)
    where
        F: FnOnce(&mut Dom, &mut Scheduler) + Send + 'static,
    {
        self.frames.push(Box::new(task));
    }

    /// Run `task` once `delay_ms` of virtual time has passed
    pub fn set_timeout<F>(&mut self, delay_ms: u64, task: F) -> TimerId
    where
        F: FnOnce(&mut Dom, &mut Scheduler) + Send + 'static,
    {
        let seq = self.next_seq;
        self.next_seq += 1;
        let due = self.now_ms.saturating_add(delay_ms);
        self.timers.insert((due, seq), Box::new(task));
        TimerId(seq)
    }

    /// Cancel a pending timer. Returns whether it was still pending.
    pub fn clear_timeout(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|(_, seq), _| *seq != id.0);
        self.timers.len() != before
    }

    /// Run one pump cycle. Returns `false` when there was nothing to run.
    pub fn run_cycle(&mut self, dom: &mut Dom) -> bool {
        if !self.microtasks.is_empty() {
            let batch: Vec<Task> = self.microtasks.drain(..).collect();
            for task in batch {
                task(dom, self);
            }
            return true;
        }

        if !self.frames.is_empty() {
            let batch = std::mem::take(&mut self.frames);
            for task in batch {
                task(dom, self);
            }
            return true;
        }

        if let Some(((due, _), task)) = self.timers.pop_first() {
            self.now_ms = self.now_ms.max(due);
            task(dom, self);
            return true;
        }

        false
    }

    /// Pump until idle or until `max_cycles` cycles ran.
    ///
    /// # Errors
    ///
    /// Returns the number of cycles spent and the work still pending when
    /// the bound is exhausted.
    pub fn run_until_idle(&mut self, dom: &mut Dom, max_cycles: u64) -> Result<u64, (u64, usize)> {
        let mut cycles = 0;
        while !self.is_idle() {
            if cycles >= max_cycles {
                return Err((cycles, self.pending()));
            }
            self.run_cycle(dom);
            cycles += 1;
        }
        Ok(cycles)
    }

    /// Advance the virtual clock by `ms`, draining microtasks, frames and
    /// every timer due inside the window. Timers beyond it stay queued.
    ///
    /// # Errors
    ///
    /// Returns the cycles spent and the work still pending when `max_cycles`
    /// cycles ran without reaching the end of the window. The clock is left
    /// where the last timer put it.
    pub fn advance_by(&mut self, dom: &mut Dom, ms: u64, max_cycles: u64) -> Result<u64, (u64, usize)> {
        let target = self.now_ms.saturating_add(ms);
        let mut cycles = 0;
        loop {
            let due = !self.microtasks.is_empty()
                || !self.frames.is_empty()
                || self.timers.keys().next().is_some_and(|(due, _)| *due <= target);
            if !due {
                break;
            }
            if cycles >= max_cycles {
                return Err((cycles, self.pending()));
            }
            self.run_cycle(dom);
            cycles += 1;
        }
        self.now_ms = target;
        Ok(cycles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, Arc<Mutex<Vec<&'static str>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (Arc::clone(&log), log)
    }

    mod ordering_tests {
        use super::*;

        #[test]
        fn test_microtasks_before_frames_before_timers() {
            let (log, handle) = recorder();
            let mut dom = Dom::new();
            let mut scheduler = Scheduler::new();

            let l = Arc::clone(&log);
            scheduler.set_timeout(0, move |_, _| l.lock().unwrap().push("timer"));
            let l = Arc::clone(&log);
            scheduler.request_animation_frame(move |_, _| l.lock().unwrap().push("frame"));
            let l = Arc::clone(&log);
            scheduler.queue_microtask(move |_, _| l.lock().unwrap().push("micro"));

            assert_eq!(scheduler.run_until_idle(&mut dom, 10), Ok(3));
            assert_eq!(*handle.lock().unwrap(), vec!["micro", "frame", "timer"]);
        }

        #[test]
        fn test_timers_fire_in_due_order() {
            let (log, handle) = recorder();
            let mut dom = Dom::new();
            let mut scheduler = Scheduler::new();

            let l = Arc::clone(&log);
            scheduler.set_timeout(50, move |_, _| l.lock().unwrap().push("late"));
            let l = Arc::clone(&log);
            scheduler.set_timeout(10, move |_, _| l.lock().unwrap().push("early"));

            scheduler.run_until_idle(&mut dom, 10).unwrap();
            assert_eq!(*handle.lock().unwrap(), vec!["early", "late"]);
            assert_eq!(scheduler.now_ms(), 50);
        }

        #[test]
        fn test_microtask_queued_by_microtask_runs_next_cycle() {
            let mut dom = Dom::new();
            let mut scheduler = Scheduler::new();
            scheduler.queue_microtask(|_, s| s.queue_microtask(|_, _| {}));

            assert!(scheduler.run_cycle(&mut dom));
            assert_eq!(scheduler.pending(), 1);
            assert!(scheduler.run_cycle(&mut dom));
            assert!(!scheduler.run_cycle(&mut dom));
        }
    }

    mod bound_tests {
        use super::*;

        fn reschedule(_: &mut Dom, scheduler: &mut Scheduler) {
            scheduler.set_timeout(10, reschedule);
        }

        #[test]
        fn test_self_rescheduling_timer_exhausts_bound() {
            let mut dom = Dom::new();
            let mut scheduler = Scheduler::new();
            scheduler.set_timeout(10, reschedule);

            assert_eq!(scheduler.run_until_idle(&mut dom, 25), Err((25, 1)));
        }

        #[test]
        fn test_clear_timeout() {
            let mut dom = Dom::new();
            let mut scheduler = Scheduler::new();
            let id = scheduler.set_timeout(10, |_, _| panic!("cancelled timer ran"));
            assert!(scheduler.clear_timeout(id));
            assert!(!scheduler.clear_timeout(id));
            assert_eq!(scheduler.run_until_idle(&mut dom, 5), Ok(0));
        }
    }

    mod clock_tests {
        use super::*;

        #[test]
        fn test_advance_by_runs_only_due_timers() {
            let (log, handle) = recorder();
            let mut dom = Dom::new();
            let mut scheduler = Scheduler::new();

            let l = Arc::clone(&log);
            scheduler.set_timeout(100, move |_, _| l.lock().unwrap().push("100"));
            let l = Arc::clone(&log);
            scheduler.set_timeout(300, move |_, _| l.lock().unwrap().push("300"));

            assert_eq!(scheduler.advance_by(&mut dom, 150, 10), Ok(1));
            assert_eq!(*handle.lock().unwrap(), vec!["100"]);
            assert_eq!(scheduler.now_ms(), 150);
            assert_eq!(scheduler.pending(), 1);
        }

        #[test]
        fn test_timeout_is_relative_to_virtual_now() {
            let mut dom = Dom::new();
            let mut scheduler = Scheduler::new();
            scheduler.advance_by(&mut dom, 1000, 10).unwrap();
            scheduler.set_timeout(5, |_, _| {});
            scheduler.run_until_idle(&mut dom, 5).unwrap();
            assert_eq!(scheduler.now_ms(), 1005);
        }

        fn rearm(_: &mut Dom, scheduler: &mut Scheduler) {
            scheduler.set_timeout(0, rearm);
        }

        #[test]
        fn test_advance_by_stops_at_cycle_bound() {
            let mut dom = Dom::new();
            let mut scheduler = Scheduler::new();
            scheduler.set_timeout(0, rearm);

            assert_eq!(scheduler.advance_by(&mut dom, 10, 25), Err((25, 1)));
            assert_eq!(scheduler.now_ms(), 0);
        }

        #[test]
        fn test_advance_by_bounds_requeued_microtasks() {
            fn requeue(_: &mut Dom, scheduler: &mut Scheduler) {
                scheduler.queue_microtask(requeue);
            }
            let mut dom = Dom::new();
            let mut scheduler = Scheduler::new();
            scheduler.queue_microtask(requeue);

            assert!(scheduler.advance_by(&mut dom, 0, 8).is_err());
        }
    }
}
