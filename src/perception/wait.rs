use std::time::{Duration, Instant};

/// Time source for every delay and deadline in the crate.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// How long a wait may last. `Never` must be requested explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    After(Duration),
    Never,
}

impl Deadline {
    fn expired(&self, elapsed: Duration) -> bool {
        match self {
            Deadline::After(limit) => elapsed >= *limit,
            Deadline::Never => false,
        }
    }

    /// Budget left after `elapsed` has been spent.
    pub fn remaining(&self, elapsed: Duration) -> Deadline {
        match self {
            Deadline::After(limit) => Deadline::After(limit.saturating_sub(elapsed)),
            Deadline::Never => Deadline::Never,
        }
    }

    /// Shorten `delay` so it does not outlast this deadline.
    pub fn cap(&self, delay: Duration) -> Duration {
        match self {
            Deadline::After(limit) => delay.min(*limit),
            Deadline::Never => delay,
        }
    }
}

impl From<Duration> for Deadline {
    fn from(d: Duration) -> Self {
        Deadline::After(d)
    }
}

impl From<Option<Duration>> for Deadline {
    fn from(d: Option<Duration>) -> Self {
        d.map_or(Deadline::Never, Deadline::After)
    }
}

/// Retry budget for a polling wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub deadline: Deadline,
    /// Checkpoint spacing for the recovery action.
    pub recovery_every: Duration,
}

impl WaitPolicy {
    pub fn new(interval: Duration, deadline: Deadline, recovery_every: Duration) -> Self {
        Self {
            interval,
            deadline,
            recovery_every,
        }
    }
}

/// Poll `attempt` until it yields a value or the deadline passes.
///
/// Every time more than `recovery_every` has elapsed since the last
/// checkpoint without success, `recover` runs once with the remaining
/// budget and a new checkpoint starts. Sleeps never outlast the deadline,
/// so a finite wait returns no later than the deadline plus the cost of
/// the last attempt, provided `recover` stays within the budget it is given.
pub fn poll_until<T>(
    clock: &dyn Clock,
    policy: &WaitPolicy,
    mut attempt: impl FnMut() -> Option<T>,
    mut recover: impl FnMut(Deadline),
) -> Option<T> {
    let start = clock.now();
    let mut checkpoint = start;
    loop {
        if let Some(found) = attempt() {
            return Some(found);
        }
        let now = clock.now();
        if policy.deadline.expired(now.duration_since(start)) {
            return None;
        }
        if now.duration_since(checkpoint) > policy.recovery_every {
            recover(policy.deadline.remaining(now.duration_since(start)));
            checkpoint = clock.now();
        }
        let left = policy.deadline.remaining(clock.now().duration_since(start));
        clock.sleep(left.cap(policy.interval));
    }
}
