//! Abstraction over blocking and waking the loop thread.
//!
//! When its queue runs dry, an event loop parks its thread through a
//! [`Sleep`] implementation. The contract is the classic
//! check / arm / recheck / sleep sequence used to avoid lost wakeups:
//!
//! * [`prepare_to_sleep`] arms an internal flag. It must be called *before*
//!   the caller re-checks its queue.
//! * [`sleep`] blocks until the flag has been cleared by a wake.
//! * [`wake`] atomically clears the flag and, if it was set, unblocks the
//!   sleeper.
//!
//! If `wake` runs between `prepare_to_sleep` and `sleep`, the flag is
//! already clear when `sleep` is entered and the call returns immediately;
//! the wakeup cannot be lost. Spurious returns from `sleep` are permitted.
//!
//! `prepare_to_sleep` and `sleep` may only be called from the loop thread.
//! `wake` may be called from any thread and is the single cross-thread
//! operation the loop supports; everything else is thread-confined.
//!
//! Two strategies are provided: [`CondvarSleep`] (portable, the default)
//! and [`FutexSleep`] (Linux).
//!
//! [`prepare_to_sleep`]: Sleep::prepare_to_sleep
//! [`sleep`]: Sleep::sleep
//! [`wake`]: Sleep::wake

use std::fmt;
use std::sync::{Arc, Condvar, Mutex};

/// Block the loop thread until woken.
///
/// See [module documentation](self) for the protocol.
pub trait Sleep: Send + Sync {
    /// Arm the sleep flag. Called before the queue is re-checked.
    fn prepare_to_sleep(&self);

    /// Block the current thread until the flag is cleared.
    fn sleep(&self);

    /// Clear the flag, unblocking the sleeper if it was set.
    ///
    /// Callable from any thread.
    fn wake(&self);
}

/// Wakes an event loop from another thread.
///
/// This is the only handle associated with a loop that may cross threads.
#[derive(Clone)]
pub struct WakeHandle {
    sleep: Arc<dyn Sleep>,
}

impl WakeHandle {
    pub(crate) fn new(sleep: Arc<dyn Sleep>) -> WakeHandle {
        WakeHandle { sleep }
    }

    /// Wake the loop if it is sleeping.
    pub fn wake(&self) {
        self.sleep.wake();
    }
}

impl fmt::Debug for WakeHandle {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("WakeHandle").finish()
    }
}

/// Sleep strategy backed by a mutex and condition variable.
///
/// Works on every platform; the armed flag lives under the mutex, so the
/// recheck window between arming and sleeping cannot lose a wake.
#[derive(Debug, Default)]
pub struct CondvarSleep {
    armed: Mutex<bool>,
    condvar: Condvar,
}

impl CondvarSleep {
    /// Create a new condvar-backed sleeper.
    pub fn new() -> CondvarSleep {
        CondvarSleep::default()
    }
}

impl Sleep for CondvarSleep {
    fn prepare_to_sleep(&self) {
        *self.armed.lock().unwrap() = true;
    }

    fn sleep(&self) {
        let mut armed = self.armed.lock().unwrap();
        while *armed {
            armed = self.condvar.wait(armed).unwrap();
        }
    }

    fn wake(&self) {
        let mut armed = self.armed.lock().unwrap();
        if *armed {
            *armed = false;
            self.condvar.notify_one();
        }
    }
}

/// Sleep strategy backed by a futex word.
///
/// Avoids the mutex entirely: the armed flag is a single atomic integer and
/// sleeping threads wait on it directly via `SYS_futex`.
#[cfg(target_os = "linux")]
#[derive(Debug, Default)]
pub struct FutexSleep {
    armed: std::sync::atomic::AtomicU32,
}

#[cfg(target_os = "linux")]
impl FutexSleep {
    /// Create a new futex-backed sleeper.
    pub fn new() -> FutexSleep {
        FutexSleep::default()
    }

    fn futex(&self, op: libc::c_int, val: u32) {
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                &self.armed as *const std::sync::atomic::AtomicU32,
                op,
                val,
                std::ptr::null::<libc::timespec>(),
            );
        }
    }
}

#[cfg(target_os = "linux")]
impl Sleep for FutexSleep {
    fn prepare_to_sleep(&self) {
        use std::sync::atomic::Ordering;
        self.armed.store(1, Ordering::SeqCst);
    }

    fn sleep(&self) {
        use std::sync::atomic::Ordering;
        while self.armed.load(Ordering::SeqCst) == 1 {
            // EINTR and EAGAIN both fall out to the re-check above.
            self.futex(libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG, 1);
        }
    }

    fn wake(&self) {
        use std::sync::atomic::Ordering;
        if self.armed.swap(0, Ordering::SeqCst) != 0 {
            // The flag was armed, so a sleep is in progress (or imminent).
            self.futex(libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG, 1);
        }
    }
}
