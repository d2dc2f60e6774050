//! Ctrl-C handling. While a callback listener is armed, an interrupt cancels
//! the wait so the listener is dropped (and its port closed) by normal
//! unwinding. Otherwise the process exits, but only once no critical section
//! (a credentials write or a terminal prompt) is open.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;

use crate::auth::oauth_server::ShutdownHandle;

pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Clone, Default)]
pub struct InterruptGuard {
    armed: Arc<Mutex<Option<ShutdownHandle>>>,
    critical: Arc<Mutex<()>>,
}

/// Holds off an exiting Ctrl-C until dropped.
pub struct Critical<'a> {
    _lock: MutexGuard<'a, ()>,
}

/// Disarms the guard when dropped.
pub struct Armed<'a> {
    guard: &'a InterruptGuard,
}

impl Drop for Armed<'_> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.guard.armed.lock() {
            slot.take();
        }
    }
}

impl InterruptGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the watcher thread. Without it, arming is a no-op.
    pub fn install(&self) -> io::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let guard = self.clone();

        thread::Builder::new()
            .name("ctrl-c".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    while tokio::signal::ctrl_c().await.is_ok() {
                        guard.fire();
                    }
                });
            })?;
        Ok(())
    }

    pub fn arm(&self, handle: ShutdownHandle) -> Armed<'_> {
        if let Ok(mut slot) = self.armed.lock() {
            *slot = Some(handle);
        }
        Armed { guard: self }
    }

    /// Opens a section an interrupt must not tear down halfway, such as an
    /// atomic file write or a prompt that has switched terminal echo off.
    pub fn critical(&self) -> Critical<'_> {
        Critical {
            _lock: self.critical.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// What the watcher does on Ctrl-C. Returns whether a pending wait was
    /// cancelled.
    pub(crate) fn trigger(&self) -> bool {
        let handle = match self.armed.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        match handle {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Blocks until no critical section is open and keeps new ones from
    /// starting while the returned lock is held.
    pub(crate) fn wait_for_quiet(&self) -> MutexGuard<'_, ()> {
        match self.critical.try_lock() {
            Ok(lock) => lock,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => {
                eprintln!("Interrupted, finishing the current step first");
                self.critical.lock().unwrap_or_else(PoisonError::into_inner)
            }
        }
    }

    fn fire(&self) {
        if self.trigger() {
            log::info!("Interrupted, closing callback listener");
            return;
        }
        let _quiet = self.wait_for_quiet();
        eprintln!("Interrupted");
        std::process::exit(INTERRUPTED_EXIT_CODE);
    }
}
