// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Process-wide admission state: enabled / paused / busy.
//
// Operators flip `allowed` and `paused`; every job checks them once, before
// any resolution work, and receives an `AdmissionTicket` when admitted.  A
// job holding a ticket runs to completion even if printing is paused while
// it is in flight.
//
// `busy` is advisory.  It is derived from the number of converter processes
// currently running, so overlapping jobs keep it set until the last one
// exits.  Every transition is published on a watch channel for whatever
// renders the status light.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info};

use silentprint_core::error::{PrintError, Result};
use silentprint_core::types::AdmissionState;

#[derive(Debug, Clone, Copy)]
struct Flags {
    allowed: bool,
    paused: bool,
}

/// Proof that a job passed the admission check.
#[derive(Debug)]
pub struct AdmissionTicket {
    _private: (),
}

/// Shared admission state.  Wrap in an `Arc` and hand a clone to every front
/// end and to the operator surface.
pub struct AdmissionController {
    flags: Mutex<Flags>,
    running: AtomicUsize,
    notify: watch::Sender<AdmissionState>,
}

impl AdmissionController {
    /// Startup state: allowed, not paused, idle.
    pub fn new() -> Self {
        let (notify, _) = watch::channel(AdmissionState::INITIAL);
        Self {
            flags: Mutex::new(Flags {
                allowed: true,
                paused: false,
            }),
            running: AtomicUsize::new(0),
            notify,
        }
    }

    fn flags(&self) -> MutexGuard<'_, Flags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enable printing and clear any pause.
    pub fn start(&self) -> AdmissionState {
        let mut flags = self.flags();
        flags.allowed = true;
        flags.paused = false;
        info!("printing started");
        self.publish(&flags)
    }

    /// Pause printing.  Jobs already admitted still finish.
    pub fn pause(&self) -> AdmissionState {
        let mut flags = self.flags();
        flags.paused = true;
        info!("printing paused");
        self.publish(&flags)
    }

    /// Refuse all jobs until `start` is called.
    pub fn disable(&self) -> AdmissionState {
        let mut flags = self.flags();
        flags.allowed = false;
        info!("printing disabled");
        self.publish(&flags)
    }

    /// Current snapshot (the `queryStatus` command).
    pub fn status(&self) -> AdmissionState {
        let flags = self.flags();
        self.snapshot(&flags)
    }

    pub fn is_busy(&self) -> bool {
        self.running.load(Ordering::SeqCst) > 0
    }

    /// Check the flags and admit the job, atomically with respect to
    /// concurrent operator commands.
    pub fn admit(&self) -> Result<AdmissionTicket> {
        let flags = self.flags();
        if flags.allowed && !flags.paused {
            Ok(AdmissionTicket { _private: () })
        } else {
            debug!(allowed = flags.allowed, paused = flags.paused, "job refused at admission");
            Err(PrintError::PrintingSuspended)
        }
    }

    /// Mark a converter run as in progress until the guard drops.
    pub fn busy(&self, _ticket: &AdmissionTicket) -> BusyGuard<'_> {
        if self.running.fetch_add(1, Ordering::SeqCst) == 0 {
            self.publish(&self.flags());
        }
        BusyGuard { controller: self }
    }

    /// Receive every state transition, busy changes included.
    pub fn subscribe(&self) -> watch::Receiver<AdmissionState> {
        self.notify.subscribe()
    }

    fn snapshot(&self, flags: &Flags) -> AdmissionState {
        AdmissionState {
            allowed: flags.allowed,
            paused: flags.paused,
            busy: self.is_busy(),
        }
    }

    fn publish(&self, flags: &Flags) -> AdmissionState {
        let state = self.snapshot(flags);
        self.notify.send_replace(state);
        state
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the busy contribution of one converter run on drop, whatever the
/// exit path.
pub struct BusyGuard<'a> {
    controller: &'a AdmissionController,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if self.controller.running.fetch_sub(1, Ordering::SeqCst) == 1 {
            let flags = self.controller.flags();
            self.controller.publish(&flags);
        }
    }
}
