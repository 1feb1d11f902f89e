//! Blocking the owning thread on an exchange without starving its events.
//!
//! A synchronous call made on the context's owning thread cannot simply block:
//! credential prompts must run on that very thread. Instead the exchange is
//! driven on a short-lived downloader thread while the caller waits on a
//! [`Handshake`]. The handshake's phase moves through
//!
//! ```text
//! Running --(worker needs the owner)--> OwnerRequested
//! OwnerRequested --(owner pumped its queue)--> OwnerServiced
//! any --(worker done, or panicked)--> Finished
//! ```
//!
//! The mutex guards the phase only; exchange state lives elsewhere.

use std::future::Future;

use ows_bridge_core::logging::{PerfSpan, span_names, targets};
use ows_bridge_core::EventQueue;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::context::NetworkContext;

const WORKER_THREAD_NAME: &str = "ows-bridge-downloader";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Running,
    OwnerRequested,
    OwnerServiced,
    Finished,
}

/// Wait/wake protocol between a blocked owner thread and a downloader.
#[derive(Debug)]
pub(crate) struct Handshake {
    phase: Mutex<Phase>,
    cond: Condvar,
}

impl Handshake {
    pub(crate) fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Running),
            cond: Condvar::new(),
        }
    }

    /// Worker side: wake the owner so it pumps its event queue, and wait
    /// until it has.
    pub(crate) fn resume_owner(&self) {
        let mut phase = self.phase.lock();
        if *phase == Phase::Finished {
            return;
        }
        *phase = Phase::OwnerRequested;
        self.cond.notify_all();
        tracing::debug!(target: targets::BRIDGE, "waiting for owner thread");
        while *phase == Phase::OwnerRequested {
            self.cond.wait(&mut phase);
        }
    }

    /// Worker side: publish completion.
    pub(crate) fn finish(&self) {
        *self.phase.lock() = Phase::Finished;
        self.cond.notify_all();
    }

    /// Owner side: service requests from the worker until it finishes.
    pub(crate) fn serve(&self, events: &EventQueue) {
        events.affinity().debug_assert_same_thread();
        let mut phase = self.phase.lock();
        loop {
            match *phase {
                Phase::Finished => return,
                Phase::OwnerRequested => {
                    let pumped = MutexGuard::unlocked(&mut phase, || events.process_events());
                    match pumped {
                        Ok(executed) => {
                            tracing::debug!(target: targets::BRIDGE, executed, "owner events serviced");
                        }
                        Err(err) => {
                            tracing::error!(target: targets::BRIDGE, %err, "cannot service owner events");
                        }
                    }
                    if *phase == Phase::OwnerRequested {
                        *phase = Phase::OwnerServiced;
                    }
                    self.cond.notify_all();
                }
                Phase::Running | Phase::OwnerServiced => self.cond.wait(&mut phase),
            }
        }
    }
}

// Marks the handshake finished however the worker exits.
struct FinishOnDrop<'a>(&'a Handshake);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Drive `exchange` on a downloader thread while the calling (owning) thread
/// services the handshake.
///
/// Returns the exchange's success flag; a panicking exchange counts as a
/// failure.
///
/// # Errors
///
/// Returns an error if the downloader thread cannot be spawned, in which
/// case `exchange` never ran.
pub(crate) fn run_on_worker<F>(
    context: &NetworkContext,
    handshake: &Handshake,
    exchange: F,
) -> std::io::Result<bool>
where
    F: Future<Output = bool> + Send,
{
    let _span = PerfSpan::new(span_names::BRIDGE_WAIT);

    std::thread::scope(|scope| {
        let worker = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn_scoped(scope, || {
                let _finished = FinishOnDrop(handshake);
                context.block_on(exchange)
            })?;

        handshake.serve(context.events());

        Ok(worker.join().unwrap_or_else(|_| {
            tracing::error!(target: targets::BRIDGE, "downloader thread panicked");
            false
        }))
    })
}
