use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use worker_api::{LogKind, TerminalPayload, WorkerApiError, WorkerStreamEvent};

use crate::transport::WorkerTransport;

/// Identifier for one submitted run; signals from replaced runs are stale.
pub type RunId = u64;

/// Signal produced by the submit and stream worker threads, consumed on the
/// orchestrator's frame boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSignal {
    Queued { command_id: String },
    SubmitFailed { error: String },
    Progress { message: String, kind: LogKind },
    Terminal(TerminalPayload),
    /// The transport ended without a terminal event.
    Closed { error: Option<String> },
}

pub(crate) type SignalQueue = Arc<Mutex<VecDeque<(RunId, StreamSignal)>>>;

pub(crate) fn push_signal(queue: &SignalQueue, run: RunId, signal: StreamSignal) {
    lock_unpoisoned(queue).push_back((run, signal));
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Handle for one live stream subscription.
///
/// Ownership transfers to [`LogStream`] on open; closing sets the shared
/// cancellation flag and joins the worker thread. Once closed a subscription
/// is dead.
#[derive(Debug)]
pub struct Subscription {
    run: RunId,
    cancel: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn run(&self) -> RunId {
        self.run
    }

    pub fn cancel_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn close(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            if join.thread().id() != thread::current().id() {
                let _ = join.join();
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

/// Owns the single live subscription for one orchestrator instance.
pub struct LogStream {
    transport: Arc<dyn WorkerTransport>,
    queue: SignalQueue,
    active: Option<Subscription>,
}

impl LogStream {
    pub(crate) fn new(transport: Arc<dyn WorkerTransport>, queue: SignalQueue) -> Self {
        Self {
            transport,
            queue,
            active: None,
        }
    }

    pub fn has_active(&self) -> bool {
        self.active.is_some()
    }

    /// Open a subscription for `command_id`, tearing down any previous one
    /// synchronously first. Never leaves two live subscriptions behind.
    pub(crate) fn open(&mut self, run: RunId, command_id: &str) {
        self.close();

        let cancel = Arc::new(AtomicBool::new(false));
        let transport = Arc::clone(&self.transport);
        let queue = Arc::clone(&self.queue);
        let command_id = command_id.to_string();
        let thread_cancel = Arc::clone(&cancel);

        let spawned = thread::Builder::new()
            .name(format!("command-stream-{run}"))
            .spawn(move || {
                let result = transport.stream(&command_id, &thread_cancel, &mut |event| {
                    match event {
                        WorkerStreamEvent::Log { message, kind } => {
                            push_signal(&queue, run, StreamSignal::Progress { message, kind });
                        }
                        // The handshake carries no information the orchestrator
                        // needs; terminal payloads come back as the return value.
                        WorkerStreamEvent::Connected { .. } | WorkerStreamEvent::Done(_) => {}
                    }
                });

                match result {
                    Ok(Some(payload)) => {
                        push_signal(&queue, run, StreamSignal::Terminal(payload));
                    }
                    Ok(None) => push_signal(&queue, run, StreamSignal::Closed { error: None }),
                    Err(WorkerApiError::Cancelled) => {}
                    Err(error) => push_signal(
                        &queue,
                        run,
                        StreamSignal::Closed {
                            error: Some(error.to_string()),
                        },
                    ),
                }
            });

        match spawned {
            Ok(join) => {
                self.active = Some(Subscription {
                    run,
                    cancel,
                    join: Some(join),
                });
            }
            Err(error) => push_signal(
                &self.queue,
                run,
                StreamSignal::Closed {
                    error: Some(format!("failed to spawn stream worker: {error}")),
                },
            ),
        }
    }

    /// Tear down the active subscription, if any. Safe to call repeatedly.
    pub(crate) fn close(&mut self) {
        if let Some(mut subscription) = self.active.take() {
            subscription.close();
        }
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.close();
    }
}
