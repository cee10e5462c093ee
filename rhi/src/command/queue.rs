//! The device command queue.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use parking_lot::Mutex;

use super::{Command, NodeCommand};
use crate::backend::{BackendError, GpuBackend, NodeIndex};
use crate::config::ExecutionMode;
use crate::error::RhiError;
use crate::sync::{Fence, FenceValue};

/// Commands submitted together; signals `fence_value` once executed.
struct Batch {
    commands: Vec<NodeCommand>,
    fence_value: FenceValue,
}

struct Recording {
    commands: Vec<NodeCommand>,
    sender: Option<flume::Sender<Batch>>,
}

/// Single FIFO of recorded commands, replayed in submission order.
///
/// Recording is thread-safe. In [`ExecutionMode::Immediate`] a submit executes
/// the batch on the calling thread; in [`ExecutionMode::Threaded`] the batch is
/// sent to an executor thread and the submit returns at once. Either way the
/// batch signals the device fence when done.
///
/// A failing command does not stop its batch. The first failure is kept and
/// returned by the next [`CommandQueue::submit`] or [`CommandQueue::flush`].
/// A panicking command marks the device lost.
///
/// Custom commands run while the queue is executing and must not record
/// into the queue themselves.
pub struct CommandQueue {
    backend: Arc<dyn GpuBackend>,
    fence: Arc<Fence>,
    failure: Arc<Mutex<Option<RhiError>>>,
    mode: ExecutionMode,
    recording: Mutex<Recording>,
    last_submitted: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CommandQueue {
    /// Create a queue executing on `backend`.
    pub fn new(backend: Arc<dyn GpuBackend>, mode: ExecutionMode) -> Result<Self, RhiError> {
        let fence = Arc::new(Fence::new());
        let failure = Arc::new(Mutex::new(None));

        let (sender, worker) = match mode {
            ExecutionMode::Immediate => (None, None),
            ExecutionMode::Threaded => {
                let (sender, receiver) = flume::unbounded::<Batch>();
                let backend = Arc::clone(&backend);
                let fence = Arc::clone(&fence);
                let failure = Arc::clone(&failure);
                let worker = std::thread::Builder::new()
                    .name("rhi-executor".into())
                    .spawn(move || {
                        crate::set_thread_name!("rhi-executor");
                        for batch in receiver.iter() {
                            run_batch(backend.as_ref(), &fence, &failure, batch);
                        }
                        log::debug!("CommandQueue: executor thread exiting");
                    })
                    .map_err(|err| {
                        RhiError::invalid_state(format!("failed to spawn executor thread: {err}"))
                    })?;
                (Some(sender), Some(worker))
            }
        };

        Ok(Self {
            backend,
            fence,
            failure,
            mode,
            recording: Mutex::new(Recording {
                commands: Vec::new(),
                sender,
            }),
            last_submitted: AtomicU64::new(0),
            worker: Mutex::new(worker),
        })
    }

    /// Execution mode.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// The device fence.
    pub fn fence(&self) -> &Arc<Fence> {
        &self.fence
    }

    /// Append a command for `node`.
    pub fn record(&self, node: NodeIndex, command: Command) {
        log::trace!("CommandQueue: record {} on node {}", command.name(), node);
        self.recording
            .lock()
            .commands
            .push(NodeCommand { node, command });
    }

    /// Number of commands recorded since the last submit.
    pub fn recorded_len(&self) -> usize {
        self.recording.lock().commands.len()
    }

    /// Fence value the currently recording batch will signal.
    ///
    /// Anything tagged with this value after its last command was recorded is
    /// retired no earlier than that command.
    pub fn pending_fence_value(&self) -> FenceValue {
        self.last_submitted.load(Ordering::Acquire) + 1
    }

    /// Highest fence value submitted.
    pub fn last_submitted(&self) -> FenceValue {
        self.last_submitted.load(Ordering::Acquire)
    }

    /// Close the current batch and hand it off for execution.
    ///
    /// Always creates a batch, even an empty one, so every value returned by
    /// [`Self::pending_fence_value`] is eventually signalled. Returns the
    /// first command failure of any batch executed since the last report; the
    /// batch is submitted either way.
    pub fn submit(&self) -> Result<FenceValue, RhiError> {
        let value = self.submit_batch()?;
        self.take_failure()?;
        Ok(value)
    }

    fn submit_batch(&self) -> Result<FenceValue, RhiError> {
        crate::profile_scope!("CommandQueue::submit");

        if self.fence.is_lost() {
            return Err(RhiError::DeviceLost);
        }

        let mut recording = self.recording.lock();
        let fence_value = self.last_submitted.load(Ordering::Acquire) + 1;
        let batch = Batch {
            commands: std::mem::take(&mut recording.commands),
            fence_value,
        };
        self.last_submitted.store(fence_value, Ordering::Release);

        log::trace!(
            "CommandQueue: submit batch {} ({} commands)",
            fence_value,
            batch.commands.len()
        );

        match &recording.sender {
            Some(sender) => sender
                .send(batch)
                .map_err(|_| RhiError::invalid_state("executor thread has stopped"))?,
            None => run_batch(self.backend.as_ref(), &self.fence, &self.failure, batch),
        }

        Ok(fence_value)
    }

    fn take_failure(&self) -> Result<(), RhiError> {
        match self.failure.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Block until `value` has executed.
    pub fn wait(&self, value: FenceValue) -> Result<(), RhiError> {
        crate::profile_scope!("CommandQueue::wait");
        self.fence.wait(value)
    }

    /// Submit and wait for everything recorded so far.
    ///
    /// Fails with the first command failure since the last report, after the
    /// wait has finished.
    pub fn flush(&self) -> Result<FenceValue, RhiError> {
        let value = self.submit_batch()?;
        self.wait(value)?;
        self.take_failure()?;
        Ok(value)
    }

    /// Returns true once `value` has executed.
    pub fn is_complete(&self, value: FenceValue) -> bool {
        self.fence.is_complete(value)
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        // Closing the channel ends the executor loop once it has drained.
        self.recording.lock().sender = None;
        if let Some(worker) = self.worker.lock().take()
            && worker.join().is_err()
        {
            log::error!("CommandQueue: executor thread panicked");
        }
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("mode", &self.mode)
            .field("last_submitted", &self.last_submitted())
            .field("completed", &self.fence.completed_value())
            .finish()
    }
}

/// Execute `batch`, treating a panic as device loss so waiters wake up.
fn run_batch(
    backend: &dyn GpuBackend,
    fence: &Fence,
    failure: &Mutex<Option<RhiError>>,
    batch: Batch,
) {
    let fence_value = batch.fence_value;
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        execute_batch(backend, fence, failure, batch);
    }));
    if result.is_err() {
        log::error!("CommandQueue: command panicked in batch {fence_value}, marking device lost");
        fence.mark_lost();
    }
}

fn execute_batch(
    backend: &dyn GpuBackend,
    fence: &Fence,
    failure: &Mutex<Option<RhiError>>,
    batch: Batch,
) {
    crate::profile_scope!("CommandQueue::execute_batch");

    if fence.is_lost() {
        return;
    }

    for NodeCommand { node, command } in batch.commands {
        let name = command.name();
        match backend.execute(node, command) {
            Ok(()) => {}
            Err(BackendError::DeviceLost) => {
                log::error!(
                    "CommandQueue: device lost while executing {} (batch {})",
                    name,
                    batch.fence_value
                );
                fence.mark_lost();
                return;
            }
            Err(err) => {
                log::error!("CommandQueue: {name} failed on node {node}: {err}");
                failure.lock().get_or_insert(RhiError::CommandFailed {
                    command: name.to_string(),
                    node,
                    message: err.to_string(),
                });
            }
        }
    }

    fence.signal(batch.fence_value);
}

static_assertions::assert_impl_all!(CommandQueue: Send, Sync);
