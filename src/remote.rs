// src/remote.rs

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::driver::{InMessage, OutMessage, OutStatus};
use crate::error::OpError;
use crate::header::{Header, HEADER_SIZE};
use crate::manager::OpManager;
use crate::types::{Address, OpId, StageId};

/// Observable state of a [`RemoteOp`].
///
/// Transitions forward only: `NotStarted -> InProgress -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    /// Constructed but not yet sent.
    NotStarted,
    /// Request handed to the transport; no response yet.
    InProgress,
    /// The response arrived and is attached to the op.
    Completed,
    /// The transport gave up on delivering the request.
    Failed,
}

impl RemoteState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RemoteState::NotStarted,
            1 => RemoteState::InProgress,
            2 => RemoteState::Completed,
            3 => RemoteState::Failed,
            // Only ever stored through as_u8; anything else means memory
            // corruption, which is not a recoverable runtime condition.
            _ => panic!("unknown RemoteOp state: {value}"),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RemoteState::NotStarted => 0,
            RemoteState::InProgress => 1,
            RemoteState::Completed => 2,
            RemoteState::Failed => 3,
        }
    }
}

/// State shared between the application's [`RemoteOp`] handle and the
/// manager's poll loop.
///
/// The state word is atomic so `is_ready()` can be called from any thread
/// without touching the registry lock; the messages sit behind their own
/// small mutex because `poll()` attaches the response concurrently with the
/// owner reading request status.
pub(crate) struct RemoteShared {
    state: AtomicU8,
    inner: Mutex<RemoteInner>,
}

struct RemoteInner {
    request: Box<dyn OutMessage>,
    response: Option<Box<dyn InMessage>>,
}

impl RemoteShared {
    pub(crate) fn load_state(&self) -> RemoteState {
        RemoteState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn store_state(&self, state: RemoteState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Attach the response, retire the request, and mark the op completed.
    /// Called by the manager's poll loop under the registry lock.
    pub(crate) fn complete(&self, response: Box<dyn InMessage>) {
        let mut inner = self.inner.lock();
        inner.request.cancel();
        inner.response = Some(response);
        self.store_state(RemoteState::Completed);
    }
}

/// Client-side handle for one outgoing call.
///
/// Owns its request and (once it arrives) its response. Progress is
/// observed by polling [`is_ready`](RemoteOp::is_ready) while something
/// drives [`OpManager::poll`]; nothing here blocks except the deliberate
/// spin in [`wait`](RemoteOp::wait).
///
/// Dropping a `RemoteOp` deregisters it even mid-flight; a response that
/// arrives later is silently released.
pub struct RemoteOp {
    manager: OpManager,
    shared: Arc<RemoteShared>,
    op_id: Option<OpId>,
}

impl RemoteOp {
    /// Create an op on `manager` with an empty request message. Header
    /// space is reserved up front so `send()` can prepend without copying
    /// the payload.
    pub fn new(manager: &OpManager) -> Self {
        let mut request = manager.shared().driver.alloc();
        request.reserve(HEADER_SIZE);
        RemoteOp {
            manager: manager.clone(),
            shared: Arc::new(RemoteShared {
                state: AtomicU8::new(RemoteState::NotStarted.as_u8()),
                inner: Mutex::new(RemoteInner {
                    request,
                    response: None,
                }),
            }),
            op_id: None,
        }
    }

    /// Exclusive access to the request message, for filling in the payload
    /// before [`send`](RemoteOp::send).
    pub fn request_mut(&self) -> MappedMutexGuard<'_, dyn OutMessage> {
        MutexGuard::map(self.shared.inner.lock(), |inner| &mut *inner.request)
    }

    /// Send the request to `destination`.
    ///
    /// Assigns a fresh op id, prepends the header (initial-request stage,
    /// reply address pointing back at this transport), registers the op so
    /// the poll loop can complete it, and hands the request to the driver.
    /// May be called at most once per instance.
    pub fn send(&mut self, destination: Address) -> Result<(), OpError> {
        if self.op_id.is_some() {
            return Err(OpError::AlreadySent);
        }
        self.shared.store_state(RemoteState::InProgress);

        let shared_mgr = self.manager.shared();
        let reply_address = shared_mgr.driver.local_address();

        let mut registry = shared_mgr.registry.lock();
        let op_id = registry.allocate_op_id(shared_mgr.transport_id);
        self.op_id = Some(op_id);

        let header = Header {
            op_id,
            stage: StageId::INITIAL_REQUEST,
            reply_address: shared_mgr.driver.encode_address(reply_address),
        };

        let mut inner = self.shared.inner.lock();
        inner.request.prepend(&header.encode());
        registry.insert_remote(op_id, Arc::clone(&self.shared));
        inner.request.send(destination);
        Ok(())
    }

    /// Non-blocking readiness check.
    ///
    /// Returns true once the op has reached `Completed` or `Failed`. While
    /// in progress, also notices a transport-reported send failure and
    /// transitions to `Failed`. Safe to call concurrently with `poll()`.
    pub fn is_ready(&self) -> bool {
        match self.shared.load_state() {
            RemoteState::NotStarted => false,
            RemoteState::InProgress => {
                let inner = self.shared.inner.lock();
                if inner.request.status() == OutStatus::Failed {
                    self.shared.store_state(RemoteState::Failed);
                    true
                } else {
                    false
                }
            }
            RemoteState::Completed | RemoteState::Failed => true,
        }
    }

    /// Spin until the op is ready, driving the manager's poll loop.
    ///
    /// This is the only blocking primitive in the crate, and it never
    /// yields to a scheduler; it assumes `poll()` is cheap.
    pub fn wait(&self) {
        while !self.is_ready() {
            self.manager.poll();
        }
    }

    /// Current state, read without any locking of the registry.
    pub fn state(&self) -> RemoteState {
        self.shared.load_state()
    }

    /// The id assigned by `send()`, if the op was sent.
    pub fn op_id(&self) -> Option<OpId> {
        self.op_id
    }

    /// Take ownership of the response message once the op completed.
    pub fn take_response(&mut self) -> Option<Box<dyn InMessage>> {
        self.shared.inner.lock().response.take()
    }
}

impl Drop for RemoteOp {
    fn drop(&mut self) {
        // Deregister before the owned messages can be released, so a
        // concurrent poll() can never route a response to a dead op.
        if let Some(op_id) = self.op_id {
            self.manager.shared().registry.lock().remove_remote(op_id);
        }
    }
}
