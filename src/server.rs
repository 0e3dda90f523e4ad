// src/server.rs

use tracing::warn;

use crate::driver::{InMessage, OutMessage, OutStatus};
use crate::error::OpError;
use crate::header::Header;
use crate::manager::OpManager;
use crate::types::{Address, OpId, StageId};

/// Observable state of a [`ServerOp`].
///
/// Transitions forward only:
/// `NotStarted -> InProgress -> {Completed, Dropped, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Empty, or queued but not yet handed to the application.
    NotStarted,
    /// Handed to the application; the op owns a live request.
    InProgress,
    /// The response was delivered (or handed off far enough to count).
    Completed,
    /// The transport reported the request itself as gone; no response is
    /// possible.
    Dropped,
    /// The response could not be delivered.
    Failed,
}

/// Server-side handle for one incoming call stage.
///
/// Owns the request it was created from and, once picked up via
/// [`OpManager::receive_server_op`], a response message. The owner either
/// replies, delegates to another stage, or drops the handle; a dropped
/// in-flight op is not lost but handed to the manager's detached list,
/// which keeps driving it to a terminal state (and signals failure back to
/// the original sender if the response fails). That auto-detach rule is the
/// central lifecycle invariant of this layer.
pub struct ServerOp {
    request: Option<Box<dyn InMessage>>,
    response: Option<Box<dyn OutMessage>>,
    manager: Option<OpManager>,
    state: ServerState,
    detached: bool,
    op_id: OpId,
    stage: StageId,
    reply_address: Address,
    delegated: bool,
    failure_signaled: bool,
}

impl Default for ServerOp {
    /// An empty op: owns nothing, `is_empty()` is true, state `NotStarted`.
    fn default() -> Self {
        ServerOp {
            request: None,
            response: None,
            manager: None,
            state: ServerState::NotStarted,
            detached: false,
            op_id: OpId::new(0, 0),
            stage: StageId::INITIAL_REQUEST,
            reply_address: Address::new(0),
            delegated: false,
            failure_signaled: false,
        }
    }
}

impl ServerOp {
    /// Build a queued op from a freshly received request. The manager and
    /// response message are attached later, when the application picks the
    /// op up.
    pub(crate) fn from_wire(
        request: Box<dyn InMessage>,
        op_id: OpId,
        stage: StageId,
        reply_address: Address,
    ) -> Self {
        let mut op = ServerOp::default();
        op.request = Some(request);
        op.op_id = op_id;
        op.stage = stage;
        op.reply_address = reply_address;
        op
    }

    /// Hand the op to the application: attach the response message and the
    /// manager back-reference, and start the state machine.
    pub(crate) fn activate(&mut self, response: Box<dyn OutMessage>, manager: OpManager) {
        self.response = Some(response);
        self.manager = Some(manager);
        self.state = ServerState::InProgress;
    }

    /// True for a default-constructed or moved-out op that owns no request.
    pub fn is_empty(&self) -> bool {
        self.request.is_none()
    }

    /// Current state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// The op id carried by the request header. Meaningless for empty ops.
    pub fn op_id(&self) -> OpId {
        self.op_id
    }

    /// Which hop of the delegation chain this op is.
    pub fn stage(&self) -> StageId {
        self.stage
    }

    /// Where the ultimate response is addressed.
    pub fn reply_address(&self) -> Address {
        self.reply_address
    }

    /// True once `delegate()` has been called.
    pub fn is_delegated(&self) -> bool {
        self.delegated
    }

    /// The request message, for reading the call payload.
    pub fn request(&self) -> Option<&dyn InMessage> {
        self.request.as_deref()
    }

    /// The response message, for writing the reply payload before
    /// [`reply`](ServerOp::reply) or [`delegate`](ServerOp::delegate).
    pub fn response_mut(&mut self) -> Option<&mut (dyn OutMessage + 'static)> {
        self.response.as_deref_mut()
    }

    /// Advance the state machine one step and return the resulting state.
    ///
    /// Called by the owning application, and by the manager's sweep for
    /// detached ops. Stable states (`NotStarted`, `Completed`, `Dropped`)
    /// are no-ops. While `InProgress`:
    ///
    /// - a dropped request terminates the op as `Dropped`;
    /// - a response at transport `Completed`, or at `Sent` when the op was
    ///   not delegated, completes the op (a delegated op must wait for the
    ///   real downstream completion); completing a non-initial stage also
    ///   acknowledges the request so upstream resources can be released;
    /// - a failed response moves the op to `Failed` and cancels the
    ///   response so the owner may try sending it again.
    ///
    /// A detached op that reaches `Failed` signals failure back to the
    /// original sender exactly once.
    pub fn make_progress(&mut self) -> ServerState {
        let out_status = self
            .response
            .as_ref()
            .map(|r| r.status())
            .unwrap_or(OutStatus::NotStarted);
        match self.state {
            ServerState::NotStarted | ServerState::Completed | ServerState::Dropped => {}
            ServerState::InProgress => {
                let Some(request) = self.request.as_mut() else {
                    // An InProgress op always owns a request; anything else
                    // is a logic defect, not a runtime condition.
                    unreachable!("ServerOp is InProgress without a request");
                };
                if request.dropped() {
                    self.state = ServerState::Dropped;
                } else if out_status == OutStatus::Completed
                    || (out_status == OutStatus::Sent && !self.delegated)
                {
                    self.state = ServerState::Completed;
                    if !self.stage.is_initial_request() {
                        request.acknowledge();
                    }
                } else if out_status == OutStatus::Failed {
                    warn!(
                        op_id = %self.op_id,
                        status = out_status.description(),
                        "response delivery failed"
                    );
                    self.state = ServerState::Failed;
                    // Deregister the response so the owner can try again.
                    if let Some(response) = self.response.as_mut() {
                        response.cancel();
                    }
                    self.signal_failure_if_detached();
                }
            }
            ServerState::Failed => {
                self.signal_failure_if_detached();
            }
        }
        self.state
    }

    /// Tell the original sender the server gave up, once.
    fn signal_failure_if_detached(&mut self) {
        if self.detached && !self.failure_signaled {
            if let Some(request) = self.request.as_mut() {
                request.fail();
                self.failure_signaled = true;
            }
        }
    }

    /// Send the response back to the original requester as the ultimate
    /// response.
    ///
    /// On an empty (or never picked up) op this is a no-op with a
    /// diagnostic; no message is sent.
    pub fn reply(&mut self) -> Result<(), OpError> {
        let (Some(_), Some(manager), Some(response)) =
            (self.request.as_ref(), self.manager.as_ref(), self.response.as_mut())
        else {
            warn!("calling reply() on an empty ServerOp; nothing will be sent");
            return Err(OpError::EmptyOp);
        };
        let header = Header {
            op_id: self.op_id,
            stage: StageId::ULTIMATE_RESPONSE,
            reply_address: manager.shared().driver.encode_address(self.reply_address),
        };
        response.prepend(&header.encode());
        response.send(self.reply_address);
        Ok(())
    }

    /// Forward the call to `destination` as the next delegation stage
    /// instead of replying directly.
    ///
    /// Marks the op delegated, which suppresses the "sent implies
    /// completed" shortcut in [`make_progress`](ServerOp::make_progress):
    /// a delegated op only completes when the downstream hop confirms end
    /// to end. The original reply address rides along in the header so the
    /// final stage can answer the original client directly.
    pub fn delegate(&mut self, destination: Address) -> Result<(), OpError> {
        let (Some(_), Some(manager), Some(response)) =
            (self.request.as_ref(), self.manager.as_ref(), self.response.as_mut())
        else {
            warn!("calling delegate() on an empty ServerOp; nothing will be sent");
            return Err(OpError::EmptyOp);
        };
        self.delegated = true;
        let header = Header {
            op_id: self.op_id,
            stage: self.stage.next(),
            reply_address: manager.shared().driver.encode_address(self.reply_address),
        };
        response.prepend(&header.encode());
        response.send(destination);
        Ok(())
    }
}

impl Drop for ServerOp {
    /// Auto-detach: an in-flight op discarded by its owner transfers to the
    /// manager's detached list instead of releasing its messages, so the
    /// poll loop can still drive it to a terminal state. Empty, never
    /// started, and already detached ops release their messages directly.
    fn drop(&mut self) {
        let past_start = self.state != ServerState::NotStarted;
        if let Some(manager) = self.manager.take() {
            if !self.detached && past_start {
                let orphan = ServerOp {
                    request: self.request.take(),
                    response: self.response.take(),
                    // Detached ops never send again; dropping the manager
                    // reference here also keeps the registry from owning a
                    // cycle back to itself.
                    manager: None,
                    state: self.state,
                    detached: true,
                    op_id: self.op_id,
                    stage: self.stage,
                    reply_address: self.reply_address,
                    delegated: self.delegated,
                    failure_signaled: self.failure_signaled,
                };
                manager.shared().registry.lock().push_detached(orphan);
            }
        }
    }
}
