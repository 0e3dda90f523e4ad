// src/manager.rs

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::driver::Driver;
use crate::header::{Header, HEADER_SIZE};
use crate::remote::RemoteShared;
use crate::server::{ServerOp, ServerState};
use crate::types::{Address, OpId};

/// Tunables for an [`OpManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Upper bound on the number of inbound messages one `poll()` call
    /// drains from the driver. The default drains everything currently
    /// available; lowering it trades per-call latency for fairness when one
    /// thread drives several managers.
    pub max_drain_per_poll: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            max_drain_per_poll: usize::MAX,
        }
    }
}

impl ManagerConfig {
    /// Set the per-poll drain bound.
    pub fn with_max_drain_per_poll(mut self, limit: usize) -> Self {
        self.max_drain_per_poll = limit;
        self
    }
}

/// Registry state guarded by the manager's one mutex.
///
/// The lock covers structural changes only; per-operation progress state
/// lives in independently synchronized fields on the operations themselves.
pub(crate) struct Registry {
    next_sequence: u64,
    /// Live client-side ops by id. Entries are non-owning in spirit: the
    /// application's `RemoteOp` handle controls the lifetime and removes
    /// its entry on drop.
    remote_ops: HashMap<OpId, Arc<RemoteShared>>,
    /// Newly arrived server ops awaiting pickup, in arrival order.
    pending_server_ops: VecDeque<ServerOp>,
    /// Server ops whose owners discarded them in flight; driven to a
    /// terminal state by the poll loop's sweep.
    detached_server_ops: Vec<ServerOp>,
}

impl Registry {
    fn new() -> Self {
        Registry {
            next_sequence: 1,
            remote_ops: HashMap::new(),
            pending_server_ops: VecDeque::new(),
            detached_server_ops: Vec::new(),
        }
    }

    /// Mint the next op id. Callers hold the registry lock, so ids are
    /// race-free even across threads.
    pub(crate) fn allocate_op_id(&mut self, transport_id: u64) -> OpId {
        let id = OpId::new(transport_id, self.next_sequence);
        self.next_sequence += 1;
        id
    }

    pub(crate) fn insert_remote(&mut self, op_id: OpId, shared: Arc<RemoteShared>) {
        let previous = self.remote_ops.insert(op_id, shared);
        debug_assert!(previous.is_none(), "duplicate RemoteOp registration");
    }

    pub(crate) fn remove_remote(&mut self, op_id: OpId) {
        self.remote_ops.remove(&op_id);
    }

    pub(crate) fn push_detached(&mut self, op: ServerOp) {
        self.detached_server_ops.push(op);
    }
}

/// Shared core behind every [`OpManager`] handle and every operation's
/// back-reference.
pub(crate) struct ManagerShared {
    pub(crate) driver: Box<dyn Driver>,
    pub(crate) transport_id: u64,
    config: ManagerConfig,
    pub(crate) registry: Mutex<Registry>,
}

/// Per-transport registry correlating inbound messages with live
/// operations.
///
/// Cheap to clone; all clones refer to the same registry, and operations
/// hold a clone internally, so the manager outlives every op it created by
/// construction. All asynchronous progress happens inside [`poll`]
/// (OpManager::poll), which the application must call repeatedly; the
/// manager runs no threads of its own.
#[derive(Clone)]
pub struct OpManager {
    shared: Arc<ManagerShared>,
}

impl OpManager {
    /// Create a manager on top of `driver`, tagging every op id it mints
    /// with `transport_id`.
    pub fn new(driver: Box<dyn Driver>, transport_id: u64) -> Self {
        Self::with_config(driver, transport_id, ManagerConfig::default())
    }

    /// Like [`new`](OpManager::new), with explicit tunables.
    pub fn with_config(driver: Box<dyn Driver>, transport_id: u64, config: ManagerConfig) -> Self {
        OpManager {
            shared: Arc::new(ManagerShared {
                driver,
                transport_id,
                config,
                registry: Mutex::new(Registry::new()),
            }),
        }
    }

    pub(crate) fn shared(&self) -> &ManagerShared {
        &self.shared
    }

    /// The id stamped into every op this manager originates.
    pub fn transport_id(&self) -> u64 {
        self.shared.transport_id
    }

    /// The driver's local address, where peers send responses.
    pub fn local_address(&self) -> Address {
        self.shared.driver.local_address()
    }

    /// Take the next pending server op, if any.
    ///
    /// The op comes back activated: response message allocated with header
    /// space reserved, manager attached, state `InProgress`. Non-blocking;
    /// keeping `poll()` running is the caller's job.
    pub fn receive_server_op(&self) -> Option<ServerOp> {
        let mut registry = self.shared.registry.lock();
        let mut op = registry.pending_server_ops.pop_front()?;
        let mut response = self.shared.driver.alloc();
        response.reserve(HEADER_SIZE);
        op.activate(response, self.clone());
        Some(op)
    }

    /// Drive all asynchronous transitions.
    ///
    /// Polls the driver, drains currently available inbound messages
    /// (classifying each as a response to a registered `RemoteOp` or as a
    /// new pending `ServerOp`), then sweeps the detached list, dropping
    /// every detached op that has reached a terminal state.
    pub fn poll(&self) {
        let shared = &self.shared;
        shared.driver.poll();

        let mut drained = 0;
        while drained < shared.config.max_drain_per_poll {
            let Some(mut message) = shared.driver.receive() else {
                break;
            };
            drained += 1;

            let mut buf = [0u8; HEADER_SIZE];
            if message.read(0, &mut buf) < HEADER_SIZE {
                warn!(len = message.len(), "inbound message shorter than a header; dropping");
                continue;
            }
            let header = Header::decode(&buf);
            message.strip(HEADER_SIZE);

            if header.stage.is_ultimate_response() {
                let registry = shared.registry.lock();
                if let Some(remote) = registry.remote_ops.get(&header.op_id) {
                    remote.complete(message);
                } else {
                    // Raced with completion or destruction of the caller;
                    // expected, not an error.
                    debug!(op_id = %header.op_id, "no RemoteOp waiting for response; dropping");
                }
            } else {
                let reply_address = shared.driver.decode_address(&header.reply_address);
                let op = ServerOp::from_wire(message, header.op_id, header.stage, reply_address);
                shared.registry.lock().pending_server_ops.push_back(op);
            }
        }

        let mut registry = shared.registry.lock();
        registry.detached_server_ops.retain_mut(|op| {
            let state = op.make_progress();
            debug_assert!(state != ServerState::NotStarted);
            // Terminal ops leave the list and release their messages as
            // they drop.
            state == ServerState::InProgress
        });
    }
}
