// tests/common.rs
//
// In-memory loopback driver shared by the integration tests. A Hub plays
// the network: every driver gets an address and an inbox, every send()
// delivers immediately and leaves behind a SentRecord whose status and
// flags the test can inspect and flip to simulate transport outcomes.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use oplink::{Address, Driver, InMessage, OutMessage, OutStatus, RawAddress, RAW_ADDRESS_SIZE};

/// Observable side of a delivered message: what the receiving operation
/// did with it.
#[derive(Default)]
pub struct InFlags {
    pub dropped: AtomicBool,
    pub acknowledged: AtomicUsize,
    pub failed: AtomicUsize,
}

/// Everything the hub remembers about one send() call.
pub struct SentRecord {
    pub from: Address,
    pub to: Address,
    pub bytes: Vec<u8>,
    /// Shared with the live OutMessage; flip it to simulate transport
    /// completion or failure.
    pub status: Arc<Mutex<OutStatus>>,
    /// Shared with the delivered InMessage.
    pub in_flags: Arc<InFlags>,
    pub cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct HubInner {
    inboxes: HashMap<u64, VecDeque<Delivery>>,
    sent: Vec<Arc<SentRecord>>,
    next_address: u64,
}

struct Delivery {
    data: Vec<u8>,
    flags: Arc<InFlags>,
}

/// The in-memory network connecting loopback drivers.
#[derive(Clone, Default)]
pub struct Hub {
    inner: Arc<Mutex<HubInner>>,
}

impl Hub {
    pub fn new() -> Self {
        Hub::default()
    }

    /// Register a new driver with its own address and inbox.
    pub fn driver(&self) -> LoopbackDriver {
        let mut inner = self.inner.lock().unwrap();
        inner.next_address += 1;
        let address = inner.next_address;
        inner.inboxes.insert(address, VecDeque::new());
        LoopbackDriver {
            hub: self.clone(),
            address: Address::new(address),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.inner.lock().unwrap().sent.len()
    }

    /// The record of the `index`-th send() across the whole hub.
    pub fn record(&self, index: usize) -> Arc<SentRecord> {
        Arc::clone(&self.inner.lock().unwrap().sent[index])
    }

    /// Simulate a transport outcome for an already-sent message.
    pub fn set_status(&self, index: usize, status: OutStatus) {
        *self.record(index).status.lock().unwrap() = status;
    }

    fn deliver(&self, from: Address, to: Address, data: Vec<u8>) -> (Arc<Mutex<OutStatus>>, Arc<InFlags>) {
        let status = Arc::new(Mutex::new(OutStatus::Sent));
        let flags = Arc::new(InFlags::default());
        let mut inner = self.inner.lock().unwrap();
        if let Some(inbox) = inner.inboxes.get_mut(&to.get()) {
            inbox.push_back(Delivery {
                data: data.clone(),
                flags: Arc::clone(&flags),
            });
        }
        inner.sent.push(Arc::new(SentRecord {
            from,
            to,
            bytes: data,
            status: Arc::clone(&status),
            in_flags: Arc::clone(&flags),
            cancelled: Arc::new(AtomicBool::new(false)),
        }));
        (status, flags)
    }
}

pub struct LoopbackDriver {
    hub: Hub,
    address: Address,
}

impl Driver for LoopbackDriver {
    fn alloc(&self) -> Box<dyn OutMessage> {
        Box::new(LoopbackOut {
            hub: self.hub.clone(),
            from: self.address,
            front: Vec::new(),
            body: Vec::new(),
            status: Arc::new(Mutex::new(OutStatus::NotStarted)),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    fn poll(&self) {}

    fn receive(&self) -> Option<Box<dyn InMessage>> {
        let mut inner = self.hub.inner.lock().unwrap();
        let delivery = inner.inboxes.get_mut(&self.address.get())?.pop_front()?;
        Some(Box::new(LoopbackIn {
            data: delivery.data,
            cursor: 0,
            flags: delivery.flags,
        }))
    }

    fn local_address(&self) -> Address {
        self.address
    }

    fn decode_address(&self, raw: &RawAddress) -> Address {
        Address::new(u64::from_le_bytes(raw.as_bytes()[..8].try_into().unwrap()))
    }

    fn encode_address(&self, address: Address) -> RawAddress {
        let mut bytes = [0u8; RAW_ADDRESS_SIZE];
        bytes[..8].copy_from_slice(&address.get().to_le_bytes());
        RawAddress::from_bytes(bytes)
    }
}

struct LoopbackOut {
    hub: Hub,
    from: Address,
    front: Vec<u8>,
    body: Vec<u8>,
    status: Arc<Mutex<OutStatus>>,
    cancelled: Arc<AtomicBool>,
}

impl OutMessage for LoopbackOut {
    fn reserve(&mut self, bytes: usize) {
        self.front.reserve(bytes);
    }

    fn append(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    fn prepend(&mut self, data: &[u8]) {
        self.front.splice(0..0, data.iter().copied());
    }

    fn send(&mut self, destination: Address) {
        let mut data = self.front.clone();
        data.extend_from_slice(&self.body);
        let (status, _flags) = self.hub.deliver(self.from, destination, data);
        // Adopt the new record's status cell and expose the cancel flag on
        // the record the test will look at.
        let index = self.hub.sent_count() - 1;
        let record = self.hub.record(index);
        self.cancelled = Arc::clone(&record.cancelled);
        self.status = status;
    }

    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn status(&self) -> OutStatus {
        *self.status.lock().unwrap()
    }
}

struct LoopbackIn {
    data: Vec<u8>,
    cursor: usize,
    flags: Arc<InFlags>,
}

impl InMessage for LoopbackIn {
    fn len(&self) -> usize {
        self.data.len() - self.cursor
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> usize {
        let start = (self.cursor + offset).min(self.data.len());
        let count = buf.len().min(self.data.len() - start);
        buf[..count].copy_from_slice(&self.data[start..start + count]);
        count
    }

    fn strip(&mut self, len: usize) {
        self.cursor = (self.cursor + len).min(self.data.len());
    }

    fn dropped(&self) -> bool {
        self.flags.dropped.load(Ordering::SeqCst)
    }

    fn acknowledge(&mut self) {
        self.flags.acknowledged.fetch_add(1, Ordering::SeqCst);
    }

    fn fail(&mut self) {
        self.flags.failed.fetch_add(1, Ordering::SeqCst);
    }
}
