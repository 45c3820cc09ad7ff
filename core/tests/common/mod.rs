//! Shared mocks for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use courier_core::message::{OpenGroupReceipt, OpenGroupRoom, Reaction};
use courier_core::shared_config::{
    ConfigVariant, EngineFactory, GroupVariant, IncomingConfigMessage, MergeEngine, PushData,
    UserVariant,
};
use courier_core::{CourierError, KvStore, Namespace, OutgoingMessage, Result, SendReceipt, Transport};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const OWN: &str = "05aaaa";
pub const PEER: &str = "05bbbb";
pub const SECRET: [u8; 64] = [9u8; 64];

/// One recorded `send` call
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub destination: String,
    pub message_id: String,
    pub namespace: Namespace,
}

/// Which open group endpoint was used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenGroupCall {
    Post { blinded: bool },
    Reaction { emoji: String },
    BlindedRequest { recipient: String },
}

/// Transport that records every call and replays scripted results.
/// Unscripted sends succeed with increasing timestamps starting at 1000.
#[derive(Default)]
pub struct MockTransport {
    scripted: Mutex<VecDeque<Result<SendReceipt>>>,
    sent: Mutex<Vec<SentRecord>>,
    open_group_result: Mutex<Option<OpenGroupReceipt>>,
    open_group_calls: Mutex<Vec<OpenGroupCall>>,
    deleted: Mutex<Vec<(String, Vec<String>)>>,
    delay: Mutex<Option<Duration>>,
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight: AtomicUsize,
    counter: AtomicUsize,
    panic_next: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_result(&self, result: Result<SendReceipt>) {
        self.scripted.lock().unwrap().push_back(result);
    }

    pub fn fail_next(&self, reason: &str) {
        self.push_result(Err(CourierError::Transport(reason.to_string())));
    }

    /// Make the next send panic instead of answering
    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn set_open_group_result(&self, receipt: OpenGroupReceipt) {
        *self.open_group_result.lock().unwrap() = Some(receipt);
    }

    /// Hold every send for `delay` before answering
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_ids(&self) -> Vec<String> {
        self.sent().into_iter().map(|r| r.message_id).collect()
    }

    pub fn open_group_calls(&self) -> Vec<OpenGroupCall> {
        self.open_group_calls.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<(String, Vec<String>)> {
        self.deleted.lock().unwrap().clone()
    }

    /// Highest number of concurrent sends seen for any one destination
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn open_group_receipt(&self) -> Result<OpenGroupReceipt> {
        Ok(self
            .open_group_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(OpenGroupReceipt {
                server_id: Some(1),
                server_timestamp_ms: 5000,
            }))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        destination: &str,
        message: &OutgoingMessage,
        namespace: Namespace,
    ) -> Result<SendReceipt> {
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("transport blew up sending {}", message.id);
        }
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            let count = in_flight.entry(destination.to_string()).or_insert(0);
            *count += 1;
            self.max_in_flight.fetch_max(*count, Ordering::SeqCst);
        }
        self.sent.lock().unwrap().push(SentRecord {
            destination: destination.to_string(),
            message_id: message.id.clone(),
            namespace,
        });

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(count) = self.in_flight.lock().unwrap().get_mut(destination) {
            *count -= 1;
        }

        let scripted = self.scripted.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst);
                Ok(SendReceipt {
                    server_timestamp_ms: 1000 + n as i64,
                    message_hash: format!("hash-{}", message.id),
                })
            }
        }
    }

    async fn send_open_group(
        &self,
        _room: &OpenGroupRoom,
        _payload: &[u8],
        blinded: bool,
    ) -> Result<OpenGroupReceipt> {
        self.open_group_calls
            .lock()
            .unwrap()
            .push(OpenGroupCall::Post { blinded });
        self.open_group_receipt()
    }

    async fn send_open_group_reaction(
        &self,
        _room: &OpenGroupRoom,
        reaction: &Reaction,
    ) -> Result<OpenGroupReceipt> {
        self.open_group_calls.lock().unwrap().push(OpenGroupCall::Reaction {
            emoji: reaction.emoji.clone(),
        });
        self.open_group_receipt()
    }

    async fn send_blinded_request(
        &self,
        _room: &OpenGroupRoom,
        recipient_blinded_id: &str,
        _payload: &[u8],
    ) -> Result<OpenGroupReceipt> {
        self.open_group_calls
            .lock()
            .unwrap()
            .push(OpenGroupCall::BlindedRequest {
                recipient: recipient_blinded_id.to_string(),
            });
        self.open_group_receipt()
    }

    async fn delete_messages(&self, owner: &str, hashes: &[String]) -> Result<()> {
        self.deleted
            .lock()
            .unwrap()
            .push((owner.to_string(), hashes.to_vec()));
        Ok(())
    }
}

/// Observable state behind a mock engine
#[derive(Debug, Default)]
pub struct EngineState {
    pub namespace: Option<Namespace>,
    pub data: Vec<u8>,
    pub restored_from: Option<Vec<u8>>,
    pub dirty: bool,
    pub seqno: i64,
    pub obsolete_hashes: Vec<String>,
    pub confirmed: Vec<(i64, String)>,
    pub needs_dump: bool,
    /// Value `needs_dump` takes after a confirm
    pub needs_dump_after_confirm: bool,
    pub pushes: usize,
    pub dumps: usize,
    pub group_keys: HashMap<String, Vec<u8>>,
}

pub type SharedState = Arc<Mutex<EngineState>>;

pub struct MockEngine {
    state: SharedState,
}

impl MergeEngine for MockEngine {
    fn is_dirty(&self) -> bool {
        self.state.lock().unwrap().dirty
    }

    fn push(&mut self) -> Result<PushData> {
        let mut state = self.state.lock().unwrap();
        state.pushes += 1;
        state.seqno += 1;
        Ok(PushData {
            data: state.data.clone(),
            seqno: state.seqno,
            obsolete_hashes: state.obsolete_hashes.clone(),
        })
    }

    fn confirm_pushed(&mut self, seqno: i64, hash: &str) {
        let mut state = self.state.lock().unwrap();
        state.confirmed.push((seqno, hash.to_string()));
        state.dirty = false;
        state.needs_dump = state.needs_dump_after_confirm;
    }

    fn needs_dump(&self) -> bool {
        self.state.lock().unwrap().needs_dump
    }

    fn dump(&mut self) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.dumps += 1;
        state.needs_dump = false;
        Ok(state.data.clone())
    }

    fn merge(&mut self, messages: &[IncomingConfigMessage]) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        let mut merged = Vec::new();
        for message in messages {
            state.data = message.data.clone();
            merged.push(message.hash.clone());
        }
        if !merged.is_empty() {
            state.needs_dump = true;
        }
        Ok(merged)
    }

    fn storage_namespace(&self) -> Namespace {
        self.state
            .lock()
            .unwrap()
            .namespace
            .unwrap_or(Namespace::DEFAULT)
    }

    fn group_secret_key(&self, group_pk: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().group_keys.get(group_pk).cloned()
    }
}

pub fn namespace_for(variant: ConfigVariant) -> Namespace {
    match variant {
        ConfigVariant::User(UserVariant::UserProfile) => Namespace::USER_PROFILE,
        ConfigVariant::User(UserVariant::Contacts) => Namespace::CONTACTS,
        ConfigVariant::User(UserVariant::ConvoInfoVolatile) => Namespace::CONVO_INFO_VOLATILE,
        ConfigVariant::User(UserVariant::UserGroups) => Namespace::USER_GROUPS,
        ConfigVariant::Group(GroupVariant::Info) => Namespace::GROUP_INFO,
        ConfigVariant::Group(GroupVariant::Members) => Namespace::GROUP_MEMBERS,
        ConfigVariant::Group(GroupVariant::Keys) => Namespace::GROUP_KEYS,
    }
}

/// Dump bytes the mock factory refuses to restore
pub const CORRUPT_DUMP: &[u8] = b"corrupt";

/// Factory handing out mock engines and remembering their state by
/// (owner, variant). User engines are filed under `OWN`.
#[derive(Default)]
pub struct MockFactory {
    states: Mutex<HashMap<(String, ConfigVariant), SharedState>>,
    group_keys: Mutex<HashMap<String, Vec<u8>>>,
    /// (group pubkey, key handed to init_group)
    group_inits: Mutex<Vec<(String, Option<Vec<u8>>)>>,
    user_inits: Mutex<Vec<(UserVariant, Option<Vec<u8>>)>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Key the user-groups engine will report for `group_pk`
    pub fn set_group_key(&self, group_pk: &str, key: &[u8]) {
        self.group_keys
            .lock()
            .unwrap()
            .insert(group_pk.to_string(), key.to_vec());
    }

    pub fn state(&self, owner: &str, variant: impl Into<ConfigVariant>) -> SharedState {
        self.states
            .lock()
            .unwrap()
            .get(&(owner.to_string(), variant.into()))
            .cloned()
            .expect("engine was never initialised")
    }

    pub fn user_inits(&self) -> Vec<(UserVariant, Option<Vec<u8>>)> {
        self.user_inits.lock().unwrap().clone()
    }

    pub fn group_inits(&self) -> Vec<(String, Option<Vec<u8>>)> {
        self.group_inits.lock().unwrap().clone()
    }

    fn make(&self, owner: &str, variant: ConfigVariant, dump: Option<&[u8]>) -> Box<dyn MergeEngine> {
        let state = Arc::new(Mutex::new(EngineState {
            namespace: Some(namespace_for(variant)),
            data: dump.map(|d| d.to_vec()).unwrap_or_default(),
            restored_from: dump.map(|d| d.to_vec()),
            group_keys: if variant == ConfigVariant::User(UserVariant::UserGroups) {
                self.group_keys.lock().unwrap().clone()
            } else {
                HashMap::new()
            },
            ..Default::default()
        }));
        self.states
            .lock()
            .unwrap()
            .insert((owner.to_string(), variant), state.clone());
        Box::new(MockEngine { state })
    }
}

impl EngineFactory for MockFactory {
    fn init_user(
        &self,
        variant: UserVariant,
        ed25519_secret: &[u8],
        dump: Option<&[u8]>,
    ) -> Result<Box<dyn MergeEngine>> {
        assert_eq!(ed25519_secret, &SECRET[..]);
        self.user_inits
            .lock()
            .unwrap()
            .push((variant, dump.map(|d| d.to_vec())));
        if dump == Some(CORRUPT_DUMP) {
            return Err(CourierError::Engine("corrupt dump".to_string()));
        }
        Ok(self.make(OWN, variant.into(), dump))
    }

    fn init_group(
        &self,
        variant: GroupVariant,
        group_pk: &str,
        _user_ed25519_secret: &[u8],
        group_secret: Option<&[u8]>,
        dump: &[u8],
    ) -> Result<Box<dyn MergeEngine>> {
        self.group_inits
            .lock()
            .unwrap()
            .push((group_pk.to_string(), group_secret.map(|k| k.to_vec())));
        if dump == CORRUPT_DUMP {
            return Err(CourierError::Engine(format!("corrupt dump for {}", group_pk)));
        }
        Ok(self.make(group_pk, variant.into(), Some(dump)))
    }
}

/// Store whose writes always fail
#[derive(Default)]
pub struct FailingStore;

impl KvStore for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn put(&self, _key: &str, _value: &[u8]) -> Result<()> {
        Err(CourierError::Storage("disk full".to_string()))
    }

    fn delete(&self, _key: &str) -> Result<()> {
        Err(CourierError::Storage("disk full".to_string()))
    }

    fn scan_prefix(&self, _prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(Vec::new())
    }
}

/// Mark a variant dirty with the given push output
pub fn make_dirty(state: &SharedState, data: &[u8], obsolete: &[&str]) {
    let mut state = state.lock().unwrap();
    state.dirty = true;
    state.data = data.to_vec();
    state.obsolete_hashes = obsolete.iter().map(|h| h.to_string()).collect();
}
