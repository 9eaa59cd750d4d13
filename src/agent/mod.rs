//! The SNMP protocol agent.
//!
//! [`ProtocolAgent`] owns the UDP transport, the registered object tree and
//! the security state (VACM tables and the USM user table). It moves through
//! `Created -> Running -> Stopped`; a stopped agent can be started again.
//!
//! Inbound datagrams are received by one task and processed on a bounded
//! pool of worker tasks (a semaphore sized by
//! [`AgentConfig::max_concurrent_requests`]). Stopping cancels the receive
//! loop first, then waits for every in-flight request to finish before the
//! socket and the security state are released.
//!
//! # Example
//!
//! ```rust,no_run
//! use snmp_gateway::agent::{AgentConfig, ProtocolAgent};
//! use snmp_gateway::attribute::{AttributeDescriptor, AttributeType, AttributeValue, MemoryAttribute};
//! use snmp_gateway::object::ManagedObject;
//! use snmp_gateway::security::SecurityConfiguration;
//! use snmp_gateway::oid;
//!
//! # async fn example() -> snmp_gateway::Result<()> {
//! let agent = ProtocolAgent::new(AgentConfig::new(oid!(1, 3, 6, 1, 4, 1, 99)));
//! let attr = MemoryAttribute::new(
//!     AttributeDescriptor::new("enabled", AttributeType::Bool),
//!     AttributeValue::Bool(true),
//! );
//! agent.register(ManagedObject::new(oid!(1, 3, 6, 1, 4, 1, 99, 1), attr))?;
//! agent.start(&SecurityConfiguration::default()).await?;
//! // ...
//! agent.stop().await;
//! # Ok(())
//! # }
//! ```

mod object_tree;
mod request;
mod set_handler;
pub mod trap;
mod usm;
pub mod vacm;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub use object_tree::{FamilyChange, ObjectTree};
pub use trap::{TrapSender, TrapSlot, TrapTarget};
pub use vacm::{
    AccessEntryBuilder, NOTIFY_VIEW, READ_VIEW, SecurityModel, VacmAccessEntry, VacmConfig, View,
    ViewSubtree, WRITE_VIEW,
};

use crate::error::{Error, ErrorStatus, RegistrationError, Result};
use crate::handler::RequestContext;
use crate::message::{CommunityMessage, Message, SecurityLevel};
use crate::object::ManagedObject;
use crate::oid::Oid;
use crate::pdu::{Pdu, PduType};
use crate::security::{AccessRights, SecurityConfiguration};
use crate::util::bind_agent_socket;
use crate::v3::{LocalEngine, SaltCounter, UsmUserTable, generate_engine_id};
use crate::version::Version;

/// Largest UDP payload over IPv4.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 65507;

const COMMUNITY_READ_GROUP: &str = "gateway-community-read";
const COMMUNITY_WRITE_GROUP: &str = "gateway-community-write";

/// Transport and protocol settings of one agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub bind: SocketAddr,
    /// Every registered OID must lie strictly below this prefix.
    pub context: Oid,
    pub engine_id: Bytes,
    /// Upper bound on a single receive wait.
    pub socket_timeout: Duration,
    pub max_message_size: usize,
    pub max_concurrent_requests: usize,
    pub read_community: Option<Bytes>,
    pub write_community: Option<Bytes>,
    pub cold_start: bool,
}

impl AgentConfig {
    /// Defaults: `127.0.0.1:161`, generated engine id, community `public`
    /// read-only.
    pub fn new(context: Oid) -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 161)),
            context,
            engine_id: generate_engine_id(),
            socket_timeout: Duration::from_millis(5000),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_concurrent_requests: 32,
            read_community: Some(Bytes::from_static(b"public")),
            write_community: None,
            cold_start: true,
        }
    }
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Created,
    Running,
    Stopped,
}

enum Lifecycle {
    Created,
    Running(Running),
    Stopped,
}

impl Lifecycle {
    fn state(&self) -> AgentState {
        match self {
            Lifecycle::Created => AgentState::Created,
            Lifecycle::Running(_) => AgentState::Running,
            Lifecycle::Stopped => AgentState::Stopped,
        }
    }
}

struct Running {
    local_addr: SocketAddr,
    token: CancellationToken,
    tracker: TaskTracker,
}

/// State that outlives a single run.
struct Shared {
    config: AgentConfig,
    tree: RwLock<ObjectTree>,
    vacm: RwLock<VacmConfig>,
    users: RwLock<UsmUserTable>,
    next_transaction: AtomicU64,
}

impl Shared {
    /// Add or drop a family's subtree in all three views.
    fn apply(&self, change: FamilyChange) {
        match change {
            FamilyChange::Unchanged => {}
            FamilyChange::Added(family) => {
                let mut vacm = self.vacm.write();
                for view in [READ_VIEW, WRITE_VIEW, NOTIFY_VIEW] {
                    vacm.include_subtree(view, family.clone());
                }
            }
            FamilyChange::Removed(family) => {
                let mut vacm = self.vacm.write();
                for view in [READ_VIEW, WRITE_VIEW, NOTIFY_VIEW] {
                    vacm.remove_subtree(view, &family);
                }
            }
        }
    }
}

/// Per-run request processing state.
pub(crate) struct Session {
    shared: Arc<Shared>,
    engine: Arc<LocalEngine>,
    salt: SaltCounter,
}

/// SNMP agent serving the registered managed objects.
pub struct ProtocolAgent {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
    boots: AtomicU32,
    cold_start_pending: AtomicBool,
    traps: TrapSlot,
}

impl ProtocolAgent {
    pub fn new(config: AgentConfig) -> Self {
        let cold_start = config.cold_start;
        let tree = ObjectTree::new(config.context.clone());
        Self {
            shared: Arc::new(Shared {
                config,
                tree: RwLock::new(tree),
                vacm: RwLock::new(VacmConfig::new()),
                users: RwLock::new(UsmUserTable::new()),
                next_transaction: AtomicU64::new(1),
            }),
            lifecycle: Mutex::new(Lifecycle::Created),
            boots: AtomicU32::new(0),
            cold_start_pending: AtomicBool::new(cold_start),
            traps: TrapSlot::new(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.shared.config
    }

    pub fn engine_id(&self) -> &Bytes {
        &self.shared.config.engine_id
    }

    pub fn context(&self) -> &Oid {
        &self.shared.config.context
    }

    pub async fn state(&self) -> AgentState {
        self.lifecycle.lock().await.state()
    }

    /// Bound address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.lifecycle.lock().await {
            Lifecycle::Running(running) => Some(running.local_addr),
            _ => None,
        }
    }

    /// The live trap facility; empty while the agent is not running.
    pub fn traps(&self) -> TrapSlot {
        self.traps.clone()
    }

    /// True exactly once, on the first start, when cold start is enabled.
    pub fn take_cold_start(&self) -> bool {
        self.cold_start_pending.swap(false, Ordering::AcqRel)
    }

    /// Bind the transport, install security and begin serving requests.
    pub async fn start(&self, security: &SecurityConfiguration) -> Result<SocketAddr> {
        let mut lifecycle = self.lifecycle.lock().await;
        if matches!(*lifecycle, Lifecycle::Running(_)) {
            tracing::warn!(context = %self.context(), "agent already running, start ignored");
            return Err(Error::AlreadyRunning);
        }

        let config = &self.shared.config;
        let socket = bind_agent_socket(config.bind, config.max_message_size)
            .await
            .map_err(|err| Error::io(Some(config.bind), err))?;
        let local_addr = socket
            .local_addr()
            .map_err(|err| Error::io(Some(config.bind), err))?;
        let socket = Arc::new(socket);

        let boots = self.boots.fetch_add(1, Ordering::AcqRel) + 1;
        let engine = Arc::new(LocalEngine::new(config.engine_id.clone(), boots));
        self.install_security(security);

        let notify_user = security
            .users_with(AccessRights::NOTIFY)
            .next()
            .map(|(_, user)| user.localize(&config.engine_id));
        let mut traps = TrapSender::new(socket.clone(), engine.clone(), notify_user);
        if let Some(community) = &config.read_community {
            traps = traps.with_community(community.clone());
        }
        self.traps.install(Arc::new(traps));

        let session = Arc::new(Session {
            shared: self.shared.clone(),
            engine,
            salt: SaltCounter::new(),
        });
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        tracker.spawn(serve(session, socket, token.clone(), tracker.clone()));

        tracing::info!(
            snmp.local_addr = %local_addr,
            context = %config.context,
            engine_id = %hex::encode(&config.engine_id),
            boots,
            "agent started"
        );
        *lifecycle = Lifecycle::Running(Running {
            local_addr,
            token,
            tracker,
        });
        Ok(local_addr)
    }

    /// Stop accepting requests, drain in-flight ones, then release the
    /// transport, the trap facility, the object tree and the USM users.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if !matches!(*lifecycle, Lifecycle::Running(_)) {
            tracing::debug!("agent not running, stop ignored");
            return;
        }
        let Lifecycle::Running(running) = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        else {
            return;
        };

        running.token.cancel();
        running.tracker.close();
        running.tracker.wait().await;

        self.traps.clear();
        let families = self.shared.tree.write().clear();
        for family in families {
            self.shared.apply(FamilyChange::Removed(family));
        }
        *self.shared.users.write() = UsmUserTable::new();
        tracing::info!(snmp.local_addr = %running.local_addr, "agent stopped");
    }

    /// Add an object to the tree, widening the views for a new family.
    pub fn register(&self, object: ManagedObject) -> std::result::Result<(), RegistrationError> {
        let oid = object.oid().clone();
        let change = self.shared.tree.write().register(object).inspect_err(|err| {
            tracing::error!(gateway.oid = %oid, error = %err, "registration rejected");
        })?;
        tracing::debug!(gateway.oid = %oid, "object registered");
        self.shared.apply(change);
        Ok(())
    }

    pub fn unregister(&self, oid: &Oid) -> Option<ManagedObject> {
        let (object, change) = self.shared.tree.write().unregister(oid)?;
        tracing::debug!(gateway.oid = %oid, "object unregistered");
        self.shared.apply(change);
        Some(object)
    }

    pub fn is_registered(&self, oid: &Oid) -> bool {
        self.shared
            .tree
            .read()
            .find(oid)
            .is_some_and(|object| object.oid() == oid)
    }

    pub fn registered(&self) -> Vec<Oid> {
        self.shared
            .tree
            .read()
            .objects()
            .map(|object| object.oid().clone())
            .collect()
    }

    /// Rebuild VACM and the USM user table from scratch.
    fn install_security(&self, security: &SecurityConfiguration) {
        let config = &self.shared.config;
        let mut vacm = VacmConfig::new();
        for view in [READ_VIEW, WRITE_VIEW, NOTIFY_VIEW] {
            vacm.add_view(view, View::new());
        }
        for family in self.shared.tree.read().families() {
            for view in [READ_VIEW, WRITE_VIEW, NOTIFY_VIEW] {
                vacm.include_subtree(view, family.clone());
            }
        }

        let communities = [
            (&config.read_community, COMMUNITY_READ_GROUP, false),
            (&config.write_community, COMMUNITY_WRITE_GROUP, true),
        ];
        for (community, group, writable) in communities {
            let Some(community) = community.as_ref().filter(|c| !c.is_empty()) else {
                continue;
            };
            vacm.add_group(community.clone(), SecurityModel::V1, group);
            vacm.add_group(community.clone(), SecurityModel::V2c, group);
            let mut entry = AccessEntryBuilder::new(group)
                .read_view(READ_VIEW)
                .notify_view(NOTIFY_VIEW);
            if writable {
                entry = entry.write_view(WRITE_VIEW);
            }
            vacm.add_access(entry.build());
        }

        let mut users = UsmUserTable::new();
        security.install(&config.engine_id, &mut users, &mut vacm);
        *self.shared.vacm.write() = vacm;
        *self.shared.users.write() = users;
    }
}

impl std::fmt::Debug for ProtocolAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolAgent")
            .field("context", self.context())
            .field("bind", &self.shared.config.bind)
            .field("objects", &self.shared.tree.read().len())
            .finish_non_exhaustive()
    }
}

/// Receive loop. Each datagram is processed on its own task, bounded by the
/// worker semaphore.
async fn serve(
    session: Arc<Session>,
    socket: Arc<UdpSocket>,
    token: CancellationToken,
    tracker: TaskTracker,
) {
    let config = &session.shared.config;
    let workers = Arc::new(Semaphore::new(config.max_concurrent_requests.max(1)));
    let mut buf = vec![0u8; config.max_message_size];

    loop {
        let recv = tokio::time::timeout(config.socket_timeout, socket.recv_from(&mut buf));
        let received = tokio::select! {
            _ = token.cancelled() => break,
            received = recv => received,
        };
        let (len, source) = match received {
            Err(_) => continue,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "receive failed");
                continue;
            }
            Ok(Ok(received)) => received,
        };
        let data = Bytes::copy_from_slice(&buf[..len]);

        let permit = tokio::select! {
            _ = token.cancelled() => break,
            permit = workers.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let session = session.clone();
        let socket = socket.clone();
        tracker.spawn(async move {
            let _permit = permit;
            if let Some(response) = session.handle_datagram(data, source).await
                && let Err(err) = socket.send_to(&response, source).await
            {
                tracing::warn!(snmp.source = %source, error = %err, "failed to send response");
            }
        });
    }
    tracing::debug!("receive loop finished");
}

impl Session {
    fn max_message_size(&self) -> usize {
        self.shared.config.max_message_size
    }

    async fn handle_datagram(&self, data: Bytes, source: SocketAddr) -> Option<Bytes> {
        match Message::decode(data) {
            Ok(Message::Community(msg)) => self.handle_community(msg, source).await,
            Ok(Message::V3(msg)) => self.handle_v3(msg, source).await,
            Err(err) => {
                tracing::debug!(
                    snmp.source = %source,
                    error = %err,
                    "dropping undecodable datagram"
                );
                None
            }
        }
    }

    async fn handle_community(&self, msg: CommunityMessage, source: SocketAddr) -> Option<Bytes> {
        let model = match msg.version {
            Version::V1 => SecurityModel::V1,
            _ => SecurityModel::V2c,
        };
        let access = self
            .shared
            .vacm
            .read()
            .resolve(model, &msg.community, b"", SecurityLevel::NoAuthNoPriv)
            .cloned();
        let Some(access) = access else {
            tracing::debug!(
                snmp.source = %source,
                snmp.version = %msg.version,
                "unknown community, request dropped"
            );
            return None;
        };

        let ctx = RequestContext {
            source,
            version: msg.version,
            security_model: model,
            security_name: msg.community.clone(),
            security_level: SecurityLevel::NoAuthNoPriv,
            context_name: Bytes::new(),
            request_id: msg.pdu.request_id,
            pdu_type: msg.pdu.pdu_type,
            group_name: Some(access.group_name.clone()),
            read_view: Some(access.read_view.clone()),
            write_view: Some(access.write_view.clone()),
            transaction_id: 0,
        };
        let max_size = self.max_message_size();
        let response = self.dispatch(&ctx, &msg.pdu, max_size).await?;

        let encoded = CommunityMessage::new(msg.version, msg.community.clone(), response).encode();
        if encoded.len() <= max_size {
            return Some(encoded);
        }
        tracing::debug!(size = encoded.len(), max = max_size, "response too big");
        let mut too_big = msg.pdu.error_response(ErrorStatus::TooBig, 0);
        too_big.varbinds.clear();
        Some(CommunityMessage::new(msg.version, msg.community, too_big).encode())
    }

    fn context_v3(
        &self,
        source: SocketAddr,
        auth: &usm::Authenticated,
        access: &VacmAccessEntry,
    ) -> RequestContext {
        RequestContext {
            source,
            version: Version::V3,
            security_model: SecurityModel::Usm,
            security_name: auth.user.name.clone(),
            security_level: auth.level,
            context_name: auth.scoped.context_name.clone(),
            request_id: auth.scoped.pdu.request_id,
            pdu_type: auth.scoped.pdu.pdu_type,
            group_name: Some(access.group_name.clone()),
            read_view: Some(access.read_view.clone()),
            write_view: Some(access.write_view.clone()),
            transaction_id: 0,
        }
    }

    /// Route a PDU by type. `None` means no response is sent.
    async fn dispatch(&self, ctx: &RequestContext, pdu: &Pdu, max_size: usize) -> Option<Pdu> {
        tracing::trace!(
            snmp.source = %ctx.source,
            snmp.request_id = pdu.request_id,
            snmp.pdu_type = %pdu.pdu_type,
            varbinds = pdu.varbinds.len(),
            "dispatching request"
        );
        match pdu.pdu_type {
            PduType::GetRequest => Some(self.handle_get(ctx, pdu).await),
            PduType::GetNextRequest => Some(self.handle_get_next(ctx, pdu).await),
            PduType::GetBulkRequest if ctx.version != Version::V1 => {
                Some(self.handle_get_bulk(ctx, pdu, max_size).await)
            }
            PduType::SetRequest => {
                let mut ctx = ctx.clone();
                ctx.transaction_id = self.shared.next_transaction.fetch_add(1, Ordering::Relaxed);
                Some(self.handle_set(&ctx, pdu).await)
            }
            other => {
                tracing::debug!(
                    snmp.source = %ctx.source,
                    snmp.pdu_type = %other,
                    "unsupported PDU type, dropped"
                );
                None
            }
        }
    }

    /// Error response, with the status mapped for v1 managers.
    fn error(&self, ctx: &RequestContext, pdu: &Pdu, status: ErrorStatus, index: usize) -> Pdu {
        let status = match ctx.version {
            Version::V1 => status.to_v1(),
            _ => status,
        };
        pdu.error_response(status, index as i32)
    }
}

#[cfg(test)]
impl Session {
    /// A session over `agent`'s state, without a transport.
    pub(crate) fn for_agent(agent: &ProtocolAgent, boots: u32) -> Self {
        Self {
            shared: agent.shared.clone(),
            engine: Arc::new(LocalEngine::new(agent.engine_id().clone(), boots)),
            salt: SaltCounter::new(),
        }
    }
}
