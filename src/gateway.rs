//! The gateway facade the hosting runtime talks to.
//!
//! [`SnmpGateway`] keeps the features (attributes and notifications) the
//! host has added, independent of whether the agent is running. Attributes
//! added while stopped are registered on the next start; attributes added
//! while running are registered immediately, and the burst of changes is
//! reported to [`on_update`](SnmpGateway::on_update) listeners once it settles.
//!
//! # Example
//!
//! ```rust,no_run
//! use snmp_gateway::attribute::{AttributeDescriptor, AttributeType, AttributeValue, MemoryAttribute};
//! use snmp_gateway::config::GatewayConfig;
//! use snmp_gateway::gateway::SnmpGateway;
//! use snmp_gateway::oid;
//!
//! # async fn example() -> snmp_gateway::Result<()> {
//! let config = GatewayConfig::builder(oid!(1, 3, 6, 1, 4, 1, 99)).build();
//! let gateway = SnmpGateway::new(config);
//! let oid = gateway.add_attribute(MemoryAttribute::new(
//!     AttributeDescriptor::new("enabled", AttributeType::Bool),
//!     AttributeValue::Bool(true),
//! ))?;
//! gateway.start().await?;
//! println!("serving enabled at {}", oid);
//! gateway.stop().await;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::agent::{AgentState, ProtocolAgent, trap};
use crate::attribute::AttributeAccessor;
use crate::config::GatewayConfig;
use crate::error::{Error, RegistrationError, Result};
use crate::notification::{NotificationBinding, NotificationDescriptor};
use crate::object::ManagedObject;
use crate::oid::Oid;
use crate::security::{DirectoryConnector, SecurityConfiguration};
use crate::update::UpdateManager;

/// What the gateway exposes after a burst of changes settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayUpdate {
    pub attributes: Vec<Oid>,
    pub notifications: Vec<Oid>,
}

type UpdateListener = Arc<dyn Fn(&GatewayUpdate) + Send + Sync>;

#[derive(Default)]
struct Features {
    attributes: BTreeMap<String, ManagedObject>,
    notifications: BTreeMap<String, NotificationBinding>,
    /// Last auto-generated OID suffix.
    next_oid: u32,
}

impl Features {
    fn snapshot(&self) -> GatewayUpdate {
        GatewayUpdate {
            attributes: self.attributes.values().map(|o| o.oid().clone()).collect(),
            notifications: self.notifications.values().map(|n| n.oid().clone()).collect(),
        }
    }

    /// Explicit OID, or the next `oidPrefix.N` no feature holds yet.
    fn assign(&mut self, explicit: Option<Result<Oid>>, prefix: &Oid) -> Result<Oid> {
        if let Some(oid) = explicit {
            return oid;
        }
        loop {
            self.next_oid += 1;
            let oid = prefix.child(self.next_oid);
            let taken = self.attributes.values().any(|o| o.oid() == &oid)
                || self.notifications.values().any(|n| n.oid() == &oid);
            if !taken {
                return Ok(oid);
            }
        }
    }
}

/// SNMP gateway over a set of managed attributes and notifications.
pub struct SnmpGateway {
    config: GatewayConfig,
    agent: ProtocolAgent,
    features: Arc<Mutex<Features>>,
    listeners: Arc<RwLock<Vec<UpdateListener>>>,
    updates: tokio::sync::Mutex<Option<UpdateManager>>,
    connector: Option<Arc<dyn DirectoryConnector>>,
}

impl SnmpGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            agent: ProtocolAgent::new(config.agent_config()),
            config,
            features: Arc::new(Mutex::new(Features::default())),
            listeners: Arc::new(RwLock::new(Vec::new())),
            updates: tokio::sync::Mutex::new(None),
            connector: None,
        }
    }

    /// Source directory-backed security configuration through `connector`.
    pub fn with_directory(mut self, connector: Arc<dyn DirectoryConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn agent(&self) -> &ProtocolAgent {
        &self.agent
    }

    pub async fn state(&self) -> AgentState {
        self.agent.state().await
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.agent.local_addr().await
    }

    /// Register a listener called once per settled burst of changes.
    pub fn on_update(&self, listener: impl Fn(&GatewayUpdate) + Send + Sync + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Add an attribute and return its OID.
    ///
    /// The OID comes from the descriptor's `oid` option or is generated below
    /// `oidPrefix`. It must lie below the context.
    pub fn add_attribute(&self, accessor: Arc<dyn AttributeAccessor>) -> Result<Oid> {
        let descriptor = accessor.descriptor();
        let name = descriptor.name.clone();
        let object = {
            let mut features = self.features.lock();
            if features.attributes.contains_key(&name) {
                return Err(RegistrationError::DuplicateName(name).into());
            }
            let oid = features.assign(descriptor.oid(), &self.config.oid_prefix)?;
            if !oid.starts_with(&self.config.context) || oid == self.config.context {
                return Err(RegistrationError::OutsideContext {
                    oid,
                    context: self.config.context.clone(),
                }
                .into());
            }
            let object = ManagedObject::new(oid, accessor);
            features.attributes.insert(name.clone(), object.clone());
            object
        };
        let oid = object.oid().clone();
        tracing::debug!(gateway.oid = %oid, attribute = %name, "attribute added");

        if self.agent.traps().is_active() {
            if let Err(err) = self.agent.register(object) {
                self.features.lock().attributes.remove(&name);
                return Err(err.into());
            }
            self.schedule_update();
        }
        Ok(oid)
    }

    /// Remove an attribute by name, returning the OID it held.
    pub fn remove_attribute(&self, name: &str) -> Option<Oid> {
        let object = self.features.lock().attributes.remove(name)?;
        let oid = object.oid().clone();
        tracing::debug!(gateway.oid = %oid, attribute = %name, "attribute removed");
        if self.agent.unregister(&oid).is_some() {
            self.schedule_update();
        }
        Some(oid)
    }

    /// Add a notification and return its binding.
    ///
    /// The binding stays valid across restarts; while the agent is stopped
    /// it drops what it is asked to send.
    pub fn add_notification(&self, descriptor: &NotificationDescriptor) -> Result<NotificationBinding> {
        let binding = {
            let mut features = self.features.lock();
            if features.notifications.contains_key(&descriptor.category) {
                return Err(RegistrationError::DuplicateName(descriptor.category.clone()).into());
            }
            let oid = features.assign(descriptor.oid(), &self.config.oid_prefix)?;
            let binding = NotificationBinding::new(descriptor, oid, self.agent.traps())?;
            features
                .notifications
                .insert(descriptor.category.clone(), binding.clone());
            binding
        };
        tracing::debug!(
            gateway.oid = %binding.oid(),
            category = %descriptor.category,
            trap.target = %binding.target().address,
            "notification added"
        );
        if self.agent.traps().is_active() {
            self.schedule_update();
        }
        Ok(binding)
    }

    pub fn remove_notification(&self, category: &str) -> Option<NotificationBinding> {
        let binding = self.features.lock().notifications.remove(category)?;
        tracing::debug!(gateway.oid = %binding.oid(), category, "notification removed");
        if self.agent.traps().is_active() {
            self.schedule_update();
        }
        Some(binding)
    }

    pub fn notification(&self, category: &str) -> Option<NotificationBinding> {
        self.features.lock().notifications.get(category).cloned()
    }

    /// Features currently held, running or not.
    pub fn features(&self) -> GatewayUpdate {
        self.features.lock().snapshot()
    }

    /// Load security, start the agent and register every attribute.
    ///
    /// The update timer is in place before the agent starts, so changes made
    /// while registration is still running are reported. On the first start
    /// with `coldStart` enabled, a coldStart trap goes to each distinct
    /// notification receiver.
    pub async fn start(&self) -> Result<SocketAddr> {
        if self.agent.state().await == AgentState::Running {
            return Err(Error::AlreadyRunning);
        }
        let security =
            SecurityConfiguration::from_params(&self.config.params, self.connector.as_deref())
                .await?;

        if let Some(previous) = self.updates.lock().await.replace(self.update_manager()) {
            previous.close().await;
        }
        let local_addr = match self.agent.start(&security).await {
            Ok(addr) => addr,
            Err(err) => {
                if let Some(manager) = self.updates.lock().await.take() {
                    manager.close().await;
                }
                return Err(err);
            }
        };

        let objects: Vec<ManagedObject> =
            self.features.lock().attributes.values().cloned().collect();
        for object in objects {
            // Added concurrently once the agent went live
            if self.agent.is_registered(object.oid()) {
                continue;
            }
            // Rejections are logged by the agent; the rest still serve.
            let _ = self.agent.register(object);
        }

        if self.agent.take_cold_start() {
            self.send_cold_start().await;
        }
        Ok(local_addr)
    }

    fn update_manager(&self) -> UpdateManager {
        let features = self.features.clone();
        let listeners = self.listeners.clone();
        UpdateManager::new(
            self.config.restart_timeout,
            Arc::new(move || {
                let update = features.lock().snapshot();
                let listeners = listeners.read().clone();
                tracing::info!(
                    attributes = update.attributes.len(),
                    notifications = update.notifications.len(),
                    "gateway features updated"
                );
                for listener in listeners {
                    listener(&update);
                }
            }),
        )
    }

    /// Stop the update timer and the agent. Features are kept for the next
    /// start.
    pub async fn stop(&self) {
        if let Some(manager) = self.updates.lock().await.take() {
            manager.close().await;
        }
        self.agent.stop().await;
    }

    fn schedule_update(&self) {
        match self.updates.try_lock() {
            Ok(guard) => {
                if let Some(manager) = guard.as_ref() {
                    manager.schedule();
                }
            }
            Err(_) => tracing::debug!("gateway starting or stopping, update not scheduled"),
        }
    }

    async fn send_cold_start(&self) {
        let Some(sender) = self.agent.traps().get() else {
            return;
        };
        let targets: Vec<_> = {
            let features = self.features.lock();
            let mut seen = HashSet::new();
            features
                .notifications
                .values()
                .map(|binding| binding.target().clone())
                .filter(|target| seen.insert(target.address))
                .collect()
        };
        for target in targets {
            match sender.send(&target, &trap::cold_start(), Vec::new()).await {
                Ok(()) => tracing::info!(trap.target = %target.address, "coldStart sent"),
                Err(err) => tracing::warn!(
                    trap.target = %target.address,
                    error = %err,
                    "coldStart not delivered"
                ),
            }
        }
    }
}

impl std::fmt::Debug for SnmpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let features = self.features.lock();
        f.debug_struct("SnmpGateway")
            .field("context", &self.config.context)
            .field("attributes", &features.attributes.len())
            .field("notifications", &features.notifications.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::net::UdpSocket;

    use super::*;
    use crate::attribute::{AttributeDescriptor, AttributeType, AttributeValue, MemoryAttribute};
    use crate::message::Message;
    use crate::notification::OPTION_RECEIVER_ADDRESS;
    use crate::oid;
    use crate::value::Value;

    fn config() -> GatewayConfig {
        GatewayConfig::builder(oid!(1, 3, 6, 1, 4, 1, 99))
            .bind("127.0.0.1:0".parse().unwrap())
            .socket_timeout(Duration::from_millis(50))
            .restart_timeout(Duration::from_millis(50))
            .build()
    }

    fn attribute(name: &str) -> Arc<MemoryAttribute> {
        MemoryAttribute::new(
            AttributeDescriptor::new(name, AttributeType::Int),
            AttributeValue::Int(1),
        )
    }

    #[test]
    fn test_auto_oids_and_duplicates() {
        let gateway = SnmpGateway::new(config());
        assert_eq!(
            gateway.add_attribute(attribute("a")).unwrap(),
            oid!(1, 3, 6, 1, 4, 1, 99, 1)
        );
        let explicit = MemoryAttribute::new(
            AttributeDescriptor::new("b", AttributeType::Int).with_oid(&oid!(1, 3, 6, 1, 4, 1, 99, 2)),
            AttributeValue::Int(2),
        );
        assert_eq!(gateway.add_attribute(explicit).unwrap(), oid!(1, 3, 6, 1, 4, 1, 99, 2));
        assert_eq!(
            gateway.add_attribute(attribute("c")).unwrap(),
            oid!(1, 3, 6, 1, 4, 1, 99, 3)
        );
        assert!(matches!(
            gateway.add_attribute(attribute("a")),
            Err(Error::Registration(RegistrationError::DuplicateName(_)))
        ));

        let outside = MemoryAttribute::new(
            AttributeDescriptor::new("d", AttributeType::Int).with_oid(&oid!(1, 3, 6, 1, 4, 1, 98, 1)),
            AttributeValue::Int(2),
        );
        assert!(matches!(
            gateway.add_attribute(outside),
            Err(Error::Registration(RegistrationError::OutsideContext { .. }))
        ));
        assert_eq!(gateway.remove_attribute("b"), Some(oid!(1, 3, 6, 1, 4, 1, 99, 2)));
        assert_eq!(gateway.features().attributes.len(), 2);
    }

    #[tokio::test]
    async fn test_deferred_registration_survives_restart() {
        let gateway = SnmpGateway::new(config());
        let oid = gateway.add_attribute(attribute("a")).unwrap();
        assert!(!gateway.agent().is_registered(&oid));

        gateway.start().await.unwrap();
        assert!(gateway.agent().is_registered(&oid));
        gateway.stop().await;
        assert!(!gateway.agent().is_registered(&oid));

        gateway.start().await.unwrap();
        assert!(gateway.agent().is_registered(&oid));
        gateway.stop().await;
    }

    #[tokio::test]
    async fn test_start_skips_objects_already_live() {
        let gateway = SnmpGateway::new(config());
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = fired.clone();
        gateway.on_update(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let oid = gateway.add_attribute(attribute("a")).unwrap();
        // As if an add raced the start and registered first
        let object = gateway.features.lock().attributes["a"].clone();
        gateway.agent().register(object).unwrap();

        gateway.start().await.unwrap();
        assert_eq!(gateway.agent().registered(), vec![oid]);
        assert!(matches!(gateway.start().await, Err(Error::AlreadyRunning)));

        // The timer survived the rejected second start
        gateway.add_attribute(attribute("b")).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        gateway.stop().await;
    }

    #[tokio::test]
    async fn test_updates_are_debounced() {
        let gateway = SnmpGateway::new(config());
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = fired.clone();
        gateway.on_update(move |update| {
            assert_eq!(update.attributes.len(), 3);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        gateway.start().await.unwrap();

        for name in ["a", "b", "c"] {
            gateway.add_attribute(attribute(name)).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        gateway.stop().await;
    }

    #[tokio::test]
    async fn test_cold_start_sent_once_per_receiver() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = receiver.local_addr().unwrap().to_string();
        let gateway = SnmpGateway::new(config());
        for category in ["disk", "cpu"] {
            gateway
                .add_notification(
                    &NotificationDescriptor::new(category)
                        .with_option(OPTION_RECEIVER_ADDRESS, address.clone()),
                )
                .unwrap();
        }
        gateway.start().await.unwrap();

        let mut buf = vec![0u8; 4096];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        let Message::Community(msg) = Message::decode(Bytes::copy_from_slice(&buf[..len])).unwrap()
        else {
            panic!("expected community trap");
        };
        assert_eq!(msg.pdu.varbinds[1].value, Value::ObjectIdentifier(trap::cold_start()));

        let second = tokio::time::timeout(Duration::from_millis(200), receiver.recv_from(&mut buf)).await;
        assert!(second.is_err(), "coldStart must reach each receiver once");

        gateway.stop().await;
        gateway.start().await.unwrap();
        let again = tokio::time::timeout(Duration::from_millis(200), receiver.recv_from(&mut buf)).await;
        assert!(again.is_err(), "coldStart must not repeat on restart");
        gateway.stop().await;
    }
}
