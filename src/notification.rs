//! Event notifications mapped onto SNMPv2-Trap PDUs.
//!
//! A [`NotificationMapper`] turns a [`NotificationEvent`] into variable
//! bindings below the notification's OID:
//!
//! | suffix | content |
//! |--------|---------|
//! | `.1` | message text |
//! | `.2` | severity |
//! | `.3` | sequence number |
//! | `.4` | timestamp, per the `displayFormat` option |
//! | `.5` | category |
//! | `.6` | event type |
//! | `.7` | source |
//! | `.11` | attachment, flattened like a table attribute |
//!
//! A [`NotificationBinding`] pairs a mapper with its receiver and the
//! agent's [`TrapSlot`]. When the agent is stopped the slot is empty and
//! notifications are dropped.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::agent::{TrapSlot, TrapTarget};
use crate::attribute::{AttributeValue, OPTION_DISPLAY_FORMAT, OPTION_OID};
use crate::codec::{DateFormatter, flatten};
use crate::error::ConfigError;
use crate::oid::Oid;
use crate::value::Value;
use crate::varbind::VarBind;

/// Option key: receiver display name.
pub const OPTION_RECEIVER_NAME: &str = "receiverName";
/// Option key: receiver `host:port` or `host/port`.
pub const OPTION_RECEIVER_ADDRESS: &str = "receiverAddress";
/// Option key: per-attempt send timeout in milliseconds.
pub const OPTION_SENDING_TIMEOUT: &str = "sendingTimeout";
/// Option key: retries after the first attempt.
pub const OPTION_RETRY_COUNT: &str = "retryCount";

/// Standard trap port.
pub const DEFAULT_TRAP_PORT: u16 = 162;
pub const DEFAULT_SENDING_TIMEOUT: Duration = Duration::from_millis(2000);
pub const DEFAULT_RETRY_COUNT: u32 = 3;

const MESSAGE: u32 = 1;
const SEVERITY: u32 = 2;
const SEQUENCE: u32 = 3;
const TIMESTAMP: u32 = 4;
const CATEGORY: u32 = 5;
const EVENT_TYPE: u32 = 6;
const SOURCE: u32 = 7;
const ATTACHMENT: u32 = 11;

/// One event raised by a managed resource.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub message: String,
    pub severity: i32,
    pub sequence: i64,
    pub timestamp: DateTime<Utc>,
    pub category: String,
    pub event_type: String,
    pub source: String,
    pub attachment: Option<AttributeValue>,
}

impl NotificationEvent {
    /// An event stamped now, with sequence 0 and no attachment.
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        let category = category.into();
        Self {
            message: message.into(),
            severity: 0,
            sequence: 0,
            timestamp: Utc::now(),
            event_type: category.clone(),
            category,
            source: String::new(),
            attachment: None,
        }
    }

    pub fn with_severity(mut self, severity: i32) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_sequence(mut self, sequence: i64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_attachment(mut self, attachment: AttributeValue) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// Notification metadata supplied by the hosting runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDescriptor {
    /// Category the resource emits under; unique per gateway.
    pub category: String,
    pub options: HashMap<String, String>,
}

impl NotificationDescriptor {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            options: HashMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Explicit OID, when the `oid` option is present.
    pub fn oid(&self) -> Option<crate::Result<Oid>> {
        self.option(OPTION_OID).map(Oid::parse)
    }

    /// Receiver wiring from the options.
    ///
    /// The address is mandatory; the name defaults to the address text.
    pub fn target(&self) -> Result<TrapTarget, ConfigError> {
        let raw = self
            .option(OPTION_RECEIVER_ADDRESS)
            .ok_or(ConfigError::Missing(OPTION_RECEIVER_ADDRESS))?;
        let address = parse_receiver(raw)?;
        let timeout = match self.option(OPTION_SENDING_TIMEOUT) {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|err| ConfigError::invalid(OPTION_SENDING_TIMEOUT, value, err))?,
            None => DEFAULT_SENDING_TIMEOUT,
        };
        let retries = match self.option(OPTION_RETRY_COUNT) {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .map_err(|err| ConfigError::invalid(OPTION_RETRY_COUNT, value, err))?,
            None => DEFAULT_RETRY_COUNT,
        };
        Ok(TrapTarget {
            name: self
                .option(OPTION_RECEIVER_NAME)
                .unwrap_or(raw)
                .to_string(),
            address,
            timeout,
            retries,
        })
    }
}

/// Resolve `host:port`, `host/port` or a bare host on the trap port.
fn parse_receiver(raw: &str) -> Result<SocketAddr, ConfigError> {
    let text = raw.trim();
    let text = text.strip_prefix("udp:").unwrap_or(text);
    if let Some((host, port)) = text.rsplit_once('/') {
        return resolve(raw, &format!("{}:{}", host, port));
    }
    if let Ok(addr) = text.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = text.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_TRAP_PORT));
    }
    match text.contains(':') {
        true => resolve(raw, text),
        false => resolve(raw, &format!("{}:{}", text, DEFAULT_TRAP_PORT)),
    }
}

fn resolve(raw: &str, candidate: &str) -> Result<SocketAddr, ConfigError> {
    candidate
        .to_socket_addrs()
        .map_err(|err| ConfigError::invalid(OPTION_RECEIVER_ADDRESS, raw, err))?
        .next()
        .ok_or_else(|| ConfigError::invalid(OPTION_RECEIVER_ADDRESS, raw, "no address resolved"))
}

/// Builds the bindings for one notification OID.
#[derive(Debug, Clone)]
pub struct NotificationMapper {
    oid: Oid,
    display_format: Option<String>,
    formatter: DateFormatter,
}

impl NotificationMapper {
    pub fn new(oid: Oid, display_format: Option<&str>) -> Self {
        Self {
            oid,
            display_format: display_format.map(str::to_string),
            formatter: DateFormatter::from_name(display_format),
        }
    }

    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    pub fn map(&self, event: &NotificationEvent) -> Vec<VarBind> {
        let text = |s: &str| Value::OctetString(Bytes::copy_from_slice(s.as_bytes()));
        let mut varbinds = vec![
            VarBind::new(self.oid.child(MESSAGE), text(&event.message)),
            VarBind::new(self.oid.child(SEVERITY), Value::Integer(event.severity)),
            VarBind::new(
                self.oid.child(SEQUENCE),
                Value::Counter64(event.sequence as u64),
            ),
            VarBind::new(
                self.oid.child(TIMESTAMP),
                Value::OctetString(self.formatter.format_lossy(&event.timestamp)),
            ),
            VarBind::new(self.oid.child(CATEGORY), text(&event.category)),
            VarBind::new(self.oid.child(EVENT_TYPE), text(&event.event_type)),
            VarBind::new(self.oid.child(SOURCE), text(&event.source)),
        ];
        if let Some(attachment) = &event.attachment {
            varbinds.extend(flatten(
                &self.oid.child(ATTACHMENT),
                attachment,
                self.display_format.as_deref(),
            ));
        }
        varbinds
    }
}

/// A notification wired to its receiver.
#[derive(Debug, Clone)]
pub struct NotificationBinding {
    category: String,
    mapper: NotificationMapper,
    target: TrapTarget,
    traps: TrapSlot,
}

impl NotificationBinding {
    pub fn new(
        descriptor: &NotificationDescriptor,
        oid: Oid,
        traps: TrapSlot,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            category: descriptor.category.clone(),
            mapper: NotificationMapper::new(oid, descriptor.option(OPTION_DISPLAY_FORMAT)),
            target: descriptor.target()?,
            traps,
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn oid(&self) -> &Oid {
        self.mapper.oid()
    }

    pub fn target(&self) -> &TrapTarget {
        &self.target
    }

    /// Map and send one event.
    ///
    /// Without a running agent the event is dropped. Send failures are
    /// logged; they never reach the caller.
    pub async fn send(&self, event: &NotificationEvent) {
        let Some(sender) = self.traps.get() else {
            tracing::debug!(
                gateway.oid = %self.mapper.oid(),
                category = %self.category,
                "agent not running, notification dropped"
            );
            return;
        };
        let bindings = self.mapper.map(event);
        if let Err(err) = sender.send(&self.target, self.mapper.oid(), bindings).await {
            tracing::warn!(
                gateway.oid = %self.mapper.oid(),
                trap.target = %self.target.address,
                error = %err,
                "notification not delivered"
            );
        }
    }

    /// Fire-and-forget variant of [`send`](Self::send).
    pub fn emit(&self, event: NotificationEvent) {
        let binding = self.clone();
        tokio::spawn(async move { binding.send(&event).await });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use tokio::net::UdpSocket;

    use super::*;
    use crate::agent::TrapSender;
    use crate::attribute::TableValue;
    use crate::message::Message;
    use crate::oid;
    use crate::v3::{LocalEngine, generate_engine_id};

    fn mapper() -> NotificationMapper {
        NotificationMapper::new(oid!(1, 3, 6, 1, 4, 1, 99, 5), None)
    }

    fn event() -> NotificationEvent {
        NotificationEvent::new("disk", "disk almost full")
            .with_severity(5)
            .with_sequence(42)
            .with_timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
            .with_source("node-1")
    }

    #[test]
    fn test_header_block_without_attachment() {
        let varbinds = mapper().map(&event());
        let oids: Vec<_> = varbinds.iter().map(|vb| vb.oid.clone()).collect();
        assert_eq!(
            oids,
            (1..=7)
                .map(|n| oid!(1, 3, 6, 1, 4, 1, 99, 5, n))
                .collect::<Vec<_>>()
        );
        assert_eq!(varbinds[1].value, Value::Integer(5));
        assert_eq!(varbinds[2].value, Value::Counter64(42));
        assert_eq!(varbinds[5].value, Value::from("disk"));
        assert_eq!(varbinds[6].value, Value::from("node-1"));
    }

    #[test]
    fn test_bad_display_format_keeps_timestamp() {
        let mapper = NotificationMapper::new(oid!(1, 3, 6, 1, 4, 1, 99, 5), Some("%Q"));
        let varbinds = mapper.map(&event());
        assert_eq!(
            varbinds[3].value,
            Value::OctetString(Bytes::from_static(&[0x07, 0xE8, 3, 1, 12, 0, 0, 0, b'+', 0, 0]))
        );
    }

    #[test]
    fn test_scalar_attachment() {
        let varbinds = mapper().map(&event().with_attachment(AttributeValue::Int(90)));
        assert_eq!(varbinds.len(), 8);
        assert_eq!(varbinds[7].oid, oid!(1, 3, 6, 1, 4, 1, 99, 5, 11));
        assert_eq!(varbinds[7].value, Value::Integer(90));
    }

    #[test]
    fn test_table_attachment_is_flattened() {
        let table = TableValue::new(vec!["mount".into(), "used".into()])
            .with_row(vec![AttributeValue::String("/".into()), AttributeValue::Int(90)])
            .with_row(vec![AttributeValue::String("/var".into()), AttributeValue::Int(40)]);
        let varbinds = mapper().map(&event().with_attachment(AttributeValue::Table(table)));
        assert_eq!(varbinds.len(), 11);
        assert_eq!(varbinds[7].oid, oid!(1, 3, 6, 1, 4, 1, 99, 5, 11, 1, 1));
        assert_eq!(varbinds[10].oid, oid!(1, 3, 6, 1, 4, 1, 99, 5, 11, 2, 2));
        assert_eq!(varbinds[10].value, Value::Integer(40));
    }

    #[test]
    fn test_target_options() {
        let descriptor = NotificationDescriptor::new("disk")
            .with_option(OPTION_RECEIVER_ADDRESS, "127.0.0.1/10162")
            .with_option(OPTION_RECEIVER_NAME, "nms")
            .with_option(OPTION_SENDING_TIMEOUT, "250");
        let target = descriptor.target().unwrap();
        assert_eq!(target.name, "nms");
        assert_eq!(target.address, "127.0.0.1:10162".parse().unwrap());
        assert_eq!(target.timeout, Duration::from_millis(250));
        assert_eq!(target.retries, DEFAULT_RETRY_COUNT);

        let bare = NotificationDescriptor::new("disk").with_option(OPTION_RECEIVER_ADDRESS, "127.0.0.1");
        assert_eq!(bare.target().unwrap().address.port(), DEFAULT_TRAP_PORT);

        assert_eq!(
            NotificationDescriptor::new("disk").target(),
            Err(ConfigError::Missing(OPTION_RECEIVER_ADDRESS))
        );
        let bad = NotificationDescriptor::new("disk")
            .with_option(OPTION_RECEIVER_ADDRESS, "127.0.0.1:162")
            .with_option(OPTION_RETRY_COUNT, "many");
        assert!(matches!(bad.target(), Err(ConfigError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_binding_sends_through_live_slot_only() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let descriptor = NotificationDescriptor::new("disk").with_option(
            OPTION_RECEIVER_ADDRESS,
            receiver.local_addr().unwrap().to_string(),
        );
        let slot = TrapSlot::new();
        let binding =
            NotificationBinding::new(&descriptor, oid!(1, 3, 6, 1, 4, 1, 99, 5), slot.clone())
                .unwrap();

        binding.send(&event()).await;

        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let engine = Arc::new(LocalEngine::new(generate_engine_id(), 1));
        slot.install(Arc::new(TrapSender::new(socket, engine, None)));
        binding.send(&event()).await;

        let mut buf = vec![0u8; 4096];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        let Message::Community(msg) = Message::decode(Bytes::copy_from_slice(&buf[..len])).unwrap()
        else {
            panic!("expected community trap");
        };
        // sysUpTime, snmpTrapOID, then the seven header bindings.
        assert_eq!(msg.pdu.varbinds.len(), 9);
        assert_eq!(
            msg.pdu.varbinds[1].value,
            Value::ObjectIdentifier(oid!(1, 3, 6, 1, 4, 1, 99, 5))
        );
    }
}
