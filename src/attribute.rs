//! Managed attributes: abstract types, native values and the accessor contract.
//!
//! The hosting runtime describes every manageable value with an
//! [`AttributeDescriptor`] and hands the gateway an [`AttributeAccessor`]
//! that reads and writes it. The gateway never mutates descriptors.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use num::BigInt;
use parking_lot::Mutex;

use crate::error::AccessError;
use crate::handler::BoxFuture;
use crate::oid::Oid;

/// Option key: explicit OID for the attribute.
pub const OPTION_OID: &str = "oid";
/// Option key: timestamp formatter name or strftime pattern.
pub const OPTION_DISPLAY_FORMAT: &str = "displayFormat";
/// Option key: table cache time-to-live in milliseconds.
pub const OPTION_TABLE_CACHE_TIME: &str = "tableCacheTime";
/// Option key: expose a synthetic RowStatus column.
pub const OPTION_USE_ROW_STATUS: &str = "useRowStatus";

/// Default table cache time-to-live.
pub const DEFAULT_TABLE_CACHE_TIME: Duration = Duration::from_secs(5);

/// Abstract attribute type as reported by the managed resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeType {
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    BigInt,
    BigDecimal,
    Char,
    String,
    ObjectName,
    Date,
    ByteArray,
    BoolArray,
    ByteBuffer,
    CharBuffer,
    ShortBuffer,
    IntBuffer,
    LongBuffer,
    FloatBuffer,
    DoubleBuffer,
    /// Flat array of scalar elements.
    Array(Box<AttributeType>),
    /// Rows of typed columns.
    Table(Vec<ColumnDescriptor>),
    /// Anything the gateway has no dedicated codec for.
    Other(String),
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array(element) => write!(f, "Array<{}>", element),
            Self::Table(columns) => write!(f, "Table[{}]", columns.len()),
            Self::Other(name) => write!(f, "{}", name),
            other => write!(f, "{:?}", other),
        }
    }
}

/// One column of a tabular attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub column_type: AttributeType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, column_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Native attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    BigInt(BigInt),
    BigDecimal(BigDecimal),
    Char(char),
    String(String),
    ObjectName(String),
    Date(DateTime<Utc>),
    ByteArray(Vec<u8>),
    BoolArray(Vec<bool>),
    ByteBuffer(Vec<u8>),
    CharBuffer(Vec<u16>),
    ShortBuffer(Vec<i16>),
    IntBuffer(Vec<i32>),
    LongBuffer(Vec<i64>),
    FloatBuffer(Vec<f32>),
    DoubleBuffer(Vec<f64>),
    Array(Vec<AttributeValue>),
    Table(TableValue),
    /// Opaque value surfaced through its display text.
    Other(String),
}

impl AttributeValue {
    /// Integral view of integer-family values, widened to i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Short(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Short(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Long(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::BigInt(v) => write!(f, "{}", v),
            Self::BigDecimal(v) => write!(f, "{}", v.to_plain_string()),
            Self::Char(v) => write!(f, "{}", v),
            Self::String(v) | Self::ObjectName(v) | Self::Other(v) => write!(f, "{}", v),
            Self::Date(v) => write!(f, "{}", v.to_rfc3339()),
            Self::ByteArray(v) | Self::ByteBuffer(v) => write!(f, "{:?}", v),
            Self::BoolArray(v) => write!(f, "{:?}", v),
            Self::CharBuffer(v) => write!(f, "{}", String::from_utf16_lossy(v)),
            Self::ShortBuffer(v) => write!(f, "{:?}", v),
            Self::IntBuffer(v) => write!(f, "{:?}", v),
            Self::LongBuffer(v) => write!(f, "{:?}", v),
            Self::FloatBuffer(v) => write!(f, "{:?}", v),
            Self::DoubleBuffer(v) => write!(f, "{:?}", v),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Table(table) => write!(f, "table({} rows)", table.rows.len()),
        }
    }
}

/// Tabular value: named columns and rows of cells in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableValue {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<AttributeValue>>,
}

impl TableValue {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: Vec<AttributeValue>) -> Self {
        self.rows.push(row);
        self
    }
}

/// Immutable metadata for one manageable value.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    pub name: String,
    pub attr_type: AttributeType,
    pub readable: bool,
    pub writable: bool,
    pub options: HashMap<String, String>,
}

impl AttributeDescriptor {
    /// A readable and writable attribute with no options.
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            readable: true,
            writable: true,
            options: HashMap::new(),
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn with_oid(self, oid: &Oid) -> Self {
        self.with_option(OPTION_OID, oid.to_string())
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

    pub fn display_format(&self) -> Option<&str> {
        self.option(OPTION_DISPLAY_FORMAT)
    }

    /// Cache time-to-live for tables; malformed values fall back to the default.
    pub fn table_cache_time(&self) -> Duration {
        self.option(OPTION_TABLE_CACHE_TIME)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TABLE_CACHE_TIME)
    }

    pub fn use_row_status(&self) -> bool {
        self.option(OPTION_USE_ROW_STATUS)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }
}

/// Read/write access to one attribute of a managed resource.
///
/// Supplied by the hosting runtime. Calls may block on the resource; the
/// gateway never holds a protocol-wide lock across them.
pub trait AttributeAccessor: Send + Sync + 'static {
    fn descriptor(&self) -> &AttributeDescriptor;

    fn get_value(&self) -> BoxFuture<'_, Result<AttributeValue, AccessError>>;

    fn set_value(&self, value: AttributeValue) -> BoxFuture<'_, Result<(), AccessError>>;
}

/// Attribute backed by an in-process value.
///
/// Counts reads and writes, which makes it useful for demos and for
/// observing how often the gateway touches the resource.
#[derive(Debug)]
pub struct MemoryAttribute {
    descriptor: AttributeDescriptor,
    value: Mutex<AttributeValue>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    failure: Mutex<Option<AccessError>>,
}

impl MemoryAttribute {
    pub fn new(descriptor: AttributeDescriptor, value: AttributeValue) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            value: Mutex::new(value),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            failure: Mutex::new(None),
        })
    }

    /// Current value without counting a read.
    pub fn value(&self) -> AttributeValue {
        self.value.lock().clone()
    }

    /// Update the value from the resource side, without counting a write.
    pub fn replace(&self, value: AttributeValue) -> AttributeValue {
        std::mem::replace(&mut *self.value.lock(), value)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Make every subsequent access fail with `error` (or succeed again with `None`).
    pub fn fail_with(&self, error: Option<AccessError>) {
        *self.failure.lock() = error;
    }
}

impl AttributeAccessor for MemoryAttribute {
    fn descriptor(&self) -> &AttributeDescriptor {
        &self.descriptor
    }

    fn get_value(&self) -> BoxFuture<'_, Result<AttributeValue, AccessError>> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::Relaxed);
            if let Some(err) = self.failure.lock().clone() {
                return Err(err);
            }
            Ok(self.value.lock().clone())
        })
    }

    fn set_value(&self, value: AttributeValue) -> BoxFuture<'_, Result<(), AccessError>> {
        Box::pin(async move {
            if let Some(err) = self.failure.lock().clone() {
                return Err(err);
            }
            self.writes.fetch_add(1, Ordering::Relaxed);
            *self.value.lock() = value;
            Ok(())
        })
    }
}
