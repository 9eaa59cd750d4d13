//! Result types for handler operations.

use crate::error::{ConversionError, ErrorStatus};
use crate::value::Value;
use crate::varbind::VarBind;

/// Outcome of one SET phase for one varbind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetResult {
    Ok,
    NoAccess,
    NotWritable,
    WrongType,
    WrongLength,
    WrongEncoding,
    WrongValue,
    NoCreation,
    InconsistentValue,
    ResourceUnavailable,
    CommitFailed,
    UndoFailed,
    InconsistentName,
}

impl SetResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, SetResult::Ok)
    }

    pub fn to_error_status(&self) -> ErrorStatus {
        match self {
            SetResult::Ok => ErrorStatus::NoError,
            SetResult::NoAccess => ErrorStatus::NoAccess,
            SetResult::NotWritable => ErrorStatus::NotWritable,
            SetResult::WrongType => ErrorStatus::WrongType,
            SetResult::WrongLength => ErrorStatus::WrongLength,
            SetResult::WrongEncoding => ErrorStatus::WrongEncoding,
            SetResult::WrongValue => ErrorStatus::WrongValue,
            SetResult::NoCreation => ErrorStatus::NoCreation,
            SetResult::InconsistentValue => ErrorStatus::InconsistentValue,
            SetResult::ResourceUnavailable => ErrorStatus::ResourceUnavailable,
            SetResult::CommitFailed => ErrorStatus::CommitFailed,
            SetResult::UndoFailed => ErrorStatus::UndoFailed,
            SetResult::InconsistentName => ErrorStatus::InconsistentName,
        }
    }
}

impl From<&ConversionError> for SetResult {
    fn from(err: &ConversionError) -> Self {
        match err.status() {
            ErrorStatus::NotWritable => SetResult::NotWritable,
            ErrorStatus::WrongType => SetResult::WrongType,
            ErrorStatus::WrongValue => SetResult::WrongValue,
            _ => SetResult::ResourceUnavailable,
        }
    }
}

/// Result of a GET for one OID.
#[derive(Debug, Clone, PartialEq)]
pub enum GetResult {
    Value(Value),
    NoSuchObject,
    NoSuchInstance,
}

impl From<Value> for GetResult {
    fn from(value: Value) -> Self {
        GetResult::Value(value)
    }
}

/// Result of a GETNEXT for one OID.
#[derive(Debug, Clone, PartialEq)]
pub enum GetNextResult {
    Value(VarBind),
    EndOfMibView,
}

impl GetNextResult {
    pub fn into_option(self) -> Option<VarBind> {
        match self {
            GetNextResult::Value(vb) => Some(vb),
            GetNextResult::EndOfMibView => None,
        }
    }
}

impl From<Option<VarBind>> for GetNextResult {
    fn from(value: Option<VarBind>) -> Self {
        match value {
            Some(vb) => GetNextResult::Value(vb),
            None => GetNextResult::EndOfMibView,
        }
    }
}
