//! Managed objects: attributes bound into the OID tree.
//!
//! A [`ManagedObject`] is either a [`ScalarObject`] (one OID) or a
//! [`TableObject`] (an OID subtree of `column.row` cells). The kind is chosen
//! from the attribute's type through [`classify`](crate::codec::classify).

mod row_status;
mod scalar;
mod table;
mod transaction;

use std::sync::Arc;

pub use row_status::RowStatus;
pub use scalar::ScalarObject;
pub use table::{TableObject, TableRow};
pub use transaction::{Phase, TransactionContext};

use crate::attribute::AttributeAccessor;
use crate::codec::{WireCategory, classify};
use crate::handler::MibHandler;
use crate::oid::Oid;

/// Scalar or table object, keyed by its OID in the object tree.
#[derive(Clone)]
pub enum ManagedObject {
    Scalar(Arc<ScalarObject>),
    Table(Arc<TableObject>),
}

impl ManagedObject {
    pub fn new(oid: Oid, accessor: Arc<dyn AttributeAccessor>) -> Self {
        match classify(&accessor.descriptor().attr_type) {
            WireCategory::Table => Self::Table(Arc::new(TableObject::new(oid, accessor))),
            _ => Self::Scalar(Arc::new(ScalarObject::new(oid, accessor))),
        }
    }

    pub fn oid(&self) -> &Oid {
        match self {
            Self::Scalar(object) => object.oid(),
            Self::Table(object) => object.oid(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(object) => object.name(),
            Self::Table(object) => object.name(),
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Self::Table(_))
    }

    pub fn handler(&self) -> Arc<dyn MibHandler> {
        match self {
            Self::Scalar(object) => object.clone(),
            Self::Table(object) => object.clone(),
        }
    }
}

impl std::fmt::Debug for ManagedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_table() { "Table" } else { "Scalar" };
        f.debug_struct(kind)
            .field("oid", self.oid())
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AttributeDescriptor, AttributeType, AttributeValue, MemoryAttribute};
    use crate::oid;

    #[test]
    fn test_kind_follows_type() {
        let scalar = MemoryAttribute::new(
            AttributeDescriptor::new("count", AttributeType::Long),
            AttributeValue::Long(3),
        );
        let array = MemoryAttribute::new(
            AttributeDescriptor::new("list", AttributeType::Array(Box::new(AttributeType::Int))),
            AttributeValue::Array(Vec::new()),
        );
        assert!(!ManagedObject::new(oid!(1, 3, 6, 1, 4, 1, 99, 1), scalar).is_table());
        let table = ManagedObject::new(oid!(1, 3, 6, 1, 4, 1, 99, 2), array);
        assert!(table.is_table());
        assert_eq!(table.name(), "list");
        assert_eq!(table.oid(), &oid!(1, 3, 6, 1, 4, 1, 99, 2));
    }
}
