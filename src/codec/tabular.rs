//! Column-major flattening of structured values into varbinds.

use super::ValueCodec;
use crate::attribute::{AttributeType, AttributeValue, ColumnDescriptor};
use crate::oid::Oid;
use crate::varbind::VarBind;

/// Abstract type of a native value, for values that arrive without a
/// descriptor (notification attachments).
pub fn infer_type(value: &AttributeValue) -> AttributeType {
    match value {
        AttributeValue::Bool(_) => AttributeType::Bool,
        AttributeValue::Byte(_) => AttributeType::Byte,
        AttributeValue::Short(_) => AttributeType::Short,
        AttributeValue::Int(_) => AttributeType::Int,
        AttributeValue::Long(_) => AttributeType::Long,
        AttributeValue::Float(_) => AttributeType::Float,
        AttributeValue::Double(_) => AttributeType::Double,
        AttributeValue::BigInt(_) => AttributeType::BigInt,
        AttributeValue::BigDecimal(_) => AttributeType::BigDecimal,
        AttributeValue::Char(_) => AttributeType::Char,
        AttributeValue::String(_) => AttributeType::String,
        AttributeValue::ObjectName(_) => AttributeType::ObjectName,
        AttributeValue::Date(_) => AttributeType::Date,
        AttributeValue::ByteArray(_) => AttributeType::ByteArray,
        AttributeValue::BoolArray(_) => AttributeType::BoolArray,
        AttributeValue::ByteBuffer(_) => AttributeType::ByteBuffer,
        AttributeValue::CharBuffer(_) => AttributeType::CharBuffer,
        AttributeValue::ShortBuffer(_) => AttributeType::ShortBuffer,
        AttributeValue::IntBuffer(_) => AttributeType::IntBuffer,
        AttributeValue::LongBuffer(_) => AttributeType::LongBuffer,
        AttributeValue::FloatBuffer(_) => AttributeType::FloatBuffer,
        AttributeValue::DoubleBuffer(_) => AttributeType::DoubleBuffer,
        AttributeValue::Array(items) => AttributeType::Array(Box::new(
            items
                .first()
                .map(infer_type)
                .unwrap_or_else(|| AttributeType::Other("empty".into())),
        )),
        AttributeValue::Table(table) => AttributeType::Table(
            table
                .columns
                .iter()
                .enumerate()
                .map(|(c, name)| {
                    let column_type = table
                        .rows
                        .iter()
                        .find_map(|row| row.get(c))
                        .map(infer_type)
                        .unwrap_or_else(|| AttributeType::Other("empty".into()));
                    ColumnDescriptor::new(name.clone(), column_type)
                })
                .collect(),
        ),
        AttributeValue::Other(_) => AttributeType::Other("Other".into()),
    }
}

fn cell(oid: Oid, value: &AttributeValue, display_format: Option<&str>) -> VarBind {
    let codec = ValueCodec::for_type(&infer_type(value), display_format);
    let wire = codec
        .to_wire(value)
        .unwrap_or_else(|_| super::text::fallback_to_wire(value));
    VarBind::new(oid, wire)
}

/// Flatten `value` under `root`.
///
/// Tables yield one varbind per cell at `root.column.row`, columns outer and
/// rows inner, both 1-based. Arrays yield `root.element`. Anything else is a
/// single varbind at `root`. Cells that fail conversion are sent as their
/// display text.
pub fn flatten(root: &Oid, value: &AttributeValue, display_format: Option<&str>) -> Vec<VarBind> {
    match value {
        AttributeValue::Table(table) => {
            let mut varbinds = Vec::with_capacity(table.columns.len() * table.rows.len());
            for column in 0..table.columns.len() {
                for (row, cells) in table.rows.iter().enumerate() {
                    if let Some(value) = cells.get(column) {
                        let oid = root.extend(&[column as u32 + 1, row as u32 + 1]);
                        varbinds.push(cell(oid, value, display_format));
                    }
                }
            }
            varbinds
        }
        AttributeValue::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| cell(root.child(i as u32 + 1), item, display_format))
            .collect(),
        scalar => vec![cell(root.clone(), scalar, display_format)],
    }
}
