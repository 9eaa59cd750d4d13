//! Table objects: one tabular attribute exposed as a conceptual table.
//!
//! Cells live at `table.column.row` with 1-based column and row numbers.
//! When RowStatus is enabled it is the column after the last data column.
//!
//! Row edits are staged per transaction and written back to the resource in
//! a single batched `set_value` once every committed sub-request of the
//! transaction has been cleaned up. A transaction that saw any rollback
//! writes nothing.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::row_status::RowStatus;
use super::transaction::{Phase, TransactionContext};
use crate::attribute::{AttributeAccessor, AttributeType, AttributeValue, TableValue};
use crate::codec::ValueCodec;
use crate::error::TransactionError;
use crate::handler::{
    BoxFuture, GetNextResult, GetResult, MibHandler, OidTable, RequestContext, SetResult,
};
use crate::oid::Oid;
use crate::value::Value;
use crate::varbind::VarBind;

/// Resource-side shape of the attribute.
#[derive(Debug, Clone, PartialEq)]
enum Shape {
    Table,
    /// Flat array exposed as a single-column table.
    Array,
}

#[derive(Debug, Clone)]
struct Column {
    name: String,
    attr_type: AttributeType,
    codec: ValueCodec,
}

/// One row as cached from the resource.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    /// 1-based, stable for the row's lifetime in the cache.
    pub index: u32,
    pub cells: Vec<AttributeValue>,
    pub status: RowStatus,
}

struct Cache {
    rows: BTreeMap<u32, TableRow>,
    cells: OidTable<Value>,
    fetched_at: Option<Instant>,
    /// Index and status of each row, in resource order. The resource only
    /// sees cells, so refreshes reapply these by position.
    layout: Vec<(u32, RowStatus)>,
}

#[derive(Default)]
struct RowEdit {
    cells: BTreeMap<usize, AttributeValue>,
    status: Option<RowStatus>,
}

struct Pending {
    context: TransactionContext,
    edits: BTreeMap<u32, RowEdit>,
    settled: bool,
}

struct State {
    cache: Cache,
    transactions: HashMap<u64, Pending>,
}

/// Tabular attribute bound to an OID subtree.
///
/// All mutable state sits behind one async lock, so at most one flush per
/// table is ever in flight.
pub struct TableObject {
    oid: Oid,
    accessor: Arc<dyn AttributeAccessor>,
    shape: Shape,
    columns: Vec<Column>,
    row_status: bool,
    ttl: Duration,
    state: Mutex<State>,
}

enum CellRef {
    Data(usize),
    Status,
}

impl TableObject {
    pub fn new(oid: Oid, accessor: Arc<dyn AttributeAccessor>) -> Self {
        let descriptor = accessor.descriptor();
        let display_format = descriptor.display_format();
        let column = |name: &str, attr_type: &AttributeType| Column {
            name: name.to_string(),
            attr_type: attr_type.clone(),
            codec: ValueCodec::for_type(attr_type, display_format),
        };
        let (shape, columns) = match &descriptor.attr_type {
            AttributeType::Table(columns) => (
                Shape::Table,
                columns
                    .iter()
                    .map(|c| column(&c.name, &c.column_type))
                    .collect(),
            ),
            AttributeType::Array(element) => (Shape::Array, vec![column("value", element)]),
            other => (Shape::Array, vec![column("value", other)]),
        };
        Self {
            oid,
            shape,
            columns,
            row_status: descriptor.use_row_status(),
            ttl: descriptor.table_cache_time(),
            state: Mutex::new(State {
                cache: Cache {
                    rows: BTreeMap::new(),
                    cells: OidTable::new(),
                    fetched_at: None,
                    layout: Vec::new(),
                },
                transactions: HashMap::new(),
            }),
            accessor,
        }
    }

    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    pub fn name(&self) -> &str {
        &self.accessor.descriptor().name
    }

    /// Number of columns exposed, including RowStatus.
    pub fn column_count(&self) -> usize {
        self.columns.len() + usize::from(self.row_status)
    }

    /// Snapshot of the cached rows, refreshing first if the cache expired.
    pub async fn rows(&self) -> Vec<TableRow> {
        let mut state = self.state.lock().await;
        self.refresh_if_stale(&mut state).await;
        state.cache.rows.values().cloned().collect()
    }

    fn cell_ref(&self, oid: &Oid) -> Option<(CellRef, u32)> {
        let &[column, row] = oid.suffix_after(&self.oid)? else {
            return None;
        };
        if row == 0 || column == 0 {
            return None;
        }
        let column = column as usize;
        if column <= self.columns.len() {
            Some((CellRef::Data(column - 1), row))
        } else if self.row_status && column == self.columns.len() + 1 {
            Some((CellRef::Status, row))
        } else {
            None
        }
    }

    async fn refresh_if_stale(&self, state: &mut State) {
        // Never renumber rows under a running transaction.
        if !state.transactions.is_empty() {
            return;
        }
        if let Some(fetched_at) = state.cache.fetched_at
            && fetched_at.elapsed() < self.ttl
        {
            return;
        }
        match self.accessor.get_value().await {
            Ok(value) => {
                let rows = self.rows_from_value(value, &state.cache.layout);
                tracing::trace!(
                    gateway.oid = %self.oid,
                    rows = rows.len(),
                    "table cache refreshed"
                );
                self.replace_rows(&mut state.cache, rows);
                state.cache.fetched_at = Some(Instant::now());
            }
            Err(err) => {
                tracing::warn!(
                    gateway.oid = %self.oid,
                    attribute = %self.name(),
                    error = %err,
                    "table read failed, serving cached rows"
                );
            }
        }
    }

    /// Rows keep the index and status they had at the same position; rows
    /// beyond the known layout are numbered after the highest known index.
    fn rows_from_value(
        &self,
        value: AttributeValue,
        layout: &[(u32, RowStatus)],
    ) -> BTreeMap<u32, TableRow> {
        let cells: Vec<Vec<AttributeValue>> = match (&self.shape, value) {
            (Shape::Table, AttributeValue::Table(table)) => table.rows,
            (Shape::Array, AttributeValue::Array(items)) => {
                items.into_iter().map(|item| vec![item]).collect()
            }
            (_, other) => {
                tracing::warn!(
                    gateway.oid = %self.oid,
                    value = %other,
                    "resource returned a non-tabular value"
                );
                Vec::new()
            }
        };
        let mut next = layout.iter().map(|&(index, _)| index).max().unwrap_or(0);
        cells
            .into_iter()
            .enumerate()
            .map(|(position, cells)| {
                let (index, status) = layout.get(position).copied().unwrap_or_else(|| {
                    next += 1;
                    (next, RowStatus::Active)
                });
                (
                    index,
                    TableRow {
                        index,
                        cells,
                        status,
                    },
                )
            })
            .collect()
    }

    fn replace_rows(&self, cache: &mut Cache, rows: BTreeMap<u32, TableRow>) {
        let mut cells = OidTable::with_capacity(rows.len() * self.column_count());
        for row in rows.values() {
            for (c, column) in self.columns.iter().enumerate() {
                let Some(value) = row.cells.get(c) else {
                    continue;
                };
                let wire = column.codec.to_wire(value).unwrap_or_else(|err| {
                    tracing::warn!(
                        gateway.oid = %self.oid,
                        column = %column.name,
                        row = row.index,
                        error = %err,
                        "cannot convert cell"
                    );
                    column.codec.default_value()
                });
                cells.insert(self.oid.extend(&[c as u32 + 1, row.index]), wire);
            }
            if self.row_status {
                let oid = self.oid.extend(&[self.columns.len() as u32 + 1, row.index]);
                cells.insert(oid, Value::Integer(row.status.as_i32()));
            }
        }
        cache.layout = rows.values().map(|row| (row.index, row.status)).collect();
        cache.rows = rows;
        cache.cells = cells;
    }

    /// Validate and stage one cell write.
    async fn prepare(&self, ctx: &RequestContext, oid: &Oid, value: &Value) -> SetResult {
        if !self.accessor.descriptor().writable {
            return SetResult::NotWritable;
        }
        let Some((cell, row)) = self.cell_ref(oid) else {
            return SetResult::NoCreation;
        };

        let mut state = self.state.lock().await;
        self.refresh_if_stale(&mut state).await;
        let current = state.cache.rows.get(&row).map(|r| r.status);

        let staged_cell = match cell {
            CellRef::Status => {
                let Some(requested) = value.as_i32().and_then(RowStatus::from_i32) else {
                    return if matches!(value, Value::Integer(_)) {
                        SetResult::WrongValue
                    } else {
                        SetResult::WrongType
                    };
                };
                if !RowStatus::accepts(current, requested) {
                    return SetResult::InconsistentValue;
                }
                Err(requested)
            }
            CellRef::Data(column) => {
                let codec = &self.columns[column].codec;
                if !codec.is_writable() {
                    return SetResult::NotWritable;
                }
                if current.is_none() && !self.row_status {
                    return SetResult::NoCreation;
                }
                match codec.from_wire(value) {
                    Ok(native) => Ok((column, native)),
                    Err(err) => return SetResult::from(&err),
                }
            }
        };

        let pending = state
            .transactions
            .entry(ctx.transaction_id)
            .or_insert_with(|| Pending {
                context: TransactionContext::new(ctx.transaction_id),
                edits: BTreeMap::new(),
                settled: false,
            });
        if let Err(err) = pending.context.advance(Phase::Prepare) {
            return self.fail(err);
        }
        let edit = pending.edits.entry(row).or_default();
        match staged_cell {
            Ok((column, native)) => {
                edit.cells.insert(column, native);
            }
            Err(status) => edit.status = Some(status),
        }
        SetResult::Ok
    }

    fn fail(&self, err: TransactionError) -> SetResult {
        tracing::error!(gateway.oid = %self.oid, error = %err, "transaction failed");
        SetResult::CommitFailed
    }

    async fn advance(&self, ctx: &RequestContext, phase: Phase) -> SetResult {
        let mut state = self.state.lock().await;
        let Some(pending) = state.transactions.get_mut(&ctx.transaction_id) else {
            tracing::error!(
                gateway.oid = %self.oid,
                txn = ctx.transaction_id,
                %phase,
                "no transaction for phase"
            );
            return SetResult::CommitFailed;
        };
        if let Err(err) = pending.context.advance(phase) {
            return self.fail(err);
        }
        if phase != Phase::Cleanup || pending.settled {
            return SetResult::Ok;
        }

        if pending.context.is_rolled_back() {
            pending.settled = true;
            pending.edits.clear();
            tracing::warn!(
                gateway.oid = %self.oid,
                txn = ctx.transaction_id,
                "transaction rolled back, row edits discarded"
            );
            return SetResult::Ok;
        }
        if !pending.context.is_successful() {
            return SetResult::Ok;
        }

        pending.settled = true;
        let edits = std::mem::take(&mut pending.edits);
        match self.flush(&mut state.cache, edits).await {
            Ok(()) => SetResult::Ok,
            Err(err) => self.fail(err),
        }
    }

    /// Apply staged edits and write the whole table back in one call.
    async fn flush(
        &self,
        cache: &mut Cache,
        edits: BTreeMap<u32, RowEdit>,
    ) -> Result<(), TransactionError> {
        let mut rows = cache.rows.clone();
        let mut destroyed = BTreeSet::new();

        for (index, edit) in edits {
            let existing = rows.get(&index).cloned();
            let mut target = match (edit.status, existing) {
                (Some(RowStatus::Destroy), _) => {
                    destroyed.insert(index);
                    continue;
                }
                (Some(status @ (RowStatus::CreateAndGo | RowStatus::CreateAndWait)), None) => {
                    TableRow {
                        index,
                        cells: self.columns.iter().map(|c| default_cell(&c.attr_type)).collect(),
                        status: status.effective().unwrap_or(RowStatus::NotReady),
                    }
                }
                (Some(status @ (RowStatus::Active | RowStatus::NotInService)), Some(row)) => {
                    TableRow { status, ..row }
                }
                (None, Some(row)) => row,
                (status, existing) => {
                    tracing::warn!(
                        gateway.oid = %self.oid,
                        row = index,
                        status = ?status,
                        exists = existing.is_some(),
                        "unsupported row status, row left unchanged"
                    );
                    continue;
                }
            };
            for (column, value) in edit.cells {
                if let Some(cell) = target.cells.get_mut(column) {
                    *cell = value;
                }
            }
            rows.insert(index, target);
        }
        for index in &destroyed {
            rows.remove(index);
        }

        let payload = self.payload(&rows);
        self.accessor
            .set_value(payload)
            .await
            .map_err(TransactionError::FlushFailed)?;

        tracing::debug!(
            gateway.oid = %self.oid,
            rows = rows.len(),
            destroyed = destroyed.len(),
            "table flushed"
        );
        self.replace_rows(cache, rows);
        Ok(())
    }

    fn payload(&self, rows: &BTreeMap<u32, TableRow>) -> AttributeValue {
        match self.shape {
            Shape::Table => AttributeValue::Table(TableValue {
                columns: self.columns.iter().map(|c| c.name.clone()).collect(),
                rows: rows.values().map(|r| r.cells.clone()).collect(),
            }),
            Shape::Array => AttributeValue::Array(
                rows.values()
                    .filter_map(|r| r.cells.first().cloned())
                    .collect(),
            ),
        }
    }
}

/// Cell value for columns a manager did not set while creating a row.
fn default_cell(attr_type: &AttributeType) -> AttributeValue {
    match attr_type {
        AttributeType::Bool => AttributeValue::Bool(false),
        AttributeType::Byte => AttributeValue::Byte(0),
        AttributeType::Short => AttributeValue::Short(0),
        AttributeType::Int => AttributeValue::Int(0),
        AttributeType::Long => AttributeValue::Long(0),
        AttributeType::Float => AttributeValue::Float(0.0),
        AttributeType::Double => AttributeValue::Double(0.0),
        AttributeType::BigInt => AttributeValue::BigInt(0.into()),
        AttributeType::BigDecimal => AttributeValue::BigDecimal(0.into()),
        AttributeType::Char => AttributeValue::Char(' '),
        AttributeType::String => AttributeValue::String(String::new()),
        AttributeType::ObjectName => AttributeValue::ObjectName(String::new()),
        AttributeType::Date => AttributeValue::Date(Default::default()),
        AttributeType::ByteArray => AttributeValue::ByteArray(Vec::new()),
        AttributeType::BoolArray => AttributeValue::BoolArray(Vec::new()),
        AttributeType::ByteBuffer => AttributeValue::ByteBuffer(Vec::new()),
        AttributeType::CharBuffer => AttributeValue::CharBuffer(Vec::new()),
        AttributeType::ShortBuffer => AttributeValue::ShortBuffer(Vec::new()),
        AttributeType::IntBuffer => AttributeValue::IntBuffer(Vec::new()),
        AttributeType::LongBuffer => AttributeValue::LongBuffer(Vec::new()),
        AttributeType::FloatBuffer => AttributeValue::FloatBuffer(Vec::new()),
        AttributeType::DoubleBuffer => AttributeValue::DoubleBuffer(Vec::new()),
        AttributeType::Array(_) => AttributeValue::Array(Vec::new()),
        AttributeType::Table(_) => AttributeValue::Table(TableValue::default()),
        AttributeType::Other(_) => AttributeValue::Other(String::new()),
    }
}

impl MibHandler for TableObject {
    fn get<'a>(&'a self, _ctx: &'a RequestContext, oid: &'a Oid) -> BoxFuture<'a, GetResult> {
        Box::pin(async move {
            if !self.accessor.descriptor().readable {
                return GetResult::NoSuchObject;
            }
            if self.cell_ref(oid).is_none() {
                return GetResult::NoSuchObject;
            }
            let mut state = self.state.lock().await;
            self.refresh_if_stale(&mut state).await;
            match state.cache.cells.get(oid) {
                Some(value) => GetResult::Value(value.clone()),
                None => GetResult::NoSuchInstance,
            }
        })
    }

    fn get_next<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        oid: &'a Oid,
    ) -> BoxFuture<'a, GetNextResult> {
        Box::pin(async move {
            if !self.accessor.descriptor().readable {
                return GetNextResult::EndOfMibView;
            }
            let mut state = self.state.lock().await;
            self.refresh_if_stale(&mut state).await;
            state
                .cache
                .cells
                .get_next(oid)
                .map(|(next, value)| VarBind::new(next.clone(), value.clone()))
                .into()
        })
    }

    fn test_set<'a>(
        &'a self,
        ctx: &'a RequestContext,
        oid: &'a Oid,
        value: &'a Value,
    ) -> BoxFuture<'a, SetResult> {
        Box::pin(self.prepare(ctx, oid, value))
    }

    fn commit_set<'a>(
        &'a self,
        ctx: &'a RequestContext,
        _oid: &'a Oid,
        _value: &'a Value,
    ) -> BoxFuture<'a, SetResult> {
        Box::pin(self.advance(ctx, Phase::Commit))
    }

    fn undo_set<'a>(
        &'a self,
        ctx: &'a RequestContext,
        _oid: &'a Oid,
        _value: &'a Value,
    ) -> BoxFuture<'a, SetResult> {
        Box::pin(self.advance(ctx, Phase::Rollback))
    }

    fn cleanup_set<'a>(
        &'a self,
        ctx: &'a RequestContext,
        _oid: &'a Oid,
        _value: &'a Value,
    ) -> BoxFuture<'a, SetResult> {
        Box::pin(self.advance(ctx, Phase::Cleanup))
    }

    fn complete_set<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if let Some(pending) = state.transactions.remove(&ctx.transaction_id)
                && !pending.settled
            {
                tracing::debug!(
                    gateway.oid = %self.oid,
                    txn = ctx.transaction_id,
                    phase = %pending.context.phase(),
                    "transaction ended before settling"
                );
            }
        })
    }
}
