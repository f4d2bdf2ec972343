//! Request bodies and JSON views.
//!
//! Ids arrive as strings and are parsed explicitly so a malformed id is an
//! `invalid_id` failure rather than a generic body rejection. Views carry the
//! display names of referenced master data.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use stockflow_core::{DomainError, DomainResult, EmployeeId, ItemId, LocalKey, RowKey, WarehouseId};
use stockflow_counting::{CountPlan, CountRecordStatus, CountScope, FillPolicy};
use stockflow_inbound::{ApprovalDecision, InboundOrder, KeyAssignment, LineInput};
use stockflow_infra::event_store::StoredEvent;
use stockflow_ledger::{InventoryRecord, InventoryStatus, QualityStatus, StockMovement};
use stockflow_reference::{ReferenceData, require_item};
use stockflow_transfer::{TransferLineInput, TransferOrder};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct InboundLineRequest {
    /// Persisted line being edited.
    #[serde(default)]
    pub line_no: Option<u32>,
    /// Client key of a new row.
    #[serde(default)]
    pub local_key: Option<String>,
    pub item_id: String,
    pub inbound_quantity: i64,
    #[serde(default)]
    pub unit_cost: Decimal,
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    pub location_code: Option<String>,
    #[serde(default)]
    pub quality_status: Option<QualityStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInboundOrderRequest {
    pub warehouse_id: String,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub lines: Vec<InboundLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct EditInboundOrderRequest {
    #[serde(default)]
    pub warehouse_id: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    /// Replaces the full line set when present.
    #[serde(default)]
    pub lines: Option<Vec<InboundLineRequest>>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub decision: ApprovalDecision,
    #[serde(default)]
    pub reviewer_id: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferLineRequest {
    pub item_id: String,
    #[serde(default)]
    pub batch_number: Option<String>,
    pub transfer_quantity: i64,
    /// Defaults to the item's stocking unit.
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub from_location: Option<String>,
    #[serde(default)]
    pub to_location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransferOrderRequest {
    pub from_warehouse_id: String,
    pub to_warehouse_id: String,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub lines: Vec<TransferLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCountPlanRequest {
    pub warehouse_id: String,
    pub count_person_id: String,
    /// Restrict the count to these items. Empty counts everything.
    #[serde(default)]
    pub item_ids: Vec<String>,
    #[serde(default)]
    pub location_prefix: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteCountRequest {
    #[serde(default)]
    pub fill_policy: FillPolicy,
}

#[derive(Debug, Deserialize)]
pub struct RecordActualRequest {
    pub actual_quantity: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct DocumentListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub warehouse_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InventoryQuery {
    #[serde(default)]
    pub warehouse_id: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub status: Option<InventoryStatus>,
    #[serde(default)]
    pub quality_status: Option<QualityStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MovementQuery {
    #[serde(default)]
    pub warehouse_id: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

// ---------------------------------------------------------------------------
// Request -> command input
// ---------------------------------------------------------------------------

pub fn parse_optional<T>(raw: Option<&str>) -> DomainResult<Option<T>>
where
    T: core::str::FromStr<Err = DomainError>,
{
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>())
        .transpose()
}

/// Rows without a `line_no` or client key get a positional key.
pub fn inbound_lines(
    lines: Vec<InboundLineRequest>,
    refs: &dyn ReferenceData,
) -> DomainResult<Vec<LineInput>> {
    lines
        .into_iter()
        .enumerate()
        .map(|(idx, line)| {
            let row = match (line.line_no, line.local_key) {
                (Some(line_no), _) => RowKey::Saved(line_no),
                (None, Some(key)) => RowKey::Local(LocalKey::new(key)?),
                (None, None) => RowKey::Local(LocalKey::new(format!("row-{}", idx + 1))?),
            };
            let item_id: ItemId = line.item_id.parse()?;
            require_item(refs, item_id)?;
            Ok(LineInput {
                row,
                item_id,
                inbound_quantity: line.inbound_quantity,
                unit_cost: line.unit_cost,
                batch_number: line.batch_number,
                location_code: line.location_code,
                quality_status: line.quality_status,
            })
        })
        .collect()
}

/// The item's own unit is always accepted; any other unit must exist.
pub fn transfer_lines(
    lines: Vec<TransferLineRequest>,
    refs: &dyn ReferenceData,
) -> DomainResult<Vec<TransferLineInput>> {
    lines
        .into_iter()
        .map(|line| {
            let item_id: ItemId = line.item_id.parse()?;
            let item = require_item(refs, item_id)?;
            let unit = match line.unit.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
                None => item.unit_code,
                Some(unit) if unit == item.unit_code => unit,
                Some(unit) if refs.unit(&unit).is_some() => unit,
                Some(unit) => return Err(DomainError::validation(format!("unknown unit {unit}"))),
            };
            Ok(TransferLineInput {
                item_id,
                batch_number: line.batch_number,
                transfer_quantity: line.transfer_quantity,
                unit,
                from_location: line.from_location,
                to_location: line.to_location,
            })
        })
        .collect()
}

pub fn count_scope(
    item_ids: &[String],
    location_prefix: Option<String>,
    refs: &dyn ReferenceData,
) -> DomainResult<CountScope> {
    let item_ids = item_ids
        .iter()
        .map(|raw| {
            let id: ItemId = raw.parse()?;
            require_item(refs, id)?;
            Ok(id)
        })
        .collect::<DomainResult<Vec<_>>>()?;
    Ok(CountScope {
        item_ids,
        location_prefix: location_prefix.filter(|p| !p.trim().is_empty()),
    })
}

/// Compare a status enum against its wire name.
pub fn status_matches(status: impl Serialize, wanted: &str) -> bool {
    serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(|s| s.eq_ignore_ascii_case(wanted.trim())))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Success envelope: `{ "success": true, "data": ... }`.
pub fn ok(status: StatusCode, data: JsonValue) -> axum::response::Response {
    (status, axum::Json(json!({ "success": true, "data": data }))).into_response()
}

pub fn ok_message(message: impl Into<String>) -> axum::response::Response {
    (
        StatusCode::OK,
        axum::Json(json!({ "success": true, "message": message.into() })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

fn warehouse_name(refs: &dyn ReferenceData, id: Option<WarehouseId>) -> Option<String> {
    id.and_then(|id| refs.warehouse(id)).map(|w| w.name)
}

fn employee_name(refs: &dyn ReferenceData, id: Option<EmployeeId>) -> Option<String> {
    id.and_then(|id| refs.employee(id)).map(|e| e.name)
}

fn item_view(refs: &dyn ReferenceData, id: ItemId) -> (Option<String>, Option<String>) {
    match refs.item(id) {
        Some(item) => (Some(item.code), Some(item.name)),
        None => (None, None),
    }
}

pub fn inbound_order_to_json(o: &InboundOrder, refs: &dyn ReferenceData) -> JsonValue {
    let approval = o.approval();
    let lines: Vec<JsonValue> = o
        .lines()
        .iter()
        .map(|l| {
            let (item_code, item_name) = item_view(refs, l.item_id);
            json!({
                "line_no": l.line_no,
                "item_id": l.item_id.to_string(),
                "item_code": item_code,
                "item_name": item_name,
                "inbound_quantity": l.inbound_quantity,
                "unit_cost": l.unit_cost,
                "batch_number": l.batch_number,
                "location_code": l.location_code,
                "quality_status": l.quality_status,
            })
        })
        .collect();

    json!({
        "id": o.id_typed().to_string(),
        "order_number": o.order_number(),
        "warehouse_id": o.warehouse_id().map(|w| w.to_string()),
        "warehouse_name": warehouse_name(refs, o.warehouse_id()),
        "status": o.status(),
        "approval": {
            "status": approval.status(),
            "reviewer_id": approval.reviewer_id().map(|r| r.to_string()),
            "reviewer_name": employee_name(refs, approval.reviewer_id()),
            "comment": approval.comment(),
            "decided_at": approval.decided_at(),
        },
        "remark": o.remark(),
        "cancel_reason": o.cancel_reason(),
        "total_quantity": o.lines().iter().map(|l| l.inbound_quantity).sum::<i64>(),
        "lines": lines,
        "created_at": o.created_at(),
        "updated_at": o.updated_at(),
    })
}

/// `line_no` handed out for each client key in a create or edit.
pub fn assignments_to_json(assigned: &[KeyAssignment]) -> JsonValue {
    JsonValue::Array(
        assigned
            .iter()
            .map(|a| json!({ "local_key": a.local_key.as_str(), "line_no": a.line_no }))
            .collect(),
    )
}

pub fn transfer_order_to_json(o: &TransferOrder, refs: &dyn ReferenceData) -> JsonValue {
    let lines: Vec<JsonValue> = o
        .lines()
        .iter()
        .map(|l| {
            let (item_code, item_name) = item_view(refs, l.item_id);
            json!({
                "line_no": l.line_no,
                "item_id": l.item_id.to_string(),
                "item_code": item_code,
                "item_name": item_name,
                "batch_number": l.batch_number,
                "transfer_quantity": l.transfer_quantity,
                "unit": l.unit,
                "from_location": l.from_location,
                "to_location": l.to_location,
            })
        })
        .collect();

    json!({
        "id": o.id_typed().to_string(),
        "transfer_number": o.transfer_number(),
        "from_warehouse_id": o.from_warehouse_id().map(|w| w.to_string()),
        "from_warehouse_name": warehouse_name(refs, o.from_warehouse_id()),
        "to_warehouse_id": o.to_warehouse_id().map(|w| w.to_string()),
        "to_warehouse_name": warehouse_name(refs, o.to_warehouse_id()),
        "status": o.status(),
        "remark": o.remark(),
        "cancel_reason": o.cancel_reason(),
        "lines": lines,
        "created_at": o.created_at(),
        "updated_at": o.updated_at(),
    })
}

pub fn count_plan_to_json(p: &CountPlan, refs: &dyn ReferenceData) -> JsonValue {
    let person = p.count_person_id().and_then(|id| refs.employee(id));
    let department_name = person
        .as_ref()
        .and_then(|e| e.department_id)
        .and_then(|d| refs.department(d))
        .map(|d| d.name);

    let records: Vec<JsonValue> = p
        .records()
        .iter()
        .map(|r| {
            let (item_code, item_name) = item_view(refs, r.item_id);
            let variance = r.variance();
            json!({
                "record_id": r.record_id,
                "item_id": r.item_id.to_string(),
                "item_code": item_code,
                "item_name": item_name,
                "batch_number": r.batch_number,
                "location_code": r.location_code,
                "book_quantity": r.book_quantity,
                "actual_quantity": r.actual_quantity,
                "variance_quantity": variance.map(|v| v.quantity),
                "variance_rate": variance.and_then(|v| v.rate),
                "status": r.status,
            })
        })
        .collect();

    let count = |status: CountRecordStatus| p.records().iter().filter(|r| r.status == status).count();

    json!({
        "id": p.id_typed().to_string(),
        "count_number": p.count_number(),
        "warehouse_id": p.warehouse_id().map(|w| w.to_string()),
        "warehouse_name": warehouse_name(refs, p.warehouse_id()),
        "count_person_id": p.count_person_id().map(|e| e.to_string()),
        "count_person_name": person.map(|e| e.name),
        "department_name": department_name,
        "scope": {
            "item_ids": p.scope().item_ids.iter().map(|i| i.to_string()).collect::<Vec<_>>(),
            "location_prefix": p.scope().location_prefix,
        },
        "status": p.status(),
        "remark": p.remark(),
        "cancel_reason": p.cancel_reason(),
        "records": records,
        "summary": {
            "total": p.records().len(),
            "pending": count(CountRecordStatus::Pending),
            "counted": count(CountRecordStatus::Counted),
            "adjusted": count(CountRecordStatus::Adjusted),
        },
        "created_at": p.created_at(),
        "updated_at": p.updated_at(),
    })
}

pub fn inventory_record_to_json(r: &InventoryRecord, refs: &dyn ReferenceData) -> JsonValue {
    let (item_code, item_name) = item_view(refs, r.item_id());
    json!({
        "warehouse_id": r.warehouse_id().to_string(),
        "warehouse_name": warehouse_name(refs, Some(r.warehouse_id())),
        "item_id": r.item_id().to_string(),
        "item_code": item_code,
        "item_name": item_name,
        "batch_number": r.batch_number(),
        "location_code": r.location_code(),
        "current_quantity": r.current_quantity(),
        "reserved_quantity": r.reserved_quantity(),
        "in_transit_quantity": r.in_transit_quantity(),
        "available_quantity": r.available_quantity(),
        "unit_cost": r.unit_cost(),
        "inventory_status": r.inventory_status(),
        "quality_status": r.quality_status(),
        "updated_at": r.updated_at(),
    })
}

pub fn movement_to_json(m: &StockMovement) -> JsonValue {
    json!({
        "movement_id": m.movement_id.to_string(),
        "warehouse_id": m.key.warehouse_id.to_string(),
        "item_id": m.key.item_id.to_string(),
        "batch_number": m.key.batch_number,
        "kind": m.kind,
        "current_delta": m.current_delta,
        "reserved_delta": m.reserved_delta,
        "in_transit_delta": m.in_transit_delta,
        "reference": m.reference,
        "occurred_at": m.occurred_at,
    })
}

pub fn history_to_json(events: &[StoredEvent]) -> JsonValue {
    JsonValue::Array(
        events
            .iter()
            .map(|e| {
                json!({
                    "event_id": e.event_id.to_string(),
                    "sequence_number": e.sequence_number,
                    "event_type": e.event_type,
                    "event_version": e.event_version,
                    "occurred_at": e.occurred_at,
                    "payload": e.payload,
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_reference::{InMemoryReferenceData, Item, ItemKind, Unit};

    fn refs_with_item(unit_code: &str) -> (InMemoryReferenceData, ItemId) {
        let id = ItemId::new();
        let refs = InMemoryReferenceData::new()
            .with_unit(Unit {
                code: "box".to_string(),
                name: "Box".to_string(),
            })
            .with_item(Item {
                id,
                code: "P-1".to_string(),
                name: "Widget".to_string(),
                kind: ItemKind::Product,
                unit_code: unit_code.to_string(),
                specification: None,
            });
        (refs, id)
    }

    fn inbound_line(item_id: ItemId) -> InboundLineRequest {
        InboundLineRequest {
            line_no: None,
            local_key: None,
            item_id: item_id.to_string(),
            inbound_quantity: 1,
            unit_cost: Decimal::ONE,
            batch_number: None,
            location_code: None,
            quality_status: None,
        }
    }

    #[test]
    fn rows_without_keys_get_positional_local_keys() {
        let (refs, item) = refs_with_item("pcs");
        let mut saved = inbound_line(item);
        saved.line_no = Some(4);
        let lines = inbound_lines(vec![inbound_line(item), saved], &refs).unwrap();
        assert_eq!(lines[0].row, RowKey::Local(LocalKey::new("row-1").unwrap()));
        assert_eq!(lines[1].row, RowKey::Saved(4));
    }

    #[test]
    fn unknown_items_fail_validation() {
        let (refs, _) = refs_with_item("pcs");
        let err = inbound_lines(vec![inbound_line(ItemId::new())], &refs).unwrap_err();
        assert_eq!(err.code(), "validation_error");

        let mut bad = inbound_line(ItemId::new());
        bad.item_id = "nope".to_string();
        assert_eq!(inbound_lines(vec![bad], &refs).unwrap_err().code(), "invalid_id");
    }

    #[test]
    fn transfer_units_default_to_the_item_unit() {
        let (refs, item) = refs_with_item("pcs");
        let line = |unit: Option<&str>| TransferLineRequest {
            item_id: item.to_string(),
            batch_number: None,
            transfer_quantity: 1,
            unit: unit.map(str::to_string),
            from_location: None,
            to_location: None,
        };

        let lines = transfer_lines(vec![line(None), line(Some("box"))], &refs).unwrap();
        assert_eq!(lines[0].unit, "pcs");
        assert_eq!(lines[1].unit, "box");

        let err = transfer_lines(vec![line(Some("pallet"))], &refs).unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn status_filters_match_wire_names() {
        assert!(status_matches(stockflow_transfer::TransferOrderStatus::InTransit, "in_transit"));
        assert!(status_matches(stockflow_inbound::InboundOrderStatus::Draft, "DRAFT"));
        assert!(!status_matches(stockflow_inbound::InboundOrderStatus::Draft, "confirmed"));
    }
}
