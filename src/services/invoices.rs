//! Invoices, their line items, status history and payments.
//!
//! Every write that touches more than one row runs in a single transaction:
//! line-item changes recompute the invoice aggregates, and status changes
//! insert their history row, before the commit. Events go out after it.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{total_pages, DbPool},
    entities::{
        client::{self, Entity as ClientEntity},
        invoice::{self, Entity as InvoiceEntity, InvoiceStatus},
        invoice_status_history::{self, Entity as HistoryEntity},
        line_item::{self, Entity as LineItemEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        clients::{find_owned_client, ClientResponse},
        invoice_status,
        mailer::{EmailAttachment, Mailer, OutgoingEmail},
        pdf::{format_money, pdf_filename, InvoiceDocument, InvoiceRenderer, RenderError},
        totals::{self, balance_due, invoice_totals, line_amounts, money, quantity, LineAmounts},
        users::{clean_optional, find_active_user, next_invoice_number, validate_currency},
    },
    PaginatedResponse,
};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LineItemInput {
    #[validate(length(min = 1, max = 1000, message = "Description is required"))]
    pub description: String,
    #[schema(value_type = String, example = "2")]
    pub quantity: Decimal,
    #[schema(value_type = String, example = "150.00")]
    pub unit_price: Decimal,
    /// Percentage between 0 and 100; defaults to 0
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "20")]
    pub tax_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateLineItemRequest {
    #[validate(length(min = 1, max = 1000))]
    pub description: Option<String>,
    #[schema(value_type = Option<String>)]
    pub quantity: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub unit_price: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub tax_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateInvoiceRequest {
    pub client_id: Uuid,
    /// Allocated from the profile counter when omitted
    #[validate(length(min = 1, max = 64))]
    pub invoice_number: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[validate(custom = "validate_currency")]
    pub currency: Option<String>,
    pub notes: Option<String>,
    pub terms: Option<String>,
    #[serde(default)]
    #[validate]
    pub line_items: Vec<LineItemInput>,
}

/// Partial update. `line_items`, when present, replaces every existing item.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateInvoiceRequest {
    pub client_id: Option<Uuid>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[validate(custom = "validate_currency")]
    pub currency: Option<String>,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub line_items: Option<Vec<LineItemInput>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ChangeStatusRequest {
    pub status: InvoiceStatus,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RecordPaymentRequest {
    #[schema(value_type = String, example = "100.00")]
    pub amount: Decimal,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct SendInvoiceRequest {
    /// Defaults to the client's email
    pub to: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub subject: Option<String>,
    #[validate(length(max = 10000))]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InvoiceListQuery {
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<Uuid>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub client_id: Uuid,
    pub invoice_number: String,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub currency: String,
    #[schema(value_type = String, example = "100.00")]
    pub subtotal: Decimal,
    #[schema(value_type = String, example = "20.00")]
    pub tax_amount: Decimal,
    #[schema(value_type = String, example = "120.00")]
    pub total: Decimal,
    #[schema(value_type = String, example = "0.00")]
    pub paid_amount: Decimal,
    #[schema(value_type = String, example = "120.00")]
    pub balance_due: Decimal,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<invoice::Model> for InvoiceResponse {
    fn from(model: invoice::Model) -> Self {
        let balance = model.balance_due();
        Self {
            id: model.id,
            client_id: model.client_id,
            invoice_number: model.invoice_number,
            status: model.status,
            issue_date: model.issue_date,
            due_date: model.due_date,
            currency: model.currency,
            subtotal: money(model.subtotal),
            tax_amount: money(model.tax_amount),
            total: money(model.total),
            paid_amount: money(model.paid_amount),
            balance_due: balance,
            notes: model.notes,
            terms: model.terms,
            sent_at: model.sent_at,
            paid_at: model.paid_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
            deleted_at: model.deleted_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoiceSummary {
    #[serde(flatten)]
    pub invoice: InvoiceResponse,
    pub client_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LineItemResponse {
    pub id: Uuid,
    pub description: String,
    #[schema(value_type = String)]
    pub quantity: Decimal,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    #[schema(value_type = String)]
    pub tax_rate: Decimal,
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[schema(value_type = String)]
    pub tax_amount: Decimal,
    #[schema(value_type = String)]
    pub total: Decimal,
    pub line_order: i32,
}

impl From<line_item::Model> for LineItemResponse {
    fn from(model: line_item::Model) -> Self {
        Self {
            id: model.id,
            description: model.description,
            quantity: quantity(model.quantity),
            unit_price: money(model.unit_price),
            tax_rate: quantity(model.tax_rate),
            amount: money(model.amount),
            tax_amount: money(model.tax_amount),
            total: money(model.total),
            line_order: model.line_order,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoiceDetail {
    pub invoice: InvoiceResponse,
    pub client: ClientResponse,
    pub line_items: Vec<LineItemResponse>,
    #[schema(value_type = String)]
    pub balance_due: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub from_status: Option<InvoiceStatus>,
    pub to_status: InvoiceStatus,
    pub note: Option<String>,
    pub changed_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<invoice_status_history::Model> for StatusHistoryEntry {
    fn from(model: invoice_status_history::Model) -> Self {
        Self {
            id: model.id,
            from_status: model.from_status,
            to_status: model.to_status,
            note: model.note,
            changed_by: model.changed_by,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SendInvoiceResponse {
    pub invoice: InvoiceResponse,
    pub recipient: String,
}

/// A rendered invoice ready to stream or attach
#[derive(Debug, Clone)]
pub struct RenderedPdf {
    pub filename: String,
    pub bytes: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Row helpers shared by the service methods
// ---------------------------------------------------------------------------

/// Owned invoice, including soft-deleted rows
async fn find_owned_invoice<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    invoice_id: Uuid,
) -> Result<invoice::Model, ServiceError> {
    InvoiceEntity::find_by_id(invoice_id)
        .filter(invoice::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Invoice {} not found", invoice_id)))
}

/// Owned invoice that has not been soft-deleted
async fn find_live_invoice<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    invoice_id: Uuid,
) -> Result<invoice::Model, ServiceError> {
    let invoice = find_owned_invoice(conn, user_id, invoice_id).await?;
    if invoice.is_deleted() {
        return Err(ServiceError::NotFound(format!(
            "Invoice {} not found",
            invoice_id
        )));
    }
    Ok(invoice)
}

async fn find_editable_invoice<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    invoice_id: Uuid,
) -> Result<invoice::Model, ServiceError> {
    let invoice = find_live_invoice(conn, user_id, invoice_id).await?;
    invoice_status::ensure_editable(invoice.status)?;
    Ok(invoice)
}

async fn invoiceable_client<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    client_id: Uuid,
) -> Result<client::Model, ServiceError> {
    let client = find_owned_client(conn, user_id, client_id).await?;
    if client.is_deleted() {
        return Err(ServiceError::NotFound(format!(
            "Client {} not found",
            client_id
        )));
    }
    if !client.can_be_invoiced() {
        return Err(ServiceError::InvalidOperation(format!(
            "Client {} is {} and cannot be invoiced",
            client_id, client.status
        )));
    }
    Ok(client)
}

async fn find_item<C: ConnectionTrait>(
    conn: &C,
    invoice_id: Uuid,
    item_id: Uuid,
) -> Result<line_item::Model, ServiceError> {
    LineItemEntity::find_by_id(item_id)
        .filter(line_item::Column::InvoiceId.eq(invoice_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Line item {} not found", item_id)))
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    invoice_id: Uuid,
) -> Result<Vec<line_item::Model>, ServiceError> {
    Ok(LineItemEntity::find()
        .filter(line_item::Column::InvoiceId.eq(invoice_id))
        .order_by_asc(line_item::Column::LineOrder)
        .order_by_asc(line_item::Column::Id)
        .all(conn)
        .await?)
}

fn checked_amounts(
    qty: Decimal,
    unit_price: Decimal,
    tax_rate: Decimal,
) -> Result<LineAmounts, ServiceError> {
    totals::validate_line(qty, unit_price, tax_rate)?;
    line_amounts(qty, unit_price, tax_rate)
}

async fn insert_item<C: ConnectionTrait>(
    conn: &C,
    invoice_id: Uuid,
    input: LineItemInput,
    line_order: i32,
) -> Result<line_item::Model, ServiceError> {
    let tax_rate = input.tax_rate.unwrap_or(Decimal::ZERO);
    let amounts = checked_amounts(input.quantity, input.unit_price, tax_rate)?;
    let now = Utc::now();

    Ok(line_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        invoice_id: Set(invoice_id),
        description: Set(input.description.trim().to_string()),
        quantity: Set(quantity(input.quantity)),
        unit_price: Set(input.unit_price),
        tax_rate: Set(quantity(tax_rate)),
        amount: Set(amounts.amount),
        tax_amount: Set(amounts.tax_amount),
        total: Set(amounts.total),
        line_order: Set(line_order),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?)
}

/// Rewrites the invoice aggregates from its stored line items
async fn recompute_totals<C: ConnectionTrait>(
    conn: &C,
    invoice: invoice::Model,
) -> Result<invoice::Model, ServiceError> {
    let items = load_items(conn, invoice.id).await?;
    let lines: Vec<LineAmounts> = items
        .iter()
        .map(|item| LineAmounts {
            amount: money(item.amount),
            tax_amount: money(item.tax_amount),
            total: money(item.total),
        })
        .collect();
    let totals = invoice_totals(&lines)?;

    if totals.total < money(invoice.paid_amount) {
        return Err(ServiceError::InvalidOperation(format!(
            "Invoice total {} would fall below the amount already paid ({})",
            totals.total,
            money(invoice.paid_amount)
        )));
    }

    let mut active: invoice::ActiveModel = invoice.into();
    active.subtotal = Set(totals.subtotal);
    active.tax_amount = Set(totals.tax_amount);
    active.total = Set(totals.total);
    active.updated_at = Set(Utc::now());
    Ok(active.update(conn).await?)
}

async fn record_history<C: ConnectionTrait>(
    conn: &C,
    invoice_id: Uuid,
    from: Option<InvoiceStatus>,
    to: InvoiceStatus,
    changed_by: Uuid,
    note: Option<String>,
) -> Result<(), ServiceError> {
    invoice_status_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        invoice_id: Set(invoice_id),
        from_status: Set(from),
        to_status: Set(to),
        note: Set(clean_optional(note)),
        changed_by: Set(changed_by),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;
    Ok(())
}

/// Validates and applies one lifecycle move, writing its history row
async fn transition<C: ConnectionTrait>(
    conn: &C,
    invoice: invoice::Model,
    to: InvoiceStatus,
    changed_by: Uuid,
    note: Option<String>,
) -> Result<invoice::Model, ServiceError> {
    let from = invoice.status;
    invoice_status::ensure_transition(from, to)?;

    let now = Utc::now();
    let total = money(invoice.total);
    let sent_at = invoice.sent_at;
    let invoice_id = invoice.id;

    let mut active: invoice::ActiveModel = invoice.into();
    active.status = Set(to);
    match to {
        InvoiceStatus::Sent if sent_at.is_none() => active.sent_at = Set(Some(now)),
        InvoiceStatus::Paid => {
            active.paid_at = Set(Some(now));
            active.paid_amount = Set(total);
        }
        _ => {}
    }
    active.updated_at = Set(now);
    let updated = active.update(conn).await?;

    record_history(conn, invoice_id, Some(from), to, changed_by, note).await?;
    counter!("invoicing.invoices.status_changes", 1);
    Ok(updated)
}

async fn commit(txn: DatabaseTransaction, operation: &'static str) -> Result<(), ServiceError> {
    txn.commit().await.map_err(|e| {
        error!(error = %e, operation, "Failed to commit transaction");
        counter!("invoicing_db.transaction_failures", 1);
        ServiceError::DatabaseError(e)
    })
}

fn check_dates(issue: NaiveDate, due: Option<NaiveDate>) -> Result<(), ServiceError> {
    match due {
        Some(due) if due < issue => Err(ServiceError::ValidationError(
            "due_date must not be before issue_date".to_string(),
        )),
        _ => Ok(()),
    }
}

fn default_email_body(document: &InvoiceDocument) -> String {
    let mut body = format!(
        "Hello {},\n\nPlease find attached invoice {} for {} {}.",
        document.client.name,
        document.invoice_number,
        format_money(document.balance_due),
        document.currency
    );
    if let Some(due) = document.due_date {
        body.push_str(&format!("\nPayment is due by {}.", due));
    }
    body.push_str(&format!("\n\nKind regards,\n{}", document.issuer.name));
    body
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct InvoiceService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    renderer: Arc<dyn InvoiceRenderer>,
    mailer: Arc<dyn Mailer>,
    payment_terms_days: u32,
}

impl InvoiceService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        renderer: Arc<dyn InvoiceRenderer>,
        mailer: Arc<dyn Mailer>,
        payment_terms_days: u32,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            renderer,
            mailer,
            payment_terms_days,
        }
    }

    /// Active invoices, newest first
    #[instrument(skip(self, query), fields(user_id = %user_id))]
    pub async fn list_invoices(
        &self,
        user_id: Uuid,
        query: InvoiceListQuery,
    ) -> Result<PaginatedResponse<InvoiceSummary>, ServiceError> {
        let db = &*self.db_pool;
        let page = query.page.max(1);
        let limit = query.limit.clamp(1, 100);

        let mut select = InvoiceEntity::find()
            .filter(invoice::Column::UserId.eq(user_id))
            .filter(invoice::Column::DeletedAt.is_null());
        if let Some(status) = query.status {
            select = select.filter(invoice::Column::Status.eq(status));
        }
        if let Some(client_id) = query.client_id {
            select = select.filter(invoice::Column::ClientId.eq(client_id));
        }

        let paginator = select
            .order_by_desc(invoice::Column::CreatedAt)
            .order_by_desc(invoice::Column::InvoiceNumber)
            .find_also_related(ClientEntity)
            .paginate(db, limit);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page - 1).await?;

        let items = rows
            .into_iter()
            .map(|(invoice, client)| InvoiceSummary {
                invoice: invoice.into(),
                client_name: client.map(|c| c.name),
            })
            .collect();

        Ok(PaginatedResponse {
            items,
            total,
            page,
            limit,
            total_pages: total_pages(total, limit),
        })
    }

    /// Invoice with client and line items; soft-deleted invoices are returned too
    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn get_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<InvoiceDetail, ServiceError> {
        let invoice = find_owned_invoice(&*self.db_pool, user_id, invoice_id).await?;
        self.detail(invoice).await
    }

    async fn detail(&self, invoice: invoice::Model) -> Result<InvoiceDetail, ServiceError> {
        let db = &*self.db_pool;
        let client = find_owned_client(db, invoice.user_id, invoice.client_id).await?;
        let items = load_items(db, invoice.id).await?;
        let balance = invoice.balance_due();

        Ok(InvoiceDetail {
            invoice: invoice.into(),
            client: client.into(),
            line_items: items.into_iter().map(LineItemResponse::from).collect(),
            balance_due: balance,
        })
    }

    #[instrument(skip(self, request), fields(user_id = %user_id, client_id = %request.client_id))]
    pub async fn create_invoice(
        &self,
        user_id: Uuid,
        request: CreateInvoiceRequest,
    ) -> Result<InvoiceDetail, ServiceError> {
        request.validate()?;

        let issue_date = request.issue_date.unwrap_or_else(|| Utc::now().date_naive());
        let due_date = Some(request.due_date.unwrap_or_else(|| {
            issue_date + Duration::days(i64::from(self.payment_terms_days))
        }));
        check_dates(issue_date, due_date)?;

        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let user = find_active_user(&txn, user_id).await?;
        invoiceable_client(&txn, user_id, request.client_id).await?;

        let invoice_number = match request.invoice_number.map(|n| n.trim().to_string()) {
            Some(number) if !number.is_empty() => {
                let taken = InvoiceEntity::find()
                    .filter(invoice::Column::UserId.eq(user_id))
                    .filter(invoice::Column::InvoiceNumber.eq(number.clone()))
                    .one(&txn)
                    .await?
                    .is_some();
                if taken {
                    return Err(ServiceError::Conflict(format!(
                        "Invoice number {} already exists",
                        number
                    )));
                }
                number
            }
            _ => next_invoice_number(&txn, user_id, issue_date.year()).await?,
        };

        let now = Utc::now();
        let invoice_id = Uuid::new_v4();
        let zero = totals::InvoiceTotals::zero();
        let invoice = invoice::ActiveModel {
            id: Set(invoice_id),
            user_id: Set(user_id),
            client_id: Set(request.client_id),
            invoice_number: Set(invoice_number.clone()),
            status: Set(InvoiceStatus::Draft),
            issue_date: Set(issue_date),
            due_date: Set(due_date),
            currency: Set(request.currency.unwrap_or(user.default_currency)),
            subtotal: Set(zero.subtotal),
            tax_amount: Set(zero.tax_amount),
            total: Set(zero.total),
            paid_amount: Set(money(Decimal::ZERO)),
            notes: Set(clean_optional(request.notes)),
            terms: Set(clean_optional(request.terms)),
            sent_at: Set(None),
            paid_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(&txn)
        .await
        .map_err(|e| ServiceError::from_insert_error(e, "Invoice number"))?;

        for (order, input) in request.line_items.into_iter().enumerate() {
            insert_item(&txn, invoice_id, input, order as i32).await?;
        }
        let invoice = recompute_totals(&txn, invoice).await?;
        record_history(
            &txn,
            invoice_id,
            None,
            InvoiceStatus::Draft,
            user_id,
            Some("Invoice created".to_string()),
        )
        .await?;

        commit(txn, "create_invoice").await?;

        counter!("invoicing.invoices.created", 1);
        info!(invoice_id = %invoice_id, invoice_number = %invoice_number, "Invoice created");
        self.event_sender
            .send_or_log(Event::InvoiceCreated {
                invoice_id,
                user_id,
                invoice_number,
            })
            .await;

        self.detail(invoice).await
    }

    #[instrument(skip(self, request), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn update_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        request: UpdateInvoiceRequest,
    ) -> Result<InvoiceDetail, ServiceError> {
        request.validate()?;
        for item in request.line_items.iter().flatten() {
            item.validate()?;
        }

        let db = &*self.db_pool;
        let txn = db.begin().await?;
        let invoice = find_editable_invoice(&txn, user_id, invoice_id).await?;

        let issue_date = request.issue_date.unwrap_or(invoice.issue_date);
        let due_date = request.due_date.or(invoice.due_date);
        check_dates(issue_date, due_date)?;

        if let Some(client_id) = request.client_id {
            if client_id != invoice.client_id {
                invoiceable_client(&txn, user_id, client_id).await?;
            }
        }

        let mut active: invoice::ActiveModel = invoice.into();
        if let Some(client_id) = request.client_id {
            active.client_id = Set(client_id);
        }
        active.issue_date = Set(issue_date);
        active.due_date = Set(due_date);
        if let Some(currency) = request.currency {
            active.currency = Set(currency);
        }
        if request.notes.is_some() {
            active.notes = Set(clean_optional(request.notes));
        }
        if request.terms.is_some() {
            active.terms = Set(clean_optional(request.terms));
        }
        active.updated_at = Set(Utc::now());
        let mut invoice = active.update(&txn).await?;

        if let Some(items) = request.line_items {
            LineItemEntity::delete_many()
                .filter(line_item::Column::InvoiceId.eq(invoice_id))
                .exec(&txn)
                .await?;
            for (order, input) in items.into_iter().enumerate() {
                insert_item(&txn, invoice_id, input, order as i32).await?;
            }
            invoice = recompute_totals(&txn, invoice).await?;
        }

        commit(txn, "update_invoice").await?;

        info!(invoice_id = %invoice_id, "Invoice updated");
        self.event_sender
            .send_or_log(Event::InvoiceUpdated(invoice_id))
            .await;

        self.detail(invoice).await
    }

    /// Soft delete
    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn delete_invoice(&self, user_id: Uuid, invoice_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let invoice = find_live_invoice(db, user_id, invoice_id).await?;

        let now = Utc::now();
        let mut active: invoice::ActiveModel = invoice.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(db).await?;

        info!(invoice_id = %invoice_id, "Invoice deleted");
        self.event_sender
            .send_or_log(Event::InvoiceDeleted(invoice_id))
            .await;
        Ok(())
    }

    #[instrument(skip(self, input), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn add_line_item(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        input: LineItemInput,
    ) -> Result<InvoiceDetail, ServiceError> {
        input.validate()?;

        let db = &*self.db_pool;
        let txn = db.begin().await?;
        let invoice = find_editable_invoice(&txn, user_id, invoice_id).await?;

        let next_order = load_items(&txn, invoice_id)
            .await?
            .iter()
            .map(|item| item.line_order + 1)
            .max()
            .unwrap_or(0);
        insert_item(&txn, invoice_id, input, next_order).await?;
        let invoice = recompute_totals(&txn, invoice).await?;

        commit(txn, "add_line_item").await?;
        self.event_sender
            .send_or_log(Event::InvoiceUpdated(invoice_id))
            .await;
        self.detail(invoice).await
    }

    #[instrument(skip(self, request), fields(user_id = %user_id, invoice_id = %invoice_id, item_id = %item_id))]
    pub async fn update_line_item(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        item_id: Uuid,
        request: UpdateLineItemRequest,
    ) -> Result<InvoiceDetail, ServiceError> {
        request.validate()?;

        let db = &*self.db_pool;
        let txn = db.begin().await?;
        let invoice = find_editable_invoice(&txn, user_id, invoice_id).await?;
        let item = find_item(&txn, invoice_id, item_id).await?;

        let qty = request.quantity.unwrap_or(item.quantity);
        let unit_price = request.unit_price.unwrap_or(item.unit_price);
        let tax_rate = request.tax_rate.unwrap_or(item.tax_rate);
        let amounts = checked_amounts(qty, unit_price, tax_rate)?;

        let mut active: line_item::ActiveModel = item.into();
        if let Some(description) = request.description {
            active.description = Set(description.trim().to_string());
        }
        active.quantity = Set(quantity(qty));
        active.unit_price = Set(unit_price);
        active.tax_rate = Set(quantity(tax_rate));
        active.amount = Set(amounts.amount);
        active.tax_amount = Set(amounts.tax_amount);
        active.total = Set(amounts.total);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        let invoice = recompute_totals(&txn, invoice).await?;
        commit(txn, "update_line_item").await?;

        self.event_sender
            .send_or_log(Event::InvoiceUpdated(invoice_id))
            .await;
        self.detail(invoice).await
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id, item_id = %item_id))]
    pub async fn remove_line_item(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        item_id: Uuid,
    ) -> Result<InvoiceDetail, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;
        let invoice = find_editable_invoice(&txn, user_id, invoice_id).await?;
        let item = find_item(&txn, invoice_id, item_id).await?;

        LineItemEntity::delete_by_id(item.id).exec(&txn).await?;
        let invoice = recompute_totals(&txn, invoice).await?;
        commit(txn, "remove_line_item").await?;

        self.event_sender
            .send_or_log(Event::InvoiceUpdated(invoice_id))
            .await;
        self.detail(invoice).await
    }

    #[instrument(skip(self, request), fields(user_id = %user_id, invoice_id = %invoice_id, to = %request.status))]
    pub async fn change_status(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        request: ChangeStatusRequest,
    ) -> Result<InvoiceResponse, ServiceError> {
        request.validate()?;

        let db = &*self.db_pool;
        let txn = db.begin().await?;
        let invoice = find_live_invoice(&txn, user_id, invoice_id).await?;
        let from = invoice.status;

        let updated = transition(&txn, invoice, request.status, user_id, request.note).await?;
        commit(txn, "change_status").await?;

        info!(invoice_id = %invoice_id, from = %from, to = %request.status, "Invoice status changed");
        self.event_sender
            .send_or_log(Event::InvoiceStatusChanged {
                invoice_id,
                from,
                to: request.status,
            })
            .await;

        Ok(updated.into())
    }

    /// History rows, oldest first
    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn status_history(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<StatusHistoryEntry>, ServiceError> {
        let db = &*self.db_pool;
        find_owned_invoice(db, user_id, invoice_id).await?;

        let rows = HistoryEntity::find()
            .filter(invoice_status_history::Column::InvoiceId.eq(invoice_id))
            .order_by_asc(invoice_status_history::Column::CreatedAt)
            .order_by_asc(invoice_status_history::Column::Id)
            .all(db)
            .await?;
        Ok(rows.into_iter().map(StatusHistoryEntry::from).collect())
    }

    /// Adds to `paid_amount`; settling the balance moves the invoice to PAID
    #[instrument(skip(self, request), fields(user_id = %user_id, invoice_id = %invoice_id, amount = %request.amount))]
    pub async fn record_payment(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        request: RecordPaymentRequest,
    ) -> Result<InvoiceResponse, ServiceError> {
        request.validate()?;
        let amount = money(request.amount);
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "amount must be greater than zero".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await?;
        let invoice = find_live_invoice(&txn, user_id, invoice_id).await?;

        let from = invoice.status;
        if !invoice_status::accepts_payment(from) {
            return Err(ServiceError::InvalidStatus(format!(
                "Payments cannot be recorded for an invoice in status {}",
                invoice.status
            )));
        }

        let total = money(invoice.total);
        let paid = totals::checked_sum(money(invoice.paid_amount), amount)?;
        if paid > total {
            return Err(ServiceError::InvalidOperation(format!(
                "Payment of {} exceeds the balance due of {}",
                amount,
                balance_due(total, money(invoice.paid_amount))
            )));
        }

        let mut active: invoice::ActiveModel = invoice.into();
        active.paid_amount = Set(paid);
        active.updated_at = Set(Utc::now());
        let mut updated = active.update(&txn).await?;

        let settled = balance_due(total, paid).is_zero();
        if settled {
            let note = request
                .note
                .or_else(|| Some("Paid in full".to_string()));
            updated = transition(&txn, updated, InvoiceStatus::Paid, user_id, note).await?;
        }

        commit(txn, "record_payment").await?;

        counter!("invoicing.payments.recorded", 1);
        let remaining = updated.balance_due();
        info!(invoice_id = %invoice_id, amount = %amount, balance_due = %remaining, "Payment recorded");
        self.event_sender
            .send_or_log(Event::InvoicePaymentRecorded {
                invoice_id,
                amount,
                balance_due: remaining,
            })
            .await;
        if settled {
            self.event_sender
                .send_or_log(Event::InvoiceStatusChanged {
                    invoice_id,
                    from,
                    to: InvoiceStatus::Paid,
                })
                .await;
        }

        Ok(updated.into())
    }

    async fn document(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<(invoice::Model, client::Model, InvoiceDocument), ServiceError> {
        let db = &*self.db_pool;
        let invoice = find_live_invoice(db, user_id, invoice_id).await?;
        let user = find_active_user(db, user_id).await?;
        let client = find_owned_client(db, user_id, invoice.client_id).await?;
        let items = load_items(db, invoice_id).await?;

        let document = InvoiceDocument::from_parts(&user, &client, &invoice, &items);
        Ok((invoice, client, document))
    }

    async fn render(&self, document: InvoiceDocument) -> Result<Vec<u8>, ServiceError> {
        let renderer = self.renderer.clone();
        let rendered = tokio::task::spawn_blocking(move || renderer.render(&document))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))?;
        Ok(rendered?)
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn render_pdf(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<RenderedPdf, ServiceError> {
        let (invoice, _, document) = self.document(user_id, invoice_id).await?;
        let bytes = self.render(document).await?;
        counter!("invoicing.pdfs.rendered", 1);
        Ok(RenderedPdf {
            filename: pdf_filename(&invoice.invoice_number),
            bytes,
        })
    }

    /// Emails the PDF and marks a draft as sent
    #[instrument(skip(self, request), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn send_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        request: SendInvoiceRequest,
    ) -> Result<SendInvoiceResponse, ServiceError> {
        request.validate()?;

        let (invoice, client, document) = self.document(user_id, invoice_id).await?;
        if matches!(
            invoice.status,
            InvoiceStatus::Cancelled | InvoiceStatus::Refunded
        ) {
            return Err(ServiceError::InvalidOperation(format!(
                "Invoice in status {} cannot be sent",
                invoice.status
            )));
        }

        let recipient = clean_optional(request.to)
            .or_else(|| clean_optional(client.email.clone()))
            .ok_or_else(|| {
                ServiceError::BadRequest(
                    "No recipient given and the client has no email address".to_string(),
                )
            })?;

        let subject = clean_optional(request.subject).unwrap_or_else(|| {
            format!(
                "Invoice {} from {}",
                document.invoice_number, document.issuer.name
            )
        });
        let body = clean_optional(request.message).unwrap_or_else(|| default_email_body(&document));
        let filename = pdf_filename(&document.invoice_number);
        let bytes = self.render(document).await?;

        self.mailer
            .send(OutgoingEmail {
                to: recipient.clone(),
                subject,
                body,
                attachment: Some(EmailAttachment {
                    filename,
                    content_type: "application/pdf".to_string(),
                    bytes,
                }),
            })
            .await
            .map_err(|e| {
                warn!(error = %e, invoice_id = %invoice_id, "Failed to email invoice");
                ServiceError::from(e)
            })?;

        let invoice = if invoice.status == InvoiceStatus::Draft {
            let db = &*self.db_pool;
            let txn = db.begin().await?;
            // Re-read inside the transaction; the status may have moved meanwhile
            let current = find_live_invoice(&txn, user_id, invoice_id).await?;
            if current.status == InvoiceStatus::Draft {
                let updated = transition(
                    &txn,
                    current,
                    InvoiceStatus::Sent,
                    user_id,
                    Some(format!("Sent to {}", recipient)),
                )
                .await?;
                commit(txn, "send_invoice").await?;
                self.event_sender
                    .send_or_log(Event::InvoiceStatusChanged {
                        invoice_id,
                        from: InvoiceStatus::Draft,
                        to: InvoiceStatus::Sent,
                    })
                    .await;
                updated
            } else {
                current
            }
        } else {
            invoice
        };

        info!(invoice_id = %invoice_id, recipient = %recipient, "Invoice sent");
        self.event_sender
            .send_or_log(Event::InvoiceSent {
                invoice_id,
                recipient: recipient.clone(),
            })
            .await;

        Ok(SendInvoiceResponse {
            invoice: invoice.into(),
            recipient,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn due_date_before_issue_date_is_rejected() {
        let issue = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert!(check_dates(issue, None).is_ok());
        assert!(check_dates(issue, Some(issue)).is_ok());
        assert_matches!(
            check_dates(issue, NaiveDate::from_ymd_opt(2024, 3, 9)),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn line_inputs_are_checked_before_arithmetic() {
        assert_matches!(
            checked_amounts(dec!(0), dec!(10), dec!(0)),
            Err(ServiceError::ValidationError(_))
        );
        let amounts = checked_amounts(dec!(2), dec!(10), dec!(25)).unwrap();
        assert_eq!(amounts.total, dec!(25.00));
    }

    #[test]
    fn response_normalizes_money_scale() {
        let now = Utc::now();
        let model = invoice::Model {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            invoice_number: "INV-2024-000001".into(),
            status: InvoiceStatus::Sent,
            issue_date: now.date_naive(),
            due_date: None,
            currency: "USD".into(),
            subtotal: dec!(100),
            tax_amount: dec!(20.5),
            total: dec!(120.5),
            paid_amount: dec!(20),
            notes: None,
            terms: None,
            sent_at: Some(now),
            paid_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let response = InvoiceResponse::from(model);
        assert_eq!(response.total.to_string(), "120.50");
        assert_eq!(response.balance_due.to_string(), "100.50");
        assert_eq!(response.subtotal.to_string(), "100.00");
    }
}
