use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Json, Response},
};
use uuid::Uuid;

use super::common::{created, no_content_response, pdf_response};
use crate::services::invoices::{
    ChangeStatusRequest, CreateInvoiceRequest, InvoiceDetail, InvoiceListQuery, InvoiceResponse,
    InvoiceSummary, LineItemInput, RecordPaymentRequest, SendInvoiceRequest, SendInvoiceResponse,
    StatusHistoryEntry, UpdateInvoiceRequest, UpdateLineItemRequest,
};
use crate::{
    auth::AuthUser, errors::ServiceError, ApiResponse, ApiResult, AppState, PaginatedResponse,
};

/// List active invoices, newest first
#[utoipa::path(
    get,
    path = "/api/invoices",
    tag = "Invoices",
    params(InvoiceListQuery),
    responses(
        (status = 200, description = "Invoices retrieved", body = ApiResponse<PaginatedResponse<InvoiceSummary>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid request parameters", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_invoices(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<InvoiceListQuery>,
) -> ApiResult<PaginatedResponse<InvoiceSummary>> {
    let page = state
        .services
        .invoices
        .list_invoices(auth_user.user_id, query)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// Create a draft invoice with its line items
#[utoipa::path(
    post,
    path = "/api/invoices",
    tag = "Invoices",
    request_body = CreateInvoiceRequest,
    responses(
        (status = 201, description = "Invoice created", body = ApiResponse<InvoiceDetail>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Client or profile not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Invoice number already exists", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_invoice(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<InvoiceDetail>>), ServiceError> {
    let invoice = state
        .services
        .invoices
        .create_invoice(auth_user.user_id, request)
        .await?;
    Ok(created(invoice))
}

/// Invoice with client and line items; soft-deleted invoices are returned too
#[utoipa::path(
    get,
    path = "/api/invoices/{id}",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice retrieved", body = ApiResponse<InvoiceDetail>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> ApiResult<InvoiceDetail> {
    let invoice = state
        .services
        .invoices
        .get_invoice(auth_user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(invoice)))
}

/// Update header fields; `line_items` replaces all items when present.
/// Served on both PUT and POST.
#[utoipa::path(
    put,
    path = "/api/invoices/{id}",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = UpdateInvoiceRequest,
    responses(
        (status = 200, description = "Invoice updated", body = ApiResponse<InvoiceDetail>),
        (status = 400, description = "Invalid data or invoice is locked", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<UpdateInvoiceRequest>,
) -> ApiResult<InvoiceDetail> {
    let invoice = state
        .services
        .invoices
        .update_invoice(auth_user.user_id, id, request)
        .await?;
    Ok(Json(ApiResponse::success(invoice)))
}

/// Soft delete an invoice
#[utoipa::path(
    delete,
    path = "/api/invoices/{id}",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 204, description = "Invoice deleted"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn delete_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .invoices
        .delete_invoice(auth_user.user_id, id)
        .await?;
    Ok(no_content_response())
}

#[utoipa::path(
    post,
    path = "/api/invoices/{id}/items",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = LineItemInput,
    responses(
        (status = 201, description = "Line item added", body = ApiResponse<InvoiceDetail>),
        (status = 400, description = "Invalid data or invoice is locked", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn add_line_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<LineItemInput>,
) -> Result<(StatusCode, Json<ApiResponse<InvoiceDetail>>), ServiceError> {
    let invoice = state
        .services
        .invoices
        .add_line_item(auth_user.user_id, id, request)
        .await?;
    Ok(created(invoice))
}

#[utoipa::path(
    put,
    path = "/api/invoices/{id}/items/{item_id}",
    tag = "Invoices",
    params(
        ("id" = Uuid, Path, description = "Invoice ID"),
        ("item_id" = Uuid, Path, description = "Line item ID"),
    ),
    request_body = UpdateLineItemRequest,
    responses(
        (status = 200, description = "Line item updated", body = ApiResponse<InvoiceDetail>),
        (status = 400, description = "Invalid data or invoice is locked", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice or line item not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_line_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    auth_user: AuthUser,
    Json(request): Json<UpdateLineItemRequest>,
) -> ApiResult<InvoiceDetail> {
    let invoice = state
        .services
        .invoices
        .update_line_item(auth_user.user_id, id, item_id, request)
        .await?;
    Ok(Json(ApiResponse::success(invoice)))
}

#[utoipa::path(
    delete,
    path = "/api/invoices/{id}/items/{item_id}",
    tag = "Invoices",
    params(
        ("id" = Uuid, Path, description = "Invoice ID"),
        ("item_id" = Uuid, Path, description = "Line item ID"),
    ),
    responses(
        (status = 200, description = "Line item removed", body = ApiResponse<InvoiceDetail>),
        (status = 400, description = "Invoice is locked", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice or line item not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn remove_line_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    auth_user: AuthUser,
) -> ApiResult<InvoiceDetail> {
    let invoice = state
        .services
        .invoices
        .remove_line_item(auth_user.user_id, id, item_id)
        .await?;
    Ok(Json(ApiResponse::success(invoice)))
}

/// Move the invoice through its lifecycle
#[utoipa::path(
    post,
    path = "/api/invoices/{id}/status",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = ChangeStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = ApiResponse<InvoiceResponse>),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<ChangeStatusRequest>,
) -> ApiResult<InvoiceResponse> {
    let invoice = state
        .services
        .invoices
        .change_status(auth_user.user_id, id, request)
        .await?;
    Ok(Json(ApiResponse::success(invoice)))
}

#[utoipa::path(
    get,
    path = "/api/invoices/{id}/history",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Status history, oldest first", body = ApiResponse<Vec<StatusHistoryEntry>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn status_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> ApiResult<Vec<StatusHistoryEntry>> {
    let history = state
        .services
        .invoices
        .status_history(auth_user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(history)))
}

#[utoipa::path(
    post,
    path = "/api/invoices/{id}/payments",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = RecordPaymentRequest,
    responses(
        (status = 200, description = "Payment recorded", body = ApiResponse<InvoiceResponse>),
        (status = 400, description = "Invalid amount or status", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn record_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<RecordPaymentRequest>,
) -> ApiResult<InvoiceResponse> {
    let invoice = state
        .services
        .invoices
        .record_payment(auth_user.user_id, id, request)
        .await?;
    Ok(Json(ApiResponse::success(invoice)))
}

/// Render the invoice as a PDF download
#[utoipa::path(
    post,
    path = "/api/invoices/{id}/pdf",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "PDF document", content_type = "application/pdf", body = Vec<u8>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Rendering failed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn invoice_pdf(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Response, ServiceError> {
    let pdf = state
        .services
        .invoices
        .render_pdf(auth_user.user_id, id)
        .await?;
    Ok(pdf_response(&pdf.filename, pdf.bytes))
}

/// Email the invoice PDF; a draft becomes SENT
#[utoipa::path(
    post,
    path = "/api/invoices/{id}/send",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = SendInvoiceRequest,
    responses(
        (status = 200, description = "Invoice emailed", body = ApiResponse<SendInvoiceResponse>),
        (status = 400, description = "No recipient or invoice cannot be sent", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Mail delivery failed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn send_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    request: Option<Json<SendInvoiceRequest>>,
) -> ApiResult<SendInvoiceResponse> {
    let request = request.map(|Json(body)| body).unwrap_or_default();
    let sent = state
        .services
        .invoices
        .send_invoice(auth_user.user_id, id, request)
        .await?;
    Ok(Json(ApiResponse::success(sent)))
}
