use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Invoicing API",
        version = "0.1.0",
        description = r#"
# Invoicing API

Backend for freelancers and small businesses that bill their clients.

- **Profile**: business identity, bank details and invoice numbering
- **Clients**: the people and companies you invoice
- **Invoices**: line items with per-line tax, totals and a status lifecycle
- **Documents**: PDF rendering and email delivery

## Authentication

Tokens are issued by the identity provider. Send them in the Authorization header:

```
Authorization: Bearer <your-jwt-token>
```

## Invoice lifecycle

`DRAFT -> SENT -> VIEWED -> PAID -> REFUNDED`, with `CANCELLED` reachable from
any unpaid state. Invoices stay editable until they are paid or cancelled.
Every move is recorded in the invoice's status history.

## Pagination

List endpoints accept `page` (default 1) and `limit` (default 20, max 100).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Profile", description = "Profile of the authenticated user"),
        (name = "Clients", description = "Client management endpoints"),
        (name = "Invoices", description = "Invoice management, documents and delivery"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::health::health_check,
        crate::health::readiness_check,

        // Profile
        crate::handlers::profile::get_profile,
        crate::handlers::profile::create_profile,
        crate::handlers::profile::update_profile,
        crate::handlers::profile::delete_profile,

        // Clients
        crate::handlers::clients::list_clients,
        crate::handlers::clients::create_client,
        crate::handlers::clients::get_client,
        crate::handlers::clients::update_client,
        crate::handlers::clients::delete_client,

        // Invoices
        crate::handlers::invoices::list_invoices,
        crate::handlers::invoices::create_invoice,
        crate::handlers::invoices::get_invoice,
        crate::handlers::invoices::update_invoice,
        crate::handlers::invoices::delete_invoice,
        crate::handlers::invoices::add_line_item,
        crate::handlers::invoices::update_line_item,
        crate::handlers::invoices::remove_line_item,
        crate::handlers::invoices::change_status,
        crate::handlers::invoices::status_history,
        crate::handlers::invoices::record_payment,
        crate::handlers::invoices::invoice_pdf,
        crate::handlers::invoices::send_invoice,
    ),
    components(
        schemas(
            // Profile
            crate::services::users::CreateProfileRequest,
            crate::services::users::UpdateProfileRequest,
            crate::services::users::ProfileResponse,

            // Clients
            crate::entities::client::ClientStatus,
            crate::services::clients::CreateClientRequest,
            crate::services::clients::UpdateClientRequest,
            crate::services::clients::ClientResponse,

            // Invoices
            crate::entities::invoice::InvoiceStatus,
            crate::services::invoices::LineItemInput,
            crate::services::invoices::UpdateLineItemRequest,
            crate::services::invoices::CreateInvoiceRequest,
            crate::services::invoices::UpdateInvoiceRequest,
            crate::services::invoices::ChangeStatusRequest,
            crate::services::invoices::RecordPaymentRequest,
            crate::services::invoices::SendInvoiceRequest,
            crate::services::invoices::InvoiceResponse,
            crate::services::invoices::InvoiceSummary,
            crate::services::invoices::LineItemResponse,
            crate::services::invoices::InvoiceDetail,
            crate::services::invoices::StatusHistoryEntry,
            crate::services::invoices::SendInvoiceResponse,

            // Health
            crate::health::HealthStatus,
            crate::health::HealthDetail,
            crate::health::ReadinessReport,

            // Error types
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the bearer scheme referenced by `security(("Bearer" = []))`
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
