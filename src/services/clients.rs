use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{total_pages, DbPool},
    entities::client::{self, ClientStatus, Entity as ClientEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::users::{clean_optional, find_active_user},
    PaginatedResponse,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateClientRequest {
    #[validate(length(min = 1, max = 255, message = "Client name is required"))]
    pub name: String,
    #[validate(email(message = "Client email must be valid"))]
    pub email: Option<String>,
    #[validate(length(max = 64))]
    pub phone: Option<String>,
    pub address: Option<String>,
    #[validate(length(max = 64))]
    pub tax_id: Option<String>,
    pub notes: Option<String>,
    pub status: Option<ClientStatus>,
}

/// Partial client update; blank strings clear optional fields
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateClientRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub tax_id: Option<String>,
    pub notes: Option<String>,
    pub status: Option<ClientStatus>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ClientListQuery {
    pub status: Option<ClientStatus>,
    /// Case-insensitive match on name or email
    pub search: Option<String>,
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

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClientResponse {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub tax_id: Option<String>,
    pub notes: Option<String>,
    pub status: ClientStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<client::Model> for ClientResponse {
    fn from(model: client::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            phone: model.phone,
            address: model.address,
            tax_id: model.tax_id,
            notes: model.notes,
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
            deleted_at: model.deleted_at,
        }
    }
}

/// Loads a client owned by `user_id`, including soft-deleted rows
pub async fn find_owned_client<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    client_id: Uuid,
) -> Result<client::Model, ServiceError> {
    ClientEntity::find_by_id(client_id)
        .filter(client::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Client {} not found", client_id)))
}

#[derive(Clone)]
pub struct ClientService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl ClientService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Active clients ordered by name
    #[instrument(skip(self, query), fields(user_id = %user_id))]
    pub async fn list_clients(
        &self,
        user_id: Uuid,
        query: ClientListQuery,
    ) -> Result<PaginatedResponse<ClientResponse>, ServiceError> {
        let db = &*self.db_pool;
        let page = query.page.max(1);
        let limit = query.limit.clamp(1, 100);

        let mut select = ClientEntity::find()
            .filter(client::Column::UserId.eq(user_id))
            .filter(client::Column::DeletedAt.is_null());

        if let Some(status) = query.status {
            select = select.filter(client::Column::Status.eq(status));
        }
        if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = format!("%{}%", term.to_lowercase());
            select = select.filter(
                Condition::any()
                    .add(Expr::expr(Func::lower(Expr::col(client::Column::Name))).like(pattern.clone()))
                    .add(Expr::expr(Func::lower(Expr::col(client::Column::Email))).like(pattern)),
            );
        }

        let paginator = select
            .order_by_asc(client::Column::Name)
            .order_by_asc(client::Column::Id)
            .paginate(db, limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;

        Ok(PaginatedResponse {
            items: items.into_iter().map(ClientResponse::from).collect(),
            total,
            page,
            limit,
            total_pages: total_pages(total, limit),
        })
    }

    #[instrument(skip(self), fields(user_id = %user_id, client_id = %client_id))]
    pub async fn get_client(
        &self,
        user_id: Uuid,
        client_id: Uuid,
    ) -> Result<ClientResponse, ServiceError> {
        let client = find_owned_client(&*self.db_pool, user_id, client_id).await?;
        Ok(client.into())
    }

    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn create_client(
        &self,
        user_id: Uuid,
        request: CreateClientRequest,
    ) -> Result<ClientResponse, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        find_active_user(db, user_id).await?;

        let now = Utc::now();
        let client_id = Uuid::new_v4();
        let model = client::ActiveModel {
            id: Set(client_id),
            user_id: Set(user_id),
            name: Set(request.name.trim().to_string()),
            email: Set(clean_optional(request.email)),
            phone: Set(clean_optional(request.phone)),
            address: Set(clean_optional(request.address)),
            tax_id: Set(clean_optional(request.tax_id)),
            notes: Set(clean_optional(request.notes)),
            status: Set(request.status.unwrap_or_default()),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(db)
        .await
        .map_err(|e| ServiceError::from_insert_error(e, "Client"))?;

        info!(client_id = %client_id, "Client created");
        self.event_sender
            .send_or_log(Event::ClientCreated(client_id))
            .await;

        Ok(model.into())
    }

    #[instrument(skip(self, request), fields(user_id = %user_id, client_id = %client_id))]
    pub async fn update_client(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        request: UpdateClientRequest,
    ) -> Result<ClientResponse, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let client = find_owned_client(db, user_id, client_id).await?;
        if client.is_deleted() {
            return Err(ServiceError::InvalidOperation(
                "Deleted clients cannot be modified".to_string(),
            ));
        }

        if let Some(email) = request.email.as_deref().map(str::trim) {
            if !email.is_empty() && !validator::validate_email(email) {
                return Err(ServiceError::ValidationError(
                    "email: Client email must be valid".to_string(),
                ));
            }
        }

        let mut active: client::ActiveModel = client.into();
        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if request.email.is_some() {
            active.email = Set(clean_optional(request.email));
        }
        if request.phone.is_some() {
            active.phone = Set(clean_optional(request.phone));
        }
        if request.address.is_some() {
            active.address = Set(clean_optional(request.address));
        }
        if request.tax_id.is_some() {
            active.tax_id = Set(clean_optional(request.tax_id));
        }
        if request.notes.is_some() {
            active.notes = Set(clean_optional(request.notes));
        }
        if let Some(status) = request.status {
            active.status = Set(status);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        info!(client_id = %client_id, "Client updated");
        Ok(updated.into())
    }

    /// Soft delete. Existing invoices keep pointing at the row.
    #[instrument(skip(self), fields(user_id = %user_id, client_id = %client_id))]
    pub async fn delete_client(&self, user_id: Uuid, client_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let client = find_owned_client(db, user_id, client_id).await?;
        if client.is_deleted() {
            return Err(ServiceError::NotFound(format!(
                "Client {} not found",
                client_id
            )));
        }

        let now = Utc::now();
        let mut active: client::ActiveModel = client.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(db).await?;

        info!(client_id = %client_id, "Client deleted");
        self.event_sender
            .send_or_log(Event::ClientDeleted(client_id))
            .await;
        Ok(())
    }
}
