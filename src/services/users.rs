use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    db::DbPool,
    entities::{
        invoice::{self, Entity as InvoiceEntity},
        user::{self, Entity as UserEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

const DEFAULT_INVOICE_PREFIX: &str = "INV";

static INVOICE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]*$").unwrap());
static CURRENCY_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());

fn validate_prefix(prefix: &str) -> Result<(), ValidationError> {
    if INVOICE_PREFIX_RE.is_match(prefix) {
        Ok(())
    } else {
        let mut err = ValidationError::new("invoice_prefix");
        err.message = Some("Invoice prefix may only contain letters, digits, '-' and '_'".into());
        Err(err)
    }
}

pub(crate) fn validate_currency(code: &str) -> Result<(), ValidationError> {
    if CURRENCY_CODE_RE.is_match(code) {
        Ok(())
    } else {
        let mut err = ValidationError::new("currency");
        err.message = Some("Currency must be a three-letter ISO 4217 code".into());
        Err(err)
    }
}

/// Trims optional text; blank strings clear the field
pub(crate) fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProfileRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    #[validate(length(max = 255))]
    pub company_name: Option<String>,
    pub company_address: Option<String>,
    #[validate(length(max = 64))]
    pub company_tax_id: Option<String>,
    #[validate(email)]
    pub company_email: Option<String>,
    #[validate(length(max = 64))]
    pub company_phone: Option<String>,
    pub bank_name: Option<String>,
    pub bank_account: Option<String>,
    #[validate(length(max = 34))]
    pub bank_iban: Option<String>,
    #[validate(length(max = 11))]
    pub bank_swift: Option<String>,
    #[validate(length(min = 1, max = 16), custom = "validate_prefix")]
    pub invoice_prefix: Option<String>,
    #[validate(custom = "validate_currency")]
    pub default_currency: Option<String>,
}

/// Partial profile update. Absent fields are left alone; blank strings clear
/// optional fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub company_name: Option<String>,
    pub company_address: Option<String>,
    pub company_tax_id: Option<String>,
    pub company_email: Option<String>,
    pub company_phone: Option<String>,
    pub bank_name: Option<String>,
    pub bank_account: Option<String>,
    pub bank_iban: Option<String>,
    pub bank_swift: Option<String>,
    #[validate(length(min = 1, max = 16), custom = "validate_prefix")]
    pub invoice_prefix: Option<String>,
    #[validate(range(min = 1))]
    pub next_invoice_number: Option<i32>,
    #[validate(custom = "validate_currency")]
    pub default_currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub company_name: Option<String>,
    pub company_address: Option<String>,
    pub company_tax_id: Option<String>,
    pub company_email: Option<String>,
    pub company_phone: Option<String>,
    pub bank_name: Option<String>,
    pub bank_account: Option<String>,
    pub bank_iban: Option<String>,
    pub bank_swift: Option<String>,
    pub invoice_prefix: String,
    pub next_invoice_number: i32,
    pub default_currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<user::Model> for ProfileResponse {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            name: model.name,
            company_name: model.company_name,
            company_address: model.company_address,
            company_tax_id: model.company_tax_id,
            company_email: model.company_email,
            company_phone: model.company_phone,
            bank_name: model.bank_name,
            bank_account: model.bank_account,
            bank_iban: model.bank_iban,
            bank_swift: model.bank_swift,
            invoice_prefix: model.invoice_prefix,
            next_invoice_number: model.next_invoice_number,
            default_currency: model.default_currency,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Loads a user that has not been soft-deleted
pub async fn find_active_user<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<user::Model, ServiceError> {
    UserEntity::find_by_id(user_id)
        .filter(user::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Profile not found".to_string()))
}

/// Allocates the next free invoice number for `user_id` and advances the counter
/// past it. Numbers already used by explicitly numbered invoices are skipped.
/// Call inside the transaction that inserts the invoice.
pub async fn next_invoice_number<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    year: i32,
) -> Result<String, ServiceError> {
    let user = find_active_user(conn, user_id).await?;
    let mut sequence = user.next_invoice_number;

    let number = loop {
        let candidate = format_invoice_number(&user.invoice_prefix, year, sequence);
        let taken = InvoiceEntity::find()
            .filter(invoice::Column::UserId.eq(user_id))
            .filter(invoice::Column::InvoiceNumber.eq(candidate.clone()))
            .one(conn)
            .await?
            .is_some();

        sequence = sequence.checked_add(1).ok_or_else(|| {
            ServiceError::InvalidOperation(
                "Invoice number sequence is exhausted; lower next_invoice_number".to_string(),
            )
        })?;
        if !taken {
            break candidate;
        }
    };

    let mut active: user::ActiveModel = user.into();
    active.next_invoice_number = Set(sequence);
    active.updated_at = Set(Utc::now());
    active.update(conn).await?;

    Ok(number)
}

/// `INV-2024-000042`
pub fn format_invoice_number(prefix: &str, year: i32, seq: i32) -> String {
    format!("{}-{:04}-{:06}", prefix, year, seq)
}

/// Profile of the authenticated user
#[derive(Clone)]
pub struct UserService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    default_currency: String,
}

impl UserService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        default_currency: String,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            default_currency,
        }
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_profile(&self, user_id: Uuid) -> Result<ProfileResponse, ServiceError> {
        let user = find_active_user(&*self.db_pool, user_id).await?;
        Ok(user.into())
    }

    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn create_profile(
        &self,
        user_id: Uuid,
        request: CreateProfileRequest,
    ) -> Result<ProfileResponse, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        if UserEntity::find_by_id(user_id).one(db).await?.is_some() {
            return Err(ServiceError::Conflict("Profile already exists".to_string()));
        }

        let email = request.email.trim().to_lowercase();
        if UserEntity::find()
            .filter(user::Column::Email.eq(email.clone()))
            .one(db)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "Email {} is already registered",
                email
            )));
        }

        let now = Utc::now();
        let model = user::ActiveModel {
            id: Set(user_id),
            email: Set(email),
            name: Set(request.name.trim().to_string()),
            company_name: Set(clean_optional(request.company_name)),
            company_address: Set(clean_optional(request.company_address)),
            company_tax_id: Set(clean_optional(request.company_tax_id)),
            company_email: Set(clean_optional(request.company_email)),
            company_phone: Set(clean_optional(request.company_phone)),
            bank_name: Set(clean_optional(request.bank_name)),
            bank_account: Set(clean_optional(request.bank_account)),
            bank_iban: Set(clean_optional(request.bank_iban)),
            bank_swift: Set(clean_optional(request.bank_swift)),
            invoice_prefix: Set(request
                .invoice_prefix
                .unwrap_or_else(|| DEFAULT_INVOICE_PREFIX.to_string())),
            next_invoice_number: Set(1),
            default_currency: Set(request
                .default_currency
                .unwrap_or_else(|| self.default_currency.clone())),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(db)
        .await
        .map_err(|e| ServiceError::from_insert_error(e, "Profile"))?;

        info!(user_id = %user_id, "Profile created");
        self.event_sender
            .send_or_log(Event::ProfileCreated(user_id))
            .await;

        Ok(model.into())
    }

    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<ProfileResponse, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let user = find_active_user(db, user_id).await?;

        let mut active: user::ActiveModel = user.into();
        if let Some(email) = request.email {
            let email = email.trim().to_lowercase();
            let taken = UserEntity::find()
                .filter(user::Column::Email.eq(email.clone()))
                .filter(user::Column::Id.ne(user_id))
                .one(db)
                .await?
                .is_some();
            if taken {
                return Err(ServiceError::Conflict(format!(
                    "Email {} is already registered",
                    email
                )));
            }
            active.email = Set(email);
        }
        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }

        macro_rules! set_optional {
            ($($field:ident),+ $(,)?) => {
                $(
                    if request.$field.is_some() {
                        active.$field = Set(clean_optional(request.$field));
                    }
                )+
            };
        }
        set_optional!(
            company_name,
            company_address,
            company_tax_id,
            company_email,
            company_phone,
            bank_name,
            bank_account,
            bank_iban,
            bank_swift,
        );

        if let Some(prefix) = request.invoice_prefix {
            active.invoice_prefix = Set(prefix);
        }
        if let Some(next) = request.next_invoice_number {
            active.next_invoice_number = Set(next);
        }
        if let Some(currency) = request.default_currency {
            active.default_currency = Set(currency);
        }
        active.updated_at = Set(Utc::now());

        let updated = active
            .update(db)
            .await
            .map_err(|e| ServiceError::from_insert_error(e, "Profile"))?;
        info!(user_id = %user_id, "Profile updated");
        Ok(updated.into())
    }

    /// Soft delete; the row stays for invoices that reference it
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn delete_profile(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let user = find_active_user(db, user_id).await?;

        let now = Utc::now();
        let mut active: user::ActiveModel = user.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(db).await?;

        info!(user_id = %user_id, "Profile deleted");
        Ok(())
    }
}
