use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    clients::ClientService, invoices::InvoiceService, mailer::Mailer, pdf::InvoiceRenderer,
    users::UserService,
};

pub mod clients;
pub mod common;
pub mod invoices;
pub mod profile;

/// Services shared by the HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub users: Arc<UserService>,
    pub clients: Arc<ClientService>,
    pub invoices: Arc<InvoiceService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        renderer: Arc<dyn InvoiceRenderer>,
        mailer: Arc<dyn Mailer>,
        config: &AppConfig,
    ) -> Self {
        let users = Arc::new(UserService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.default_currency.clone(),
        ));
        let clients = Arc::new(ClientService::new(db_pool.clone(), event_sender.clone()));
        let invoices = Arc::new(InvoiceService::new(
            db_pool,
            event_sender,
            renderer,
            mailer,
            config.default_payment_terms_days,
        ));

        Self {
            users,
            clients,
            invoices,
        }
    }
}
