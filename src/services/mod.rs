// Domain rules
pub mod invoice_status;
pub mod totals;

// Core services
pub mod clients;
pub mod invoices;
pub mod users;

// External collaborators
pub mod mailer;
pub mod pdf;
