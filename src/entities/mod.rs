pub mod client;
pub mod invoice;
pub mod invoice_status_history;
pub mod line_item;
pub mod user;

pub use client::{ClientStatus, Entity as Client};
pub use invoice::{Entity as Invoice, InvoiceStatus};
pub use invoice_status_history::Entity as InvoiceStatusHistory;
pub use line_item::Entity as LineItem;
pub use user::Entity as User;
