pub use sea_orm_migration::prelude::*;

mod m20240301_000001_create_users_table;
mod m20240301_000002_create_clients_table;
mod m20240301_000003_create_invoices_table;
mod m20240301_000004_create_line_items_table;
mod m20240301_000005_create_invoice_status_history_table;
mod m20240315_000006_add_invoicing_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_users_table::Migration),
            Box::new(m20240301_000002_create_clients_table::Migration),
            Box::new(m20240301_000003_create_invoices_table::Migration),
            Box::new(m20240301_000004_create_line_items_table::Migration),
            Box::new(m20240301_000005_create_invoice_status_history_table::Migration),
            Box::new(m20240315_000006_add_invoicing_indexes::Migration),
        ]
    }
}
