use sea_orm_migration::prelude::*;

use super::m20240301_000002_create_clients_table::Clients;
use super::m20240301_000003_create_invoices_table::Invoices;
use super::m20240301_000004_create_line_items_table::LineItems;
use super::m20240301_000005_create_invoice_status_history_table::InvoiceStatusHistory;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ============================================
        // CLIENTS TABLE INDEXES
        // ============================================

        manager
            .create_index(
                Index::create()
                    .name("idx_clients_user_status")
                    .table(Clients::Table)
                    .col(Clients::UserId)
                    .col(Clients::Status)
                    .to_owned(),
            )
            .await?;

        // ============================================
        // INVOICES TABLE INDEXES
        // ============================================

        // Invoice numbers are unique per owner
        manager
            .create_index(
                Index::create()
                    .name("idx_invoices_user_invoice_number")
                    .table(Invoices::Table)
                    .col(Invoices::UserId)
                    .col(Invoices::InvoiceNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_invoices_user_status")
                    .table(Invoices::Table)
                    .col(Invoices::UserId)
                    .col(Invoices::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_invoices_client_id")
                    .table(Invoices::Table)
                    .col(Invoices::ClientId)
                    .to_owned(),
            )
            .await?;

        // ============================================
        // CHILD TABLE INDEXES
        // ============================================

        manager
            .create_index(
                Index::create()
                    .name("idx_line_items_invoice_order")
                    .table(LineItems::Table)
                    .col(LineItems::InvoiceId)
                    .col(LineItems::LineOrder)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_invoice_status_history_invoice_created")
                    .table(InvoiceStatusHistory::Table)
                    .col(InvoiceStatusHistory::InvoiceId)
                    .col(InvoiceStatusHistory::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_invoice_status_history_invoice_created")
                    .table(InvoiceStatusHistory::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_line_items_invoice_order")
                    .table(LineItems::Table)
                    .to_owned(),
            )
            .await?;
        for name in [
            "idx_invoices_client_id",
            "idx_invoices_user_status",
            "idx_invoices_user_invoice_number",
        ] {
            manager
                .drop_index(Index::drop().name(name).table(Invoices::Table).to_owned())
                .await?;
        }
        manager
            .drop_index(
                Index::drop()
                    .name("idx_clients_user_status")
                    .table(Clients::Table)
                    .to_owned(),
            )
            .await
    }
}
