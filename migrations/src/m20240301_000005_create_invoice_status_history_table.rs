use sea_orm_migration::prelude::*;

use super::m20240301_000003_create_invoices_table::Invoices;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Append-only: rows are never updated or deleted by the application
        manager
            .create_table(
                Table::create()
                    .table(InvoiceStatusHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InvoiceStatusHistory::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InvoiceStatusHistory::InvoiceId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InvoiceStatusHistory::FromStatus)
                            .string_len(32)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(InvoiceStatusHistory::ToStatus)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(InvoiceStatusHistory::Note).text().null())
                    .col(
                        ColumnDef::new(InvoiceStatusHistory::ChangedBy)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InvoiceStatusHistory::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_invoice_status_history_invoice_id")
                            .from(
                                InvoiceStatusHistory::Table,
                                InvoiceStatusHistory::InvoiceId,
                            )
                            .to(Invoices::Table, Invoices::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InvoiceStatusHistory::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum InvoiceStatusHistory {
    Table,
    Id,
    InvoiceId,
    FromStatus,
    ToStatus,
    Note,
    ChangedBy,
    CreatedAt,
}
