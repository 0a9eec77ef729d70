use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                    .col(ColumnDef::new(Users::Name).string().not_null())
                    .col(ColumnDef::new(Users::CompanyName).string().null())
                    .col(ColumnDef::new(Users::CompanyAddress).text().null())
                    .col(ColumnDef::new(Users::CompanyTaxId).string().null())
                    .col(ColumnDef::new(Users::CompanyEmail).string().null())
                    .col(ColumnDef::new(Users::CompanyPhone).string().null())
                    .col(ColumnDef::new(Users::BankName).string().null())
                    .col(ColumnDef::new(Users::BankAccount).string().null())
                    .col(ColumnDef::new(Users::BankIban).string().null())
                    .col(ColumnDef::new(Users::BankSwift).string().null())
                    .col(
                        ColumnDef::new(Users::InvoicePrefix)
                            .string_len(16)
                            .not_null()
                            .default("INV"),
                    )
                    .col(
                        ColumnDef::new(Users::NextInvoiceNumber)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Users::DefaultCurrency)
                            .string_len(3)
                            .not_null()
                            .default("USD"),
                    )
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Users::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Users::DeletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Users {
    Table,
    Id,
    Email,
    Name,
    CompanyName,
    CompanyAddress,
    CompanyTaxId,
    CompanyEmail,
    CompanyPhone,
    BankName,
    BankAccount,
    BankIban,
    BankSwift,
    InvoicePrefix,
    NextInvoiceNumber,
    DefaultCurrency,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}
