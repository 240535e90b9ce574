//! Ledger schema: creates every table from scratch.
//!
//! - `users`: Basic-auth identities; the username is the `user_id` of the
//!   other tables (not a foreign key, the engine never reads `users`)
//! - `categories`: shared (`owner_user_id IS NULL`) and private categories
//! - `accounts`: wallets, bank and investment accounts
//! - `cards` / `bills`: credit cards and their statements
//! - `installment_groups`: config rows of installment and recurring plans
//! - `transactions`: the ledger
//! - `reserves`: derived month-by-month reserve timeline
//! - `config_entries`: key/value settings per user

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Users {
    Table,
    Username,
    Password,
}

#[derive(Iden)]
enum Categories {
    Table,
    Id,
    Name,
    Scope,
    Emoji,
    Color,
    SortOrder,
    Active,
    OwnerUserId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Accounts {
    Table,
    Id,
    UserId,
    Name,
    AccountType,
    Institution,
    InitialBalanceCents,
    Active,
    SortOrder,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Cards {
    Table,
    Id,
    UserId,
    Name,
    Issuer,
    Network,
    Last4,
    Color,
    TotalLimitCents,
    UsedLimitCents,
    ClosingDay,
    DueDay,
    Active,
    CreatedAt,
    UpdatedAt,
    Version,
}

#[derive(Iden)]
enum Bills {
    Table,
    Id,
    UserId,
    CardId,
    ReferenceMonth,
    ReferenceYear,
    PeriodStart,
    PeriodEnd,
    ClosingDate,
    DueDate,
    AmountCents,
    Status,
    PaymentDate,
    CreatedAt,
    UpdatedAt,
    Version,
}

#[derive(Iden)]
enum InstallmentGroups {
    Table,
    Id,
    UserId,
    Kind,
    Frequency,
    DueDay,
    TotalAmountCents,
    InstallmentCount,
    PaidCount,
    CanceledCount,
    AllowIndividualEdit,
    InterestEnabled,
    InterestRate,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    UserId,
    Date,
    Kind,
    CategoryId,
    CategoryName,
    Description,
    AmountCents,
    PaymentMethod,
    Km,
    CreatedAt,
    UpdatedAt,
    GroupId,
    InstallmentNumber,
    InstallmentTotal,
    Recurrence,
    PaymentStatus,
    DueDate,
    OriginalAmountCents,
    InterestCents,
    DiscountCents,
    PaymentDate,
    Reconciliation,
    ReconciliationDate,
    Notes,
    FromAccountId,
    ToAccountId,
    AutoDebit,
    CardId,
    BillPaymentId,
}

#[derive(Iden)]
enum Reserves {
    Table,
    UserId,
    Month,
    DepositsCents,
    AccumulatedCents,
    UsageCents,
    BalanceCents,
}

#[derive(Iden)]
enum ConfigEntries {
    Table,
    UserId,
    Key,
    Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Users
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Username)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::Password).string().not_null())
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Categories
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Categories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Categories::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Categories::Name).string().not_null())
                    .col(ColumnDef::new(Categories::Scope).string().not_null())
                    .col(ColumnDef::new(Categories::Emoji).string())
                    .col(ColumnDef::new(Categories::Color).string())
                    .col(
                        ColumnDef::new(Categories::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Categories::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Categories::OwnerUserId).string())
                    .col(
                        ColumnDef::new(Categories::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Categories::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-categories-owner_user_id")
                    .table(Categories::Table)
                    .col(Categories::OwnerUserId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Accounts
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Accounts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Accounts::UserId).string().not_null())
                    .col(ColumnDef::new(Accounts::Name).string().not_null())
                    .col(ColumnDef::new(Accounts::AccountType).string().not_null())
                    .col(ColumnDef::new(Accounts::Institution).string())
                    .col(
                        ColumnDef::new(Accounts::InitialBalanceCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Accounts::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Accounts::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Accounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Accounts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-accounts-user_id")
                    .table(Accounts::Table)
                    .col(Accounts::UserId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Cards
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Cards::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Cards::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Cards::UserId).string().not_null())
                    .col(ColumnDef::new(Cards::Name).string().not_null())
                    .col(ColumnDef::new(Cards::Issuer).string())
                    .col(ColumnDef::new(Cards::Network).string().not_null())
                    .col(ColumnDef::new(Cards::Last4).string())
                    .col(ColumnDef::new(Cards::Color).string().not_null())
                    .col(
                        ColumnDef::new(Cards::TotalLimitCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Cards::UsedLimitCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Cards::ClosingDay).integer().not_null())
                    .col(ColumnDef::new(Cards::DueDay).integer().not_null())
                    .col(
                        ColumnDef::new(Cards::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Cards::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Cards::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Cards::Version)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Bills
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Bills::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Bills::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Bills::UserId).string().not_null())
                    .col(ColumnDef::new(Bills::CardId).uuid().not_null())
                    .col(ColumnDef::new(Bills::ReferenceMonth).integer().not_null())
                    .col(ColumnDef::new(Bills::ReferenceYear).integer().not_null())
                    .col(ColumnDef::new(Bills::PeriodStart).date().not_null())
                    .col(ColumnDef::new(Bills::PeriodEnd).date().not_null())
                    .col(ColumnDef::new(Bills::ClosingDate).date().not_null())
                    .col(ColumnDef::new(Bills::DueDate).date().not_null())
                    .col(
                        ColumnDef::new(Bills::AmountCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Bills::Status).string().not_null())
                    .col(ColumnDef::new(Bills::PaymentDate).date())
                    .col(
                        ColumnDef::new(Bills::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Bills::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Bills::Version)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-bills-card_id")
                            .from(Bills::Table, Bills::CardId)
                            .to(Cards::Table, Cards::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-bills-card_id-reference-unique")
                    .table(Bills::Table)
                    .col(Bills::CardId)
                    .col(Bills::ReferenceYear)
                    .col(Bills::ReferenceMonth)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 6. Installment groups
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(InstallmentGroups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InstallmentGroups::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(InstallmentGroups::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InstallmentGroups::Kind).string().not_null())
                    .col(
                        ColumnDef::new(InstallmentGroups::Frequency)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InstallmentGroups::DueDay)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InstallmentGroups::TotalAmountCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InstallmentGroups::InstallmentCount)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InstallmentGroups::PaidCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(InstallmentGroups::CanceledCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(InstallmentGroups::AllowIndividualEdit)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(InstallmentGroups::InterestEnabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(InstallmentGroups::InterestRate)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(InstallmentGroups::Notes).string())
                    .col(
                        ColumnDef::new(InstallmentGroups::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InstallmentGroups::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 7. Transactions
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::UserId).string().not_null())
                    .col(ColumnDef::new(Transactions::Date).date().not_null())
                    .col(ColumnDef::new(Transactions::Kind).string().not_null())
                    .col(ColumnDef::new(Transactions::CategoryId).uuid())
                    .col(ColumnDef::new(Transactions::CategoryName).string())
                    .col(
                        ColumnDef::new(Transactions::Description)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Transactions::AmountCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::PaymentMethod).string())
                    .col(ColumnDef::new(Transactions::Km).big_integer())
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::GroupId).uuid())
                    .col(ColumnDef::new(Transactions::InstallmentNumber).integer())
                    .col(ColumnDef::new(Transactions::InstallmentTotal).integer())
                    .col(
                        ColumnDef::new(Transactions::Recurrence)
                            .string()
                            .not_null()
                            .default("SINGLE"),
                    )
                    .col(ColumnDef::new(Transactions::PaymentStatus).string())
                    .col(ColumnDef::new(Transactions::DueDate).date())
                    .col(ColumnDef::new(Transactions::OriginalAmountCents).big_integer())
                    .col(
                        ColumnDef::new(Transactions::InterestCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Transactions::DiscountCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Transactions::PaymentDate).date())
                    .col(
                        ColumnDef::new(Transactions::Reconciliation)
                            .string()
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(ColumnDef::new(Transactions::ReconciliationDate).date())
                    .col(ColumnDef::new(Transactions::Notes).string())
                    .col(ColumnDef::new(Transactions::FromAccountId).uuid())
                    .col(ColumnDef::new(Transactions::ToAccountId).uuid())
                    .col(
                        ColumnDef::new(Transactions::AutoDebit)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Transactions::CardId).uuid())
                    .col(ColumnDef::new(Transactions::BillPaymentId).uuid())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-user_id-date")
                    .table(Transactions::Table)
                    .col(Transactions::UserId)
                    .col(Transactions::Date)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-group_id")
                    .table(Transactions::Table)
                    .col(Transactions::GroupId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-card_id")
                    .table(Transactions::Table)
                    .col(Transactions::CardId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 8. Reserves
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Reserves::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Reserves::UserId).string().not_null())
                    .col(ColumnDef::new(Reserves::Month).string().not_null())
                    .col(
                        ColumnDef::new(Reserves::DepositsCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Reserves::AccumulatedCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Reserves::UsageCents).big_integer().not_null())
                    .col(
                        ColumnDef::new(Reserves::BalanceCents)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(Index::create().col(Reserves::UserId).col(Reserves::Month))
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 9. Config entries
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(ConfigEntries::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ConfigEntries::UserId).string().not_null())
                    .col(ColumnDef::new(ConfigEntries::Key).string().not_null())
                    .col(ColumnDef::new(ConfigEntries::Value).string().not_null())
                    .primary_key(
                        Index::create()
                            .col(ConfigEntries::UserId)
                            .col(ConfigEntries::Key),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ConfigEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Reserves::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(InstallmentGroups::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Bills::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Cards::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Accounts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Categories::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}
