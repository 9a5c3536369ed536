use sea_orm_migration::sea_query::extension::postgres::Type;
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(CreditsBalanceStatus::Type)
                    .values([CreditsBalanceStatus::Active, CreditsBalanceStatus::Frozen])
                    .to_owned(),
            )
            .await?;

        manager
            .create_type(
                Type::create()
                    .as_enum(CreditsBatchStatus::Type)
                    .values([
                        CreditsBatchStatus::Active,
                        CreditsBatchStatus::Consumed,
                        CreditsBatchStatus::Expired,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_type(
                Type::create()
                    .as_enum(CreditsBatchSource::Type)
                    .values([
                        CreditsBatchSource::Purchase,
                        CreditsBatchSource::Subscription,
                        CreditsBatchSource::Bonus,
                        CreditsBatchSource::Refund,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_type(
                Type::create()
                    .as_enum(CreditsTransactionType::Type)
                    .values([
                        CreditsTransactionType::Purchase,
                        CreditsTransactionType::Consumption,
                        CreditsTransactionType::MonthlyGrant,
                        CreditsTransactionType::RegistrationBonus,
                        CreditsTransactionType::AdminGrant,
                        CreditsTransactionType::Expiration,
                        CreditsTransactionType::Refund,
                    ])
                    .to_owned(),
            )
            .await?;

        // One balance row per account
        manager
            .create_table(
                Table::create()
                    .table(CreditsBalance::Table)
                    .if_not_exists()
                    .col(pk_uuid(CreditsBalance::Id))
                    .col(uuid(CreditsBalance::UserId).not_null())
                    .col(integer(CreditsBalance::Balance).default(0).not_null())
                    .col(integer(CreditsBalance::TotalEarned).default(0).not_null())
                    .col(integer(CreditsBalance::TotalSpent).default(0).not_null())
                    .col(
                        ColumnDef::new(CreditsBalance::Status)
                            .custom(CreditsBalanceStatus::Type)
                            .not_null()
                            .default(SimpleExpr::Custom(
                                "'active'::credits_balance_status".to_string(),
                            )),
                    )
                    .col(
                        timestamp_with_time_zone(CreditsBalance::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(CreditsBalance::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .check(Expr::col(CreditsBalance::Balance).gte(0))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_credits_balance_user_id")
                    .table(CreditsBalance::Table)
                    .col(CreditsBalance::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Batches: one per grant, consumed FIFO by expiry
        manager
            .create_table(
                Table::create()
                    .table(CreditsBatch::Table)
                    .if_not_exists()
                    .col(pk_uuid(CreditsBatch::Id))
                    .col(uuid(CreditsBatch::UserId).not_null())
                    .col(integer(CreditsBatch::Amount).not_null())
                    .col(integer(CreditsBatch::Remaining).not_null())
                    .col(
                        timestamp_with_time_zone(CreditsBatch::IssuedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(timestamp_with_time_zone_null(CreditsBatch::ExpiresAt))
                    .col(
                        ColumnDef::new(CreditsBatch::Status)
                            .custom(CreditsBatchStatus::Type)
                            .not_null()
                            .default(SimpleExpr::Custom(
                                "'active'::credits_batch_status".to_string(),
                            )),
                    )
                    .col(
                        ColumnDef::new(CreditsBatch::SourceType)
                            .custom(CreditsBatchSource::Type)
                            .not_null(),
                    )
                    .col(string_null(CreditsBatch::SourceRef))
                    .col(
                        timestamp_with_time_zone(CreditsBatch::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(CreditsBatch::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .check(Expr::col(CreditsBatch::Remaining).gte(0))
                    .check(
                        Expr::col(CreditsBatch::Remaining).lte(Expr::col(CreditsBatch::Amount)),
                    )
                    .to_owned(),
            )
            .await?;

        // Grants carrying a source reference are idempotent per source
        manager
            .create_index(
                Index::create()
                    .name("idx_credits_batch_source")
                    .table(CreditsBatch::Table)
                    .col(CreditsBatch::SourceType)
                    .col(CreditsBatch::SourceRef)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_credits_batch_fifo")
                    .table(CreditsBatch::Table)
                    .col(CreditsBatch::UserId)
                    .col(CreditsBatch::Status)
                    .col(CreditsBatch::ExpiresAt)
                    .col(CreditsBatch::IssuedAt)
                    .to_owned(),
            )
            .await?;

        // Append-only ledger
        manager
            .create_table(
                Table::create()
                    .table(CreditsTransaction::Table)
                    .if_not_exists()
                    .col(pk_uuid(CreditsTransaction::Id))
                    .col(uuid(CreditsTransaction::UserId).not_null())
                    .col(
                        ColumnDef::new(CreditsTransaction::Type)
                            .custom(CreditsTransactionType::Type)
                            .not_null(),
                    )
                    .col(integer(CreditsTransaction::Amount).not_null())
                    .col(string(CreditsTransaction::DebitAccount).not_null())
                    .col(string(CreditsTransaction::CreditAccount).not_null())
                    .col(integer(CreditsTransaction::BalanceAfter).not_null())
                    .col(text_null(CreditsTransaction::Description))
                    .col(json_binary_null(CreditsTransaction::Metadata))
                    .col(string_null(CreditsTransaction::IdempotencyKey))
                    .col(
                        timestamp_with_time_zone(CreditsTransaction::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .check(Expr::col(CreditsTransaction::Amount).gt(0))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_credits_transaction_user_created")
                    .table(CreditsTransaction::Table)
                    .col(CreditsTransaction::UserId)
                    .col(CreditsTransaction::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_credits_transaction_idempotency_key")
                    .table(CreditsTransaction::Table)
                    .col(CreditsTransaction::IdempotencyKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Ledger rows are never rewritten
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE OR REPLACE FUNCTION reject_credits_transaction_mutation()
                RETURNS TRIGGER AS $$
                BEGIN
                    RAISE EXCEPTION 'credits_transaction is append-only';
                END;
                $$ LANGUAGE plpgsql;
                "#,
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TRIGGER credits_transaction_append_only
                BEFORE UPDATE OR DELETE ON credits_transaction
                FOR EACH ROW
                EXECUTE FUNCTION reject_credits_transaction_mutation();
                "#,
            )
            .await?;

        // Which batches each transaction touched
        manager
            .create_table(
                Table::create()
                    .table(CreditsTransactionBatch::Table)
                    .if_not_exists()
                    .col(pk_uuid(CreditsTransactionBatch::Id))
                    .col(uuid(CreditsTransactionBatch::TransactionId).not_null())
                    .col(uuid(CreditsTransactionBatch::BatchId).not_null())
                    .col(integer(CreditsTransactionBatch::Amount).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_credits_transaction_batch_transaction_id")
                            .from(
                                CreditsTransactionBatch::Table,
                                CreditsTransactionBatch::TransactionId,
                            )
                            .to(CreditsTransaction::Table, CreditsTransaction::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_credits_transaction_batch_batch_id")
                            .from(CreditsTransactionBatch::Table, CreditsTransactionBatch::BatchId)
                            .to(CreditsBatch::Table, CreditsBatch::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_credits_transaction_batch_transaction_id")
                    .table(CreditsTransactionBatch::Table)
                    .col(CreditsTransactionBatch::TransactionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(CreditsTransactionBatch::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(CreditsTransaction::Table).to_owned())
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "DROP FUNCTION IF EXISTS reject_credits_transaction_mutation() CASCADE;",
            )
            .await?;

        manager
            .drop_table(Table::drop().table(CreditsBatch::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(CreditsBalance::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(CreditsTransactionType::Type).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(CreditsBatchSource::Type).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(CreditsBatchStatus::Type).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(CreditsBalanceStatus::Type).to_owned())
            .await?;

        Ok(())
    }
}

// Enum definitions
#[derive(DeriveIden)]
enum CreditsBalanceStatus {
    #[sea_orm(iden = "credits_balance_status")]
    Type,
    Active,
    Frozen,
}

#[derive(DeriveIden)]
enum CreditsBatchStatus {
    #[sea_orm(iden = "credits_batch_status")]
    Type,
    Active,
    Consumed,
    Expired,
}

#[derive(DeriveIden)]
enum CreditsBatchSource {
    #[sea_orm(iden = "credits_batch_source")]
    Type,
    Purchase,
    Subscription,
    Bonus,
    Refund,
}

#[derive(DeriveIden)]
enum CreditsTransactionType {
    #[sea_orm(iden = "credits_transaction_type")]
    Type,
    Purchase,
    Consumption,
    MonthlyGrant,
    RegistrationBonus,
    AdminGrant,
    Expiration,
    Refund,
}

// Table definitions
#[derive(DeriveIden)]
enum CreditsBalance {
    Table,
    Id,
    UserId,
    Balance,
    TotalEarned,
    TotalSpent,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CreditsBatch {
    Table,
    Id,
    UserId,
    Amount,
    Remaining,
    IssuedAt,
    ExpiresAt,
    Status,
    SourceType,
    SourceRef,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CreditsTransaction {
    Table,
    Id,
    UserId,
    Type,
    Amount,
    DebitAccount,
    CreditAccount,
    BalanceAfter,
    Description,
    Metadata,
    IdempotencyKey,
    CreatedAt,
}

#[derive(DeriveIden)]
enum CreditsTransactionBatch {
    Table,
    Id,
    TransactionId,
    BatchId,
    Amount,
}
