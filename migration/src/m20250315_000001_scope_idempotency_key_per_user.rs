use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_credits_transaction_idempotency_key")
                    .table(CreditsTransaction::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;

        // Idempotency keys are client-chosen, so they only need to be unique per user
        manager
            .create_index(
                Index::create()
                    .name("idx_credits_transaction_user_idempotency_key")
                    .table(CreditsTransaction::Table)
                    .col(CreditsTransaction::UserId)
                    .col(CreditsTransaction::IdempotencyKey)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_credits_transaction_user_idempotency_key")
                    .table(CreditsTransaction::Table)
                    .if_exists()
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
            .await
    }
}

#[derive(DeriveIden)]
enum CreditsTransaction {
    Table,
    UserId,
    IdempotencyKey,
}
