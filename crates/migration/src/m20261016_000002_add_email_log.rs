use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Add email log table to track every notification handed to the mailer
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailLog::Table)
                    .if_not_exists()
                    .col(pk_auto(EmailLog::Id))
                    .col(string(EmailLog::Recipient))
                    .col(string_len(EmailLog::Fingerprint, 40))
                    .col(
                        ColumnDef::new(EmailLog::EmailType)
                            .string()
                            .not_null()
                            .comment("welcome, node_down, low_bandwidth or outdated_version"),
                    )
                    .col(
                        timestamp_with_time_zone(EmailLog::SentAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .index(
                        Index::create()
                            .name("idx_email_log_sent_at")
                            .col(EmailLog::SentAt),
                    )
                    .index(
                        Index::create()
                            .name("idx_email_log_fingerprint")
                            .col(EmailLog::Fingerprint),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailLog::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum EmailLog {
    Table,
    Id,
    Recipient,
    Fingerprint,
    EmailType,
    SentAt,
}
