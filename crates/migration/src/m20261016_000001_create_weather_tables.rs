use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Subscriber::Table)
                    .if_not_exists()
                    .col(string(Subscriber::Email).primary_key())
                    .col(boolean(Subscriber::Confirmed).default(false))
                    .col(timestamp_with_time_zone(Subscriber::SubDate))
                    .col(string(Subscriber::UnsubsAuth).unique_key())
                    .col(string(Subscriber::PrefAuth).unique_key())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Router::Table)
                    .if_not_exists()
                    .col(string_len(Router::Fingerprint, 40).primary_key())
                    .col(string(Router::Name).default("Unnamed"))
                    .col(boolean(Router::Welcomed).default(false))
                    .col(timestamp_with_time_zone(Router::LastSeen))
                    .col(boolean(Router::Up).default(true))
                    .col(boolean(Router::Exit).default(false))
                    .col(string_null(Router::SubscriberId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_router_subscriber")
                            .from(Router::Table, Router::SubscriberId)
                            .to(Subscriber::Table, Subscriber::Email)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Subscription::Table)
                    .if_not_exists()
                    .col(string(Subscription::Id).primary_key())
                    .col(string(Subscription::SubscriberId))
                    .col(string_len(Subscription::RouterId, 40))
                    .col(boolean(Subscription::Emailed).default(false))
                    .col(
                        ColumnDef::new(Subscription::Type)
                            .string()
                            .not_null()
                            .comment("nodedownsub, outdatedversionsub, bandwithsub or dnsfailsub"),
                    )
                    .col(boolean_null(Subscription::Triggered))
                    .col(integer_null(Subscription::GracePd))
                    .col(timestamp_with_time_zone_null(Subscription::LastChanged))
                    .col(string_null(Subscription::NotifyType))
                    .col(integer_null(Subscription::Threshold))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_subscription_subscriber")
                            .from(Subscription::Table, Subscription::SubscriberId)
                            .to(Subscriber::Table, Subscriber::Email)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_subscription_router")
                            .from(Subscription::Table, Subscription::RouterId)
                            .to(Router::Table, Router::Fingerprint)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_subscription_type")
                    .table(Subscription::Table)
                    .col(Subscription::Type)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DeployedDatetime::Table)
                    .if_not_exists()
                    .col(pk_auto(DeployedDatetime::Id))
                    .col(timestamp_with_time_zone(DeployedDatetime::Deployed))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeployedDatetime::Table).to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_subscription_type")
                    .table(Subscription::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Subscription::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Router::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Subscriber::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Subscriber {
    Table,
    Email,
    Confirmed,
    SubDate,
    UnsubsAuth,
    PrefAuth,
}

#[derive(Iden)]
enum Router {
    Table,
    Fingerprint,
    Name,
    Welcomed,
    LastSeen,
    Up,
    Exit,
    SubscriberId,
}

#[derive(Iden)]
enum Subscription {
    Table,
    Id,
    SubscriberId,
    RouterId,
    Emailed,
    Type,
    Triggered,
    GracePd,
    LastChanged,
    NotifyType,
    Threshold,
}

#[derive(Iden)]
enum DeployedDatetime {
    Table,
    Id,
    Deployed,
}
