//! Subscription rows for every rule kind.
//!
//! All kinds share one table and are told apart by the `type` column. Columns
//! that only apply to some kinds are nullable; see
//! [`crate::subscription::SubscriptionRule`] for the typed view.

use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "subscription")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub subscriber_id: String,
    pub router_id: String,
    pub emailed: bool,
    #[sea_orm(column_name = "type")]
    pub kind: String,
    pub triggered: Option<bool>,
    /// Grace period in hours (node-down only).
    pub grace_pd: Option<i32>,
    pub last_changed: Option<OffsetDateTime>,
    pub notify_type: Option<String>,
    /// Bandwidth threshold in KB/s.
    pub threshold: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::router::Entity",
        from = "Column::RouterId",
        to = "super::router::Column::Fingerprint"
    )]
    Router,
    #[sea_orm(
        belongs_to = "super::subscriber::Entity",
        from = "Column::SubscriberId",
        to = "super::subscriber::Column::Email"
    )]
    Subscriber,
}

impl Related<super::router::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Router.def()
    }
}

impl Related<super::subscriber::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscriber.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
