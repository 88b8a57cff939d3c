//! Relays observed in the directory, keyed by fingerprint.

use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "router")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub fingerprint: String,
    pub name: String,
    /// Whether the operator has been sent (or deliberately skipped for) the welcome email.
    pub welcomed: bool,
    pub last_seen: OffsetDateTime,
    pub up: bool,
    pub exit: bool,
    /// Email of the subscriber that owns this relay, if any.
    pub subscriber_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::subscription::Entity")]
    Subscription,
}

impl Related<super::subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscription.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
