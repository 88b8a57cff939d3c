//! Database access for the weather run.
//!
//! [`Store`] is the explicit handle every component receives. Point lookups
//! return [`Lookup`] so a missing row is a value, not an error; `Err` is kept
//! for real database failures.

use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use time::OffsetDateTime;

use crate::entity::{deployed_datetime, email_log, router, subscriber, subscription};
use crate::error::StoreError;
use crate::notification::Notification;
use crate::subscription::{Subscription, SubscriptionKind, SubscriptionRule};
use crate::utils::random_token;

/// Outcome of a point lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Lookup::Found(v),
            None => Lookup::NotFound,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Store {
    db: DatabaseConnection,
}

impl Store {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Consumes the handle and closes the underlying pool.
    pub async fn close(self) -> Result<(), StoreError> {
        self.db.close().await?;
        Ok(())
    }

    // ---- deployment -------------------------------------------------------

    /// Returns the deployment timestamp, stamping `now` if none is recorded yet.
    #[tracing::instrument(skip(self))]
    pub async fn deployed_at_or_init(&self, now: OffsetDateTime) -> Result<OffsetDateTime, StoreError> {
        let existing = deployed_datetime::Entity::find()
            .order_by_asc(deployed_datetime::Column::Id)
            .one(&self.db)
            .await?;
        if let Some(record) = existing {
            return Ok(record.deployed);
        }

        deployed_datetime::ActiveModel {
            id: ActiveValue::NotSet,
            deployed: ActiveValue::Set(now),
        }
        .insert(&self.db)
        .await?;
        tracing::info!(
            name = "weather.store.deployment_recorded",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            deployed = %now,
            message = "Recorded first deployment"
        );
        Ok(now)
    }

    // ---- routers ----------------------------------------------------------

    pub async fn all_routers(&self) -> Result<Vec<router::Model>, StoreError> {
        Ok(router::Entity::find()
            .order_by_asc(router::Column::Fingerprint)
            .all(&self.db)
            .await?)
    }

    pub async fn find_router(&self, fingerprint: &str) -> Result<Lookup<router::Model>, StoreError> {
        Ok(router::Entity::find_by_id(fingerprint.to_string())
            .one(&self.db)
            .await?
            .into())
    }

    /// Inserts the router or overwrites every column of the existing row.
    pub async fn upsert_router(&self, model: &router::Model) -> Result<(), StoreError> {
        let active = router::ActiveModel {
            fingerprint: ActiveValue::Set(model.fingerprint.clone()),
            name: ActiveValue::Set(model.name.clone()),
            welcomed: ActiveValue::Set(model.welcomed),
            last_seen: ActiveValue::Set(model.last_seen),
            up: ActiveValue::Set(model.up),
            exit: ActiveValue::Set(model.exit),
            subscriber_id: ActiveValue::Set(model.subscriber_id.clone()),
        };
        router::Entity::insert(active)
            .on_conflict(
                OnConflict::column(router::Column::Fingerprint)
                    .update_columns([
                        router::Column::Name,
                        router::Column::Welcomed,
                        router::Column::LastSeen,
                        router::Column::Up,
                        router::Column::Exit,
                        router::Column::SubscriberId,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    pub async fn mark_router_down(&self, fingerprint: &str) -> Result<(), StoreError> {
        router::ActiveModel {
            fingerprint: ActiveValue::Unchanged(fingerprint.to_string()),
            up: ActiveValue::Set(false),
            ..Default::default()
        }
        .update(&self.db)
        .await?;
        Ok(())
    }

    pub async fn delete_router(&self, fingerprint: &str) -> Result<(), StoreError> {
        router::Entity::delete_by_id(fingerprint.to_string())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    // ---- subscribers ------------------------------------------------------

    pub async fn find_subscriber(&self, email: &str) -> Result<Lookup<subscriber::Model>, StoreError> {
        Ok(subscriber::Entity::find_by_id(email.to_string())
            .one(&self.db)
            .await?
            .into())
    }

    /// Creates a subscriber with fresh unsubscribe and preference tokens.
    pub async fn insert_subscriber(
        &self,
        email: &str,
        confirmed: bool,
        now: OffsetDateTime,
    ) -> Result<subscriber::Model, StoreError> {
        let model = subscriber::ActiveModel {
            email: ActiveValue::Set(email.to_string()),
            confirmed: ActiveValue::Set(confirmed),
            sub_date: ActiveValue::Set(now),
            unsubs_auth: ActiveValue::Set(random_token()?),
            pref_auth: ActiveValue::Set(random_token()?),
        }
        .insert(&self.db)
        .await?;
        Ok(model)
    }

    pub async fn set_subscriber_confirmed(&self, email: &str, confirmed: bool) -> Result<(), StoreError> {
        subscriber::ActiveModel {
            email: ActiveValue::Unchanged(email.to_string()),
            confirmed: ActiveValue::Set(confirmed),
            ..Default::default()
        }
        .update(&self.db)
        .await?;
        Ok(())
    }

    // ---- subscriptions ----------------------------------------------------

    /// Loads every subscription of one kind.
    ///
    /// Rows that cannot be interpreted are returned separately so one bad row
    /// does not hide the rest.
    pub async fn subscriptions_of_kind(
        &self,
        kind: SubscriptionKind,
    ) -> Result<(Vec<Subscription>, Vec<StoreError>), StoreError> {
        let rows = subscription::Entity::find()
            .filter(subscription::Column::Kind.eq(kind.tag()))
            .order_by_asc(subscription::Column::Id)
            .all(&self.db)
            .await?;

        let mut subscriptions = Vec::with_capacity(rows.len());
        let mut invalid = Vec::new();
        for row in rows {
            match Subscription::try_from(row) {
                Ok(sub) => subscriptions.push(sub),
                Err(e) => invalid.push(e),
            }
        }
        Ok((subscriptions, invalid))
    }

    pub async fn find_subscription(&self, id: &str) -> Result<Lookup<Subscription>, StoreError> {
        match subscription::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
        {
            Some(row) => Ok(Lookup::Found(Subscription::try_from(row)?)),
            None => Ok(Lookup::NotFound),
        }
    }

    pub async fn insert_subscription(
        &self,
        subscriber_id: &str,
        router_id: &str,
        rule: SubscriptionRule,
    ) -> Result<Subscription, StoreError> {
        let sub = Subscription {
            id: random_token()?,
            subscriber_id: subscriber_id.to_string(),
            router_id: router_id.to_string(),
            emailed: false,
            rule,
        };
        sub.to_active_model().insert(&self.db).await?;
        Ok(sub)
    }

    /// Writes the evaluated state back in place.
    pub async fn update_subscription(&self, sub: &Subscription) -> Result<(), StoreError> {
        let mut active = sub.to_active_model();
        active.id = ActiveValue::Unchanged(sub.id.clone());
        active.update(&self.db).await?;
        Ok(())
    }

    // ---- email log --------------------------------------------------------

    pub async fn log_email(
        &self,
        notification: &Notification,
        sent_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        email_log::ActiveModel {
            id: ActiveValue::NotSet,
            recipient: ActiveValue::Set(notification.recipient.clone()),
            fingerprint: ActiveValue::Set(notification.fingerprint.clone()),
            email_type: ActiveValue::Set(notification.kind.as_str().to_string()),
            sent_at: ActiveValue::Set(sent_at),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }
}
