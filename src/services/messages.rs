use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::message::{self, Entity as MessageEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// User-to-user messaging, plain append/read. Delivery receipts, presence
/// and ordering guarantees beyond insertion time are outside this core.
#[derive(Clone)]
pub struct MessageService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl MessageService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, body))]
    pub async fn send(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        body: &str,
    ) -> Result<message::Model, ServiceError> {
        if body.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "message body must not be empty".into(),
            ));
        }
        if sender_id == receiver_id {
            return Err(ServiceError::ValidationError(
                "cannot message yourself".into(),
            ));
        }

        let model = message::ActiveModel {
            id: Set(Uuid::new_v4()),
            sender_id: Set(sender_id),
            receiver_id: Set(receiver_id),
            body: Set(body.to_string()),
            created_at: Set(Utc::now()),
        };
        let created = model.insert(&*self.db).await?;

        self.event_sender
            .emit(Event::MessageSent {
                message_id: created.id,
                sender_id,
                receiver_id,
            })
            .await;

        Ok(created)
    }

    /// Full two-way history between a pair of users, oldest first.
    pub async fn conversation(
        &self,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<Vec<message::Model>, ServiceError> {
        let messages = MessageEntity::find()
            .filter(
                Condition::any()
                    .add(
                        Condition::all()
                            .add(message::Column::SenderId.eq(user_a))
                            .add(message::Column::ReceiverId.eq(user_b)),
                    )
                    .add(
                        Condition::all()
                            .add(message::Column::SenderId.eq(user_b))
                            .add(message::Column::ReceiverId.eq(user_a)),
                    ),
            )
            .order_by_asc(message::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(messages)
    }
}
