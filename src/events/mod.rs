use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::entities::EntityKind;

/// Events emitted by the catalog services after a committed mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CategoryCreated(Uuid),
    CategoryUpdated(Uuid),
    CategoryDeleted(Uuid),
    CategoryMoved {
        category_id: Uuid,
        old_parent_id: Option<Uuid>,
        new_parent_id: Option<Uuid>,
    },

    AttributeCreated(Uuid),
    AttributeUpdated(Uuid),
    AttributeDeleted(Uuid),
    AttributeSetCreated(Uuid),
    AttributeValueSet {
        entity_type: EntityKind,
        entity_id: Uuid,
        attribute_id: Uuid,
    },

    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),

    SkuCreated(Uuid),
    SkuUpdated(Uuid),
    SkuDeleted(Uuid),

    SupplierCreated(Uuid),
    SupplierUpdated(Uuid),
    SupplierDeleted(Uuid),

    PricelistCreated(Uuid),
    PriceDetailAdded {
        sku_id: Uuid,
        pricelist_id: Uuid,
        minimum_quantity: i32,
    },

    ImageAttached {
        owner_type: EntityKind,
        owner_id: Uuid,
        image_id: Uuid,
    },
}

/// Cloneable handle used by services to publish events.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes an event, logging instead of failing the surrounding
    /// operation when no consumer is attached anymore. Mutations are
    /// committed by the time events are published.
    pub async fn publish(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

/// Builds an event channel with the given buffer size.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}
