use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Reserved actor identity stamped when no authenticated actor is present.
///
/// The nil UUID row is seeded alongside the schema and must always exist.
pub const SYSTEM_ACTOR_ID: Uuid = Uuid::nil();

/// Identity of the actor performing a mutation.
///
/// Passed explicitly into every mutating service call; never read from
/// ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorContext {
    pub actor_id: Uuid,
}

impl ActorContext {
    pub fn new(actor_id: Uuid) -> Self {
        Self { actor_id }
    }

    /// The reserved system actor.
    pub fn system() -> Self {
        Self {
            actor_id: SYSTEM_ACTOR_ID,
        }
    }

    /// Builds a context from an optional authenticated actor, falling back
    /// to the system actor.
    pub fn from_optional(actor_id: Option<Uuid>) -> Self {
        actor_id.map(Self::new).unwrap_or_else(Self::system)
    }

    /// A single mutation instant plus the acting identity, used to stamp
    /// `updated_at`/`updated_by` (and `created_*` on insert).
    pub fn stamp(&self) -> (DateTime<Utc>, Uuid) {
        (Utc::now(), self.actor_id)
    }
}

impl Default for ActorContext {
    fn default() -> Self {
        Self::system()
    }
}

/// Read access to the audit column set every catalog table carries.
pub trait AuditedModel {
    fn audit_id(&self) -> Uuid;
    fn audit_created_at(&self) -> DateTime<Utc>;
    fn audit_updated_at(&self) -> DateTime<Utc>;
    fn audit_created_by(&self) -> Uuid;
    fn audit_updated_by(&self) -> Uuid;
    fn audit_is_active(&self) -> bool;
    fn audit_sequence(&self) -> i32;
}

/// Implements [`AuditedModel`] for an entity `Model` carrying the shared
/// column set under the conventional field names.
#[macro_export]
macro_rules! impl_audited_model {
    ($model:ty) => {
        impl $crate::auditing::AuditedModel for $model {
            fn audit_id(&self) -> uuid::Uuid {
                self.id
            }
            fn audit_created_at(&self) -> chrono::DateTime<chrono::Utc> {
                self.created_at
            }
            fn audit_updated_at(&self) -> chrono::DateTime<chrono::Utc> {
                self.updated_at
            }
            fn audit_created_by(&self) -> uuid::Uuid {
                self.created_by
            }
            fn audit_updated_by(&self) -> uuid::Uuid {
                self.updated_by
            }
            fn audit_is_active(&self) -> bool {
                self.is_active
            }
            fn audit_sequence(&self) -> i32 {
                self.sequence
            }
        }
    };
}
