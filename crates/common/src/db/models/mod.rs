//! SeaORM entity models
//!
//! Database entities for Casefile

pub mod enums;
mod user;
mod journalist_profile;
mod case;
mod timeline_event;
mod case_source;
mod case_update;
mod comment;
mod case_subscription;
mod document;
mod notification;
mod email_subscription;
mod email_queue;
mod verification;

pub use enums::*;

pub use user::{
    Entity as UserEntity,
    Model as User,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
};

pub use journalist_profile::{
    Entity as JournalistProfileEntity,
    Model as JournalistProfile,
    ActiveModel as JournalistProfileActiveModel,
    Column as JournalistProfileColumn,
};

pub use case::{
    Entity as CaseEntity,
    Model as Case,
    ActiveModel as CaseActiveModel,
    Column as CaseColumn,
};

pub use timeline_event::{
    Entity as TimelineEventEntity,
    Model as TimelineEvent,
    ActiveModel as TimelineEventActiveModel,
    Column as TimelineEventColumn,
};

pub use case_source::{
    Entity as CaseSourceEntity,
    Model as CaseSource,
    ActiveModel as CaseSourceActiveModel,
    Column as CaseSourceColumn,
};

pub use case_update::{
    Entity as CaseUpdateEntity,
    Model as CaseUpdate,
    ActiveModel as CaseUpdateActiveModel,
    Column as CaseUpdateColumn,
};

pub use comment::{
    Entity as CommentEntity,
    Model as Comment,
    ActiveModel as CommentActiveModel,
    Column as CommentColumn,
};

pub use case_subscription::{
    Entity as CaseSubscriptionEntity,
    Model as CaseSubscription,
    ActiveModel as CaseSubscriptionActiveModel,
    Column as CaseSubscriptionColumn,
};

pub use document::{
    Entity as DocumentEntity,
    Model as Document,
    ActiveModel as DocumentActiveModel,
    Column as DocumentColumn,
};

pub use notification::{
    Entity as NotificationEntity,
    Model as Notification,
    ActiveModel as NotificationActiveModel,
    Column as NotificationColumn,
};

pub use email_subscription::{
    Entity as EmailSubscriptionEntity,
    Model as EmailSubscription,
    ActiveModel as EmailSubscriptionActiveModel,
    Column as EmailSubscriptionColumn,
};

pub use email_queue::{
    Entity as EmailQueueEntity,
    Model as EmailQueue,
    ActiveModel as EmailQueueActiveModel,
    Column as EmailQueueColumn,
};

pub use verification::{
    Entity as VerificationEntity,
    Model as Verification,
    ActiveModel as VerificationActiveModel,
    Column as VerificationColumn,
};
