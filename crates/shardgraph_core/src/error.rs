//! Error types for ShardGraph core.

use crate::entity::EntityId;
use shardgraph_storage::RecordImage;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Error type returned by command bodies and subscription handlers.
///
/// Any error can be returned; [`CoreError`] converts into it with `?`.
pub type CommandError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in ShardGraph core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] shardgraph_storage::StorageError),

    /// Property bag codec error.
    #[error("codec error: {0}")]
    Codec(#[from] shardgraph_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An entity with this id already exists in the collection.
    #[error("duplicate key: {entity_type} {entity}")]
    DuplicateKey {
        /// Entity type name.
        entity_type: &'static str,
        /// The duplicated id.
        entity: EntityId,
    },

    /// The entity is not in the collection.
    #[error("key not found: {entity_type} {entity}")]
    KeyNotFound {
        /// Entity type name.
        entity_type: &'static str,
        /// The missing id.
        entity: EntityId,
    },

    /// The pair is already linked, or a one-to-one parent already has a child.
    #[error("duplicated relation: {parent} -> {child}")]
    DuplicatedRelation {
        /// Parent id.
        parent: EntityId,
        /// Child id.
        child: EntityId,
    },

    /// The pair is not linked.
    #[error("missing relation: {parent} -> {child}")]
    MissingRelation {
        /// Parent id.
        parent: EntityId,
        /// Child id.
        child: EntityId,
    },

    /// Loading into a set that already holds data without `force`.
    #[error("cannot load into non-empty {set}")]
    NonEmptyModel {
        /// Qualified set name.
        set: String,
    },

    /// Two change records for the same key cannot be coalesced.
    #[error("invalid change sequence ({reason}): {prior} then {incoming}")]
    InvalidChangeSequence {
        /// Why the records conflict.
        reason: String,
        /// The pending record.
        prior: Box<RecordImage>,
        /// The record being added.
        incoming: Box<RecordImage>,
    },

    /// `copy()` was called on a tracked structure.
    #[error("tracked structures cannot be copied")]
    TrackedCopy,

    /// The model has no shard with this name.
    #[error("shard not registered: {shard}")]
    ShardNotRegistered {
        /// Shard name.
        shard: String,
    },

    /// A collection or relation name could not be resolved.
    #[error("unknown set: {name}")]
    UnknownSet {
        /// Qualified name.
        name: String,
    },

    /// A set exists but holds different entity or properties types.
    #[error("type mismatch for {name}: {message}")]
    TypeMismatch {
        /// Set name.
        name: String,
        /// Description of the mismatch.
        message: String,
    },

    /// The command body failed or panicked.
    #[error("command failed: {source}")]
    CommandInvocation {
        /// Error returned by the command.
        source: CommandError,
    },

    /// Replaying prepared changes failed.
    #[error("failed to apply model changes: {0}")]
    ApplyModelChanges(#[source] Box<CoreError>),

    /// Writing to storage failed.
    #[error("failed to save model: {0}")]
    ModelSave(#[source] Box<CoreError>),

    /// Reading from storage failed.
    #[error("failed to load model: {0}")]
    ModelLoading(#[source] Box<CoreError>),

    /// A subscriber failed after the new model was published.
    #[error("subscriber failed: {source}")]
    Notification {
        /// Error returned by the handler.
        source: CommandError,
    },

    /// The same handler is already subscribed to the same scope.
    #[error("subscription already exists")]
    SubscriptionAlreadyExists,

    /// A subscription names a set that does not exist with the given types.
    #[error("invalid subscription to {shard}.{name}: {message}")]
    InvalidPropertySubscription {
        /// Shard name.
        shard: &'static str,
        /// Set name.
        name: String,
        /// Description of the problem.
        message: String,
    },

    /// Save or load was requested without a storage.
    #[error("no storage configured")]
    StorageNotConfigured,

    /// The command observed a cancellation request.
    #[error("command cancelled")]
    Cancelled,

    /// The scheduler no longer accepts or completes commands.
    #[error("command queue closed")]
    QueueClosed,
}

impl CoreError {
    /// Creates a duplicate key error.
    pub fn duplicate_key(entity_type: &'static str, entity: EntityId) -> Self {
        Self::DuplicateKey {
            entity_type,
            entity,
        }
    }

    /// Creates a key not found error.
    pub fn key_not_found(entity_type: &'static str, entity: EntityId) -> Self {
        Self::KeyNotFound {
            entity_type,
            entity,
        }
    }

    /// Creates a duplicated relation error.
    pub fn duplicated_relation(parent: EntityId, child: EntityId) -> Self {
        Self::DuplicatedRelation { parent, child }
    }

    /// Creates a missing relation error.
    pub fn missing_relation(parent: EntityId, child: EntityId) -> Self {
        Self::MissingRelation { parent, child }
    }

    /// Creates a non-empty model error.
    pub fn non_empty_model(set: impl Into<String>) -> Self {
        Self::NonEmptyModel { set: set.into() }
    }

    /// Creates an invalid change sequence error.
    pub fn invalid_change_sequence(
        reason: impl Into<String>,
        prior: RecordImage,
        incoming: RecordImage,
    ) -> Self {
        Self::InvalidChangeSequence {
            reason: reason.into(),
            prior: Box::new(prior),
            incoming: Box::new(incoming),
        }
    }

    /// Creates a shard not registered error.
    pub fn shard_not_registered(shard: impl Into<String>) -> Self {
        Self::ShardNotRegistered {
            shard: shard.into(),
        }
    }

    /// Creates an unknown set error.
    pub fn unknown_set(name: impl Into<String>) -> Self {
        Self::UnknownSet { name: name.into() }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Wraps an error returned by a command body.
    ///
    /// A [`CoreError::Cancelled`] raised through
    /// [`Snapshot::check_cancelled`](crate::Snapshot::check_cancelled) is
    /// passed through unwrapped.
    pub fn command_invocation(source: CommandError) -> Self {
        match source.downcast::<CoreError>() {
            Ok(core) if matches!(*core, CoreError::Cancelled) => CoreError::Cancelled,
            Ok(core) => Self::CommandInvocation { source: core },
            Err(source) => Self::CommandInvocation { source },
        }
    }

    /// Wraps an error raised while replaying changes.
    pub fn apply_model_changes(inner: CoreError) -> Self {
        Self::ApplyModelChanges(Box::new(inner))
    }

    /// Wraps an error raised while saving.
    pub fn model_save(inner: CoreError) -> Self {
        Self::ModelSave(Box::new(inner))
    }

    /// Wraps an error raised while loading.
    pub fn model_loading(inner: CoreError) -> Self {
        Self::ModelLoading(Box::new(inner))
    }

    /// Creates an invalid subscription error.
    pub fn invalid_subscription(
        shard: &'static str,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidPropertySubscription {
            shard,
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns the innermost core error.
    ///
    /// Orchestration errors wrap the failure that caused them; this walks
    /// through `ApplyModelChanges`, `ModelSave`, `ModelLoading` and any
    /// core error returned from a command or handler.
    pub fn cause(&self) -> &CoreError {
        match self {
            Self::ApplyModelChanges(inner) | Self::ModelSave(inner) | Self::ModelLoading(inner) => {
                inner.cause()
            }
            Self::CommandInvocation { source } | Self::Notification { source } => (**source)
                .downcast_ref::<CoreError>()
                .map_or(self, CoreError::cause),
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_passes_through_command_wrapper() {
        let err = CoreError::command_invocation(Box::new(CoreError::Cancelled));
        assert!(matches!(err, CoreError::Cancelled));
    }

    #[test]
    fn foreign_errors_are_wrapped() {
        let source: CommandError = "boom".into();
        let err = CoreError::command_invocation(source);
        assert!(matches!(err, CoreError::CommandInvocation { .. }));
        assert_eq!(err.to_string(), "command failed: boom");
    }

    #[test]
    fn cause_walks_wrappers() {
        let id = EntityId::from_bytes([1; 16]);
        let inner = CoreError::key_not_found("Person", id);
        let err = CoreError::apply_model_changes(CoreError::command_invocation(Box::new(inner)));
        assert!(matches!(err.cause(), CoreError::KeyNotFound { .. }));
    }

    #[test]
    fn display_names_entity() {
        let id = EntityId::from_bytes([0; 16]);
        let err = CoreError::duplicate_key("Person", id);
        assert_eq!(
            err.to_string(),
            "duplicate key: Person 00000000-0000-0000-0000-000000000000"
        );
    }
}
