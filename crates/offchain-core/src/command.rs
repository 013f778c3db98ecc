//! Commands and the pure transition function
//!
//! A command is an immutable intent to move one object from version `N` to
//! `N + 1`. Its id is derived from its content, which makes retransmission
//! idempotent: the same intent always carries the same id.

use crate::errors::TransitionError;
use crate::hash::ContentHasher;
use crate::identifiers::{CommandId, ObjectId, VaspId};
use crate::object::{ObjectState, OffChainObject};
use crate::validator::Validator;
use serde::{Deserialize, Serialize};

/// Immutable intent to transition an object to its next version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Content hash, also the idempotency key
    pub command_id: CommandId,
    pub object_id: ObjectId,
    /// Version the command extends; 0 creates the object
    pub expected_version: u64,
    /// Command that produced `expected_version`; `None` on creation
    pub parent: Option<CommandId>,
    /// Proposed state of the new version
    pub state: ObjectState,
    pub author: VaspId,
    /// Milliseconds since the Unix epoch at authoring time
    pub timestamp: u64,
}

impl Command {
    /// Build a command extending `prior` (or creating the object when `None`)
    pub fn new(
        author: VaspId,
        object_id: ObjectId,
        prior: Option<&OffChainObject>,
        state: ObjectState,
        timestamp: u64,
    ) -> Self {
        let expected_version = prior.map_or(0, |p| p.version);
        let parent = prior.map(|p| p.last_command);
        let command_id = Self::compute_id(
            &object_id,
            expected_version,
            parent.as_ref(),
            &state,
            author,
            timestamp,
        );
        Self {
            command_id,
            object_id,
            expected_version,
            parent,
            state,
            author,
            timestamp,
        }
    }

    /// Recompute the content id
    pub fn compute_id(
        object_id: &ObjectId,
        expected_version: u64,
        parent: Option<&CommandId>,
        state: &ObjectState,
        author: VaspId,
        timestamp: u64,
    ) -> CommandId {
        let mut hasher = ContentHasher::new("offchain/command/v1");
        hasher
            .field(object_id.as_str().as_bytes())
            .u64(expected_version)
            .optional(parent.map(|p| p.as_bytes().as_slice()))
            .field(state.status.as_str().as_bytes())
            .u64(state.fields.len() as u64);
        for (key, value) in &state.fields {
            hasher.field(key.as_bytes()).field(value.as_bytes());
        }
        hasher.field(&author.to_bytes()).u64(timestamp);
        CommandId(hasher.finalize())
    }

    /// Whether `command_id` matches the content
    pub fn verify_id(&self) -> bool {
        Self::compute_id(
            &self.object_id,
            self.expected_version,
            self.parent.as_ref(),
            &self.state,
            self.author,
            self.timestamp,
        ) == self.command_id
    }

    /// Version this command produces
    pub fn new_version(&self) -> u64 {
        self.expected_version + 1
    }

    /// Whether this command creates its object
    pub fn is_creation(&self) -> bool {
        self.expected_version == 0
    }

    /// Whether the command extends exactly `prior`
    pub fn extends(&self, prior: Option<&OffChainObject>) -> bool {
        match prior {
            None => self.expected_version == 0 && self.parent.is_none(),
            Some(object) => {
                self.expected_version == object.version && self.parent == Some(object.last_command)
            }
        }
    }
}

/// Apply `command` to `prior` without domain validation.
///
/// Checks object identity, version, parent and terminal status. Replay uses
/// this directly since every persisted command was validated when it was
/// first accepted.
pub fn transition(
    prior: Option<&OffChainObject>,
    command: &Command,
) -> Result<OffChainObject, TransitionError> {
    if let Some(object) = prior {
        if object.object_id != command.object_id {
            return Err(TransitionError::WrongObject {
                command_id: command.command_id,
                expected: command.object_id.clone(),
                actual: object.object_id.clone(),
            });
        }
    }

    let actual = prior.map_or(0, |p| p.version);
    if command.expected_version != actual {
        return Err(TransitionError::InvalidTransition {
            command_id: command.command_id,
            object_id: command.object_id.clone(),
            expected: command.expected_version,
            actual,
        });
    }
    if !command.extends(prior) {
        return Err(TransitionError::StaleParent {
            command_id: command.command_id,
            object_id: command.object_id.clone(),
        });
    }
    if let Some(object) = prior {
        if object.status().is_terminal() {
            return Err(TransitionError::TerminalObject {
                command_id: command.command_id,
                object_id: command.object_id.clone(),
                status: object.status(),
            });
        }
    }

    Ok(OffChainObject {
        object_id: command.object_id.clone(),
        version: command.new_version(),
        state: command.state.clone(),
        last_command: command.command_id,
    })
}

/// Apply `command` to `prior`, then check the result with `validator`.
///
/// Pure: `prior` is never modified, the new version is returned.
pub fn apply(
    prior: Option<&OffChainObject>,
    command: &Command,
    validator: &dyn Validator,
) -> Result<OffChainObject, TransitionError> {
    let next = transition(prior, command)?;
    validator
        .validate(prior, command)
        .map_err(|failure| TransitionError::SchemaViolation {
            command_id: command.command_id,
            object_id: command.object_id.clone(),
            code: failure.code,
            detail: failure.detail,
        })?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectStatus;
    use crate::validator::{AcceptAll, ValidationFailure};
    use assert_matches::assert_matches;

    fn author() -> VaspId {
        VaspId::new_from_entropy([1u8; 32])
    }

    fn create(state: ObjectState) -> Command {
        Command::new(author(), ObjectId::new("pay-1"), None, state, 1_000)
    }

    struct RejectEverything;

    impl Validator for RejectEverything {
        fn validate(
            &self,
            _prior: Option<&OffChainObject>,
            _command: &Command,
        ) -> Result<(), ValidationFailure> {
            Err(ValidationFailure::new("nope", "rejected by test"))
        }
    }

    #[test]
    fn id_is_deterministic_from_content() {
        let a = create(ObjectState::new(ObjectStatus::None));
        let b = create(ObjectState::new(ObjectStatus::None));
        assert_eq!(a.command_id, b.command_id);
        assert!(a.verify_id());

        let c = create(ObjectState::new(ObjectStatus::NeedsKycData));
        assert_ne!(a.command_id, c.command_id);
    }

    #[test]
    fn tampered_command_fails_id_check() {
        let mut cmd = create(ObjectState::new(ObjectStatus::None));
        cmd.state.status = ObjectStatus::Settled;
        assert!(!cmd.verify_id());
    }

    #[test]
    fn creation_yields_version_one() {
        let cmd = create(ObjectState::new(ObjectStatus::None));
        let object = apply(None, &cmd, &AcceptAll).unwrap();
        assert_eq!(object.version, 1);
        assert_eq!(object.last_command, cmd.command_id);
    }

    #[test]
    fn update_requires_matching_version_and_parent() {
        let first = create(ObjectState::new(ObjectStatus::None));
        let v1 = apply(None, &first, &AcceptAll).unwrap();

        let second = Command::new(
            author(),
            ObjectId::new("pay-1"),
            Some(&v1),
            ObjectState::new(ObjectStatus::NeedsKycData),
            2_000,
        );
        let v2 = apply(Some(&v1), &second, &AcceptAll).unwrap();
        assert_eq!(v2.version, 2);

        // Re-applying against v2 is a version mismatch
        assert_matches!(
            apply(Some(&v2), &second, &AcceptAll),
            Err(TransitionError::InvalidTransition {
                expected: 1,
                actual: 2,
                ..
            })
        );

        // Same version number, different history
        let other_root = Command::new(
            author(),
            ObjectId::new("pay-1"),
            None,
            ObjectState::new(ObjectStatus::NeedsStableId),
            1_500,
        );
        let other_v1 = apply(None, &other_root, &AcceptAll).unwrap();
        assert_matches!(
            apply(Some(&other_v1), &second, &AcceptAll),
            Err(TransitionError::StaleParent { .. })
        );
    }

    #[test]
    fn apply_never_mutates_prior() {
        let first = create(ObjectState::new(ObjectStatus::None));
        let v1 = apply(None, &first, &AcceptAll).unwrap();
        let snapshot = v1.clone();
        let second = Command::new(
            author(),
            ObjectId::new("pay-1"),
            Some(&v1),
            ObjectState::new(ObjectStatus::Abort),
            2_000,
        );
        let _ = apply(Some(&v1), &second, &AcceptAll).unwrap();
        assert_eq!(v1, snapshot);
    }

    #[test]
    fn terminal_objects_reject_updates() {
        let first = create(ObjectState::new(ObjectStatus::Abort));
        let v1 = apply(None, &first, &AcceptAll).unwrap();
        let second = Command::new(
            author(),
            ObjectId::new("pay-1"),
            Some(&v1),
            ObjectState::new(ObjectStatus::None),
            2_000,
        );
        let err = apply(Some(&v1), &second, &AcceptAll).unwrap_err();
        assert_eq!(err.reason().code(), "terminal_object");
    }

    #[test]
    fn validator_failure_is_schema_violation() {
        let cmd = create(ObjectState::new(ObjectStatus::None));
        let err = apply(None, &cmd, &RejectEverything).unwrap_err();
        assert_matches!(err, TransitionError::SchemaViolation { ref code, .. } if code == "nope");
        assert_eq!(err.command_id(), cmd.command_id);
        assert!(!err.reason().is_recoverable());
    }
}
