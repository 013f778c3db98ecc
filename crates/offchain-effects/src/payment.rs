//! Payment and KYC validation rules
//!
//! - status never moves down the ladder; `Abort` is reachable only below
//!   `ReadyForSettlement`
//! - `reference_id` is required at creation and write-once
//! - `kyc_data` is a JSON object with `payment_reference_id` and `type`,
//!   write-once
//!
//! A payment that names its `sender` and `receiver` VASPs also carries one
//! sub-state per role under `sender.*` and `receiver.*` (`status`,
//! `kyc_data`). Each VASP edits only its own role: the other side's fields
//! are read-only to it, the receiver never sits in
//! `needs_recipient_signature`, and past the finality barrier a role may
//! abort only once the other role already has.

use offchain_core::{
    Command, ObjectState, ObjectStatus, OffChainObject, ValidationFailure, Validator, VaspId,
};
use std::fmt;

pub const REFERENCE_ID: &str = "reference_id";
pub const KYC_DATA: &str = "kyc_data";
pub const SENDER: &str = "sender";
pub const RECEIVER: &str = "receiver";

/// Side of a payment a VASP acts for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Sender => SENDER,
            Role::Receiver => RECEIVER,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Role::Sender => Role::Receiver,
            Role::Receiver => Role::Sender,
        }
    }

    /// Field holding `name` in this role's sub-state, e.g. `receiver.status`
    pub fn field(self, name: &str) -> String {
        format!("{}.{name}", self.as_str())
    }

    pub fn status_field(self) -> String {
        self.field("status")
    }

    pub fn kyc_field(self) -> String {
        self.field(KYC_DATA)
    }

    /// Status of this role, `None` while unset
    pub fn status(self, state: &ObjectState) -> Result<ObjectStatus, ValidationFailure> {
        match state.field(&self.status_field()) {
            None => Ok(ObjectStatus::None),
            Some(raw) => raw
                .parse()
                .map_err(|e| ValidationFailure::new("invalid_role_status", format!("{self}: {e}"))),
        }
    }

    fn owns(self, key: &str) -> bool {
        key.strip_prefix(self.as_str())
            .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment state between two named VASPs, awaiting KYC data
pub fn payment_between(reference: &str, sender: VaspId, receiver: VaspId) -> ObjectState {
    ObjectState::new(ObjectStatus::NeedsKycData)
        .with_field(REFERENCE_ID, reference)
        .with_field(SENDER, sender.to_string())
        .with_field(RECEIVER, receiver.to_string())
}

/// Role `vasp` plays in a payment, if the payment names its parties
pub fn role_of(state: &ObjectState, vasp: VaspId) -> Option<Role> {
    [Role::Sender, Role::Receiver].into_iter().find(|role| {
        state
            .field(role.as_str())
            .and_then(|raw| raw.parse::<VaspId>().ok())
            == Some(vasp)
    })
}

fn names_parties(state: &ObjectState) -> bool {
    state.field(SENDER).is_some() || state.field(RECEIVER).is_some()
}

/// Validator for payment objects
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentValidator;

impl Validator for PaymentValidator {
    fn validate(
        &self,
        prior: Option<&OffChainObject>,
        command: &Command,
    ) -> Result<(), ValidationFailure> {
        let next = &command.state;
        match prior {
            None => {
                if next.field(REFERENCE_ID).map_or(true, str::is_empty) {
                    return Err(ValidationFailure::new(
                        "missing_reference_id",
                        "reference_id is required when creating a payment",
                    ));
                }
                if names_parties(next) {
                    check_creation_roles(next, command.author)?;
                }
            }
            Some(prior) => {
                for field in [REFERENCE_ID, KYC_DATA, SENDER, RECEIVER] {
                    check_write_once(&prior.state, next, field)?;
                }
                let other_aborted = if names_parties(&prior.state) {
                    check_update_roles(&prior.state, next, command.author)?
                } else {
                    false
                };
                check_status(prior.status(), next.status, other_aborted)?;
            }
        }

        let kyc_fields = [KYC_DATA.to_string(), Role::Sender.kyc_field(), Role::Receiver.kyc_field()];
        for field in &kyc_fields {
            if let Some(blob) = next.field(field) {
                check_kyc_blob(blob)?;
            }
        }
        Ok(())
    }
}

fn check_write_once(
    prior: &ObjectState,
    next: &ObjectState,
    field: &str,
) -> Result<(), ValidationFailure> {
    match prior.field(field) {
        Some(old) if next.field(field) != Some(old) => Err(ValidationFailure::new(
            "write_once_violation",
            format!("{field} cannot change once set"),
        )),
        _ => Ok(()),
    }
}

/// Author's role in a payment that names its parties
fn author_role(state: &ObjectState, author: VaspId) -> Result<Role, ValidationFailure> {
    for role in [Role::Sender, Role::Receiver] {
        let raw = state.field(role.as_str()).unwrap_or_default();
        raw.parse::<VaspId>()
            .map_err(|e| ValidationFailure::new("invalid_party", format!("{role} {raw:?}: {e}")))?;
    }
    if state.field(SENDER) == state.field(RECEIVER) {
        return Err(ValidationFailure::new(
            "invalid_party",
            "sender and receiver must differ",
        ));
    }
    role_of(state, author).ok_or_else(|| {
        ValidationFailure::new("not_a_party", format!("{author} is neither sender nor receiver"))
    })
}

fn check_creation_roles(next: &ObjectState, author: VaspId) -> Result<(), ValidationFailure> {
    let role = author_role(next, author)?;
    let other = role.other();
    if let Some((key, _)) = next.fields.iter().find(|(key, _)| other.owns(key)) {
        return Err(ValidationFailure::new(
            "foreign_role_change",
            format!("{role} cannot set {key}"),
        ));
    }
    check_role_status(role, ObjectStatus::None, role.status(next)?, ObjectStatus::None)
}

/// Returns whether the author's counterparty role has aborted
fn check_update_roles(
    prior: &ObjectState,
    next: &ObjectState,
    author: VaspId,
) -> Result<bool, ValidationFailure> {
    let role = author_role(prior, author)?;
    let other = role.other();
    let theirs = |state: &ObjectState| -> Vec<(String, String)> {
        state
            .fields
            .iter()
            .filter(|(key, _)| other.owns(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    };
    if theirs(prior) != theirs(next) {
        return Err(ValidationFailure::new(
            "foreign_role_change",
            format!("cannot change {other} information"),
        ));
    }

    let other_status = other.status(prior)?;
    check_role_status(role, role.status(prior)?, role.status(next)?, other_status)?;
    check_write_once(prior, next, &role.kyc_field())?;
    Ok(other_status == ObjectStatus::Abort)
}

fn check_role_status(
    role: Role,
    old: ObjectStatus,
    new: ObjectStatus,
    other: ObjectStatus,
) -> Result<(), ValidationFailure> {
    if role == Role::Receiver && new == ObjectStatus::NeedsRecipientSignature {
        return Err(ValidationFailure::new(
            "receiver_cannot_sign",
            format!("receiver cannot be in {new}"),
        ));
    }
    if old == ObjectStatus::Abort && new != ObjectStatus::Abort {
        return Err(ValidationFailure::new(
            "status_regression",
            format!("{role}: {old} -> {new}"),
        ));
    }
    if new == ObjectStatus::Abort {
        if old.past_finality_barrier() && other != ObjectStatus::Abort {
            return Err(ValidationFailure::new(
                "abort_after_finality",
                format!("{role} cannot unilaterally abort once {old}"),
            ));
        }
        return Ok(());
    }
    if new.height() < old.height() {
        return Err(ValidationFailure::new(
            "status_regression",
            format!("{role}: {old} -> {new}"),
        ));
    }
    Ok(())
}

fn check_status(
    old: ObjectStatus,
    new: ObjectStatus,
    other_aborted: bool,
) -> Result<(), ValidationFailure> {
    if new == ObjectStatus::Abort {
        if old.past_finality_barrier() && !other_aborted {
            return Err(ValidationFailure::new(
                "abort_after_finality",
                format!("cannot abort once {old}"),
            ));
        }
        return Ok(());
    }
    if new.height() < old.height() {
        return Err(ValidationFailure::new(
            "status_regression",
            format!("{old} -> {new}"),
        ));
    }
    Ok(())
}

fn check_kyc_blob(blob: &str) -> Result<(), ValidationFailure> {
    let value: serde_json::Value = serde_json::from_str(blob)
        .map_err(|e| ValidationFailure::new("kyc_data_invalid", e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| ValidationFailure::new("kyc_data_invalid", "kyc_data must be a JSON object"))?;
    for required in ["payment_reference_id", "type"] {
        if !object.contains_key(required) {
            return Err(ValidationFailure::new(
                "kyc_data_invalid",
                format!("missing field {required}"),
            ));
        }
    }
    Ok(())
}
