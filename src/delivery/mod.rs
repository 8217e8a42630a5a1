//! Message delivery: recipient validation and the group/individual fallback controller.
//!
//! Everything here is request-scoped. A [`DeliveryRequest`] goes in, a single
//! [`DeliveryOutcome`] or [`DeliveryError`] comes out.

use serde::{Deserialize, Serialize};

pub mod controller;
pub mod validator;

pub use controller::DeliveryController;
pub use validator::{validate, Addressee};

/// Input to [`DeliveryController::deliver`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryRequest {
    /// Message text, forwarded verbatim.
    pub message: String,
    /// Request-supplied addressees. Empty means "use the configured default".
    pub addressees: Vec<String>,
    /// Substring used to locate an existing group conversation.
    pub conversation_hint: Option<String>,
}

impl DeliveryRequest {
    /// Request targeting individual addressees only.
    pub fn individual(message: impl Into<String>, addressees: Vec<String>) -> Self {
        Self {
            message: message.into(),
            addressees,
            conversation_hint: None,
        }
    }

    /// Request targeting a group conversation, with `addressees` as fallback.
    pub fn group(
        message: impl Into<String>,
        addressees: Vec<String>,
        conversation_hint: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            addressees,
            conversation_hint: Some(conversation_hint.into()),
        }
    }
}

/// A single addressee whose send failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    /// The addressee the send targeted.
    pub addressee: String,
    /// Short failure reason reported by the backend.
    pub reason: String,
}

/// Successful result of a delivery call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The message reached the group conversation matched by the hint.
    GroupDelivered {
        /// Hint that matched the conversation.
        conversation_hint: String,
    },
    /// The message was fanned out to individual addressees; at least one succeeded.
    IndividualDelivered {
        /// Addressees the message was attempted for, in request order.
        addressees: Vec<Addressee>,
        /// Number of successful sends.
        succeeded: usize,
        /// Number of failed sends.
        failed: usize,
        /// Per-addressee failure detail, in addressee order.
        failures: Vec<DeliveryFailure>,
        /// Set when this pass ran as a fallback from a failed group send.
        fallback_from: Option<String>,
    },
}

impl DeliveryOutcome {
    /// `"group"` or `"individual"`.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::GroupDelivered { .. } => "group",
            Self::IndividualDelivered { .. } => "individual",
        }
    }
}

/// Classified failure of a delivery call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The message was empty or absent.
    #[error("Message payload is required")]
    MissingMessage,

    /// Validation was invoked on an empty addressee list.
    #[error("at least one phone number is required")]
    EmptyAddresseeList,

    /// One or more addressees do not match the E.164 format.
    #[error("invalid phone number format: {}", offending.join(", "))]
    InvalidAddressees {
        /// Every entry that failed validation, as supplied.
        offending: Vec<String>,
    },

    /// No conversation hint and no addressees from the request or the default list.
    #[error(
        "Phone numbers are required when no groupKeyword is provided. Provide them in the \
         request body or set PHONE_NUMBERS environment variable."
    )]
    AddresseesRequired,

    /// Group delivery failed and there was nobody to fall back to.
    #[error(
        "group chat \"{conversation_hint}\" not found and no phone numbers available for fallback"
    )]
    GroupNotFoundNoFallback {
        /// The hint that matched nothing.
        conversation_hint: String,
    },

    /// Every individual send failed.
    #[error("failed to send to any recipients ({} attempted)", failures.len())]
    AllDeliveriesFailed {
        /// One entry per attempted addressee.
        failures: Vec<DeliveryFailure>,
    },

    /// Unclassified backend failure.
    #[error("messaging backend error: {0}")]
    Backend(String),
}

impl DeliveryError {
    /// Whether the error was caused by the caller's input rather than delivery.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingMessage
                | Self::EmptyAddresseeList
                | Self::InvalidAddressees { .. }
                | Self::AddresseesRequired
        )
    }
}
