//! Group-first delivery with fallback to per-recipient fan-out.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::validator::{self, Addressee};
use super::{DeliveryError, DeliveryFailure, DeliveryOutcome, DeliveryRequest};
use crate::backend::{ConversationError, MessagingBackend};

/// Which group-send failures trigger the individual fallback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Fall back only when no conversation matched the hint.
    #[default]
    NotFound,
    /// Fall back on any group-send failure.
    AnyError,
}

impl FallbackPolicy {
    fn allows(self, err: &ConversationError) -> bool {
        match self {
            Self::NotFound => err.is_not_found(),
            Self::AnyError => true,
        }
    }
}

impl std::str::FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "not_found" | "not-found" => Ok(Self::NotFound),
            "any_error" | "any-error" | "any" => Ok(Self::AnyError),
            other => Err(format!("unknown fallback policy: {other}")),
        }
    }
}

/// Decides between group and individual delivery and aggregates results.
///
/// Holds no per-request state; one instance serves all concurrent requests.
#[derive(Clone)]
pub struct DeliveryController {
    backend: Arc<dyn MessagingBackend>,
    default_addressees: Vec<String>,
    fallback_policy: FallbackPolicy,
}

impl DeliveryController {
    /// Create a controller with no default addressees and the default policy.
    pub fn new(backend: Arc<dyn MessagingBackend>) -> Self {
        Self {
            backend,
            default_addressees: Vec::new(),
            fallback_policy: FallbackPolicy::default(),
        }
    }

    /// Addressees used when a request supplies none.
    #[must_use]
    pub fn with_default_addressees(mut self, addressees: Vec<String>) -> Self {
        self.default_addressees = addressees;
        self
    }

    /// Override the group fallback policy.
    #[must_use]
    pub fn with_fallback_policy(mut self, policy: FallbackPolicy) -> Self {
        self.fallback_policy = policy;
        self
    }

    /// Configured default addressees.
    pub fn default_addressees(&self) -> &[String] {
        &self.default_addressees
    }

    /// Deliver one message.
    ///
    /// # Errors
    ///
    /// Input errors ([`DeliveryError::MissingMessage`],
    /// [`DeliveryError::InvalidAddressees`], [`DeliveryError::AddresseesRequired`])
    /// are returned before anything is sent. Delivery errors are returned only
    /// when no recipient could be reached.
    pub async fn deliver(
        &self,
        request: &DeliveryRequest,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        if request.message.is_empty() {
            return Err(DeliveryError::MissingMessage);
        }

        let addressees = self.resolve_addressees(&request.addressees)?;

        let Some(hint) = request.conversation_hint.as_deref() else {
            if addressees.is_empty() {
                return Err(DeliveryError::AddresseesRequired);
            }
            info!(recipients = addressees.len(), "sending individual messages");
            return self
                .deliver_individually(addressees, &request.message, None)
                .await;
        };

        info!(hint, "attempting group chat delivery");
        let err = match self
            .backend
            .send_to_conversation(hint, &request.message)
            .await
        {
            Ok(()) => {
                info!(hint, "delivered to group chat");
                return Ok(DeliveryOutcome::GroupDelivered {
                    conversation_hint: hint.to_owned(),
                });
            }
            Err(err) => err,
        };

        if !self.fallback_policy.allows(&err) {
            warn!(hint, error = %err, "group chat send failed, fallback not permitted");
            return Err(DeliveryError::Backend(err.to_string()));
        }
        if addressees.is_empty() {
            warn!(hint, error = %err, "group chat send failed, no recipients to fall back to");
            return Err(DeliveryError::GroupNotFoundNoFallback {
                conversation_hint: hint.to_owned(),
            });
        }

        info!(
            hint,
            recipients = addressees.len(),
            error = %err,
            "group chat send failed, falling back to individual messages"
        );
        self.deliver_individually(addressees, &request.message, Some(hint))
            .await
    }

    /// Pick request addressees, else defaults, and validate whatever was picked.
    fn resolve_addressees(&self, requested: &[String]) -> Result<Vec<Addressee>, DeliveryError> {
        let source = if !requested.is_empty() {
            debug!(count = requested.len(), "using addressees from request");
            requested
        } else if !self.default_addressees.is_empty() {
            debug!(
                count = self.default_addressees.len(),
                "using default addressees"
            );
            &self.default_addressees
        } else {
            return Ok(Vec::new());
        };
        validator::validate(source)
    }

    /// Send to every addressee concurrently and wait for all of them.
    async fn deliver_individually(
        &self,
        addressees: Vec<Addressee>,
        message: &str,
        fallback_from: Option<&str>,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let sends = addressees.iter().map(|addressee| async move {
            let result = self
                .backend
                .send_to_addressee(addressee.as_str(), message)
                .await;
            (addressee, result)
        });
        let results = join_all(sends).await;

        let failures: Vec<DeliveryFailure> = results
            .into_iter()
            .filter_map(|(addressee, result)| {
                result.err().map(|e| {
                    warn!(addressee = %addressee, error = %e, "failed to send");
                    DeliveryFailure {
                        addressee: addressee.to_string(),
                        reason: e.to_string(),
                    }
                })
            })
            .collect();
        let failed = failures.len();
        let succeeded = addressees.len().saturating_sub(failed);

        info!(succeeded, failed, "individual delivery completed");

        if succeeded == 0 {
            return Err(DeliveryError::AllDeliveriesFailed { failures });
        }
        Ok(DeliveryOutcome::IndividualDelivered {
            addressees,
            succeeded,
            failed,
            failures,
            fallback_from: fallback_from.map(str::to_owned),
        })
    }
}
