use std::sync::Arc;

use crate::client::PriceClient;
use crate::error::{AppError, Result};

/// Index of the credential serving a window. The single job always uses 1.
pub type CredentialIndex = u8;

/// Which client serves each window.
pub enum CredentialStrategy {
    /// One client for every window.
    Constant(Arc<dyn PriceClient>),
    /// Two clients taking turns, window by window, starting with `first`.
    /// The turn passes after every window whether or not it succeeded.
    Alternating {
        first: Arc<dyn PriceClient>,
        second: Arc<dyn PriceClient>,
    },
}

impl CredentialStrategy {
    pub const FIRST: CredentialIndex = 1;

    /// Fail fast on the first client without a key, in credential order.
    pub fn validate(&self) -> Result<()> {
        let clients: Vec<&Arc<dyn PriceClient>> = match self {
            CredentialStrategy::Constant(c) => vec![c],
            CredentialStrategy::Alternating { first, second } => vec![first, second],
        };
        match clients.iter().find(|c| !c.has_credential()) {
            Some(missing) => Err(AppError::MissingCredential(missing.slot())),
            None => Ok(()),
        }
    }

    pub fn client_for(&self, index: CredentialIndex) -> &Arc<dyn PriceClient> {
        match self {
            CredentialStrategy::Constant(c) => c,
            CredentialStrategy::Alternating { first, second } => {
                if index == 2 {
                    second
                } else {
                    first
                }
            }
        }
    }

    pub fn next_after(&self, index: CredentialIndex) -> CredentialIndex {
        match self {
            CredentialStrategy::Constant(_) => Self::FIRST,
            CredentialStrategy::Alternating { .. } => {
                if index == 1 {
                    2
                } else {
                    1
                }
            }
        }
    }

    pub fn is_alternating(&self) -> bool {
        matches!(self, CredentialStrategy::Alternating { .. })
    }
}

/// What a failed window leaves behind in the status snapshot. Both policies
/// count failures and log them; only `Recorded` keeps the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Silent,
    Recorded,
}
