use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::{Card, CardRfid, Charger, ChargerId};
use crate::domain::station::Location;

/// Read side of the charging network: public station lookups and account
/// session factory.
#[async_trait]
pub trait RechargeApi: Send + Sync + 'static {
    async fn location_by_id(&self, charger_id: &ChargerId) -> Result<Location, RechargeApiError>;

    async fn get_user(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Arc<dyn AccountSession>, RechargeApiError>;
}

/// Account-bound operations. A session must be authenticated before any
/// other call succeeds.
#[async_trait]
pub trait AccountSession: Send + Sync + 'static {
    async fn authenticate(&self) -> Result<(), RechargeApiError>;
    async fn get_cards(&self) -> Result<Vec<Card>, RechargeApiError>;
    async fn get_chargers(&self) -> Result<Vec<Charger>, RechargeApiError>;
    async fn toggle_charger(
        &self,
        charger_id: &ChargerId,
        card_rfid: &CardRfid,
        on: bool,
    ) -> Result<(), RechargeApiError>;
    async fn start_charging(&self) -> Result<(), RechargeApiError>;
    async fn stop_charging(&self) -> Result<(), RechargeApiError>;
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RechargeApiError {
    #[error("no location found for charger {0}")]
    LocationEmpty(ChargerId),
    #[error("location payload for charger {charger_id} is invalid: {reason}")]
    LocationValidation { charger_id: ChargerId, reason: String },
    #[error("request timed out")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("credentials rejected")]
    Unauthorized,
    #[error("session is not authenticated")]
    NotAuthenticated,
    #[error("unexpected response status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl RechargeApiError {
    /// Failures a station refresh logs and rides out with the cached reading.
    pub fn is_transient_fetch(&self) -> bool {
        matches!(
            self,
            Self::LocationEmpty(_) | Self::Cancelled | Self::Timeout
        )
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout | Self::Cancelled)
    }
}

impl From<reqwest::Error> for RechargeApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else if let Some(status) = error.status() {
            Self::Status {
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else {
            Self::Connection(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::models::ChargerId;

    use super::RechargeApiError;

    #[test]
    fn only_empty_location_cancellation_and_timeout_are_transient() {
        assert!(RechargeApiError::LocationEmpty(ChargerId::new("c-1")).is_transient_fetch());
        assert!(RechargeApiError::Cancelled.is_transient_fetch());
        assert!(RechargeApiError::Timeout.is_transient_fetch());

        assert!(!RechargeApiError::Connection("refused".to_string()).is_transient_fetch());
        assert!(
            !RechargeApiError::LocationValidation {
                charger_id: ChargerId::new("c-1"),
                reason: "missing uid".to_string(),
            }
            .is_transient_fetch()
        );
        assert!(
            !RechargeApiError::Status {
                status: 500,
                message: "boom".to_string(),
            }
            .is_transient_fetch()
        );
    }

    #[test]
    fn connectivity_covers_connection_timeout_and_cancellation() {
        assert!(RechargeApiError::Connection("reset".to_string()).is_connectivity());
        assert!(RechargeApiError::Timeout.is_connectivity());
        assert!(RechargeApiError::Cancelled.is_connectivity());
        assert!(!RechargeApiError::Unauthorized.is_connectivity());
    }

    #[test]
    fn names_charger_in_empty_location_message() {
        let err = RechargeApiError::LocationEmpty(ChargerId::new("NL*TNM*E01"));
        assert_eq!(err.to_string(), "no location found for charger NL*TNM*E01");
    }
}
