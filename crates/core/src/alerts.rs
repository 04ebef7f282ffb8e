//! Notification gateway for monitor alerts.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use tracing::{error, info, warn};

use crate::health::HealthClass;
use crate::position::PositionId;

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Liquidation,
}

impl Severity {
    /// Severity for a health class; safe positions raise nothing.
    pub fn for_class(class: HealthClass) -> Option<Self> {
        match class {
            HealthClass::Safe => None,
            HealthClass::AtRisk => Some(Self::Warning),
            HealthClass::Critical => Some(Self::Critical),
            HealthClass::Liquidatable => Some(Self::Liquidation),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Liquidation => "liquidation",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound alert channel. Fire-and-forget: delivery is the gateway's concern.
pub trait NotificationGateway: Send + Sync + Debug {
    fn notify(&self, position_id: PositionId, severity: Severity, message: &str);
}

/// Gateway that writes alerts as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationGateway for TracingNotifier {
    fn notify(&self, position_id: PositionId, severity: Severity, message: &str) {
        match severity {
            Severity::Info => info!(position = %position_id, %severity, "{}", message),
            Severity::Warning => warn!(position = %position_id, %severity, "{}", message),
            Severity::Critical | Severity::Liquidation => {
                error!(position = %position_id, %severity, "{}", message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_for_class() {
        assert_eq!(Severity::for_class(HealthClass::Safe), None);
        assert_eq!(Severity::for_class(HealthClass::AtRisk), Some(Severity::Warning));
        assert_eq!(Severity::for_class(HealthClass::Liquidatable), Some(Severity::Liquidation));
        assert!(Severity::Liquidation > Severity::Warning);
    }

    #[test]
    fn test_tracing_notifier_accepts_all_severities() {
        let notifier = TracingNotifier;
        for severity in [Severity::Info, Severity::Warning, Severity::Critical, Severity::Liquidation] {
            notifier.notify(PositionId(1), severity, "health check");
        }
    }
}
