//! The ride status transition graph.
//!
//! The source implementation never checked these guards; this is where the specification's
//! elevation of them to hard invariants lives. An operation attempted from a status outside its
//! permitted set is rejected before any write happens.

use ride_types::RideStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RideOperation {
    Accept,
    Deny,
    DriverAccept,
    DriverArrived,
    Complete,
    CancelPassenger,
    CancelDriver,
    Error,
    Delete,
}

impl RideOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            RideOperation::Accept => "accept",
            RideOperation::Deny => "deny",
            RideOperation::DriverAccept => "driver_accept",
            RideOperation::DriverArrived => "driver_arrived",
            RideOperation::Complete => "complete",
            RideOperation::CancelPassenger => "cancel_passenger",
            RideOperation::CancelDriver => "cancel_driver",
            RideOperation::Error => "error",
            RideOperation::Delete => "delete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "accept" => RideOperation::Accept,
            "deny" => RideOperation::Deny,
            "driver_accept" => RideOperation::DriverAccept,
            "driver_arrived" => RideOperation::DriverArrived,
            "complete" => RideOperation::Complete,
            "cancel_passenger" => RideOperation::CancelPassenger,
            "cancel_driver" => RideOperation::CancelDriver,
            "error" => RideOperation::Error,
            "delete" => RideOperation::Delete,
            _ => return None,
        })
    }

    /// The status this operation produces when permitted.
    pub fn target_status(self) -> RideStatus {
        match self {
            RideOperation::Accept => RideStatus::PassengerAccepted,
            RideOperation::Deny => RideStatus::PassengerDenied,
            RideOperation::DriverAccept => RideStatus::Matched,
            RideOperation::DriverArrived => RideStatus::PickingUp,
            RideOperation::Complete => RideStatus::PassengerDropped,
            RideOperation::CancelPassenger => RideStatus::PassengerCancelled,
            RideOperation::CancelDriver => RideStatus::DriverCancelled,
            RideOperation::Error => RideStatus::Errored,
            RideOperation::Delete => RideStatus::Deleted,
        }
    }

    /// Whether `from` is an allowed source status for this operation.
    pub fn is_permitted_from(self, from: RideStatus) -> bool {
        match self {
            RideOperation::Accept | RideOperation::Deny => from == RideStatus::Requested,
            RideOperation::DriverAccept => from == RideStatus::PassengerAccepted,
            RideOperation::DriverArrived => from == RideStatus::Matched,
            RideOperation::Complete => matches!(from, RideStatus::PickingUp | RideStatus::InTransit),
            RideOperation::CancelPassenger | RideOperation::CancelDriver => !from.is_terminal(),
            RideOperation::Error | RideOperation::Delete => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_only_permitted_from_requested() {
        assert!(RideOperation::Accept.is_permitted_from(RideStatus::Requested));
        assert!(!RideOperation::Accept.is_permitted_from(RideStatus::Matched));
    }

    #[test]
    fn complete_permitted_from_picking_up_or_in_transit_only() {
        assert!(RideOperation::Complete.is_permitted_from(RideStatus::PickingUp));
        assert!(RideOperation::Complete.is_permitted_from(RideStatus::InTransit));
        assert!(!RideOperation::Complete.is_permitted_from(RideStatus::Matched));
    }

    #[test]
    fn cancel_rejected_once_terminal() {
        assert!(!RideOperation::CancelPassenger.is_permitted_from(RideStatus::PassengerDropped));
        assert!(RideOperation::CancelPassenger.is_permitted_from(RideStatus::Matched));
    }

    #[test]
    fn error_and_delete_permitted_from_any_status() {
        for status in [RideStatus::Requested, RideStatus::PassengerDropped, RideStatus::Deleted] {
            assert!(RideOperation::Error.is_permitted_from(status));
            assert!(RideOperation::Delete.is_permitted_from(status));
        }
    }
}
