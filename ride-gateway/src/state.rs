use std::sync::Arc;

use geo_index::GeoIndex;
use ride_auth::Authenticator;
use ride_billing::Biller;
use ride_core::RideCore;
use session_task::ShutdownSignal;

use crate::entities::EntityTable;

/// Shared handles every HTTP/WS handler is wired against.
#[derive(Clone)]
pub struct AppState {
    pub rides: Arc<RideCore>,
    pub drivers: Arc<EntityTable>,
    pub passengers: Arc<EntityTable>,
    pub geo: Arc<dyn GeoIndex>,
    pub auth: Arc<dyn Authenticator>,
    pub biller: Biller,
    pub shutdown_signal: ShutdownSignal,
}
