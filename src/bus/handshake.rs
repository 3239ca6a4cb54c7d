// SPDX-License-Identifier: MIT
//! One-time registration exchange with the policy manager.
//!
//! Registration installs the inbound match rule first, then announces the
//! enforcement point; if either step fails the caller must not proceed to
//! accept decisions. Unregistration mirrors it best-effort with a bounded
//! wait so teardown never hangs on an unreachable manager.

use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use super::{
    BusConnection, BusError, ADD_MATCH_METHOD, POLICY_SCOPE, REGISTER_METHOD,
    REMOVE_MATCH_METHOD, UNREGISTER_METHOD,
};

/// Bound on the unregister round trip.
pub const UNREGISTER_TIMEOUT: Duration = Duration::from_secs(1);

/// Install the decision match rule and register with the manager.
/// Fatal on failure of either step.
pub async fn register(
    bus: &mut BusConnection,
    name: &str,
    capabilities: &[String],
) -> Result<(), BusError> {
    bus.call(ADD_MATCH_METHOD, json!({ "scope": POLICY_SCOPE }), None)
        .await?;
    bus.call(
        REGISTER_METHOD,
        json!({ "name": name, "capabilities": capabilities }),
        None,
    )
    .await?;
    info!(name, ?capabilities, "registered with policy manager");
    Ok(())
}

/// Remove the match rule and announce departure, waiting at most
/// [`UNREGISTER_TIMEOUT`] for the manager to answer.
pub async fn unregister(bus: &mut BusConnection) -> Result<(), BusError> {
    if let Err(e) = bus
        .call(
            REMOVE_MATCH_METHOD,
            json!({ "scope": POLICY_SCOPE }),
            Some(UNREGISTER_TIMEOUT),
        )
        .await
    {
        warn!(err = %e, "match rule removal failed — continuing to unregister");
    }

    bus.call(UNREGISTER_METHOD, json!({}), Some(UNREGISTER_TIMEOUT))
        .await?;
    info!("unregistered from policy manager");
    Ok(())
}
