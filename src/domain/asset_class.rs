//! Asset classes (ilks): independent interest-rate schedules.

use super::primitives::{AssetClassId, IlkType, Timestamp};
use serde::{Deserialize, Serialize};

/// A collateral/debt category with its own stability fee schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetClass {
    pub id: AssetClassId,
    pub ilk_type: IlkType,
    /// Instant at which the cumulative index is exactly 1.0. Unknown until the
    /// chain's initialization event has been backfilled.
    pub epoch_start: Option<Timestamp>,
}

impl AssetClass {
    pub fn new(id: AssetClassId, ilk_type: IlkType, epoch_start: Option<Timestamp>) -> Self {
        Self {
            id,
            ilk_type,
            epoch_start,
        }
    }
}
