use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_core::{LotId, ProductId};

/// Lot (batch) master data, fed by inbound receipts.
///
/// Shelf life is optional: not every product is expiry-tracked. The pick
/// planner orders candidates by expiry only when every candidate lot
/// carries one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDetails {
    pub lot_id: LotId,
    pub product_id: ProductId,
    pub expires_at: Option<DateTime<Utc>>,
}
