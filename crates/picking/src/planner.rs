//! Pick planning: split order lines across candidate locations.
//!
//! For each line, candidate (location, lot) holdings of the product are
//! ranked by ascending remaining shelf life when every candidate lot carries
//! an expiry, otherwise by ascending quantity-on-hand (small holdings first,
//! which consolidates part-filled locations). Ties always break on location
//! id, then lot id, so plans are deterministic. The requested quantity is
//! split greedily; an uncoverable remainder marks the line short instead of
//! failing the whole order.

use depot_core::{DomainResult, LocationId, LotId, ProductId, ZoneId};
use depot_ledger::StockCandidate;
use depot_outbound::OutboundLine;

/// One planned withdrawal for a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPick {
    pub location_id: LocationId,
    pub zone_id: ZoneId,
    pub product_id: ProductId,
    pub lot_id: LotId,
    pub quantity: i64,
}

/// The plan for one order line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinePlan {
    pub line_no: u32,
    pub product_id: ProductId,
    pub picks: Vec<PlannedPick>,
    /// Units the available stock could not cover.
    pub shortfall: i64,
}

/// Plan a single line against its candidate stock.
///
/// `zone_of` resolves each chosen location's zone for the later walk
/// sequencing; candidates are consumed greedily in rank order.
pub fn plan_line(
    line: &OutboundLine,
    mut candidates: Vec<StockCandidate>,
    zone_of: impl Fn(&LocationId) -> DomainResult<ZoneId>,
) -> DomainResult<LinePlan> {
    rank_candidates(&mut candidates);

    let mut remaining = line.required_qty;
    let mut picks = Vec::new();
    for candidate in candidates {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(candidate.available);
        if take == 0 {
            continue;
        }
        let zone_id = zone_of(&candidate.location_id)?;
        picks.push(PlannedPick {
            location_id: candidate.location_id,
            zone_id,
            product_id: line.product_id,
            lot_id: candidate.lot_id,
            quantity: take,
        });
        remaining -= take;
    }

    Ok(LinePlan {
        line_no: line.line_no,
        product_id: line.product_id,
        picks,
        shortfall: remaining,
    })
}

/// Order tasks zone-by-zone to minimize zone transitions, keeping the
/// per-line candidate order within each zone (stable sort on zone id).
pub fn sequence_by_zone(picks: &mut [(u32, PlannedPick)]) {
    picks.sort_by(|a, b| a.1.zone_id.cmp(&b.1.zone_id));
}

fn rank_candidates(candidates: &mut [StockCandidate]) {
    let all_expiry_tracked =
        !candidates.is_empty() && candidates.iter().all(|c| c.expires_at.is_some());
    if all_expiry_tracked {
        candidates.sort_by(|a, b| {
            (a.expires_at, &a.location_id, &a.lot_id).cmp(&(b.expires_at, &b.location_id, &b.lot_id))
        });
    } else {
        candidates.sort_by(|a, b| {
            (a.available, &a.location_id, &a.lot_id).cmp(&(b.available, &b.location_id, &b.lot_id))
        });
    }
}
