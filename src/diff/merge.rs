use crate::db::models::{DiffRegion, RegionType};

/// Union regions whose boxes overlap once each is grown by `margin`, until a
/// full pass merges nothing. Running it again on its own output is a no-op.
pub fn merge_regions(mut regions: Vec<DiffRegion>, margin: u32) -> Vec<DiffRegion> {
    loop {
        let mut merged = false;
        let mut result: Vec<DiffRegion> = Vec::with_capacity(regions.len());

        for region in regions {
            match result.iter_mut().find(|kept| near(kept, &region, margin)) {
                Some(kept) => {
                    *kept = union(kept, &region);
                    merged = true;
                }
                None => result.push(region),
            }
        }

        regions = result;

        if !merged {
            break;
        }
    }

    regions
}

fn near(a: &DiffRegion, b: &DiffRegion, margin: u32) -> bool {
    let m = i64::from(margin);
    let (ax0, ay0) = (i64::from(a.x) - m, i64::from(a.y) - m);
    let (ax1, ay1) = (i64::from(a.right()) + m, i64::from(a.bottom()) + m);
    let (bx0, by0) = (i64::from(b.x) - m, i64::from(b.y) - m);
    let (bx1, by1) = (i64::from(b.right()) + m, i64::from(b.bottom()) + m);

    ax0 < bx1 && ax1 > bx0 && ay0 < by1 && ay1 > by0
}

fn union(a: &DiffRegion, b: &DiffRegion) -> DiffRegion {
    let x = a.x.min(b.x);
    let y = a.y.min(b.y);
    let right = a.right().max(b.right());
    let bottom = a.bottom().max(b.bottom());

    DiffRegion {
        x,
        y,
        width: right - x,
        height: bottom - y,
        region_type: if a.region_type == b.region_type {
            a.region_type
        } else {
            RegionType::Changed
        },
        confidence: a.confidence.min(b.confidence),
    }
}
