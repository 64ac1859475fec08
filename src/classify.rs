use std::collections::BTreeMap;

use geo::{GeodesicDistance, Point};
use serde::Deserialize;
use typed_floats::tf64::NonNaN;

use crate::{
    model::{CatalogEntry, CatalogId, CrawlId, Observation},
    utils::progress_bar,
};

/// Match strength, weakest first. Within one candidate scan a stronger tier
/// always wins over a weaker one, regardless of encounter order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    New,
    MaybeFar,
    MaybeNear,
    Exist,
}

/// Distance bands in metres, inclusive upper bounds.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Bands {
    pub exist: NonNaN,
    pub maybe_near: NonNaN,
    pub maybe_far: NonNaN,
}

impl Default for Bands {
    fn default() -> Self {
        Self {
            exist: NonNaN::new(10.0).unwrap(),
            maybe_near: NonNaN::new(20.0).unwrap(),
            maybe_far: NonNaN::new(50.0).unwrap(),
        }
    }
}

impl Bands {
    pub fn tier(&self, distance: f64) -> Tier {
        // a NaN distance fails every comparison and falls through to New
        if distance <= f64::from(self.exist) {
            Tier::Exist
        } else if distance <= f64::from(self.maybe_near) {
            Tier::MaybeNear
        } else if distance <= f64::from(self.maybe_far) {
            Tier::MaybeFar
        } else {
            Tier::New
        }
    }

    /// Sheet label for a tier, derived from the configured thresholds.
    pub fn label(&self, tier: Tier) -> String {
        let exist = f64::from(self.exist);
        let near = f64::from(self.maybe_near);
        let far = f64::from(self.maybe_far);
        match tier {
            Tier::Exist => format!("< {exist}m"),
            Tier::MaybeNear => format!("{exist}m - {near}m"),
            Tier::MaybeFar => format!("{near}m - {far}m"),
            Tier::New => format!("> {far}m"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Match {
    pub catalog: CatalogId,
    pub distance: f64,
}

#[derive(Clone, Debug)]
pub struct ClassificationResult {
    pub row: u32,
    pub id: CrawlId,
    pub tier: Tier,
    pub matches: Vec<Match>,
}

/// Scan state: the strongest tier seen so far plus the matches accumulated at
/// that tier only. Tier transitions are one-directional toward strength.
struct Scan {
    tier: Tier,
    matches: Vec<Match>,
}

impl Scan {
    fn new() -> Self {
        Self {
            tier: Tier::New,
            matches: Vec::new(),
        }
    }

    fn observe(&mut self, tier: Tier, catalog: CatalogId, distance: f64) {
        if tier == Tier::New || tier < self.tier {
            return;
        }
        if tier > self.tier {
            // weaker-tier matches no longer apply
            self.tier = tier;
            self.matches.clear();
        }
        self.matches.push(Match { catalog, distance });
    }
}

pub fn classify(
    observation: &Observation,
    candidates: &[CatalogEntry],
    bands: &Bands,
) -> ClassificationResult {
    let mut scan = Scan::new();
    for candidate in candidates {
        let distance = observation.point.geodesic_distance(&candidate.point);
        scan.observe(bands.tier(distance), candidate.id, distance);
    }

    ClassificationResult {
        row: observation.row,
        id: observation.id,
        tier: scan.tier,
        matches: scan.matches,
    }
}

/// Classifies every observation against the full candidate set, grouped by
/// tier with row order preserved within each group.
pub fn classify_batch(
    observations: &[Observation],
    candidates: &[CatalogEntry],
    bands: &Bands,
) -> BTreeMap<Tier, Vec<ClassificationResult>> {
    let pb = progress_bar(observations.len() as u64);
    let mut groups: BTreeMap<Tier, Vec<ClassificationResult>> = BTreeMap::new();
    for observation in observations {
        let result = classify(observation, candidates, bands);
        if let Some(group) = groups.get_mut(&result.tier) {
            group.push(result);
        } else {
            groups.insert(result.tier, vec![result]);
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    groups
}

/// True when the point is farther than `min` metres from every catalog entry.
pub fn separated(point: &Point, candidates: &[CatalogEntry], min: f64) -> bool {
    candidates
        .iter()
        .all(|x| point.geodesic_distance(&x.point) > min)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    const LAT: f64 = 34.6937;
    const LNG: f64 = 135.5023;

    // at this latitude one degree of latitude is roughly 110.9km, so an
    // offset of 0.00004 is ~4.4m, 0.00012 ~13.3m, 0.00035 ~38.8m
    fn observation(row: u32, lat: f64, lng: f64) -> Observation {
        Observation {
            row,
            id: CrawlId(1),
            point: Point::new(lng, lat),
            attrs: BTreeMap::new(),
        }
    }

    fn entry(id: u32, lat: f64, lng: f64) -> CatalogEntry {
        CatalogEntry {
            id: CatalogId(id),
            city: 27102,
            point: Point::new(lng, lat),
            attrs: BTreeMap::new(),
        }
    }

    #[test]
    fn distance_is_symmetric_and_zero_on_itself() {
        let a = Point::new(LNG, LAT);
        let b = Point::new(LNG + 0.01, LAT - 0.02);
        assert_eq!(a.geodesic_distance(&b), b.geodesic_distance(&a));
        assert!(a.geodesic_distance(&a).abs() < 1e-6);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111km() {
        let a = Point::new(LNG, LAT);
        let b = Point::new(LNG, LAT + 1.0);
        let d = a.geodesic_distance(&b);
        assert!((110_000.0..112_000.0).contains(&d), "{d}");
    }

    #[test]
    fn band_boundaries_are_inclusive() {
        let bands = Bands::default();
        assert_eq!(bands.tier(0.0), Tier::Exist);
        assert_eq!(bands.tier(10.0), Tier::Exist);
        assert_eq!(bands.tier(10.5), Tier::MaybeNear);
        assert_eq!(bands.tier(20.0), Tier::MaybeNear);
        assert_eq!(bands.tier(50.0), Tier::MaybeFar);
        assert_eq!(bands.tier(50.5), Tier::New);
        assert_eq!(bands.tier(f64::NAN), Tier::New);
    }

    #[test]
    fn labels_follow_thresholds() {
        let bands = Bands::default();
        assert_eq!(bands.label(Tier::Exist), "< 10m");
        assert_eq!(bands.label(Tier::MaybeNear), "10m - 20m");
        assert_eq!(bands.label(Tier::MaybeFar), "20m - 50m");
        assert_eq!(bands.label(Tier::New), "> 50m");
    }

    #[test]
    fn no_candidates_classifies_as_new() {
        let result = classify(&observation(2, LAT, LNG), &[], &Bands::default());
        assert_eq!(result.tier, Tier::New);
        assert!(result.matches.is_empty());
    }

    #[test]
    fn identical_location_is_an_exact_match() {
        let result = classify(
            &observation(2, LAT, LNG),
            &[entry(1, LAT, LNG)],
            &Bands::default(),
        );
        assert_eq!(result.tier, Tier::Exist);
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].catalog, CatalogId(1));
        assert!(result.matches[0].distance < 1e-6);
    }

    #[test]
    fn middle_bands_classify_as_maybe() {
        let bands = Bands::default();
        let near = classify(
            &observation(2, LAT, LNG),
            &[entry(1, LAT + 0.00012, LNG)],
            &bands,
        );
        assert_eq!(near.tier, Tier::MaybeNear);

        let far = classify(
            &observation(2, LAT, LNG),
            &[entry(1, LAT + 0.00035, LNG)],
            &bands,
        );
        assert_eq!(far.tier, Tier::MaybeFar);
    }

    #[test]
    fn stronger_tier_is_never_downgraded() {
        // ~4.4m then ~38.8m: the later weaker hit must not touch the result
        let candidates = vec![entry(1, LAT + 0.00004, LNG), entry(2, LAT + 0.00035, LNG)];
        let result = classify(&observation(2, LAT, LNG), &candidates, &Bands::default());
        assert_eq!(result.tier, Tier::Exist);
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].catalog, CatalogId(1));
    }

    #[test]
    fn upgrade_discards_weaker_matches() {
        let candidates = vec![entry(1, LAT + 0.00035, LNG), entry(2, LAT + 0.00004, LNG)];
        let result = classify(&observation(2, LAT, LNG), &candidates, &Bands::default());
        assert_eq!(result.tier, Tier::Exist);
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].catalog, CatalogId(2));
    }

    #[test]
    fn same_tier_ties_are_kept_in_scan_order() {
        let a = entry(1, LAT + 0.00004, LNG);
        let b = entry(2, LAT + 0.00005, LNG);

        let result = classify(
            &observation(2, LAT, LNG),
            &[a.clone(), b.clone()],
            &Bands::default(),
        );
        assert_eq!(result.tier, Tier::Exist);
        let ids: Vec<_> = result.matches.iter().map(|x| x.catalog).collect();
        assert_eq!(ids, vec![CatalogId(1), CatalogId(2)]);

        // reordering same-tier candidates never changes the tier
        let reversed = classify(&observation(2, LAT, LNG), &[b, a], &Bands::default());
        assert_eq!(reversed.tier, Tier::Exist);
        let ids: Vec<_> = reversed.matches.iter().map(|x| x.catalog).collect();
        assert_eq!(ids, vec![CatalogId(2), CatalogId(1)]);
    }

    #[test]
    fn batch_groups_preserve_row_order() {
        let candidates = vec![entry(1, LAT, LNG)];
        let observations = vec![
            observation(2, LAT, LNG),
            observation(3, LAT + 0.01, LNG),
            observation(4, LAT, LNG),
        ];
        let groups = classify_batch(&observations, &candidates, &Bands::default());
        assert_eq!(groups.len(), 2);

        let rows: Vec<_> = groups[&Tier::Exist].iter().map(|x| x.row).collect();
        assert_eq!(rows, vec![2, 4]);
        let rows: Vec<_> = groups[&Tier::New].iter().map(|x| x.row).collect();
        assert_eq!(rows, vec![3]);
    }

    #[test]
    fn separated_requires_clearance_from_every_entry() {
        let candidates = vec![entry(1, LAT, LNG), entry(2, LAT + 0.01, LNG)];
        let near = Point::new(LNG, LAT + 0.00025); // ~28m from entry 1
        let far = Point::new(LNG, LAT + 0.0005); // ~55m from entry 1
        assert!(!separated(&near, &candidates, 30.0));
        assert!(separated(&far, &candidates, 30.0));
        assert!(separated(&near, &[], 30.0));
    }
}
