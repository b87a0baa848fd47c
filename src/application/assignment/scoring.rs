//! Candidate ranking

use std::cmp::Reverse;

use super::compatibility::{is_eligible, is_exact_match, preferred_features, provides_feature};
use crate::domain::{Spot, VehicleType};

/// An eligible spot with the facts it is ranked on
#[derive(Debug, Clone)]
pub struct Candidate {
    pub spot: Spot,
    /// Required plus preferred features the spot offers
    pub feature_matches: usize,
    pub exact_type: bool,
}

/// Filters to eligible spots and orders them best first: most feature
/// matches, exact type, then lowest floor, bay, spot number and id.
pub fn rank_candidates(
    spots: Vec<Spot>,
    vehicle_type: VehicleType,
    required_features: &[String],
) -> Vec<Candidate> {
    let mut wanted: Vec<&str> = required_features.iter().map(String::as_str).collect();
    for feature in preferred_features(vehicle_type) {
        if !wanted.contains(feature) {
            wanted.push(feature);
        }
    }

    let mut candidates: Vec<Candidate> = spots
        .into_iter()
        .filter(|spot| spot.is_available() && is_eligible(spot, vehicle_type, required_features))
        .map(|spot| Candidate {
            feature_matches: wanted.iter().filter(|f| provides_feature(&spot, f)).count(),
            exact_type: is_exact_match(vehicle_type, spot.spot_type, required_features),
            spot,
        })
        .collect();

    candidates.sort_by(|a, b| {
        let key = |c: &Candidate| {
            (
                Reverse(c.feature_matches),
                !c.exact_type,
                c.spot.floor,
                c.spot.bay.clone(),
                c.spot.spot_number,
                c.spot.id,
            )
        };
        key(a).cmp(&key(b))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewSpot, SpotStatus, SpotType};
    use chrono::Utc;

    fn sample_spot(id: i32, floor: i32, bay: &str, number: i32, spot_type: SpotType) -> Spot {
        NewSpot::new(1, floor, bay, number, spot_type).into_spot(id, Utc::now())
    }

    #[test]
    fn exact_type_beats_lower_floor() {
        let spots = vec![
            sample_spot(1, 1, "A", 1, SpotType::Standard),
            sample_spot(2, 3, "A", 1, SpotType::Compact),
        ];
        let ranked = rank_candidates(spots, VehicleType::Compact, &[]);
        assert_eq!(ranked[0].spot.id, 2);
        assert!(ranked[0].exact_type);
    }

    #[test]
    fn location_breaks_ties() {
        let spots = vec![
            sample_spot(1, 2, "A", 1, SpotType::Standard),
            sample_spot(2, 1, "B", 1, SpotType::Standard),
            sample_spot(3, 1, "A", 7, SpotType::Standard),
            sample_spot(4, 1, "A", 3, SpotType::Standard),
        ];
        let ids: Vec<i32> = rank_candidates(spots, VehicleType::Standard, &[])
            .into_iter()
            .map(|c| c.spot.id)
            .collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);
    }

    #[test]
    fn charging_spot_wins_for_electric_vehicle() {
        let plain = sample_spot(1, 1, "A", 1, SpotType::Electric);
        let charging = NewSpot::new(1, 2, "A", 1, SpotType::Standard)
            .with_features(["ev_charging"])
            .into_spot(2, Utc::now());
        let ranked = rank_candidates(vec![plain, charging], VehicleType::Electric, &[]);
        assert_eq!(ranked[0].spot.id, 2);
        assert_eq!(ranked[0].feature_matches, 1);
    }

    #[test]
    fn unavailable_spots_are_dropped() {
        let mut taken = sample_spot(1, 1, "A", 1, SpotType::Standard);
        taken.status = SpotStatus::Occupied;
        assert!(rank_candidates(vec![taken], VehicleType::Standard, &[]).is_empty());
    }
}
