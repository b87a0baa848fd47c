//! Vehicle / spot compatibility rules

use crate::domain::{Spot, SpotType, VehicleType};

/// Feature an electric vehicle prefers but does not require
pub const EV_CHARGING: &str = "ev_charging";

/// Required feature that unlocks handicap spots
pub const HANDICAP: &str = "handicap";

/// Spot types a vehicle may use, exact match first.
pub fn compatible_spot_types(vehicle_type: VehicleType) -> &'static [SpotType] {
    match vehicle_type {
        VehicleType::Compact => &[SpotType::Compact, SpotType::Standard],
        VehicleType::Standard => &[SpotType::Standard, SpotType::Oversized],
        VehicleType::Oversized => &[SpotType::Oversized],
        VehicleType::Motorcycle => &[SpotType::Compact, SpotType::Standard],
        VehicleType::Electric => &[SpotType::Electric, SpotType::Standard, SpotType::Compact],
    }
}

pub fn preferred_features(vehicle_type: VehicleType) -> &'static [&'static str] {
    match vehicle_type {
        VehicleType::Electric => &[EV_CHARGING],
        _ => &[],
    }
}

fn requires_handicap(required_features: &[String]) -> bool {
    required_features.iter().any(|f| f == HANDICAP)
}

/// Spot types worth querying for this request. Handicap spots only enter
/// when the handicap feature is required.
pub fn eligible_spot_types(vehicle_type: VehicleType, required_features: &[String]) -> Vec<SpotType> {
    let mut types = compatible_spot_types(vehicle_type).to_vec();
    if requires_handicap(required_features) {
        types.push(SpotType::Handicap);
    }
    types
}

pub fn is_exact_match(
    vehicle_type: VehicleType,
    spot_type: SpotType,
    required_features: &[String],
) -> bool {
    if spot_type == SpotType::Handicap {
        return requires_handicap(required_features);
    }
    compatible_spot_types(vehicle_type).first() == Some(&spot_type)
}

/// Whether the spot offers `feature`. A handicap spot offers the handicap
/// feature whether or not it is tagged.
pub fn provides_feature(spot: &Spot, feature: &str) -> bool {
    spot.has_feature(feature) || (feature == HANDICAP && spot.spot_type == SpotType::Handicap)
}

pub fn is_eligible(spot: &Spot, vehicle_type: VehicleType, required_features: &[String]) -> bool {
    eligible_spot_types(vehicle_type, required_features).contains(&spot.spot_type)
        && required_features.iter().all(|f| provides_feature(spot, f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewSpot;
    use chrono::Utc;

    fn sample_spot(spot_type: SpotType) -> Spot {
        NewSpot::new(1, 1, "A", 1, spot_type).into_spot(1, Utc::now())
    }

    #[test]
    fn compact_vehicle_prefers_compact_then_standard() {
        let types = compatible_spot_types(VehicleType::Compact);
        assert_eq!(types, &[SpotType::Compact, SpotType::Standard]);
        assert!(!types.contains(&SpotType::Oversized));
    }

    #[test]
    fn oversized_vehicle_needs_oversized_spot() {
        assert!(!is_eligible(&sample_spot(SpotType::Standard), VehicleType::Oversized, &[]));
        assert!(is_eligible(&sample_spot(SpotType::Oversized), VehicleType::Oversized, &[]));
    }

    #[test]
    fn handicap_spots_need_handicap_requirement() {
        let spot = sample_spot(SpotType::Handicap);
        assert!(!is_eligible(&spot, VehicleType::Standard, &[]));

        let required = vec![HANDICAP.to_string()];
        assert!(is_eligible(&spot, VehicleType::Standard, &required));
        assert!(is_exact_match(VehicleType::Standard, SpotType::Handicap, &required));
        // plain standard spot without the tag no longer qualifies
        assert!(!is_eligible(&sample_spot(SpotType::Standard), VehicleType::Standard, &required));
    }

    #[test]
    fn electric_vehicle_prefers_charging() {
        assert_eq!(preferred_features(VehicleType::Electric), &[EV_CHARGING]);
        assert!(is_eligible(&sample_spot(SpotType::Compact), VehicleType::Electric, &[]));
        assert!(!is_exact_match(VehicleType::Electric, SpotType::Compact, &[]));
    }

    #[test]
    fn required_features_must_all_be_present() {
        let spot = NewSpot::new(1, 1, "A", 1, SpotType::Standard)
            .with_features(["covered"])
            .into_spot(1, Utc::now());
        let covered = vec!["covered".to_string()];
        let both = vec!["covered".to_string(), EV_CHARGING.to_string()];
        assert!(is_eligible(&spot, VehicleType::Standard, &covered));
        assert!(!is_eligible(&spot, VehicleType::Standard, &both));
    }
}
