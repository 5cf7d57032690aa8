//! Engine and facility configuration

use crate::error::{BomError, Result};
use crate::models::{ActivityKind, Facility, RecipeSource};

pub const DEFAULT_MAX_DEPTH: usize = 32;
pub const DEFAULT_MANUFACTURING_SLOTS: u32 = 10;
pub const DEFAULT_RESEARCH_SLOTS: u32 = 10;

/// Defaults applied to every request issued through an engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub max_depth: usize,
    pub source_preference: Option<RecipeSource>,
    /// `None` keeps each recipe's recorded ME level
    pub me_level: Option<u8>,
    /// `None` keeps each recipe's recorded TE level
    pub te_level: Option<u8>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            source_preference: None,
            me_level: None,
            te_level: None,
        }
    }
}

/// Slot counts and bonuses of the facility running the jobs
#[derive(Debug, Clone, PartialEq)]
pub struct FacilityConstraints {
    pub manufacturing_slots: u32,
    pub research_slots: u32,
    pub facility_time_bonus_fraction: f64,
}

impl Default for FacilityConstraints {
    fn default() -> Self {
        Self {
            manufacturing_slots: DEFAULT_MANUFACTURING_SLOTS,
            research_slots: DEFAULT_RESEARCH_SLOTS,
            facility_time_bonus_fraction: 0.0,
        }
    }
}

impl FacilityConstraints {
    pub fn validate(&self) -> Result<()> {
        let bonus = self.facility_time_bonus_fraction;
        if !bonus.is_finite() || !(0.0..1.0).contains(&bonus) {
            return Err(BomError::InvalidConstraint(format!(
                "facility_time_bonus_fraction must be in [0, 1), got {}",
                bonus
            )));
        }
        Ok(())
    }

    pub fn slots_for(&self, kind: ActivityKind) -> u32 {
        match kind {
            ActivityKind::Manufacturing => self.manufacturing_slots,
            ActivityKind::Research => self.research_slots,
        }
    }

    /// Multiplier applied to job durations
    pub fn time_multiplier(&self) -> f64 {
        1.0 - self.facility_time_bonus_fraction
    }
}

impl From<&Facility> for FacilityConstraints {
    fn from(facility: &Facility) -> Self {
        Self {
            manufacturing_slots: facility.manufacturing_slots,
            research_slots: facility.research_slots,
            facility_time_bonus_fraction: facility.time_bonus_fraction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_bonus() {
        let mut constraints = FacilityConstraints::default();
        assert!(constraints.validate().is_ok());

        constraints.facility_time_bonus_fraction = 1.0;
        assert!(constraints.validate().is_err());

        constraints.facility_time_bonus_fraction = -0.1;
        assert!(constraints.validate().is_err());

        constraints.facility_time_bonus_fraction = f64::NAN;
        assert!(constraints.validate().is_err());
    }

    #[test]
    fn facility_maps_to_constraints() {
        let facility = Facility {
            name: "Raitaru".to_string(),
            system: Some("Jita".to_string()),
            manufacturing_slots: 3,
            research_slots: 1,
            time_bonus_fraction: 0.15,
        };
        let constraints = FacilityConstraints::from(&facility);
        assert_eq!(constraints.slots_for(ActivityKind::Manufacturing), 3);
        assert_eq!(constraints.slots_for(ActivityKind::Research), 1);
        assert!((constraints.time_multiplier() - 0.85).abs() < 1e-12);
    }
}
