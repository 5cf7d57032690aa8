//! Material and time efficiency curves
//!
//! Research levels reduce material use by 1% per ME level (max 10) and
//! production time by 1% per TE level (max 20). Levels past the cap have
//! no further effect.

pub const MAX_ME_LEVEL: u8 = 10;
pub const MAX_TE_LEVEL: u8 = 20;

const ME_STEP: f64 = 0.01;
const TE_STEP: f64 = 0.01;

/// Fraction of material saved at the given ME level
pub fn me_bonus_fraction(level: u8) -> f64 {
    f64::from(level.min(MAX_ME_LEVEL)) * ME_STEP
}

/// Fraction of production time saved at the given TE level
pub fn te_bonus_fraction(level: u8) -> f64 {
    f64::from(level.min(MAX_TE_LEVEL)) * TE_STEP
}

/// Convert a material quantity recorded at `recorded` ME to the `requested` level.
pub fn material_quantity(stored: f64, recorded: u8, requested: Option<u8>) -> f64 {
    match requested {
        Some(level) => rescale(stored, me_bonus_fraction(recorded), me_bonus_fraction(level)),
        None => stored,
    }
}

/// Convert a run time recorded at `recorded` TE to the `requested` level.
pub fn run_time(stored: f64, recorded: u8, requested: Option<u8>) -> f64 {
    match requested {
        Some(level) => rescale(stored, te_bonus_fraction(recorded), te_bonus_fraction(level)),
        None => stored,
    }
}

fn rescale(stored: f64, recorded_bonus: f64, requested_bonus: f64) -> f64 {
    // Identical bonuses must return the stored value bit for bit
    if recorded_bonus == requested_bonus {
        return stored;
    }
    stored / (1.0 - recorded_bonus) * (1.0 - requested_bonus)
}
