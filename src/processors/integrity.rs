use super::{AbortReason, Action, EventColor, TrackingContext};
use crate::config::TrackerConfig;
use crate::types::{AircraftIdentity, ChangeEvent, FuelTanks, PayloadStations, WeightAndBalance};

/// Change-over-time checks on the slow categories: fuel must only go
/// down, payload must stay put and the aircraft must not be swapped
/// while a session is active.
#[derive(Debug)]
pub struct IntegrityProcessor {
    fuel_tolerance_gallons: f64,
    payload_tolerance_lbs: f64,
    overweight_reported: bool,
}

impl IntegrityProcessor {
    pub fn new(config: &TrackerConfig) -> Self {
        IntegrityProcessor {
            fuel_tolerance_gallons: config.fuel_tolerance_gallons,
            payload_tolerance_lbs: config.payload_tolerance_lbs,
            overweight_reported: false,
        }
    }

    pub fn process_fuel(&mut self, change: &ChangeEvent<FuelTanks>, ctx: &TrackingContext) -> Vec<Action> {
        if change.is_first() || !ctx.is_active() {
            return Vec::new();
        }
        let increase = change.new.total_gallons() - change.old.total_gallons();
        if increase > self.fuel_tolerance_gallons {
            return vec![Action::Abort(AbortReason::FuelIncrease { gallons: increase })];
        }
        Vec::new()
    }

    pub fn process_payload(&mut self, change: &ChangeEvent<PayloadStations>, ctx: &TrackingContext) -> Vec<Action> {
        if change.is_first() || !ctx.is_active() {
            return Vec::new();
        }
        let delta_lbs = change.new.total_weight_lbs() - change.old.total_weight_lbs();
        if delta_lbs.abs() > self.payload_tolerance_lbs {
            return vec![Action::Abort(AbortReason::PayloadChanged { delta_lbs })];
        }
        Vec::new()
    }

    pub fn process_identity(&mut self, change: &ChangeEvent<AircraftIdentity>, ctx: &TrackingContext) -> Vec<Action> {
        if change.is_first() {
            return Vec::new();
        }
        if change.old.title != change.new.title {
            log::info!("Aircraft loaded: {}", change.new.title);
        }
        if ctx.is_active() && change.old.is_known() && change.old.model_hash() != change.new.model_hash() {
            return vec![Action::Abort(AbortReason::AircraftChanged)];
        }
        Vec::new()
    }

    pub fn process_weight_and_balance(
        &mut self,
        change: &ChangeEvent<WeightAndBalance>,
        ctx: &TrackingContext,
    ) -> Vec<Action> {
        let overweight = change.new.is_overweight();
        if !ctx.is_tracking() || overweight == self.overweight_reported {
            return Vec::new();
        }
        self.overweight_reported = overweight;
        if overweight {
            vec![Action::event(
                EventColor::Orange,
                format!(
                    "Aircraft overweight: {:.0} lbs of {:.0} lbs maximum",
                    change.new.total_weight_lbs, change.new.max_gross_weight_lbs
                ),
            )]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EngineType, FuelTank, PayloadStation, TankLevel, TrackingStatus};
    use chrono::Utc;

    fn fuel(gallons: f64) -> FuelTanks {
        let mut tanks = FuelTanks { weight_per_gallon_lbs: 6.7, ..Default::default() };
        tanks.tanks.insert(
            FuelTank::LeftMain,
            TankLevel { capacity_gallons: 500.0, quantity_gallons: gallons / 2.0 },
        );
        tanks.tanks.insert(
            FuelTank::RightMain,
            TankLevel { capacity_gallons: 500.0, quantity_gallons: gallons / 2.0 },
        );
        tanks
    }

    fn payload(lbs: f64) -> PayloadStations {
        let mut stations = PayloadStations::default();
        stations.stations.insert(1, PayloadStation { name: "Cargo".into(), weight_lbs: lbs });
        stations
    }

    fn change<T>(old: T, new: T) -> ChangeEvent<T> {
        let now = Utc::now();
        ChangeEvent::new(old, new, Some(now), now)
    }

    fn tracking() -> TrackingContext {
        TrackingContext { status: TrackingStatus::Tracking, ..Default::default() }
    }

    #[test]
    fn test_fuel_burn_is_fine_refuel_aborts() {
        let mut p = IntegrityProcessor::new(&TrackerConfig::default());
        assert!(p.process_fuel(&change(fuel(400.0), fuel(399.2)), &tracking()).is_empty());
        assert!(p.process_fuel(&change(fuel(400.0), fuel(400.8)), &tracking()).is_empty());
        let actions = p.process_fuel(&change(fuel(400.0), fuel(450.0)), &tracking());
        assert_eq!(actions, vec![Action::Abort(AbortReason::FuelIncrease { gallons: 50.0 })]);
    }

    #[test]
    fn test_refuel_allowed_while_preparing() {
        let mut p = IntegrityProcessor::new(&TrackerConfig::default());
        let preparing = TrackingContext { status: TrackingStatus::Preparing, ..Default::default() };
        assert!(p.process_fuel(&change(fuel(100.0), fuel(450.0)), &preparing).is_empty());
    }

    #[test]
    fn test_payload_change_aborts() {
        let mut p = IntegrityProcessor::new(&TrackerConfig::default());
        assert!(p.process_payload(&change(payload(1000.0), payload(1003.0)), &tracking()).is_empty());
        let actions = p.process_payload(&change(payload(1000.0), payload(800.0)), &tracking());
        assert!(matches!(actions.as_slice(), [Action::Abort(AbortReason::PayloadChanged { .. })]));
    }

    #[test]
    fn test_aircraft_swap_aborts() {
        let mut p = IntegrityProcessor::new(&TrackerConfig::default());
        let a320 = AircraftIdentity {
            title: "Airbus A320neo".into(),
            atc_type: "AIRBUS".into(),
            atc_model: "A320".into(),
            engine_type: EngineType::Jet,
            engine_count: 2,
        };
        let mut repaint = a320.clone();
        repaint.title = "Airbus A320neo Lufthansa".into();
        assert!(p.process_identity(&change(a320.clone(), repaint), &tracking()).is_empty());

        let mut c172 = a320.clone();
        c172.atc_model = "C172".into();
        c172.engine_type = EngineType::Piston;
        assert_eq!(
            p.process_identity(&change(a320, c172), &tracking()),
            vec![Action::Abort(AbortReason::AircraftChanged)]
        );
    }

    #[test]
    fn test_overweight_reported_once() {
        let mut p = IntegrityProcessor::new(&TrackerConfig::default());
        let heavy = WeightAndBalance {
            total_weight_lbs: 2600.0,
            max_gross_weight_lbs: 2550.0,
            ..Default::default()
        };
        assert_eq!(p.process_weight_and_balance(&change(heavy.clone(), heavy.clone()), &tracking()).len(), 1);
        assert!(p.process_weight_and_balance(&change(heavy.clone(), heavy), &tracking()).is_empty());
    }
}
