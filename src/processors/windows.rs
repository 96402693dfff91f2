use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::heading_delta;

pub const TURN_WINDOW: usize = 10;
pub const VERTICAL_WINDOW: usize = 30;

/// Fixed-length window that drops its oldest value when full
#[derive(Clone, Debug)]
pub struct Ring {
    values: VecDeque<f64>,
    capacity: usize,
}

impl Ring {
    pub fn new(capacity: usize) -> Self {
        Ring { values: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.values.iter()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Heading-based turn detection over the last [`TURN_WINDOW`] samples
#[derive(Clone, Debug)]
pub struct TurnDetector {
    headings: Ring,
    threshold_deg: f64,
}

impl TurnDetector {
    pub fn new(threshold_deg: f64) -> Self {
        TurnDetector { headings: Ring::new(TURN_WINDOW), threshold_deg }
    }

    pub fn push(&mut self, heading_deg: f64) {
        self.headings.push(heading_deg);
    }

    /// Signed heading change across the window, wrap-aware
    pub fn accumulated_delta(&self) -> f64 {
        let headings: Vec<f64> = self.headings.iter().copied().collect();
        headings.windows(2).map(|pair| heading_delta(pair[0], pair[1])).sum()
    }

    pub fn is_turning(&self) -> bool {
        self.accumulated_delta().abs() > self.threshold_deg
    }

    pub fn reset(&mut self) {
        self.headings.clear();
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerticalProfile {
    Climbing,
    Descending,
    #[default]
    Level,
}

/// Vertical speed averaged over the last [`VERTICAL_WINDOW`] samples
#[derive(Clone, Debug)]
pub struct VerticalProfileWindow {
    speeds: Ring,
    threshold_fpm: f64,
}

impl VerticalProfileWindow {
    pub fn new(threshold_fpm: f64) -> Self {
        VerticalProfileWindow { speeds: Ring::new(VERTICAL_WINDOW), threshold_fpm }
    }

    pub fn push(&mut self, vertical_speed_fpm: f64) {
        self.speeds.push(vertical_speed_fpm);
    }

    pub fn profile(&self) -> VerticalProfile {
        match self.speeds.mean() {
            Some(avg) if avg > self.threshold_fpm => VerticalProfile::Climbing,
            Some(avg) if avg < -self.threshold_fpm => VerticalProfile::Descending,
            _ => VerticalProfile::Level,
        }
    }

    pub fn reset(&mut self) {
        self.speeds.clear();
    }
}

/// Heading excursion on the ground after a touchdown
///
/// Used at shutdown to tell a normal taxi to the gate from stopping on
/// the runway.
#[derive(Clone, Debug, Default)]
pub struct TaxiInMonitor {
    runway_heading: Option<f64>,
    max_deviation_deg: f64,
}

impl TaxiInMonitor {
    pub const TURN_OFF_DEG: f64 = 45.0;

    pub fn start(&mut self, heading_deg: f64) {
        self.runway_heading = Some(heading_deg);
        self.max_deviation_deg = 0.0;
    }

    pub fn observe(&mut self, heading_deg: f64) {
        if let Some(runway) = self.runway_heading {
            let deviation = heading_delta(runway, heading_deg).abs();
            if deviation > self.max_deviation_deg {
                self.max_deviation_deg = deviation;
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.runway_heading.is_some()
    }

    pub fn turned_off_runway(&self) -> bool {
        self.max_deviation_deg >= Self::TURN_OFF_DEG
    }

    pub fn max_deviation_deg(&self) -> f64 {
        self.max_deviation_deg
    }

    pub fn reset(&mut self) {
        self.runway_heading = None;
        self.max_deviation_deg = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_drops_oldest() {
        let mut ring = Ring::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            ring.push(v);
        }
        assert!(ring.is_full());
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
        assert_eq!(ring.mean(), Some(3.0));
    }

    #[test]
    fn test_constant_heading_not_turning() {
        let mut turn = TurnDetector::new(3.0);
        for _ in 0..12 {
            turn.push(90.0);
        }
        assert!(!turn.is_turning());
    }

    #[test]
    fn test_ramping_heading_is_turning() {
        let mut turn = TurnDetector::new(3.0);
        for i in 0..10 {
            turn.push(90.0 + i as f64);
        }
        assert_eq!(turn.accumulated_delta(), 9.0);
        assert!(turn.is_turning());
    }

    #[test]
    fn test_turn_across_north() {
        let mut turn = TurnDetector::new(3.0);
        for h in [356.0, 358.0, 0.0, 2.0, 4.0] {
            turn.push(h);
        }
        assert_eq!(turn.accumulated_delta(), 8.0);
        assert!(turn.is_turning());
    }

    #[test]
    fn test_turn_only_counts_last_window() {
        let mut turn = TurnDetector::new(3.0);
        for i in 0..10 {
            turn.push(i as f64 * 2.0);
        }
        assert!(turn.is_turning());
        for _ in 0..TURN_WINDOW {
            turn.push(18.0);
        }
        assert!(!turn.is_turning());
    }

    #[test]
    fn test_weaving_cancels_out() {
        let mut turn = TurnDetector::new(3.0);
        for h in [90.0, 92.0, 90.0, 88.0, 90.0, 92.0, 90.0] {
            turn.push(h);
        }
        assert!(!turn.is_turning());
    }

    fn profile_for(vs: f64) -> VerticalProfile {
        let mut window = VerticalProfileWindow::new(300.0);
        for _ in 0..VERTICAL_WINDOW {
            window.push(vs);
        }
        window.profile()
    }

    #[test]
    fn test_vertical_profile_boundaries() {
        assert_eq!(profile_for(299.0), VerticalProfile::Level);
        assert_eq!(profile_for(300.0), VerticalProfile::Level);
        assert_eq!(profile_for(301.0), VerticalProfile::Climbing);
        assert_eq!(profile_for(-299.0), VerticalProfile::Level);
        assert_eq!(profile_for(-300.0), VerticalProfile::Level);
        assert_eq!(profile_for(-301.0), VerticalProfile::Descending);
    }

    #[test]
    fn test_vertical_profile_uses_last_thirty() {
        let mut window = VerticalProfileWindow::new(300.0);
        for _ in 0..30 {
            window.push(-2000.0);
        }
        assert_eq!(window.profile(), VerticalProfile::Descending);
        for _ in 0..30 {
            window.push(1000.0);
        }
        assert_eq!(window.profile(), VerticalProfile::Climbing);
    }

    #[test]
    fn test_empty_profile_is_level() {
        assert_eq!(VerticalProfileWindow::new(300.0).profile(), VerticalProfile::Level);
    }

    #[test]
    fn test_taxi_in_turn_off() {
        let mut taxi = TaxiInMonitor::default();
        taxi.observe(10.0);
        assert!(!taxi.is_active());

        taxi.start(270.0);
        taxi.observe(275.0);
        assert!(!taxi.turned_off_runway());
        taxi.observe(330.0);
        assert!(taxi.turned_off_runway());
        taxi.observe(270.0);
        assert!(taxi.turned_off_runway());
    }
}
