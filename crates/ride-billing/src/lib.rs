//! Pure price estimation. No I/O, no shared state, deterministic given its inputs.

use ride_types::{haversine_km, Coordinate};

#[derive(Debug, Clone, Copy)]
pub struct Biller {
    pub base_cost: f64,
    pub km_charge: f64,
}

impl Biller {
    pub fn new(base_cost: f64, km_charge: f64) -> Self {
        Self { base_cost, km_charge }
    }

    /// `price = base_cost + km_charge * haversine_km(src, dst)`.
    pub fn estimate(&self, src: Coordinate, dst: Coordinate) -> f64 {
        self.base_cost + self.km_charge * haversine_km(src, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_the_reference_scenario_within_5_cents() {
        let biller = Biller::new(2.0, 1.0);
        let src = Coordinate::new(40.7128, -74.0060);
        let dst = Coordinate::new(40.7580, -73.9855);

        let price = biller.estimate(src, dst);

        assert!((price - 7.35).abs() < 0.05, "price was {price}");
    }

    #[test]
    fn zero_distance_is_just_the_base_cost() {
        let biller = Biller::new(2.0, 1.0);
        let point = Coordinate::new(10.0, 10.0);

        assert!((biller.estimate(point, point) - 2.0).abs() < 1e-9);
    }
}
