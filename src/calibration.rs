//! Scale factor calibration against a known displacement
//!
//! The operator moves the sensor by a known distance along one axis; the
//! raw count accumulated over that move gives micrometres per count.

use std::fmt;
use std::time::Duration;

use log::{info, warn};

use crate::bus::Transport;
use crate::error::{Pat9130Error, Result};
use crate::pat9130::{Pat9130, RawSample, DEFAULT_TIMEOUT};

/// Sensor axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
        }
    }
}

/// Micrometres per raw count, per axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub x: f64,
    pub y: f64,
}

impl Default for ScaleFactors {
    fn default() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

impl ScaleFactors {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }

    /// Scale a raw sample to micrometres
    pub fn apply(&self, raw: RawSample) -> (f64, f64) {
        (f64::from(raw.x) * self.x, f64::from(raw.y) * self.y)
    }
}

/// Result of calibrating one axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisCalibration {
    pub axis: Axis,
    /// Raw count observed over the known move
    pub raw: i16,
    pub factor: f64,
}

/// `known_distance / raw`, falling back to 1.0 when nothing was counted
pub fn factor_from_raw(known_distance: f64, raw: i16) -> f64 {
    if raw == 0 {
        1.0
    } else {
        known_distance / f64::from(raw)
    }
}

/// Interactive calibration procedure.
///
/// The confirmation collaborator is called with the axis and the known
/// distance once the stale sample has been flushed. It should block until
/// the operator has moved the sensor, then return `true` to proceed or
/// `false` to abort.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationRoutine {
    known_distance_um: f64,
    read_timeout: Duration,
}

impl CalibrationRoutine {
    /// Calibrate against a move of `known_distance_um` micrometres
    pub fn new(known_distance_um: f64) -> Self {
        Self {
            known_distance_um,
            read_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound each sensor read; a read that times out counts as zero
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn known_distance_um(&self) -> f64 {
        self.known_distance_um
    }

    /// Calibrate a single axis
    pub fn calibrate_axis<T, C>(
        &self,
        sensor: &mut Pat9130<T>,
        axis: Axis,
        mut confirm: C,
    ) -> Result<AxisCalibration>
    where
        T: Transport,
        C: FnMut(Axis, f64) -> bool,
    {
        // Flush whatever motion accumulated before the operator was ready
        sensor.read_sample(self.read_timeout)?;

        if !confirm(axis, self.known_distance_um) {
            warn!(target: "pat9130::calibration", "calibration of {} aborted", axis);
            return Err(Pat9130Error::CalibrationAborted(axis));
        }

        let raw = sensor.read_sample(self.read_timeout)?.axis(axis);
        let factor = factor_from_raw(self.known_distance_um, raw);
        if raw == 0 {
            warn!(
                target: "pat9130::calibration",
                "Raw {} is zero, falling back to factor {:.1}",
                axis,
                factor
            );
        } else {
            info!(
                target: "pat9130::calibration",
                "Raw {} measured: {} -> Factor {}: {:.6}",
                axis,
                raw,
                axis,
                factor
            );
        }

        Ok(AxisCalibration { axis, raw, factor })
    }

    /// Calibrate X, then Y
    pub fn calibrate<T, C>(&self, sensor: &mut Pat9130<T>, mut confirm: C) -> Result<ScaleFactors>
    where
        T: Transport,
        C: FnMut(Axis, f64) -> bool,
    {
        let x = self.calibrate_axis(sensor, Axis::X, &mut confirm)?;
        let y = self.calibrate_axis(sensor, Axis::Y, &mut confirm)?;
        Ok(ScaleFactors::new(x.factor, y.factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::RegisterBus;
    use crate::pat9130::DriverConfig;
    use crate::testing::FakeDevice;

    fn sensor(device: &mut FakeDevice) -> Pat9130<&mut FakeDevice> {
        let config = DriverConfig {
            poll_interval: Duration::from_millis(1),
        };
        let mut sensor = Pat9130::with_config(RegisterBus::new(device), config);
        sensor.initialize(Duration::from_millis(50)).unwrap();
        sensor
    }

    fn routine() -> CalibrationRoutine {
        CalibrationRoutine::new(15000.0).with_read_timeout(Duration::from_millis(20))
    }

    #[test]
    fn test_factor_from_raw() {
        assert_eq!(factor_from_raw(15000.0, 1000), 15.0);
        assert_eq!(factor_from_raw(15000.0, -1000), -15.0);
        assert_eq!(factor_from_raw(15000.0, 0), 1.0);
    }

    #[test]
    fn test_calibrate_axis() {
        let mut device = FakeDevice::genuine();
        device.push_sample(37, -12); // stale motion, flushed
        device.push_sample(1000, 3);
        let mut sensor = sensor(&mut device);

        let mut prompts = Vec::new();
        let result = routine()
            .calibrate_axis(&mut sensor, Axis::X, |axis, distance| {
                prompts.push((axis, distance));
                true
            })
            .unwrap();

        assert_eq!(prompts, vec![(Axis::X, 15000.0)]);
        assert_eq!(result.raw, 1000);
        assert_eq!(result.factor, 15.0);
    }

    #[test]
    fn test_no_motion_falls_back_to_unity() {
        let mut device = FakeDevice::genuine();
        let mut sensor = sensor(&mut device);

        let result = routine()
            .calibrate_axis(&mut sensor, Axis::Y, |_, _| true)
            .unwrap();
        assert_eq!(result.raw, 0);
        assert_eq!(result.factor, 1.0);
    }

    #[test]
    fn test_zero_count_falls_back_to_unity() {
        let mut device = FakeDevice::genuine();
        device.push_sample(5, 5);
        device.push_sample(250, 0);
        let mut sensor = sensor(&mut device);

        let result = routine()
            .calibrate_axis(&mut sensor, Axis::Y, |_, _| true)
            .unwrap();
        assert_eq!(result.raw, 0);
        assert_eq!(result.factor, 1.0);
    }

    #[test]
    fn test_abort() {
        let mut device = FakeDevice::genuine();
        device.push_sample(1, 1);
        device.push_sample(1000, 1000);
        let mut sensor = sensor(&mut device);

        let err = routine()
            .calibrate_axis(&mut sensor, Axis::X, |_, _| false)
            .unwrap_err();
        assert!(matches!(err, Pat9130Error::CalibrationAborted(Axis::X)));
        drop(sensor);
        // only the flush read happened
        assert_eq!(device.consumed(), 1);
    }

    #[test]
    fn test_calibrate_both_axes_in_order() {
        let mut device = FakeDevice::genuine();
        device.push_sample(9, 9);
        device.push_sample(1000, 40);
        device.push_sample(9, 9);
        device.push_sample(-20, -3000);
        let mut sensor = sensor(&mut device);

        let mut order = Vec::new();
        let factors = routine()
            .calibrate(&mut sensor, |axis, _| {
                order.push(axis);
                true
            })
            .unwrap();

        assert_eq!(order, vec![Axis::X, Axis::Y]);
        assert_eq!(factors, ScaleFactors::new(15.0, -5.0));
    }

    #[test]
    fn test_scale_factors_apply() {
        let factors = ScaleFactors::new(2.5, -1.0);
        assert_eq!(factors.apply(RawSample { x: 4, y: 7 }), (10.0, -7.0));
        assert_eq!(ScaleFactors::default().axis(Axis::Y), 1.0);
    }
}
