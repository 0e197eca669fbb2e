//! Mass-spring-damper used to track camera targets.

use serde::{Deserialize, Serialize};

/// Spring constants for one tracked axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpringParams {
    /// Restoring force per unit of displacement.
    pub tension: f64,
    /// Damping force per unit of velocity.
    pub friction: f64,
    pub mass: f64,
}

impl SpringParams {
    pub fn new(tension: f64, friction: f64, mass: f64) -> Self {
        Self {
            tension: tension.max(0.0001),
            friction: friction.max(0.0),
            mass: mass.max(0.0001),
        }
    }

    /// Friction that makes these constants critically damped.
    pub fn critical_friction(tension: f64, mass: f64) -> f64 {
        2.0 * (tension.max(0.0001) * mass.max(0.0001)).sqrt()
    }
}

/// One-dimensional spring state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spring {
    pub position: f64,
    pub velocity: f64,
    params: SpringParams,
}

impl Spring {
    /// A spring at rest at `position`.
    pub fn new(position: f64, params: SpringParams) -> Self {
        Self {
            position,
            velocity: 0.0,
            params,
        }
    }

    pub fn params(&self) -> SpringParams {
        self.params
    }

    /// Advance one fixed step toward `target` and return the new position.
    ///
    /// `a = (-k·(x − target) − c·v) / m`, velocity first, then position.
    pub fn step(&mut self, target: f64, dt: f64) -> f64 {
        let dt = dt.max(0.000_001);
        let p = &self.params;
        let acceleration =
            (-p.tension * (self.position - target) - p.friction * self.velocity) / p.mass;
        self.velocity += acceleration * dt;
        self.position += self.velocity * dt;
        self.position
    }

    /// Clamp the position into `[lo, hi]`, zeroing velocity if it was outside.
    ///
    /// Returns whether the clamp engaged.
    pub fn constrain(&mut self, lo: f64, hi: f64) -> bool {
        if self.position < lo {
            self.position = lo;
            self.velocity = 0.0;
            true
        } else if self.position > hi {
            self.position = hi;
            self.velocity = 0.0;
            true
        } else {
            false
        }
    }
}
