//! Geometry and easing used by the burn-in mover.

use std::time::Duration;

/// Width and height of a laid-out view, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Extent {
    pub width: f32,
    pub height: f32,
}

impl Extent {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn scaled(self, ratio: f32) -> Self {
        Self {
            width: self.width * ratio,
            height: self.height * ratio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// How far the movable view may travel inside its container on each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelRange {
    pub x: f32,
    pub y: f32,
}

impl TravelRange {
    /// Container minus view per axis; a view larger than its container cannot move.
    pub fn between(container: Extent, movable: Extent) -> Self {
        Self {
            x: (container.width - movable.width).max(0.0),
            y: (container.height - movable.height).max(0.0),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    pub fn contains(&self, position: Position) -> bool {
        (0.0..=self.x).contains(&position.x) && (0.0..=self.y).contains(&position.y)
    }
}

/// Everything the mover changes on the clock view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub position: Position,
    pub scale: f32,
    pub alpha: f32,
}

impl ViewTransform {
    /// Freshly laid out clock: in place, full size, transparent until the first move.
    pub fn hidden_at(position: Position) -> Self {
        Self {
            position,
            scale: 1.0,
            alpha: 0.0,
        }
    }
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::hidden_at(Position::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    /// Slow start, `t^2`.
    Accelerate,
    /// Slow finish, `1 - (1 - t)^2`.
    Decelerate,
}

impl Easing {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Accelerate => t * t,
            Easing::Decelerate => 1.0 - (1.0 - t) * (1.0 - t),
        }
    }
}

/// Fraction of `duration` covered by `elapsed`, clamped to `[0, 1]`.
pub fn progress(elapsed: Duration, duration: Duration) -> f32 {
    if duration.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f32() / duration.as_secs_f32()).clamp(0.0, 1.0)
}

pub fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}
