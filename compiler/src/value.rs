// value.rs — Runtime values flowing through slots and lanes
//
// One `Value` is what a signal holds per frame and what a field holds per
// lane. Slot storage flattens values into f64 lanes (stride = payload
// width), so conversion in both directions lives here.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A runtime value: one scalar or a small fixed-width vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Scalar(f64),
    Vec2([f64; 2]),
    Vec3([f64; 3]),
    Vec4([f64; 4]),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, lanes: &[f64]) -> fmt::Result {
            write!(f, "(")?;
            for (i, v) in lanes.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", v)?;
            }
            write!(f, ")")
        }
        match self {
            Value::Scalar(v) => write!(f, "{}", v),
            Value::Vec2(v) => join(f, v),
            Value::Vec3(v) => join(f, v),
            Value::Vec4(v) => join(f, v),
        }
    }
}

impl Value {
    /// Number of f64 lanes this value occupies in slot storage.
    pub fn width(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Vec2(_) => 2,
            Value::Vec3(_) => 3,
            Value::Vec4(_) => 4,
        }
    }

    /// A zero value of the given lane width (1..=4).
    pub fn zero(width: usize) -> Value {
        match width {
            2 => Value::Vec2([0.0; 2]),
            3 => Value::Vec3([0.0; 3]),
            4 => Value::Vec4([0.0; 4]),
            _ => Value::Scalar(0.0),
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec2(&self) -> Option<[f64; 2]> {
        match self {
            Value::Vec2(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<[f64; 3]> {
        match self {
            Value::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    /// Component access across all widths; `None` when out of range.
    pub fn component(&self, i: usize) -> Option<f64> {
        match self {
            Value::Scalar(v) if i == 0 => Some(*v),
            Value::Vec2(v) => v.get(i).copied(),
            Value::Vec3(v) => v.get(i).copied(),
            Value::Vec4(v) => v.get(i).copied(),
            _ => None,
        }
    }

    /// Rebuild a value from flat lanes. Panics if `lanes` is empty or wider
    /// than four components; callers size lanes from the slot stride.
    pub fn from_lanes(lanes: &[f64]) -> Value {
        match lanes.len() {
            1 => Value::Scalar(lanes[0]),
            2 => Value::Vec2([lanes[0], lanes[1]]),
            3 => Value::Vec3([lanes[0], lanes[1], lanes[2]]),
            4 => Value::Vec4([lanes[0], lanes[1], lanes[2], lanes[3]]),
            n => panic!("value width {n} out of range"),
        }
    }

    /// Flatten into `out`, which must be exactly `self.width()` lanes.
    pub fn write_lanes(&self, out: &mut [f64]) {
        match self {
            Value::Scalar(v) => out[0] = *v,
            Value::Vec2(v) => out.copy_from_slice(v),
            Value::Vec3(v) => out.copy_from_slice(v),
            Value::Vec4(v) => out.copy_from_slice(v),
        }
    }

    /// Apply `f` componentwise over one value.
    pub fn map(self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(a) => Value::Scalar(f(a)),
            Value::Vec2(a) => Value::Vec2([f(a[0]), f(a[1])]),
            Value::Vec3(a) => Value::Vec3([f(a[0]), f(a[1]), f(a[2])]),
            Value::Vec4(a) => Value::Vec4([f(a[0]), f(a[1]), f(a[2]), f(a[3])]),
        }
    }

    /// Apply `f` componentwise over two values of equal width. A scalar
    /// operand is broadcast across the other operand's components.
    pub fn zip(self, other: Value, f: impl Fn(f64, f64) -> f64) -> Value {
        match (self, other) {
            (Value::Scalar(a), b) => b.map(|x| f(a, x)),
            (a, Value::Scalar(b)) => a.map(|x| f(x, b)),
            (Value::Vec2(a), Value::Vec2(b)) => Value::Vec2([f(a[0], b[0]), f(a[1], b[1])]),
            (Value::Vec3(a), Value::Vec3(b)) => {
                Value::Vec3([f(a[0], b[0]), f(a[1], b[1]), f(a[2], b[2])])
            }
            (Value::Vec4(a), Value::Vec4(b)) => Value::Vec4([
                f(a[0], b[0]),
                f(a[1], b[1]),
                f(a[2], b[2]),
                f(a[3], b[3]),
            ]),
            // Mixed vector widths cannot reach evaluation: unification
            // rejects them at compile time. Fall back to the left operand.
            (a, _) => a,
        }
    }

    /// Euclidean distance between two values of equal width.
    pub fn distance(&self, other: &Value) -> f64 {
        let w = self.width().min(other.width());
        let mut acc = 0.0;
        for i in 0..w {
            let d = self.component(i).unwrap_or(0.0) - other.component(i).unwrap_or(0.0);
            acc += d * d;
        }
        acc.sqrt()
    }
}

/// Per-frame clock handed to evaluation. The external host advances time;
/// the compiler core never drives it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameCtx {
    /// Monotonic frame counter.
    pub frame: u64,
    /// Model time at the start of this frame, in milliseconds.
    pub t_ms: f64,
    /// Time advanced since the previous frame, in milliseconds.
    pub dt_ms: f64,
}

impl FrameCtx {
    pub fn start() -> Self {
        FrameCtx {
            frame: 0,
            t_ms: 0.0,
            dt_ms: 0.0,
        }
    }

    /// The context for the next frame after advancing `dt_ms`.
    pub fn advanced(&self, dt_ms: f64) -> Self {
        FrameCtx {
            frame: self.frame + 1,
            t_ms: self.t_ms + dt_ms,
            dt_ms,
        }
    }
}
