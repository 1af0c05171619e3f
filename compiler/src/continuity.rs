// continuity.rs — Element-mapped smoothing across domain resizes and swaps
//
// A field's backing domain can change element count between frames (a live
// count edit, or a whole program swap). Refilling the buffer from index 0
// reassigns element meaning and pops visibly. The session remembers what
// each export target last showed; when a target's element count changes, or
// when the host announces a program swap via retarget(), it maps each new
// element to a predecessor under the active strategy and slews from the
// predecessor's value toward the live one with
// value(t) = new − (new − old) · e^(−(t/τ)^p).
//
// Preconditions: none. The session works on frame outputs alone and knows
//   nothing about either program's internals.
// Postconditions: note_frame() returns outputs of the same shape as its
//   input; once every blend decays, outputs pass through untouched.
// Failure modes: none. A frame is never blocked or failed for continuity's
//   sake; anything that cannot be mapped snaps to the new value.
// Side effects: per-target bookkeeping; a debug log per remap.

use std::borrow::Borrow;
use std::collections::HashMap;

use tracing::debug;

use crate::exec::{FrameOutputs, OutputData};
use crate::value::Value;

// ── Vocabulary ───────────────────────────────────────────────────────────

/// Names one output target across frames: the export name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetKey(pub String);

impl Borrow<str> for TargetKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Which old element seeds each new element after a count change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingStrategy {
    /// Same index. Valid only while the count is unchanged; a resize under
    /// this strategy maps nothing.
    Identity,
    /// Match stable element identities; survivors keep their value.
    ById,
    /// Nearest old element by position in value space.
    ByPosition,
}

/// How a target's new elements relate to its old ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingState {
    pub kind: MappingStrategy,
    /// One entry per new element: the predecessor's index, or −1 for an
    /// element with no predecessor.
    pub new_to_old: Vec<i32>,
}

impl MappingState {
    /// Relate each new element to a predecessor under `kind`.
    pub fn build(
        kind: MappingStrategy,
        old_ids: &[u64],
        old_data: &[f64],
        new_ids: &[u64],
        new_data: &[f64],
        stride: usize,
    ) -> MappingState {
        let new_to_old = match kind {
            MappingStrategy::Identity => {
                if old_ids.len() == new_ids.len() {
                    (0..new_ids.len() as i32).collect()
                } else {
                    vec![-1; new_ids.len()]
                }
            }
            MappingStrategy::ById => new_ids
                .iter()
                .map(|id| {
                    old_ids
                        .iter()
                        .position(|old| old == id)
                        .map_or(-1, |j| j as i32)
                })
                .collect(),
            MappingStrategy::ByPosition => {
                let s = stride.max(1);
                (0..new_ids.len())
                    .map(|i| Self::by_position(&new_data[i * s..(i + 1) * s], old_data, s))
                    .collect()
            }
        };
        MappingState { kind, new_to_old }
    }

    /// How many new elements found a predecessor.
    pub fn mapped(&self) -> usize {
        self.new_to_old.iter().filter(|&&j| j >= 0).count()
    }

    /// Nearest old element by position; −1 when no old elements exist.
    /// Linear scan over the old elements; remaps are rare and counts are
    /// small.
    fn by_position(point: &[f64], old_data: &[f64], stride: usize) -> i32 {
        let mut best = -1;
        let mut best_d = f64::INFINITY;
        for (j, old) in old_data.chunks_exact(stride).enumerate() {
            let d: f64 = point.iter().zip(old).map(|(a, b)| (a - b) * (a - b)).sum();
            if d < best_d {
                best_d = d;
                best = j as i32;
            }
        }
        best
    }
}

/// Slew shape. τ is `base_tau_ms * tau_multiplier`; a non-positive τ
/// disables blending entirely.
#[derive(Debug, Clone, Copy)]
pub struct SlewParams {
    pub base_tau_ms: f64,
    pub tau_multiplier: f64,
    pub decay_exponent: f64,
}

impl Default for SlewParams {
    fn default() -> Self {
        SlewParams {
            base_tau_ms: 120.0,
            tau_multiplier: 1.0,
            decay_exponent: 1.0,
        }
    }
}

impl SlewParams {
    pub fn tau_ms(&self) -> f64 {
        self.base_tau_ms * self.tau_multiplier
    }

    /// Residual weight of the old value after `elapsed_ms`.
    fn weight(&self, elapsed_ms: f64) -> f64 {
        let tau = self.tau_ms();
        if tau <= 0.0 {
            return 0.0;
        }
        (-(elapsed_ms / tau).powf(self.decay_exponent)).exp()
    }
}

/// Lifetime counters, accumulated across remaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContinuityStats {
    /// Elements that found a predecessor to slew from.
    pub mapped: usize,
    /// Elements that snapped to the new value.
    pub unmapped: usize,
    /// Swap and resize events processed.
    pub remaps: usize,
}

// ── Per-target state ─────────────────────────────────────────────────────

/// The value a target was showing at remap time, laid out to match the new
/// program's output. Unmapped lanes hold the new value already, so the
/// blend formula snaps them for free.
enum OldValues {
    Signal(Value),
    Field(Vec<f64>),
}

struct TargetBlend {
    elapsed_ms: f64,
    old: OldValues,
}

/// One export tracked across frames. Lives for the session; only reset()
/// drops it.
struct ContinuityTarget {
    /// What was actually emitted for this target last frame. Remaps chain
    /// from here, so back-to-back swaps never jump.
    shown: OutputData,
    blend: Option<TargetBlend>,
}

// Blends this far gone emit the new value verbatim next frame.
const RETIRE_WEIGHT: f64 = 1e-4;

// ── Session ──────────────────────────────────────────────────────────────

/// Maps and slews outputs across domain resizes and program swaps.
pub struct ContinuitySession {
    strategy: MappingStrategy,
    params: SlewParams,
    targets: HashMap<TargetKey, ContinuityTarget>,
    stats: ContinuityStats,
}

impl ContinuitySession {
    pub fn new(strategy: MappingStrategy, params: SlewParams) -> ContinuitySession {
        ContinuitySession {
            strategy,
            params,
            targets: HashMap::new(),
            stats: ContinuityStats::default(),
        }
    }

    pub fn stats(&self) -> ContinuityStats {
        self.stats
    }

    /// Forget everything: targets, pending blends, and the counters. The
    /// next remap finds nothing to map.
    pub fn reset(&mut self) {
        self.targets.clear();
        self.stats = ContinuityStats::default();
    }

    /// Announce a program swap: remap every target in `next` from whatever
    /// this session last showed for it. Call once, with the first outputs
    /// of the new program, before noting them.
    pub fn retarget(&mut self, next: &FrameOutputs) {
        self.stats.remaps += 1;
        let mut mapped = 0usize;
        let mut unmapped = 0usize;
        for (name, data) in &next.outputs {
            self.reseed(name, data, &mut mapped, &mut unmapped);
        }
        self.stats.mapped += mapped;
        self.stats.unmapped += unmapped;
        debug!(
            targets = next.outputs.len(),
            mapped, unmapped, "retargeted outputs across swap"
        );
    }

    /// Smooth one frame. `dt_ms` is the time since the previous frame. A
    /// target whose element count changed since it was last shown is
    /// remapped here, exactly as a swap would remap it.
    pub fn note_frame(&mut self, frame: &FrameOutputs, dt_ms: f64) -> FrameOutputs {
        for (name, data) in &frame.outputs {
            let resized = self
                .targets
                .get(name.as_str())
                .is_some_and(|t| t.shown.element_count() != data.element_count());
            if resized {
                self.stats.remaps += 1;
                let mut mapped = 0usize;
                let mut unmapped = 0usize;
                self.reseed(name, data, &mut mapped, &mut unmapped);
                self.stats.mapped += mapped;
                self.stats.unmapped += unmapped;
                debug!(
                    target = name.as_str(),
                    mapped, unmapped, "remapped after element count change"
                );
            }
        }

        let mut smoothed = frame.clone();
        for (name, data) in smoothed.outputs.iter_mut() {
            let target = self
                .targets
                .entry(TargetKey(name.clone()))
                .or_insert_with(|| ContinuityTarget {
                    shown: data.clone(),
                    blend: None,
                });
            if let Some(blend) = &mut target.blend {
                blend.elapsed_ms += dt_ms;
                let w = self.params.weight(blend.elapsed_ms);
                let applied = match (&mut *data, &blend.old) {
                    (OutputData::Signal(new), OldValues::Signal(old)) => {
                        *new = new.zip(*old, |n, o| n - (n - o) * w);
                        true
                    }
                    (OutputData::Field { data: new, .. }, OldValues::Field(old))
                        if new.len() == old.len() =>
                    {
                        for (n, o) in new.iter_mut().zip(old.iter()) {
                            *n -= (*n - o) * w;
                        }
                        true
                    }
                    // Lane layout changed under the blend: give up and snap.
                    _ => false,
                };
                if !applied || w < RETIRE_WEIGHT {
                    target.blend = None;
                }
            }
            target.shown = data.clone();
        }
        smoothed
    }

    /// Start (or restart) a blend for one target, chaining from its shown
    /// values.
    fn reseed(&mut self, name: &str, next: &OutputData, mapped: &mut usize, unmapped: &mut usize) {
        let Some(target) = self.targets.get_mut(name) else {
            *unmapped += next.element_count();
            self.targets.insert(
                TargetKey(name.to_string()),
                ContinuityTarget {
                    shown: next.clone(),
                    blend: None,
                },
            );
            return;
        };
        let old = seed_from(self.strategy, &target.shown, next, mapped, unmapped);
        match old {
            Some(old) if self.params.tau_ms() > 0.0 => {
                // Next frame still emits (approximately) the old values, so
                // a remap before then must chain from them.
                target.shown = shown_of(&old, next);
                target.blend = Some(TargetBlend {
                    elapsed_ms: 0.0,
                    old,
                });
            }
            _ => {
                target.shown = next.clone();
                target.blend = None;
            }
        }
    }
}

/// What the target was showing, rearranged to the new layout. `None` means
/// nothing mapped; the whole target snaps.
fn seed_from(
    strategy: MappingStrategy,
    prev: &OutputData,
    next: &OutputData,
    mapped: &mut usize,
    unmapped: &mut usize,
) -> Option<OldValues> {
    match (prev, next) {
        (OutputData::Signal(old), OutputData::Signal(_)) => {
            *mapped += 1;
            Some(OldValues::Signal(*old))
        }
        (
            OutputData::Field {
                stride: old_stride,
                ids: old_ids,
                data: old_data,
            },
            OutputData::Field { stride, ids, data },
        ) if old_stride == stride => {
            let s = (*stride).max(1) as usize;
            let mapping = MappingState::build(strategy, old_ids, old_data, ids, data, s);
            if mapping.mapped() == 0 {
                *unmapped += ids.len();
                return None;
            }
            // Start from the new values; mapped elements overwrite.
            let mut seeded = data.clone();
            for (i, &j) in mapping.new_to_old.iter().enumerate() {
                match usize::try_from(j) {
                    Ok(j) if (j + 1) * s <= old_data.len() => {
                        seeded[i * s..(i + 1) * s].copy_from_slice(&old_data[j * s..(j + 1) * s]);
                        *mapped += 1;
                    }
                    _ => *unmapped += 1,
                }
            }
            Some(OldValues::Field(seeded))
        }
        // Shape changed across the remap: snap the whole target.
        (_, next) => {
            *unmapped += next.element_count();
            None
        }
    }
}

/// The seeded old values as an output in the new layout.
fn shown_of(old: &OldValues, next: &OutputData) -> OutputData {
    match (old, next) {
        (OldValues::Signal(v), _) => OutputData::Signal(*v),
        (OldValues::Field(data), OutputData::Field { stride, ids, .. }) => OutputData::Field {
            stride: *stride,
            ids: ids.clone(),
            data: data.clone(),
        },
        (OldValues::Field(_), OutputData::Signal(_)) => {
            unreachable!("field seed for a signal target")
        }
    }
}
