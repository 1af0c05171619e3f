// cardinality.rs — Cardinality modes and the input-driven resolver
//
// Every block declares how it treats the one/many axis. The resolver
// folds the cardinalities of a block's wired inputs into the block's
// output cardinality, applying the block's broadcast policy when signals
// and fields meet at the same block.
//
// Preconditions: input cardinalities are already concrete (unification
//   has run).
// Postconditions: a resolution is either a concrete output cardinality
//   or a typed refusal naming the two sides.
// Failure modes: `CardinalityError` (mismatch or missing broadcast
//   expression).
// Side effects: none.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::canon::Cardinality;

// ── Block-declared behavior ──────────────────────────────────────────────

/// How a block's output cardinality follows from its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardinalityMode {
    /// Output mirrors the inputs: all-one stays one, any-many goes many
    /// (subject to the broadcast policy when mixed).
    Preserve,
    /// Output is always one, whatever the inputs are. Reductions.
    SignalOnly,
    /// Output is always many; the block only makes sense per-element.
    FieldOnly,
    /// The block itself decides (e.g., a spawner turning one into many).
    Transform,
}

/// Whether a per-element computation may read lanes other than its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LaneCoupling {
    /// Each lane depends only on the same lane of each input.
    LaneLocal,
    /// A lane may read every lane of an input (neighbor access,
    /// reductions). Coupled inputs must be fully materialized before
    /// the consumer runs.
    LaneCoupled,
}

/// What happens when a one-cardinality input meets a many-cardinality
/// input at the same block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BroadcastPolicy {
    /// Silently lift the signal to every lane; the result is many.
    AllowZipSig,
    /// Refuse the mix outright.
    DisallowSignalMix,
    /// Allow the mix only when the block's designated broadcast port is
    /// wired; refuse otherwise.
    RequireBroadcastExpr,
}

// ── Resolution errors ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardinalityError {
    /// Signals and fields met under `DisallowSignalMix`.
    Mismatch {
        one_count: usize,
        many_count: usize,
    },
    /// Signals and fields met under `RequireBroadcastExpr` and the
    /// broadcast port is not wired.
    BroadcastExprRequired { broadcast_port: &'static str },
}

impl fmt::Display for CardinalityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardinalityError::Mismatch {
                one_count,
                many_count,
            } => write!(
                f,
                "cannot mix {} signal input(s) with {} field input(s) here",
                one_count, many_count
            ),
            CardinalityError::BroadcastExprRequired { broadcast_port } => write!(
                f,
                "mixing a signal with a field requires the '{}' port to be wired",
                broadcast_port
            ),
        }
    }
}

// ── Resolver ─────────────────────────────────────────────────────────────

/// Resolve a block's output cardinality from its wired inputs.
///
/// Resolution precedence:
///   1. `SignalOnly` and `FieldOnly` fix the output unconditionally.
///   2. `Transform` returns `None`; the block's lowering decides.
///   3. `Preserve` folds the inputs: no inputs or all-one gives one,
///      all-many gives many, and a mix consults the broadcast policy.
pub fn resolve_output_cardinality(
    mode: CardinalityMode,
    policy: BroadcastPolicy,
    broadcast_port: Option<&'static str>,
    has_broadcast_expr: bool,
    inputs: &[Cardinality],
) -> Result<Option<Cardinality>, CardinalityError> {
    match mode {
        CardinalityMode::SignalOnly => Ok(Some(Cardinality::One)),
        CardinalityMode::FieldOnly => Ok(Some(Cardinality::Many)),
        CardinalityMode::Transform => Ok(None),
        CardinalityMode::Preserve => {
            let one_count = inputs.iter().filter(|c| **c == Cardinality::One).count();
            let many_count = inputs.len() - one_count;

            if many_count == 0 {
                // Covers the no-input case too: sources default to one.
                return Ok(Some(Cardinality::One));
            }
            if one_count == 0 {
                return Ok(Some(Cardinality::Many));
            }
            match policy {
                BroadcastPolicy::AllowZipSig => Ok(Some(Cardinality::Many)),
                BroadcastPolicy::DisallowSignalMix => Err(CardinalityError::Mismatch {
                    one_count,
                    many_count,
                }),
                BroadcastPolicy::RequireBroadcastExpr => {
                    if has_broadcast_expr {
                        Ok(Some(Cardinality::Many))
                    } else {
                        Err(CardinalityError::BroadcastExprRequired {
                            broadcast_port: broadcast_port.unwrap_or("broadcast"),
                        })
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Cardinality::{Many, One};

    fn preserve(
        policy: BroadcastPolicy,
        has_expr: bool,
        inputs: &[Cardinality],
    ) -> Result<Option<Cardinality>, CardinalityError> {
        resolve_output_cardinality(
            CardinalityMode::Preserve,
            policy,
            Some("which"),
            has_expr,
            inputs,
        )
    }

    #[test]
    fn preserve_with_no_inputs_is_one() {
        let got = preserve(BroadcastPolicy::AllowZipSig, false, &[]);
        assert_eq!(got, Ok(Some(One)));
    }

    #[test]
    fn preserve_uniform_inputs_mirror() {
        assert_eq!(
            preserve(BroadcastPolicy::DisallowSignalMix, false, &[One, One]),
            Ok(Some(One))
        );
        assert_eq!(
            preserve(BroadcastPolicy::DisallowSignalMix, false, &[Many, Many]),
            Ok(Some(Many))
        );
    }

    #[test]
    fn mixed_inputs_zip_under_allow() {
        assert_eq!(
            preserve(BroadcastPolicy::AllowZipSig, false, &[One, Many]),
            Ok(Some(Many))
        );
    }

    #[test]
    fn mixed_inputs_refused_under_disallow() {
        assert_eq!(
            preserve(BroadcastPolicy::DisallowSignalMix, false, &[One, Many, Many]),
            Err(CardinalityError::Mismatch {
                one_count: 1,
                many_count: 2,
            })
        );
    }

    #[test]
    fn mixed_inputs_need_the_broadcast_port() {
        assert_eq!(
            preserve(BroadcastPolicy::RequireBroadcastExpr, false, &[One, Many]),
            Err(CardinalityError::BroadcastExprRequired {
                broadcast_port: "which",
            })
        );
        assert_eq!(
            preserve(BroadcastPolicy::RequireBroadcastExpr, true, &[One, Many]),
            Ok(Some(Many))
        );
    }

    #[test]
    fn fixed_modes_ignore_inputs() {
        assert_eq!(
            resolve_output_cardinality(
                CardinalityMode::SignalOnly,
                BroadcastPolicy::DisallowSignalMix,
                None,
                false,
                &[Many, Many]
            ),
            Ok(Some(One))
        );
        assert_eq!(
            resolve_output_cardinality(
                CardinalityMode::FieldOnly,
                BroadcastPolicy::DisallowSignalMix,
                None,
                false,
                &[One]
            ),
            Ok(Some(Many))
        );
        assert_eq!(
            resolve_output_cardinality(
                CardinalityMode::Transform,
                BroadcastPolicy::DisallowSignalMix,
                None,
                false,
                &[One]
            ),
            Ok(None)
        );
    }
}
