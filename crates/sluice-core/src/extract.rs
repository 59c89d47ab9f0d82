//! Conservative predicate extraction.
//!
//! Extraction walks only through conjunctions. Each comparison leaf is offered
//! to the source's vocabulary, which keeps what it understands and refuses the
//! rest. Disjunctions, negations and opaque nodes are skipped whole. The host
//! still evaluates the full filter on every returned row, so skipping never
//! changes results, only how much data crosses the wire.

use tracing::trace;

use crate::expr::{Comparison, FilterExpr};

/// A per-source set of filter fields the remote API can apply natively.
pub trait FilterVocabulary: Default {
    /// Record `comparison` if it names a known field with a supported
    /// operator and literal type. Returns whether it was recorded.
    fn accept(&mut self, comparison: &Comparison) -> bool;

    /// True when no constraint has been recorded.
    fn is_empty(&self) -> bool;
}

/// Populate a fresh vocabulary from `expr`. Never fails.
pub fn extract<V: FilterVocabulary>(expr: &FilterExpr) -> V {
    let mut vocabulary = V::default();
    collect(expr, &mut vocabulary);
    vocabulary
}

fn collect<V: FilterVocabulary>(expr: &FilterExpr, vocabulary: &mut V) {
    match expr {
        FilterExpr::And(left, right) => {
            collect(left, vocabulary);
            collect(right, vocabulary);
        }
        FilterExpr::Compare(comparison) => {
            if !vocabulary.accept(comparison) {
                trace!(
                    field = %comparison.field,
                    op = %comparison.op,
                    "comparison not pushed down"
                );
            }
        }
        FilterExpr::Or(..) | FilterExpr::Not(..) | FilterExpr::Other => {}
    }
}
