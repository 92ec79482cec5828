//! Swing-point search shared by the divergence, structure and retracement
//! analyzers.
//!
//! A swing high at `i` is strictly greater than every value within `order`
//! positions on either side (mirror for lows). Plateaus therefore never
//! produce swings, so a flat series has none.

use rust_decimal::Decimal;

use crate::types::{SwingKind, SwingPoint};

pub fn local_maxima(values: &[Decimal], order: usize) -> Vec<usize> {
    local_extrema(values, order, |candidate, other| candidate > other)
}

pub fn local_minima(values: &[Decimal], order: usize) -> Vec<usize> {
    local_extrema(values, order, |candidate, other| candidate < other)
}

fn local_extrema(
    values: &[Decimal],
    order: usize,
    beats: impl Fn(Decimal, Decimal) -> bool,
) -> Vec<usize> {
    let n = values.len();
    if order == 0 || n < 2 * order + 1 {
        return Vec::new();
    }
    (order..n - order)
        .filter(|&i| {
            let v = values[i];
            values[i - order..i].iter().all(|&o| beats(v, o))
                && values[i + 1..=i + order].iter().all(|&o| beats(v, o))
        })
        .collect()
}

/// Drop swings closer than `min_separation` to their predecessor, keeping
/// the more extreme of each clashing pair.
pub fn enforce_separation(
    indices: &[usize],
    values: &[Decimal],
    min_separation: usize,
    kind: SwingKind,
) -> Vec<usize> {
    let mut kept: Vec<usize> = Vec::with_capacity(indices.len());
    for &idx in indices {
        match kept.last().copied() {
            Some(prev) if idx - prev < min_separation => {
                let more_extreme = match kind {
                    SwingKind::High => values[idx] > values[prev],
                    SwingKind::Low => values[idx] < values[prev],
                };
                if more_extreme {
                    if let Some(last) = kept.last_mut() {
                        *last = idx;
                    }
                }
            }
            _ => kept.push(idx),
        }
    }
    kept
}

/// Swing highs on `highs` and swing lows on `lows`, oldest first.
pub fn swing_points(
    highs: &[Decimal],
    lows: &[Decimal],
    order: usize,
) -> (Vec<SwingPoint>, Vec<SwingPoint>) {
    let sh = local_maxima(highs, order)
        .into_iter()
        .map(|index| SwingPoint {
            index,
            price: highs[index],
            kind: SwingKind::High,
        })
        .collect();
    let sl = local_minima(lows, order)
        .into_iter()
        .map(|index| SwingPoint {
            index,
            price: lows[index],
            kind: SwingKind::Low,
        })
        .collect();
    (sh, sl)
}
