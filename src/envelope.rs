//! Lower envelope of equal-curvature parabolas, the row primitive shared by the
//! distance transform and the power map.
//!
//! A lane holds optional partial cells `c_j`; the pass replaces it with
//!
//! ```text
//!   out(x) = min_j (x - j)^2 + c_j.power
//! ```
//!
//! Running one pass per axis composes the exact `D`-dimensional minimum. Within a
//! pass every lane is independent, so lanes are processed in parallel and the end
//! of the pass is the only synchronisation point.

use ndarray::{ArrayD, ArrayView1, ArrayViewMut1, Axis, Zip};
use tracing::debug_span;

use crate::power::{PowerCell, PowerValue};

/// Partial field cell: `None` until some site reaches the point.
pub(crate) type Slot<V, const D: usize> = Option<PowerCell<V, D>>;

/// How owners of tied parabolas are merged.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct TieRule {
    /// Keep every tied owner, or only the smallest one.
    pub keep_all: bool,
    /// Values closer than this are tied (ignored by exact value types).
    pub tolerance: f64,
}

impl TieRule {
    pub fn keep_all(tolerance: f64) -> Self {
        Self {
            keep_all: true,
            tolerance,
        }
    }

    pub fn keep_smallest() -> Self {
        Self {
            keep_all: false,
            tolerance: 0.,
        }
    }
}

/// Abscissa `numerator / denominator` where two parabolas cross; `denominator > 0`.
#[derive(Clone, Copy, Debug)]
struct Breakpoint<W> {
    numerator: W,
    denominator: i64,
}

impl<W> Breakpoint<W>
where
    W: Copy + PartialOrd + std::ops::Mul<Output = W>,
{
    /// `self < other`, compared without division.
    fn precedes<V: PowerValue<Wide = W>>(&self, other: &Self) -> bool {
        self.numerator * V::wide(other.denominator) < other.numerator * V::wide(self.denominator)
    }

    /// `self < x`.
    fn before<V: PowerValue<Wide = W>>(&self, x: i64) -> bool {
        self.numerator < V::wide(x) * V::wide(self.denominator)
    }
}

/// Where the parabola with apex `left` (offset `left_value`) is overtaken by the one
/// at `right > left`.
///
/// ```text
///   (x - l)^2 + a = (x - r)^2 + b   =>   x = ((b + r^2) - (a + l^2)) / (2 (r - l))
/// ```
fn breakpoint<V: PowerValue>(
    left: i64,
    left_value: V,
    right: i64,
    right_value: V,
) -> Breakpoint<V::Wide> {
    let left_root = left_value.widen() + V::wide(left * left);
    let right_root = right_value.widen() + V::wide(right * right);
    Breakpoint {
        numerator: right_root - left_root,
        denominator: 2 * (right - left),
    }
}

/// Value of the parabola rooted at lane position `apex` (offset `value`) at `x`.
#[inline]
fn parabola_at<V: PowerValue>(apex: usize, value: V, x: i64) -> V {
    let offset = x - apex as i64;
    value.plus_squared(offset * offset)
}

/// Lane abscissas where the dropped parabola `(apex, value)` comes within `tolerance`
/// of its neighbours `left` and `right`.
///
/// The gap to `min(left, right)` is V-shaped with its bottom where `left` and `right`
/// cross and slopes of at least 2, so only abscissas near that crossing qualify.
fn near_ties<V: PowerValue>(
    (apex, value): (usize, V),
    left: (usize, V),
    right: (usize, V),
    tolerance: f64,
    len: usize,
) -> impl Iterator<Item = usize> {
    let crossing = breakpoint(left.0 as i64, left.1, right.0 as i64, right.1);
    let center = V::wide_to_f64(crossing.numerator) / crossing.denominator as f64;
    let reach = tolerance / 2. + 1.;
    let first = (center - reach).floor().max(0.);
    let last = (center + reach).ceil().min(len as f64 - 1.);
    let range = if first <= last {
        first as usize..last as usize + 1
    } else {
        0..0
    };
    range.filter(move |&x| {
        let x = x as i64;
        let from_left = parabola_at(left.0, left.1, x);
        let from_right = parabola_at(right.0, right.1, x);
        let envelope = if from_left <= from_right { from_left } else { from_right };
        parabola_at(apex, value, x).ties(envelope, tolerance)
    })
}

/// Reduces one lane. `target` must start filled with `None`.
pub(crate) fn lower_envelope<V: PowerValue, const D: usize>(
    source: ArrayView1<'_, Slot<V, D>>,
    mut target: ArrayViewMut1<'_, Slot<V, D>>,
    rule: TieRule,
) {
    // (apex position, offset) of the parabolas on the envelope, left to right,
    // and where each one is overtaken by its successor.
    let mut hull: Vec<(usize, V)> = Vec::new();
    let mut ends: Vec<Breakpoint<V::Wide>> = Vec::new();
    // (abscissa, apex) of dropped parabolas that still tie the envelope there.
    let mut shadows: Vec<(usize, usize)> = Vec::new();

    for (apex, slot) in source.iter().enumerate() {
        let Some(cell) = slot else { continue };
        loop {
            let Some(&(top, top_value)) = hull.last() else {
                hull.push((apex, cell.power));
                break;
            };
            let start = breakpoint(top as i64, top_value, apex as i64, cell.power);
            // Only drop `top` if it is strictly above the envelope everywhere; a parabola
            // touching it at a single abscissa still owns a tie there.
            if ends.last().is_some_and(|top_start| start.precedes::<V>(top_start)) {
                let left = hull[hull.len() - 2];
                let right = (apex, cell.power);
                let near = near_ties((top, top_value), left, right, rule.tolerance, source.len());
                shadows.extend(near.map(|x| (x, top)));
                hull.pop();
                ends.pop();
                continue;
            }
            hull.push((apex, cell.power));
            ends.push(start);
            break;
        }
    }

    if hull.is_empty() {
        return;
    }
    shadows.sort_unstable();
    shadows.dedup();

    let mut active = 0;
    let mut shadow = 0;
    for (x, out) in target.iter_mut().enumerate() {
        let at = x;
        let x = x as i64;
        while active < ends.len() && ends[active].before::<V>(x) {
            active += 1;
        }

        let (apex, value) = hull[active];
        let best = parabola_at(apex, value, x);

        // Values along the hull are unimodal around `active`, so ties are contiguous.
        let mut first = active;
        while first > 0 {
            let (apex, value) = hull[first - 1];
            if !parabola_at(apex, value, x).ties(best, rule.tolerance) {
                break;
            }
            first -= 1;
        }
        let mut last = active;
        while last + 1 < hull.len() {
            let (apex, value) = hull[last + 1];
            if !parabola_at(apex, value, x).ties(best, rule.tolerance) {
                break;
            }
            last += 1;
        }

        let mut tied: Vec<usize> = hull[first..=last].iter().map(|&(apex, _)| apex).collect();
        while shadow < shadows.len() && shadows[shadow].0 < at {
            shadow += 1;
        }
        while shadow < shadows.len() && shadows[shadow].0 == at {
            let apex = shadows[shadow].1;
            if let Some(cell) = &source[apex] {
                if parabola_at(apex, cell.power, x).ties(best, rule.tolerance) {
                    tied.push(apex);
                }
            }
            shadow += 1;
        }

        let tied = tied.iter().filter_map(|&apex| source[apex].as_ref());
        let owners = if rule.keep_all {
            let mut owners: Vec<_> = tied.flat_map(|cell| cell.owners.iter().copied()).collect();
            owners.sort_unstable();
            owners.dedup();
            owners
        } else {
            tied.filter_map(|cell| cell.owners.first().copied())
                .min()
                .into_iter()
                .collect()
        };

        *out = Some(PowerCell {
            power: best,
            owners,
            squared_distance: 0,
        });
    }
}

/// Runs one envelope pass per axis over `seeds`, lanes in parallel.
pub(crate) fn separable_transform<V: PowerValue, const D: usize>(
    seeds: ArrayD<Slot<V, D>>,
    rule: TieRule,
) -> ArrayD<Slot<V, D>> {
    let mut field = seeds;
    for axis in 0..field.ndim() {
        let lanes = field.len() / field.len_of(Axis(axis)).max(1);
        let _span = debug_span!("envelope_pass", axis, lanes).entered();
        let mut next: ArrayD<Slot<V, D>> = ArrayD::from_elem(field.raw_dim(), None);
        Zip::from(field.lanes(Axis(axis)))
            .and(next.lanes_mut(Axis(axis)))
            .par_for_each(|source, target| lower_envelope(source, target, rule));
        field = next;
    }
    field
}
