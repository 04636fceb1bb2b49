//! Collision avoidance for grafted cohorts
//!
//! Geometry runs in a rank frame derived from `rankdir` and the anchor
//! side: the rank axis points from the anchor toward the cohort, the cross
//! axis is perpendicular. Everything here is in engine space.
//!
//! The slide threshold starts at the anchor's far face and advances past any
//! existing vertex straddling it, so every existing vertex ends up either
//! wholly before the threshold (untouched) or wholly beyond it (a slide
//! candidate). A cohort that starts before the threshold is pushed past it.
//! Candidates on each side of the cohort's cross midline then move away by
//! one shared distance: the least that clears the cohort's collision window.

use crate::model::{LayoutVertex, Point, RankDir};

use super::cohort::AnchorSide;

const EPSILON: f64 = 1e-6;

/// Closed interval on one axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub lo: f64,
    pub hi: f64,
}

impl Span {
    pub fn around(center: f64, half: f64) -> Self {
        Self { lo: center - half, hi: center + half }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.lo < other.hi - EPSILON && other.lo < self.hi - EPSILON
    }

    pub fn expand(&self, margin: f64) -> Self {
        Self { lo: self.lo - margin, hi: self.hi + margin }
    }

    pub fn shift(&self, d: f64) -> Self {
        Self { lo: self.lo + d, hi: self.hi + d }
    }

    pub fn union(&self, other: &Span) -> Self {
        Self { lo: self.lo.min(other.lo), hi: self.hi.max(other.hi) }
    }

    pub fn mid(&self) -> f64 {
        (self.lo + self.hi) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankFrame {
    vertical: bool,
    sign: f64,
}

impl RankFrame {
    pub fn new(rankdir: RankDir, side: AnchorSide) -> Self {
        // downstream direction in y-up engine space
        let (vertical, downstream) = match rankdir {
            RankDir::TB => (true, -1.0),
            RankDir::BT => (true, 1.0),
            RankDir::LR => (false, 1.0),
            RankDir::RL => (false, -1.0),
        };
        let sign = match side {
            AnchorSide::Source => downstream,
            AnchorSide::Target => -downstream,
        };
        Self { vertical, sign }
    }

    pub fn rank_span(&self, v: &LayoutVertex) -> Span {
        let (center, half) = if self.vertical { (v.top, v.height) } else { (v.left, v.width) };
        Span::around(self.sign * center, half / 2.0)
    }

    pub fn cross_span(&self, v: &LayoutVertex) -> Span {
        let (center, half) = if self.vertical { (v.left, v.width) } else { (v.top, v.height) };
        Span::around(center, half / 2.0)
    }

    /// Engine-space offset for a move along the rank axis
    pub fn rank_offset(&self, d: f64) -> (f64, f64) {
        if self.vertical {
            (0.0, self.sign * d)
        } else {
            (self.sign * d, 0.0)
        }
    }

    /// Engine-space offset for a move along the cross axis
    pub fn cross_offset(&self, d: f64) -> (f64, f64) {
        if self.vertical {
            (d, 0.0)
        } else {
            (0.0, d)
        }
    }
}

/// Which way an existing vertex slides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideSide {
    Upper,
    Lower,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlidePlan {
    pub threshold: f64,
    /// Distance the cohort moves along the rank axis
    pub cohort_push: f64,
    pub upper_shift: f64,
    pub lower_shift: f64,
    /// Indices into the existing vertices, with their side
    pub candidates: Vec<(usize, SlideSide)>,
}

impl SlidePlan {
    pub fn slides(&self) -> bool {
        self.upper_shift > 0.0 || self.lower_shift > 0.0
    }

    /// Engine-space offset for a candidate on the given side
    pub fn offset_for(&self, frame: &RankFrame, side: SlideSide) -> (f64, f64) {
        match side {
            SlideSide::Upper => frame.cross_offset(self.upper_shift),
            SlideSide::Lower => frame.cross_offset(-self.lower_shift),
        }
    }
}

fn union_spans(spans: impl Iterator<Item = Span>) -> Option<Span> {
    spans.reduce(|a, b| a.union(&b))
}

/// Plans where the cohort goes and how far each side of existing vertices
/// must slide. `cohort` is already aligned to the anchor and excludes it;
/// `existing` excludes the anchor too.
pub fn plan_slide(
    frame: &RankFrame,
    anchor: &LayoutVertex,
    cohort: &[LayoutVertex],
    existing: &[&LayoutVertex],
    rank_margin: f64,
    cross_margin: f64,
) -> SlidePlan {
    let mut threshold = frame.rank_span(anchor).hi;
    loop {
        let straddler = existing
            .iter()
            .map(|v| frame.rank_span(v))
            .filter(|s| s.lo < threshold - EPSILON && s.hi > threshold + EPSILON)
            .map(|s| s.hi)
            .reduce(f64::max);
        match straddler {
            Some(hi) => threshold = hi,
            None => break,
        }
    }

    let (Some(cohort_rank), Some(cohort_cross)) = (
        union_spans(cohort.iter().map(|v| frame.rank_span(v))),
        union_spans(cohort.iter().map(|v| frame.cross_span(v))),
    ) else {
        return SlidePlan {
            threshold,
            cohort_push: 0.0,
            upper_shift: 0.0,
            lower_shift: 0.0,
            candidates: Vec::new(),
        };
    };

    let cohort_push = if cohort_rank.lo < threshold - EPSILON {
        threshold + rank_margin - cohort_rank.lo
    } else {
        0.0
    };
    let window_rank = cohort_rank.shift(cohort_push).expand(rank_margin);
    let window_cross = cohort_cross.expand(cross_margin);
    let midline = cohort_cross.mid();

    let mut upper_shift: f64 = 0.0;
    let mut lower_shift: f64 = 0.0;
    let mut candidates = Vec::new();

    for (i, v) in existing.iter().enumerate() {
        let rank = frame.rank_span(v);
        if rank.lo < threshold - EPSILON {
            continue;
        }
        let cross = frame.cross_span(v);
        let side = if cross.mid() >= midline { SlideSide::Upper } else { SlideSide::Lower };
        candidates.push((i, side));

        if !rank.overlaps(&window_rank) || !cross.overlaps(&window_cross) {
            continue;
        }
        match side {
            SlideSide::Upper => upper_shift = upper_shift.max(window_cross.hi - cross.lo),
            SlideSide::Lower => lower_shift = lower_shift.max(cross.hi - window_cross.lo),
        }
    }

    SlidePlan { threshold, cohort_push, upper_shift, lower_shift, candidates }
}

/// Prepends a straight cubic segment from `start` to the path's first point.
pub fn prepend_segment(points: &mut Vec<Point>, start: Point) {
    let Some(&first) = points.first() else {
        points.push(start);
        return;
    };
    let mut path = cubic_segment(start, first)[..3].to_vec();
    path.append(points);
    *points = path;
}

/// Appends a straight cubic segment from the path's last point to `end`.
pub fn append_segment(points: &mut Vec<Point>, end: Point) {
    let Some(&last) = points.last() else {
        points.push(end);
        return;
    };
    let segment = cubic_segment(last, end);
    points.extend_from_slice(&segment[1..]);
}

/// Four control points of a straight cubic segment
pub fn cubic_segment(a: Point, b: Point) -> [Point; 4] {
    let lerp = |t: f64| Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t);
    [a, lerp(1.0 / 3.0), lerp(2.0 / 3.0), b]
}
