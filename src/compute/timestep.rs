//! Time-step selection - Courant and volume-change limits.
//!
//! Every chunk computes its own recommendation and commits it to a shared
//! [`DtBoard`]. The board keeps the tightest committed recommendation with a
//! compare-and-swap loop, so no lock is taken and the result does not depend
//! on the order in which chunks finish.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use super::FUZZ;
use crate::mesh::ZoneId;

/// Starting value of every chunk recommendation.
pub const DT_DEFAULT: f64 = 1e99;

/// What limited a recommended time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtLimit {
    /// Nothing in the chunk limited the step.
    Default,
    /// Signal crossing time of a zone.
    Courant(Option<ZoneId>),
    /// Relative volume change of a zone over the last cycle.
    VolumeChange(Option<ZoneId>),
    /// Driver maximum time step.
    Maximum,
    /// Driver initial time step.
    Initial,
    /// Driver growth limit relative to the previous step.
    Growth,
    /// Shortened to land on the stop time.
    StopTime,
}

impl DtLimit {
    /// Zone responsible for the limit, if any.
    pub fn zone(&self) -> Option<ZoneId> {
        match *self {
            DtLimit::Courant(z) | DtLimit::VolumeChange(z) => z,
            _ => None,
        }
    }
}

impl fmt::Display for DtLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // -1 names "no zone", as in the solver's historical log format
        let z = |zone: &Option<ZoneId>| zone.map_or(-1, |z| z.index() as i64);
        match self {
            DtLimit::Default => write!(f, "Hydro default"),
            DtLimit::Courant(zone) => write!(f, "Hydro Courant limit for z = {}", z(zone)),
            DtLimit::VolumeChange(zone) => write!(f, "Hydro dV/V limit for z = {}", z(zone)),
            DtLimit::Maximum => write!(f, "Global maximum (dtmax)"),
            DtLimit::Initial => write!(f, "Initial timestep"),
            DtLimit::Growth => write!(f, "Multiple of old timestep"),
            DtLimit::StopTime => write!(f, "Hydro cycle limited by stop time"),
        }
    }
}

/// A recommended time step with the reason for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStep {
    pub dt: f64,
    pub limit: DtLimit,
    /// Subdomain that produced the recommendation.
    pub subdomain: usize,
}

impl TimeStep {
    pub fn new(dt: f64, limit: DtLimit, subdomain: usize) -> Self {
        Self { dt, limit, subdomain }
    }

    /// The unconstrained recommendation every chunk starts from.
    pub fn hydro_default(subdomain: usize) -> Self {
        Self::new(DT_DEFAULT, DtLimit::Default, subdomain)
    }

    /// Total order used by every reduction: smaller `dt` first, then lower
    /// subdomain, then lower zone. Recommendations without a zone sort last.
    pub fn order(&self, other: &Self) -> Ordering {
        self.dt
            .total_cmp(&other.dt)
            .then(self.subdomain.cmp(&other.subdomain))
            .then(self.zone_key().cmp(&other.zone_key()))
    }

    #[inline]
    pub fn is_tighter_than(&self, other: &Self) -> bool {
        self.order(other) == Ordering::Less
    }

    /// Associative, commutative combine for global minimum reductions.
    pub fn tightest(self, other: Self) -> Self {
        if other.is_tighter_than(&self) { other } else { self }
    }

    /// Diagnostic message for logs.
    pub fn message(&self) -> String {
        self.limit.to_string()
    }

    fn zone_key(&self) -> usize {
        self.limit.zone().map_or(usize::MAX, ZoneId::index)
    }
}

/// Courant limit over the zones `zones`; slices are chunk-local.
///
/// Returns the smallest `dl * cfl / max(dvel, cs, fuzz)` and the first zone
/// attaining it, or `(1e99, None)` when no zone goes below that.
pub fn calc_dt_courant(
    zones: Range<usize>,
    zone_dl: &[f64],
    velocity_diff: &[f64],
    sound_speed: &[f64],
    cfl: f64,
) -> (f64, Option<ZoneId>) {
    let mut dt_min = DT_DEFAULT;
    let mut zone_min = None;
    for (i, z) in zones.enumerate() {
        let cdu = velocity_diff[i].max(sound_speed[i]).max(FUZZ);
        let dt = zone_dl[i] * cfl / cdu;
        if dt < dt_min {
            dt_min = dt;
            zone_min = Some(ZoneId::new(z));
        }
    }
    (dt_min, zone_min)
}

/// Volume-change limit over the zones `zones`; slices are chunk-local.
///
/// Finds the largest `|(vol - vol0) / vol0|` (first zone wins ties, floor
/// `fuzz`) and returns `dt_last * cflv / dvov_max` with that zone.
pub fn calc_dt_volume(
    zones: Range<usize>,
    vol: &[f64],
    vol0: &[f64],
    dt_last: f64,
    cflv: f64,
) -> (f64, Option<ZoneId>) {
    let mut dvov_max = FUZZ;
    let mut zone_max = None;
    for (i, z) in zones.enumerate() {
        let dvov = ((vol[i] - vol0[i]) / vol0[i]).abs();
        if dvov > dvov_max {
            dvov_max = dvov;
            zone_max = Some(ZoneId::new(z));
        }
    }
    (dt_last * cflv / dvov_max, zone_max)
}

/// Chunk-local inputs to [`calc_dt_hydro`].
pub struct DtInput<'a> {
    pub zones: Range<usize>,
    pub zone_dl: &'a [f64],
    pub velocity_diff: &'a [f64],
    pub sound_speed: &'a [f64],
    pub vol: &'a [f64],
    pub vol0: &'a [f64],
}

/// Recommendation for one chunk: default, replaced by Courant if smaller,
/// replaced by the volume limit if smaller still.
pub fn calc_dt_hydro(
    input: &DtInput<'_>,
    dt_last: f64,
    cfl: f64,
    cflv: f64,
    subdomain: usize,
) -> TimeStep {
    let mut rec = TimeStep::hydro_default(subdomain);

    let (dt, zone) = calc_dt_courant(
        input.zones.clone(),
        input.zone_dl,
        input.velocity_diff,
        input.sound_speed,
        cfl,
    );
    if dt < rec.dt {
        rec = TimeStep::new(dt, DtLimit::Courant(zone), subdomain);
    }

    let (dt, zone) = calc_dt_volume(input.zones.clone(), input.vol, input.vol0, dt_last, cflv);
    if dt < rec.dt {
        rec = TimeStep::new(dt, DtLimit::VolumeChange(zone), subdomain);
    }

    rec
}

const NO_CHUNK: usize = usize::MAX;

/// Lock-free process-wide minimum of chunk recommendations.
///
/// Each chunk owns one write-once slot. A commit publishes the candidate in
/// its slot and then swings `best` to that slot while the candidate is
/// strictly tighter than the incumbent.
pub struct DtBoard {
    floor: TimeStep,
    slots: Vec<OnceLock<TimeStep>>,
    best: AtomicUsize,
}

impl DtBoard {
    pub fn new(num_chunks: usize, floor: TimeStep) -> Self {
        Self {
            floor,
            slots: (0..num_chunks).map(|_| OnceLock::new()).collect(),
            best: AtomicUsize::new(NO_CHUNK),
        }
    }

    /// Offer `candidate` on behalf of `chunk`. A chunk commits at most once;
    /// later offers from the same chunk are ignored.
    pub fn commit(&self, chunk: usize, candidate: TimeStep) {
        if !candidate.is_tighter_than(&self.floor) {
            return;
        }
        if self.slots[chunk].set(candidate).is_err() {
            return;
        }

        let mut current = self.best.load(AtomicOrdering::Acquire);
        loop {
            if !candidate.is_tighter_than(self.incumbent(current)) {
                return;
            }
            match self.best.compare_exchange_weak(
                current,
                chunk,
                AtomicOrdering::AcqRel,
                AtomicOrdering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// The tightest recommendation committed so far, or the floor.
    pub fn best(&self) -> TimeStep {
        *self.incumbent(self.best.load(AtomicOrdering::Acquire))
    }

    fn incumbent(&self, chunk: usize) -> &TimeStep {
        if chunk == NO_CHUNK {
            return &self.floor;
        }
        // slots are filled before their index is published
        self.slots[chunk].get().unwrap_or(&self.floor)
    }
}
