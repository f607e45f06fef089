use std::cmp::{max, min};
use std::fmt::{Display, Formatter};

use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::error::{EngineError, EngineResult};
use crate::ir::module::CmpPred;
use crate::ir::typing::MAX_SCALAR_BITS;

/// Per-run sentinel configuration
///
/// The `min`/`max` sentinels stand for "unbounded toward -inf/+inf". They
/// live one bit beyond the widest bit-width observed in the program under
/// analysis, so they are distinct from every representable value. The
/// context is threaded explicitly through every Range operation; there is
/// no process-wide state.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct AnalysisContext {
    max_bits: u32,
    min: BigInt,
    max: BigInt,
}

impl AnalysisContext {
    pub fn new(max_bits: u32) -> EngineResult<Self> {
        if max_bits == 0 || max_bits > MAX_SCALAR_BITS {
            return Err(EngineError::InvariantViolation(format!(
                "bit-width out of range: {}",
                max_bits
            )));
        }
        let max = (BigInt::one() << (max_bits + 1)) - 1;
        let min = -(BigInt::one() << (max_bits + 1));
        Ok(Self { max_bits, min, max })
    }

    pub fn max_bits(&self) -> u32 {
        self.max_bits
    }

    pub fn min(&self) -> &BigInt {
        &self.min
    }

    pub fn max(&self) -> &BigInt {
        &self.max
    }

    /// Whether a bound sits at (or beyond) the lower sentinel
    pub fn is_min_bound(&self, v: &BigInt) -> bool {
        self.is_min(v)
    }

    /// Whether a bound sits at (or beyond) the upper sentinel
    pub fn is_max_bound(&self, v: &BigInt) -> bool {
        self.is_max(v)
    }

    /// Clamp a wide bound into the sentinel domain
    fn saturate(&self, v: BigInt) -> BigInt {
        if v <= self.min {
            self.min.clone()
        } else if v >= self.max {
            self.max.clone()
        } else {
            v
        }
    }

    fn is_min(&self, v: &BigInt) -> bool {
        v <= &self.min
    }

    fn is_max(&self, v: &BigInt) -> bool {
        v >= &self.max
    }
}

/// Signed minimum of a bit-width
pub fn signed_min_of(bits: u32) -> BigInt {
    -(BigInt::one() << (bits - 1))
}

/// Signed maximum of a bit-width
pub fn signed_max_of(bits: u32) -> BigInt {
    (BigInt::one() << (bits - 1)) - 1
}

/// Unsigned maximum of a bit-width
pub fn unsigned_max_of(bits: u32) -> BigInt {
    (BigInt::one() << bits) - 1
}

/// Minimum number of bits that losslessly represent `v`
fn needed_bits(v: &BigInt, signed: bool) -> u32 {
    if signed {
        if v.is_negative() {
            (-v - BigInt::one()).bits() as u32 + 1
        } else {
            v.bits() as u32 + 1
        }
    } else {
        max(v.bits() as u32, 1)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum RangeKind {
    /// lattice top, not yet analyzed
    Unknown,
    /// contiguous interval [lower, upper]
    Regular,
    /// complement of the stored interval
    Anti,
    /// lattice bottom, unreachable
    Empty,
}

/// A tagged interval over a fixed bit-width
///
/// Bounds live in the signed wide-integer domain of the analysis context;
/// callers observing a Range clamp the bounds to the representable span of
/// its bit-width (see [`Range::signed_view`] / [`Range::unsigned_view`]).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Range {
    kind: RangeKind,
    bits: u32,
    lower: BigInt,
    upper: BigInt,
}

impl Range {
    pub fn unknown(bits: u32) -> Self {
        Self {
            kind: RangeKind::Unknown,
            bits,
            lower: BigInt::zero(),
            upper: BigInt::zero(),
        }
    }

    pub fn empty(bits: u32) -> Self {
        Self {
            kind: RangeKind::Empty,
            bits,
            lower: BigInt::zero(),
            upper: BigInt::zero(),
        }
    }

    pub fn full_set(bits: u32, ctx: &AnalysisContext) -> Self {
        Self {
            kind: RangeKind::Regular,
            bits,
            lower: ctx.min().clone(),
            upper: ctx.max().clone(),
        }
    }

    /// `[lower, upper]`; collapses to Empty when the bounds are inverted
    pub fn regular(bits: u32, lower: BigInt, upper: BigInt) -> Self {
        if lower > upper {
            return Self::empty(bits);
        }
        Self {
            kind: RangeKind::Regular,
            bits,
            lower,
            upper,
        }
    }

    pub fn constant(bits: u32, value: BigInt) -> Self {
        Self::regular(bits, value.clone(), value)
    }

    /// Complement of `[lower, upper]`, renormalized per the domain rules:
    /// a stored interval spanning the whole domain leaves nothing, and a
    /// stored interval touching a sentinel folds back into Regular.
    pub fn anti(bits: u32, lower: BigInt, upper: BigInt, ctx: &AnalysisContext) -> Self {
        if lower > upper {
            return Self::full_set(bits, ctx);
        }
        let at_min = ctx.is_min(&lower);
        let at_max = ctx.is_max(&upper);
        match (at_min, at_max) {
            (true, true) => Self::empty(bits),
            (true, false) => Self::regular(bits, upper + 1, ctx.max().clone()),
            (false, true) => Self::regular(bits, ctx.min().clone(), lower - 1),
            (false, false) => Self {
                kind: RangeKind::Anti,
                bits,
                lower,
                upper,
            },
        }
    }

    pub fn boolean(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::constant(1, BigInt::one()),
            Some(false) => Self::constant(1, BigInt::zero()),
            None => Self::regular(1, BigInt::zero(), BigInt::one()),
        }
    }

    pub fn kind(&self) -> RangeKind {
        self.kind
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Lower bound; meaningful for Regular ranges only (view an Anti range
    /// through [`Range::get_anti`] first)
    pub fn lower(&self) -> &BigInt {
        &self.lower
    }

    /// Upper bound; meaningful for Regular ranges only
    pub fn upper(&self) -> &BigInt {
        &self.upper
    }

    /// The excluded interval of an Anti range, viewed as Regular
    pub fn get_anti(&self) -> Self {
        Self {
            kind: RangeKind::Regular,
            bits: self.bits,
            lower: self.lower.clone(),
            upper: self.upper.clone(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.kind == RangeKind::Unknown
    }

    pub fn is_empty(&self) -> bool {
        self.kind == RangeKind::Empty
    }

    pub fn is_regular(&self) -> bool {
        self.kind == RangeKind::Regular
    }

    pub fn is_anti(&self) -> bool {
        self.kind == RangeKind::Anti
    }

    pub fn is_full_set(&self, ctx: &AnalysisContext) -> bool {
        self.is_regular() && ctx.is_min(&self.lower) && ctx.is_max(&self.upper)
    }

    pub fn is_constant(&self) -> bool {
        self.is_regular() && self.lower == self.upper
    }

    /// Bounds clamped to the signed representable span of the bit-width
    pub fn signed_view(&self) -> (BigInt, BigInt) {
        let smin = signed_min_of(self.bits);
        let smax = signed_max_of(self.bits);
        match self.kind {
            RangeKind::Regular => (
                max(self.lower.clone(), smin.clone()).min(smax.clone()),
                min(self.upper.clone(), smax.clone()).max(smin),
            ),
            _ => (smin, smax),
        }
    }

    /// Bounds clamped to the unsigned representable span of the bit-width;
    /// a sign-crossing interval degrades to the full unsigned span
    pub fn unsigned_view(&self) -> (BigInt, BigInt) {
        let umax = unsigned_max_of(self.bits);
        match self.kind {
            RangeKind::Regular => {
                if self.lower >= BigInt::zero() {
                    (
                        min(self.lower.clone(), umax.clone()),
                        min(self.upper.clone(), umax),
                    )
                } else if self.upper < BigInt::zero() {
                    // entirely negative: reinterpret both bounds modulo 2^bits
                    let modulus = BigInt::one() << self.bits;
                    let lo = &self.lower + &modulus;
                    let hi = &self.upper + &modulus;
                    if lo >= BigInt::zero() {
                        (lo, hi)
                    } else {
                        (BigInt::zero(), umax)
                    }
                } else {
                    (BigInt::zero(), umax)
                }
            }
            _ => (BigInt::zero(), umax),
        }
    }

    /// Keep the result only when it fits the bit-width in at least one of
    /// the signed/unsigned interpretations, judged by bits-needed; a bound
    /// already at a sentinel stays there (the side is unbounded anyway)
    fn best_range(bits: u32, lower: BigInt, upper: BigInt, ctx: &AnalysisContext) -> Self {
        if lower > upper {
            return Self::full_set(bits, ctx);
        }
        let lo_pinned = ctx.is_min(&lower);
        let hi_pinned = ctx.is_max(&upper);
        if lo_pinned || hi_pinned {
            return Self::regular(bits, ctx.saturate(lower), ctx.saturate(upper));
        }
        let signed_need = max(needed_bits(&lower, true), needed_bits(&upper, true));
        let unsigned_need = if lower.is_negative() {
            u32::MAX
        } else {
            max(needed_bits(&lower, false), needed_bits(&upper, false))
        };
        if min(signed_need, unsigned_need) <= bits {
            Self::regular(bits, lower, upper)
        } else {
            Self::full_set(bits, ctx)
        }
    }

    /// Common entry checks shared by every arithmetic operator
    fn arith_prologue(&self, other: &Self, bits: u32, ctx: &AnalysisContext) -> Option<Self> {
        if self.is_empty() || other.is_empty() {
            return Some(Self::empty(bits));
        }
        if self.is_unknown() || other.is_unknown() {
            return Some(Self::unknown(bits));
        }
        if self.is_full_set(ctx) || other.is_full_set(ctx) {
            return Some(Self::full_set(bits, ctx));
        }
        // no tight closed form over complements
        if self.is_anti() || other.is_anti() {
            return Some(Self::full_set(bits, ctx));
        }
        None
    }

    fn sat_add(ctx: &AnalysisContext, a: &BigInt, b: &BigInt) -> BigInt {
        if ctx.is_min(a) || ctx.is_min(b) {
            return ctx.min().clone();
        }
        if ctx.is_max(a) || ctx.is_max(b) {
            return ctx.max().clone();
        }
        ctx.saturate(a + b)
    }

    fn sat_sub(ctx: &AnalysisContext, a: &BigInt, b: &BigInt) -> BigInt {
        if ctx.is_min(a) || ctx.is_max(b) {
            return ctx.min().clone();
        }
        if ctx.is_max(a) || ctx.is_min(b) {
            return ctx.max().clone();
        }
        ctx.saturate(a - b)
    }

    fn has_sentinel_bound(&self, ctx: &AnalysisContext) -> bool {
        ctx.is_min(&self.lower) || ctx.is_max(&self.upper)
    }

    pub fn add(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        let bits = max(self.bits, other.bits);
        if let Some(out) = self.arith_prologue(other, bits, ctx) {
            return out;
        }
        let lower = Self::sat_add(ctx, &self.lower, &other.lower);
        let upper = Self::sat_add(ctx, &self.upper, &other.upper);
        Self::best_range(bits, lower, upper, ctx)
    }

    pub fn sub(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        let bits = max(self.bits, other.bits);
        if let Some(out) = self.arith_prologue(other, bits, ctx) {
            return out;
        }
        let lower = Self::sat_sub(ctx, &self.lower, &other.upper);
        let upper = Self::sat_sub(ctx, &self.upper, &other.lower);
        Self::best_range(bits, lower, upper, ctx)
    }

    pub fn mul(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        let bits = max(self.bits, other.bits);
        if let Some(out) = self.arith_prologue(other, bits, ctx) {
            return out;
        }
        if self.has_sentinel_bound(ctx) || other.has_sentinel_bound(ctx) {
            return Self::full_set(bits, ctx);
        }
        let corners = [
            &self.lower * &other.lower,
            &self.lower * &other.upper,
            &self.upper * &other.lower,
            &self.upper * &other.upper,
        ];
        let lower = corners.iter().min().unwrap().clone();
        let upper = corners.iter().max().unwrap().clone();
        Self::best_range(bits, ctx.saturate(lower), ctx.saturate(upper), ctx)
    }

    pub fn sdiv(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        let bits = max(self.bits, other.bits);
        if let Some(out) = self.arith_prologue(other, bits, ctx) {
            return out;
        }
        // divisor interval straddling (or containing) zero
        if other.lower <= BigInt::zero() && other.upper >= BigInt::zero() {
            return Self::full_set(bits, ctx);
        }
        if self.has_sentinel_bound(ctx) {
            return Self::full_set(bits, ctx);
        }
        let corners = [
            &self.lower / &other.lower,
            &self.lower / &other.upper,
            &self.upper / &other.lower,
            &self.upper / &other.upper,
        ];
        let lower = corners.iter().min().unwrap().clone();
        let upper = corners.iter().max().unwrap().clone();
        Self::best_range(bits, lower, upper, ctx)
    }

    pub fn udiv(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        let bits = max(self.bits, other.bits);
        if let Some(out) = self.arith_prologue(other, bits, ctx) {
            return out;
        }
        let (dl, du) = self.unsigned_view();
        let (cl, cu) = other.unsigned_view();
        if cl.is_zero() {
            return Self::full_set(bits, ctx);
        }
        Self::best_range(bits, &dl / &cu, &du / &cl, ctx)
    }

    pub fn srem(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        let bits = max(self.bits, other.bits);
        if let Some(out) = self.arith_prologue(other, bits, ctx) {
            return out;
        }
        if other.lower <= BigInt::zero() && other.upper >= BigInt::zero() {
            return Self::full_set(bits, ctx);
        }
        // |x % y| < max(|c|, |d|) and the sign follows the dividend
        let bound = max(other.lower.abs(), other.upper.abs()) - BigInt::one();
        let lower = if ctx.is_min(&self.lower) {
            -bound.clone()
        } else {
            max(-bound.clone(), min(self.lower.clone(), BigInt::zero()))
        };
        let upper = if ctx.is_max(&self.upper) {
            bound
        } else {
            min(bound, max(self.upper.clone(), BigInt::zero()))
        };
        Self::best_range(bits, lower, upper, ctx)
    }

    pub fn urem(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        let bits = max(self.bits, other.bits);
        if let Some(out) = self.arith_prologue(other, bits, ctx) {
            return out;
        }
        let (dl, du) = self.unsigned_view();
        let (cl, cu) = other.unsigned_view();
        if cl.is_zero() {
            return Self::full_set(bits, ctx);
        }
        if du < cl {
            // dividend provably below every divisor, remainder is identity
            return Self::regular(bits, dl, du);
        }
        Self::regular(bits, BigInt::zero(), cu - 1)
    }

    pub fn shl(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        let bits = max(self.bits, other.bits);
        if let Some(out) = self.arith_prologue(other, bits, ctx) {
            return out;
        }
        let (sl, su) = other.unsigned_view();
        // the shift amount must be provably inside [0, bits)
        if su >= BigInt::from(bits) {
            return Self::full_set(bits, ctx);
        }
        if self.has_sentinel_bound(ctx) {
            return Self::full_set(bits, ctx);
        }
        let s1 = sl.to_u32().unwrap_or(0);
        let s2 = su.to_u32().unwrap_or(0);
        let corners = [
            &self.lower << s1,
            &self.lower << s2,
            &self.upper << s1,
            &self.upper << s2,
        ];
        let lower = corners.iter().min().unwrap().clone();
        let upper = corners.iter().max().unwrap().clone();
        // headroom check: overflowing the width would wrap
        Self::best_range(bits, lower, upper, ctx)
    }

    pub fn lshr(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        let bits = max(self.bits, other.bits);
        if let Some(out) = self.arith_prologue(other, bits, ctx) {
            return out;
        }
        let (sl, su) = other.unsigned_view();
        if su >= BigInt::from(bits) {
            return Self::full_set(bits, ctx);
        }
        let s1 = sl.to_u32().unwrap_or(0);
        let s2 = su.to_u32().unwrap_or(0);
        let (dl, du) = self.unsigned_view();
        Self::regular(bits, dl >> s2, du >> s1)
    }

    pub fn ashr(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        let bits = max(self.bits, other.bits);
        if let Some(out) = self.arith_prologue(other, bits, ctx) {
            return out;
        }
        let (sl, su) = other.unsigned_view();
        if su >= BigInt::from(bits) {
            return Self::full_set(bits, ctx);
        }
        let s1 = sl.to_u32().unwrap_or(0);
        let s2 = su.to_u32().unwrap_or(0);
        let (dl, du) = self.signed_view();
        let corners = [&dl >> s1, &dl >> s2, &du >> s1, &du >> s2];
        let lower = corners.iter().min().unwrap().clone();
        let upper = corners.iter().max().unwrap().clone();
        Self::regular(bits, lower, upper)
    }

    /// Both operands provably non-negative and bounded
    fn both_nonneg(&self, other: &Self) -> bool {
        self.is_regular()
            && other.is_regular()
            && !self.lower.is_negative()
            && !other.lower.is_negative()
    }

    pub fn and(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        let bits = max(self.bits, other.bits);
        if self.is_empty() || other.is_empty() {
            return Self::empty(bits);
        }
        if self.is_unknown() || other.is_unknown() {
            return Self::unknown(bits);
        }
        if self.is_anti() || other.is_anti() {
            return Self::full_set(bits, ctx);
        }
        // a full-set operand still gets masked, so no full-set early-out
        if self.both_nonneg(other) && !self.has_sentinel_bound(ctx) && !other.has_sentinel_bound(ctx)
        {
            let (a, b) = self.unsigned_view();
            let (c, d) = other.unsigned_view();
            return Self::regular(bits, min_and(&a, &b, &c, &d, bits), max_and(&a, &b, &c, &d));
        }
        // one side known non-negative still bounds the result
        if other.is_regular() && !other.lower.is_negative() && !ctx.is_max(&other.upper) {
            return Self::regular(bits, BigInt::zero(), other.upper.clone());
        }
        if self.is_regular() && !self.lower.is_negative() && !ctx.is_max(&self.upper) {
            return Self::regular(bits, BigInt::zero(), self.upper.clone());
        }
        Self::full_set(bits, ctx)
    }

    pub fn or(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        let bits = max(self.bits, other.bits);
        if let Some(out) = self.arith_prologue(other, bits, ctx) {
            return out;
        }
        if self.both_nonneg(other) && !self.has_sentinel_bound(ctx) && !other.has_sentinel_bound(ctx)
        {
            let (a, b) = self.unsigned_view();
            let (c, d) = other.unsigned_view();
            return Self::regular(bits, min_or(&a, &b, &c, &d, bits), max_or(&a, &b, &c, &d, bits));
        }
        Self::full_set(bits, ctx)
    }

    pub fn xor(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        let bits = max(self.bits, other.bits);
        if let Some(out) = self.arith_prologue(other, bits, ctx) {
            return out;
        }
        if self.both_nonneg(other) && !self.has_sentinel_bound(ctx) && !other.has_sentinel_bound(ctx)
        {
            let (a, b) = self.unsigned_view();
            let (c, d) = other.unsigned_view();
            // x ^ y <= x | y, and both operands are non-negative
            return Self::regular(bits, BigInt::zero(), max_or(&a, &b, &c, &d, bits));
        }
        Self::full_set(bits, ctx)
    }

    pub fn neg(&self, ctx: &AnalysisContext) -> Self {
        match self.kind {
            RangeKind::Unknown | RangeKind::Empty => self.clone(),
            RangeKind::Anti => Self::full_set(self.bits, ctx),
            RangeKind::Regular => Self::regular(
                self.bits,
                ctx.saturate(-self.upper.clone()),
                ctx.saturate(-self.lower.clone()),
            ),
        }
    }

    pub fn abs(&self, ctx: &AnalysisContext) -> Self {
        match self.kind {
            RangeKind::Unknown | RangeKind::Empty => self.clone(),
            RangeKind::Anti => Self::full_set(self.bits, ctx),
            RangeKind::Regular => {
                if !self.lower.is_negative() {
                    self.clone()
                } else if !self.upper.is_positive() {
                    self.neg(ctx)
                } else {
                    let hi = max(-self.lower.clone(), self.upper.clone());
                    Self::regular(self.bits, BigInt::zero(), ctx.saturate(hi))
                }
            }
        }
    }

    pub fn truncate(&self, bits: u32, ctx: &AnalysisContext) -> Self {
        match self.kind {
            RangeKind::Unknown => Self::unknown(bits),
            RangeKind::Empty => Self::empty(bits),
            RangeKind::Anti => Self::full_set(bits, ctx),
            RangeKind::Regular => {
                if self.has_sentinel_bound(ctx) {
                    return Self::full_set(bits, ctx);
                }
                Self::best_range(bits, self.lower.clone(), self.upper.clone(), ctx)
            }
        }
    }

    pub fn sext_or_trunc(&self, bits: u32, ctx: &AnalysisContext) -> Self {
        if bits < self.bits {
            return self.truncate(bits, ctx);
        }
        match self.kind {
            RangeKind::Unknown => Self::unknown(bits),
            RangeKind::Empty => Self::empty(bits),
            RangeKind::Anti => Self::full_set(bits, ctx),
            // sign extension preserves values
            RangeKind::Regular => Self::regular(bits, self.lower.clone(), self.upper.clone()),
        }
    }

    pub fn zext_or_trunc(&self, bits: u32, ctx: &AnalysisContext) -> Self {
        if bits < self.bits {
            return self.truncate(bits, ctx);
        }
        match self.kind {
            RangeKind::Unknown => Self::unknown(bits),
            RangeKind::Empty => Self::empty(bits),
            RangeKind::Anti => Self::full_set(bits, ctx),
            RangeKind::Regular => {
                let (lo, hi) = self.unsigned_view();
                Self::regular(bits, lo, hi)
            }
        }
    }

    pub fn intersect_with(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        let bits = max(self.bits, other.bits);
        use RangeKind::*;
        match (self.kind, other.kind) {
            (Empty, _) | (_, Empty) => Self::empty(bits),
            (Unknown, _) => other.clone(),
            (_, Unknown) => self.clone(),
            (Regular, Regular) => Self::regular(
                bits,
                max(self.lower.clone(), other.lower.clone()),
                min(self.upper.clone(), other.upper.clone()),
            ),
            (Regular, Anti) => Self::cut_hole(bits, self, other, ctx),
            (Anti, Regular) => Self::cut_hole(bits, other, self, ctx),
            (Anti, Anti) => {
                // complement(h1) & complement(h2) == complement(h1 | h2)
                let h1 = (self.lower.clone(), self.upper.clone());
                let h2 = (other.lower.clone(), other.upper.clone());
                if &h1.1 + 1 >= h2.0 && &h2.1 + 1 >= h1.0 {
                    // overlapping or adjacent holes unify exactly
                    Self::anti(bits, min(h1.0, h2.0), max(h1.1, h2.1), ctx)
                } else {
                    // disjoint holes: keep the wider one (sound superset)
                    let w1 = &h1.1 - &h1.0;
                    let w2 = &h2.1 - &h2.0;
                    if w1 >= w2 {
                        Self::anti(bits, h1.0, h1.1, ctx)
                    } else {
                        Self::anti(bits, h2.0, h2.1, ctx)
                    }
                }
            }
        }
    }

    /// Intersection of a Regular range with the complement of a hole
    fn cut_hole(bits: u32, reg: &Self, anti: &Self, ctx: &AnalysisContext) -> Self {
        let (l, u) = (&reg.lower, &reg.upper);
        let (hl, hu) = (&anti.lower, &anti.upper);
        if u < hl || l > hu {
            // no overlap with the hole
            return Self::regular(bits, l.clone(), u.clone());
        }
        if l >= hl && u <= hu {
            return Self::empty(bits);
        }
        let left = l < hl;
        let right = u > hu;
        match (left, right) {
            (true, false) => Self::regular(bits, l.clone(), hl - 1),
            (false, true) => Self::regular(bits, hu + 1, u.clone()),
            // the hole splits the interval; the anti range is the tightest
            // single-piece superset of the true intersection
            (true, true) => Self::anti(bits, hl.clone(), hu.clone(), ctx),
            (false, false) => unreachable!(),
        }
    }

    pub fn union_with(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        let bits = max(self.bits, other.bits);
        use RangeKind::*;
        match (self.kind, other.kind) {
            (Empty, _) | (Unknown, _) => other.clone(),
            (_, Empty) | (_, Unknown) => self.clone(),
            (Regular, Regular) => Self::regular(
                bits,
                min(self.lower.clone(), other.lower.clone()),
                max(self.upper.clone(), other.upper.clone()),
            ),
            (Anti, Regular) => Self::fill_hole(bits, other, self, ctx),
            (Regular, Anti) => Self::fill_hole(bits, self, other, ctx),
            (Anti, Anti) => {
                // complement(h1) | complement(h2) == complement(h1 & h2)
                let hl = max(self.lower.clone(), other.lower.clone());
                let hu = min(self.upper.clone(), other.upper.clone());
                if hl > hu {
                    return Self::full_set(bits, ctx);
                }
                Self::anti(bits, hl, hu, ctx)
            }
        }
    }

    /// Union of a Regular range into the complement of a hole
    fn fill_hole(bits: u32, reg: &Self, anti: &Self, ctx: &AnalysisContext) -> Self {
        let (l, u) = (&reg.lower, &reg.upper);
        let (hl, hu) = (&anti.lower, &anti.upper);
        if l <= hl && u >= hu {
            return Self::full_set(bits, ctx);
        }
        if u < hl || l > hu {
            return Self::anti(bits, hl.clone(), hu.clone(), ctx);
        }
        match (l > hl, u < hu) {
            // the interval eats into the hole from one side
            (false, true) => Self::anti(bits, u + 1, hu.clone(), ctx),
            (true, false) => Self::anti(bits, hl.clone(), l - 1, ctx),
            // strictly inside: the hole splits in two, keep the wider piece
            // so the interval itself is never excluded
            (true, true) => {
                if l - hl >= hu - u {
                    Self::anti(bits, hl.clone(), l - 1, ctx)
                } else {
                    Self::anti(bits, u + 1, hu.clone(), ctx)
                }
            }
            (false, false) => unreachable!(),
        }
    }

    /// Evaluate a comparison between two ranges at a boolean result width
    pub fn cmp(&self, pred: CmpPred, other: &Self, bits: u32, ctx: &AnalysisContext) -> Self {
        if self.is_empty() || other.is_empty() {
            return Self::empty(bits);
        }
        if self.is_unknown() || other.is_unknown() {
            return Self::unknown(bits);
        }
        let verdict = match pred {
            CmpPred::Eq => {
                if self.is_constant() && other.is_constant() && self.lower == other.lower {
                    Some(true)
                } else if self.intersect_with(other, ctx).is_empty() {
                    Some(false)
                } else {
                    None
                }
            }
            CmpPred::Ne => {
                if self.is_constant() && other.is_constant() && self.lower == other.lower {
                    Some(false)
                } else if self.intersect_with(other, ctx).is_empty() {
                    Some(true)
                } else {
                    None
                }
            }
            CmpPred::Slt | CmpPred::Sle | CmpPred::Sgt | CmpPred::Sge => {
                let (a, b) = self.signed_view();
                let (c, d) = other.signed_view();
                Self::order_verdict(pred, &a, &b, &c, &d)
            }
            CmpPred::Ult | CmpPred::Ule | CmpPred::Ugt | CmpPred::Uge => {
                let (a, b) = self.unsigned_view();
                let (c, d) = other.unsigned_view();
                Self::order_verdict(pred, &a, &b, &c, &d)
            }
        };
        let mut result = Self::boolean(verdict);
        result.bits = bits;
        result
    }

    fn order_verdict(
        pred: CmpPred,
        a: &BigInt,
        b: &BigInt,
        c: &BigInt,
        d: &BigInt,
    ) -> Option<bool> {
        match pred {
            CmpPred::Slt | CmpPred::Ult => {
                if b < c {
                    Some(true)
                } else if a >= d {
                    Some(false)
                } else {
                    None
                }
            }
            CmpPred::Sle | CmpPred::Ule => {
                if b <= c {
                    Some(true)
                } else if a > d {
                    Some(false)
                } else {
                    None
                }
            }
            CmpPred::Sgt | CmpPred::Ugt => {
                if a > d {
                    Some(true)
                } else if b <= c {
                    Some(false)
                } else {
                    None
                }
            }
            CmpPred::Sge | CmpPred::Uge => {
                if a >= d {
                    Some(true)
                } else if b < c {
                    Some(false)
                } else {
                    None
                }
            }
            CmpPred::Eq | CmpPred::Ne => unreachable!(),
        }
    }

    /// The set of left-operand values `x` satisfying `x pred y` for every
    /// `y` in `other`, used to build branch-refinement intervals
    pub fn make_satisfying_cmp_region(
        pred: CmpPred,
        other: &Self,
        bits: u32,
        ctx: &AnalysisContext,
    ) -> EngineResult<Self> {
        if other.is_empty() || other.is_unknown() {
            return Err(EngineError::InvariantViolation(
                "comparison region requested over a vacuous range".into(),
            ));
        }
        if other.is_anti() {
            // a complemented bound constrains nothing representable here
            return Ok(Self::full_set(bits, ctx));
        }
        let (l, u) = (&other.lower, &other.upper);
        let region = match pred {
            CmpPred::Eq => Self::regular(bits, l.clone(), u.clone()),
            CmpPred::Ne => {
                if other.is_constant() {
                    Self::anti(bits, l.clone(), u.clone(), ctx)
                } else {
                    Self::full_set(bits, ctx)
                }
            }
            CmpPred::Slt => Self::regular(bits, ctx.min().clone(), l - 1),
            CmpPred::Sle => Self::regular(bits, ctx.min().clone(), l.clone()),
            CmpPred::Sgt => Self::regular(bits, u + 1, ctx.max().clone()),
            CmpPred::Sge => Self::regular(bits, u.clone(), ctx.max().clone()),
            CmpPred::Ult => {
                let (ul, _) = other.unsigned_view();
                Self::regular(bits, BigInt::zero(), ul - 1)
            }
            CmpPred::Ule => {
                let (ul, _) = other.unsigned_view();
                Self::regular(bits, BigInt::zero(), ul)
            }
            CmpPred::Ugt => {
                let (_, uu) = other.unsigned_view();
                Self::regular(bits, uu + 1, unsigned_max_of(bits))
            }
            CmpPred::Uge => {
                let (_, uu) = other.unsigned_view();
                Self::regular(bits, uu, unsigned_max_of(bits))
            }
        };
        Ok(region)
    }

    /// The set of left-operand values `x` satisfying `x pred y` for SOME
    /// `y` in `other`
    ///
    /// Sigma constraints whose bound is itself an analyzed value compare
    /// against the runtime value of the bound, which the settled interval
    /// only over-approximates; the refinement must therefore keep every
    /// `x` that some member of the interval admits. For a constant bound
    /// the two readings coincide.
    pub fn make_reachable_cmp_region(
        pred: CmpPred,
        other: &Self,
        bits: u32,
        ctx: &AnalysisContext,
    ) -> EngineResult<Self> {
        if other.is_constant() || !other.is_regular() {
            return Self::make_satisfying_cmp_region(pred, other, bits, ctx);
        }
        let (l, u) = (&other.lower, &other.upper);
        let region = match pred {
            CmpPred::Eq => Self::regular(bits, l.clone(), u.clone()),
            // some member always differs from any given x
            CmpPred::Ne => Self::full_set(bits, ctx),
            CmpPred::Slt => Self::regular(
                bits,
                ctx.min().clone(),
                Self::sat_sub(ctx, u, &BigInt::one()),
            ),
            CmpPred::Sle => Self::regular(bits, ctx.min().clone(), u.clone()),
            CmpPred::Sgt => Self::regular(
                bits,
                Self::sat_add(ctx, l, &BigInt::one()),
                ctx.max().clone(),
            ),
            CmpPred::Sge => Self::regular(bits, l.clone(), ctx.max().clone()),
            CmpPred::Ult => {
                let (_, uu) = other.unsigned_view();
                Self::regular(bits, BigInt::zero(), uu - BigInt::one())
            }
            CmpPred::Ule => {
                let (_, uu) = other.unsigned_view();
                Self::regular(bits, BigInt::zero(), uu)
            }
            CmpPred::Ugt => {
                let (ul, _) = other.unsigned_view();
                Self::regular(bits, ul + BigInt::one(), unsigned_max_of(bits))
            }
            CmpPred::Uge => {
                let (ul, _) = other.unsigned_view();
                Self::regular(bits, ul, unsigned_max_of(bits))
            }
        };
        Ok(region)
    }
}

impl Display for Range {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            RangeKind::Unknown => write!(f, "unknown"),
            RangeKind::Empty => write!(f, "empty"),
            RangeKind::Regular => write!(f, "[{}, {}]", self.lower, self.upper),
            RangeKind::Anti => write!(f, "){}, {}(", self.lower, self.upper),
        }
    }
}

//
// Hacker's Delight bit-scanning bounds (unsigned, non-negative operands)
//

fn bit_at(width: u32, i: u32) -> BigInt {
    BigInt::one() << (width - 1 - i)
}

fn not_w(x: &BigInt, width: u32) -> BigInt {
    unsigned_max_of(width) - x
}

pub(crate) fn min_and(a: &BigInt, b: &BigInt, c: &BigInt, d: &BigInt, width: u32) -> BigInt {
    let mut a = a.clone();
    let mut c = c.clone();
    for i in 0..width {
        let m = bit_at(width, i);
        if (&not_w(&a, width) & &not_w(&c, width) & &m) != BigInt::zero() {
            let temp = (&a | &m) & -m.clone();
            if &temp <= b {
                a = temp;
                break;
            }
            let temp = (&c | &m) & -m.clone();
            if &temp <= d {
                c = temp;
                break;
            }
        }
    }
    a & c
}

pub(crate) fn max_and(a: &BigInt, b: &BigInt, c: &BigInt, d: &BigInt) -> BigInt {
    let width = max(max(b.bits(), d.bits()) as u32, 1);
    let mut b = b.clone();
    let mut d = d.clone();
    for i in 0..width {
        let m = bit_at(width, i);
        if (&b & &not_w(&d, width) & &m) != BigInt::zero() {
            let temp = (&b & &not_w(&m, width)) | (&m - BigInt::one());
            if &temp >= a {
                b = temp;
                break;
            }
        } else if (&not_w(&b, width) & &d & &m) != BigInt::zero() {
            let temp = (&d & &not_w(&m, width)) | (&m - BigInt::one());
            if &temp >= c {
                d = temp;
                break;
            }
        }
    }
    b & d
}

pub(crate) fn min_or(a: &BigInt, b: &BigInt, c: &BigInt, d: &BigInt, width: u32) -> BigInt {
    let mut a = a.clone();
    let mut c = c.clone();
    for i in 0..width {
        let m = bit_at(width, i);
        if (&not_w(&a, width) & &c & &m) != BigInt::zero() {
            let temp = (&a | &m) & -m.clone();
            if &temp <= b {
                a = temp;
                break;
            }
        } else if (&a & &not_w(&c, width) & &m) != BigInt::zero() {
            let temp = (&c | &m) & -m.clone();
            if &temp <= d {
                c = temp;
                break;
            }
        }
    }
    a | c
}

pub(crate) fn max_or(a: &BigInt, b: &BigInt, c: &BigInt, d: &BigInt, width: u32) -> BigInt {
    let mut b = b.clone();
    let mut d = d.clone();
    for i in 0..width {
        let m = bit_at(width, i);
        if (&b & &d & &m) != BigInt::zero() {
            let temp = (&b - &m) | (&m - BigInt::one());
            if &temp >= a {
                b = temp;
                break;
            }
            let temp = (&d - &m) | (&m - BigInt::one());
            if &temp >= c {
                d = temp;
                break;
            }
        }
    }
    b | d
}

/// Bit-level decomposition of a floating-point value
///
/// Storage-only: no arithmetic is defined on the triple itself; operations
/// act on the individual components.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RealRange {
    pub sign: Range,
    pub exponent: Range,
    pub fraction: Range,
}

impl RealRange {
    pub fn full(exponent_bits: u32, fraction_bits: u32, ctx: &AnalysisContext) -> Self {
        Self {
            sign: Range::regular(1, BigInt::zero(), BigInt::one()),
            exponent: Range::regular(
                exponent_bits,
                BigInt::zero(),
                unsigned_max_of(exponent_bits),
            ),
            fraction: Range::regular(
                fraction_bits,
                BigInt::zero(),
                unsigned_max_of(fraction_bits),
            ),
        }
        .normalized(ctx)
    }

    pub fn unknown(exponent_bits: u32, fraction_bits: u32) -> Self {
        Self {
            sign: Range::unknown(1),
            exponent: Range::unknown(exponent_bits),
            fraction: Range::unknown(fraction_bits),
        }
    }

    pub fn from_literal(
        sign: u8,
        exponent: u64,
        fraction: u128,
        exponent_bits: u32,
        fraction_bits: u32,
    ) -> Self {
        Self {
            sign: Range::constant(1, BigInt::from(sign)),
            exponent: Range::constant(exponent_bits, BigInt::from(exponent)),
            fraction: Range::constant(fraction_bits, BigInt::from(fraction)),
        }
    }

    fn normalized(self, _ctx: &AnalysisContext) -> Self {
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.sign.is_unknown() || self.exponent.is_unknown() || self.fraction.is_unknown()
    }

    pub fn union_with(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        Self {
            sign: self.sign.union_with(&other.sign, ctx),
            exponent: self.exponent.union_with(&other.exponent, ctx),
            fraction: self.fraction.union_with(&other.fraction, ctx),
        }
    }

    pub fn intersect_with(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        Self {
            sign: self.sign.intersect_with(&other.sign, ctx),
            exponent: self.exponent.intersect_with(&other.exponent, ctx),
            fraction: self.fraction.intersect_with(&other.fraction, ctx),
        }
    }
}

impl Display for RealRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(s:{}, e:{}, f:{})",
            self.sign, self.exponent, self.fraction
        )
    }
}

/// What a VarNode actually stores: a scalar interval or a float triple
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ValueRange {
    Scalar(Range),
    Real(RealRange),
}

impl ValueRange {
    pub fn as_scalar(&self) -> Option<&Range> {
        match self {
            Self::Scalar(r) => Some(r),
            Self::Real(_) => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        match self {
            Self::Scalar(r) => r.is_unknown(),
            Self::Real(r) => r.is_unknown(),
        }
    }

    pub fn union_with(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => Self::Scalar(a.union_with(b, ctx)),
            (Self::Real(a), Self::Real(b)) => Self::Real(a.union_with(b, ctx)),
            // mismatched shapes cannot be merged meaningfully
            (Self::Scalar(a), _) => Self::Scalar(Range::full_set(a.bits(), ctx)),
            (Self::Real(_), Self::Scalar(b)) => Self::Scalar(Range::full_set(b.bits(), ctx)),
        }
    }

    pub fn intersect_with(&self, other: &Self, ctx: &AnalysisContext) -> Self {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => Self::Scalar(a.intersect_with(b, ctx)),
            (Self::Real(a), Self::Real(b)) => Self::Real(a.intersect_with(b, ctx)),
            (x, _) => x.clone(),
        }
    }
}

impl Display for ValueRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(r) => r.fmt(f),
            Self::Real(r) => r.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> AnalysisContext {
        AnalysisContext::new(32).unwrap()
    }

    fn reg(l: i64, u: i64) -> Range {
        Range::regular(32, BigInt::from(l), BigInt::from(u))
    }

    #[test]
    fn sentinels_exceed_representable_values() {
        let ctx = AnalysisContext::new(128).unwrap();
        assert!(ctx.max() > &unsigned_max_of(128));
        assert!(ctx.min() < &signed_min_of(128));
    }

    #[test]
    fn intersect_is_commutative_and_idempotent() {
        let ctx = ctx();
        let a = reg(-10, 50);
        let b = reg(0, 100);
        assert_eq!(a.intersect_with(&b, &ctx), b.intersect_with(&a, &ctx));
        assert_eq!(a.intersect_with(&a, &ctx), a);
        assert_eq!(a.union_with(&a, &ctx), a);
    }

    #[test]
    fn union_is_a_superset_of_both() {
        let ctx = ctx();
        let a = reg(-10, 5);
        let b = reg(20, 30);
        let u = a.union_with(&b, &ctx);
        assert_eq!(u, reg(-10, 30));
    }

    #[test]
    fn union_keeps_an_interval_inside_the_hole() {
        let ctx = ctx();
        let hole = Range::anti(32, BigInt::from(0), BigInt::from(100), &ctx);
        let mid = reg(40, 60);
        let u = hole.union_with(&mid, &ctx);
        // the hole shrinks so the interval is no longer excluded
        assert!(u.is_anti());
        assert_eq!(u.lower(), &BigInt::from(0));
        assert_eq!(u.upper(), &BigInt::from(39));
        // the wider of the two leftover pieces is the one kept excluded
        let low = reg(10, 50);
        let u = hole.union_with(&low, &ctx);
        assert!(u.is_anti());
        assert_eq!(u.lower(), &BigInt::from(51));
        assert_eq!(u.upper(), &BigInt::from(100));
    }

    #[test]
    fn reachable_region_uses_the_far_side_of_a_wide_bound() {
        let ctx = ctx();
        let bound = reg(0, 50);
        // x < y holds for some y in [0, 50] whenever x <= 49
        let r = Range::make_reachable_cmp_region(CmpPred::Slt, &bound, 32, &ctx).unwrap();
        assert_eq!(r.upper(), &BigInt::from(49));
        assert!(ctx.is_min_bound(r.lower()));
        // x > y likewise whenever x >= 1
        let r = Range::make_reachable_cmp_region(CmpPred::Sgt, &bound, 32, &ctx).unwrap();
        assert_eq!(r.lower(), &BigInt::from(1));
        assert!(ctx.is_max_bound(r.upper()));
        // a constant bound keeps the exact branch-refinement reading
        let ten = Range::constant(32, BigInt::from(10));
        let r = Range::make_reachable_cmp_region(CmpPred::Slt, &ten, 32, &ctx).unwrap();
        assert_eq!(r.upper(), &BigInt::from(9));
    }

    #[test]
    fn anti_renormalization() {
        let ctx = ctx();
        // a hole spanning the whole domain leaves nothing
        let r = Range::anti(32, ctx.min().clone(), ctx.max().clone(), &ctx);
        assert!(r.is_empty());
        // a hole touching a sentinel folds back to Regular
        let r = Range::anti(32, ctx.min().clone(), BigInt::from(9), &ctx);
        assert!(r.is_regular());
        assert_eq!(r.lower(), &BigInt::from(10));
    }

    #[test]
    fn intersect_regular_with_anti() {
        let ctx = ctx();
        let a = reg(0, 100);
        let ne5 = Range::anti(32, BigInt::from(5), BigInt::from(5), &ctx);
        // hole inside the interval: anti is the sound single-piece superset
        assert!(a.intersect_with(&ne5, &ctx).is_anti());
        // hole clips one side
        let b = reg(5, 100);
        let cut = b.intersect_with(&ne5, &ctx);
        assert_eq!(cut, reg(6, 100));
        // interval entirely in the hole
        let c = reg(5, 5);
        assert!(c.intersect_with(&ne5, &ctx).is_empty());
    }

    #[test]
    fn add_and_sub_are_exact_on_bounded_operands() {
        let ctx = ctx();
        assert_eq!(reg(1, 2).add(&reg(10, 20), &ctx), reg(11, 22));
        assert_eq!(reg(1, 2).sub(&reg(10, 20), &ctx), reg(-19, -8));
    }

    #[test]
    fn unknown_and_empty_propagate() {
        let ctx = ctx();
        let a = reg(1, 2);
        assert!(a.add(&Range::unknown(32), &ctx).is_unknown());
        assert!(a.add(&Range::empty(32), &ctx).is_empty());
        assert!(a
            .mul(&Range::full_set(32, &ctx), &ctx)
            .is_full_set(&ctx));
    }

    #[test]
    fn mul_takes_corner_extremes() {
        let ctx = ctx();
        assert_eq!(reg(-3, 4).mul(&reg(-5, 2), &ctx), reg(-20, 15));
    }

    #[test]
    fn division_by_straddling_interval_is_full_set() {
        let ctx = ctx();
        let d = reg(10, 20).sdiv(&reg(-3, 2), &ctx);
        assert!(d.is_full_set(&ctx));
        let d = reg(10, 20).udiv(&reg(0, 2), &ctx);
        assert!(d.is_full_set(&ctx));
    }

    #[test]
    fn division_by_positive_interval() {
        let ctx = ctx();
        assert_eq!(reg(10, 21).sdiv(&reg(2, 5), &ctx), reg(2, 10));
    }

    #[test]
    fn and_with_nonneg_mask_bounds_the_result() {
        let ctx = AnalysisContext::new(16).unwrap();
        let a = Range::regular(16, BigInt::from(-5), BigInt::from(300));
        let mask = Range::constant(16, BigInt::from(0xff));
        let r = a.and(&mask, &ctx);
        assert_eq!(r, Range::regular(16, BigInt::zero(), BigInt::from(255)));
    }

    #[test]
    fn hacker_delight_bounds_are_tight_on_samples() {
        // exhaustive over a small box, compared against concrete and/or
        let (a, b, c, d) = (
            BigInt::from(3),
            BigInt::from(7),
            BigInt::from(4),
            BigInt::from(6),
        );
        let mut lo_and = i64::MAX;
        let mut hi_and = i64::MIN;
        let mut lo_or = i64::MAX;
        let mut hi_or = i64::MIN;
        for x in 3..=7i64 {
            for y in 4..=6i64 {
                lo_and = lo_and.min(x & y);
                hi_and = hi_and.max(x & y);
                lo_or = lo_or.min(x | y);
                hi_or = hi_or.max(x | y);
            }
        }
        assert!(min_and(&a, &b, &c, &d, 8) <= BigInt::from(lo_and));
        assert!(max_and(&a, &b, &c, &d) >= BigInt::from(hi_and));
        assert!(min_or(&a, &b, &c, &d, 8) <= BigInt::from(lo_or));
        assert!(max_or(&a, &b, &c, &d, 8) >= BigInt::from(hi_or));
    }

    #[test]
    fn truncate_extend_round_trip() {
        let ctx = ctx();
        let a = reg(-100, 100);
        let narrowed = a.truncate(8, &ctx);
        assert_eq!(narrowed, Range::regular(8, BigInt::from(-100), BigInt::from(100)));
        let widened = narrowed.sext_or_trunc(32, &ctx);
        assert_eq!(widened, a);
    }

    #[test]
    fn truncate_overflow_degrades_to_full_set() {
        let ctx = ctx();
        let a = reg(-100, 1000);
        assert!(a.truncate(8, &ctx).is_full_set(&ctx));
    }

    #[test]
    fn zext_of_negative_interval_goes_unsigned() {
        let ctx = ctx();
        let a = Range::regular(8, BigInt::from(-2), BigInt::from(-1));
        let z = a.zext_or_trunc(16, &ctx);
        assert_eq!(z, Range::regular(16, BigInt::from(254), BigInt::from(255)));
    }

    #[test]
    fn cmp_region_for_branch_refinement() {
        let ctx = ctx();
        let ten = Range::constant(32, BigInt::from(10));
        let lt = Range::make_satisfying_cmp_region(CmpPred::Slt, &ten, 32, &ctx).unwrap();
        assert_eq!(lt.upper(), &BigInt::from(9));
        let ge = Range::make_satisfying_cmp_region(CmpPred::Sge, &ten, 32, &ctx).unwrap();
        assert_eq!(ge.lower(), &BigInt::from(10));
        let ne = Range::make_satisfying_cmp_region(CmpPred::Ne, &ten, 32, &ctx).unwrap();
        assert!(ne.is_anti());
        assert!(Range::make_satisfying_cmp_region(CmpPred::Eq, &Range::empty(32), 32, &ctx)
            .is_err());
    }

    #[test]
    fn comparisons_decide_or_hedge() {
        let ctx = ctx();
        let a = reg(0, 5);
        let b = reg(10, 20);
        assert_eq!(a.cmp(CmpPred::Slt, &b, 1, &ctx), Range::boolean(Some(true)));
        assert_eq!(b.cmp(CmpPred::Slt, &a, 1, &ctx), Range::boolean(Some(false)));
        let c = reg(3, 12);
        assert_eq!(a.cmp(CmpPred::Slt, &c, 1, &ctx), Range::boolean(None));
    }

    #[test]
    fn shifts_respect_headroom() {
        let ctx = AnalysisContext::new(8).unwrap();
        let a = Range::regular(8, BigInt::from(1), BigInt::from(3));
        let s = Range::constant(8, BigInt::from(2));
        assert_eq!(
            a.shl(&s, &ctx),
            Range::regular(8, BigInt::from(4), BigInt::from(12))
        );
        // a shift amount that may reach the width collapses
        let wild = Range::regular(8, BigInt::from(0), BigInt::from(8));
        assert!(a.shl(&wild, &ctx).is_full_set(&ctx));
    }

    // small deterministic generator, good enough for sampling
    struct XorShift(u64);
    impl XorShift {
        fn next(&mut self) -> u64 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.0 = x;
            x
        }
        fn in_range(&mut self, lo: i64, hi: i64) -> i64 {
            lo + (self.next() % ((hi - lo + 1) as u64)) as i64
        }
    }

    #[test]
    fn arithmetic_soundness_by_sampling() {
        let ctx = ctx();
        let mut rng = XorShift(0x9e3779b97f4a7c15);
        for _ in 0..200 {
            let (l1, u1) = {
                let a = rng.in_range(-50, 50);
                let b = rng.in_range(-50, 50);
                (a.min(b), a.max(b))
            };
            let (l2, u2) = {
                let a = rng.in_range(-50, 50);
                let b = rng.in_range(-50, 50);
                (a.min(b), a.max(b))
            };
            let ra = reg(l1, u1);
            let rb = reg(l2, u2);
            for _ in 0..8 {
                let x = rng.in_range(l1, u1);
                let y = rng.in_range(l2, u2);
                let contains = |r: &Range, v: i64| -> bool {
                    match r.kind() {
                        RangeKind::Regular => {
                            r.lower() <= &BigInt::from(v) && &BigInt::from(v) <= r.upper()
                        }
                        RangeKind::Anti => {
                            let hole = r.get_anti();
                            !(hole.lower() <= &BigInt::from(v) && &BigInt::from(v) <= hole.upper())
                        }
                        _ => false,
                    }
                };
                assert!(contains(&ra.add(&rb, &ctx), x + y));
                assert!(contains(&ra.sub(&rb, &ctx), x - y));
                assert!(contains(&ra.mul(&rb, &ctx), x * y));
                if y != 0 {
                    let div = ra.sdiv(&rb, &ctx);
                    assert!(div.is_full_set(&ctx) || contains(&div, x / y));
                    let rem = ra.srem(&rb, &ctx);
                    assert!(rem.is_full_set(&ctx) || contains(&rem, x % y));
                }
                if x >= 0 && y >= 0 {
                    assert!(contains(&ra.and(&rb, &ctx), x & y) || ra.and(&rb, &ctx).is_full_set(&ctx));
                    assert!(contains(&ra.or(&rb, &ctx), x | y) || ra.or(&rb, &ctx).is_full_set(&ctx));
                    assert!(contains(&ra.xor(&rb, &ctx), x ^ y) || ra.xor(&rb, &ctx).is_full_set(&ctx));
                }
            }
        }
    }
}
