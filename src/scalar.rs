//! The scalar abstraction shared by every numerical routine.
//!
//! Kernels are written once against [`Scalar`] and instantiated either with
//! `f64` (real analysis) or with [`Complex`] (complex-step sensitivity
//! analysis).  Seeding an input with a tiny imaginary part `h` and reading
//! `Im(f) / h` off the output gives `df/dx` to machine precision, with no
//! subtractive cancellation.
//!
//! [`TacsScalar`] is the build-wide choice: `f64` by default, [`Complex`]
//! with the `complex` cargo feature.

use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

// ─────────────────────────────────────────────────────────────
//  Scalar trait
// ─────────────────────────────────────────────────────────────

/// Numeric element type for all framework kernels.
pub trait Scalar:
    Copy
    + fmt::Debug
    + fmt::Display
    + PartialEq
    + PartialOrd
    + Default
    + Send
    + Sync
    + 'static
    + From<f64>
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + Sum
{
    /// Whether this type carries a derivative in its imaginary part.
    const IS_COMPLEX: bool;

    fn zero() -> Self;
    fn one() -> Self;

    /// Lift a real constant into the scalar type (imaginary part zero).
    fn from_real(v: f64) -> Self;

    /// The primal value, in either mode.
    fn real_part(self) -> f64;

    /// The derivative-carrying component; always `0.0` for real scalars.
    fn imag_part(self) -> f64;

    /// Absolute value that keeps the imaginary part consistent with the
    /// branch taken on the real part.
    fn fabs(self) -> Self;

    fn sqrt(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn powi(self, n: i32) -> Self;
    fn powf(self, p: f64) -> Self;
    fn recip(self) -> Self;
}

/// Build-wide scalar type.
#[cfg(feature = "complex")]
pub type TacsScalar = Complex;

/// Build-wide scalar type.
#[cfg(not(feature = "complex"))]
pub type TacsScalar = f64;

/// Free-function form of [`Scalar::real_part`].
#[inline]
pub fn real_part<S: Scalar>(s: S) -> f64 {
    s.real_part()
}

/// Free-function form of [`Scalar::imag_part`].
#[inline]
pub fn imag_part<S: Scalar>(s: S) -> f64 {
    s.imag_part()
}

/// Free-function form of [`Scalar::fabs`].
#[inline]
pub fn fabs<S: Scalar>(s: S) -> S {
    s.fabs()
}

// ─────────────────────────────────────────────────────────────
//  Real mode
// ─────────────────────────────────────────────────────────────

impl Scalar for f64 {
    const IS_COMPLEX: bool = false;

    #[inline]
    fn zero() -> Self {
        0.0
    }
    #[inline]
    fn one() -> Self {
        1.0
    }
    #[inline]
    fn from_real(v: f64) -> Self {
        v
    }
    #[inline]
    fn real_part(self) -> f64 {
        self
    }
    #[inline]
    fn imag_part(self) -> f64 {
        0.0
    }
    #[inline]
    fn fabs(self) -> Self {
        f64::abs(self)
    }
    #[inline]
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
    #[inline]
    fn exp(self) -> Self {
        f64::exp(self)
    }
    #[inline]
    fn ln(self) -> Self {
        f64::ln(self)
    }
    #[inline]
    fn sin(self) -> Self {
        f64::sin(self)
    }
    #[inline]
    fn cos(self) -> Self {
        f64::cos(self)
    }
    #[inline]
    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }
    #[inline]
    fn powf(self, p: f64) -> Self {
        f64::powf(self, p)
    }
    #[inline]
    fn recip(self) -> Self {
        f64::recip(self)
    }
}

// ─────────────────────────────────────────────────────────────
//  Derivative-carrying mode
// ─────────────────────────────────────────────────────────────

/// Real value plus an infinitesimal imaginary perturbation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    #[inline]
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    /// `x + i·h`: a primal value seeded for differentiation.
    #[inline]
    pub const fn seed(x: f64, h: f64) -> Self {
        Self { re: x, im: h }
    }

    #[inline]
    pub fn conj(self) -> Self {
        Self::new(self.re, -self.im)
    }

    /// Modulus `|z|`.
    #[inline]
    pub fn norm(self) -> f64 {
        self.re.hypot(self.im)
    }
}

impl From<f64> for Complex {
    #[inline]
    fn from(re: f64) -> Self {
        Self::new(re, 0.0)
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.im.is_sign_negative() {
            write!(f, "{}-{}i", self.re, -self.im)
        } else {
            write!(f, "{}+{}i", self.re, self.im)
        }
    }
}

/// Ordered by real part only, so a kernel branches the same way in both
/// modes.  Values with equal real parts compare `Equal` even when `==`
/// sees different imaginary parts.
impl PartialOrd for Complex {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.re.partial_cmp(&other.re)
    }
}

impl Add for Complex {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl Mul for Complex {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

impl Div for Complex {
    type Output = Self;
    /// Smith's scaled division: never forms `|rhs|²`, which overflows or
    /// underflows long before the quotient does.
    fn div(self, rhs: Self) -> Self {
        let (a, b, c, d) = (self.re, self.im, rhs.re, rhs.im);
        if d == 0.0 {
            return Self::new(a / c, b / c);
        }
        if c.abs() >= d.abs() {
            let r = d / c;
            let den = c + d * r;
            Self::new((a + b * r) / den, (b - a * r) / den)
        } else {
            let r = c / d;
            let den = c * r + d;
            Self::new((a * r + b) / den, (b * r - a) / den)
        }
    }
}

impl Neg for Complex {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.re, -self.im)
    }
}

impl AddAssign for Complex {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Complex {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for Complex {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl DivAssign for Complex {
    #[inline]
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl Sum for Complex {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, z| acc + z)
    }
}

impl Scalar for Complex {
    const IS_COMPLEX: bool = true;

    #[inline]
    fn zero() -> Self {
        Self::new(0.0, 0.0)
    }
    #[inline]
    fn one() -> Self {
        Self::new(1.0, 0.0)
    }
    #[inline]
    fn from_real(v: f64) -> Self {
        Self::new(v, 0.0)
    }
    #[inline]
    fn real_part(self) -> f64 {
        self.re
    }
    #[inline]
    fn imag_part(self) -> f64 {
        self.im
    }

    /// Negates the whole value when the real part is negative, so the
    /// derivative flips sign together with the primal.
    #[inline]
    fn fabs(self) -> Self {
        if self.re < 0.0 {
            -self
        } else {
            self
        }
    }

    fn sqrt(self) -> Self {
        if self.re == 0.0 && self.im == 0.0 {
            return Self::zero();
        }
        // Both branches avoid computing (|z| - re), which cancels to zero
        // when im is a complex-step seed.
        let r = self.norm();
        if self.re >= 0.0 {
            let t = ((r + self.re) * 0.5).sqrt();
            Self::new(t, self.im / (2.0 * t))
        } else {
            let t = ((r - self.re) * 0.5).sqrt();
            Self::new(self.im.abs() / (2.0 * t), t.copysign(self.im))
        }
    }

    fn exp(self) -> Self {
        let m = self.re.exp();
        Self::new(m * self.im.cos(), m * self.im.sin())
    }

    fn ln(self) -> Self {
        Self::new(self.norm().ln(), self.im.atan2(self.re))
    }

    fn sin(self) -> Self {
        Self::new(
            self.re.sin() * self.im.cosh(),
            self.re.cos() * self.im.sinh(),
        )
    }

    fn cos(self) -> Self {
        Self::new(
            self.re.cos() * self.im.cosh(),
            -self.re.sin() * self.im.sinh(),
        )
    }

    fn powi(self, n: i32) -> Self {
        let mut base = if n < 0 { self.recip() } else { self };
        let mut e = n.unsigned_abs();
        let mut acc = Self::one();
        while e > 0 {
            if e & 1 == 1 {
                acc *= base;
            }
            base *= base;
            e >>= 1;
        }
        acc
    }

    fn powf(self, p: f64) -> Self {
        // Integer exponents go through multiplication: for a negative real
        // part, arg(z) sits next to ±π and the seed is lost in rounding.
        if p.fract() == 0.0 && p.abs() <= f64::from(i32::MAX) {
            return self.powi(p as i32);
        }
        if self.re == 0.0 && self.im == 0.0 {
            return if p > 0.0 { Self::zero() } else { Self::new(f64::INFINITY, 0.0) };
        }
        (self.ln() * Self::from_real(p)).exp()
    }

    #[inline]
    fn recip(self) -> Self {
        Self::one() / self
    }
}

// ─────────────────────────────────────────────────────────────
//  Complex-step helpers
// ─────────────────────────────────────────────────────────────

/// `df/dx` at `x` by the complex-step method with seed magnitude `h`.
pub fn complex_step_derivative<F>(f: F, x: f64, h: f64) -> f64
where
    F: Fn(Complex) -> Complex,
{
    f(Complex::seed(x, h)).im / h
}

/// Gradient of a multivariate function, one seeded evaluation per input.
pub fn complex_step_gradient<F>(mut f: F, x: &[f64], h: f64) -> Vec<f64>
where
    F: FnMut(&[Complex]) -> Complex,
{
    let mut z: Vec<Complex> = x.iter().map(|&v| Complex::from(v)).collect();
    (0..z.len())
        .map(|i| {
            z[i].im = h;
            let d = f(&z).im / h;
            z[i].im = 0.0;
            d
        })
        .collect()
}
