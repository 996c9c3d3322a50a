use serde::{Deserialize, Serialize};

/// Prices enter the model as integers in hundredths of the input unit.
pub const PRICE_SCALE: i64 = 100;

/// Largest accepted unit price. Scaled totals of any plan stay within `i64`.
pub const MAX_PRICE: f64 = 1.0e12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    #[serde(alias = "width", deserialize_with = "deserialize_u32_from_number")]
    pub w: u32,
    #[serde(alias = "height", deserialize_with = "deserialize_u32_from_number")]
    pub h: u32,
}

impl Rect {
    pub fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    pub fn rotated(&self) -> Self {
        Self {
            w: self.h,
            h: self.w,
        }
    }

    pub fn fits_in(&self, other: &Rect) -> bool {
        self.w <= other.w && self.h <= other.h
    }

    /// Shrinks both sides by `by`, saturating at zero.
    pub fn shrink(&self, by: u32) -> Self {
        Self {
            w: self.w.saturating_sub(by),
            h: self.h.saturating_sub(by),
        }
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.w, self.h)
    }
}

/// Accepts `600` as well as `600.0` for integer dimensions in JSON input.
pub fn deserialize_u32_from_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let n = f64::deserialize(deserializer)?;
    if n.fract() != 0.0 || !(0.0..=u32::MAX as f64).contains(&n) {
        return Err(serde::de::Error::custom(format!(
            "expected a non-negative whole number, got {n}"
        )));
    }
    Ok(n as u32)
}

/// A price expressed in scaled integer units (see [`PRICE_SCALE`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_scaled(units: i64) -> Self {
        Self(units)
    }

    /// Rounds a decimal price to the nearest scaled unit.
    pub fn from_decimal(price: f64) -> Self {
        Self((price * PRICE_SCALE as f64).round() as i64)
    }

    pub fn scaled(self) -> i64 {
        self.0
    }

    pub fn to_decimal(self) -> f64 {
        self.0 as f64 / PRICE_SCALE as f64
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.to_decimal())
    }
}

impl Serialize for Money {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_decimal())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    Original,
    HalfWidth,
    HalfHeight,
    Quarter,
}

impl VariantKind {
    pub const SPLITS: [VariantKind; 3] = [
        VariantKind::HalfWidth,
        VariantKind::HalfHeight,
        VariantKind::Quarter,
    ];

    /// Share of the original price carried by this variant.
    pub fn price_divisor(self) -> f64 {
        match self {
            VariantKind::Original => 1.0,
            VariantKind::HalfWidth | VariantKind::HalfHeight => 2.0,
            VariantKind::Quarter => 4.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VariantKind::Original => "original",
            VariantKind::HalfWidth => "half_width",
            VariantKind::HalfHeight => "half_height",
            VariantKind::Quarter => "quarter",
        }
    }
}

impl std::fmt::Display for VariantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size of a stock unit: a length for boards, a rectangle for sheets.
pub trait Dimensions: Copy + std::fmt::Debug + std::fmt::Display {
    /// Size of a pre-split variant, or `None` if the shape has no such variant.
    fn split(&self, kind: VariantKind) -> Option<Self>;

    fn is_degenerate(&self) -> bool;

    /// Usable material: length for boards, area for sheets.
    fn capacity(&self) -> u64;
}

impl Dimensions for u32 {
    fn split(&self, kind: VariantKind) -> Option<Self> {
        match kind {
            VariantKind::Original => Some(*self),
            _ => None,
        }
    }

    fn is_degenerate(&self) -> bool {
        *self == 0
    }

    fn capacity(&self) -> u64 {
        *self as u64
    }
}

impl Dimensions for Rect {
    fn split(&self, kind: VariantKind) -> Option<Self> {
        Some(match kind {
            VariantKind::Original => *self,
            VariantKind::HalfWidth => Rect::new(self.w / 2, self.h),
            VariantKind::HalfHeight => Rect::new(self.w, self.h / 2),
            VariantKind::Quarter => Rect::new(self.w / 2, self.h / 2),
        })
    }

    fn is_degenerate(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    fn capacity(&self) -> u64 {
        self.area()
    }
}

/// A purchasable stock type with `count` physical units available.
#[derive(Debug, Clone, PartialEq)]
pub struct StockType<D> {
    pub id: String,
    pub price: f64,
    pub count: u32,
    pub size: D,
}

impl<D> StockType<D> {
    pub fn new(id: impl Into<String>, size: D, price: f64, count: u32) -> Self {
        Self {
            id: id.into(),
            price,
            count,
            size,
        }
    }
}

/// One concrete, priced, placeable unit of material.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockOption<D> {
    pub id: String,
    pub source_id: String,
    pub variant: VariantKind,
    pub size: D,
    pub price: f64,
}

impl<D> StockOption<D> {
    pub fn scaled_price(&self) -> Money {
        Money::from_decimal(self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_round_trips_two_decimals() {
        let m = Money::from_decimal(29.70);
        assert_eq!(m.scaled(), 2970);
        assert_eq!(m.to_decimal(), 29.70);
        assert_eq!(m.to_string(), "29.70");
    }

    #[test]
    fn test_money_rounds_to_nearest_unit() {
        assert_eq!(Money::from_decimal(65.01 / 4.0).scaled(), 1625);
        assert_eq!(Money::from_decimal(0.004).scaled(), 0);
    }

    #[test]
    fn test_rect_split_truncates() {
        let r = Rect::new(801, 401);
        assert_eq!(r.split(VariantKind::HalfWidth), Some(Rect::new(400, 401)));
        assert_eq!(r.split(VariantKind::HalfHeight), Some(Rect::new(801, 200)));
        assert_eq!(r.split(VariantKind::Quarter), Some(Rect::new(400, 200)));
    }

    #[test]
    fn test_boards_have_no_split_variants() {
        assert_eq!(600u32.split(VariantKind::Original), Some(600));
        assert_eq!(600u32.split(VariantKind::Quarter), None);
    }

    #[test]
    fn test_rect_accepts_whole_floats() {
        let r: Rect = serde_json::from_str(r#"{"w": 600.0, "h": 400}"#).unwrap();
        assert_eq!(r, Rect::new(600, 400));
        let r: Rect = serde_json::from_str(r#"{"width": 600, "height": 400}"#).unwrap();
        assert_eq!(r, Rect::new(600, 400));
        assert!(serde_json::from_str::<Rect>(r#"{"w": 600.5, "h": 400}"#).is_err());
        assert!(serde_json::from_str::<Rect>(r#"{"w": -1, "h": 400}"#).is_err());
    }
}
