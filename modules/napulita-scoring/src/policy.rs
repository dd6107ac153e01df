use std::collections::HashMap;

use napulita_common::Category;

/// A versioned rule set mapping a cleaned category to points.
pub trait PointPolicy: Send + Sync {
    fn version(&self) -> &str;
    fn points_for(&self, category: Category) -> i64;
}

/// Fixed base points per cleanup, scaled per category.
#[derive(Debug, Clone)]
pub struct CategoryMultiplierPolicy {
    version: String,
    base_points: i64,
    multipliers: HashMap<Category, f64>,
}

impl CategoryMultiplierPolicy {
    pub fn new(
        version: impl Into<String>,
        base_points: i64,
        multipliers: impl IntoIterator<Item = (Category, f64)>,
    ) -> Self {
        Self {
            version: version.into(),
            base_points,
            multipliers: multipliers.into_iter().collect(),
        }
    }

    /// Every category worth the same.
    pub fn flat(version: impl Into<String>, base_points: i64) -> Self {
        Self::new(version, base_points, Vec::new())
    }

    pub fn multiplier(&self, category: Category) -> f64 {
        self.multipliers.get(&category).copied().unwrap_or(1.0)
    }
}

impl Default for CategoryMultiplierPolicy {
    fn default() -> Self {
        Self::new(
            "v1",
            10,
            [(Category::BulkyItem, 2.0), (Category::OverflowingBin, 1.5)],
        )
    }
}

impl PointPolicy for CategoryMultiplierPolicy {
    fn version(&self) -> &str {
        &self.version
    }

    fn points_for(&self, category: Category) -> i64 {
        (self.base_points as f64 * self.multiplier(category)).round() as i64
    }
}
