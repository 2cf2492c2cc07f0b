use std::ops::Add;

/// An elementwise (memoryMB, diskMB, containers) triple.
///
/// Shared between a cell's total capacity, its current availability, and the
/// footprint of a single instance, task, or request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resources {
    pub memory_mb: i64,
    pub disk_mb: i64,
    pub containers: i64,
}

impl Resources {
    pub const fn new(memory_mb: i64, disk_mb: i64, containers: i64) -> Self {
        Self {
            memory_mb,
            disk_mb,
            containers,
        }
    }

    /// Subtract `other` from `self`, returning `None` if any dimension would
    /// go negative. Used for admission checks and mutation.
    pub fn checked_sub(&self, other: Resources) -> Option<Resources> {
        let memory_mb = self.memory_mb - other.memory_mb;
        let disk_mb = self.disk_mb - other.disk_mb;
        let containers = self.containers - other.containers;

        if memory_mb < 0 || disk_mb < 0 || containers < 0 {
            return None;
        }

        Some(Resources {
            memory_mb,
            disk_mb,
            containers,
        })
    }

    /// True if all three dimensions are strictly positive. A cell whose
    /// totals fail this check must be filtered out before scoring — the
    /// fractional-fullness denominator is otherwise undefined.
    pub fn all_positive(&self) -> bool {
        self.memory_mb > 0 && self.disk_mb > 0 && self.containers > 0
    }

    /// Fraction of `total` that is used, once `self` represents the
    /// remaining (post-placement or post-removal) resources against `total`.
    /// Averaged across the three dimensions, in `[0, 1]` for any residual
    /// that itself lies within `[0, total]`.
    pub fn fractional_used_against(&self, total: Resources) -> f64 {
        let frac = |remaining: i64, whole: i64| 1.0 - (remaining as f64 / whole as f64);

        (frac(self.memory_mb, total.memory_mb)
            + frac(self.disk_mb, total.disk_mb)
            + frac(self.containers, total.containers))
            / 3.0
    }
}

impl Add for Resources {
    type Output = Resources;

    fn add(self, rhs: Resources) -> Resources {
        Resources {
            memory_mb: self.memory_mb + rhs.memory_mb,
            disk_mb: self.disk_mb + rhs.disk_mb,
            containers: self.containers + rhs.containers,
        }
    }
}
