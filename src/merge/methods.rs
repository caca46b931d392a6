use log::warn;
use ndarray::{ArrayView3, ArrayViewMut3, Axis, Zip};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Debug, Display},
    str::FromStr,
    sync::Arc,
};

use crate::errors::{CompositeError, Result};

/// Window of the output being accumulated.
pub struct MergedPixels<'a> {
    pub data: ArrayViewMut3<'a, f64>,
    pub valid: ArrayViewMut3<'a, bool>,
}

/// One source, placed on the same window of the output grid.
///
/// Pixels the source does not cover are invalid.
#[derive(Clone, Copy)]
pub struct SourcePixels<'a> {
    pub data: ArrayView3<'a, f64>,
    pub valid: ArrayView3<'a, bool>,
}

impl MergedPixels<'_> {
    fn reborrow(&mut self) -> MergedPixels<'_> {
        MergedPixels {
            data: self.data.view_mut(),
            valid: self.valid.view_mut(),
        }
    }
}

/// Folds one source into the merged output, pixel by pixel.
pub trait PixelCombiner: Send + Sync {
    fn combine(&self, merged: MergedPixels<'_>, new: SourcePixels<'_>) -> Result<()>;
}

impl<F> PixelCombiner for F
where
    F: Fn(MergedPixels<'_>, SourcePixels<'_>) -> Result<()> + Send + Sync,
{
    fn combine(&self, merged: MergedPixels<'_>, new: SourcePixels<'_>) -> Result<()> {
        self(merged, new)
    }
}

fn check_shapes(merged: &MergedPixels, new: &SourcePixels) -> Result<()> {
    let (merged_bands, merged_height, merged_width) = merged.data.dim();
    let (new_bands, new_height, new_width) = new.data.dim();
    if merged_bands != new_bands {
        return Err(CompositeError::BandCountMismatch {
            expected: merged_bands,
            found: new_bands,
        });
    }
    if (merged_height, merged_width) != (new_height, new_width) {
        return Err(CompositeError::ShapeMismatch {
            pixels: vec![new_bands, new_height, new_width],
            mask: vec![merged_bands, merged_height, merged_width],
        });
    }
    Ok(())
}

/// Apply `f(merged_value, merged_valid, new_value)` wherever the new
/// source is valid.
fn combine_valid(
    mut merged: MergedPixels,
    new: SourcePixels,
    f: impl Fn(&mut f64, &mut bool, f64),
) -> Result<()> {
    check_shapes(&merged, &new)?;
    Zip::from(&mut merged.data)
        .and(&mut merged.valid)
        .and(&new.data)
        .and(&new.valid)
        .for_each(|merged_value, merged_valid, &new_value, &new_valid| {
            if new_valid {
                f(merged_value, merged_valid, new_value)
            }
        });
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct CopyFirst;

impl PixelCombiner for CopyFirst {
    fn combine(&self, merged: MergedPixels<'_>, new: SourcePixels<'_>) -> Result<()> {
        combine_valid(merged, new, |value, valid, new_value| {
            if !*valid {
                *value = new_value;
                *valid = true;
            }
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CopyLast;

impl PixelCombiner for CopyLast {
    fn combine(&self, merged: MergedPixels<'_>, new: SourcePixels<'_>) -> Result<()> {
        combine_valid(merged, new, |value, valid, new_value| {
            *value = new_value;
            *valid = true;
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CopyMin;

impl PixelCombiner for CopyMin {
    fn combine(&self, merged: MergedPixels<'_>, new: SourcePixels<'_>) -> Result<()> {
        combine_valid(merged, new, |value, valid, new_value| {
            *value = if *valid { value.min(new_value) } else { new_value };
            *valid = true;
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CopyMax;

impl PixelCombiner for CopyMax {
    fn combine(&self, merged: MergedPixels<'_>, new: SourcePixels<'_>) -> Result<()> {
        combine_valid(merged, new, |value, valid, new_value| {
            *value = if *valid { value.max(new_value) } else { new_value };
            *valid = true;
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CopySum;

impl PixelCombiner for CopySum {
    fn combine(&self, merged: MergedPixels<'_>, new: SourcePixels<'_>) -> Result<()> {
        combine_valid(merged, new, |value, valid, new_value| {
            *value = if *valid { *value + new_value } else { new_value };
            *valid = true;
        })
    }
}

/// Number of valid contributions per pixel.
#[derive(Debug, Clone, Copy)]
pub struct CopyCount;

impl PixelCombiner for CopyCount {
    fn combine(&self, merged: MergedPixels<'_>, new: SourcePixels<'_>) -> Result<()> {
        combine_valid(merged, new, |value, valid, _| {
            *value = if *valid { *value + 1. } else { 1. };
            *valid = true;
        })
    }
}

/// Running sum in output band 0 and running count in output band 1, from a
/// single band source.
#[derive(Debug, Clone, Copy)]
pub struct SumAndCount;

impl PixelCombiner for SumAndCount {
    fn combine(&self, merged: MergedPixels<'_>, new: SourcePixels<'_>) -> Result<()> {
        let (merged_bands, new_bands) = (merged.data.len_of(Axis(0)), new.data.len_of(Axis(0)));
        if merged_bands != 2 || new_bands != 1 {
            return Err(CompositeError::BandCountMismatch {
                expected: 2 * new_bands,
                found: merged_bands,
            });
        }
        let (sum_data, count_data) = merged.data.split_at(Axis(0), 1);
        let (sum_valid, count_valid) = merged.valid.split_at(Axis(0), 1);
        let sum = MergedPixels {
            data: sum_data,
            valid: sum_valid,
        };
        let count = MergedPixels {
            data: count_data,
            valid: count_valid,
        };
        CopySum.combine(sum, new)?;
        CopyCount.combine(count, new)
    }
}

/// Valid pixels present in more than one source held different values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlappingPixelsWarning {
    pub differing_pixels: usize,
}

impl Display for OverlappingPixelsWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Input rasters have overlapping pixels with different values ({} pixels)",
            self.differing_pixels
        )
    }
}

/// Keeps the first valid value, like [CopyFirst], and records a warning
/// whenever a later source disagrees with it on an overlapping pixel.
///
/// Adjacent tiles overlap at their buffered edges and are expected to agree
/// there, so a disagreement is logged but never aborts the merge.
#[derive(Debug, Default)]
pub struct OverlapCheck {
    warnings: Mutex<Vec<OverlappingPixelsWarning>>,
}

impl OverlapCheck {
    pub fn warnings(&self) -> Vec<OverlappingPixelsWarning> {
        self.warnings.lock().clone()
    }
}

impl PixelCombiner for OverlapCheck {
    fn combine(&self, mut merged: MergedPixels<'_>, new: SourcePixels<'_>) -> Result<()> {
        check_shapes(&merged, &new)?;
        let mut differing_pixels = 0;
        Zip::from(&merged.data)
            .and(&merged.valid)
            .and(&new.data)
            .and(&new.valid)
            .for_each(|&value, &valid, &new_value, &new_valid| {
                if valid && new_valid && value != new_value {
                    differing_pixels += 1;
                }
            });

        if differing_pixels > 0 {
            let warning = OverlappingPixelsWarning { differing_pixels };
            warn!("{warning}");
            self.warnings.lock().push(warning);
        }

        CopyFirst.combine(merged.reborrow(), new)
    }
}

/// How overlapping pixels are combined.
#[derive(Clone)]
pub enum MergeMethod {
    First,
    Last,
    Min,
    Max,
    Sum,
    Count,
    /// Mean of all valid contributions, single band only.
    Mean,
    Custom(Arc<dyn PixelCombiner>),
}

impl Default for MergeMethod {
    fn default() -> Self {
        Self::First
    }
}

impl Debug for MergeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::First => write!(f, "First"),
            Self::Last => write!(f, "Last"),
            Self::Min => write!(f, "Min"),
            Self::Max => write!(f, "Max"),
            Self::Sum => write!(f, "Sum"),
            Self::Count => write!(f, "Count"),
            Self::Mean => write!(f, "Mean"),
            Self::Custom(_) => write!(f, "Custom"),
        }
    }
}

impl<P: PixelCombiner + 'static> From<Arc<P>> for MergeMethod {
    fn from(value: Arc<P>) -> Self {
        Self::Custom(value)
    }
}

impl FromStr for MergeMethod {
    type Err = CompositeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "sum" => Ok(Self::Sum),
            "count" => Ok(Self::Count),
            "mean" => Ok(Self::Mean),
            other => Err(CompositeError::InvalidConfig(format!(
                "unknown merge method {other}"
            ))),
        }
    }
}

impl MergeMethod {
    pub fn custom(
        f: impl Fn(MergedPixels<'_>, SourcePixels<'_>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Combiner folding sources into the accumulator; for [MergeMethod::Mean]
    /// that is the two band sum and count accumulator.
    pub(crate) fn combiner(&self) -> &dyn PixelCombiner {
        match self {
            Self::First => &CopyFirst,
            Self::Last => &CopyLast,
            Self::Min => &CopyMin,
            Self::Max => &CopyMax,
            Self::Sum => &CopySum,
            Self::Count => &CopyCount,
            Self::Mean => &SumAndCount,
            Self::Custom(combiner) => combiner.as_ref(),
        }
    }
}

/// Composite statistics over a stack of single band rasters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Mean,
    Min,
    Max,
    Stddev,
}

impl Statistic {
    pub const ALL: [Statistic; 4] = [Self::Mean, Self::Min, Self::Max, Self::Stddev];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::Stddev => "stddev",
        }
    }

    /// Single pass merge producing this statistic. Standard deviation needs
    /// a second pass over the mean instead.
    pub fn merge_method(&self) -> Option<MergeMethod> {
        match self {
            Self::Mean => Some(MergeMethod::Mean),
            Self::Min => Some(MergeMethod::Min),
            Self::Max => Some(MergeMethod::Max),
            Self::Stddev => None,
        }
    }
}

impl Display for Statistic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Statistic {
    type Err = CompositeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|statistic| statistic.name() == s)
            .ok_or_else(|| CompositeError::InvalidConfig(format!("unknown statistic {s}")))
    }
}
