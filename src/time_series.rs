//! Annual time series for a single region.
use crate::input::is_sorted_and_unique;
use crate::region::RegionID;
use anyhow::{Result, ensure};
use std::ops::RangeInclusive;

/// A sequence of annual values for a region.
///
/// Years are strictly increasing and there is exactly one value per year.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    region_id: RegionID,
    years: Vec<u32>,
    values: Vec<f64>,
}

impl TimeSeries {
    /// Create a new [`TimeSeries`], checking that its shape is valid.
    ///
    /// # Arguments
    ///
    /// * `region_id` - The region the series refers to
    /// * `years` - Strictly increasing years
    /// * `values` - One value for every year
    pub fn new(region_id: RegionID, years: Vec<u32>, values: Vec<f64>) -> Result<Self> {
        ensure!(
            years.len() == values.len(),
            "Time series for region {region_id} has {} years but {} values",
            years.len(),
            values.len()
        );
        ensure!(
            is_sorted_and_unique(&years),
            "Years in time series for region {region_id} must be unique and in order"
        );

        Ok(Self {
            region_id,
            years,
            values,
        })
    }

    /// Create a new [`TimeSeries`] covering a range of years, with values given by `f`
    pub fn from_fn<F>(region_id: RegionID, years: RangeInclusive<u32>, f: F) -> Self
    where
        F: FnMut(u32) -> f64,
    {
        let years: Vec<u32> = years.collect();
        let values = years.iter().copied().map(f).collect();
        Self {
            region_id,
            years,
            values,
        }
    }

    /// Create a new [`TimeSeries`] from `(year, value)` pairs, which must be in year order
    pub fn from_pairs<I>(region_id: RegionID, pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, f64)>,
    {
        let (years, values): (Vec<u32>, Vec<f64>) = pairs.into_iter().unzip();
        debug_assert!(is_sorted_and_unique(&years));
        Self {
            region_id,
            years,
            values,
        }
    }

    /// Check that no value in the series is negative or non-finite
    pub fn check_non_negative(&self) -> Result<()> {
        for (year, value) in self.iter() {
            ensure!(
                value.is_finite() && value >= 0.0,
                "Invalid value {value} for region {} in year {year}: values must be finite and \
                non-negative",
                self.region_id
            );
        }

        Ok(())
    }

    /// The region this series refers to
    pub fn region_id(&self) -> &RegionID {
        &self.region_id
    }

    /// The years covered by this series
    pub fn years(&self) -> &[u32] {
        &self.years
    }

    /// The values in this series
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The number of years in the series
    pub fn len(&self) -> usize {
        self.years.len()
    }

    /// Whether the series is empty
    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    /// The first year of the series, if any
    pub fn first_year(&self) -> Option<u32> {
        self.years.first().copied()
    }

    /// The last year of the series, if any
    pub fn last_year(&self) -> Option<u32> {
        self.years.last().copied()
    }

    /// The last value of the series, if any
    pub fn last_value(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// Get the value for the given year, if present
    pub fn get(&self, year: u32) -> Option<f64> {
        let idx = self.years.binary_search(&year).ok()?;
        Some(self.values[idx])
    }

    /// The latest `(year, value)` pair at or before the given year, if any
    pub fn latest_at_or_before(&self, year: u32) -> Option<(u32, f64)> {
        let idx = self.years.partition_point(|&y| y <= year).checked_sub(1)?;
        Some((self.years[idx], self.values[idx]))
    }

    /// Iterate over `(year, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.years.iter().copied().zip(self.values.iter().copied())
    }

    /// Create a new series containing only the years within `years`
    pub fn restrict(&self, years: RangeInclusive<u32>) -> Self {
        let (years, values) = self.iter().filter(|(year, _)| years.contains(year)).unzip();
        Self {
            region_id: self.region_id.clone(),
            years,
            values,
        }
    }
}
