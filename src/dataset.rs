//! Historical data used to calibrate forecasts.
use crate::region::RegionID;
use crate::technology::TechnologyRole;
use crate::time_series::TimeSeries;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::collections::HashMap;
use strum::Display;

/// The kind of quantity a historical series measures
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, DeserializeLabeledStringEnum, Display,
)]
#[strum(serialize_all = "snake_case")]
pub enum Metric {
    /// Unit cost of a technology
    #[string = "cost"]
    Cost,
    /// Annual sales or demand
    #[string = "demand"]
    Demand,
    /// Number of units in active use
    #[string = "installed_base"]
    InstalledBase,
}

/// A source of historical time series.
///
/// The forecasting engine only ever reads historical data through this trait, so that data can be
/// supplied from any backing store.
pub trait DatasetProvider {
    /// Get the series for the given region, technology role and metric, if there is one
    fn get_series(
        &self,
        region_id: &RegionID,
        role: TechnologyRole,
        metric: Metric,
    ) -> Option<&TimeSeries>;
}

/// Historical data held in memory, keyed by region, technology role and metric
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HistoricalData(HashMap<(RegionID, TechnologyRole, Metric), TimeSeries>);

impl HistoricalData {
    /// Create an empty data set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a series, replacing any existing series with the same key
    pub fn insert(&mut self, role: TechnologyRole, metric: Metric, series: TimeSeries) {
        self.0
            .insert((series.region_id().clone(), role, metric), series);
    }

    /// The number of series held
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no series
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl DatasetProvider for HistoricalData {
    fn get_series(
        &self,
        region_id: &RegionID,
        role: TechnologyRole,
        metric: Metric,
    ) -> Option<&TimeSeries> {
        self.0.get(&(region_id.clone(), role, metric))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_historical_data() {
        let mut data = HistoricalData::new();
        assert!(data.is_empty());

        let series = TimeSeries::new("GBR".into(), vec![2020, 2021], vec![1.0, 2.0]).unwrap();
        data.insert(TechnologyRole::Market, Metric::Demand, series.clone());
        assert_eq!(data.len(), 1);

        let gbr = "GBR".into();
        assert_eq!(
            data.get_series(&gbr, TechnologyRole::Market, Metric::Demand),
            Some(&series)
        );
        assert_eq!(
            data.get_series(&gbr, TechnologyRole::Disruptor, Metric::Demand),
            None
        );
        assert_eq!(
            data.get_series(&"USA".into(), TechnologyRole::Market, Metric::Demand),
            None
        );
    }
}
