//! Stock-flow accounting of the installed base of a technology.
use crate::technology::TechnologyID;
use crate::units::{Flow, Stock, Year};
use anyhow::{Result, bail, ensure};
use log::warn;

/// The stock and flows of a technology for a single year
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockRecord {
    /// The year
    pub year: u32,
    /// Installed base at the start of the year
    pub stock: Stock,
    /// Units added during the year (i.e. the technology's demand)
    pub additions: Flow,
    /// Units reaching the end of their life during the year
    pub retirements: Flow,
    /// Mass balance residual as a proportion of the opening stock
    pub residual: f64,
}

/// The state of an [`InstalledBaseTracker`]
#[derive(Debug, Clone, Copy, PartialEq)]
enum TrackerState {
    /// No initial stock has been provided yet
    Uninitialised,
    /// Tracking is underway, with the stock and year of the next step
    Running { stock: Stock, year: u32 },
    /// No more steps can be taken
    Finalised,
}

/// Tracks the installed base of one technology in one region.
///
/// Each year a fixed fraction of the stock (one over the lifetime) retires and the year's demand
/// is added.
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledBaseTracker {
    technology_id: TechnologyID,
    lifetime: Year,
    mass_balance_tolerance: f64,
    state: TrackerState,
    records: Vec<StockRecord>,
}

impl InstalledBaseTracker {
    /// Create a new tracker.
    ///
    /// # Arguments
    ///
    /// * `technology_id` - The technology being tracked
    /// * `lifetime` - Average lifetime of a unit
    /// * `mass_balance_tolerance` - Relative residual above which a warning is issued
    pub fn new(
        technology_id: TechnologyID,
        lifetime: Year,
        mass_balance_tolerance: f64,
    ) -> Result<Self> {
        ensure!(
            lifetime.is_finite() && lifetime > Year(0.0),
            "Lifetime for technology {technology_id} must be greater than zero"
        );

        Ok(Self {
            technology_id,
            lifetime,
            mass_balance_tolerance,
            state: TrackerState::Uninitialised,
            records: Vec::new(),
        })
    }

    /// Set the installed base at the start of `year`
    pub fn initialise(&mut self, year: u32, stock: Stock) -> Result<()> {
        ensure!(
            self.state == TrackerState::Uninitialised,
            "Installed base tracker for {} has already been initialised",
            self.technology_id
        );
        ensure!(
            stock.is_finite() && stock >= Stock(0.0),
            "Initial installed base for {} must be finite and non-negative",
            self.technology_id
        );

        self.state = TrackerState::Running { stock, year };

        Ok(())
    }

    /// Set the initial installed base to the steady-state stock for the given demand
    pub fn initialise_from_demand(&mut self, year: u32, demand: Flow) -> Result<()> {
        self.initialise(year, demand * self.lifetime)
    }

    /// Advance by one year, adding `additions` units
    pub fn step(&mut self, additions: Flow) -> Result<&StockRecord> {
        let TrackerState::Running { stock, year } = self.state else {
            bail!(
                "Installed base tracker for {} is not running",
                self.technology_id
            );
        };
        ensure!(
            additions.is_finite() && additions >= Flow(0.0),
            "Additions to installed base of {} in {year} must be finite and non-negative",
            self.technology_id
        );

        let retirements = stock / self.lifetime;
        let unclamped = stock + additions * Year(1.0) - retirements * Year(1.0);
        let next_stock = unclamped.max(Stock(0.0));

        let residual = if stock > Stock(0.0) {
            ((next_stock - unclamped) / stock).value().abs()
        } else {
            0.0
        };
        if residual > self.mass_balance_tolerance {
            warn!(
                "Mass balance residual of {residual:.4} for {} in {year} exceeds tolerance",
                self.technology_id
            );
        }

        self.records.push(StockRecord {
            year,
            stock,
            additions,
            retirements,
            residual,
        });
        self.state = TrackerState::Running {
            stock: next_stock,
            year: year + 1,
        };

        // We just pushed a record, so there is always a last one
        Ok(&self.records[self.records.len() - 1])
    }

    /// Stop tracking and return the record for every year
    pub fn finalise(&mut self) -> Result<Vec<StockRecord>> {
        ensure!(
            matches!(self.state, TrackerState::Running { .. }),
            "Installed base tracker for {} is not running",
            self.technology_id
        );
        self.state = TrackerState::Finalised;

        Ok(std::mem::take(&mut self.records))
    }
}

/// Track the installed base of a technology over consecutive years.
///
/// The initial stock is taken from `initial_stock` if available, otherwise it is the stock
/// needed to sustain the first year's demand.
pub fn track_installed_base(
    technology_id: TechnologyID,
    lifetime: Year,
    mass_balance_tolerance: f64,
    initial_stock: Option<Stock>,
    demand: &[(u32, Flow)],
) -> Result<Vec<StockRecord>> {
    let mut tracker = InstalledBaseTracker::new(technology_id, lifetime, mass_balance_tolerance)?;
    let Some(&(start_year, start_demand)) = demand.first() else {
        return Ok(Vec::new());
    };

    match initial_stock {
        Some(stock) => tracker.initialise(start_year, stock)?,
        None => tracker.initialise_from_demand(start_year, start_demand)?,
    }
    for (_, additions) in demand {
        tracker.step(*additions)?;
    }

    tracker.finalise()
}
