// src/market/surface.rs
//! Option quote grids indexed by (row, maturity year)
//!
//! A [`MarketDataSource`] supplies six equally shaped grids; the
//! [`MarketSurface`] constructor checks every shape, label and ordering
//! invariant once so that calibration can index without re-checking.

use crate::error::{AutocallError, AutocallResult};
use ndarray::{Array2, ArrayView1};

/// The quoted fields of a market grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketField {
    Strike,
    TimeToMaturity,
    CallPrice,
    PutPrice,
    SpotPrice,
    RiskFreeRate,
}

impl MarketField {
    pub fn name(&self) -> &'static str {
        match self {
            MarketField::Strike => "strike",
            MarketField::TimeToMaturity => "time_to_maturity",
            MarketField::CallPrice => "call_price",
            MarketField::PutPrice => "put_price",
            MarketField::SpotPrice => "spot_price",
            MarketField::RiskFreeRate => "risk_free_rate",
        }
    }
}

/// Anything that can hand over rectangular quote grids
///
/// Columns are maturity years (in the order given by `maturity_years`),
/// rows are quote indices. How the grids are sourced is up to the
/// implementor.
pub trait MarketDataSource {
    fn maturity_years(&self) -> Vec<i32>;
    fn grid(&self, field: MarketField) -> AutocallResult<Array2<f64>>;
}

/// Grids already held in memory
#[derive(Debug, Clone)]
pub struct InMemoryMarketData {
    pub maturity_years: Vec<i32>,
    pub strike: Array2<f64>,
    pub time_to_maturity: Array2<f64>,
    pub call_price: Array2<f64>,
    pub put_price: Array2<f64>,
    pub spot_price: Array2<f64>,
    pub risk_free_rate: Array2<f64>,
}

impl MarketDataSource for InMemoryMarketData {
    fn maturity_years(&self) -> Vec<i32> {
        self.maturity_years.clone()
    }

    fn grid(&self, field: MarketField) -> AutocallResult<Array2<f64>> {
        let grid = match field {
            MarketField::Strike => &self.strike,
            MarketField::TimeToMaturity => &self.time_to_maturity,
            MarketField::CallPrice => &self.call_price,
            MarketField::PutPrice => &self.put_price,
            MarketField::SpotPrice => &self.spot_price,
            MarketField::RiskFreeRate => &self.risk_free_rate,
        };
        Ok(grid.clone())
    }
}

/// Shape-validated, read-only market grids
#[derive(Debug, Clone)]
pub struct MarketSurface {
    years: Vec<i32>,
    strike: Array2<f64>,
    time_to_maturity: Array2<f64>,
    call_price: Array2<f64>,
    put_price: Array2<f64>,
    spot_price: Array2<f64>,
    risk_free_rate: Array2<f64>,
}

impl MarketSurface {
    /// Pull every grid from `source` and validate it
    pub fn from_source<S: MarketDataSource + ?Sized>(source: &S) -> AutocallResult<Self> {
        Self::new(
            source.maturity_years(),
            source.grid(MarketField::Strike)?,
            source.grid(MarketField::TimeToMaturity)?,
            source.grid(MarketField::CallPrice)?,
            source.grid(MarketField::PutPrice)?,
            source.grid(MarketField::SpotPrice)?,
            source.grid(MarketField::RiskFreeRate)?,
        )
    }

    /// # Invariants checked
    ///
    /// - at least one row and one column, one label per column, no
    ///   duplicate labels
    /// - all six grids share one shape
    /// - every value is finite
    /// - strikes ascend strictly down each column
    pub fn new(
        years: Vec<i32>,
        strike: Array2<f64>,
        time_to_maturity: Array2<f64>,
        call_price: Array2<f64>,
        put_price: Array2<f64>,
        spot_price: Array2<f64>,
        risk_free_rate: Array2<f64>,
    ) -> AutocallResult<Self> {
        let shape = strike.dim();
        if shape.0 == 0 || shape.1 == 0 {
            return Err(invalid(format!("empty strike grid {:?}", shape)));
        }
        if years.len() != shape.1 {
            return Err(invalid(format!(
                "{} maturity labels for {} columns",
                years.len(),
                shape.1
            )));
        }
        let mut sorted = years.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != years.len() {
            return Err(invalid("duplicate maturity year labels".to_string()));
        }

        let grids = [
            (MarketField::Strike, &strike),
            (MarketField::TimeToMaturity, &time_to_maturity),
            (MarketField::CallPrice, &call_price),
            (MarketField::PutPrice, &put_price),
            (MarketField::SpotPrice, &spot_price),
            (MarketField::RiskFreeRate, &risk_free_rate),
        ];
        for (field, grid) in grids {
            if grid.dim() != shape {
                return Err(invalid(format!(
                    "{} grid has shape {:?}, strike grid has {:?}",
                    field.name(),
                    grid.dim(),
                    shape
                )));
            }
            if let Some(((row, col), value)) = grid.indexed_iter().find(|(_, v)| !v.is_finite()) {
                return Err(invalid(format!(
                    "{}[{}, {}] = {} is not finite",
                    field.name(),
                    row,
                    years[col],
                    value
                )));
            }
        }

        for (col, column) in strike.columns().into_iter().enumerate() {
            if let Some(row) = (1..column.len()).find(|&i| column[i] <= column[i - 1]) {
                return Err(AutocallError::Calibration {
                    reason: format!(
                        "strikes for maturity {} are not strictly ascending at row {} ({} after {})",
                        years[col],
                        row,
                        column[row],
                        column[row - 1]
                    ),
                });
            }
        }

        Ok(MarketSurface {
            years,
            strike,
            time_to_maturity,
            call_price,
            put_price,
            spot_price,
            risk_free_rate,
        })
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    /// (rows, maturity columns)
    pub fn dim(&self) -> (usize, usize) {
        self.strike.dim()
    }

    /// Column position of a maturity year
    pub fn column_of(&self, year: i32) -> Option<usize> {
        self.years.iter().position(|&y| y == year)
    }

    pub fn field(&self, field: MarketField) -> &Array2<f64> {
        match field {
            MarketField::Strike => &self.strike,
            MarketField::TimeToMaturity => &self.time_to_maturity,
            MarketField::CallPrice => &self.call_price,
            MarketField::PutPrice => &self.put_price,
            MarketField::SpotPrice => &self.spot_price,
            MarketField::RiskFreeRate => &self.risk_free_rate,
        }
    }

    /// One maturity column of a field
    pub fn column(&self, field: MarketField, year: i32) -> AutocallResult<ArrayView1<'_, f64>> {
        let col = self.column_of(year).ok_or_else(|| AutocallError::Calibration {
            reason: format!("maturity year {} is not tabulated (have {:?})", year, self.years),
        })?;
        Ok(self.field(field).column(col))
    }

    pub fn strike(&self) -> &Array2<f64> {
        &self.strike
    }

    pub fn time_to_maturity(&self) -> &Array2<f64> {
        &self.time_to_maturity
    }

    pub fn call_price(&self) -> &Array2<f64> {
        &self.call_price
    }

    pub fn put_price(&self) -> &Array2<f64> {
        &self.put_price
    }

    pub fn spot_price(&self) -> &Array2<f64> {
        &self.spot_price
    }

    pub fn risk_free_rate(&self) -> &Array2<f64> {
        &self.risk_free_rate
    }
}

fn invalid(reason: String) -> AutocallError {
    AutocallError::InvalidMarketData { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn source() -> InMemoryMarketData {
        InMemoryMarketData {
            maturity_years: vec![2016, 2017],
            strike: array![[90.0, 90.0], [100.0, 100.0], [110.0, 110.0]],
            time_to_maturity: array![[1.0, 2.0], [1.0, 2.0], [1.0, 2.0]],
            call_price: array![[12.0, 15.0], [6.0, 9.0], [2.0, 5.0]],
            put_price: array![[1.0, 2.0], [5.0, 6.0], [10.0, 11.0]],
            spot_price: Array2::from_elem((3, 2), 100.0),
            risk_free_rate: Array2::from_elem((3, 2), 0.0001),
        }
    }

    #[test]
    fn test_from_source_round_trips_fields() {
        let surface = MarketSurface::from_source(&source()).unwrap();
        assert_eq!(surface.dim(), (3, 2));
        assert_eq!(surface.column_of(2017), Some(1));
        assert_eq!(surface.column(MarketField::Strike, 2016).unwrap()[2], 110.0);
        assert!(surface.column(MarketField::Strike, 2030).is_err());
    }

    #[test]
    fn test_rejects_mismatched_shapes() {
        let mut data = source();
        data.put_price = Array2::zeros((2, 2));
        let err = MarketSurface::from_source(&data).unwrap_err();
        assert!(matches!(err, AutocallError::InvalidMarketData { .. }));
        assert!(err.to_string().contains("put_price"));
    }

    #[test]
    fn test_rejects_label_count_and_duplicates() {
        let mut data = source();
        data.maturity_years = vec![2016];
        assert!(MarketSurface::from_source(&data).is_err());
        data.maturity_years = vec![2016, 2016];
        assert!(MarketSurface::from_source(&data).is_err());
    }

    #[test]
    fn test_rejects_unsorted_strikes() {
        let mut data = source();
        data.strike = array![[90.0, 90.0], [110.0, 100.0], [100.0, 110.0]];
        let err = MarketSurface::from_source(&data).unwrap_err();
        assert!(matches!(err, AutocallError::Calibration { .. }));
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let mut data = source();
        data.call_price[[1, 1]] = f64::NAN;
        assert!(MarketSurface::from_source(&data).is_err());
    }
}
