//! Model terms and the design matrix they expand to.

use crate::merge::types::MergedRecord;
use crate::model::error::{ModelError, Result};
use ndarray::{Array1, Array2};
use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::Range;
use tracing::{debug, warn};

/// Transformation applied to a numeric covariate before it enters the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Transform {
    Identity,
    Log,
    /// `ln(1 + x)`, for counts that may be zero.
    Log1p,
}

impl Transform {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Transform::Identity => value,
            Transform::Log => value.ln(),
            Transform::Log1p => value.ln_1p(),
        }
    }

    pub fn label(self, name: &str) -> String {
        match self {
            Transform::Identity => name.to_string(),
            Transform::Log => format!("log({name})"),
            Transform::Log1p => format!("log1p({name})"),
        }
    }
}

/// Numeric columns of [`MergedRecord`] usable as predictors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Covariate {
    Assault,
    AutoTheft,
    BreakAndEnter,
    Robbery,
    TheftOver,
    MeanTemp,
    TotalPrecip,
    Cpi,
    UnemploymentRate,
}

impl Covariate {
    pub fn name(self) -> &'static str {
        match self {
            Covariate::Assault => "assault",
            Covariate::AutoTheft => "auto_theft",
            Covariate::BreakAndEnter => "break_and_enter",
            Covariate::Robbery => "robbery",
            Covariate::TheftOver => "theft_over",
            Covariate::MeanTemp => "mean_temp",
            Covariate::TotalPrecip => "total_precip",
            Covariate::Cpi => "cpi",
            Covariate::UnemploymentRate => "unemployment_rate",
        }
    }

    pub fn value(self, record: &MergedRecord) -> Option<f64> {
        match self {
            Covariate::Assault => Some(f64::from(record.assault)),
            Covariate::AutoTheft => Some(f64::from(record.auto_theft)),
            Covariate::BreakAndEnter => Some(f64::from(record.break_and_enter)),
            Covariate::Robbery => Some(f64::from(record.robbery)),
            Covariate::TheftOver => Some(f64::from(record.theft_over)),
            Covariate::MeanTemp => record.mean_temp,
            Covariate::TotalPrecip => record.total_precip,
            Covariate::Cpi => record.cpi,
            Covariate::UnemploymentRate => record.unemployment_rate,
        }
    }
}

/// Categorical columns, coded with treatment contrasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Factor {
    Sector,
    Neighbourhood,
}

impl Factor {
    pub fn name(self) -> &'static str {
        match self {
            Factor::Sector => "sector",
            Factor::Neighbourhood => "neighbourhood",
        }
    }

    /// Level label for a record. Neighbourhood ids are zero-padded so that
    /// lexical order matches numeric order.
    pub fn level(self, record: &MergedRecord) -> Option<String> {
        match self {
            Factor::Sector => {
                let sector = record.sector.trim();
                (!sector.is_empty()).then(|| sector.to_string())
            }
            Factor::Neighbourhood => record.hood_158.map(|hood| format!("{hood:03}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Term {
    Numeric {
        covariate: Covariate,
        transform: Transform,
    },
    Categorical(Factor),
}

impl Term {
    fn numeric(covariate: Covariate, transform: Transform) -> Self {
        Term::Numeric {
            covariate,
            transform,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Term::Numeric {
                covariate,
                transform,
            } => transform.label(covariate.name()),
            Term::Categorical(factor) => factor.name().to_string(),
        }
    }
}

/// Ordered list of model terms. An intercept is always included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSpec {
    pub terms: Vec<Term>,
}

impl Default for ModelSpec {
    /// Crime counts and precipitation are right-skewed with zeros, so they
    /// take `log1p`; CPI and unemployment are strictly positive and take
    /// `log`; temperature crosses zero and stays on its own scale.
    fn default() -> Self {
        Self {
            terms: vec![
                Term::numeric(Covariate::Assault, Transform::Log1p),
                Term::numeric(Covariate::AutoTheft, Transform::Log1p),
                Term::numeric(Covariate::BreakAndEnter, Transform::Log1p),
                Term::numeric(Covariate::Robbery, Transform::Log1p),
                Term::numeric(Covariate::TheftOver, Transform::Log1p),
                Term::numeric(Covariate::MeanTemp, Transform::Identity),
                Term::numeric(Covariate::TotalPrecip, Transform::Log1p),
                Term::numeric(Covariate::Cpi, Transform::Log),
                Term::numeric(Covariate::UnemploymentRate, Transform::Log),
                Term::Categorical(Factor::Sector),
                Term::Categorical(Factor::Neighbourhood),
            ],
        }
    }
}

impl ModelSpec {
    pub fn without_factor(mut self, factor: Factor) -> Self {
        self.terms.retain(|term| *term != Term::Categorical(factor));
        self
    }
}

/// Columns of the design matrix belonging to one term.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermColumns {
    pub name: String,
    pub columns: Range<usize>,
}

/// Response vector and design matrix, with an intercept in column 0.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub column_names: Vec<String>,
    pub terms: Vec<TermColumns>,
}

enum Column {
    Numeric {
        covariate: Covariate,
        transform: Transform,
    },
    Indicator {
        factor: Factor,
        level: String,
    },
}

impl DesignMatrix {
    /// Expands `spec` over `records`. The response is the binary availability
    /// indicator.
    ///
    /// A factor with a single observed level contributes no columns and is
    /// left out of the term list.
    ///
    /// # Errors
    ///
    /// Fails on an empty table, a missing covariate or factor level, or a
    /// value that is not finite after its transform (e.g. `log(0)`).
    pub fn build(records: &[MergedRecord], spec: &ModelSpec) -> Result<Self> {
        if records.is_empty() {
            return Err(ModelError::EmptyInput("no records to model".to_string()));
        }

        let mut columns = Vec::new();
        let mut column_names = vec!["(Intercept)".to_string()];
        let mut terms = Vec::new();

        for term in &spec.terms {
            let start = column_names.len();
            match *term {
                Term::Numeric {
                    covariate,
                    transform,
                } => {
                    columns.push(Column::Numeric {
                        covariate,
                        transform,
                    });
                    column_names.push(term.label());
                }
                Term::Categorical(factor) => {
                    let levels = factor_levels(records, factor)?;
                    if levels.len() < 2 {
                        warn!(factor = factor.name(), "Factor has a single level, dropped");
                        continue;
                    }
                    // The first level is the reference.
                    for level in levels.into_iter().skip(1) {
                        column_names.push(format!("{}[{}]", factor.name(), level));
                        columns.push(Column::Indicator { factor, level });
                    }
                }
            }
            terms.push(TermColumns {
                name: term.label(),
                columns: start..column_names.len(),
            });
        }

        let n = records.len();
        let p = column_names.len();
        let mut x = Array2::zeros((n, p));
        let mut y = Array1::zeros(n);

        for (row, record) in records.iter().enumerate() {
            y[row] = f64::from(record.available);
            x[[row, 0]] = 1.0;

            for (offset, column) in columns.iter().enumerate() {
                let j = offset + 1;
                x[[row, j]] = match column {
                    Column::Numeric {
                        covariate,
                        transform,
                    } => {
                        let raw = covariate.value(record).ok_or_else(|| ModelError::MissingValue {
                            column: covariate.name().to_string(),
                            row,
                        })?;
                        let value = transform.apply(raw);
                        if !value.is_finite() {
                            return Err(ModelError::NonFinite {
                                column: column_names[j].clone(),
                                row,
                            });
                        }
                        value
                    }
                    Column::Indicator { factor, level } => {
                        let observed = factor.level(record);
                        f64::from(u8::from(observed.as_deref() == Some(level.as_str())))
                    }
                };
            }
        }

        debug!(rows = n, columns = p, terms = terms.len(), "Design matrix built");

        Ok(Self {
            x,
            y,
            column_names,
            terms,
        })
    }

    pub fn n_obs(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_params(&self) -> usize {
        self.x.ncols()
    }
}

fn factor_levels(records: &[MergedRecord], factor: Factor) -> Result<Vec<String>> {
    let mut levels = BTreeSet::new();
    for (row, record) in records.iter().enumerate() {
        let level = factor.level(record).ok_or_else(|| ModelError::MissingValue {
            column: factor.name().to_string(),
            row,
        })?;
        levels.insert(level);
    }
    Ok(levels.into_iter().collect())
}
