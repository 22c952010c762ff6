//! Statistical model boundary
//!
//! The ensemble treats the model as an optional, externally supplied
//! predictor over `FeatureMatrix` rows. `CentroidModel` is the built-in
//! implementation: standardize every feature, average each category's rows
//! into a centroid, then score rows by softmax over negative distances.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::features::FeatureMatrix;
use crate::models::{Category, CategoryDistribution};

/// A trained predictor the ensemble can consult
pub trait StatisticalModel: Send + Sync {
    /// Most likely category and its probability, per row
    fn predict(&self, features: &FeatureMatrix) -> Result<(Vec<Category>, Vec<f64>)>;

    /// Full distribution per row
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<CategoryDistribution>>;
}

/// Nearest-centroid classifier over standardized features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentroidModel {
    pub feature_names: Vec<String>,
    means: Vec<f64>,
    scales: Vec<f64>,
    centroids: BTreeMap<Category, Vec<f64>>,
    /// Softmax temperature; lower is sharper
    pub temperature: f64,
    /// Number of rows the model was fit on
    pub trained_rows: usize,
}

impl CentroidModel {
    pub const DEFAULT_TEMPERATURE: f64 = 0.5;

    /// Fit on a labeled matrix (one label per row)
    pub fn fit(features: &FeatureMatrix, labels: &[Category]) -> Result<Self> {
        if features.n_rows() == 0 {
            return Err(Error::EmptyBatch);
        }
        features.validate(labels.len())?;

        let n_features = features.n_features();
        let n_rows = features.n_rows() as f64;

        let mut means = vec![0.0; n_features];
        for row in &features.rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v / n_rows;
            }
        }

        let mut scales = vec![0.0; n_features];
        for row in &features.rows {
            for ((s, v), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2) / n_rows;
            }
        }
        for s in &mut scales {
            *s = s.sqrt();
            // Constant columns carry no information; keep them at zero
            if !s.is_finite() || *s < 1e-12 {
                *s = 1.0;
            }
        }

        let mut sums: BTreeMap<Category, (Vec<f64>, usize)> = BTreeMap::new();
        for (row, label) in features.rows.iter().zip(labels) {
            let entry = sums
                .entry(*label)
                .or_insert_with(|| (vec![0.0; n_features], 0));
            for (i, v) in row.iter().enumerate() {
                entry.0[i] += (v - means[i]) / scales[i];
            }
            entry.1 += 1;
        }

        let centroids: BTreeMap<Category, Vec<f64>> = sums
            .into_iter()
            .map(|(category, (sum, count))| {
                (category, sum.into_iter().map(|v| v / count as f64).collect())
            })
            .collect();

        debug!(
            rows = features.n_rows(),
            features = n_features,
            categories = centroids.len(),
            "Fit centroid model"
        );

        Ok(Self {
            feature_names: features.feature_names.clone(),
            means,
            scales,
            centroids,
            temperature: Self::DEFAULT_TEMPERATURE,
            trained_rows: features.n_rows(),
        })
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Categories the model has a centroid for
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.centroids.keys().copied()
    }

    /// Rows re-ordered into the model's column layout and standardized.
    /// Columns the input lacks read as the training mean.
    fn align(&self, features: &FeatureMatrix) -> Vec<Vec<f64>> {
        let index: Vec<Option<usize>> = self
            .feature_names
            .iter()
            .map(|name| features.column_index(name))
            .collect();

        features
            .rows
            .iter()
            .map(|row| {
                index
                    .iter()
                    .enumerate()
                    .map(|(i, idx)| match idx.and_then(|j| row.get(j)) {
                        Some(v) if v.is_finite() => (v - self.means[i]) / self.scales[i],
                        _ => 0.0,
                    })
                    .collect()
            })
            .collect()
    }

    fn check(&self) -> Result<()> {
        if self.centroids.is_empty() {
            return Err(Error::Model("Model has no centroids".to_string()));
        }
        if self.means.len() != self.feature_names.len()
            || self.scales.len() != self.feature_names.len()
            || self
                .centroids
                .values()
                .any(|c| c.len() != self.feature_names.len())
        {
            return Err(Error::Model("Model dimensions are inconsistent".to_string()));
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(Error::Model(format!(
                "Invalid temperature: {}",
                self.temperature
            )));
        }
        Ok(())
    }

    fn distribution(&self, row: &[f64]) -> CategoryDistribution {
        let dims = (row.len().max(1)) as f64;
        let logits: Vec<(Category, f64)> = self
            .centroids
            .iter()
            .map(|(category, centroid)| {
                let dist: f64 = row
                    .iter()
                    .zip(centroid)
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>()
                    .sqrt()
                    / dims.sqrt();
                (*category, -dist / self.temperature)
            })
            .collect();

        let max = logits
            .iter()
            .map(|(_, l)| *l)
            .fold(f64::NEG_INFINITY, f64::max);
        let exps: BTreeMap<Category, f64> = logits
            .into_iter()
            .map(|(c, l)| (c, (l - max).exp()))
            .collect();
        let total: f64 = exps.values().sum();

        // Categories without a centroid get zero probability
        CategoryDistribution::from_normalized(
            Category::ALL
                .iter()
                .map(|c| (*c, exps.get(c).map(|e| e / total).unwrap_or(0.0)))
                .collect(),
        )
    }
}

impl StatisticalModel for CentroidModel {
    fn predict(&self, features: &FeatureMatrix) -> Result<(Vec<Category>, Vec<f64>)> {
        let dists = self.predict_proba(features)?;
        let mut categories = Vec::with_capacity(dists.len());
        let mut confidences = Vec::with_capacity(dists.len());
        for dist in dists {
            let (category, p) = dist
                .most_likely()
                .ok_or_else(|| Error::Model("Empty distribution".to_string()))?;
            categories.push(category);
            confidences.push(p);
        }
        Ok((categories, confidences))
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<CategoryDistribution>> {
        self.check()?;
        features.validate(features.n_rows())?;
        Ok(self
            .align(features)
            .iter()
            .map(|row| self.distribution(row))
            .collect())
    }
}
