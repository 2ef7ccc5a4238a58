//! Daily forecast scoring.
//!
//! For forecast day `today + d` a member with lag `L` is read on
//! `today + d - L`. Dates after `today` have not been observed yet, so
//! a member whose lag is shorter than the lead contributes nothing and is
//! reported inactive for that day.

use super::classifier::EventClassifier;
use crate::config::{ActivityRule, ClassifierConfig, ConfidenceStep, ForecastConfig, SnowlagConfig};
use crate::model::{
    ConfidenceTier, Ensemble, ForecastDay, MagnitudeRange, Mechanism, ObservationSeries, PredictorContribution,
    PredictorState, PredictorWeight, Quantity, SignalStatus, SnowlagError,
};
use crate::thresholds::predictor_signal;
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};

const NO_MAGNITUDE: MagnitudeRange = MagnitudeRange { low_mm: 0.0, high_mm: 0.0 };

// ---------------------------------------------------------------------------
// Recent observations
// ---------------------------------------------------------------------------

/// The observation window a forecast is issued from: the issue date plus
/// whatever recent series were fetched for the ensemble's predictors.
#[derive(Debug, Clone)]
pub struct RecentObservations {
    today: NaiveDate,
    series: HashMap<(String, Quantity), ObservationSeries>,
}

impl RecentObservations {
    pub fn new(today: NaiveDate) -> Self {
        Self { today, series: HashMap::new() }
    }

    pub fn insert(&mut self, series: ObservationSeries) {
        let key = (series.location_id().to_string(), series.quantity());
        self.series.insert(key, series);
    }

    pub fn with(mut self, series: ObservationSeries) -> Self {
        self.insert(series);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn get(&self, location_id: &str, quantity: Quantity) -> Option<&ObservationSeries> {
        self.series.get(&(location_id.to_string(), quantity))
    }

    /// Observed value, never one dated after `today`.
    pub fn value(&self, location_id: &str, quantity: Quantity, date: NaiveDate) -> Option<f64> {
        if date > self.today {
            return None;
        }
        self.get(location_id, quantity).and_then(|s| s.value_on(date))
    }
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ForecastScorer {
    rules: BTreeMap<Quantity, ActivityRule>,
    high_confidence: Vec<ConfidenceStep>,
    moderate_confidence: Vec<ConfidenceStep>,
    classifier: EventClassifier,
}

impl ForecastScorer {
    pub fn new(forecast: &ForecastConfig, classifier: &ClassifierConfig) -> Self {
        Self {
            rules: forecast.activity.clone(),
            high_confidence: forecast.high_confidence.clone(),
            moderate_confidence: forecast.moderate_confidence.clone(),
            classifier: EventClassifier::new(classifier.clone()),
        }
    }

    pub fn from_config(config: &SnowlagConfig) -> Self {
        Self::new(&config.forecast, &config.classifier)
    }

    /// Scores days `1..=horizon_days` after `recent.today()`.
    ///
    /// An empty ensemble is refused with `EmptyEnsemble`; it never yields a
    /// zero-probability forecast.
    pub fn score(
        &self,
        ensemble: &Ensemble,
        recent: &RecentObservations,
        horizon_days: u32,
    ) -> Result<Vec<ForecastDay>, SnowlagError> {
        if ensemble.is_empty() {
            return Err(SnowlagError::EmptyEnsemble { target_id: ensemble.target_id.clone() });
        }
        let mut rules = Vec::with_capacity(ensemble.weights.len());
        for w in &ensemble.weights {
            let rule = self.rules.get(&w.quantity).copied().ok_or_else(|| {
                SnowlagError::Configuration(format!("no activity threshold configured for {}", w.quantity))
            })?;
            rules.push(rule);
        }

        Ok((1..=horizon_days)
            .map(|lead| self.score_day(ensemble, &rules, recent, lead))
            .collect())
    }

    fn score_day(
        &self,
        ensemble: &Ensemble,
        rules: &[ActivityRule],
        recent: &RecentObservations,
        lead: u32,
    ) -> ForecastDay {
        let date = recent.today() + Duration::days(i64::from(lead));
        let mut total = 0.0;
        let mut confirming: Vec<&PredictorWeight> = Vec::new();
        let mut contributions = Vec::with_capacity(ensemble.weights.len());

        for (w, rule) in ensemble.weights.iter().zip(rules) {
            let observed_on = date - Duration::days(i64::from(w.lag_days));
            let value = recent.value(&w.predictor_id, w.quantity, observed_on);
            let (activity, state) = predictor_signal(value, rule);
            let contribution = w.normalized_weight * activity * w.direction();
            total += contribution;
            if state == PredictorState::Active && contribution > 0.0 {
                confirming.push(w);
            }
            contributions.push(PredictorContribution {
                predictor_id: w.predictor_id.clone(),
                lag_days: w.lag_days,
                observed_on,
                observed_value: value,
                contribution,
                state,
                mechanism_tag: w.mechanism_tag,
            });
        }

        if contributions.iter().all(|c| c.state == PredictorState::Inactive) {
            return ForecastDay {
                date,
                lead_days: lead,
                probability: 0.0,
                magnitude_range: NO_MAGNITUDE,
                confidence_tier: ConfidenceTier::Low,
                mechanism_label: Mechanism::Quiet,
                signal: SignalStatus::InsufficientSignal,
                contributing_predictors: contributions,
            };
        }

        let clamped = total.clamp(0.0, 1.0);
        let probability = clamped * 100.0;
        ForecastDay {
            date,
            lead_days: lead,
            probability,
            magnitude_range: ensemble.climatology.lookup(clamped).unwrap_or(NO_MAGNITUDE),
            confidence_tier: self.confidence_tier(probability, confirming.len()),
            mechanism_label: self.classifier.classify(&confirming),
            signal: SignalStatus::Sufficient,
            contributing_predictors: contributions,
        }
    }

    /// HIGH if any high step is met, else MODERATE if any moderate step
    /// is met, else LOW. `active` counts predictors pushing toward snow.
    pub fn confidence_tier(&self, probability: f64, active: usize) -> ConfidenceTier {
        let met = |steps: &[ConfidenceStep]| {
            steps
                .iter()
                .any(|s| probability >= s.min_probability && active >= s.min_active)
        };
        if met(&self.high_confidence) {
            ConfidenceTier::High
        } else if met(&self.moderate_confidence) {
            ConfidenceTier::Moderate
        } else {
            ConfidenceTier::Low
        }
    }
}
