/// Statistical analysis of predictor/target snowfall relationships.
///
/// Everything here is a pure function over explicitly passed series; the
/// only I/O is the provider fetch at the top of `ranking::PredictorRanker::rank`.
///
/// Submodules:
/// - `lag`: best-lag Pearson correlation over a lag window.
/// - `significance`: two-tailed t-test for a Pearson coefficient.
/// - `ranking`: runs both over every candidate and orders the survivors.

pub mod lag;
pub mod ranking;
pub mod significance;

pub use lag::{LagCorrelation, LagCorrelationAnalyzer, LagPoint};
pub use ranking::{CandidateOutcome, ExcludedCandidate, ExclusionReason, PredictorRanker, RankingReport};
pub use significance::{Significance, SignificanceTester};
