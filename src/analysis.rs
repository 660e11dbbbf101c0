//! Reading-strategy analyzer
//!
//! Pure threshold classification over computed metrics, plus a pluggable
//! narrative stage. The classification is deterministic and testable; prose
//! generation sits behind [`NarrativeGenerator`] so a richer generative
//! backend can be swapped in without touching the thresholds.

use crate::types::{ReadingStrategy, StrategyAnalysis, VisionMetrics};

/// Overall-score cutoffs for the strategy label
pub const ADVANCED_SCORE: f64 = 85.0;
pub const FLUENT_SCORE: f64 = 70.0;
pub const DEVELOPING_SCORE: f64 = 50.0;

/// Fixed analyzer confidence; thresholds are deterministic and the margin
/// accounts only for upstream gaze-classification noise
pub const ANALYSIS_CONFIDENCE: f64 = 0.85;

/// Produces the narrative sentence for an analysis.
/// Implementations may call out to a generative backend; the default is a
/// grade-aware template lookup.
pub trait NarrativeGenerator {
    fn narrate(
        &self,
        metrics: &VisionMetrics,
        strategy: ReadingStrategy,
        grade: u8,
        comprehension_accuracy: Option<f64>,
    ) -> String;
}

/// Template-based narrative, selected by strategy label and grade band
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateNarrativeGenerator;

impl NarrativeGenerator for TemplateNarrativeGenerator {
    fn narrate(
        &self,
        metrics: &VisionMetrics,
        strategy: ReadingStrategy,
        grade: u8,
        comprehension_accuracy: Option<f64>,
    ) -> String {
        let audience = if grade <= 3 { "young reader" } else { "reader" };
        let pace = metrics.words_per_minute.round() as i64;
        let base = match strategy {
            ReadingStrategy::Advanced => format!(
                "This {audience} moves through text smoothly at about {pace} words per minute, \
                 with efficient eye movements well above grade expectations."
            ),
            ReadingStrategy::Fluent => format!(
                "This {audience} reads fluently at about {pace} words per minute, \
                 with a steady and well-controlled gaze pattern."
            ),
            ReadingStrategy::Developing => format!(
                "This {audience} is building fluency, currently around {pace} words per minute, \
                 and will benefit from regular guided reading practice."
            ),
            ReadingStrategy::Struggling => format!(
                "This {audience} works hard at about {pace} words per minute and frequently \
                 revisits text, suggesting targeted decoding support would help."
            ),
        };
        match comprehension_accuracy {
            Some(accuracy) => format!(
                "{base} Comprehension accuracy was {:.0}%.",
                accuracy.clamp(0.0, 100.0)
            ),
            None => base,
        }
    }
}

/// Map the overall score to a strategy label
pub fn classify_strategy(overall_score: f64) -> ReadingStrategy {
    if overall_score >= ADVANCED_SCORE {
        ReadingStrategy::Advanced
    } else if overall_score >= FLUENT_SCORE {
        ReadingStrategy::Fluent
    } else if overall_score >= DEVELOPING_SCORE {
        ReadingStrategy::Developing
    } else {
        ReadingStrategy::Struggling
    }
}

/// Independent per-metric strength tags; not ranked, not exclusive
pub fn identify_strengths(m: &VisionMetrics) -> Vec<String> {
    let mut strengths = Vec::new();
    if m.words_per_minute > 120.0 {
        strengths.push("reads at an above-average pace".to_string());
    }
    if m.regression_rate < 10.0 {
        strengths.push("rarely needs to re-read text".to_string());
    }
    if m.scan_path_efficiency > 0.7 {
        strengths.push("moves through text with efficient eye paths".to_string());
    }
    if m.rhythm_regularity > 0.7 {
        strengths.push("maintains a steady reading rhythm".to_string());
    }
    strengths
}

/// Symmetric low-side weakness tags
pub fn identify_weaknesses(m: &VisionMetrics) -> Vec<String> {
    let mut weaknesses = Vec::new();
    if m.words_per_minute < 80.0 {
        weaknesses.push("reading pace is below grade expectations".to_string());
    }
    if m.regression_rate > 20.0 {
        weaknesses.push("frequently jumps back to re-read text".to_string());
    }
    if m.fixations_per_word > 1.5 {
        weaknesses.push("needs multiple looks per word".to_string());
    }
    if m.vocabulary_gap_score > 50.0 {
        weaknesses.push("dwells long on individual words, suggesting vocabulary gaps".to_string());
    }
    weaknesses
}

/// One actionable recommendation per detected weakness, plus a maintenance
/// suggestion when nothing is flagged
pub fn build_recommendations(weaknesses: &[String], strategy: ReadingStrategy) -> Vec<String> {
    if weaknesses.is_empty() {
        return match strategy {
            ReadingStrategy::Advanced => {
                vec!["Introduce more challenging texts to keep growth going.".to_string()]
            }
            _ => vec!["Continue regular reading practice at the current level.".to_string()],
        };
    }
    weaknesses
        .iter()
        .map(|w| {
            if w.contains("pace") {
                "Practice timed re-reading of familiar passages to build speed.".to_string()
            } else if w.contains("re-read") {
                "Use a finger or marker to track lines and reduce back-tracking.".to_string()
            } else if w.contains("multiple looks") {
                "Work on sight-word recognition to reduce per-word effort.".to_string()
            } else {
                "Pre-teach key vocabulary before reading new passages.".to_string()
            }
        })
        .collect()
}

/// Full analysis pass: classify, tag, recommend, narrate
pub fn analyze_reading_strategy(
    metrics: &VisionMetrics,
    grade: u8,
    comprehension_accuracy: Option<f64>,
    narrator: &dyn NarrativeGenerator,
) -> StrategyAnalysis {
    let strategy = classify_strategy(metrics.overall_score);
    let strengths = identify_strengths(metrics);
    let weaknesses = identify_weaknesses(metrics);
    let recommendations = build_recommendations(&weaknesses, strategy);
    let narrative = narrator.narrate(metrics, strategy, grade, comprehension_accuracy);
    log::debug!(
        "classified session {} as {}",
        metrics.vision_session_id,
        strategy.as_str()
    );
    StrategyAnalysis {
        reading_strategy: strategy,
        strengths,
        weaknesses,
        recommendations,
        narrative,
        confidence_score: ANALYSIS_CONFIDENCE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DetailedAnalysis;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn make_test_metrics(overall_score: f64) -> VisionMetrics {
        VisionMetrics {
            vision_session_id: "vs-1".into(),
            average_saccade_amplitude: 90.0,
            saccade_variability: 20.0,
            average_saccade_velocity: 1500.0,
            optimal_landing_rate: 60.0,
            return_sweep_accuracy: 80.0,
            scan_path_efficiency: 0.5,
            average_fixation_duration: 220.0,
            fixations_per_word: 1.1,
            regression_rate: 15.0,
            vocabulary_gap_score: 30.0,
            words_per_minute: 100.0,
            rhythm_regularity: 0.6,
            stamina_score: 85.0,
            gaze_comprehension_correlation: 0.2,
            cognitive_load_index: 40.0,
            overall_score,
            detailed_analysis: DetailedAnalysis::default(),
            comparison_with_peers: None,
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn test_strategy_thresholds() {
        assert_eq!(classify_strategy(92.0), ReadingStrategy::Advanced);
        assert_eq!(classify_strategy(85.0), ReadingStrategy::Advanced);
        assert_eq!(classify_strategy(84.9), ReadingStrategy::Fluent);
        assert_eq!(classify_strategy(70.0), ReadingStrategy::Fluent);
        assert_eq!(classify_strategy(69.9), ReadingStrategy::Developing);
        assert_eq!(classify_strategy(50.0), ReadingStrategy::Developing);
        assert_eq!(classify_strategy(49.9), ReadingStrategy::Struggling);
        assert_eq!(classify_strategy(0.0), ReadingStrategy::Struggling);
    }

    #[test]
    fn test_strengths_are_independent() {
        let mut m = make_test_metrics(75.0);
        m.words_per_minute = 130.0;
        m.regression_rate = 5.0;
        m.scan_path_efficiency = 0.8;
        m.rhythm_regularity = 0.9;
        assert_eq!(identify_strengths(&m).len(), 4);

        m.rhythm_regularity = 0.5;
        assert_eq!(identify_strengths(&m).len(), 3);
    }

    #[test]
    fn test_weaknesses_are_independent() {
        let mut m = make_test_metrics(40.0);
        m.words_per_minute = 60.0;
        m.regression_rate = 30.0;
        m.fixations_per_word = 2.0;
        m.vocabulary_gap_score = 70.0;
        assert_eq!(identify_weaknesses(&m).len(), 4);
    }

    #[test]
    fn test_middle_metrics_tag_nothing() {
        // values between the strength and weakness thresholds
        let m = make_test_metrics(75.0);
        assert!(identify_strengths(&m).is_empty());
        assert!(identify_weaknesses(&m).is_empty());
    }

    #[test]
    fn test_recommendation_per_weakness() {
        let mut m = make_test_metrics(40.0);
        m.words_per_minute = 60.0;
        m.fixations_per_word = 2.0;
        let weaknesses = identify_weaknesses(&m);
        let recommendations = build_recommendations(&weaknesses, ReadingStrategy::Struggling);
        assert_eq!(recommendations.len(), weaknesses.len());
    }

    #[test]
    fn test_no_weakness_keeps_one_recommendation() {
        let recs = build_recommendations(&[], ReadingStrategy::Advanced);
        assert_eq!(recs.len(), 1);
    }

    #[test]
    fn test_full_analysis() {
        let m = make_test_metrics(88.0);
        let analysis =
            analyze_reading_strategy(&m, 3, Some(90.0), &TemplateNarrativeGenerator);

        assert_eq!(analysis.reading_strategy, ReadingStrategy::Advanced);
        assert_eq!(analysis.confidence_score, 0.85);
        assert!(analysis.narrative.contains("young reader"));
        assert!(analysis.narrative.contains("90%"));
        assert!(!analysis.recommendations.is_empty());
    }

    #[test]
    fn test_narrative_varies_by_grade_band() {
        let m = make_test_metrics(75.0);
        let gen = TemplateNarrativeGenerator;
        let young = gen.narrate(&m, ReadingStrategy::Fluent, 2, None);
        let older = gen.narrate(&m, ReadingStrategy::Fluent, 6, None);
        assert!(young.contains("young reader"));
        assert!(!older.contains("young reader"));
    }

    #[test]
    fn test_custom_narrator_is_used() {
        struct FixedNarrator;
        impl NarrativeGenerator for FixedNarrator {
            fn narrate(
                &self,
                _metrics: &VisionMetrics,
                _strategy: ReadingStrategy,
                _grade: u8,
                _accuracy: Option<f64>,
            ) -> String {
                "external narrative".to_string()
            }
        }
        let m = make_test_metrics(60.0);
        let analysis = analyze_reading_strategy(&m, 4, None, &FixedNarrator);
        assert_eq!(analysis.narrative, "external narrative");
    }
}
