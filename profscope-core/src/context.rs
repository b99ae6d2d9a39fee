//! Evidence assembly and the text templates built on it.

use crate::types::{PredictionSet, RetrievedReview};
use std::fmt::Write;

/// Reply used when no retrieval tier found anything.
pub const NO_RESULTS_REPLY: &str = "Sorry, I couldn't find any relevant reviews.";

/// Render the evidence block: numbered reviews, then predictions if any.
pub fn assemble(reviews: &[RetrievedReview], predictions: &PredictionSet) -> String {
    let mut context = reviews
        .iter()
        .map(|r| {
            format!(
                "{}. **Professor Name:** {}\n    - **Department:** {}\n    - **Rating:** {}\n    - **Review:** {}",
                r.rank,
                r.record.professor,
                r.record.subject,
                r.record.stars_display(),
                r.record.review
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    if !predictions.is_empty() {
        context.push_str("\n\n**AI-Generated Insights:**\n");
        for (name, p) in predictions.iter() {
            let _ = write!(
                context,
                "\n**{name} - AI Analysis:**\n- Predicted Rating: {:.1}/5\n- Predicted Difficulty: {:.1}/5\n- Confidence: {:.0}%\n- Key Insights: {}\n",
                p.avg_rating,
                p.avg_difficulty,
                p.confidence * 100.0,
                p.insights.join("; ")
            );
        }
    }
    context
}

/// Prompt sent to the generative service.
pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "You are Rate My Professor AI, an assistant that recommends professors based on real student reviews and AI-powered analysis.\n\n\
         Query: {query}\n\n\
         You have access to both student reviews and AI-generated insights (when available). Use both sources to provide comprehensive recommendations.\n\n\
         Please return well-formatted Markdown using the following structure:\n\n\
         # Recommendation\n\
         - **Top pick(s)**: Name(s) – one sentence justification combining review sentiment and AI analysis.\n\n\
         ## Analysis\n\
         - Key strengths from reviews\n\
         - AI insights (if available) about predicted performance\n\
         - Any caveats or considerations\n\n\
         ## Additional Info\n\
         - Difficulty expectations\n\
         - Subject alternatives if relevant\n\
         - Confidence level in recommendations\n\n\
         Use the following data as evidence:\n{context}"
    )
}

/// Why a templated answer was returned instead of a generated one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// No generative credential; names the variable that would enable it.
    Disabled { key_env: String },
    /// The generative service failed or kept failing.
    ServiceIssue,
}

/// Deterministic answer that echoes the query and the evidence block.
pub fn fallback_answer(query: &str, context: &str, reason: &FallbackReason) -> String {
    let note = match reason {
        FallbackReason::Disabled { key_env } => format!(
            "(Note: AI summarization is disabled. Set {key_env} to enable AI-generated summaries.)"
        ),
        FallbackReason::ServiceIssue => {
            "(Note: Temporary AI service issue. Returning results directly from reviews.)".to_string()
        }
    };
    format!("Based on your query: \"{query}\", here are some relevant professors:\n\n{context}\n\n{note}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PredictionResult, ReviewRecord};
    use pretty_assertions::assert_eq;

    fn reviews() -> Vec<RetrievedReview> {
        RetrievedReview::ranked(vec![
            ReviewRecord::new("A. Smith", "Algorithms", 5.0, "Great explanations"),
            ReviewRecord::new("B. Jones", "Biology", 3.5, "Tough exams"),
        ])
    }

    #[test]
    fn test_assemble_reviews_only() {
        let expected = "1. **Professor Name:** A. Smith\n    - **Department:** Algorithms\n    - **Rating:** 5\n    - **Review:** Great explanations\n\n\
                        2. **Professor Name:** B. Jones\n    - **Department:** Biology\n    - **Rating:** 3.5\n    - **Review:** Tough exams";
        assert_eq!(assemble(&reviews(), &PredictionSet::new()), expected);
    }

    #[test]
    fn test_assemble_with_predictions() {
        let mut predictions = PredictionSet::new();
        predictions.insert(
            "A. Smith",
            PredictionResult {
                avg_rating: 4.26,
                avg_difficulty: 2.94,
                confidence: 0.816,
                rating_consistency: 0.3,
                insights: vec!["Clear".into(), "Engaging".into()],
                individual_predictions: None,
            },
        );
        let context = assemble(&reviews()[..1], &predictions);
        let expected = "1. **Professor Name:** A. Smith\n    - **Department:** Algorithms\n    - **Rating:** 5\n    - **Review:** Great explanations\n\n\
                        **AI-Generated Insights:**\n\n\
                        **A. Smith - AI Analysis:**\n- Predicted Rating: 4.3/5\n- Predicted Difficulty: 2.9/5\n- Confidence: 82%\n- Key Insights: Clear; Engaging\n";
        assert_eq!(context, expected);
    }

    #[test]
    fn test_prompt_embeds_query_and_evidence() {
        let prompt = build_prompt("best algorithms prof?", "EVIDENCE");
        assert!(prompt.starts_with("You are Rate My Professor AI"));
        assert!(prompt.contains("Query: best algorithms prof?\n\n"));
        assert!(prompt.contains("# Recommendation\n"));
        assert!(prompt.ends_with("Use the following data as evidence:\nEVIDENCE"));
    }

    #[test]
    fn test_fallback_bodies_differ_only_in_note() {
        let disabled = fallback_answer(
            "q",
            "ctx",
            &FallbackReason::Disabled {
                key_env: "GEMINI_API_KEY".into(),
            },
        );
        let degraded = fallback_answer("q", "ctx", &FallbackReason::ServiceIssue);
        let prefix = "Based on your query: \"q\", here are some relevant professors:\n\nctx\n\n";
        assert_eq!(
            disabled,
            format!("{prefix}(Note: AI summarization is disabled. Set GEMINI_API_KEY to enable AI-generated summaries.)")
        );
        assert_eq!(
            degraded,
            format!("{prefix}(Note: Temporary AI service issue. Returning results directly from reviews.)")
        );
    }
}
