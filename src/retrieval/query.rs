//! Constrained LLM calls used by the retrieval pipeline: query rewrite and
//! per-result relevance judging.

use chrono::Datelike;

use crate::inference::{GenerationService, SamplingOptions};

use super::search::SearchResult;

/// Rewrite chat phrasing into a short keyword query.
///
/// One low-temperature call with a fixed few-shot example, a stop-sequence
/// fence to force a single line, and a 15-token budget. Any failure returns
/// the input unchanged — the raw text is always an acceptable query.
pub async fn rewrite_query(
    service: &dyn GenerationService,
    model: &str,
    user_text: &str,
) -> String {
    let year = chrono::Utc::now().year();
    let prompt = format!(
        "Instruction: Generate 3-5 keywords for a web search.\n\
         Reference Year: {year}\n\n\
         Input: Who is the CEO of Apple?\n\
         Output: Apple CEO {year}\n\n\
         Input: {user_text}\n\
         Output:"
    );

    let options = SamplingOptions {
        temperature: Some(0.0),
        stop: Some(vec!["\n".to_string(), "Input:".to_string()]),
        num_predict: Some(15),
        ..Default::default()
    };

    match service.generate(model, &prompt, Some(options)).await {
        Ok(text) => {
            let rewritten = text
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .trim()
                .to_string();
            if rewritten.is_empty() {
                user_text.to_string()
            } else {
                tracing::info!(original = %user_text, rewritten = %rewritten, "query rewritten");
                rewritten
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "query rewrite failed — using raw text");
            user_text.to_string()
        }
    }
}

/// Keep only results the model judges relevant to the user's question.
///
/// Two or fewer results pass through unfiltered. Each judgment is a binary
/// YES/NO call with a 2-token budget; a failed call keeps the result
/// (permissive on error).
pub async fn filter_relevant(
    service: &dyn GenerationService,
    model: &str,
    user_text: &str,
    results: Vec<SearchResult>,
) -> Vec<SearchResult> {
    if results.len() <= 2 {
        return results;
    }

    let options = SamplingOptions {
        temperature: Some(0.0),
        stop: Some(vec!["\n".to_string()]),
        num_predict: Some(2),
        ..Default::default()
    };

    let mut kept = Vec::new();
    for item in results {
        let prompt = format!(
            "Instruction: Answer YES or NO if the result is relevant.\n\
             Query: {user_text}\n\
             Result: {} - {}\n\
             Relevant:",
            item.title, item.snippet
        );

        match service.generate(model, &prompt, Some(options.clone())).await {
            Ok(answer) => {
                if answer.trim().to_uppercase().contains("YES") {
                    kept.push(item);
                }
            }
            Err(e) => {
                tracing::warn!(url = %item.url, error = %e, "relevance judgment failed — keeping result");
                kept.push(item);
            }
        }
    }

    kept
}

// ─── Tests ──────────────────────────────────────────────────────────────────
