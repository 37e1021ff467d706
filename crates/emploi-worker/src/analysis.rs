//! Job posting analysis: skill extraction and a content check.

use std::collections::{BTreeSet, HashSet};

use chrono::Utc;
use tracing::{debug, info};
use unicode_segmentation::UnicodeSegmentation;

use emploi_models::JobPostingAnalysis;

use crate::error::WorkerResult;
use crate::processor::ProcessingContext;

/// Finds known skill keywords in free text.
///
/// Single words match whole words; multi-word skills match as a phrase.
#[derive(Debug, Clone, Default)]
pub struct SkillExtractor {
    words: HashSet<String>,
    phrases: Vec<String>,
}

fn normalize(text: &str) -> Vec<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

impl SkillExtractor {
    pub fn new(skills: &[String]) -> Self {
        let mut words = HashSet::new();
        let mut phrases = Vec::new();
        for skill in skills {
            let parts = normalize(skill);
            match parts.len() {
                0 => {}
                1 => {
                    words.extend(parts);
                }
                _ => phrases.push(parts.join(" ")),
            }
        }
        Self { words, phrases }
    }

    /// Skills found in `text`, sorted and unique.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let tokens = normalize(text);
        let mut found: BTreeSet<String> = tokens
            .iter()
            .filter(|t| self.words.contains(t.as_str()))
            .cloned()
            .collect();

        let padded = format!(" {} ", tokens.join(" "));
        for phrase in &self.phrases {
            if padded.contains(&format!(" {} ", phrase)) {
                found.insert(phrase.clone());
            }
        }
        found.into_iter().collect()
    }
}

pub async fn analyze_job_posting(ctx: &ProcessingContext, job_posting_id: i64) -> WorkerResult<()> {
    let posting = ctx.store.job_posting(job_posting_id).await?;
    if !posting.active {
        info!(job_posting_id, "Job posting is no longer active, skipping analysis");
        return Ok(());
    }

    let text = format!("{}\n{}", posting.title, posting.description);
    let skills = ctx.skills.extract(&text);
    let detection = ctx.detector.check(&text)?;

    let analysis = JobPostingAnalysis {
        job_posting_id,
        skills,
        flagged: detection.is_flagged(),
        reason: detection.reason(),
        analyzed_at: Utc::now(),
    };
    ctx.store.save_job_analysis(&analysis).await?;

    debug!(
        job_posting_id,
        skills = analysis.skills.len(),
        flagged = analysis.flagged,
        "Saved job posting analysis"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;
    use crate::processor::testing::{harness, FakeProvider};
    use emploi_models::JobPosting;

    fn posting(id: i64, description: &str) -> JobPosting {
        JobPosting {
            id,
            title: "Développeur Rust".to_string(),
            description: description.to_string(),
            company: "Emploi+".to_string(),
            active: true,
        }
    }

    #[test]
    fn test_skill_extraction() {
        let extractor = SkillExtractor::new(&[
            "rust".to_string(),
            "SQL".to_string(),
            "gestion de projet".to_string(),
            "java".to_string(),
        ]);

        let skills = extractor.extract("Rust, PostgreSQL/SQL et Gestion  de projet. JavaScript apprécié");
        assert_eq!(skills, vec!["gestion de projet", "rust", "sql"]);
    }

    #[tokio::test]
    async fn test_analysis_is_saved() {
        let h = harness(FakeProvider::default());
        h.store
            .insert_job_posting(posting(42, "Nous cherchons Rust et Docker, anglais courant"))
            .await;

        analyze_job_posting(&h.ctx, 42).await.unwrap();

        let analysis = h.store.job_analysis(42).await.unwrap();
        assert_eq!(analysis.skills, vec!["anglais", "docker", "rust"]);
        assert!(!analysis.flagged);
    }

    #[tokio::test]
    async fn test_suspicious_posting_is_flagged() {
        let h = harness(FakeProvider::default());
        h.store
            .insert_job_posting(posting(7, "Aucune arnaque, payez 100€ pour postuler"))
            .await;

        analyze_job_posting(&h.ctx, 7).await.unwrap();

        let analysis = h.store.job_analysis(7).await.unwrap();
        assert!(analysis.flagged);
        assert!(analysis.reason.unwrap().contains("arnaque"));
    }

    #[tokio::test]
    async fn test_missing_posting_is_permanent() {
        let h = harness(FakeProvider::default());
        let err = analyze_job_posting(&h.ctx, 404).await.unwrap_err();
        assert!(matches!(err, WorkerError::Store(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_store_outage_is_retried() {
        let h = harness(FakeProvider::default());
        h.store.set_unavailable(true);
        let err = analyze_job_posting(&h.ctx, 42).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
