//! Post moderation.

use tracing::{info, warn};

use emploi_models::{
    ModerationStatus, NotificationKind, NotificationMessage, NotificationRequest, PublicationId,
};

use crate::error::WorkerResult;
use crate::metrics;
use crate::processor::ProcessingContext;

/// Check a publication and flag it when the detector objects.
///
/// A flagged post stays visible with its reason; the author is told. Posts
/// already hidden by a moderator are left alone.
pub async fn moderate_publication(ctx: &ProcessingContext, id: PublicationId) -> WorkerResult<()> {
    let publication = ctx.store.publication(id).await?;

    if publication.moderation_status == ModerationStatus::Hidden {
        info!(publication_id = id, "Publication already hidden, skipping");
        return Ok(());
    }

    let mut text = publication.content.clone();
    if !publication.hashtags.is_empty() {
        text.push('\n');
        text.push_str(&publication.hashtags.join(" "));
    }

    let detection = ctx.detector.check(&text)?;
    let Some(reason) = detection.reason() else {
        info!(publication_id = id, "Publication passed moderation");
        return Ok(());
    };

    if publication.moderation_status == ModerationStatus::Flagged
        && publication.moderation_reason.as_deref() == Some(reason.as_str())
    {
        return Ok(());
    }

    ctx.store
        .set_moderation(id, ModerationStatus::Flagged, Some(&reason))
        .await?;
    metrics::record_post_flagged();
    info!(publication_id = id, reason = %reason, "Publication flagged");

    let message = NotificationMessage::new(
        NotificationKind::Moderation,
        "Publication signalée",
        "Une de vos publications a été signalée et sera revue par la modération.",
    )
    .with_link(format!("/publications/{}", id));

    // The flag is stored; a lost notification must not re-run moderation
    if let Err(e) = ctx
        .notifier
        .send(NotificationRequest::new(publication.author_id(), message))
        .await
    {
        warn!(publication_id = id, "Failed to queue author notification: {}", e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::testing::{harness, FakeProvider};
    use chrono::Utc;
    use emploi_models::{AuthorProfile, Publication};
    use emploi_store::WorkStore;

    #[tokio::test]
    async fn test_flagged_post_notifies_author() {
        let h = harness(FakeProvider::default());
        h.store
            .insert_publication(Publication::new(7, AuthorProfile::new(3), "Quelle arnaque !", Utc::now()))
            .await;

        moderate_publication(&h.ctx, 7).await.unwrap();

        let stored = h.store.publication(7).await.unwrap();
        assert_eq!(stored.moderation_status, ModerationStatus::Flagged);
        assert!(stored.moderation_reason.unwrap().contains("arnaque"));

        let batches = h.flush().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].recipients, vec![3]);
        assert_eq!(batches[0].message.kind, NotificationKind::Moderation);
    }

    #[tokio::test]
    async fn test_clean_post_is_untouched() {
        let h = harness(FakeProvider::default());
        h.store
            .insert_publication(Publication::new(8, AuthorProfile::new(3), "Bonne journée à tous", Utc::now()))
            .await;

        moderate_publication(&h.ctx, 8).await.unwrap();

        let stored = h.store.publication(8).await.unwrap();
        assert_eq!(stored.moderation_status, ModerationStatus::Approved);
        assert!(h.flush().await.is_empty());
    }

    #[tokio::test]
    async fn test_hidden_post_is_skipped() {
        let h = harness(FakeProvider::default());
        h.store
            .insert_publication(Publication::new(9, AuthorProfile::new(3), "arnaque", Utc::now()))
            .await;
        h.store
            .set_moderation(9, ModerationStatus::Hidden, Some("removed by moderator"))
            .await
            .unwrap();

        moderate_publication(&h.ctx, 9).await.unwrap();

        let stored = h.store.publication(9).await.unwrap();
        assert_eq!(stored.moderation_status, ModerationStatus::Hidden);
        assert_eq!(stored.moderation_reason.as_deref(), Some("removed by moderator"));
    }
}
