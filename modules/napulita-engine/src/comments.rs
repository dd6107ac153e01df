use tracing::info;

use napulita_common::{
    normalize_text, Actor, Comment, CommentId, NapulitaError, ReportId, Result, MAX_COMMENT_CHARS,
};
use napulita_store::NewComment;

use crate::lifecycle::LifecycleEngine;

impl LifecycleEngine {
    /// Any user may comment on any existing report, whatever its status.
    /// A reply's parent must belong to the same report.
    pub async fn post_comment(
        &self,
        actor: &Actor,
        report_id: ReportId,
        body: &str,
        parent_id: Option<CommentId>,
    ) -> Result<CommentId> {
        let body = normalize_text(body, MAX_COMMENT_CHARS, "comment")?
            .ok_or_else(|| NapulitaError::invalid("comment body is empty"))?;
        self.get_report(report_id).await?;

        if let Some(parent_id) = parent_id {
            let parent = self.store().get_comment(parent_id).await?;
            if parent.map(|p| p.report_id) != Some(report_id) {
                return Err(NapulitaError::invalid(format!(
                    "comment {} is not on report {report_id}",
                    parent_id.0
                )));
            }
        }

        let comment = self
            .store()
            .insert_comment(NewComment {
                report_id,
                author_id: actor.user_id,
                body,
                parent_id,
                created_at: self.clock().now(),
            })
            .await?;

        info!(
            report_id = %report_id,
            comment_id = comment.id.0,
            author_id = %actor.user_id,
            reply = parent_id.is_some(),
            "Comment posted"
        );
        Ok(comment.id)
    }

    /// Oldest first.
    pub async fn list_comments(&self, report_id: ReportId) -> Result<Vec<Comment>> {
        self.get_report(report_id).await?;
        self.store().list_comments(report_id).await
    }
}
