//! Moderation: reports, block checks and admin statistics

use convo_storage_traits::ConvoStorageProvider;

use crate::api::{
    AdminStats, BlockRelationship, Report, ReportAction, ReportMemberOutput, ReportMemberRequest,
    ReportStatus, ResolveReportRequest,
};
use crate::util::{self, call_with_retries, idempotency_key};
use crate::{ConversationError, ConversationManager, Error};

impl<Storage> ConversationManager<Storage>
where
    Storage: ConvoStorageProvider,
{
    /// Report a member to the conversation's admins.
    ///
    /// Reporting yourself fails with `InvalidTarget` before anything is sent.
    /// Returns the server-assigned report ID.
    pub async fn report_member(
        &self,
        convo_id: &str,
        member_did: &str,
        reason: &str,
        details: Option<String>,
    ) -> Result<String, Error> {
        if member_did == self.own_did {
            return Err(ConversationError::InvalidTarget("cannot report yourself".to_string()).into());
        }
        util::validate_did(member_did)?;
        self.load_conversation(convo_id)?;

        let request = ReportMemberRequest {
            convo_id: convo_id.to_string(),
            member_did: member_did.to_string(),
            reason: reason.to_string(),
            details,
            idempotency_key: idempotency_key(),
        };
        let output: ReportMemberOutput =
            call_with_retries(&self.config.remote, "report_member", || {
                self.api.report_member(request.clone())
            })
            .await?;

        tracing::info!(convo_id, member_did, report_id = %output.report_id, "Member reported");
        Ok(output.report_id)
    }

    /// Reports of a conversation in the given state. Admin only.
    pub async fn get_reports(
        &self,
        convo_id: &str,
        status: ReportStatus,
    ) -> Result<Vec<Report>, Error> {
        self.load_conversation(convo_id)?;
        self.require_admin(convo_id)?;

        Ok(call_with_retries(&self.config.remote, "get_reports", || {
            self.api.get_reports(convo_id, status)
        })
        .await?)
    }

    /// Resolve a report. Admin only; a resolved report stays resolved.
    pub async fn resolve_report(
        &self,
        convo_id: &str,
        report_id: &str,
        action: ReportAction,
        notes: Option<String>,
    ) -> Result<Report, Error> {
        self.load_conversation(convo_id)?;
        self.require_admin(convo_id)?;

        let already_resolved = self
            .resolved_reports
            .lock()
            .get(convo_id)
            .is_some_and(|reports| reports.contains(report_id));
        if already_resolved {
            return Err(ConversationError::Conflict(format!(
                "report {report_id} is already resolved"
            ))
            .into());
        }

        let request = ResolveReportRequest {
            convo_id: convo_id.to_string(),
            report_id: report_id.to_string(),
            action,
            notes,
            idempotency_key: idempotency_key(),
        };
        let report: Report = call_with_retries(&self.config.remote, "resolve_report", || {
            self.api.resolve_report(request.clone())
        })
        .await?;

        self.resolved_reports
            .lock()
            .entry(convo_id.to_string())
            .or_default()
            .insert(report_id.to_string());
        tracing::info!(convo_id, report_id, action = ?action, "Report resolved");
        Ok(report)
    }

    /// Block relationships among `dids`.
    ///
    /// Informational: acting on the result is up to the caller, except in
    /// [`ConversationManager::add_member`], which refuses blocked additions.
    pub async fn check_blocks(&self, dids: &[String]) -> Result<Vec<BlockRelationship>, Error> {
        for did in dids {
            util::validate_did(did)?;
        }

        Ok(call_with_retries(&self.config.remote, "check_blocks", || {
            self.api.check_blocks(dids)
        })
        .await?)
    }

    /// Moderation counters of a conversation. Admin only, read only.
    pub async fn get_admin_stats(&self, convo_id: &str) -> Result<AdminStats, Error> {
        self.load_conversation(convo_id)?;
        self.require_admin(convo_id)?;

        Ok(call_with_retries(&self.config.remote, "get_admin_stats", || {
            self.api.get_admin_stats(convo_id)
        })
        .await?)
    }
}
