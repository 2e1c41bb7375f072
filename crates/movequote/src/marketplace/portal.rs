use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::{
    AssignmentId, AssignmentStatus, CompanyId, Lead, LeadAssignment, LeadContactDetails,
};
use super::repository::{AssignmentRepository, LeadRepository, RepositoryError};

/// One row of the partner lead inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboxItem {
    pub assignment: LeadAssignment,
    pub lead: Lead,
    /// Present only while the assignment grants contact details.
    pub contact: Option<LeadContactDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub status: AssignmentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortalError {
    #[error("assignment not found")]
    AssignmentNotFound,
    #[error("assignment belongs to another company")]
    NotAssignedToCompany,
    #[error("reveal the lead before updating its progress")]
    NotRevealed,
    #[error("status '{0}' cannot be set by a partner")]
    InvalidStatus(&'static str),
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

pub struct PortalService {
    assignments: Arc<dyn AssignmentRepository>,
    leads: Arc<dyn LeadRepository>,
}

impl PortalService {
    pub fn new(assignments: Arc<dyn AssignmentRepository>, leads: Arc<dyn LeadRepository>) -> Self {
        Self { assignments, leads }
    }

    /// Newest assignments first.
    pub fn inbox(&self, company: &CompanyId) -> Result<Vec<InboxItem>, PortalError> {
        let mut items = Vec::new();
        for assignment in self.assignments.for_company(company)? {
            let Some(lead) = self.leads.fetch(&assignment.lead_id)? else {
                continue;
            };
            let contact = if assignment.grants_contact_details() {
                self.leads.contact_details(&assignment.lead_id)?
            } else {
                None
            };
            items.push(InboxItem {
                assignment,
                lead,
                contact,
            });
        }
        Ok(items)
    }

    /// Moves a revealed assignment through contacted, quoted, won or lost.
    pub fn update_progress(
        &self,
        company: &CompanyId,
        assignment_id: &AssignmentId,
        status: AssignmentStatus,
    ) -> Result<LeadAssignment, PortalError> {
        if matches!(status, AssignmentStatus::Assigned | AssignmentStatus::Revealed) {
            return Err(PortalError::InvalidStatus(status.label()));
        }
        let current = self
            .assignments
            .fetch(assignment_id)?
            .ok_or(PortalError::AssignmentNotFound)?;
        if &current.company_id != company {
            return Err(PortalError::NotAssignedToCompany);
        }
        if !current.grants_contact_details() {
            return Err(PortalError::NotRevealed);
        }
        // Reveal state is re-checked by the store; a refund since the read wins.
        self.assignments
            .advance(assignment_id, company, status)
            .map_err(|err| match err {
                RepositoryError::NotFound => PortalError::AssignmentNotFound,
                RepositoryError::PreconditionFailed(_) => PortalError::NotRevealed,
                other => PortalError::Storage(other),
            })
    }
}
