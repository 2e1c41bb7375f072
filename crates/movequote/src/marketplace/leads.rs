//! Homeowner lead intake and company matching.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{
    normalize_postcode, Company, Lead, LeadAssignment, LeadContactDetails, LeadId, PropertySize,
    ServiceFlags, MAX_ASSIGNMENTS_PER_LEAD,
};
use super::repository::{AssignmentRepository, CompanyRepository, LeadRepository, RepositoryError};
use super::validation::{is_email, is_phone, is_uk_postcode, ValidationErrors};

pub const MAX_NOTES_LENGTH: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSubmission {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Payload of the multi-step quote wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSubmission {
    pub origin_postcode: String,
    pub destination_postcode: String,
    pub move_date: NaiveDate,
    pub property_size: PropertySize,
    #[serde(default)]
    pub services: ServiceFlags,
    #[serde(default)]
    pub distance_miles: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    pub contact: ContactSubmission,
    #[serde(default)]
    pub consent: bool,
}

impl LeadSubmission {
    pub fn validate(&self, today: NaiveDate) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if !is_uk_postcode(&self.origin_postcode) {
            errors.push("originPostcode", "enter a valid UK postcode");
        }
        if !is_uk_postcode(&self.destination_postcode) {
            errors.push("destinationPostcode", "enter a valid UK postcode");
        }
        if self.move_date < today {
            errors.push("moveDate", "move date cannot be in the past");
        }
        if self
            .notes
            .as_deref()
            .is_some_and(|notes| notes.chars().count() > MAX_NOTES_LENGTH)
        {
            errors.push(
                "notes",
                format!("notes must be at most {MAX_NOTES_LENGTH} characters"),
            );
        }
        if self.contact.name.trim().is_empty() {
            errors.push("contact.name", "name is required");
        }
        if !is_email(&self.contact.email) {
            errors.push("contact.email", "enter a valid email address");
        }
        if !is_phone(&self.contact.phone) {
            errors.push("contact.phone", "enter a phone number with at least 10 digits");
        }
        if !self.consent {
            errors.push("consent", "consent is required to share your details");
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadReceipt {
    pub lead_id: LeadId,
    pub matched: usize,
    pub assignments: Vec<LeadAssignment>,
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("lead submission is invalid: {0}")]
    Invalid(ValidationErrors),
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

pub struct LeadIntake {
    companies: Arc<dyn CompanyRepository>,
    leads: Arc<dyn LeadRepository>,
    assignments: Arc<dyn AssignmentRepository>,
}

impl LeadIntake {
    pub fn new(
        companies: Arc<dyn CompanyRepository>,
        leads: Arc<dyn LeadRepository>,
        assignments: Arc<dyn AssignmentRepository>,
    ) -> Self {
        Self {
            companies,
            leads,
            assignments,
        }
    }

    /// Validates, stores the lead with its contact details, and assigns matching companies.
    pub fn submit(
        &self,
        submission: LeadSubmission,
        now: DateTime<Utc>,
    ) -> Result<LeadReceipt, IntakeError> {
        submission
            .validate(now.date_naive())
            .map_err(IntakeError::Invalid)?;

        let lead_id = LeadId::generate();
        let lead = Lead {
            id: lead_id.clone(),
            origin_postcode: normalize_postcode(&submission.origin_postcode),
            destination_postcode: normalize_postcode(&submission.destination_postcode),
            move_date: submission.move_date,
            property_size: submission.property_size,
            services: submission.services,
            distance_miles: submission.distance_miles,
            notes: submission
                .notes
                .map(|notes| notes.trim().to_string())
                .filter(|notes| !notes.is_empty()),
            created_at: now,
        };
        let contact = LeadContactDetails {
            lead_id: lead_id.clone(),
            name: submission.contact.name.trim().to_string(),
            email: submission.contact.email.trim().to_ascii_lowercase(),
            phone: submission.contact.phone.trim().to_string(),
            consent: submission.consent,
        };
        let lead = self.leads.insert(lead, contact)?;

        let mut assignments = Vec::new();
        for company in self.match_companies(&lead)? {
            let assignment = LeadAssignment::new(lead.id.clone(), company.id, now);
            assignments.push(self.assignments.insert(assignment)?);
        }

        info!(
            lead = %lead.id,
            origin = %lead.origin_postcode,
            matched = assignments.len(),
            "lead captured"
        );

        Ok(LeadReceipt {
            lead_id,
            matched: assignments.len(),
            assignments,
        })
    }

    /// Approved, non-paused companies covering the origin, oldest registration first.
    pub fn match_companies(&self, lead: &Lead) -> Result<Vec<Company>, RepositoryError> {
        Ok(self
            .companies
            .list()?
            .into_iter()
            .filter(|company| company.accepts_new_leads() && company.covers(&lead.origin_postcode))
            .take(MAX_ASSIGNMENTS_PER_LEAD)
            .collect())
    }
}
