//! Partner registration and self-service profile settings.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{Company, CompanyId, CompanyStatus, ServiceKind};
use super::repository::{CompanyRepository, RepositoryError};
use super::validation::{is_coverage_prefix, is_email, is_phone, ValidationErrors};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerRegistration {
    pub company_name: String,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub services: Vec<ServiceKind>,
    #[serde(default)]
    pub accreditations: Vec<String>,
    pub coverage: Vec<String>,
}

/// Profile fields a partner may edit. Contact e-mail is fixed after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub company_name: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub services: Vec<ServiceKind>,
    #[serde(default)]
    pub accreditations: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("registration is invalid: {0}")]
    Invalid(ValidationErrors),
    #[error("a company with this contact email is already registered")]
    DuplicateEmail,
    #[error("company not found")]
    NotFound,
    #[error(transparent)]
    Storage(RepositoryError),
}

impl From<RepositoryError> for RegistrationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict => RegistrationError::DuplicateEmail,
            RepositoryError::NotFound => RegistrationError::NotFound,
            other => RegistrationError::Storage(other),
        }
    }
}

fn check_profile(
    errors: &mut ValidationErrors,
    company_name: &str,
    contact_name: &str,
    contact_phone: &str,
    services: &[ServiceKind],
) {
    if company_name.trim().is_empty() {
        errors.push("companyName", "company name is required");
    }
    if contact_name.trim().is_empty() {
        errors.push("contactName", "contact name is required");
    }
    if !is_phone(contact_phone) {
        errors.push("contactPhone", "enter a phone number with at least 10 digits");
    }
    if services.is_empty() {
        errors.push("services", "select at least one service");
    }
}

fn check_coverage(errors: &mut ValidationErrors, coverage: &[String]) {
    if coverage.is_empty() {
        errors.push("coverage", "add at least one postcode area");
    } else if let Some(bad) = coverage.iter().find(|prefix| !is_coverage_prefix(prefix)) {
        errors.push(
            "coverage",
            format!("'{}' is not a postcode area or district", bad.trim()),
        );
    }
}

/// Uppercased and de-duplicated, first occurrence wins.
fn normalize_coverage(coverage: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(coverage.len());
    for prefix in coverage {
        let prefix = prefix.trim().to_ascii_uppercase();
        if !normalized.contains(&prefix) {
            normalized.push(prefix);
        }
    }
    normalized
}

fn normalize_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn dedupe_services(services: &[ServiceKind]) -> Vec<ServiceKind> {
    let mut services = services.to_vec();
    services.sort();
    services.dedup();
    services
}

pub struct PartnerService {
    companies: Arc<dyn CompanyRepository>,
}

impl PartnerService {
    pub fn new(companies: Arc<dyn CompanyRepository>) -> Self {
        Self { companies }
    }

    /// Stores a new `pending` company awaiting admin review.
    pub fn register(
        &self,
        registration: PartnerRegistration,
        now: DateTime<Utc>,
    ) -> Result<Company, RegistrationError> {
        let mut errors = ValidationErrors::new();
        check_profile(
            &mut errors,
            &registration.company_name,
            &registration.contact_name,
            &registration.contact_phone,
            &registration.services,
        );
        if !is_email(&registration.contact_email) {
            errors.push("contactEmail", "enter a valid email address");
        }
        check_coverage(&mut errors, &registration.coverage);
        errors.into_result().map_err(RegistrationError::Invalid)?;

        let company = Company {
            id: CompanyId::generate(),
            name: registration.company_name.trim().to_string(),
            contact_name: registration.contact_name.trim().to_string(),
            contact_email: registration.contact_email.trim().to_ascii_lowercase(),
            contact_phone: registration.contact_phone.trim().to_string(),
            services: dedupe_services(&registration.services),
            accreditations: normalize_list(&registration.accreditations),
            coverage: normalize_coverage(&registration.coverage),
            status: CompanyStatus::Pending,
            paused: false,
            created_at: now,
        };
        let stored = self.companies.insert(company)?;
        info!(company = %stored.id, name = %stored.name, "partner registered");
        Ok(stored)
    }

    pub fn fetch(&self, id: &CompanyId) -> Result<Company, RegistrationError> {
        self.companies.fetch(id)?.ok_or(RegistrationError::NotFound)
    }

    pub fn list(&self) -> Result<Vec<Company>, RegistrationError> {
        Ok(self.companies.list()?)
    }

    pub fn update_profile(
        &self,
        id: &CompanyId,
        update: ProfileUpdate,
    ) -> Result<Company, RegistrationError> {
        let mut errors = ValidationErrors::new();
        check_profile(
            &mut errors,
            &update.company_name,
            &update.contact_name,
            &update.contact_phone,
            &update.services,
        );
        errors.into_result().map_err(RegistrationError::Invalid)?;

        let mut company = self.fetch(id)?;
        company.name = update.company_name.trim().to_string();
        company.contact_name = update.contact_name.trim().to_string();
        company.contact_phone = update.contact_phone.trim().to_string();
        company.services = dedupe_services(&update.services);
        company.accreditations = normalize_list(&update.accreditations);
        self.companies.update(company.clone())?;
        Ok(company)
    }

    pub fn set_coverage(
        &self,
        id: &CompanyId,
        coverage: Vec<String>,
    ) -> Result<Company, RegistrationError> {
        let mut errors = ValidationErrors::new();
        check_coverage(&mut errors, &coverage);
        errors.into_result().map_err(RegistrationError::Invalid)?;

        let mut company = self.fetch(id)?;
        company.coverage = normalize_coverage(&coverage);
        self.companies.update(company.clone())?;
        Ok(company)
    }

    /// Pausing stops new assignments without touching review status.
    pub fn set_paused(&self, id: &CompanyId, paused: bool) -> Result<Company, RegistrationError> {
        let mut company = self.fetch(id)?;
        if company.paused != paused {
            company.paused = paused;
            self.companies.update(company.clone())?;
            info!(company = %company.id, paused, "lead matching toggled");
        }
        Ok(company)
    }
}
