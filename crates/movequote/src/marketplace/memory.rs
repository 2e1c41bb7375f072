//! In-process store implementing every repository trait.
//!
//! Each company's ledger sits behind its own mutex, so balance checks and appends for
//! one company are serialized while different companies proceed in parallel. A linked
//! append takes the ledger lock first and the assignment entry second; nothing else
//! takes both.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::audit::AuditEntry;
use super::cms::CmsContent;
use super::domain::{
    AssignmentId, AssignmentStatus, CmsContentId, Company, CompanyId, CreditPack, CreditPackId,
    Lead, LeadAssignment, LeadContactDetails, LeadId, PricingRuleId,
};
use super::ledger::{LedgerReason, LedgerReference, LedgerRow, PendingEntry};
use super::pricing::PricingRule;
use super::repository::{
    AssignmentChange, AssignmentRepository, AuditSink, CmsRepository, CompanyRepository,
    CreditPackCatalog, LeadRepository, LedgerStore, PricingRuleRepository, RepositoryError,
};

type LedgerRows = Arc<Mutex<Vec<LedgerRow>>>;

#[derive(Default)]
pub struct MemoryStore {
    companies: DashMap<CompanyId, Company>,
    company_emails: DashMap<String, CompanyId>,
    leads: DashMap<LeadId, (Lead, LeadContactDetails)>,
    assignments: DashMap<AssignmentId, LeadAssignment>,
    ledgers: DashMap<CompanyId, LedgerRows>,
    audit: Mutex<Vec<AuditEntry>>,
    pricing_rules: Mutex<Vec<PricingRule>>,
    cms: Mutex<Vec<CmsContent>>,
    credit_packs: DashMap<CreditPackId, CreditPack>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ledger_for(&self, company: &CompanyId) -> LedgerRows {
        Arc::clone(&self.ledgers.entry(company.clone()).or_default())
    }

    fn existing_ledger(&self, company: &CompanyId) -> Option<LedgerRows> {
        self.ledgers.get(company).map(|rows| Arc::clone(&rows))
    }

    fn check_append(rows: &[LedgerRow], entry: &PendingEntry) -> Result<(), RepositoryError> {
        let actual = rows.last().map(|row| row.balance_after).unwrap_or(0);
        if actual != entry.previous_balance {
            return Err(RepositoryError::StaleBalance {
                expected: entry.previous_balance,
                actual,
            });
        }
        let expected_after = entry.previous_balance.checked_add(entry.delta);
        if entry.balance_after < 0 || expected_after != Some(entry.balance_after) {
            return Err(RepositoryError::PreconditionFailed(
                "ledger row does not balance".to_string(),
            ));
        }
        if let Some(reference) = &entry.reference {
            let duplicate = rows
                .iter()
                .any(|row| row.reason == entry.reason && row.reference.as_ref() == Some(reference));
            if duplicate {
                return Err(RepositoryError::DuplicateReference);
            }
        }
        Ok(())
    }
}

fn email_key(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

impl CompanyRepository for MemoryStore {
    fn insert(&self, company: Company) -> Result<Company, RepositoryError> {
        if self.companies.contains_key(&company.id) {
            return Err(RepositoryError::Conflict);
        }
        match self.company_emails.entry(email_key(&company.contact_email)) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(company.id.clone());
                self.companies.insert(company.id.clone(), company.clone());
                Ok(company)
            }
        }
    }

    fn update(&self, company: Company) -> Result<(), RepositoryError> {
        let mut stored = self
            .companies
            .get_mut(&company.id)
            .ok_or(RepositoryError::NotFound)?;
        let old_key = email_key(&stored.contact_email);
        let new_key = email_key(&company.contact_email);
        if old_key != new_key {
            match self.company_emails.entry(new_key) {
                Entry::Occupied(_) => return Err(RepositoryError::Conflict),
                Entry::Vacant(slot) => {
                    slot.insert(company.id.clone());
                }
            }
            self.company_emails.remove(&old_key);
        }
        *stored = company;
        Ok(())
    }

    fn fetch(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        Ok(self.companies.get(id).map(|company| company.clone()))
    }

    fn list(&self) -> Result<Vec<Company>, RepositoryError> {
        let mut companies: Vec<Company> = self
            .companies
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        companies.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(companies)
    }
}

impl LeadRepository for MemoryStore {
    fn insert(&self, lead: Lead, contact: LeadContactDetails) -> Result<Lead, RepositoryError> {
        match self.leads.entry(lead.id.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict),
            Entry::Vacant(slot) => {
                slot.insert((lead.clone(), contact));
                Ok(lead)
            }
        }
    }

    fn fetch(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        Ok(self.leads.get(id).map(|entry| entry.0.clone()))
    }

    fn contact_details(&self, id: &LeadId) -> Result<Option<LeadContactDetails>, RepositoryError> {
        Ok(self.leads.get(id).map(|entry| entry.1.clone()))
    }
}

impl AssignmentRepository for MemoryStore {
    fn insert(&self, assignment: LeadAssignment) -> Result<LeadAssignment, RepositoryError> {
        let duplicate_pair = self.assignments.iter().any(|entry| {
            entry.lead_id == assignment.lead_id && entry.company_id == assignment.company_id
        });
        if duplicate_pair {
            return Err(RepositoryError::Conflict);
        }
        match self.assignments.entry(assignment.id.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(assignment.clone());
                Ok(assignment)
            }
        }
    }

    fn advance(
        &self,
        id: &AssignmentId,
        company: &CompanyId,
        status: AssignmentStatus,
    ) -> Result<LeadAssignment, RepositoryError> {
        let mut stored = self.assignments.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if &stored.company_id != company {
            return Err(RepositoryError::PreconditionFailed(
                "assignment belongs to another company".to_string(),
            ));
        }
        if !stored.grants_contact_details() {
            return Err(RepositoryError::PreconditionFailed(
                "assignment is not revealed".to_string(),
            ));
        }
        stored.status = status;
        Ok(stored.clone())
    }

    fn fetch(&self, id: &AssignmentId) -> Result<Option<LeadAssignment>, RepositoryError> {
        Ok(self.assignments.get(id).map(|entry| entry.clone()))
    }

    fn for_company(&self, company: &CompanyId) -> Result<Vec<LeadAssignment>, RepositoryError> {
        let mut assignments: Vec<LeadAssignment> = self
            .assignments
            .iter()
            .filter(|entry| &entry.company_id == company)
            .map(|entry| entry.value().clone())
            .collect();
        assignments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(assignments)
    }

    fn for_lead(&self, lead: &LeadId) -> Result<Vec<LeadAssignment>, RepositoryError> {
        let mut assignments: Vec<LeadAssignment> = self
            .assignments
            .iter()
            .filter(|entry| &entry.lead_id == lead)
            .map(|entry| entry.value().clone())
            .collect();
        assignments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(assignments)
    }
}

impl LedgerStore for MemoryStore {
    fn latest(&self, company: &CompanyId) -> Result<Option<LedgerRow>, RepositoryError> {
        Ok(self
            .existing_ledger(company)
            .and_then(|rows| rows.lock().last().cloned()))
    }

    fn history(&self, company: &CompanyId) -> Result<Vec<LedgerRow>, RepositoryError> {
        Ok(self
            .existing_ledger(company)
            .map(|rows| rows.lock().clone())
            .unwrap_or_default())
    }

    fn find_reference(
        &self,
        company: &CompanyId,
        reason: LedgerReason,
        reference: &LedgerReference,
    ) -> Result<Option<LedgerRow>, RepositoryError> {
        Ok(self.existing_ledger(company).and_then(|rows| {
            rows.lock()
                .iter()
                .find(|row| row.reason == reason && row.reference.as_ref() == Some(reference))
                .cloned()
        }))
    }

    fn append(&self, entry: PendingEntry) -> Result<LedgerRow, RepositoryError> {
        let ledger = self.ledger_for(&entry.company_id);
        let mut rows = ledger.lock();
        Self::check_append(&rows, &entry)?;
        let row = entry.into_row();
        rows.push(row.clone());
        Ok(row)
    }

    fn append_linked(
        &self,
        entry: PendingEntry,
        change: AssignmentChange,
    ) -> Result<(LedgerRow, LeadAssignment), RepositoryError> {
        let ledger = self.ledger_for(&entry.company_id);
        let mut rows = ledger.lock();
        Self::check_append(&rows, &entry)?;

        let mut assignment = self
            .assignments
            .get_mut(change.assignment_id())
            .ok_or(RepositoryError::NotFound)?;
        if assignment.company_id != entry.company_id {
            return Err(RepositoryError::PreconditionFailed(
                "assignment belongs to another company".to_string(),
            ));
        }
        match change {
            AssignmentChange::Reveal {
                revealed_at, price, ..
            } => {
                if assignment.revealed_at.is_some() {
                    return Err(RepositoryError::PreconditionFailed(
                        "assignment already revealed".to_string(),
                    ));
                }
                assignment.revealed_at = Some(revealed_at);
                assignment.price_at_reveal = Some(price);
                assignment.status = AssignmentStatus::Revealed;
            }
            AssignmentChange::Refund { .. } => {
                if assignment.revealed_at.is_none() || assignment.price_at_reveal.is_none() {
                    return Err(RepositoryError::PreconditionFailed(
                        "assignment was never revealed".to_string(),
                    ));
                }
                assignment.status = AssignmentStatus::Assigned;
            }
        }
        let updated = assignment.clone();
        drop(assignment);

        let row = entry.into_row();
        rows.push(row.clone());
        Ok((row, updated))
    }
}

impl AuditSink for MemoryStore {
    fn append(&self, entry: AuditEntry) -> Result<(), RepositoryError> {
        self.audit.lock().push(entry);
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, RepositoryError> {
        Ok(self.audit.lock().iter().rev().take(limit).cloned().collect())
    }
}

impl PricingRuleRepository for MemoryStore {
    fn insert(&self, mut rule: PricingRule) -> Result<PricingRule, RepositoryError> {
        let mut rules = self.pricing_rules.lock();
        if rules.iter().any(|existing| existing.id == rule.id) {
            return Err(RepositoryError::Conflict);
        }
        rule.is_active = false;
        rules.push(rule.clone());
        Ok(rule)
    }

    fn update(&self, mut rule: PricingRule) -> Result<PricingRule, RepositoryError> {
        let mut rules = self.pricing_rules.lock();
        let stored = rules
            .iter_mut()
            .find(|existing| existing.id == rule.id)
            .ok_or(RepositoryError::NotFound)?;
        rule.is_active = stored.is_active;
        *stored = rule.clone();
        Ok(rule)
    }

    fn fetch(&self, id: &PricingRuleId) -> Result<Option<PricingRule>, RepositoryError> {
        Ok(self
            .pricing_rules
            .lock()
            .iter()
            .find(|rule| &rule.id == id)
            .cloned())
    }

    fn list(&self) -> Result<Vec<PricingRule>, RepositoryError> {
        Ok(self.pricing_rules.lock().clone())
    }

    fn active(&self) -> Result<Option<PricingRule>, RepositoryError> {
        Ok(self
            .pricing_rules
            .lock()
            .iter()
            .find(|rule| rule.is_active)
            .cloned())
    }

    fn activate(&self, id: &PricingRuleId) -> Result<PricingRule, RepositoryError> {
        let mut rules = self.pricing_rules.lock();
        if !rules.iter().any(|rule| &rule.id == id) {
            return Err(RepositoryError::NotFound);
        }
        let mut activated = None;
        for rule in rules.iter_mut() {
            rule.is_active = &rule.id == id;
            if rule.is_active {
                activated = Some(rule.clone());
            }
        }
        activated.ok_or(RepositoryError::NotFound)
    }
}

impl CmsRepository for MemoryStore {
    fn insert(&self, content: CmsContent) -> Result<CmsContent, RepositoryError> {
        let mut items = self.cms.lock();
        if items
            .iter()
            .any(|item| item.id == content.id || item.slug == content.slug)
        {
            return Err(RepositoryError::Conflict);
        }
        items.push(content.clone());
        Ok(content)
    }

    fn update(&self, content: CmsContent) -> Result<CmsContent, RepositoryError> {
        let mut items = self.cms.lock();
        if items
            .iter()
            .any(|item| item.id != content.id && item.slug == content.slug)
        {
            return Err(RepositoryError::Conflict);
        }
        let stored = items
            .iter_mut()
            .find(|item| item.id == content.id)
            .ok_or(RepositoryError::NotFound)?;
        *stored = content.clone();
        Ok(content)
    }

    fn fetch(&self, id: &CmsContentId) -> Result<Option<CmsContent>, RepositoryError> {
        Ok(self.cms.lock().iter().find(|item| &item.id == id).cloned())
    }

    fn by_slug(&self, slug: &str) -> Result<Option<CmsContent>, RepositoryError> {
        Ok(self.cms.lock().iter().find(|item| item.slug == slug).cloned())
    }

    fn list(&self) -> Result<Vec<CmsContent>, RepositoryError> {
        Ok(self.cms.lock().clone())
    }
}

impl CreditPackCatalog for MemoryStore {
    fn upsert(&self, pack: CreditPack) -> Result<CreditPack, RepositoryError> {
        self.credit_packs.insert(pack.id.clone(), pack.clone());
        Ok(pack)
    }

    fn fetch(&self, id: &CreditPackId) -> Result<Option<CreditPack>, RepositoryError> {
        Ok(self.credit_packs.get(id).map(|pack| pack.clone()))
    }

    fn list(&self) -> Result<Vec<CreditPack>, RepositoryError> {
        let mut packs: Vec<CreditPack> = self
            .credit_packs
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        packs.sort_by(|a, b| a.credits.cmp(&b.credits).then(a.id.cmp(&b.id)));
        Ok(packs)
    }
}
