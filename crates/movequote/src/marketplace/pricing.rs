//! Reveal pricing.
//!
//! `price = base_price + size modifier + distance-band modifier + short-notice surcharge`.
//! Missing modifiers count as zero. Rules are validated on write so every price is at
//! least one credit.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::audit::{AuditLogger, AuditRecord};
use super::domain::{Credits, DistanceBand, Lead, PricingRuleId, PropertySize, UserId};
use super::repository::{PricingRuleRepository, RepositoryError};

/// Highest price a rule may produce for one reveal.
pub const MAX_REVEAL_PRICE: Credits = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRule {
    pub id: PricingRuleId,
    pub name: String,
    pub base_price: Credits,
    #[serde(default)]
    pub property_size_modifiers: BTreeMap<PropertySize, Credits>,
    #[serde(default)]
    pub distance_band_modifiers: BTreeMap<DistanceBand, Credits>,
    pub short_notice_days: i64,
    pub short_notice_surcharge: Credits,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl PricingRule {
    /// Flat-priced stand-in used while no rule is active.
    pub fn flat(price: Credits, now: DateTime<Utc>) -> Self {
        Self {
            id: PricingRuleId::from("flat"),
            name: "Flat reveal price".to_string(),
            base_price: price,
            property_size_modifiers: BTreeMap::new(),
            distance_band_modifiers: BTreeMap::new(),
            short_notice_days: 0,
            short_notice_surcharge: 0,
            is_active: false,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), PricingError> {
        if self.name.trim().is_empty() {
            return Err(PricingError::InvalidRule("name is required".to_string()));
        }
        if self.base_price < 1 {
            return Err(PricingError::InvalidRule(
                "base price must be at least one credit".to_string(),
            ));
        }
        if self.short_notice_days < 0 || self.short_notice_surcharge < 0 {
            return Err(PricingError::InvalidRule(
                "short-notice settings cannot be negative".to_string(),
            ));
        }
        let negative = self
            .property_size_modifiers
            .values()
            .chain(self.distance_band_modifiers.values())
            .any(|amount| *amount < 0);
        if negative {
            return Err(PricingError::InvalidRule(
                "modifiers are additive and cannot be negative".to_string(),
            ));
        }
        match self.ceiling() {
            Some(ceiling) if ceiling <= MAX_REVEAL_PRICE => Ok(()),
            _ => Err(PricingError::InvalidRule(format!(
                "base price plus every modifier must stay within {MAX_REVEAL_PRICE} credits"
            ))),
        }
    }

    /// Price for the most expensive lead the rule can see; `None` if the sum overflows.
    pub fn ceiling(&self) -> Option<Credits> {
        let size = self.property_size_modifiers.values().copied().max().unwrap_or(0);
        let distance = self.distance_band_modifiers.values().copied().max().unwrap_or(0);
        self.base_price
            .checked_add(size)?
            .checked_add(distance)?
            .checked_add(self.short_notice_surcharge)
    }
}

/// Whole days from `today` to `move_date`; negative once the date has passed.
pub fn days_until(move_date: NaiveDate, today: NaiveDate) -> i64 {
    (move_date - today).num_days()
}

pub fn compute_price(rule: &PricingRule, lead: &Lead, today: NaiveDate) -> Credits {
    let size = rule
        .property_size_modifiers
        .get(&lead.property_size)
        .copied()
        .unwrap_or(0);
    let distance = lead
        .distance_band()
        .and_then(|band| rule.distance_band_modifiers.get(&band).copied())
        .unwrap_or(0);
    let short_notice = if days_until(lead.move_date, today) <= rule.short_notice_days {
        rule.short_notice_surcharge
    } else {
        0
    };
    rule.base_price
        .saturating_add(size)
        .saturating_add(distance)
        .saturating_add(short_notice)
}

/// Admin-editable fields of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingRuleDraft {
    pub name: String,
    pub base_price: Credits,
    #[serde(default)]
    pub property_size_modifiers: BTreeMap<PropertySize, Credits>,
    #[serde(default)]
    pub distance_band_modifiers: BTreeMap<DistanceBand, Credits>,
    #[serde(default)]
    pub short_notice_days: i64,
    #[serde(default)]
    pub short_notice_surcharge: Credits,
}

impl PricingRuleDraft {
    fn into_rule(self, id: PricingRuleId, is_active: bool, now: DateTime<Utc>) -> PricingRule {
        PricingRule {
            id,
            name: self.name.trim().to_string(),
            base_price: self.base_price,
            property_size_modifiers: self.property_size_modifiers,
            distance_band_modifiers: self.distance_band_modifiers,
            short_notice_days: self.short_notice_days,
            short_notice_surcharge: self.short_notice_surcharge,
            is_active,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("invalid pricing rule: {0}")]
    InvalidRule(String),
    #[error("pricing rule not found")]
    NotFound,
    #[error(transparent)]
    Storage(RepositoryError),
}

impl From<RepositoryError> for PricingError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => PricingError::NotFound,
            other => PricingError::Storage(other),
        }
    }
}

pub struct PricingService {
    rules: Arc<dyn PricingRuleRepository>,
    audit: AuditLogger,
    fallback_price: Credits,
}

impl PricingService {
    pub fn new(
        rules: Arc<dyn PricingRuleRepository>,
        audit: AuditLogger,
        fallback_price: Credits,
    ) -> Self {
        Self {
            rules,
            audit,
            fallback_price: fallback_price.clamp(1, MAX_REVEAL_PRICE),
        }
    }

    pub fn list(&self) -> Result<Vec<PricingRule>, PricingError> {
        Ok(self.rules.list()?)
    }

    /// The active rule, or the flat fallback when none is active.
    pub fn effective_rule(&self, now: DateTime<Utc>) -> Result<PricingRule, PricingError> {
        Ok(self
            .rules
            .active()?
            .unwrap_or_else(|| PricingRule::flat(self.fallback_price, now)))
    }

    pub fn quote(&self, lead: &Lead, now: DateTime<Utc>) -> Result<Credits, PricingError> {
        let rule = self.effective_rule(now)?;
        Ok(compute_price(&rule, lead, now.date_naive()))
    }

    pub fn create(
        &self,
        actor: &UserId,
        draft: PricingRuleDraft,
        now: DateTime<Utc>,
    ) -> Result<PricingRule, PricingError> {
        let rule = draft.into_rule(PricingRuleId::generate(), false, now);
        rule.validate()?;
        let stored = self.rules.insert(rule)?;
        self.audit.record(
            AuditRecord::new(actor, "pricing_rule.created", "pricing_rule", stored.id.as_str())
                .after(json!(stored)),
            now,
        );
        Ok(stored)
    }

    pub fn update(
        &self,
        actor: &UserId,
        id: &PricingRuleId,
        draft: PricingRuleDraft,
        now: DateTime<Utc>,
    ) -> Result<PricingRule, PricingError> {
        let before = self.rules.fetch(id)?.ok_or(PricingError::NotFound)?;
        let rule = draft.into_rule(id.clone(), before.is_active, now);
        rule.validate()?;
        let stored = self.rules.update(rule)?;
        self.audit.record(
            AuditRecord::new(actor, "pricing_rule.updated", "pricing_rule", id.as_str())
                .before(json!(before))
                .after(json!(stored)),
            now,
        );
        Ok(stored)
    }

    pub fn activate(
        &self,
        actor: &UserId,
        id: &PricingRuleId,
        now: DateTime<Utc>,
    ) -> Result<PricingRule, PricingError> {
        let previous = self.rules.active()?;
        let activated = self.rules.activate(id)?;
        info!(rule = %activated.id, "pricing rule activated");
        self.audit.record(
            AuditRecord::new(actor, "pricing_rule.activated", "pricing_rule", id.as_str())
                .before(json!({ "active_rule": previous.map(|rule| rule.id) }))
                .after(json!({ "active_rule": activated.id })),
            now,
        );
        Ok(activated)
    }
}
