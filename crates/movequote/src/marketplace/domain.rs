use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whole platform credits. Signed so ledger deltas share the type.
pub type Credits = i64;

/// Most companies a single lead is shared with.
pub const MAX_ASSIGNMENTS_PER_LEAD: usize = 5;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Partner removal company.
    CompanyId
);
string_id!(
    /// Homeowner move request.
    LeadId
);
string_id!(
    /// Pairing of one lead with one company.
    AssignmentId
);
string_id!(LedgerEntryId);
string_id!(PricingRuleId);
string_id!(CreditPackId);
string_id!(CmsContentId);
string_id!(AuditEntryId);
string_id!(
    /// Identity-provider user, admin or partner staff.
    UserId
);

/// Review state of a partner company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    Pending,
    Approved,
    Rejected,
    Suspended,
}

impl CompanyStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CompanyStatus::Pending => "pending",
            CompanyStatus::Approved => "approved",
            CompanyStatus::Rejected => "rejected",
            CompanyStatus::Suspended => "suspended",
        }
    }

    /// Admin-driven transitions. Nothing is terminal; `pending` is never re-entered.
    ///
    /// ```text
    /// pending ──► approved ◄──► suspended
    ///    │           ▲
    ///    └─► rejected┘
    /// ```
    pub fn can_transition_to(self, next: CompanyStatus) -> bool {
        use CompanyStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Suspended)
                | (Suspended, Approved)
                | (Rejected, Approved)
        )
    }
}

impl fmt::Display for CompanyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Services a partner advertises on its profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    HomeRemovals,
    OfficeRemovals,
    Packing,
    Storage,
    Dismantling,
    Cleaning,
    PianoMoving,
    International,
}

/// A vetted (or awaiting vetting) removal company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub services: Vec<ServiceKind>,
    pub accreditations: Vec<String>,
    /// Normalised postcode areas ("M") or districts ("SW1").
    pub coverage: Vec<String>,
    pub status: CompanyStatus,
    pub paused: bool,
    pub created_at: DateTime<Utc>,
}

impl Company {
    pub fn accepts_new_leads(&self) -> bool {
        self.status == CompanyStatus::Approved && !self.paused
    }

    pub fn covers(&self, postcode: &str) -> bool {
        let outward = outward_code(postcode);
        self.coverage
            .iter()
            .any(|prefix| coverage_matches(prefix, &outward))
    }
}

/// Uppercases and collapses whitespace: " sw1a  1aa" -> "SW1A 1AA".
pub fn normalize_postcode(raw: &str) -> String {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    if compact.is_ascii() && compact.len() > 3 {
        let (outward, inward) = compact.split_at(compact.len() - 3);
        format!("{outward} {inward}")
    } else {
        compact
    }
}

/// Outward half of a full postcode, or the whole input when it is already a prefix.
pub fn outward_code(postcode: &str) -> String {
    let normalized = normalize_postcode(postcode);
    match normalized.split_once(' ') {
        Some((outward, _)) => outward.to_string(),
        None => normalized,
    }
}

fn coverage_matches(prefix: &str, outward: &str) -> bool {
    let prefix = prefix.trim().to_ascii_uppercase();
    if prefix.is_empty() {
        return false;
    }
    if prefix.chars().all(|c| c.is_ascii_alphabetic()) {
        // Area: "S" must not swallow "SW".
        let area: String = outward
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect();
        return area == prefix;
    }
    match outward.strip_prefix(prefix.as_str()) {
        Some("") => true,
        // District "SW1" covers sub-districts "SW1A".."SW1Y", not "SW10".
        Some(rest) => rest.chars().all(|c| c.is_ascii_alphabetic()),
        None => false,
    }
}

/// Size of the property being moved; keys the pricing modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PropertySize {
    #[serde(rename = "studio")]
    Studio,
    #[serde(rename = "1_bed")]
    OneBed,
    #[serde(rename = "2_bed")]
    TwoBed,
    #[serde(rename = "3_bed")]
    ThreeBed,
    #[serde(rename = "4_bed")]
    FourBed,
    #[serde(rename = "5_bed_plus")]
    FiveBedPlus,
    #[serde(rename = "office")]
    Office,
}

/// Distance between origin and destination, bucketed for pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceBand {
    Local,
    Regional,
    LongDistance,
    National,
}

impl DistanceBand {
    pub fn from_miles(miles: u32) -> Self {
        match miles {
            0..=9 => DistanceBand::Local,
            10..=49 => DistanceBand::Regional,
            50..=149 => DistanceBand::LongDistance,
            _ => DistanceBand::National,
        }
    }
}

/// Extra services the homeowner asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFlags {
    #[serde(default)]
    pub packing: bool,
    #[serde(default)]
    pub storage: bool,
    #[serde(default)]
    pub dismantling: bool,
    #[serde(default)]
    pub cleaning: bool,
    #[serde(default)]
    pub piano: bool,
}

/// A homeowner's move request. Never edited by companies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub origin_postcode: String,
    pub destination_postcode: String,
    pub move_date: NaiveDate,
    pub property_size: PropertySize,
    pub services: ServiceFlags,
    pub distance_miles: Option<u32>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    pub fn distance_band(&self) -> Option<DistanceBand> {
        self.distance_miles.map(DistanceBand::from_miles)
    }
}

/// Homeowner contact details, gated behind a reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadContactDetails {
    pub lead_id: LeadId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub consent: bool,
}

/// Progress of a company on a lead. Ordering is advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    Revealed,
    Contacted,
    Quoted,
    Won,
    Lost,
}

impl AssignmentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::Revealed => "revealed",
            AssignmentStatus::Contacted => "contacted",
            AssignmentStatus::Quoted => "quoted",
            AssignmentStatus::Won => "won",
            AssignmentStatus::Lost => "lost",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadAssignment {
    pub id: AssignmentId,
    pub lead_id: LeadId,
    pub company_id: CompanyId,
    pub status: AssignmentStatus,
    /// Set once at reveal and kept through a refund.
    pub revealed_at: Option<DateTime<Utc>>,
    /// Credits charged at reveal; the refund amount.
    pub price_at_reveal: Option<Credits>,
    pub created_at: DateTime<Utc>,
}

impl LeadAssignment {
    pub fn new(lead_id: LeadId, company_id: CompanyId, now: DateTime<Utc>) -> Self {
        Self {
            id: AssignmentId::generate(),
            lead_id,
            company_id,
            status: AssignmentStatus::Assigned,
            revealed_at: None,
            price_at_reveal: None,
            created_at: now,
        }
    }

    pub fn is_revealed(&self) -> bool {
        self.revealed_at.is_some()
    }

    /// Contact details stay hidden once a reveal has been refunded.
    pub fn grants_contact_details(&self) -> bool {
        self.is_revealed() && self.status != AssignmentStatus::Assigned
    }
}

/// Purchasable bundle of credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditPack {
    pub id: CreditPackId,
    pub name: String,
    pub credits: Credits,
    pub price_pence: u32,
    pub active: bool,
}
