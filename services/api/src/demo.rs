use crate::infra::{HostedCheckoutGateway, InMemoryIdentityProvider, OutboxNotifier};
use chrono::{Duration, Utc};
use clap::Args;
use movequote::config::{AuthConfig, EmailConfig, PaymentConfig};
use movequote::error::AppError;
use movequote::marketplace::{
    AssignmentId, Collaborators, CompanyId, CompanyStatus, ContactSubmission, Credits,
    LeadReceipt, LeadSubmission, Marketplace, MarketplaceSettings, MarketplaceStores, MemoryStore,
    PartnerRegistration, PricingRuleDraft, PropertySize, RevealError, ServiceFlags, ServiceKind,
    UserId,
};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Credits granted when the demo company is approved
    #[arg(long, default_value_t = 10)]
    pub(crate) welcome_credits: Credits,
    /// Flat reveal price set by the demo pricing rule
    #[arg(long, default_value_t = 7)]
    pub(crate) reveal_price: Credits,
    /// Print the closing ledger as CSV instead of a table
    #[arg(long)]
    pub(crate) csv: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            welcome_credits: 10,
            reveal_price: 7,
            csv: false,
        }
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        welcome_credits,
        reveal_price,
        csv,
    } = args;

    let notifier = Arc::new(OutboxNotifier::from_config(&EmailConfig {
        api_key: None,
        from_address: "no-reply@movequote.local".to_string(),
    }));
    let market = Marketplace::new(
        MarketplaceStores::in_memory(Arc::new(MemoryStore::new())),
        Collaborators {
            identity: Arc::new(InMemoryIdentityProvider::from_config(&AuthConfig::default())),
            notifier: notifier.clone(),
            payments: Arc::new(HostedCheckoutGateway::from_config(&PaymentConfig::default())),
        },
        MarketplaceSettings {
            welcome_credits,
            ..MarketplaceSettings::default()
        },
    );
    let admin = UserId::from("demo-admin");
    let now = Utc::now();

    println!("MoveQuote credit demo");

    let company = market
        .partners
        .register(demo_registration(), now)
        .map_err(AppError::service)?;
    let change = market
        .lifecycle
        .set_status(&admin, &company.id, CompanyStatus::Approved, now)
        .map_err(AppError::service)?;
    println!(
        "- {} approved (welcome credits: {:?}, email sent: {})",
        change.company.name, change.welcome_credits, change.email_sent
    );

    let rule = market
        .pricing
        .create(&admin, flat_rule(reveal_price), now)
        .map_err(AppError::service)?;
    market
        .pricing
        .activate(&admin, &rule.id, now)
        .map_err(AppError::service)?;
    println!("- pricing rule '{}' active at {} credits", rule.name, reveal_price);

    let first = submit(&market, "M1 4BT", &company.id)?;
    let second = submit(&market, "M14 5RG", &company.id)?;
    print_balance(&market, &company.id, "opening balance")?;

    match market.reveals.reveal_lead(&company.id, &first, now) {
        Ok(revealed) => println!(
            "- revealed {} for {} credits: {} <{}>",
            revealed.lead.origin_postcode,
            revealed.price,
            revealed.contact.name,
            revealed.contact.email
        ),
        Err(err) => println!("- first reveal refused: {err}"),
    }

    match market.reveals.reveal_lead(&company.id, &second, now) {
        Ok(revealed) => println!(
            "- revealed {} for {} credits",
            revealed.lead.origin_postcode, revealed.price
        ),
        Err(err @ RevealError::InsufficientBalance { .. }) => {
            println!("- second reveal refused: {err}")
        }
        Err(err) => return Err(AppError::service(err)),
    }

    match market.reveals.refund_reveal(&admin, &first, now) {
        Ok(outcome) => println!(
            "- admin refunded {} credits; assignment back to {}",
            outcome.refunded,
            outcome.assignment.status.label()
        ),
        Err(err) => println!("- refund skipped: {err}"),
    }
    print_balance(&market, &company.id, "closing balance")?;

    println!("\nLedger for {}", company.name);
    if csv {
        market
            .ledger
            .write_statement(&company.id, std::io::stdout())
            .map_err(AppError::service)?;
    } else {
        let rows = market
            .ledger
            .history(&company.id)
            .map_err(AppError::service)?;
        println!("{:<17} {:<11} {:>6} {:>8}  description", "date", "reason", "delta", "balance");
        for row in rows {
            println!(
                "{:<17} {:<11} {:>+6} {:>8}  {}",
                row.created_at.format("%Y-%m-%d %H:%M"),
                row.reason.label(),
                row.delta,
                row.balance_after,
                row.description.as_deref().unwrap_or("-")
            );
        }
    }

    let outbox = notifier.sent();
    println!("\n{} email(s) queued", outbox.len());
    for email in outbox {
        println!("  - [{:?}] {}", email.channel, email.subject);
    }
    Ok(())
}

fn demo_registration() -> PartnerRegistration {
    PartnerRegistration {
        company_name: "Mancunian Movers".to_string(),
        contact_name: "Jo Swift".to_string(),
        contact_email: "ops@mancunian-movers.example".to_string(),
        contact_phone: "0161 496 0123".to_string(),
        services: vec![ServiceKind::HomeRemovals, ServiceKind::Packing],
        accreditations: vec!["BAR".to_string()],
        coverage: vec!["M".to_string()],
    }
}

fn flat_rule(price: Credits) -> PricingRuleDraft {
    PricingRuleDraft {
        name: "Demo flat rate".to_string(),
        base_price: price,
        property_size_modifiers: Default::default(),
        distance_band_modifiers: Default::default(),
        short_notice_days: 0,
        short_notice_surcharge: 0,
    }
}

fn submit(
    market: &Marketplace,
    origin: &str,
    company: &CompanyId,
) -> Result<AssignmentId, AppError> {
    let receipt: LeadReceipt = market
        .intake
        .submit(
            LeadSubmission {
                origin_postcode: origin.to_string(),
                destination_postcode: "LS6 2AB".to_string(),
                move_date: Utc::now().date_naive() + Duration::days(30),
                property_size: PropertySize::ThreeBed,
                services: ServiceFlags::default(),
                distance_miles: Some(45),
                notes: None,
                contact: ContactSubmission {
                    name: "Sam Homeowner".to_string(),
                    email: "sam@home.example".to_string(),
                    phone: "07700 900456".to_string(),
                },
                consent: true,
            },
            Utc::now(),
        )
        .map_err(AppError::service)?;
    println!("- lead from {origin} matched {} company(ies)", receipt.matched);
    receipt
        .assignments
        .into_iter()
        .find(|assignment| &assignment.company_id == company)
        .map(|assignment| assignment.id)
        .ok_or_else(|| AppError::service(RevealError::AssignmentNotFound))
}

fn print_balance(market: &Marketplace, company: &CompanyId, label: &str) -> Result<(), AppError> {
    let balance = market.ledger.balance(company).map_err(AppError::service)?;
    println!("- {label}: {balance} credits");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_with_defaults() {
        run_demo(DemoArgs::default()).expect("demo completes");
    }

    #[test]
    fn demo_can_print_csv() {
        run_demo(DemoArgs {
            welcome_credits: 3,
            reveal_price: 2,
            csv: true,
        })
        .expect("demo completes");
    }
}
