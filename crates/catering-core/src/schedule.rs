//! # Payment Schedule
//!
//! Converts an invoice total, a customer classification and the event date
//! into ordered payment milestones.
//!
//! ## Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Class    Lead time (approval → event)   Milestones                     │
//! │  ───────  ─────────────────────────────  ────────────────────────────   │
//! │  GOV      any                            final 100%  NET_30_AFTER_EVENT │
//! │  any      < 14 days                      full 100%   NOW                │
//! │  any      deposit waived                 balance 100%  event − 7d       │
//! │  PERSON   ≥ 14 days                      deposit 30% NOW                │
//! │                                          balance 70% event − 7d         │
//! │  COMPANY  14..60 days                    combined 50% NOW               │
//! │                                          balance 50% event − 7d         │
//! │  COMPANY  ≥ 60 days                      deposit 25% NOW                │
//! │                                          milestone 25% event − 30d      │
//! │                                          balance 50% event − 7d         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A computed due date on or before the approval date collapses to `NOW`.
//!
//! ## Amounts
//! Each milestone amount is rounded independently from its percentage; the
//! final milestone takes whatever remains so the amounts always sum to the
//! total exactly.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Customer Classification
// =============================================================================

/// Who is paying, which decides the milestone policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomerClass {
    Person,
    Company,
    Gov,
}

impl CustomerClass {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CustomerClass::Person => "PERSON",
            CustomerClass::Company => "COMPANY",
            CustomerClass::Gov => "GOV",
        }
    }
}

impl fmt::Display for CustomerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consumer mail providers; addresses on these domains are individuals.
const PERSONAL_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "live.com",
    "msn.com",
    "icloud.com",
    "me.com",
    "aol.com",
    "protonmail.com",
    "proton.me",
    "comcast.net",
    "att.net",
];

/// Classifies a customer.
///
/// An explicit government-contract flag always wins: `Some(true)` is GOV,
/// `Some(false)` is never GOV even on a `.gov` address.
///
/// ```rust
/// use catering_core::schedule::{classify_customer, CustomerClass};
///
/// assert_eq!(classify_customer(Some("pat@parks.state.tx.us"), None), CustomerClass::Gov);
/// assert_eq!(classify_customer(Some("pat@gmail.com"), None), CustomerClass::Person);
/// assert_eq!(classify_customer(Some("pat@acme.io"), None), CustomerClass::Company);
/// assert_eq!(classify_customer(Some("pat@gmail.com"), Some(true)), CustomerClass::Gov);
/// ```
pub fn classify_customer(email: Option<&str>, explicit_government: Option<bool>) -> CustomerClass {
    let domain = email
        .and_then(|e| e.trim().rsplit_once('@'))
        .map(|(_, domain)| domain.trim_end_matches('.').to_ascii_lowercase());

    if explicit_government == Some(true) {
        return CustomerClass::Gov;
    }

    let Some(domain) = domain.filter(|d| !d.is_empty()) else {
        return CustomerClass::Person;
    };

    if explicit_government.is_none() && is_government_domain(&domain) {
        return CustomerClass::Gov;
    }

    if PERSONAL_DOMAINS.contains(&domain.as_str()) {
        CustomerClass::Person
    } else {
        CustomerClass::Company
    }
}

fn is_government_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    match labels.as_slice() {
        [.., "gov"] | [.., "mil"] => true,
        // agency.gov.uk, defence.gov.au
        [.., "gov", cc] if cc.len() == 2 => true,
        // parks.state.tx.us
        [.., "state", st, "us"] if st.len() == 2 => true,
        _ => false,
    }
}

// =============================================================================
// Milestone Rules
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneType {
    Deposit,
    /// Deposit and first progress payment collected together.
    Combined,
    Milestone,
    Balance,
    /// Single payment collected at approval.
    Full,
    /// Single payment collected after the event.
    Final,
}

impl MilestoneType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MilestoneType::Deposit => "deposit",
            MilestoneType::Combined => "combined",
            MilestoneType::Milestone => "milestone",
            MilestoneType::Balance => "balance",
            MilestoneType::Full => "full",
            MilestoneType::Final => "final",
        }
    }
}

/// When a milestone falls due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "policy")]
pub enum DueDatePolicy {
    #[serde(rename = "NOW")]
    Now,
    #[serde(rename = "ON_DATE")]
    OnDate {
        #[ts(as = "String")]
        date: NaiveDate,
    },
    #[serde(rename = "NET_30_AFTER_EVENT")]
    Net30AfterEvent,
}

impl DueDatePolicy {
    /// Calendar date this policy resolves to.
    pub fn resolve(&self, approval_date: NaiveDate, event_date: NaiveDate) -> NaiveDate {
        match self {
            DueDatePolicy::Now => approval_date,
            DueDatePolicy::OnDate { date } => *date,
            DueDatePolicy::Net30AfterEvent => event_date
                .checked_add_days(Days::new(30))
                .unwrap_or(event_date),
        }
    }
}

/// One entry of a schedule, before amounts are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MilestoneRule {
    pub milestone_type: MilestoneType,
    pub percentage: u32,
    pub due: DueDatePolicy,
}

impl MilestoneRule {
    fn new(milestone_type: MilestoneType, percentage: u32, due: DueDatePolicy) -> Self {
        MilestoneRule {
            milestone_type,
            percentage,
            due,
        }
    }
}

// =============================================================================
// Policy
// =============================================================================

/// Tunable thresholds of the schedule policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulePolicy {
    /// Below this lead time everything is due at approval.
    pub near_term_days: i64,
    /// Companies with at least this lead time get a three-part schedule.
    pub long_lead_days: i64,
    /// Balance is due this many days before the event.
    pub balance_days_before_event: u64,
    /// Progress milestone is due this many days before the event.
    pub milestone_days_before_event: u64,
    pub person_deposit_percent: u32,
    pub company_deposit_percent: u32,
    pub company_milestone_percent: u32,
    pub company_combined_percent: u32,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        SchedulePolicy {
            near_term_days: 14,
            long_lead_days: 60,
            balance_days_before_event: 7,
            milestone_days_before_event: 30,
            person_deposit_percent: 30,
            company_deposit_percent: 25,
            company_milestone_percent: 25,
            company_combined_percent: 50,
        }
    }
}

/// Facts a schedule is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleInput {
    pub event_date: NaiveDate,
    pub approval_date: NaiveDate,
    pub customer: CustomerClass,
    pub deposit_required: bool,
}

impl ScheduleInput {
    pub fn lead_days(&self) -> i64 {
        (self.event_date - self.approval_date).num_days()
    }
}

/// Builds milestone rules from a [`SchedulePolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentScheduleBuilder {
    policy: SchedulePolicy,
}

impl PaymentScheduleBuilder {
    pub fn new(policy: SchedulePolicy) -> Self {
        PaymentScheduleBuilder { policy }
    }

    pub fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }

    /// Ordered milestone rules; percentages always sum to 100.
    pub fn build(&self, input: &ScheduleInput) -> Vec<MilestoneRule> {
        use MilestoneType::*;
        let p = &self.policy;

        if input.customer == CustomerClass::Gov {
            return vec![MilestoneRule::new(Final, 100, DueDatePolicy::Net30AfterEvent)];
        }

        let lead = input.lead_days();
        if lead < p.near_term_days {
            return vec![MilestoneRule::new(Full, 100, DueDatePolicy::Now)];
        }

        let balance_due = self.before_event(input, p.balance_days_before_event);
        if !input.deposit_required {
            return vec![MilestoneRule::new(Balance, 100, balance_due)];
        }

        match input.customer {
            CustomerClass::Company if lead >= p.long_lead_days => {
                let milestone_due = self.before_event(input, p.milestone_days_before_event);
                let balance = 100 - p.company_deposit_percent - p.company_milestone_percent;
                vec![
                    MilestoneRule::new(Deposit, p.company_deposit_percent, DueDatePolicy::Now),
                    MilestoneRule::new(Milestone, p.company_milestone_percent, milestone_due),
                    MilestoneRule::new(Balance, balance, balance_due),
                ]
            }
            CustomerClass::Company => vec![
                MilestoneRule::new(Combined, p.company_combined_percent, DueDatePolicy::Now),
                MilestoneRule::new(Balance, 100 - p.company_combined_percent, balance_due),
            ],
            _ => vec![
                MilestoneRule::new(Deposit, p.person_deposit_percent, DueDatePolicy::Now),
                MilestoneRule::new(Balance, 100 - p.person_deposit_percent, balance_due),
            ],
        }
    }

    fn before_event(&self, input: &ScheduleInput, days: u64) -> DueDatePolicy {
        match input.event_date.checked_sub_days(Days::new(days)) {
            Some(date) if date > input.approval_date => DueDatePolicy::OnDate { date },
            _ => DueDatePolicy::Now,
        }
    }
}

// =============================================================================
// Amounts
// =============================================================================

/// A milestone with its amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentMilestone {
    /// 1-based position in the schedule.
    pub sequence: u32,
    pub milestone_type: MilestoneType,
    pub percentage: u32,
    pub amount: Money,
    pub due: DueDatePolicy,
}

/// Converts rules into amounts that sum to `total` exactly.
///
/// ```rust
/// use catering_core::money::Money;
/// use catering_core::schedule::*;
///
/// let rules = PaymentScheduleBuilder::default().build(&ScheduleInput {
///     event_date: chrono::NaiveDate::from_ymd_opt(2030, 9, 1).unwrap(),
///     approval_date: chrono::NaiveDate::from_ymd_opt(2030, 6, 1).unwrap(),
///     customer: CustomerClass::Person,
///     deposit_required: true,
/// });
/// let milestones = calculate_payment_amounts(Money::from_cents(100_000), &rules).unwrap();
/// let amounts: Vec<i64> = milestones.iter().map(|m| m.amount.cents()).collect();
/// assert_eq!(amounts, vec![30_000, 70_000]);
/// ```
pub fn calculate_payment_amounts(
    total: Money,
    rules: &[MilestoneRule],
) -> CoreResult<Vec<PaymentMilestone>> {
    if rules.is_empty() {
        return Err(CoreError::InvalidSchedule {
            reason: "schedule has no milestones".to_string(),
        });
    }
    let percent_sum: u32 = rules.iter().map(|r| r.percentage).sum();
    if percent_sum != 100 {
        return Err(CoreError::InvalidSchedule {
            reason: format!("percentages sum to {}, expected 100", percent_sum),
        });
    }
    if total.is_negative() {
        return Err(CoreError::InvalidAmount {
            reason: format!("cannot schedule a negative total ({})", total),
        });
    }

    let last = rules.len() - 1;
    let mut allocated = Money::zero();
    let mut milestones = Vec::with_capacity(rules.len());

    for (i, rule) in rules.iter().enumerate() {
        let amount = if i == last {
            total - allocated
        } else {
            total.percent(rule.percentage)
        };
        allocated += amount;
        milestones.push(PaymentMilestone {
            sequence: i as u32 + 1,
            milestone_type: rule.milestone_type,
            percentage: rule.percentage,
            amount,
            due: rule.due,
        });
    }

    Ok(milestones)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn input(customer: CustomerClass, lead_days: u64) -> ScheduleInput {
        let approval_date = date(2030, 1, 1);
        ScheduleInput {
            event_date: approval_date.checked_add_days(Days::new(lead_days)).unwrap(),
            approval_date,
            customer,
            deposit_required: true,
        }
    }

    fn types(rules: &[MilestoneRule]) -> Vec<MilestoneType> {
        rules.iter().map(|r| r.milestone_type).collect()
    }

    #[test]
    fn test_person_schedule() {
        let rules = PaymentScheduleBuilder::default().build(&input(CustomerClass::Person, 30));
        assert_eq!(types(&rules), vec![MilestoneType::Deposit, MilestoneType::Balance]);
        assert_eq!(rules[0].due, DueDatePolicy::Now);
        assert_eq!(rules[1].due, DueDatePolicy::OnDate { date: date(2030, 1, 24) });

        let milestones = calculate_payment_amounts(Money::from_cents(100_000), &rules).unwrap();
        assert_eq!(milestones[0].amount.cents(), 30_000);
        assert_eq!(milestones[1].amount.cents(), 70_000);
    }

    #[test]
    fn test_government_schedule() {
        let rules = PaymentScheduleBuilder::default().build(&input(CustomerClass::Gov, 5));
        let milestones = calculate_payment_amounts(Money::from_cents(50_000), &rules).unwrap();
        assert_eq!(milestones.len(), 1);
        assert_eq!(milestones[0].milestone_type, MilestoneType::Final);
        assert_eq!(milestones[0].amount.cents(), 50_000);
        assert_eq!(milestones[0].due, DueDatePolicy::Net30AfterEvent);
        assert_eq!(
            milestones[0].due.resolve(date(2030, 1, 1), date(2030, 1, 6)),
            date(2030, 2, 5)
        );
    }

    #[test]
    fn test_near_term_collapses_to_full_payment() {
        for class in [CustomerClass::Person, CustomerClass::Company] {
            let rules = PaymentScheduleBuilder::default().build(&input(class, 10));
            assert_eq!(types(&rules), vec![MilestoneType::Full]);
        }
    }

    #[test]
    fn test_company_schedules_by_lead_time() {
        let builder = PaymentScheduleBuilder::default();
        let short = builder.build(&input(CustomerClass::Company, 30));
        assert_eq!(types(&short), vec![MilestoneType::Combined, MilestoneType::Balance]);

        let long = builder.build(&input(CustomerClass::Company, 90));
        assert_eq!(
            types(&long),
            vec![MilestoneType::Deposit, MilestoneType::Milestone, MilestoneType::Balance]
        );
        assert_eq!(long.iter().map(|r| r.percentage).sum::<u32>(), 100);
    }

    #[test]
    fn test_waived_deposit() {
        let mut i = input(CustomerClass::Person, 30);
        i.deposit_required = false;
        let rules = PaymentScheduleBuilder::default().build(&i);
        assert_eq!(types(&rules), vec![MilestoneType::Balance]);
        assert_eq!(rules[0].percentage, 100);
    }

    #[test]
    fn test_remainder_goes_to_last_milestone() {
        let rules = PaymentScheduleBuilder::default().build(&input(CustomerClass::Company, 90));
        for cents in [1, 3, 99_999, 100_001, 123_457] {
            let total = Money::from_cents(cents);
            let milestones = calculate_payment_amounts(total, &rules).unwrap();
            let sum: Money = milestones.iter().map(|m| m.amount).sum();
            assert_eq!(sum, total, "total {}", cents);
        }
    }

    #[test]
    fn test_invalid_rules_rejected() {
        let rules = vec![MilestoneRule::new(MilestoneType::Deposit, 40, DueDatePolicy::Now)];
        assert!(matches!(
            calculate_payment_amounts(Money::from_cents(100), &rules),
            Err(CoreError::InvalidSchedule { .. })
        ));
        assert!(calculate_payment_amounts(Money::from_cents(100), &[]).is_err());
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify_customer(None, None), CustomerClass::Person);
        assert_eq!(classify_customer(Some("a@army.mil"), None), CustomerClass::Gov);
        assert_eq!(classify_customer(Some("a@council.gov.uk"), None), CustomerClass::Gov);
        assert_eq!(classify_customer(Some("a@city.gov"), Some(false)), CustomerClass::Company);
        assert_eq!(classify_customer(Some("a@Yahoo.com"), None), CustomerClass::Person);
        assert_eq!(classify_customer(Some("a@governance.io"), None), CustomerClass::Company);
    }

    #[test]
    fn test_due_policy_json() {
        let json = serde_json::to_string(&DueDatePolicy::Net30AfterEvent).unwrap();
        assert_eq!(json, r#"{"policy":"NET_30_AFTER_EVENT"}"#);
        let json = serde_json::to_string(&CustomerClass::Company).unwrap();
        assert_eq!(json, r#""COMPANY""#);
    }
}
