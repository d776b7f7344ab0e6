//! Deterministic, rule-based recommendations. This is the last stage of the pipeline and it always
//! produces something.

use crate::advice::context::{AdviceContext, Holiday, Importance};
use crate::advice::{AdviceStrategy, Proposal, Source};
use crate::model::RecommendationKind;
use crate::Result;
use chrono::NaiveDate;

/// Generic tips are appended until at least this many recommendations exist.
pub const MIN_RECOMMENDATIONS: usize = 3;

/// The local stage never returns more than this many recommendations.
pub const MAX_RECOMMENDATIONS: usize = 5;

/// A holiday closer than this many days gets more urgent wording.
pub const URGENT_DAYS: i64 = 14;

const BUDGET_TIP: &str = "Start by setting a monthly budget for your main spending categories and record \
    every expense so you can see where your money goes.";

const SAVINGS_TIP: &str = "Try to move a fixed share of your income, such as 10%, into savings as soon as \
    you are paid.";

const SUBSCRIPTION_TIP: &str = "Review your recurring subscriptions and cancel the ones you no longer use.";

/// Tips shown only to users who spend in a category whose name contains one of the keywords.
const GATED_TIPS: [(&[&str], &str); 4] = [
    (
        &["food", "dining", "restaurant", "grocer"],
        "Plan your meals for the week and cook at home more often to cut food costs.",
    ),
    (
        &["transport", "gas", "fuel", "commute"],
        "Combine errands into fewer trips or use public transport to lower transport costs.",
    ),
    (
        &["shopping"],
        "Wait 48 hours before any non-essential purchase to avoid impulse shopping.",
    ),
    (
        &["entertainment"],
        "Look for free or discounted events to keep entertainment spending in check.",
    ),
];

/// Produces the local recommendations for `context`:
/// 1. a budgeting starter tip when there is no spending history, otherwise a note about the
///    category with the highest total spend
/// 2. advice for the nearest holiday, if one is within the window
/// 3. while short of `MIN_RECOMMENDATIONS`: tips for categories the user spends in, then a savings
///    tip, then a subscription-review tip
///
/// The result is capped at `MAX_RECOMMENDATIONS`. Holiday advice is tagged `HolidayRelated`,
/// everything else `AiPersonalized`.
pub fn recommend(context: &AdviceContext) -> Vec<(RecommendationKind, String)> {
    let general = |s: String| (RecommendationKind::AiPersonalized, s);
    let mut out = Vec::new();
    match context.profile.top_category() {
        Some((name, total)) if context.profile.has_spending() => out.push(general(format!(
            "Your highest spending is in {name}, {} so far. Look for purchases there that you can \
            reduce or skip.",
            total.money()
        ))),
        _ => out.push(general(BUDGET_TIP.to_string())),
    }

    if let Some(holiday) = context.nearest_holiday() {
        out.extend(
            holiday_messages(holiday, context.today)
                .into_iter()
                .map(|m| (RecommendationKind::HolidayRelated, m)),
        );
    }

    if out.len() < MIN_RECOMMENDATIONS {
        let used: Vec<String> = context
            .profile
            .used_categories()
            .into_iter()
            .map(str::to_lowercase)
            .collect();
        for (keywords, tip) in GATED_TIPS {
            if out.len() >= MIN_RECOMMENDATIONS {
                break;
            }
            if used.iter().any(|c| keywords.iter().any(|k| c.contains(k))) {
                out.push(general(tip.to_string()));
            }
        }
    }
    for tip in [SAVINGS_TIP, SUBSCRIPTION_TIP] {
        if out.len() < MIN_RECOMMENDATIONS {
            out.push(general(tip.to_string()));
        }
    }

    out.truncate(MAX_RECOMMENDATIONS);
    out
}

/// Advice for an upcoming holiday: two messages for a major holiday, one for a minor one. Wording
/// tightens when the holiday is less than `URGENT_DAYS` away.
pub fn holiday_messages(holiday: &Holiday, today: NaiveDate) -> Vec<String> {
    let days = holiday.days_from(today);
    let name = &holiday.name;
    let when = match days {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        n => format!("in {n} days"),
    };
    let urgent = days < URGENT_DAYS;
    match (holiday.importance, urgent) {
        (Importance::Major, true) => vec![
            format!("{name} is {when}. Set a firm limit for gifts and celebrations now and stick to it."),
            format!("Buy what you still need for {name} early and compare prices before the last-minute rush."),
        ],
        (Importance::Major, false) => vec![
            format!("{name} is {when}. Start putting a little aside each week so the costs do not arrive all at once."),
            format!("Make a list of the gifts and travel you are planning for {name} and give it a budget."),
        ],
        (Importance::Minor, true) => {
            vec![format!("{name} is {when}. Keep any celebration spending modest.")]
        }
        (Importance::Minor, false) => vec![format!(
            "{name} is {when}. Consider setting a small budget for it."
        )],
    }
}

/// The local stage as a pipeline strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStrategy;

#[async_trait::async_trait]
impl AdviceStrategy for LocalStrategy {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn propose(&self, context: &AdviceContext) -> Result<Proposal> {
        Ok(proposal(context))
    }
}

/// `recommend` split into a `Proposal`, with holiday advice kept apart from the rest.
pub(crate) fn proposal(context: &AdviceContext) -> Proposal {
    let (holiday, general): (Vec<_>, Vec<_>) = recommend(context)
        .into_iter()
        .partition(|(kind, _)| *kind == RecommendationKind::HolidayRelated);
    Proposal::new(Source::Local, general.into_iter().map(|(_, m)| m).collect())
        .with_holiday(holiday.into_iter().map(|(_, m)| m).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::context::ProfileSnapshot;
    use crate::model::Amount;
    use std::collections::BTreeMap;
    use std::str::FromStr;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 1).unwrap()
    }

    fn profile(spending: &[(&str, &str)]) -> ProfileSnapshot {
        let month: BTreeMap<String, Amount> = spending
            .iter()
            .map(|(c, a)| (c.to_string(), Amount::from_str(a).unwrap()))
            .collect();
        let mut monthly_spending = BTreeMap::new();
        if !month.is_empty() {
            monthly_spending.insert("2024-11".to_string(), month);
        }
        ProfileSnapshot {
            region: "US".to_string(),
            monthly_income: Amount::ZERO,
            monthly_spending,
            budgets: BTreeMap::new(),
        }
    }

    fn texts(out: &[(RecommendationKind, String)]) -> Vec<&str> {
        out.iter().map(|(_, m)| m.as_str()).collect()
    }

    fn holiday(days: i64, importance: Importance) -> Holiday {
        Holiday::new("Christmas", today() + chrono::Duration::days(days), importance)
    }

    #[test]
    fn test_no_history_gives_budget_tip_and_fills_minimum() {
        let out = recommend(&AdviceContext::new(today(), profile(&[]), Vec::new()));
        assert_eq!(texts(&out), vec![BUDGET_TIP, SAVINGS_TIP, SUBSCRIPTION_TIP]);
        assert!(out
            .iter()
            .all(|(kind, _)| *kind == RecommendationKind::AiPersonalized));
    }

    #[test]
    fn test_top_category_and_gated_tips() {
        let out = recommend(&AdviceContext::new(
            today(),
            profile(&[("Dining Out", "120.00"), ("Housing", "1500.00"), ("Shopping", "80")]),
            Vec::new(),
        ));
        let out = texts(&out);
        assert_eq!(out.len(), MIN_RECOMMENDATIONS);
        assert!(out[0].contains("Housing"));
        assert!(out[0].contains("$1,500.00"));
        assert_eq!(out[1], GATED_TIPS[0].1);
        assert_eq!(out[2], GATED_TIPS[2].1);
    }

    #[test]
    fn test_unused_categories_get_no_tips() {
        let out = recommend(&AdviceContext::new(
            today(),
            profile(&[("Housing", "1500.00")]),
            Vec::new(),
        ));
        let out = texts(&out);
        assert_eq!(out[1], SAVINGS_TIP);
        assert_eq!(out[2], SUBSCRIPTION_TIP);
    }

    #[test]
    fn test_major_holiday_fills_minimum_without_tips() {
        let out = recommend(&AdviceContext::new(
            today(),
            profile(&[("Food", "10")]),
            vec![holiday(24, Importance::Major)],
        ));
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].0, RecommendationKind::AiPersonalized);
        assert_eq!(out[1].0, RecommendationKind::HolidayRelated);
        assert_eq!(out[2].0, RecommendationKind::HolidayRelated);
        assert!(out[1].1.contains("Christmas is in 24 days"));
        assert!(out[2].1.contains("Christmas"));
    }

    #[test]
    fn test_holiday_wording() {
        let urgent = holiday_messages(&holiday(5, Importance::Major), today());
        assert_eq!(urgent.len(), 2);
        assert!(urgent[0].contains("firm limit"));
        let relaxed = holiday_messages(&holiday(20, Importance::Major), today());
        assert!(relaxed[0].contains("little aside"));
        let minor = holiday_messages(&holiday(1, Importance::Minor), today());
        assert_eq!(minor, vec!["Christmas is tomorrow. Keep any celebration spending modest."]);
        let today_msg = holiday_messages(&holiday(0, Importance::Minor), today());
        assert!(today_msg[0].starts_with("Christmas is today."));
    }

    #[test]
    fn test_never_more_than_cap() {
        let context = AdviceContext::new(
            today(),
            profile(&[("Food", "1"), ("Transport", "1"), ("Shopping", "1"), ("Entertainment", "1")]),
            vec![holiday(3, Importance::Major)],
        );
        let out = recommend(&context);
        assert!(out.len() <= MAX_RECOMMENDATIONS);
        assert!(!out.is_empty());
    }

    #[tokio::test]
    async fn test_strategy_is_local() {
        let context = AdviceContext::new(today(), profile(&[]), Vec::new());
        let p = LocalStrategy.propose(&context).await.unwrap();
        assert_eq!(p.source, Source::Local);
        assert_eq!(p.messages.len(), 3);
        assert!(p.holiday.is_empty());

        let context = AdviceContext::new(
            today(),
            profile(&[("Food", "10")]),
            vec![holiday(5, Importance::Major)],
        );
        let p = LocalStrategy.propose(&context).await.unwrap();
        assert_eq!(p.messages.len(), 1);
        assert_eq!(p.holiday, holiday_messages(&holiday(5, Importance::Major), today()));
    }
}
