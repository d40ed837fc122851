//! Built-in rule catalog

use super::{DigitTransform, LookbackTransform, PairTransform, Rule, RuleKind};

/// Consecutive non-win events between drought sequence firings
const DROUGHT_EVERY: usize = 30;

/// Cumulative minute offsets from the last win for each drought sequence step
const DROUGHT_SEQUENCE: [i64; 7] = [35, 38, 41, 46, 49, 54, 57];

/// Direct drought thresholds, each predicting four minutes ahead
const DROUGHT_THRESHOLDS: [usize; 3] = [50, 60, 80];

pub fn default_rules() -> Vec<Rule> {
    let mut rules = vec![
        Rule::new(
            "win-mirrored-minute",
            RuleKind::DigitManipulation {
                transform: DigitTransform::Mirror,
            },
        ),
        Rule::new("win-plus-5", RuleKind::FixedOffset { minutes: 5 }),
        Rule::new("win-plus-10", RuleKind::FixedOffset { minutes: 10 }),
        Rule::new(
            "win-doubled-minute",
            RuleKind::DigitManipulation {
                transform: DigitTransform::Double,
            },
        ),
        Rule::new(
            "win-double-fold",
            RuleKind::DigitManipulation {
                transform: DigitTransform::Double,
            },
        ),
        Rule::new(
            "after-win-first-value",
            RuleKind::Lookback {
                count: 1,
                transform: LookbackTransform::Nth,
            },
        ),
        Rule::new(
            "after-win-two-sum",
            RuleKind::Lookback {
                count: 2,
                transform: LookbackTransform::Sum,
            },
        ),
        Rule::new(
            "after-win-second-value",
            RuleKind::Lookback {
                count: 2,
                transform: LookbackTransform::Nth,
            },
        ),
        Rule::new(
            "value-4-plus-4",
            RuleKind::ValueOffset {
                values: vec![4],
                minutes: 4,
            },
        ),
        Rule::new(
            "value-14-plus-5",
            RuleKind::ValueOffset {
                values: vec![14],
                minutes: 5,
            },
        ),
        Rule::new(
            "value-11-plus-3",
            RuleKind::ValueOffset {
                values: vec![11],
                minutes: 3,
            },
        ),
        Rule::new(
            "value-15-21-plus-10",
            RuleKind::ValueOffset {
                values: vec![15, 21],
                minutes: 10,
            },
        ),
        Rule::new(
            "pair-next-hour",
            RuleKind::Pair {
                transform: PairTransform::NextHour,
            },
        ),
        Rule::new(
            "pair-plus-14",
            RuleKind::Pair {
                transform: PairTransform::Offset(14),
            },
        ),
        Rule::new(
            "twins",
            RuleKind::Pair {
                transform: PairTransform::Twins(10),
            },
        ),
    ];

    rules.extend(DROUGHT_SEQUENCE.iter().enumerate().map(|(i, offset)| {
        Rule::new(
            format!("drought-seq-{}", i + 1),
            RuleKind::DroughtSequence {
                every: DROUGHT_EVERY,
                offset: *offset,
            },
        )
    }));

    rules.extend(DROUGHT_THRESHOLDS.iter().map(|count| {
        Rule::new(
            format!("drought-{}", count),
            RuleKind::CounterThreshold {
                count: *count,
                minutes: 4,
            },
        )
    }));

    rules
}
