//! Prompt strategy selection: attempt index → template + generation parameters.
//!
//! A fixed three-row escalation table. Each retry is stricter and cooler than
//! the one before it, trading verbosity for a better chance of complete JSON.
//! There is no row past the third: the attempt budget is finite.

use serde::Serialize;

use super::prompt_templates::PromptStrategyKind;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Complete generation strategy for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PromptStrategy {
    /// Which prompt template to use.
    pub kind: PromptStrategyKind,
    /// Sampling temperature.
    pub temperature: f32,
    /// Max tokens the backend may generate.
    pub max_output_tokens: u32,
    /// Evidence spans per entry the prompt asks for.
    pub max_spans_per_entry: usize,
}

/// Number of rows in the escalation table; the hard ceiling on backend calls.
pub const ATTEMPT_BUDGET: u32 = 3;

const ESCALATION: [PromptStrategy; ATTEMPT_BUDGET as usize] = [
    PromptStrategy {
        kind: PromptStrategyKind::Contract,
        temperature: 0.2,
        max_output_tokens: 4096,
        max_spans_per_entry: 5,
    },
    PromptStrategy {
        kind: PromptStrategyKind::Strict,
        temperature: 0.1,
        max_output_tokens: 4096,
        max_spans_per_entry: 2,
    },
    PromptStrategy {
        kind: PromptStrategyKind::StrictCapped,
        temperature: 0.0,
        max_output_tokens: 4096,
        max_spans_per_entry: 1,
    },
];

// ═══════════════════════════════════════════════════════════
// Strategy resolution
// ═══════════════════════════════════════════════════════════

/// Strategy for a 1-based attempt index, or `None` past the table.
///
/// Pure function: no I/O, no side effects.
pub fn strategy_for(attempt: u32) -> Option<PromptStrategy> {
    let idx = usize::try_from(attempt.checked_sub(1)?).ok()?;
    ESCALATION.get(idx).copied()
}

/// Clamp a requested attempt budget into `1..=ATTEMPT_BUDGET`.
pub fn clamp_attempts(requested: u32) -> u32 {
    requested.clamp(1, ATTEMPT_BUDGET)
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_uses_contract_at_baseline() {
        let s = strategy_for(1).unwrap();
        assert_eq!(s.kind, PromptStrategyKind::Contract);
        assert_eq!(s.temperature, 0.2);
    }

    #[test]
    fn second_attempt_is_strict_and_cooler() {
        let first = strategy_for(1).unwrap();
        let s = strategy_for(2).unwrap();
        assert_eq!(s.kind, PromptStrategyKind::Strict);
        assert!(s.temperature < first.temperature);
        assert!(s.max_spans_per_entry < first.max_spans_per_entry);
    }

    #[test]
    fn third_attempt_caps_spans_at_lowest_temperature() {
        let s = strategy_for(3).unwrap();
        assert_eq!(s.kind, PromptStrategyKind::StrictCapped);
        assert_eq!(s.temperature, 0.0);
        let lowest = (1..=3)
            .filter_map(strategy_for)
            .map(|s| s.temperature)
            .fold(f32::INFINITY, f32::min);
        assert_eq!(s.temperature, lowest);
        assert_eq!(s.max_spans_per_entry, 1);
    }

    #[test]
    fn table_is_finite() {
        assert!(strategy_for(0).is_none());
        assert!(strategy_for(4).is_none());
        assert!(strategy_for(u32::MAX).is_none());
    }

    #[test]
    fn table_is_deterministic() {
        for attempt in 1..=ATTEMPT_BUDGET {
            assert_eq!(strategy_for(attempt), strategy_for(attempt));
        }
    }

    #[test]
    fn clamp_attempts_bounds() {
        assert_eq!(clamp_attempts(0), 1);
        assert_eq!(clamp_attempts(2), 2);
        assert_eq!(clamp_attempts(10), ATTEMPT_BUDGET);
    }
}
