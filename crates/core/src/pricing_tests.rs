// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn prices_match_kind() {
    assert_eq!(RunKind::Letter.price(), LETTER_PRICE);
    assert_eq!(RunKind::Research.price(), RESEARCH_PRICE);
}

#[test]
fn deep_research_model_clamps_to_medium() {
    assert_eq!(
        clamp_reasoning_effort("o4-mini-deep-research", ReasoningEffort::High),
        ReasoningEffort::Medium
    );
    assert_eq!(
        clamp_reasoning_effort("o4-mini-deep-research@2026-01-01", ReasoningEffort::Low),
        ReasoningEffort::Medium
    );
}

#[test]
fn deep_research_model_passes_medium_through() {
    assert_eq!(
        clamp_reasoning_effort("o4-mini-deep-research", ReasoningEffort::Medium),
        ReasoningEffort::Medium
    );
}

#[test]
fn other_models_are_not_clamped() {
    assert_eq!(
        clamp_reasoning_effort("gpt-5", ReasoningEffort::High),
        ReasoningEffort::High
    );
}
