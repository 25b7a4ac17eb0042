//! Resolves a rule's occurrence count into a concrete number of entries to generate.

/// The number of entries generated for an open-ended rule (occurrence count of zero).
///
/// This is an approximation of "forever". The ceiling is applied afresh every
/// time the rule is regenerated, counted from the regeneration point, and is
/// not tracked across regenerations. Nothing extends an open-ended rule in the
/// background, so the generated series only grows when the rule is edited.
pub const OPEN_ENDED_OCCURRENCE_CEILING: u32 = 200;

/// Resolve `occurrence_count` into the maximum number of entries a single
/// generation pass may produce.
///
/// Positive counts are returned unchanged, zero resolves to
/// [OPEN_ENDED_OCCURRENCE_CEILING].
pub fn resolve_occurrence_budget(occurrence_count: u32) -> u32 {
    if occurrence_count > 0 {
        occurrence_count
    } else {
        OPEN_ENDED_OCCURRENCE_CEILING
    }
}

#[cfg(test)]
mod tests {
    use super::{OPEN_ENDED_OCCURRENCE_CEILING, resolve_occurrence_budget};

    #[test]
    fn bounded_count_is_unchanged() {
        assert_eq!(resolve_occurrence_budget(24), 24);
    }

    #[test]
    fn zero_resolves_to_ceiling() {
        assert_eq!(resolve_occurrence_budget(0), OPEN_ENDED_OCCURRENCE_CEILING);
        assert_eq!(OPEN_ENDED_OCCURRENCE_CEILING, 200);
    }
}
