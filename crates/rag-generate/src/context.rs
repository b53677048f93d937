//! Character-budgeted context assembly.

use tracing::debug;

/// Placed between chunk texts in the assembled context.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Concatenate chunk texts in rank order under a character budget.
///
/// Each text is trimmed and empty ones are skipped. Texts are taken whole:
/// assembly stops at the first text that would push the total past
/// `max_chars`, so no partial chunk is emitted and later, smaller texts are
/// not used to fill the gap. The budget counts text characters only, not
/// separators.
pub fn assemble<S: AsRef<str>>(texts: &[S], max_chars: usize) -> String {
    select_within_budget(texts, max_chars).join(CONTEXT_SEPARATOR)
}

/// The trimmed texts [`assemble`] keeps, in rank order.
pub fn select_within_budget<S: AsRef<str>>(texts: &[S], max_chars: usize) -> Vec<&str> {
    let mut parts: Vec<&str> = Vec::new();
    let mut total = 0usize;

    for text in texts {
        let text = text.as_ref().trim();
        if text.is_empty() {
            continue;
        }

        let len = text.chars().count();
        if total + len > max_chars {
            debug!(
                used = parts.len(),
                total, max_chars, "Context budget reached"
            );
            break;
        }

        parts.push(text);
        total += len;
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_stops_at_overflow() {
        let a = "a".repeat(2000);
        let b = "b".repeat(2000);

        let context = assemble(&[a.clone(), b], 3500);
        assert_eq!(context, a);
    }

    #[test]
    fn test_first_chunk_too_big() {
        let big = "x".repeat(4000);
        assert_eq!(assemble(&[big.as_str(), "small"], 3500), "");
    }

    #[test]
    fn test_no_gap_filling() {
        let context = assemble(&["aaaa", "bbbbbbbb", "cc"], 10);
        assert_eq!(context, "aaaa");
    }

    #[test]
    fn test_rank_order_and_separator() {
        let context = assemble(&["  first  ", "", "   ", "second\n"], 100);
        assert_eq!(context, "first\n\nsecond");
    }

    #[test]
    fn test_budget_respected() {
        let texts = ["one two", "three", "four five six", "seven"];
        for max_chars in 0..40 {
            let context = assemble(&texts, max_chars);
            let used: usize = context
                .split(CONTEXT_SEPARATOR)
                .map(|p| p.chars().count())
                .sum();
            assert!(used <= max_chars);
        }
    }

    #[test]
    fn test_exact_fit() {
        assert_eq!(assemble(&["abc", "de"], 5), "abc\n\nde");
    }

    #[test]
    fn test_empty_input() {
        let texts: [&str; 0] = [];
        assert_eq!(assemble(&texts, 100), "");
    }

    #[test]
    fn test_selection_matches_assembly() {
        let texts = ["  kept one ", "kept two", "dropped by budget", "small"];

        let kept = select_within_budget(&texts, 20);
        assert_eq!(kept, vec!["kept one", "kept two"]);
        assert_eq!(kept.join(CONTEXT_SEPARATOR), assemble(&texts, 20));
    }

    #[test]
    fn test_selection_empty_when_first_too_big() {
        assert!(select_within_budget(&["toolong", "ok"], 3).is_empty());
    }
}
