use std::collections::HashSet;

/// Lowercased words of a free-text question
pub fn question_words(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

fn name_tokens(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Columns the question plausibly talks about, in dataset order, each at most once.
/// A column matches when its whole name is inside the question or one of its name tokens is a question word.
pub fn resolve_columns(question: &str, column_names: &[&str]) -> Vec<String> {
    let q = question.to_lowercase();
    let words: HashSet<String> = question_words(question).into_iter().collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut resolved = Vec::new();
    for name in column_names {
        let lname = name.to_lowercase();
        let by_name = !lname.is_empty() && q.contains(&lname);
        let by_token = name_tokens(name).iter().any(|t| words.contains(t));
        if (by_name || by_token) && seen.insert(name) {
            resolved.push(name.to_string());
        }
    }

    crate::debug_note!("resolved columns for '{}': {:?}", question, resolved);
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_whole_names_and_tokens() {
        let cols = ["price", "category", "unit_cost", "Order-Date"];
        let r = resolve_columns("what's the average price grouped by category", &cols);
        assert_eq!(r, vec!["price".to_string(), "category".to_string()]);

        let r = resolve_columns("Does COST relate to the order date?", &cols);
        assert_eq!(r, vec!["unit_cost".to_string(), "Order-Date".to_string()]);
    }

    #[test]
    fn keeps_dataset_order_without_duplicates() {
        let cols = ["b", "price_b", "price"];
        let r = resolve_columns("price price b", &cols);
        assert_eq!(r, vec!["b".to_string(), "price_b".to_string(), "price".to_string()]);
    }

    #[test]
    fn tokens_match_whole_words_only() {
        let cols = ["age"];
        assert!(resolve_columns("show the pages", &["rate"]).is_empty());
        // substring of the full name still counts
        assert_eq!(resolve_columns("average", &cols), vec!["age".to_string()]);
    }
}
