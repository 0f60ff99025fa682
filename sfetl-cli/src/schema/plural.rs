//! Plural labels for new custom objects

/// English plural of an object label; only the last word changes
pub fn plural_label(label: &str) -> String {
    let label = label.trim_end();
    let Some(last) = label.split_whitespace().last() else {
        return label.to_string();
    };
    let stem = &label[..label.len() - last.len()];
    format!("{}{}", stem, pluralize_word(last))
}

fn pluralize_word(word: &str) -> String {
    let lower = word.to_lowercase();
    let second_last_is_consonant = lower
        .chars()
        .rev()
        .nth(1)
        .is_some_and(|c| c.is_ascii_alphabetic() && !"aeiou".contains(c));

    if ["s", "sh", "ch", "x", "z"].iter().any(|end| lower.ends_with(end)) {
        return format!("{}es", word);
    }

    if lower.ends_with('y') && second_last_is_consonant {
        return format!("{}ies", &word[..word.len() - 1]);
    }

    format!("{}s", word)
}
