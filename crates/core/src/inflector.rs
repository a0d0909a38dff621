//! Inflection helpers
//!
//! Model type names are singular camelCase (`blogPost`), record store
//! collections are their plural (`blogPosts`), and foreign keys are
//! camelized association keys with an `Id`/`Ids` suffix.
//!
//! Pluralization rules only touch the last word of a camelCase identifier,
//! so `blogCategory` becomes `blogCategories`.

use heck::ToLowerCamelCase;

// ============================================================================
// Irregular Forms
// ============================================================================

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("foot", "feet"),
    ("tooth", "teeth"),
    ("goose", "geese"),
    ("mouse", "mice"),
];

const UNCOUNTABLE: &[&str] = &[
    "equipment",
    "information",
    "series",
    "species",
    "sheep",
    "fish",
];

// ============================================================================
// Public Helpers
// ============================================================================

/// Convert a key to lowerCamelCase
///
/// - "blog_post" -> "blogPost"
/// - "BlogPost" -> "blogPost"
/// - "author" -> "author"
pub fn camelize(s: &str) -> String {
    s.to_lower_camel_case()
}

/// Capitalize the first letter of a string
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().chain(chars).collect(),
    }
}

/// Simple English pluralization of the last camelCase word
pub fn pluralize(s: &str) -> String {
    let (prefix, word) = split_last_word(s);
    if word.is_empty() {
        return s.to_string();
    }
    let lower = word.to_lowercase();
    let capitalized = word.chars().next().is_some_and(char::is_uppercase);

    let plural = if UNCOUNTABLE.contains(&lower.as_str()) {
        lower
    } else if let Some((_, plural)) = IRREGULAR.iter().find(|(single, _)| *single == lower) {
        plural.to_string()
    } else {
        pluralize_word(&lower)
    };

    join_word(prefix, &plural, capitalized)
}

/// Simple English singularization of the last camelCase word
pub fn singularize(s: &str) -> String {
    let (prefix, word) = split_last_word(s);
    if word.is_empty() {
        return s.to_string();
    }
    let lower = word.to_lowercase();
    let capitalized = word.chars().next().is_some_and(char::is_uppercase);

    let single = if UNCOUNTABLE.contains(&lower.as_str()) {
        lower
    } else if let Some((single, _)) = IRREGULAR.iter().find(|(_, plural)| *plural == lower) {
        single.to_string()
    } else {
        singularize_word(&lower)
    };

    join_word(prefix, &single, capitalized)
}

// ============================================================================
// Word Rules
// ============================================================================

fn pluralize_word(s: &str) -> String {
    // Handle words ending in 's', 'x', 'z', 'ch', 'sh'
    if s.ends_with('s')
        || s.ends_with('x')
        || s.ends_with('z')
        || s.ends_with("ch")
        || s.ends_with("sh")
    {
        return format!("{}es", s);
    }

    // Handle words ending in consonant + 'y'
    if let Some(stem) = s.strip_suffix('y') {
        if stem.chars().last().is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{}ies", stem);
        }
    }

    // Handle words ending in 'f' or 'fe'
    if let Some(stem) = s.strip_suffix("fe") {
        return format!("{}ves", stem);
    }
    if let Some(stem) = s.strip_suffix('f') {
        return format!("{}ves", stem);
    }

    format!("{}s", s)
}

fn singularize_word(s: &str) -> String {
    if s.ends_with("ss") || s.ends_with("us") || s.ends_with("is") {
        return s.to_string();
    }
    if let Some(stem) = s.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{}y", stem);
        }
    }
    if let Some(stem) = s.strip_suffix("ives") {
        return format!("{}ife", stem);
    }
    if let Some(stem) = s.strip_suffix("ves") {
        return format!("{}f", stem);
    }
    if s.ends_with("ouses") {
        return s[..s.len() - 1].to_string();
    }
    if s.ends_with("sses")
        || s.ends_with("uses")
        || s.ends_with("xes")
        || s.ends_with("zzes")
        || s.ends_with("ches")
        || s.ends_with("shes")
    {
        return s[..s.len() - 2].to_string();
    }
    if let Some(stem) = s.strip_suffix('s') {
        return stem.to_string();
    }
    s.to_string()
}

/// Split a camelCase identifier into everything before its last word and
/// the last word itself
fn split_last_word(s: &str) -> (&str, &str) {
    let boundary = s
        .char_indices()
        .filter(|(i, c)| *i > 0 && c.is_uppercase())
        .map(|(i, _)| i)
        .last()
        .unwrap_or(0);
    s.split_at(boundary)
}

fn join_word(prefix: &str, word: &str, capitalized: bool) -> String {
    if capitalized {
        format!("{}{}", prefix, capitalize(word))
    } else {
        format!("{}{}", prefix, word)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camelize() {
        assert_eq!(camelize("blog_post"), "blogPost");
        assert_eq!(camelize("BlogPost"), "blogPost");
        assert_eq!(camelize("blogPost"), "blogPost");
        assert_eq!(camelize("author"), "author");
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("user"), "users");
        assert_eq!(pluralize("post"), "posts");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("bus"), "buses");
        assert_eq!(pluralize("leaf"), "leaves");
        assert_eq!(pluralize("person"), "people");
        assert_eq!(pluralize("child"), "children");
        assert_eq!(pluralize("day"), "days");
    }

    #[test]
    fn test_pluralize_camel_case() {
        assert_eq!(pluralize("blogPost"), "blogPosts");
        assert_eq!(pluralize("blogCategory"), "blogCategories");
        assert_eq!(pluralize("salesPerson"), "salesPeople");
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("buses"), "bus");
        assert_eq!(singularize("classes"), "class");
        assert_eq!(singularize("houses"), "house");
        assert_eq!(singularize("courses"), "course");
        assert_eq!(singularize("leaves"), "leaf");
        assert_eq!(singularize("wives"), "wife");
        assert_eq!(singularize("people"), "person");
        assert_eq!(singularize("children"), "child");
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("author"), "author");
    }

    #[test]
    fn test_singularize_camel_case() {
        assert_eq!(singularize("blogPosts"), "blogPost");
        assert_eq!(singularize("authoredBooks"), "authoredBook");
        assert_eq!(singularize("homeAddresses"), "homeAddress");
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("user"), "User");
        assert_eq!(capitalize(""), "");
    }
}
