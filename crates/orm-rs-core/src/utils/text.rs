//! String utility functions.
//!
//! Entity types name their tables and columns through a [`NamingScheme`]: the
//! class `ArticleCategory` becomes the table `article_category`, the attribute
//! `authorId` becomes the column `author_id`, and so on.

use serde::{Deserialize, Serialize};

/// A convention for turning class and attribute names into SQL names.
///
/// # Examples
///
/// ```
/// use orm_rs_core::utils::text::NamingScheme;
///
/// assert_eq!(NamingScheme::SnakeLower.apply("ArticleCategory"), "article_category");
/// assert_eq!(NamingScheme::CamelCase.apply("author_id"), "authorId");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingScheme {
    /// `article_category`
    #[default]
    SnakeLower,
    /// `ARTICLE_CATEGORY`
    SnakeUpper,
    /// `ArticleCategory`
    StudlyCaps,
    /// `articleCategory`
    CamelCase,
    /// `articlecategory`
    Lower,
    /// `ARTICLECATEGORY`
    Upper,
    /// The name is used unchanged.
    None,
}

impl NamingScheme {
    /// Converts `name` according to this scheme.
    pub fn apply(self, name: &str) -> String {
        match self {
            Self::None => name.to_string(),
            Self::Lower => split_words(name).concat().to_lowercase(),
            Self::Upper => split_words(name).concat().to_uppercase(),
            Self::SnakeLower => split_words(name).join("_").to_lowercase(),
            Self::SnakeUpper => split_words(name).join("_").to_uppercase(),
            Self::StudlyCaps => split_words(name)
                .iter()
                .map(|w| capfirst(&w.to_lowercase()))
                .collect(),
            Self::CamelCase => {
                let words = split_words(name);
                let mut out = String::with_capacity(name.len());
                for (i, word) in words.iter().enumerate() {
                    let lower = word.to_lowercase();
                    if i == 0 {
                        out.push_str(&lower);
                    } else {
                        out.push_str(&capfirst(&lower));
                    }
                }
                out
            }
        }
    }
}

/// Splits an identifier into words.
///
/// Underscores, hyphens and whitespace separate words, as does a change from
/// lower to upper case. A run of capitals followed by a lowercase letter ends
/// one character early, so `HTTPServer` splits into `HTTP` and `Server`.
///
/// # Examples
///
/// ```
/// use orm_rs_core::utils::text::split_words;
///
/// assert_eq!(split_words("articleId"), vec!["article", "Id"]);
/// assert_eq!(split_words("HTTPServer"), vec!["HTTP", "Server"]);
/// assert_eq!(split_words("parent_id"), vec!["parent", "id"]);
/// ```
pub fn split_words(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Capitalizes the first character of a string.
///
/// # Examples
///
/// ```
/// use orm_rs_core::utils::text::capfirst;
///
/// assert_eq!(capfirst("hello"), "Hello");
/// assert_eq!(capfirst(""), "");
/// ```
pub fn capfirst(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |c| {
        let mut result = c.to_uppercase().to_string();
        result.extend(chars);
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_words() {
        assert_eq!(split_words("Article"), vec!["Article"]);
        assert_eq!(split_words("ArticleCategory"), vec!["Article", "Category"]);
        assert_eq!(split_words("author_id"), vec!["author", "id"]);
        assert_eq!(split_words("  spaced  out "), vec!["spaced", "out"]);
        assert_eq!(split_words("page2Title"), vec!["page2", "Title"]);
        assert!(split_words("").is_empty());
    }

    #[test]
    fn test_snake_lower() {
        let scheme = NamingScheme::SnakeLower;
        assert_eq!(scheme.apply("Article"), "article");
        assert_eq!(scheme.apply("articleId"), "article_id");
        assert_eq!(scheme.apply("ArticleCategory"), "article_category");
        assert_eq!(scheme.apply("already_snake"), "already_snake");
    }

    #[test]
    fn test_snake_upper() {
        assert_eq!(NamingScheme::SnakeUpper.apply("articleId"), "ARTICLE_ID");
    }

    #[test]
    fn test_studly_caps() {
        assert_eq!(NamingScheme::StudlyCaps.apply("article_category"), "ArticleCategory");
        assert_eq!(NamingScheme::StudlyCaps.apply("Article"), "Article");
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(NamingScheme::CamelCase.apply("parent_id"), "parentId");
        assert_eq!(NamingScheme::CamelCase.apply("ArticleCategory"), "articleCategory");
    }

    #[test]
    fn test_lower_upper_none() {
        assert_eq!(NamingScheme::Lower.apply("ArticleCategory"), "articlecategory");
        assert_eq!(NamingScheme::Upper.apply("article_category"), "ARTICLECATEGORY");
        assert_eq!(NamingScheme::None.apply("Article_X"), "Article_X");
    }

    #[test]
    fn test_scheme_serde_names() {
        let scheme: NamingScheme = serde_json::from_str("\"studly_caps\"").unwrap();
        assert_eq!(scheme, NamingScheme::StudlyCaps);
        assert_eq!(
            serde_json::to_string(&NamingScheme::SnakeLower).unwrap(),
            "\"snake_lower\""
        );
    }

    #[test]
    fn test_capfirst() {
        assert_eq!(capfirst("hello"), "Hello");
        assert_eq!(capfirst("Hello"), "Hello");
        assert_eq!(capfirst(""), "");
    }
}
