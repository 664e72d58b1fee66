//! Default resource naming: uncapitalized, pluralized type names
//!
//! Handles common English pluralization rules including irregular forms

/// Utility deriving resource paths and relation names from type names
pub struct Pluralizer;

impl Pluralizer {
    /// Convert a singular noun to its plural form
    ///
    /// # Examples
    ///
    /// ```
    /// use halrest::core::pluralize::Pluralizer;
    ///
    /// assert_eq!(Pluralizer::pluralize("person"), "persons");
    /// assert_eq!(Pluralizer::pluralize("company"), "companies");
    /// assert_eq!(Pluralizer::pluralize("address"), "addresses");
    /// assert_eq!(Pluralizer::pluralize("knife"), "knives");
    /// ```
    pub fn pluralize(singular: &str) -> String {
        if singular.is_empty() {
            return singular.to_string();
        }

        match singular {
            // Words ending in consonant + y -> ies
            s if s.ends_with('y')
                && !s.ends_with("ay")
                && !s.ends_with("ey")
                && !s.ends_with("iy")
                && !s.ends_with("oy")
                && !s.ends_with("uy")
                && s.len() > 1 =>
            {
                format!("{}ies", &s[..s.len() - 1])
            }

            // Words ending in s, sh, ch, x, z -> es
            s if s.ends_with('s')
                || s.ends_with("sh")
                || s.ends_with("ch")
                || s.ends_with('x')
                || s.ends_with('z') =>
            {
                format!("{}es", s)
            }

            // Words ending in fe -> ves
            s if s.ends_with("fe") && s.len() > 2 => {
                format!("{}ves", &s[..s.len() - 2])
            }

            // Words ending in f -> ves
            s if s.ends_with('f') && !s.ends_with("ff") && s.len() > 1 => {
                format!("{}ves", &s[..s.len() - 1])
            }

            // Words ending in o after consonant -> es, a few exceptions just add s
            s if s.ends_with('o') && s.len() > 1 => {
                let before_o = s[..s.len() - 1].chars().last().unwrap_or('a');
                match (before_o, s) {
                    ('a' | 'e' | 'i' | 'o' | 'u', _) => format!("{}s", s),
                    (_, "photo" | "piano" | "halo" | "memo" | "logo") => format!("{}s", s),
                    _ => format!("{}es", s),
                }
            }

            s => format!("{}s", s),
        }
    }

    /// Lower-case the first character: `BaseAddress` -> `baseAddress`
    pub fn uncapitalize(name: &str) -> String {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Default collection path for an entity type: `Person` -> `persons`
    pub fn resource_path(type_name: &str) -> String {
        Self::pluralize(&Self::uncapitalize(type_name))
    }
}
