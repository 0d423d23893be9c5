//! Compiler configuration.

use serde::{Deserialize, Serialize};

/// How parameter placeholders are written in the rendered SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderStyle {
    /// `:0, :1, …` (zero-based, named-parameter drivers).
    #[default]
    Named,
    /// `$1, $2, …` (one-based, `tokio-postgres`).
    Dollar,
}

impl PlaceholderStyle {
    /// Append the placeholder for the parameter at zero-based `index`.
    pub(crate) fn write(self, out: &mut String, index: usize) {
        use std::fmt::Write;
        let _ = match self {
            PlaceholderStyle::Named => write!(out, ":{index}"),
            PlaceholderStyle::Dollar => write!(out, "${}", index + 1),
        };
    }
}

/// Configuration shared by all compilers of one [`QueryCompiler`](crate::query::QueryCompiler).
///
/// The defaults produce `:N` placeholders and `R0, R1, …` CTE names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Placeholder syntax.
    pub placeholder_style: PlaceholderStyle,
    /// Prefix of chained statement (CTE) names.
    pub cte_prefix: String,
    /// Prefix of correlated subquery aliases in projections.
    pub select_alias_prefix: String,
    /// Prefix of `EXISTS` subquery aliases in filters.
    pub filter_alias_prefix: String,
    /// Truncate logged SQL (in bytes). `None` logs the full text.
    pub max_logged_sql_length: Option<usize>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            placeholder_style: PlaceholderStyle::Named,
            cte_prefix: "R".to_string(),
            select_alias_prefix: "S".to_string(),
            filter_alias_prefix: "W".to_string(),
            max_logged_sql_length: Some(200),
        }
    }
}

impl CompilerConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the placeholder style.
    pub fn with_placeholder_style(mut self, style: PlaceholderStyle) -> Self {
        self.placeholder_style = style;
        self
    }

    /// Set the CTE name prefix.
    pub fn with_cte_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cte_prefix = prefix.into();
        self
    }

    /// Set the projection subquery alias prefix.
    pub fn with_select_alias_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.select_alias_prefix = prefix.into();
        self
    }

    /// Set the filter subquery alias prefix.
    pub fn with_filter_alias_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.filter_alias_prefix = prefix.into();
        self
    }

    /// Set maximum logged SQL length.
    pub fn max_logged_sql_length(mut self, len: usize) -> Self {
        self.max_logged_sql_length = Some(len);
        self
    }

    /// Log SQL without truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_logged_sql_length = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_styles() {
        let mut out = String::new();
        PlaceholderStyle::Named.write(&mut out, 0);
        out.push(' ');
        PlaceholderStyle::Dollar.write(&mut out, 0);
        assert_eq!(out, ":0 $1");
    }

    #[test]
    fn deserializes_partial_config() {
        let config: CompilerConfig =
            serde_json::from_str(r#"{ "placeholder_style": "dollar", "cte_prefix": "Q" }"#).unwrap();
        assert_eq!(config.placeholder_style, PlaceholderStyle::Dollar);
        assert_eq!(config.cte_prefix, "Q");
        assert_eq!(config.select_alias_prefix, "S");
    }
}
