//! Model formulas of the form `y ~ temperature + s(posan) + weekday`.

use crate::error::{CorrectionError, Result};
use std::fmt;
use std::str::FromStr;

/// Suffix marking a lagged copy of a variable.
pub const SHIFTED_SUFFIX: &str = "_shifted";

/// One explanatory term of a formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// Variable entering the model linearly.
    Linear(String),
    /// Variable entering the model through a spline basis, written `s(x)`.
    Spline(String),
}

impl Term {
    /// Name of the underlying variable.
    pub fn variable(&self) -> &str {
        match self {
            Term::Linear(name) | Term::Spline(name) => name,
        }
    }

    pub fn is_spline(&self) -> bool {
        matches!(self, Term::Spline(_))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Linear(name) => f.write_str(name),
            Term::Spline(name) => write!(f, "s({})", name),
        }
    }
}

/// A response variable and its explanatory terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    response: String,
    terms: Vec<Term>,
}

impl Formula {
    /// Build a formula from parts.
    pub fn new(response: impl Into<String>, terms: Vec<Term>) -> Result<Self> {
        let response = response.into();
        validate_name(&response)?;
        if terms.is_empty() {
            return Err(CorrectionError::Configuration(
                "formula needs at least one explanatory term".into(),
            ));
        }
        for term in &terms {
            validate_name(term.variable())?;
        }
        Ok(Self { response, terms })
    }

    /// Parse `"response ~ a + s(b) + c"`.
    ///
    /// An explicit intercept term `1` is accepted and ignored.
    pub fn parse(formula: &str) -> Result<Self> {
        let (lhs, rhs) = formula.split_once('~').ok_or_else(|| {
            CorrectionError::Configuration(format!("formula '{}' has no '~'", formula))
        })?;
        if rhs.contains('~') {
            return Err(CorrectionError::Configuration(format!(
                "formula '{}' has more than one '~'",
                formula
            )));
        }

        let mut terms: Vec<Term> = Vec::new();
        for raw in rhs.split('+') {
            let raw = raw.trim();
            if raw == "1" {
                continue;
            }
            let term = match raw.strip_prefix("s(").and_then(|r| r.strip_suffix(')')) {
                Some(inner) => Term::Spline(inner.trim().to_string()),
                None => Term::Linear(raw.to_string()),
            };
            if !terms.contains(&term) {
                terms.push(term);
            }
        }

        Self::new(lhs.trim(), terms)
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Explanatory variable names, in formula order without repeats.
    pub fn explanatory_variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            if !names.contains(&term.variable()) {
                names.push(term.variable());
            }
        }
        names
    }

    /// Response followed by the explanatory variables.
    pub fn all_variables(&self) -> Vec<&str> {
        let mut names = vec![self.response.as_str()];
        names.extend(
            self.explanatory_variables()
                .into_iter()
                .filter(|v| *v != self.response),
        );
        names
    }

    /// Variables with any shift suffix removed.
    pub fn base_variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.all_variables() {
            let base = shifted_base(name).unwrap_or(name);
            if !names.contains(&base) {
                names.push(base);
            }
        }
        names
    }
}

impl FromStr for Formula {
    type Err = CorrectionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~ ", self.response)?;
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(" + ")?;
            }
            write!(f, "{}", term)?;
        }
        Ok(())
    }
}

/// Whether `name` refers to a lagged variable.
pub fn is_shifted(name: &str) -> bool {
    shifted_base(name).is_some()
}

/// The variable a shifted name lags, e.g. `temperature` for `temperature_shifted`.
pub fn shifted_base(name: &str) -> Option<&str> {
    name.strip_suffix(SHIFTED_SUFFIX).filter(|base| !base.is_empty())
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(CorrectionError::Configuration(format!(
            "invalid variable name '{}' in formula",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mixed_terms() {
        let f = Formula::parse("y ~ s(temperature) + s(posan) + weekday + holiday").unwrap();
        assert_eq!(f.response(), "y");
        assert_eq!(
            f.terms(),
            &[
                Term::Spline("temperature".into()),
                Term::Spline("posan".into()),
                Term::Linear("weekday".into()),
                Term::Linear("holiday".into()),
            ]
        );
        assert_eq!(
            f.all_variables(),
            vec!["y", "temperature", "posan", "weekday", "holiday"]
        );
        assert_eq!(f.to_string(), "y ~ s(temperature) + s(posan) + weekday + holiday");
    }

    #[test]
    fn parse_ignores_intercept_and_repeats() {
        let f: Formula = "y ~ 1 + temperature + temperature".parse().unwrap();
        assert_eq!(f.explanatory_variables(), vec!["temperature"]);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(Formula::parse("y temperature").is_err());
        assert!(Formula::parse("y ~ ").is_err());
        assert!(Formula::parse("y ~ a ~ b").is_err());
        assert!(Formula::parse("y ~ a - b").is_err());
    }

    #[test]
    fn shifted_helpers() {
        assert!(is_shifted("temperature_shifted"));
        assert!(!is_shifted("temperature"));
        assert!(!is_shifted("_shifted"));
        assert_eq!(shifted_base("y_shifted"), Some("y"));

        let f = Formula::parse("y ~ temperature + temperature_shifted + y_shifted").unwrap();
        assert_eq!(f.base_variables(), vec!["y", "temperature"]);
    }
}
