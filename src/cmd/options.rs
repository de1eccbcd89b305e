//! Option sets: groups of options of which exactly one must be passed

use crate::error::{M365Error, Result};

#[derive(Debug, Clone)]
pub struct OptionSet {
    options: Vec<(&'static str, bool)>,
    applies: bool,
}

impl OptionSet {
    pub fn new() -> Self {
        Self {
            options: Vec::new(),
            applies: true,
        }
    }

    /// Add an option and whether it was passed
    pub fn option(mut self, name: &'static str, present: bool) -> Self {
        self.options.push((name, present));
        self
    }

    /// Only enforce the set when `condition` holds
    pub fn run_when(mut self, condition: bool) -> Self {
        self.applies = condition;
        self
    }

    fn names(&self) -> String {
        self.options
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn check(&self) -> Result<()> {
        if !self.applies {
            return Ok(());
        }

        match self.options.iter().filter(|(_, present)| *present).count() {
            1 => Ok(()),
            0 => Err(M365Error::ValidationError(format!(
                "Specify one of the following options: {}",
                self.names()
            ))),
            _ => Err(M365Error::ValidationError(format!(
                "Specify only one of the following options: {}",
                self.names()
            ))),
        }
    }
}

impl Default for OptionSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Check every set, failing on the first violation
pub fn validate_option_sets(sets: &[OptionSet]) -> Result<()> {
    sets.iter().try_for_each(OptionSet::check)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_passes() {
        let set = OptionSet::new().option("id", true).option("user-name", false);
        assert!(set.check().is_ok());
    }

    #[test]
    fn test_none_given() {
        let set = OptionSet::new().option("id", false).option("user-name", false);
        assert_eq!(
            set.check().unwrap_err().to_string(),
            "Specify one of the following options: id, user-name"
        );
    }

    #[test]
    fn test_several_given() {
        let set = OptionSet::new()
            .option("id", true)
            .option("app-id", true)
            .option("name", false);
        assert_eq!(
            set.check().unwrap_err().to_string(),
            "Specify only one of the following options: id, app-id, name"
        );
    }

    #[test]
    fn test_run_when_false_skips_set() {
        let set = OptionSet::new()
            .option("site-design", false)
            .option("site-design-id", false)
            .run_when(false);
        assert!(set.check().is_ok());
    }

    #[test]
    fn test_first_failing_set_is_reported() {
        let sets = [
            OptionSet::new().option("a", true),
            OptionSet::new().option("b", false).option("c", false),
        ];
        assert_eq!(
            validate_option_sets(&sets).unwrap_err().to_string(),
            "Specify one of the following options: b, c"
        );
    }
}
