//! Selector grammar: `ElementType#Identifier`.
//!
//! The left-hand side is a control-type tag (or empty for "any type");
//! the right-hand side matches the element's accessible name OR its
//! automation id. A missing `#` is tolerated (the whole string is
//! treated as the identifier) but the validator warns about it.

/// Control-type tags the validator recognizes. Unknown tags are a
/// warning, not an error, so new control types degrade gracefully.
pub const CONTROL_TYPES: &[&str] = &[
    "Button",
    "TextBox",
    "TextBlock",
    "Label",
    "CheckBox",
    "RadioButton",
    "ComboBox",
    "ListItem",
    "MenuItem",
    "TabItem",
    "TreeItem",
    "Window",
    "Hyperlink",
    "Image",
    "Slider",
    "ProgressBar",
    "DataGrid",
    "Toggle",
    "Text",
    "Edit",
    "Pane",
    "Group",
    "ScrollBar",
    "ToolBar",
    "StatusBar",
];

pub fn is_known_control_type(tag: &str) -> bool {
    CONTROL_TYPES.iter().any(|t| t.eq_ignore_ascii_case(tag))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    /// `None` means any control type.
    pub control_type: Option<String>,
    pub identifier: String,
    pub exact: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("selector is empty")]
    Empty,
    #[error("selector '{0}' has an empty identifier after '#'")]
    EmptyIdentifier(String),
}

impl Selector {
    /// Parse the grammar. `exact` controls identifier matching later on.
    pub fn parse(raw: &str, exact: bool) -> Result<Self, SelectorError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SelectorError::Empty);
        }
        match raw.split_once('#') {
            Some((lhs, rhs)) => {
                if rhs.trim().is_empty() {
                    return Err(SelectorError::EmptyIdentifier(raw.to_string()));
                }
                let control_type = {
                    let lhs = lhs.trim();
                    if lhs.is_empty() {
                        None
                    } else {
                        Some(lhs.to_string())
                    }
                };
                Ok(Self {
                    control_type,
                    identifier: rhs.trim().to_string(),
                    exact,
                })
            }
            // No '#': treat the whole string as the identifier.
            None => Ok(Self {
                control_type: None,
                identifier: raw.to_string(),
                exact,
            }),
        }
    }

    /// Does an element with the given facts satisfy this selector?
    ///
    /// Fuzzy mode tolerates decorations after the identifier, so
    /// `Button#Save` matches "Save", "Save (Ctrl+S)" and "Save(beta)".
    /// The automation id always requires equality.
    pub fn matches(&self, control_type: &str, name: &str, automation_id: &str) -> bool {
        if let Some(wanted) = &self.control_type {
            if !wanted.eq_ignore_ascii_case(control_type) {
                return false;
            }
        }
        let id = self.identifier.as_str();
        if self.exact {
            return name == id || automation_id == id;
        }
        name == id
            || name.starts_with(&format!("{id} "))
            || name.starts_with(&format!("{id}("))
            || automation_id == id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_and_identifier() {
        let s = Selector::parse("Button#Save", false).unwrap();
        assert_eq!(s.control_type.as_deref(), Some("Button"));
        assert_eq!(s.identifier, "Save");
    }

    #[test]
    fn empty_type_means_any() {
        let s = Selector::parse("#Save", false).unwrap();
        assert_eq!(s.control_type, None);
        assert!(s.matches("Edit", "Save", ""));
    }

    #[test]
    fn missing_hash_is_identifier_only() {
        let s = Selector::parse("Save", false).unwrap();
        assert_eq!(s.control_type, None);
        assert_eq!(s.identifier, "Save");
    }

    #[test]
    fn empty_identifier_is_an_error() {
        assert_eq!(
            Selector::parse("Button#", false),
            Err(SelectorError::EmptyIdentifier("Button#".into()))
        );
        assert_eq!(Selector::parse("  ", false), Err(SelectorError::Empty));
    }

    #[test]
    fn fuzzy_matching_tolerates_decorations() {
        let s = Selector::parse("Button#Save", false).unwrap();
        assert!(s.matches("Button", "Save", ""));
        assert!(s.matches("Button", "Save (Ctrl+S)", ""));
        assert!(s.matches("Button", "Save(beta)", ""));
        assert!(s.matches("Button", "Something", "Save"));
        assert!(!s.matches("Button", "Saved", ""));
        assert!(!s.matches("Edit", "Save", ""));
    }

    #[test]
    fn exact_matching_requires_equality() {
        let s = Selector::parse("Button#Save", true).unwrap();
        assert!(s.matches("Button", "Save", ""));
        assert!(!s.matches("Button", "Save (Ctrl+S)", ""));
        assert!(s.matches("Button", "x", "Save"));
    }

    #[test]
    fn control_type_allow_list() {
        assert!(is_known_control_type("Button"));
        assert!(is_known_control_type("button"));
        assert!(!is_known_control_type("Blob"));
    }
}
