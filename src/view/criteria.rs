//! View criteria: the hard filter map, the soft preference order and the singled flag that a
//! chain of facetselects accumulates.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use crate::error::RepositoryError;

use super::rule::FacetRule;

/// A required value that accepts any value, as long as the facet property exists.
pub const WILDCARD: &str = "*";

pub fn is_wildcard(value: &str) -> bool {
    value.is_empty() || value == WILDCARD
}

/// How a facetselect applies one `(facet, value)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FacetMode {
    Stick,
    Select,
    Single,
    Prefer,
    PreferSingle,
    Clear,
}

impl TryFrom<&str> for FacetMode {
    type Error = RepositoryError;

    fn try_from(src: &str) -> Result<FacetMode, RepositoryError> {
        match &src.trim().to_lowercase()[..] {
            "stick" => Ok(FacetMode::Stick),
            "select" => Ok(FacetMode::Select),
            "single" => Ok(FacetMode::Single),
            "prefer" => Ok(FacetMode::Prefer),
            "prefer-single" => Ok(FacetMode::PreferSingle),
            "clear" => Ok(FacetMode::Clear),
            _ => Err(RepositoryError::Custom(format!(
                "Invalid facet mode '{src}'. Valid options: stick, select, single, prefer, prefer-single, clear"
            ))),
        }
    }
}

impl Display for FacetMode {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let s = match self {
            FacetMode::Stick => "stick",
            FacetMode::Select => "select",
            FacetMode::Single => "single",
            FacetMode::Prefer => "prefer",
            FacetMode::PreferSingle => "prefer-single",
            FacetMode::Clear => "clear",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FacetTriple {
    pub facet: String,
    pub value: String,
    pub mode: FacetMode,
}

impl FacetTriple {
    pub fn new(facet: &str, value: &str, mode: FacetMode) -> Self {
        FacetTriple {
            facet: facet.to_string(),
            value: value.to_string(),
            mode,
        }
    }
}

/// Immutable once attached to a view identity; [`ViewCriteria::extend`] returns a new value.
///
/// Equality of the `view` map ignores declaration order, while `order` is compared as a sequence
/// since earlier preferences dominate later ones.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewCriteria {
    view: BTreeMap<String, String>,
    order: Vec<(String, String)>,
    singled: bool,
    /// When set, a candidate lacking a filtered facet is excluded.
    filter: bool,
    rules: Vec<FacetRule>,
}

impl Default for ViewCriteria {
    fn default() -> Self {
        ViewCriteria {
            view: BTreeMap::new(),
            order: Vec::new(),
            singled: false,
            filter: true,
            rules: Vec::new(),
        }
    }
}

impl ViewCriteria {
    pub fn new() -> Self {
        ViewCriteria::default()
    }

    pub fn view(&self) -> &BTreeMap<String, String> {
        &self.view
    }

    pub fn order(&self) -> &[(String, String)] {
        &self.order
    }

    pub fn is_singled(&self) -> bool {
        self.singled
    }

    pub fn filter(&self) -> bool {
        self.filter
    }

    pub fn rules(&self) -> &[FacetRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty() && self.order.is_empty() && !self.singled && self.rules.is_empty()
    }

    /// A copy of `self` with `triples` applied in declaration order.
    pub fn extend(&self, triples: &[FacetTriple]) -> ViewCriteria {
        let mut next = self.clone();
        for triple in triples {
            match triple.mode {
                FacetMode::Stick | FacetMode::Select => {
                    next.view.insert(triple.facet.clone(), triple.value.clone());
                }
                FacetMode::Single => {
                    next.view.insert(triple.facet.clone(), triple.value.clone());
                    next.singled = true;
                }
                FacetMode::Prefer => next.prefer(&triple.facet, &triple.value),
                FacetMode::PreferSingle => {
                    next.prefer(&triple.facet, &triple.value);
                    next.singled = true;
                }
                FacetMode::Clear => {
                    next.view.remove(&triple.facet);
                }
            }
        }
        next
    }

    pub fn with_filter(&self, filter: bool) -> ViewCriteria {
        ViewCriteria {
            filter,
            ..self.clone()
        }
    }

    pub fn with_rules(&self, rules: &[FacetRule]) -> ViewCriteria {
        let mut next = self.clone();
        for rule in rules {
            if !next.rules.contains(rule) {
                next.rules.push(rule.clone());
            }
        }
        next
    }

    // Re-declaring a preference keeps its position
    fn prefer(&mut self, facet: &str, value: &str) {
        match self.order.iter_mut().find(|(f, _)| f == facet) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.order.push((facet.to_string(), value.to_string())),
        }
    }
}

/// Zip the three parallel facetselect arrays into triples. Fails if the arrays differ in length;
/// triples with an unknown mode are logged and dropped.
pub fn zip_triples(
    facets: &[String],
    values: &[String],
    modes: &[String],
) -> Result<Vec<FacetTriple>, RepositoryError> {
    if facets.len() != values.len() || facets.len() != modes.len() {
        return Err(RepositoryError::Custom(format!(
            "Malformed facet selection: {} facets, {} values, {} modes",
            facets.len(),
            values.len(),
            modes.len()
        )));
    }
    Ok(facets
        .iter()
        .zip(values.iter())
        .zip(modes.iter())
        .filter_map(|((facet, value), mode)| match FacetMode::try_from(mode.as_str()) {
            Ok(mode) => Some(FacetTriple {
                facet: facet.clone(),
                value: value.clone(),
                mode,
            }),
            Err(e) => {
                tracing::warn!("[zip_triples] Ignoring facet '{facet}': {e}");
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_modes_route_to_view_and_order() {
        let criteria = ViewCriteria::new().extend(&[
            FacetTriple::new("state", "live", FacetMode::Stick),
            FacetTriple::new("lang", "en", FacetMode::Prefer),
        ]);
        assert_eq!(criteria.view().get("state").map(String::as_str), Some("live"));
        assert_eq!(criteria.order(), &[("lang".to_string(), "en".to_string())]);
        assert!(!criteria.is_singled());

        let singled = criteria.extend(&[FacetTriple::new("lang", "nl", FacetMode::PreferSingle)]);
        assert!(singled.is_singled());
        assert_eq!(singled.order(), &[("lang".to_string(), "nl".to_string())]);
        // The original is untouched
        assert_eq!(criteria.order(), &[("lang".to_string(), "en".to_string())]);

        let single = ViewCriteria::new().extend(&[FacetTriple::new("a", "b", FacetMode::Single)]);
        assert!(single.is_singled());
        assert_eq!(single.view().len(), 1);
    }

    #[test]
    fn test_clear_removes_inherited_filter() {
        let inherited =
            ViewCriteria::new().extend(&[FacetTriple::new("state", "live", FacetMode::Select)]);
        let cleared = inherited.extend(&[FacetTriple::new("state", "", FacetMode::Clear)]);
        assert!(cleared.view().is_empty());
        assert_eq!(inherited.view().len(), 1);
    }

    #[test]
    fn test_view_equality_ignores_order_but_preferences_do_not() {
        let a = ViewCriteria::new().extend(&[
            FacetTriple::new("x", "1", FacetMode::Select),
            FacetTriple::new("y", "2", FacetMode::Select),
        ]);
        let b = ViewCriteria::new().extend(&[
            FacetTriple::new("y", "2", FacetMode::Select),
            FacetTriple::new("x", "1", FacetMode::Select),
        ]);
        assert_eq!(a, b);

        let c = ViewCriteria::new().extend(&[
            FacetTriple::new("x", "1", FacetMode::Prefer),
            FacetTriple::new("y", "2", FacetMode::Prefer),
        ]);
        let d = ViewCriteria::new().extend(&[
            FacetTriple::new("y", "2", FacetMode::Prefer),
            FacetTriple::new("x", "1", FacetMode::Prefer),
        ]);
        assert_ne!(c, d);
    }

    #[test]
    fn test_zip_triples_validates_lengths_and_modes() {
        let s = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(zip_triples(&s(&["a", "b"]), &s(&["1"]), &s(&["select", "select"])).is_err());
        assert!(zip_triples(&s(&["a"]), &s(&["1"]), &s(&["bogus"]))
            .unwrap()
            .is_empty());
        let triples = zip_triples(&s(&["a"]), &s(&["1"]), &s(&["Prefer-Single"])).unwrap();
        assert_eq!(triples[0].mode, FacetMode::PreferSingle);
        assert!(is_wildcard("*") && is_wildcard("") && !is_wildcard("red"));
    }
}
