//! Rubric taxonomies: ordered criteria, each grouping ordered elements.
//!
//! Declaration order is significant everywhere downstream (CSV columns,
//! graph node order, aggregation order), so the taxonomy is an ordered list
//! rather than a map.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ParamError;

/// A named rubric category grouping several fine-grained elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    /// Criterion name (e.g. "PI_01_Foster_Integrity").
    pub name: String,
    /// Element names in declaration order.
    pub elements: Vec<String>,
}

impl Criterion {
    pub fn new(name: impl Into<String>, elements: &[&str]) -> Self {
        Self {
            name: name.into(),
            elements: elements.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// A validated, ordered criterion → elements mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Criterion>", into = "Vec<Criterion>")]
pub struct Taxonomy {
    criteria: Vec<Criterion>,
    /// element name → (criterion index, flat element index)
    index: HashMap<String, (usize, usize)>,
}

impl Taxonomy {
    /// Build a taxonomy, rejecting empty criteria and duplicate names.
    ///
    /// Criteria may declare different numbers of elements.
    pub fn new(criteria: Vec<Criterion>) -> Result<Self, ParamError> {
        if criteria.is_empty() {
            return Err(ParamError::EmptyTaxonomy);
        }

        let mut seen_criteria = HashSet::new();
        let mut index = HashMap::new();
        let mut flat = 0usize;
        for (ci, criterion) in criteria.iter().enumerate() {
            if !seen_criteria.insert(criterion.name.as_str()) {
                return Err(ParamError::DuplicateCriterion(criterion.name.clone()));
            }
            if criterion.elements.is_empty() {
                return Err(ParamError::EmptyCriterion(criterion.name.clone()));
            }
            for element in &criterion.elements {
                if index.insert(element.clone(), (ci, flat)).is_some() {
                    return Err(ParamError::DuplicateElement(element.clone()));
                }
                flat += 1;
            }
        }

        Ok(Self { criteria, index })
    }

    /// The default Professional-Integrity taxonomy: 3 criteria, 12 elements.
    pub fn professional_integrity() -> Self {
        Self::from_static(&[
            (
                "PI_01_Foster_Integrity",
                &[
                    "honesty_transparency",
                    "accountability",
                    "ethical_reasoning",
                    "professional_boundaries",
                ],
            ),
            (
                "PI_02_Safe_Learning_Environment",
                &[
                    "psychological_safety",
                    "respectful_communication",
                    "inclusive_participation",
                    "constructive_feedback",
                ],
            ),
            (
                "PI_03_Professional_Commitment",
                &[
                    "reliability",
                    "preparation",
                    "self_directed_learning",
                    "reflective_improvement",
                ],
            ),
        ])
    }

    /// The PROaCTIVE Socratic-dialogue taxonomy: 5 criteria, 20 elements.
    pub fn proactive() -> Self {
        Self::from_static(&[
            (
                "PRO_01_Question_Formulation",
                &[
                    "question_depth",
                    "question_types",
                    "question_timing",
                    "question_clarity",
                ],
            ),
            (
                "PRO_02_Response_Quality",
                &[
                    "reflective_pausing",
                    "response_completeness",
                    "understanding_verification",
                    "empathic_acknowledgment",
                ],
            ),
            (
                "PRO_03_Critical_Thinking",
                &[
                    "assumption_recognition",
                    "reasoning_transparency",
                    "differential_thinking",
                    "complexity_navigation",
                ],
            ),
            (
                "PRO_04_Humility_Partnership",
                &[
                    "plan_flexibility",
                    "expertise_acknowledgment",
                    "uncertainty_communication",
                    "partnership_language",
                ],
            ),
            (
                "PRO_05_Reflective_Practice",
                &[
                    "in_encounter_adjustment",
                    "bias_recognition",
                    "style_awareness",
                    "post_encounter_reflection",
                ],
            ),
        ])
    }

    /// Look up a built-in taxonomy by name ("pi" or "proactive").
    pub fn builtin(name: &str) -> Result<Self, ParamError> {
        match name.to_lowercase().as_str() {
            "pi" | "professional_integrity" => Ok(Self::professional_integrity()),
            "proactive" | "pro" => Ok(Self::proactive()),
            other => Err(ParamError::UnknownTaxonomy(other.to_string())),
        }
    }

    // Built-in tables are unique by construction.
    fn from_static(groups: &[(&str, &[&str; 4])]) -> Self {
        let criteria: Vec<Criterion> = groups
            .iter()
            .map(|(name, elements)| Criterion::new(*name, &elements[..]))
            .collect();
        let mut index = HashMap::new();
        let mut flat = 0usize;
        for (ci, criterion) in criteria.iter().enumerate() {
            for element in &criterion.elements {
                index.insert(element.clone(), (ci, flat));
                flat += 1;
            }
        }
        Self { criteria, index }
    }

    /// Criteria in declaration order.
    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    /// Look up a criterion by name.
    pub fn criterion(&self, name: &str) -> Result<&Criterion, ParamError> {
        self.criteria
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ParamError::UnknownCriterion(name.to_string()))
    }

    pub fn criterion_names(&self) -> impl Iterator<Item = &str> {
        self.criteria.iter().map(|c| c.name.as_str())
    }

    /// All element names, flattened in declaration order.
    pub fn elements(&self) -> impl Iterator<Item = &str> {
        self.criteria
            .iter()
            .flat_map(|c| c.elements.iter().map(String::as_str))
    }

    pub fn element_count(&self) -> usize {
        self.index.len()
    }

    /// Index of the criterion that owns `element`.
    pub fn criterion_index_of(&self, element: &str) -> Option<usize> {
        self.index.get(element).map(|&(ci, _)| ci)
    }

    /// Name of the criterion that owns `element`.
    pub fn criterion_of(&self, element: &str) -> Option<&str> {
        self.criterion_index_of(element)
            .map(|ci| self.criteria[ci].name.as_str())
    }

    /// Position of `element` in the flattened element order.
    pub fn element_index(&self, element: &str) -> Option<usize> {
        self.index.get(element).map(|&(_, flat)| flat)
    }

    /// True when every criterion declares the same number of elements.
    pub fn is_uniform(&self) -> bool {
        let first = self.criteria[0].elements.len();
        self.criteria.iter().all(|c| c.elements.len() == first)
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::professional_integrity()
    }
}

impl TryFrom<Vec<Criterion>> for Taxonomy {
    type Error = ParamError;

    fn try_from(criteria: Vec<Criterion>) -> Result<Self, Self::Error> {
        Self::new(criteria)
    }
}

impl From<Taxonomy> for Vec<Criterion> {
    fn from(taxonomy: Taxonomy) -> Self {
        taxonomy.criteria
    }
}
