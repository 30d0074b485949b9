//! Resource Data Model
//!
//! Types shared between the orchestration core and every host adapter:
//! resource identity, descriptors read from the catalog, and the type-level
//! dependency rules used to discover what a resource needs offline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Identity of a resource: `(owner, language, resource_id)`.
///
/// The canonical string form is `owner/language/resource_id`. The resource id
/// may itself contain slashes; only the first two separators are significant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceKey {
    pub owner: String,
    pub language: String,
    pub resource_id: String,
}

impl ResourceKey {
    pub fn new(
        owner: impl Into<String>,
        language: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            language: language.into(),
            resource_id: resource_id.into(),
        }
    }

    /// Parse the canonical `owner/language/resource_id` form.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(language), Some(id))
                if !owner.is_empty() && !language.is_empty() && !id.is_empty() =>
            {
                Ok(Self::new(owner, language, id))
            }
            _ => Err(BridgeError::OperationFailed(format!(
                "Invalid resource key '{}': expected owner/language/resource_id",
                s
            ))),
        }
    }

    /// Base language code of this key (`en-US` -> `en`).
    pub fn base_language(&self) -> String {
        base_language(&self.language)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.owner, self.language, self.resource_id)
    }
}

impl FromStr for ResourceKey {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Strip region/script subtags and normalise case: `pt_BR` -> `pt`.
pub fn base_language(code: &str) -> String {
    code.split(|c| c == '-' || c == '_')
        .next()
        .unwrap_or(code)
        .to_ascii_lowercase()
}

/// A downloadable sub-item of a resource (one book, one lexicon entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl Ingredient {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: None,
            size: None,
        }
    }
}

/// Hints that let the download manager pick a transfer strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferHints {
    /// URL of a single archive containing every ingredient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_url: Option<String>,
}

/// Catalog entry for one resource.
///
/// Descriptors are treated as immutable snapshots; a refreshed catalog
/// produces new values rather than mutating these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub key: ResourceKey,
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub transfer: TransferHints,
}

impl ResourceDescriptor {
    pub fn new(key: ResourceKey, resource_type: impl Into<String>) -> Self {
        Self {
            key,
            resource_type: resource_type.into(),
            title: None,
            ingredients: Vec::new(),
            transfer: TransferHints::default(),
        }
    }

    pub fn with_ingredients<I, S>(mut self, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ingredients = identifiers.into_iter().map(Ingredient::new).collect();
        self
    }

    pub fn with_archive_url(mut self, url: impl Into<String>) -> Self {
        self.transfer.archive_url = Some(url.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// How a dependency rule constrains one field (owner or language) of the
/// target resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", content = "value", rename_all = "camelCase")]
pub enum FieldPolicy {
    /// Any value is accepted.
    #[default]
    Any,
    /// Must equal the source resource's value.
    SameAsSource,
    /// Must equal this value.
    Fixed(String),
}

impl FieldPolicy {
    /// Concrete value required of the target, `None` when unconstrained.
    pub fn resolve(&self, source_value: &str) -> Option<String> {
        match self {
            FieldPolicy::Any => None,
            FieldPolicy::SameAsSource => Some(source_value.to_string()),
            FieldPolicy::Fixed(value) => Some(value.clone()),
        }
    }
}

/// Type-level declaration that resources of one type need a resource of
/// `target_type`, constrained by owner and language policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRule {
    pub target_type: String,
    #[serde(default)]
    pub owner: FieldPolicy,
    #[serde(default)]
    pub language: FieldPolicy,
}

/// Owner/language a rule demands once evaluated against a source resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyTarget {
    pub resource_type: String,
    pub owner: Option<String>,
    pub language: Option<String>,
}

impl DependencyRule {
    pub fn on(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            owner: FieldPolicy::Any,
            language: FieldPolicy::Any,
        }
    }

    pub fn same_owner(mut self) -> Self {
        self.owner = FieldPolicy::SameAsSource;
        self
    }

    pub fn same_language(mut self) -> Self {
        self.language = FieldPolicy::SameAsSource;
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = FieldPolicy::Fixed(owner.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = FieldPolicy::Fixed(language.into());
        self
    }

    /// Evaluate the rule against a concrete source resource.
    pub fn target_for(&self, source: &ResourceKey) -> DependencyTarget {
        DependencyTarget {
            resource_type: self.target_type.clone(),
            owner: self.owner.resolve(&source.owner),
            language: self.language.resolve(&source.language),
        }
    }
}

impl DependencyTarget {
    /// Exact owner match and base-language match; no fuzzy matching.
    pub fn matches(&self, candidate: &ResourceDescriptor) -> bool {
        if candidate.resource_type != self.resource_type {
            return false;
        }
        if let Some(owner) = &self.owner {
            if &candidate.key.owner != owner {
                return false;
            }
        }
        if let Some(language) = &self.language {
            if candidate.key.base_language() != base_language(language) {
                return false;
            }
        }
        true
    }
}
