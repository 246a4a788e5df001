use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind};

/// Every editable text field. Cache columns and vendor keys are derived from
/// the variant, never from caller input.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Name,
    Subtitle,
    PrivacyPolicyUrl,
    PrivacyChoicesUrl,
    Description,
    Keywords,
    MarketingUrl,
    PromotionalText,
    SupportUrl,
    WhatsNew,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AttributeScope {
    AppInfo,
    Version,
}

impl Attribute {
    pub const ALL: [Attribute; 10] = [
        Attribute::Name,
        Attribute::Subtitle,
        Attribute::PrivacyPolicyUrl,
        Attribute::PrivacyChoicesUrl,
        Attribute::Description,
        Attribute::Keywords,
        Attribute::MarketingUrl,
        Attribute::PromotionalText,
        Attribute::SupportUrl,
        Attribute::WhatsNew,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Subtitle => "subtitle",
            Self::PrivacyPolicyUrl => "privacy_policy_url",
            Self::PrivacyChoicesUrl => "privacy_choices_url",
            Self::Description => "description",
            Self::Keywords => "keywords",
            Self::MarketingUrl => "marketing_url",
            Self::PromotionalText => "promotional_text",
            Self::SupportUrl => "support_url",
            Self::WhatsNew => "whats_new",
        }
    }

    pub fn vendor_key(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Subtitle => "subtitle",
            Self::PrivacyPolicyUrl => "privacyPolicyUrl",
            Self::PrivacyChoicesUrl => "privacyChoicesUrl",
            Self::Description => "description",
            Self::Keywords => "keywords",
            Self::MarketingUrl => "marketingUrl",
            Self::PromotionalText => "promotionalText",
            Self::SupportUrl => "supportUrl",
            Self::WhatsNew => "whatsNew",
        }
    }

    pub fn scope(self) -> AttributeScope {
        match self {
            Self::Name | Self::Subtitle | Self::PrivacyPolicyUrl | Self::PrivacyChoicesUrl => {
                AttributeScope::AppInfo
            }
            Self::Description
            | Self::Keywords
            | Self::MarketingUrl
            | Self::PromotionalText
            | Self::SupportUrl
            | Self::WhatsNew => AttributeScope::Version,
        }
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Attribute {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|attribute| attribute.as_str() == value)
            .ok_or(())
    }
}

/// A set of attribute edits for one localization. A `None` value is left
/// out of the vendor payload entirely; it does not clear the field.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AttributeChanges {
    entries: BTreeMap<Attribute, Option<String>>,
}

impl AttributeChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(attribute: Attribute, value: Option<String>) -> Self {
        Self::new().set(attribute, value)
    }

    pub fn set(mut self, attribute: Attribute, value: Option<String>) -> Self {
        self.entries.insert(attribute, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Attribute, Option<&str>)> {
        self.entries
            .iter()
            .map(|(attribute, value)| (*attribute, value.as_deref()))
    }

    /// All attributes in one patch must target the same resource type.
    pub fn scope(&self) -> Result<AttributeScope, CoreError> {
        let mut scopes = self.entries.keys().map(|attribute| attribute.scope());
        let Some(first) = scopes.next() else {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "attribute changes must name at least one attribute",
            ));
        };
        if scopes.any(|scope| scope != first) {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "app-info and version attributes cannot be patched together",
            ));
        }
        Ok(first)
    }

    pub fn vendor_attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        self.entries
            .iter()
            .filter_map(|(attribute, value)| {
                value.as_ref().map(|value| {
                    (
                        attribute.vendor_key().to_string(),
                        serde_json::Value::String(value.clone()),
                    )
                })
            })
            .collect()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct AttributeValue {
    pub localization_id: String,
    pub locale: String,
    pub value: Option<String>,
}
