//! Wire models shared with the marketplace backend.

use serde::{Deserialize, Serialize};

use crate::hierarchy::{HierarchySelector, SelectionError};

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Profile returned by the "current user" endpoint.
///
/// Opaque to the core beyond display; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub phone_verified: bool,
}

impl UserProfile {
    /// The user id rendered as a string (the backend may send a number or a UUID).
    pub fn id_string(&self) -> Option<String> {
        match self.id.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Best label for display: name, then email, then phone.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.email.as_deref())
            .or(self.phone_number.as_deref())
            .unwrap_or("unknown user")
    }
}

/// Body of a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Body of a successful token refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access: String,
    /// Present when the backend rotates refresh tokens.
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Registration form.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Registration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub full_name: String,
    pub password: String,
}

/// Partial profile update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

// ---------------------------------------------------------------------------
// Ads
// ---------------------------------------------------------------------------

/// Listing entry as returned by the ads endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdSummary {
    pub id: u64,
    pub title: String,
    /// Display price, already formatted with the currency symbol.
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub ad_type: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Single ad with contact details and media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdDetail {
    #[serde(flatten)]
    pub summary: AdSummary,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub contact_info: Option<serde_json::Value>,
    #[serde(default)]
    pub media: Vec<serde_json::Value>,
    #[serde(default)]
    pub is_expired: bool,
    #[serde(default)]
    pub author_id: Option<serde_json::Value>,
}

/// Limit/offset pagination block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

/// One page of ads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdPage {
    pub data: Vec<AdSummary>,
    pub pagination: Pagination,
}

/// The listing endpoint answers paginated on the current routes and with a
/// bare array on the legacy ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum AdListingBody {
    Paginated(AdPage),
    Bare(Vec<AdSummary>),
}

impl AdListingBody {
    pub(crate) fn into_page(self, offset: u64) -> AdPage {
        match self {
            AdListingBody::Paginated(page) => page,
            AdListingBody::Bare(data) => {
                let total = offset + data.len() as u64;
                AdPage {
                    pagination: Pagination {
                        total,
                        limit: data.len() as u64,
                        offset,
                        has_next: false,
                        has_previous: offset > 0,
                    },
                    data,
                }
            }
        }
    }
}

/// User-entered fields of a new ad.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdFields {
    pub title: String,
    pub description: String,
    pub price: String,
    pub currency_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_symbol: Option<String>,
    pub ad_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
}

/// Create-ad payload: fields plus the ids picked in the category and
/// location selectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAd {
    #[serde(flatten)]
    pub fields: AdFields,
    pub subcategory: u64,
    pub country: u64,
    pub province: u64,
    pub city: u64,
}

impl NewAd {
    /// Build a payload from complete selections.
    ///
    /// `category` must have a subcategory picked; `location` must have
    /// country, province and city picked.
    pub fn from_selections(
        fields: AdFields,
        category: &HierarchySelector,
        location: &HierarchySelector,
    ) -> Result<Self, SelectionError> {
        let subcategory = category.require(1)?;
        let country = location.require(0)?;
        let province = location.require(1)?;
        let city = location.require(2)?;
        Ok(Self {
            fields,
            subcategory,
            country,
            province,
            city,
        })
    }
}

/// An image to attach to an ad.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}
