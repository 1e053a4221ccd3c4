use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder used for text fields the backend left out.
pub const NOT_AVAILABLE: &str = "N/A";

/// Which kind of social event a feed item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedVariant {
    Review,
    EventPicture,
}

impl FeedVariant {
    /// Wire name used in the `type` discriminator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::EventPicture => "event_picture",
        }
    }

    /// Parse a `type` discriminator. Case-insensitive; accepts the common
    /// spellings of the event-picture tag.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "review" => Some(Self::Review),
            "event_picture" | "event-picture" | "eventpicture" => Some(Self::EventPicture),
            _ => None,
        }
    }
}

impl fmt::Display for FeedVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a feed item. Two items with the same key are the same logical
/// event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedKey {
    pub variant: FeedVariant,
    pub id: String,
}

impl FeedKey {
    pub fn new(variant: FeedVariant, id: impl Into<String>) -> Self {
        Self {
            variant,
            id: id.into(),
        }
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.variant, self.id)
    }
}

/// Venue an item is attached to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRef {
    pub id: Option<String>,
    pub name: String,
    pub country: String,
}

impl Default for BarRef {
    fn default() -> Self {
        Self {
            id: None,
            name: NOT_AVAILABLE.to_string(),
            country: NOT_AVAILABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRef {
    pub id: Option<String>,
    pub name: String,
}

impl Default for EventRef {
    fn default() -> Self {
        Self {
            id: None,
            name: NOT_AVAILABLE.to_string(),
        }
    }
}

/// A user tagged in an event picture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub user_handle: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub beer_name: String,
    /// Reviewer's score for this beer.
    pub rating: Option<f64>,
    /// Aggregate score across all reviews of the beer.
    pub global_rating: Option<f64>,
    pub text: String,
    pub reviewer: String,
    pub bar: BarRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPicture {
    pub picture_url: String,
    pub description: String,
    pub event: EventRef,
    pub bar: BarRef,
    pub tags: Vec<Tag>,
}

/// Variant-specific payload of a feed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedPayload {
    Review(Review),
    EventPicture(EventPicture),
}

impl FeedPayload {
    pub fn variant(&self) -> FeedVariant {
        match self {
            Self::Review(_) => FeedVariant::Review,
            Self::EventPicture(_) => FeedVariant::EventPicture,
        }
    }

    pub fn bar(&self) -> &BarRef {
        match self {
            Self::Review(review) => &review.bar,
            Self::EventPicture(picture) => &picture.bar,
        }
    }
}

/// One displayable social event.
///
/// Items are immutable once built: the lowercase search text is derived from
/// the payload at construction and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedItem {
    id: String,
    created_at: DateTime<Utc>,
    #[serde(flatten)]
    payload: FeedPayload,
    #[serde(skip)]
    searchable_text: String,
}

impl FeedItem {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>, payload: FeedPayload) -> Self {
        let searchable_text = searchable_text(&payload);
        Self {
            id: id.into(),
            created_at,
            payload,
            searchable_text,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn variant(&self) -> FeedVariant {
        self.payload.variant()
    }

    pub fn key(&self) -> FeedKey {
        FeedKey::new(self.variant(), self.id.clone())
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn payload(&self) -> &FeedPayload {
        &self.payload
    }

    pub fn as_review(&self) -> Option<&Review> {
        match &self.payload {
            FeedPayload::Review(review) => Some(review),
            FeedPayload::EventPicture(_) => None,
        }
    }

    pub fn as_event_picture(&self) -> Option<&EventPicture> {
        match &self.payload {
            FeedPayload::EventPicture(picture) => Some(picture),
            FeedPayload::Review(_) => None,
        }
    }

    /// Lowercased concatenation of the fields a search may match.
    pub fn searchable_text(&self) -> &str {
        &self.searchable_text
    }
}

fn searchable_text(payload: &FeedPayload) -> String {
    let bar = payload.bar();
    let mut parts: Vec<&str> = Vec::new();
    match payload {
        FeedPayload::Review(review) => {
            parts.push(&review.beer_name);
            parts.push(&review.reviewer);
        }
        FeedPayload::EventPicture(picture) => {
            parts.extend(picture.tags.iter().map(|tag| tag.user_handle.as_str()));
        }
    }
    parts.push(&bar.name);
    parts.push(&bar.country);
    parts.join("\n").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(beer: &str, reviewer: &str) -> FeedPayload {
        FeedPayload::Review(Review {
            beer_name: beer.to_string(),
            rating: Some(4.0),
            global_rating: None,
            text: String::new(),
            reviewer: reviewer.to_string(),
            bar: BarRef {
                id: Some("b1".to_string()),
                name: "The Tap Room".to_string(),
                country: "Chile".to_string(),
            },
        })
    }

    #[test]
    fn variant_parse_accepts_known_spellings() {
        assert_eq!(FeedVariant::parse("Review"), Some(FeedVariant::Review));
        assert_eq!(
            FeedVariant::parse("event_picture"),
            Some(FeedVariant::EventPicture)
        );
        assert_eq!(
            FeedVariant::parse(" EVENT-PICTURE "),
            Some(FeedVariant::EventPicture)
        );
        assert_eq!(FeedVariant::parse("checkin"), None);
    }

    #[test]
    fn searchable_text_covers_beer_bar_and_user() {
        let item = FeedItem::new("1", Utc::now(), review("Imperial Stout", "hoppy_hank"));
        let text = item.searchable_text();
        assert!(text.contains("imperial stout"));
        assert!(text.contains("hoppy_hank"));
        assert!(text.contains("the tap room"));
        assert!(text.contains("chile"));
        assert!(!text.contains("b1"));
    }

    #[test]
    fn searchable_text_for_pictures_uses_tagged_handles() {
        let payload = FeedPayload::EventPicture(EventPicture {
            picture_url: "https://img/1.jpg".to_string(),
            description: "launch night".to_string(),
            event: EventRef::default(),
            bar: BarRef::default(),
            tags: vec![
                Tag {
                    user_handle: "Ana".to_string(),
                },
                Tag {
                    user_handle: "bruno".to_string(),
                },
            ],
        });
        let item = FeedItem::new("p1", Utc::now(), payload);
        assert!(item.searchable_text().contains("ana"));
        assert!(item.searchable_text().contains("bruno"));
        assert!(item.searchable_text().contains("n/a"));
        assert!(!item.searchable_text().contains("launch"));
    }

    #[test]
    fn key_combines_variant_and_id() {
        let item = FeedItem::new("5", Utc::now(), review("IPA", "x"));
        assert_eq!(item.key(), FeedKey::new(FeedVariant::Review, "5"));
        assert_eq!(item.key().to_string(), "review:5");
    }
}
