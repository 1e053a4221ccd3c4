use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::item::{
    BarRef, EventPicture, EventRef, FeedItem, FeedPayload, FeedVariant, NOT_AVAILABLE, Review,
    Tag,
};

/// Epoch values above this are taken to be milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// A raw record that could not become a [`FeedItem`]. Only identity problems
/// are fatal for a record; every other field falls back to a neutral default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MalformedItemError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("record has no `type` and no variant hint (id: {id:?})")]
    MissingVariant { id: Option<String> },
    #[error("unknown record type `{kind}` (id: {id:?})")]
    UnknownVariant { kind: String, id: Option<String> },
    #[error("{variant} record has no `id`")]
    MissingId { variant: FeedVariant },
}

/// Result of normalizing a batch: the good items plus how many were dropped.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub items: Vec<FeedItem>,
    pub dropped: usize,
}

/// Converts raw backend records into [`FeedItem`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemNormalizer;

impl ItemNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize one record. `hint` is used only when the record carries no
    /// `type` discriminator of its own.
    pub fn normalize(
        &self,
        raw: &Value,
        hint: Option<FeedVariant>,
    ) -> Result<FeedItem, MalformedItemError> {
        let obj = raw.as_object().ok_or(MalformedItemError::NotAnObject)?;
        let id = id_field(obj);

        let variant = match str_field(obj, &["type"]) {
            Some(kind) => match FeedVariant::parse(&kind) {
                Some(variant) => {
                    if hint.is_some_and(|h| h != variant) {
                        debug!("record type {variant} overrides hint {hint:?}");
                    }
                    variant
                }
                None => return Err(MalformedItemError::UnknownVariant { kind, id }),
            },
            None => hint.ok_or(MalformedItemError::MissingVariant { id: id.clone() })?,
        };

        let id = id.ok_or(MalformedItemError::MissingId { variant })?;
        let created_at = timestamp_field(obj).unwrap_or_else(|| {
            debug!("{variant}:{id} has no usable created_at, sorting it last");
            DateTime::<Utc>::default()
        });

        let payload = match variant {
            FeedVariant::Review => FeedPayload::Review(review(obj)),
            FeedVariant::EventPicture => FeedPayload::EventPicture(event_picture(obj)),
        };

        Ok(FeedItem::new(id, created_at, payload))
    }

    /// Normalize every record, logging and counting the ones that fail.
    pub fn normalize_batch<'a>(
        &self,
        raws: impl IntoIterator<Item = &'a Value>,
        hint: Option<FeedVariant>,
    ) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        for raw in raws {
            match self.normalize(raw, hint) {
                Ok(item) => batch.items.push(item),
                Err(e) => {
                    warn!("Dropping malformed feed record: {e}");
                    batch.dropped += 1;
                }
            }
        }
        batch
    }
}

fn review(obj: &Map<String, Value>) -> Review {
    let beer_name = str_field(obj, &["beer_name", "beerName"])
        .or_else(|| nested_str(obj, "beer", &["name"]));
    let reviewer = nested_str(obj, "user", &["handle", "username"])
        .or_else(|| str_field(obj, &["username", "handle"]));

    Review {
        beer_name: or_na(beer_name),
        rating: num_field(obj, &["rating"]),
        global_rating: num_field(obj, &["global_rating", "globalRating"]),
        text: or_na(str_field(obj, &["text"])),
        reviewer: or_na(reviewer),
        bar: bar(obj),
    }
}

fn event_picture(obj: &Map<String, Value>) -> EventPicture {
    let event = match obj.get("event").and_then(Value::as_object) {
        Some(event) => EventRef {
            id: id_field(event),
            name: or_na(str_field(event, &["name"])),
        },
        None => EventRef::default(),
    };

    let tags = obj
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(tag).collect())
        .unwrap_or_default();

    EventPicture {
        picture_url: or_na(str_field(obj, &["picture_url", "pictureUrl", "image_url"])),
        description: or_na(str_field(obj, &["description"])),
        event,
        bar: bar(obj),
        tags,
    }
}

fn bar(obj: &Map<String, Value>) -> BarRef {
    match obj.get("bar").and_then(Value::as_object) {
        Some(bar) => BarRef {
            id: id_field(bar),
            name: or_na(str_field(bar, &["name"])),
            country: or_na(str_field(bar, &["country"])),
        },
        None => BarRef::default(),
    }
}

fn tag(raw: &Value) -> Option<Tag> {
    let obj = raw.as_object()?;
    let handle = nested_str(obj, "user", &["handle", "username"])
        .or_else(|| str_field(obj, &["handle", "username"]))?;
    Some(Tag {
        user_handle: handle,
    })
}

fn or_na(value: Option<String>) -> String {
    value.unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// First non-empty string among `keys`.
fn str_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn nested_str(obj: &Map<String, Value>, parent: &str, keys: &[&str]) -> Option<String> {
    obj.get(parent)
        .and_then(Value::as_object)
        .and_then(|inner| str_field(inner, keys))
}

fn num_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Ids may arrive as strings or integers.
fn id_field(obj: &Map<String, Value>) -> Option<String> {
    match obj.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn timestamp_field(obj: &Map<String, Value>) -> Option<DateTime<Utc>> {
    let raw = obj.get("created_at").or_else(|| obj.get("createdAt"))?;
    match raw {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let epoch = n.as_i64()?;
            if epoch.abs() > MILLIS_THRESHOLD {
                DateTime::from_timestamp_millis(epoch)
            } else {
                DateTime::from_timestamp(epoch, 0)
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_full_review() {
        let raw = json!({
            "type": "review",
            "id": 5,
            "created_at": "2024-03-01T12:00:00Z",
            "beer": {"name": "Oatmeal Stout"},
            "rating": 4,
            "global_rating": "3.8",
            "text": "Silky",
            "user": {"handle": "hank"},
            "bar": {"id": 9, "name": "Barrel House", "country": "Chile"}
        });
        let item = ItemNormalizer::new().normalize(&raw, None).unwrap();
        assert_eq!(item.id(), "5");
        assert_eq!(item.variant(), FeedVariant::Review);
        assert_eq!(item.created_at().to_rfc3339(), "2024-03-01T12:00:00+00:00");

        let review = item.as_review().unwrap();
        assert_eq!(review.beer_name, "Oatmeal Stout");
        assert_eq!(review.rating, Some(4.0));
        assert_eq!(review.global_rating, Some(3.8));
        assert_eq!(review.reviewer, "hank");
        assert_eq!(review.bar.id.as_deref(), Some("9"));
        assert_eq!(review.bar.country, "Chile");
    }

    #[test]
    fn missing_optional_fields_become_defaults() {
        let raw = json!({"type": "event_picture", "id": "p1", "tags": null});
        let item = ItemNormalizer::new().normalize(&raw, None).unwrap();
        let picture = item.as_event_picture().unwrap();
        assert_eq!(picture.bar.name, NOT_AVAILABLE);
        assert_eq!(picture.event.name, NOT_AVAILABLE);
        assert_eq!(picture.description, NOT_AVAILABLE);
        assert!(picture.tags.is_empty());
        assert_eq!(item.created_at(), DateTime::<Utc>::default());
    }

    #[test]
    fn wrongly_typed_optional_fields_are_ignored() {
        let raw = json!({
            "type": "review",
            "id": "r1",
            "rating": {"value": 3},
            "bar": "not an object",
            "beer_name": 42
        });
        let review_item = ItemNormalizer::new().normalize(&raw, None).unwrap();
        let review = review_item.as_review().unwrap();
        assert_eq!(review.rating, None);
        assert_eq!(review.bar, BarRef::default());
        assert_eq!(review.beer_name, NOT_AVAILABLE);
    }

    #[test]
    fn tags_accept_nested_and_flat_handles() {
        let raw = json!({
            "type": "event_picture",
            "id": 1,
            "tags": [{"user": {"handle": "ana"}}, {"handle": "bruno"}, {"nope": 1}, 7]
        });
        let item = ItemNormalizer::new().normalize(&raw, None).unwrap();
        let handles: Vec<_> = item
            .as_event_picture()
            .unwrap()
            .tags
            .iter()
            .map(|t| t.user_handle.as_str())
            .collect();
        assert_eq!(handles, vec!["ana", "bruno"]);
    }

    #[test]
    fn hint_used_only_without_type() {
        let normalizer = ItemNormalizer::new();
        let untyped = json!({"id": 3});
        let item = normalizer
            .normalize(&untyped, Some(FeedVariant::EventPicture))
            .unwrap();
        assert_eq!(item.variant(), FeedVariant::EventPicture);

        let typed = json!({"id": 3, "type": "review"});
        let item = normalizer
            .normalize(&typed, Some(FeedVariant::EventPicture))
            .unwrap();
        assert_eq!(item.variant(), FeedVariant::Review);
    }

    #[test]
    fn identity_errors() {
        let normalizer = ItemNormalizer::new();
        assert_eq!(
            normalizer.normalize(&json!([1, 2]), None),
            Err(MalformedItemError::NotAnObject)
        );
        assert_eq!(
            normalizer.normalize(&json!({"id": 1}), None),
            Err(MalformedItemError::MissingVariant {
                id: Some("1".to_string())
            })
        );
        assert_eq!(
            normalizer.normalize(&json!({"type": "review", "id": "  "}), None),
            Err(MalformedItemError::MissingId {
                variant: FeedVariant::Review
            })
        );
        assert!(matches!(
            normalizer.normalize(&json!({"type": "checkin", "id": 2}), None),
            Err(MalformedItemError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn epoch_timestamps_in_seconds_and_millis() {
        let normalizer = ItemNormalizer::new();
        let secs = normalizer
            .normalize(&json!({"type": "review", "id": 1, "createdAt": 1_700_000_000}), None)
            .unwrap();
        let millis = normalizer
            .normalize(
                &json!({"type": "review", "id": 2, "created_at": 1_700_000_000_000i64}),
                None,
            )
            .unwrap();
        assert_eq!(secs.created_at(), millis.created_at());
    }

    #[test]
    fn batch_counts_dropped_records() {
        let raws = vec![
            json!({"type": "review", "id": 1}),
            json!({"type": "review"}),
            json!("garbage"),
            json!({"type": "event_picture", "id": 2}),
        ];
        let batch = ItemNormalizer::new().normalize_batch(&raws, None);
        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.dropped, 2);
    }
}
