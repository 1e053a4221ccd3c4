use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};

use crate::{BarRef, EventPicture, EventRef, FeedItem, FeedPayload, Review, Tag};

/// Base instant for fixtures; `at(n)` is `n` seconds after it.
pub const BASE_EPOCH: i64 = 1_700_000_000;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(BASE_EPOCH + secs, 0)
        .single()
        .unwrap_or_default()
}

/// Review of `beer` at `at(secs)` by "tester" at a Chilean bar.
pub fn review(id: &str, secs: i64, beer: &str, rating: f64) -> FeedItem {
    FeedItem::new(
        id,
        at(secs),
        FeedPayload::Review(Review {
            beer_name: beer.to_string(),
            rating: Some(rating),
            global_rating: None,
            text: String::new(),
            reviewer: "tester".to_string(),
            bar: BarRef {
                id: Some("bar-1".to_string()),
                name: "Test Bar".to_string(),
                country: "Chile".to_string(),
            },
        }),
    )
}

/// Event picture at `at(secs)` tagging `handles`.
pub fn picture(id: &str, secs: i64, handles: &[&str]) -> FeedItem {
    FeedItem::new(
        id,
        at(secs),
        FeedPayload::EventPicture(EventPicture {
            picture_url: format!("https://img.test/{id}.jpg"),
            description: String::new(),
            event: EventRef::default(),
            bar: BarRef::default(),
            tags: handles
                .iter()
                .map(|h| Tag {
                    user_handle: h.to_string(),
                })
                .collect(),
        }),
    )
}

/// Wire form of a review record, as the backend sends it.
pub fn review_json(id: u64, secs: i64, beer: &str, rating: f64) -> Value {
    json!({
        "type": "review",
        "id": id,
        "created_at": at(secs).to_rfc3339(),
        "beer": {"name": beer},
        "rating": rating,
        "user": {"handle": "tester"},
        "bar": {"id": "bar-1", "name": "Test Bar", "country": "Chile"}
    })
}

/// Wire form of an event-picture record.
pub fn picture_json(id: u64, secs: i64, handles: &[&str]) -> Value {
    let tags: Vec<Value> = handles
        .iter()
        .map(|h| json!({"user": {"handle": h}}))
        .collect();
    json!({
        "type": "event_picture",
        "id": id,
        "created_at": at(secs).to_rfc3339(),
        "picture_url": format!("https://img.test/{id}.jpg"),
        "tags": tags
    })
}
