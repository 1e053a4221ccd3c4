use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use brewfeed_core::{FeedItem, FeedPayload};
use brewfeed_feed::FeedView;
use brewfeed_live::ChannelState;

/// One human-readable line per item.
pub fn render_line(item: &FeedItem) -> String {
    let when = item.created_at().format("%Y-%m-%d %H:%M");
    match item.payload() {
        FeedPayload::Review(review) => {
            let rating = review
                .rating
                .map(|r| format!("{r:.1}"))
                .unwrap_or_else(|| "-".to_string());
            format!(
                "{when}  {} rated {} {rating} at {} ({})",
                review.reviewer, review.beer_name, review.bar.name, review.bar.country
            )
        }
        FeedPayload::EventPicture(picture) => {
            let tagged = if picture.tags.is_empty() {
                "someone".to_string()
            } else {
                picture
                    .tags
                    .iter()
                    .map(|tag| format!("@{}", tag.user_handle))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            format!(
                "{when}  {tagged} at {} / {} ({})",
                picture.event.name, picture.bar.name, picture.bar.country
            )
        }
    }
}

pub fn render_json(item: &FeedItem) -> Result<String> {
    serde_json::to_string(item).context("Failed to serialize feed item")
}

pub fn print_items(items: &[Arc<FeedItem>], json: bool) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for item in items {
        let line = if json {
            render_json(item)?
        } else {
            render_line(item)
        };
        writeln!(out, "{line}").context("Failed to write to stdout")?;
    }
    out.flush().context("Failed to write to stdout")?;
    Ok(())
}

/// Summary of the view for the status line on stderr.
pub fn status_line(view: &FeedView) -> String {
    let live = match (view.channel, view.reconnecting) {
        (ChannelState::Connected, _) => "live",
        (_, true) => "reconnecting",
        (ChannelState::Connecting, false) => "connecting",
        (ChannelState::Disconnected, false) => "offline",
    };
    let mut line = if view.search.trim().is_empty() {
        format!("[{live}] {} items", view.total)
    } else {
        format!(
            "[{live}] {} of {} items match \"{}\"",
            view.items.len(),
            view.total,
            view.search
        )
    };
    if view.loading {
        line.push_str(", loading");
    }
    if view.dropped > 0 {
        line.push_str(&format!(", {} malformed skipped", view.dropped));
    }
    if let Some(message) = view.message() {
        line.push_str(" - ");
        line.push_str(message);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use brewfeed_core::testing::{picture, review};

    #[test]
    fn review_line_mentions_beer_user_and_bar() {
        let line = render_line(&review("1", 0, "Imperial Stout", 4.5));
        assert!(line.contains("tester rated Imperial Stout 4.5"));
        assert!(line.contains("Test Bar (Chile)"));
    }

    #[test]
    fn picture_line_lists_tags() {
        let line = render_line(&picture("2", 0, &["ana", "bruno"]));
        assert!(line.contains("@ana, @bruno"));
        assert!(line.contains("N/A"));
    }

    #[test]
    fn json_carries_type_and_id() {
        let json = render_json(&review("7", 0, "IPA", 3.0)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "review");
        assert_eq!(value["id"], "7");
        assert_eq!(value["beer_name"], "IPA");
    }

    #[test]
    fn status_line_reports_search_and_warning() {
        let items = vec![Arc::new(review("1", 0, "Stout", 4.0))];
        let view = FeedView {
            items,
            total: 3,
            search: "stout".to_string(),
            active: true,
            reconnecting: true,
            connectivity_warning: Some("Live updates unavailable".to_string()),
            ..FeedView::default()
        };
        let line = status_line(&view);
        assert!(line.starts_with("[reconnecting] 1 of 3 items match \"stout\""));
        assert!(line.ends_with("Live updates unavailable"));
    }
}
