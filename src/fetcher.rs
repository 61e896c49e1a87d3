//! Story and comment fetching on top of [`HnClient`].
//!
//! Comment trees are walked with an explicit depth-tagged stack rather
//! than recursion, so a pathological thread cannot blow the call stack
//! and the depth cutoff is a plain comparison.

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::hn_client::HnClient;

const WEEK_SECS: i64 = 7 * 24 * 3600;

/// Fetch the first `max_stories` ids from the top list, keeping the
/// stories posted within the last seven days.
///
/// Items that are missing, deleted, not stories, or older than the
/// window are skipped, so the result may be shorter than the cap. The
/// top-stories ordering is preserved.
pub async fn fetch_top_stories_from_last_week(
    client: &HnClient,
    max_stories: usize,
) -> Result<Vec<Value>> {
    let ids = client.top_stories().await?;
    let cutoff = Utc::now().timestamp() - WEEK_SECS;

    let mut stories = Vec::new();
    for id in ids.into_iter().take(max_stories) {
        let Some(item) = client.item(id).await? else {
            continue;
        };
        if item.get("type").and_then(Value::as_str) != Some("story") {
            continue;
        }
        let Some(time) = item.get("time").and_then(Value::as_i64) else {
            continue;
        };
        if time < cutoff {
            continue;
        }
        stories.push(item);
    }

    info!(count = stories.len(), "fetched top stories from last week");
    Ok(stories)
}

/// Fetch the full comment tree under one story, depth-first, capped at
/// `max_depth` levels.
///
/// The story's direct children are depth 0. Children are pushed in
/// reverse so they pop in their original order.
pub async fn fetch_comments_for_story(
    client: &HnClient,
    story: &Value,
    max_depth: u32,
) -> Result<Vec<Value>> {
    let story_id = story.get("id").and_then(Value::as_i64).unwrap_or(-1);
    let mut stack: Vec<(i64, u32)> = Vec::new();

    if let Some(kids) = story.get("kids").and_then(Value::as_array) {
        for kid in kids.iter().rev() {
            if let Some(id) = kid.as_i64() {
                stack.push((id, 0));
            }
        }
    }

    let mut comments = Vec::new();
    while let Some((id, depth)) = stack.pop() {
        if depth >= max_depth {
            warn!(story_id, comment_id = id, depth, "comment depth cutoff reached");
            continue;
        }
        let Some(item) = client.item(id).await? else {
            continue;
        };
        if item.get("type").and_then(Value::as_str) != Some("comment") {
            continue;
        }
        if let Some(kids) = item.get("kids").and_then(Value::as_array) {
            for kid in kids.iter().rev() {
                if let Some(kid_id) = kid.as_i64() {
                    stack.push((kid_id, depth + 1));
                }
            }
        }
        comments.push(item);
    }

    Ok(comments)
}
