use tokio::sync::broadcast::{self, error::RecvError};

use crate::app::{EstuaryError, Result};
use crate::domain::{NewsItem, ReadState};
use crate::engine::{Engine, EngineEvent};
use crate::store::Store;

/// Add a feed and wait for its first update.
pub async fn add_feed(engine: &Engine, url: &str, name: Option<&str>) -> Result<i64> {
    if let Some(existing) = engine.store().get_feed_by_url(url)? {
        println!("Feed already exists: {}", existing.xml_url);
        return Ok(existing.id);
    }

    let mut events = engine.subscribe();
    let id = engine.add_feed(url, name)?;
    println!("Added feed: {} (id {})", url, id);

    wait_for_update(engine, &mut events).await;
    if let Some(feed) = engine.store().get_feed(id)? {
        if let Some(title) = feed.title {
            println!("Feed title: {}", title);
        }
        println!("Fetched {} items", engine.news(id)?.len());
    }
    Ok(id)
}

pub fn remove_feed(engine: &Engine, url: &str) -> Result<()> {
    let feed = engine
        .store()
        .get_feed_by_url(url)?
        .ok_or_else(|| EstuaryError::FeedNotFound(url.to_string()))?;

    engine.delete_feed(feed.id)?;
    println!("Removed feed: {}", url);
    Ok(())
}

/// Request an update and wait until every fetched document is merged.
pub async fn update_feeds(engine: &Engine, url: Option<&str>) -> Result<()> {
    let mut events = engine.subscribe();

    let queued = match url {
        Some(url) => usize::from(engine.request_url_update(url)?),
        None => engine.request_all_feeds_update()?,
    };
    if queued == 0 {
        println!("No feeds to update");
        return Ok(());
    }
    println!("Updating {} feeds...", queued);

    let new_items = wait_for_update(engine, &mut events).await;

    let totals = engine.totals()?;
    println!(
        "Update complete: {} new items, {} unread",
        new_items, totals.unread
    );
    Ok(())
}

/// Wait for the end of the running update cycle; returns the number of new
/// items it brought.
async fn wait_for_update(engine: &Engine, events: &mut broadcast::Receiver<EngineEvent>) -> i64 {
    let mut new_items = 0;
    loop {
        match events.recv().await {
            Ok(EngineEvent::NewContent { delta }) => new_items += delta,
            Ok(EngineEvent::UpdateDone) => break,
            Ok(_) => {}
            Err(RecvError::Lagged(_)) => {
                if engine.progress().0 == 0 {
                    break;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
    new_items
}

pub fn list_feeds(engine: &Engine, json: bool) -> Result<()> {
    let feeds = engine.feeds()?;

    if json {
        println!("{}", to_json(&feeds)?);
        return Ok(());
    }

    if feeds.is_empty() {
        println!("No feeds");
        return Ok(());
    }

    for feed in feeds {
        println!(
            "[{}] {} ({} unread)\n  {}",
            feed.id,
            feed.display_title(),
            feed.unread,
            feed.xml_url
        );
    }

    Ok(())
}

pub fn list_items(engine: &Engine, feed_id: Option<i64>, json: bool) -> Result<()> {
    let items: Vec<NewsItem> = match feed_id {
        Some(id) => engine.news(id)?,
        None => {
            let mut all = Vec::new();
            for feed in engine.feeds()? {
                all.extend(engine.news(feed.id)?);
            }
            all
        }
    };

    if json {
        println!("{}", to_json(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No items");
        return Ok(());
    }

    for item in items {
        let read_marker = if item.read == ReadState::Unread {
            "●"
        } else {
            " "
        };
        let star = if item.starred { "*" } else { " " };

        let date = item
            .timestamp()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "          ".to_string());

        println!(
            "{}{} {:>6} {} {}",
            read_marker,
            star,
            item.id,
            date,
            item.display_title()
        );
        if let Some(link) = item.link() {
            println!("{:>21}{}", "", link);
        }
    }

    Ok(())
}

pub fn mark_read(engine: &Engine, id: i64, read: bool) -> Result<()> {
    engine.mark_read(id, read)?;
    println!("Item {} marked {}", id, if read { "read" } else { "unread" });
    Ok(())
}

pub fn mark_starred(engine: &Engine, id: i64, starred: bool) -> Result<()> {
    engine.mark_starred(id, starred)?;
    println!(
        "Item {} {}",
        id,
        if starred { "starred" } else { "unstarred" }
    );
    Ok(())
}

pub fn delete_item(engine: &Engine, id: i64) -> Result<()> {
    engine.delete_item(id)?;
    println!("Item {} deleted", id);
    Ok(())
}

pub async fn cleanup(engine: &Engine) -> Result<()> {
    match engine.flush().await? {
        Some(report) => println!(
            "Cleanup complete: {} feeds, {} items pruned, {} scrubbed",
            report.feeds, report.pruned, report.scrubbed
        ),
        None => println!("A flush is already running"),
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| EstuaryError::Other(e.to_string()))
}
