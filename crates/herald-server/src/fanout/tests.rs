#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::*;

struct FakePublisher {
    platform: &'static str,
    fail: bool,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakePublisher {
    fn ok(platform: &'static str) -> Arc<Self> {
        Arc::new(Self {
            platform,
            fail: false,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(platform: &'static str) -> Arc<Self> {
        Arc::new(Self {
            platform,
            fail: true,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    fn platform(&self) -> &'static str {
        self.platform
    }

    async fn publish(&self, announcement: &Announcement) -> Result<PostReference, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(PublishError::ApiError {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(PostReference {
            platform: self.platform.to_string(),
            post_id: format!("{}-{}", self.platform, announcement.stream_id),
            post_url: format!("https://{}.example/{}", self.platform, announcement.stream_id),
        })
    }
}

struct PanickingPublisher;

#[async_trait]
impl Publisher for PanickingPublisher {
    fn platform(&self) -> &'static str {
        BLUESKY
    }

    async fn publish(&self, _announcement: &Announcement) -> Result<PostReference, PublishError> {
        panic!("publisher blew up");
    }
}

fn stream() -> StreamRecord {
    StreamRecord {
        id: "s-1".to_string(),
        broadcaster_id: "42".to_string(),
        broadcaster_login: "shrimp".to_string(),
        broadcaster_name: "Shrimp".to_string(),
        title: "Building a synth".to_string(),
        category_name: "Music".to_string(),
        tags: vec!["English".to_string()],
        thumbnail_url: "https://cdn.example/live_user_shrimp-{width}x{height}.jpg".to_string(),
        started_at: "2024-05-01T10:00:00Z".to_string(),
        ..StreamRecord::default()
    }
}

fn announcement() -> Arc<Announcement> {
    let user = TrackedUser {
        broadcaster_id: "42".to_string(),
        login: "shrimp".to_string(),
        display_name: "Shrimp".to_string(),
        active: true,
        mastodon_handle: "@shrimp@social.example".to_string(),
    };
    let category = CategoryRule {
        name: "Music".to_string(),
        mastodon_tags: vec!["#Music".to_string()],
        bluesky_tags: vec!["#music".to_string(), "#live".to_string()],
    };
    Arc::new(Announcement::new(&stream(), &user, &category))
}

#[test]
fn announcement_fills_thumbnail_and_handle() {
    let a = announcement();
    assert_eq!(a.thumbnail_url, "https://cdn.example/live_user_shrimp-1280x720.jpg");
    assert_eq!(a.mastodon_handle, "shrimp@social.example");
    assert_eq!(a.url, "https://twitch.tv/shrimp");
}

#[test]
fn message_layout() {
    let a = announcement();
    assert_eq!(
        a.message(&a.streamer, &a.url, &a.bluesky_tags),
        "Shrimp is now streaming Music on Twitch: https://twitch.tv/shrimp\n\nBuilding a synth\n\n#music #live"
    );
    assert_eq!(
        a.message("Shrimp", "<https://twitch.tv/shrimp>", &[]),
        "Shrimp is now streaming Music on Twitch: <https://twitch.tv/shrimp>\n\nBuilding a synth"
    );

    let untitled = Announcement {
        title: String::new(),
        ..Arc::unwrap_or_clone(a)
    };
    assert_eq!(
        untitled.message("Shrimp", "https://twitch.tv/shrimp", &["#music".to_string()]),
        "Shrimp is now streaming Music on Twitch: https://twitch.tv/shrimp\n\n\n\n#music"
    );
}

#[tokio::test]
async fn one_failure_keeps_other_posts() {
    let discord = FakePublisher::ok(DISCORD);
    let mastodon = FakePublisher::failing(MASTODON);
    let bluesky = FakePublisher::ok(BLUESKY);
    let fanout = FanoutPublisher::new(vec![
        discord.clone() as Arc<dyn Publisher>,
        mastodon.clone() as Arc<dyn Publisher>,
        bluesky.clone() as Arc<dyn Publisher>,
    ]);

    let outcome = fanout.publish(announcement()).await;

    assert_eq!(outcome.posted.len(), 2);
    assert_eq!(outcome.failed, vec![MASTODON.to_string()]);
    for publisher in [&discord, &mastodon, &bluesky] {
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 1);
    }

    let mut record = stream();
    outcome.apply_to(&mut record);
    assert_eq!(record.discord_post_id, "discord-s-1");
    assert_eq!(record.bluesky_post_url, "https://bluesky.example/s-1");
    assert!(record.mastodon_post_id.is_empty());
}

#[tokio::test]
async fn panicking_publisher_counts_as_failure() {
    let fanout = FanoutPublisher::new(vec![
        FakePublisher::ok(DISCORD) as Arc<dyn Publisher>,
        Arc::new(PanickingPublisher) as Arc<dyn Publisher>,
    ]);

    let outcome = fanout.publish(announcement()).await;

    assert_eq!(outcome.posted.len(), 1);
    assert_eq!(outcome.posted[0].platform, DISCORD);
    assert_eq!(outcome.failed, vec![BLUESKY.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn publishers_run_concurrently() {
    let slow = |platform| -> Arc<dyn Publisher> {
        Arc::new(FakePublisher {
            platform,
            fail: false,
            delay: Duration::from_secs(5),
            calls: AtomicUsize::new(0),
        })
    };
    let fanout = FanoutPublisher::new(vec![slow(DISCORD), slow(MASTODON), slow(BLUESKY)]);

    let started = tokio::time::Instant::now();
    let outcome = fanout.publish(announcement()).await;

    assert_eq!(outcome.posted.len(), 3);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn no_publishers_is_empty_outcome() {
    let outcome = FanoutPublisher::default().publish(announcement()).await;
    assert_eq!(outcome, FanoutOutcome::default());
}

#[test]
fn unknown_platform_is_ignored() {
    let outcome = FanoutOutcome {
        posted: vec![PostReference {
            platform: "myspace".to_string(),
            post_id: "1".to_string(),
            post_url: "https://myspace.example/1".to_string(),
        }],
        failed: Vec::new(),
    };
    let mut record = stream();
    outcome.apply_to(&mut record);
    assert_eq!(record, stream());
}
