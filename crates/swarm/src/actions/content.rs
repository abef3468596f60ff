//! Randomized request content.
//!
//! Text pools are small on purpose: the server under test should see
//! repeated hashtags so tag timelines and search have something to return.

use crate::client::{CreateListRequest, PostStatusRequest, UpdateCredentialsRequest, Visibility};
use rand::Rng;

pub const SAMPLE_HASHTAGS: [&str; 4] = ["#mastodon", "#mystodon", "#antisocial", "#technoo"];

pub const SAMPLE_CONTENT: [&str; 5] = [
    "Am alive",
    "Non stop pop",
    "Testing the long way",
    "Deep thoughts",
    "Traffic crazy",
];

pub const REPLY_TEXTS: [&str; 5] = ["No", "Yes", "Hmmm", "Absolutely", "Absolutely not!"];

pub const BIO_UPDATES: [&str; 4] = ["I like turtles", "Nyooom", "Hooper", "GOAT"];

pub const LIST_NAMES: [&str; 4] = ["Basketball", "Friends", "Hockey", "INTeresting People"];

pub const USER_SEARCH_TERMS: [&str; 5] = ["test", "user", "admin", "bot", "demo"];

const EXTRA_CONTENT_SEARCH_TERMS: [&str; 3] = ["mastodon", "test", "hello"];

const VISIBILITIES: [Visibility; 3] = [Visibility::Public, Visibility::Unlisted, Visibility::Private];

/// Page size used by timeline and notification fetches.
pub const TIMELINE_LIMIT: u32 = 30;

/// Page size used by searches.
pub const SEARCH_LIMIT: u32 = 10;

fn pick<'a, T, R: Rng + ?Sized>(rng: &mut R, items: &'a [T]) -> &'a T {
    &items[rng.gen_range(0..items.len())]
}

/// A sample hashtag without the leading `#`, for tag timeline paths.
pub fn hashtag_name<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    let tag: &'static str = *pick(rng, &SAMPLE_HASHTAGS);
    tag.trim_start_matches('#')
}

/// Public timeline path, federated or local with equal odds.
pub fn public_timeline_path<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    if rng.gen_bool(0.5) {
        "/api/v1/timelines/public"
    } else {
        "/api/v1/timelines/public?local=true"
    }
}

/// `"{content} {hashtag} #{1..=1000}"`.
pub fn status_text<R: Rng + ?Sized>(rng: &mut R) -> String {
    let content = pick(rng, &SAMPLE_CONTENT);
    let hashtag = pick(rng, &SAMPLE_HASHTAGS);
    format!("{} {} #{}", content, hashtag, rng.gen_range(1..=1000))
}

/// Body for a plain status with random visibility, sensitive one time in four.
pub fn status_body<R: Rng + ?Sized>(rng: &mut R) -> PostStatusRequest {
    PostStatusRequest {
        status: status_text(rng),
        visibility: *pick(rng, &VISIBILITIES),
        sensitive: Some(rng.gen_ratio(1, 4)),
        media_ids: None,
        in_reply_to_id: None,
    }
}

/// Body for a public status carrying an empty media list.
pub fn media_status_body<R: Rng + ?Sized>(rng: &mut R) -> PostStatusRequest {
    PostStatusRequest {
        status: format!("Check out this! {}", pick(rng, &SAMPLE_HASHTAGS)),
        visibility: Visibility::Public,
        sensitive: None,
        media_ids: Some(Vec::new()),
        in_reply_to_id: None,
    }
}

/// Body for a public reply to `in_reply_to_id`.
pub fn reply_body<R: Rng + ?Sized>(rng: &mut R, in_reply_to_id: &str) -> PostStatusRequest {
    PostStatusRequest {
        status: pick(rng, &REPLY_TEXTS).to_string(),
        visibility: Visibility::Public,
        sensitive: None,
        media_ids: None,
        in_reply_to_id: Some(in_reply_to_id.to_string()),
    }
}

/// Body for a profile update with a random bio and display name.
pub fn profile_update<R: Rng + ?Sized>(rng: &mut R) -> UpdateCredentialsRequest {
    UpdateCredentialsRequest {
        note: pick(rng, &BIO_UPDATES).to_string(),
        display_name: format!("TestUser{}", rng.gen_range(1..=500)),
    }
}

/// Body for a new list, `"{name} {1..=100}"`.
pub fn list_body<R: Rng + ?Sized>(rng: &mut R) -> CreateListRequest {
    CreateListRequest {
        title: format!("{} {}", pick(rng, &LIST_NAMES), rng.gen_range(1..=100)),
    }
}

/// Query for an account search.
pub fn user_search_term<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    *pick(rng, &USER_SEARCH_TERMS)
}

/// Query for a status search: a hashtag or one of a few plain words.
pub fn content_search_term<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    let total = SAMPLE_HASHTAGS.len() + EXTRA_CONTENT_SEARCH_TERMS.len();
    let idx = rng.gen_range(0..total);
    match SAMPLE_HASHTAGS.get(idx) {
        Some(tag) => *tag,
        None => EXTRA_CONTENT_SEARCH_TERMS[idx - SAMPLE_HASHTAGS.len()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_status_text_shape() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..100 {
            let text = status_text(&mut rng);
            let parts: Vec<_> = text.rsplitn(3, ' ').collect();
            let number: u32 = parts[0].trim_start_matches('#').parse().unwrap();
            assert!((1..=1000).contains(&number));
            assert!(SAMPLE_HASHTAGS.contains(&parts[1]));
            assert!(SAMPLE_CONTENT.contains(&parts[2]));
        }
    }

    #[test]
    fn test_sensitive_is_minority() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let sensitive = (0..4000)
            .filter(|_| status_body(&mut rng).sensitive == Some(true))
            .count();
        // One in four, with generous slack.
        assert!((800..1200).contains(&sensitive), "got {}", sensitive);
    }

    #[test]
    fn test_hashtag_name_has_no_hash() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..20 {
            let tag = hashtag_name(&mut rng);
            assert!(!tag.starts_with('#'));
            assert!(SAMPLE_HASHTAGS.contains(&format!("#{}", tag).as_str()));
        }
    }

    #[test]
    fn test_content_search_covers_both_pools() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let terms: std::collections::HashSet<_> =
            (0..500).map(|_| content_search_term(&mut rng)).collect();
        assert!(terms.contains("#technoo"));
        assert!(terms.contains("hello"));
        assert_eq!(terms.len(), 7);
    }

    #[test]
    fn test_reply_and_list_bodies() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let reply = reply_body(&mut rng, "555");
        assert_eq!(reply.in_reply_to_id.as_deref(), Some("555"));
        assert_eq!(reply.visibility, Visibility::Public);
        assert!(REPLY_TEXTS.contains(&reply.status.as_str()));

        let list = list_body(&mut rng);
        let (name, number) = list.title.rsplit_once(' ').unwrap();
        assert!(LIST_NAMES.contains(&name));
        assert!((1..=100).contains(&number.parse::<u32>().unwrap()));
    }
}
