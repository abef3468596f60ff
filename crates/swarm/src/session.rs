//! Simulated-user sessions.
//!
//! A [`SimUser`] owns everything about one virtual user: its credential, the
//! id of its last post, the accounts it followed and the posts it bookmarked.
//! None of it is shared, so nothing here locks.

use crate::accounts::AssignError;
use crate::actions::{content, Action, ActionTable};
use crate::client::{ApiRequest, ApiResponse, ClientError, MastodonClient, StatusResponse};
use crate::context::SwarmContext;
use fediload_types::{AccountId, Credential, StatusId};
use indexmap::IndexSet;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Duration;
use tracing::{debug, trace};

/// Follows kept before `cleanup_old_data` trims.
const MAX_FOLLOWED: usize = 20;
/// Follows left after a trim.
const KEEP_FOLLOWED: usize = 10;
/// Bookmarks kept before `cleanup_old_data` trims.
const MAX_BOOKMARKED: usize = 15;
/// Bookmarks left after a trim.
const KEEP_BOOKMARKED: usize = 8;

/// Metrics label for unfollow calls made during session teardown.
pub const ON_STOP_UNFOLLOW: &str = "on_stop_unfollow";
/// Metrics label for unbookmark calls made during session teardown.
pub const ON_STOP_UNBOOKMARK: &str = "on_stop_unbookmark";

/// Per-session bookkeeping.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// The credential this session acts as.
    pub credential: Credential,

    /// Most recently created post, if the last successful post returned an id.
    pub last_post_id: Option<StatusId>,

    /// Accounts followed during this session, oldest first.
    pub followed: IndexSet<AccountId>,

    /// Posts bookmarked during this session, oldest first.
    pub bookmarked: IndexSet<StatusId>,

    /// Every other account in the pool; computed once at session start.
    pub peers: Vec<AccountId>,
}

impl SessionState {
    fn new(credential: Credential, peers: Vec<AccountId>) -> Self {
        Self {
            credential,
            last_post_id: None,
            followed: IndexSet::new(),
            bookmarked: IndexSet::new(),
            peers,
        }
    }

    fn clear(&mut self) {
        self.last_post_id = None;
        self.followed.clear();
        self.bookmarked.clear();
        self.peers.clear();
    }
}

/// What happened when a session performed an action.
#[derive(Debug)]
pub enum ActionOutcome {
    /// The request went out and a response came back (any status).
    Response(ApiResponse),

    /// Nothing was sent: a precondition was not met, or the action is
    /// local-only.
    NoRequest,

    /// The request failed below HTTP (connect, timeout, reset).
    Error(ClientError),
}

/// Local state change to apply once a response is known.
enum Bookkeeping {
    None,
    RecordPost,
    Bookmarked(StatusId),
    Unbookmarked(StatusId),
    Followed(AccountId),
    Unfollowed(AccountId),
}

/// One simulated user.
pub struct SimUser {
    /// Cursor value of this session's assignment.
    index: u64,
    client: MastodonClient,
    state: SessionState,
    rng: ChaCha8Rng,
}

impl SimUser {
    /// Session-start hook: take the next credential and compute the peer list.
    ///
    /// Randomness is seeded from `seed` with the assignment cursor as stream, so
    /// a run with the same seed replays the same choices per user.
    pub fn on_start(
        ctx: &SwarmContext,
        client: MastodonClient,
        seed: u64,
    ) -> Result<Self, AssignError> {
        let assignment = ctx.assigner().next_assignment()?;
        let peers = ctx.pool().peers_of(&assignment.credential.account_id);

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(assignment.cursor);

        debug!(
            user = assignment.cursor,
            account_id = %assignment.credential.account_id,
            peers = peers.len(),
            "Session started"
        );

        Ok(Self {
            index: assignment.cursor,
            client,
            state: SessionState::new(assignment.credential, peers),
            rng,
        })
    }

    /// Cursor value this session was assigned with.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Pick the next action from the table.
    pub fn next_action(&mut self, table: &ActionTable) -> Action {
        table.choose(&mut self.rng)
    }

    /// Random think time in `[min, max]`.
    pub fn wait_time(&mut self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    /// Perform one action and update bookkeeping from the response.
    pub async fn perform(&mut self, action: Action) -> ActionOutcome {
        let Some((request, bookkeeping)) = self.plan(action) else {
            trace!(user = self.index, %action, "Nothing to send");
            return ActionOutcome::NoRequest;
        };

        match self
            .client
            .send(&request, Some(&self.state.credential))
            .await
        {
            Ok(response) => {
                self.apply(bookkeeping, &response);
                ActionOutcome::Response(response)
            }
            Err(e) => {
                debug!(user = self.index, %action, error = %e, "Request failed");
                ActionOutcome::Error(e)
            }
        }
    }

    /// Session-stop hook: undo follows and bookmarks, then forget everything.
    ///
    /// Cleanup is best effort. Every call is attempted once; failures are
    /// returned for the report but otherwise ignored.
    pub async fn on_stop(&mut self) -> Vec<(&'static str, ActionOutcome)> {
        let mut outcomes = Vec::new();
        let credential = &self.state.credential;

        for account_id in &self.state.followed {
            let request = ApiRequest::post(format!("/api/v1/accounts/{}/unfollow", account_id));
            outcomes.push((ON_STOP_UNFOLLOW, self.send_best_effort(&request, credential).await));
        }
        for post_id in &self.state.bookmarked {
            let request = ApiRequest::post(format!("/api/v1/statuses/{}/unbookmark", post_id));
            outcomes.push((ON_STOP_UNBOOKMARK, self.send_best_effort(&request, credential).await));
        }

        debug!(user = self.index, calls = outcomes.len(), "Session stopped");
        self.state.clear();
        outcomes
    }

    async fn send_best_effort(&self, request: &ApiRequest, credential: &Credential) -> ActionOutcome {
        match self.client.send(request, Some(credential)).await {
            Ok(response) => ActionOutcome::Response(response),
            Err(e) => {
                debug!(user = self.index, path = %request.path, error = %e, "Cleanup call failed");
                ActionOutcome::Error(e)
            }
        }
    }

    /// Build the request for an action, or `None` when its precondition fails.
    fn plan(&mut self, action: Action) -> Option<(ApiRequest, Bookkeeping)> {
        let rng = &mut self.rng;
        let state = &mut self.state;
        let last_post = state.last_post_id.clone();
        let own_id = &state.credential.account_id;

        let planned = match action {
            Action::FetchHomeTimeline => (
                ApiRequest::get("/api/v1/timelines/home").query("limit", content::TIMELINE_LIMIT),
                Bookkeeping::None,
            ),
            Action::FetchPublicTimeline => (
                ApiRequest::get(content::public_timeline_path(rng))
                    .query("limit", content::TIMELINE_LIMIT),
                Bookkeeping::None,
            ),
            Action::FetchHashtagTimeline => (
                ApiRequest::get(format!(
                    "/api/v1/timelines/tag/{}",
                    content::hashtag_name(rng)
                ))
                .query("limit", content::TIMELINE_LIMIT),
                Bookkeeping::None,
            ),

            Action::PostStatus => (
                ApiRequest::post("/api/v1/statuses").json(&content::status_body(rng)),
                Bookkeeping::RecordPost,
            ),
            Action::PostWithMedia => (
                ApiRequest::post("/api/v1/statuses").json(&content::media_status_body(rng)),
                Bookkeeping::None,
            ),
            Action::ReplyToStatus => {
                let post = last_post?;
                (
                    ApiRequest::post("/api/v1/statuses")
                        .json(&content::reply_body(rng, post.as_str())),
                    Bookkeeping::None,
                )
            }

            Action::FavouriteLastStatus => (
                ApiRequest::post(format!("/api/v1/statuses/{}/favourite", last_post?)),
                Bookkeeping::None,
            ),
            Action::UnfavouriteStatus => (
                ApiRequest::post(format!("/api/v1/statuses/{}/unfavourite", last_post?)),
                Bookkeeping::None,
            ),
            Action::BoostLastStatus => (
                ApiRequest::post(format!("/api/v1/statuses/{}/reblog", last_post?)),
                Bookkeeping::None,
            ),
            Action::UnboostStatus => (
                ApiRequest::post(format!("/api/v1/statuses/{}/unreblog", last_post?)),
                Bookkeeping::None,
            ),
            Action::BookmarkStatus => {
                let post = last_post?;
                (
                    ApiRequest::post(format!("/api/v1/statuses/{}/bookmark", post)),
                    Bookkeeping::Bookmarked(post),
                )
            }
            Action::UnbookmarkStatus => {
                let post = last_post?;
                (
                    ApiRequest::post(format!("/api/v1/statuses/{}/unbookmark", post)),
                    Bookkeeping::Unbookmarked(post),
                )
            }
            Action::GetBookmarks => (ApiRequest::get("/api/v1/bookmarks"), Bookkeeping::None),

            Action::FollowAnotherUser => {
                let target = pick_unfollowed(rng, &state.peers, &state.followed)?;
                (
                    ApiRequest::post(format!("/api/v1/accounts/{}/follow", target)),
                    Bookkeeping::Followed(target),
                )
            }
            Action::UnfollowUser => {
                if state.followed.is_empty() {
                    return None;
                }
                let idx = rng.gen_range(0..state.followed.len());
                let target = state.followed.get_index(idx)?.clone();
                (
                    ApiRequest::post(format!("/api/v1/accounts/{}/unfollow", target)),
                    Bookkeeping::Unfollowed(target),
                )
            }
            Action::GetFollowers => (
                ApiRequest::get(format!("/api/v1/accounts/{}/followers", own_id)),
                Bookkeeping::None,
            ),
            Action::GetFollowing => (
                ApiRequest::get(format!("/api/v1/accounts/{}/following", own_id)),
                Bookkeeping::None,
            ),

            Action::SearchUsers => (
                ApiRequest::get("/api/v2/search")
                    .query("q", content::user_search_term(rng))
                    .query("type", "accounts")
                    .query("limit", content::SEARCH_LIMIT),
                Bookkeeping::None,
            ),
            Action::SearchContent => (
                ApiRequest::get("/api/v2/search")
                    .query("q", content::content_search_term(rng))
                    .query("type", "statuses")
                    .query("limit", content::SEARCH_LIMIT),
                Bookkeeping::None,
            ),

            Action::GetNotifications => (
                ApiRequest::get("/api/v1/notifications").query("limit", content::TIMELINE_LIMIT),
                Bookkeeping::None,
            ),
            Action::GetAccountInfo => (
                ApiRequest::get("/api/v1/accounts/verify_credentials"),
                Bookkeeping::None,
            ),
            Action::UpdateProfile => (
                ApiRequest::patch("/api/v1/accounts/update_credentials")
                    .json(&content::profile_update(rng)),
                Bookkeeping::None,
            ),
            Action::GetInstanceInfo => (
                ApiRequest::get("/api/v1/instance").anonymous(),
                Bookkeeping::None,
            ),
            Action::GetTrends => (ApiRequest::get("/api/v1/trends"), Bookkeeping::None),

            Action::GetLists => (ApiRequest::get("/api/v1/lists"), Bookkeeping::None),
            Action::CreateList => (
                ApiRequest::post("/api/v1/lists").json(&content::list_body(rng)),
                Bookkeeping::None,
            ),
            Action::GetConversations => {
                (ApiRequest::get("/api/v1/conversations"), Bookkeeping::None)
            }
            Action::GetFilters => (ApiRequest::get("/api/v1/filters"), Bookkeeping::None),
            Action::GetMutedAccounts => (ApiRequest::get("/api/v1/mutes"), Bookkeeping::None),
            Action::GetBlockedAccounts => (ApiRequest::get("/api/v1/blocks"), Bookkeeping::None),

            Action::GetStatusContext => (
                ApiRequest::get(format!("/api/v1/statuses/{}/context", last_post?)),
                Bookkeeping::None,
            ),
            Action::GetStatusDetails => (
                ApiRequest::get(format!("/api/v1/statuses/{}", last_post?)),
                Bookkeeping::None,
            ),

            Action::CleanupOldData => {
                trim_oldest(&mut state.followed, MAX_FOLLOWED, KEEP_FOLLOWED);
                trim_oldest(&mut state.bookmarked, MAX_BOOKMARKED, KEEP_BOOKMARKED);
                return None;
            }
        };

        Some(planned)
    }

    /// Update bookkeeping after a response. Only `200 OK` counts.
    fn apply(&mut self, bookkeeping: Bookkeeping, response: &ApiResponse) {
        if !response.is_ok() {
            return;
        }

        match bookkeeping {
            Bookkeeping::None => {}
            Bookkeeping::RecordPost => match response.json::<StatusResponse>() {
                Ok(StatusResponse { id: Some(id) }) => {
                    self.state.last_post_id = Some(StatusId::new(id));
                }
                Ok(StatusResponse { id: None }) => {}
                Err(e) => {
                    debug!(user = self.index, error = %e, "Created status without a readable id");
                }
            },
            Bookkeeping::Bookmarked(post) => {
                self.state.bookmarked.insert(post);
            }
            Bookkeeping::Unbookmarked(post) => {
                self.state.bookmarked.shift_remove(&post);
            }
            Bookkeeping::Followed(account) => {
                self.state.followed.insert(account);
            }
            Bookkeeping::Unfollowed(account) => {
                self.state.followed.shift_remove(&account);
            }
        }
    }
}

/// Draw random peers until one is not yet followed, giving up after as many
/// draws as there are peers.
fn pick_unfollowed<R: Rng + ?Sized>(
    rng: &mut R,
    peers: &[AccountId],
    followed: &IndexSet<AccountId>,
) -> Option<AccountId> {
    if peers.is_empty() || followed.len() >= peers.len() {
        return None;
    }

    (0..peers.len())
        .map(|_| &peers[rng.gen_range(0..peers.len())])
        .find(|candidate| !followed.contains(*candidate))
        .cloned()
}

/// Once `set` grows past `max`, keep only the newest `keep` entries.
fn trim_oldest<T: std::hash::Hash + Eq>(set: &mut IndexSet<T>, max: usize, keep: usize) {
    if set.len() > max {
        let excess = set.len() - keep;
        set.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::CredentialPool;
    use fediload_test_helpers::{credentials, MockInstance};
    use rand_chacha::ChaCha8Rng;

    async fn session_with(mock: &MockInstance, pool_size: usize) -> (SwarmContext, SimUser) {
        let ctx = SwarmContext::new(CredentialPool::new(credentials(pool_size)));
        let client = MastodonClient::new(&mock.base_url(), Duration::from_secs(5)).unwrap();
        let user = SimUser::on_start(&ctx, client, 42).unwrap();
        (ctx, user)
    }

    fn status(outcome: &ActionOutcome) -> Option<u16> {
        match outcome {
            ActionOutcome::Response(r) => Some(r.status),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_on_start_assigns_round_robin_and_peers() {
        let mock = MockInstance::start().await;
        let (ctx, first) = session_with(&mock, 3).await;
        let client = MastodonClient::new(&mock.base_url(), Duration::from_secs(5)).unwrap();
        let second = SimUser::on_start(&ctx, client, 42).unwrap();

        assert_eq!(first.state().credential.account_id.as_str(), "1");
        assert_eq!(second.state().credential.account_id.as_str(), "2");
        assert_eq!(
            second.state().peers,
            vec![AccountId::new("1"), AccountId::new("3")]
        );
        assert_eq!(second.index(), 1);
    }

    #[tokio::test]
    async fn test_last_post_preconditions() {
        let mock = MockInstance::start().await;
        let (_ctx, mut user) = session_with(&mock, 2).await;

        for action in [
            Action::ReplyToStatus,
            Action::FavouriteLastStatus,
            Action::BookmarkStatus,
            Action::GetStatusContext,
            Action::GetStatusDetails,
        ] {
            assert!(matches!(user.perform(action).await, ActionOutcome::NoRequest));
        }
        assert!(mock.requests().is_empty());

        let outcome = user.perform(Action::PostStatus).await;
        assert_eq!(status(&outcome), Some(200));
        let post = user.state().last_post_id.clone().expect("post id recorded");

        user.perform(Action::ReplyToStatus).await;
        let replies = mock.requests_to("POST", "/api/v1/statuses");
        assert_eq!(replies.len(), 2);
        let body = replies[1].body.as_ref().unwrap();
        assert_eq!(body["in_reply_to_id"], post.as_str());
        assert_eq!(body["visibility"], "public");

        user.perform(Action::FavouriteLastStatus).await;
        assert_eq!(
            mock.requests_to("POST", &format!("/api/v1/statuses/{}/favourite", post))
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_failed_post_keeps_last_post_unset() {
        let mock = MockInstance::start().await;
        mock.fail_path("/api/v1/statuses", 422);
        let (_ctx, mut user) = session_with(&mock, 2).await;

        let outcome = user.perform(Action::PostStatus).await;
        assert_eq!(status(&outcome), Some(422));
        assert_eq!(user.state().last_post_id, None);
    }

    #[tokio::test]
    async fn test_bookmark_bookkeeping() {
        let mock = MockInstance::start().await;
        let (_ctx, mut user) = session_with(&mock, 2).await;
        user.perform(Action::PostStatus).await;
        let post = user.state().last_post_id.clone().unwrap();

        user.perform(Action::BookmarkStatus).await;
        assert!(user.state().bookmarked.contains(&post));

        user.perform(Action::UnbookmarkStatus).await;
        assert!(user.state().bookmarked.is_empty());

        mock.fail_path(&format!("/api/v1/statuses/{}/bookmark", post), 500);
        user.perform(Action::BookmarkStatus).await;
        assert!(user.state().bookmarked.is_empty());
    }

    #[tokio::test]
    async fn test_follow_until_everyone_is_followed() {
        let mock = MockInstance::start().await;
        let (_ctx, mut user) = session_with(&mock, 4).await;

        // Random draws may miss; enough attempts follow all three peers.
        for _ in 0..50 {
            user.perform(Action::FollowAnotherUser).await;
        }
        let followed: Vec<_> = user.state().followed.iter().cloned().collect();
        assert_eq!(followed.len(), 3);
        assert!(!followed.contains(&AccountId::new("1")));

        // Everyone followed: no further follow requests.
        mock.clear();
        assert!(matches!(
            user.perform(Action::FollowAnotherUser).await,
            ActionOutcome::NoRequest
        ));
        assert!(mock.requests().is_empty());

        user.perform(Action::UnfollowUser).await;
        assert_eq!(user.state().followed.len(), 2);
    }

    #[tokio::test]
    async fn test_account_info_succeeds_for_pool_tokens() {
        let mock = MockInstance::start().await;
        let (_ctx, mut user) = session_with(&mock, 2).await;

        let outcome = user.perform(Action::GetAccountInfo).await;
        assert_eq!(status(&outcome), Some(200));
    }

    #[tokio::test]
    async fn test_failed_follow_is_not_recorded() {
        let mock = MockInstance::start().await;
        mock.fail_path("/api/v1/accounts/2/follow", 403);
        let (_ctx, mut user) = session_with(&mock, 2).await;

        let outcome = user.perform(Action::FollowAnotherUser).await;
        assert_eq!(status(&outcome), Some(403));
        assert!(user.state().followed.is_empty());
    }

    #[tokio::test]
    async fn test_request_shapes() {
        let mock = MockInstance::start().await;
        let (_ctx, mut user) = session_with(&mock, 2).await;

        user.perform(Action::FetchHomeTimeline).await;
        user.perform(Action::SearchUsers).await;
        user.perform(Action::GetFollowers).await;
        user.perform(Action::GetInstanceInfo).await;
        user.perform(Action::UpdateProfile).await;

        let requests = mock.requests();
        assert_eq!(requests[0].path, "/api/v1/timelines/home");
        assert_eq!(requests[0].query.as_deref(), Some("limit=30"));
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer token-1"));

        assert_eq!(requests[1].path, "/api/v2/search");
        let query = requests[1].query.as_deref().unwrap();
        assert!(query.contains("type=accounts"));
        assert!(query.contains("limit=10"));

        assert_eq!(requests[2].path, "/api/v1/accounts/1/followers");

        assert_eq!(requests[3].path, "/api/v1/instance");
        assert_eq!(requests[3].authorization, None);

        assert_eq!(requests[4].method, "PATCH");
        let body = requests[4].body.as_ref().unwrap();
        assert!(body["display_name"]
            .as_str()
            .unwrap()
            .starts_with("TestUser"));
    }

    #[tokio::test]
    async fn test_on_stop_cleans_up_and_clears() {
        let mock = MockInstance::start().await;
        let (_ctx, mut user) = session_with(&mock, 3).await;
        user.perform(Action::PostStatus).await;
        user.perform(Action::BookmarkStatus).await;
        for _ in 0..20 {
            user.perform(Action::FollowAnotherUser).await;
        }
        let followed = user.state().followed.len();
        assert!(followed > 0);

        // A failing cleanup call does not stop the rest.
        mock.fail_path("/api/v1/accounts/2/unfollow", 500);
        mock.clear();

        let outcomes = user.on_stop().await;
        assert_eq!(outcomes.len(), followed + 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|(label, _)| *label == ON_STOP_UNBOOKMARK)
                .count(),
            1
        );
        assert_eq!(mock.requests().len(), followed + 1);

        let state = user.state();
        assert!(state.followed.is_empty());
        assert!(state.bookmarked.is_empty());
        assert!(state.peers.is_empty());
        assert_eq!(state.last_post_id, None);
    }

    #[test]
    fn test_trim_keeps_newest() {
        let mut set: IndexSet<u32> = (0..21).collect();
        trim_oldest(&mut set, MAX_FOLLOWED, KEEP_FOLLOWED);
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), (11..21).collect::<Vec<_>>());

        let mut small: IndexSet<u32> = (0..20).collect();
        trim_oldest(&mut small, MAX_FOLLOWED, KEEP_FOLLOWED);
        assert_eq!(small.len(), 20);

        let mut bookmarks: IndexSet<u32> = (0..16).collect();
        trim_oldest(&mut bookmarks, MAX_BOOKMARKED, KEEP_BOOKMARKED);
        assert_eq!(bookmarks.len(), 8);
        assert_eq!(bookmarks.first(), Some(&8));
    }

    #[test]
    fn test_pick_unfollowed_skips_followed() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let peers = vec![AccountId::new("a"), AccountId::new("b")];
        let followed: IndexSet<_> = [AccountId::new("a")].into_iter().collect();

        // With one candidate left, some draw finds it or every draw misses.
        for _ in 0..20 {
            if let Some(pick) = pick_unfollowed(&mut rng, &peers, &followed) {
                assert_eq!(pick, AccountId::new("b"));
            }
        }

        let all: IndexSet<_> = peers.iter().cloned().collect();
        assert_eq!(pick_unfollowed(&mut rng, &peers, &all), None);
        assert_eq!(pick_unfollowed(&mut rng, &[], &IndexSet::new()), None);
    }
}
