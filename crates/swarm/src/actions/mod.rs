//! The catalogue of simulated-user actions.
//!
//! Each action maps to at most one API call. Relative weights decide how often
//! a session picks each action; they can be overridden per action by name.

pub mod content;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// One thing a simulated user can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    // Timelines
    FetchHomeTimeline,
    FetchPublicTimeline,
    FetchHashtagTimeline,

    // Posting
    PostStatus,
    PostWithMedia,
    ReplyToStatus,

    // Interactions with the session's last post
    FavouriteLastStatus,
    UnfavouriteStatus,
    BoostLastStatus,
    UnboostStatus,
    BookmarkStatus,
    UnbookmarkStatus,
    GetBookmarks,

    // Social graph
    FollowAnotherUser,
    UnfollowUser,
    GetFollowers,
    GetFollowing,

    // Search
    SearchUsers,
    SearchContent,

    // Account and instance
    GetNotifications,
    GetAccountInfo,
    UpdateProfile,
    GetInstanceInfo,
    GetTrends,

    // Lists, conversations, filters
    GetLists,
    CreateList,
    GetConversations,
    GetFilters,
    GetMutedAccounts,
    GetBlockedAccounts,

    // Threads
    GetStatusContext,
    GetStatusDetails,

    // Local bookkeeping only
    CleanupOldData,
}

impl Action {
    /// Every action, in catalogue order.
    pub const ALL: [Action; 33] = [
        Action::FetchHomeTimeline,
        Action::FetchPublicTimeline,
        Action::FetchHashtagTimeline,
        Action::PostStatus,
        Action::PostWithMedia,
        Action::ReplyToStatus,
        Action::FavouriteLastStatus,
        Action::UnfavouriteStatus,
        Action::BoostLastStatus,
        Action::UnboostStatus,
        Action::BookmarkStatus,
        Action::UnbookmarkStatus,
        Action::GetBookmarks,
        Action::FollowAnotherUser,
        Action::UnfollowUser,
        Action::GetFollowers,
        Action::GetFollowing,
        Action::SearchUsers,
        Action::SearchContent,
        Action::GetNotifications,
        Action::GetAccountInfo,
        Action::UpdateProfile,
        Action::GetInstanceInfo,
        Action::GetTrends,
        Action::GetLists,
        Action::CreateList,
        Action::GetConversations,
        Action::GetFilters,
        Action::GetMutedAccounts,
        Action::GetBlockedAccounts,
        Action::GetStatusContext,
        Action::GetStatusDetails,
        Action::CleanupOldData,
    ];

    /// Stable snake_case name, used in config files and reports.
    pub fn name(self) -> &'static str {
        match self {
            Action::FetchHomeTimeline => "fetch_home_timeline",
            Action::FetchPublicTimeline => "fetch_public_timeline",
            Action::FetchHashtagTimeline => "fetch_hashtag_timeline",
            Action::PostStatus => "post_status",
            Action::PostWithMedia => "post_with_media",
            Action::ReplyToStatus => "reply_to_status",
            Action::FavouriteLastStatus => "favourite_last_status",
            Action::UnfavouriteStatus => "unfavourite_status",
            Action::BoostLastStatus => "boost_last_status",
            Action::UnboostStatus => "unboost_status",
            Action::BookmarkStatus => "bookmark_status",
            Action::UnbookmarkStatus => "unbookmark_status",
            Action::GetBookmarks => "get_bookmarks",
            Action::FollowAnotherUser => "follow_another_user",
            Action::UnfollowUser => "unfollow_user",
            Action::GetFollowers => "get_followers",
            Action::GetFollowing => "get_following",
            Action::SearchUsers => "search_users",
            Action::SearchContent => "search_content",
            Action::GetNotifications => "get_notifications",
            Action::GetAccountInfo => "get_account_info",
            Action::UpdateProfile => "update_profile",
            Action::GetInstanceInfo => "get_instance_info",
            Action::GetTrends => "get_trends",
            Action::GetLists => "get_lists",
            Action::CreateList => "create_list",
            Action::GetConversations => "get_conversations",
            Action::GetFilters => "get_filters",
            Action::GetMutedAccounts => "get_muted_accounts",
            Action::GetBlockedAccounts => "get_blocked_accounts",
            Action::GetStatusContext => "get_status_context",
            Action::GetStatusDetails => "get_status_details",
            Action::CleanupOldData => "cleanup_old_data",
        }
    }

    /// Relative weight when no override is configured.
    ///
    /// The core read paths and posting are twice as likely as everything else.
    pub fn default_weight(self) -> u32 {
        match self {
            Action::FetchHomeTimeline
            | Action::FetchPublicTimeline
            | Action::PostStatus
            | Action::FavouriteLastStatus
            | Action::FollowAnotherUser
            | Action::UnfollowUser
            | Action::GetNotifications => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = ActionTableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.name() == s)
            .ok_or_else(|| ActionTableError::UnknownAction(s.to_string()))
    }
}

/// Weighted chooser over the action catalogue.
#[derive(Debug, Clone)]
pub struct ActionTable {
    actions: Vec<(Action, u32)>,
    index: WeightedIndex<u32>,
}

impl ActionTable {
    /// Build a table from default weights with per-action overrides.
    ///
    /// A weight of 0 disables an action. At least one action must stay
    /// enabled.
    pub fn with_overrides(overrides: &HashMap<String, u32>) -> Result<Self, ActionTableError> {
        let mut weights: Vec<(Action, u32)> = Action::ALL
            .iter()
            .map(|&a| (a, a.default_weight()))
            .collect();

        for (name, &weight) in overrides {
            let action: Action = name.parse()?;
            if let Some(entry) = weights.iter_mut().find(|(a, _)| *a == action) {
                entry.1 = weight;
            }
        }

        Self::from_weights(weights)
    }

    /// Build a table from explicit `(action, weight)` pairs.
    pub fn from_weights(weights: Vec<(Action, u32)>) -> Result<Self, ActionTableError> {
        let actions: Vec<_> = weights.into_iter().filter(|(_, w)| *w > 0).collect();
        if actions.is_empty() {
            return Err(ActionTableError::NoEnabledActions);
        }

        let index = WeightedIndex::new(actions.iter().map(|(_, w)| *w))
            .map_err(|_| ActionTableError::NoEnabledActions)?;

        Ok(Self { actions, index })
    }

    /// Pick an action according to the weights.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Action {
        self.actions[self.index.sample(rng)].0
    }

    /// Enabled actions and their weights.
    pub fn weights(&self) -> &[(Action, u32)] {
        &self.actions
    }

    /// Sum of all enabled weights.
    pub fn total_weight(&self) -> u32 {
        self.actions.iter().map(|(_, w)| w).sum()
    }
}

/// Errors building an action table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionTableError {
    #[error("Unknown action `{0}`")]
    UnknownAction(String),

    #[error("Every action has weight 0")]
    NoEnabledActions,
}
