use serde::{Deserialize, Serialize};

use crate::models::LikeAction;

/// Post counters the view/like endpoints may touch. `comment_count` moves only with comment
/// create/delete inside the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Views,
    Likes,
}

impl Counter {
    /// Column name; a closed set, safe to splice into SQL.
    pub fn column(self) -> &'static str {
        match self {
            Counter::Views => "view_count",
            Counter::Likes => "like_count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    pub fn delta(self) -> i64 {
        match self {
            Direction::Increase => 1,
            Direction::Decrease => -1,
        }
    }

    /// Next value of a counter; absent reads as 0 and the result never drops below 0.
    pub fn apply(self, current: Option<i64>) -> i64 {
        (current.unwrap_or(0).max(0) + self.delta()).max(0)
    }

    pub fn from_liked(liked: bool) -> Self {
        if liked { Direction::Increase } else { Direction::Decrease }
    }
}

impl From<LikeAction> for Direction {
    fn from(action: LikeAction) -> Self {
        match action {
            LikeAction::Like => Direction::Increase,
            LikeAction::Unlike => Direction::Decrease,
        }
    }
}
