//! Emoji + message helpers for consistent CLI copy.

pub mod emoji {
    pub const ACTION: &str = "🧩";
    pub const CANCEL: &str = "🛑";
    pub const PARTY: &str = "🎉";
    pub const SEARCH: &str = "🔍";
    pub const SUCCESS: &str = "✅";
    pub const WARNING: &str = "⚠️";
}

pub fn with(emoji: &str, message: &str) -> String {
    format!("{} {}", emoji, message)
}
