//! Avatar and presentation-seed derivation.
//!
//! Views pick a partner's profile picture from their social handle when one
//! exists, and otherwise from a generated avatar keyed by a per-match seed.
//! The seed embeds the match timestamp so a repeat-named partner still gets
//! a distinct avatar.

use chrono::Utc;

/// Generated-avatar styles, in fixed order; the seed hash indexes into this.
pub const AVATAR_STYLES: [&str; 10] = [
    "avataaars",
    "bottts",
    "personas",
    "fun-emoji",
    "lorelei",
    "notionists",
    "open-peeps",
    "pixel-art",
    "thumbs",
    "big-smile",
];

/// Presentation seed for a fresh match: `<name>_<unix_millis>`.
pub fn stranger_seed(partner_name: &str) -> String {
    format!("{}_{}", partner_name, Utc::now().timestamp_millis())
}

/// 32-bit string hash over UTF-16 code units (`h = h*31 + unit`), absolute
/// value. Kept bit-compatible with the web client so both pick the same
/// avatar style for a given seed.
pub fn hash_code(value: &str) -> u32 {
    let mut hash: i32 = 0;
    for unit in value.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(unit as i32);
    }
    hash.unsigned_abs()
}

/// Profile-picture URL for a social handle, via the unavatar proxy.
pub fn twitter_pfp_url(handle: &str) -> String {
    let clean = handle.trim_start_matches('@');
    format!("https://unavatar.io/twitter/{clean}")
}

/// Avatar URL for a seed: the handle's picture when one exists, otherwise a
/// DiceBear avatar in a style chosen by the seed hash.
pub fn avatar_url(seed: &str, twitter_handle: Option<&str>) -> String {
    if let Some(handle) = twitter_handle {
        return twitter_pfp_url(handle);
    }
    let seed = if seed.is_empty() { "default" } else { seed };
    let style = AVATAR_STYLES[hash_code(seed) as usize % AVATAR_STYLES.len()];
    format!(
        "https://api.dicebear.com/7.x/{style}/png?seed={}&size=120",
        urlencoding::encode(seed)
    )
}
