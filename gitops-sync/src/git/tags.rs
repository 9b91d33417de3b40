//! Git tag ordering

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Marker tag applied after every reconciliation push
pub const AGENT_SYNC_TAG: &str = "agent-sync";

/// A tag as listed by the remote git service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagInfo {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_user_image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_description: Option<String>,
}

fn is_serial(tag: &str) -> bool {
    !tag.is_empty() && tag.bytes().all(|b| b.is_ascii_digit())
}

/// Compare two all-digit strings by value without parsing into a fixed width.
fn compare_serials(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Order two tags where some are serial numbers and others are free-form.
///
/// - both serial (`[0-9]+`): numeric comparison, `"10" > "9"`
/// - one serial: the serial tag is the *lesser* one, so `"10" < "v2"`
/// - neither serial: plain lexicographic comparison
///
/// Serial tags are treated as older than named releases. Strings that only
/// look numeric (signs, spaces, decimals) are not serial.
pub fn serial_tag_compare(tag_a: &str, tag_b: &str) -> Ordering {
    match (is_serial(tag_a), is_serial(tag_b)) {
        (true, true) => compare_serials(tag_a, tag_b),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => tag_a.cmp(tag_b),
    }
}

/// Sort tags newest first
pub fn sort_serial_tags(tags: &mut [TagInfo]) {
    tags.sort_by(|a, b| serial_tag_compare(&b.name, &a.name));
}
