//! Storage key generation and display-name helpers.
//!
//! Storage keys are 32-char hex digests of a seed mixed with the current
//! time and a random nonce. Uniqueness is checked against the attachment
//! tables before a key is handed out; the unique index on
//! `(folder, diskfile)` catches the remaining check-then-insert race.

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use tracing::debug;

use crate::db::{self, DbPool};
use crate::Result;

/// Legacy bug attachment names were stored as `0001234-name.ext`.
static BUG_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{7}-").expect("valid regex"));

/// Generate a storage key candidate. Not guaranteed unique.
pub fn generate_name(seed: &str) -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default();
    let nonce: u64 = rand::thread_rng().gen();
    format!("{:x}", md5::compute(format!("{}{}{}", seed, nanos, nonce)))
}

/// Generate a storage key that no attachment in `folder` uses yet.
pub async fn generate_unique_name(pool: &DbPool, seed: &str, folder: &str) -> Result<String> {
    loop {
        let candidate = generate_name(seed);
        if !db::diskfile_in_use(pool, folder, &candidate).await? {
            return Ok(candidate);
        }
        debug!(folder = %folder, key = %candidate, "Storage key collision, regenerating");
    }
}

/// Seed for a bug attachment key: zero-padded bug id plus file name.
pub fn bug_seed(bug_id: i64, filename: &str) -> String {
    format!("{:07}-{}", bug_id, filename)
}

/// Seed for a project document key.
pub fn document_seed(prefix: &str, project_id: i64, filename: &str) -> String {
    format!("{}-{}-{}", prefix, project_id, filename)
}

/// Strip the id prefix legacy rows carried in their stored file name.
///
/// Handles `{doc_prefix}-0000001-name` (documents) and `0000001-name`
/// (bug attachments); anything else is returned unchanged, so names that
/// merely contain dashes survive.
pub fn display_name(filename: &str, doc_prefix: &str) -> String {
    let doc_pattern = format!(r"^{}-\d{{7}}-", regex::escape(doc_prefix));
    if let Ok(doc_re) = Regex::new(&doc_pattern) {
        if let Some(m) = doc_re.find(filename) {
            return filename[m.end()..].to_string();
        }
    }

    if let Some(m) = BUG_PREFIX.find(filename) {
        return filename[m.end()..].to_string();
    }

    filename.to_string()
}

/// Lowercased extension of a file name, "" when there is none.
pub fn file_extension(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}

/// Replace characters that are unsafe in file names with underscores.
pub fn clean_name(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '/' | '*' | '?' | '"' | '<' | '>' | '|' | '\\' | ' ' | ':' | '&' => '_',
            other => other,
        })
        .collect()
}
