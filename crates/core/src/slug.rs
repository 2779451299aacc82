//! Name normalisation for file names, URLs and hosting project names.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

pub const MAX_SLUG_LEN: usize = 50;

static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("static pattern"));
static SLUG_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_-]+").expect("static pattern"));
static NON_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w-]").expect("static pattern"));

/// `"Acme, Inc. (Kingston)"` becomes `"acme-inc-kingston"`.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let kept = NON_SLUG_CHARS.replace_all(&lowered, "");
    let slug = SLUG_SEPARATORS.replace_all(&kept, "-");
    truncate_chars(&slug, MAX_SLUG_LEN)
}

/// Lowercased name with anything outside `[\w-]` replaced by `_`.
pub fn safe_file_stem(name: &str) -> String {
    NON_FILE_CHARS.replace_all(&name.to_lowercase(), "_").into_owned()
}

/// Hosting project name: `{prefix}{slugify(client_slug)}`, capped at 50 chars. The result
/// is also a directory name, so it never carries path separators.
pub fn project_name(prefix: &str, client_slug: &str) -> String {
    truncate_chars(&format!("{prefix}{}", slugify(client_slug)), MAX_SLUG_LEN)
}

pub fn date_stamp(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Best-effort client name from an artifact file such as `acme_corp_20250101.html`.
pub fn client_name_from_file_stem(stem: &str) -> String {
    let base = match stem.find("_20") {
        Some(index) => &stem[..index],
        None => stem,
    };
    base.split(['_', '-'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
