use refresher_logging::refresh_warn;

/// Cuts a story link down to its stable prefix.
///
/// The prefix runs up to and including the first purely numeric path segment,
/// which is the site-assigned story id. Anything after it (chapter number,
/// title slug, page) is dropped. Returns `None` when no segment is numeric.
pub fn normalize_story_url(link: &str) -> Option<String> {
    let segments: Vec<&str> = link.split('/').collect();
    let id_index = segments.iter().position(|segment| is_numeric_segment(segment))?;
    Some(segments[..=id_index].join("/"))
}

/// Like [`normalize_story_url`], but falls back to the link itself.
///
/// An unparsable link is logged and passed through so the batch can still try it.
pub fn canonical_story_url(link: &str) -> String {
    match normalize_story_url(link) {
        Some(normalized) => normalized,
        None => {
            refresh_warn!("{link} is not a parsable or valid story link, this may cause issues.");
            link.to_string()
        }
    }
}

/// Builds the run's work list: retry entries first, then mail links.
///
/// Retry entries are kept verbatim, duplicates included. Mail links are
/// normalized and de-duplicated among themselves, keeping first-seen order.
pub fn assemble_work_list(retry: Vec<String>, mailed: Vec<String>) -> Vec<String> {
    let mut work = retry;
    let mut seen_mail: Vec<String> = Vec::with_capacity(mailed.len());
    for link in mailed {
        let url = canonical_story_url(&link);
        if !seen_mail.contains(&url) {
            seen_mail.push(url);
        }
    }
    work.extend(seen_mail);
    work
}

fn is_numeric_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(char::is_numeric)
}
