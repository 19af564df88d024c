use mailparse::ParsedMail;
use refresher_logging::refresh_warn;
use url::Url;

const DELIMITERS: &[char] = &['"', '\'', '<', '>', '(', ')', '[', ']'];
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?'];

/// Pulls story links out of a raw RFC 822 notification message.
///
/// Every `text/*` part of the MIME tree is decoded (quoted-printable, base64)
/// and scanned in order. A message that does not parse is scanned as plain
/// text. Duplicates across parts are dropped.
pub fn extract_message_links(raw: &[u8]) -> Vec<String> {
    let mut links = Vec::new();
    match mailparse::parse_mail(raw) {
        Ok(mail) => collect_part_links(&mail, &mut links),
        Err(err) => {
            refresh_warn!("Could not parse notification mail, scanning it as text: {err}");
            push_new(&mut links, extract_story_links(&String::from_utf8_lossy(raw)));
        }
    }
    links
}

fn collect_part_links(part: &ParsedMail<'_>, links: &mut Vec<String>) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_part_links(sub, links);
        }
        return;
    }
    if !part.ctype.mimetype.starts_with("text/") {
        return;
    }
    match part.get_body() {
        Ok(text) => push_new(links, extract_story_links(&text)),
        Err(err) => refresh_warn!("Skipping undecodable {} part: {err}", part.ctype.mimetype),
    }
}

fn push_new(links: &mut Vec<String>, found: Vec<String>) {
    for link in found {
        if !links.contains(&link) {
            links.push(link);
        }
    }
}

/// Pulls story links out of already decoded message text.
///
/// Only http(s) links with a numeric path segment (a story id) are kept.
/// Order follows the text; duplicates are dropped.
pub fn extract_story_links(text: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();

    for token in text.split(|c: char| c.is_whitespace() || DELIMITERS.contains(&c)) {
        let Some(start) = token.find("https://").or_else(|| token.find("http://")) else {
            continue;
        };
        let candidate = token[start..].trim_end_matches(TRAILING_PUNCTUATION);
        if is_story_link(candidate) && !links.iter().any(|known| known == candidate) {
            links.push(candidate.to_string());
        }
    }
    links
}

fn is_story_link(candidate: &str) -> bool {
    let Ok(url) = Url::parse(candidate) else {
        return false;
    };
    if url.host_str().is_none() {
        return false;
    }
    url.path_segments()
        .map(|mut segments| {
            segments.any(|segment| {
                !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit())
            })
        })
        .unwrap_or(false)
}
